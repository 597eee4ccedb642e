//! Packed voxel octree: flat `i32` cell arena, merge-on-write compaction,
//! binary persistence, and cell-skipping ray intersection.
#![forbid(unsafe_code)]

pub mod arena;
mod codec;
pub mod error;
mod march;
pub mod packed;
pub mod ray;

pub use arena::NodeArena;
pub use error::OctreeError;
pub use march::{EPSILON, OFFSET};
pub use packed::{MAX_DEPTH, PackedOctree};
pub use ray::{MaterialResolver, ProbeRay, SurfaceHit, TraceRay};

/// Voxel type id; 0 is empty space.
pub type VoxelType = u32;

pub const AIR: VoxelType = 0;
/// Largest type that can be stored as a negated cell.
pub const MAX_VOXEL_TYPE: VoxelType = i32::MAX as u32;

/// Host-facing voxel access, shared by the in-memory tree and the sharded
/// on-disk index.
pub trait VoxelStore {
    type Error: std::error::Error;

    fn write(&mut self, voxel: VoxelType, x: i32, y: i32, z: i32) -> Result<(), Self::Error>;

    fn read(&mut self, x: i32, y: i32, z: i32) -> VoxelType;

    /// Type plus the level of the containing leaf; the leaf cell has edge
    /// length `2^level`.
    fn read_with_level(&mut self, x: i32, y: i32, z: i32) -> (VoxelType, u32);

    fn total_depth(&self) -> u32;

    fn node_count(&mut self) -> u64;
}

impl VoxelStore for PackedOctree {
    type Error = OctreeError;

    fn write(&mut self, voxel: VoxelType, x: i32, y: i32, z: i32) -> Result<(), OctreeError> {
        self.set(voxel, x, y, z)
    }

    fn read(&mut self, x: i32, y: i32, z: i32) -> VoxelType {
        self.get(x, y, z)
    }

    fn read_with_level(&mut self, x: i32, y: i32, z: i32) -> (VoxelType, u32) {
        self.get_with_level(x, y, z)
    }

    fn total_depth(&self) -> u32 {
        self.depth()
    }

    fn node_count(&mut self) -> u64 {
        PackedOctree::node_count(self)
    }
}

/// Child slot of (x, y, z) one level below a node whose children sit at `level`.
#[inline]
pub fn octant(x: i32, y: i32, z: i32, level: u32) -> usize {
    let bit = |v: i32| ((v as u32 >> level) & 1) as usize;
    (bit(x) << 2) | (bit(y) << 1) | bit(z)
}
