use crate::arena::NodeArena;
use crate::{MAX_VOXEL_TYPE, OctreeError, VoxelType, octant};

/// Deepest supported tree; coordinates are addressed with 32-bit masks.
pub const MAX_DEPTH: u32 = 31;

/// A fixed-depth voxel octree packed into a flat cell arena.
///
/// Voxel addressing reads only the low `depth` bits of each coordinate, so
/// writes outside `[0, 2^depth)` wrap into the tree.
#[derive(Clone, Debug)]
pub struct PackedOctree {
    depth: u32,
    center: [f64; 3],
    arena: NodeArena,
}

impl PackedOctree {
    pub fn new(depth: u32, center: [f64; 3]) -> Result<Self, OctreeError> {
        if depth == 0 || depth > MAX_DEPTH {
            return Err(OctreeError::InvalidDepth(depth));
        }
        Ok(Self {
            depth,
            center,
            arena: NodeArena::new(),
        })
    }

    pub(crate) fn from_parts(depth: u32, center: [f64; 3], arena: NodeArena) -> Self {
        Self {
            depth,
            center,
            arena,
        }
    }

    #[inline]
    pub fn depth(&self) -> u32 {
        self.depth
    }

    #[inline]
    pub fn center(&self) -> [f64; 3] {
        self.center
    }

    /// Edge length of the whole tree in voxels.
    #[inline]
    pub fn extent(&self) -> u64 {
        1u64 << self.depth
    }

    /// Cells in use (`size` in the persisted form).
    #[inline]
    pub fn size(&self) -> usize {
        self.arena.size()
    }

    #[inline]
    pub fn cells(&self) -> &[i32] {
        self.arena.cells()
    }

    #[inline]
    pub fn arena(&self) -> &NodeArena {
        &self.arena
    }

    /// Write `voxel` at (x, y, z), subdividing on the way down and merging
    /// uniform siblings on the way back up.
    ///
    /// Either the whole edit lands or, on a capacity error, no cell changes.
    pub fn set(&mut self, voxel: VoxelType, x: i32, y: i32, z: i32) -> Result<(), OctreeError> {
        if voxel > MAX_VOXEL_TYPE {
            return Err(OctreeError::InvalidType(voxel));
        }
        let leaf = -(voxel as i32);

        let mut node = 0;
        let mut level = self.depth;
        while self.arena.is_branch(node) {
            level -= 1;
            node = self.arena.child(node, octant(x, y, z, level));
        }
        if self.arena.cell(node) == leaf {
            return Ok(());
        }
        self.arena.reserve_blocks(level as usize)?;

        let mut parents = [0usize; MAX_DEPTH as usize];
        let mut node = 0;
        for level in (0..self.depth).rev() {
            parents[level as usize] = node;
            if !self.arena.is_branch(node) {
                self.arena.subdivide(node)?;
            }
            node = self.arena.child(node, octant(x, y, z, level));
        }
        self.arena.set_cell(node, leaf);

        for &parent in &parents[..self.depth as usize] {
            match self.arena.uniform_children(parent) {
                Some(value) if value == leaf => self.arena.merge(parent, leaf),
                _ => break,
            }
        }
        Ok(())
    }

    pub fn get(&self, x: i32, y: i32, z: i32) -> VoxelType {
        self.get_with_level(x, y, z).0
    }

    /// Type of the leaf containing (x, y, z) and its level; the leaf spans
    /// `2^level` voxels per axis.
    pub fn get_with_level(&self, x: i32, y: i32, z: i32) -> (VoxelType, u32) {
        let mut node = 0;
        let mut level = self.depth;
        while self.arena.is_branch(node) {
            level -= 1;
            node = self.arena.child(node, octant(x, y, z, level));
        }
        (self.arena.cell(node).unsigned_abs(), level)
    }

    /// Reachable nodes, branches and leaves alike.
    pub fn node_count(&self) -> u64 {
        self.arena.count_nodes(0, &|_| 1)
    }

    /// True when no branch has eight equal leaf children.
    pub fn is_compact(&self) -> bool {
        let mut stack = vec![0usize];
        while let Some(node) = stack.pop() {
            if !self.arena.is_branch(node) {
                continue;
            }
            if self.arena.uniform_children(node).is_some() {
                return false;
            }
            stack.extend((0..8).map(|k| self.arena.child(node, k)));
        }
        true
    }
}

impl PartialEq for PackedOctree {
    /// Structural equality over the persisted fields.
    fn eq(&self, other: &Self) -> bool {
        self.depth == other.depth && self.center == other.center && self.cells() == other.cells()
    }
}
