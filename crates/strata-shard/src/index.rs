use std::io::Read;
use std::path::{Path, PathBuf};

use strata_octree::{
    AIR, MAX_DEPTH, MAX_VOXEL_TYPE, NodeArena, PackedOctree, VoxelStore, VoxelType, octant,
};

use crate::error::IndexError;
use crate::file::{ShardFile, ShardSet, ShardTable};

pub const DEFAULT_SHARD_DEPTH: u32 = 10;

#[derive(Clone, Debug)]
pub struct IndexConfig {
    /// Depth of every shard octree; one shard covers `2^shard_depth` voxels
    /// per axis.
    pub shard_depth: u32,
    /// Where shard files are created; the system temp dir when unset.
    pub scratch_dir: Option<PathBuf>,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            shard_depth: DEFAULT_SHARD_DEPTH,
            scratch_dir: None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IndexStats {
    pub shards: usize,
    pub shard_loads: u64,
    pub shard_flushes: u64,
    pub dropped_writes: u64,
    pub failed_reads: u64,
}

/// The single resident shard.
#[derive(Debug)]
struct CacheSlot {
    shard: u32,
    tree: PackedOctree,
    /// The on-disk copy is stale.
    dirty: bool,
}

enum Route {
    /// The coarse leaf holds no shard; it spans `2^level` coarse cells.
    Empty { level: u32 },
    Resident,
}

/// World-scale voxel index split into on-disk shards.
///
/// A coarse octree maps the top `total_depth - shard_depth` coordinate bits to
/// shard ids. Shards are created on first write, persisted gzip-compressed,
/// and paged through a single write-back slot.
#[derive(Debug)]
pub struct ShardedVoxelIndex {
    total_depth: u32,
    shard_depth: u32,
    scratch_dir: PathBuf,
    coarse: NodeArena,
    shards: ShardTable,
    slot: Option<CacheSlot>,
    sealed: bool,
    stats: IndexStats,
}

impl ShardedVoxelIndex {
    /// Index covering `2^total_depth` voxels per axis; `total_depth` is raised
    /// to the shard depth if smaller.
    pub fn new(total_depth: u32, config: IndexConfig) -> Result<Self, IndexError> {
        let shard_depth = config.shard_depth;
        if shard_depth == 0 || shard_depth > MAX_DEPTH {
            return Err(IndexError::InvalidDepth(shard_depth));
        }
        if total_depth > MAX_DEPTH {
            return Err(IndexError::InvalidDepth(total_depth));
        }
        let total_depth = total_depth.max(shard_depth);
        let scratch_dir = config.scratch_dir.unwrap_or_else(std::env::temp_dir);
        std::fs::create_dir_all(&scratch_dir)?;
        log::info!(
            target: "shard",
            "index depth {} (coarse {}, shard {}), scratch {}",
            total_depth,
            total_depth - shard_depth,
            shard_depth,
            scratch_dir.display()
        );
        Ok(Self {
            total_depth,
            shard_depth,
            scratch_dir,
            coarse: NodeArena::new(),
            shards: ShardTable::new(),
            slot: None,
            sealed: false,
            stats: IndexStats::default(),
        })
    }

    /// Always fails: the sharded index only lives for one session.
    pub fn load<R: Read>(_input: &mut R, _config: IndexConfig) -> Result<Self, IndexError> {
        Err(IndexError::Unsupported)
    }

    #[inline]
    pub fn shard_depth(&self) -> u32 {
        self.shard_depth
    }

    #[inline]
    pub fn coarse_depth(&self) -> u32 {
        self.total_depth - self.shard_depth
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    #[inline]
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    #[inline]
    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats {
            shards: self.shards.len(),
            ..self.stats
        }
    }

    /// Id of the resident shard, if any.
    pub fn resident_shard(&self) -> Option<u32> {
        self.slot.as_ref().map(|s| s.shard)
    }

    /// Flush the resident shard, release the cache and hand out every shard
    /// in ascending id order. The index is sealed afterwards; reads keep
    /// working, writes fail with [`IndexError::Sealed`].
    pub fn finalize_for_tracing(&mut self) -> Result<ShardSet, IndexError> {
        self.coarse.shrink_to_fit();
        self.flush_resident()?;
        self.slot = None;
        self.sealed = true;
        log::info!(
            target: "shard",
            "finalized {} shards ({} loads, {} flushes)",
            self.shards.len(),
            self.stats.shard_loads,
            self.stats.shard_flushes
        );
        Ok(ShardSet::new(self.shards.files().to_vec()))
    }

    /// Coarse leaf holding (x, y, z): its cell index and coarse level.
    fn coarse_leaf(&self, x: i32, y: i32, z: i32) -> (usize, u32) {
        let mut node = 0;
        let mut level = self.coarse_depth();
        while self.coarse.is_branch(node) {
            level -= 1;
            node = self
                .coarse
                .child(node, octant(x, y, z, level + self.shard_depth));
        }
        (node, level)
    }

    /// Make the shard containing (x, y, z) resident. With `allocate`, an empty
    /// coarse leaf gets a fresh shard; without, it is reported as empty.
    fn route(&mut self, x: i32, y: i32, z: i32, allocate: bool) -> Result<Route, IndexError> {
        let (node, level) = self.coarse_leaf(x, y, z);
        let cell = self.coarse.cell(node);
        if cell == 0 {
            if !allocate {
                return Ok(Route::Empty { level });
            }
            self.allocate_shard(node, level, x, y, z)?;
            return Ok(Route::Resident);
        }

        let id = cell.unsigned_abs();
        if self.resident_shard() == Some(id) {
            return Ok(Route::Resident);
        }
        self.flush_resident()?;
        self.slot = None;
        let file = self
            .shards
            .get(id)
            .ok_or(IndexError::Malformed("coarse leaf names an unknown shard"))?;
        let tree = file.load()?;
        if tree.depth() != self.shard_depth {
            return Err(IndexError::Malformed("shard depth mismatch"));
        }
        log::debug!(target: "shard", "loaded shard {} ({} cells)", id, tree.size());
        self.stats.shard_loads += 1;
        self.slot = Some(CacheSlot {
            shard: id,
            tree,
            dirty: false,
        });
        Ok(Route::Resident)
    }

    fn allocate_shard(
        &mut self,
        node: usize,
        level: u32,
        x: i32,
        y: i32,
        z: i32,
    ) -> Result<(), IndexError> {
        let id = self.shards.next_id().ok_or(IndexError::ShardLimit)?;
        self.coarse
            .reserve_blocks(level as usize)
            .map_err(IndexError::Capacity)?;
        self.flush_resident()?;
        let file = ShardFile::create(&self.scratch_dir, id)?;
        let tree = PackedOctree::new(self.shard_depth, self.shard_center(x, y, z))?;

        // Subdivide down to the shard level so every shard spans exactly one
        // 2^shard_depth cube.
        let mut node = node;
        for level in (0..level).rev() {
            self.coarse.subdivide(node).map_err(IndexError::Capacity)?;
            node = self
                .coarse
                .child(node, octant(x, y, z, level + self.shard_depth));
        }
        self.coarse.set_cell(node, -(id as i32));
        self.shards.push(file);
        log::debug!(target: "shard", "created shard {} at ({}, {}, {})", id, x, y, z);

        self.slot = Some(CacheSlot {
            shard: id,
            tree,
            dirty: true,
        });
        Ok(())
    }

    /// World-space center of the shard cube holding (x, y, z).
    fn shard_center(&self, x: i32, y: i32, z: i32) -> [f64; 3] {
        let mask = (1u64 << self.total_depth) - 1;
        let half = (1u64 << self.shard_depth) as f64 / 2.0;
        let base = |v: i32| (((v as u32 as u64) & mask) >> self.shard_depth) << self.shard_depth;
        [
            base(x) as f64 + half,
            base(y) as f64 + half,
            base(z) as f64 + half,
        ]
    }

    fn flush_resident(&mut self) -> Result<(), IndexError> {
        let Some(slot) = self.slot.as_mut() else {
            return Ok(());
        };
        if !slot.dirty {
            return Ok(());
        }
        let file = self
            .shards
            .get(slot.shard)
            .ok_or(IndexError::Malformed("resident shard has no file"))?;
        if let Err(e) = file.store(&slot.tree) {
            log::error!(target: "shard", "flush of shard {} failed: {}", slot.shard, e);
            return Err(e.into());
        }
        slot.dirty = false;
        self.stats.shard_flushes += 1;
        log::debug!(target: "shard", "flushed shard {}", slot.shard);
        Ok(())
    }

    fn write_voxel(&mut self, voxel: VoxelType, x: i32, y: i32, z: i32) -> Result<(), IndexError> {
        if self.sealed {
            return Err(IndexError::Sealed);
        }
        if voxel > MAX_VOXEL_TYPE {
            return Err(IndexError::InvalidType(voxel));
        }
        // Air over an unallocated region changes nothing.
        let allocate = voxel != AIR;
        match self.route(x, y, z, allocate)? {
            Route::Empty { .. } => Ok(()),
            Route::Resident => {
                let Some(slot) = self.slot.as_mut() else {
                    return Ok(());
                };
                slot.tree.set(voxel, x, y, z)?;
                slot.dirty = true;
                Ok(())
            }
        }
    }

    fn read_voxel(&mut self, x: i32, y: i32, z: i32) -> Result<(VoxelType, u32), IndexError> {
        match self.route(x, y, z, false)? {
            Route::Empty { level } => Ok((AIR, level + self.shard_depth)),
            Route::Resident => Ok(self
                .slot
                .as_ref()
                .map_or((AIR, 0), |slot| slot.tree.get_with_level(x, y, z))),
        }
    }

    fn shard_nodes(&self, id: u32) -> u64 {
        if let Some(slot) = self.slot.as_ref().filter(|s| s.shard == id) {
            return slot.tree.node_count();
        }
        match self.shards.get(id).map(|f| f.load()) {
            Some(Ok(tree)) => tree.node_count(),
            Some(Err(e)) => {
                log::warn!(target: "shard", "shard {} unreadable while counting: {}", id, e);
                1
            }
            None => 1,
        }
    }
}

impl VoxelStore for ShardedVoxelIndex {
    type Error = IndexError;

    /// Capacity, shard-limit, type and sealed errors are returned; I/O
    /// failures are logged and the write is dropped.
    fn write(&mut self, voxel: VoxelType, x: i32, y: i32, z: i32) -> Result<(), IndexError> {
        match self.write_voxel(voxel, x, y, z) {
            Err(e) if !e.is_fatal() => {
                log::error!(target: "shard", "write at ({}, {}, {}) dropped: {}", x, y, z, e);
                self.stats.dropped_writes += 1;
                Ok(())
            }
            other => other,
        }
    }

    fn read(&mut self, x: i32, y: i32, z: i32) -> VoxelType {
        self.read_with_level(x, y, z).0
    }

    /// An unallocated region reports the level of its coarse leaf in voxel
    /// units; inside a shard the in-shard leaf level is reported.
    fn read_with_level(&mut self, x: i32, y: i32, z: i32) -> (VoxelType, u32) {
        match self.read_voxel(x, y, z) {
            Ok(found) => found,
            Err(e) => {
                log::error!(target: "shard", "read at ({}, {}, {}) failed: {}", x, y, z, e);
                self.stats.failed_reads += 1;
                (AIR, 0)
            }
        }
    }

    fn total_depth(&self) -> u32 {
        self.total_depth
    }

    /// Coarse branches and empty coarse leaves plus the nodes of every shard.
    fn node_count(&mut self) -> u64 {
        self.coarse.count_nodes(0, &|cell| {
            if cell == 0 {
                1
            } else {
                self.shard_nodes(cell.unsigned_abs())
            }
        })
    }
}
