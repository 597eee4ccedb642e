use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use strata_octree::{OctreeError, PackedOctree};
use tempfile::TempPath;

/// Largest assignable shard id; ids are stored negated in `i32` cells.
pub const MAX_SHARDS: u32 = i32::MAX as u32;

/// Gzip-compressed backing file of one shard.
///
/// The file lives in the scratch directory and is removed when the last
/// handle to it is dropped.
#[derive(Debug)]
pub struct ShardFile {
    id: u32,
    path: TempPath,
}

impl ShardFile {
    pub fn create(dir: &Path, id: u32) -> io::Result<Self> {
        let path = tempfile::Builder::new()
            .prefix(&format!("shard-{:05}-", id))
            .suffix(".oct.gz")
            .tempfile_in(dir)?
            .into_temp_path();
        Ok(Self { id, path })
    }

    #[inline]
    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Overwrite the file with `tree`.
    pub fn store(&self, tree: &PackedOctree) -> Result<(), OctreeError> {
        let file = File::create(&self.path)?;
        let mut gz = GzEncoder::new(BufWriter::new(file), Compression::fast());
        tree.store(&mut gz)?;
        let mut out = gz.finish()?;
        out.flush()?;
        Ok(())
    }

    pub fn load(&self) -> Result<PackedOctree, OctreeError> {
        let file = File::open(&self.path)?;
        let mut gz = GzDecoder::new(BufReader::new(file));
        PackedOctree::load(&mut gz)
    }
}

/// Shard id `k` to backing file `k`; id 0 is never assigned.
#[derive(Debug, Default)]
pub struct ShardTable {
    files: Vec<Arc<ShardFile>>,
}

impl ShardTable {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn get(&self, id: u32) -> Option<&Arc<ShardFile>> {
        let index = (id as usize).checked_sub(1)?;
        self.files.get(index)
    }

    /// Id the next [`ShardTable::push`] will assign, if any is left.
    pub fn next_id(&self) -> Option<u32> {
        let next = self.files.len() as u64 + 1;
        (next <= MAX_SHARDS as u64).then_some(next as u32)
    }

    pub fn push(&mut self, file: ShardFile) {
        debug_assert_eq!(Some(file.id()), self.next_id());
        self.files.push(Arc::new(file));
    }

    /// Files in ascending id order.
    pub fn files(&self) -> &[Arc<ShardFile>] {
        &self.files
    }
}

/// Read-only, ordered view of every shard, handed to the tracer.
///
/// Clones share the underlying files, which stay on disk while any clone or
/// the originating index is alive.
#[derive(Clone, Debug, Default)]
pub struct ShardSet {
    files: Arc<[Arc<ShardFile>]>,
}

impl ShardSet {
    pub fn new(files: Vec<Arc<ShardFile>>) -> Self {
        Self {
            files: files.into(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Arc<ShardFile>> {
        self.files.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<ShardFile>> {
        self.files.iter()
    }
}
