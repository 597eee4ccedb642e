use std::io;

use strata_octree::OctreeError;

#[derive(Debug)]
pub enum IndexError {
    /// A cell array (coarse index or shard) hit its hard ceiling.
    Capacity(OctreeError),
    /// No more shard ids can be assigned.
    ShardLimit,
    InvalidDepth(u32),
    InvalidType(u32),
    /// A shard file decoded to something that is not a valid tree.
    Malformed(&'static str),
    Io(io::Error),
    /// The sharded index cannot be rebuilt from a stream.
    Unsupported,
    /// The index was finalized for tracing and no longer accepts writes.
    Sealed,
}

impl From<io::Error> for IndexError {
    fn from(e: io::Error) -> Self {
        IndexError::Io(e)
    }
}

impl From<OctreeError> for IndexError {
    fn from(e: OctreeError) -> Self {
        match e {
            OctreeError::Io(e) => IndexError::Io(e),
            OctreeError::InvalidDepth(d) => IndexError::InvalidDepth(d),
            OctreeError::InvalidType(t) => IndexError::InvalidType(t),
            OctreeError::Malformed(msg) => IndexError::Malformed(msg),
            e @ OctreeError::Capacity { .. } => IndexError::Capacity(e),
        }
    }
}

impl IndexError {
    /// Errors the caller must see; everything else is logged and the access
    /// abandoned.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            IndexError::Capacity(_)
                | IndexError::ShardLimit
                | IndexError::InvalidType(_)
                | IndexError::Sealed
        )
    }
}

impl std::fmt::Display for IndexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IndexError::Capacity(e) => write!(f, "index capacity exceeded: {}", e),
            IndexError::ShardLimit => write!(f, "shard id space exhausted"),
            IndexError::InvalidDepth(d) => write!(f, "invalid index depth {}", d),
            IndexError::InvalidType(t) => write!(f, "voxel type {} out of range", t),
            IndexError::Malformed(msg) => write!(f, "malformed shard: {}", msg),
            IndexError::Io(e) => write!(f, "shard i/o: {}", e),
            IndexError::Unsupported => write!(f, "sharded index cannot be loaded from a stream"),
            IndexError::Sealed => write!(f, "index is finalized for tracing"),
        }
    }
}

impl std::error::Error for IndexError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            IndexError::Capacity(e) => Some(e),
            IndexError::Io(e) => Some(e),
            _ => None,
        }
    }
}
