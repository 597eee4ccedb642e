//! Out-of-core voxel index: a coarse octree of shard ids over gzip shard
//! files, with one resident shard cached for writes and reads.
#![forbid(unsafe_code)]

pub mod error;
pub mod file;
pub mod index;

pub use error::IndexError;
pub use file::{MAX_SHARDS, ShardFile, ShardSet, ShardTable};
pub use index::{DEFAULT_SHARD_DEPTH, IndexConfig, IndexStats, ShardedVoxelIndex};
