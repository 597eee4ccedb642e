//! Pipelined shard ray tracing: a bounded staging queue for rays and a
//! tracer that prefetches shard `i + 1` while intersecting shard `i`.
#![forbid(unsafe_code)]

pub mod pipeline;
pub mod queue;
pub mod tracer;

pub use pipeline::TracePipeline;
pub use queue::{DEFAULT_MAX_PENDING, QueueClosed, RayStagingQueue};
pub use tracer::{
    ShardFrame, ShardPipelineTracer, TraceConfig, TraceError, TraceInterrupt, TraceStats,
};
