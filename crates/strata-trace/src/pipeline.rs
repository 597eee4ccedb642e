use std::sync::Arc;
use std::thread::{self, JoinHandle};

use strata_octree::{MaterialResolver, TraceRay};
use strata_shard::ShardSet;

use crate::queue::{QueueClosed, RayStagingQueue};
use crate::tracer::{ShardPipelineTracer, TraceConfig, TraceError, TraceInterrupt, TraceStats};

/// Host-facing tracing service: a staging queue drained by a driver thread
/// that runs each claimed batch through a [`ShardPipelineTracer`].
pub struct TracePipeline {
    queue: Arc<RayStagingQueue>,
    interrupt: TraceInterrupt,
    driver: Option<JoinHandle<TraceStats>>,
}

impl TracePipeline {
    pub fn start(
        shards: ShardSet,
        resolver: Arc<dyn MaterialResolver>,
        config: TraceConfig,
    ) -> Result<Self, TraceError> {
        let queue = Arc::new(RayStagingQueue::new(
            config.max_pending_rays,
            config.max_batch_rays,
        ));
        let mut tracer = ShardPipelineTracer::new(shards, resolver, &config)?;
        let interrupt = tracer.interrupt_handle();

        let driver_queue = queue.clone();
        let driver = thread::Builder::new()
            .name("strata-driver".into())
            .spawn(move || {
                drive(&driver_queue, &mut tracer);
                tracer.stats()
            })
            .map_err(TraceError::Spawn)?;

        Ok(Self {
            queue,
            interrupt,
            driver: Some(driver),
        })
    }

    pub fn queue(&self) -> &Arc<RayStagingQueue> {
        &self.queue
    }

    pub fn submit(&self, ray: TraceRay) -> Result<(), QueueClosed> {
        self.queue.submit(ray)
    }

    pub fn submit_batch<I>(&self, rays: I) -> Result<usize, QueueClosed>
    where
        I: IntoIterator<Item = TraceRay>,
    {
        self.queue.submit_batch(rays)
    }

    pub fn is_idle(&self) -> bool {
        self.queue.is_idle()
    }

    pub fn drain_completed(&self) -> Vec<TraceRay> {
        self.queue.drain_completed()
    }

    /// Cancel tracing, close the queue and join the driver. Returns the
    /// driver's totals the first time it is called.
    pub fn shutdown(&mut self) -> Option<TraceStats> {
        let handle = self.driver.take()?;
        self.interrupt.interrupt();
        self.queue.close();
        match handle.join() {
            Ok(stats) => {
                log::info!(
                    target: "trace",
                    "driver stopped after {} batches ({} rays)",
                    stats.batches,
                    stats.rays
                );
                Some(stats)
            }
            Err(_) => {
                log::error!(target: "trace", "trace driver panicked");
                None
            }
        }
    }
}

impl Drop for TracePipeline {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn drive(queue: &RayStagingQueue, tracer: &mut ShardPipelineTracer) {
    while let Some(mut batch) = queue.take_batch() {
        match tracer.trace_batch(&mut batch) {
            Ok(()) => queue.complete_batch(batch),
            Err(TraceError::Interrupted) => {
                log::debug!(target: "trace", "dropping interrupted batch of {} rays", batch.len());
                queue.abandon_batch();
                break;
            }
            Err(e) => {
                log::error!(target: "trace", "batch of {} rays lost: {}", batch.len(), e);
                queue.abandon_batch();
                break;
            }
        }
    }
    queue.close();
}
