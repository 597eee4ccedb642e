use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, bounded, select, unbounded};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use strata_geom::Vec3;
use strata_octree::{MaterialResolver, OctreeError, PackedOctree, TraceRay};
use strata_shard::{ShardFile, ShardSet};

use crate::queue::DEFAULT_MAX_PENDING;

/// How rays are placed relative to a shard's tree while marching it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ShardFrame {
    /// Rays are tested against `[0, 2^shard_depth)` in world coordinates.
    /// Shard addressing only reads the low coordinate bits, so every shard
    /// is effectively traced as if it sat at the origin.
    #[default]
    Absolute,
    /// Rays are moved into the shard's local frame, derived from the center
    /// stored with the shard, so each shard is hit where it was written.
    Local,
}

#[derive(Clone, Debug)]
pub struct TraceConfig {
    /// Intersection lanes; 0 picks the available parallelism.
    pub threads: usize,
    /// Soft cap on rays waiting in the staging queue.
    pub max_pending_rays: usize,
    /// Most rays claimed as one batch.
    pub max_batch_rays: usize,
    pub frame: ShardFrame,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            threads: 0,
            max_pending_rays: DEFAULT_MAX_PENDING,
            max_batch_rays: DEFAULT_MAX_PENDING,
            frame: ShardFrame::Absolute,
        }
    }
}

impl TraceConfig {
    pub fn worker_threads(&self) -> usize {
        if self.threads > 0 {
            return self.threads;
        }
        thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(8)
    }
}

#[derive(Debug)]
pub enum TraceError {
    /// Tracing was cancelled; the batch is incomplete.
    Interrupted,
    /// The loader thread is gone.
    LoaderLost,
    Pool(rayon::ThreadPoolBuildError),
    Spawn(std::io::Error),
}

impl std::fmt::Display for TraceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TraceError::Interrupted => write!(f, "tracing interrupted"),
            TraceError::LoaderLost => write!(f, "shard loader thread exited"),
            TraceError::Pool(e) => write!(f, "worker pool: {}", e),
            TraceError::Spawn(e) => write!(f, "thread spawn: {}", e),
        }
    }
}

impl std::error::Error for TraceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TraceError::Pool(e) => Some(e),
            TraceError::Spawn(e) => Some(e),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TraceStats {
    pub batches: u64,
    pub rays: u64,
    pub shards_traced: u64,
    pub failed_loads: u64,
}

/// Cancels a tracer from any thread. Cancellation is permanent.
#[derive(Clone, Debug)]
pub struct TraceInterrupt {
    flag: Arc<AtomicBool>,
    stop_tx: Sender<()>,
}

impl TraceInterrupt {
    pub fn interrupt(&self) {
        self.flag.store(true, Ordering::Release);
        // Wakes a tracer blocked on the loader; a full slot already does.
        let _ = self.stop_tx.try_send(());
    }

    pub fn is_interrupted(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

struct Loaded {
    shard: u32,
    result: Result<PackedOctree, OctreeError>,
}

/// Sweeps every shard over a batch of rays, loading shard `i + 1` on a
/// background thread while shard `i` is intersected on the worker pool.
///
/// Rays keep the nearest hit over all shards. With [`ShardFrame::Local`],
/// resolvers see probe origins in the shard's local frame.
pub struct ShardPipelineTracer {
    shards: ShardSet,
    resolver: Arc<dyn MaterialResolver>,
    pool: ThreadPool,
    threads: usize,
    frame: ShardFrame,
    load_tx: Option<Sender<Arc<ShardFile>>>,
    ready_rx: Receiver<Loaded>,
    stop_rx: Receiver<()>,
    interrupt: TraceInterrupt,
    loader: Option<JoinHandle<()>>,
    stats: TraceStats,
}

impl ShardPipelineTracer {
    pub fn new(
        shards: ShardSet,
        resolver: Arc<dyn MaterialResolver>,
        config: &TraceConfig,
    ) -> Result<Self, TraceError> {
        let threads = config.worker_threads();
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("strata-trace-{i}"))
            .build()
            .map_err(TraceError::Pool)?;

        let (load_tx, load_rx) = unbounded::<Arc<ShardFile>>();
        let (ready_tx, ready_rx) = bounded::<Loaded>(1);
        let loader = thread::Builder::new()
            .name("strata-loader".into())
            .spawn(move || {
                while let Ok(file) = load_rx.recv() {
                    let loaded = Loaded {
                        shard: file.id(),
                        result: file.load(),
                    };
                    if ready_tx.send(loaded).is_err() {
                        break;
                    }
                }
            })
            .map_err(TraceError::Spawn)?;

        let (stop_tx, stop_rx) = bounded::<()>(1);
        log::info!(
            target: "trace",
            "tracer ready: {} shards, {} lanes, {:?} frame",
            shards.len(),
            threads,
            config.frame
        );
        Ok(Self {
            shards,
            resolver,
            pool,
            threads,
            frame: config.frame,
            load_tx: Some(load_tx),
            ready_rx,
            stop_rx,
            interrupt: TraceInterrupt {
                flag: Arc::new(AtomicBool::new(false)),
                stop_tx,
            },
            loader: Some(loader),
            stats: TraceStats::default(),
        })
    }

    pub fn interrupt_handle(&self) -> TraceInterrupt {
        self.interrupt.clone()
    }

    pub fn stats(&self) -> TraceStats {
        self.stats
    }

    #[inline]
    pub fn threads(&self) -> usize {
        self.threads
    }

    fn request(&self, index: usize) -> Result<(), TraceError> {
        let (Some(tx), Some(file)) = (self.load_tx.as_ref(), self.shards.get(index)) else {
            return Err(TraceError::LoaderLost);
        };
        tx.send(file.clone()).map_err(|_| TraceError::LoaderLost)
    }

    /// Intersect `rays` against every shard in ascending id order.
    ///
    /// On [`TraceError::Interrupted`] the rays hold partial results and must
    /// not be published.
    pub fn trace_batch(&mut self, rays: &mut [TraceRay]) -> Result<(), TraceError> {
        if self.interrupt.is_interrupted() {
            return Err(TraceError::Interrupted);
        }
        if rays.is_empty() || self.shards.is_empty() {
            return Ok(());
        }

        let n = self.shards.len();
        let ray_count = rays.len();
        let threads = self.threads;
        let mut lanes: Vec<Vec<&mut TraceRay>> = (0..threads).map(|_| Vec::new()).collect();
        for (i, ray) in rays.iter_mut().enumerate() {
            lanes[i % threads].push(ray);
        }

        self.request(0)?;
        for i in 0..n {
            if self.interrupt.is_interrupted() {
                return Err(TraceError::Interrupted);
            }
            let loaded = select! {
                recv(self.ready_rx) -> msg => msg.map_err(|_| TraceError::LoaderLost)?,
                recv(self.stop_rx) -> _ => return Err(TraceError::Interrupted),
            };
            if i + 1 < n {
                self.request(i + 1)?;
            }
            match loaded.result {
                Ok(tree) => {
                    self.trace_shard(&tree, &mut lanes);
                    self.stats.shards_traced += 1;
                }
                Err(e) => {
                    log::error!(target: "trace", "shard {} skipped: {}", loaded.shard, e);
                    self.stats.failed_loads += 1;
                }
            }
        }

        self.stats.batches += 1;
        self.stats.rays += ray_count as u64;
        log::debug!(target: "trace", "batch of {} rays over {} shards", ray_count, n);
        Ok(())
    }

    fn trace_shard(&self, tree: &PackedOctree, lanes: &mut [Vec<&mut TraceRay>]) {
        let base = match self.frame {
            ShardFrame::Absolute => Vec3::ZERO,
            ShardFrame::Local => {
                let half = (tree.extent() / 2) as f64;
                let [cx, cy, cz] = tree.center();
                Vec3::new((cx - half) as f32, (cy - half) as f32, (cz - half) as f32)
            }
        };
        let resolver = self.resolver.as_ref();
        self.pool.install(|| {
            lanes.par_iter_mut().for_each(|lane| {
                for ray in lane.iter_mut() {
                    let world = ray.origin;
                    ray.origin = world - base;
                    tree.intersect(ray, resolver);
                    ray.origin = world;
                }
            })
        });
    }

    /// Stop the loader thread and wait for it.
    pub fn shutdown(&mut self) {
        self.interrupt.interrupt();
        self.load_tx = None;
        if let Some(handle) = self.loader.take() {
            if handle.join().is_err() {
                log::error!(target: "trace", "shard loader panicked");
            }
        }
    }
}

impl Drop for ShardPipelineTracer {
    fn drop(&mut self) {
        self.shutdown();
    }
}
