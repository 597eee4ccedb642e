use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError, TryLockError};

use strata_octree::TraceRay;

/// Default soft cap on rays waiting to be traced.
pub const DEFAULT_MAX_PENDING: usize = 1 << 24;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueueClosed;

impl std::fmt::Display for QueueClosed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ray queue is closed")
    }
}

impl std::error::Error for QueueClosed {}

#[derive(Default)]
struct QueueState {
    waiting: VecDeque<TraceRay>,
    completed: Vec<TraceRay>,
    /// A claimed batch has not been completed or abandoned yet.
    tracing: bool,
    closed: bool,
}

/// Staging area between the host, which submits and collects rays, and the
/// trace driver, which claims them in batches.
///
/// Every state change happens under one lock, so a ray counts toward the cap
/// until the driver claims it.
pub struct RayStagingQueue {
    state: Mutex<QueueState>,
    /// Signalled when rays arrive or the queue closes.
    work: Condvar,
    /// Signalled when pending rays are claimed or the queue closes.
    space: Condvar,
    max_pending: usize,
    max_batch: usize,
}

impl RayStagingQueue {
    pub fn new(max_pending: usize, max_batch: usize) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            work: Condvar::new(),
            space: Condvar::new(),
            max_pending: max_pending.max(1),
            max_batch: max_batch.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[inline]
    pub fn max_pending(&self) -> usize {
        self.max_pending
    }

    #[inline]
    pub fn max_batch(&self) -> usize {
        self.max_batch
    }

    /// Queue one ray, blocking while the pending count is at the cap.
    pub fn submit(&self, ray: TraceRay) -> Result<(), QueueClosed> {
        let mut state = self.lock();
        while !state.closed && state.waiting.len() >= self.max_pending {
            state = self.space.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
        if state.closed {
            return Err(QueueClosed);
        }
        state.waiting.push_back(ray);
        drop(state);
        self.work.notify_one();
        Ok(())
    }

    /// Queue rays in order; returns how many were queued.
    pub fn submit_batch<I>(&self, rays: I) -> Result<usize, QueueClosed>
    where
        I: IntoIterator<Item = TraceRay>,
    {
        let mut n = 0;
        for ray in rays {
            self.submit(ray)?;
            n += 1;
        }
        Ok(n)
    }

    /// Nothing pending and no batch in flight. A contended lock counts as busy.
    pub fn is_idle(&self) -> bool {
        let state = match self.state.try_lock() {
            Ok(state) => state,
            Err(TryLockError::Poisoned(p)) => p.into_inner(),
            Err(TryLockError::WouldBlock) => return false,
        };
        state.waiting.is_empty() && !state.tracing
    }

    pub fn pending(&self) -> usize {
        self.lock().waiting.len()
    }

    /// Driver side: wait for pending rays and claim up to `max_batch` of
    /// them. `None` once the queue is closed.
    pub fn take_batch(&self) -> Option<Vec<TraceRay>> {
        let mut state = self.lock();
        while !state.closed && state.waiting.is_empty() {
            state = self.work.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
        if state.closed {
            return None;
        }
        let n = state.waiting.len().min(self.max_batch);
        let batch: Vec<TraceRay> = state.waiting.drain(..n).collect();
        state.tracing = true;
        drop(state);
        self.space.notify_all();
        Some(batch)
    }

    /// Publish a traced batch and clear the in-flight mark.
    pub fn complete_batch(&self, rays: Vec<TraceRay>) {
        let mut state = self.lock();
        state.completed.extend(rays);
        state.tracing = false;
    }

    /// Clear the in-flight mark without publishing anything.
    pub fn abandon_batch(&self) {
        self.lock().tracing = false;
    }

    /// Host side: take every completed ray, leaving an empty buffer behind.
    pub fn drain_completed(&self) -> Vec<TraceRay> {
        std::mem::take(&mut self.lock().completed)
    }

    /// Wake every waiter; later submits fail and the driver stops taking work.
    pub fn close(&self) {
        self.lock().closed = true;
        self.work.notify_all();
        self.space.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}

impl Default for RayStagingQueue {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PENDING, DEFAULT_MAX_PENDING)
    }
}
