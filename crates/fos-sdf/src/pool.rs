//! Bounded pool of raster contexts
//!
//! At most `max_contexts` jobs hold a context at once; further callers wait
//! on the semaphore. Contexts rotate through an idle queue and are dropped
//! once the pool has had no outstanding work for `idle_timeout`.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use smol::lock::Semaphore;

use crate::encode::TileJob;
use crate::raster::{RasterBackend, RasterContext};
use crate::{Result, SdfError};

struct IdleContext {
    context: Box<dyn RasterContext>,
    since: Instant,
}

/// Decrements the outstanding counter when a request finishes
struct Outstanding<'a>(&'a AtomicUsize);

impl Drop for Outstanding<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

pub struct ContextPool {
    backend: Arc<dyn RasterBackend>,
    permits: Semaphore,
    idle: Mutex<VecDeque<IdleContext>>,
    outstanding: AtomicUsize,
    created: AtomicUsize,
    idle_timeout: Duration,
}

impl std::fmt::Debug for ContextPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextPool")
            .field("backend", &self.backend.name())
            .field("idle", &self.idle_count())
            .field("outstanding", &self.outstanding())
            .finish()
    }
}

impl ContextPool {
    pub fn new(backend: Arc<dyn RasterBackend>, max_contexts: usize, idle_timeout: Duration) -> Self {
        Self {
            backend,
            permits: Semaphore::new(max_contexts.max(1)),
            idle: Mutex::new(VecDeque::new()),
            outstanding: AtomicUsize::new(0),
            created: AtomicUsize::new(0),
            idle_timeout,
        }
    }

    pub fn backend(&self) -> &Arc<dyn RasterBackend> {
        &self.backend
    }

    fn idle(&self) -> MutexGuard<'_, VecDeque<IdleContext>> {
        self.idle.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Rasterize on a pooled context, off the calling task.
    ///
    /// A context that reports [`SdfError::ContextLost`] is discarded.
    pub async fn rasterize(&self, job: TileJob) -> Result<Vec<u8>> {
        let _permit = self.permits.acquire().await;
        self.outstanding.fetch_add(1, Ordering::AcqRel);
        let _outstanding = Outstanding(&self.outstanding);

        let pooled = self.idle().pop_front();
        let mut context = match pooled {
            Some(idle) => idle.context,
            None => {
                let context = self.backend.create_context()?;
                self.created.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(backend = self.backend.name(), "raster context created");
                context
            }
        };

        let (context, result) = smol::unblock(move || {
            let result = context.rasterize(&job);
            (context, result)
        })
        .await;

        if !matches!(result, Err(SdfError::ContextLost)) {
            self.idle().push_back(IdleContext { context, since: Instant::now() });
        }
        result
    }

    /// Drop contexts idle past the timeout, but only while nothing is
    /// outstanding. Returns how many were released.
    pub fn release_idle(&self) -> usize {
        self.release_idle_at(Instant::now())
    }

    pub fn release_idle_at(&self, now: Instant) -> usize {
        if self.outstanding() > 0 {
            return 0;
        }
        let mut idle = self.idle();
        let before = idle.len();
        idle.retain(|c| now.saturating_duration_since(c.since) < self.idle_timeout);
        let released = before - idle.len();
        if released > 0 {
            tracing::debug!(released, "idle raster contexts released");
        }
        released
    }

    /// Drop every idle context (device loss)
    pub fn clear(&self) {
        self.idle().clear();
    }

    pub fn idle_count(&self) -> usize {
        self.idle().len()
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }

    /// Contexts created over the pool's lifetime
    pub fn created(&self) -> usize {
        self.created.load(Ordering::Relaxed)
    }
}
