//! Time-sliced FIFO for software rasterization
//!
//! Jobs queue up without limit. Each drain tick runs jobs until its time
//! slice is spent (always at least one), then returns so the host stays
//! responsive. [`TimeSlicedScheduler::run_until_idle`] repeats ticks and
//! yields to the executor in between.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::encode::TileJob;

/// Outcome of one drain tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DrainStats {
    pub processed: usize,
    pub remaining: usize,
}

#[derive(Debug)]
pub struct TimeSlicedScheduler {
    queue: Mutex<VecDeque<TileJob>>,
    time_slice: Duration,
}

impl TimeSlicedScheduler {
    pub fn new(time_slice: Duration) -> Self {
        Self { queue: Mutex::new(VecDeque::new()), time_slice }
    }

    fn queue(&self) -> std::sync::MutexGuard<'_, VecDeque<TileJob>> {
        self.queue.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn push(&self, job: TileJob) {
        self.queue().push_back(job);
    }

    /// Put a job back at the head, ahead of newer work
    pub fn push_front(&self, job: TileJob) {
        self.queue().push_front(job);
    }

    pub fn pop(&self) -> Option<TileJob> {
        self.queue().pop_front()
    }

    pub fn len(&self) -> usize {
        self.queue().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue().is_empty()
    }

    /// Remove every queued job
    pub fn take_all(&self) -> Vec<TileJob> {
        self.queue().drain(..).collect()
    }

    /// Run queued jobs for one time slice.
    ///
    /// `run` returns `false` to stop the tick early; the job it was given is
    /// considered consumed.
    pub fn drain_tick(&self, mut run: impl FnMut(TileJob) -> bool) -> DrainStats {
        let start = Instant::now();
        let mut processed = 0;
        loop {
            // lock released before running the job
            let next = self.queue().pop_front();
            let Some(job) = next else { break };
            processed += 1;
            if !run(job) || start.elapsed() >= self.time_slice {
                break;
            }
        }
        DrainStats { processed, remaining: self.len() }
    }

    /// Drain tick after tick, yielding between them, until the queue is empty
    /// or `run` asks to stop.
    pub async fn run_until_idle(&self, mut run: impl FnMut(TileJob) -> bool) -> usize {
        let mut total = 0;
        let mut stopped = false;
        loop {
            let stats = self.drain_tick(|job| {
                let keep_going = run(job);
                stopped |= !keep_going;
                keep_going
            });
            total += stats.processed;
            if stopped || stats.remaining == 0 {
                break;
            }
            smol::future::yield_now().await;
        }
        tracing::debug!(total, "software drain idle");
        total
    }
}
