//! Fixed-size worker pool shared by every phase of a run.
//!
//! Each phase splits its collection into `workers` contiguous index ranges,
//! runs one task per range and waits for all of them before returning. That
//! return is the barrier between phases.

use crate::config::FailurePolicy;
use crate::error::{Error, Result};
use std::any::Any;
use std::fmt;
use std::ops::Range;
use std::panic::{self, AssertUnwindSafe};
use tracing::{error, warn};

/// The parallel passes of one step, used to label tasks in logs and errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Swap,
    Tree,
    Repulsion,
    Attraction,
    Reduce,
    Speed,
    Integrate,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Swap => "swap",
            Phase::Tree => "tree",
            Phase::Repulsion => "repulsion",
            Phase::Attraction => "attraction",
            Phase::Reduce => "reduce",
            Phase::Speed => "speed",
            Phase::Integrate => "integrate",
        };
        f.write_str(name)
    }
}

/// Splits `0..len` into `workers` contiguous, non-overlapping ranges.
///
/// Range `t` is `floor(len * t / workers)..floor(len * (t + 1) / workers)`;
/// some ranges are empty when `len < workers`.
pub fn worker_ranges(len: usize, workers: usize) -> Vec<Range<usize>> {
    let workers = workers.max(1);
    (0..workers)
        .map(|t| (len * t / workers)..(len * (t + 1) / workers))
        .collect()
}

/// Cuts `items` into one mutable chunk per range. Ranges must be contiguous
/// and start at 0.
fn split_chunks_mut<'a, T>(mut items: &'a mut [T], ranges: &[Range<usize>]) -> Vec<&'a mut [T]> {
    let mut chunks = Vec::with_capacity(ranges.len());
    for r in ranges {
        let (head, tail) = std::mem::take(&mut items).split_at_mut(r.len());
        chunks.push(head);
        items = tail;
    }
    chunks
}

type Slot<R> = Option<std::thread::Result<R>>;

pub struct WorkerPool {
    pool: rayon::ThreadPool,
    workers: usize,
    policy: FailurePolicy,
}

impl WorkerPool {
    pub fn new(workers: usize, policy: FailurePolicy) -> Result<Self> {
        let workers = workers.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("fa2-worker-{i}"))
            .build()?;
        Ok(Self {
            pool,
            workers,
            policy,
        })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    pub fn ranges(&self, len: usize) -> Vec<Range<usize>> {
        worker_ranges(len, self.workers)
    }

    /// Runs `f` once per contiguous chunk of `items`, in parallel.
    ///
    /// Each task gets the index range of its chunk and exclusive access to
    /// it. Results come back in range order.
    pub fn for_each_chunk<T, R, F>(&self, phase: Phase, items: &mut [T], f: F) -> Result<Vec<R>>
    where
        T: Send,
        R: Send,
        F: Fn(Range<usize>, &mut [T]) -> R + Sync,
    {
        if items.is_empty() {
            return Ok(Vec::new());
        }
        let ranges = self.ranges(items.len());
        let chunks = split_chunks_mut(items, &ranges);
        let mut slots: Vec<Slot<R>> = ranges.iter().map(|_| None).collect();

        self.pool.scope(|s| {
            for ((range, chunk), slot) in ranges.iter().cloned().zip(chunks).zip(slots.iter_mut()) {
                let f = &f;
                s.spawn(move |_| {
                    *slot = Some(panic::catch_unwind(AssertUnwindSafe(|| f(range, chunk))));
                });
            }
        });

        self.collect(phase, &ranges, slots)
    }

    /// Runs `f` once per index range of `0..len`, in parallel, with no
    /// mutable access to shared data.
    pub fn map_ranges<R, F>(&self, phase: Phase, len: usize, f: F) -> Result<Vec<R>>
    where
        R: Send,
        F: Fn(Range<usize>) -> R + Sync,
    {
        if len == 0 {
            return Ok(Vec::new());
        }
        let ranges = self.ranges(len);
        let mut slots: Vec<Slot<R>> = ranges.iter().map(|_| None).collect();

        self.pool.scope(|s| {
            for (range, slot) in ranges.iter().cloned().zip(slots.iter_mut()) {
                let f = &f;
                s.spawn(move |_| {
                    *slot = Some(panic::catch_unwind(AssertUnwindSafe(|| f(range))));
                });
            }
        });

        self.collect(phase, &ranges, slots)
    }

    fn collect<R>(&self, phase: Phase, ranges: &[Range<usize>], slots: Vec<Slot<R>>) -> Result<Vec<R>> {
        let mut results = Vec::with_capacity(slots.len());
        for (range, slot) in ranges.iter().zip(slots) {
            match slot {
                Some(Ok(r)) => results.push(r),
                Some(Err(payload)) => {
                    error!(
                        %phase,
                        start = range.start,
                        end = range.end,
                        message = panic_message(payload.as_ref()),
                        "worker task panicked"
                    );
                    self.on_failure(phase, range)?;
                }
                None => self.on_failure(phase, range)?,
            }
        }
        Ok(results)
    }

    fn on_failure(&self, phase: Phase, range: &Range<usize>) -> Result<()> {
        match self.policy {
            FailurePolicy::FailFast => Err(Error::WorkerPanicked {
                phase,
                start: range.start,
                end: range.end,
            }),
            FailurePolicy::BestEffort => {
                warn!(%phase, start = range.start, end = range.end, "dropping contributions of failed task");
                Ok(())
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}
