//! Concurrent execution of a prepared workload.
//!
//! The operation count is split over the worker threads up front. Every
//! worker owns one backend handle and claims operation indices from a shared
//! atomic counter, so each index in `[0, operations)` is executed exactly
//! once. A failing (or panicking) operation is recorded and the worker moves
//! on; nothing short of a connection failure aborts the run.

use crate::adapters::{GraphBackend, ScopedHandle};
use crate::stats;
use crate::workloads::Execute;
use crate::{BenchError, BenchResult, RunResult};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Nanosecond time source used for both per-operation latency and total
/// run time.
pub trait Clock: Sync {
    fn now_ns(&self) -> u64;
}

/// `Instant`-backed clock.
pub struct MonotonicClock {
    origin: Instant,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Clock for MonotonicClock {
    fn now_ns(&self) -> u64 {
        self.origin.elapsed().as_nanos() as u64
    }
}

/// Operations per thread: the first `ops % threads` threads take one extra.
pub fn partition(operations: usize, threads: usize) -> Vec<usize> {
    if threads == 0 {
        return Vec::new();
    }
    let base = operations / threads;
    let rem = operations % threads;
    (0..threads).map(|t| base + usize::from(t < rem)).collect()
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "<non-string panic payload>".to_string()
    }
}

pub struct Runner<C: Clock = MonotonicClock> {
    clock: C,
}

impl Runner {
    pub fn new() -> Self {
        Self::with_clock(MonotonicClock::default())
    }
}

impl Default for Runner {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> Runner<C> {
    pub fn with_clock(clock: C) -> Self {
        Self { clock }
    }

    /// Execute `operations` operations of `exec` over `threads` workers.
    ///
    /// One handle per worker is cloned from `template` before the clock
    /// starts; all of them are closed before this returns.
    pub fn run(
        &self,
        exec: &dyn Execute,
        template: &dyn GraphBackend,
        operations: usize,
        threads: usize,
    ) -> BenchResult<RunResult> {
        if threads == 0 {
            return Err(BenchError::Config("thread count must be at least 1".into()));
        }
        let shares = partition(operations, threads);

        let mut handles = Vec::with_capacity(threads);
        for t in 0..threads {
            match template.clone_for_thread() {
                Ok(h) => handles.push(ScopedHandle::new(h)),
                Err(e) => {
                    tracing::error!(thread = t, error = %e, "failed to open worker connection");
                    return Err(e);
                }
            }
        }

        let latencies: Vec<AtomicU64> = (0..operations).map(|_| AtomicU64::new(0)).collect();
        let next_index = AtomicUsize::new(0);
        let succeeded = AtomicUsize::new(0);
        let failed = AtomicUsize::new(0);

        tracing::info!(
            backend = template.name(),
            operations,
            threads,
            "starting timed run"
        );
        let started = self.clock.now_ns();

        std::thread::scope(|s| -> BenchResult<()> {
            for (t, (mut handle, share)) in handles.into_iter().zip(shares).enumerate() {
                let clock = &self.clock;
                let latencies = &latencies;
                let next_index = &next_index;
                let succeeded = &succeeded;
                let failed = &failed;

                std::thread::Builder::new()
                    .name(format!("graph-bench-worker-{}", t))
                    .spawn_scoped(s, move || {
                        for _ in 0..share {
                            let index = next_index.fetch_add(1, Ordering::Relaxed);

                            let begin = clock.now_ns();
                            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                                exec.execute_once(&mut *handle, index)
                            }))
                            .unwrap_or_else(|payload| {
                                Err(BenchError::Operation(panic_message(payload)))
                            });
                            let end = clock.now_ns();

                            if let Some(slot) = latencies.get(index) {
                                slot.store(end.saturating_sub(begin), Ordering::Relaxed);
                            }
                            match outcome {
                                Ok(()) => {
                                    succeeded.fetch_add(1, Ordering::Relaxed);
                                }
                                Err(e) => {
                                    failed.fetch_add(1, Ordering::Relaxed);
                                    tracing::debug!(index, error = %e, "operation failed");
                                }
                            }
                        }
                        // `handle` drops here and closes the connection.
                    })?;
            }
            Ok(())
        })?;

        let elapsed = Duration::from_nanos(self.clock.now_ns().saturating_sub(started));

        let mut samples: Vec<u64> = latencies.into_iter().map(AtomicU64::into_inner).collect();
        let summary = stats::summarize(&mut samples, elapsed);

        let result = RunResult {
            total_ops: summary.count,
            total_time: elapsed,
            throughput_ops_per_sec: summary.throughput,
            avg_latency_us: summary.mean_us(),
            p50_latency_us: summary.p50_ns / 1_000,
            p95_latency_us: summary.p95_ns / 1_000,
            p99_latency_us: summary.p99_ns / 1_000,
            max_latency_us: summary.max_ns / 1_000,
            succeeded: succeeded.into_inner(),
            failed: failed.into_inner(),
        };
        tracing::info!(
            elapsed_ms = result.total_time_ms() as u64,
            succeeded = result.succeeded,
            failed = result.failed,
            "run complete"
        );
        Ok(result)
    }
}
