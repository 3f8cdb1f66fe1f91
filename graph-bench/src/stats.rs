//! Latency aggregation for a completed run.
//!
//! Percentiles use the nearest-rank method on the sorted sample set:
//! `rank(p) = floor(p * n) - 1` (0-indexed), clamped into `[0, n)`.
//! The rank is computed in integer basis points so that `0.95 * 100`
//! never lands on `94.999..`.

use std::time::Duration;

/// Basis points for the reported percentiles.
pub const P50_BPS: u64 = 5_000;
pub const P95_BPS: u64 = 9_500;
pub const P99_BPS: u64 = 9_900;

/// Runs shorter than this are treated as lasting exactly this long when
/// computing throughput.
pub const MIN_ELAPSED: Duration = Duration::from_millis(1);

/// Aggregate over a set of latency samples, all values in nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatencySummary {
    pub count: usize,
    pub mean_ns: f64,
    pub p50_ns: u64,
    pub p95_ns: u64,
    pub p99_ns: u64,
    pub max_ns: u64,
    pub throughput: f64,
}

impl LatencySummary {
    pub fn mean_us(&self) -> f64 {
        self.mean_ns / 1_000.0
    }
}

/// 0-indexed nearest rank for `bps` basis points over `n` sorted samples.
///
/// Returns `None` only when there are no samples.
pub fn nearest_rank(n: usize, bps: u64) -> Option<usize> {
    if n == 0 {
        return None;
    }
    let rank = (n as u128 * bps as u128 / 10_000) as usize;
    Some(rank.saturating_sub(1).min(n - 1))
}

/// Sample at the nearest rank of an ascending slice, 0 when empty.
pub fn percentile(sorted_ns: &[u64], bps: u64) -> u64 {
    nearest_rank(sorted_ns.len(), bps)
        .map(|r| sorted_ns[r])
        .unwrap_or(0)
}

/// Operations per second for `n` operations over `elapsed` wall-clock time.
pub fn throughput(n: usize, elapsed: Duration) -> f64 {
    if n == 0 {
        return 0.0;
    }
    let elapsed_ms = elapsed.max(MIN_ELAPSED).as_nanos() as f64 / 1_000_000.0;
    n as f64 * 1_000.0 / elapsed_ms
}

/// Sorts `samples_ns` in place and derives the run aggregate.
pub fn summarize(samples_ns: &mut [u64], elapsed: Duration) -> LatencySummary {
    samples_ns.sort_unstable();
    let n = samples_ns.len();

    let mean_ns = if n == 0 {
        0.0
    } else {
        let sum: u128 = samples_ns.iter().map(|&v| v as u128).sum();
        sum as f64 / n as f64
    };

    LatencySummary {
        count: n,
        mean_ns,
        p50_ns: percentile(samples_ns, P50_BPS),
        p95_ns: percentile(samples_ns, P95_BPS),
        p99_ns: percentile(samples_ns, P99_BPS),
        max_ns: samples_ns.last().copied().unwrap_or(0),
        throughput: throughput(n, elapsed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentiles_of_one_to_hundred() {
        let mut samples: Vec<u64> = (1..=100).collect();
        let s = summarize(&mut samples, Duration::from_secs(1));
        assert_eq!(s.p95_ns, 95);
        assert_eq!(s.p99_ns, 99);
        assert_eq!(s.p50_ns, 50);
        assert_eq!(s.max_ns, 100);
        assert!((s.mean_ns - 50.5).abs() < 1e-9);
    }

    #[test]
    fn unsorted_input_is_sorted_first() {
        let mut samples: Vec<u64> = (1..=100).rev().collect();
        let s = summarize(&mut samples, Duration::from_secs(1));
        assert_eq!(s.p95_ns, 95);
        assert_eq!(samples[0], 1);
    }

    #[test]
    fn single_sample_clamps_rank_to_zero() {
        assert_eq!(nearest_rank(1, P95_BPS), Some(0));
        assert_eq!(nearest_rank(1, P99_BPS), Some(0));

        let mut samples = vec![4_200];
        let s = summarize(&mut samples, Duration::from_millis(3));
        assert_eq!(s.p50_ns, 4_200);
        assert_eq!(s.p95_ns, 4_200);
        assert_eq!(s.p99_ns, 4_200);
        assert_eq!(s.mean_ns, 4_200.0);
    }

    #[test]
    fn small_sample_ranks() {
        // floor(0.95 * 10) - 1 = 8, floor(0.99 * 10) - 1 = 8
        assert_eq!(nearest_rank(10, P95_BPS), Some(8));
        assert_eq!(nearest_rank(10, P99_BPS), Some(8));
        // floor(0.95 * 20) - 1 = 18
        assert_eq!(nearest_rank(20, P95_BPS), Some(18));
    }

    #[test]
    fn empty_sample_set_is_all_zero() {
        let s = summarize(&mut [], Duration::ZERO);
        assert_eq!(s.count, 0);
        assert_eq!(s.throughput, 0.0);
        assert_eq!(s.mean_ns, 0.0);
        assert_eq!(s.p95_ns, 0);
        assert_eq!(s.p99_ns, 0);
        assert_eq!(s.max_ns, 0);
        assert_eq!(nearest_rank(0, P99_BPS), None);
    }

    #[test]
    fn zero_elapsed_uses_one_millisecond_floor() {
        assert_eq!(throughput(5, Duration::ZERO), 5_000.0);
        assert_eq!(throughput(5, Duration::from_micros(200)), 5_000.0);
        assert_eq!(throughput(10, Duration::from_secs(2)), 5.0);
    }

    #[test]
    fn mean_does_not_overflow_on_large_samples() {
        let mut samples = vec![u64::MAX / 2; 8];
        let s = summarize(&mut samples, Duration::from_secs(1));
        assert!((s.mean_ns - (u64::MAX / 2) as f64).abs() < 1e6);
    }
}
