/*!
 * Latency Tracking
 * Rolling average and fixed-bucket histogram of batch processing latency
 *
 * Recorded by correlator shards (receive-to-correlate time), read by the
 * backpressure controller and the stats surface. All updates are relaxed
 * atomics; metric racing loses precision, never correctness.
 */

use crate::core::limits::LATENCY_EWMA_WEIGHT;
use std::sync::atomic::{AtomicU64, Ordering};

/// Power-of-two microsecond buckets: bucket i counts latencies < 2^i us,
/// topping out at ~4.2s which is far beyond any healthy batch
const BUCKET_COUNT: usize = 22;

#[derive(Default)]
pub struct LatencyTracker {
    ewma_us: AtomicU64,
    sum_us: AtomicU64,
    count: AtomicU64,
    buckets: [AtomicU64; BUCKET_COUNT],
}

impl LatencyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one batch latency in microseconds
    #[inline]
    pub fn record(&self, us: u64) {
        self.sum_us.fetch_add(us, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
        self.buckets[Self::bucket_index(us)].fetch_add(1, Ordering::Relaxed);

        // Load/store race between recorders only smears the average slightly
        let old = self.ewma_us.load(Ordering::Relaxed);
        let new = (old * (LATENCY_EWMA_WEIGHT - 1) + us) / LATENCY_EWMA_WEIGHT;
        self.ewma_us.store(new, Ordering::Relaxed);
    }

    /// Rolling (exponentially weighted) average in microseconds
    #[inline]
    pub fn ewma_us(&self) -> u64 {
        self.ewma_us.load(Ordering::Relaxed)
    }

    /// Cumulative average in microseconds
    pub fn average_us(&self) -> u64 {
        let count = self.count.load(Ordering::Relaxed);
        if count == 0 {
            0
        } else {
            self.sum_us.load(Ordering::Relaxed) / count
        }
    }

    /// Approximate percentile (upper bucket bound), `p` in 0.0..=1.0
    pub fn percentile_us(&self, p: f64) -> u64 {
        let total = self.count.load(Ordering::Relaxed);
        if total == 0 {
            return 0;
        }
        let target = ((total as f64) * p.clamp(0.0, 1.0)).ceil() as u64;

        let mut cumulative = 0;
        for (i, bucket) in self.buckets.iter().enumerate() {
            cumulative += bucket.load(Ordering::Relaxed);
            if cumulative >= target {
                return 1u64 << i;
            }
        }
        1u64 << (BUCKET_COUNT - 1)
    }

    pub fn samples(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    #[inline]
    fn bucket_index(us: u64) -> usize {
        ((64 - us.leading_zeros()) as usize).min(BUCKET_COUNT - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_tracker() {
        let tracker = LatencyTracker::new();
        assert_eq!(tracker.average_us(), 0);
        assert_eq!(tracker.percentile_us(0.99), 0);
    }

    #[test]
    fn test_average() {
        let tracker = LatencyTracker::new();
        tracker.record(100);
        tracker.record(300);
        assert_eq!(tracker.average_us(), 200);
        assert_eq!(tracker.samples(), 2);
    }

    #[test]
    fn test_ewma_converges_upward() {
        let tracker = LatencyTracker::new();
        for _ in 0..100 {
            tracker.record(1000);
        }
        let ewma = tracker.ewma_us();
        assert!(ewma > 900, "ewma: {}", ewma);
    }

    #[test]
    fn test_percentile_ordering() {
        let tracker = LatencyTracker::new();
        for _ in 0..99 {
            tracker.record(10);
        }
        tracker.record(100_000);

        let p50 = tracker.percentile_us(0.50);
        let p99 = tracker.percentile_us(0.99);
        assert!(p50 <= 16);
        assert!(p99 <= 16);
        assert!(tracker.percentile_us(1.0) >= 100_000);
    }

    #[test]
    fn test_bucket_index_bounds() {
        assert_eq!(LatencyTracker::bucket_index(0), 0);
        assert_eq!(LatencyTracker::bucket_index(1), 1);
        assert_eq!(LatencyTracker::bucket_index(2), 2);
        assert_eq!(LatencyTracker::bucket_index(u64::MAX), BUCKET_COUNT - 1);
    }
}
