//! Metrics surface - relaxed atomic counters and a log-bucket histogram.
//!
//! Written by the matcher (and the submitter, for ingress counters) with
//! relaxed increments; read by outside observers without any further
//! synchronization. Snapshots are eventually consistent by design. The
//! fixed plain-atomic layout keeps the surface publishable into shared
//! memory, but publication is a collaborator's concern.

use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_utils::CachePadded;
use serde::{Deserialize, Serialize};

/// Number of logarithmic latency buckets: one per power of two, which
/// covers the full u64 nanosecond range.
pub const LATENCY_BUCKETS: usize = 64;

/// Lock-free latency histogram with power-of-two buckets.
///
/// `record` is branch-light integer math; percentile queries walk the
/// buckets and return the upper bound of the bucket containing the target
/// rank, so results are approximations with log-scale resolution.
pub struct LatencyHistogram {
    buckets: [AtomicU64; LATENCY_BUCKETS],
}

impl LatencyHistogram {
    pub fn new() -> Self {
        Self {
            buckets: std::array::from_fn(|_| AtomicU64::new(0)),
        }
    }

    #[inline]
    fn bucket_index(latency_ns: u64) -> usize {
        if latency_ns == 0 {
            return 0;
        }
        (63 - latency_ns.leading_zeros() as usize).min(LATENCY_BUCKETS - 1)
    }

    /// Upper bound (inclusive) of a bucket, in nanoseconds.
    #[inline]
    fn bucket_upper_bound(index: usize) -> u64 {
        if index >= 63 {
            u64::MAX
        } else {
            (1u64 << (index + 1)) - 1
        }
    }

    #[inline]
    pub fn record(&self, latency_ns: u64) {
        self.buckets[Self::bucket_index(latency_ns)].fetch_add(1, Ordering::Relaxed);
    }

    /// Total recorded samples.
    pub fn count(&self) -> u64 {
        self.buckets
            .iter()
            .map(|b| b.load(Ordering::Relaxed))
            .sum()
    }

    /// Approximate value at the given quantile (0.0..=1.0), as the upper
    /// bound of the bucket containing that rank. Zero when empty.
    pub fn approx_percentile(&self, quantile: f64) -> u64 {
        let total = self.count();
        if total == 0 {
            return 0;
        }

        let target = ((quantile * total as f64).ceil() as u64).max(1);
        let mut cumulative = 0u64;
        for (i, bucket) in self.buckets.iter().enumerate() {
            cumulative += bucket.load(Ordering::Relaxed);
            if cumulative >= target {
                return Self::bucket_upper_bound(i);
            }
        }
        Self::bucket_upper_bound(LATENCY_BUCKETS - 1)
    }
}

impl Default for LatencyHistogram {
    fn default() -> Self {
        Self::new()
    }
}

/// The full metrics surface for one engine instance.
///
/// Counters are monotonic; gauges are last-write-wins. A best price of
/// zero means that side is empty.
pub struct Metrics {
    // Counters
    pub orders_received: CachePadded<AtomicU64>,
    pub orders_processed: CachePadded<AtomicU64>,
    pub orders_rejected: CachePadded<AtomicU64>,
    pub trades_executed: CachePadded<AtomicU64>,
    pub total_volume: CachePadded<AtomicU64>,
    pub journal_drops: CachePadded<AtomicU64>,
    pub pool_exhaustions: CachePadded<AtomicU64>,
    pub requests_shed: CachePadded<AtomicU64>,
    pub unknown_ids: CachePadded<AtomicU64>,
    pub duplicate_adds: CachePadded<AtomicU64>,

    // Gauges
    pub queue_depth: CachePadded<AtomicU64>,
    pub bid_levels: CachePadded<AtomicU64>,
    pub ask_levels: CachePadded<AtomicU64>,
    pub best_bid: CachePadded<AtomicU64>,
    pub best_ask: CachePadded<AtomicU64>,

    /// Request processing latency (ingress to dispatch start)
    pub latency: LatencyHistogram,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            orders_received: CachePadded::new(AtomicU64::new(0)),
            orders_processed: CachePadded::new(AtomicU64::new(0)),
            orders_rejected: CachePadded::new(AtomicU64::new(0)),
            trades_executed: CachePadded::new(AtomicU64::new(0)),
            total_volume: CachePadded::new(AtomicU64::new(0)),
            journal_drops: CachePadded::new(AtomicU64::new(0)),
            pool_exhaustions: CachePadded::new(AtomicU64::new(0)),
            requests_shed: CachePadded::new(AtomicU64::new(0)),
            unknown_ids: CachePadded::new(AtomicU64::new(0)),
            duplicate_adds: CachePadded::new(AtomicU64::new(0)),
            queue_depth: CachePadded::new(AtomicU64::new(0)),
            bid_levels: CachePadded::new(AtomicU64::new(0)),
            ask_levels: CachePadded::new(AtomicU64::new(0)),
            best_bid: CachePadded::new(AtomicU64::new(0)),
            best_ask: CachePadded::new(AtomicU64::new(0)),
            latency: LatencyHistogram::new(),
        }
    }

    #[inline]
    pub fn record_trade(&self, qty: u64) {
        self.trades_executed.fetch_add(1, Ordering::Relaxed);
        self.total_volume.fetch_add(qty, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_latency(&self, latency_ns: u64) {
        self.latency.record(latency_ns);
    }

    /// Eventually-consistent copy of the whole surface.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            orders_received: self.orders_received.load(Ordering::Relaxed),
            orders_processed: self.orders_processed.load(Ordering::Relaxed),
            orders_rejected: self.orders_rejected.load(Ordering::Relaxed),
            trades_executed: self.trades_executed.load(Ordering::Relaxed),
            total_volume: self.total_volume.load(Ordering::Relaxed),
            journal_drops: self.journal_drops.load(Ordering::Relaxed),
            pool_exhaustions: self.pool_exhaustions.load(Ordering::Relaxed),
            requests_shed: self.requests_shed.load(Ordering::Relaxed),
            unknown_ids: self.unknown_ids.load(Ordering::Relaxed),
            duplicate_adds: self.duplicate_adds.load(Ordering::Relaxed),
            queue_depth: self.queue_depth.load(Ordering::Relaxed),
            bid_levels: self.bid_levels.load(Ordering::Relaxed),
            ask_levels: self.ask_levels.load(Ordering::Relaxed),
            best_bid: self.best_bid.load(Ordering::Relaxed),
            best_ask: self.best_ask.load(Ordering::Relaxed),
            latency_samples: self.latency.count(),
            latency_p50_ns: self.latency.approx_percentile(0.50),
            latency_p99_ns: self.latency.approx_percentile(0.99),
            latency_p999_ns: self.latency.approx_percentile(0.999),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Plain-value copy of the metrics surface at one instant.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub orders_received: u64,
    pub orders_processed: u64,
    pub orders_rejected: u64,
    pub trades_executed: u64,
    pub total_volume: u64,
    pub journal_drops: u64,
    pub pool_exhaustions: u64,
    pub requests_shed: u64,
    pub unknown_ids: u64,
    pub duplicate_adds: u64,
    pub queue_depth: u64,
    pub bid_levels: u64,
    pub ask_levels: u64,
    pub best_bid: u64,
    pub best_ask: u64,
    pub latency_samples: u64,
    pub latency_p50_ns: u64,
    pub latency_p99_ns: u64,
    pub latency_p999_ns: u64,
}
