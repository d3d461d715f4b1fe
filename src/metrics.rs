//! Delivery counters for an `EventBus`

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free counters updated by the bus
#[derive(Debug, Default)]
pub struct BusMetrics {
    publishes: AtomicU64,
    publish_not_found: AtomicU64,
    deliveries: AtomicU64,
    delivery_timeouts: AtomicU64,
    closed_skipped: AtomicU64,
    subscribes: AtomicU64,
    unsubscribes: AtomicU64,
}

impl BusMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_publish(&self) {
        self.publishes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_not_found(&self) {
        self.publish_not_found.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_delivery(&self) {
        self.deliveries.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_timeout(&self) {
        self.delivery_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_closed_skip(&self) {
        self.closed_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_subscribe(&self) {
        self.subscribes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_unsubscribe(&self, count: usize) {
        self.unsubscribes.fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Point-in-time copy of every counter
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            publishes: self.publishes.load(Ordering::Relaxed),
            publish_not_found: self.publish_not_found.load(Ordering::Relaxed),
            deliveries: self.deliveries.load(Ordering::Relaxed),
            delivery_timeouts: self.delivery_timeouts.load(Ordering::Relaxed),
            closed_skipped: self.closed_skipped.load(Ordering::Relaxed),
            subscribes: self.subscribes.load(Ordering::Relaxed),
            unsubscribes: self.unsubscribes.load(Ordering::Relaxed),
        }
    }

    /// Zero every counter
    pub fn reset(&self) {
        self.publishes.store(0, Ordering::Relaxed);
        self.publish_not_found.store(0, Ordering::Relaxed);
        self.deliveries.store(0, Ordering::Relaxed);
        self.delivery_timeouts.store(0, Ordering::Relaxed);
        self.closed_skipped.store(0, Ordering::Relaxed);
        self.subscribes.store(0, Ordering::Relaxed);
        self.unsubscribes.store(0, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    /// Publish calls that found their event
    pub publishes: u64,
    /// Publish calls rejected with `EventNotFound`
    pub publish_not_found: u64,
    /// Payloads accepted by a subscriber
    pub deliveries: u64,
    pub delivery_timeouts: u64,
    /// Deliveries dropped because the endpoint was already closed
    pub closed_skipped: u64,
    pub subscribes: u64,
    /// Registrations removed by either unsubscribe verb
    pub unsubscribes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_default() {
        let m = BusMetrics::new();
        assert_eq!(m.snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn test_metrics_record_and_reset() {
        let m = BusMetrics::new();
        m.record_publish();
        m.record_publish();
        m.record_delivery();
        m.record_timeout();
        m.record_unsubscribe(3);

        let s = m.snapshot();
        assert_eq!(s.publishes, 2);
        assert_eq!(s.deliveries, 1);
        assert_eq!(s.delivery_timeouts, 1);
        assert_eq!(s.unsubscribes, 3);

        m.reset();
        assert_eq!(m.snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn test_snapshot_serializes_camel_case() {
        let json = serde_json::to_string(&BusMetrics::new().snapshot()).unwrap();
        assert!(json.contains("deliveryTimeouts"));
        assert!(json.contains("publishNotFound"));
    }
}
