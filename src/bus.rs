//! Named-event notifier
//!
//! `EventBus` maps event names to the ordered list of sinks subscribed under
//! them and pushes every published payload to each of those sinks in turn.
//!
//! The registry sits behind a single `tokio::sync::RwLock`. Subscribe and
//! unsubscribe take it exclusively; publishing takes it shared for the whole
//! delivery loop. A consumer that is slow to accept therefore holds up every
//! pending registry change, and since the lock is write-preferring, any
//! publish queued behind that change as well.

use crate::config::BusConfig;
use crate::endpoint::Sink;
use crate::error::{EventError, Result};
use crate::metrics::BusMetrics;
use crate::types::BusInfo;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

type Registry<T> = HashMap<String, Vec<Arc<dyn Sink<T>>>>;

/// Outcome of a single delivery attempt
enum Delivery {
    Accepted,
    TimedOut,
    Closed,
}

/// In-process publish/subscribe bus keyed by event name
///
/// Payloads are cloned once per subscriber. Independent instances share
/// nothing; wrap one in an `Arc` to share it between tasks.
pub struct EventBus<T: Send + 'static = serde_json::Value> {
    events: RwLock<Registry<T>>,
    config: BusConfig,
    metrics: BusMetrics,
}

impl<T> EventBus<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create an empty bus with default configuration
    pub fn new() -> Self {
        Self::from_config(BusConfig::default())
    }

    /// Create an empty bus with the given configuration
    ///
    /// Fails with `EventError::Config` if the configuration does not validate.
    pub fn with_config(config: BusConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::from_config(config))
    }

    fn from_config(config: BusConfig) -> Self {
        Self {
            events: RwLock::new(HashMap::new()),
            config,
            metrics: BusMetrics::new(),
        }
    }

    /// Bus configuration
    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    /// Delivery counters
    pub fn metrics(&self) -> &BusMetrics {
        &self.metrics
    }

    /// Start observing `event` through `endpoint`
    ///
    /// Creates the event if it is not registered yet. The same endpoint may
    /// be subscribed any number of times, under one name or several.
    pub async fn subscribe(&self, event: &str, endpoint: Arc<dyn Sink<T>>) {
        let subscribers = {
            let mut events = self.events.write().await;
            let sinks = events.entry(event.to_string()).or_default();
            sinks.push(endpoint);
            sinks.len()
        };

        self.metrics.record_subscribe();
        tracing::debug!(
            bus = %self.config.name,
            event = %event,
            subscribers,
            "Endpoint subscribed"
        );
    }

    /// Stop observing `event` through `endpoint`
    ///
    /// Removes every registration of that exact endpoint (compared by
    /// reference, not by value) and closes it. An endpoint that is not
    /// registered under `event` is left untouched. The event itself stays
    /// registered even if no subscribers remain.
    pub async fn unsubscribe_one<S>(&self, event: &str, endpoint: &Arc<S>) -> Result<()>
    where
        S: Sink<T> + ?Sized,
    {
        let removed = {
            let mut events = self.events.write().await;
            let sinks = events
                .get_mut(event)
                .ok_or_else(|| EventError::EventNotFound(event.to_string()))?;

            let before = sinks.len();
            sinks.retain(|sink| !same_sink(sink, endpoint));
            let removed = before - sinks.len();
            if removed > 0 {
                endpoint.close();
            }
            removed
        };

        if removed > 0 {
            self.metrics.record_unsubscribe(removed);
        }
        tracing::debug!(
            bus = %self.config.name,
            event = %event,
            removed,
            "Endpoint unsubscribed"
        );
        Ok(())
    }

    /// Stop observing `event` on every endpoint
    ///
    /// Closes all endpoints registered under `event` and deletes the event,
    /// after which it behaves exactly like a name that was never subscribed.
    pub async fn unsubscribe_all(&self, event: &str) -> Result<()> {
        let removed = {
            let mut events = self.events.write().await;
            let sinks = events
                .remove(event)
                .ok_or_else(|| EventError::EventNotFound(event.to_string()))?;
            for sink in &sinks {
                sink.close();
            }
            sinks.len()
        };

        self.metrics.record_unsubscribe(removed);
        tracing::debug!(
            bus = %self.config.name,
            event = %event,
            removed,
            "Event removed"
        );
        Ok(())
    }

    /// Deliver `payload` to every subscriber of `event`
    ///
    /// Subscribers are served in registration order and each delivery waits
    /// as long as its consumer needs to accept it. Sinks found closed are
    /// skipped.
    pub async fn publish(&self, event: &str, payload: T) -> Result<()> {
        let events = self.events.read().await;
        let sinks = self.lookup(&events, event)?;

        for sink in sinks {
            self.deliver(event, sink, payload.clone(), None).await;
        }
        Ok(())
    }

    /// Deliver `payload` to every subscriber of `event`, waiting at most
    /// `timeout` for each one
    ///
    /// A subscriber that does not accept in time simply misses this payload;
    /// delivery carries on with the rest. Once every subscriber has been
    /// tried, `PostTimedOut` reports how many were missed.
    pub async fn publish_timeout(&self, event: &str, payload: T, timeout: Duration) -> Result<()> {
        let events = self.events.read().await;
        let sinks = self.lookup(&events, event)?;

        let mut delivered = 0;
        let mut timed_out = 0;
        for sink in sinks {
            match self.deliver(event, sink, payload.clone(), Some(timeout)).await {
                Delivery::Accepted => delivered += 1,
                Delivery::TimedOut => timed_out += 1,
                Delivery::Closed => {}
            }
        }

        if timed_out > 0 {
            return Err(EventError::PostTimedOut {
                event: event.to_string(),
                timed_out,
                delivered,
            });
        }
        Ok(())
    }

    /// `publish_timeout` using the configured default timeout
    pub async fn publish_with_default_timeout(&self, event: &str, payload: T) -> Result<()> {
        self.publish_timeout(event, payload, self.config.default_timeout())
            .await
    }

    /// Whether `event` is currently registered
    pub async fn contains(&self, event: &str) -> bool {
        self.events.read().await.contains_key(event)
    }

    /// Registered event names, sorted
    pub async fn events(&self) -> Vec<String> {
        let events = self.events.read().await;
        let mut names: Vec<String> = events.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of registrations under `event`
    pub async fn subscriber_count(&self, event: &str) -> Result<usize> {
        let events = self.events.read().await;
        events
            .get(event)
            .map(Vec::len)
            .ok_or_else(|| EventError::EventNotFound(event.to_string()))
    }

    /// Snapshot of the registry
    pub async fn info(&self) -> BusInfo {
        let events = self.events.read().await;
        BusInfo {
            name: self.config.name.clone(),
            events: events.len(),
            subscribers: events.values().map(Vec::len).sum(),
        }
    }

    fn lookup<'a>(&self, events: &'a Registry<T>, event: &str) -> Result<&'a [Arc<dyn Sink<T>>]> {
        match events.get(event) {
            Some(sinks) => {
                self.metrics.record_publish();
                Ok(sinks.as_slice())
            }
            None => {
                self.metrics.record_not_found();
                Err(EventError::EventNotFound(event.to_string()))
            }
        }
    }

    async fn deliver(
        &self,
        event: &str,
        sink: &Arc<dyn Sink<T>>,
        payload: T,
        timeout: Option<Duration>,
    ) -> Delivery {
        if sink.is_closed() {
            return self.skip_closed(event);
        }

        let sent = match timeout {
            Some(limit) => match tokio::time::timeout(limit, sink.send(payload)).await {
                Ok(sent) => sent,
                Err(_) => {
                    self.metrics.record_timeout();
                    tracing::debug!(
                        bus = %self.config.name,
                        event = %event,
                        timeout = ?limit,
                        "Delivery timed out"
                    );
                    return Delivery::TimedOut;
                }
            },
            None => sink.send(payload).await,
        };

        match sent {
            Ok(()) => {
                self.metrics.record_delivery();
                tracing::trace!(bus = %self.config.name, event = %event, "Payload delivered");
                Delivery::Accepted
            }
            Err(_) => self.skip_closed(event),
        }
    }

    fn skip_closed(&self, event: &str) -> Delivery {
        self.metrics.record_closed_skip();
        tracing::debug!(
            bus = %self.config.name,
            event = %event,
            "Skipping closed endpoint"
        );
        Delivery::Closed
    }
}

impl<T> Default for EventBus<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Reference identity of two sinks, ignoring vtables
fn same_sink<T, S>(registered: &Arc<dyn Sink<T>>, endpoint: &Arc<S>) -> bool
where
    T: Send + 'static,
    S: ?Sized,
{
    std::ptr::eq(
        Arc::as_ptr(registered) as *const (),
        Arc::as_ptr(endpoint) as *const (),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::Endpoint;

    #[tokio::test]
    async fn test_subscribe_creates_event() {
        let bus = EventBus::<u32>::new();
        assert!(!bus.contains("tick").await);

        bus.subscribe("tick", Arc::new(Endpoint::<u32>::new())).await;
        assert!(bus.contains("tick").await);
        assert_eq!(bus.subscriber_count("tick").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_event_names_are_case_sensitive() {
        let bus = EventBus::<u32>::new();
        bus.subscribe("Tick", Arc::new(Endpoint::<u32>::new())).await;

        assert!(bus.contains("Tick").await);
        assert!(bus.publish("tick", 1).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_same_sink_compares_references() {
        let a = Arc::new(Endpoint::<u32>::new());
        let b = Arc::new(Endpoint::<u32>::new());
        let registered: Arc<dyn Sink<u32>> = a.clone();

        assert!(same_sink(&registered, &a));
        assert!(!same_sink(&registered, &b));
        assert!(same_sink(&registered, &registered.clone()));
    }

    #[tokio::test]
    async fn test_unsubscribe_one_removes_duplicates_and_closes_once() {
        let bus = EventBus::<u32>::new();
        let ep = Arc::new(Endpoint::<u32>::new());
        let other = Arc::new(Endpoint::<u32>::new());

        bus.subscribe("dup", ep.clone()).await;
        bus.subscribe("dup", other.clone()).await;
        bus.subscribe("dup", ep.clone()).await;
        assert_eq!(bus.subscriber_count("dup").await.unwrap(), 3);

        bus.unsubscribe_one("dup", &ep).await.unwrap();
        assert_eq!(bus.subscriber_count("dup").await.unwrap(), 1);
        assert!(ep.is_closed());
        assert!(!other.is_closed());
        assert_eq!(bus.metrics().snapshot().unsubscribes, 2);
    }

    #[tokio::test]
    async fn test_unsubscribe_one_non_member_is_noop() {
        let bus = EventBus::<u32>::new();
        let member = Arc::new(Endpoint::<u32>::new());
        let stranger = Arc::new(Endpoint::<u32>::new());

        bus.subscribe("a", member.clone()).await;
        bus.unsubscribe_one("a", &stranger).await.unwrap();

        assert!(!stranger.is_closed());
        assert!(!member.is_closed());
        assert_eq!(bus.subscriber_count("a").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unsubscribe_one_keeps_empty_event() {
        let bus = EventBus::<u32>::new();
        let ep = Arc::new(Endpoint::<u32>::new());
        bus.subscribe("a", ep.clone()).await;

        bus.unsubscribe_one("a", &ep).await.unwrap();
        assert!(bus.contains("a").await);
        assert_eq!(bus.subscriber_count("a").await.unwrap(), 0);

        // Still registered, so publishing succeeds with nobody to serve.
        bus.publish("a", 1).await.unwrap();
    }

    #[tokio::test]
    async fn test_unsubscribe_one_only_touches_named_event() {
        let bus = EventBus::<u32>::new();
        let ep = Arc::new(Endpoint::<u32>::new());
        bus.subscribe("a", ep.clone()).await;
        bus.subscribe("b", ep.clone()).await;

        bus.unsubscribe_one("a", &ep).await.unwrap();
        assert_eq!(bus.subscriber_count("a").await.unwrap(), 0);
        assert_eq!(bus.subscriber_count("b").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unknown_event_errors() {
        let bus = EventBus::<u32>::new();
        let ep = Arc::new(Endpoint::<u32>::new());

        assert!(bus.unsubscribe_one("nope", &ep).await.unwrap_err().is_not_found());
        assert!(bus.unsubscribe_all("nope").await.unwrap_err().is_not_found());
        assert!(bus.publish("nope", 1).await.unwrap_err().is_not_found());
        assert!(bus
            .publish_timeout("nope", 1, Duration::from_millis(10))
            .await
            .unwrap_err()
            .is_not_found());
        assert!(bus.subscriber_count("nope").await.unwrap_err().is_not_found());
        assert!(!ep.is_closed());
    }

    #[tokio::test]
    async fn test_closed_endpoint_is_skipped() {
        let bus = EventBus::<u32>::new();
        let ep = Arc::new(Endpoint::<u32>::new());
        bus.subscribe("a", ep.clone()).await;

        // Closed by its consumer without going through the bus.
        ep.close();
        bus.publish("a", 1).await.unwrap();
        bus.publish_timeout("a", 2, Duration::from_millis(10))
            .await
            .unwrap();

        let snap = bus.metrics().snapshot();
        assert_eq!(snap.closed_skipped, 2);
        assert_eq!(snap.deliveries, 0);
    }

    #[tokio::test]
    async fn test_info() {
        let config = BusConfig {
            name: "orders".to_string(),
            ..Default::default()
        };
        let bus = EventBus::<u32>::with_config(config).unwrap();
        let ep = Arc::new(Endpoint::<u32>::new());
        bus.subscribe("a", ep.clone()).await;
        bus.subscribe("a", Arc::new(Endpoint::<u32>::new())).await;
        bus.subscribe("b", ep).await;

        let info = bus.info().await;
        assert_eq!(info.name, "orders");
        assert_eq!(info.events, 2);
        assert_eq!(info.subscribers, 3);
        assert_eq!(bus.events().await, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_with_config_rejects_invalid_config() {
        let config = BusConfig {
            default_timeout_ms: 0,
            ..Default::default()
        };
        let err = EventBus::<u32>::with_config(config).err().unwrap();
        assert!(matches!(err, EventError::Config(_)));

        let config = BusConfig {
            name: String::new(),
            ..Default::default()
        };
        assert!(EventBus::<u32>::with_config(config).is_err());
    }
}
