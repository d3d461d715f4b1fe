//! # a3s-notify
//!
//! In-process named-event notifier for the A3S ecosystem.
//!
//! ## Overview
//!
//! Producers post payloads under an event name; every endpoint subscribed
//! under that name receives each payload. Producers and consumers share
//! nothing but the event name.
//!
//! ## Quick Start
//!
//! ```rust
//! use a3s_notify::{Endpoint, EventBus};
//! use std::sync::Arc;
//!
//! # async fn example() -> a3s_notify::Result<()> {
//! let bus = Arc::new(EventBus::<u64>::new());
//!
//! // Observer of "my_event"
//! let endpoint = Arc::new(Endpoint::<u64>::new());
//! bus.subscribe("my_event", endpoint.clone()).await;
//! let observer = tokio::spawn(async move {
//!     while let Some(data) = endpoint.recv().await {
//!         println!("MY_EVENT: {}", data);
//!     }
//! });
//!
//! // Producer of "my_event"
//! bus.publish("my_event", 42).await?;
//!
//! // Closes the endpoint, which ends the observer loop
//! bus.unsubscribe_all("my_event").await?;
//! observer.await.ok();
//! # Ok(())
//! # }
//! ```
//!
//! ## Delivery
//!
//! - **publish** waits for every subscriber to accept, in subscription order
//! - **publish_timeout** bounds the wait per subscriber and reports misses
//!   with `PostTimedOut` after trying everyone
//!
//! ## Architecture
//!
//! - **EventBus**: event-name registry and delivery loop
//! - **Sink** trait: anything the bus can deliver into
//! - **Endpoint**: rendezvous `Sink` with end-of-stream on close

pub mod bus;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod metrics;
pub mod types;

pub use bus::EventBus;
pub use config::BusConfig;
pub use endpoint::{Endpoint, SendError, Sink};
pub use error::{EventError, Result};
pub use metrics::{BusMetrics, MetricsSnapshot};
pub use types::BusInfo;

/// Library version string
pub fn version() -> &'static str {
    "0.3"
}
