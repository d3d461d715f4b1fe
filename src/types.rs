//! Introspection types

use serde::{Deserialize, Serialize};

/// Registry summary returned by `EventBus::info`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusInfo {
    /// Configured bus name
    pub name: String,

    /// Number of registered events
    pub events: usize,

    /// Endpoint registrations across all events (duplicates counted)
    pub subscribers: usize,
}
