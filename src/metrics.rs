//! Metric helpers for `cotwire`.
//!
//! Defines metric names and thin wrappers over the
//! [`metrics`](https://docs.rs/metrics) facade. Every helper is a no-op
//! when the `metrics` feature is disabled, so call sites stay unguarded.

/// Name of the gauge tracking active connections.
pub const CONNECTIONS_ACTIVE: &str = "cotwire_connections_active";
/// Name of the counter tracking processed events.
pub const EVENTS_PROCESSED: &str = "cotwire_events_processed_total";
/// Name of the counter tracking error occurrences.
pub const ERRORS_TOTAL: &str = "cotwire_errors_total";

/// Direction of event processing.
#[derive(Clone, Copy)]
pub enum Direction {
    /// Inbound events received from the peer.
    Inbound,
    /// Outbound events written to the peer.
    Outbound,
}

impl Direction {
    #[cfg(feature = "metrics")]
    fn as_str(self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        }
    }
}

/// Increment the active connections gauge.
pub fn inc_connections() {
    #[cfg(feature = "metrics")]
    metrics::gauge!(CONNECTIONS_ACTIVE).increment(1.0);
}

/// Decrement the active connections gauge.
pub fn dec_connections() {
    #[cfg(feature = "metrics")]
    metrics::gauge!(CONNECTIONS_ACTIVE).decrement(1.0);
}

/// Record a processed event for the given direction.
pub fn inc_events(direction: Direction) {
    #[cfg(not(feature = "metrics"))]
    let _ = direction;
    #[cfg(feature = "metrics")]
    metrics::counter!(EVENTS_PROCESSED, "direction" => direction.as_str()).increment(1);
}

/// Record an error occurrence.
pub fn inc_errors() {
    #[cfg(feature = "metrics")]
    metrics::counter!(ERRORS_TOTAL).increment(1);
}
