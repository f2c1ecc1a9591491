use std::time::Duration;

/// Channel settings, constructed once at start-up and injected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelConfig {
    /// Name of the bus events are published on.
    pub bus_name: String,
    /// Number of ordered queues each subscription is sharded into.
    pub partitions: usize,
    /// Deliveries attempted before an event is parked.
    pub max_delivery_attempts: u32,
    /// Deadline for one handler invocation.
    pub handler_timeout: Duration,
    /// How long an idle consumer waits before polling again.
    pub idle_poll_interval: Duration,
    /// Published and parked events kept for inspection; the oldest are
    /// dropped beyond this. Queued deliveries are never dropped.
    pub retained_events: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            bus_name: "erp-event-bus".to_string(),
            partitions: 4,
            max_delivery_attempts: 3,
            handler_timeout: Duration::from_millis(5000),
            idle_poll_interval: Duration::from_millis(50),
            retained_events: 10_000,
        }
    }
}
