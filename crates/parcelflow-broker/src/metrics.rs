//! Distribution metrics.
//!
//! Emitted through the `metrics` facade; they are no-ops until a recorder is
//! installed (the server installs the Prometheus exporter).

use metrics::{counter, gauge, histogram};
use std::time::Duration;

use crate::interfaces::EndpointAddress;

/// Metric names as constants for consistency.
pub mod names {
    pub const TASKS_DISTRIBUTED_TOTAL: &str = "parcelflow_tasks_distributed_total";
    pub const DELIVERIES_TOTAL: &str = "parcelflow_deliveries_total";
    pub const DELIVERY_FAILURES_TOTAL: &str = "parcelflow_delivery_failures_total";
    pub const DISTRIBUTION_DURATION_SECONDS: &str = "parcelflow_distribution_duration_seconds";
    pub const SUBSCRIPTIONS: &str = "parcelflow_subscriptions";
    pub const PUBLISHER_INSTANCES: &str = "parcelflow_publisher_instances";
    pub const OPEN_EPISODES: &str = "parcelflow_open_episodes";
}

/// Record one completed distribution pass.
pub fn record_distribution(delivered: usize, duration: Duration) {
    counter!(names::TASKS_DISTRIBUTED_TOTAL).increment(1);
    histogram!(names::DISTRIBUTION_DURATION_SECONDS, "outcome" => outcome(delivered))
        .record(duration.as_secs_f64());
}

fn outcome(delivered: usize) -> &'static str {
    if delivered == 0 { "empty" } else { "delivered" }
}

/// Record a successful hand-off to an endpoint.
pub fn record_delivery(endpoint: &EndpointAddress) {
    counter!(names::DELIVERIES_TOTAL, "endpoint" => endpoint.to_string()).increment(1);
}

/// Record a contained per-delivery failure.
pub fn record_delivery_failure(reason: &'static str) {
    counter!(names::DELIVERY_FAILURES_TOTAL, "reason" => reason).increment(1);
}

pub fn set_subscription_count(count: usize) {
    gauge!(names::SUBSCRIPTIONS).set(count as f64);
}

pub fn set_publisher_instance_count(count: usize) {
    gauge!(names::PUBLISHER_INSTANCES).set(count as f64);
}

pub fn set_open_episode_count(count: usize) {
    gauge!(names::OPEN_EPISODES).set(count as f64);
}
