use crate::health::HealthStatus;
use serde::Serialize;
use serde_json::{Map, Value};

/// What an alert sink learns about the source that triggered it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertContext {
    pub source_id: String,
    pub status: HealthStatus,
    pub error_rate: f64,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
    pub current_tier: usize,
    pub avg_response_time_secs: f64,
}

impl AlertContext {
    /// Generic key/value view for sinks that forward alerts as JSON
    pub fn to_map(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }
}

/// Receives alerts when a source turns unhealthy or critical
///
/// Sinks run on the task that recorded the failure, outside of any monitor
/// lock, so they may call back into the monitor.
pub trait AlertSink: Send + Sync {
    fn alert(&self, source_id: &str, status: HealthStatus, context: &AlertContext);
}

impl<F> AlertSink for F
where
    F: Fn(&str, HealthStatus, &AlertContext) + Send + Sync,
{
    fn alert(&self, source_id: &str, status: HealthStatus, context: &AlertContext) {
        self(source_id, status, context)
    }
}
