//! Telemetry hook for failures that survive every retry

use crate::error::TurnError;
use std::collections::HashMap;
use tracing::error;

/// Receives errors that exhausted the retry budget
pub trait Telemetry: Send + Sync {
    fn record_exception(&self, error: &TurnError, properties: &HashMap<String, String>);
}

/// Telemetry that writes exceptions to the tracing log
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingTelemetry;

impl Telemetry for TracingTelemetry {
    fn record_exception(&self, exception: &TurnError, properties: &HashMap<String, String>) {
        error!(
            error = %exception,
            handled_at = properties.get("handledAt").map(String::as_str).unwrap_or_default(),
            retry_count = properties.get("retryCount").map(String::as_str).unwrap_or_default(),
            "Turn request failed"
        );
    }
}
