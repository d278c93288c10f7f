//! Logging service

use crate::error::TurnError;
use crate::models::{ConnectionStatus, LogLevel};

/// Initialize logging with the specified level.
///
/// `RUST_LOG` is not consulted; the level applies to this crate only. Fails if a global
/// subscriber is already installed.
pub fn init_logging(level: LogLevel) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = match level {
        LogLevel::Error => "turnloop_core=error",
        LogLevel::Warn => "turnloop_core=warn",
        LogLevel::Info => "turnloop_core=info",
        LogLevel::Debug => "turnloop_core=debug",
        LogLevel::Trace => "turnloop_core=trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
}

/// Log a connection status transition
pub fn log_status_change(status: ConnectionStatus, reason: Option<&TurnError>) {
    match reason {
        Some(reason) => tracing::warn!(
            status = ?status,
            reason = %reason,
            "Connection status changed"
        ),
        None => tracing::info!(status = ?status, "Connection status changed"),
    }
}

/// Log a failed queued post
pub fn log_post_failure(activity_type: Option<&str>, error: &TurnError) {
    tracing::error!(
        activity_type = activity_type.unwrap_or("unknown"),
        error = %error,
        "Failed to post activity"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Once;

    static INIT: Once = Once::new();

    fn init_test_logging() {
        INIT.call_once(|| {
            let _ = init_logging(LogLevel::Debug);
        });
    }

    #[test]
    fn test_second_initialization_fails_without_panicking() {
        init_test_logging();
        assert!(init_logging(LogLevel::Info).is_err());
    }

    #[test]
    fn test_log_functions() {
        init_test_logging();

        // These should not panic
        log_status_change(ConnectionStatus::Online, None);
        log_status_change(ConnectionStatus::FailedToConnect, Some(&TurnError::TooManyTurns));
        log_post_failure(Some("message"), &TurnError::Closed);
        log_post_failure(None, &TurnError::Status { status: 502 });
    }
}
