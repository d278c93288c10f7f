//! Retry loop for establishing a turn response
//!
//! Only transient failures (network errors, HTTP 5xx) are retried. The final failure of
//! an attempt chain is reported to telemetry once, unless it is a cancellation.

use super::telemetry::Telemetry;
use crate::error::TurnError;
use crate::models::RetryPolicy;
use crate::reactive::AbortSignal;
use std::collections::HashMap;
use std::future::Future;
use tracing::{debug, warn};

/// Run `attempt` under `policy`, racing every attempt and every delay against `signal`.
pub async fn with_retries<T, F, Fut>(
    policy: &RetryPolicy,
    telemetry: Option<&dyn Telemetry>,
    signal: &AbortSignal,
    mut attempt: F,
) -> Result<T, TurnError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, TurnError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempts = 0;

    let outcome = loop {
        attempts += 1;

        match signal.race(attempt()).await {
            Ok(value) => break Ok(value),
            Err(error) if error.is_retryable() && attempts < max_attempts => {
                let delay = policy.delay_for_retry(attempts);
                warn!(
                    attempt = attempts,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "Turn request failed, retrying"
                );

                if let Err(error) = signal
                    .race(async {
                        tokio::time::sleep(delay).await;
                        Ok(())
                    })
                    .await
                {
                    break Err(error);
                }
            }
            Err(error) => break Err(error),
        }
    };

    if let Err(error) = &outcome {
        if signal.is_aborted() {
            debug!(error = %error, "Turn request cancelled");
        } else if let Some(telemetry) = telemetry {
            let properties = HashMap::from([
                ("handledAt".to_string(), "withRetries".to_string()),
                ("retryCount".to_string(), max_attempts.to_string()),
            ]);
            telemetry.record_exception(error, &properties);
        }
    }

    outcome
}
