//! Client for turn-based bot backends.
//!
//! [`TurnApi`] is the transport-agnostic seam the orchestrator talks to; [`TurnClient`]
//! implements it over HTTP with either buffered JSON responses or server-sent events.

use crate::error::TurnError;
use crate::models::{Activity, ContinuationAction, ConversationId, TurnBatch};
use crate::reactive::AbortSignal;
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use std::sync::Arc;

pub mod retry;
pub mod sse;
pub mod strategy;
pub mod telemetry;
pub mod turn_client;

pub use strategy::{PreparedRequest, StaticStrategy, TurnStrategy};
pub use telemetry::{Telemetry, TracingTelemetry};
pub use turn_client::TurnClient;

/// Upper bound on `continue_turn` round trips for a single turn
pub const MAX_TURN_COUNT: usize = 100;

/// Batches produced by one turn call, in server order
pub type TurnStream = BoxStream<'static, Result<TurnBatch, TurnError>>;

/// The three logical turn operations.
///
/// Every call resolves once the backend has accepted the request, then yields the
/// response activities as [`TurnBatch`]es. A finished stream whose last batch says
/// [`ContinuationAction::Continue`] must be followed by [`TurnApi::continue_turn`].
#[async_trait]
pub trait TurnApi: Send + Sync {
    async fn start_new_conversation(
        &self,
        emit_start_conversation_event: bool,
        signal: &AbortSignal,
    ) -> Result<TurnStream, TurnError>;

    /// Fails with [`TurnError::NoConversation`] before a conversation id is known.
    async fn execute_turn(
        &self,
        activity: Activity,
        signal: &AbortSignal,
    ) -> Result<TurnStream, TurnError>;

    async fn continue_turn(&self, signal: &AbortSignal) -> Result<TurnStream, TurnError>;

    fn conversation_id(&self) -> Option<ConversationId>;
}

/// Drain `first`, then keep calling `continue_turn` while the previous stream ended on
/// a `Continue` batch.
///
/// The result is every batch of the turn, concatenated. Only round trips count towards
/// [`MAX_TURN_COUNT`]: a single response may carry any number of batches. The response
/// of the round trip that reaches the cap is discarded and the stream fails with
/// [`TurnError::TooManyTurns`].
pub fn continue_until_waiting(
    api: Arc<dyn TurnApi>,
    first: TurnStream,
    signal: AbortSignal,
) -> TurnStream {
    Box::pin(async_stream::try_stream! {
        let mut current = first;
        let mut continuations = 0;

        loop {
            let mut action = ContinuationAction::Waiting;
            while let Some(batch) = current.next().await {
                let batch = batch?;
                action = batch.action;
                yield batch;
            }

            if action != ContinuationAction::Continue {
                break;
            }

            current = api.continue_turn(&signal).await?;
            continuations += 1;
            if continuations >= MAX_TURN_COUNT {
                Err::<(), _>(TurnError::TooManyTurns)?;
            }
        }
    })
}
