//! Turn orchestration
//!
//! [`TurnBasedChatAdapter`] owns the connection state machine and the public streams.
//! It is fed by a conversation-start callback producing a [`TurnIteratorClient`];
//! [`from_turn_api`] builds that callback over any [`crate::client::TurnApi`].

use crate::error::TurnError;
use crate::models::Activity;
use crate::reactive::AbortSignal;
use futures_util::future::BoxFuture;
use futures_util::stream::BoxStream;
use std::sync::Arc;

pub mod api_bridge;
pub mod chat_adapter;

pub use api_bridge::{from_turn_api, ChatAdapterOptions};
pub use chat_adapter::TurnBasedChatAdapter;

/// Activity batches of one turn, in the order they must be published
pub type ActivityBatches = BoxStream<'static, Result<Vec<Activity>, TurnError>>;

/// Outcome of handing one activity to a [`TurnExecutor`]
pub struct TurnExecution {
    /// Echo and replies, pulled by the orchestrator
    pub activities: ActivityBatches,
    /// Id assigned to the posted activity; resolves once the backend accepted it
    pub activity_id: BoxFuture<'static, Result<String, TurnError>>,
}

/// Executes one turn per posted activity.
///
/// The orchestrator fully drains one execution before starting the next.
pub trait TurnExecutor: Send + Sync {
    fn execute(&self, activity: Activity) -> TurnExecution;
}

/// A started conversation
pub struct TurnIteratorClient {
    pub initial_activities: ActivityBatches,
    pub executor: Arc<dyn TurnExecutor>,
}

/// Conversation-start callback, called at most once per adapter
pub type StartConversation = Box<
    dyn Fn(AbortSignal) -> BoxFuture<'static, Result<TurnIteratorClient, TurnError>> + Send + Sync,
>;
