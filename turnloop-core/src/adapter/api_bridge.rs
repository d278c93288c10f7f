//! Adapter over a [`TurnApi`]
//!
//! Assigns client-side activity ids, echoes every posted activity ahead of the replies,
//! and stamps each published activity with a per-connection sequence id and timestamp.

use super::{ActivityBatches, TurnBasedChatAdapter, TurnExecution, TurnExecutor, TurnIteratorClient};
use crate::client::{continue_until_waiting, TurnApi, TurnStream};
use crate::error::TurnError;
use crate::models::Activity;
use crate::reactive::AbortSignal;
use futures_util::StreamExt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::debug;
use uuid::Uuid;

/// Options for [`from_turn_api`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChatAdapterOptions {
    /// Ask the backend to send its greeting when the conversation starts
    pub emit_start_conversation_event: bool,
}

impl Default for ChatAdapterOptions {
    fn default() -> Self {
        Self {
            emit_start_conversation_event: true,
        }
    }
}

/// Build a chat adapter that starts a conversation on `api` when first subscribed.
pub fn from_turn_api(api: Arc<dyn TurnApi>, options: ChatAdapterOptions) -> TurnBasedChatAdapter {
    let session = Arc::new(TurnSession {
        api,
        next_sequence_id: AtomicU64::new(0),
        iterating: AtomicBool::new(false),
    });

    TurnBasedChatAdapter::new(move |signal: AbortSignal| {
        let session = Arc::clone(&session);
        async move {
            let first = session
                .api
                .start_new_conversation(options.emit_start_conversation_event, &signal)
                .await?;

            debug!(
                conversation_id = ?session.api.conversation_id(),
                "Conversation started"
            );

            let initial_activities = Arc::clone(&session).iterate(first, None, signal.clone());
            let executor: Arc<dyn TurnExecutor> = Arc::new(SessionExecutor { session, signal });

            Ok(TurnIteratorClient {
                initial_activities,
                executor,
            })
        }
    })
}

struct TurnSession {
    api: Arc<dyn TurnApi>,
    next_sequence_id: AtomicU64,
    iterating: AtomicBool,
}

impl TurnSession {
    /// Batches of one whole turn, with `echo` prepended to the first one
    fn iterate(
        self: Arc<Self>,
        first: TurnStream,
        echo: Option<Activity>,
        signal: AbortSignal,
    ) -> ActivityBatches {
        Box::pin(async_stream::try_stream! {
            let _iteration = IterationGuard::begin(&self.iterating)?;
            let mut turns = continue_until_waiting(Arc::clone(&self.api), first, signal);
            let mut echo = echo;

            while let Some(batch) = turns.next().await {
                let batch = batch?;
                let activities: Vec<Activity> =
                    echo.take().into_iter().chain(batch.activities).collect();
                yield self.stamp(activities);
            }

            // The turn produced no batch at all; still publish the echo.
            if let Some(echo) = echo {
                yield self.stamp(vec![echo]);
            }
        })
    }

    fn stamp(&self, activities: Vec<Activity>) -> Vec<Activity> {
        activities
            .into_iter()
            .map(|activity| activity.stamped(self.next_sequence_id.fetch_add(1, Ordering::SeqCst)))
            .collect()
    }
}

/// Marks the session as iterating for as long as it lives
struct IterationGuard<'a> {
    iterating: &'a AtomicBool,
}

impl<'a> IterationGuard<'a> {
    fn begin(iterating: &'a AtomicBool) -> Result<Self, TurnError> {
        if iterating.swap(true, Ordering::SeqCst) {
            return Err(TurnError::Assertion(
                "Must fully iterate before performing another iteration.".to_string(),
            ));
        }
        Ok(Self { iterating })
    }
}

impl Drop for IterationGuard<'_> {
    fn drop(&mut self) {
        self.iterating.store(false, Ordering::SeqCst);
    }
}

struct SessionExecutor {
    session: Arc<TurnSession>,
    signal: AbortSignal,
}

impl TurnExecutor for SessionExecutor {
    fn execute(&self, activity: Activity) -> TurnExecution {
        let activity_id = format!("c1-{}", Uuid::new_v4());
        let activity = activity.with_id(activity_id.clone());
        let (accepted, accepted_id) = oneshot::channel();

        let session = Arc::clone(&self.session);
        let signal = self.signal.clone();

        let activities: ActivityBatches = Box::pin(async_stream::try_stream! {
            let first = session.api.execute_turn(activity.clone(), &signal).await?;

            // The backend has the activity; the post is settled from here on.
            let _ = accepted.send(activity_id);

            let mut batches = Arc::clone(&session).iterate(first, Some(activity), signal);
            while let Some(batch) = batches.next().await {
                yield batch?;
            }
        });

        TurnExecution {
            activities,
            activity_id: Box::pin(async move {
                match accepted_id.await {
                    Ok(id) => Ok::<_, TurnError>(id),
                    // execute_turn failed; the error surfaces through `activities`.
                    Err(_) => std::future::pending().await,
                }
            }),
        }
    }
}
