//! Turn protocol data structures

use super::Activity;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Opaque conversation token assigned by the backend
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(String);

impl ConversationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConversationId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Server-signaled directive telling the client whether another call is required
/// to finish the current turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
pub enum ContinuationAction {
    #[serde(rename = "continue")]
    Continue,
    #[serde(rename = "waiting")]
    #[default]
    Waiting,
}

impl ContinuationAction {
    /// Parse an action, accepting both lower-case and the legacy capitalized form.
    pub fn parse(action: &str) -> Option<Self> {
        if action.eq_ignore_ascii_case("continue") {
            Some(Self::Continue)
        } else if action.eq_ignore_ascii_case("waiting") {
            Some(Self::Waiting)
        } else {
            None
        }
    }
}

impl<'de> Deserialize<'de> for ContinuationAction {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let action = String::deserialize(deserializer)?;
        Self::parse(&action).ok_or_else(|| {
            serde::de::Error::custom(format!("unknown continuation action \"{}\"", action))
        })
    }
}

/// Body of a buffered-transport response, or one fragment of a streamed one.
///
/// Streamed fragments never carry `action`; it defaults to `Waiting`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnResponse {
    #[serde(default)]
    pub action: ContinuationAction,
    pub activities: Vec<Activity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<ConversationId>,
}

/// One batch of activities pulled from a turn stream.
///
/// `action` tells the consumer whether an explicit `continue_turn` call is needed once
/// the stream that produced this batch is exhausted.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnBatch {
    pub activities: Vec<Activity>,
    pub action: ContinuationAction,
}

impl TurnBatch {
    pub fn new(activities: Vec<Activity>, action: ContinuationAction) -> Self {
        Self { activities, action }
    }

    /// A batch after which no continuation call is needed
    pub fn waiting(activities: Vec<Activity>) -> Self {
        Self::new(activities, ContinuationAction::Waiting)
    }

    /// A batch after which the consumer must call `continue_turn`
    pub fn continuing(activities: Vec<Activity>) -> Self {
        Self::new(activities, ContinuationAction::Continue)
    }
}

impl From<TurnResponse> for TurnBatch {
    fn from(response: TurnResponse) -> Self {
        Self::new(response.activities, response.action)
    }
}

/// Connection status as observed by consumers of the activity stream.
///
/// Numeric values follow the Direct Line convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ConnectionStatus {
    Uninitialized = 0,
    Connecting = 1,
    Online = 2,
    FailedToConnect = 4,
    Ended = 5,
}

impl ConnectionStatus {
    /// Terminal statuses are followed only by stream completion
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::FailedToConnect | Self::Ended)
    }
}

/// Wire transport used for a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Transport {
    /// Buffered request/response polling
    #[serde(rename = "rest")]
    #[default]
    Rest,
    /// One POST answered with a `text/event-stream` body
    #[serde(rename = "server sent events")]
    ServerSentEvents,
}
