//! Activity data structures

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Key under `channelData` carrying the client-injected ordering tag
pub const SEQUENCE_ID_KEY: &str = "webchat:sequence-id";

/// One opaque message/event unit exchanged between client and bot.
///
/// Only the fields the orchestrator touches are modelled; everything else is kept in
/// `extra` and serialized back unchanged.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub activity_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    /// Freeform metadata bag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_data: Option<Map<String, Value>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Activity {
    /// Create a message activity with the given text
    pub fn message(text: impl Into<String>) -> Self {
        Self {
            activity_type: Some("message".to_string()),
            text: Some(text.into()),
            ..Default::default()
        }
    }

    /// Create an event activity with the given name
    pub fn event(name: impl Into<String>) -> Self {
        let mut extra = Map::new();
        extra.insert("name".to_string(), Value::String(name.into()));
        Self {
            activity_type: Some("event".to_string()),
            extra,
            ..Default::default()
        }
    }

    /// Return a copy with the given id
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Ordering tag injected by the orchestrator, if any
    pub fn sequence_id(&self) -> Option<u64> {
        self.channel_data
            .as_ref()
            .and_then(|data| data.get(SEQUENCE_ID_KEY))
            .and_then(Value::as_u64)
    }

    /// Drop `replyToId`, tag the activity with `sequence_id` and stamp the current time.
    pub fn stamped(mut self, sequence_id: u64) -> Self {
        self.reply_to_id = None;
        self.channel_data
            .get_or_insert_with(Map::new)
            .insert(SEQUENCE_ID_KEY.to_string(), Value::from(sequence_id));
        self.timestamp = Some(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true));
        self
    }
}
