//! HTTP implementation of the turn protocol
//!
//! Buffered transport: every call is one JSON POST answered with one [`TurnResponse`].
//! Streaming transport: one POST answered with a `text/event-stream` body whose frames
//! each carry a response fragment.

use super::retry::with_retries;
use super::sse::{event_data, is_done_sentinel};
use super::strategy::{resolve_conversation_url, PreparedRequest, StaticStrategy, TurnStrategy};
use super::telemetry::Telemetry;
use super::{TurnApi, TurnStream};
use crate::error::TurnError;
use crate::models::{
    Activity, Configuration, ConversationId, RetryPolicy, Transport, TurnBatch, TurnResponse,
};
use crate::reactive::AbortSignal;
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::Client;
use serde_json::{Map, Value};
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};

const CONVERSATION_ID_HEADER: &str = "x-ms-conversationid";
const EVENT_STREAM: &str = "text/event-stream";

/// Turn protocol client over HTTP.
///
/// Owned by exactly one conversation: the first conversation id the backend returns is
/// kept for the client's lifetime.
pub struct TurnClient {
    strategy: Arc<dyn TurnStrategy>,
    http: Client,
    telemetry: Option<Arc<dyn Telemetry>>,
    retry: RetryPolicy,
    conversation_id: Arc<OnceLock<ConversationId>>,
}

impl TurnClient {
    pub fn new(strategy: impl TurnStrategy + 'static) -> Self {
        Self {
            strategy: Arc::new(strategy),
            http: Client::new(),
            telemetry: None,
            retry: RetryPolicy::default(),
            conversation_id: Arc::new(OnceLock::new()),
        }
    }

    /// Client for the endpoint, headers, transport and retry policy in `config`
    pub fn from_configuration(config: &Configuration) -> Result<Self, TurnError> {
        let strategy = StaticStrategy::from_configuration(config)?;
        Ok(Self::new(strategy).with_retry_policy(config.retry.clone()))
    }

    pub fn with_telemetry(mut self, telemetry: Arc<dyn Telemetry>) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_http_client(mut self, http: Client) -> Self {
        self.http = http;
        self
    }

    async fn post(
        &self,
        prepared: PreparedRequest,
        payload: Map<String, Value>,
        signal: &AbortSignal,
    ) -> Result<TurnStream, TurnError> {
        match prepared.transport {
            Transport::Rest => self.post_with_rest(&prepared, &payload, signal).await,
            Transport::ServerSentEvents => {
                self.post_with_server_sent_events(&prepared, &payload, signal)
                    .await
            }
        }
    }

    async fn post_with_rest(
        &self,
        prepared: &PreparedRequest,
        payload: &Map<String, Value>,
        signal: &AbortSignal,
    ) -> Result<TurnStream, TurnError> {
        let response = with_retries(
            &self.retry,
            self.telemetry.as_deref(),
            signal,
            move || async move {
                let response = self.send(prepared, payload, false).await?;
                let body = response.bytes().await?;
                let parsed = serde_json::from_slice::<TurnResponse>(&body)?;
                Ok::<_, TurnError>(parsed)
            },
        )
        .await?;

        debug!(
            action = ?response.action,
            activities = response.activities.len(),
            "Received turn response"
        );

        remember_conversation_id(&self.conversation_id, response.conversation_id.clone());

        let batch = TurnBatch::from(response);
        Ok(Box::pin(futures_util::stream::iter([Ok(batch)])))
    }

    async fn post_with_server_sent_events(
        &self,
        prepared: &PreparedRequest,
        payload: &Map<String, Value>,
        signal: &AbortSignal,
    ) -> Result<TurnStream, TurnError> {
        let response = with_retries(
            &self.retry,
            self.telemetry.as_deref(),
            signal,
            move || async move {
                let response = self.send(prepared, payload, true).await?;

                let content_type = response
                    .headers()
                    .get(CONTENT_TYPE)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or_default()
                    .to_string();

                if content_type != EVENT_STREAM {
                    return Err(TurnError::UnexpectedContentType(content_type));
                }

                Ok(response)
            },
        )
        .await?;

        let conversation_id = Arc::clone(&self.conversation_id);
        let signal = signal.clone();

        let stream: TurnStream = Box::pin(async_stream::try_stream! {
            let mut events = event_data(response.bytes_stream());

            loop {
                let Some(data) = signal.race(async { Ok(events.next().await) }).await? else {
                    break;
                };
                let data = data?;
                if is_done_sentinel(&data) {
                    break;
                }

                let fragment =
                    serde_json::from_str::<TurnResponse>(&data).map_err(TurnError::from)?;
                remember_conversation_id(&conversation_id, fragment.conversation_id);

                yield TurnBatch::waiting(fragment.activities);
            }
        });

        Ok(stream)
    }

    async fn send(
        &self,
        prepared: &PreparedRequest,
        payload: &Map<String, Value>,
        accept_events: bool,
    ) -> Result<reqwest::Response, TurnError> {
        let conversation_id = self.conversation_id.get();
        let url = resolve_conversation_url(
            &prepared.base_url,
            conversation_id.map(ConversationId::as_str),
        )?;

        debug!(%url, transport = ?prepared.transport, "Sending turn request");

        let mut request = self.http.post(url);
        for (name, value) in &prepared.headers {
            request = request.header(name, value);
        }
        if let Some(id) = conversation_id {
            request = request.header(CONVERSATION_ID_HEADER, id.as_str());
        }
        if accept_events {
            request = request.header(ACCEPT, EVENT_STREAM);
        }

        let response = request
            .header(CONTENT_TYPE, "application/json")
            .json(payload)
            .send()
            .await?;

        ensure_success(response)
    }
}

fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, TurnError> {
    if response.status().is_success() {
        Ok(response)
    } else {
        Err(TurnError::Status {
            status: response.status().as_u16(),
        })
    }
}

/// Keep the first conversation id; later ones are ignored
fn remember_conversation_id(slot: &OnceLock<ConversationId>, id: Option<ConversationId>) {
    let Some(id) = id else {
        return;
    };

    if let Err(id) = slot.set(id) {
        if slot.get() != Some(&id) {
            warn!(conversation_id = %id, "Ignoring conversation id change");
        }
    }
}

#[async_trait]
impl TurnApi for TurnClient {
    async fn start_new_conversation(
        &self,
        emit_start_conversation_event: bool,
        signal: &AbortSignal,
    ) -> Result<TurnStream, TurnError> {
        let prepared = self.strategy.prepare_start_new_conversation().await?;

        let mut payload = prepared.body.clone().unwrap_or_default();
        payload.insert(
            "emitStartConversationEvent".to_string(),
            Value::Bool(emit_start_conversation_event),
        );

        self.post(prepared, payload, signal).await
    }

    async fn execute_turn(
        &self,
        activity: Activity,
        signal: &AbortSignal,
    ) -> Result<TurnStream, TurnError> {
        if self.conversation_id.get().is_none() {
            return Err(TurnError::NoConversation("execute_turn"));
        }

        let prepared = self.strategy.prepare_execute_turn().await?;

        let mut payload = prepared.body.clone().unwrap_or_default();
        payload.insert("activity".to_string(), serde_json::to_value(&activity)?);

        self.post(prepared, payload, signal).await
    }

    async fn continue_turn(&self, signal: &AbortSignal) -> Result<TurnStream, TurnError> {
        if self.conversation_id.get().is_none() {
            return Err(TurnError::NoConversation("continue_turn"));
        }

        let prepared = self.strategy.prepare_execute_turn().await?;
        if prepared.transport == Transport::ServerSentEvents {
            return Err(TurnError::Unsupported(
                "continue_turn() is folded into the open event stream".to_string(),
            ));
        }

        let payload = prepared.body.clone().unwrap_or_default();
        self.post(prepared, payload, signal).await
    }

    fn conversation_id(&self) -> Option<ConversationId> {
        self.conversation_id.get().cloned()
    }
}
