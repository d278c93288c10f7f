//! Endpoint strategies
//!
//! A strategy tells the client where and how to send each kind of turn. Backend
//! variants (published bots, test canvases, prebuilt bots) each implement
//! [`TurnStrategy`]; the client never inspects how the values are computed.

use crate::error::TurnError;
use crate::models::{Configuration, Transport};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use url::Url;

/// Everything the client needs to issue one turn request
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedRequest {
    /// `conversations[/{id}]` is resolved against this URL
    pub base_url: Url,
    pub headers: BTreeMap<String, String>,
    /// Extra body fields merged into the request payload
    pub body: Option<Map<String, Value>>,
    pub transport: Transport,
}

impl PreparedRequest {
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            headers: BTreeMap::new(),
            body: None,
            transport: Transport::Rest,
        }
    }

    pub fn with_transport(mut self, transport: Transport) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

/// Supplies endpoint, headers and body for a backend variant
#[async_trait]
pub trait TurnStrategy: Send + Sync {
    async fn prepare_start_new_conversation(&self) -> Result<PreparedRequest, TurnError>;

    /// Used for both `execute_turn` and `continue_turn`
    async fn prepare_execute_turn(&self) -> Result<PreparedRequest, TurnError>;
}

/// Strategy returning the same request settings for every call
#[derive(Debug, Clone)]
pub struct StaticStrategy {
    request: PreparedRequest,
}

impl StaticStrategy {
    pub fn new(request: PreparedRequest) -> Self {
        Self { request }
    }

    /// Build from configuration values
    pub fn from_configuration(config: &Configuration) -> Result<Self, TurnError> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| TurnError::InvalidRequest(format!("base_url: {}", e)))?;

        Ok(Self::new(PreparedRequest {
            base_url,
            headers: config.headers.clone(),
            body: None,
            transport: config.transport,
        }))
    }
}

#[async_trait]
impl TurnStrategy for StaticStrategy {
    async fn prepare_start_new_conversation(&self) -> Result<PreparedRequest, TurnError> {
        Ok(self.request.clone())
    }

    async fn prepare_execute_turn(&self) -> Result<PreparedRequest, TurnError> {
        Ok(self.request.clone())
    }
}

/// Resolve `conversations[/{id}]` against `base_url`, keeping its query and fragment.
pub fn resolve_conversation_url(
    base_url: &Url,
    conversation_id: Option<&str>,
) -> Result<Url, TurnError> {
    let mut base = base_url.clone();
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }

    let mut url = base
        .join("conversations")
        .map_err(|e| TurnError::InvalidRequest(e.to_string()))?;

    if let Some(id) = conversation_id {
        url.path_segments_mut()
            .map_err(|_| TurnError::InvalidRequest(format!("cannot be a base: {}", base_url)))?
            .push(id);
    }

    url.set_query(base_url.query());
    url.set_fragment(base_url.fragment());
    Ok(url)
}
