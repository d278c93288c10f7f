//! Shared helpers for integration tests: a scripted bot backend served by warp.

#![allow(dead_code)]

use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use turnloop_core::client::{PreparedRequest, StaticStrategy};
use turnloop_core::models::{RetryPolicy, Transport};
use turnloop_core::TurnClient;
use url::Url;
use warp::http::{HeaderMap, Response};
use warp::Filter;

/// One canned HTTP answer
#[derive(Debug, Clone)]
pub struct Reply {
    status: u16,
    content_type: String,
    body: String,
}

impl Reply {
    pub fn json(body: Value) -> Self {
        Self {
            status: 200,
            content_type: "application/json".to_string(),
            body: body.to_string(),
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            content_type: "application/json".to_string(),
            body: json!({ "error": status }).to_string(),
        }
    }

    /// A `text/event-stream` body with one frame per fragment, optionally ended by `[DONE]`
    pub fn events(fragments: &[Value], done: bool) -> Self {
        let mut body = String::new();
        for fragment in fragments {
            body.push_str("event: activity\n");
            body.push_str(&format!("data: {}\n\n", fragment));
        }
        if done {
            body.push_str("event: end\ndata: [DONE]\n\n");
        }

        Self {
            status: 200,
            content_type: "text/event-stream".to_string(),
            body,
        }
    }

    /// A `text/event-stream` reply with a hand-written body
    pub fn event_stream(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            content_type: "text/event-stream".to_string(),
            body: body.into(),
        }
    }

    pub fn with_content_type(mut self, content_type: &str) -> Self {
        self.content_type = content_type.to_string();
        self
    }
}

/// What the backend received
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub path: String,
    pub query: Option<String>,
    pub headers: HashMap<String, String>,
    pub body: Value,
}

/// Bot backend answering every POST with the next scripted reply.
///
/// The last scripted reply is repeated once the script runs out.
pub struct MockBackend {
    pub addr: SocketAddr,
    replies: Arc<Mutex<VecDeque<Reply>>>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockBackend {
    pub fn start(replies: Vec<Reply>) -> Self {
        let replies = Arc::new(Mutex::new(VecDeque::from(replies)));
        let requests = Arc::new(Mutex::new(Vec::new()));

        let script = Arc::clone(&replies);
        let record = Arc::clone(&requests);
        let route = warp::post()
            .and(warp::path::full())
            .and(
                warp::query::raw()
                    .map(Some)
                    .or(warp::any().map(|| None))
                    .unify(),
            )
            .and(warp::header::headers_cloned())
            .and(warp::body::json())
            .map(
                move |path: warp::path::FullPath,
                      query: Option<String>,
                      headers: HeaderMap,
                      body: Value| {
                    record.lock().unwrap().push(RecordedRequest {
                        path: path.as_str().to_string(),
                        query,
                        headers: headers
                            .iter()
                            .filter_map(|(name, value)| {
                                Some((name.as_str().to_string(), value.to_str().ok()?.to_string()))
                            })
                            .collect(),
                        body,
                    });

                    let reply = {
                        let mut script = script.lock().unwrap();
                        if script.len() > 1 {
                            script.pop_front()
                        } else {
                            script.front().cloned()
                        }
                    }
                    .unwrap_or_else(|| Reply::status(404));

                    Response::builder()
                        .status(reply.status)
                        .header("content-type", reply.content_type)
                        .body(reply.body)
                        .unwrap()
                },
            );

        let (addr, server) = warp::serve(route).bind_ephemeral(([127, 0, 0, 1], 0));
        tokio::spawn(server);

        Self {
            addr,
            replies,
            requests,
        }
    }

    pub fn base_url(&self) -> Url {
        Url::parse(&format!("http://{}/bots/b1?api-version=1", self.addr)).unwrap()
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Append more replies to the script
    pub fn script(&self, replies: Vec<Reply>) {
        self.replies.lock().unwrap().extend(replies);
    }

    /// Client for this backend with millisecond retry delays
    pub fn client(&self, transport: Transport) -> TurnClient {
        let request = PreparedRequest::new(self.base_url())
            .with_transport(transport)
            .with_header("authorization", "Bearer test-token");

        TurnClient::new(StaticStrategy::new(request))
            .with_retry_policy(RetryPolicy::with_initial_delay(Duration::from_millis(1)))
    }
}

/// A buffered-transport response body
pub fn turn_response(action: &str, texts: &[&str], conversation_id: Option<&str>) -> Value {
    let activities: Vec<Value> = texts
        .iter()
        .map(|text| json!({ "type": "message", "text": text }))
        .collect();

    let mut body = json!({ "action": action, "activities": activities });
    if let Some(id) = conversation_id {
        body["conversationId"] = json!(id);
    }
    body
}
