//! Server-sent events framing for the streaming transport
//!
//! Frame parsing is left to `sse_stream`; this module only picks out the payloads a
//! turn stream cares about.

use crate::error::TurnError;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::{future, Stream, StreamExt};
use sse_stream::SseStream;

/// Data value that ends a turn stream
pub fn is_done_sentinel(data: &str) -> bool {
    matches!(data, "[DONE]" | "DONE")
}

/// The `data` payload of every event in `body`, in order.
///
/// Events without data (comments, bare `event:` or `retry:` fields) are skipped.
pub fn event_data<S, E>(body: S) -> BoxStream<'static, Result<String, TurnError>>
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    SseStream::from_byte_stream(body)
        .filter_map(|event| {
            future::ready(match event {
                Ok(event) => event.data.map(Ok),
                Err(error) => Some(Err(TurnError::Network(error.to_string()))),
            })
        })
        .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    async fn collect(chunks: &[&'static str]) -> Vec<String> {
        let body = stream::iter(
            chunks
                .iter()
                .copied()
                .map(|chunk| Ok::<_, std::io::Error>(Bytes::from_static(chunk.as_bytes())))
                .collect::<Vec<_>>(),
        );

        event_data(body).map(|data| data.unwrap()).collect().await
    }

    #[tokio::test]
    async fn test_single_event() {
        let data = collect(&["event: activity\ndata: {\"activities\":[]}\n\n"]).await;
        assert_eq!(data, vec!["{\"activities\":[]}"]);
    }

    #[tokio::test]
    async fn test_event_split_across_chunks() {
        let data = collect(&["da", "ta: hel", "lo\r\n", "\r\n", "data: again\n\n"]).await;
        assert_eq!(data, vec!["hello", "again"]);
    }

    #[tokio::test]
    async fn test_events_without_data_are_skipped() {
        let body = ": keep-alive\n\nevent: ping\n\nretry: 10\n\ndata: [DONE]\n\n";
        let data = collect(&[body]).await;
        assert_eq!(data, vec!["[DONE]"]);
    }

    #[test]
    fn test_done_sentinels() {
        assert!(is_done_sentinel("[DONE]"));
        assert!(is_done_sentinel("DONE"));
        assert!(!is_done_sentinel("{\"activities\":[]}"));
    }
}
