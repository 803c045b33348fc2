//! SSE framing + reconnect-with-backoff. `spec.md` §4.B.
//!
//! One long-lived task per topic: `GET {base_url}/eth/v1/events?topics=<topic>` with
//! `Accept: text/event-stream`, no client timeout. On read error or non-200, close,
//! wait `retry_delay` (5s normally, 60s if the response was HTTP 400 -- the topic is
//! unsupported by this node), and reconnect. Reconnect is independent per topic, as in
//! the teacher's one-reader-per-topic SSE loops (see `mev-build-rs::reth_builder::service`
//! for the sibling pattern of one `tokio::spawn`ed loop per long-lived stream).

use super::types::Topic;
use futures_util::StreamExt;
use reqwest::StatusCode;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const NORMAL_RETRY_DELAY: Duration = Duration::from_secs(5);
const UNSUPPORTED_TOPIC_RETRY_DELAY: Duration = Duration::from_secs(60);

/// A single accumulated `event: <type>\ndata: <json>\n\n` frame.
#[derive(Debug, Clone)]
pub(crate) struct Frame {
    pub event: Option<String>,
    pub data: String,
}

/// Accumulates SSE lines into frames, dispatching one per blank line.
#[derive(Default)]
struct FrameAccumulator {
    event: Option<String>,
    data: Vec<String>,
}

impl FrameAccumulator {
    fn push_line(&mut self, line: &str) -> Option<Frame> {
        if line.is_empty() {
            if self.data.is_empty() {
                self.event = None;
                return None;
            }
            let frame = Frame { event: self.event.take(), data: self.data.join("\n") };
            self.data.clear();
            return Some(frame);
        }
        if let Some(rest) = line.strip_prefix("event:") {
            self.event = Some(rest.trim().to_string());
        } else if let Some(rest) = line.strip_prefix("data:") {
            self.data.push(rest.trim_start().to_string());
        }
        // comments (`:`) and unrecognized fields are ignored, per the SSE spec.
        None
    }
}

/// Runs the reconnect loop for a single topic, calling `on_frame` for every frame the
/// server sends. Returns only when `cancel` fires.
pub(crate) async fn run_topic_loop<F>(
    client: reqwest::Client,
    base_url: &str,
    topic: Topic,
    cancel: CancellationToken,
    mut on_frame: F,
) where
    F: FnMut(Frame) + Send,
{
    let url = format!("{}/eth/v1/events?topics={}", base_url.trim_end_matches('/'), topic.as_str());
    loop {
        if cancel.is_cancelled() {
            return;
        }
        tracing::debug!(topic = topic.as_str(), "connecting to SSE endpoint");
        let response = tokio::select! {
            _ = cancel.cancelled() => return,
            result = client.get(&url).header("Accept", "text/event-stream").send() => result,
        };

        let response = match response {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!(topic = topic.as_str(), err = %err, "SSE connection error; retrying");
                sleep_or_cancel(NORMAL_RETRY_DELAY, &cancel).await;
                continue;
            }
        };

        if response.status() != StatusCode::OK {
            let status = response.status();
            let delay = if status == StatusCode::BAD_REQUEST {
                tracing::warn!(topic = topic.as_str(), "topic unsupported by this node (HTTP 400); entering slow-retry");
                UNSUPPORTED_TOPIC_RETRY_DELAY
            } else {
                tracing::warn!(topic = topic.as_str(), status = %status, "unexpected SSE status; retrying");
                NORMAL_RETRY_DELAY
            };
            sleep_or_cancel(delay, &cancel).await;
            continue;
        }

        let mut byte_stream = response.bytes_stream();
        let mut accumulator = FrameAccumulator::default();
        let mut carry = String::new();

        loop {
            let chunk = tokio::select! {
                _ = cancel.cancelled() => return,
                chunk = byte_stream.next() => chunk,
            };
            let chunk = match chunk {
                Some(Ok(chunk)) => chunk,
                Some(Err(err)) => {
                    tracing::warn!(topic = topic.as_str(), err = %err, "SSE stream read error; reconnecting");
                    break;
                }
                None => {
                    tracing::warn!(topic = topic.as_str(), "SSE stream closed by server; reconnecting");
                    break;
                }
            };
            carry.push_str(&String::from_utf8_lossy(&chunk));
            while let Some(idx) = carry.find('\n') {
                let line: String = carry.drain(..=idx).collect();
                let line = line.trim_end_matches(['\n', '\r']);
                if let Some(frame) = accumulator.push_line(line) {
                    on_frame(frame);
                }
            }
        }
        sleep_or_cancel(NORMAL_RETRY_DELAY, &cancel).await;
    }
}

async fn sleep_or_cancel(delay: Duration, cancel: &CancellationToken) {
    tokio::select! {
        _ = cancel.cancelled() => {}
        _ = tokio::time::sleep(delay) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulates_one_frame_per_blank_line() {
        let mut accumulator = FrameAccumulator::default();
        assert!(accumulator.push_line("event: payload_attributes").is_none());
        assert!(accumulator.push_line("data: {\"a\":1}").is_none());
        let frame = accumulator.push_line("").expect("frame dispatched on blank line");
        assert_eq!(frame.event.as_deref(), Some("payload_attributes"));
        assert_eq!(frame.data, "{\"a\":1}");
    }

    #[test]
    fn multi_line_data_is_joined_with_newlines() {
        let mut accumulator = FrameAccumulator::default();
        accumulator.push_line("data: line one");
        accumulator.push_line("data: line two");
        let frame = accumulator.push_line("").unwrap();
        assert_eq!(frame.data, "line one\nline two");
    }

    #[test]
    fn blank_line_with_no_data_is_not_a_frame() {
        let mut accumulator = FrameAccumulator::default();
        assert!(accumulator.push_line("").is_none());
    }
}
