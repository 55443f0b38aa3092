//! Server-sent event decoding and the upstream stream watcher.

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, AtomicU64, Ordering},
};
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::{Client, header};
use tokio::sync::watch;

/// One dispatched SSE event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// Event name; `message` when the frame did not name one.
    pub event: String,
    /// Joined `data:` lines.
    pub data: String,
    /// Last `id:` seen in the frame.
    pub id: Option<String>,
}

/// Incremental decoder for `text/event-stream` bodies.
///
/// Chunks may split lines, frames, and multi-byte characters arbitrarily; bytes are only decoded
/// once a whole line has arrived, and complete events are returned as soon as their terminating
/// blank line arrives.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
    id: Option<String>,
}

impl SseDecoder {
    /// Create an empty decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and collect the events it completes.
    pub fn push(&mut self, chunk: impl AsRef<[u8]>) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk.as_ref());
        let mut events = Vec::new();

        while let Some(newline) = self.buffer.iter().position(|byte| *byte == b'\n') {
            let mut raw: Vec<u8> = self.buffer.drain(..=newline).collect();
            raw.pop();
            if raw.last() == Some(&b'\r') {
                raw.pop();
            }
            let line = String::from_utf8_lossy(&raw);

            if line.is_empty() {
                if let Some(event) = self.dispatch() {
                    events.push(event);
                }
                continue;
            }
            if line.starts_with(':') {
                continue;
            }

            let (field, value) = match line.split_once(':') {
                Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
                None => (&*line, ""),
            };
            match field {
                "event" => self.event = Some(value.to_string()),
                "data" => self.data.push(value.to_string()),
                "id" => self.id = Some(value.to_string()),
                _ => {}
            }
        }

        events
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        let event = self.event.take();
        let id = self.id.take();
        if self.data.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseEvent {
            event: event.unwrap_or_else(|| "message".to_string()),
            data,
            id,
        })
    }
}

/// Extract the upstream session id from an `endpoint` event payload.
pub(crate) fn session_id_from_endpoint(data: &str) -> Option<&str> {
    let (_, rest) = data.split_once("session_id=")?;
    let id = rest.split('&').next().unwrap_or(rest).trim();
    (!id.is_empty()).then_some(id)
}

/// Observable state of the upstream stream.
#[derive(Debug, Default)]
pub struct StreamState {
    connected: AtomicBool,
    connections: AtomicU64,
    session_id: Mutex<Option<String>>,
}

impl StreamState {
    /// Whether the watcher currently holds an open stream.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Number of successful connections made so far, reconnects included.
    pub fn connections(&self) -> u64 {
        self.connections.load(Ordering::Acquire)
    }

    /// Session id announced by the most recent `endpoint` event.
    pub fn session_id(&self) -> Option<String> {
        self.session_id
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn set_session_id(&self, id: &str) {
        *self
            .session_id
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(id.to_string());
    }
}

/// Hold the upstream stream open until `shutdown` flips, reconnecting after drops.
pub(crate) async fn watch_stream(
    http: Client,
    url: String,
    state: Arc<StreamState>,
    reconnect_delay: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        if *shutdown.borrow() {
            break;
        }

        tokio::select! {
            outcome = consume_stream(&http, &url, &state) => {
                state.connected.store(false, Ordering::Release);
                match outcome {
                    Ok(()) => tracing::warn!(url = %url, "Upstream stream ended; reconnecting"),
                    Err(error) => tracing::warn!(url = %url, %error, "Upstream stream failed; reconnecting"),
                }
            }
            _ = shutdown.changed() => break,
        }

        tokio::select! {
            _ = tokio::time::sleep(reconnect_delay) => {}
            _ = shutdown.changed() => break,
        }
    }

    state.connected.store(false, Ordering::Release);
    tracing::debug!(url = %url, "Upstream stream watcher stopped");
}

async fn consume_stream(
    http: &Client,
    url: &str,
    state: &StreamState,
) -> Result<(), reqwest::Error> {
    let response = http
        .get(url)
        .header(header::ACCEPT, "text/event-stream")
        .send()
        .await?
        .error_for_status()?;

    state.connected.store(true, Ordering::Release);
    state.connections.fetch_add(1, Ordering::AcqRel);
    tracing::info!(url, "Connected to upstream stream");

    let mut decoder = SseDecoder::new();
    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        for event in decoder.push(&chunk) {
            if event.event == "endpoint" {
                if let Some(id) = session_id_from_endpoint(&event.data) {
                    tracing::info!(session_id = id, "Upstream session established");
                    state.set_session_id(id);
                }
            } else {
                tracing::trace!(event = %event.event, bytes = event.data.len(), "Upstream event");
            }
        }
    }

    Ok(())
}
