//! Transport session: the bridge's identity on the event stream and the stream's lifetime.
//!
//! MCP frames themselves are carried by rmcp; this module decides when the session counts as
//! open or closed and, when asked, keeps the upstream `text/event-stream` connection alive with
//! automatic reconnects.

pub mod sse;

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, Ordering},
};
use std::time::Duration;

use reqwest::Client;
use tokio::{sync::watch, task::JoinHandle};

use crate::{error::BridgeError, session::BridgeSession};
pub use sse::{SseDecoder, SseEvent, StreamState};

const WATCHER_STOP_TIMEOUT: Duration = Duration::from_secs(5);

struct Watcher {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// One logical streaming connection identity.
pub struct TransportSession {
    stream_url: String,
    closed: AtomicBool,
    state: Arc<StreamState>,
    watcher: Mutex<Option<Watcher>>,
}

impl TransportSession {
    /// Establish the logical identity for `{base_url}/mcp/{client}/sse/{user_id}`.
    pub fn open(base_url: &str, client: &str, user_id: &str) -> Result<Self, BridgeError> {
        BridgeSession::new(base_url, client, user_id).map(|session| Self::for_session(&session))
    }

    /// Open a transport for an already validated identity.
    pub fn for_session(session: &BridgeSession) -> Self {
        let stream_url = session.stream_url();
        tracing::debug!(stream_url = %stream_url, "Transport session opened");
        Self {
            stream_url,
            closed: AtomicBool::new(false),
            state: Arc::new(StreamState::default()),
            watcher: Mutex::new(None),
        }
    }

    /// Canonical stream address.
    pub fn stream_url(&self) -> &str {
        &self.stream_url
    }

    /// Whether [`close`](Self::close) has not yet run.
    pub fn is_open(&self) -> bool {
        !self.closed.load(Ordering::Acquire)
    }

    /// Live view of the upstream stream.
    pub fn stream_state(&self) -> Arc<StreamState> {
        Arc::clone(&self.state)
    }

    /// Start holding the upstream stream open, reconnecting after `reconnect_delay` on drops.
    ///
    /// No-op when the transport is closed or a watcher is already running.
    pub fn watch_stream(
        &self,
        connect_timeout: Duration,
        reconnect_delay: Duration,
    ) -> Result<(), BridgeError> {
        if !self.is_open() {
            return Ok(());
        }
        let mut slot = self
            .watcher
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if slot.is_some() {
            return Ok(());
        }

        // No total timeout: the body is expected to stay open indefinitely.
        let http = Client::builder()
            .user_agent(concat!("openmemory-mcp-bridge/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|err| BridgeError::Configuration(format!("stream client: {err}")))?;

        let (shutdown, receiver) = watch::channel(false);
        let handle = tokio::spawn(sse::watch_stream(
            http,
            self.stream_url.clone(),
            Arc::clone(&self.state),
            reconnect_delay,
            receiver,
        ));
        *slot = Some(Watcher { shutdown, handle });
        tracing::info!(stream_url = %self.stream_url, "Watching upstream stream");
        Ok(())
    }

    /// Release the stream. Safe to call repeatedly; only the first call does any work.
    pub async fn close(&self) -> Result<(), BridgeError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let watcher = self
            .watcher
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();

        if let Some(watcher) = watcher {
            stop_watcher(watcher, WATCHER_STOP_TIMEOUT).await?;
        }

        tracing::debug!(stream_url = %self.stream_url, "Transport session closed");
        Ok(())
    }
}

impl std::fmt::Debug for TransportSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportSession")
            .field("stream_url", &self.stream_url)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

/// Signal the watcher and wait for it; a watcher that overstays `grace` is aborted.
async fn stop_watcher(watcher: Watcher, grace: Duration) -> Result<(), BridgeError> {
    let Watcher {
        shutdown,
        mut handle,
    } = watcher;
    let _ = shutdown.send(true);
    match tokio::time::timeout(grace, &mut handle).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(BridgeError::Transient(format!(
            "stream watcher failed: {err}"
        ))),
        Err(_) => {
            handle.abort();
            Err(BridgeError::Timeout(
                "stream watcher did not stop in time".into(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use httpmock::{Method::GET, MockServer};

    #[test]
    fn open_builds_stream_address() {
        let transport = TransportSession::open("http://localhost:8765", "claude", "moot").unwrap();
        assert_eq!(
            transport.stream_url(),
            "http://localhost:8765/mcp/claude/sse/moot"
        );
        assert!(transport.is_open());
    }

    #[test]
    fn open_rejects_missing_identity() {
        let err = TransportSession::open("http://localhost:8765", "claude", "").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigurationError);
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let transport = TransportSession::open("http://localhost:8765", "claude", "moot").unwrap();
        transport.close().await.expect("first close");
        transport.close().await.expect("second close");
        assert!(!transport.is_open());
    }

    #[tokio::test]
    async fn watcher_records_session_and_reconnects() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/mcp/claude/sse/moot")
                    .header("accept", "text/event-stream");
                then.status(200)
                    .header("content-type", "text/event-stream")
                    .body("event: endpoint\ndata: /mcp/claude/sse/moot/messages/?session_id=s-1\n\n");
            })
            .await;

        let transport = TransportSession::open(&server.base_url(), "claude", "moot").unwrap();
        transport
            .watch_stream(Duration::from_secs(1), Duration::from_millis(20))
            .expect("watch");

        let state = transport.stream_state();
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while state.connections() < 2 && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert!(state.connections() >= 2, "watcher should reconnect");
        assert_eq!(state.session_id().as_deref(), Some("s-1"));
        assert!(mock.hits_async().await >= 2);

        transport.close().await.expect("close");
        assert!(!state.is_connected());
    }

    #[tokio::test]
    async fn stuck_watcher_is_aborted() {
        let (shutdown, _receiver) = watch::channel(false);
        let (alive, dropped) = tokio::sync::oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            let _alive = alive;
            std::future::pending::<()>().await;
        });

        let err = stop_watcher(Watcher { shutdown, handle }, Duration::from_millis(20))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TimeoutError);

        let outcome = tokio::time::timeout(Duration::from_secs(1), dropped)
            .await
            .expect("aborted task should release its state");
        assert!(outcome.is_err());
    }

    #[test]
    fn debug_shows_stream_address() {
        let transport = TransportSession::open("http://localhost:8765", "claude", "moot").unwrap();
        let rendered = format!("{transport:?}");
        assert!(rendered.contains("http://localhost:8765/mcp/claude/sse/moot"));
    }

    #[tokio::test]
    async fn watch_after_close_is_a_no_op() {
        let transport = TransportSession::open("http://127.0.0.1:9", "claude", "moot").unwrap();
        transport.close().await.expect("close");
        transport
            .watch_stream(Duration::from_millis(50), Duration::from_millis(50))
            .expect("no-op");
        assert_eq!(transport.stream_state().connections(), 0);
    }
}
