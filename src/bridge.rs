//! Bridge lifecycle: wiring, per-invocation isolation, and shutdown.
//!
//! Every invocation runs as its own future: validate, call the memory service, format. Whatever
//! happens inside (validation failure, timeout, refused connection, even a panic) comes back as a
//! [`ToolResult`], so one bad call never takes the session down with it.

use std::panic::AssertUnwindSafe;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::time::Duration;

use futures_util::FutureExt;
use rmcp::model::JsonObject;
use serde_json::Value;
use tokio::sync::Semaphore;

use crate::{
    config::BridgeSettings,
    error::BridgeError,
    mcp::{
        format::ToolResult,
        tools::{Dispatcher, ToolInvocation},
    },
    memory::{MemoryServiceApi, MemoryServiceClient},
    session::BridgeSession,
    transport::TransportSession,
};

const DRAIN_GRACE: Duration = Duration::from_secs(1);

/// A running bridge bound to one session identity.
pub struct Bridge {
    session: BridgeSession,
    transport: TransportSession,
    memory: Arc<dyn MemoryServiceApi>,
    dispatcher: Dispatcher,
    settings: BridgeSettings,
    in_flight: Semaphore,
    stopped: AtomicBool,
}

impl Bridge {
    /// Open the transport, bind an HTTP client to `session.base_url()`, and start accepting calls.
    pub fn start(session: BridgeSession, settings: BridgeSettings) -> Result<Self, BridgeError> {
        let memory = MemoryServiceClient::new(
            session.base_url(),
            settings.request_timeout,
            settings.connect_timeout,
        )?;
        Self::with_memory_service(session, settings, Arc::new(memory))
    }

    /// Start a bridge against an arbitrary memory service implementation.
    pub fn with_memory_service(
        session: BridgeSession,
        settings: BridgeSettings,
        memory: Arc<dyn MemoryServiceApi>,
    ) -> Result<Self, BridgeError> {
        if settings.max_in_flight == 0 {
            return Err(BridgeError::Configuration(
                "max_in_flight must be at least 1".into(),
            ));
        }

        let transport = TransportSession::for_session(&session);
        if settings.watch_stream {
            transport.watch_stream(settings.connect_timeout, settings.reconnect_delay)?;
        }

        tracing::info!(
            base_url = %session.base_url(),
            client = %session.client(),
            user_id = %session.user_id(),
            stream_url = %transport.stream_url(),
            "Bridge started"
        );

        Ok(Self {
            dispatcher: Dispatcher::new(settings.default_page_size),
            in_flight: Semaphore::new(settings.max_in_flight as usize),
            session,
            transport,
            memory,
            settings,
            stopped: AtomicBool::new(false),
        })
    }

    /// Identity of this bridge.
    pub fn session(&self) -> &BridgeSession {
        &self.session
    }

    /// Transport session owned by this bridge.
    pub fn transport(&self) -> &TransportSession {
        &self.transport
    }

    /// Runtime settings in effect.
    pub fn settings(&self) -> &BridgeSettings {
        &self.settings
    }

    /// Whether [`stop`](Self::stop) has been called.
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Handle one tool call. Always yields a result; never panics or propagates an error.
    pub async fn invoke(&self, tool: &str, arguments: Option<JsonObject>) -> ToolResult {
        let outcome = AssertUnwindSafe(self.run(tool, arguments.as_ref()))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| {
                tracing::error!(tool, "Tool handler panicked");
                Err(BridgeError::Transient(format!(
                    "`{tool}` failed unexpectedly"
                )))
            });

        match &outcome {
            Ok(_) => tracing::debug!(tool, "Tool call succeeded"),
            Err(error) => tracing::warn!(
                tool,
                kind = %error.kind(),
                error = %error.message(),
                "Tool call failed"
            ),
        }

        ToolResult::from(outcome)
    }

    async fn run(&self, tool: &str, arguments: Option<&JsonObject>) -> Result<Value, BridgeError> {
        if self.is_stopped() {
            return Err(shutting_down());
        }
        let _permit = self.in_flight.acquire().await.map_err(|_| shutting_down())?;

        let invocation = self.dispatcher.parse(tool, arguments)?;
        tokio::time::timeout(self.settings.call_timeout, self.dispatch_with_retry(&invocation))
            .await
            .unwrap_or_else(|_| {
                Err(BridgeError::Timeout(format!(
                    "`{tool}` did not finish within {}s",
                    self.settings.call_timeout.as_secs()
                )))
            })
    }

    async fn dispatch_with_retry(&self, invocation: &ToolInvocation) -> Result<Value, BridgeError> {
        let tool = invocation.tool();
        let attempts = if tool.is_read_only() {
            self.settings.read_retries.saturating_add(1)
        } else {
            1
        };

        let mut attempt = 1;
        loop {
            let outcome = self
                .dispatcher
                .dispatch(invocation, self.memory.as_ref(), &self.session)
                .await;
            match outcome {
                Err(error) if error.is_retryable() && attempt < attempts => {
                    let backoff = self.settings.retry_backoff * attempt;
                    tracing::warn!(
                        tool = %tool,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %error,
                        "Retrying read-only tool"
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    /// Drain in-flight calls, then close the memory client and the transport.
    ///
    /// Idempotent. Both closes are always attempted; their errors are logged, never returned.
    pub async fn stop(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        tracing::info!("Stopping bridge");

        let drain = self.settings.call_timeout + DRAIN_GRACE;
        match tokio::time::timeout(drain, self.in_flight.acquire_many(self.settings.max_in_flight))
            .await
        {
            Ok(Ok(permits)) => permits.forget(),
            Ok(Err(_)) => {}
            Err(_) => tracing::warn!(
                drain_secs = drain.as_secs(),
                "In-flight tool calls did not drain; closing anyway"
            ),
        }
        self.in_flight.close();

        if let Err(error) = self.memory.close().await {
            tracing::error!(%error, "Failed to close memory service client");
        }
        if let Err(error) = self.transport.close().await {
            tracing::error!(%error, "Failed to close transport session");
        }
        tracing::info!("Bridge stopped");
    }
}

fn shutting_down() -> BridgeError {
    BridgeError::Transient("bridge is shutting down".into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::ErrorKind,
        memory::{
            AddMemoriesResponse, MemoryPage, MemoryServiceError,
            types::Configuration,
        },
    };
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    /// Scripted memory service that counts calls.
    #[derive(Default)]
    struct FakeMemory {
        add_calls: AtomicUsize,
        get_calls: AtomicUsize,
        config_calls: AtomicUsize,
        close_calls: AtomicUsize,
        unavailable: bool,
        get_failures: AtomicUsize,
        delay: Option<Duration>,
        panic_on_config: bool,
    }

    fn unavailable(operation: &'static str) -> MemoryServiceError {
        MemoryServiceError::Unavailable {
            operation,
            message: "connection refused".into(),
        }
    }

    #[async_trait]
    impl MemoryServiceApi for FakeMemory {
        async fn add_memories(
            &self,
            _user_id: &str,
            texts: &[String],
        ) -> Result<AddMemoriesResponse, MemoryServiceError> {
            self.add_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.unavailable {
                return Err(unavailable("add_memories"));
            }
            Ok(AddMemoriesResponse {
                results: texts
                    .iter()
                    .enumerate()
                    .map(|(index, text)| json!({ "id": format!("m-{index}"), "memory": text }))
                    .collect(),
            })
        }

        async fn get_memories(
            &self,
            _user_id: &str,
            _page: u32,
            _size: u32,
        ) -> Result<MemoryPage, MemoryServiceError> {
            self.get_calls.fetch_add(1, Ordering::SeqCst);
            if self.unavailable {
                return Err(unavailable("get_memories"));
            }
            if self
                .get_failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
                .is_ok()
            {
                return Err(unavailable("get_memories"));
            }
            Ok(MemoryPage {
                items: Vec::new(),
                total: 0,
                page: None,
                size: None,
                pages: None,
            })
        }

        async fn get_configuration(
            &self,
            _section: Option<&str>,
        ) -> Result<Configuration, MemoryServiceError> {
            self.config_calls.fetch_add(1, Ordering::SeqCst);
            if self.panic_on_config {
                panic!("scripted panic");
            }
            Ok(json!({ "mem0": { "llm": { "provider": "mistral" } } })
                .as_object()
                .cloned()
                .unwrap_or_default())
        }

        async fn update_configuration(
            &self,
            configuration: &Configuration,
        ) -> Result<Configuration, MemoryServiceError> {
            if self.unavailable {
                return Err(unavailable("update_configuration"));
            }
            Ok(configuration.clone())
        }

        async fn close(&self) -> Result<(), MemoryServiceError> {
            self.close_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn settings() -> BridgeSettings {
        BridgeSettings {
            retry_backoff: Duration::from_millis(1),
            call_timeout: Duration::from_secs(2),
            ..BridgeSettings::default()
        }
    }

    fn bridge_with(memory: Arc<FakeMemory>, settings: BridgeSettings) -> Bridge {
        let session = BridgeSession::new("http://localhost:8765", "claude", "moot").unwrap();
        Bridge::with_memory_service(session, settings, memory).unwrap()
    }

    fn args(value: Value) -> Option<JsonObject> {
        value.as_object().cloned()
    }

    #[tokio::test]
    async fn add_memories_submits_once_and_reports_ids() {
        let memory = Arc::new(FakeMemory::default());
        let bridge = bridge_with(memory.clone(), settings());

        let result = bridge
            .invoke(
                "add_memories",
                args(json!({ "memories": ["I like pasta", "I am an engineer"] })),
            )
            .await;

        let payload = result.payload().expect("success");
        assert_eq!(payload["ids"], json!(["m-0", "m-1"]));
        assert_eq!(payload["submitted"], 2);
        assert_eq!(memory.add_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_add_is_never_retried_and_session_survives() {
        let memory = Arc::new(FakeMemory {
            unavailable: true,
            ..FakeMemory::default()
        });
        let bridge = bridge_with(memory.clone(), settings());

        let result = bridge
            .invoke("add_memories", args(json!({ "memories": ["I like pasta"] })))
            .await;
        let failure = result.failure().expect("failure");
        assert_eq!(failure.kind, ErrorKind::TransientError);
        assert_eq!(memory.add_calls.load(Ordering::SeqCst), 1);

        let next = bridge.invoke("get_configuration", None).await;
        assert!(next.is_success());
        assert!(bridge.transport().is_open());
    }

    #[tokio::test]
    async fn invalid_window_never_reaches_the_service() {
        let memory = Arc::new(FakeMemory::default());
        let bridge = bridge_with(memory.clone(), settings());

        for arguments in [json!({ "page": 0 }), json!({ "size": 0 }), json!({ "page": -3 })] {
            let result = bridge.invoke("get_memories", args(arguments)).await;
            assert_eq!(
                result.failure().map(|failure| failure.kind),
                Some(ErrorKind::ValidationError)
            );
        }
        assert_eq!(memory.get_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unknown_tool_yields_failure() {
        let bridge = bridge_with(Arc::new(FakeMemory::default()), settings());
        let result = bridge.invoke("delete_universe", None).await;
        assert_eq!(
            result.failure().map(|failure| failure.kind),
            Some(ErrorKind::UnknownToolError)
        );
    }

    #[tokio::test]
    async fn read_only_tools_retry_transient_failures() {
        let memory = Arc::new(FakeMemory {
            get_failures: AtomicUsize::new(1),
            ..FakeMemory::default()
        });
        let bridge = bridge_with(memory.clone(), settings());

        let result = bridge.invoke("get_memories", None).await;
        assert!(result.is_success(), "{result:?}");
        assert_eq!(memory.get_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn retries_are_bounded() {
        let memory = Arc::new(FakeMemory {
            unavailable: true,
            ..FakeMemory::default()
        });
        let bridge = bridge_with(
            memory.clone(),
            BridgeSettings {
                read_retries: 2,
                ..settings()
            },
        );

        let result = bridge.invoke("get_memories", None).await;
        assert_eq!(
            result.failure().map(|failure| failure.kind),
            Some(ErrorKind::TransientError)
        );
        assert_eq!(memory.get_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn hung_calls_hit_the_call_timeout() {
        let memory = Arc::new(FakeMemory {
            delay: Some(Duration::from_secs(30)),
            ..FakeMemory::default()
        });
        let bridge = bridge_with(
            memory,
            BridgeSettings {
                call_timeout: Duration::from_millis(50),
                ..settings()
            },
        );

        let result = bridge
            .invoke("add_memories", args(json!({ "memories": ["slow"] })))
            .await;
        assert_eq!(
            result.failure().map(|failure| failure.kind),
            Some(ErrorKind::TimeoutError)
        );
    }

    #[tokio::test]
    async fn panics_are_contained() {
        let memory = Arc::new(FakeMemory {
            panic_on_config: true,
            ..FakeMemory::default()
        });
        let bridge = bridge_with(memory, settings());

        let result = bridge.invoke("get_configuration", None).await;
        assert_eq!(
            result.failure().map(|failure| failure.kind),
            Some(ErrorKind::TransientError)
        );
        let next = bridge.invoke("delete_universe", None).await;
        assert!(next.failure().is_some());
    }

    #[tokio::test]
    async fn configuration_reads_are_not_cached() {
        let memory = Arc::new(FakeMemory::default());
        let bridge = bridge_with(memory.clone(), settings());

        let first = bridge.invoke("get_configuration", None).await;
        let second = bridge.invoke("get_configuration", None).await;
        assert_eq!(first, second);
        assert_eq!(memory.config_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let memory = Arc::new(FakeMemory::default());
        let bridge = bridge_with(memory.clone(), settings());

        bridge.stop().await;
        bridge.stop().await;

        assert!(bridge.is_stopped());
        assert!(!bridge.transport().is_open());
        assert_eq!(memory.close_calls.load(Ordering::SeqCst), 1);

        let late = bridge.invoke("get_configuration", None).await;
        assert_eq!(
            late.failure().map(|failure| failure.kind),
            Some(ErrorKind::TransientError)
        );
    }

    /// Memory service whose `close()` fails, noting whether the transport was still open then.
    #[derive(Default)]
    struct FailingClose {
        bridge: std::sync::OnceLock<std::sync::Weak<Bridge>>,
        transport_open_at_close: std::sync::Mutex<Option<bool>>,
    }

    #[async_trait]
    impl MemoryServiceApi for FailingClose {
        async fn add_memories(
            &self,
            _user_id: &str,
            _texts: &[String],
        ) -> Result<AddMemoriesResponse, MemoryServiceError> {
            Err(MemoryServiceError::Closed)
        }

        async fn get_memories(
            &self,
            _user_id: &str,
            _page: u32,
            _size: u32,
        ) -> Result<MemoryPage, MemoryServiceError> {
            Err(MemoryServiceError::Closed)
        }

        async fn get_configuration(
            &self,
            _section: Option<&str>,
        ) -> Result<Configuration, MemoryServiceError> {
            Err(MemoryServiceError::Closed)
        }

        async fn update_configuration(
            &self,
            _configuration: &Configuration,
        ) -> Result<Configuration, MemoryServiceError> {
            Err(MemoryServiceError::Closed)
        }

        async fn close(&self) -> Result<(), MemoryServiceError> {
            let open = self
                .bridge
                .get()
                .and_then(std::sync::Weak::upgrade)
                .map(|bridge| bridge.transport().is_open());
            *self.transport_open_at_close.lock().unwrap() = open;
            Err(MemoryServiceError::Closed)
        }
    }

    #[tokio::test]
    async fn failed_client_close_still_closes_transport_afterwards() {
        let memory = Arc::new(FailingClose::default());
        let session = BridgeSession::new("http://localhost:8765", "claude", "moot").unwrap();
        let bridge = Arc::new(
            Bridge::with_memory_service(session, settings(), memory.clone()).unwrap(),
        );
        memory
            .bridge
            .set(Arc::downgrade(&bridge))
            .expect("bridge registered once");

        bridge.stop().await;

        assert_eq!(*memory.transport_open_at_close.lock().unwrap(), Some(true));
        assert!(!bridge.transport().is_open());
        assert!(bridge.is_stopped());
    }

    #[tokio::test]
    async fn stop_waits_for_in_flight_calls() {
        let memory = Arc::new(FakeMemory {
            delay: Some(Duration::from_millis(100)),
            ..FakeMemory::default()
        });
        let bridge = Arc::new(bridge_with(memory.clone(), settings()));

        let pending = {
            let bridge = Arc::clone(&bridge);
            tokio::spawn(async move {
                bridge
                    .invoke("add_memories", args(json!({ "memories": ["draining"] })))
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        bridge.stop().await;
        let result = pending.await.expect("join");
        assert!(result.is_success(), "{result:?}");
        assert_eq!(memory.close_calls.load(Ordering::SeqCst), 1);
    }
}
