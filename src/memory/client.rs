//! HTTP client wrapper for the OpenMemory service.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::memory::types::{
    AddMemoriesRequest, AddMemoriesResponse, Configuration, MemoryPage, MemoryServiceError,
};

const MAX_ERROR_BODY: usize = 512;

/// Operations the bridge needs from the memory service.
///
/// Implementations perform exactly one request per call and never retry; retry decisions belong to
/// the bridge lifecycle, which knows whether an operation is safe to repeat.
#[async_trait]
pub trait MemoryServiceApi: Send + Sync {
    /// Submit a batch of memory texts for asynchronous ingestion.
    async fn add_memories(
        &self,
        user_id: &str,
        texts: &[String],
    ) -> Result<AddMemoriesResponse, MemoryServiceError>;

    /// Fetch one page of memories. Windowing is entirely the service's concern.
    async fn get_memories(
        &self,
        user_id: &str,
        page: u32,
        size: u32,
    ) -> Result<MemoryPage, MemoryServiceError>;

    /// Read the service configuration, optionally narrowed to a section such as `mem0/llm`.
    async fn get_configuration(
        &self,
        section: Option<&str>,
    ) -> Result<Configuration, MemoryServiceError>;

    /// Replace the service configuration.
    async fn update_configuration(
        &self,
        configuration: &Configuration,
    ) -> Result<Configuration, MemoryServiceError>;

    /// Release pooled connections. Subsequent calls fail with [`MemoryServiceError::Closed`].
    async fn close(&self) -> Result<(), MemoryServiceError>;
}

/// reqwest-backed memory service client.
///
/// The connection pool is shared across concurrent calls; the client holds no per-request state.
pub struct MemoryServiceClient {
    client: Mutex<Option<Client>>,
    base_url: String,
}

impl MemoryServiceClient {
    /// Build a client bound to `base_url` with bounded request and connect waits.
    pub fn new(
        base_url: &str,
        request_timeout: Duration,
        connect_timeout: Duration,
    ) -> Result<Self, MemoryServiceError> {
        let base_url = normalize_base_url(base_url).map_err(MemoryServiceError::InvalidUrl)?;
        let client = Client::builder()
            .user_agent(concat!("openmemory-mcp-bridge/", env!("CARGO_PKG_VERSION")))
            .timeout(request_timeout)
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|err| MemoryServiceError::InvalidUrl(err.to_string()))?;

        tracing::debug!(
            url = %base_url,
            request_timeout_ms = request_timeout.as_millis() as u64,
            connect_timeout_ms = connect_timeout.as_millis() as u64,
            "Initialized memory service HTTP client"
        );

        Ok(Self {
            client: Mutex::new(Some(client)),
            base_url,
        })
    }

    fn request(
        &self,
        method: Method,
        path: &str,
    ) -> Result<reqwest::RequestBuilder, MemoryServiceError> {
        let client = self
            .client
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
            .ok_or(MemoryServiceError::Closed)?;
        Ok(client.request(method, format_endpoint(&self.base_url, path)))
    }

    async fn send<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        request: reqwest::RequestBuilder,
    ) -> Result<T, MemoryServiceError> {
        let response = request
            .send()
            .await
            .map_err(|err| classify_transport_error(operation, &err))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let error = classify_status(operation, status, &body);
            tracing::warn!(operation, %status, error = %error, "Memory service request failed");
            return Err(error);
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|err| classify_transport_error(operation, &err))?;
        serde_json::from_slice(&bytes).map_err(|err| MemoryServiceError::Malformed {
            operation,
            message: err.to_string(),
        })
    }
}

#[async_trait]
impl MemoryServiceApi for MemoryServiceClient {
    async fn add_memories(
        &self,
        user_id: &str,
        texts: &[String],
    ) -> Result<AddMemoriesResponse, MemoryServiceError> {
        let body = AddMemoriesRequest {
            memories: texts,
            user_id,
        };
        let request = self.request(Method::POST, "memories")?.json(&body);
        let response: AddMemoriesResponse = self.send("add_memories", request).await?;
        tracing::debug!(
            user_id,
            submitted = texts.len(),
            acknowledged = response.results.len(),
            "Memories submitted"
        );
        Ok(response)
    }

    async fn get_memories(
        &self,
        user_id: &str,
        page: u32,
        size: u32,
    ) -> Result<MemoryPage, MemoryServiceError> {
        let request = self.request(Method::GET, "memories")?.query(&[
            ("page", page.to_string()),
            ("size", size.to_string()),
            ("user_id", user_id.to_string()),
        ]);
        let result: MemoryPage = self.send("get_memories", request).await?;
        tracing::debug!(
            user_id,
            page,
            size,
            returned = result.items.len(),
            total = result.total,
            "Memories fetched"
        );
        Ok(result)
    }

    async fn get_configuration(
        &self,
        section: Option<&str>,
    ) -> Result<Configuration, MemoryServiceError> {
        let path = match section {
            Some(section) => format!("config/{}", section.trim_matches('/')),
            None => "config".to_string(),
        };
        let request = self.request(Method::GET, &path)?;
        let value: Value = self.send("get_configuration", request).await?;
        into_configuration("get_configuration", value)
    }

    async fn update_configuration(
        &self,
        configuration: &Configuration,
    ) -> Result<Configuration, MemoryServiceError> {
        let request = self.request(Method::PUT, "config")?.json(configuration);
        let value: Value = self.send("update_configuration", request).await?;
        into_configuration("update_configuration", value)
    }

    async fn close(&self) -> Result<(), MemoryServiceError> {
        let previous = self
            .client
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if previous.is_some() {
            tracing::debug!(url = %self.base_url, "Memory service client closed");
        }
        Ok(())
    }
}

fn into_configuration(
    operation: &'static str,
    value: Value,
) -> Result<Configuration, MemoryServiceError> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(MemoryServiceError::Malformed {
            operation,
            message: format!("expected a configuration object, got {other}"),
        }),
    }
}

fn classify_transport_error(operation: &'static str, err: &reqwest::Error) -> MemoryServiceError {
    if err.is_timeout() {
        MemoryServiceError::Timeout {
            operation,
            message: err.to_string(),
        }
    } else if err.is_decode() {
        MemoryServiceError::Malformed {
            operation,
            message: err.to_string(),
        }
    } else {
        MemoryServiceError::Unavailable {
            operation,
            message: err.to_string(),
        }
    }
}

fn classify_status(operation: &'static str, status: StatusCode, body: &str) -> MemoryServiceError {
    match status {
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => MemoryServiceError::Timeout {
            operation,
            message: format!("service answered {status}"),
        },
        StatusCode::TOO_MANY_REQUESTS => MemoryServiceError::ServerError {
            status,
            body: truncate(body),
        },
        status if status.is_client_error() => MemoryServiceError::Rejected {
            status,
            message: extract_detail(body),
        },
        status => MemoryServiceError::ServerError {
            status,
            body: truncate(body),
        },
    }
}

/// Pull a human-readable message out of a FastAPI-style error body.
fn extract_detail(body: &str) -> String {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return truncate(body);
    };

    let detail = value
        .get("detail")
        .or_else(|| value.get("message"))
        .or_else(|| value.get("error"));

    match detail {
        Some(Value::String(message)) => message.clone(),
        Some(Value::Array(entries)) => {
            let messages: Vec<String> = entries
                .iter()
                .map(|entry| match entry.get("msg").and_then(Value::as_str) {
                    Some(msg) => match entry.get("loc").and_then(Value::as_array) {
                        Some(loc) => {
                            let path: Vec<String> = loc
                                .iter()
                                .map(|part| match part {
                                    Value::String(text) => text.clone(),
                                    other => other.to_string(),
                                })
                                .collect();
                            format!("{}: {msg}", path.join("."))
                        }
                        None => msg.to_string(),
                    },
                    None => entry.to_string(),
                })
                .collect();
            messages.join("; ")
        }
        Some(other) => other.to_string(),
        None => truncate(body),
    }
}

fn truncate(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY {
        return body.to_string();
    }
    let mut end = MAX_ERROR_BODY;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &body[..end])
}

pub(crate) fn normalize_base_url(url: &str) -> Result<String, String> {
    let mut parsed = reqwest::Url::parse(url.trim()).map_err(|err| err.to_string())?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(format!("unsupported scheme `{}`", parsed.scheme()));
    }
    let path = parsed.path().trim_end_matches('/').to_string();
    parsed.set_path(&path);
    parsed.set_query(None);
    parsed.set_fragment(None);
    Ok(parsed.to_string().trim_end_matches('/').to_string())
}

fn format_endpoint(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{base}/{path}")
}
