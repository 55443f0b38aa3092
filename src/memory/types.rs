//! Wire types and errors for the memory service HTTP API.

use reqwest::StatusCode;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Errors returned while talking to the memory service.
#[derive(Debug, Error)]
pub enum MemoryServiceError {
    /// Base URL failed to parse or normalize.
    #[error("invalid memory service URL: {0}")]
    InvalidUrl(String),
    /// Request or response body exceeded its bounded wait.
    #[error("{operation} timed out: {message}")]
    Timeout {
        /// Client operation that timed out.
        operation: &'static str,
        /// Underlying transport detail.
        message: String,
    },
    /// Transport failed before a response arrived (refused, reset, DNS).
    #[error("{operation} could not reach the memory service: {message}")]
    Unavailable {
        /// Client operation that failed.
        operation: &'static str,
        /// Underlying transport detail.
        message: String,
    },
    /// Service rejected the payload with a 4xx status.
    #[error("memory service rejected the request ({status}): {message}")]
    Rejected {
        /// HTTP status returned by the service.
        status: StatusCode,
        /// Detail extracted from the response body.
        message: String,
    },
    /// Service failed with a 5xx status or asked the caller to slow down.
    #[error("memory service failed ({status}): {body}")]
    ServerError {
        /// HTTP status returned by the service.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
    /// Success status but the body could not be understood.
    #[error("{operation} returned an unexpected body: {message}")]
    Malformed {
        /// Client operation whose response failed to decode.
        operation: &'static str,
        /// Decoder detail.
        message: String,
    },
    /// The client has been closed and no longer issues requests.
    #[error("memory service client is closed")]
    Closed,
}

/// Body of `POST /memories`.
#[derive(Debug, Serialize)]
pub(crate) struct AddMemoriesRequest<'a> {
    pub(crate) memories: &'a [String],
    pub(crate) user_id: &'a str,
}

/// Submission acknowledgment returned by `POST /memories`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AddMemoriesResponse {
    /// Per-memory acknowledgment records, passed through untouched.
    #[serde(default)]
    pub results: Vec<Value>,
}

impl AddMemoriesResponse {
    /// Identifiers of the created memories, in submission order.
    pub fn memory_ids(&self) -> Vec<String> {
        self.results
            .iter()
            .filter_map(|result| result.as_object()?.get("id").cloned())
            .map(stringify_id)
            .filter(|id| !id.is_empty())
            .collect()
    }
}

/// One stored memory as reported by the service. Opaque beyond pass-through.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct MemoryItem {
    /// Service-assigned identifier.
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    /// Memory text.
    #[serde(default, alias = "content", alias = "memory")]
    pub text: String,
    /// Creation timestamp in whatever representation the service uses.
    #[serde(default, alias = "createdAt", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<Value>,
    /// Free-form metadata attached by the service.
    #[serde(default, alias = "metadata_", skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

/// One page of memories returned by `GET /memories`.
#[derive(Debug, Clone, Deserialize)]
pub struct MemoryPage {
    /// Items in service order.
    #[serde(default)]
    pub items: Vec<MemoryItem>,
    /// Total number of memories owned by the user.
    #[serde(default)]
    pub total: u64,
    /// Page echoed by the service, when present.
    #[serde(default)]
    pub page: Option<u64>,
    /// Page size echoed by the service, when present.
    #[serde(default)]
    pub size: Option<u64>,
    /// Number of pages, when present.
    #[serde(default)]
    pub pages: Option<u64>,
}

/// Configuration mapping served by `GET /config`.
pub type Configuration = Map<String, Value>;

fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(stringify_id)
}

pub(crate) fn stringify_id(id: Value) -> String {
    match id {
        Value::String(text) => text,
        Value::Number(number) => number.to_string(),
        Value::Object(map) => map
            .get("uuid")
            .map(|value| match value {
                Value::String(uuid) => uuid.clone(),
                other => other.to_string(),
            })
            .unwrap_or_else(|| Value::Object(map).to_string()),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
