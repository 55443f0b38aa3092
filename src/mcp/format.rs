//! Response formatting: shapes handler outcomes into the tool-result envelope.

use rmcp::model::CallToolResult;
use serde_json::{Value, json};

use crate::{
    error::{BridgeError, ErrorKind},
    memory::{AddMemoriesResponse, MemoryPage, types::Configuration},
};

/// Structured failure reported to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolFailure {
    /// Error classification.
    pub kind: ErrorKind,
    /// Human-readable detail.
    pub message: String,
}

/// Outcome of exactly one tool invocation: a success payload or a failure, never both.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolResult {
    /// Tool-specific JSON payload.
    Success(Value),
    /// Classified failure.
    Failure(ToolFailure),
}

impl ToolResult {
    /// Whether the invocation succeeded.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Failure details, when the invocation failed.
    pub fn failure(&self) -> Option<&ToolFailure> {
        match self {
            Self::Failure(failure) => Some(failure),
            Self::Success(_) => None,
        }
    }

    /// Success payload, when the invocation succeeded.
    pub fn payload(&self) -> Option<&Value> {
        match self {
            Self::Success(payload) => Some(payload),
            Self::Failure(_) => None,
        }
    }

    /// Render the envelope for `tool`.
    pub fn to_envelope(&self, tool: &str) -> Value {
        match self {
            Self::Success(payload) => json!({
                "ok": true,
                "tool": tool,
                "result": payload,
            }),
            Self::Failure(failure) => json!({
                "ok": false,
                "tool": tool,
                "error": {
                    "kind": failure.kind.as_str(),
                    "code": failure.kind.code(),
                    "retryable": failure.kind.is_retryable(),
                    "message": failure.message,
                },
            }),
        }
    }

    /// Convert into the rmcp result type, flagging failures with `isError`.
    pub fn into_call_tool_result(self, tool: &str) -> CallToolResult {
        let envelope = self.to_envelope(tool);
        if self.is_success() {
            CallToolResult::structured(envelope)
        } else {
            CallToolResult::structured_error(envelope)
        }
    }
}

impl From<Result<Value, BridgeError>> for ToolResult {
    fn from(outcome: Result<Value, BridgeError>) -> Self {
        match outcome {
            Ok(payload) => Self::Success(payload),
            Err(error) => Self::Failure(ToolFailure {
                kind: error.kind(),
                message: error.message().to_string(),
            }),
        }
    }
}

/// Payload for an acknowledged `add_memories` submission.
pub(crate) fn add_memories_payload(submitted: usize, response: AddMemoriesResponse) -> Value {
    let ids = response.memory_ids();
    json!({
        "status": "submitted",
        "submitted": submitted,
        "ids": ids,
        "results": response.results,
    })
}

/// Payload for one page of memories.
pub(crate) fn memory_page_payload(page: u32, size: u32, result: MemoryPage) -> Value {
    let returned = result.items.len();
    let mut payload = json!({
        "items": result.items,
        "total": result.total,
        "page": result.page.unwrap_or(u64::from(page)),
        "size": result.size.unwrap_or(u64::from(size)),
        "returned": returned,
    });
    if let (Some(pages), Some(map)) = (result.pages, payload.as_object_mut()) {
        map.insert("pages".into(), Value::from(pages));
    }
    payload
}

/// Payload for a configuration read.
pub(crate) fn configuration_payload(section: Option<&str>, configuration: Configuration) -> Value {
    match section {
        Some(section) => json!({ "section": section, "configuration": configuration }),
        None => json!({ "configuration": configuration }),
    }
}

/// Payload for an applied configuration update.
pub(crate) fn configuration_updated_payload(configuration: Configuration) -> Value {
    json!({ "status": "updated", "configuration": configuration })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryItem;

    #[test]
    fn failure_envelope_carries_stable_code() {
        let result = ToolResult::from(Err(BridgeError::Transient(
            "connection refused".into(),
        )));
        let envelope = result.to_envelope("add_memories");

        assert_eq!(envelope["ok"], false);
        assert_eq!(envelope["tool"], "add_memories");
        assert_eq!(envelope["error"]["kind"], "TransientError");
        assert_eq!(envelope["error"]["code"], "TRANSIENT_ERROR");
        assert_eq!(envelope["error"]["retryable"], true);
        assert_eq!(envelope["error"]["message"], "connection refused");
        assert!(envelope.get("result").is_none());
    }

    #[test]
    fn success_envelope_has_no_error() {
        let result = ToolResult::from(Ok(json!({ "status": "submitted" })));
        let envelope = result.to_envelope("add_memories");
        assert_eq!(envelope["ok"], true);
        assert_eq!(envelope["result"]["status"], "submitted");
        assert!(envelope.get("error").is_none());
        assert!(result.failure().is_none());
    }

    #[test]
    fn call_tool_result_flags_failures() {
        let failure = ToolResult::from(Err(BridgeError::UnknownTool("delete_universe".into())))
            .into_call_tool_result("delete_universe");
        assert_eq!(failure.is_error, Some(true));
        let content = failure.structured_content.expect("structured");
        assert_eq!(content["error"]["code"], "UNKNOWN_TOOL");

        let success =
            ToolResult::from(Ok(json!({}))).into_call_tool_result("get_configuration");
        assert_eq!(success.is_error, Some(false));
    }

    #[test]
    fn memory_page_payload_falls_back_to_requested_window() {
        let page = MemoryPage {
            items: vec![MemoryItem {
                id: "m-1".into(),
                text: "I like pasta".into(),
                created_at: None,
                metadata: None,
            }],
            total: 4,
            page: None,
            size: None,
            pages: Some(4),
        };

        let payload = memory_page_payload(2, 1, page);
        assert_eq!(payload["page"], 2);
        assert_eq!(payload["size"], 1);
        assert_eq!(payload["returned"], 1);
        assert_eq!(payload["pages"], 4);
        assert_eq!(payload["items"][0]["text"], "I like pasta");
    }
}
