//! Handlers for the `add_memories` and `get_memories` tools.

use rmcp::model::JsonObject;
use serde_json::Value;

use crate::{
    error::BridgeError,
    mcp::{
        format::{add_memories_payload, memory_page_payload},
        handlers::{argument, note_unexpected, positive_integer},
    },
    memory::MemoryServiceApi,
};

/// Validate `add_memories` arguments: `memories` must be a non-empty list of strings.
///
/// Element content is not judged here; the memory service decides what is worth remembering.
pub(crate) fn parse_add_memories(arguments: &JsonObject) -> Result<Vec<String>, BridgeError> {
    note_unexpected("add_memories", arguments, &["memories"]);

    let Some(value) = argument(arguments, "memories") else {
        return Err(BridgeError::Validation("`memories` is required".into()));
    };
    let Value::Array(entries) = value else {
        return Err(BridgeError::Validation(
            "`memories` must be an array of strings".into(),
        ));
    };
    if entries.is_empty() {
        return Err(BridgeError::Validation("`memories` must not be empty".into()));
    }

    entries
        .iter()
        .enumerate()
        .map(|(index, entry)| match entry {
            Value::String(text) => Ok(text.clone()),
            other => Err(BridgeError::Validation(format!(
                "`memories[{index}]` must be a string, got {other}"
            ))),
        })
        .collect()
}

/// Validate `get_memories` arguments, returning `(page, size)`.
pub(crate) fn parse_get_memories(
    arguments: &JsonObject,
    default_size: u32,
) -> Result<(u32, u32), BridgeError> {
    note_unexpected("get_memories", arguments, &["page", "size"]);
    let page = positive_integer(arguments, "page", 1)?;
    let size = positive_integer(arguments, "size", default_size)?;
    Ok((page, size))
}

/// Submit the batch in a single call; ingestion completes out of band.
pub(crate) async fn handle_add_memories(
    memory: &dyn MemoryServiceApi,
    user_id: &str,
    memories: &[String],
) -> Result<Value, BridgeError> {
    let response = memory.add_memories(user_id, memories).await?;
    Ok(add_memories_payload(memories.len(), response))
}

/// Fetch one page, passing the window through untouched.
pub(crate) async fn handle_get_memories(
    memory: &dyn MemoryServiceApi,
    user_id: &str,
    page: u32,
    size: u32,
) -> Result<Value, BridgeError> {
    let result = memory.get_memories(user_id, page, size).await?;
    Ok(memory_page_payload(page, size, result))
}
