//! Tool handlers: argument validation followed by a single memory service call.

use rmcp::model::JsonObject;
use serde_json::Value;

use crate::error::BridgeError;

pub mod configuration;
pub mod memories;

/// Look up an argument, treating an explicit `null` as absent.
pub(crate) fn argument<'a>(arguments: &'a JsonObject, key: &str) -> Option<&'a Value> {
    arguments.get(key).filter(|value| !value.is_null())
}

/// Read an optional positive integer argument.
pub(crate) fn positive_integer(
    arguments: &JsonObject,
    key: &str,
    default: u32,
) -> Result<u32, BridgeError> {
    let Some(value) = argument(arguments, key) else {
        return Ok(default);
    };
    value
        .as_u64()
        .filter(|number| *number >= 1)
        .and_then(|number| u32::try_from(number).ok())
        .ok_or_else(|| {
            BridgeError::Validation(format!("`{key}` must be a positive integer, got {value}"))
        })
}

/// Log arguments the tool does not understand; they are ignored rather than rejected.
pub(crate) fn note_unexpected(tool: &str, arguments: &JsonObject, known: &[&str]) {
    for key in arguments.keys().filter(|key| !known.contains(&key.as_str())) {
        tracing::debug!(tool, argument = %key, "Ignoring unexpected argument");
    }
}
