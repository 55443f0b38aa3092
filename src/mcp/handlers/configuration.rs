//! Handlers for the configuration tools.

use rmcp::model::JsonObject;
use serde_json::Value;

use crate::{
    error::BridgeError,
    mcp::{
        format::{configuration_payload, configuration_updated_payload},
        handlers::{argument, note_unexpected},
    },
    memory::{MemoryServiceApi, types::Configuration},
};

/// Validate the optional `section` argument of `get_configuration`.
pub(crate) fn parse_get_configuration(
    arguments: &JsonObject,
) -> Result<Option<String>, BridgeError> {
    note_unexpected("get_configuration", arguments, &["section"]);
    let Some(value) = argument(arguments, "section") else {
        return Ok(None);
    };
    let Some(section) = value.as_str() else {
        return Err(BridgeError::Validation("`section` must be a string".into()));
    };

    let section = section.trim().trim_matches('/');
    let valid = !section.is_empty()
        && section.split('/').all(|segment| {
            !segment.is_empty()
                && segment
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        });
    if !valid {
        return Err(BridgeError::Validation(format!(
            "`section` must be slash-separated names such as `mem0/llm`, got `{section}`"
        )));
    }
    Ok(Some(section.to_string()))
}

/// Validate `update_configuration`: `config` must be a mapping of mappings.
///
/// Only the shape is checked; what the settings mean is the memory service's business.
pub(crate) fn parse_update_configuration(
    arguments: &JsonObject,
) -> Result<Configuration, BridgeError> {
    note_unexpected("update_configuration", arguments, &["config"]);
    let Some(value) = argument(arguments, "config") else {
        return Err(BridgeError::Validation("`config` is required".into()));
    };
    let Value::Object(configuration) = value else {
        return Err(BridgeError::Validation("`config` must be an object".into()));
    };
    if configuration.is_empty() {
        return Err(BridgeError::Validation("`config` must not be empty".into()));
    }
    if let Some((key, _)) = configuration.iter().find(|(_, entry)| !entry.is_object()) {
        return Err(BridgeError::Validation(format!(
            "`config.{key}` must be an object of provider settings"
        )));
    }
    Ok(configuration.clone())
}

/// Read the configuration fresh from the service.
pub(crate) async fn handle_get_configuration(
    memory: &dyn MemoryServiceApi,
    section: Option<&str>,
) -> Result<Value, BridgeError> {
    let configuration = memory.get_configuration(section).await?;
    Ok(configuration_payload(section, configuration))
}

/// Replace the service configuration.
pub(crate) async fn handle_update_configuration(
    memory: &dyn MemoryServiceApi,
    configuration: &Configuration,
) -> Result<Value, BridgeError> {
    let applied = memory.update_configuration(configuration).await?;
    Ok(configuration_updated_payload(applied))
}
