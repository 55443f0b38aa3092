//! Registers the bridge with Claude Desktop.
//!
//! The installer merges an `mcpServers.openmemory` entry into the desktop client's JSON config,
//! leaving every other server untouched.

use std::path::{Path, PathBuf};

use serde_json::{Map, Value, json};
use thiserror::Error;

use crate::session::BridgeSession;

/// Key under `mcpServers` that the bridge is registered as.
pub const SERVER_KEY: &str = "openmemory";
/// Environment variable that overrides the bridge binary location.
pub const BRIDGE_BIN_ENV: &str = "OPENMEMORY_BRIDGE_BIN";

const BRIDGE_BIN_NAME: &str = "openmemory-mcp-bridge";

/// Errors raised while installing the bridge.
#[derive(Debug, Error)]
pub enum InstallError {
    /// Bridge identity arguments were invalid.
    #[error(transparent)]
    Identity(#[from] crate::error::BridgeError),
    /// The bridge executable could not be found.
    #[error("bridge binary not found at {0}")]
    MissingBridge(PathBuf),
    /// The home directory could not be determined.
    #[error("cannot determine the home directory ({0} is unset)")]
    MissingHome(&'static str),
    /// Filesystem access failed.
    #[error("failed to {action} {path}: {source}")]
    Io {
        /// What was being attempted.
        action: &'static str,
        /// Path involved.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
    /// The merged config could not be serialized.
    #[error("failed to serialize client config: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Outcome of a successful install.
#[derive(Debug, Clone)]
pub struct InstallReport {
    /// Config file that was written.
    pub config_path: PathBuf,
    /// Command registered with the client.
    pub command: PathBuf,
    /// Arguments registered with the client.
    pub args: Vec<String>,
    /// Whether an existing but unparseable config file was replaced.
    pub replaced_invalid: bool,
}

/// Locate the bridge executable: `OPENMEMORY_BRIDGE_BIN`, else next to the running installer.
pub fn locate_bridge_binary() -> Result<PathBuf, InstallError> {
    let candidate = match std::env::var_os(BRIDGE_BIN_ENV).filter(|value| !value.is_empty()) {
        Some(path) => PathBuf::from(path),
        None => {
            let current = std::env::current_exe().map_err(|source| InstallError::Io {
                action: "resolve",
                path: PathBuf::from("current executable"),
                source,
            })?;
            current.with_file_name(format!("{BRIDGE_BIN_NAME}{}", std::env::consts::EXE_SUFFIX))
        }
    };

    if candidate.is_file() {
        Ok(candidate)
    } else {
        Err(InstallError::MissingBridge(candidate))
    }
}

/// Claude Desktop config location for the current platform.
pub fn claude_desktop_config_path() -> Result<PathBuf, InstallError> {
    if cfg!(target_os = "windows") {
        let appdata = std::env::var_os("APPDATA").ok_or(InstallError::MissingHome("APPDATA"))?;
        return Ok(PathBuf::from(appdata)
            .join("Claude")
            .join("claude_desktop_config.json"));
    }

    let home = std::env::var_os("HOME").ok_or(InstallError::MissingHome("HOME"))?;
    let home = PathBuf::from(home);
    let directory = if cfg!(target_os = "macos") {
        home.join("Library").join("Application Support").join("Claude")
    } else {
        home.join(".config").join("claude")
    };
    Ok(directory.join("claude_desktop_config.json"))
}

/// Arguments the client passes to the bridge for `session`.
pub fn bridge_args(session: &BridgeSession) -> Vec<String> {
    vec!["--sse".to_string(), session.stream_url()]
}

/// Merge the bridge entry into an existing config document.
///
/// Returns the merged document and whether `existing` had to be discarded because it was not a
/// JSON object.
pub fn merge_server_entry(existing: Option<&str>, command: &Path, args: &[String]) -> (Value, bool) {
    let (mut document, replaced_invalid) = match existing {
        None => (Map::new(), false),
        Some(text) if text.trim().is_empty() => (Map::new(), false),
        Some(text) => match serde_json::from_str::<Value>(text) {
            Ok(Value::Object(map)) => (map, false),
            _ => (Map::new(), true),
        },
    };

    let servers = document
        .entry("mcpServers")
        .or_insert_with(|| Value::Object(Map::new()));
    if !servers.is_object() {
        *servers = Value::Object(Map::new());
    }
    if let Value::Object(servers) = servers {
        servers.insert(
            SERVER_KEY.to_string(),
            json!({
                "command": command.to_string_lossy(),
                "args": args,
            }),
        );
    }

    (Value::Object(document), replaced_invalid)
}

/// Write the bridge entry for `session` into the config file at `config_path`.
pub fn install(
    session: &BridgeSession,
    command: &Path,
    config_path: &Path,
) -> Result<InstallReport, InstallError> {
    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| InstallError::Io {
            action: "create",
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let existing = match std::fs::read_to_string(config_path) {
        Ok(text) => Some(text),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => None,
        Err(source) => {
            return Err(InstallError::Io {
                action: "read",
                path: config_path.to_path_buf(),
                source,
            });
        }
    };

    let args = bridge_args(session);
    let (document, replaced_invalid) = merge_server_entry(existing.as_deref(), command, &args);
    if replaced_invalid {
        tracing::warn!(path = %config_path.display(), "Existing client config was not valid JSON; replacing it");
    }

    let rendered = serde_json::to_string_pretty(&document)?;
    std::fs::write(config_path, rendered).map_err(|source| InstallError::Io {
        action: "write",
        path: config_path.to_path_buf(),
        source,
    })?;

    Ok(InstallReport {
        config_path: config_path.to_path_buf(),
        command: command.to_path_buf(),
        args,
        replaced_invalid,
    })
}
