//! Tool catalogue and dispatch.
//!
//! The set of tools is closed: adding a tool means adding a [`ToolName`] variant, and the
//! compiler then points at every match that must learn about it.

use rmcp::model::JsonObject;
use serde_json::Value;

use crate::{
    error::BridgeError,
    mcp::handlers::{configuration as config_handlers, memories as memory_handlers},
    memory::{MemoryServiceApi, types::Configuration},
    session::BridgeSession,
};

/// Tools exposed to MCP clients. Names are part of the public capability contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolName {
    /// Submit memories for ingestion.
    AddMemories,
    /// Page through stored memories.
    GetMemories,
    /// Read the memory service configuration.
    GetConfiguration,
    /// Replace the memory service configuration.
    UpdateConfiguration,
}

impl ToolName {
    /// Every tool, in the order they are advertised.
    pub const ALL: [ToolName; 4] = [
        Self::AddMemories,
        Self::GetMemories,
        Self::GetConfiguration,
        Self::UpdateConfiguration,
    ];

    /// Wire name of the tool.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AddMemories => "add_memories",
            Self::GetMemories => "get_memories",
            Self::GetConfiguration => "get_configuration",
            Self::UpdateConfiguration => "update_configuration",
        }
    }

    /// Resolve a wire name.
    pub fn parse(name: &str) -> Result<Self, BridgeError> {
        Self::ALL
            .into_iter()
            .find(|tool| tool.as_str() == name)
            .ok_or_else(|| BridgeError::UnknownTool(format!("`{name}` is not a known tool")))
    }

    /// Whether repeating the call cannot create duplicate effects.
    pub const fn is_read_only(self) -> bool {
        matches!(self, Self::GetMemories | Self::GetConfiguration)
    }
}

impl std::fmt::Display for ToolName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated tool call.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolInvocation {
    /// `add_memories`.
    AddMemories {
        /// Texts submitted as one batch.
        memories: Vec<String>,
    },
    /// `get_memories`.
    GetMemories {
        /// 1-based page.
        page: u32,
        /// Items per page.
        size: u32,
    },
    /// `get_configuration`.
    GetConfiguration {
        /// Optional configuration section, e.g. `mem0/llm`.
        section: Option<String>,
    },
    /// `update_configuration`.
    UpdateConfiguration {
        /// Mapping of provider sections to their settings.
        configuration: Configuration,
    },
}

impl ToolInvocation {
    /// Tool this invocation targets.
    pub fn tool(&self) -> ToolName {
        match self {
            Self::AddMemories { .. } => ToolName::AddMemories,
            Self::GetMemories { .. } => ToolName::GetMemories,
            Self::GetConfiguration { .. } => ToolName::GetConfiguration,
            Self::UpdateConfiguration { .. } => ToolName::UpdateConfiguration,
        }
    }
}

/// Validates tool calls and routes them to their handlers.
///
/// Dispatch never retries; the lifecycle decides whether a failed call is repeated.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    default_page_size: u32,
}

impl Dispatcher {
    /// Create a dispatcher using `default_page_size` when `get_memories` omits `size`.
    pub fn new(default_page_size: u32) -> Self {
        Self {
            default_page_size: default_page_size.max(1),
        }
    }

    /// Resolve the tool name and validate its arguments.
    pub fn parse(
        &self,
        name: &str,
        arguments: Option<&JsonObject>,
    ) -> Result<ToolInvocation, BridgeError> {
        let tool = ToolName::parse(name)?;
        let empty = JsonObject::new();
        let arguments = arguments.unwrap_or(&empty);

        match tool {
            ToolName::AddMemories => Ok(ToolInvocation::AddMemories {
                memories: memory_handlers::parse_add_memories(arguments)?,
            }),
            ToolName::GetMemories => {
                let (page, size) =
                    memory_handlers::parse_get_memories(arguments, self.default_page_size)?;
                Ok(ToolInvocation::GetMemories { page, size })
            }
            ToolName::GetConfiguration => Ok(ToolInvocation::GetConfiguration {
                section: config_handlers::parse_get_configuration(arguments)?,
            }),
            ToolName::UpdateConfiguration => Ok(ToolInvocation::UpdateConfiguration {
                configuration: config_handlers::parse_update_configuration(arguments)?,
            }),
        }
    }

    /// Run a validated invocation against the memory service.
    pub async fn dispatch(
        &self,
        invocation: &ToolInvocation,
        memory: &dyn MemoryServiceApi,
        session: &BridgeSession,
    ) -> Result<Value, BridgeError> {
        match invocation {
            ToolInvocation::AddMemories { memories } => {
                memory_handlers::handle_add_memories(memory, session.user_id(), memories).await
            }
            ToolInvocation::GetMemories { page, size } => {
                memory_handlers::handle_get_memories(memory, session.user_id(), *page, *size).await
            }
            ToolInvocation::GetConfiguration { section } => {
                config_handlers::handle_get_configuration(memory, section.as_deref()).await
            }
            ToolInvocation::UpdateConfiguration { configuration } => {
                config_handlers::handle_update_configuration(memory, configuration).await
            }
        }
    }
}
