//! MCP server bootstrap and request dispatch.

use std::{borrow::Cow, sync::Arc};

use crate::{
    bridge::Bridge,
    mcp::{schemas, tools::ToolName},
};
use rmcp::{
    ErrorData as McpError,
    handler::server::ServerHandler,
    model::{
        CallToolRequestParam, CallToolResult, ListToolsResult, ServerCapabilities, ServerInfo,
        Tool, ToolAnnotations,
    },
};

/// MCP server exposing the memory tools of one bridge session.
#[derive(Clone)]
pub struct OpenMemoryMcpServer {
    bridge: Arc<Bridge>,
}

impl OpenMemoryMcpServer {
    /// Serve the tools of `bridge`.
    pub fn new(bridge: Arc<Bridge>) -> Self {
        Self { bridge }
    }

    fn describe_tools(&self) -> Vec<Tool> {
        let default_page_size = self.bridge.settings().default_page_size;
        ToolName::ALL
            .into_iter()
            .map(|tool| describe_tool(tool, default_page_size))
            .collect()
    }
}

fn describe_tool(tool: ToolName, default_page_size: u32) -> Tool {
    let (title, description, schema, annotations) = match tool {
        ToolName::AddMemories => (
            "Add Memories",
            "Remember facts about the user. Submit every new fact in one call; storage happens in the background.",
            schemas::add_memories_input_schema(),
            ToolAnnotations::with_title("Add Memories")
                .destructive(false)
                .idempotent(false)
                .open_world(true),
        ),
        ToolName::GetMemories => (
            "Get Memories",
            "Page through everything remembered about the user, newest first as ordered by the memory service.",
            schemas::get_memories_input_schema(default_page_size),
            ToolAnnotations::with_title("Get Memories")
                .read_only(true)
                .idempotent(true)
                .open_world(true),
        ),
        ToolName::GetConfiguration => (
            "Get Configuration",
            "Show the memory service's LLM and embedder configuration, optionally one section such as 'mem0/llm'.",
            schemas::get_configuration_input_schema(),
            ToolAnnotations::with_title("Get Configuration")
                .read_only(true)
                .idempotent(true)
                .open_world(true),
        ),
        ToolName::UpdateConfiguration => (
            "Update Configuration",
            "Replace the memory service configuration with a mapping of sections to provider settings.",
            schemas::update_configuration_input_schema(),
            ToolAnnotations::with_title("Update Configuration")
                .destructive(true)
                .idempotent(true)
                .open_world(true),
        ),
    };

    Tool {
        name: Cow::Borrowed(tool.as_str()),
        title: Some(title.to_string()),
        description: Some(Cow::Borrowed(description)),
        input_schema: Arc::new(schema),
        output_schema: None,
        annotations: Some(annotations),
        icons: None,
    }
}

impl ServerHandler for OpenMemoryMcpServer {
    fn get_info(&self) -> ServerInfo {
        let mut implementation = rmcp::model::Implementation::from_build_env();
        implementation.name = "openmemory".to_string();
        implementation.title = Some("OpenMemory MCP Bridge".to_string());
        implementation.version = env!("CARGO_PKG_VERSION").to_string();

        ServerInfo {
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: implementation,
            instructions: Some(
                "Use add_memories to remember durable facts about the user and get_memories to recall them before answering. Configuration tools inspect or change the memory service's model providers.".into(),
            ),
            ..ServerInfo::default()
        }
    }

    fn list_tools(
        &self,
        _request: Option<rmcp::model::PaginatedRequestParam>,
        _context: rmcp::service::RequestContext<rmcp::service::RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListToolsResult, McpError>> + Send + '_ {
        let tools = self.describe_tools();
        std::future::ready(Ok(ListToolsResult::with_all_items(tools)))
    }

    #[allow(clippy::manual_async_fn)]
    fn call_tool(
        &self,
        request: CallToolRequestParam,
        _context: rmcp::service::RequestContext<rmcp::service::RoleServer>,
    ) -> impl std::future::Future<Output = Result<CallToolResult, McpError>> + Send + '_ {
        async move {
            let CallToolRequestParam { name, arguments } = request;
            let result = self.bridge.invoke(&name, arguments).await;
            Ok(result.into_call_tool_result(&name))
        }
    }
}
