//! Model Context Protocol (MCP) surface of the bridge.
//!
//! Tools: `add_memories`, `get_memories`, `get_configuration`, and `update_configuration`. Each
//! call is validated by the dispatcher, forwarded to the memory service, and answered with a
//! structured envelope whether it succeeded or not.

pub mod format;
pub mod handlers;
mod schemas;
mod server;
pub mod tools;

pub use format::{ToolFailure, ToolResult};
pub use server::OpenMemoryMcpServer;
pub use tools::{Dispatcher, ToolInvocation, ToolName};
