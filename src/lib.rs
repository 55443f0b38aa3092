#![deny(missing_docs)]

//! Core library for the OpenMemory MCP bridge.

/// Bridge lifecycle: startup, per-call isolation, and shutdown.
pub mod bridge;
/// Environment-driven configuration management.
pub mod config;
/// Error taxonomy shared across layers.
pub mod error;
/// Installer that registers the bridge with desktop MCP clients.
pub mod install;
/// Structured logging and tracing setup.
pub mod logging;
/// Model Context Protocol server implementation.
pub mod mcp;
/// HTTP client for the memory service.
pub mod memory;
/// Session identity.
pub mod session;
/// Transport session and upstream event stream.
pub mod transport;
