//! MCP (Model Context Protocol) Server Implementation
//!
//! Exposes the catalog search service to MCP clients over stdio.


pub mod errors;
pub mod protocol;
pub mod server;
pub mod tools;

pub use server::{ConnectionState, McpServer, ToolHandler};
pub use tools::register_catalog_tools;
