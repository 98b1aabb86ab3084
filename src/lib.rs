//! HTTP driver for the MCP bridge.

pub mod config;
pub mod error;
pub mod logging;
pub mod server;
