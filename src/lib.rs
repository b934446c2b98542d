//! Toolgate - protocol gateway exposing CLI plugins as MCP tools
//!
//! Plugins are subdirectories under a plugins root, each with a `cli` (or
//! legacy `cli.py`) entry point. At startup the gateway scans the root,
//! interrogates each plugin for its command schemas, synthesizes one tool
//! per command, and serves the result over SSE or stdio. Each tool call
//! becomes one subprocess run of the owning plugin.

pub mod config;
pub mod error;
pub mod executor;
pub mod metrics;
pub mod plugins;
pub mod schema;
pub mod server;

pub use config::GatewayConfig;
pub use error::{GatewayError, Result};
pub use executor::{Executor, ToolOutput};
pub use metrics::Metrics;
pub use plugins::registry::PluginRegistry;
pub use server::Gateway;
