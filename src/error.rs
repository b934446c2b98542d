//! Error types for the toolgate gateway.
//!
//! Uses `thiserror` for ergonomic error handling with automatic `Display`
//! and `Error` trait implementations. The enum is small on purpose:
//! discovery degrades to fewer registered commands instead of erroring, and
//! the subprocess execution engine resolves every failure into an error
//! text at its own boundary rather than surfacing it to the protocol layer.

use thiserror::Error;

/// The primary error type for gateway operations.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Configuration-related errors (bad bind address, invalid env values, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Tool invocation errors (malformed tool name)
    #[error("Tool error: {0}")]
    Tool(String),
}

/// A specialized `Result` type for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;
