//! Error types for the Stepwise domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; [`Error`] wraps them all.

use thiserror::Error;

/// The top-level error type for all Stepwise operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Model call errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Tool provider lifecycle errors ---
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    // --- Dispatch errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },
}

// --- Bounded context errors ---

/// A failed call to the language model. Retry policy belongs to the
/// provider implementation; the loop only propagates these.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

/// Lifecycle and transport errors of a single provider connection.
#[derive(Debug, Clone, Error)]
pub enum ConnectionError {
    #[error("Connection already started: {0}")]
    AlreadyStarted(String),

    #[error("Connection not started: {0}")]
    NotStarted(String),

    #[error("Failed to start {connection}: {reason}")]
    StartFailed { connection: String, reason: String },

    #[error("Protocol error on {connection}: {reason}")]
    Protocol { connection: String, reason: String },

    #[error("I/O error on {connection}: {reason}")]
    Io { connection: String, reason: String },

    #[error("Request to {connection} timed out after {timeout_secs}s")]
    Timeout { connection: String, timeout_secs: u64 },

    #[error("Connection stopped: {0}")]
    Stopped(String),

    #[error("Duplicate provider alias: {0}")]
    DuplicateAlias(String),
}

/// Errors raised while resolving, decoding, or dispatching a tool call.
#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Unknown worker or tool selection: {0}")]
    UnknownCapability(String),

    #[error("Malformed tool call: {0}")]
    MalformedToolCall(String),

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    /// A nested loop's model call failed; not recoverable by the caller
    #[error("Model call failed: {0}")]
    Model(ProviderError),

    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_displays_correctly() {
        let err = Error::Provider(ProviderError::ApiError {
            status_code: 429,
            message: "Too many requests".into(),
        });
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Too many requests"));
    }

    #[test]
    fn start_failure_names_the_connection() {
        let err = Error::Connection(ConnectionError::StartFailed {
            connection: "playwright".into(),
            reason: "npx not found".into(),
        });
        assert!(err.to_string().contains("playwright"));
        assert!(err.to_string().contains("npx not found"));
    }

    #[test]
    fn connection_errors_convert_into_tool_errors() {
        let err: ToolError = ConnectionError::NotStarted("calc".into()).into();
        assert!(matches!(err, ToolError::Connection(ConnectionError::NotStarted(_))));
        assert_eq!(err.to_string(), "Connection not started: calc");
    }
}
