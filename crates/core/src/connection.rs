//! ProviderConnection trait — one session with an external tool provider.
//!
//! A connection goes through exactly one lifecycle:
//! `Uninitialized → Started → Stopped`. Tools can only be listed or invoked
//! while started; a stopped connection is never restarted.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use crate::error::{ConnectionError, ToolError};
use crate::tool::ToolDescriptor;

/// Lifecycle state of a provider connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Uninitialized,
    Started,
    Stopped,
}

impl ConnectionState {
    pub fn is_started(&self) -> bool {
        matches!(self, ConnectionState::Started)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConnectionState::Uninitialized => "uninitialized",
            ConnectionState::Started => "started",
            ConnectionState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// A live session with one tool provider.
///
/// Implementations live in `stepwise-tools`: a stdio subprocess speaking
/// JSON-RPC, and an in-process host for Rust-native tools.
#[async_trait]
pub trait ProviderConnection: Send + Sync {
    /// The name this connection was configured under.
    fn name(&self) -> &str;

    /// A short description of what this provider offers.
    fn description(&self) -> &str {
        ""
    }

    /// Current lifecycle state.
    fn state(&self) -> ConnectionState;

    /// Establish the session. Fails with `AlreadyStarted` unless the
    /// connection is uninitialized.
    async fn start(&mut self) -> std::result::Result<(), ConnectionError>;

    /// Release the session. Stopping a connection that is not started is a
    /// no-op; stop never panics.
    async fn stop(&mut self) -> std::result::Result<(), ConnectionError>;

    /// List the tools this provider currently offers.
    async fn list_tools(&self) -> std::result::Result<Vec<ToolDescriptor>, ConnectionError>;

    /// Invoke one tool and return its text result.
    async fn invoke(&self, tool_name: &str, arguments: Value) -> std::result::Result<String, ToolError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_serializes_lowercase() {
        let json = serde_json::to_value(ConnectionState::Started).unwrap();
        assert_eq!(json, "started");
        assert_eq!(ConnectionState::Stopped.to_string(), "stopped");
    }

    #[test]
    fn only_started_is_started() {
        assert!(ConnectionState::Started.is_started());
        assert!(!ConnectionState::Uninitialized.is_started());
        assert!(!ConnectionState::Stopped.is_started());
    }
}
