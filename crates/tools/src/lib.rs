//! Tool provider connections for Stepwise.
//!
//! Providers are where tools actually run:
//! - [`StdioConnection`]: an MCP server spawned as a child process
//! - [`LocalConnection`]: Rust-native tools hosted in-process
//!
//! A [`ConnectionPool`] owns a set of connections and gives the
//! orchestration loop one discovery and dispatch surface over all of them.

pub mod local;
pub mod pool;
pub mod stdio;

#[cfg(test)]
mod test_support;

pub use local::LocalConnection;
pub use pool::{ConnectionPool, StartReport};
pub use stdio::StdioConnection;
