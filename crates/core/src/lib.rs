//! # Stepwise Core
//!
//! Domain types, traits, and error definitions for the Stepwise
//! orchestration runtime. This crate has **no framework dependencies** — it
//! defines the domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every seam is defined as a trait here. Implementations live in their
//! respective crates:
//! - [`Provider`] — the language-model boundary (`stepwise-providers`)
//! - [`ProviderConnection`] — an external tool provider (`stepwise-tools`)
//! - [`Tool`] — an in-process tool hosted by a local connection
//!
//! This keeps the orchestration loop testable with scripted models and
//! in-process providers, and keeps the dependency graph pointing inward.

pub mod connection;
pub mod error;
pub mod event;
pub mod message;
pub mod provider;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use connection::{ConnectionState, ProviderConnection};
pub use error::{ConnectionError, Error, ProviderError, ToolError};
pub use event::{DomainEvent, EventBus};
pub use message::{Conversation, ConversationId, Message, MessageToolCall, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse, Usage};
pub use tool::{Tool, ToolCallRequest, ToolDescriptor};
