//! # toolchat Core
//!
//! Domain types, traits, and error definitions for the toolchat assistant.
//! This crate has **no framework dependencies**: it defines the domain model
//! that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every collaborator (model backend, tool, front end) is defined as a trait
//! here. Implementations live in their respective crates. This enables:
//! - Swapping implementations via configuration
//! - Easy testing with mock/stub implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod error;
pub mod event;
pub mod frontend;
pub mod message;
pub mod provider;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, ProviderError, Result, ToolError, ValidationError};
pub use event::{DomainEvent, EventBus};
pub use frontend::Frontend;
pub use message::{ConversationId, Message, MessageLog, Role, ToolRequest};
pub use provider::{Provider, ProviderRequest, ProviderResponse, ToolDefinition, Usage};
pub use tool::{FnTool, Tool, ToolOutput, ToolRegistry};
