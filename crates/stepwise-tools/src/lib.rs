//! Tool registry for Stepwise.
//!
//! A tool is a name, a description the model reads when choosing what to
//! call, a JSON Schema for its input and an execution capability
//! ([`ToolExecutor`]).  The [`ToolRegistry`] holds them in registration
//! order and is shared read-only by the orchestrator.
//!
//! ## Modules
//!
//! - [`registry`] -- Registration, lookup, description and input validation.
//! - [`traits`] -- The execution capability and closure adapter.
//! - [`error`] -- Registry and tool error types.

pub mod error;
pub mod registry;
pub mod traits;

pub use error::{RegistryError, Result, ToolError};
pub use registry::{ToolDefinition, ToolRegistry};
pub use traits::{FnTool, ToolDescription, ToolExecutor, tool_fn};
