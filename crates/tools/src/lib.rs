//! Built-in tool implementations for toolchat.
//!
//! Tools give the model a way to look things up mid-conversation.
//! The set is fixed at startup and read-only afterwards.

pub mod coolest_cities;
pub mod get_weather;

use toolchat_core::error::ToolError;
use toolchat_core::tool::ToolRegistry;

pub use coolest_cities::CoolestCitiesTool;
pub use get_weather::GetWeatherTool;

/// Create a default tool registry with all built-in tools.
pub fn default_registry() -> Result<ToolRegistry, ToolError> {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(GetWeatherTool))?;
    registry.register(Box::new(CoolestCitiesTool))?;
    Ok(registry)
}
