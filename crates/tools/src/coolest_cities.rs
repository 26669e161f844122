//! Coolest-cities tool. Takes no arguments.

use async_trait::async_trait;
use toolchat_core::error::ToolError;
use toolchat_core::tool::{Tool, ToolOutput};

pub struct CoolestCitiesTool;

#[async_trait]
impl Tool for CoolestCitiesTool {
    fn name(&self) -> &str {
        "get_coolest_cities"
    }

    fn description(&self) -> &str {
        "Get a list of coolest cities"
    }

    async fn execute(&self, _arguments: serde_json::Value) -> Result<ToolOutput, ToolError> {
        Ok(ToolOutput::Text("nyc, sf".into()))
    }
}
