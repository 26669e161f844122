//! Weather tool: a canned forecast keyed on the location.
//!
//! San Francisco is always foggy, everywhere else is always hot. Enough to
//! exercise a full request/result round trip without network access.

use async_trait::async_trait;
use toolchat_core::error::ToolError;
use toolchat_core::tool::{Tool, ToolOutput};

pub struct GetWeatherTool;

#[async_trait]
impl Tool for GetWeatherTool {
    fn name(&self) -> &str {
        "get_weather"
    }

    fn description(&self) -> &str {
        "Call to get the current weather."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "location": {
                    "type": "string",
                    "description": "The city to get the weather for"
                }
            },
            "required": ["location"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let location = arguments["location"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'location' argument".into()))?;

        tracing::debug!(%location, "Looking up weather");
        Ok(ToolOutput::Text(forecast(location)))
    }
}

fn forecast(location: &str) -> String {
    let key = location.trim().to_lowercase();
    if key == "sf" || key == "san francisco" {
        format!("It's 60 degrees and foggy in {location}.")
    } else {
        format!("It's 90 degrees and sunny in {location}.")
    }
}
