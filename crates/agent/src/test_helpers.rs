//! Shared test helpers for loop, dispatcher and session tests.

use std::sync::Mutex;
use std::time::Duration;

use toolchat_core::error::{ProviderError, ToolError};
use toolchat_core::message::{Message, ToolRequest};
use toolchat_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use toolchat_core::tool::{FnTool, ToolOutput, ToolRegistry};

/// A mock provider that returns a sequence of scripted responses.
///
/// Each call to `complete` returns the next response in the queue and
/// records the request it was given.
/// Panics if more calls are made than responses provided.
pub struct SequentialMockProvider {
    responses: Mutex<Vec<Result<ProviderResponse, ProviderError>>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl SequentialMockProvider {
    pub fn new(responses: Vec<ProviderResponse>) -> Self {
        Self::with_results(responses.into_iter().map(Ok).collect())
    }

    pub fn with_results(responses: Vec<Result<ProviderResponse, ProviderError>>) -> Self {
        Self {
            responses: Mutex::new(responses),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Create a provider that returns a single text response (no tool requests).
    pub fn single_text(text: &str) -> Self {
        Self::new(vec![make_text_response(text)])
    }

    /// Create a provider that first requests tools, then gives a final answer.
    pub fn tool_then_answer(requests: Vec<ToolRequest>, answer: &str) -> Self {
        Self::new(vec![
            make_tool_call_response(requests, ""),
            make_text_response(answer),
        ])
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Every request seen so far, in call order.
    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Provider for SequentialMockProvider {
    fn name(&self) -> &str {
        "sequential_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let mut requests = self.requests.lock().unwrap();
        let mut responses = self.responses.lock().unwrap();
        let call = requests.len();
        requests.push(request);

        if responses.is_empty() {
            panic!("SequentialMockProvider: no more responses (call #{call})");
        }
        responses.remove(0)
    }
}

/// A provider that asks for the same tool on every call, with a fresh call id.
pub struct AlwaysToolProvider {
    tool: String,
    calls: Mutex<usize>,
}

impl AlwaysToolProvider {
    pub fn new(tool: &str) -> Self {
        Self {
            tool: tool.into(),
            calls: Mutex::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait::async_trait]
impl Provider for AlwaysToolProvider {
    fn name(&self) -> &str {
        "always_tool"
    }

    async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let mut calls = self.calls.lock().unwrap();
        *calls += 1;
        Ok(make_tool_call_response(
            vec![ToolRequest::new(
                format!("call_{}", *calls),
                &self.tool,
                serde_json::json!({"location": "SF"}),
            )],
            &format!("attempt {}", *calls),
        ))
    }
}

/// A provider that never answers within any reasonable time.
pub struct StalledProvider;

#[async_trait::async_trait]
impl Provider for StalledProvider {
    fn name(&self) -> &str {
        "stalled"
    }

    async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(make_text_response("too late"))
    }
}

fn usage() -> Option<Usage> {
    Some(Usage {
        prompt_tokens: 10,
        completion_tokens: 5,
        total_tokens: 15,
    })
}

/// Create a simple text response (no tool requests).
pub fn make_text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        usage: usage(),
        model: "mock-model".into(),
    }
}

/// Create a response carrying tool requests and optional text.
pub fn make_tool_call_response(requests: Vec<ToolRequest>, text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant_with_requests(text, requests),
        usage: usage(),
        model: "mock-model".into(),
    }
}

/// Helper to create a tool request.
pub fn make_request(call_id: &str, name: &str, args: serde_json::Value) -> ToolRequest {
    ToolRequest::new(call_id, name, args)
}

/// A registry with `get_weather`, a tool that always fails, and a slow tool.
pub fn test_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry
        .register(Box::new(FnTool::new(
            "get_weather",
            "Call to get the current weather.",
            serde_json::json!({
                "type": "object",
                "properties": {"location": {"type": "string"}},
                "required": ["location"]
            }),
            |args| {
                let location = args["location"].as_str().unwrap_or("nowhere");
                if location.eq_ignore_ascii_case("sf") {
                    Ok(ToolOutput::Text(format!("It's 60 degrees and foggy in {location}.")))
                } else {
                    Ok(ToolOutput::Text(format!("It's 90 degrees and sunny in {location}.")))
                }
            },
        )))
        .unwrap();
    registry
        .register(Box::new(FnTool::new(
            "explode",
            "Always fails",
            serde_json::json!({"type": "object"}),
            |_| {
                Err(ToolError::ExecutionFailed {
                    tool_name: "explode".into(),
                    reason: "boom".into(),
                })
            },
        )))
        .unwrap();
    registry.register(Box::new(SlowTool)).unwrap();
    registry
}

/// A tool that takes an hour. Use with paused time.
pub struct SlowTool;

#[async_trait::async_trait]
impl toolchat_core::Tool for SlowTool {
    fn name(&self) -> &str {
        "slow"
    }

    fn description(&self) -> &str {
        "Takes a long time"
    }

    async fn execute(&self, _arguments: serde_json::Value) -> Result<ToolOutput, ToolError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(ToolOutput::Text("finally".into()))
    }
}
