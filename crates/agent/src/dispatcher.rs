//! Tool dispatcher: turns an assistant turn's tool requests into tool results.
//!
//! Failures never escape the dispatcher. An unknown tool, a tool error, a
//! timeout or a cancellation all become a tool-result turn whose content
//! describes the failure, so the model can see it and react.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use toolchat_core::error::ToolError;
use toolchat_core::event::{DomainEvent, EventBus};
use toolchat_core::message::{Message, ToolRequest};
use toolchat_core::tool::{ToolOutput, ToolRegistry};
use tracing::{debug, warn};

/// Executes the tool requests carried by one assistant turn.
pub struct ToolDispatcher {
    tools: Arc<ToolRegistry>,
    tool_timeout: Duration,
    parallel: bool,
    event_bus: Option<Arc<EventBus>>,
}

impl ToolDispatcher {
    pub fn new(tools: Arc<ToolRegistry>) -> Self {
        Self {
            tools,
            tool_timeout: Duration::from_secs(30),
            parallel: false,
            event_bus: None,
        }
    }

    /// Set the per-tool timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = timeout;
        self
    }

    /// Run the requests of one batch concurrently. Result order is unchanged.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Execute every tool request in `turn`, producing one tool-result turn
    /// per request, in request order.
    ///
    /// Returns an empty vector when the turn requests nothing. Once `cancel`
    /// fires, requests that have not finished get a "cancelled" result.
    pub async fn execute(&self, turn: &Message, cancel: &CancellationToken) -> Vec<Message> {
        let requests = &turn.tool_requests;
        if requests.is_empty() {
            return Vec::new();
        }

        debug!(count = requests.len(), parallel = self.parallel, "Dispatching tool requests");

        if self.parallel {
            join_all(requests.iter().map(|req| self.run_one(req, cancel))).await
        } else {
            let mut results = Vec::with_capacity(requests.len());
            for req in requests {
                results.push(self.run_one(req, cancel).await);
            }
            results
        }
    }

    async fn run_one(&self, req: &ToolRequest, cancel: &CancellationToken) -> Message {
        let start = Instant::now();

        let outcome = if cancel.is_cancelled() {
            Err(ToolError::Cancelled(req.name.clone()))
        } else {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(ToolError::Cancelled(req.name.clone())),
                result = self.invoke(req) => result,
            }
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        let success = outcome.is_ok();

        let content = match outcome {
            Ok(output) => {
                debug!(tool = %req.name, call_id = %req.call_id, duration_ms, "Tool succeeded");
                output.into_content()
            }
            Err(e) => {
                warn!(tool = %req.name, call_id = %req.call_id, error = %e, "Tool execution failed");
                format!("Error: {e}")
            }
        };

        if let Some(bus) = &self.event_bus {
            bus.publish(DomainEvent::ToolExecuted {
                tool_name: req.name.clone(),
                call_id: req.call_id.clone(),
                success,
                duration_ms,
                timestamp: Utc::now(),
            });
        }

        Message::tool_result(&req.call_id, content)
    }

    async fn invoke(&self, req: &ToolRequest) -> Result<ToolOutput, ToolError> {
        let tool = self.tools.resolve(&req.name)?;
        match tokio::time::timeout(self.tool_timeout, tool.execute(req.arguments.clone())).await {
            Ok(result) => result,
            Err(_) => Err(ToolError::Timeout {
                tool_name: req.name.clone(),
                timeout_secs: self.tool_timeout.as_secs(),
            }),
        }
    }
}
