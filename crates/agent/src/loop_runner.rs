//! The tool-calling orchestration loop.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use toolchat_config::AppConfig;
use toolchat_core::error::{Error, ProviderError, Result};
use toolchat_core::event::{DomainEvent, EventBus};
use toolchat_core::message::{Message, MessageLog, Role};
use toolchat_core::provider::{Provider, ProviderRequest, ToolDefinition};
use toolchat_core::tool::ToolRegistry;
use tracing::{debug, info, warn};

use crate::dispatcher::ToolDispatcher;

/// What [`AgentLoop::respond`] hands back.
#[derive(Debug, Clone)]
pub struct AgentReply {
    /// Text of the final assistant turn
    pub content: String,
    /// The final assistant turn itself (already appended to the log)
    pub message: Message,
    /// How many times the model was invoked
    pub model_calls: usize,
    /// The iteration budget ran out while the model still wanted tools
    pub budget_exhausted: bool,
}

enum LoopState {
    AwaitModel,
    DispatchTools(Message),
    Done {
        message: Message,
        budget_exhausted: bool,
    },
}

/// Drives model invocation and tool dispatch until the model stops asking
/// for tools or the iteration budget runs out.
///
/// One `AgentLoop` can serve many sessions; all per-conversation state
/// lives in the [`MessageLog`] passed to [`respond`](Self::respond).
pub struct AgentLoop {
    /// The LLM provider to use
    provider: Arc<dyn Provider>,

    /// Executes tool requests
    dispatcher: ToolDispatcher,

    /// The model to use
    model: String,

    temperature: f32,
    top_p: Option<f32>,
    max_tokens: Option<u32>,
    stop: Vec<String>,

    /// Maximum model invocations per call to `respond`
    max_iterations: usize,

    model_timeout: Duration,

    /// Appended once, as the first turn of an empty log
    system_prompt: Option<String>,

    /// Event bus for domain events
    event_bus: Arc<EventBus>,
}

impl AgentLoop {
    /// Create a new agent loop.
    pub fn new(
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        tools: Arc<ToolRegistry>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            provider,
            dispatcher: ToolDispatcher::new(tools).with_event_bus(event_bus.clone()),
            model: model.into(),
            temperature: 0.7,
            top_p: None,
            max_tokens: None,
            stop: Vec::new(),
            max_iterations: 10,
            model_timeout: Duration::from_secs(120),
            system_prompt: None,
            event_bus,
        }
    }

    /// Build a loop from application config.
    pub fn from_config(
        config: &AppConfig,
        provider: Arc<dyn Provider>,
        tools: Arc<ToolRegistry>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        let agent = &config.agent;
        let mut runner = Self::new(provider, &config.default_model, tools, event_bus)
            .with_temperature(config.default_temperature)
            .with_top_p(config.default_top_p)
            .with_max_tokens(config.default_max_tokens)
            .with_stop(config.effective_stop())
            .with_max_iterations(agent.max_tool_iterations)
            .with_model_timeout(Duration::from_secs(agent.model_timeout_secs));
        runner.dispatcher = runner
            .dispatcher
            .with_timeout(Duration::from_secs(agent.tool_timeout_secs))
            .with_parallel(agent.parallel_tools);
        if let Some(prompt) = &agent.system_prompt {
            runner = runner.with_system_prompt(prompt);
        }
        runner
    }

    /// Set the maximum number of model invocations per response.
    ///
    /// Values below 1 are raised to 1.
    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max.max(1);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_top_p(mut self, top_p: f32) -> Self {
        self.top_p = Some(top_p);
        self
    }

    /// Set the default max tokens per LLM response.
    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    pub fn with_stop(mut self, stop: Vec<String>) -> Self {
        self.stop = stop;
        self
    }

    pub fn with_model_timeout(mut self, timeout: Duration) -> Self {
        self.model_timeout = timeout;
        self
    }

    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.dispatcher = self.dispatcher.with_timeout(timeout);
        self
    }

    pub fn with_parallel_tools(mut self, parallel: bool) -> Self {
        self.dispatcher = self.dispatcher.with_parallel(parallel);
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    pub fn tools(&self) -> &ToolRegistry {
        self.dispatcher.tools()
    }

    /// Produce the assistant's answer to the conversation in `log`.
    ///
    /// If `input` is given it is appended as a human turn first. Every turn
    /// the loop produces is appended to `log`; turns appended before a
    /// failure stay in place.
    ///
    /// Model failures and timeouts are returned as [`Error::Provider`]. Tool
    /// failures never are: they become tool-result content. When `cancel`
    /// fires, the loop stops at the next suspension point with
    /// [`Error::Cancelled`].
    pub async fn respond(
        &self,
        log: &mut MessageLog,
        input: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<AgentReply> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        if log.is_empty() {
            if let Some(prompt) = &self.system_prompt {
                log.append(Message::system(prompt))?;
            }
        }

        if let Some(text) = input {
            log.append(Message::human(text))?;
        }

        info!(
            turns = log.len(),
            model = %self.model,
            max_iterations = self.max_iterations,
            "Processing conversation"
        );

        let tool_definitions = self.dispatcher.tools().list();
        let mut model_calls = 0;
        let mut state = LoopState::AwaitModel;

        loop {
            state = match state {
                LoopState::AwaitModel => {
                    model_calls += 1;
                    debug!(iteration = model_calls, "Agent loop iteration");

                    let response = self.invoke_model(log, &tool_definitions, cancel).await?;
                    log.append(response.clone())?;

                    if response.has_tool_requests() {
                        LoopState::DispatchTools(response)
                    } else {
                        LoopState::Done {
                            message: response,
                            budget_exhausted: false,
                        }
                    }
                }

                LoopState::DispatchTools(turn) => {
                    let results = self.dispatcher.execute(&turn, cancel).await;
                    let produced = results.len();
                    for result in results {
                        log.append(result)?;
                    }

                    if cancel.is_cancelled() {
                        info!("Response cancelled during tool dispatch");
                        return Err(Error::Cancelled);
                    }

                    if produced == 0 {
                        LoopState::Done {
                            message: turn,
                            budget_exhausted: false,
                        }
                    } else if model_calls >= self.max_iterations {
                        warn!(
                            iterations = model_calls,
                            "Max tool iterations reached, returning last response"
                        );
                        LoopState::Done {
                            message: turn,
                            budget_exhausted: true,
                        }
                    } else {
                        LoopState::AwaitModel
                    }
                }

                LoopState::Done {
                    message,
                    budget_exhausted,
                } => {
                    info!(model_calls, budget_exhausted, "Response complete");
                    return Ok(AgentReply {
                        content: message.content.clone(),
                        message,
                        model_calls,
                        budget_exhausted,
                    });
                }
            };
        }
    }

    /// One model round trip, bounded by the model timeout and `cancel`.
    async fn invoke_model(
        &self,
        log: &MessageLog,
        tools: &[ToolDefinition],
        cancel: &CancellationToken,
    ) -> Result<Message> {
        let request = ProviderRequest {
            model: self.model.clone(),
            messages: log.export(),
            temperature: self.temperature,
            top_p: self.top_p,
            max_tokens: self.max_tokens,
            tools: tools.to_vec(),
            stop: self.stop.clone(),
        };

        let call = tokio::time::timeout(self.model_timeout, self.provider.complete(request));
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            outcome = call => outcome,
        };

        let response = match outcome {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(self.model_failure(e)),
            Err(_) => {
                return Err(self.model_failure(ProviderError::Timeout(format!(
                    "{} did not answer within {}s",
                    self.provider.name(),
                    self.model_timeout.as_secs()
                ))));
            }
        };

        // A response that lands after a stop request is discarded.
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let mut message = response.message;
        if message.role != Role::Assistant {
            return Err(self.model_failure(ProviderError::InvalidResponse(format!(
                "model returned a {} turn",
                message.role
            ))));
        }
        if !message.has_tool_requests() && message.content.trim().is_empty() {
            return Err(self.model_failure(ProviderError::InvalidResponse(
                "model returned an empty response".into(),
            )));
        }
        for request in &mut message.tool_requests {
            if request.call_id.is_empty() {
                request.call_id = format!("call_{}", uuid::Uuid::new_v4().simple());
            }
        }

        self.event_bus.publish(DomainEvent::ResponseGenerated {
            model: response.model,
            tool_requests: message.tool_requests.len(),
            tokens_used: response.usage.map(|u| u.total_tokens).unwrap_or(0),
            timestamp: Utc::now(),
        });

        Ok(message)
    }

    fn model_failure(&self, error: ProviderError) -> Error {
        warn!(provider = %self.provider.name(), error = %error, "Model invocation failed");
        self.event_bus.publish(DomainEvent::ErrorOccurred {
            context: "model invocation".into(),
            error_message: error.to_string(),
            timestamp: Utc::now(),
        });
        Error::Provider(error)
    }
}
