//! Chat session: one user's conversation and everything it needs.
//!
//! A session owns its [`MessageLog`] exclusively. Many sessions may share a
//! single [`AgentLoop`]; nothing else is shared between them.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use toolchat_core::error::{Error, Result};
use toolchat_core::event::DomainEvent;
use toolchat_core::frontend::Frontend;
use toolchat_core::message::{ConversationId, Message, MessageLog};
use tracing::{Instrument, info, info_span, warn};

use crate::loop_runner::{AgentLoop, AgentReply};

/// Shown when a reply was cut short by the iteration budget.
pub const BUDGET_NOTICE: &str =
    "Reached the maximum number of tool call iterations; the answer may be incomplete.";

/// Cancels the response currently being generated.
///
/// Cheap to clone; hand one to a signal handler.
#[derive(Clone, Default)]
pub struct StopHandle {
    inner: Arc<Mutex<StopState>>,
}

#[derive(Default)]
struct StopState {
    token: CancellationToken,
    in_flight: bool,
}

impl StopHandle {
    /// Request a stop. Returns `false` when no response is in flight.
    pub fn stop(&self) -> bool {
        let state = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if state.in_flight {
            state.token.cancel();
        }
        state.in_flight
    }

    pub fn is_in_flight(&self) -> bool {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).in_flight
    }

    /// A fresh token for the response about to start.
    fn arm(&self) -> CancellationToken {
        let mut state = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        state.token = CancellationToken::new();
        state.in_flight = true;
        state.token.clone()
    }

    fn disarm(&self) {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).in_flight = false;
    }
}

/// The explicit context object for one conversation.
pub struct ChatSession {
    id: ConversationId,
    log: MessageLog,
    agent: Arc<AgentLoop>,
    stop: StopHandle,
}

impl ChatSession {
    pub fn new(agent: Arc<AgentLoop>) -> Self {
        Self {
            id: ConversationId::new(),
            log: MessageLog::new(),
            agent,
            stop: StopHandle::default(),
        }
    }

    pub fn id(&self) -> &ConversationId {
        &self.id
    }

    pub fn log(&self) -> &MessageLog {
        &self.log
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Cooperatively cancel the response in flight, if any.
    pub fn stop(&self) -> bool {
        self.stop.stop()
    }

    /// Send user text and run the loop to a final answer.
    pub async fn submit(&mut self, text: &str) -> Result<AgentReply> {
        let token = self.stop.arm();
        let span = info_span!("respond", conversation_id = %self.id);
        let result = self
            .agent
            .respond(&mut self.log, Some(text), &token)
            .instrument(span)
            .await;
        self.stop.disarm();
        result
    }

    /// The conversation as a UTF-8 JSON array.
    pub fn export_json(&self) -> Result<String> {
        Ok(self.log.export_json()?)
    }

    /// Replace the conversation with a previously exported one.
    ///
    /// On error the current conversation is left as it was.
    pub fn import_json(&mut self, json: &str) -> Result<()> {
        self.log.import_json(json)?;
        info!(conversation_id = %self.id, turns = self.log.len(), "Conversation imported");
        self.agent.event_bus().publish(DomainEvent::ConversationImported {
            conversation_id: self.id.to_string(),
            turns: self.log.len(),
            timestamp: Utc::now(),
        });
        Ok(())
    }

    /// Turns a user should see, in order.
    pub fn display_turns(&self) -> impl Iterator<Item = &Message> + Clone + '_ {
        self.log.displayable()
    }

    /// One UI cycle: pick up an uploaded snapshot, then the user's text,
    /// then render whatever the reply added.
    ///
    /// Failures are reported through the frontend; the session stays usable.
    /// Returns the reply when the model answered.
    pub async fn run_turn<F>(&mut self, frontend: &mut F) -> Option<AgentReply>
    where
        F: Frontend + ?Sized,
    {
        if let Some(snapshot) = frontend.get_uploaded_snapshot().await {
            match self.import_json(&snapshot) {
                Ok(()) => {
                    for turn in self.log.displayable() {
                        frontend.render(turn).await;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Import rejected");
                    frontend.report_error(&format!("Import failed: {e}")).await;
                }
            }
        }

        let text = frontend.get_user_text().await?;
        let before = self.log.len();
        let result = self.submit(&text).await;

        for turn in self.log.messages()[before..]
            .iter()
            .filter(|m| m.is_displayable())
        {
            frontend.render(turn).await;
        }

        match result {
            Ok(reply) => {
                if reply.budget_exhausted {
                    frontend.report_error(BUDGET_NOTICE).await;
                }
                Some(reply)
            }
            Err(Error::Cancelled) => {
                frontend.report_error("Response stopped.").await;
                None
            }
            Err(e) if !e.is_retryable() => {
                frontend
                    .report_error(&format!("Error: {e}. Check the API key and provider settings."))
                    .await;
                None
            }
            Err(e) => {
                frontend.report_error(&format!("Error: {e}")).await;
                None
            }
        }
    }

    /// File name for a download of this conversation taken at `now`.
    pub fn export_file_name(now: DateTime<Utc>) -> String {
        format!(
            "toolchat_messages_{}_{}.json",
            now.format("%Y-%m-%d"),
            now.timestamp()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;
    use chrono::TimeZone;
    use toolchat_core::event::EventBus;
    use toolchat_core::message::Role;

    fn session(provider: Arc<dyn toolchat_core::Provider>) -> ChatSession {
        let agent = AgentLoop::new(
            provider,
            "mock-model",
            Arc::new(test_registry()),
            Arc::new(EventBus::default()),
        );
        ChatSession::new(Arc::new(agent))
    }

    /// A scripted frontend that records what it was shown.
    #[derive(Default)]
    struct ScriptedFrontend {
        texts: Vec<String>,
        snapshot: Option<String>,
        rendered: Vec<(Role, String)>,
        errors: Vec<String>,
    }

    #[async_trait::async_trait]
    impl Frontend for ScriptedFrontend {
        async fn render(&mut self, turn: &Message) {
            self.rendered.push((turn.role, turn.content.clone()));
        }

        async fn get_user_text(&mut self) -> Option<String> {
            if self.texts.is_empty() {
                None
            } else {
                Some(self.texts.remove(0))
            }
        }

        async fn get_uploaded_snapshot(&mut self) -> Option<String> {
            self.snapshot.take()
        }

        async fn report_error(&mut self, message: &str) {
            self.errors.push(message.to_string());
        }
    }

    #[tokio::test]
    async fn submit_and_display() {
        let mut session = session(Arc::new(SequentialMockProvider::tool_then_answer(
            vec![make_request("c1", "get_weather", serde_json::json!({"location": "SF"}))],
            "Foggy.",
        )));
        let reply = session.submit("Weather in SF?").await.unwrap();
        assert_eq!(reply.content, "Foggy.");
        assert_eq!(session.log().len(), 4);

        let shown: Vec<_> = session.display_turns().map(|m| m.content.as_str()).collect();
        assert_eq!(shown, vec!["Weather in SF?", "Foggy."]);
        assert!(!session.stop_handle().is_in_flight());
    }

    #[tokio::test]
    async fn export_import_round_trip() {
        let mut first = session(Arc::new(SequentialMockProvider::tool_then_answer(
            vec![make_request("c1", "get_weather", serde_json::json!({"location": "SF"}))],
            "Foggy.",
        )));
        first.submit("Weather?").await.unwrap();
        let json = first.export_json().unwrap();

        let mut second = session(Arc::new(SequentialMockProvider::new(vec![])));
        second.import_json(&json).unwrap();

        let a = first.log().messages();
        let b = second.log().messages();
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b) {
            assert_eq!(x.role, y.role);
            assert_eq!(x.content, y.content);
            assert_eq!(x.tool_requests, y.tool_requests);
            assert_eq!(x.tool_call_id, y.tool_call_id);
        }
    }

    #[tokio::test]
    async fn bad_import_leaves_log_untouched() {
        let mut session = session(Arc::new(SequentialMockProvider::single_text("hi")));
        session.submit("hello").await.unwrap();

        let err = session
            .import_json(r#"[{"role": "wizard", "content": "x"}]"#)
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(session.log().len(), 2);
    }

    #[tokio::test]
    async fn import_publishes_event() {
        let mut session = session(Arc::new(SequentialMockProvider::new(vec![])));
        let mut rx = session.agent.event_bus().subscribe();
        session
            .import_json(r#"[{"role": "user", "content": "saved"}]"#)
            .unwrap();
        let event = rx.recv().await.unwrap();
        assert!(matches!(
            event.as_ref(),
            DomainEvent::ConversationImported { turns: 1, .. }
        ));
    }

    #[tokio::test]
    async fn run_turn_renders_new_displayable_turns() {
        let mut session = session(Arc::new(SequentialMockProvider::tool_then_answer(
            vec![make_request("c1", "get_weather", serde_json::json!({"location": "SF"}))],
            "It's foggy.",
        )));
        let mut frontend = ScriptedFrontend {
            texts: vec!["Weather?".into()],
            ..Default::default()
        };

        let reply = session.run_turn(&mut frontend).await.unwrap();
        assert_eq!(reply.content, "It's foggy.");
        assert_eq!(
            frontend.rendered,
            vec![
                (Role::Human, "Weather?".to_string()),
                (Role::Assistant, "It's foggy.".to_string()),
            ]
        );
        assert!(frontend.errors.is_empty());
    }

    #[tokio::test]
    async fn run_turn_imports_snapshot_first() {
        let mut session = session(Arc::new(SequentialMockProvider::single_text("Welcome back.")));
        let mut frontend = ScriptedFrontend {
            texts: vec!["Still there?".into()],
            snapshot: Some(
                r#"[{"role": "human", "content": "Hi"}, {"role": "assistant", "content": "Hello"}]"#
                    .into(),
            ),
            ..Default::default()
        };

        session.run_turn(&mut frontend).await.unwrap();
        let shown: Vec<_> = frontend.rendered.iter().map(|(_, c)| c.as_str()).collect();
        assert_eq!(shown, vec!["Hi", "Hello", "Still there?", "Welcome back."]);
        assert_eq!(session.log().len(), 4);
    }

    #[tokio::test]
    async fn run_turn_reports_import_and_model_errors() {
        let mut session = session(Arc::new(SequentialMockProvider::with_results(vec![Err(
            toolchat_core::ProviderError::Network("offline".into()),
        )])));
        let mut frontend = ScriptedFrontend {
            texts: vec!["hello".into()],
            snapshot: Some("not json".into()),
            ..Default::default()
        };

        assert!(session.run_turn(&mut frontend).await.is_none());
        assert_eq!(frontend.errors.len(), 2);
        assert!(frontend.errors[0].starts_with("Import failed"));
        assert!(frontend.errors[1].contains("offline"));
        // The human turn is kept so the user can retry
        assert_eq!(session.log().len(), 1);
    }

    #[tokio::test]
    async fn run_turn_points_at_settings_on_auth_failure() {
        let mut session = session(Arc::new(SequentialMockProvider::with_results(vec![Err(
            toolchat_core::ProviderError::AuthenticationFailed("invalid key".into()),
        )])));
        let mut frontend = ScriptedFrontend {
            texts: vec!["hello".into()],
            ..Default::default()
        };

        assert!(session.run_turn(&mut frontend).await.is_none());
        assert_eq!(frontend.errors.len(), 1);
        assert!(frontend.errors[0].contains("invalid key"));
        assert!(frontend.errors[0].contains("Check the API key"));
    }

    #[tokio::test]
    async fn run_turn_flags_budget_exhaustion() {
        let agent = AgentLoop::new(
            Arc::new(AlwaysToolProvider::new("get_weather")),
            "mock-model",
            Arc::new(test_registry()),
            Arc::new(EventBus::default()),
        )
        .with_max_iterations(2);
        let mut session = ChatSession::new(Arc::new(agent));
        let mut frontend = ScriptedFrontend {
            texts: vec!["go".into()],
            ..Default::default()
        };

        let reply = session.run_turn(&mut frontend).await.unwrap();
        assert!(reply.budget_exhausted);
        assert_eq!(frontend.errors, vec![BUDGET_NOTICE.to_string()]);
    }

    #[tokio::test]
    async fn run_turn_without_text_does_nothing() {
        let provider = Arc::new(SequentialMockProvider::new(vec![]));
        let mut session = session(provider.clone());
        let mut frontend = ScriptedFrontend::default();
        assert!(session.run_turn(&mut frontend).await.is_none());
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_cancels_in_flight_response() {
        let mut session = session(Arc::new(StalledProvider));
        let handle = session.stop_handle();
        assert!(!handle.stop());

        let stopper = handle.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_secs(1)).await;
            assert!(stopper.stop());
        });

        let err = session.submit("hi").await.unwrap_err();
        assert!(err.is_cancelled());
        assert!(!handle.is_in_flight());
    }

    #[test]
    fn export_file_name_format() {
        let now = Utc.with_ymd_and_hms(2024, 7, 23, 12, 0, 0).unwrap();
        assert_eq!(
            ChatSession::export_file_name(now),
            format!("toolchat_messages_2024-07-23_{}.json", now.timestamp())
        );
    }
}
