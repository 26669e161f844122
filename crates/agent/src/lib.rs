//! The tool-calling orchestration loop: the heart of toolchat.
//!
//! Each user message goes through the same cycle:
//!
//! 1. **Append** the human turn to the session's message log
//! 2. **Send** the whole log and the tool list to the model
//! 3. **If tool requests**: append the assistant turn, dispatch the tools,
//!    append their results, go back to step 2
//! 4. **Otherwise**: append the answer and return it
//!
//! The cycle ends when the model answers without tool requests or the
//! iteration budget is spent.

pub mod dispatcher;
pub mod loop_runner;
pub mod session;

#[cfg(test)]
mod test_helpers;

pub use dispatcher::ToolDispatcher;
pub use loop_runner::{AgentLoop, AgentReply};
pub use session::{BUDGET_NOTICE, ChatSession, StopHandle};
pub use tokio_util::sync::CancellationToken;
