//! Frontend trait: the UI boundary the chat session talks to.
//!
//! A frontend renders turns and hands user input back to the session. The
//! core never draws anything itself; a terminal, a web page or a test double
//! implements these operations.

use async_trait::async_trait;

use crate::message::Message;

#[async_trait]
pub trait Frontend: Send {
    /// Show one turn to the user.
    async fn render(&mut self, turn: &Message);

    /// The next line of user text, or `None` when there is nothing to send.
    async fn get_user_text(&mut self) -> Option<String>;

    /// A conversation snapshot the user uploaded for import, if any.
    async fn get_uploaded_snapshot(&mut self) -> Option<String>;

    /// Surface a user-visible failure or notice.
    async fn report_error(&mut self, message: &str) {
        tracing::warn!(%message, "Frontend error (not displayed)");
    }
}
