//! Error types for the toolchat domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all toolchat operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Model invocation errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Message log errors ---
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    /// The user asked to stop generating.
    #[error("Operation cancelled")]
    Cancelled,

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Whether this error came from a cooperative cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }

    /// Whether the session can simply be retried after this error.
    ///
    /// Every failure leaves the log intact, so only credential and provider
    /// setup problems need fixing before the user resends.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Error::Provider(
                ProviderError::AuthenticationFailed(_) | ProviderError::NotConfigured(_)
            )
        )
    }
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError {
        status_code: u16,
        message: String,
    },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response from provider: {0}")]
    InvalidResponse(String),
}

/// A malformed turn or a malformed import snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Turn record must be a JSON object")]
    NotAnObject,

    #[error("Turn record is missing required field '{0}'")]
    MissingField(&'static str),

    #[error("Field '{field}' must be {expected}")]
    InvalidField {
        field: &'static str,
        expected: &'static str,
    },

    #[error("Unknown role: {0}")]
    UnknownRole(String),

    #[error("Assistant turn has neither content nor tool requests")]
    EmptyAssistantTurn,

    #[error("Tool turn is missing tool_call_id")]
    MissingToolCallId,

    #[error("Tool result references unknown call id '{0}'")]
    OrphanToolResult(String),

    #[error("Only tool turns may carry a tool_call_id ({role} turn had one)")]
    UnexpectedToolCallId { role: String },

    #[error("Only assistant turns may carry tool requests ({role} turn had some)")]
    UnexpectedToolRequests { role: String },

    #[error("Snapshot must be a JSON array of turn records")]
    NotAList,

    #[error("Snapshot record {index} is malformed: {reason}")]
    MalformedRecord { index: usize, reason: String },

    #[error("Snapshot is not valid JSON: {0}")]
    InvalidJson(String),
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool already registered: {0}")]
    Duplicate(String),

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Tool timed out: {tool_name} after {timeout_secs}s")]
    Timeout { tool_name: String, timeout_secs: u64 },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),

    #[error("Tool call cancelled: {0}")]
    Cancelled(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_displays_correctly() {
        let err = Error::Provider(ProviderError::ApiError {
            status_code: 429,
            message: "Too many requests".into(),
        });
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Too many requests"));
    }

    #[test]
    fn validation_error_displays_field() {
        let err = Error::from(ValidationError::MissingField("content"));
        assert!(err.to_string().contains("content"));
    }

    #[test]
    fn cancellation_is_retryable() {
        assert!(Error::Cancelled.is_cancelled());
        assert!(Error::Cancelled.is_retryable());
        let auth = Error::from(ProviderError::AuthenticationFailed("bad key".into()));
        assert!(!auth.is_retryable());
        assert!(!auth.is_cancelled());
        let missing = Error::from(ProviderError::NotConfigured("groq".into()));
        assert!(!missing.is_retryable());
        assert!(Error::from(ProviderError::Timeout("slow".into())).is_retryable());
    }

    #[test]
    fn tool_error_displays_correctly() {
        let err = Error::Tool(ToolError::Timeout {
            tool_name: "get_weather".into(),
            timeout_secs: 30,
        });
        assert!(err.to_string().contains("get_weather"));
        assert!(err.to_string().contains("30s"));
    }
}
