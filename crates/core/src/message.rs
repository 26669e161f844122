//! Turn and Message Log domain types.
//!
//! These are the core value objects that flow through the entire system:
//! the user types a turn → the log records it → the agent loop sends the log to
//! the model → tool results and the final answer are appended behind it.

use std::collections::HashSet;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::ValidationError;

/// Unique identifier for a conversation (session).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The role of a turn in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instructions
    System,
    /// The end user
    #[serde(alias = "user")]
    Human,
    /// The model
    #[serde(alias = "ai")]
    Assistant,
    /// Tool execution result
    Tool,
}

impl Role {
    /// Parse a role name, accepting the `user`/`ai` spellings used by older exports.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "system" => Some(Role::System),
            "human" | "user" => Some(Role::Human),
            "assistant" | "ai" => Some(Role::Assistant),
            "tool" => Some(Role::Tool),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::Human => "human",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tool invocation requested by an assistant turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolRequest {
    /// Unique ID for this request (matches the model's tool_call.id)
    #[serde(alias = "id")]
    pub call_id: String,

    /// Name of the tool to invoke
    pub name: String,

    /// Arguments as a JSON object
    #[serde(default = "empty_arguments")]
    pub arguments: Value,
}

fn empty_arguments() -> Value {
    Value::Object(serde_json::Map::new())
}

impl ToolRequest {
    pub fn new(call_id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            call_id: call_id.into(),
            name: name.into(),
            arguments,
        }
    }
}

fn new_message_id() -> String {
    Uuid::new_v4().to_string()
}

/// A single turn in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    #[serde(default = "new_message_id")]
    pub id: String,

    /// Who produced this turn
    pub role: Role,

    /// The text content
    #[serde(default)]
    pub content: String,

    /// Tool invocations requested by the assistant (if any)
    #[serde(default, skip_serializing_if = "Vec::is_empty", alias = "tool_calls")]
    pub tool_requests: Vec<ToolRequest>,

    /// If this is a tool result, which request it answers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    /// Creation time; the log stamps turns that arrive without one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl Message {
    fn with_role(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: new_message_id(),
            role,
            content: content.into(),
            tool_requests: Vec::new(),
            tool_call_id: None,
            timestamp: None,
        }
    }

    /// Create a new human turn.
    pub fn human(content: impl Into<String>) -> Self {
        Self::with_role(Role::Human, content)
    }

    /// Create a new assistant turn.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, content)
    }

    /// Create an assistant turn that asks for tool execution.
    pub fn assistant_with_requests(content: impl Into<String>, requests: Vec<ToolRequest>) -> Self {
        let mut msg = Self::with_role(Role::Assistant, content);
        msg.tool_requests = requests;
        msg
    }

    /// Create a new system turn.
    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(Role::System, content)
    }

    /// Create a tool result turn.
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        let mut msg = Self::with_role(Role::Tool, content);
        msg.tool_call_id = Some(tool_call_id.into());
        msg
    }

    /// Whether this assistant turn asks for tools.
    pub fn has_tool_requests(&self) -> bool {
        !self.tool_requests.is_empty()
    }

    /// Human or assistant turns with visible text.
    pub fn is_displayable(&self) -> bool {
        matches!(self.role, Role::Human | Role::Assistant) && !self.content.trim().is_empty()
    }

    /// Build a turn from an untyped JSON record, as found in imported snapshots.
    ///
    /// `role` and `content` are required; `content` may only be absent (or null)
    /// on assistant turns that carry tool requests.
    pub fn from_record(record: &Value) -> Result<Self, ValidationError> {
        let obj = record.as_object().ok_or(ValidationError::NotAnObject)?;

        // Message-history records key the role as `type`.
        let role = match obj.get("role").or_else(|| obj.get("type")) {
            None | Some(Value::Null) => return Err(ValidationError::MissingField("role")),
            Some(Value::String(name)) => {
                Role::parse(name).ok_or_else(|| ValidationError::UnknownRole(name.clone()))?
            }
            Some(_) => {
                return Err(ValidationError::InvalidField {
                    field: "role",
                    expected: "a string",
                });
            }
        };

        let tool_requests = match obj.get("tool_requests").or_else(|| obj.get("tool_calls")) {
            None | Some(Value::Null) => Vec::new(),
            Some(raw) => serde_json::from_value::<Vec<ToolRequest>>(raw.clone()).map_err(|_| {
                ValidationError::InvalidField {
                    field: "tool_requests",
                    expected: "an array of {call_id, name, arguments}",
                }
            })?,
        };

        let content = match obj.get("content") {
            Some(Value::String(text)) => text.clone(),
            None | Some(Value::Null) if role == Role::Assistant && !tool_requests.is_empty() => {
                String::new()
            }
            None | Some(Value::Null) => return Err(ValidationError::MissingField("content")),
            Some(_) => {
                return Err(ValidationError::InvalidField {
                    field: "content",
                    expected: "a string",
                });
            }
        };

        let tool_call_id = optional_string(obj, "tool_call_id")?;

        let timestamp = match optional_string(obj, "timestamp")? {
            None => legacy_timestamp(obj)?,
            Some(raw) => Some(
                DateTime::parse_from_rfc3339(&raw)
                    .map_err(|_| ValidationError::InvalidField {
                        field: "timestamp",
                        expected: "an RFC 3339 date-time",
                    })?
                    .with_timezone(&Utc),
            ),
        };

        Ok(Self {
            id: optional_string(obj, "id")?.unwrap_or_else(new_message_id),
            role,
            content,
            tool_requests,
            tool_call_id,
            timestamp,
        })
    }

    /// Check the per-turn invariants that do not depend on the rest of the log.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.role != Role::Assistant && !self.tool_requests.is_empty() {
            return Err(ValidationError::UnexpectedToolRequests {
                role: self.role.to_string(),
            });
        }

        match self.role {
            Role::Tool => match self.tool_call_id.as_deref() {
                Some(id) if !id.is_empty() => {}
                _ => return Err(ValidationError::MissingToolCallId),
            },
            role if self.tool_call_id.is_some() => {
                return Err(ValidationError::UnexpectedToolCallId {
                    role: role.to_string(),
                });
            }
            _ => {}
        }

        if self.role == Role::Assistant
            && self.content.is_empty()
            && self.tool_requests.is_empty()
        {
            return Err(ValidationError::EmptyAssistantTurn);
        }

        Ok(())
    }
}

/// Older exports stamp turns with a local `dt` string instead of `timestamp`.
fn legacy_timestamp(
    obj: &serde_json::Map<String, Value>,
) -> Result<Option<DateTime<Utc>>, ValidationError> {
    let Some(raw) = optional_string(obj, "dt")? else {
        return Ok(None);
    };
    let parsed = NaiveDateTime::parse_from_str(&raw, "%Y-%m-%d %H:%M:%S").map_err(|_| {
        ValidationError::InvalidField {
            field: "dt",
            expected: "a 'YYYY-MM-DD HH:MM:SS' date-time",
        }
    })?;
    Ok(Some(parsed.and_utc()))
}

fn optional_string(
    obj: &serde_json::Map<String, Value>,
    field: &'static str,
) -> Result<Option<String>, ValidationError> {
    match obj.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(ValidationError::InvalidField {
            field,
            expected: "a string",
        }),
    }
}

/// An ordered, append-only record of conversation turns.
///
/// The only mutations are [`append`](Self::append) and the wholesale
/// replacement done by [`import`](Self::import).
#[derive(Debug, Clone, Default)]
pub struct MessageLog {
    messages: Vec<Message>,
    issued_call_ids: HashSet<String>,
}

impl MessageLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a turn after validating it.
    ///
    /// Tool turns must answer a call id issued by an earlier assistant turn.
    /// A missing timestamp is set to now.
    pub fn append(&mut self, mut message: Message) -> Result<(), ValidationError> {
        message.validate()?;

        if message.role == Role::Tool {
            let call_id = message.tool_call_id.as_deref().unwrap_or_default();
            if !self.issued_call_ids.contains(call_id) {
                return Err(ValidationError::OrphanToolResult(call_id.to_string()));
            }
        }

        if message.timestamp.is_none() {
            message.timestamp = Some(Utc::now());
        }

        self.issued_call_ids
            .extend(message.tool_requests.iter().map(|r| r.call_id.clone()));
        self.messages.push(message);
        Ok(())
    }

    /// Append an untyped JSON record (see [`Message::from_record`]).
    pub fn append_record(&mut self, record: &Value) -> Result<(), ValidationError> {
        self.append(Message::from_record(record)?)
    }

    /// A snapshot of every turn, in order, with all fields.
    pub fn export(&self) -> Vec<Message> {
        self.messages.clone()
    }

    /// Serialize the log as a UTF-8 JSON array.
    pub fn export_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.messages)
    }

    /// Replace the whole log with `snapshot`.
    ///
    /// The snapshot is validated in full first; on error the log is untouched.
    pub fn import(&mut self, snapshot: Vec<Message>) -> Result<(), ValidationError> {
        let mut replacement = MessageLog::new();
        for (index, message) in snapshot.into_iter().enumerate() {
            replacement
                .append(message)
                .map_err(|e| ValidationError::MalformedRecord {
                    index,
                    reason: e.to_string(),
                })?;
        }
        *self = replacement;
        Ok(())
    }

    /// Parse and import a JSON array produced by [`export_json`](Self::export_json).
    pub fn import_json(&mut self, json: &str) -> Result<(), ValidationError> {
        let value: Value =
            serde_json::from_str(json).map_err(|e| ValidationError::InvalidJson(e.to_string()))?;
        let records = value.as_array().ok_or(ValidationError::NotAList)?;

        let snapshot = records
            .iter()
            .enumerate()
            .map(|(index, record)| {
                Message::from_record(record).map_err(|e| ValidationError::MalformedRecord {
                    index,
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        self.import(snapshot)
    }

    /// Turns matching `predicate`, in log order.
    ///
    /// The iterator is lazy and `Clone`, so a renderer can walk it more than once.
    pub fn filter_for_display<'a, P>(
        &'a self,
        predicate: P,
    ) -> impl Iterator<Item = &'a Message> + Clone + 'a
    where
        P: Fn(&Message) -> bool + Clone + 'a,
    {
        self.messages.iter().filter(move |m| predicate(*m))
    }

    /// The default display view: human and assistant turns with non-empty content.
    pub fn displayable(&self) -> impl Iterator<Item = &Message> + Clone + '_ {
        self.filter_for_display(Message::is_displayable)
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
