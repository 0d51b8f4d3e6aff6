//! Typed protocol events.
//!
//! Each wire record has at least `{type, timestamp}`. Producers disagree on
//! some field names (a tool invocation's identifier may arrive as `tool_id`
//! or `id`, its name as `tool_name` or `name`, a tool result's payload as
//! `output` or `content`). Normalization happens exactly once here, at
//! parse time, so downstream consumers only ever see the canonical shape.

use chrono::{DateTime, Utc};
use serde_json::Value;

/// Token usage and cost attached to a terminal result record.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TokenCost {
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
    pub total_cost_usd: Option<f64>,
}

/// A single event parsed from the worker's output stream.
///
/// The union is closed: records with an unrecognized `type` become
/// `Unknown` carrying the full record, never an error and never dropped.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Session startup announcement.
    Init {
        timestamp: DateTime<Utc>,
        session_id: String,
        model: Option<String>,
    },
    /// A conversational message from the worker.
    Message {
        timestamp: DateTime<Utc>,
        role: Option<String>,
        content: Value,
    },
    /// The worker invoked a tool.
    ToolUse {
        timestamp: DateTime<Utc>,
        tool_name: String,
        tool_id: String,
        input: Value,
    },
    /// The outcome of a tool invocation.
    ToolResult {
        timestamp: DateTime<Utc>,
        tool_id: String,
        output: Value,
        is_error: bool,
    },
    /// Terminal result record.
    Result {
        timestamp: DateTime<Utc>,
        result: Option<String>,
        cost: Option<TokenCost>,
        duration_ms: Option<u64>,
        num_turns: Option<u32>,
    },
    /// Runtime/system notification.
    System {
        timestamp: DateTime<Utc>,
        subtype: Option<String>,
        message: Option<String>,
    },
    ContentBlockStart {
        timestamp: DateTime<Utc>,
        index: Option<u64>,
    },
    /// Streaming text fragment.
    ContentBlockDelta {
        timestamp: DateTime<Utc>,
        text: Option<String>,
    },
    ContentBlockStop {
        timestamp: DateTime<Utc>,
        index: Option<u64>,
    },
    /// Any record whose `type` is not recognized. Passed through opaquely.
    Unknown {
        timestamp: DateTime<Utc>,
        record: Value,
    },
}

impl StreamEvent {
    /// Build an event from a decoded JSON record.
    ///
    /// Returns `None` for values that are not protocol records at all
    /// (non-objects). An object with a missing or unrecognized `type`
    /// becomes `Unknown` with a synthesized timestamp if absent.
    pub fn from_record(record: Value) -> Option<Self> {
        let obj = record.as_object()?;
        let timestamp = parse_timestamp(obj.get("timestamp"));

        let kind = match obj.get("type").and_then(Value::as_str) {
            Some(kind) => kind.to_string(),
            None => return Some(StreamEvent::Unknown { timestamp, record }),
        };

        let event = match kind.as_str() {
            "init" => StreamEvent::Init {
                timestamp,
                session_id: str_field(obj, &["session_id"]).unwrap_or_default(),
                model: str_field(obj, &["model"]),
            },
            "message" => StreamEvent::Message {
                timestamp,
                role: str_field(obj, &["role"]),
                content: obj.get("content").cloned().unwrap_or(Value::Null),
            },
            "tool_use" => StreamEvent::ToolUse {
                timestamp,
                tool_name: str_field(obj, &["tool_name", "name"]).unwrap_or_default(),
                tool_id: str_field(obj, &["tool_id", "id"]).unwrap_or_default(),
                input: obj.get("input").cloned().unwrap_or(Value::Null),
            },
            "tool_result" => StreamEvent::ToolResult {
                timestamp,
                tool_id: str_field(obj, &["tool_id", "tool_use_id"]).unwrap_or_default(),
                output: obj
                    .get("output")
                    .or_else(|| obj.get("content"))
                    .cloned()
                    .unwrap_or(Value::Null),
                is_error: obj
                    .get("is_error")
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
            },
            "result" => StreamEvent::Result {
                timestamp,
                result: str_field(obj, &["result"]),
                cost: obj.get("cost").map(parse_cost),
                duration_ms: obj.get("duration_ms").and_then(Value::as_u64),
                num_turns: obj
                    .get("num_turns")
                    .and_then(Value::as_u64)
                    .map(|n| n as u32),
            },
            "system" => StreamEvent::System {
                timestamp,
                subtype: str_field(obj, &["subtype"]),
                message: str_field(obj, &["message"]),
            },
            "content_block_start" => StreamEvent::ContentBlockStart {
                timestamp,
                index: obj.get("index").and_then(Value::as_u64),
            },
            "content_block_delta" => StreamEvent::ContentBlockDelta {
                timestamp,
                text: delta_text(obj),
            },
            "content_block_stop" => StreamEvent::ContentBlockStop {
                timestamp,
                index: obj.get("index").and_then(Value::as_u64),
            },
            _ => StreamEvent::Unknown { timestamp, record },
        };
        Some(event)
    }

    /// The event's timestamp (synthesized at parse time when the record
    /// carried none).
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            StreamEvent::Init { timestamp, .. }
            | StreamEvent::Message { timestamp, .. }
            | StreamEvent::ToolUse { timestamp, .. }
            | StreamEvent::ToolResult { timestamp, .. }
            | StreamEvent::Result { timestamp, .. }
            | StreamEvent::System { timestamp, .. }
            | StreamEvent::ContentBlockStart { timestamp, .. }
            | StreamEvent::ContentBlockDelta { timestamp, .. }
            | StreamEvent::ContentBlockStop { timestamp, .. }
            | StreamEvent::Unknown { timestamp, .. } => *timestamp,
        }
    }

    /// Wire discriminator for display and logging.
    pub fn type_name(&self) -> &'static str {
        match self {
            StreamEvent::Init { .. } => "init",
            StreamEvent::Message { .. } => "message",
            StreamEvent::ToolUse { .. } => "tool_use",
            StreamEvent::ToolResult { .. } => "tool_result",
            StreamEvent::Result { .. } => "result",
            StreamEvent::System { .. } => "system",
            StreamEvent::ContentBlockStart { .. } => "content_block_start",
            StreamEvent::ContentBlockDelta { .. } => "content_block_delta",
            StreamEvent::ContentBlockStop { .. } => "content_block_stop",
            StreamEvent::Unknown { .. } => "unknown",
        }
    }

    /// Whether this is a terminal result record.
    pub fn is_result(&self) -> bool {
        matches!(self, StreamEvent::Result { .. })
    }

    /// Extract a human-readable text fragment, if this event carries one.
    ///
    /// Messages yield their content (string or concatenated text blocks),
    /// streaming deltas their fragment, results their result text. Other
    /// event kinds carry no prose and yield `None`.
    pub fn text(&self) -> Option<String> {
        match self {
            StreamEvent::Message { content, .. } => content_text(content),
            StreamEvent::ContentBlockDelta { text, .. } => text.clone(),
            StreamEvent::Result { result, .. } => result.clone(),
            _ => None,
        }
    }
}

fn parse_timestamp(value: Option<&Value>) -> DateTime<Utc> {
    value
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now)
}

fn str_field(obj: &serde_json::Map<String, Value>, names: &[&str]) -> Option<String> {
    names
        .iter()
        .find_map(|name| obj.get(*name))
        .and_then(Value::as_str)
        .map(String::from)
}

fn parse_cost(value: &Value) -> TokenCost {
    TokenCost {
        input_tokens: value.get("input_tokens").and_then(Value::as_u64),
        output_tokens: value.get("output_tokens").and_then(Value::as_u64),
        total_cost_usd: value.get("total_cost_usd").and_then(Value::as_f64),
    }
}

fn delta_text(obj: &serde_json::Map<String, Value>) -> Option<String> {
    // Streaming deltas nest the fragment under delta.text; some producers
    // flatten it to a top-level text field.
    obj.get("delta")
        .and_then(|d| d.get("text"))
        .or_else(|| obj.get("text"))
        .and_then(Value::as_str)
        .map(String::from)
}

fn content_text(content: &Value) -> Option<String> {
    match content {
        Value::String(s) => Some(s.clone()),
        Value::Array(blocks) => {
            let parts: Vec<&str> = blocks
                .iter()
                .filter_map(|b| b.get("text").and_then(Value::as_str))
                .collect();
            if parts.is_empty() {
                None
            } else {
                Some(parts.join(""))
            }
        }
        _ => None,
    }
}
