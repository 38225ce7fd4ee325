//! The canonical, provider-agnostic streaming protocol.
//!
//! Every streaming call yields, in order:
//!
//! 1. exactly one [`StreamEvent::Start`];
//! 2. any number of text, thinking and tool-call increments. A tool call is
//!    `toolcall_start` → `toolcall_delta`* → `toolcall_end`; calls may
//!    interleave and are told apart by `id` when the backend reveals it
//!    early. `text_end` / `thinking_end` are optional summaries, the deltas
//!    are authoritative;
//! 3. exactly one terminal event, [`StreamEvent::Done`] or
//!    [`StreamEvent::Error`], after which nothing is emitted.
//!
//! `done` with [`StopReason::Error`] and no `error` event means the backend
//! refused or returned nothing usable. `error` means the pipeline failed
//! after the stream had started.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ConnectError;
use crate::types::{StopReason, Usage};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Map<String, Value>,
}

impl ToolCall {
    pub fn arguments_value(&self) -> Value {
        Value::Object(self.arguments.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StreamEvent {
    #[serde(rename = "start")]
    Start,
    #[serde(rename = "text_delta")]
    TextDelta { delta: String },
    #[serde(rename = "text_end")]
    TextEnd { content: String },
    #[serde(rename = "thinking_delta")]
    ThinkingDelta { delta: String },
    #[serde(rename = "thinking_end")]
    ThinkingEnd { content: String },
    #[serde(rename = "toolcall_start")]
    ToolcallStart {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },
    #[serde(rename = "toolcall_delta")]
    ToolcallDelta {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        delta: String,
    },
    #[serde(rename = "toolcall_end")]
    ToolcallEnd {
        #[serde(rename = "toolCall")]
        tool_call: ToolCall,
    },
    #[serde(rename = "done")]
    Done {
        #[serde(rename = "stopReason")]
        stop_reason: StopReason,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        usage: Option<Usage>,
    },
    #[serde(rename = "error")]
    Error { message: String },
}

const FALLBACK_ERROR_MESSAGE: &str = "provider reported an error without a message";

impl StreamEvent {
    /// Builds an `error` event; blank messages are replaced so the event
    /// always carries text.
    pub fn error(message: impl Into<String>) -> Self {
        let message = message.into();
        if message.trim().is_empty() {
            StreamEvent::Error {
                message: FALLBACK_ERROR_MESSAGE.to_string(),
            }
        } else {
            StreamEvent::Error { message }
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            StreamEvent::Start => "start",
            StreamEvent::TextDelta { .. } => "text_delta",
            StreamEvent::TextEnd { .. } => "text_end",
            StreamEvent::ThinkingDelta { .. } => "thinking_delta",
            StreamEvent::ThinkingEnd { .. } => "thinking_end",
            StreamEvent::ToolcallStart { .. } => "toolcall_start",
            StreamEvent::ToolcallDelta { .. } => "toolcall_delta",
            StreamEvent::ToolcallEnd { .. } => "toolcall_end",
            StreamEvent::Done { .. } => "done",
            StreamEvent::Error { .. } => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Done { .. } | StreamEvent::Error { .. })
    }
}

/// Item type of every connector stream. `Err` is only ever a cancellation
/// and is always the last item; provider failures arrive as
/// [`StreamEvent::Error`].
pub type StreamItem = Result<StreamEvent, ConnectError>;
