//! Events emitted by the model-serving layer underneath a connector.
//!
//! These carry a `partial` snapshot of the assistant message after every
//! increment and report block boundaries with explicit `*_start` markers.
//! Connectors that wrap such a layer translate them with
//! [`crate::EventAdapter`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{
    now_millis, Api, AssistantContentBlock, Message, Model, Provider, StopReason, Usage,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProviderStopReason {
    #[serde(rename = "stop")]
    Stop,
    #[serde(rename = "length")]
    Length,
    #[serde(rename = "toolUse")]
    ToolUse,
    #[serde(rename = "error")]
    Error,
    #[serde(rename = "aborted")]
    Aborted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DoneReason {
    #[serde(rename = "stop")]
    Stop,
    #[serde(rename = "length")]
    Length,
    #[serde(rename = "toolUse")]
    ToolUse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorReason {
    #[serde(rename = "error")]
    Error,
    #[serde(rename = "aborted")]
    Aborted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssistantMessage {
    pub content: Vec<AssistantContentBlock>,
    pub api: Api,
    pub provider: Provider,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    #[serde(rename = "stopReason")]
    pub stop_reason: ProviderStopReason,
    #[serde(rename = "errorMessage", skip_serializing_if = "Option::is_none", default)]
    pub error_message: Option<String>,
    pub timestamp: i64,
}

impl AssistantMessage {
    pub fn empty(model: &Model) -> Self {
        Self {
            content: Vec::new(),
            api: model.api.clone(),
            provider: model.provider.clone(),
            model: model.id.clone(),
            usage: None,
            stop_reason: ProviderStopReason::Stop,
            error_message: None,
            timestamp: now_millis(),
        }
    }

    /// Id of the tool call at `content_index`, if the backend has assigned one.
    pub fn tool_call_id(&self, content_index: usize) -> Option<&str> {
        match self.content.get(content_index) {
            Some(AssistantContentBlock::ToolCall { id, .. }) if !id.is_empty() => Some(id),
            _ => None,
        }
    }

    /// Converts the final snapshot into a conversation history entry.
    pub fn into_message(self) -> Message {
        let stop_reason = match self.stop_reason {
            ProviderStopReason::Stop => StopReason::Stop,
            ProviderStopReason::Length => StopReason::Length,
            ProviderStopReason::ToolUse => StopReason::ToolUse,
            ProviderStopReason::Error | ProviderStopReason::Aborted => StopReason::Error,
        };
        Message::Assistant {
            content: self.content,
            api: self.api,
            provider: self.provider,
            model: self.model,
            usage: self.usage,
            stop_reason,
            error_message: self.error_message,
            timestamp: self.timestamp,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ProviderEvent {
    #[serde(rename = "start")]
    Start { partial: AssistantMessage },
    #[serde(rename = "text_start")]
    TextStart {
        #[serde(rename = "contentIndex")]
        content_index: usize,
        partial: AssistantMessage,
    },
    #[serde(rename = "text_delta")]
    TextDelta {
        #[serde(rename = "contentIndex")]
        content_index: usize,
        delta: String,
        partial: AssistantMessage,
    },
    #[serde(rename = "text_end")]
    TextEnd {
        #[serde(rename = "contentIndex")]
        content_index: usize,
        content: String,
        partial: AssistantMessage,
    },
    #[serde(rename = "thinking_start")]
    ThinkingStart {
        #[serde(rename = "contentIndex")]
        content_index: usize,
        partial: AssistantMessage,
    },
    #[serde(rename = "thinking_delta")]
    ThinkingDelta {
        #[serde(rename = "contentIndex")]
        content_index: usize,
        delta: String,
        partial: AssistantMessage,
    },
    #[serde(rename = "thinking_end")]
    ThinkingEnd {
        #[serde(rename = "contentIndex")]
        content_index: usize,
        content: String,
        partial: AssistantMessage,
    },
    #[serde(rename = "toolcall_start")]
    ToolcallStart {
        #[serde(rename = "contentIndex")]
        content_index: usize,
        partial: AssistantMessage,
    },
    #[serde(rename = "toolcall_delta")]
    ToolcallDelta {
        #[serde(rename = "contentIndex")]
        content_index: usize,
        delta: String,
        partial: AssistantMessage,
    },
    /// `tool_call` is the raw block; `arguments` may still be a JSON string.
    #[serde(rename = "toolcall_end")]
    ToolcallEnd {
        #[serde(rename = "contentIndex")]
        content_index: usize,
        #[serde(rename = "toolCall")]
        tool_call: Value,
        partial: AssistantMessage,
    },
    #[serde(rename = "done")]
    Done {
        reason: DoneReason,
        message: AssistantMessage,
    },
    #[serde(rename = "error")]
    Error {
        reason: ErrorReason,
        error: AssistantMessage,
    },
}

impl ProviderEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            ProviderEvent::Start { .. } => "start",
            ProviderEvent::TextStart { .. } => "text_start",
            ProviderEvent::TextDelta { .. } => "text_delta",
            ProviderEvent::TextEnd { .. } => "text_end",
            ProviderEvent::ThinkingStart { .. } => "thinking_start",
            ProviderEvent::ThinkingDelta { .. } => "thinking_delta",
            ProviderEvent::ThinkingEnd { .. } => "thinking_end",
            ProviderEvent::ToolcallStart { .. } => "toolcall_start",
            ProviderEvent::ToolcallDelta { .. } => "toolcall_delta",
            ProviderEvent::ToolcallEnd { .. } => "toolcall_end",
            ProviderEvent::Done { .. } => "done",
            ProviderEvent::Error { .. } => "error",
        }
    }
}

pub(crate) fn done_reason_for(stop_reason: ProviderStopReason) -> Option<DoneReason> {
    match stop_reason {
        ProviderStopReason::Stop => Some(DoneReason::Stop),
        ProviderStopReason::Length => Some(DoneReason::Length),
        ProviderStopReason::ToolUse => Some(DoneReason::ToolUse),
        ProviderStopReason::Error | ProviderStopReason::Aborted => None,
    }
}
