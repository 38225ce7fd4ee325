use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::abort::AbortSignal;
use crate::error::{ConnectError, ConnectErrorCode};

pub type Api = String;
pub type Provider = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InputModality {
    #[serde(rename = "text")]
    Text,
    #[serde(rename = "image")]
    Image,
}

/// Price per million tokens.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Cost {
    pub input: f64,
    pub output: f64,
    #[serde(rename = "cacheRead")]
    pub cache_read: f64,
    #[serde(rename = "cacheWrite")]
    pub cache_write: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub api: Api,
    pub provider: Provider,
    #[serde(rename = "baseUrl", default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default)]
    pub reasoning: bool,
    #[serde(default = "default_input_modalities")]
    pub input: Vec<InputModality>,
    pub cost: Cost,
    #[serde(rename = "contextWindow")]
    pub context_window: u32,
    #[serde(rename = "maxTokens")]
    pub max_tokens: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<HashMap<String, String>>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub compat: Map<String, Value>,
}

fn default_input_modalities() -> Vec<InputModality> {
    vec![InputModality::Text]
}

impl Model {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    pub fn accepts(&self, modality: InputModality) -> bool {
        self.input.contains(&modality)
    }

    pub fn compat_flag(&self, key: &str) -> Option<bool> {
        self.compat.get(key).and_then(Value::as_bool)
    }
}

/// Canonical terminal reason carried by `done`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    #[serde(rename = "stop")]
    Stop,
    #[serde(rename = "toolUse")]
    ToolUse,
    #[serde(rename = "length")]
    Length,
    #[serde(rename = "error")]
    Error,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input: u64,
    pub output: u64,
    #[serde(rename = "cacheRead", default, skip_serializing_if = "Option::is_none")]
    pub cache_read: Option<u64>,
    #[serde(rename = "cacheWrite", default, skip_serializing_if = "Option::is_none")]
    pub cache_write: Option<u64>,
}

impl Usage {
    pub fn total_tokens(&self) -> u64 {
        self.input + self.output + self.cache_read.unwrap_or(0) + self.cache_write.unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum UserContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image")]
    Image {
        data: String,
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UserContent {
    Text(String),
    Blocks(Vec<UserContentBlock>),
}

impl UserContent {
    /// Text parts joined with newlines; images are skipped.
    pub fn text(&self) -> String {
        match self {
            UserContent::Text(text) => text.clone(),
            UserContent::Blocks(blocks) => blocks
                .iter()
                .filter_map(|block| match block {
                    UserContentBlock::Text { text } => Some(text.as_str()),
                    UserContentBlock::Image { .. } => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AssistantContentBlock {
    #[serde(rename = "text")]
    Text {
        text: String,
        #[serde(rename = "textSignature", skip_serializing_if = "Option::is_none", default)]
        text_signature: Option<String>,
    },
    #[serde(rename = "thinking")]
    Thinking {
        thinking: String,
        #[serde(
            rename = "thinkingSignature",
            skip_serializing_if = "Option::is_none",
            default
        )]
        thinking_signature: Option<String>,
    },
    #[serde(rename = "toolCall")]
    ToolCall {
        id: String,
        name: String,
        arguments: Value,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ToolResultContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image")]
    Image {
        data: String,
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role")]
pub enum Message {
    #[serde(rename = "user")]
    User {
        content: UserContent,
        #[serde(default)]
        timestamp: i64,
    },
    #[serde(rename = "assistant")]
    Assistant {
        content: Vec<AssistantContentBlock>,
        #[serde(default)]
        api: Api,
        #[serde(default)]
        provider: Provider,
        #[serde(default)]
        model: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        usage: Option<Usage>,
        #[serde(rename = "stopReason")]
        stop_reason: StopReason,
        #[serde(rename = "errorMessage", skip_serializing_if = "Option::is_none", default)]
        error_message: Option<String>,
        #[serde(default)]
        timestamp: i64,
    },
    #[serde(rename = "toolResult")]
    ToolResult {
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
        #[serde(rename = "toolName")]
        tool_name: String,
        content: Vec<ToolResultContentBlock>,
        #[serde(rename = "isError")]
        is_error: bool,
        #[serde(default)]
        timestamp: i64,
    },
}

const MESSAGE_ROLES: &[&str] = &["user", "assistant", "toolResult"];

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Message::User {
            content: UserContent::Text(text.into()),
            timestamp: now_millis(),
        }
    }

    pub fn role(&self) -> &'static str {
        match self {
            Message::User { .. } => "user",
            Message::Assistant { .. } => "assistant",
            Message::ToolResult { .. } => "toolResult",
        }
    }

    /// Decodes an untyped message, failing with `MalformedMessage` when the
    /// role discriminator is missing, unknown, or the body does not match it.
    pub fn from_value(value: Value) -> Result<Self, ConnectError> {
        let role = match value.get("role") {
            Some(Value::String(role)) => role.clone(),
            Some(other) => {
                return Err(malformed("message `role` must be a string")
                    .with_details(json!({ "role": other })));
            }
            None => {
                return Err(malformed("message is missing the `role` discriminator")
                    .with_details(json!({ "message": value })));
            }
        };
        if !MESSAGE_ROLES.contains(&role.as_str()) {
            return Err(malformed(format!("unknown message role `{role}`"))
                .with_details(json!({ "expected": MESSAGE_ROLES })));
        }

        serde_json::from_value(value).map_err(|error| {
            malformed(format!("invalid `{role}` message: {error}"))
        })
    }
}

fn malformed(message: impl Into<String>) -> ConnectError {
    ConnectError::new(ConnectErrorCode::MalformedMessage, message)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tool {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Context {
    #[serde(rename = "systemPrompt", skip_serializing_if = "Option::is_none", default)]
    pub system_prompt: Option<String>,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub tools: Option<Vec<Tool>>,
}

impl Context {
    /// Builds a context from loosely typed JSON, checking each message with
    /// [`Message::from_value`].
    pub fn from_value(value: Value) -> Result<Self, ConnectError> {
        let Value::Object(mut object) = value else {
            return Err(malformed("context must be a JSON object"));
        };

        let messages = match object.remove("messages") {
            Some(Value::Array(messages)) => messages
                .into_iter()
                .map(Message::from_value)
                .collect::<Result<Vec<_>, _>>()?,
            Some(_) => return Err(malformed("context `messages` must be an array")),
            None => Vec::new(),
        };
        let system_prompt = match object.remove("systemPrompt") {
            Some(Value::String(prompt)) => Some(prompt),
            Some(Value::Null) | None => None,
            Some(_) => return Err(malformed("context `systemPrompt` must be a string")),
        };
        let tools = match object.remove("tools") {
            Some(Value::Null) | None => None,
            Some(tools) => Some(
                serde_json::from_value::<Vec<Tool>>(tools)
                    .map_err(|error| malformed(format!("invalid context tools: {error}")))?,
            ),
        };

        Ok(Self {
            system_prompt,
            messages,
            tools,
        })
    }

    pub fn last_user_text(&self) -> Option<String> {
        self.messages.iter().rev().find_map(|message| match message {
            Message::User { content, .. } => Some(content.text()),
            _ => None,
        })
    }
}

/// Per-call options. Not serializable because of the abort signal.
#[derive(Debug, Clone, Default)]
pub struct StreamOptions {
    pub api_key: Option<String>,
    pub signal: Option<AbortSignal>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f64>,
    pub headers: Option<HashMap<String, String>>,
    pub reasoning: bool,
}

impl StreamOptions {
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_signal(mut self, signal: AbortSignal) -> Self {
        self.signal = Some(signal);
        self
    }
}

pub(crate) fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|duration| duration.as_millis() as i64)
        .unwrap_or(0)
}
