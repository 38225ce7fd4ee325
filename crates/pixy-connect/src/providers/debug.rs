//! Deterministic scripted connector.
//!
//! Produces provider events the way a real backend would, partial
//! snapshots included, and feeds them through the event adapter. Useful for
//! exercising consumers without a network.

use std::sync::Arc;
use std::time::Duration;

use futures_core::Stream;
use serde_json::{json, Map};

use crate::adapter::{adapt_stream, ToolCallIdStrategy};
use crate::connector::{AuthRequirement, Connector, ConnectorFuture, StreamConnector};
use crate::error::ConnectError;
use crate::provider_event::{
    AssistantMessage, DoneReason, ErrorReason, ProviderEvent, ProviderStopReason,
};
use crate::types::{
    AssistantContentBlock, Context, Cost, InputModality, Message, Model, StreamOptions, Usage,
};

pub const DEBUG_CONNECTOR_ID: &str = "debug";
pub const DEBUG_PROVIDER: &str = "debug";
pub const DEBUG_API: &str = "debug-echo";
pub const DEBUG_MODEL_ID: &str = "debug-echo-1";

const DEFAULT_CHUNK_CHARS: usize = 8;

#[derive(Debug, Clone, PartialEq)]
pub struct ScriptedToolCall {
    pub id: String,
    pub name: String,
    /// Raw argument JSON, split the way the backend streams it.
    pub argument_chunks: Vec<String>,
}

impl ScriptedToolCall {
    pub fn new<I, S>(id: impl Into<String>, name: impl Into<String>, argument_chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: id.into(),
            name: name.into(),
            argument_chunks: argument_chunks.into_iter().map(Into::into).collect(),
        }
    }
}

/// What the debug model answers.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum DebugScript {
    /// Repeats the last user message. An empty conversation gets an empty
    /// response, reported as `done` with stop reason `error`.
    #[default]
    Echo,
    Text(String),
    Reasoned {
        thinking: String,
        text: String,
    },
    ToolCalls {
        calls: Vec<ScriptedToolCall>,
        /// Start every call before streaming any arguments, then round-robin.
        interleave: bool,
        /// Whether ids appear in snapshots before the call ends.
        reveal_ids: bool,
    },
    Refusal,
    /// Streams `partial_text`, then fails with `message`.
    Fail {
        partial_text: String,
        message: String,
    },
}

#[derive(Debug, Clone)]
pub struct DebugConnector {
    script: DebugScript,
    chunk_chars: usize,
    delay: Option<Duration>,
}

impl Default for DebugConnector {
    fn default() -> Self {
        Self::new(DebugScript::Echo)
    }
}

impl DebugConnector {
    pub fn new(script: DebugScript) -> Self {
        Self {
            script,
            chunk_chars: DEFAULT_CHUNK_CHARS,
            delay: None,
        }
    }

    pub fn with_chunk_chars(mut self, chunk_chars: usize) -> Self {
        self.chunk_chars = chunk_chars.max(1);
        self
    }

    /// Sleeps before every event.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn into_connector(self) -> Connector {
        Connector::new(DEBUG_CONNECTOR_ID, DEBUG_PROVIDER, DEBUG_API, Arc::new(self))
            .with_label("Debug echo")
            .with_models(vec![debug_model()])
            .with_auth(AuthRequirement::NotRequired)
    }

    fn script_events(&self, model: &Model, context: &Context) -> Vec<ProviderEvent> {
        let mut writer = ScriptWriter::new(model, self.chunk_chars);
        let input_tokens = word_count_of_user_messages(context);

        match &self.script {
            DebugScript::Echo => {
                let text = context.last_user_text().unwrap_or_default();
                if text.trim().is_empty() {
                    writer.done(ProviderStopReason::Error, input_tokens);
                } else {
                    writer.text(&text);
                    writer.done(ProviderStopReason::Stop, input_tokens);
                }
            }
            DebugScript::Text(text) => {
                writer.text(text);
                writer.done(ProviderStopReason::Stop, input_tokens);
            }
            DebugScript::Reasoned { thinking, text } => {
                writer.thinking(thinking);
                writer.text(text);
                writer.done(ProviderStopReason::Stop, input_tokens);
            }
            DebugScript::ToolCalls {
                calls,
                interleave,
                reveal_ids,
            } => {
                writer.tool_calls(calls, *interleave, *reveal_ids);
                writer.done(ProviderStopReason::ToolUse, input_tokens);
            }
            DebugScript::Refusal => writer.done(ProviderStopReason::Error, input_tokens),
            DebugScript::Fail {
                partial_text,
                message,
            } => {
                if !partial_text.is_empty() {
                    writer.text(partial_text);
                }
                writer.error(message);
            }
        }
        writer.events
    }
}

impl StreamConnector for DebugConnector {
    fn stream(&self, model: Model, context: Context, _options: StreamOptions) -> ConnectorFuture {
        let events = self.script_events(&model, &context);
        let delay = self.delay;
        Box::pin(async move {
            Ok(adapt_stream(
                paced(events, delay),
                ToolCallIdStrategy::PartialSnapshot,
            ))
        })
    }
}

/// The echo connector with default pacing.
pub fn debug_connector() -> Connector {
    DebugConnector::default().into_connector()
}

pub fn debug_model() -> Model {
    Model {
        id: DEBUG_MODEL_ID.to_string(),
        name: Some("Debug Echo".to_string()),
        api: DEBUG_API.to_string(),
        provider: DEBUG_PROVIDER.to_string(),
        base_url: None,
        reasoning: true,
        input: vec![InputModality::Text],
        cost: Cost::default(),
        context_window: 32_768,
        max_tokens: 4_096,
        headers: None,
        compat: Map::new(),
    }
}

fn paced(
    events: Vec<ProviderEvent>,
    delay: Option<Duration>,
) -> impl Stream<Item = Result<ProviderEvent, ConnectError>> + Send {
    async_stream::stream! {
        for event in events {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            yield Ok(event);
        }
    }
}

fn word_count_of_user_messages(context: &Context) -> u64 {
    context
        .messages
        .iter()
        .filter_map(|message| match message {
            Message::User { content, .. } => Some(content.text().split_whitespace().count() as u64),
            _ => None,
        })
        .sum()
}

struct ScriptWriter {
    output: AssistantMessage,
    events: Vec<ProviderEvent>,
    chunk_chars: usize,
    output_tokens: u64,
}

impl ScriptWriter {
    fn new(model: &Model, chunk_chars: usize) -> Self {
        let output = AssistantMessage::empty(model);
        Self {
            events: vec![ProviderEvent::Start {
                partial: output.clone(),
            }],
            output,
            chunk_chars,
            output_tokens: 0,
        }
    }

    fn text(&mut self, text: &str) {
        let content_index = self.output.content.len();
        self.output.content.push(AssistantContentBlock::Text {
            text: String::new(),
            text_signature: None,
        });
        self.events.push(ProviderEvent::TextStart {
            content_index,
            partial: self.output.clone(),
        });
        for chunk in chunk_chars(text, self.chunk_chars) {
            if let Some(AssistantContentBlock::Text { text, .. }) =
                self.output.content.get_mut(content_index)
            {
                text.push_str(&chunk);
            }
            self.events.push(ProviderEvent::TextDelta {
                content_index,
                delta: chunk,
                partial: self.output.clone(),
            });
        }
        self.output_tokens += text.split_whitespace().count() as u64;
        self.events.push(ProviderEvent::TextEnd {
            content_index,
            content: text.to_string(),
            partial: self.output.clone(),
        });
    }

    fn thinking(&mut self, thinking: &str) {
        let content_index = self.output.content.len();
        self.output.content.push(AssistantContentBlock::Thinking {
            thinking: String::new(),
            thinking_signature: None,
        });
        self.events.push(ProviderEvent::ThinkingStart {
            content_index,
            partial: self.output.clone(),
        });
        for chunk in chunk_chars(thinking, self.chunk_chars) {
            if let Some(AssistantContentBlock::Thinking { thinking, .. }) =
                self.output.content.get_mut(content_index)
            {
                thinking.push_str(&chunk);
            }
            self.events.push(ProviderEvent::ThinkingDelta {
                content_index,
                delta: chunk,
                partial: self.output.clone(),
            });
        }
        self.output_tokens += thinking.split_whitespace().count() as u64;
        self.events.push(ProviderEvent::ThinkingEnd {
            content_index,
            content: thinking.to_string(),
            partial: self.output.clone(),
        });
    }

    fn tool_calls(&mut self, calls: &[ScriptedToolCall], interleave: bool, reveal_ids: bool) {
        let mut indices = Vec::with_capacity(calls.len());
        if interleave {
            for call in calls {
                indices.push(self.start_tool_call(call, reveal_ids));
            }
            let longest = calls
                .iter()
                .map(|call| call.argument_chunks.len())
                .max()
                .unwrap_or(0);
            for round in 0..longest {
                for (call, content_index) in calls.iter().zip(&indices) {
                    if let Some(chunk) = call.argument_chunks.get(round) {
                        self.tool_call_delta(*content_index, chunk);
                    }
                }
            }
            for (call, content_index) in calls.iter().zip(&indices) {
                self.end_tool_call(call, *content_index);
            }
        } else {
            for call in calls {
                let content_index = self.start_tool_call(call, reveal_ids);
                for chunk in &call.argument_chunks {
                    self.tool_call_delta(content_index, chunk);
                }
                self.end_tool_call(call, content_index);
            }
        }
    }

    fn start_tool_call(&mut self, call: &ScriptedToolCall, reveal_id: bool) -> usize {
        let content_index = self.output.content.len();
        self.output.content.push(AssistantContentBlock::ToolCall {
            id: if reveal_id { call.id.clone() } else { String::new() },
            name: call.name.clone(),
            arguments: json!({}),
        });
        self.events.push(ProviderEvent::ToolcallStart {
            content_index,
            partial: self.output.clone(),
        });
        content_index
    }

    fn tool_call_delta(&mut self, content_index: usize, chunk: &str) {
        self.events.push(ProviderEvent::ToolcallDelta {
            content_index,
            delta: chunk.to_string(),
            partial: self.output.clone(),
        });
    }

    fn end_tool_call(&mut self, call: &ScriptedToolCall, content_index: usize) {
        let raw_arguments = call.argument_chunks.concat();
        let arguments = serde_json::from_str(&raw_arguments).unwrap_or_else(|_| json!({}));
        if let Some(AssistantContentBlock::ToolCall {
            id,
            arguments: snapshot_arguments,
            ..
        }) = self.output.content.get_mut(content_index)
        {
            *id = call.id.clone();
            *snapshot_arguments = arguments;
        }
        self.output_tokens += 1;
        self.events.push(ProviderEvent::ToolcallEnd {
            content_index,
            tool_call: json!({
                "type": "toolCall",
                "id": call.id,
                "name": call.name,
                "arguments": raw_arguments,
            }),
            partial: self.output.clone(),
        });
    }

    fn done(&mut self, stop_reason: ProviderStopReason, input_tokens: u64) {
        self.output.stop_reason = stop_reason;
        self.output.usage = Some(Usage {
            input: input_tokens,
            output: self.output_tokens,
            cache_read: None,
            cache_write: None,
        });
        let reason = match stop_reason {
            ProviderStopReason::Length => DoneReason::Length,
            ProviderStopReason::ToolUse => DoneReason::ToolUse,
            ProviderStopReason::Stop | ProviderStopReason::Error | ProviderStopReason::Aborted => {
                DoneReason::Stop
            }
        };
        self.events.push(ProviderEvent::Done {
            reason,
            message: self.output.clone(),
        });
    }

    fn error(&mut self, message: &str) {
        self.output.stop_reason = ProviderStopReason::Error;
        self.output.error_message = Some(message.to_string());
        self.events.push(ProviderEvent::Error {
            reason: ErrorReason::Error,
            error: self.output.clone(),
        });
    }
}

fn chunk_chars(text: &str, size: usize) -> Vec<String> {
    let chars = text.chars().collect::<Vec<_>>();
    chars
        .chunks(size.max(1))
        .map(|chunk| chunk.iter().collect())
        .collect()
}
