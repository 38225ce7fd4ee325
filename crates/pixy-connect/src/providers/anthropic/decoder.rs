use std::collections::HashMap;

use serde_json::{json, Map, Value};

use crate::error::{ConnectError, ConnectErrorCode};
use crate::provider_event::{
    done_reason_for, AssistantMessage, DoneReason, ErrorReason, ProviderEvent, ProviderStopReason,
};
use crate::providers::common::truncate_for_details;
use crate::types::{AssistantContentBlock, Model, Usage};

#[derive(Clone, Debug)]
enum BlockState {
    Text {
        content_index: usize,
    },
    Thinking {
        content_index: usize,
    },
    ToolCall {
        content_index: usize,
        partial_json: String,
    },
}

/// Turns Anthropic Messages stream payloads into [`ProviderEvent`]s, one
/// `data:` payload at a time, keeping the partial assistant message the
/// events snapshot.
#[derive(Debug)]
pub(crate) struct AnthropicDecoder {
    output: AssistantMessage,
    blocks: HashMap<usize, BlockState>,
    started: bool,
    stop_seen: bool,
    finished: bool,
}

impl AnthropicDecoder {
    pub(crate) fn new(model: &Model) -> Self {
        Self {
            output: AssistantMessage::empty(model),
            blocks: HashMap::new(),
            started: false,
            stop_seen: false,
            finished: false,
        }
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.finished
    }

    pub(crate) fn decode(&mut self, data: &str) -> Result<Vec<ProviderEvent>, ConnectError> {
        let event: Value = serde_json::from_str(data).map_err(|error| {
            protocol_error(format!("Invalid Anthropic SSE event: {error}"))
                .with_details(json!({ "event": truncate_for_details(data, 800) }))
        })?;
        let event_type = event
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                protocol_error("Anthropic event missing `type` field")
                    .with_details(json!({ "event": event }))
            })?;

        let mut events = Vec::new();
        match event_type {
            "message_start" => {
                if let Some(usage) = event.get("message").and_then(|message| message.get("usage")) {
                    update_usage(&mut self.output.usage, usage);
                }
                self.ensure_started(&mut events);
            }
            "content_block_start" => {
                self.ensure_started(&mut events);
                let block_index = block_index(&event, event_type)?;
                let block = event
                    .get("content_block")
                    .and_then(Value::as_object)
                    .ok_or_else(|| {
                        protocol_error("content_block_start missing `content_block`")
                            .with_details(json!({ "event": event }))
                    })?;
                self.start_block(block_index, block, &mut events);
            }
            "content_block_delta" => {
                let block_index = block_index(&event, event_type)?;
                let delta = event
                    .get("delta")
                    .and_then(Value::as_object)
                    .ok_or_else(|| {
                        protocol_error("content_block_delta missing `delta` object")
                            .with_details(json!({ "event": event }))
                    })?;
                self.apply_delta(block_index, delta, &mut events);
            }
            "content_block_stop" => {
                let block_index = block_index(&event, event_type)?;
                if let Some(state) = self.blocks.remove(&block_index) {
                    events.push(self.end_block(state)?);
                }
            }
            "message_delta" => {
                if let Some(stop_reason) = event
                    .get("delta")
                    .and_then(|delta| delta.get("stop_reason"))
                    .and_then(Value::as_str)
                {
                    self.output.stop_reason = map_stop_reason(stop_reason);
                    self.stop_seen = true;
                }
                if let Some(usage) = event.get("usage") {
                    update_usage(&mut self.output.usage, usage);
                }
            }
            "message_stop" => {
                self.ensure_started(&mut events);
                events.extend(self.close()?);
            }
            "ping" => {}
            "error" => {
                self.ensure_started(&mut events);
                let error = event.get("error");
                let kind = error
                    .and_then(|error| error.get("type"))
                    .and_then(Value::as_str)
                    .unwrap_or("error");
                let message = error
                    .and_then(|error| error.get("message"))
                    .and_then(Value::as_str)
                    .unwrap_or("Anthropic stream reported an error");
                self.finished = true;
                self.output.stop_reason = ProviderStopReason::Error;
                self.output.error_message = Some(format!("{kind}: {message}"));
                events.push(ProviderEvent::Error {
                    reason: ErrorReason::Error,
                    error: self.output.clone(),
                });
            }
            other => {
                return Err(protocol_error(format!(
                    "Unhandled Anthropic event type: {other}"
                )));
            }
        }
        Ok(events)
    }

    /// Called when the body ends. A stream that reported a stop reason but
    /// lost its `message_stop` is still closed; anything else is left
    /// unterminated for the caller to report.
    pub(crate) fn finish(&mut self) -> Result<Vec<ProviderEvent>, ConnectError> {
        if self.finished || !self.stop_seen {
            return Ok(Vec::new());
        }
        self.close()
    }

    /// Decodes a complete non-streaming `{"type":"message", ...}` body.
    pub(crate) fn decode_message_body(
        &mut self,
        body: &str,
    ) -> Result<Vec<ProviderEvent>, ConnectError> {
        let payload: Value = serde_json::from_str(body).map_err(|error| {
            protocol_error(format!("Invalid Anthropic response body: {error}"))
                .with_details(json!({ "bodyPrefix": truncate_for_details(body, 800) }))
        })?;

        if payload.get("type").and_then(Value::as_str) == Some("error") {
            let mut events = Vec::new();
            self.ensure_started(&mut events);
            events.extend(self.decode(body)?);
            return Ok(events);
        }
        if payload.get("type").and_then(Value::as_str) != Some("message") {
            return Err(protocol_error(
                "Anthropic response did not contain SSE events or known non-stream message payload",
            )
            .with_details(json!({ "bodyPrefix": truncate_for_details(body, 800) })));
        }

        let mut events = Vec::new();
        self.ensure_started(&mut events);
        if let Some(usage) = payload.get("usage") {
            update_usage(&mut self.output.usage, usage);
        }
        if let Some(stop_reason) = payload.get("stop_reason").and_then(Value::as_str) {
            self.output.stop_reason = map_stop_reason(stop_reason);
        }

        let blocks = payload
            .get("content")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                protocol_error("Anthropic non-stream response missing `content` array")
                    .with_details(json!({ "bodyPrefix": truncate_for_details(body, 800) }))
            })?;

        for (block_index, block) in blocks.iter().enumerate() {
            let Some(block) = block.as_object() else {
                continue;
            };
            self.start_block(block_index, block, &mut events);
            let whole = match block.get("type").and_then(Value::as_str) {
                Some("text") => block.get("text").and_then(Value::as_str).map(|text| {
                    json!({ "type": "text_delta", "text": text })
                }),
                Some("thinking") => block.get("thinking").and_then(Value::as_str).map(|thinking| {
                    json!({ "type": "thinking_delta", "thinking": thinking })
                }),
                _ => None,
            };
            if let Some(Value::Object(delta)) = whole {
                self.apply_delta(block_index, &delta, &mut events);
            }
            if let Some(state) = self.blocks.remove(&block_index) {
                events.push(self.end_block(state)?);
            }
        }

        events.extend(self.close()?);
        Ok(events)
    }

    fn ensure_started(&mut self, events: &mut Vec<ProviderEvent>) {
        if !self.started {
            self.started = true;
            events.push(ProviderEvent::Start {
                partial: self.output.clone(),
            });
        }
    }

    fn start_block(
        &mut self,
        block_index: usize,
        block: &Map<String, Value>,
        events: &mut Vec<ProviderEvent>,
    ) {
        let content_index = self.output.content.len();
        match block.get("type").and_then(Value::as_str) {
            Some("text") => {
                self.output.content.push(AssistantContentBlock::Text {
                    text: String::new(),
                    text_signature: None,
                });
                self.blocks
                    .insert(block_index, BlockState::Text { content_index });
                events.push(ProviderEvent::TextStart {
                    content_index,
                    partial: self.output.clone(),
                });
            }
            Some("thinking") => {
                self.output.content.push(AssistantContentBlock::Thinking {
                    thinking: String::new(),
                    thinking_signature: block
                        .get("signature")
                        .and_then(Value::as_str)
                        .filter(|signature| !signature.is_empty())
                        .map(str::to_string),
                });
                self.blocks
                    .insert(block_index, BlockState::Thinking { content_index });
                events.push(ProviderEvent::ThinkingStart {
                    content_index,
                    partial: self.output.clone(),
                });
            }
            Some("tool_use") => {
                self.output.content.push(AssistantContentBlock::ToolCall {
                    id: string_field(block, "id"),
                    name: string_field(block, "name"),
                    arguments: block.get("input").cloned().unwrap_or_else(|| json!({})),
                });
                self.blocks.insert(
                    block_index,
                    BlockState::ToolCall {
                        content_index,
                        partial_json: String::new(),
                    },
                );
                events.push(ProviderEvent::ToolcallStart {
                    content_index,
                    partial: self.output.clone(),
                });
            }
            _ => {}
        }
    }

    fn apply_delta(
        &mut self,
        block_index: usize,
        delta: &Map<String, Value>,
        events: &mut Vec<ProviderEvent>,
    ) {
        let delta_type = delta.get("type").and_then(Value::as_str).unwrap_or_default();
        let Some(state) = self.blocks.get_mut(&block_index) else {
            return;
        };

        match (state, delta_type) {
            (BlockState::Text { content_index }, "text_delta") => {
                let text = string_field(delta, "text");
                if let Some(AssistantContentBlock::Text { text: current, .. }) =
                    self.output.content.get_mut(*content_index)
                {
                    current.push_str(&text);
                }
                events.push(ProviderEvent::TextDelta {
                    content_index: *content_index,
                    delta: text,
                    partial: self.output.clone(),
                });
            }
            (BlockState::Thinking { content_index }, "thinking_delta") => {
                let text = string_field(delta, "thinking");
                if let Some(AssistantContentBlock::Thinking { thinking, .. }) =
                    self.output.content.get_mut(*content_index)
                {
                    thinking.push_str(&text);
                }
                events.push(ProviderEvent::ThinkingDelta {
                    content_index: *content_index,
                    delta: text,
                    partial: self.output.clone(),
                });
            }
            (BlockState::Thinking { content_index }, "signature_delta") => {
                let signature = string_field(delta, "signature");
                if let Some(AssistantContentBlock::Thinking {
                    thinking_signature, ..
                }) = self.output.content.get_mut(*content_index)
                {
                    let next = match thinking_signature.take() {
                        Some(existing) => format!("{existing}{signature}"),
                        None => signature,
                    };
                    *thinking_signature = Some(next);
                }
            }
            (
                BlockState::ToolCall {
                    content_index,
                    partial_json,
                },
                "input_json_delta",
            ) => {
                let fragment = string_field(delta, "partial_json");
                partial_json.push_str(&fragment);
                if let Some(AssistantContentBlock::ToolCall { arguments, .. }) =
                    self.output.content.get_mut(*content_index)
                {
                    *arguments = parse_partial_json(partial_json);
                }
                events.push(ProviderEvent::ToolcallDelta {
                    content_index: *content_index,
                    delta: fragment,
                    partial: self.output.clone(),
                });
            }
            _ => {}
        }
    }

    fn end_block(&self, state: BlockState) -> Result<ProviderEvent, ConnectError> {
        let event = match state {
            BlockState::Text { content_index } => ProviderEvent::TextEnd {
                content_index,
                content: match self.output.content.get(content_index) {
                    Some(AssistantContentBlock::Text { text, .. }) => text.clone(),
                    _ => String::new(),
                },
                partial: self.output.clone(),
            },
            BlockState::Thinking { content_index } => ProviderEvent::ThinkingEnd {
                content_index,
                content: match self.output.content.get(content_index) {
                    Some(AssistantContentBlock::Thinking { thinking, .. }) => thinking.clone(),
                    _ => String::new(),
                },
                partial: self.output.clone(),
            },
            BlockState::ToolCall {
                content_index,
                partial_json,
            } => {
                let Some(AssistantContentBlock::ToolCall {
                    id,
                    name,
                    arguments,
                }) = self.output.content.get(content_index)
                else {
                    return Err(protocol_error(
                        "Missing tool call content when finalizing Anthropic stream",
                    ));
                };
                let arguments = if partial_json.trim().is_empty() {
                    arguments.clone()
                } else {
                    Value::String(partial_json)
                };
                ProviderEvent::ToolcallEnd {
                    content_index,
                    tool_call: json!({
                        "type": "toolCall",
                        "id": id,
                        "name": name,
                        "arguments": arguments,
                    }),
                    partial: self.output.clone(),
                }
            }
        };
        Ok(event)
    }

    // Ends any block the backend left open, in content order, then emits `done`.
    fn close(&mut self) -> Result<Vec<ProviderEvent>, ConnectError> {
        let mut open = self.blocks.drain().map(|(_, state)| state).collect::<Vec<_>>();
        open.sort_by_key(|state| match state {
            BlockState::Text { content_index }
            | BlockState::Thinking { content_index }
            | BlockState::ToolCall { content_index, .. } => *content_index,
        });

        let mut events = open
            .into_iter()
            .map(|state| self.end_block(state))
            .collect::<Result<Vec<_>, _>>()?;

        self.finished = true;
        events.push(ProviderEvent::Done {
            reason: done_reason_for(self.output.stop_reason).unwrap_or(DoneReason::Stop),
            message: self.output.clone(),
        });
        Ok(events)
    }
}

fn protocol_error(message: impl Into<String>) -> ConnectError {
    ConnectError::new(ConnectErrorCode::ProviderProtocol, message)
}

fn block_index(event: &Value, event_type: &str) -> Result<usize, ConnectError> {
    event
        .get("index")
        .and_then(Value::as_u64)
        .map(|value| value as usize)
        .ok_or_else(|| {
            protocol_error(format!("{event_type} missing `index`"))
                .with_details(json!({ "event": event }))
        })
}

fn string_field(object: &Map<String, Value>, key: &str) -> String {
    object
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// `refusal` and `sensitive` map to `Error`, which the adapter reports as a
/// non-exceptional `done` with stop reason `error`.
fn map_stop_reason(reason: &str) -> ProviderStopReason {
    match reason {
        "end_turn" | "stop_sequence" | "pause_turn" => ProviderStopReason::Stop,
        "max_tokens" => ProviderStopReason::Length,
        "tool_use" => ProviderStopReason::ToolUse,
        "refusal" | "sensitive" => ProviderStopReason::Error,
        _ => ProviderStopReason::Stop,
    }
}

fn parse_partial_json(buffer: &str) -> Value {
    serde_json::from_str::<Value>(buffer).unwrap_or_else(|_| Value::Object(Map::new()))
}

fn update_usage(usage: &mut Option<Usage>, value: &Value) {
    let usage = usage.get_or_insert_with(Usage::default);
    if let Some(input) = value.get("input_tokens").and_then(Value::as_u64) {
        usage.input = input;
    }
    if let Some(output) = value.get("output_tokens").and_then(Value::as_u64) {
        usage.output = output;
    }
    if let Some(cache_read) = value.get("cache_read_input_tokens").and_then(Value::as_u64) {
        usage.cache_read = Some(cache_read);
    }
    if let Some(cache_write) = value
        .get("cache_creation_input_tokens")
        .and_then(Value::as_u64)
    {
        usage.cache_write = Some(cache_write);
    }
}
