use futures_core::Stream;
use futures_util::StreamExt;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::ConnectError;
use crate::event::{StreamEvent, ToolCall};
use crate::event_stream::EventStream;
use crate::provider_event::{DoneReason, ErrorReason, ProviderEvent, ProviderStopReason};
use crate::types::StopReason;

const UNTERMINATED_MESSAGE: &str = "provider stream ended without a terminal event";

/// How `toolcall_start` / `toolcall_delta` learn their correlation id.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ToolCallIdStrategy {
    /// Read the id from the partial snapshot at the event's content index.
    /// Backends that assign ids before any argument bytes expose them here.
    #[default]
    PartialSnapshot,
    /// Never reveal ids before `toolcall_end`.
    EndOnly,
}

/// One-pass translator from [`ProviderEvent`]s to canonical
/// [`StreamEvent`]s. Never buffers: each call returns only what the given
/// provider event triggers.
#[derive(Debug, Default)]
pub struct EventAdapter {
    strategy: ToolCallIdStrategy,
    started: bool,
    finished: bool,
}

impl EventAdapter {
    pub fn new(strategy: ToolCallIdStrategy) -> Self {
        Self {
            strategy,
            started: false,
            finished: false,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Translates one provider event. A provider `start` becomes the
    /// canonical `start`; if the provider skips it, `start` is emitted in
    /// front of its first event. Returns `Err` only for aborted providers.
    pub fn adapt(&mut self, event: ProviderEvent) -> Result<Vec<StreamEvent>, ConnectError> {
        if self.finished {
            warn!(kind = event.kind(), "dropping provider event after terminal");
            return Ok(Vec::new());
        }

        let mut out = Vec::with_capacity(2);
        if !self.started {
            self.started = true;
            out.push(StreamEvent::Start);
            if matches!(event, ProviderEvent::Start { .. }) {
                return Ok(out);
            }
        }

        let translated = match event {
            ProviderEvent::Start { .. } => {
                debug!("dropping duplicate provider start");
                None
            }
            ProviderEvent::TextStart { .. } | ProviderEvent::ThinkingStart { .. } => None,
            ProviderEvent::TextDelta { delta, .. } => Some(StreamEvent::TextDelta { delta }),
            ProviderEvent::TextEnd { content, .. } => Some(StreamEvent::TextEnd { content }),
            ProviderEvent::ThinkingDelta { delta, .. } => {
                Some(StreamEvent::ThinkingDelta { delta })
            }
            ProviderEvent::ThinkingEnd { content, .. } => {
                Some(StreamEvent::ThinkingEnd { content })
            }
            ProviderEvent::ToolcallStart {
                content_index,
                partial,
            } => Some(StreamEvent::ToolcallStart {
                id: self.early_id(partial.tool_call_id(content_index)),
            }),
            ProviderEvent::ToolcallDelta {
                content_index,
                delta,
                partial,
            } => Some(StreamEvent::ToolcallDelta {
                id: self.early_id(partial.tool_call_id(content_index)),
                delta,
            }),
            ProviderEvent::ToolcallEnd {
                content_index,
                tool_call,
                partial,
            } => match resolve_tool_call(&tool_call, partial.tool_call_id(content_index)) {
                Ok(tool_call) => Some(StreamEvent::ToolcallEnd { tool_call }),
                Err(message) => {
                    warn!(content_index, %message, "unresolvable tool call");
                    self.finished = true;
                    Some(StreamEvent::error(message))
                }
            },
            ProviderEvent::Done { reason, message } => {
                self.finished = true;
                Some(StreamEvent::Done {
                    stop_reason: map_stop_reason(reason, message.stop_reason),
                    usage: message.usage,
                })
            }
            ProviderEvent::Error {
                reason: ErrorReason::Aborted,
                error,
            } => {
                self.finished = true;
                return Err(ConnectError::aborted(error.error_message.as_deref()));
            }
            ProviderEvent::Error {
                reason: ErrorReason::Error,
                error,
            } => {
                self.finished = true;
                Some(StreamEvent::error(error.error_message.unwrap_or_default()))
            }
        };

        out.extend(translated);
        Ok(out)
    }

    /// Folds a failure of the underlying source into the sequence. After
    /// `start` (or when the failure is the first thing seen) it becomes an
    /// in-band `error`; cancellations pass through as `Err`.
    pub fn fail(&mut self, error: ConnectError) -> Result<Vec<StreamEvent>, ConnectError> {
        if error.is_abort() {
            self.finished = true;
            return Err(error);
        }
        if self.finished {
            return Ok(Vec::new());
        }
        Ok(self.terminate_with(error.message))
    }

    /// Called when the source is exhausted. Closes the sequence with an
    /// `error` if the provider never sent a terminal event.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        if self.finished {
            return Vec::new();
        }
        warn!("{UNTERMINATED_MESSAGE}");
        self.terminate_with(UNTERMINATED_MESSAGE.to_string())
    }

    fn terminate_with(&mut self, message: String) -> Vec<StreamEvent> {
        let mut out = Vec::with_capacity(2);
        if !self.started {
            self.started = true;
            out.push(StreamEvent::Start);
        }
        self.finished = true;
        out.push(StreamEvent::error(message));
        out
    }

    fn early_id(&self, snapshot_id: Option<&str>) -> Option<String> {
        match self.strategy {
            ToolCallIdStrategy::PartialSnapshot => snapshot_id.map(str::to_string),
            ToolCallIdStrategy::EndOnly => None,
        }
    }
}

/// Wraps a provider event source into a canonical [`EventStream`].
pub fn adapt_stream<S>(events: S, strategy: ToolCallIdStrategy) -> EventStream
where
    S: Stream<Item = Result<ProviderEvent, ConnectError>> + Send + 'static,
{
    Box::pin(async_stream::stream! {
        let mut adapter = EventAdapter::new(strategy);
        let mut events = Box::pin(events);
        while let Some(item) = events.next().await {
            let produced = match item {
                Ok(event) => adapter.adapt(event),
                Err(error) => adapter.fail(error),
            };
            match produced {
                Ok(batch) => {
                    for event in batch {
                        yield Ok(event);
                    }
                }
                Err(error) => {
                    yield Err(error);
                    return;
                }
            }
            if adapter.is_finished() {
                return;
            }
        }
        for event in adapter.finish() {
            yield Ok(event);
        }
    })
}

fn map_stop_reason(reason: DoneReason, message_reason: ProviderStopReason) -> StopReason {
    if message_reason == ProviderStopReason::Error {
        return StopReason::Error;
    }
    match reason {
        DoneReason::Stop => StopReason::Stop,
        DoneReason::Length => StopReason::Length,
        DoneReason::ToolUse => StopReason::ToolUse,
    }
}

fn resolve_tool_call(raw: &Value, snapshot_id: Option<&str>) -> Result<ToolCall, String> {
    let id = raw
        .get("id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .or(snapshot_id)
        .ok_or_else(|| "tool call finished without an id".to_string())?;
    let name = raw
        .get("name")
        .and_then(Value::as_str)
        .filter(|name| !name.is_empty())
        .ok_or_else(|| format!("tool call `{id}` finished without a name"))?;

    Ok(ToolCall {
        id: id.to_string(),
        name: name.to_string(),
        arguments: parse_arguments(id, raw.get("arguments")),
    })
}

fn parse_arguments(id: &str, arguments: Option<&Value>) -> Map<String, Value> {
    match arguments {
        Some(Value::Object(arguments)) => arguments.clone(),
        Some(Value::String(raw)) if raw.trim().is_empty() => Map::new(),
        Some(Value::String(raw)) => match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(arguments)) => arguments,
            Ok(_) | Err(_) => {
                warn!(tool_call_id = id, "tool call arguments are not a JSON object");
                Map::new()
            }
        },
        Some(Value::Null) | None => Map::new(),
        Some(_) => {
            warn!(tool_call_id = id, "tool call arguments are not a JSON object");
            Map::new()
        }
    }
}
