use thiserror::Error;

use crate::error::{ConnectError, ConnectErrorCode};
use crate::event::{StreamEvent, ToolCall};
use crate::types::{StopReason, Usage};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolViolation {
    #[error("first event must be `start`, got `{0}`")]
    MissingStart(&'static str),
    #[error("`start` emitted more than once")]
    DuplicateStart,
    #[error("`{0}` emitted after the terminal event")]
    AfterTerminal(&'static str),
    #[error("`toolcall_delta` has no open tool call to attach to")]
    OrphanToolcallDelta,
    #[error("`toolcall_end` for `{0}` has no matching `toolcall_start`")]
    OrphanToolcallEnd(String),
    #[error("`toolcall_end` carries an empty tool call id")]
    MissingToolCallId,
    #[error("`text_end` content does not match the preceding text deltas")]
    TextEndMismatch,
    #[error("`thinking_end` content does not match the preceding thinking deltas")]
    ThinkingEndMismatch,
    #[error("`error` event carries an empty message")]
    EmptyErrorMessage,
    #[error("stream ended without a terminal event")]
    Unterminated,
}

impl From<ProtocolViolation> for ConnectError {
    fn from(violation: ProtocolViolation) -> Self {
        ConnectError::new(ConnectErrorCode::ProviderProtocol, violation.to_string())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Termination {
    Done {
        stop_reason: StopReason,
        usage: Option<Usage>,
    },
    Error {
        message: String,
    },
}

/// Everything a finished stream produced, assembled from deltas.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamOutcome {
    pub text: String,
    pub thinking: String,
    pub tool_calls: Vec<ToolCall>,
    pub termination: Termination,
}

impl StreamOutcome {
    pub fn stop_reason(&self) -> Option<StopReason> {
        match &self.termination {
            Termination::Done { stop_reason, .. } => Some(*stop_reason),
            Termination::Error { .. } => None,
        }
    }

    pub fn usage(&self) -> Option<&Usage> {
        match &self.termination {
            Termination::Done { usage, .. } => usage.as_ref(),
            Termination::Error { .. } => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match &self.termination {
            Termination::Error { message } => Some(message),
            Termination::Done { .. } => None,
        }
    }

    /// `done(error)` without an `error` event: the backend declined or
    /// returned nothing usable.
    pub fn is_refusal(&self) -> bool {
        self.stop_reason() == Some(StopReason::Error)
    }
}

#[derive(Debug)]
struct PendingToolCall {
    id: Option<String>,
    arguments: String,
}

/// Checks a stream event by event against the protocol ordering rules and
/// accumulates its content. Delta accumulation, not `*_end` events, is
/// what ends up in the [`StreamOutcome`].
#[derive(Debug, Default)]
pub struct ProtocolMonitor {
    started: bool,
    termination: Option<Termination>,
    text: String,
    text_segment: String,
    thinking: String,
    thinking_segment: String,
    pending: Vec<PendingToolCall>,
    tool_calls: Vec<ToolCall>,
}

impl ProtocolMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_terminated(&self) -> bool {
        self.termination.is_some()
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Argument bytes buffered so far for tool calls still open, by id.
    pub fn pending_tool_calls(&self) -> Vec<(Option<&str>, &str)> {
        self.pending
            .iter()
            .map(|pending| (pending.id.as_deref(), pending.arguments.as_str()))
            .collect()
    }

    pub fn observe(&mut self, event: &StreamEvent) -> Result<(), ProtocolViolation> {
        if self.termination.is_some() {
            return Err(ProtocolViolation::AfterTerminal(event.kind()));
        }
        if !self.started {
            if !matches!(event, StreamEvent::Start) {
                return Err(ProtocolViolation::MissingStart(event.kind()));
            }
            self.started = true;
            return Ok(());
        }

        // A text or thinking block runs until its `*_end` or until any
        // other kind of event interrupts it.
        if !matches!(event, StreamEvent::TextDelta { .. } | StreamEvent::TextEnd { .. }) {
            self.text_segment.clear();
        }
        if !matches!(event, StreamEvent::ThinkingDelta { .. } | StreamEvent::ThinkingEnd { .. }) {
            self.thinking_segment.clear();
        }

        match event {
            StreamEvent::Start => return Err(ProtocolViolation::DuplicateStart),
            StreamEvent::TextDelta { delta } => {
                self.text.push_str(delta);
                self.text_segment.push_str(delta);
            }
            StreamEvent::TextEnd { content } => {
                if self.text_segment != *content {
                    return Err(ProtocolViolation::TextEndMismatch);
                }
                self.text_segment.clear();
            }
            StreamEvent::ThinkingDelta { delta } => {
                self.thinking.push_str(delta);
                self.thinking_segment.push_str(delta);
            }
            StreamEvent::ThinkingEnd { content } => {
                if self.thinking_segment != *content {
                    return Err(ProtocolViolation::ThinkingEndMismatch);
                }
                self.thinking_segment.clear();
            }
            StreamEvent::ToolcallStart { id } => {
                self.pending.push(PendingToolCall {
                    id: id.clone(),
                    arguments: String::new(),
                });
            }
            StreamEvent::ToolcallDelta { id, delta } => {
                let index = self
                    .route(id.as_deref())
                    .ok_or(ProtocolViolation::OrphanToolcallDelta)?;
                let pending = &mut self.pending[index];
                if pending.id.is_none() {
                    pending.id = id.clone();
                }
                pending.arguments.push_str(delta);
            }
            StreamEvent::ToolcallEnd { tool_call } => {
                if tool_call.id.is_empty() {
                    return Err(ProtocolViolation::MissingToolCallId);
                }
                let index = self
                    .route(Some(&tool_call.id))
                    .ok_or_else(|| ProtocolViolation::OrphanToolcallEnd(tool_call.id.clone()))?;
                self.pending.remove(index);
                self.tool_calls.push(tool_call.clone());
            }
            StreamEvent::Done { stop_reason, usage } => {
                self.termination = Some(Termination::Done {
                    stop_reason: *stop_reason,
                    usage: usage.clone(),
                });
            }
            StreamEvent::Error { message } => {
                if message.trim().is_empty() {
                    return Err(ProtocolViolation::EmptyErrorMessage);
                }
                self.termination = Some(Termination::Error {
                    message: message.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn finish(self) -> Result<StreamOutcome, ProtocolViolation> {
        let termination = self.termination.ok_or(ProtocolViolation::Unterminated)?;
        Ok(StreamOutcome {
            text: self.text,
            thinking: self.thinking,
            tool_calls: self.tool_calls,
            termination,
        })
    }

    // An id matches its own accumulator first; otherwise the most recent
    // call whose id has not been revealed yet takes the fragment.
    fn route(&self, id: Option<&str>) -> Option<usize> {
        if let Some(id) = id {
            if let Some(index) = self
                .pending
                .iter()
                .position(|pending| pending.id.as_deref() == Some(id))
            {
                return Some(index);
            }
            return self.pending.iter().rposition(|pending| pending.id.is_none());
        }
        if self.pending.is_empty() {
            None
        } else {
            Some(self.pending.len() - 1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map, Value};

    fn call(id: &str, arguments: Value) -> ToolCall {
        ToolCall {
            id: id.to_string(),
            name: "read".to_string(),
            arguments: arguments.as_object().cloned().unwrap_or_else(Map::new),
        }
    }

    fn feed(events: &[StreamEvent]) -> Result<StreamOutcome, ProtocolViolation> {
        let mut monitor = ProtocolMonitor::new();
        for event in events {
            monitor.observe(event)?;
        }
        monitor.finish()
    }

    #[test]
    fn rejects_events_before_start() {
        let error = feed(&[StreamEvent::TextDelta {
            delta: "hi".to_string(),
        }])
        .expect_err("start must come first");
        assert_eq!(error, ProtocolViolation::MissingStart("text_delta"));
    }

    #[test]
    fn rejects_events_after_terminal() {
        let error = feed(&[
            StreamEvent::Start,
            StreamEvent::Done {
                stop_reason: StopReason::Stop,
                usage: None,
            },
            StreamEvent::error("late"),
        ])
        .expect_err("nothing may follow done");
        assert_eq!(error, ProtocolViolation::AfterTerminal("error"));
    }

    #[test]
    fn text_end_may_follow_unterminated_earlier_block() {
        let outcome = feed(&[
            StreamEvent::Start,
            StreamEvent::TextDelta {
                delta: "before ".to_string(),
            },
            StreamEvent::ToolcallStart {
                id: Some("a".to_string()),
            },
            StreamEvent::ToolcallEnd {
                tool_call: call("a", json!({})),
            },
            StreamEvent::TextDelta {
                delta: "after".to_string(),
            },
            StreamEvent::TextEnd {
                content: "after".to_string(),
            },
            StreamEvent::Done {
                stop_reason: StopReason::ToolUse,
                usage: None,
            },
        ])
        .expect("valid stream");
        assert_eq!(outcome.text, "before after");
        assert_eq!(outcome.tool_calls.len(), 1);
    }

    #[test]
    fn mismatched_text_end_is_a_violation() {
        let error = feed(&[
            StreamEvent::Start,
            StreamEvent::TextDelta {
                delta: "abc".to_string(),
            },
            StreamEvent::TextEnd {
                content: "xyz".to_string(),
            },
        ])
        .expect_err("content differs from deltas");
        assert_eq!(error, ProtocolViolation::TextEndMismatch);
    }

    #[test]
    fn truncated_text_end_is_a_violation() {
        let mut monitor = ProtocolMonitor::new();
        for event in [
            StreamEvent::Start,
            StreamEvent::TextDelta {
                delta: "hello ".to_string(),
            },
            StreamEvent::TextDelta {
                delta: "world".to_string(),
            },
        ] {
            monitor.observe(&event).expect("valid event");
        }
        assert_eq!(
            monitor.observe(&StreamEvent::TextEnd {
                content: "d".to_string()
            }),
            Err(ProtocolViolation::TextEndMismatch)
        );

        let error = feed(&[
            StreamEvent::Start,
            StreamEvent::TextDelta {
                delta: "abc".to_string(),
            },
            StreamEvent::TextEnd {
                content: String::new(),
            },
        ])
        .expect_err("empty content for non-empty deltas");
        assert_eq!(error, ProtocolViolation::TextEndMismatch);
    }

    #[test]
    fn thinking_end_must_repeat_the_whole_block() {
        let error = feed(&[
            StreamEvent::Start,
            StreamEvent::ThinkingDelta {
                delta: "step one, ".to_string(),
            },
            StreamEvent::ThinkingDelta {
                delta: "step two".to_string(),
            },
            StreamEvent::ThinkingEnd {
                content: "step two".to_string(),
            },
        ])
        .expect_err("suffix is not the whole block");
        assert_eq!(error, ProtocolViolation::ThinkingEndMismatch);

        let outcome = feed(&[
            StreamEvent::Start,
            StreamEvent::ThinkingDelta {
                delta: "dropped".to_string(),
            },
            StreamEvent::TextDelta {
                delta: "answer".to_string(),
            },
            StreamEvent::TextEnd {
                content: "answer".to_string(),
            },
            StreamEvent::ThinkingDelta {
                delta: "again".to_string(),
            },
            StreamEvent::ThinkingEnd {
                content: "again".to_string(),
            },
            StreamEvent::Done {
                stop_reason: StopReason::Stop,
                usage: None,
            },
        ])
        .expect("interrupted block does not leak into the next one");
        assert_eq!(outcome.thinking, "droppedagain");
    }

    #[test]
    fn interleaved_tool_calls_route_by_id() {
        let mut monitor = ProtocolMonitor::new();
        for event in [
            StreamEvent::Start,
            StreamEvent::ToolcallStart {
                id: Some("a".to_string()),
            },
            StreamEvent::ToolcallStart {
                id: Some("b".to_string()),
            },
            StreamEvent::ToolcallDelta {
                id: Some("a".to_string()),
                delta: "{\"path\":".to_string(),
            },
            StreamEvent::ToolcallDelta {
                id: Some("b".to_string()),
                delta: "{\"path\":\"b\"}".to_string(),
            },
            StreamEvent::ToolcallDelta {
                id: Some("a".to_string()),
                delta: "\"a\"}".to_string(),
            },
        ] {
            monitor.observe(&event).expect("valid event");
        }

        assert_eq!(
            monitor.pending_tool_calls(),
            vec![
                (Some("a"), "{\"path\":\"a\"}"),
                (Some("b"), "{\"path\":\"b\"}")
            ]
        );
    }

    #[test]
    fn toolcall_end_without_start_is_a_violation() {
        let error = feed(&[
            StreamEvent::Start,
            StreamEvent::ToolcallEnd {
                tool_call: call("ghost", json!({})),
            },
        ])
        .expect_err("no open tool call");
        assert_eq!(error, ProtocolViolation::OrphanToolcallEnd("ghost".to_string()));
    }

    #[test]
    fn unterminated_stream_cannot_finish() {
        let error = feed(&[StreamEvent::Start]).expect_err("no terminal event");
        assert_eq!(error, ProtocolViolation::Unterminated);
    }

    #[test]
    fn refusal_is_done_with_error_reason() {
        let outcome = feed(&[
            StreamEvent::Start,
            StreamEvent::Done {
                stop_reason: StopReason::Error,
                usage: None,
            },
        ])
        .expect("valid stream");
        assert!(outcome.is_refusal());
        assert_eq!(outcome.error_message(), None);
    }
}
