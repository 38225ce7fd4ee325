use serde_json::{json, Value};

use crate::error::ConnectError;
use crate::tool_schema::to_wire_tools;
use crate::types::{
    AssistantContentBlock, Context, Message, Model, StreamOptions, ToolResultContentBlock,
    UserContent, UserContentBlock,
};

const THINKING_BUDGET_TOKENS: u32 = 1024;

pub(crate) fn build_payload(
    model: &Model,
    context: &Context,
    options: &StreamOptions,
) -> Result<Value, ConnectError> {
    let mut payload = json!({
        "model": model.id,
        "stream": true,
        "messages": convert_messages(context),
        "max_tokens": options
            .max_tokens
            .unwrap_or((model.max_tokens / 3).max(256)),
    });

    if let Some(system_prompt) = &context.system_prompt {
        payload["system"] = Value::String(system_prompt.clone());
    }
    if let Some(tools) = context.tools.as_deref().filter(|tools| !tools.is_empty()) {
        payload["tools"] = json!(to_wire_tools(tools)?);
    }
    if let Some(temperature) = options.temperature {
        payload["temperature"] = json!(temperature);
    }
    if options.reasoning && model.reasoning {
        payload["thinking"] = json!({
            "type": "enabled",
            "budget_tokens": THINKING_BUDGET_TOKENS,
        });
    }

    Ok(payload)
}

fn convert_messages(context: &Context) -> Vec<Value> {
    context
        .messages
        .iter()
        .filter_map(|message| match message {
            Message::User { content, .. } => Some(json!({
                "role": "user",
                "content": convert_user_content(content),
            })),
            Message::Assistant { content, .. } => {
                let converted = content
                    .iter()
                    .filter_map(convert_assistant_block)
                    .collect::<Vec<_>>();
                // Anthropic rejects assistant turns with no content.
                (!converted.is_empty()).then(|| {
                    json!({
                        "role": "assistant",
                        "content": converted,
                    })
                })
            }
            Message::ToolResult {
                tool_call_id,
                content,
                is_error,
                ..
            } => Some(json!({
                "role": "user",
                "content": [{
                    "type": "tool_result",
                    "tool_use_id": tool_call_id,
                    "content": convert_tool_result_content(content),
                    "is_error": is_error,
                }],
            })),
        })
        .collect()
}

fn convert_user_content(content: &UserContent) -> Value {
    match content {
        UserContent::Text(text) => Value::String(text.clone()),
        UserContent::Blocks(blocks) => Value::Array(
            blocks
                .iter()
                .map(|block| match block {
                    UserContentBlock::Text { text } => json!({
                        "type": "text",
                        "text": text,
                    }),
                    UserContentBlock::Image { data, mime_type } => json!({
                        "type": "image",
                        "source": {
                            "type": "base64",
                            "media_type": mime_type,
                            "data": data,
                        },
                    }),
                })
                .collect(),
        ),
    }
}

fn convert_assistant_block(block: &AssistantContentBlock) -> Option<Value> {
    match block {
        AssistantContentBlock::Text { text, .. } if text.trim().is_empty() => None,
        AssistantContentBlock::Text { text, .. } => Some(json!({
            "type": "text",
            "text": text,
        })),
        AssistantContentBlock::Thinking {
            thinking,
            thinking_signature,
        } => {
            // Unsigned thinking cannot be replayed; send it as plain text.
            let Some(signature) = thinking_signature else {
                return (!thinking.trim().is_empty()).then(|| {
                    json!({
                        "type": "text",
                        "text": thinking,
                    })
                });
            };
            Some(json!({
                "type": "thinking",
                "thinking": thinking,
                "signature": signature,
            }))
        }
        AssistantContentBlock::ToolCall {
            id,
            name,
            arguments,
        } => {
            let input = match arguments {
                Value::Object(_) => arguments.clone(),
                _ => json!({}),
            };
            Some(json!({
                "type": "tool_use",
                "id": id,
                "name": name,
                "input": input,
            }))
        }
    }
}

fn convert_tool_result_content(content: &[ToolResultContentBlock]) -> Value {
    let text_blocks = content
        .iter()
        .filter_map(|block| match block {
            ToolResultContentBlock::Text { text } => Some(text.clone()),
            ToolResultContentBlock::Image { .. } => None,
        })
        .collect::<Vec<_>>();

    match text_blocks.as_slice() {
        [] => Value::String("(no text result)".to_string()),
        [single] => Value::String(single.clone()),
        _ => Value::Array(
            text_blocks
                .into_iter()
                .map(|text| json!({ "type": "text", "text": text }))
                .collect(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::ToolCall;
    use crate::tool_schema::tool_result_message;
    use crate::types::Tool;
    use serde_json::Map;

    fn sample_model(reasoning: bool) -> Model {
        serde_json::from_value(json!({
            "id": "claude-test",
            "api": "anthropic-messages",
            "provider": "anthropic",
            "reasoning": reasoning,
            "cost": { "input": 0.0, "output": 0.0, "cacheRead": 0.0, "cacheWrite": 0.0 },
            "contextWindow": 200000,
            "maxTokens": 8192
        }))
        .expect("model")
    }

    fn sample_context() -> Context {
        Context {
            system_prompt: Some("You are a helpful assistant".to_string()),
            messages: vec![Message::user("hello")],
            tools: None,
        }
    }

    #[test]
    fn thinking_is_enabled_only_for_reasoning_models_that_ask() {
        let options = StreamOptions {
            reasoning: true,
            ..StreamOptions::default()
        };
        let payload =
            build_payload(&sample_model(true), &sample_context(), &options).expect("payload");
        assert_eq!(payload["thinking"]["budget_tokens"], json!(1024));
        assert_eq!(payload["system"], json!("You are a helpful assistant"));
        assert_eq!(payload["max_tokens"], json!(2730));

        let payload =
            build_payload(&sample_model(false), &sample_context(), &options).expect("payload");
        assert!(payload.get("thinking").is_none());
    }

    #[test]
    fn tools_use_input_schema_wire_shape() {
        let mut context = sample_context();
        context.tools = Some(vec![Tool {
            name: "read".to_string(),
            description: "Read a file".to_string(),
            parameters: json!({ "properties": { "path": { "type": "string" } } }),
        }]);

        let payload = build_payload(&sample_model(false), &context, &StreamOptions::default())
            .expect("payload");
        assert_eq!(payload["tools"][0]["input_schema"]["type"], json!("object"));
        assert!(payload["tools"][0].get("parameters").is_none());
    }

    #[test]
    fn tool_results_reference_their_tool_use() {
        let call = ToolCall {
            id: "toolu_1".to_string(),
            name: "read".to_string(),
            arguments: Map::new(),
        };
        let mut context = sample_context();
        context.messages.push(Message::Assistant {
            content: vec![AssistantContentBlock::ToolCall {
                id: call.id.clone(),
                name: call.name.clone(),
                arguments: call.arguments_value(),
            }],
            api: "anthropic-messages".to_string(),
            provider: "anthropic".to_string(),
            model: "claude-test".to_string(),
            usage: None,
            stop_reason: crate::types::StopReason::ToolUse,
            error_message: None,
            timestamp: 0,
        });
        context.messages.push(tool_result_message(
            &call,
            vec![ToolResultContentBlock::Text {
                text: "contents".to_string(),
            }],
            false,
        ));

        let payload = build_payload(&sample_model(false), &context, &StreamOptions::default())
            .expect("payload");
        let messages = payload["messages"].as_array().expect("messages");
        assert_eq!(messages[1]["content"][0]["id"], json!("toolu_1"));
        assert_eq!(messages[2]["content"][0]["tool_use_id"], json!("toolu_1"));
        assert_eq!(messages[2]["content"][0]["content"], json!("contents"));
    }
}
