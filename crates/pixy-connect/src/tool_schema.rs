//! Tool descriptions as backends receive them, and tool results as they go
//! back into the conversation.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::{ConnectError, ConnectErrorCode};
use crate::event::ToolCall;
use crate::types::{now_millis, Message, Tool, ToolResultContentBlock};

/// JSON-Schema keywords Google's function declarations reject.
pub const GOOGLE_UNSUPPORTED_SCHEMA_KEYWORDS: &[&str] = &[
    "patternProperties",
    "additionalProperties",
    "$ref",
    "$defs",
    "$schema",
    "$id",
    "definitions",
    "minLength",
    "maxLength",
    "pattern",
    "format",
    "examples",
    "default",
    "const",
    "minItems",
    "maxItems",
    "uniqueItems",
    "exclusiveMinimum",
    "exclusiveMaximum",
];

/// Keywords whose value maps property names to schemas.
const SCHEMA_MAP_KEYWORDS: &[&str] = &["properties"];
/// Keywords whose value is a schema or a list of schemas.
const SCHEMA_VALUE_KEYWORDS: &[&str] = &["items", "anyOf", "oneOf", "allOf", "not"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

impl ToolSchema {
    /// Builds the wire description of `tool`. The input schema is always an
    /// object schema: a missing `type` is filled in, any other type fails.
    pub fn from_tool(tool: &Tool) -> Result<Self, ConnectError> {
        let mut schema = match &tool.parameters {
            Value::Object(schema) => schema.clone(),
            Value::Null => Map::new(),
            other => {
                return Err(schema_error(
                    tool,
                    format!("parameters must be a JSON object schema, got {other}"),
                ));
            }
        };

        match schema.get("type") {
            None => {
                schema.insert("type".to_string(), json!("object"));
            }
            Some(Value::String(kind)) if kind == "object" => {}
            Some(kind) => {
                return Err(schema_error(
                    tool,
                    format!("input schema must have type \"object\", got {kind}"),
                ));
            }
        }
        schema
            .entry("properties".to_string())
            .or_insert_with(|| json!({}));

        Ok(Self {
            name: tool.name.clone(),
            description: tool.description.clone(),
            input_schema: Value::Object(schema),
        })
    }

    pub fn sanitized_for_google(mut self) -> Self {
        self.input_schema = sanitize_for_google(&self.input_schema);
        self
    }
}

pub fn to_wire_tools(tools: &[Tool]) -> Result<Vec<ToolSchema>, ConnectError> {
    tools.iter().map(ToolSchema::from_tool).collect()
}

/// Recursively strips [`GOOGLE_UNSUPPORTED_SCHEMA_KEYWORDS`]. Property
/// names are left alone, so a property called `format` survives.
pub fn sanitize_for_google(schema: &Value) -> Value {
    let Value::Object(object) = schema else {
        return schema.clone();
    };

    let mut sanitized = Map::new();
    for (key, value) in object {
        if GOOGLE_UNSUPPORTED_SCHEMA_KEYWORDS.contains(&key.as_str()) {
            continue;
        }
        let value = if SCHEMA_MAP_KEYWORDS.contains(&key.as_str()) {
            match value {
                Value::Object(properties) => Value::Object(
                    properties
                        .iter()
                        .map(|(name, property)| (name.clone(), sanitize_for_google(property)))
                        .collect(),
                ),
                other => other.clone(),
            }
        } else if SCHEMA_VALUE_KEYWORDS.contains(&key.as_str()) {
            match value {
                Value::Array(schemas) => {
                    Value::Array(schemas.iter().map(sanitize_for_google).collect())
                }
                other => sanitize_for_google(other),
            }
        } else {
            value.clone()
        };
        sanitized.insert(key.clone(), value);
    }
    Value::Object(sanitized)
}

/// Builds the tool-result history entry answering `tool_call`, carrying its
/// id so backends that check correlation accept it.
pub fn tool_result_message(
    tool_call: &ToolCall,
    content: Vec<ToolResultContentBlock>,
    is_error: bool,
) -> Message {
    Message::ToolResult {
        tool_call_id: tool_call.id.clone(),
        tool_name: tool_call.name.clone(),
        content,
        is_error,
        timestamp: now_millis(),
    }
}

fn schema_error(tool: &Tool, message: String) -> ConnectError {
    ConnectError::new(
        ConnectErrorCode::SchemaInvalid,
        format!("Tool '{}': {message}", tool.name),
    )
    .with_details(json!({ "toolName": tool.name }))
}
