//! JSON Schema checks for finished tool calls.
//!
//! Connectors never validate: `toolcall_end` carries whatever the backend
//! produced. Callers opt in through [`crate::complete_validated`] or by
//! calling these directly.

use jsonschema::JSONSchema;
use serde_json::{json, Map, Value};
use tracing::warn;

use crate::error::{ConnectError, ConnectErrorCode};
use crate::event::ToolCall;
use crate::types::Tool;

/// Looks up the tool named by `tool_call` and validates its arguments.
pub fn validate_tool_call(
    tools: &[Tool],
    tool_call: &ToolCall,
) -> Result<Map<String, Value>, ConnectError> {
    validate_tool_arguments(find_tool(tools, &tool_call.name)?, tool_call)
}

/// Validates `tool_calls` in stream order and stops at the first failure.
pub fn validate_tool_calls(tools: &[Tool], tool_calls: &[ToolCall]) -> Result<(), ConnectError> {
    for tool_call in tool_calls {
        validate_tool_call(tools, tool_call)?;
    }
    Ok(())
}

pub fn validate_tool_arguments(
    tool: &Tool,
    tool_call: &ToolCall,
) -> Result<Map<String, Value>, ConnectError> {
    let schema = compile_schema(tool)?;
    let arguments = tool_call.arguments_value();

    let failures = match schema.validate(&arguments) {
        Ok(()) => return Ok(tool_call.arguments.clone()),
        Err(errors) => errors
            .map(|error| {
                json!({
                    "path": error.instance_path.to_string(),
                    "schemaPath": error.schema_path.to_string(),
                    "message": error.to_string(),
                })
            })
            .collect::<Vec<_>>(),
    };

    warn!(
        tool = %tool.name,
        tool_call_id = %tool_call.id,
        failures = failures.len(),
        "tool call arguments do not match schema"
    );
    Err(ConnectError::new(
        ConnectErrorCode::ToolArgumentsInvalid,
        format!("Validation failed for tool '{}'", tool.name),
    )
    .with_details(json!({
        "toolName": tool.name,
        "toolCallId": tool_call.id,
        "arguments": arguments,
        "validationErrors": failures,
    })))
}

fn find_tool<'a>(tools: &'a [Tool], name: &str) -> Result<&'a Tool, ConnectError> {
    tools.iter().find(|tool| tool.name == name).ok_or_else(|| {
        let available = tools.iter().map(|tool| tool.name.as_str()).collect::<Vec<_>>();
        ConnectError::new(ConnectErrorCode::ToolNotFound, format!("Tool '{name}' not found"))
            .with_details(json!({
                "toolName": name,
                "availableTools": available,
            }))
    })
}

fn compile_schema(tool: &Tool) -> Result<JSONSchema, ConnectError> {
    JSONSchema::compile(&tool.parameters).map_err(|error| {
        ConnectError::new(
            ConnectErrorCode::SchemaInvalid,
            format!("Invalid JSON schema for tool '{}': {error}", tool.name),
        )
        .with_details(json!({ "toolName": tool.name }))
    })
}
