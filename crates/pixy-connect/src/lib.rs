//! Provider-agnostic connector registry and streaming event protocol for
//! LLM backends.

mod abort;
mod adapter;
mod auth;
mod config;
mod connector;
mod error;
mod event;
mod event_stream;
mod logging;
mod monitor;
mod plugin;
mod provider_event;
mod providers;
mod registry;
mod stream;
mod tool_schema;
mod types;
mod validation;

pub use abort::{abortable, AbortController, AbortSignal};
pub use adapter::{adapt_stream, EventAdapter, ToolCallIdStrategy};
pub use auth::{conventional_env_var, resolve_auth, resolve_auth_with, AuthSource, ResolvedAuth};
pub use config::{
    ConnectConfig, LogConfig, LogSection, ProviderConfig, DEFAULT_LOG_LEVEL, DEFAULT_LOG_STDOUT,
};
pub use connector::{
    AuthRequirement, ClosureStreamConnector, Connector, ConnectorFuture, StreamConnector, StreamFn,
};
pub use error::{ConnectError, ConnectErrorCode};
pub use event::{StreamEvent, StreamItem, ToolCall};
pub use event_stream::{collect_events, collect_outcome, from_events, EventStream};
pub use logging::{init_tracing, LOG_FILE_NAME};
pub use monitor::{ProtocolMonitor, ProtocolViolation, StreamOutcome, Termination};
pub use plugin::{
    connectors_plugin, install_plugin, PluginContext, PluginEntry, PluginFn, PluginModule,
};
pub use provider_event::{
    AssistantMessage, DoneReason, ErrorReason, ProviderEvent, ProviderStopReason,
};
pub use providers::{
    anthropic_connector, anthropic_models, debug_connector, debug_model,
    register_builtin_connectors, DebugConnector, DebugScript, ScriptedToolCall, SseByteStream,
    SseTransport, TransportFuture, TransportRequest, ANTHROPIC_API, ANTHROPIC_BASE_URL,
    ANTHROPIC_CONNECTOR_ID, ANTHROPIC_ENV_VARS, ANTHROPIC_PROVIDER, DEBUG_API,
    DEBUG_CONNECTOR_ID, DEBUG_MODEL_ID, DEBUG_PROVIDER,
};
pub use registry::{ConnectorRef, ConnectorRegistry};
pub use stream::{complete, complete_validated, resolve_connector, stream};
pub use tool_schema::{
    sanitize_for_google, to_wire_tools, tool_result_message, ToolSchema,
    GOOGLE_UNSUPPORTED_SCHEMA_KEYWORDS,
};
pub use types::{
    Api, AssistantContentBlock, Context, Cost, InputModality, Message, Model, Provider,
    StopReason, StreamOptions, Tool, ToolResultContentBlock, Usage, UserContent,
    UserContentBlock,
};
pub use validation::{validate_tool_arguments, validate_tool_call, validate_tool_calls};
