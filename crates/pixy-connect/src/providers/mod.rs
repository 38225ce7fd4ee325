use std::sync::Arc;

use crate::registry::ConnectorRegistry;

mod anthropic;
mod common;
mod debug;
mod transport;

pub use anthropic::{
    anthropic_connector, anthropic_models, ANTHROPIC_API, ANTHROPIC_BASE_URL,
    ANTHROPIC_CONNECTOR_ID, ANTHROPIC_ENV_VARS, ANTHROPIC_PROVIDER,
};
pub use debug::{
    debug_connector, debug_model, DebugConnector, DebugScript, ScriptedToolCall, DEBUG_API,
    DEBUG_CONNECTOR_ID, DEBUG_MODEL_ID, DEBUG_PROVIDER,
};
pub use transport::{SseByteStream, SseTransport, TransportFuture, TransportRequest};

/// Registers the built-in connectors into `registry`. The Anthropic
/// connector needs a transport and is skipped without one.
pub fn register_builtin_connectors(
    registry: &mut ConnectorRegistry,
    transport: Option<Arc<dyn SseTransport>>,
) {
    registry.register(debug_connector());
    if let Some(transport) = transport {
        registry.register(anthropic_connector(transport));
    }
}
