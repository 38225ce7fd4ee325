//! Anthropic Messages API connector.
//!
//! Builds the request payload, hands it to an [`SseTransport`], and decodes
//! the response body incrementally. Responses may be `text/event-stream`
//! or a single JSON message; the first non-blank byte decides which.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures_core::Stream;
use futures_util::StreamExt;
use serde_json::Map;
use tracing::debug;

mod decoder;
mod payload;

use self::decoder::AnthropicDecoder;
use self::payload::build_payload;
use super::common::{join_url, SseBuffer};
use super::transport::{SseByteStream, SseTransport, TransportRequest};
use crate::adapter::{adapt_stream, ToolCallIdStrategy};
use crate::connector::{
    missing_credential, require_connector_auth, AuthRequirement, Connector, ConnectorFuture,
    StreamConnector,
};
use crate::error::ConnectError;
use crate::provider_event::ProviderEvent;
use crate::types::{Context, Cost, InputModality, Model, StreamOptions};

pub const ANTHROPIC_CONNECTOR_ID: &str = "anthropic";
pub const ANTHROPIC_PROVIDER: &str = "anthropic";
pub const ANTHROPIC_API: &str = "anthropic-messages";
pub const ANTHROPIC_ENV_VARS: &[&str] = &["ANTHROPIC_API_KEY"];
pub const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";

struct AnthropicStreamer {
    transport: Arc<dyn SseTransport>,
    /// Variables the connector was registered with.
    env_vars: Vec<String>,
}

impl StreamConnector for AnthropicStreamer {
    fn stream(&self, model: Model, context: Context, options: StreamOptions) -> ConnectorFuture {
        let transport = Arc::clone(&self.transport);
        let env_vars = self.env_vars.clone();
        Box::pin(async move {
            let auth = require_connector_auth(
                ANTHROPIC_PROVIDER,
                &env_vars,
                AuthRequirement::Required,
                &options,
            )?;
            let secret = auth
                .secret()
                .ok_or_else(|| missing_credential(ANTHROPIC_PROVIDER, &env_vars))?;

            let body = build_payload(&model, &context, &options)?;
            let base_url = model.base_url.as_deref().unwrap_or(ANTHROPIC_BASE_URL);
            let url = join_url(base_url, "messages");

            let mut headers = BTreeMap::from([
                ("x-api-key".to_string(), secret.to_string()),
                ("anthropic-version".to_string(), ANTHROPIC_VERSION.to_string()),
                ("content-type".to_string(), "application/json".to_string()),
                ("accept".to_string(), "text/event-stream".to_string()),
            ]);
            for extra in [&model.headers, &options.headers].into_iter().flatten() {
                headers.extend(extra.iter().map(|(name, value)| (name.clone(), value.clone())));
            }

            debug!(url = %url, model = %model.id, "sending anthropic request");
            let response = transport
                .post(TransportRequest { url, headers, body })
                .await?;

            Ok(adapt_stream(
                provider_events(response, model),
                ToolCallIdStrategy::PartialSnapshot,
            ))
        })
    }
}

/// The Anthropic connector, sending through `transport`.
pub fn anthropic_connector(transport: Arc<dyn SseTransport>) -> Connector {
    let env_vars = ANTHROPIC_ENV_VARS
        .iter()
        .map(|var| var.to_string())
        .collect::<Vec<_>>();
    Connector::new(
        ANTHROPIC_CONNECTOR_ID,
        ANTHROPIC_PROVIDER,
        ANTHROPIC_API,
        Arc::new(AnthropicStreamer {
            transport,
            env_vars: env_vars.clone(),
        }),
    )
    .with_label("Anthropic")
    .with_models(anthropic_models())
    .with_env_vars(env_vars)
    .with_auth(AuthRequirement::Required)
}

pub fn anthropic_models() -> Vec<Model> {
    vec![
        anthropic_model(
            "claude-3-5-haiku-latest",
            "Claude Haiku 3.5",
            false,
            Cost {
                input: 0.8,
                output: 4.0,
                cache_read: 0.08,
                cache_write: 1.0,
            },
            8_192,
        ),
        anthropic_model(
            "claude-sonnet-4-0",
            "Claude Sonnet 4",
            true,
            Cost {
                input: 3.0,
                output: 15.0,
                cache_read: 0.3,
                cache_write: 3.75,
            },
            64_000,
        ),
    ]
}

fn anthropic_model(id: &str, name: &str, reasoning: bool, cost: Cost, max_tokens: u32) -> Model {
    Model {
        id: id.to_string(),
        name: Some(name.to_string()),
        api: ANTHROPIC_API.to_string(),
        provider: ANTHROPIC_PROVIDER.to_string(),
        base_url: Some(ANTHROPIC_BASE_URL.to_string()),
        reasoning,
        input: vec![InputModality::Text, InputModality::Image],
        cost,
        context_window: 200_000,
        max_tokens,
        headers: None,
        compat: Map::new(),
    }
}

enum BodyMode {
    Pending,
    Sse(SseBuffer),
    Json(Vec<u8>),
}

fn provider_events(
    mut body: SseByteStream,
    model: Model,
) -> impl Stream<Item = Result<ProviderEvent, ConnectError>> + Send {
    async_stream::try_stream! {
        let mut decoder = AnthropicDecoder::new(&model);
        let mut mode = BodyMode::Pending;

        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            if let BodyMode::Pending = mode {
                match chunk.iter().find(|byte| !byte.is_ascii_whitespace()) {
                    None => continue,
                    Some(b'{') => mode = BodyMode::Json(Vec::new()),
                    Some(_) => mode = BodyMode::Sse(SseBuffer::new()),
                }
            }

            match &mut mode {
                BodyMode::Json(bytes) => bytes.extend_from_slice(&chunk),
                BodyMode::Sse(buffer) => {
                    for data in buffer.push(&chunk) {
                        for event in decoder.decode(&data)? {
                            yield event;
                        }
                        if decoder.is_finished() {
                            return;
                        }
                    }
                }
                BodyMode::Pending => {}
            }
        }

        match mode {
            BodyMode::Json(bytes) => {
                for event in decoder.decode_message_body(&String::from_utf8_lossy(&bytes))? {
                    yield event;
                }
            }
            BodyMode::Sse(mut buffer) => {
                if let Some(data) = buffer.finish() {
                    for event in decoder.decode(&data)? {
                        yield event;
                    }
                }
            }
            BodyMode::Pending => {}
        }
        for event in decoder.finish()? {
            yield event;
        }
    }
}
