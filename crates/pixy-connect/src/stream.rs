use crate::error::{ConnectError, ConnectErrorCode};
use crate::event_stream::{collect_outcome, EventStream};
use crate::monitor::StreamOutcome;
use crate::registry::{ConnectorRef, ConnectorRegistry};
use crate::types::{Context, Model, StreamOptions};
use crate::validation::validate_tool_calls;

/// Picks the connector serving `model`: the provider's current connector
/// when it speaks `model.api`, otherwise the first connector registered for
/// that api.
pub fn resolve_connector(
    registry: &ConnectorRegistry,
    model: &Model,
) -> Result<ConnectorRef, ConnectError> {
    registry
        .get_by_provider(&model.provider)
        .filter(|connector| connector.api == model.api)
        .or_else(|| registry.get_by_api(&model.api).into_iter().next())
        .ok_or_else(|| {
            ConnectError::new(
                ConnectErrorCode::ConnectorNotFound,
                format!(
                    "No connector registered for provider '{}' / api '{}'",
                    model.provider, model.api
                ),
            )
        })
}

pub async fn stream(
    registry: &ConnectorRegistry,
    model: Model,
    context: Context,
    options: StreamOptions,
) -> Result<EventStream, ConnectError> {
    let connector = resolve_connector(registry, &model)?;
    connector.stream(model, context, options).await
}

/// Streams `model` and drains the result into a [`StreamOutcome`].
pub async fn complete(
    registry: &ConnectorRegistry,
    model: Model,
    context: Context,
    options: StreamOptions,
) -> Result<StreamOutcome, ConnectError> {
    let events = stream(registry, model, context, options).await?;
    collect_outcome(events).await
}

/// [`complete`], then checks every finished tool call against
/// `context.tools`. A call to an unlisted tool fails with `ToolNotFound`
/// and arguments that break the tool's schema with `ToolArgumentsInvalid`.
pub async fn complete_validated(
    registry: &ConnectorRegistry,
    model: Model,
    context: Context,
    options: StreamOptions,
) -> Result<StreamOutcome, ConnectError> {
    let tools = context.tools.clone().unwrap_or_default();
    let outcome = complete(registry, model, context, options).await?;
    validate_tool_calls(&tools, &outcome.tool_calls)?;
    Ok(outcome)
}
