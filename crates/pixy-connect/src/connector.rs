use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::debug;

use crate::abort::abortable;
use crate::auth::{resolve_auth, ResolvedAuth};
use crate::error::{ConnectError, ConnectErrorCode};
use crate::event_stream::EventStream;
use crate::types::{Api, Context, Model, Provider, StreamOptions};

/// Resolves once the backend accepted the request. An `Err` here is a
/// pre-flight failure: no event has been produced yet.
pub type ConnectorFuture = Pin<Box<dyn Future<Output = Result<EventStream, ConnectError>> + Send>>;

pub type StreamFn = Arc<dyn Fn(Model, Context, StreamOptions) -> ConnectorFuture + Send + Sync>;

/// The streaming operation behind a [`Connector`].
pub trait StreamConnector: Send + Sync {
    fn stream(&self, model: Model, context: Context, options: StreamOptions) -> ConnectorFuture;
}

#[derive(Clone)]
pub struct ClosureStreamConnector {
    pub stream: StreamFn,
}

impl StreamConnector for ClosureStreamConnector {
    fn stream(&self, model: Model, context: Context, options: StreamOptions) -> ConnectorFuture {
        (self.stream)(model, context, options)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AuthRequirement {
    #[default]
    Required,
    NotRequired,
}

/// One backend exposed under the uniform streaming contract.
#[derive(Clone)]
pub struct Connector {
    pub id: String,
    pub label: String,
    pub provider: Provider,
    pub api: Api,
    pub models: Vec<Model>,
    pub env_vars: Vec<String>,
    pub auth: AuthRequirement,
    streamer: Arc<dyn StreamConnector>,
}

impl Connector {
    pub fn new(
        id: impl Into<String>,
        provider: impl Into<Provider>,
        api: impl Into<Api>,
        streamer: Arc<dyn StreamConnector>,
    ) -> Self {
        let id = id.into();
        Self {
            label: id.clone(),
            id,
            provider: provider.into(),
            api: api.into(),
            models: Vec::new(),
            env_vars: Vec::new(),
            auth: AuthRequirement::Required,
            streamer,
        }
    }

    pub fn from_fn<F>(
        id: impl Into<String>,
        provider: impl Into<Provider>,
        api: impl Into<Api>,
        stream: F,
    ) -> Self
    where
        F: Fn(Model, Context, StreamOptions) -> ConnectorFuture + Send + Sync + 'static,
    {
        Self::new(
            id,
            provider,
            api,
            Arc::new(ClosureStreamConnector {
                stream: Arc::new(stream),
            }),
        )
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_models(mut self, models: Vec<Model>) -> Self {
        self.models = models;
        self
    }

    pub fn with_env_vars<I, S>(mut self, env_vars: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.env_vars = env_vars.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_auth(mut self, auth: AuthRequirement) -> Self {
        self.auth = auth;
        self
    }

    pub fn model(&self, id: &str) -> Option<&Model> {
        self.models.iter().find(|model| model.id == id)
    }

    pub fn resolve_auth(&self, explicit: Option<&str>) -> Option<ResolvedAuth> {
        resolve_connector_auth(&self.provider, &self.env_vars, self.auth, explicit)
    }

    /// Like [`Connector::resolve_auth`] but fails with `CredentialNotFound`
    /// instead of letting an unauthenticated call through.
    pub fn require_auth(&self, options: &StreamOptions) -> Result<ResolvedAuth, ConnectError> {
        require_connector_auth(&self.provider, &self.env_vars, self.auth, options)
    }

    /// Starts one streaming call.
    ///
    /// Fails before producing anything if `options.signal` has already
    /// fired or fires during the handshake. Once the stream is returned,
    /// an abort drops the transport and ends the stream with an `Aborted`
    /// error item.
    pub async fn stream(
        &self,
        model: Model,
        context: Context,
        options: StreamOptions,
    ) -> Result<EventStream, ConnectError> {
        let signal = options.signal.clone();
        if let Some(signal) = &signal {
            signal.check()?;
        }

        debug!(
            connector = %self.id,
            model = %model.id,
            messages = context.messages.len(),
            "starting stream"
        );
        let handshake = self.streamer.stream(model, context, options);
        let events = match &signal {
            Some(signal) => tokio::select! {
                biased;
                _ = signal.cancelled() => return Err(signal.to_error()),
                events = handshake => events?,
            },
            None => handshake.await?,
        };

        Ok(abortable(events, signal))
    }
}

impl fmt::Debug for Connector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connector")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("provider", &self.provider)
            .field("api", &self.api)
            .field(
                "models",
                &self.models.iter().map(|model| model.id.as_str()).collect::<Vec<_>>(),
            )
            .field("env_vars", &self.env_vars)
            .field("auth", &self.auth)
            .finish()
    }
}

fn resolve_connector_auth<S: AsRef<str>>(
    provider: &str,
    env_vars: &[S],
    requirement: AuthRequirement,
    explicit: Option<&str>,
) -> Option<ResolvedAuth> {
    match resolve_auth(provider, env_vars, explicit) {
        Some(resolved) => Some(resolved),
        None if requirement == AuthRequirement::NotRequired => Some(ResolvedAuth::None),
        None => None,
    }
}

/// The check behind [`Connector::require_auth`], for streamers that hold
/// their connector's credential settings rather than the connector.
pub(crate) fn require_connector_auth<S: AsRef<str>>(
    provider: &str,
    env_vars: &[S],
    requirement: AuthRequirement,
    options: &StreamOptions,
) -> Result<ResolvedAuth, ConnectError> {
    resolve_connector_auth(provider, env_vars, requirement, options.api_key.as_deref())
        .ok_or_else(|| missing_credential(provider, env_vars))
}

pub(crate) fn missing_credential<S: AsRef<str>>(provider: &str, env_vars: &[S]) -> ConnectError {
    let mut hints = env_vars
        .iter()
        .map(|var| var.as_ref().to_string())
        .collect::<Vec<_>>();
    let conventional = crate::auth::conventional_env_var(provider);
    if !hints.contains(&conventional) {
        hints.push(conventional);
    }
    ConnectError::new(
        ConnectErrorCode::CredentialNotFound,
        format!(
            "Missing credential for provider '{provider}'. Pass `StreamOptions.api_key` or set {}.",
            hints.join(" / ")
        ),
    )
}
