use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectErrorCode {
    Aborted,
    CredentialNotFound,
    ConnectorNotFound,
    MalformedMessage,
    ConfigInvalid,
    PluginInvalid,
    ToolNotFound,
    ToolArgumentsInvalid,
    SchemaInvalid,
    ProviderTransport,
    ProviderProtocol,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
#[error("{code:?}: {message}")]
pub struct ConnectError {
    pub code: ConnectErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ConnectError {
    pub fn new(code: ConnectErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    /// Cancellation failure. The caller's reason, when given, is kept in
    /// `details.reason` and returned by [`ConnectError::abort_reason`].
    pub fn aborted(reason: Option<&str>) -> Self {
        let error = Self::new(
            ConnectErrorCode::Aborted,
            match reason {
                Some(reason) => format!("Request was aborted: {reason}"),
                None => "Request was aborted".to_string(),
            },
        );
        match reason {
            Some(reason) => error.with_details(json!({ "reason": reason })),
            None => error,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn is_abort(&self) -> bool {
        self.code == ConnectErrorCode::Aborted
    }

    pub fn abort_reason(&self) -> Option<&str> {
        if !self.is_abort() {
            return None;
        }
        self.details
            .as_ref()
            .and_then(|details| details.get("reason"))
            .and_then(Value::as_str)
    }

    pub fn as_compact_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(
                "{{\"code\":\"provider_protocol\",\"message\":\"{}\"}}",
                self.message.replace('\"', "\\\"")
            )
        })
    }
}
