//! Static credential resolution.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthSource {
    Explicit,
    Config,
    Env { var: String },
}

/// Outcome of credential lookup, tagged by mechanism. Read keys through
/// [`ResolvedAuth::api_key`] or by matching on the variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode")]
pub enum ResolvedAuth {
    #[serde(rename = "api-key")]
    ApiKey {
        #[serde(rename = "apiKey")]
        api_key: String,
        source: AuthSource,
    },
    #[serde(rename = "oauth")]
    OAuth {
        #[serde(rename = "accessToken")]
        access_token: String,
        source: AuthSource,
    },
    #[serde(rename = "token")]
    Token { token: String, source: AuthSource },
    #[serde(rename = "aws-sdk")]
    AwsSdk {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        profile: Option<String>,
    },
    /// The backend needs no credential at all. Never produced by
    /// [`resolve_auth`]; only connectors declared as not requiring auth
    /// report it.
    #[serde(rename = "none")]
    None,
    #[serde(rename = "mixed")]
    Mixed { parts: Vec<ResolvedAuth> },
    #[serde(rename = "unknown")]
    Unknown,
}

impl ResolvedAuth {
    pub fn mode(&self) -> &'static str {
        match self {
            ResolvedAuth::ApiKey { .. } => "api-key",
            ResolvedAuth::OAuth { .. } => "oauth",
            ResolvedAuth::Token { .. } => "token",
            ResolvedAuth::AwsSdk { .. } => "aws-sdk",
            ResolvedAuth::None => "none",
            ResolvedAuth::Mixed { .. } => "mixed",
            ResolvedAuth::Unknown => "unknown",
        }
    }

    pub fn api_key(&self) -> Option<&str> {
        match self {
            ResolvedAuth::ApiKey { api_key, .. } => Some(api_key),
            _ => None,
        }
    }

    /// Secret to send as a bearer-style header, for the variants that have one.
    pub fn secret(&self) -> Option<&str> {
        match self {
            ResolvedAuth::ApiKey { api_key, .. } => Some(api_key),
            ResolvedAuth::OAuth { access_token, .. } => Some(access_token),
            ResolvedAuth::Token { token, .. } => Some(token),
            ResolvedAuth::Mixed { parts } => parts.iter().find_map(ResolvedAuth::secret),
            ResolvedAuth::AwsSdk { .. } | ResolvedAuth::None | ResolvedAuth::Unknown => None,
        }
    }

    pub fn source(&self) -> Option<&AuthSource> {
        match self {
            ResolvedAuth::ApiKey { source, .. }
            | ResolvedAuth::OAuth { source, .. }
            | ResolvedAuth::Token { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// `anthropic` → `ANTHROPIC_API_KEY`, `google-vertex` → `GOOGLE_VERTEX_API_KEY`.
pub fn conventional_env_var(provider: &str) -> String {
    format!("{}_API_KEY", provider.to_uppercase().replace('-', "_"))
}

/// Resolves a credential against the process environment.
///
/// First match wins: the explicit key, then each candidate variable in
/// order, then [`conventional_env_var`] for `provider`. Blank values are
/// skipped.
pub fn resolve_auth<S: AsRef<str>>(
    provider: &str,
    candidates: &[S],
    explicit: Option<&str>,
) -> Option<ResolvedAuth> {
    resolve_auth_with(provider, candidates, explicit, |name| std::env::var(name).ok())
}

/// [`resolve_auth`] with the environment supplied by `lookup`.
pub fn resolve_auth_with<S, F>(
    provider: &str,
    candidates: &[S],
    explicit: Option<&str>,
    lookup: F,
) -> Option<ResolvedAuth>
where
    S: AsRef<str>,
    F: Fn(&str) -> Option<String>,
{
    if let Some(api_key) = explicit.filter(|key| !key.trim().is_empty()) {
        return Some(ResolvedAuth::ApiKey {
            api_key: api_key.to_string(),
            source: AuthSource::Explicit,
        });
    }

    let conventional = conventional_env_var(provider);
    candidates
        .iter()
        .map(|candidate| candidate.as_ref())
        .chain(std::iter::once(conventional.as_str()))
        .find_map(|var| {
            lookup(var)
                .filter(|value| !value.trim().is_empty())
                .map(|api_key| ResolvedAuth::ApiKey {
                    api_key,
                    source: AuthSource::Env {
                        var: var.to_string(),
                    },
                })
        })
}
