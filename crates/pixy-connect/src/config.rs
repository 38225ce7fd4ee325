//! `pixy-connect.toml`: log settings and per-provider credential overrides.
//!
//! ```toml
//! [log]
//! path = "~/.pixy/logs"
//! level = "debug"
//! stdout = false
//!
//! [env]
//! WORK_KEY = "sk-..."
//!
//! [providers.anthropic]
//! api_key = "$WORK_KEY"
//! env = ["ANTHROPIC_WORK_KEY"]
//! ```
//!
//! String values starting with `$` name a variable, looked up in `[env]`
//! first and then in the process environment.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::json;

use crate::auth::{resolve_auth_with, AuthSource, ResolvedAuth};
use crate::connector::{AuthRequirement, Connector};
use crate::error::{ConnectError, ConnectErrorCode};
use crate::types::StreamOptions;

pub const DEFAULT_LOG_LEVEL: &str = "info";
pub const DEFAULT_LOG_STDOUT: bool = true;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ConnectConfig {
    #[serde(default)]
    pub log: LogSection,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct LogSection {
    pub path: Option<String>,
    pub level: Option<String>,
    pub stdout: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ProviderConfig {
    pub api_key: Option<String>,
    #[serde(default)]
    pub env: Vec<String>,
}

/// Log settings with every `$VAR` reference resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Directory for `pixy-connect.log`; no file output when unset.
    pub path: Option<PathBuf>,
    pub level: String,
    pub stdout: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            path: None,
            level: DEFAULT_LOG_LEVEL.to_string(),
            stdout: DEFAULT_LOG_STDOUT,
        }
    }
}

impl ConnectConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConnectError> {
        toml::from_str(content).map_err(|error| {
            ConnectError::new(
                ConnectErrorCode::ConfigInvalid,
                format!("parse config failed: {error}"),
            )
        })
    }

    /// Reads `path`, returning `Ok(None)` when the file does not exist.
    pub fn load(path: &Path) -> Result<Option<Self>, ConnectError> {
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(path).map_err(|error| {
            ConnectError::new(
                ConnectErrorCode::ConfigInvalid,
                format!("read {} failed: {error}", path.display()),
            )
        })?;
        Self::from_toml_str(&content)
            .map(Some)
            .map_err(|error| {
                error.with_details(json!({ "path": path.display().to_string() }))
            })
    }

    /// Trims `value` and expands a leading `$NAME`. Blank results are `None`.
    pub fn resolve_value(&self, value: &str) -> Option<String> {
        self.resolve_value_with(value, |name| std::env::var(name).ok())
    }

    /// [`ConnectConfig::resolve_value`] with the process environment
    /// supplied by `lookup`. `[env]` still takes precedence.
    pub fn resolve_value_with<F>(&self, value: &str, lookup: F) -> Option<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return None;
        }
        if let Some(env_key) = trimmed.strip_prefix('$') {
            return self
                .env
                .get(env_key)
                .cloned()
                .or_else(|| lookup(env_key))
                .filter(|resolved| !resolved.trim().is_empty());
        }
        Some(trimmed.to_string())
    }

    pub fn log_config(&self) -> LogConfig {
        let path = self
            .log
            .path
            .as_deref()
            .and_then(|value| self.resolve_value(value))
            .map(|value| expand_home_path(&value));
        let level = self
            .log
            .level
            .as_deref()
            .and_then(|value| self.resolve_value(value))
            .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string());

        LogConfig {
            path,
            level,
            stdout: self.log.stdout.unwrap_or(DEFAULT_LOG_STDOUT),
        }
    }

    pub fn provider_api_key(&self, provider: &str) -> Option<String> {
        self.provider_api_key_with(provider, |name| std::env::var(name).ok())
    }

    fn provider_api_key_with<F>(&self, provider: &str, lookup: F) -> Option<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        self.providers
            .get(provider)?
            .api_key
            .as_deref()
            .and_then(|value| self.resolve_value_with(value, &lookup))
    }

    /// Credential lookup for `connector` with this file's overrides applied.
    ///
    /// Order: the explicit key, `[providers.<name>].api_key`, the
    /// provider's configured `env` variables, the connector's own
    /// variables, then the conventional `<PROVIDER>_API_KEY`.
    pub fn resolve_auth(
        &self,
        connector: &Connector,
        explicit: Option<&str>,
    ) -> Option<ResolvedAuth> {
        self.resolve_auth_with(connector, explicit, |name| std::env::var(name).ok())
    }

    pub fn resolve_auth_with<F>(
        &self,
        connector: &Connector,
        explicit: Option<&str>,
        lookup: F,
    ) -> Option<ResolvedAuth>
    where
        F: Fn(&str) -> Option<String>,
    {
        let explicit = explicit.filter(|key| !key.trim().is_empty());
        if explicit.is_none() {
            if let Some(api_key) = self.provider_api_key_with(&connector.provider, &lookup) {
                return Some(ResolvedAuth::ApiKey {
                    api_key,
                    source: AuthSource::Config,
                });
            }
        }

        let mut candidates = self
            .providers
            .get(&connector.provider)
            .map(|provider| provider.env.clone())
            .unwrap_or_default();
        for var in &connector.env_vars {
            if !candidates.contains(var) {
                candidates.push(var.clone());
            }
        }

        match resolve_auth_with(&connector.provider, &candidates, explicit, lookup) {
            Some(resolved) => Some(resolved),
            None if connector.auth == AuthRequirement::NotRequired => Some(ResolvedAuth::None),
            None => None,
        }
    }

    /// Fills `options.api_key` from this file's overrides so the key reaches
    /// `connector` as an explicit credential. A key already set on `options`
    /// is kept. Variables the connector already checks are left to it.
    pub fn apply_auth(&self, connector: &Connector, options: StreamOptions) -> StreamOptions {
        self.apply_auth_with(connector, options, |name| std::env::var(name).ok())
    }

    pub fn apply_auth_with<F>(
        &self,
        connector: &Connector,
        mut options: StreamOptions,
        lookup: F,
    ) -> StreamOptions
    where
        F: Fn(&str) -> Option<String>,
    {
        let resolved = self.resolve_auth_with(connector, options.api_key.as_deref(), lookup);
        let from_config = match &resolved {
            Some(ResolvedAuth::ApiKey {
                source: AuthSource::Config,
                ..
            }) => true,
            Some(ResolvedAuth::ApiKey {
                source: AuthSource::Env { var },
                ..
            }) => self
                .providers
                .get(&connector.provider)
                .is_some_and(|provider| provider.env.contains(var)),
            _ => false,
        };
        if from_config {
            options.api_key = resolved
                .as_ref()
                .and_then(ResolvedAuth::secret)
                .map(str::to_string);
        }
        options
    }
}

fn expand_home_path(path: &str) -> PathBuf {
    let home = || {
        std::env::var_os("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
    };
    if path == "~" {
        return home();
    }
    if let Some(suffix) = path.strip_prefix("~/") {
        return home().join(suffix);
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_stream::from_events;

    fn connector(provider: &str) -> Connector {
        Connector::from_fn("c1", provider, "t1", |_, _, _| {
            Box::pin(async { Ok(from_events(vec![])) })
        })
        .with_env_vars(["CONNECTOR_KEY"])
    }

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn empty_file_uses_defaults() {
        let config = ConnectConfig::from_toml_str("").expect("empty config parses");
        assert_eq!(config.log_config(), LogConfig::default());
        assert!(config.providers.is_empty());
    }

    #[test]
    fn invalid_toml_is_config_invalid() {
        let error = ConnectConfig::from_toml_str("[log\nlevel = 1").expect_err("broken toml");
        assert_eq!(error.code, ConnectErrorCode::ConfigInvalid);
    }

    #[test]
    fn dollar_values_resolve_from_env_table() {
        let config = ConnectConfig::from_toml_str(
            r#"
[log]
level = "$PIXY_CONNECT_TEST_LEVEL"
stdout = false

[env]
PIXY_CONNECT_TEST_LEVEL = "debug"
"#,
        )
        .expect("config parses");

        let log = config.log_config();
        assert_eq!(log.level, "debug");
        assert!(!log.stdout);
        assert_eq!(log.path, None);
    }

    #[test]
    fn unresolvable_reference_is_absent() {
        let config = ConnectConfig::default();
        assert_eq!(config.resolve_value("$PIXY_CONNECT_DEFINITELY_UNSET_VAR"), None);
        assert_eq!(config.resolve_value("   "), None);
        assert_eq!(config.resolve_value(" plain "), Some("plain".to_string()));
    }

    #[test]
    fn config_key_sits_between_explicit_and_env() {
        let config = ConnectConfig::from_toml_str(
            r#"
[providers.acme]
api_key = "from-config"
"#,
        )
        .expect("config parses");
        let connector = connector("acme");
        let env = |name: &str| (name == "CONNECTOR_KEY").then(|| "from-env".to_string());

        let explicit = config
            .resolve_auth_with(&connector, Some("from-caller"), env)
            .expect("explicit wins");
        assert_eq!(explicit.source(), Some(&AuthSource::Explicit));

        let configured = config
            .resolve_auth_with(&connector, None, env)
            .expect("config key");
        assert_eq!(configured.api_key(), Some("from-config"));
        assert_eq!(configured.source(), Some(&AuthSource::Config));
    }

    #[test]
    fn configured_env_vars_are_checked_before_connector_vars() {
        let config = ConnectConfig::from_toml_str(
            r#"
[providers.acme]
env = ["ACME_WORK_KEY"]
"#,
        )
        .expect("config parses");
        let env = |name: &str| match name {
            "ACME_WORK_KEY" => Some("work".to_string()),
            "CONNECTOR_KEY" => Some("default".to_string()),
            _ => None,
        };

        let resolved = config
            .resolve_auth_with(&connector("acme"), None, env)
            .expect("env key");
        assert_eq!(resolved.api_key(), Some("work"));
        assert_eq!(
            resolved.source(),
            Some(&AuthSource::Env {
                var: "ACME_WORK_KEY".to_string()
            })
        );
        assert_eq!(
            config.resolve_auth_with(&connector("acme"), None, no_env),
            None
        );
    }

    #[test]
    fn injected_lookup_expands_dollar_api_keys() {
        let config = ConnectConfig::from_toml_str(
            r#"
[providers.acme]
api_key = "$ACME_INJECTED_SECRET"
"#,
        )
        .expect("config parses");
        let env = |name: &str| (name == "ACME_INJECTED_SECRET").then(|| "injected".to_string());

        let resolved = config
            .resolve_auth_with(&connector("acme"), None, env)
            .expect("reference resolves through lookup");
        assert_eq!(resolved.api_key(), Some("injected"));
        assert_eq!(resolved.source(), Some(&AuthSource::Config));
        assert_eq!(config.resolve_value_with("$ACME_INJECTED_SECRET", no_env), None);
    }

    #[test]
    fn apply_auth_carries_file_keys_into_options() {
        let config = ConnectConfig::from_toml_str(
            r#"
[providers.acme]
api_key = "from-config"

[providers.other]
env = ["OTHER_WORK_KEY"]
"#,
        )
        .expect("config parses");

        let options = config.apply_auth_with(&connector("acme"), StreamOptions::default(), no_env);
        assert_eq!(options.api_key.as_deref(), Some("from-config"));

        let options = config.apply_auth_with(
            &connector("acme"),
            StreamOptions::default().with_api_key("caller"),
            no_env,
        );
        assert_eq!(options.api_key.as_deref(), Some("caller"));

        let env = |name: &str| match name {
            "OTHER_WORK_KEY" => Some("work".to_string()),
            "CONNECTOR_KEY" => Some("default".to_string()),
            _ => None,
        };
        let options = config.apply_auth_with(&connector("other"), StreamOptions::default(), env);
        assert_eq!(options.api_key.as_deref(), Some("work"));

        let options = ConnectConfig::default().apply_auth_with(
            &connector("acme"),
            StreamOptions::default(),
            env,
        );
        assert_eq!(options.api_key, None);
    }

    #[test]
    fn load_reads_file_and_tolerates_missing_one() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("pixy-connect.toml");
        assert_eq!(ConnectConfig::load(&path).expect("missing is fine"), None);

        std::fs::write(&path, "[log]\npath = \"/tmp/pixy-connect-logs\"\n").expect("write config");
        let config = ConnectConfig::load(&path)
            .expect("load")
            .expect("file exists");
        assert_eq!(
            config.log_config().path,
            Some(PathBuf::from("/tmp/pixy-connect-logs"))
        );
    }

    #[test]
    fn load_attaches_path_to_parse_errors() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "providers = 3").expect("write config");

        let error = ConnectConfig::load(&path).expect_err("wrong shape");
        assert_eq!(error.code, ConnectErrorCode::ConfigInvalid);
        assert!(error.details.is_some());
    }
}
