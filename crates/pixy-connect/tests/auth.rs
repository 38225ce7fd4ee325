use std::fs;

use pixy_connect::{
    conventional_env_var, debug_connector, from_events, resolve_auth, AuthRequirement, AuthSource,
    ConnectConfig, ConnectErrorCode, Connector, ResolvedAuth, StreamOptions,
};

fn keyed_connector(provider: &str, env_vars: &[&str]) -> Connector {
    Connector::from_fn(format!("{provider}-chat"), provider, "chat-v1", |_, _, _| {
        Box::pin(async { Ok(from_events(vec![])) })
    })
    .with_env_vars(env_vars.iter().copied())
}

#[test]
fn process_environment_is_consulted_in_candidate_order() {
    std::env::set_var("PIXY_AUTH_IT_ORDER_PRIMARY", "  ");
    std::env::set_var("PIXY_AUTH_IT_ORDER_SECONDARY", "secondary-key");

    let resolved = resolve_auth(
        "pixy-auth-it-order",
        &["PIXY_AUTH_IT_ORDER_PRIMARY", "PIXY_AUTH_IT_ORDER_SECONDARY"],
        None,
    )
    .expect("secondary variable is set");
    assert_eq!(
        resolved,
        ResolvedAuth::ApiKey {
            api_key: "secondary-key".to_string(),
            source: AuthSource::Env {
                var: "PIXY_AUTH_IT_ORDER_SECONDARY".to_string()
            },
        }
    );
}

#[test]
fn conventional_variable_is_the_last_resort() {
    let provider = "pixy-auth-it-conv";
    std::env::set_var(conventional_env_var(provider), "conventional-key");

    let resolved =
        resolve_auth(provider, &["PIXY_AUTH_IT_CONV_UNSET"], None).expect("conventional name");
    assert_eq!(resolved.api_key(), Some("conventional-key"));
    assert_eq!(
        resolved.source(),
        Some(&AuthSource::Env {
            var: "PIXY_AUTH_IT_CONV_API_KEY".to_string()
        })
    );
}

#[test]
fn nothing_found_is_absent_not_an_error() {
    let resolved = resolve_auth::<&str>("pixy-auth-it-missing", &[], None);
    assert_eq!(resolved, None);
}

#[test]
fn explicit_option_key_beats_the_environment() {
    std::env::set_var("PIXY_AUTH_IT_EXPLICIT_KEY", "from-env");
    let connector = keyed_connector("pixy-auth-it-explicit", &["PIXY_AUTH_IT_EXPLICIT_KEY"]);

    let resolved = connector
        .require_auth(&StreamOptions::default().with_api_key("from-caller"))
        .expect("explicit key");
    assert_eq!(resolved.api_key(), Some("from-caller"));
    assert_eq!(resolved.source(), Some(&AuthSource::Explicit));

    let resolved = connector
        .require_auth(&StreamOptions::default())
        .expect("env key");
    assert_eq!(resolved.api_key(), Some("from-env"));
}

#[test]
fn required_connector_without_credential_fails_with_credential_not_found() {
    let connector = keyed_connector("pixy-auth-it-required", &["PIXY_AUTH_IT_REQUIRED_UNSET"]);
    assert_eq!(connector.auth, AuthRequirement::Required);

    let error = connector
        .require_auth(&StreamOptions::default())
        .expect_err("no credential anywhere");
    assert_eq!(error.code, ConnectErrorCode::CredentialNotFound);
    assert!(error.message.contains("PIXY_AUTH_IT_REQUIRED_UNSET"));
}

#[test]
fn keyless_connector_reports_none() {
    let resolved = debug_connector()
        .require_auth(&StreamOptions::default())
        .expect("debug needs no key");
    assert_eq!(resolved, ResolvedAuth::None);
    assert_eq!(resolved.mode(), "none");
    assert_eq!(resolved.secret(), None);
}

#[test]
fn config_file_key_can_reference_the_environment() {
    std::env::set_var("PIXY_AUTH_IT_FILE_SECRET", "file-secret");
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("connect.toml");
    fs::write(
        &path,
        r#"
[providers.pixy-auth-it-file]
api_key = "$PIXY_AUTH_IT_FILE_SECRET"
"#,
    )
    .expect("write config");

    let config = ConnectConfig::load(&path)
        .expect("config parses")
        .expect("config exists");
    let connector = keyed_connector("pixy-auth-it-file", &[]);

    let resolved = config.resolve_auth(&connector, None).expect("config key");
    assert_eq!(resolved.api_key(), Some("file-secret"));
    assert_eq!(resolved.source(), Some(&AuthSource::Config));

    let resolved = config
        .resolve_auth(&connector, Some("per-call"))
        .expect("explicit key");
    assert_eq!(resolved.source(), Some(&AuthSource::Explicit));
}

#[test]
fn resolved_auth_serializes_with_mode_tag() {
    let resolved = ResolvedAuth::ApiKey {
        api_key: "k".to_string(),
        source: AuthSource::Env {
            var: "X_API_KEY".to_string(),
        },
    };
    assert_eq!(
        serde_json::to_value(&resolved).expect("serialize"),
        serde_json::json!({
            "mode": "api-key",
            "apiKey": "k",
            "source": { "env": { "var": "X_API_KEY" } }
        })
    );
}
