use std::sync::{Arc, RwLock};

use pixy_connect::{
    collect_events, complete, connectors_plugin, debug_connector, debug_model, from_events,
    install_plugin, register_builtin_connectors, resolve_connector, stream, ConnectErrorCode,
    Connector, ConnectorRegistry, Context, Cost, Message, Model, StopReason, StreamEvent,
    StreamOptions, DEBUG_CONNECTOR_ID,
};
use serde_json::Map;

fn sample_model(provider: &str, api: &str) -> Model {
    Model {
        id: "test-model".to_string(),
        name: Some("Test Model".to_string()),
        api: api.to_string(),
        provider: provider.to_string(),
        base_url: None,
        reasoning: false,
        input: vec![],
        cost: Cost::default(),
        context_window: 128_000,
        max_tokens: 8_192,
        headers: None,
        compat: Map::new(),
    }
}

fn sample_context() -> Context {
    Context {
        system_prompt: Some("You are a test assistant.".to_string()),
        messages: vec![Message::user("hi")],
        tools: None,
    }
}

fn text_connector(id: &str, provider: &str, api: &str, reply: &'static str) -> Connector {
    Connector::from_fn(id, provider, api, move |_, _, _| {
        Box::pin(async move {
            Ok(from_events(vec![
                StreamEvent::Start,
                StreamEvent::TextDelta {
                    delta: reply.to_string(),
                },
                StreamEvent::Done {
                    stop_reason: StopReason::Stop,
                    usage: None,
                },
            ]))
        })
    })
}

fn ids(connectors: &[Arc<Connector>]) -> Vec<String> {
    connectors
        .iter()
        .map(|connector| connector.id.clone())
        .collect()
}

#[test]
fn same_provider_registrations_are_last_write_wins() {
    let mut registry = ConnectorRegistry::new();
    registry.register(text_connector("c1", "p", "t1", "one"));
    registry.register(text_connector("c2", "p", "t2", "two"));

    assert_eq!(
        registry.get_by_provider("p").map(|c| c.id.clone()),
        Some("c2".to_string())
    );
    assert_eq!(ids(&registry.get_by_api("t1")), vec!["c1".to_string()]);
    assert_eq!(registry.list().len(), 2);
    assert!(registry.get("c1").is_some());
    assert_eq!(registry.list_providers(), vec!["p".to_string()]);
}

#[test]
fn overwriting_an_id_scrubs_old_provider_and_api_indices() {
    let mut registry = ConnectorRegistry::new();
    registry.register(text_connector("c1", "old-provider", "old-api", "one"));
    let replaced = registry.register(text_connector("c1", "new-provider", "new-api", "two"));

    assert_eq!(replaced.map(|c| c.provider.clone()), Some("old-provider".to_string()));
    assert!(registry.get_by_api("old-api").is_empty());
    assert!(registry.get_by_provider("old-provider").is_none());
    assert_eq!(ids(&registry.get_by_api("new-api")), vec!["c1".to_string()]);
    assert_eq!(registry.len(), 1);
}

#[test]
fn unregister_and_clear_tolerate_missing_ids() {
    let mut registry = ConnectorRegistry::new();
    assert!(!registry.unregister("missing"));
    assert!(registry.get("missing").is_none());
    assert!(registry.get_by_api("missing").is_empty());

    registry.register(text_connector("c1", "p", "t1", "one"));
    assert!(registry.unregister("c1"));
    assert!(registry.get_by_provider("p").is_none());
    assert!(registry.get_by_api("t1").is_empty());
    assert!(registry.is_empty());

    registry.register(text_connector("c1", "p", "t1", "one"));
    registry.clear();
    assert!(!registry.has("c1"));
    assert!(registry.list_providers().is_empty());
}

#[tokio::test]
async fn stream_and_complete_use_the_provider_connector() {
    let mut registry = ConnectorRegistry::new();
    registry.register(text_connector("c1", "p", "t1", "from-c1"));
    registry.register(text_connector("c2", "p", "t1", "from-c2"));

    let events = collect_events(
        stream(
            &registry,
            sample_model("p", "t1"),
            sample_context(),
            StreamOptions::default(),
        )
        .await
        .expect("stream resolves"),
    )
    .await
    .expect("stream completes");
    assert_eq!(
        events[1],
        StreamEvent::TextDelta {
            delta: "from-c2".to_string()
        }
    );

    let outcome = complete(
        &registry,
        sample_model("p", "t1"),
        sample_context(),
        StreamOptions::default(),
    )
    .await
    .expect("complete succeeds");
    assert_eq!(outcome.text, "from-c2");
    assert_eq!(outcome.stop_reason(), Some(StopReason::Stop));
}

#[test]
fn resolve_connector_falls_back_to_api_then_fails() {
    let mut registry = ConnectorRegistry::new();
    registry.register(text_connector("c1", "p", "t1", "one"));

    let fallback = resolve_connector(&registry, &sample_model("other", "t1")).expect("api match");
    assert_eq!(fallback.id, "c1");

    let error = resolve_connector(&registry, &sample_model("p", "t2")).expect_err("no match");
    assert_eq!(error.code, ConnectErrorCode::ConnectorNotFound);
}

#[test]
fn builtins_register_debug_and_skip_anthropic_without_transport() {
    let mut registry = ConnectorRegistry::new();
    register_builtin_connectors(&mut registry, None);

    assert!(registry.has(DEBUG_CONNECTOR_ID));
    assert!(registry.get_by_provider("anthropic").is_none());
    let debug = registry.get(DEBUG_CONNECTOR_ID).expect("debug connector");
    assert_eq!(debug.model(&debug_model().id), Some(&debug_model()));
}

#[test]
fn plugins_register_connectors_through_their_entry() {
    let mut registry = ConnectorRegistry::new();
    let plugin = connectors_plugin(
        "acme-plugin",
        vec![
            text_connector("acme-chat", "acme", "acme-v1", "hello"),
            debug_connector(),
        ],
    );

    let installed = install_plugin(plugin, &mut registry).expect("plugin installs");
    assert_eq!(installed, vec!["acme-chat".to_string(), DEBUG_CONNECTOR_ID.to_string()]);
    assert_eq!(registry.list_providers(), vec!["acme".to_string(), "debug".to_string()]);
}

#[tokio::test]
async fn registry_can_be_shared_behind_a_lock() {
    let registry = Arc::new(RwLock::new(ConnectorRegistry::new()));
    let writer = Arc::clone(&registry);
    tokio::task::spawn_blocking(move || {
        writer
            .write()
            .expect("registry lock")
            .register(text_connector("c1", "p", "t1", "shared"));
    })
    .await
    .expect("writer task");

    let connector = registry
        .read()
        .expect("registry lock")
        .get_by_provider("p")
        .expect("registered by writer");
    let events = collect_events(
        connector
            .stream(sample_model("p", "t1"), sample_context(), StreamOptions::default())
            .await
            .expect("stream resolves"),
    )
    .await
    .expect("stream completes");
    assert_eq!(events.len(), 3);
}
