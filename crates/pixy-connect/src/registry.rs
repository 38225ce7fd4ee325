use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::connector::Connector;

pub type ConnectorRef = Arc<Connector>;

/// In-memory connector catalog indexed by id, provider and api.
///
/// The provider index is last-write-wins: [`ConnectorRegistry::get_by_provider`]
/// returns the most recently registered connector for a provider. The api
/// index keeps every connector sharing a transport, in registration order.
///
/// Mutation takes `&mut self`; share an instance across threads behind a
/// lock of the caller's choosing.
#[derive(Debug, Clone, Default)]
pub struct ConnectorRegistry {
    connectors: HashMap<String, ConnectorRef>,
    order: Vec<String>,
    by_provider: HashMap<String, String>,
    by_api: HashMap<String, Vec<String>>,
}

impl ConnectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `connector`, replacing any connector with the same id.
    /// Returns the replaced connector.
    pub fn register(&mut self, connector: impl Into<ConnectorRef>) -> Option<ConnectorRef> {
        let connector = connector.into();
        let id = connector.id.clone();
        let replaced = self.remove_entry(&id);

        self.by_provider.insert(connector.provider.clone(), id.clone());
        self.by_api
            .entry(connector.api.clone())
            .or_default()
            .push(id.clone());
        self.order.push(id.clone());
        debug!(
            connector = %id,
            provider = %connector.provider,
            api = %connector.api,
            replaced = replaced.is_some(),
            "registered connector"
        );
        self.connectors.insert(id, connector);
        replaced
    }

    pub fn register_all<I>(&mut self, connectors: I)
    where
        I: IntoIterator,
        I::Item: Into<ConnectorRef>,
    {
        for connector in connectors {
            self.register(connector);
        }
    }

    pub fn unregister(&mut self, id: &str) -> bool {
        let removed = self.remove_entry(id).is_some();
        if removed {
            debug!(connector = %id, "unregistered connector");
        }
        removed
    }

    pub fn get(&self, id: &str) -> Option<ConnectorRef> {
        self.connectors.get(id).cloned()
    }

    pub fn get_by_provider(&self, provider: &str) -> Option<ConnectorRef> {
        self.by_provider
            .get(provider)
            .and_then(|id| self.connectors.get(id))
            .cloned()
    }

    pub fn get_by_api(&self, api: &str) -> Vec<ConnectorRef> {
        self.by_api
            .get(api)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.connectors.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// All connectors in registration order.
    pub fn list(&self) -> Vec<ConnectorRef> {
        self.order
            .iter()
            .filter_map(|id| self.connectors.get(id).cloned())
            .collect()
    }

    /// Providers reachable through [`ConnectorRegistry::get_by_provider`],
    /// ordered by when their current connector was registered.
    pub fn list_providers(&self) -> Vec<String> {
        self.order
            .iter()
            .filter_map(|id| self.connectors.get(id))
            .filter(|connector| self.by_provider.get(&connector.provider) == Some(&connector.id))
            .map(|connector| connector.provider.clone())
            .collect()
    }

    pub fn has(&self, id: &str) -> bool {
        self.connectors.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.connectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connectors.is_empty()
    }

    pub fn clear(&mut self) {
        self.connectors.clear();
        self.order.clear();
        self.by_provider.clear();
        self.by_api.clear();
        debug!("cleared connector registry");
    }

    // Drops `id` from every index. A provider entry that pointed at it falls
    // back to the newest remaining connector for that provider.
    fn remove_entry(&mut self, id: &str) -> Option<ConnectorRef> {
        let removed = self.connectors.remove(id)?;
        self.order.retain(|existing| existing != id);

        if let Some(ids) = self.by_api.get_mut(&removed.api) {
            ids.retain(|existing| existing != id);
            if ids.is_empty() {
                self.by_api.remove(&removed.api);
            }
        }

        if self.by_provider.get(&removed.provider).map(String::as_str) == Some(id) {
            let fallback = self
                .order
                .iter()
                .rev()
                .find(|candidate| {
                    self.connectors
                        .get(*candidate)
                        .is_some_and(|connector| connector.provider == removed.provider)
                })
                .cloned();
            match fallback {
                Some(fallback) => {
                    self.by_provider.insert(removed.provider.clone(), fallback);
                }
                None => {
                    self.by_provider.remove(&removed.provider);
                }
            }
        }

        Some(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_stream::from_events;

    fn connector(id: &str, provider: &str, api: &str) -> Connector {
        Connector::from_fn(id, provider, api, |_, _, _| {
            Box::pin(async { Ok(from_events(vec![])) })
        })
    }

    #[test]
    fn unregistering_latest_provider_entry_falls_back_to_previous() {
        let mut registry = ConnectorRegistry::new();
        registry.register(connector("a", "p", "t"));
        registry.register(connector("b", "p", "t"));

        assert!(registry.unregister("b"));
        assert_eq!(
            registry.get_by_provider("p").map(|c| c.id.clone()),
            Some("a".to_string())
        );
        assert!(!registry.unregister("b"));
    }

    #[test]
    fn re_registering_moves_connector_to_end_of_order() {
        let mut registry = ConnectorRegistry::new();
        registry.register(connector("a", "p1", "t"));
        registry.register(connector("b", "p2", "t"));
        let replaced = registry.register(connector("a", "p1", "t"));

        assert!(replaced.is_some());
        let ids = registry
            .get_by_api("t")
            .iter()
            .map(|c| c.id.clone())
            .collect::<Vec<_>>();
        assert_eq!(ids, vec!["b".to_string(), "a".to_string()]);
        assert_eq!(registry.list_providers(), vec!["p2".to_string(), "p1".to_string()]);
    }

    #[test]
    fn list_providers_skips_shadowed_duplicates() {
        let mut registry = ConnectorRegistry::new();
        registry.register(connector("a", "p", "t1"));
        registry.register(connector("b", "q", "t1"));
        registry.register(connector("c", "p", "t2"));

        assert_eq!(registry.list_providers(), vec!["q".to_string(), "p".to_string()]);
    }
}
