//! Plugin registration shapes.
//!
//! A plugin module exposes its connectors in one of three ways: it is a
//! registration function itself, or it carries a `register` hook, or an
//! `activate` hook. [`PluginModule::into_entry`] picks one, in that order,
//! and the chosen [`PluginEntry`] is what gets installed.

use std::fmt;
use std::sync::Arc;

use serde_json::json;
use tracing::{debug, warn};

use crate::connector::Connector;
use crate::error::{ConnectError, ConnectErrorCode};
use crate::registry::{ConnectorRef, ConnectorRegistry};

pub type PluginFn = Arc<dyn Fn(&mut PluginContext<'_>) -> Result<(), ConnectError> + Send + Sync>;

/// Handed to a plugin hook while it is being installed.
pub struct PluginContext<'a> {
    plugin: &'a str,
    registry: &'a mut ConnectorRegistry,
    // Registry as it was before the hook ran, restored on failure.
    snapshot: ConnectorRegistry,
    installed: Vec<String>,
}

impl<'a> PluginContext<'a> {
    fn new(plugin: &'a str, registry: &'a mut ConnectorRegistry) -> Self {
        Self {
            plugin,
            snapshot: registry.clone(),
            registry,
            installed: Vec::new(),
        }
    }

    pub fn plugin_name(&self) -> &str {
        self.plugin
    }

    pub fn register_connector(&mut self, connector: impl Into<ConnectorRef>) {
        let connector = connector.into();
        let id = connector.id.clone();
        self.registry.register(connector);
        if !self.installed.contains(&id) {
            self.installed.push(id);
        }
    }

    pub fn has_connector(&self, id: &str) -> bool {
        self.registry.has(id)
    }

    fn installed_ids(&self) -> Vec<String> {
        self.installed.clone()
    }

    // Indexes and registration order come back exactly, including which
    // connector a provider lookup resolves to.
    fn roll_back(self) {
        *self.registry = self.snapshot;
    }
}

#[derive(Clone)]
pub enum PluginEntry {
    /// The module itself is the registration function.
    Function(PluginFn),
    Register(PluginFn),
    Activate(PluginFn),
}

impl PluginEntry {
    pub fn kind(&self) -> &'static str {
        match self {
            PluginEntry::Function(_) => "function",
            PluginEntry::Register(_) => "register",
            PluginEntry::Activate(_) => "activate",
        }
    }

    /// Runs the hook against `registry` and returns the ids it registered.
    /// A failing hook leaves the registry as it found it.
    pub fn install(
        &self,
        plugin: &str,
        registry: &mut ConnectorRegistry,
    ) -> Result<Vec<String>, ConnectError> {
        let hook = match self {
            PluginEntry::Function(hook)
            | PluginEntry::Register(hook)
            | PluginEntry::Activate(hook) => hook,
        };

        let mut context = PluginContext::new(plugin, registry);
        match hook(&mut context) {
            Ok(()) => {
                let ids = context.installed_ids();
                debug!(plugin, entry = self.kind(), connectors = ?ids, "installed plugin");
                Ok(ids)
            }
            Err(error) => {
                warn!(plugin, entry = self.kind(), error = %error, "plugin install failed");
                context.roll_back();
                Err(error)
            }
        }
    }
}

impl fmt::Debug for PluginEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PluginEntry::{}", self.kind())
    }
}

/// What a loaded plugin module exposes, before an entry is chosen.
#[derive(Clone, Default)]
pub struct PluginModule {
    pub name: String,
    pub function: Option<PluginFn>,
    pub register: Option<PluginFn>,
    pub activate: Option<PluginFn>,
}

impl PluginModule {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_function<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut PluginContext<'_>) -> Result<(), ConnectError> + Send + Sync + 'static,
    {
        self.function = Some(Arc::new(hook));
        self
    }

    pub fn with_register<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut PluginContext<'_>) -> Result<(), ConnectError> + Send + Sync + 'static,
    {
        self.register = Some(Arc::new(hook));
        self
    }

    pub fn with_activate<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut PluginContext<'_>) -> Result<(), ConnectError> + Send + Sync + 'static,
    {
        self.activate = Some(Arc::new(hook));
        self
    }

    /// Chooses the entry: `function`, then `register`, then `activate`.
    pub fn into_entry(self) -> Result<PluginEntry, ConnectError> {
        if let Some(hook) = self.function {
            return Ok(PluginEntry::Function(hook));
        }
        if let Some(hook) = self.register {
            return Ok(PluginEntry::Register(hook));
        }
        if let Some(hook) = self.activate {
            return Ok(PluginEntry::Activate(hook));
        }
        Err(ConnectError::new(
            ConnectErrorCode::PluginInvalid,
            format!(
                "Plugin '{}' exposes no registration function, register hook or activate hook",
                self.name
            ),
        )
        .with_details(json!({ "plugin": self.name })))
    }
}

impl fmt::Debug for PluginModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginModule")
            .field("name", &self.name)
            .field("function", &self.function.is_some())
            .field("register", &self.register.is_some())
            .field("activate", &self.activate.is_some())
            .finish()
    }
}

/// Resolves `module` and installs it into `registry`.
pub fn install_plugin(
    module: PluginModule,
    registry: &mut ConnectorRegistry,
) -> Result<Vec<String>, ConnectError> {
    let name = module.name.clone();
    module.into_entry()?.install(&name, registry)
}

/// Convenience for plugins that only contribute connectors.
pub fn connectors_plugin(name: impl Into<String>, connectors: Vec<Connector>) -> PluginModule {
    let connectors = connectors.into_iter().map(Arc::new).collect::<Vec<_>>();
    PluginModule::new(name).with_function(move |context| {
        for connector in &connectors {
            context.register_connector(connector.clone());
        }
        Ok(())
    })
}
