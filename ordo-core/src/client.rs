// ABOUTME: Client facade wiring the registries, the dispatcher and the module table together
// ABOUTME: Loads modules in dependency order and brackets platform connect/disconnect with events

use crate::collector::MessageCollector;
use crate::commands::{CommandDispatcher, CommandRegistry, CommandsModule};
use crate::config::ClientConfig;
use crate::error::ModuleError;
use crate::events::{names, EventPayload, EventRegistry};
use crate::metrics;
use crate::module::{resolve_load_order, Module, ModuleDescriptor};
use crate::permissions::PermissionRegistry;
use crate::throttle::{MemoryThrottleStore, ThrottleStore};
use crate::traits::{ChatPlatform, EventSource};
use anyhow::Result;
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::{Arc, Weak};

#[derive(Default)]
struct ModuleTable {
    active: IndexMap<String, Arc<dyn Module>>,
    /// Names whose load or unload hook is running
    pending: HashSet<String>,
}

impl ModuleTable {
    fn is_claimed(&self, name: &str) -> bool {
        self.active.contains_key(name) || self.pending.contains(name)
    }
}

struct ClientInner {
    platform: Arc<dyn ChatPlatform>,
    config: Arc<ClientConfig>,
    events: EventRegistry,
    permissions: PermissionRegistry,
    commands: CommandRegistry,
    throttles: Arc<dyn ThrottleStore>,
    // Never held across a module hook, so hooks may load or unload modules
    modules: RwLock<ModuleTable>,
}

/// Handle to a running bot client. Cloning shares the same client.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

/// Non-owning handle, for things the client itself holds (such as commands)
#[derive(Clone)]
pub struct WeakClient {
    inner: Weak<ClientInner>,
}

impl WeakClient {
    pub fn upgrade(&self) -> Option<Client> {
        self.inner.upgrade().map(|inner| Client { inner })
    }
}

pub struct ClientBuilder {
    platform: Arc<dyn ChatPlatform>,
    config: ClientConfig,
    source: Option<Arc<dyn EventSource>>,
    throttles: Option<Arc<dyn ThrottleStore>>,
}

impl ClientBuilder {
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Upstream feed; it is subscribed once per event that gains a listener
    pub fn event_source(mut self, source: Arc<dyn EventSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Defaults to an in-memory store
    pub fn throttle_store(mut self, store: Arc<dyn ThrottleStore>) -> Self {
        self.throttles = Some(store);
        self
    }

    /// Create the registries and attach the built-in commands module
    pub fn build(self) -> Result<Client> {
        let config = Arc::new(self.config);
        let events = match self.source {
            Some(source) => EventRegistry::with_source(source),
            None => EventRegistry::new(),
        };
        let permissions = PermissionRegistry::new(config.elevated.clone());
        let commands = CommandRegistry::new();
        let throttles = self
            .throttles
            .unwrap_or_else(|| Arc::new(MemoryThrottleStore::new()));

        let dispatcher = Arc::new(CommandDispatcher::new(
            commands.clone(),
            permissions.clone(),
            throttles.clone(),
            self.platform.clone(),
            config.clone(),
        ));

        let client = Client {
            inner: Arc::new(ClientInner {
                platform: self.platform,
                config,
                events,
                permissions,
                commands,
                throttles,
                modules: RwLock::new(ModuleTable::default()),
            }),
        };

        let commands_module = CommandsModule::new(dispatcher);
        commands_module.attach(&client)?;
        let module: Arc<dyn Module> = Arc::new(commands_module);
        client
            .inner
            .modules
            .write()
            .active
            .insert(module.name().to_string(), module);

        Ok(client)
    }
}

impl Client {
    pub fn builder(platform: Arc<dyn ChatPlatform>) -> ClientBuilder {
        ClientBuilder {
            platform,
            config: ClientConfig::default(),
            source: None,
            throttles: None,
        }
    }

    pub fn downgrade(&self) -> WeakClient {
        WeakClient {
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn events(&self) -> &EventRegistry {
        &self.inner.events
    }

    pub fn permissions(&self) -> &PermissionRegistry {
        &self.inner.permissions
    }

    pub fn commands(&self) -> &CommandRegistry {
        &self.inner.commands
    }

    pub fn throttles(&self) -> &Arc<dyn ThrottleStore> {
        &self.inner.throttles
    }

    pub fn platform(&self) -> &Arc<dyn ChatPlatform> {
        &self.inner.platform
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn collector(&self) -> MessageCollector {
        MessageCollector::new(self.inner.events.clone())
    }

    /// Names of active modules in activation order
    pub fn module_names(&self) -> Vec<String> {
        self.inner.modules.read().active.keys().cloned().collect()
    }

    pub fn module_descriptors(&self) -> Vec<ModuleDescriptor> {
        self.inner
            .modules
            .read()
            .active
            .values()
            .map(|m| m.descriptor().clone())
            .collect()
    }

    pub fn has_module(&self, name: &str) -> bool {
        self.inner.modules.read().active.contains_key(name)
    }

    /// Activate a batch of modules, requirements first.
    ///
    /// Nothing is activated if the batch cannot be ordered. Batch names are
    /// reserved before any hook runs: they count as taken for concurrent
    /// batches and as satisfied for modules loaded from inside a hook. If a
    /// load hook fails, that module's listeners are removed and activation
    /// stops; modules activated before it stay active.
    pub async fn load_modules(&self, batch: Vec<Arc<dyn Module>>) -> Result<(), ModuleError> {
        let order = {
            let mut table = self.inner.modules.write();
            let descriptors: Vec<&ModuleDescriptor> = batch.iter().map(|m| m.descriptor()).collect();
            let order = resolve_load_order(&descriptors, |name| table.is_claimed(name))?;
            table
                .pending
                .extend(batch.iter().map(|m| m.name().to_string()));
            order
        };

        for (position, &idx) in order.iter().enumerate() {
            let module = batch[idx].clone();
            let name = module.name().to_string();
            tracing::debug!(module = %name, "Loading module");

            if let Err(source) = module.load(self).await {
                module.unregister_all_events(self);
                let mut table = self.inner.modules.write();
                for &rest in &order[position..] {
                    table.pending.remove(batch[rest].name());
                }
                drop(table);
                tracing::error!(module = %name, error = %source, "Module failed to load");
                return Err(ModuleError::LoadFailed { name, source });
            }

            {
                let mut table = self.inner.modules.write();
                table.pending.remove(&name);
                table.active.insert(name.clone(), module);
            }
            metrics::record_module_loaded(&name);
            tracing::info!(module = %name, "Loaded module");
        }
        Ok(())
    }

    pub async fn load_module(&self, module: Arc<dyn Module>) -> Result<(), ModuleError> {
        self.load_modules(vec![module]).await
    }

    /// Deactivate a module and remove its listeners. Returns false if no
    /// module by that name is active or it is already being unloaded.
    pub async fn unload_module(&self, name: &str) -> bool {
        let (module, dependents) = {
            let mut table = self.inner.modules.write();
            if table.pending.contains(name) {
                return false;
            }
            let Some(module) = table.active.get(name).cloned() else {
                return false;
            };
            let dependents: Vec<String> = table
                .active
                .values()
                .filter(|m| m.descriptor().requires.iter().any(|r| r == name))
                .map(|m| m.name().to_string())
                .collect();
            table.pending.insert(name.to_string());
            (module, dependents)
        };
        if !dependents.is_empty() {
            tracing::warn!(module = %name, ?dependents, "Unloading a module other modules require");
        }

        tracing::debug!(module = %name, "Unloading module");
        if let Err(e) = module.unload(self).await {
            tracing::warn!(module = %name, error = %e, "Module unload hook failed");
        }
        module.unregister_all_events(self);
        {
            let mut table = self.inner.modules.write();
            table.active.shift_remove(name);
            table.pending.remove(name);
        }
        tracing::info!(module = %name, "Unloaded module");
        true
    }

    /// Connect the platform, firing `beforeConnect` and `afterConnect` around it
    pub async fn connect(&self) -> Result<()> {
        self.inner
            .events
            .emit_async(names::BEFORE_CONNECT, EventPayload::Empty)
            .await;
        self.inner.platform.connect().await?;
        self.inner
            .events
            .emit_async(names::AFTER_CONNECT, EventPayload::Empty)
            .await;
        Ok(())
    }

    /// Shut the platform down, firing `beforeDisconnect` and `afterDisconnect` around it
    pub async fn disconnect(&self) -> Result<()> {
        self.inner
            .events
            .emit_async(names::BEFORE_DISCONNECT, EventPayload::Empty)
            .await;
        self.inner.platform.shutdown().await?;
        self.inner
            .events
            .emit_async(names::AFTER_DISCONNECT, EventPayload::Empty)
            .await;
        Ok(())
    }
}
