// ABOUTME: Module contract and the dependency-ordered activation plan for a batch
// ABOUTME: Requirements resolve against the batch first, then against already-active modules

use crate::client::Client;
use crate::error::{EventError, ModuleError};
use crate::events::{EventListener, EventOrder};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Static description of a module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleDescriptor {
    /// Unique name; also the event group the module registers under
    pub name: String,
    /// Modules that must be active before this one loads
    pub requires: Vec<String>,
    pub description: Option<String>,
}

impl ModuleDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            requires: Vec::new(),
            description: None,
        }
    }

    pub fn requires(mut self, module: impl Into<String>) -> Self {
        self.requires.push(module.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// A unit of bot functionality that registers listeners, commands and
/// permissions when it is activated.
///
/// Listeners registered through [`Module::register_event`] live in the
/// module's own event group, so unloading the module retracts them.
#[async_trait]
pub trait Module: Send + Sync {
    fn descriptor(&self) -> &ModuleDescriptor;

    fn name(&self) -> &str {
        &self.descriptor().name
    }

    /// Listen for `event` under this module's group
    fn register_event(
        &self,
        client: &Client,
        event: &str,
        listener: Arc<dyn EventListener>,
        order: EventOrder,
    ) -> Result<(), EventError> {
        client.events().register(self.name(), event, listener, order)
    }

    fn unregister_event(&self, client: &Client, event: &str) -> bool {
        client.events().unregister(self.name(), event)
    }

    /// Drop every listener this module registered
    fn unregister_all_events(&self, client: &Client) -> bool {
        client.events().unregister_group(self.name())
    }

    async fn load(&self, client: &Client) -> Result<()>;

    async fn unload(&self, _client: &Client) -> Result<()> {
        Ok(())
    }
}

struct Planner<'a> {
    batch: &'a [&'a ModuleDescriptor],
    index: HashMap<&'a str, usize>,
    is_active: &'a dyn Fn(&str) -> bool,
    placed: Vec<bool>,
    stack: Vec<usize>,
    order: Vec<usize>,
}

impl Planner<'_> {
    fn visit(&mut self, idx: usize) -> Result<(), ModuleError> {
        if self.placed[idx] {
            return Ok(());
        }
        if let Some(pos) = self.stack.iter().position(|&i| i == idx) {
            let mut path: Vec<String> = self.stack[pos..]
                .iter()
                .map(|&i| self.batch[i].name.clone())
                .collect();
            path.push(self.batch[idx].name.clone());
            return Err(ModuleError::DependencyCycle(path));
        }

        self.stack.push(idx);
        let module = self.batch[idx];
        for dependency in &module.requires {
            match self.index.get(dependency.as_str()) {
                Some(&dep) => self.visit(dep)?,
                None if (self.is_active)(dependency) => {}
                None => {
                    return Err(ModuleError::MissingDependency {
                        module: module.name.clone(),
                        dependency: dependency.clone(),
                    })
                }
            }
        }
        self.stack.pop();

        self.placed[idx] = true;
        self.order.push(idx);
        Ok(())
    }
}

/// Compute the activation order for `batch` as indices into it.
///
/// Every module appears after the batch members it requires; batch order is
/// kept otherwise. Fails if a name is empty, a module is already active or
/// appears twice, a requirement is neither in the batch nor active, or the
/// requirements form a cycle.
pub fn resolve_load_order(
    batch: &[&ModuleDescriptor],
    is_active: impl Fn(&str) -> bool,
) -> Result<Vec<usize>, ModuleError> {
    let mut index = HashMap::with_capacity(batch.len());
    for (i, module) in batch.iter().enumerate() {
        if module.name.trim().is_empty() {
            return Err(ModuleError::InvalidName);
        }
        if is_active(&module.name) || index.insert(module.name.as_str(), i).is_some() {
            return Err(ModuleError::Duplicate(module.name.clone()));
        }
    }

    let mut planner = Planner {
        batch,
        index,
        is_active: &is_active,
        placed: vec![false; batch.len()],
        stack: Vec::new(),
        order: Vec::with_capacity(batch.len()),
    };
    for idx in 0..batch.len() {
        planner.visit(idx)?;
    }
    Ok(planner.order)
}
