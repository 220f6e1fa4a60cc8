// ABOUTME: Name and alias lookup table for registered commands
// ABOUTME: Names match exactly and must not collide with another command's names or aliases

use super::{Command, CommandContext};
use crate::error::CommandError;
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct CommandRegistry {
    commands: Arc<RwLock<IndexMap<String, Arc<dyn Command>>>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, command: Arc<dyn Command>) -> Result<(), CommandError> {
        let mut commands = self.commands.write();
        Self::check(&commands, command.as_ref(), None)?;
        let name = command.name().to_string();
        tracing::debug!(command = %name, "Registering command");
        commands.insert(name, command);
        Ok(())
    }

    /// Replace the command registered as `old_name`; the name must not change.
    pub fn reregister(&self, old_name: &str, command: Arc<dyn Command>) -> Result<(), CommandError> {
        let old = old_name.to_string();
        let new = command.name().to_string();
        if old != new {
            return Err(CommandError::NameChanged { old, new });
        }

        let mut commands = self.commands.write();
        if !commands.contains_key(&old) {
            return Err(CommandError::NotRegistered(old));
        }
        Self::check(&commands, command.as_ref(), Some(&old))?;
        tracing::debug!(command = %new, "Reregistering command");
        commands.insert(new, command);
        Ok(())
    }

    /// Remove a command by its primary name. Returns it if it existed.
    pub fn unregister(&self, name: &str) -> Option<Arc<dyn Command>> {
        let removed = self.commands.write().shift_remove(name);
        if removed.is_some() {
            tracing::debug!(command = %name, "Unregistered command");
        }
        removed
    }

    /// Look up a command by name or alias
    pub fn get(&self, name: &str) -> Option<Arc<dyn Command>> {
        if name.is_empty() {
            return None;
        }
        let commands = self.commands.read();
        if let Some(command) = commands.get(name) {
            return Some(command.clone());
        }
        commands
            .values()
            .find(|c| c.options().aliases.iter().any(|a| a == name))
            .cloned()
    }

    /// Commands whose name or alias is exactly `query`
    pub fn find(&self, query: &str) -> Vec<Arc<dyn Command>> {
        self.commands
            .read()
            .values()
            .filter(|c| c.options().all_names().any(|n| n == query))
            .cloned()
            .collect()
    }

    /// Commands the author of `ctx` holds every user permission for
    pub fn usable_by(&self, ctx: &CommandContext) -> Vec<Arc<dyn Command>> {
        self.all()
            .into_iter()
            .filter(|c| {
                c.options()
                    .user_permissions
                    .iter()
                    .all(|p| ctx.has_permission(p))
            })
            .collect()
    }

    pub fn all(&self) -> Vec<Arc<dyn Command>> {
        self.commands.read().values().cloned().collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.commands.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.commands.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.read().is_empty()
    }

    fn check(
        commands: &IndexMap<String, Arc<dyn Command>>,
        command: &dyn Command,
        replacing: Option<&str>,
    ) -> Result<(), CommandError> {
        let options = command.options();
        if options.name.trim().is_empty() || options.aliases.iter().any(|a| a.trim().is_empty()) {
            return Err(CommandError::InvalidName);
        }

        for name in options.all_names() {
            for (existing_name, existing) in commands.iter() {
                if Some(existing_name.as_str()) == replacing {
                    continue;
                }
                if existing.options().all_names().any(|n| n == name) {
                    return Err(CommandError::Conflict {
                        name: name.to_string(),
                        existing: existing_name.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{CommandOptions, CommandOutput};
    use anyhow::Result;
    use async_trait::async_trait;

    struct Stub(CommandOptions);

    #[async_trait]
    impl Command for Stub {
        fn options(&self) -> &CommandOptions {
            &self.0
        }

        async fn run(&self, _ctx: &CommandContext) -> Result<CommandOutput> {
            Ok(CommandOutput::Empty)
        }
    }

    fn stub(options: CommandOptions) -> Arc<dyn Command> {
        Arc::new(Stub(options))
    }

    #[test]
    fn test_get_by_name_and_alias() {
        let registry = CommandRegistry::new();
        registry
            .register(stub(CommandOptions::new("ping").alias("p")))
            .unwrap();

        assert_eq!(registry.get("ping").unwrap().name(), "ping");
        assert_eq!(registry.get("p").unwrap().name(), "ping");
        assert!(registry.get("PING").is_none());
        assert!(registry.get("pong").is_none());
        assert!(registry.get("").is_none());
        assert_eq!(registry.names(), vec!["ping"]);
    }

    #[test]
    fn test_conflicting_names_rejected() {
        let registry = CommandRegistry::new();
        registry
            .register(stub(CommandOptions::new("ping").alias("p")))
            .unwrap();

        let err = registry.register(stub(CommandOptions::new("ping"))).unwrap_err();
        assert!(matches!(err, CommandError::Conflict { ref existing, .. } if existing == "ping"));

        let err = registry
            .register(stub(CommandOptions::new("pong").alias("p")))
            .unwrap_err();
        assert!(matches!(err, CommandError::Conflict { ref name, .. } if name == "p"));

        assert!(registry.register(stub(CommandOptions::new("p"))).is_err());
        assert_eq!(registry.len(), 1);

        // Names differing only in case do not collide
        registry.register(stub(CommandOptions::new("PING"))).unwrap();
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_empty_name_rejected() {
        let registry = CommandRegistry::new();
        assert!(matches!(
            registry.register(stub(CommandOptions::new("  "))),
            Err(CommandError::InvalidName)
        ));
        assert!(matches!(
            registry.register(stub(CommandOptions::new("ok").alias(""))),
            Err(CommandError::InvalidName)
        ));
    }

    #[test]
    fn test_reregister_keeps_name() {
        let registry = CommandRegistry::new();
        registry.register(stub(CommandOptions::new("ping"))).unwrap();

        registry
            .reregister("ping", stub(CommandOptions::new("ping").alias("p")))
            .unwrap();
        assert!(registry.get("p").is_some());

        let err = registry
            .reregister("ping", stub(CommandOptions::new("pong")))
            .unwrap_err();
        assert!(matches!(err, CommandError::NameChanged { .. }));

        let err = registry
            .reregister("missing", stub(CommandOptions::new("missing")))
            .unwrap_err();
        assert!(matches!(err, CommandError::NotRegistered(_)));
    }

    #[test]
    fn test_unregister_and_find() {
        let registry = CommandRegistry::new();
        registry
            .register(stub(CommandOptions::new("help").alias("h")))
            .unwrap();
        registry.register(stub(CommandOptions::new("ping"))).unwrap();

        assert_eq!(registry.find("h").len(), 1);
        assert!(registry.find("H").is_empty());
        assert!(registry.find("hel").is_empty());

        assert!(registry.unregister("help").is_some());
        assert!(registry.unregister("help").is_none());
        assert!(registry.get("h").is_none());
        assert_eq!(registry.len(), 1);
    }
}
