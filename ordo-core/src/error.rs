// ABOUTME: Typed registration errors for events, modules, permissions and commands
// ABOUTME: Runtime failures use anyhow; these are the fail-fast misuse cases

use crate::collector::Collected;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EventError {
    /// The before/after declarations for an event cannot be satisfied.
    #[error("listener ordering cycle for event '{event}': {}", groups.join(" -> "))]
    OrderingCycle { event: String, groups: Vec<String> },
}

#[derive(Debug, Error)]
pub enum ModuleError {
    #[error("module name must not be empty")]
    InvalidName,
    #[error("a module named '{0}' is already loaded or queued")]
    Duplicate(String),
    #[error("module '{module}' requires '{dependency}', which is not loaded")]
    MissingDependency { module: String, dependency: String },
    #[error("module dependency cycle: {}", .0.join(" -> "))]
    DependencyCycle(Vec<String>),
    #[error("module '{name}' failed to load")]
    LoadFailed {
        name: String,
        #[source]
        source: anyhow::Error,
    },
}

#[derive(Debug, Error)]
pub enum PermissionError {
    #[error("permission '{0}' is a core permission and cannot be modified")]
    Protected(String),
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("command name must not be empty")]
    InvalidName,
    #[error("'{name}' is already used by command '{existing}'")]
    Conflict { name: String, existing: String },
    #[error("command name changed from '{old}' to '{new}'")]
    NameChanged { old: String, new: String },
    #[error("command '{0}' is not registered")]
    NotRegistered(String),
}

#[derive(Debug, Error)]
pub enum CollectorError {
    #[error(transparent)]
    Register(#[from] EventError),
    /// The collector stopped for a reason listed in `CollectorOptions::errors`.
    /// Whatever was gathered before that is kept.
    #[error("collector ended by {:?} after {} message(s)", .0.reason, .0.messages.len())]
    Ended(Collected),
}
