// ABOUTME: Platform-agnostic core of the ordo chat-bot runtime
// ABOUTME: Ordered events, modules, permissions, throttling and command dispatch

pub mod client;
pub mod collector;
pub mod commands;
pub mod config;
pub mod error;
pub mod events;
pub mod metrics;
pub mod module;
pub mod permissions;
pub mod throttle;
pub mod traits;

pub use client::{Client, ClientBuilder, WeakClient};
pub use collector::{Collected, CollectorEnd, CollectorOptions, MessageCollector};
pub use commands::{
    BlockReason, Command, CommandContext, CommandDispatcher, CommandOptions, CommandOutput,
    CommandRegistry, DispatchOutcome,
};
pub use config::ClientConfig;
pub use error::{CollectorError, CommandError, EventError, ModuleError, PermissionError};
pub use events::{EventFiring, EventListener, EventOrder, EventPayload, EventRegistry, EventSink};
pub use module::{Module, ModuleDescriptor};
pub use permissions::{PermissionRegistry, PermissionSubject};
pub use throttle::{ThrottlePolicy, ThrottleStore};
pub use traits::{ChatPlatform, ChatUser, EventSource, IncomingMessage, MessageContent};
