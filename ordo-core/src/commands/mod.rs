// ABOUTME: Command definitions, block reasons, and the built-in commands module
// ABOUTME: Commands declare permissions and throttling; the dispatcher enforces them

pub mod context;
pub mod dispatcher;
pub mod prefix;
pub mod registry;
pub mod tokenizer;

pub use context::CommandContext;
pub use dispatcher::{CommandDispatcher, DispatchOutcome};
pub use prefix::{PrefixMatch, PrefixMatcher};
pub use registry::CommandRegistry;
pub use tokenizer::tokenize;

use crate::client::Client;
use crate::error::EventError;
use crate::events::{names, EventOrder};
use crate::module::{Module, ModuleDescriptor};
use crate::permissions::{
    permission_name, ChannelPermissions, PermissionMap, ServerPermissions, ELEVATED, IN_SERVER,
};
use crate::throttle::{ThrottleObject, ThrottlePolicy};
use crate::traits::MessageContent;
use anyhow::Result;
use async_trait::async_trait;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Group name the dispatcher listens under
pub const COMMANDS_MODULE: &str = "commands";

/// Static description of a command
#[derive(Debug, Clone)]
pub struct CommandOptions {
    pub name: String,
    pub aliases: Vec<String>,
    pub category: String,
    pub description: Option<String>,
    /// Permission keys the invoking user must hold
    pub user_permissions: Vec<String>,
    /// Channel bits the bot itself must hold
    pub client_channel_permissions: ChannelPermissions,
    /// Server bits the bot itself must hold
    pub client_server_permissions: ServerPermissions,
    pub throttling: Option<ThrottlePolicy>,
    pub metadata: serde_json::Value,
}

impl CommandOptions {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            aliases: Vec::new(),
            category: "Uncategorized".to_string(),
            description: None,
            user_permissions: Vec::new(),
            client_channel_permissions: ChannelPermissions::empty(),
            client_server_permissions: ServerPermissions::empty(),
            throttling: None,
            metadata: serde_json::Value::Null,
        }
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn permission(mut self, key: impl Into<String>) -> Self {
        self.user_permissions.push(key.into());
        self
    }

    pub fn client_channel_permissions(mut self, perms: ChannelPermissions) -> Self {
        self.client_channel_permissions = perms;
        self
    }

    pub fn client_server_permissions(mut self, perms: ServerPermissions) -> Self {
        self.client_server_permissions = perms;
        self
    }

    pub fn throttling(mut self, policy: ThrottlePolicy) -> Self {
        self.throttling = Some(policy);
        self
    }

    pub fn metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Primary name followed by aliases
    pub fn all_names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str()).chain(self.aliases.iter().map(String::as_str))
    }
}

/// What a command's `run` produced
pub enum CommandOutput {
    Empty,
    Text(String),
    Message(MessageContent),
    /// Anything else; only a custom `finalize` knows what to do with it
    Custom(Box<dyn Any + Send + Sync>),
}

impl fmt::Debug for CommandOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("Empty"),
            Self::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Self::Message(content) => f.debug_tuple("Message").field(content).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl From<()> for CommandOutput {
    fn from(_: ()) -> Self {
        Self::Empty
    }
}

impl From<String> for CommandOutput {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for CommandOutput {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<MessageContent> for CommandOutput {
    fn from(content: MessageContent) -> Self {
        Self::Message(content)
    }
}

/// Why a command was prevented from running
#[derive(Debug, Clone, PartialEq)]
pub enum BlockReason {
    Permission { response: Option<String> },
    ClientChannelPermissions { missing: ChannelPermissions },
    ClientServerPermissions { missing: ServerPermissions },
    Throttling {
        throttle: ThrottleObject,
        /// Seconds until the window resets
        remaining: Option<f64>,
    },
}

impl BlockReason {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Permission { .. } => "permission",
            Self::ClientChannelPermissions { .. } => "clientChannelPermissions",
            Self::ClientServerPermissions { .. } => "clientServerPermissions",
            Self::Throttling { .. } => "throttling",
        }
    }

    /// The reply sent when a command does not override `on_block`
    pub fn default_response(&self, command: &str) -> String {
        match self {
            Self::Permission { response: Some(response) } => response.clone(),
            Self::Permission { response: None } => {
                format!("You do not have permission to use the `{}` command.", command)
            }
            Self::ClientChannelPermissions { missing } => {
                missing_response(command, "channel", &missing.names())
            }
            Self::ClientServerPermissions { missing } => {
                missing_response(command, "server", &missing.names())
            }
            Self::Throttling {
                remaining: Some(remaining),
                ..
            } if *remaining > 0.0 => format!(
                "You may not use the `{}` command again for another {:.1} seconds.",
                command, remaining
            ),
            Self::Throttling { .. } => format!(
                "You are currently ratelimited from using the `{}` command. Try again later.",
                command
            ),
        }
    }
}

fn missing_response(command: &str, class: &str, missing: &[&str]) -> String {
    if let [single] = missing {
        format!(
            "I need the \"{}\" {} permission for the `{}` command to work.",
            single, class, command
        )
    } else {
        format!(
            "I need the following {} permissions for the `{}` command to work: {}",
            class,
            command,
            missing.join(", ")
        )
    }
}

/// Keys from `required` that are false (or absent) in `map`
pub fn missing_permissions<'a>(required: &'a [String], map: &PermissionMap) -> Vec<&'a str> {
    required
        .iter()
        .filter(|key| !map.get(key.as_str()).copied().unwrap_or(false))
        .map(String::as_str)
        .collect()
}

/// User-facing explanation for missing permissions, or `None` if nothing is missing
pub fn permission_response(command: &str, missing: &[&str]) -> Option<String> {
    if missing.is_empty() {
        return None;
    }
    let has = |key: &str| missing.iter().any(|m| m.eq_ignore_ascii_case(key));

    let response = if has(ELEVATED) {
        format!(
            "The `{}` command can only be used by the bot developers or elevated users.",
            command
        )
    } else if has(IN_SERVER) {
        format!("The `{}` command can only be ran in servers.", command)
    } else if let [single] = missing {
        format!(
            "The `{}` command requires you to have the \"{}\" permission.",
            command,
            permission_name(single)
        )
    } else {
        format!(
            "The `{}` command requires you to have the following permissions: {}",
            command,
            missing
                .iter()
                .map(|key| permission_name(key))
                .collect::<Vec<_>>()
                .join(", ")
        )
    };
    Some(response)
}

/// A command invocable through the dispatcher
#[async_trait]
pub trait Command: Send + Sync {
    fn options(&self) -> &CommandOptions;

    fn name(&self) -> &str {
        &self.options().name
    }

    async fn run(&self, ctx: &CommandContext) -> Result<CommandOutput>;

    /// Called instead of `run` when a gate stops the command
    async fn on_block(&self, ctx: &CommandContext, reason: &BlockReason) -> Result<()> {
        ctx.reply(reason.default_response(self.name())).await
    }

    /// Called when `run` or `finalize` fails
    async fn on_error(&self, _error: &anyhow::Error, ctx: &CommandContext) -> Result<()> {
        ctx.reply(format!(
            "An error occurred while running the `{}` command.",
            self.name()
        ))
        .await
    }

    /// Deliver what `run` returned; text and message content become a reply
    async fn finalize(&self, output: CommandOutput, ctx: &CommandContext) -> Result<()> {
        match output {
            CommandOutput::Text(text) => ctx.reply(text).await,
            CommandOutput::Message(content) => ctx.reply(content).await,
            CommandOutput::Empty | CommandOutput::Custom(_) => Ok(()),
        }
    }
}

/// Module that hooks the dispatcher into the `message` event
pub struct CommandsModule {
    descriptor: ModuleDescriptor,
    dispatcher: Arc<CommandDispatcher>,
}

impl CommandsModule {
    pub fn new(dispatcher: Arc<CommandDispatcher>) -> Self {
        Self {
            descriptor: ModuleDescriptor::new(COMMANDS_MODULE)
                .description("Prefix-based command handler"),
            dispatcher,
        }
    }

    /// Hook the dispatcher into `client` without going through module activation
    pub fn attach(&self, client: &Client) -> Result<(), EventError> {
        self.register_event(client, names::MESSAGE, self.dispatcher.clone(), EventOrder::new())
    }
}

#[async_trait]
impl Module for CommandsModule {
    fn descriptor(&self) -> &ModuleDescriptor {
        &self.descriptor
    }

    async fn load(&self, client: &Client) -> Result<()> {
        self.attach(client)?;
        Ok(())
    }
}
