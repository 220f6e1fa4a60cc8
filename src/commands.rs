// ABOUTME: Built-in glue commands: ping, help, modules and kill
// ABOUTME: Registered on the client's command registry at startup

use anyhow::{Context, Result};
use async_trait::async_trait;
use ordo_core::commands::{Command, CommandContext, CommandOptions, CommandOutput};
use ordo_core::permissions::ELEVATED;
use ordo_core::{Client, WeakClient};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Notify;

/// Register every built-in command on `client`.
/// `shutdown` is notified when an elevated user runs `kill`.
pub fn register_defaults(client: &Client, shutdown: Arc<Notify>) -> Result<()> {
    let commands = client.commands();
    commands
        .register(Arc::new(PingCommand::new()))
        .context("Failed to register ping")?;
    commands
        .register(Arc::new(HelpCommand::new()))
        .context("Failed to register help")?;
    commands
        .register(Arc::new(ModulesCommand::new(client.downgrade())))
        .context("Failed to register modules")?;
    commands
        .register(Arc::new(KillCommand::new(shutdown)))
        .context("Failed to register kill")?;
    tracing::debug!(count = commands.len(), "Registered built-in commands");
    Ok(())
}

// =============================================================================
// ping
// =============================================================================

pub struct PingCommand {
    options: CommandOptions,
}

impl Default for PingCommand {
    fn default() -> Self {
        Self::new()
    }
}

impl PingCommand {
    pub fn new() -> Self {
        Self {
            options: CommandOptions::new("ping")
                .category("General")
                .description("Checks the bot's ping and latency.")
                .metadata(json!({ "examples": ["ping"] })),
        }
    }
}

#[async_trait]
impl Command for PingCommand {
    fn options(&self) -> &CommandOptions {
        &self.options
    }

    async fn run(&self, ctx: &CommandContext) -> Result<CommandOutput> {
        let started = Instant::now();
        ctx.reply("Pong!").await?;
        tracing::debug!(elapsed_ms = started.elapsed().as_millis() as u64, "Ping reply sent");
        Ok(CommandOutput::Empty)
    }
}

// =============================================================================
// help
// =============================================================================

pub struct HelpCommand {
    options: CommandOptions,
}

impl Default for HelpCommand {
    fn default() -> Self {
        Self::new()
    }
}

impl HelpCommand {
    pub fn new() -> Self {
        Self {
            options: CommandOptions::new("help")
                .category("General")
                .description(
                    "Displays a list of available commands, or detailed information for a specified command.",
                )
                .metadata(json!({
                    "examples": ["help", "help ping"],
                    "usage": "[command]",
                    "details": "If no command is given, every command you can use is listed by category.",
                })),
        }
    }

    fn details(prefix: &str, command: &dyn Command) -> String {
        let options = command.options();
        let mut text = format!(
            "__**{}{}**:__ {}\n**Category:** {}",
            prefix,
            options.name,
            options.description.as_deref().unwrap_or(""),
            options.category
        );

        if !options.aliases.is_empty() {
            text.push_str(&format!("\n**Aliases:** {}", options.aliases.join(", ")));
        }
        if let Some(details) = options.metadata.get("details").and_then(|v| v.as_str()) {
            text.push_str(&format!("\n**Details:** {}", details));
        }
        if let Some(usage) = options.metadata.get("usage").and_then(|v| v.as_str()) {
            text.push_str(&format!("\n**Usage:** {}", usage));
        }
        let examples: Vec<&str> = options
            .metadata
            .get("examples")
            .and_then(|v| v.as_array())
            .map(|items| items.iter().filter_map(|v| v.as_str()).collect())
            .unwrap_or_default();
        if !examples.is_empty() {
            text.push_str(&format!("\n**Examples:**\n{}", examples.join("\n")));
        }
        text
    }

    fn listing(ctx: &CommandContext) -> String {
        let mut categories: Vec<(String, Vec<String>)> = Vec::new();
        for command in ctx.commands.usable_by(ctx) {
            let options = command.options();
            let name = format!("`{}`", options.name);
            match categories.iter_mut().find(|(cat, _)| *cat == options.category) {
                Some((_, names)) => names.push(name),
                None => categories.push((options.category.clone(), vec![name])),
            }
        }

        categories
            .into_iter()
            .map(|(category, names)| format!("__**{}**__\n{}", category, names.join(", ")))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

#[async_trait]
impl Command for HelpCommand {
    fn options(&self) -> &CommandOptions {
        &self.options
    }

    async fn run(&self, ctx: &CommandContext) -> Result<CommandOutput> {
        let prefix = if ctx.spaced_prefix {
            format!("{} ", ctx.prefix)
        } else {
            ctx.prefix.clone()
        };

        let Some(query) = ctx.args.first() else {
            return Ok(Self::listing(ctx).into());
        };

        match ctx.commands.find(query).first() {
            Some(command) => Ok(Self::details(&prefix, command.as_ref()).into()),
            None => Ok(format!("I couldn't find any commands with `{}`!", query).into()),
        }
    }
}

// =============================================================================
// modules
// =============================================================================

pub struct ModulesCommand {
    options: CommandOptions,
    client: WeakClient,
}

impl ModulesCommand {
    pub fn new(client: WeakClient) -> Self {
        Self {
            options: CommandOptions::new("modules")
                .category("General")
                .description("Lists the loaded modules and what they require.")
                .metadata(json!({ "examples": ["modules"] })),
            client,
        }
    }
}

#[async_trait]
impl Command for ModulesCommand {
    fn options(&self) -> &CommandOptions {
        &self.options
    }

    async fn run(&self, _ctx: &CommandContext) -> Result<CommandOutput> {
        let client = self
            .client
            .upgrade()
            .context("Client was dropped while the command was running")?;

        let lines: Vec<String> = client
            .module_descriptors()
            .into_iter()
            .map(|module| {
                let mut line = format!("`{}`", module.name);
                if let Some(description) = &module.description {
                    line.push_str(&format!(": {}", description));
                }
                if !module.requires.is_empty() {
                    line.push_str(&format!(" (requires {})", module.requires.join(", ")));
                }
                line
            })
            .collect();

        Ok(format!("**Loaded modules ({}):**\n{}", lines.len(), lines.join("\n")).into())
    }
}

// =============================================================================
// kill
// =============================================================================

pub struct KillCommand {
    options: CommandOptions,
    shutdown: Arc<Notify>,
}

impl KillCommand {
    pub fn new(shutdown: Arc<Notify>) -> Self {
        Self {
            options: CommandOptions::new("kill")
                .category("Developer")
                .description("Disconnects the bot and stops the process.")
                .permission(ELEVATED)
                .metadata(json!({ "examples": ["kill"] })),
            shutdown,
        }
    }
}

#[async_trait]
impl Command for KillCommand {
    fn options(&self) -> &CommandOptions {
        &self.options
    }

    async fn run(&self, ctx: &CommandContext) -> Result<CommandOutput> {
        ctx.reply("Killing the bot...").await?;
        tracing::info!(user = %ctx.author().id, "Shutdown requested by command");
        self.shutdown.notify_one();
        Ok(CommandOutput::Empty)
    }
}
