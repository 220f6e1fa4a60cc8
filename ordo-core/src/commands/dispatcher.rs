// ABOUTME: Turns incoming messages into command invocations
// ABOUTME: Prefix match, tokenize, resolve, gate on permissions and throttling, then run

use super::prefix::PrefixMatcher;
use super::{
    missing_permissions, permission_response, tokenize, BlockReason, Command, CommandContext,
    CommandRegistry,
};
use crate::config::ClientConfig;
use crate::events::registry::panic_message;
use crate::events::{EventFiring, EventListener, EventPayload};
use crate::metrics;
use crate::permissions::flags::{channel_permissions, server_permissions};
use crate::permissions::{ChannelPermissions, PermissionRegistry, PermissionSubject};
use crate::throttle::ThrottleStore;
use crate::traits::{ChatPlatform, IncomingMessage};
use async_trait::async_trait;
use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

pub const INVOKED_KEY: &str = "commands/invoked";
pub const PREFIX_MATCH_KEY: &str = "commands/prefixMatch";
pub const SPACED_PREFIX_KEY: &str = "commands/spacedPrefix";
pub const STRIPPED_CONTENT_KEY: &str = "commands/strippedContent";
pub const COMMAND_NAME_KEY: &str = "commands/commandName";
pub const COMMAND_KEY: &str = "commands/command";
pub const CTX_KEY: &str = "commands/ctx";

/// Where a message stopped in the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Filtered before prefix matching
    Ignored,
    /// No prefix source applies to this firing
    NoPrefix,
    NoMatch,
    UnknownCommand,
    /// Stopped by a gate; carries [`BlockReason::kind`]
    Blocked(&'static str),
    Completed,
    Errored,
}

impl DispatchOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ignored => "ignored",
            Self::NoPrefix => "no_prefix",
            Self::NoMatch => "no_match",
            Self::UnknownCommand => "unknown_command",
            Self::Blocked(_) => "blocked",
            Self::Completed => "completed",
            Self::Errored => "errored",
        }
    }
}

pub struct CommandDispatcher {
    commands: CommandRegistry,
    permissions: PermissionRegistry,
    throttles: Arc<dyn ThrottleStore>,
    platform: Arc<dyn ChatPlatform>,
    config: Arc<ClientConfig>,
}

impl CommandDispatcher {
    pub fn new(
        commands: CommandRegistry,
        permissions: PermissionRegistry,
        throttles: Arc<dyn ThrottleStore>,
        platform: Arc<dyn ChatPlatform>,
        config: Arc<ClientConfig>,
    ) -> Self {
        Self {
            commands,
            permissions,
            throttles,
            platform,
            config,
        }
    }

    /// Run one message through the pipeline
    pub async fn dispatch(
        &self,
        firing: &mut EventFiring,
        message: &Arc<IncomingMessage>,
    ) -> DispatchOutcome {
        let outcome = self.dispatch_inner(firing, message).await;
        metrics::record_dispatch(outcome.as_str());
        outcome
    }

    fn should_ignore(&self, message: &IncomingMessage) -> bool {
        if message.body.is_empty() {
            return true;
        }
        let Some(channel) = message.channel.as_ref() else {
            return true;
        };
        let author = &message.sender.id;
        if self.config.ignored_authors.iter().any(|id| id == author) {
            return true;
        }
        if self.platform.is_self(author) {
            return true;
        }
        !channel_permissions(channel, self.platform.bot_user_id())
            .contains(ChannelPermissions::SEND_MESSAGE)
    }

    async fn dispatch_inner(
        &self,
        firing: &mut EventFiring,
        message: &Arc<IncomingMessage>,
    ) -> DispatchOutcome {
        if self.should_ignore(message) {
            return DispatchOutcome::Ignored;
        }

        let mention = self.platform.mention(self.platform.bot_user_id());
        let Some(matcher) = PrefixMatcher::build(firing, &self.config, &mention) else {
            return DispatchOutcome::NoPrefix;
        };
        let Some(prefix_match) = matcher.matches(&message.body) else {
            return DispatchOutcome::NoMatch;
        };

        let stripped = message.body[prefix_match.end..].to_string();
        let mut args = tokenize(&stripped);
        let command_name = if args.is_empty() {
            String::new()
        } else {
            args.remove(0)
        };
        let command = self.commands.get(&command_name);
        firing.set(INVOKED_KEY, command.is_some());
        let Some(command) = command else {
            return DispatchOutcome::UnknownCommand;
        };

        let ctx = CommandContext {
            message: message.clone(),
            args,
            prefix: prefix_match.prefix.clone(),
            spaced_prefix: prefix_match.spaced,
            command_name: command_name.clone(),
            platform: self.platform.clone(),
            permissions: self.permissions.clone(),
            commands: self.commands.clone(),
        };

        firing.set(SPACED_PREFIX_KEY, prefix_match.spaced);
        firing.set(PREFIX_MATCH_KEY, prefix_match);
        firing.set(STRIPPED_CONTENT_KEY, stripped);
        firing.set(COMMAND_NAME_KEY, command_name);
        firing.set(COMMAND_KEY, command.clone());
        firing.set(CTX_KEY, ctx.clone());

        if let Some(reason) = self.check_gates(command.as_ref(), &ctx, firing).await {
            return self.block(command.as_ref(), &ctx, reason).await;
        }

        self.execute(command.as_ref(), &ctx).await
    }

    /// The first gate that stops `command`, if any
    async fn check_gates(
        &self,
        command: &dyn Command,
        ctx: &CommandContext,
        firing: &mut EventFiring,
    ) -> Option<BlockReason> {
        let options = command.options();
        let subject = PermissionSubject::from_message(&ctx.message);

        if !options.user_permissions.is_empty() {
            let map = self
                .permissions
                .map_cached(&subject, &options.user_permissions, firing);
            let missing = missing_permissions(&options.user_permissions, &map);
            if !missing.is_empty() {
                return Some(BlockReason::Permission {
                    response: permission_response(command.name(), &missing),
                });
            }
        }

        let bot_id = self.platform.bot_user_id();
        if let Some(channel) = ctx.channel() {
            let required = options.client_channel_permissions;
            if !required.is_empty() {
                let missing = required - channel_permissions(channel, bot_id);
                if !missing.is_empty() {
                    return Some(BlockReason::ClientChannelPermissions { missing });
                }
            }
        }
        if let Some(server) = ctx.server() {
            let required = options.client_server_permissions;
            if !required.is_empty() {
                let missing = required - server_permissions(server, bot_id);
                if !missing.is_empty() {
                    return Some(BlockReason::ClientServerPermissions { missing });
                }
            }
        }

        let policy = options.throttling.as_ref()?;
        if !policy.bypass.is_empty() {
            let map = self.permissions.map_cached(&subject, &policy.bypass, firing);
            if missing_permissions(&policy.bypass, &map).is_empty() {
                return None;
            }
        }

        let scope = format!("command_{}", command.name());
        match self
            .throttles
            .throttle(&scope, policy, &ctx.author().id, Some(&*firing))
            .await
        {
            Ok(result) if !result.okay => {
                let now = self.throttles.now_millis();
                Some(BlockReason::Throttling {
                    throttle: result.throttle,
                    remaining: result.reset.map(|reset| (reset - now) as f64 / 1000.0),
                })
            }
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(
                    command = %command.name(),
                    error = %e,
                    "Throttle store failed, letting command through"
                );
                None
            }
        }
    }

    async fn block(
        &self,
        command: &dyn Command,
        ctx: &CommandContext,
        reason: BlockReason,
    ) -> DispatchOutcome {
        let kind = reason.kind();
        tracing::debug!(command = %command.name(), reason = kind, "Command blocked");
        metrics::record_command_blocked(command.name(), kind);

        match AssertUnwindSafe(command.on_block(ctx, &reason))
            .catch_unwind()
            .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(command = %command.name(), error = %e, "Command block handler failed");
            }
            Err(panic) => {
                tracing::error!(
                    command = %command.name(),
                    panic = %panic_message(&*panic),
                    "Command block handler panicked"
                );
            }
        }
        DispatchOutcome::Blocked(kind)
    }

    async fn execute(&self, command: &dyn Command, ctx: &CommandContext) -> DispatchOutcome {
        tracing::debug!(
            command = %command.name(),
            author = %ctx.author().name(),
            author_id = %ctx.author().id,
            "Running command"
        );
        metrics::record_command_run(command.name());

        let result = AssertUnwindSafe(async {
            let output = command.run(ctx).await?;
            command.finalize(output, ctx).await
        })
        .catch_unwind()
        .await;

        let error = match result {
            Ok(Ok(())) => return DispatchOutcome::Completed,
            Ok(Err(e)) => e,
            Err(panic) => anyhow::anyhow!("command panicked: {}", panic_message(&*panic)),
        };
        metrics::record_command_error(command.name());
        tracing::warn!(command = %command.name(), error = %error, "Command failed");

        match AssertUnwindSafe(command.on_error(&error, ctx))
            .catch_unwind()
            .await
        {
            Ok(Ok(())) => {}
            Ok(Err(second)) => {
                tracing::error!(command = %command.name(), error = %second, "Command error handler failed");
            }
            Err(panic) => {
                tracing::error!(
                    command = %command.name(),
                    panic = %panic_message(&*panic),
                    "Command error handler panicked"
                );
            }
        }
        DispatchOutcome::Errored
    }
}

#[async_trait]
impl EventListener for CommandDispatcher {
    async fn on_event(&self, firing: &mut EventFiring, payload: &EventPayload) -> anyhow::Result<()> {
        if let Some(message) = payload.message() {
            self.dispatch(firing, message).await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_labels() {
        assert_eq!(DispatchOutcome::Blocked("throttling").as_str(), "blocked");
        assert_eq!(DispatchOutcome::NoPrefix.as_str(), "no_prefix");
        assert_eq!(DispatchOutcome::Completed.as_str(), "completed");
    }
}
