// ABOUTME: Per-invocation view handed to a command's hooks
// ABOUTME: Carries the parsed arguments plus handles to reply and check permissions

use super::CommandRegistry;
use crate::permissions::{PermissionRegistry, PermissionSubject};
use crate::traits::{Channel, ChatPlatform, ChatUser, IncomingMessage, Member, MessageContent, Server};
use anyhow::Result;
use std::fmt;
use std::sync::Arc;

#[derive(Clone)]
pub struct CommandContext {
    pub message: Arc<IncomingMessage>,
    /// Arguments after the command name
    pub args: Vec<String>,
    /// Prefix exactly as the user typed it
    pub prefix: String,
    /// Whether a space separated the prefix from the command name
    pub spaced_prefix: bool,
    /// The name or alias the user invoked
    pub command_name: String,
    pub platform: Arc<dyn ChatPlatform>,
    pub permissions: PermissionRegistry,
    pub commands: CommandRegistry,
}

impl fmt::Debug for CommandContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandContext")
            .field("command_name", &self.command_name)
            .field("prefix", &self.prefix)
            .field("args", &self.args)
            .field("author", &self.message.sender.id)
            .finish()
    }
}

impl CommandContext {
    pub fn author(&self) -> &ChatUser {
        &self.message.sender
    }

    pub fn member(&self) -> Option<&Member> {
        self.message.member.as_ref()
    }

    pub fn channel(&self) -> Option<&Arc<Channel>> {
        self.message.channel.as_ref()
    }

    pub fn server(&self) -> Option<&Arc<Server>> {
        self.message.server()
    }

    /// Post to the channel the command was invoked in
    pub async fn send(&self, content: impl Into<MessageContent>) -> Result<()> {
        self.platform
            .send(&self.message.channel_id, content.into())
            .await
    }

    /// Reply to the invoking message
    pub async fn reply(&self, content: impl Into<MessageContent>) -> Result<()> {
        self.platform.reply(&self.message, content.into()).await
    }

    pub fn permission_subject(&self) -> PermissionSubject {
        PermissionSubject::from_message(&self.message)
    }

    pub fn has_permission(&self, key: &str) -> bool {
        self.permissions.has(&self.permission_subject(), key, None)
    }
}
