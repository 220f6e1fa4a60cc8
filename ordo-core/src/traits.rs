// ABOUTME: Platform data model and the traits a chat transport implements
// ABOUTME: Users, channels, servers and roles feed permission resolution

use crate::events::EventSink;
use crate::permissions::flags::{ChannelPermissions, ServerPermissions};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

// =============================================================================
// Message Content
// =============================================================================

/// Content that can be sent to a chat channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageContent {
    /// Plain text message
    Plain(String),
    /// Message with both plain text and HTML formatting
    Html { plain: String, html: String },
}

impl MessageContent {
    pub fn plain(text: impl Into<String>) -> Self {
        Self::Plain(text.into())
    }

    pub fn html(plain: impl Into<String>, html: impl Into<String>) -> Self {
        Self::Html {
            plain: plain.into(),
            html: html.into(),
        }
    }

    /// The plain-text rendition of this content
    pub fn as_plain(&self) -> &str {
        match self {
            Self::Plain(text) => text,
            Self::Html { plain, .. } => plain,
        }
    }
}

impl From<String> for MessageContent {
    fn from(text: String) -> Self {
        Self::Plain(text)
    }
}

impl From<&str> for MessageContent {
    fn from(text: &str) -> Self {
        Self::Plain(text.to_string())
    }
}

// =============================================================================
// Identity and Membership
// =============================================================================

/// Identity of a chat user
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChatUser {
    pub id: String,
    pub display_name: Option<String>,
    pub bot: bool,
}

impl ChatUser {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: None,
            bot: false,
        }
    }

    pub fn with_name(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: Some(name.into()),
            bot: false,
        }
    }

    /// Display name if set, otherwise the id
    pub fn name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.id)
    }
}

/// A named role inside a server, carrying the bits it grants
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Role {
    pub name: String,
    pub server_permissions: ServerPermissions,
    pub channel_permissions: ChannelPermissions,
}

impl Role {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            server_permissions: ServerPermissions::empty(),
            channel_permissions: ChannelPermissions::empty(),
        }
    }
}

/// A user's membership in a server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub user_id: String,
    pub server_id: String,
    pub nickname: Option<String>,
    /// Role ids held by this member
    pub roles: Vec<String>,
}

impl Member {
    pub fn new(server_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            server_id: server_id.into(),
            nickname: None,
            roles: Vec::new(),
        }
    }

    pub fn with_roles(mut self, roles: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.roles = roles.into_iter().map(Into::into).collect();
        self
    }
}

/// A server (guild) that owns channels, roles and members
#[derive(Debug, Clone)]
pub struct Server {
    pub id: String,
    pub name: String,
    pub owner_id: String,
    pub default_permissions: ServerPermissions,
    pub default_channel_permissions: ChannelPermissions,
    /// Keyed by role id
    pub roles: HashMap<String, Role>,
    /// Keyed by user id
    pub members: HashMap<String, Member>,
}

impl Server {
    pub fn new(id: impl Into<String>, owner_id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            owner_id: owner_id.into(),
            default_permissions: ServerPermissions::VIEW
                | ServerPermissions::CHANGE_NICKNAME
                | ServerPermissions::CHANGE_AVATAR,
            default_channel_permissions: ChannelPermissions::VIEW
                | ChannelPermissions::SEND_MESSAGE
                | ChannelPermissions::VOICE_CALL
                | ChannelPermissions::INVITE_OTHERS
                | ChannelPermissions::EMBED_LINKS
                | ChannelPermissions::UPLOAD_FILES,
            roles: HashMap::new(),
            members: HashMap::new(),
        }
    }

    pub fn member(&self, user_id: &str) -> Option<&Member> {
        self.members.get(user_id)
    }

    pub fn add_role(&mut self, id: impl Into<String>, role: Role) {
        self.roles.insert(id.into(), role);
    }

    pub fn add_member(&mut self, member: Member) {
        self.members.insert(member.user_id.clone(), member);
    }
}

/// What kind of conversation a channel is
#[derive(Debug, Clone)]
pub enum ChannelKind {
    /// One-to-one conversation
    Direct { recipients: Vec<String> },
    /// Small group conversation without roles
    Group { owner_id: String },
    /// Channel living inside a server
    Server {
        server: Arc<Server>,
        /// Overrides the server's default channel permissions when set
        default_permissions: Option<ChannelPermissions>,
        /// Per-role overrides, keyed by role id
        role_permissions: HashMap<String, ChannelPermissions>,
    },
}

#[derive(Debug, Clone)]
pub struct Channel {
    pub id: String,
    pub name: Option<String>,
    pub kind: ChannelKind,
}

impl Channel {
    pub fn direct(id: impl Into<String>, recipients: Vec<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            kind: ChannelKind::Direct { recipients },
        }
    }

    pub fn group(id: impl Into<String>, owner_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            kind: ChannelKind::Group {
                owner_id: owner_id.into(),
            },
        }
    }

    pub fn in_server(id: impl Into<String>, server: Arc<Server>) -> Self {
        Self {
            id: id.into(),
            name: None,
            kind: ChannelKind::Server {
                server,
                default_permissions: None,
                role_permissions: HashMap::new(),
            },
        }
    }

    pub fn server(&self) -> Option<&Arc<Server>> {
        match &self.kind {
            ChannelKind::Server { server, .. } => Some(server),
            _ => None,
        }
    }

    pub fn is_direct(&self) -> bool {
        matches!(self.kind, ChannelKind::Direct { .. })
    }
}

// =============================================================================
// Incoming Message
// =============================================================================

/// Incoming message from a chat platform
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    /// Which platform this message came from
    pub platform_id: String,
    /// Platform-specific message id
    pub event_id: String,
    pub channel_id: String,
    /// Resolved channel, if the platform could resolve it
    pub channel: Option<Arc<Channel>>,
    pub sender: ChatUser,
    /// Sender's membership when sent in a server channel
    pub member: Option<Member>,
    pub body: String,
    /// Timestamp in seconds since Unix epoch
    pub timestamp: i64,
}

impl IncomingMessage {
    pub fn new(channel: Arc<Channel>, sender: ChatUser, body: impl Into<String>) -> Self {
        let member = channel
            .server()
            .and_then(|server| server.member(&sender.id))
            .cloned();
        Self {
            platform_id: String::new(),
            event_id: uuid::Uuid::new_v4().to_string(),
            channel_id: channel.id.clone(),
            channel: Some(channel),
            sender,
            member,
            body: body.into(),
            timestamp: chrono::Utc::now().timestamp(),
        }
    }

    pub fn server(&self) -> Option<&Arc<Server>> {
        self.channel.as_ref().and_then(|c| c.server())
    }
}

// =============================================================================
// Platform Traits
// =============================================================================

/// Outbound side of a chat transport
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    /// Short platform identifier (e.g. "console", "revolt")
    fn platform_id(&self) -> &str;

    /// The bot's own user id on this platform
    fn bot_user_id(&self) -> &str;

    fn is_self(&self, user_id: &str) -> bool {
        user_id == self.bot_user_id()
    }

    /// Text that mentions a user on this platform
    fn mention(&self, user_id: &str) -> String {
        format!("<@{}>", user_id)
    }

    async fn send(&self, channel_id: &str, content: MessageContent) -> Result<()>;

    /// Reply to a message; platforms without threading just send to the channel
    async fn reply(&self, message: &IncomingMessage, content: MessageContent) -> Result<()> {
        self.send(&message.channel_id, content).await
    }

    async fn connect(&self) -> Result<()> {
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}

/// Inbound side of a chat transport: forwards raw platform events by name
pub trait EventSource: Send + Sync {
    /// Called at most once per event name; the source pushes every
    /// occurrence of `event` into `sink`.
    fn subscribe(&self, event: &str, sink: EventSink);
}
