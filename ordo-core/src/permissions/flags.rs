// ABOUTME: Channel and server permission bitmasks plus effective-mask resolution
// ABOUTME: Owner gets everything; otherwise default mask OR role masks OR channel overrides

use crate::traits::{Channel, ChannelKind, Server};
use bitflags::bitflags;

bitflags! {
    /// Permissions a user can hold inside a channel.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ChannelPermissions: u32 {
        const VIEW = 1 << 0;
        const SEND_MESSAGE = 1 << 1;
        const MANAGE_MESSAGES = 1 << 2;
        const MANAGE_CHANNEL = 1 << 3;
        const VOICE_CALL = 1 << 4;
        const INVITE_OTHERS = 1 << 5;
        const EMBED_LINKS = 1 << 6;
        const UPLOAD_FILES = 1 << 7;
    }
}

bitflags! {
    /// Permissions a user can hold across a whole server.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ServerPermissions: u32 {
        const VIEW = 1 << 0;
        const MANAGE_ROLES = 1 << 1;
        const MANAGE_CHANNELS = 1 << 2;
        const MANAGE_SERVER = 1 << 3;
        const KICK_MEMBERS = 1 << 4;
        const BAN_MEMBERS = 1 << 5;
        const CHANGE_NICKNAME = 1 << 6;
        const CHANGE_NICKNAMES = 1 << 7;
        const CHANGE_AVATAR = 1 << 8;
        const REMOVE_AVATARS = 1 << 9;
    }
}

/// Mask used in conversations that have no role hierarchy.
pub const DEFAULT_DM_PERMISSIONS: ChannelPermissions = ChannelPermissions::VIEW
    .union(ChannelPermissions::SEND_MESSAGE)
    .union(ChannelPermissions::MANAGE_CHANNEL)
    .union(ChannelPermissions::VOICE_CALL)
    .union(ChannelPermissions::INVITE_OTHERS)
    .union(ChannelPermissions::EMBED_LINKS)
    .union(ChannelPermissions::UPLOAD_FILES);

/// (key suffix, flag, display name) for every channel permission
pub const CHANNEL_FLAGS: &[(&str, ChannelPermissions, &str)] = &[
    ("view", ChannelPermissions::VIEW, "View Channel"),
    ("sendmessage", ChannelPermissions::SEND_MESSAGE, "Send Message"),
    ("managemessages", ChannelPermissions::MANAGE_MESSAGES, "Manage Messages"),
    ("managechannel", ChannelPermissions::MANAGE_CHANNEL, "Manage Channel"),
    ("voicecall", ChannelPermissions::VOICE_CALL, "Voice Call"),
    ("inviteothers", ChannelPermissions::INVITE_OTHERS, "Invite Others"),
    ("embedlinks", ChannelPermissions::EMBED_LINKS, "Embed Links"),
    ("uploadfiles", ChannelPermissions::UPLOAD_FILES, "Upload Files"),
];

/// (key suffix, flag, display name) for every server permission
pub const SERVER_FLAGS: &[(&str, ServerPermissions, &str)] = &[
    ("view", ServerPermissions::VIEW, "View Server"),
    ("manageroles", ServerPermissions::MANAGE_ROLES, "Manage Roles"),
    ("managechannels", ServerPermissions::MANAGE_CHANNELS, "Manage Channels"),
    ("manageserver", ServerPermissions::MANAGE_SERVER, "Manage Server"),
    ("kickmembers", ServerPermissions::KICK_MEMBERS, "Kick Members"),
    ("banmembers", ServerPermissions::BAN_MEMBERS, "Ban Members"),
    ("changenickname", ServerPermissions::CHANGE_NICKNAME, "Change Own Nickname"),
    ("changenicknames", ServerPermissions::CHANGE_NICKNAMES, "Change Nicknames"),
    ("changeavatar", ServerPermissions::CHANGE_AVATAR, "Change Own Avatar"),
    ("removeavatars", ServerPermissions::REMOVE_AVATARS, "Remove Avatars"),
];

impl ChannelPermissions {
    /// Display names of every flag set in `self`, in declaration order
    pub fn names(self) -> Vec<&'static str> {
        CHANNEL_FLAGS
            .iter()
            .filter(|(_, flag, _)| self.contains(*flag))
            .map(|(_, _, name)| *name)
            .collect()
    }
}

impl ServerPermissions {
    /// Display names of every flag set in `self`, in declaration order
    pub fn names(self) -> Vec<&'static str> {
        SERVER_FLAGS
            .iter()
            .filter(|(_, flag, _)| self.contains(*flag))
            .map(|(_, _, name)| *name)
            .collect()
    }
}

/// Effective channel mask for `user_id` in `channel`.
pub fn channel_permissions(channel: &Channel, user_id: &str) -> ChannelPermissions {
    match &channel.kind {
        ChannelKind::Direct { .. } => DEFAULT_DM_PERMISSIONS,
        ChannelKind::Group { owner_id } => {
            if owner_id == user_id {
                ChannelPermissions::all()
            } else {
                DEFAULT_DM_PERMISSIONS
            }
        }
        ChannelKind::Server {
            server,
            default_permissions,
            role_permissions,
        } => {
            if server.owner_id == user_id {
                return ChannelPermissions::all();
            }

            let mut mask = default_permissions.unwrap_or(server.default_channel_permissions);
            let Some(member) = server.member(user_id) else {
                return mask;
            };

            for role_id in &member.roles {
                if let Some(role) = server.roles.get(role_id) {
                    mask |= role.channel_permissions;
                }
                if let Some(overridden) = role_permissions.get(role_id) {
                    mask |= *overridden;
                }
            }
            mask
        }
    }
}

/// Effective server-wide mask for `user_id` in `server`.
pub fn server_permissions(server: &Server, user_id: &str) -> ServerPermissions {
    if server.owner_id == user_id {
        return ServerPermissions::all();
    }

    let mut mask = server.default_permissions;
    if let Some(member) = server.member(user_id) {
        for role_id in &member.roles {
            if let Some(role) = server.roles.get(role_id) {
                mask |= role.server_permissions;
            }
        }
    }
    mask
}
