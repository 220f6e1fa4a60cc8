// ABOUTME: Event names emitted by the runtime and the payloads they carry
// ABOUTME: Platforms translate their raw events into these variants

use crate::traits::IncomingMessage;
use std::sync::Arc;

/// Names of the events the runtime knows about
pub mod names {
    pub const MESSAGE: &str = "message";
    pub const MESSAGE_UPDATE: &str = "messageUpdate";
    pub const MESSAGE_DELETE: &str = "messageDelete";
    pub const CHANNEL_DELETE: &str = "channelDelete";
    pub const SERVER_DELETE: &str = "serverDelete";
    pub const READY: &str = "ready";
    pub const ERROR: &str = "error";
    pub const RAW: &str = "raw";
    pub const BEFORE_CONNECT: &str = "beforeConnect";
    pub const AFTER_CONNECT: &str = "afterConnect";
    pub const BEFORE_DISCONNECT: &str = "beforeDisconnect";
    pub const AFTER_DISCONNECT: &str = "afterDisconnect";
}

/// Arguments delivered with an event firing
#[derive(Debug, Clone)]
pub enum EventPayload {
    Empty,
    Message(Arc<IncomingMessage>),
    MessageUpdate {
        old: Option<Arc<IncomingMessage>>,
        new: Arc<IncomingMessage>,
    },
    MessageDelete {
        channel_id: String,
        message_id: String,
    },
    ChannelDelete {
        channel_id: String,
    },
    ServerDelete {
        server_id: String,
    },
    Error(String),
    /// Platform-specific data with no dedicated variant
    Raw(serde_json::Value),
}

impl EventPayload {
    pub fn message(&self) -> Option<&Arc<IncomingMessage>> {
        match self {
            Self::Message(msg) => Some(msg),
            Self::MessageUpdate { new, .. } => Some(new),
            _ => None,
        }
    }
}

impl From<IncomingMessage> for EventPayload {
    fn from(msg: IncomingMessage) -> Self {
        Self::Message(Arc::new(msg))
    }
}
