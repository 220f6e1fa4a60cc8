// ABOUTME: Console chat platform: lines from a reader become messages, replies go to a writer
// ABOUTME: Acts as both the outbound ChatPlatform and the upstream EventSource for the client

use crate::config::ConsoleConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use ordo_core::events::{names, EventFiring, EventPayload, EventSink};
use ordo_core::traits::{Channel, ChatPlatform, ChatUser, EventSource, IncomingMessage, MessageContent};
use std::collections::HashMap;
use std::io::Write;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::Notify;

pub const PLATFORM_ID: &str = "console";
pub const BOT_USER_ID: &str = "ordo";

pub struct ConsolePlatform {
    out: Mutex<Box<dyn Write + Send>>,
    sinks: Mutex<HashMap<String, EventSink>>,
}

impl Default for ConsolePlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsolePlatform {
    /// Platform writing to stdout
    pub fn new() -> Self {
        Self::with_writer(std::io::stdout())
    }

    pub fn with_writer(writer: impl Write + Send + 'static) -> Self {
        Self {
            out: Mutex::new(Box::new(writer)),
            sinks: Mutex::new(HashMap::new()),
        }
    }

    /// Hand an event to the client. `None` when nothing subscribed to it.
    pub async fn deliver(&self, event: &str, payload: EventPayload) -> Option<EventFiring> {
        let sink = self
            .sinks
            .lock()
            .ok()
            .and_then(|sinks| sinks.get(event).cloned())?;
        sink.emit_async(payload).await
    }

    fn write_line(&self, text: &str) -> Result<()> {
        let mut out = self
            .out
            .lock()
            .map_err(|e| anyhow::anyhow!("Console writer mutex poisoned: {}", e))?;
        writeln!(out, "{}", text).context("Failed to write to console")?;
        out.flush().context("Failed to flush console")?;
        Ok(())
    }
}

#[async_trait]
impl ChatPlatform for ConsolePlatform {
    fn platform_id(&self) -> &str {
        PLATFORM_ID
    }

    fn bot_user_id(&self) -> &str {
        BOT_USER_ID
    }

    async fn send(&self, _channel_id: &str, content: MessageContent) -> Result<()> {
        self.write_line(content.as_plain())
    }

    async fn connect(&self) -> Result<()> {
        self.deliver(names::READY, EventPayload::Empty).await;
        Ok(())
    }
}

impl EventSource for ConsolePlatform {
    fn subscribe(&self, event: &str, sink: EventSink) {
        tracing::debug!(event, "Console source subscribed");
        if let Ok(mut sinks) = self.sinks.lock() {
            sinks.insert(event.to_string(), sink);
        }
    }
}

/// One console conversation: a direct channel between the configured user and the bot
pub struct ConsoleSession {
    platform: Arc<ConsolePlatform>,
    channel: Arc<Channel>,
    user: ChatUser,
}

impl ConsoleSession {
    pub fn new(platform: Arc<ConsolePlatform>, config: &ConsoleConfig) -> Self {
        Self {
            platform,
            channel: Arc::new(Channel::direct(
                config.channel_id.clone(),
                vec![config.user_id.clone(), BOT_USER_ID.to_string()],
            )),
            user: ChatUser::new(config.user_id.clone()),
        }
    }

    pub fn message(&self, body: &str) -> IncomingMessage {
        let mut message = IncomingMessage::new(self.channel.clone(), self.user.clone(), body);
        message.platform_id = PLATFORM_ID.to_string();
        message
    }

    /// Feed lines from `reader` until it ends or `shutdown` is notified.
    /// Returns how many messages were delivered.
    pub async fn run<R>(&self, reader: R, shutdown: Arc<Notify>) -> Result<usize>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = reader.lines();
        let mut delivered = 0;

        loop {
            tokio::select! {
                biased;
                _ = shutdown.notified() => {
                    tracing::info!("Shutdown requested");
                    break;
                }
                line = lines.next_line() => {
                    let Some(line) = line.context("Failed to read console input")? else {
                        tracing::info!("Console input closed");
                        break;
                    };
                    let line = line.trim_end();
                    if line.is_empty() {
                        continue;
                    }
                    self.platform
                        .deliver(names::MESSAGE, self.message(line).into())
                        .await;
                    delivered += 1;
                }
            }
        }

        Ok(delivered)
    }
}
