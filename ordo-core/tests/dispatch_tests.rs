// ABOUTME: Integration tests for the command dispatch pipeline
// ABOUTME: Drives CommandDispatcher and Client with a mock platform that records replies

use anyhow::Result;
use async_trait::async_trait;
use ordo_core::commands::dispatcher::INVOKED_KEY;
use ordo_core::commands::{
    BlockReason, Command, CommandContext, CommandDispatcher, CommandOptions, CommandOutput,
    CommandRegistry, DispatchOutcome,
};
use ordo_core::config::{ClientConfig, SYSTEM_USER_ID};
use ordo_core::events::{names, EventFiring, EventPayload};
use ordo_core::permissions::{ChannelPermissions, PermissionRegistry, ELEVATED};
use ordo_core::throttle::{ManualClock, MemoryThrottleStore, ThrottlePolicy, ThrottleStore};
use ordo_core::traits::{Channel, ChatPlatform, ChatUser, IncomingMessage, MessageContent, Server};
use ordo_core::Client;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Mock platform that records everything sent
pub struct MockPlatform {
    bot_id: String,
    sent: Arc<Mutex<Vec<(String, String)>>>,
}

impl MockPlatform {
    pub fn new() -> Self {
        Self {
            bot_id: "bot".to_string(),
            sent: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn sent_texts(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(_, text)| text.clone())
            .collect()
    }
}

#[async_trait]
impl ChatPlatform for MockPlatform {
    fn platform_id(&self) -> &str {
        "mock"
    }

    fn bot_user_id(&self) -> &str {
        &self.bot_id
    }

    async fn send(&self, channel_id: &str, content: MessageContent) -> Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((channel_id.to_string(), content.as_plain().to_string()));
        Ok(())
    }
}

/// Command that counts runs and answers with a fixed reply
struct Reply {
    options: CommandOptions,
    reply: &'static str,
    runs: Arc<AtomicUsize>,
}

impl Reply {
    fn new(options: CommandOptions, reply: &'static str) -> (Arc<Self>, Arc<AtomicUsize>) {
        let runs = Arc::new(AtomicUsize::new(0));
        let command = Arc::new(Self {
            options,
            reply,
            runs: runs.clone(),
        });
        (command, runs)
    }
}

#[async_trait]
impl Command for Reply {
    fn options(&self) -> &CommandOptions {
        &self.options
    }

    async fn run(&self, _ctx: &CommandContext) -> Result<CommandOutput> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        Ok(self.reply.into())
    }
}

/// Replies with its arguments joined by `|`
struct Echo(CommandOptions);

#[async_trait]
impl Command for Echo {
    fn options(&self) -> &CommandOptions {
        &self.0
    }

    async fn run(&self, ctx: &CommandContext) -> Result<CommandOutput> {
        Ok(CommandOutput::Text(ctx.args.join("|")))
    }
}

struct Failing {
    options: CommandOptions,
    panic: bool,
}

#[async_trait]
impl Command for Failing {
    fn options(&self) -> &CommandOptions {
        &self.options
    }

    async fn run(&self, _ctx: &CommandContext) -> Result<CommandOutput> {
        if self.panic {
            panic!("kaboom");
        }
        anyhow::bail!("broken")
    }
}

/// Records the block reasons it receives instead of replying
struct Quiet {
    options: CommandOptions,
    blocks: Arc<Mutex<Vec<BlockReason>>>,
}

#[async_trait]
impl Command for Quiet {
    fn options(&self) -> &CommandOptions {
        &self.options
    }

    async fn run(&self, _ctx: &CommandContext) -> Result<CommandOutput> {
        Ok(CommandOutput::Empty)
    }

    async fn on_block(&self, _ctx: &CommandContext, reason: &BlockReason) -> Result<()> {
        self.blocks.lock().unwrap().push(reason.clone());
        Ok(())
    }
}

/// Command whose block handler panics
struct FragileBlock(CommandOptions);

#[async_trait]
impl Command for FragileBlock {
    fn options(&self) -> &CommandOptions {
        &self.0
    }

    async fn run(&self, _ctx: &CommandContext) -> Result<CommandOutput> {
        Ok("ran".into())
    }

    async fn on_block(&self, _ctx: &CommandContext, _reason: &BlockReason) -> Result<()> {
        panic!("block handler exploded");
    }
}

struct Harness {
    platform: Arc<MockPlatform>,
    commands: CommandRegistry,
    permissions: PermissionRegistry,
    clock: Arc<ManualClock>,
    dispatcher: CommandDispatcher,
}

impl Harness {
    fn new(config: ClientConfig) -> Self {
        let platform = Arc::new(MockPlatform::new());
        let commands = CommandRegistry::new();
        let permissions = PermissionRegistry::new(config.elevated.clone());
        let clock = ManualClock::new(1_000_000);
        let throttles: Arc<dyn ThrottleStore> =
            Arc::new(MemoryThrottleStore::with_clock(clock.clone()));
        let dispatcher = CommandDispatcher::new(
            commands.clone(),
            permissions.clone(),
            throttles,
            platform.clone(),
            Arc::new(config),
        );
        Self {
            platform,
            commands,
            permissions,
            clock,
            dispatcher,
        }
    }

    fn with_prefix(prefix: &str) -> Self {
        Self::new(ClientConfig::default().with_prefix(prefix))
    }

    async fn send_from(&self, channel: &Arc<Channel>, author: &str, body: &str) -> DispatchOutcome {
        let message = Arc::new(IncomingMessage::new(
            channel.clone(),
            ChatUser::new(author),
            body,
        ));
        let mut firing = EventFiring::new(names::MESSAGE);
        self.dispatcher.dispatch(&mut firing, &message).await
    }

    async fn send(&self, author: &str, body: &str) -> DispatchOutcome {
        let channel = Arc::new(Channel::direct("dm", vec![author.to_string()]));
        self.send_from(&channel, author, body).await
    }
}

#[tokio::test]
async fn test_ping_replies() {
    let harness = Harness::with_prefix("!");
    let (ping, runs) = Reply::new(CommandOptions::new("ping"), "Pong!");
    harness.commands.register(ping).unwrap();

    assert_eq!(harness.send("u1", "!ping").await, DispatchOutcome::Completed);
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(harness.platform.sent_texts(), vec!["Pong!"]);
}

#[tokio::test]
async fn test_spaced_prefix_and_alias() {
    let harness = Harness::with_prefix("bot");
    let (ping, runs) = Reply::new(CommandOptions::new("ping").alias("p"), "Pong!");
    harness.commands.register(ping).unwrap();

    assert_eq!(harness.send("u1", "bot p").await, DispatchOutcome::Completed);
    assert_eq!(harness.send("u1", "BOT ping").await, DispatchOutcome::Completed);
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_pipeline_stops_early() {
    let harness = Harness::with_prefix("!");
    let (ping, runs) = Reply::new(CommandOptions::new("ping"), "Pong!");
    harness.commands.register(ping).unwrap();

    assert_eq!(harness.send("u1", "ping").await, DispatchOutcome::NoMatch);
    assert_eq!(harness.send("u1", "!pong").await, DispatchOutcome::UnknownCommand);
    assert_eq!(harness.send("u1", "!").await, DispatchOutcome::UnknownCommand);
    assert_eq!(harness.send("u1", "").await, DispatchOutcome::Ignored);
    assert_eq!(harness.send("bot", "!ping").await, DispatchOutcome::Ignored);
    assert_eq!(harness.send(SYSTEM_USER_ID, "!ping").await, DispatchOutcome::Ignored);
    assert_eq!(runs.load(Ordering::SeqCst), 0);
    assert!(harness.platform.sent_texts().is_empty());

    let no_prefix = Harness::new(ClientConfig::default());
    assert_eq!(no_prefix.send("u1", "!ping").await, DispatchOutcome::NoPrefix);
}

#[tokio::test]
async fn test_firing_bag_is_populated() {
    let harness = Harness::with_prefix("!");
    let (ping, _) = Reply::new(CommandOptions::new("ping"), "Pong!");
    harness.commands.register(ping).unwrap();

    let channel = Arc::new(Channel::direct("dm", vec![]));
    let message = Arc::new(IncomingMessage::new(channel, ChatUser::new("u1"), "! ping a b"));
    let mut firing = EventFiring::new(names::MESSAGE);
    harness.dispatcher.dispatch(&mut firing, &message).await;

    assert_eq!(firing.get::<bool>(INVOKED_KEY), Some(&true));
    assert_eq!(firing.get::<bool>("commands/spacedPrefix"), Some(&true));
    assert_eq!(
        firing.get::<String>("commands/strippedContent").map(String::as_str),
        Some("ping a b")
    );
    assert_eq!(
        firing.get::<String>("commands/commandName").map(String::as_str),
        Some("ping")
    );
    let ctx = firing.get::<CommandContext>("commands/ctx").unwrap();
    assert_eq!(ctx.args, vec!["a", "b"]);
    assert_eq!(ctx.prefix, "!");

    let unknown = Arc::new(IncomingMessage::new(
        Arc::new(Channel::direct("dm", vec![])),
        ChatUser::new("u1"),
        "!nothing",
    ));
    let mut firing = EventFiring::new(names::MESSAGE);
    harness.dispatcher.dispatch(&mut firing, &unknown).await;
    assert_eq!(firing.get::<bool>(INVOKED_KEY), Some(&false));
    assert!(!firing.has("commands/ctx"));
}

#[tokio::test]
async fn test_quoted_arguments() {
    let harness = Harness::with_prefix("!");
    harness
        .commands
        .register(Arc::new(Echo(CommandOptions::new("echo"))))
        .unwrap();

    harness
        .send("u1", r#"!echo "hello world" 'it is' plain """#)
        .await;
    assert_eq!(harness.platform.sent_texts(), vec!["hello world|it is|plain|"]);
}

#[tokio::test]
async fn test_missing_permission_blocks_without_running() {
    let harness = Harness::with_prefix("!");
    harness
        .permissions
        .register("music.dj", |subject, _| subject.user.id == "dj")
        .unwrap();
    let (skip, runs) = Reply::new(CommandOptions::new("skip").permission("music.dj"), "Skipped");
    harness.commands.register(skip).unwrap();

    assert_eq!(
        harness.send("u1", "!skip").await,
        DispatchOutcome::Blocked("permission")
    );
    assert_eq!(runs.load(Ordering::SeqCst), 0);
    assert_eq!(
        harness.platform.sent_texts(),
        vec!["The `skip` command requires you to have the \"music.dj\" permission."]
    );

    assert_eq!(harness.send("dj", "!skip").await, DispatchOutcome::Completed);
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_elevated_and_inserver_messages() {
    let harness = Harness::new(ClientConfig::default().with_prefix("!").with_elevated("dev"));
    let (eval, _) = Reply::new(CommandOptions::new("eval").permission(ELEVATED), "ok");
    let (ban, _) = Reply::new(CommandOptions::new("ban").permission("ordo.inserver"), "ok");
    harness.commands.register(eval).unwrap();
    harness.commands.register(ban).unwrap();

    harness.send("u1", "!eval").await;
    harness.send("u1", "!ban").await;
    assert_eq!(harness.send("dev", "!eval").await, DispatchOutcome::Completed);

    let sent = harness.platform.sent_texts();
    assert_eq!(
        sent[0],
        "The `eval` command can only be used by the bot developers or elevated users."
    );
    assert_eq!(sent[1], "The `ban` command can only be ran in servers.");
}

#[tokio::test]
async fn test_throttle_blocks_until_window_passes() {
    let harness = Harness::with_prefix("!");
    let blocks = Arc::new(Mutex::new(Vec::new()));
    harness
        .commands
        .register(Arc::new(Quiet {
            options: CommandOptions::new("roll").throttling(ThrottlePolicy::new(1, 60)),
            blocks: blocks.clone(),
        }))
        .unwrap();

    assert_eq!(harness.send("u1", "!roll").await, DispatchOutcome::Completed);
    harness.clock.advance_secs(10);
    assert_eq!(
        harness.send("u1", "!roll").await,
        DispatchOutcome::Blocked("throttling")
    );
    // Another user has their own window
    assert_eq!(harness.send("u2", "!roll").await, DispatchOutcome::Completed);

    match &blocks.lock().unwrap()[0] {
        BlockReason::Throttling { remaining, throttle } => {
            assert_eq!(*remaining, Some(50.0));
            assert_eq!(throttle.uses, 1);
        }
        other => panic!("unexpected block: {:?}", other),
    }

    harness.clock.advance_secs(51);
    assert_eq!(harness.send("u1", "!roll").await, DispatchOutcome::Completed);
}

#[tokio::test]
async fn test_throttle_default_reply() {
    let harness = Harness::with_prefix("!");
    let (roll, runs) = Reply::new(
        CommandOptions::new("roll").throttling(ThrottlePolicy::new(1, 60)),
        "4",
    );
    harness.commands.register(roll).unwrap();

    harness.send("u1", "!roll").await;
    harness.send("u1", "!roll").await;
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(
        harness.platform.sent_texts(),
        vec![
            "4",
            "You may not use the `roll` command again for another 60.0 seconds."
        ]
    );
}

#[tokio::test]
async fn test_throttle_bypass_requires_every_key() {
    let harness = Harness::new(ClientConfig::default().with_prefix("!").with_elevated("dev"));
    harness
        .permissions
        .register("vip", |subject, _| subject.user.id == "dev" || subject.user.id == "vip")
        .unwrap();
    let (roll, runs) = Reply::new(
        CommandOptions::new("roll")
            .throttling(ThrottlePolicy::new(1, 60).with_bypass([ELEVATED, "vip"])),
        "4",
    );
    harness.commands.register(roll).unwrap();

    for _ in 0..3 {
        assert_eq!(harness.send("dev", "!roll").await, DispatchOutcome::Completed);
    }
    assert_eq!(harness.send("vip", "!roll").await, DispatchOutcome::Completed);
    assert_eq!(
        harness.send("vip", "!roll").await,
        DispatchOutcome::Blocked("throttling")
    );
    assert_eq!(runs.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_client_channel_permissions() {
    let harness = Harness::with_prefix("!");
    let (purge, runs) = Reply::new(
        CommandOptions::new("purge")
            .client_channel_permissions(ChannelPermissions::MANAGE_MESSAGES),
        "done",
    );
    harness.commands.register(purge).unwrap();

    let server = Arc::new(Server::new("s1", "owner"));
    let channel = Arc::new(Channel::in_server("c1", server));
    assert_eq!(
        harness.send_from(&channel, "u1", "!purge").await,
        DispatchOutcome::Blocked("clientChannelPermissions")
    );
    assert_eq!(runs.load(Ordering::SeqCst), 0);
    assert_eq!(
        harness.platform.sent_texts(),
        vec!["I need the \"Manage Messages\" channel permission for the `purge` command to work."]
    );
}

#[tokio::test]
async fn test_bot_without_send_permission_is_ignored() {
    let harness = Harness::with_prefix("!");
    let (ping, _) = Reply::new(CommandOptions::new("ping"), "Pong!");
    harness.commands.register(ping).unwrap();

    let mut server = Server::new("s1", "owner");
    server.default_channel_permissions = ChannelPermissions::VIEW;
    let channel = Arc::new(Channel::in_server("c1", Arc::new(server)));
    assert_eq!(
        harness.send_from(&channel, "u1", "!ping").await,
        DispatchOutcome::Ignored
    );
}

#[tokio::test]
async fn test_errors_and_panics_are_contained() {
    let harness = Harness::with_prefix("!");
    harness
        .commands
        .register(Arc::new(Failing {
            options: CommandOptions::new("boom"),
            panic: false,
        }))
        .unwrap();
    harness
        .commands
        .register(Arc::new(Failing {
            options: CommandOptions::new("panic"),
            panic: true,
        }))
        .unwrap();

    assert_eq!(harness.send("u1", "!boom").await, DispatchOutcome::Errored);
    assert_eq!(harness.send("u1", "!panic").await, DispatchOutcome::Errored);
    assert_eq!(
        harness.platform.sent_texts(),
        vec![
            "An error occurred while running the `boom` command.",
            "An error occurred while running the `panic` command."
        ]
    );
}

#[tokio::test]
async fn test_panicking_block_handler_is_contained() {
    let harness = Harness::with_prefix("!");
    harness
        .permissions
        .register("staff", |subject, _| subject.user.id == "staff")
        .unwrap();
    harness
        .commands
        .register(Arc::new(FragileBlock(CommandOptions::new("purge").permission("staff"))))
        .unwrap();

    assert_eq!(
        harness.send("u1", "!purge").await,
        DispatchOutcome::Blocked("permission")
    );
    assert!(harness.platform.sent_texts().is_empty());

    // the dispatcher keeps working afterwards
    assert_eq!(harness.send("staff", "!purge").await, DispatchOutcome::Completed);
    assert_eq!(harness.platform.sent_texts(), vec!["ran"]);
}

#[tokio::test]
async fn test_mention_prefix() {
    let config = ClientConfig {
        mention_prefix: true,
        ..ClientConfig::default()
    };
    let harness = Harness::new(config);
    let (ping, runs) = Reply::new(CommandOptions::new("ping"), "Pong!");
    harness.commands.register(ping).unwrap();

    assert_eq!(harness.send("u1", "<@bot> ping").await, DispatchOutcome::Completed);
    assert_eq!(harness.send("u1", "!ping").await, DispatchOutcome::NoMatch);
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_client_routes_message_events_to_commands() {
    let platform = Arc::new(MockPlatform::new());
    let client = Client::builder(platform.clone())
        .config(ClientConfig::default().with_prefix("!"))
        .build()
        .unwrap();
    let (ping, _) = Reply::new(CommandOptions::new("ping"), "Pong!");
    client.commands().register(ping).unwrap();

    let channel = Arc::new(Channel::direct("dm", vec![]));
    let firing = client
        .events()
        .emit_async(
            names::MESSAGE,
            EventPayload::from(IncomingMessage::new(channel, ChatUser::new("u1"), "!ping")),
        )
        .await;

    assert_eq!(firing.get::<bool>(INVOKED_KEY), Some(&true));
    assert_eq!(platform.sent_texts(), vec!["Pong!"]);
    assert_eq!(client.module_names(), vec!["commands"]);
}

#[tokio::test]
async fn test_firing_prefix_override() {
    let platform = Arc::new(MockPlatform::new());
    let client = Client::builder(platform.clone())
        .config(ClientConfig::default().with_prefix("!"))
        .build()
        .unwrap();
    let (ping, _) = Reply::new(CommandOptions::new("ping"), "Pong!");
    client.commands().register(ping).unwrap();

    // A guild-settings style listener that swaps prefixes before commands run
    client
        .events()
        .register(
            "settings",
            names::MESSAGE,
            ordo_core::events::listener_fn(|firing, _| {
                firing.set("commands/prefix", "?".to_string());
                firing.set("commands/skipConfigPrefix", true);
                Ok(())
            }),
            ordo_core::EventOrder::new().after("commands"),
        )
        .unwrap();

    let channel = Arc::new(Channel::direct("dm", vec![]));
    for body in ["!ping", "?ping"] {
        client
            .events()
            .emit_async(
                names::MESSAGE,
                IncomingMessage::new(channel.clone(), ChatUser::new("u1"), body).into(),
            )
            .await;
    }
    assert_eq!(platform.sent_texts(), vec!["Pong!"]);
}
