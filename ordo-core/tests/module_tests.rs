// ABOUTME: Integration tests for module activation through the client
// ABOUTME: Dependency order, failure handling, unloading and lifecycle events

use anyhow::Result;
use async_trait::async_trait;
use ordo_core::events::{listener_fn, names, EventOrder, EventPayload};
use ordo_core::traits::{ChatPlatform, MessageContent};
use ordo_core::{Client, Module, ModuleDescriptor, ModuleError};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

struct SilentPlatform;

#[async_trait]
impl ChatPlatform for SilentPlatform {
    fn platform_id(&self) -> &str {
        "silent"
    }

    fn bot_user_id(&self) -> &str {
        "bot"
    }

    async fn send(&self, _channel_id: &str, _content: MessageContent) -> Result<()> {
        Ok(())
    }
}

/// Module that logs its lifecycle and listens on `ready` under its own name
struct TestModule {
    descriptor: ModuleDescriptor,
    log: Arc<Mutex<Vec<String>>>,
    fail: bool,
}

impl TestModule {
    fn new(descriptor: ModuleDescriptor, log: &Arc<Mutex<Vec<String>>>) -> Arc<dyn Module> {
        Arc::new(Self {
            descriptor,
            log: log.clone(),
            fail: false,
        })
    }

    fn failing(descriptor: ModuleDescriptor, log: &Arc<Mutex<Vec<String>>>) -> Arc<dyn Module> {
        Arc::new(Self {
            descriptor,
            log: log.clone(),
            fail: true,
        })
    }
}

#[async_trait]
impl Module for TestModule {
    fn descriptor(&self) -> &ModuleDescriptor {
        &self.descriptor
    }

    async fn load(&self, client: &Client) -> Result<()> {
        self.register_event(client, names::READY, listener_fn(|_, _| Ok(())), EventOrder::new())?;
        if self.fail {
            anyhow::bail!("refusing to load");
        }
        self.log.lock().unwrap().push(format!("load {}", self.name()));
        Ok(())
    }

    async fn unload(&self, _client: &Client) -> Result<()> {
        self.log.lock().unwrap().push(format!("unload {}", self.name()));
        Ok(())
    }
}

/// Loads another module from inside its own load hook
struct Parent {
    descriptor: ModuleDescriptor,
    child: Arc<dyn Module>,
}

#[async_trait]
impl Module for Parent {
    fn descriptor(&self) -> &ModuleDescriptor {
        &self.descriptor
    }

    async fn load(&self, client: &Client) -> Result<()> {
        client.load_module(self.child.clone()).await?;
        Ok(())
    }
}

/// Unloads the built-in commands module while loading
struct Replacement {
    descriptor: ModuleDescriptor,
    unloaded: Arc<Mutex<Option<bool>>>,
}

#[async_trait]
impl Module for Replacement {
    fn descriptor(&self) -> &ModuleDescriptor {
        &self.descriptor
    }

    async fn load(&self, client: &Client) -> Result<()> {
        let unloaded = client.unload_module("commands").await;
        *self.unloaded.lock().unwrap() = Some(unloaded);
        Ok(())
    }
}

/// Load hook that waits until released
struct Gated {
    descriptor: ModuleDescriptor,
    entered: Arc<Notify>,
    release: Arc<Notify>,
}

#[async_trait]
impl Module for Gated {
    fn descriptor(&self) -> &ModuleDescriptor {
        &self.descriptor
    }

    async fn load(&self, _client: &Client) -> Result<()> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok(())
    }
}

/// Listens on two events and drops one of them on request
struct Watcher {
    descriptor: ModuleDescriptor,
}

#[async_trait]
impl Module for Watcher {
    fn descriptor(&self) -> &ModuleDescriptor {
        &self.descriptor
    }

    async fn load(&self, client: &Client) -> Result<()> {
        self.register_event(client, names::READY, listener_fn(|_, _| Ok(())), EventOrder::new())?;
        self.register_event(
            client,
            names::MESSAGE,
            listener_fn(|_, _| Ok(())),
            EventOrder::new().after("commands"),
        )?;
        Ok(())
    }
}

fn client() -> Client {
    Client::builder(Arc::new(SilentPlatform)).build().unwrap()
}

#[tokio::test]
async fn test_requirements_load_first() {
    let client = client();
    let log = Arc::new(Mutex::new(Vec::new()));

    client
        .load_modules(vec![
            TestModule::new(ModuleDescriptor::new("music").requires("voice"), &log),
            TestModule::new(ModuleDescriptor::new("voice"), &log),
            TestModule::new(ModuleDescriptor::new("stats").requires("commands"), &log),
        ])
        .await
        .unwrap();

    assert_eq!(
        *log.lock().unwrap(),
        vec!["load voice", "load music", "load stats"]
    );
    assert_eq!(
        client.module_names(),
        vec!["commands", "voice", "music", "stats"]
    );
}

#[tokio::test]
async fn test_missing_dependency_activates_nothing() {
    let client = client();
    let log = Arc::new(Mutex::new(Vec::new()));

    let err = client
        .load_modules(vec![
            TestModule::new(ModuleDescriptor::new("fun"), &log),
            TestModule::new(ModuleDescriptor::new("music").requires("voice"), &log),
        ])
        .await
        .unwrap_err();

    assert!(matches!(err, ModuleError::MissingDependency { ref dependency, .. } if dependency == "voice"));
    assert!(log.lock().unwrap().is_empty());
    assert_eq!(client.module_names(), vec!["commands"]);
}

#[tokio::test]
async fn test_duplicate_of_active_module() {
    let client = client();
    let log = Arc::new(Mutex::new(Vec::new()));

    client
        .load_module(TestModule::new(ModuleDescriptor::new("fun"), &log))
        .await
        .unwrap();
    let err = client
        .load_module(TestModule::new(ModuleDescriptor::new("fun"), &log))
        .await
        .unwrap_err();
    assert!(matches!(err, ModuleError::Duplicate(ref name) if name == "fun"));
}

#[tokio::test]
async fn test_failed_load_retracts_its_listeners() {
    let client = client();
    let log = Arc::new(Mutex::new(Vec::new()));

    let err = client
        .load_modules(vec![
            TestModule::new(ModuleDescriptor::new("first"), &log),
            TestModule::failing(ModuleDescriptor::new("broken"), &log),
            TestModule::new(ModuleDescriptor::new("last"), &log),
        ])
        .await
        .unwrap_err();

    assert!(matches!(err, ModuleError::LoadFailed { ref name, .. } if name == "broken"));
    assert_eq!(*log.lock().unwrap(), vec!["load first"]);
    assert_eq!(client.module_names(), vec!["commands", "first"]);
    assert_eq!(client.events().load_order(names::READY), vec!["first"]);
}

#[tokio::test]
async fn test_unload_retracts_group() {
    let client = client();
    let log = Arc::new(Mutex::new(Vec::new()));

    client
        .load_module(TestModule::new(ModuleDescriptor::new("fun"), &log))
        .await
        .unwrap();
    assert!(client.events().has_listener("fun", names::READY));

    assert!(client.unload_module("fun").await);
    assert!(!client.unload_module("fun").await);
    assert!(!client.events().has_listener("fun", names::READY));
    assert_eq!(*log.lock().unwrap(), vec!["load fun", "unload fun"]);
    assert!(!client.has_module("fun"));
}

#[tokio::test]
async fn test_unloading_commands_stops_dispatch() {
    let client = client();
    assert!(client.events().has_listener("commands", names::MESSAGE));
    assert!(client.unload_module("commands").await);
    assert!(client.events().load_order(names::MESSAGE).is_empty());
}

#[tokio::test]
async fn test_connect_and_disconnect_fire_lifecycle_events() {
    let client = client();
    let log = Arc::new(Mutex::new(Vec::new()));

    for event in [
        names::BEFORE_CONNECT,
        names::AFTER_CONNECT,
        names::BEFORE_DISCONNECT,
        names::AFTER_DISCONNECT,
    ] {
        let log = log.clone();
        client
            .events()
            .register(
                "lifecycle",
                event,
                listener_fn(move |firing, payload| {
                    assert!(matches!(payload, EventPayload::Empty));
                    log.lock().unwrap().push(firing.name().to_string());
                    Ok(())
                }),
                EventOrder::new(),
            )
            .unwrap();
    }

    client.connect().await.unwrap();
    client.disconnect().await.unwrap();
    assert_eq!(
        *log.lock().unwrap(),
        vec![
            "beforeConnect",
            "afterConnect",
            "beforeDisconnect",
            "afterDisconnect"
        ]
    );
}

#[tokio::test]
async fn test_load_hook_can_load_another_module() {
    let client = client();
    let log = Arc::new(Mutex::new(Vec::new()));
    let parent: Arc<dyn Module> = Arc::new(Parent {
        descriptor: ModuleDescriptor::new("parent"),
        child: TestModule::new(ModuleDescriptor::new("child").requires("parent"), &log),
    });

    tokio::time::timeout(Duration::from_secs(2), client.load_module(parent))
        .await
        .expect("nested load should not hang")
        .unwrap();

    assert_eq!(client.module_names(), vec!["commands", "child", "parent"]);
    assert_eq!(*log.lock().unwrap(), vec!["load child"]);
}

#[tokio::test]
async fn test_load_hook_can_unload_another_module() {
    let client = client();
    let unloaded = Arc::new(Mutex::new(None));
    let replacement: Arc<dyn Module> = Arc::new(Replacement {
        descriptor: ModuleDescriptor::new("replacement"),
        unloaded: unloaded.clone(),
    });

    tokio::time::timeout(Duration::from_secs(2), client.load_module(replacement))
        .await
        .expect("unload from a load hook should not hang")
        .unwrap();

    assert_eq!(*unloaded.lock().unwrap(), Some(true));
    assert_eq!(client.module_names(), vec!["replacement"]);
    assert!(!client.events().has_listener("commands", names::MESSAGE));
}

#[tokio::test]
async fn test_loading_name_is_reserved() {
    let client = client();
    let log = Arc::new(Mutex::new(Vec::new()));
    let entered = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let gated: Arc<dyn Module> = Arc::new(Gated {
        descriptor: ModuleDescriptor::new("slow"),
        entered: entered.clone(),
        release: release.clone(),
    });

    let task = {
        let client = client.clone();
        tokio::spawn(async move { client.load_module(gated).await })
    };
    entered.notified().await;

    let err = client
        .load_module(TestModule::new(ModuleDescriptor::new("slow"), &log))
        .await
        .unwrap_err();
    assert!(matches!(err, ModuleError::Duplicate(ref name) if name == "slow"));
    assert!(!client.has_module("slow"));
    assert!(!client.unload_module("slow").await);

    release.notify_one();
    task.await.unwrap().unwrap();
    assert!(client.has_module("slow"));
    assert!(log.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_module_event_helpers_use_module_group() {
    let client = client();
    let watcher: Arc<dyn Module> = Arc::new(Watcher {
        descriptor: ModuleDescriptor::new("watcher"),
    });
    client.load_module(watcher.clone()).await.unwrap();

    assert!(client.events().has_listener("watcher", names::READY));
    assert_eq!(
        client.events().load_order(names::MESSAGE),
        vec!["commands", "watcher"]
    );

    assert!(watcher.unregister_event(&client, names::READY));
    assert!(!watcher.unregister_event(&client, names::READY));
    assert!(!client.events().has_listener("watcher", names::READY));
    assert!(client.events().has_listener("watcher", names::MESSAGE));

    assert!(client.unload_module("watcher").await);
    assert!(!client.events().has_listener("watcher", names::MESSAGE));
    assert_eq!(client.events().load_order(names::MESSAGE), vec!["commands"]);
}
