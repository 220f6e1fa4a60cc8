// ABOUTME: Rate-limit store contract consumed by the command dispatcher
// ABOUTME: Fixed-window counting on top of pluggable get/set/remove storage

mod memory;
mod sqlite;

pub use memory::MemoryThrottleStore;
pub use sqlite::SqliteThrottleStore;

use crate::events::EventFiring;
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// Usage counter for one subject in one scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThrottleObject {
    /// Epoch milliseconds at which the window ends
    pub reset: i64,
    pub uses: u32,
}

/// How often something may be used
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThrottlePolicy {
    /// Allowed uses per window
    pub usages: u32,
    /// Window length in seconds
    pub duration: u64,
    /// Permission keys that, when all held, skip throttling
    #[serde(default)]
    pub bypass: Vec<String>,
}

impl ThrottlePolicy {
    pub fn new(usages: u32, duration: u64) -> Self {
        Self {
            usages,
            duration,
            bypass: Vec::new(),
        }
    }

    pub fn with_bypass(mut self, keys: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.bypass = keys.into_iter().map(Into::into).collect();
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottleResult {
    pub okay: bool,
    /// When the current window ends, if the subject is throttled
    pub reset: Option<i64>,
    pub throttle: ThrottleObject,
}

/// Source of "now" for throttle windows
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Clock that only moves when told to
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(start_millis: i64) -> Arc<Self> {
        Arc::new(Self {
            now: AtomicI64::new(start_millis),
        })
    }

    pub fn advance_secs(&self, secs: i64) {
        self.now.fetch_add(secs * 1000, Ordering::SeqCst);
    }

    pub fn set(&self, millis: i64) {
        self.now.store(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Fixed-window decision for one use at `now`.
///
/// Returns the result and the counter to store, if it changed.
pub fn apply_window(
    current: Option<ThrottleObject>,
    policy: &ThrottlePolicy,
    now: i64,
) -> (ThrottleResult, Option<ThrottleObject>) {
    match current {
        Some(current) if current.reset > now && current.uses >= policy.usages => (
            ThrottleResult {
                okay: false,
                reset: Some(current.reset),
                throttle: current,
            },
            None,
        ),
        Some(mut current) if current.reset > now => {
            current.uses += 1;
            (
                ThrottleResult {
                    okay: true,
                    reset: None,
                    throttle: current,
                },
                Some(current),
            )
        }
        _ => {
            let window = i64::try_from(policy.duration)
                .unwrap_or(i64::MAX / 1000)
                .saturating_mul(1000);
            let fresh = ThrottleObject {
                reset: now.saturating_add(window),
                uses: 1,
            };
            (
                ThrottleResult {
                    okay: policy.usages > 0,
                    reset: (policy.usages == 0).then_some(fresh.reset),
                    throttle: fresh,
                },
                Some(fresh),
            )
        }
    }
}

/// Storage for throttle counters.
///
/// Implementors provide raw storage; [`ThrottleStore::throttle`] applies
/// the window logic on top of it.
#[async_trait]
pub trait ThrottleStore: Send + Sync {
    fn now_millis(&self) -> i64;

    async fn get(&self, scope: &str, id: &str) -> Result<Option<ThrottleObject>>;

    async fn set(&self, scope: &str, id: &str, object: ThrottleObject) -> Result<()>;

    async fn remove(&self, scope: &str, id: &str) -> Result<()>;

    /// Count one use of `scope` by `id` against `policy`.
    ///
    /// The provided version is a separate `get` then `set`, so two concurrent
    /// calls for the same subject can both pass. Stores shared between tasks
    /// should override it with a single locked read-modify-write around
    /// [`apply_window`].
    async fn throttle(
        &self,
        scope: &str,
        policy: &ThrottlePolicy,
        id: &str,
        _firing: Option<&EventFiring>,
    ) -> Result<ThrottleResult> {
        let now = self.now_millis();
        let (result, write) = apply_window(self.get(scope, id).await?, policy, now);
        if let Some(object) = write {
            self.set(scope, id, object).await?;
        }
        Ok(result)
    }
}
