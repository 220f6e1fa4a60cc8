// ABOUTME: In-process throttle store keyed by scope and subject
// ABOUTME: Counters vanish on restart; expired entries can be flushed on demand

use super::{apply_window, Clock, SystemClock, ThrottleObject, ThrottlePolicy, ThrottleResult, ThrottleStore};
use crate::events::EventFiring;
use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

const SEPARATOR: &str = "|";

pub struct MemoryThrottleStore {
    throttles: Mutex<HashMap<String, ThrottleObject>>,
    clock: Arc<dyn Clock>,
}

impl Default for MemoryThrottleStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryThrottleStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            throttles: Mutex::new(HashMap::new()),
            clock,
        }
    }

    fn key(scope: &str, id: &str) -> String {
        [scope, id].join(SEPARATOR)
    }

    /// Drop every counter whose window has ended. Returns how many were removed.
    pub fn flush_expired(&self) -> usize {
        let now = self.clock.now_millis();
        let mut throttles = self.throttles.lock();
        let before = throttles.len();
        throttles.retain(|_, t| t.reset > now);
        before - throttles.len()
    }

    pub fn len(&self) -> usize {
        self.throttles.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ThrottleStore for MemoryThrottleStore {
    fn now_millis(&self) -> i64 {
        self.clock.now_millis()
    }

    async fn get(&self, scope: &str, id: &str) -> Result<Option<ThrottleObject>> {
        Ok(self.throttles.lock().get(&Self::key(scope, id)).copied())
    }

    async fn set(&self, scope: &str, id: &str, object: ThrottleObject) -> Result<()> {
        self.throttles.lock().insert(Self::key(scope, id), object);
        Ok(())
    }

    async fn remove(&self, scope: &str, id: &str) -> Result<()> {
        self.throttles.lock().remove(&Self::key(scope, id));
        Ok(())
    }

    async fn throttle(
        &self,
        scope: &str,
        policy: &ThrottlePolicy,
        id: &str,
        _firing: Option<&EventFiring>,
    ) -> Result<ThrottleResult> {
        let key = Self::key(scope, id);
        let now = self.clock.now_millis();
        let mut throttles = self.throttles.lock();
        let (result, write) = apply_window(throttles.get(&key).copied(), policy, now);
        if let Some(object) = write {
            throttles.insert(key, object);
        }
        Ok(result)
    }
}
