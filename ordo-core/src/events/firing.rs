// ABOUTME: Per-firing state shared by the listeners of one event occurrence
// ABOUTME: Holds the skip list and a typed key/value bag, dropped when the firing ends

use std::any::Any;
use std::collections::HashMap;
use std::fmt;

/// State for one firing of an event.
///
/// Listeners run sequentially and all receive the same `EventFiring`, so a
/// listener can hand derived values to later ones through the data bag, or
/// stop later groups from running with [`EventFiring::skip`].
pub struct EventFiring {
    name: String,
    skipped: Vec<String>,
    data: HashMap<String, Box<dyn Any + Send + Sync>>,
}

impl EventFiring {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            skipped: Vec::new(),
            data: HashMap::new(),
        }
    }

    /// The event this firing belongs to
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Skip a group's listener for this firing, if it has not run yet.
    pub fn skip(&mut self, group: impl Into<String>) {
        let group = group.into();
        if !self.skipped.contains(&group) {
            self.skipped.push(group);
        }
    }

    pub fn is_skipped(&self, group: &str) -> bool {
        self.skipped.iter().any(|g| g == group)
    }

    /// Skipped groups in the order they were skipped
    pub fn skipped(&self) -> &[String] {
        &self.skipped
    }

    pub fn has(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    /// Typed lookup; `None` if missing or stored under a different type
    pub fn get<T: Any>(&self, key: &str) -> Option<&T> {
        self.data.get(key).and_then(|v| v.downcast_ref::<T>())
    }

    pub fn get_mut<T: Any>(&mut self, key: &str) -> Option<&mut T> {
        self.data.get_mut(key).and_then(|v| v.downcast_mut::<T>())
    }

    pub fn set<T: Any + Send + Sync>(&mut self, key: impl Into<String>, value: T) {
        self.data.insert(key.into(), Box::new(value));
    }

    pub fn remove(&mut self, key: &str) -> bool {
        self.data.remove(key).is_some()
    }

    /// Remove and return a value; left in place if the type does not match
    pub fn take<T: Any>(&mut self, key: &str) -> Option<T> {
        if !self.data.get(key)?.is::<T>() {
            return None;
        }
        self.data
            .remove(key)
            .and_then(|v| v.downcast::<T>().ok())
            .map(|v| *v)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.data.keys().map(String::as_str)
    }
}

impl fmt::Debug for EventFiring {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&str> = self.keys().collect();
        keys.sort_unstable();
        f.debug_struct("EventFiring")
            .field("name", &self.name)
            .field("skipped", &self.skipped)
            .field("keys", &keys)
            .finish()
    }
}
