// ABOUTME: Registry of named permission predicates with protected core keys
// ABOUTME: Results can be memoized per firing so repeated checks do not re-run predicates

pub mod flags;

use crate::error::PermissionError;
use crate::events::EventFiring;
use crate::traits::{ChatUser, IncomingMessage, Member};
use flags::{channel_permissions, server_permissions, CHANNEL_FLAGS, SERVER_FLAGS};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

pub use flags::{ChannelPermissions, ServerPermissions, DEFAULT_DM_PERMISSIONS};

pub const CHANNEL_PREFIX: &str = "platform.channel.";
pub const SERVER_PREFIX: &str = "platform.server.";
pub const ELEVATED: &str = "ordo.elevated";
pub const IN_SERVER: &str = "ordo.inserver";

/// Firing bag key holding the memoized [`PermissionMap`]
pub const MAP_KEY: &str = "permissions/map";

/// Who a permission is being checked for
#[derive(Debug, Clone)]
pub struct PermissionSubject {
    pub user: ChatUser,
    pub member: Option<Member>,
    pub message: Option<Arc<IncomingMessage>>,
}

impl PermissionSubject {
    pub fn from_message(message: &Arc<IncomingMessage>) -> Self {
        Self {
            user: message.sender.clone(),
            member: message.member.clone(),
            message: Some(message.clone()),
        }
    }

    pub fn from_user(user: ChatUser) -> Self {
        Self {
            user,
            member: None,
            message: None,
        }
    }
}

pub type PermissionFn =
    Arc<dyn Fn(&PermissionSubject, Option<&EventFiring>) -> bool + Send + Sync>;

/// Key -> result, keyed exactly as requested
pub type PermissionMap = HashMap<String, bool>;

/// Every key the registry owns and callers may not replace
pub fn core_keys() -> Vec<String> {
    CHANNEL_FLAGS
        .iter()
        .map(|(suffix, _, _)| format!("{}{}", CHANNEL_PREFIX, suffix))
        .chain(
            SERVER_FLAGS
                .iter()
                .map(|(suffix, _, _)| format!("{}{}", SERVER_PREFIX, suffix)),
        )
        .chain([ELEVATED.to_string(), IN_SERVER.to_string()])
        .collect()
}

pub fn is_core_key(key: &str) -> bool {
    let key = key.to_lowercase();
    key == ELEVATED
        || key == IN_SERVER
        || key
            .strip_prefix(CHANNEL_PREFIX)
            .is_some_and(|s| CHANNEL_FLAGS.iter().any(|(suffix, _, _)| *suffix == s))
        || key
            .strip_prefix(SERVER_PREFIX)
            .is_some_and(|s| SERVER_FLAGS.iter().any(|(suffix, _, _)| *suffix == s))
}

/// Human-readable name for a permission key, falling back to the key
pub fn permission_name(key: &str) -> String {
    let lower = key.to_lowercase();
    if lower == ELEVATED {
        return "Bot developer".to_string();
    }
    if lower == IN_SERVER {
        return "Ran in a Server".to_string();
    }
    if let Some(suffix) = lower.strip_prefix(CHANNEL_PREFIX) {
        if let Some((_, _, name)) = CHANNEL_FLAGS.iter().find(|(s, _, _)| *s == suffix) {
            return name.to_string();
        }
    }
    if let Some(suffix) = lower.strip_prefix(SERVER_PREFIX) {
        if let Some((_, _, name)) = SERVER_FLAGS.iter().find(|(s, _, _)| *s == suffix) {
            return name.to_string();
        }
    }
    key.to_string()
}

fn channel_predicate(flag: ChannelPermissions) -> PermissionFn {
    Arc::new(move |subject: &PermissionSubject, _: Option<&EventFiring>| {
        let Some(channel) = subject.message.as_ref().and_then(|m| m.channel.as_ref()) else {
            return DEFAULT_DM_PERMISSIONS.contains(flag);
        };
        channel_permissions(channel, &subject.user.id).contains(flag)
    })
}

fn server_predicate(flag: ServerPermissions) -> PermissionFn {
    Arc::new(move |subject: &PermissionSubject, _: Option<&EventFiring>| {
        subject
            .message
            .as_ref()
            .and_then(|m| m.server())
            .is_some_and(|server| server_permissions(server, &subject.user.id).contains(flag))
    })
}

/// Named boolean predicates over a [`PermissionSubject`].
#[derive(Clone)]
pub struct PermissionRegistry {
    permissions: Arc<RwLock<HashMap<String, PermissionFn>>>,
}

impl Default for PermissionRegistry {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl PermissionRegistry {
    /// Registry with the core keys installed; `elevated` lists user ids that
    /// hold `ordo.elevated`.
    pub fn new(elevated: Vec<String>) -> Self {
        let mut permissions: HashMap<String, PermissionFn> = HashMap::new();

        for (suffix, flag, _) in CHANNEL_FLAGS {
            permissions.insert(format!("{}{}", CHANNEL_PREFIX, suffix), channel_predicate(*flag));
        }
        for (suffix, flag, _) in SERVER_FLAGS {
            permissions.insert(format!("{}{}", SERVER_PREFIX, suffix), server_predicate(*flag));
        }

        permissions.insert(
            ELEVATED.to_string(),
            Arc::new(move |subject: &PermissionSubject, _: Option<&EventFiring>| {
                elevated.iter().any(|id| *id == subject.user.id)
            }),
        );
        permissions.insert(
            IN_SERVER.to_string(),
            Arc::new(|subject: &PermissionSubject, _: Option<&EventFiring>| {
                subject.member.is_some()
                    || subject
                        .message
                        .as_ref()
                        .is_some_and(|m| m.server().is_some())
            }),
        );

        Self {
            permissions: Arc::new(RwLock::new(permissions)),
        }
    }

    /// Register a custom permission. Core keys cannot be replaced.
    pub fn register<F>(&self, key: &str, predicate: F) -> Result<(), PermissionError>
    where
        F: Fn(&PermissionSubject, Option<&EventFiring>) -> bool + Send + Sync + 'static,
    {
        let key = key.to_lowercase();
        if is_core_key(&key) {
            return Err(PermissionError::Protected(key));
        }
        tracing::debug!(permission = %key, "Registering permission");
        self.permissions.write().insert(key, Arc::new(predicate));
        Ok(())
    }

    /// Remove a custom permission. Returns whether it existed.
    pub fn unregister(&self, key: &str) -> Result<bool, PermissionError> {
        let key = key.to_lowercase();
        if is_core_key(&key) {
            return Err(PermissionError::Protected(key));
        }
        tracing::debug!(permission = %key, "Unregistering permission");
        Ok(self.permissions.write().remove(&key).is_some())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.permissions.read().contains_key(&key.to_lowercase())
    }

    /// Check one permission; unknown keys are false.
    pub fn has(&self, subject: &PermissionSubject, key: &str, firing: Option<&EventFiring>) -> bool {
        let key = key.to_lowercase();
        if key.is_empty() {
            return false;
        }
        let predicate = self.permissions.read().get(&key).cloned();
        predicate.is_some_and(|p| p(subject, firing))
    }

    /// Evaluate `keys`, skipping any already present in `previous`.
    pub fn map<S: AsRef<str>>(
        &self,
        subject: &PermissionSubject,
        keys: &[S],
        mut previous: PermissionMap,
        firing: Option<&EventFiring>,
    ) -> PermissionMap {
        for key in keys {
            let key = key.as_ref();
            if previous.contains_key(key) {
                continue;
            }
            let result = self.has(subject, key, firing);
            previous.insert(key.to_string(), result);
        }
        previous
    }

    /// [`map`](Self::map) memoized in the firing's bag under [`MAP_KEY`].
    pub fn map_cached<S: AsRef<str>>(
        &self,
        subject: &PermissionSubject,
        keys: &[S],
        firing: &mut EventFiring,
    ) -> PermissionMap {
        let previous = firing.take::<PermissionMap>(MAP_KEY).unwrap_or_default();
        let result = self.map(subject, keys, previous, Some(&*firing));
        firing.set(MAP_KEY, result.clone());
        result
    }
}
