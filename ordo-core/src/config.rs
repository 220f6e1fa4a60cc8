// ABOUTME: Client settings consumed by the dispatcher and permission registry
// ABOUTME: Prefix and elevated ids accept either a single string or a list

use serde::{Deserialize, Deserializer, Serialize};

/// Author id platforms use for system-generated messages
pub const SYSTEM_USER_ID: &str = "00000000000000000000000000";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Command prefixes; empty disables static prefixes
    #[serde(default, deserialize_with = "string_or_list")]
    pub prefix: Vec<String>,
    /// Whether mentioning the bot works as a prefix
    #[serde(default)]
    pub mention_prefix: bool,
    #[serde(default)]
    pub case_sensitive_prefix: bool,
    /// User ids holding the elevated permission
    #[serde(default, deserialize_with = "string_or_list")]
    pub elevated: Vec<String>,
    /// Authors whose messages never reach commands
    #[serde(default = "default_ignored_authors")]
    pub ignored_authors: Vec<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            prefix: Vec::new(),
            mention_prefix: false,
            case_sensitive_prefix: false,
            elevated: Vec::new(),
            ignored_authors: default_ignored_authors(),
        }
    }
}

impl ClientConfig {
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix.push(prefix.into());
        self
    }

    pub fn with_elevated(mut self, user_id: impl Into<String>) -> Self {
        self.elevated.push(user_id.into());
        self
    }
}

fn default_ignored_authors() -> Vec<String> {
    vec![SYSTEM_USER_ID.to_string()]
}

fn string_or_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(s) if s.is_empty() => Vec::new(),
        OneOrMany::One(s) => vec![s],
        OneOrMany::Many(list) => list,
    })
}
