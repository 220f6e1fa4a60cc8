// ABOUTME: Builds the anchored prefix matcher for one firing
// ABOUTME: Combines per-firing overrides, configured prefixes, and the bot mention

use crate::config::ClientConfig;
use crate::events::EventFiring;
use regex::{Regex, RegexBuilder};

/// Firing key overriding prefixes for this firing (`String` or `Vec<String>`)
pub const PREFIX_KEY: &str = "commands/prefix";
/// Firing key that, when present, ignores configured prefixes
pub const SKIP_CONFIG_PREFIX_KEY: &str = "commands/skipConfigPrefix";
/// Firing key that, when present, enables the mention prefix
pub const MENTION_PREFIX_KEY: &str = "commands/mentionPrefix";
/// Firing key that, when present, makes prefix matching case-sensitive
pub const CASE_SENSITIVE_KEY: &str = "commands/caseSensitivePrefix";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixMatch {
    /// The prefix text as written in the message
    pub prefix: String,
    /// Whether a single space followed the prefix
    pub spaced: bool,
    /// Byte offset where the command text starts
    pub end: usize,
}

#[derive(Debug, Clone)]
pub struct PrefixMatcher {
    regex: Regex,
}

impl PrefixMatcher {
    /// Build the matcher for a firing. `None` when no prefix source applies.
    pub fn build(firing: &EventFiring, config: &ClientConfig, mention: &str) -> Option<Self> {
        let mut prefixes: Vec<String> = Vec::new();

        if let Some(list) = firing.get::<Vec<String>>(PREFIX_KEY) {
            prefixes.extend(list.iter().cloned());
        } else if let Some(single) = firing.get::<String>(PREFIX_KEY) {
            prefixes.push(single.clone());
        } else if let Some(single) = firing.get::<&'static str>(PREFIX_KEY) {
            prefixes.push(single.to_string());
        }

        let skip_config = firing.has(SKIP_CONFIG_PREFIX_KEY);
        if !skip_config {
            prefixes.extend(config.prefix.iter().cloned());
        }
        prefixes.retain(|p| !p.is_empty());

        let use_mention = (config.mention_prefix && !skip_config) || firing.has(MENTION_PREFIX_KEY);
        let case_sensitive = config.case_sensitive_prefix || firing.has(CASE_SENSITIVE_KEY);

        if prefixes.is_empty() && !use_mention {
            return None;
        }

        let mut alternatives: Vec<String> = prefixes.iter().map(|p| regex::escape(p)).collect();
        if use_mention && !mention.is_empty() {
            alternatives.push(regex::escape(mention));
        }
        if alternatives.is_empty() {
            return None;
        }

        let pattern = format!("^(?P<prefix>{})(?P<space> )?", alternatives.join("|"));
        match RegexBuilder::new(&pattern)
            .case_insensitive(!case_sensitive)
            .build()
        {
            Ok(regex) => Some(Self { regex }),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to build prefix matcher");
                None
            }
        }
    }

    /// Match at the start of `content`
    pub fn matches(&self, content: &str) -> Option<PrefixMatch> {
        let caps = self.regex.captures(content)?;
        let prefix = caps.name("prefix")?;
        let end = caps.get(0).map(|m| m.end()).unwrap_or(prefix.end());
        Some(PrefixMatch {
            prefix: prefix.as_str().to_string(),
            spaced: caps.name("space").is_some(),
            end,
        })
    }
}
