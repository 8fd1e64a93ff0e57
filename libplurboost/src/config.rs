//! Configuration management for Plurboost
//!
//! Rules are configured as named tag groups plus user groups that reference
//! them. A user group expands into one rule per listed user:
//!
//! ```toml
//! [mastodon]
//! instance = "mastodon.social"
//! token_file = "~/.config/plurboost/mastodon.token"
//!
//! [monitor]
//! batch_size = 40
//! idle_delay = "60s"
//!
//! [[tag_groups]]
//! group = "launches"
//! tags = "launch, release"
//!
//! [[user_groups]]
//! users = "alice bob@fosstodon.org"
//! like = true
//! retweet = false
//! tag_group = "launches"
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ConfigError, Result};
use crate::rules::{RawRule, RuleTable};

/// Separators accepted in user and tag lists
const LIST_DELIMITERS: [char; 4] = [' ', ',', ';', '\t'];

/// Mastodon never returns more than 40 statuses per page. A larger request
/// would always look like a short page and end every backlog drain early.
pub const MAX_BATCH_SIZE: u32 = 40;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub mastodon: MastodonConfig,
    #[serde(default)]
    pub monitor: MonitorSettings,
    #[serde(default)]
    pub tag_groups: Vec<TagGroup>,
    #[serde(default)]
    pub user_groups: Vec<UserGroup>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MastodonConfig {
    pub instance: String,
    pub token_file: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorSettings {
    /// Posts requested per fetch
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
    /// Sleep between rounds once the backlog is drained (humantime, e.g. "90s")
    #[serde(default = "default_idle_delay")]
    pub idle_delay: String,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            idle_delay: default_idle_delay(),
        }
    }
}

fn default_batch_size() -> u32 {
    MAX_BATCH_SIZE
}

fn default_idle_delay() -> String {
    "60s".to_string()
}

/// Named list of hashtags
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagGroup {
    pub group: String,
    pub tags: String,
}

/// Users sharing the same engagement policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserGroup {
    pub users: String,
    #[serde(default)]
    pub like: bool,
    #[serde(default)]
    pub retweet: bool,
    /// Restrict the group to posts carrying one of these tags
    pub tag_group: Option<String>,
}

/// Fully resolved inputs of the poll loop
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub rules: RuleTable,
    pub page_size: u32,
    pub idle_delay: Duration,
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).map_err(ConfigError::ParseError)?;
        Ok(config)
    }

    /// Expand tag and user groups into rules and validate monitor settings
    pub fn monitor_config(&self) -> Result<MonitorConfig> {
        let page_size = self.monitor.batch_size;
        if !(1..=MAX_BATCH_SIZE).contains(&page_size) {
            return Err(ConfigError::InvalidValue {
                field: "monitor.batch_size".to_string(),
                reason: format!("must be between 1 and {}, got {}", MAX_BATCH_SIZE, page_size),
            }
            .into());
        }

        let idle_delay = humantime::parse_duration(self.monitor.idle_delay.trim()).map_err(|e| {
            ConfigError::InvalidValue {
                field: "monitor.idle_delay".to_string(),
                reason: e.to_string(),
            }
        })?;

        let rules = RuleTable::build(self.raw_rules()?)?;

        Ok(MonitorConfig {
            rules,
            page_size,
            idle_delay,
        })
    }

    fn raw_rules(&self) -> std::result::Result<Vec<RawRule>, ConfigError> {
        let mut tag_groups: HashMap<&str, Vec<String>> = HashMap::new();
        for tag_group in &self.tag_groups {
            let name = tag_group.group.trim();
            if name.is_empty() {
                return Err(ConfigError::MissingField("tag_groups.group".to_string()));
            }
            if tag_groups
                .insert(name, split_list(&tag_group.tags))
                .is_some()
            {
                return Err(ConfigError::DuplicateTagGroup(name.to_string()));
            }
        }

        let mut rules = Vec::new();
        for user_group in &self.user_groups {
            let hashtags = match user_group.tag_group.as_deref().map(str::trim) {
                Some(name) => tag_groups
                    .get(name)
                    .cloned()
                    .ok_or_else(|| ConfigError::UnknownTagGroup(name.to_string()))?,
                None => Vec::new(),
            };

            let users = split_list(&user_group.users);
            if users.is_empty() {
                return Err(ConfigError::MissingField("user_groups.users".to_string()));
            }

            rules.extend(users.into_iter().map(|user| {
                RawRule::new(user, user_group.like, user_group.retweet)
                    .with_hashtags(hashtags.iter().cloned())
            }));
        }

        Ok(rules)
    }
}

/// Split a user or tag list on spaces, commas, semicolons and tabs
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(LIST_DELIMITERS)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

/// Resolve the configuration file path following XDG Base Directory spec
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("PLURBOOST_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("plurboost").join("config.toml"))
}
