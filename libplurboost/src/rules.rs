//! Author-scoped engagement rules
//!
//! A [`RuleTable`] is built once from configuration and maps a normalized
//! author handle to the single [`EngagementRule`] that applies to that
//! author. Handles and hashtags are compared case-insensitively.

use std::collections::HashMap;

use crate::error::ConfigError;
use crate::types::Post;

/// Rule definition as it comes out of configuration, before validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRule {
    pub author_handle: String,
    pub like: bool,
    pub retweet: bool,
    pub required_hashtags: Vec<String>,
}

impl RawRule {
    pub fn new(author_handle: impl Into<String>, like: bool, retweet: bool) -> Self {
        Self {
            author_handle: author_handle.into(),
            like,
            retweet,
            required_hashtags: Vec::new(),
        }
    }

    pub fn with_hashtags<I, S>(mut self, hashtags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_hashtags = hashtags.into_iter().map(Into::into).collect();
        self
    }
}

/// A validated, normalized rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngagementRule {
    pub author_handle: String,
    pub like: bool,
    pub retweet: bool,
    /// Lower-cased, without `#`, in configured order. Empty matches any post.
    pub required_hashtags: Vec<String>,
}

impl EngagementRule {
    /// Returns the first required hashtag the post carries, in configured order.
    ///
    /// `Some(None)` means the rule is unconditional, `None` means it does not apply.
    pub fn matching_hashtag(&self, post: &Post) -> Option<Option<&str>> {
        if self.required_hashtags.is_empty() {
            return Some(None);
        }

        let post_tags: Vec<String> = post
            .hashtags
            .iter()
            .map(|tag| tag.trim_start_matches('#').to_lowercase())
            .collect();

        self.required_hashtags
            .iter()
            .find(|required| post_tags.iter().any(|tag| tag == *required))
            .map(|tag| Some(tag.as_str()))
    }
}

/// A rule that fired for a post
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleMatch<'a> {
    pub rule: &'a EngagementRule,
    /// The hashtag that satisfied the rule, if the rule had any
    pub hashtag: Option<&'a str>,
}

/// Immutable lookup from author handle to engagement rule
#[derive(Debug, Clone, Default)]
pub struct RuleTable {
    rules: HashMap<String, EngagementRule>,
}

impl RuleTable {
    /// Validate and index raw rules.
    ///
    /// Fails on the first malformed handle or hashtag, and on a second rule
    /// for an author that already has one.
    pub fn build(raw_rules: Vec<RawRule>) -> Result<Self, ConfigError> {
        let mut rules = HashMap::with_capacity(raw_rules.len());

        for raw in raw_rules {
            let handle = normalize_handle(&raw.author_handle)
                .ok_or_else(|| ConfigError::InvalidHandle(raw.author_handle.clone()))?;

            let mut required_hashtags = Vec::with_capacity(raw.required_hashtags.len());
            for tag in &raw.required_hashtags {
                let normalized =
                    normalize_hashtag(tag).ok_or_else(|| ConfigError::InvalidHashtag {
                        handle: handle.clone(),
                        tag: tag.clone(),
                    })?;
                if !required_hashtags.contains(&normalized) {
                    required_hashtags.push(normalized);
                }
            }

            if rules.contains_key(&handle) {
                return Err(ConfigError::DuplicateRule(handle));
            }

            rules.insert(
                handle.clone(),
                EngagementRule {
                    author_handle: handle,
                    like: raw.like,
                    retweet: raw.retweet,
                    required_hashtags,
                },
            );
        }

        Ok(Self { rules })
    }

    /// Case-insensitive lookup; a leading `@` is ignored
    pub fn lookup(&self, author_handle: &str) -> Option<&EngagementRule> {
        let key = author_handle.trim().trim_start_matches('@').to_lowercase();
        self.rules.get(&key)
    }

    /// Find the rule for the post's author and check its hashtag constraint
    pub fn evaluate<'a>(&'a self, post: &Post) -> Option<RuleMatch<'a>> {
        let rule = self.lookup(&post.author_handle)?;
        let hashtag = rule.matching_hashtag(post)?;
        Some(RuleMatch { rule, hashtag })
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Normalize an author handle (`@Alice`, `alice@Example.social`).
///
/// Returns `None` for handles that cannot be a valid account name.
pub fn normalize_handle(raw: &str) -> Option<String> {
    let handle = raw.trim();
    let handle = handle.strip_prefix('@').unwrap_or(handle);

    let mut parts = handle.split('@');
    let user = parts.next()?;
    let domain = parts.next();
    if parts.next().is_some() {
        return None;
    }

    let valid_part = |part: &str| {
        !part.is_empty()
            && part
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
    };

    if !valid_part(user) || domain.is_some_and(|d| !valid_part(d)) {
        return None;
    }

    Some(handle.to_lowercase())
}

/// Normalize a hashtag (`#Launch` becomes `launch`)
pub fn normalize_hashtag(raw: &str) -> Option<String> {
    let tag = raw.trim();
    let tag = tag.strip_prefix('#').unwrap_or(tag);

    if tag.is_empty() || tag.chars().any(|c| c.is_whitespace() || c == '#') {
        return None;
    }

    Some(tag.to_lowercase())
}
