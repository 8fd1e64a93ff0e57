//! Error types for Plurboost

use thiserror::Error;

use crate::types::Action;

pub type Result<T> = std::result::Result<T, PlurboostError>;

#[derive(Error, Debug)]
pub enum PlurboostError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Timeline fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("Action failed: {0}")]
    Action(#[from] ActionError),
}

impl PlurboostError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            PlurboostError::Config(_) => 2,
            PlurboostError::Fetch(FetchError::Authentication(_)) => 2,
            PlurboostError::Fetch(_) => 1,
            PlurboostError::Action(_) => 1,
        }
    }
}

/// Problems with the configuration file or rule definitions.
///
/// All of these are fatal at startup: the monitor never starts with a
/// partially valid rule table.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid author handle '{0}'")]
    InvalidHandle(String),

    #[error("Invalid hashtag '{tag}' for author '{handle}'")]
    InvalidHashtag { handle: String, tag: String },

    #[error("Duplicate rule for author '{0}'")]
    DuplicateRule(String),

    #[error("Unknown tag group '{0}'")]
    UnknownTagGroup(String),

    #[error("Duplicate tag group '{0}'")]
    DuplicateTagGroup(String),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// A home timeline fetch failed. The round is abandoned and retried on the
/// next cycle with the cursor untouched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),

    #[error("Server error: {0}")]
    Server(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// A single like or retweet call failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{action} of post {post_id} failed: {kind}")]
pub struct ActionError {
    pub action: Action,
    pub post_id: u64,
    pub kind: ActionErrorKind,
}

impl ActionError {
    pub fn new(action: Action, post_id: u64, kind: ActionErrorKind) -> Self {
        Self {
            action,
            post_id,
            kind,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ActionErrorKind {
    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("post not found: {0}")]
    NotFound(String),

    #[error("rate limit exceeded: {0}")]
    RateLimit(String),

    #[error("rejected by server: {0}")]
    Rejected(String),

    #[error("network error: {0}")]
    Network(String),
}
