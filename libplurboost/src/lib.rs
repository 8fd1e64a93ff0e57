//! Plurboost - automatic engagement for a Mastodon home timeline
//!
//! This library watches an account's home timeline, matches new posts
//! against per-author rules and likes or boosts the ones that qualify,
//! staying inside the server's rate limits.

pub mod config;
pub mod cursor;
pub mod error;
pub mod logging;
pub mod platforms;
pub mod poller;
pub mod rate_limiter;
pub mod rules;
pub mod types;

// Re-export commonly used types
pub use config::{Config, MonitorConfig};
pub use cursor::{BatchProgress, TimelineCursor};
pub use error::{PlurboostError, Result};
pub use poller::{Monitor, RoundReport};
pub use rate_limiter::RateLimiter;
pub use rules::{RawRule, RuleTable};
pub use types::{Action, Post, TimelinePage};
