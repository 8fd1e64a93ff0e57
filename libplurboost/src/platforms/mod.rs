//! Remote API abstraction and implementations
//!
//! The monitor talks to the remote service through two narrow traits:
//! [`TimelineSource`] for reading the home timeline and [`ActionDispatcher`]
//! for engaging with posts. The Mastodon client implements both; the mock
//! module provides a scripted timeline and a record-only dispatcher for tests
//! and dry runs.
//!
//! # Examples
//!
//! ```no_run
//! use libplurboost::platforms::{mastodon::MastodonClient, ActionDispatcher, TimelineSource};
//! use libplurboost::types::FetchWindow;
//!
//! # async fn example() -> libplurboost::error::Result<()> {
//! let client = MastodonClient::new(
//!     "https://mastodon.social".to_string(),
//!     "your-access-token".to_string(),
//! )?;
//!
//! let window = FetchWindow { max_id: None, since_id: None, page_size: 40 };
//! let page = client.fetch_timeline(&window).await?;
//! if let Some(post) = page.data.posts.first() {
//!     client.like(post.id).await?;
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{ActionError, FetchError};
use crate::types::{ApiResponse, FetchWindow, TimelinePage};

pub mod mastodon;

// Mock implementations are available for all builds to support integration tests and dry runs
pub mod mock;

/// Read access to the account's home timeline
#[async_trait]
pub trait TimelineSource: Send + Sync {
    /// Fetch one page of the home timeline, newest first
    ///
    /// The page records how many statuses the server returned, so a status
    /// that could not be mapped still counts towards a full page.
    ///
    /// # Errors
    ///
    /// Returns a [`FetchError`] on transport or API failure. The caller treats
    /// it as transient and retries on the next round.
    async fn fetch_timeline(
        &self,
        window: &FetchWindow,
    ) -> std::result::Result<ApiResponse<TimelinePage>, FetchError>;
}

/// Engagement actions against individual posts
#[async_trait]
pub trait ActionDispatcher: Send + Sync {
    /// Like (favourite) a post
    async fn like(&self, post_id: u64) -> std::result::Result<ApiResponse<()>, ActionError>;

    /// Retweet (reblog) a post
    async fn retweet(&self, post_id: u64) -> std::result::Result<ApiResponse<()>, ActionError>;

    /// Short identifier used in log lines
    fn name(&self) -> &str;
}

#[async_trait]
impl<T: TimelineSource + ?Sized> TimelineSource for Arc<T> {
    async fn fetch_timeline(
        &self,
        window: &FetchWindow,
    ) -> std::result::Result<ApiResponse<TimelinePage>, FetchError> {
        (**self).fetch_timeline(window).await
    }
}

#[async_trait]
impl<T: ActionDispatcher + ?Sized> ActionDispatcher for Arc<T> {
    async fn like(&self, post_id: u64) -> std::result::Result<ApiResponse<()>, ActionError> {
        (**self).like(post_id).await
    }

    async fn retweet(&self, post_id: u64) -> std::result::Result<ApiResponse<()>, ActionError> {
        (**self).retweet(post_id).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
