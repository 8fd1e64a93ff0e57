//! Core types for Plurboost

use tokio::time::Instant;

/// A post read from the home timeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Post {
    /// Server-assigned id, increasing over time. Doubles as the pagination cursor.
    pub id: u64,
    pub author_handle: String,
    pub hashtags: Vec<String>,
    pub is_repost: bool,
    pub is_sensitive: bool,
}

impl Post {
    pub fn new(id: u64, author_handle: impl Into<String>) -> Self {
        Self {
            id,
            author_handle: author_handle.into(),
            hashtags: Vec::new(),
            is_repost: false,
            is_sensitive: false,
        }
    }

    pub fn with_hashtags<I, S>(mut self, hashtags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.hashtags = hashtags.into_iter().map(Into::into).collect();
        self
    }

    pub fn repost(mut self) -> Self {
        self.is_repost = true;
        self
    }

    pub fn sensitive(mut self) -> Self {
        self.is_sensitive = true;
        self
    }
}

/// Engagement actions the monitor can take on a post
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Like,
    Retweet,
}

impl Action {
    /// The rate-limited endpoint this action is issued against
    pub fn endpoint(&self) -> Endpoint {
        match self {
            Action::Like => Endpoint::Favourite,
            Action::Retweet => Endpoint::Reblog,
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::Like => write!(f, "like"),
            Action::Retweet => write!(f, "retweet"),
        }
    }
}

/// Remote endpoints with independent rate-limit quotas
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    HomeTimeline,
    Favourite,
    Reblog,
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Endpoint::HomeTimeline => write!(f, "home_timeline"),
            Endpoint::Favourite => write!(f, "favourite"),
            Endpoint::Reblog => write!(f, "reblog"),
        }
    }
}

/// Bounds of the next home timeline request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchWindow {
    /// Inclusive upper bound; only posts with `id <= max_id` are returned
    pub max_id: Option<u64>,
    /// Exclusive lower bound; only posts with `id > since_id` are returned
    pub since_id: Option<u64>,
    pub page_size: u32,
}

/// One page of the home timeline
///
/// `returned` counts every status the server sent, including ones that could
/// not be turned into a [`Post`]. Short-page detection uses it so that an
/// unreadable status never makes a full page look short.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimelinePage {
    pub posts: Vec<Post>,
    pub returned: usize,
}

impl TimelinePage {
    pub fn new(posts: Vec<Post>, returned: usize) -> Self {
        Self {
            returned: returned.max(posts.len()),
            posts,
        }
    }

    /// Number of statuses that were dropped while mapping the page
    pub fn unreadable(&self) -> usize {
        self.returned - self.posts.len()
    }
}

impl From<Vec<Post>> for TimelinePage {
    fn from(posts: Vec<Post>) -> Self {
        let returned = posts.len();
        Self { posts, returned }
    }
}

/// Quota reported by the server alongside a response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitInfo {
    pub remaining: i64,
    pub reset_at: Instant,
}

/// A successful API response plus whatever rate-limit metadata came with it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse<T> {
    pub data: T,
    pub rate_limit: Option<RateLimitInfo>,
}

impl<T> ApiResponse<T> {
    pub fn new(data: T, rate_limit: Option<RateLimitInfo>) -> Self {
        Self { data, rate_limit }
    }

    /// Response from an endpoint that reports no rate-limit data
    pub fn unmetered(data: T) -> Self {
        Self::new(data, None)
    }
}
