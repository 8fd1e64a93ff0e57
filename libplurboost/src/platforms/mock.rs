//! Mock platform implementations
//!
//! [`ScriptedTimeline`] simulates a home timeline that honours `max_id`,
//! `since_id` and `limit` the way the server does, with optional queued
//! responses and failures. [`RecordingDispatcher`] records the actions it is
//! asked to perform without calling anything; the daemon uses it for
//! `--dry-run`. Both are cheap to clone and share their state, so a test can
//! keep a handle while the monitor owns another.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tracing::info;

use crate::error::{ActionError, ActionErrorKind, FetchError};
use crate::platforms::{ActionDispatcher, TimelineSource};
use crate::types::{Action, ApiResponse, FetchWindow, Post, RateLimitInfo, TimelinePage};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[derive(Debug, Default)]
struct TimelineState {
    posts: BTreeMap<u64, Post>,
    queued: VecDeque<Result<TimelinePage, FetchError>>,
    rate_limit: Option<RateLimitInfo>,
    windows: Vec<FetchWindow>,
}

/// Simulated home timeline
#[derive(Debug, Clone, Default)]
pub struct ScriptedTimeline {
    state: Arc<Mutex<TimelineState>>,
}

impl ScriptedTimeline {
    /// Create a timeline holding the given posts
    pub fn new(posts: impl IntoIterator<Item = Post>) -> Self {
        let timeline = Self::default();
        timeline.extend(posts);
        timeline
    }

    /// Create a timeline of plain posts by `author` with the given ids
    pub fn with_ids(author: &str, ids: impl IntoIterator<Item = u64>) -> Self {
        Self::new(ids.into_iter().map(|id| Post::new(id, author)))
    }

    /// Publish more posts (simulates new activity between rounds)
    pub fn extend(&self, posts: impl IntoIterator<Item = Post>) {
        let mut state = lock(&self.state);
        for post in posts {
            state.posts.insert(post.id, post);
        }
    }

    /// Serve this page verbatim on the next fetch, ignoring the window
    pub fn queue_page(&self, posts: Vec<Post>) {
        lock(&self.state).queued.push_back(Ok(posts.into()));
    }

    /// Serve `posts` as a page on which the server returned `returned`
    /// statuses, the rest of them unreadable
    pub fn queue_partial_page(&self, posts: Vec<Post>, returned: usize) {
        lock(&self.state)
            .queued
            .push_back(Ok(TimelinePage::new(posts, returned)));
    }

    /// Fail the next fetch with `error`
    pub fn queue_error(&self, error: FetchError) {
        lock(&self.state).queued.push_back(Err(error));
    }

    /// Rate-limit metadata attached to every successful response
    pub fn set_rate_limit(&self, rate_limit: Option<RateLimitInfo>) {
        lock(&self.state).rate_limit = rate_limit;
    }

    /// Every window requested so far, in order
    pub fn windows(&self) -> Vec<FetchWindow> {
        lock(&self.state).windows.clone()
    }

    pub fn fetch_count(&self) -> usize {
        lock(&self.state).windows.len()
    }
}

#[async_trait]
impl TimelineSource for ScriptedTimeline {
    async fn fetch_timeline(
        &self,
        window: &FetchWindow,
    ) -> std::result::Result<ApiResponse<TimelinePage>, FetchError> {
        let mut state = lock(&self.state);
        state.windows.push(*window);

        let page = match state.queued.pop_front() {
            Some(queued) => queued?,
            None => {
                let upper = window.max_id.unwrap_or(u64::MAX);
                let lower = window.since_id.unwrap_or(0);
                state
                    .posts
                    .range(..=upper)
                    .rev()
                    .take_while(|(id, _)| **id > lower)
                    .take(window.page_size as usize)
                    .map(|(_, post)| post.clone())
                    .collect::<Vec<_>>()
                    .into()
            }
        };

        Ok(ApiResponse::new(page, state.rate_limit))
    }
}

#[derive(Debug, Default)]
struct DispatchState {
    attempts: Vec<(Action, u64)>,
    dispatched: Vec<(Action, u64)>,
    failures: HashMap<(Action, u64), ActionErrorKind>,
    fail_all: HashMap<Action, ActionErrorKind>,
}

/// Record-only action dispatcher
#[derive(Debug, Clone, Default)]
pub struct RecordingDispatcher {
    state: Arc<Mutex<DispatchState>>,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `action` on `post_id` fail as rejected by the server
    pub fn fail_on(&self, action: Action, post_id: u64) {
        self.fail_on_with(action, post_id, scripted_rejection());
    }

    /// Make `action` on `post_id` fail with `kind`
    pub fn fail_on_with(&self, action: Action, post_id: u64, kind: ActionErrorKind) {
        lock(&self.state).failures.insert((action, post_id), kind);
    }

    /// Make every call of `action` fail
    pub fn fail_all(&self, action: Action) {
        lock(&self.state)
            .fail_all
            .insert(action, scripted_rejection());
    }

    /// Every call made, including failed ones, in order
    pub fn attempts(&self) -> Vec<(Action, u64)> {
        lock(&self.state).attempts.clone()
    }

    /// Successful calls, in order
    pub fn dispatched(&self) -> Vec<(Action, u64)> {
        lock(&self.state).dispatched.clone()
    }

    pub fn likes(&self) -> Vec<u64> {
        self.ids_for(Action::Like)
    }

    pub fn retweets(&self) -> Vec<u64> {
        self.ids_for(Action::Retweet)
    }

    fn ids_for(&self, action: Action) -> Vec<u64> {
        lock(&self.state)
            .dispatched
            .iter()
            .filter(|(a, _)| *a == action)
            .map(|(_, id)| *id)
            .collect()
    }

    fn dispatch(&self, action: Action, post_id: u64) -> Result<ApiResponse<()>, ActionError> {
        let mut state = lock(&self.state);
        state.attempts.push((action, post_id));

        let failure = state
            .failures
            .get(&(action, post_id))
            .or_else(|| state.fail_all.get(&action))
            .cloned();
        if let Some(kind) = failure {
            return Err(ActionError::new(action, post_id, kind));
        }

        state.dispatched.push((action, post_id));
        info!(%action, post_id, "Dry run, action recorded");
        Ok(ApiResponse::unmetered(()))
    }
}

fn scripted_rejection() -> ActionErrorKind {
    ActionErrorKind::Rejected("scripted failure".to_string())
}

#[async_trait]
impl ActionDispatcher for RecordingDispatcher {
    async fn like(&self, post_id: u64) -> std::result::Result<ApiResponse<()>, ActionError> {
        self.dispatch(Action::Like, post_id)
    }

    async fn retweet(&self, post_id: u64) -> std::result::Result<ApiResponse<()>, ActionError> {
        self.dispatch(Action::Retweet, post_id)
    }

    fn name(&self) -> &str {
        "recording"
    }
}
