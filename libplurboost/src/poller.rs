//! Home timeline poll loop
//!
//! A [`Monitor`] owns everything one account needs: the rule table, the
//! timeline cursor and the rate limiter. Each round fetches a page through
//! the cursor, filters it against the rules, dispatches the resulting likes
//! and retweets, and decides how long to idle before the next round.
//!
//! # Example
//!
//! ```no_run
//! use libplurboost::config::Config;
//! use libplurboost::platforms::mastodon::MastodonClient;
//! use libplurboost::poller::Monitor;
//!
//! # async fn example() -> libplurboost::error::Result<()> {
//! let config = Config::load()?;
//! let client = std::sync::Arc::new(MastodonClient::from_config(&config.mastodon)?);
//! let mut monitor = Monitor::new(config.monitor_config()?, client.clone(), client);
//!
//! let (_shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//! monitor.run(shutdown_rx).await;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::config::MonitorConfig;
use crate::cursor::{BatchProgress, TimelineCursor};
use crate::error::{ActionError, ActionErrorKind, Result};
use crate::platforms::{ActionDispatcher, TimelineSource};
use crate::rate_limiter::RateLimiter;
use crate::rules::RuleTable;
use crate::types::{Action, Endpoint, Post};

/// How long an endpoint is held back after the server refused a call for
/// rate limiting
pub const RATE_LIMITED_BACKOFF: Duration = Duration::from_secs(60);

/// Summary of a single round
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundReport {
    pub fetched: usize,
    pub skipped_sensitive: usize,
    pub matched: usize,
    pub likes: usize,
    pub retweets: usize,
    pub failed_actions: usize,
    pub progress: BatchProgress,
    /// How long to wait before the next round
    pub next_delay: Duration,
}

impl RoundReport {
    fn empty(progress: BatchProgress, next_delay: Duration) -> Self {
        Self {
            fetched: 0,
            skipped_sensitive: 0,
            matched: 0,
            likes: 0,
            retweets: 0,
            failed_actions: 0,
            progress,
            next_delay,
        }
    }
}

/// Poll loop for a single account
pub struct Monitor<S, D> {
    source: S,
    dispatcher: D,
    rules: RuleTable,
    cursor: TimelineCursor,
    limiter: RateLimiter,
    idle_delay: Duration,
}

impl<S, D> Monitor<S, D>
where
    S: TimelineSource,
    D: ActionDispatcher,
{
    pub fn new(config: MonitorConfig, source: S, dispatcher: D) -> Self {
        Self {
            source,
            dispatcher,
            rules: config.rules,
            cursor: TimelineCursor::new(config.page_size),
            limiter: RateLimiter::new(),
            idle_delay: config.idle_delay,
        }
    }

    pub fn cursor(&self) -> &TimelineCursor {
        &self.cursor
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Run rounds until `shutdown` flips to `true`
    ///
    /// Fetch errors are logged and followed by the regular idle delay; the
    /// next round retries with the cursor unchanged. The idle sleep ends early
    /// when shutdown is signalled.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            dispatcher = self.dispatcher.name(),
            rules = self.rules.len(),
            page_size = self.cursor.page_size(),
            idle_delay_secs = self.idle_delay.as_secs(),
            "Monitor starting"
        );

        loop {
            if *shutdown.borrow() {
                info!("Shutdown requested, stopping monitor");
                break;
            }

            let delay = match self.run_round().await {
                Ok(report) => report.next_delay,
                Err(e) => {
                    error!(error = %e, retry_in_secs = self.idle_delay.as_secs(), "Round failed");
                    self.idle_delay
                }
            };

            if delay.is_zero() {
                continue;
            }

            tokio::select! {
                _ = sleep(delay) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        info!("Shutdown channel closed, stopping monitor");
                        break;
                    }
                }
            }
        }
    }

    /// Fetch one page, apply the rules to it and dispatch the resulting actions
    ///
    /// # Errors
    ///
    /// Returns [`crate::PlurboostError::Fetch`] when the timeline could not be
    /// read. Action failures are logged and counted in the report instead.
    pub async fn run_round(&mut self) -> Result<RoundReport> {
        let window = self.cursor.next_fetch_window();
        debug!(
            count = window.page_size,
            max_id = ?window.max_id,
            since_id = ?window.since_id,
            "Fetching home timeline"
        );

        self.limiter.check_and_wait(Endpoint::HomeTimeline).await;
        let response = self.source.fetch_timeline(&window).await?;
        self.limiter.record(Endpoint::HomeTimeline, response.rate_limit);

        let page = response.data;
        let progress = self.cursor.record_page(&page);
        let posts = page.posts;

        if posts.is_empty() {
            info!(retry_in_secs = self.idle_delay.as_secs(), "No new posts yet");
            return Ok(RoundReport::empty(progress, self.idle_delay));
        }

        info!(count = posts.len(), "Downloaded new posts");

        let next_delay = match progress {
            BatchProgress::Continuing => Duration::ZERO,
            BatchProgress::Drained => self.idle_delay,
        };
        let mut report = RoundReport::empty(progress, next_delay);
        report.fetched = posts.len();

        for post in &posts {
            self.process_post(post, &mut report).await;
        }

        Ok(report)
    }

    async fn process_post(&mut self, post: &Post, report: &mut RoundReport) {
        if post.is_sensitive {
            warn!(post_id = post.id, author = %post.author_handle, "Post is possibly sensitive, ignoring");
            report.skipped_sensitive += 1;
            return;
        }

        let Some(matched) = self.rules.evaluate(post) else {
            return;
        };
        let (like, retweet) = (matched.rule.like, matched.rule.retweet);
        let hashtag = matched.hashtag.map(str::to_string);
        report.matched += 1;

        debug!(post_id = post.id, author = %post.author_handle, "Post matches user");

        if like {
            self.log_match(Action::Like, post, hashtag.as_deref());
            match self.perform(Action::Like, post.id).await {
                Ok(()) => report.likes += 1,
                Err(e) => {
                    warn!(error = %e, post_id = post.id, "Like failed");
                    report.failed_actions += 1;
                }
            }
        }

        if !retweet {
            return;
        }

        if post.is_repost {
            debug!(post_id = post.id, author = %post.author_handle, "Post is a repost, not retweeting");
            return;
        }

        self.log_match(Action::Retweet, post, hashtag.as_deref());
        match self.perform(Action::Retweet, post.id).await {
            Ok(()) => report.retweets += 1,
            Err(e) => {
                warn!(error = %e, post_id = post.id, "Retweet failed");
                report.failed_actions += 1;
            }
        }
    }

    fn log_match(&self, action: Action, post: &Post, hashtag: Option<&str>) {
        match hashtag {
            Some(hashtag) => info!(
                post_id = post.id,
                author = %post.author_handle,
                hashtag,
                %action,
                "Post matches user and hashtag"
            ),
            None => info!(
                post_id = post.id,
                author = %post.author_handle,
                %action,
                "Post matches user"
            ),
        }
    }

    async fn perform(
        &mut self,
        action: Action,
        post_id: u64,
    ) -> std::result::Result<(), ActionError> {
        let endpoint = action.endpoint();
        self.limiter.check_and_wait(endpoint).await;

        let result = match action {
            Action::Like => self.dispatcher.like(post_id).await,
            Action::Retweet => self.dispatcher.retweet(post_id).await,
        };

        match result {
            Ok(response) => {
                self.limiter.record(endpoint, response.rate_limit);
                Ok(())
            }
            Err(e) => {
                // A 429 carries no usable quota; hold the endpoint back anyway
                if matches!(e.kind, ActionErrorKind::RateLimit(_)) {
                    self.limiter.mark_exhausted(endpoint, RATE_LIMITED_BACKOFF);
                }
                Err(e)
            }
        }
    }
}
