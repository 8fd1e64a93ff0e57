//! Home timeline pagination
//!
//! The timeline is served newest first. A round asks for at most
//! `page_size` posts; when more than a page has accumulated since the last
//! round (the backlog), the cursor pages backward with `max_id` until a
//! short page shows the backlog is drained, then switches to forward-only
//! polling bounded by `since_id`.
//!
//! `since_id` stays pinned to the drain floor (the newest id delivered
//! before the drain started) for every page of a drain. Moving it up to the
//! newest id of the first page would make every following window empty and
//! silently skip the rest of the backlog.

use tracing::{debug, info};

use crate::types::{FetchWindow, Post, TimelinePage};

/// Where the cursor stands after recording a page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchProgress {
    /// A full page came back; the next window continues below it
    Continuing,
    /// A short or empty page came back; the next window polls forward only
    Drained,
}

/// Pagination state for one account's home timeline
#[derive(Debug, Clone)]
pub struct TimelineCursor {
    page_size: u32,
    lowest_seen_id: Option<u64>,
    highest_delivered_id: u64,
    drain_floor: u64,
}

impl TimelineCursor {
    pub fn new(page_size: u32) -> Self {
        Self {
            page_size,
            lowest_seen_id: None,
            highest_delivered_id: 0,
            drain_floor: 0,
        }
    }

    /// Window for the next fetch
    pub fn next_fetch_window(&self) -> FetchWindow {
        let max_id = self.lowest_seen_id.map(|lowest| lowest.saturating_sub(1));

        let floor = if self.lowest_seen_id.is_some() {
            self.drain_floor
        } else {
            self.highest_delivered_id
        };
        let since_id = (floor > 0).then_some(floor);

        FetchWindow {
            max_id,
            since_id,
            page_size: self.page_size,
        }
    }

    /// Advance the cursor past a fetched page
    pub fn record(&mut self, posts: &[Post]) -> BatchProgress {
        self.advance(posts, posts.len())
    }

    /// Advance the cursor past a page that may have held unreadable statuses
    ///
    /// The page counts as full when the server returned `page_size` statuses,
    /// however many of them could be read.
    pub fn record_page(&mut self, page: &TimelinePage) -> BatchProgress {
        self.advance(&page.posts, page.returned)
    }

    fn advance(&mut self, posts: &[Post], returned: usize) -> BatchProgress {
        for post in posts {
            self.lowest_seen_id = Some(match self.lowest_seen_id {
                Some(lowest) => lowest.min(post.id),
                None => post.id,
            });
            self.highest_delivered_id = self.highest_delivered_id.max(post.id);
        }

        // Without a readable id there is nothing to page below
        if returned < self.page_size as usize || posts.is_empty() {
            if self.lowest_seen_id.take().is_some() && !posts.is_empty() {
                info!(
                    highest_id = self.highest_delivered_id,
                    "Processing batch completed"
                );
            }
            self.drain_floor = self.highest_delivered_id;
            BatchProgress::Drained
        } else {
            debug!(
                lowest_id = ?self.lowest_seen_id,
                highest_id = self.highest_delivered_id,
                "Full page, continuing through backlog"
            );
            BatchProgress::Continuing
        }
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn lowest_seen_id(&self) -> Option<u64> {
        self.lowest_seen_id
    }

    pub fn highest_delivered_id(&self) -> u64 {
        self.highest_delivered_id
    }
}
