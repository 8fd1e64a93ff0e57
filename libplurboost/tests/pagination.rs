//! Backlog pagination tests against a simulated home timeline
//!
//! These tests drive a full monitor over a scripted timeline and check that
//! every post is delivered exactly once, including while new posts keep
//! arriving in the middle of a drain.

use std::time::Duration;

use anyhow::Result;
use libplurboost::platforms::mock::{RecordingDispatcher, ScriptedTimeline};
use libplurboost::types::Post;
use libplurboost::{BatchProgress, Monitor, MonitorConfig, RawRule, RuleTable};

type TestMonitor = Monitor<ScriptedTimeline, RecordingDispatcher>;

/// Monitor that likes every post by "dave", so likes mirror deliveries
fn like_everything(
    page_size: u32,
    timeline: &ScriptedTimeline,
    dispatcher: &RecordingDispatcher,
) -> Result<TestMonitor> {
    let config = MonitorConfig {
        rules: RuleTable::build(vec![RawRule::new("dave", true, false)])?,
        page_size,
        idle_delay: Duration::from_secs(60),
    };
    Ok(Monitor::new(config, timeline.clone(), dispatcher.clone()))
}

/// Run rounds until one reports a drained backlog
async fn drain(monitor: &mut TestMonitor) -> Result<usize> {
    let mut rounds = 0;
    loop {
        rounds += 1;
        let report = monitor.run_round().await?;
        if report.progress == BatchProgress::Drained {
            return Ok(rounds);
        }
    }
}

fn sorted(mut ids: Vec<u64>) -> Vec<u64> {
    ids.sort_unstable();
    ids
}

#[tokio::test]
async fn test_backlog_is_delivered_without_gaps() -> Result<()> {
    let timeline = ScriptedTimeline::with_ids("dave", 1..=10);
    let dispatcher = RecordingDispatcher::new();
    let mut monitor = like_everything(3, &timeline, &dispatcher)?;

    let rounds = drain(&mut monitor).await?;

    assert_eq!(rounds, 4);
    assert_eq!(dispatcher.likes(), (1..=10).rev().collect::<Vec<_>>());
    Ok(())
}

#[tokio::test]
async fn test_exact_multiple_of_page_size_ends_with_empty_page() -> Result<()> {
    let timeline = ScriptedTimeline::with_ids("dave", 1..=6);
    let dispatcher = RecordingDispatcher::new();
    let mut monitor = like_everything(3, &timeline, &dispatcher)?;

    let rounds = drain(&mut monitor).await?;

    assert_eq!(rounds, 3);
    assert_eq!(sorted(dispatcher.likes()), (1..=6).collect::<Vec<_>>());
    assert_eq!(monitor.cursor().lowest_seen_id(), None);
    Ok(())
}

#[tokio::test]
async fn test_drained_cursor_polls_forward_only() -> Result<()> {
    let timeline = ScriptedTimeline::with_ids("dave", 1..=4);
    let dispatcher = RecordingDispatcher::new();
    let mut monitor = like_everything(10, &timeline, &dispatcher)?;

    drain(&mut monitor).await?;
    let window = monitor.cursor().next_fetch_window();
    assert_eq!(window.max_id, None);
    assert_eq!(window.since_id, Some(4));

    // Nothing new: the same window again, and nothing re-delivered
    let report = monitor.run_round().await?;
    assert_eq!(report.fetched, 0);
    assert_eq!(dispatcher.likes().len(), 4);
    Ok(())
}

#[tokio::test]
async fn test_new_posts_between_rounds_are_delivered_once() -> Result<()> {
    let timeline = ScriptedTimeline::with_ids("dave", 1..=10);
    let dispatcher = RecordingDispatcher::new();
    let mut monitor = like_everything(3, &timeline, &dispatcher)?;
    drain(&mut monitor).await?;

    timeline.extend((11..=15).map(|id| Post::new(id, "dave")));
    drain(&mut monitor).await?;

    assert_eq!(sorted(dispatcher.likes()), (1..=15).collect::<Vec<_>>());
    assert_eq!(monitor.cursor().next_fetch_window().since_id, Some(15));
    Ok(())
}

#[tokio::test]
async fn test_posts_arriving_mid_drain_are_not_skipped() -> Result<()> {
    let timeline = ScriptedTimeline::with_ids("dave", 1..=2);
    let dispatcher = RecordingDispatcher::new();
    let mut monitor = like_everything(3, &timeline, &dispatcher)?;
    drain(&mut monitor).await?;

    // Backlog of 8 builds up; first page of the drain covers 10, 9, 8
    timeline.extend((3..=10).map(|id| Post::new(id, "dave")));
    let first = monitor.run_round().await?;
    assert_eq!(first.progress, BatchProgress::Continuing);

    // More activity while the drain is still paging backward
    timeline.extend((11..=12).map(|id| Post::new(id, "dave")));
    drain(&mut monitor).await?;

    // The drain stayed above the old floor and below its own first page
    let windows = timeline.windows();
    assert!(windows
        .iter()
        .filter(|w| w.max_id.is_some())
        .all(|w| w.since_id == Some(2)));

    // Forward poll picks up the mid-drain arrivals
    drain(&mut monitor).await?;

    assert_eq!(sorted(dispatcher.likes()), (1..=12).collect::<Vec<_>>());
    Ok(())
}

#[tokio::test]
async fn test_fetch_error_mid_drain_retries_same_window() -> Result<()> {
    let timeline = ScriptedTimeline::with_ids("dave", 1..=9);
    let dispatcher = RecordingDispatcher::new();
    let mut monitor = like_everything(3, &timeline, &dispatcher)?;

    monitor.run_round().await?;
    timeline.queue_error(libplurboost::error::FetchError::Network(
        "connection reset".to_string(),
    ));
    assert!(monitor.run_round().await.is_err());
    drain(&mut monitor).await?;

    let windows = timeline.windows();
    assert_eq!(windows[1], windows[2]);
    assert_eq!(sorted(dispatcher.likes()), (1..=9).collect::<Vec<_>>());
    Ok(())
}

#[tokio::test]
async fn test_unreadable_status_does_not_end_drain_early() -> Result<()> {
    let timeline = ScriptedTimeline::with_ids("dave", 1..=7);
    let dispatcher = RecordingDispatcher::new();
    let mut monitor = like_everything(3, &timeline, &dispatcher)?;

    // Server returned 10, 9 and 8, but 9 could not be read
    timeline.queue_partial_page(vec![Post::new(10, "dave"), Post::new(8, "dave")], 3);
    let first = monitor.run_round().await?;
    assert_eq!(first.progress, BatchProgress::Continuing);
    assert_eq!(first.fetched, 2);

    drain(&mut monitor).await?;

    let mut expected: Vec<u64> = (1..=8).collect();
    expected.push(10);
    assert_eq!(sorted(dispatcher.likes()), expected);
    Ok(())
}
