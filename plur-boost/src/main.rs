//! plur-boost - Engagement daemon for a Mastodon home timeline
//!
//! Watches the home timeline and likes or boosts posts from configured
//! authors, optionally only when they carry one of the configured hashtags.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use libplurboost::logging::{LogFormat, LoggingConfig};
use libplurboost::platforms::mastodon::MastodonClient;
use libplurboost::platforms::mock::RecordingDispatcher;
use libplurboost::platforms::{ActionDispatcher, TimelineSource};
use libplurboost::{Config, Monitor, PlurboostError};
use tokio::sync::watch;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "plur-boost")]
#[command(version)]
#[command(about = "Like and boost matching posts on your Mastodon home timeline")]
#[command(long_about = "\
plur-boost - Engagement daemon for a Mastodon home timeline

DESCRIPTION:
    plur-boost is a long-running daemon that polls your home timeline and
    likes or boosts posts from the authors you configure. A rule can be
    restricted to posts carrying one of a group of hashtags.

    When more posts have arrived than fit in one page, it pages backward
    through the backlog until it is drained, then idles. Server rate limits
    are honoured per endpoint. Reposts are never boosted and posts marked
    sensitive are ignored.

USAGE:
    # Run in foreground (logs to stderr)
    plur-boost

    # Log what would be done without liking or boosting anything
    plur-boost --dry-run --once

    # Machine-readable logs
    plur-boost --log-format json

SIGNALS:
    SIGTERM, SIGINT - Graceful shutdown (finishes current round)

CONFIGURATION:
    Configuration file: ~/.config/plurboost/config.toml
    (override with --config or PLURBOOST_CONFIG)

    [mastodon]
    instance = \"mastodon.social\"
    token_file = \"~/.config/plurboost/mastodon.token\"

    [monitor]
    batch_size = 40       # posts per fetch (1-40)
    idle_delay = \"60s\"    # wait once the backlog is drained

    [[tag_groups]]
    group = \"launches\"
    tags = \"launch release\"

    [[user_groups]]
    users = \"alice bob@fosstodon.org\"
    like = true
    retweet = false
    tag_group = \"launches\"

EXIT CODES:
    0 - Clean shutdown
    1 - Runtime error
    2 - Configuration or authentication error
")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Idle delay in seconds (overrides config)
    #[arg(long, value_name = "SECONDS")]
    idle_delay: Option<u64>,

    /// Record matches without liking or boosting
    #[arg(long)]
    dry_run: bool,

    /// Run a single round and exit
    #[arg(long)]
    once: bool,

    /// Enable verbose logging to stderr
    #[arg(short, long)]
    verbose: bool,

    /// Log output format (text, json, pretty)
    #[arg(long, env = "PLURBOOST_LOG_FORMAT", default_value = "text")]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    LoggingConfig {
        format: cli.log_format,
        ..LoggingConfig::from_env()
    }
    .verbose(cli.verbose)
    .init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(exit_code(&e));
    }
}

fn exit_code(error: &anyhow::Error) -> i32 {
    error
        .downcast_ref::<PlurboostError>()
        .map(PlurboostError::exit_code)
        .unwrap_or(1)
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = match &cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };

    let mut monitor_config = config.monitor_config()?;
    if let Some(secs) = cli.idle_delay {
        monitor_config.idle_delay = Duration::from_secs(secs);
    }

    let client = Arc::new(MastodonClient::from_config(&config.mastodon)?);
    let account = client.verify().await.map_err(PlurboostError::from)?;
    info!(
        account = %account,
        instance = client.instance_url(),
        rules = monitor_config.rules.len(),
        "Authenticated"
    );

    if cli.dry_run {
        info!("Dry run: matches are logged, nothing is liked or boosted");
        let monitor = Monitor::new(monitor_config, client, RecordingDispatcher::new());
        run_monitor(monitor, cli.once).await
    } else {
        let monitor = Monitor::new(monitor_config, client.clone(), client);
        run_monitor(monitor, cli.once).await
    }
}

async fn run_monitor<S, D>(mut monitor: Monitor<S, D>, once: bool) -> anyhow::Result<()>
where
    S: TimelineSource,
    D: ActionDispatcher,
{
    if once {
        let report = monitor.run_round().await?;
        info!(
            fetched = report.fetched,
            matched = report.matched,
            likes = report.likes,
            retweets = report.retweets,
            failed = report.failed_actions,
            "plur-boost: ran one round, exiting"
        );
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    setup_signal_handlers(shutdown_tx)?;

    info!("plur-boost daemon starting");
    monitor.run(shutdown_rx).await;
    info!("plur-boost daemon stopped");

    Ok(())
}

/// Forward SIGINT and SIGTERM to the shutdown channel
#[cfg(unix)]
fn setup_signal_handlers(shutdown: watch::Sender<bool>) -> anyhow::Result<()> {
    use anyhow::Context;
    use futures::StreamExt;
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook_tokio::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM]).context("Signal setup failed")?;

    tokio::spawn(async move {
        while let Some(signal) = signals.next().await {
            match signal {
                SIGTERM | SIGINT => {
                    info!(signal, "Received shutdown signal, stopping gracefully...");
                    let _ = shutdown.send(true);
                    break;
                }
                _ => {}
            }
        }
    });

    Ok(())
}

#[cfg(not(unix))]
fn setup_signal_handlers(shutdown: watch::Sender<bool>) -> anyhow::Result<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl-C, stopping gracefully...");
            let _ = shutdown.send(true);
        }
    });

    Ok(())
}
