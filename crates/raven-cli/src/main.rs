use std::collections::HashMap;

use anyhow::{Context, bail};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use raven_client::{
    ChannelFeed, ClientConfig, ClientState, ClientStateInner, ListKind, ListScreen, realtime,
};
use raven_feed::{ListFilter, PlainTextRenderer, RenderRow, render_row};

const USAGE: &str = "usage: raven [CHANNEL] | raven --list threads|pinned|saved|reminders [CHANNEL]";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "raven=debug".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    // Config (loads .env)
    let config = ClientConfig::from_env()?;
    let state = ClientStateInner::from_config(&config)?;
    info!("Raven client for {} on {}", config.user, config.site_url);

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        Some("--list") => {
            let kind = match args.get(1).map(String::as_str) {
                Some("threads") => ListKind::Threads,
                Some("pinned") => ListKind::Pinned,
                Some("saved") => ListKind::Saved,
                Some("reminders") => ListKind::Reminders,
                _ => bail!(USAGE),
            };
            let filter = match args.get(2) {
                Some(channel) => ListFilter::channel(channel.as_str()),
                None => ListFilter::default(),
            };
            show_list(state, kind, filter).await
        }
        Some("--help") | Some("-h") => {
            println!("{}", USAGE);
            Ok(())
        }
        Some(channel) => follow_channel(state, channel.to_string(), config.realtime_url).await,
        None => {
            let channel = state
                .last_channel()
                .context("no channel given and none remembered")?;
            follow_channel(state, channel, config.realtime_url).await
        }
    }
}

async fn display_names(state: &ClientState) -> HashMap<String, String> {
    state
        .directory
        .display_names(&*state.rpc)
        .await
        .unwrap_or_else(|e| {
            warn!("Could not load users, showing ids: {}", e);
            HashMap::new()
        })
}

fn print_rows(rows: &[RenderRow], users: &HashMap<String, String>, feed: &ChannelFeed) {
    let polls = feed.poll_data();
    let mut renderer = PlainTextRenderer::new(users, &polls);
    for row in rows {
        println!("{}", render_row(row, &mut renderer));
    }
}

async fn load_and_print(feed: &ChannelFeed, users: &HashMap<String, String>) -> anyhow::Result<()> {
    for (key, err) in feed.load_aux().await {
        warn!("{} unavailable: {}", key, err);
    }
    print_rows(&feed.rows(), users, feed);
    Ok(())
}

/// Print the newest page of a channel, then reprint it whenever realtime
/// events invalidate it, until Ctrl-C.
async fn follow_channel(
    state: ClientState,
    channel_id: String,
    realtime_url: Option<String>,
) -> anyhow::Result<()> {
    let users = display_names(&state).await;
    let feed = ChannelFeed::open(state.clone(), channel_id.clone());
    feed.load_older().await?;
    load_and_print(&feed, &users).await?;

    let Some(url) = realtime_url else {
        return Ok(());
    };

    let mut invalidations = state.feeds.subscribe();
    let listener = tokio::spawn(realtime::listen(state.clone(), url, vec![channel_id.clone()]));
    info!("Following {} (Ctrl-C to quit)", channel_id);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            key = invalidations.recv() => match key {
                Ok(key) if key == channel_id => {
                    feed.refresh().await?;
                    println!("---");
                    load_and_print(&feed, &users).await?;
                }
                Ok(_) => {}
                Err(RecvError::Lagged(n)) => warn!("Missed {} invalidations", n),
                Err(RecvError::Closed) => break,
            },
        }
    }

    listener.abort();
    Ok(())
}

async fn show_list(state: ClientState, kind: ListKind, filter: ListFilter) -> anyhow::Result<()> {
    let users = display_names(&state).await;
    let mut screen = ListScreen::new(state.clone(), kind, filter);
    screen.load_more().await?;

    let polls = HashMap::new();
    let mut renderer = PlainTextRenderer::new(&users, &polls);
    let rows = screen.rows();
    if rows.is_empty() {
        println!("(nothing here)");
    }
    for row in &rows {
        println!("{}", render_row(row, &mut renderer));
    }
    Ok(())
}
