use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;
use voicetrack::{Config, PresenceFeed, SessionTracker, SqliteSessionStore};

#[derive(Parser)]
#[command(name = "voicetrack", about = "Voice session tracking service")]
struct Cli {
    /// Configuration file (name without extension, `config` crate style)
    #[arg(long, default_value = "config/voicetrack")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let cfg = Config::load(&cli.config)?;

    info!("{} v0.1.0", cfg.service.name);
    info!("Session databases under {}", cfg.storage.data_dir);

    let store = Arc::new(SqliteSessionStore::new(&cfg.storage.data_dir)?);
    let tracker = Arc::new(SessionTracker::new(store));
    let feed = PresenceFeed::new(Arc::clone(&tracker));

    // The presence gateway owns the sender half and delivers raw events on
    // it; the feed drives the tracker until the channel closes.
    let (events, receiver) = mpsc::channel(256);
    feed.start(receiver).await;

    info!("Presence feed ready");

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");

    drop(events);
    feed.stop().await;

    Ok(())
}
