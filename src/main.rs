use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use partyq::{Config, HttpBackend, LocalStore, QueueSyncClient, SyncState, VoteOutcome};

/// Request and upvote songs on a party queue
#[derive(Parser)]
#[command(name = "partyq", about = "Request and upvote songs on a party queue", long_about = None)]
struct Cli {
    /// Config file (default: ~/.config/partyq/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Queue server base URL, overrides the config file
    #[arg(long, global = true)]
    backend_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Search for tracks
    Search {
        #[arg(required = true)]
        query: Vec<String>,
    },
    /// Add a track to the queue by URI
    Add { uri: String },
    /// Upvote a queued track by URI
    Vote { uri: String },
    /// Show now playing and the queue
    Queue,
    /// Keep the queue on screen, refreshing until Ctrl-C
    Watch,
    /// List the tracks this machine has voted for
    Voted,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("partyq=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = match cli.config {
        Some(ref path) => Config::load_from(path)?,
        None => Config::load().unwrap_or_else(|e| {
            tracing::warn!("Failed to load config: {:#}, using defaults", e);
            Config::default()
        }),
    };
    if let Some(url) = cli.backend_url {
        config.backend.base_url = url;
    }

    let store = Arc::new(
        LocalStore::open(&config.storage.vote_db_path()?).context("Failed to open vote store")?,
    );

    if let Command::Voted = cli.command {
        for key in store.keys_with_prefix("voted_")? {
            println!("{}", key.trim_start_matches("voted_"));
        }
        return Ok(());
    }

    let backend = Arc::new(HttpBackend::new(&config.backend)?);
    tracing::debug!("Using queue server {}", backend.base_url());
    let client = Arc::new(
        QueueSyncClient::new(backend, store).with_notice_ttl(config.ui.notice_ttl()),
    );

    match cli.command {
        Command::Search { query } => {
            let tracks = client.search(&query.join(" ")).await;
            if let Some(notice) = client.notice() {
                println!("{}", notice.message);
            } else if tracks.is_empty() {
                println!("No results");
            }
            for track in tracks {
                println!("{} — {}  [{}]", track.name, track.artist_line(), track.uri);
            }
        }
        Command::Add { uri } => {
            let notice = client.request_track(&uri).await;
            println!("{}", notice.message);
        }
        Command::Vote { uri } => match client.cast_vote(&uri).await {
            VoteOutcome::Counted { votes, message } => println!("{message} ({votes} votes)"),
            VoteOutcome::AlreadyVoted | VoteOutcome::Failed => {
                if let Some(notice) = client.notice() {
                    println!("{}", notice.message);
                }
            }
        },
        Command::Queue => {
            let state = client.synchronize().await;
            if let Some(notice) = client.notice() {
                println!("{}", notice.message);
            }
            print_state(&state);
        }
        Command::Watch => watch(&client, &config).await,
        Command::Voted => {}
    }

    Ok(())
}

async fn watch(client: &Arc<QueueSyncClient>, config: &Config) {
    let mut updates = client.subscribe();
    let poller = client.start_polling(config.sync.interval());

    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = updates.borrow_and_update().clone();
                print_state(&state);
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    poller.stop().await;
}

fn print_state(state: &SyncState) {
    println!();
    match state.now_playing {
        Some(ref track) => println!("Now playing: {} — {}", track.name, track.artist_line()),
        None => println!("Nothing playing"),
    }

    if state.queue.is_empty() {
        println!("No songs in queue");
        return;
    }
    for (i, entry) in state.queue.iter().enumerate() {
        println!(
            "{:>3}. {} — {}  ({} votes)  [{}]",
            i + 1,
            entry.track.name,
            entry.track.artist_line(),
            entry.votes,
            entry.track.uri
        );
    }
}
