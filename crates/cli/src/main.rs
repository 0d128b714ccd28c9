//! Washport terminal feed.
//!
//! Thin consumer of `washport-client`: opens the realtime channel
//! with the locally stored session and tails notifications until
//! ctrl-c. Mostly useful for support and for poking at a backend
//! without the web console.

mod logging;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::broadcast::error::RecvError;
use tracing::info;

use washport_client::{ClientConfig, FeedUpdate, SessionStore, SocketManager};

#[derive(Parser)]
#[command(name = "washport", about = "Tail the washport realtime notification feed")]
struct Args {
    /// REST API base, e.g. https://api.washport.io/api
    #[arg(
        long,
        env = "WASHPORT_API_URL",
        default_value = "http://localhost:4000/api"
    )]
    api_url: String,

    /// Path of the session blob (defaults to ~/.washport/session.json)
    #[arg(long, env = "WASHPORT_SESSION")]
    session: Option<PathBuf>,

    /// Rooms to join after connecting (repeatable)
    #[arg(long = "room")]
    rooms: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let _logging = logging::init_logging()?;

    let session_path = args.session.unwrap_or_else(|| {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join(".washport")
            .join("session.json")
    });

    let store = Arc::new(SessionStore::open(&session_path));
    if store.token().is_none() {
        eprintln!(
            "No session token found in {}; log in through the console first.",
            session_path.display()
        );
        return Ok(());
    }

    let manager = SocketManager::new(ClientConfig::new(args.api_url, &session_path), store);
    let mut updates = manager.subscribe();

    manager.start().await;
    for room in &args.rooms {
        manager.join_room(room.clone());
    }

    let snapshot = manager.snapshot();
    println!(
        "{} notifications loaded, {} unread",
        snapshot.notifications.len(),
        snapshot.unread_count
    );

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            update = updates.recv() => match update {
                Ok(update) => render(&manager, update),
                Err(RecvError::Lagged(skipped)) => {
                    println!("* feed lagged, skipped {skipped} updates");
                }
                Err(RecvError::Closed) => break,
            }
        }
    }

    manager.disconnect();
    info!(component = "cli", event = "cli.shutdown", "Feed closed");
    Ok(())
}

fn render(manager: &SocketManager, update: FeedUpdate) {
    match update {
        FeedUpdate::Connected => println!("* connected"),
        FeedUpdate::Disconnected => println!("* disconnected"),
        FeedUpdate::NotificationPushed { id } => {
            let snapshot = manager.snapshot();
            if let Some(n) = snapshot.notifications.iter().find(|n| n.id == id) {
                println!(
                    "[{:?}] {}: {} ({} unread)",
                    n.severity, n.title, n.message, snapshot.unread_count
                );
            }
        }
        FeedUpdate::UnreadCount { count } => println!("* unread: {count}"),
        FeedUpdate::MarkedRead { ids } => println!("* marked read: {}", ids.join(", ")),
        FeedUpdate::Replaced => {}
        FeedUpdate::AuthorizationChanged { family, .. } => {
            println!("* authorization changed: {family:?}");
        }
        FeedUpdate::StorePatched => println!("* session refreshed in place"),
        FeedUpdate::ReloadRequired => {
            println!("* could not refresh session silently; restart to pick up new permissions");
        }
    }
}
