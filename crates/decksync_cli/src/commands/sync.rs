//! Sync and full-sync command implementations.
//!
//! The server collection is served in-process by [`SyncServer`]; every
//! request still goes through the HTTP transport, envelope encoding and
//! host-key authentication.

use clap::{Args, ValueEnum};
use decksync_engine::{
    full, HttpTransport, LoopbackClient, RetryConfig, SyncConfig, SyncOutcome, SyncSession,
};
use decksync_server::{ServerConfig, SyncServer};
use decksync_store::RecordStore;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

const LOCAL_URL: &str = "local://decksync";

type Transport = HttpTransport<LoopbackClient<Arc<SyncServer>>>;

/// Where and how to reach the server collection.
#[derive(Debug, Clone, Args)]
pub struct RemoteArgs {
    /// Path to the server collection file
    #[arg(short, long)]
    pub server: PathBuf,

    /// Host key presented on every request
    #[arg(long, env = "DECKSYNC_HOST_KEY", hide_env_values = true)]
    pub host_key: Option<String>,

    /// Account name, used to obtain a host key
    #[arg(short, long, env = "DECKSYNC_USERNAME")]
    pub username: Option<String>,

    /// Account password
    #[arg(long, env = "DECKSYNC_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Secret the server signs host keys with; enables authentication
    #[arg(long, env = "DECKSYNC_SERVER_SECRET", hide_env_values = true)]
    pub secret: Option<String>,

    /// Rows per chunk page
    #[arg(long, default_value = "250")]
    pub chunk_size: usize,
}

/// Whole-collection transfer direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Direction {
    /// Replace the server collection with the local one
    Upload,
    /// Replace the local collection with the server's
    Download,
}

fn open_server(remote: &RemoteArgs) -> Result<Arc<SyncServer>, Box<dyn std::error::Error>> {
    let store = RecordStore::open(&remote.server)?;
    let mut config = ServerConfig::default().with_chunk_size(remote.chunk_size);
    if let Some(secret) = &remote.secret {
        config = config.with_auth(secret.as_bytes().to_vec());
        if let (Some(username), Some(password)) = (&remote.username, &remote.password) {
            config = config.with_account(username.clone(), password.clone());
        }
    }
    Ok(Arc::new(SyncServer::new(config, store)))
}

fn connect(server: &Arc<SyncServer>, remote: &RemoteArgs) -> Result<Transport, Box<dyn std::error::Error>> {
    let mut transport = HttpTransport::new(LOCAL_URL, LoopbackClient::new(Arc::clone(server)));
    match (&remote.host_key, &remote.username, &remote.password) {
        (Some(key), _, _) => transport = transport.with_host_key(key.clone()),
        (None, Some(username), Some(password)) => {
            transport.login(username, password)?;
        }
        _ => {}
    }
    Ok(transport)
}

fn client_version() -> String {
    format!("decksync-cli,{}", env!("CARGO_PKG_VERSION"))
}

/// Runs the sync command.
pub fn run(path: &Path, remote: &RemoteArgs, retries: u32) -> Result<(), Box<dyn std::error::Error>> {
    let store = RecordStore::open(path)?;
    let server = open_server(remote)?;
    let config = SyncConfig::new(client_version())
        .with_chunk_size(remote.chunk_size)
        .with_retry(RetryConfig::new(retries.max(1)));
    let session = SyncSession::new(config, connect(&server, remote)?);

    let outcome = session.sync_with_retry(&store)?;
    let stats = session.stats();
    println!("Sync finished: {}", outcome);

    match &outcome {
        SyncOutcome::Success => {
            println!("  Rows sent:     {}", stats.rows_sent);
            println!("  Rows received: {}", stats.rows_received);
            println!("  Deletions:     {} sent, {} received", stats.graves_sent, stats.graves_received);
            Ok(())
        }
        SyncOutcome::NoChanges => Ok(()),
        SyncOutcome::FullSync => {
            println!("Schemas diverged; run `decksync full-sync upload` or `decksync full-sync download`");
            Ok(())
        }
        SyncOutcome::SanityCheckError { client, server } => {
            println!("  Local:  {}", serde_json::to_string(client)?);
            println!("  Server: {}", serde_json::to_string(server)?);
            Err(format!("sync failed: {}", outcome).into())
        }
        _ => Err(format!("sync failed: {}", outcome).into()),
    }
}

/// Runs the full-sync command.
pub fn run_full(path: &Path, remote: &RemoteArgs, direction: Direction) -> Result<(), Box<dyn std::error::Error>> {
    let mut store = RecordStore::open(path)?;
    let server = open_server(remote)?;
    let transport = connect(&server, remote)?;

    match direction {
        Direction::Upload => full::full_upload(&transport, &store)?,
        Direction::Download => full::full_download(&transport, &mut store)?,
    }
    info!(?direction, "full sync complete");
    println!("Full sync ({:?}) complete", direction);
    Ok(())
}
