//! Dragonrock Relay
//!
//! Shared virtual-tabletop state over WebSocket: merges per-field patches
//! into per-table state blobs, rebroadcasts them to the rest of the room,
//! and passes ephemeral dice/music events straight through.

use std::sync::Arc;

use clap::Parser;
use tokio::sync::Mutex;
use tracing::info;

use dragonrock::{logging, router, Registry, SharedRegistry};

#[derive(Parser)]
#[command(name = "dragonrock", about = "Dragonrock tabletop relay server")]
struct Args {
    /// Address to bind
    #[arg(long, default_value = "127.0.0.1", env = "DRAGONROCK_BIND")]
    bind: String,

    /// Port to listen on
    #[arg(long, default_value_t = 4000, env = "DRAGONROCK_PORT")]
    port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let _logging = logging::init_logging()?;

    info!("Starting Dragonrock relay...");

    // Registry lifecycle is tied to the process: built here, dropped (with
    // every room's state) on shutdown.
    let registry: SharedRegistry = Arc::new(Mutex::new(Registry::new()));
    let app = router(registry);

    let listener = tokio::net::TcpListener::bind((args.bind.as_str(), args.port)).await?;
    info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}
