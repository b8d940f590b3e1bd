//! Dragonrock CLI — a headless table client.
//!
//! Drives the client library against a live relay from the terminal:
//! watch a table, roll dice, edit the coarse fields, export/import the
//! sheet. Local state persists under `~/.dragonrock/` like any other
//! client, so the sheet stays editable with no relay at all.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use console::style;
use tokio::sync::mpsc;

use dragonrock_client::{
    auth, dice, store, Connection, ConnectionStatus, RemoteApply, RollBuffer, SyncEngine,
};
use dragonrock_client::store::{keys, JsonFileStore, KeyValueStore};
use dragonrock_protocol::{ClientMessage, ServerMessage};

#[derive(Parser)]
#[command(name = "dragonrock-cli", about = "Headless Dragonrock table client")]
struct Cli {
    /// Relay WebSocket URL
    #[arg(long, env = "DRAGONROCK_URL")]
    server: Option<String>,

    /// Table key to join
    #[arg(long, env = "DRAGONROCK_TABLE")]
    table: Option<String>,

    /// Path of the persisted client state
    #[arg(long)]
    store: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Connect, optionally log in, and print everything the table does
    Watch {
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        password: Option<String>,
        /// Stop after this many seconds (0 = run until interrupted)
        #[arg(long, default_value_t = 0)]
        duration_secs: u64,
    },

    /// Roll a die at the table
    Roll {
        #[arg(long, default_value_t = 20)]
        die: u32,
        /// Roller name when no owned character provides one
        #[arg(long)]
        name: Option<String>,
    },

    /// Set the table title
    SetTitle { title: String },

    /// Switch between edit and play mode
    SetMode {
        #[arg(long)]
        edit: bool,
    },

    /// Print the sheet as an interchange JSON document
    Export,

    /// Replace the local sheet from an interchange JSON document
    Import { path: PathBuf },

    /// Clear every persisted key
    Reset,
}

const DEFAULT_SERVER: &str = "ws://127.0.0.1:4000/ws";
const DEFAULT_TABLE: &str = "table-1";

fn store_path(cli: &Cli) -> PathBuf {
    if let Some(path) = &cli.store {
        return path.clone();
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
    PathBuf::from(home).join(".dragonrock").join("state.json")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut store = JsonFileStore::open(store_path(&cli)).context("open client store")?;

    // last-used server and table stick across runs
    let server = cli
        .server
        .clone()
        .or_else(|| store.get(keys::SERVER_URL))
        .unwrap_or_else(|| DEFAULT_SERVER.to_string());
    let table = cli
        .table
        .clone()
        .or_else(|| store.get(keys::TABLE))
        .unwrap_or_else(|| DEFAULT_TABLE.to_string());
    store.set(keys::SERVER_URL, &server);
    store.set(keys::TABLE, &table);

    let origin = store::client_id(&mut store);
    let mut engine = SyncEngine::with_state(table, origin, store::load_table(&store));

    match cli.command {
        Command::Export => {
            println!("{}", serde_json::to_string_pretty(&engine.export_json())?);
            Ok(())
        }

        Command::Import { path } => {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("read {}", path.display()))?;
            engine.import_json(&text)?;
            store::save_table(&mut store, engine.state());
            println!(
                "imported: {} ({} characters)",
                engine.state().title,
                engine.state().chars.len()
            );
            Ok(())
        }

        Command::Reset => {
            store::reset_all(&mut store);
            println!("cleared all persisted state");
            Ok(())
        }

        Command::SetTitle { title } => {
            let msg = engine.set_title(title);
            send_and_flush(&server, &engine, msg).await?;
            store::save_table(&mut store, engine.state());
            Ok(())
        }

        Command::SetMode { edit } => {
            let msg = engine.set_edit_mode(edit);
            send_and_flush(&server, &engine, msg).await?;
            store::save_table(&mut store, engine.state());
            Ok(())
        }

        Command::Roll { die, name } => {
            let (connection, _inbound) = connect(&server, &engine).await?;

            let fallback = name.unwrap_or_default();
            let identity = auth::load_session(&store).map(|s| s.username);
            let roller =
                dice::roller_name(engine.state().chars.as_slice(), identity.as_deref(), &fallback);

            let result = dice::roll_animated(die, |face| {
                print!("\r{} {:>3}", style("rolling").dim(), face);
            })
            .await;
            println!("\r{} rolled d{die}: {}", roller, style(result).bold());

            let roll = dice::make_roll(roller, die, result);
            let mut log = RollBuffer::log();
            log.record(roll.clone());
            connection.send(ClientMessage::DiceRoll {
                table_id: engine.table_id().to_string(),
                payload: roll,
                origin_client_id: Some(engine.origin_id().to_string()),
            });

            // give the outbound queue a beat to drain before exiting
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(())
        }

        Command::Watch {
            username,
            password,
            duration_secs,
        } => {
            let (mut connection, mut inbound) = connect(&server, &engine).await?;

            if let Some(username) = username {
                let password = password.unwrap_or_default();
                let Some(session) = auth::authenticate(&username, &password) else {
                    bail!("unknown username or wrong password");
                };
                auth::persist_session(&mut store, &session);
                login(
                    &mut engine,
                    &mut connection,
                    &mut inbound,
                    &mut store,
                    &session,
                )
                .await?;
                println!("logged in as {} ({:?})", session.username, session.role);
            }

            println!(
                "watching {} on {} — ctrl-c to stop",
                style(engine.table_id()).bold(),
                server
            );

            let deadline = (duration_secs > 0)
                .then(|| tokio::time::Instant::now() + Duration::from_secs(duration_secs));
            watch_loop(&mut engine, &mut inbound, deadline).await;

            store::save_table(&mut store, engine.state());
            Ok(())
        }
    }
}

/// Open a connection that joins the table and pushes the local mirror on
/// every (re)connect.
async fn connect(
    server: &str,
    engine: &SyncEngine,
) -> anyhow::Result<(Connection, mpsc::Receiver<ServerMessage>)> {
    let (mut connection, inbound) =
        Connection::open_with_handshake(server, engine.connect_sequence().to_vec());
    if !connection.wait_connected().await {
        bail!("could not reach the relay at {server} — sheet stays local-only");
    }
    Ok((connection, inbound))
}

/// Take the identity lock, rolling the optimistic session back if the
/// relay rejects it. Messages that arrive ahead of the auth reply (the
/// join snapshot, early patches) still flow into the engine.
async fn login(
    engine: &mut SyncEngine,
    connection: &mut Connection,
    inbound: &mut mpsc::Receiver<ServerMessage>,
    store: &mut JsonFileStore,
    session: &auth::UserSession,
) -> anyhow::Result<()> {
    connection.send(ClientMessage::AuthLogin {
        username: session.username.clone(),
    });

    let reply = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(msg) = inbound.recv().await {
            if let ServerMessage::AuthResult { ok, reason } = msg {
                return Some((ok, reason));
            }
            engine.apply_remote(msg);
        }
        None
    })
    .await;

    match reply {
        Ok(Some((true, _))) => Ok(()),
        Ok(Some((false, reason))) => {
            auth::clear_session(store);
            bail!(
                "login rejected: {}",
                reason.unwrap_or_else(|| "identity in use".to_string())
            );
        }
        _ => {
            auth::clear_session(store);
            bail!("no auth reply from the relay");
        }
    }
}

async fn watch_loop(
    engine: &mut SyncEngine,
    inbound: &mut mpsc::Receiver<ServerMessage>,
    deadline: Option<tokio::time::Instant>,
) {
    let mut toasts = RollBuffer::toast();

    loop {
        let msg = match deadline {
            Some(deadline) => match tokio::time::timeout_at(deadline, inbound.recv()).await {
                Ok(msg) => msg,
                Err(_) => return,
            },
            None => inbound.recv().await,
        };
        let Some(msg) = msg else {
            println!("{}", style("sync lost — still editable offline").yellow());
            return;
        };

        match engine.apply_remote(msg) {
            RemoteApply::Patched => {
                println!(
                    "state: title={:?} edit_mode={}",
                    engine.state().title,
                    engine.state().edit_mode
                );
            }
            RemoteApply::Roster => {
                println!("roster: {} characters", engine.state().chars.len());
            }
            RemoteApply::Echo | RemoteApply::Ignored => {}
            RemoteApply::Unhandled(msg) => print_event(&mut toasts, msg),
        }
    }
}

fn print_event(toasts: &mut RollBuffer, msg: ServerMessage) {
    match msg {
        ServerMessage::DiceRoll { payload, .. } => {
            // dice are not origin-filtered; the toast buffer de-dups by ts
            if toasts.record(payload.clone()) {
                println!(
                    "{} {} rolled d{} → {}",
                    style("dice:").cyan(),
                    payload.name,
                    payload.die,
                    style(payload.result).bold()
                );
            }
        }
        ServerMessage::MusicControl { payload } => {
            println!(
                "{} {:?} {}",
                style("music:").magenta(),
                payload.action,
                payload.track.map(|t| t.name).unwrap_or_default()
            );
        }
        ServerMessage::UserJoined { user_id, .. } => {
            println!("{} {user_id} joined", style("user:").green());
        }
        ServerMessage::UserLeft { user_id, .. } => {
            println!("{} {user_id} left", style("user:").green());
        }
        ServerMessage::AuthResult { .. } => {}
        ServerMessage::Error { code, message } => {
            eprintln!("{} {code}: {message}", style("relay error").red());
        }
        other => {
            eprintln!("unrouted message: {other:?}");
        }
    }
}

/// Open a connection, push the local mirror plus one edit, and give the
/// queue a moment to drain.
async fn send_and_flush(
    server: &str,
    engine: &SyncEngine,
    msg: ClientMessage,
) -> anyhow::Result<()> {
    let (connection, _inbound) = connect(server, engine).await?;
    connection.send(msg);
    tokio::time::sleep(Duration::from_millis(200)).await;
    if connection.status() != ConnectionStatus::Connected {
        eprintln!("{}", style("warning: connection dropped mid-send").yellow());
    }
    Ok(())
}
