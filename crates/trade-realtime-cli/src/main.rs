//! trade-realtime binary entry point.
//!
//! Usage:
//!   trade-realtime watch [--subscribe trades,user-trades,kyc] [--trade-id <id>] [--room <room>]
//!   trade-realtime token set <token> | token clear
//!   trade-realtime config show | config init [--force]
//!
//! `watch` prints every relayed event as one JSON line on stdout. Logs go to
//! stderr and to `~/.trade-realtime/logs/client.jsonl`.

use anyhow::{bail, Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use trade_realtime::events::{local, server};
use trade_realtime::{
    load_auth_token, ConnectionManager, FileStore, KeyValueStore, Paths, RealtimeConfig,
    StorageKeys, WsTransport, DEFAULT_LOG_LEVEL,
};
use tracing::{error, info, warn};

/// Relay realtime trade events from the platform server.
#[derive(Parser, Debug)]
#[command(name = "trade-realtime")]
#[command(about = "Reconnecting realtime event relay for the trade-finance platform")]
struct Args {
    /// Base directory for config, storage and logs.
    #[arg(long, env = "TRADE_REALTIME_HOME", global = true)]
    home: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    /// Defaults to the configured level.
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Connect and print relayed events as JSON lines.
    Watch(WatchArgs),
    /// Manage the stored auth token.
    Token {
        #[command(subcommand)]
        action: TokenAction,
    },
    /// Inspect or create the config file.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(ClapArgs, Debug)]
struct WatchArgs {
    /// Realtime server URL. Overrides the config file.
    #[arg(long)]
    url: Option<String>,

    /// Auth token. Falls back to the stored token.
    #[arg(long, env = "TRADE_REALTIME_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Feeds to subscribe to once authenticated.
    #[arg(long, value_enum, value_delimiter = ',')]
    subscribe: Vec<Feed>,

    /// Follow a single trade. Repeatable.
    #[arg(long = "trade-id")]
    trade_ids: Vec<String>,

    /// Join a chat room. Repeatable.
    #[arg(long = "room")]
    rooms: Vec<String>,

    /// Reconnect attempts before giving up. Overrides the config file.
    #[arg(long)]
    max_reconnect_attempts: Option<u32>,
}

#[derive(Subcommand, Debug)]
enum TokenAction {
    /// Store a token for later `watch` runs.
    Set { token: String },
    /// Remove the stored token.
    Clear,
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the effective configuration.
    Show,
    /// Write a default config file.
    Init {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Feed {
    Trades,
    UserTrades,
    Kyc,
}

/// Subscriptions issued each time the server confirms authentication.
#[derive(Debug, Default)]
struct Subscriptions {
    feeds: Vec<Feed>,
    trade_ids: Vec<String>,
    rooms: Vec<String>,
}

impl Subscriptions {
    fn apply(&self, manager: &ConnectionManager) {
        for feed in &self.feeds {
            match feed {
                Feed::Trades => manager.subscribe_to_trades(),
                Feed::UserTrades => manager.subscribe_to_user_trades(),
                Feed::Kyc => manager.subscribe_to_kyc_updates(),
            }
        }
        for trade_id in &self.trade_ids {
            manager.subscribe_to_trade(trade_id);
        }
        for room in &self.rooms {
            manager.join_room(room);
        }
    }
}

/// Events echoed to stdout.
const RELAYED_EVENTS: &[&str] = &[
    local::CONNECTED,
    local::DISCONNECTED,
    local::MAX_RECONNECT_ATTEMPTS,
    server::AUTHENTICATED,
    server::AUTH_ERROR,
    server::NEW_TRADE,
    server::TRADE_UPDATE,
    server::USER_NOTIFICATION,
    server::KYC_STATUS_UPDATE,
    server::SYSTEM_MESSAGE,
    server::JOINED_ROOM,
    server::LEFT_ROOM,
    server::SUBSCRIBED,
    server::NEW_MESSAGE,
    server::ERROR,
];

fn event_line(event: &str, payload: &Value) -> String {
    json!({ "event": event, "data": payload }).to_string()
}

async fn watch(paths: &Paths, mut config: RealtimeConfig, args: WatchArgs) -> Result<()> {
    if let Some(url) = args.url {
        config.url = url;
    }
    if let Some(max) = args.max_reconnect_attempts {
        config.max_reconnect_attempts = max;
    }
    config.validate().context("invalid realtime configuration")?;

    let token = match args.token {
        Some(token) => Some(token),
        None => load_auth_token(&FileStore::new(paths.storage_file()))?,
    };
    if token.is_none() {
        warn!("No auth token available, subscriptions will not be sent");
    }

    info!(
        url = %config.url,
        max_reconnect_attempts = config.max_reconnect_attempts,
        reconnect_base_delay_ms = config.reconnect_base_delay_ms,
        "Configuration loaded"
    );

    let manager = ConnectionManager::new(config, Arc::new(WsTransport::new()), token);

    for &event in RELAYED_EVENTS {
        manager.on(event, move |payload| println!("{}", event_line(event, payload)));
    }

    let subscriptions = Subscriptions {
        feeds: args.subscribe,
        trade_ids: args.trade_ids,
        rooms: args.rooms,
    };
    let subscriber = manager.downgrade();
    manager.on(server::AUTHENTICATED, move |_| {
        if let Some(manager) = subscriber.upgrade() {
            subscriptions.apply(&manager);
        }
    });

    let (gave_up_tx, mut gave_up_rx) = mpsc::unbounded_channel();
    manager.on(local::MAX_RECONNECT_ATTEMPTS, move |payload| {
        let _ = gave_up_tx.send(payload.clone());
    });

    manager.connect();

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::select! {
        _ = ctrl_c => {
            info!("Received shutdown signal, exiting...");
            manager.disconnect();
        }
        Some(payload) = gave_up_rx.recv() => {
            manager.disconnect();
            error!(payload = %payload, "Realtime server unreachable");
            bail!("gave up reconnecting to the realtime server");
        }
    }

    Ok(())
}

fn token_command(paths: &Paths, action: TokenAction) -> Result<()> {
    let store = FileStore::new(paths.storage_file());
    match action {
        TokenAction::Set { token } => {
            let token = token.trim();
            if token.is_empty() {
                bail!("token must not be empty");
            }
            store.set(StorageKeys::AUTH_TOKEN, token)?;
            info!(path = %paths.storage_file().display(), "Stored auth token");
        }
        TokenAction::Clear => {
            if store.delete(StorageKeys::AUTH_TOKEN)? {
                info!("Removed stored auth token");
            } else {
                info!("No stored auth token");
            }
        }
    }
    Ok(())
}

fn config_command(
    paths: &Paths,
    loaded: trade_realtime::RealtimeResult<RealtimeConfig>,
    action: ConfigAction,
) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = loaded.context("failed to load configuration")?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        ConfigAction::Init { force } => {
            let path = paths.config_file();
            if path.exists() && !force {
                bail!("{} already exists (use --force to overwrite)", path.display());
            }
            RealtimeConfig::default().save(paths)?;
            info!(path = %path.display(), "Wrote default configuration");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let paths = match args.home {
        Some(dir) => Paths::with_base_dir(dir),
        None => Paths::new()?,
    };
    let loaded = RealtimeConfig::load(&paths);

    let default_level = args
        .log_level
        .clone()
        .or_else(|| loaded.as_ref().ok().map(|config| config.log_level.clone()))
        .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string());

    observability::init_with_config(observability::LogConfig {
        service_name: "trade-realtime".into(),
        default_level,
        log_path: Some(paths.log_file()),
        also_stderr: true,
    })
    .context("failed to initialize logging")?;

    match args.command {
        Command::Watch(watch_args) => {
            let config = loaded.context("failed to load configuration")?;
            watch(&paths, config, watch_args).await
        }
        Command::Token { action } => token_command(&paths, action),
        Command::Config { action } => config_command(&paths, loaded, action),
    }
}
