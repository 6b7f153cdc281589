//! HireQ Realtime CLI - watch the recruiting dashboard's push channel.
//!
//! This is the main binary entry point. See the `hireq_realtime` library
//! for the core functionality.

use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use hireq_realtime::env::Environment;
use hireq_realtime::{Config, ConnectionManager, ConnectionState, Notification, Platform};
use mimalloc::MiMalloc;
use tokio::sync::mpsc;

/// Global allocator configured per M-MIMALLOC-APPS guideline.
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// How long to wait for the close handshake after Ctrl-C.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(250);

// CLI
#[derive(Parser)]
#[command(name = "hireq-realtime")]
#[command(version)]
#[command(about = "Realtime update client for the HireQ dashboard")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Default)]
struct Identity {
    /// User id to connect as
    #[arg(long)]
    user_id: Option<String>,
    /// Auth token (prefer HIREQ_TOKEN to keep it out of shell history)
    #[arg(long)]
    token: Option<String>,
}

#[derive(Args, Debug, Default)]
struct Target {
    /// WebSocket base, e.g. ws://localhost:8000/api/realtime/ws
    #[arg(long)]
    ws_url: Option<String>,
    /// HTTP API base the WebSocket base is derived from
    #[arg(long)]
    api_url: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect and print notifications as they arrive
    Watch {
        #[command(flatten)]
        identity: Identity,
        #[command(flatten)]
        target: Target,
        /// Do not reconnect after the connection drops
        #[arg(long)]
        no_reconnect: bool,
        /// Base delay before the first reconnect attempt
        #[arg(long)]
        reconnect_delay_ms: Option<u64>,
        /// Print one JSON object per notification
        #[arg(long)]
        json: bool,
    },
    /// Print the resolved channel URL
    Url {
        #[command(flatten)]
        identity: Identity,
        #[command(flatten)]
        target: Target,
    },
    /// Print the effective configuration
    Config {
        /// Persist the effective configuration (token excluded)
        #[arg(long)]
        save: bool,
    },
}

fn apply_overrides(config: &mut Config, identity: Identity, target: Target) {
    if let Some(user_id) = identity.user_id {
        config.user_id = user_id;
    }
    if let Some(token) = identity.token {
        config.token = Some(token);
    }
    if let Some(ws_url) = target.ws_url {
        config.ws_url = Some(ws_url);
    }
    if let Some(api_url) = target.api_url {
        config.api_url = Some(api_url);
    }
}

/// Runs `watch` until Ctrl-C.
async fn watch(config: Config, json: bool) -> Result<()> {
    let (notifications_tx, mut notifications_rx) = mpsc::unbounded_channel::<Notification>();

    let manager = ConnectionManager::builder()
        .endpoint(config.endpoint())
        .config(config.connection_config())
        .platform(Platform::Client)
        .on_notification(move |notification| {
            let _ = notifications_tx.send(notification.clone());
        })
        .build();

    log::info!(
        "Watching {} as {}",
        config.ws_base(),
        manager.config().user_id
    );

    let mut state_rx = manager.subscribe_state();
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = &mut shutdown => {
                result.context("failed to listen for Ctrl-C")?;
                break;
            }
            Ok(()) = state_rx.changed() => {
                let state = *state_rx.borrow_and_update();
                print_state(state);
            }
            Some(notification) = notifications_rx.recv() => {
                print_notification(&notification, json)?;
            }
        }
    }

    eprintln!("Shutting down...");
    manager.disconnect();
    let _ = tokio::time::timeout(
        SHUTDOWN_GRACE,
        manager.wait_for_state(ConnectionState::Disconnected),
    )
    .await;
    drop(manager);
    // Let the link task flush its close frame
    tokio::time::sleep(SHUTDOWN_GRACE).await;

    Ok(())
}

fn print_state(state: ConnectionState) {
    let now = chrono::Local::now().format("%H:%M:%S");
    eprintln!("[{now}] {state}");
}

fn print_notification(notification: &Notification, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(notification)?);
    } else {
        println!(
            "[{}] {}",
            notification.timestamp.format("%H:%M:%S"),
            notification.message
        );
    }
    Ok(())
}

fn print_config(config: &Config) -> Result<()> {
    let mut value = serde_json::to_value(config)?;
    if let Some(map) = value.as_object_mut() {
        let token = if config.token.as_deref().is_some_and(|t| !t.is_empty()) {
            "<redacted>"
        } else {
            "<unset>"
        };
        map.insert("token".to_string(), serde_json::Value::from(token));
        map.insert(
            "resolved_ws_base".to_string(),
            serde_json::Value::from(config.ws_base()),
        );
    }
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

/// Log filter used when `RUST_LOG` is unset.
fn default_log_filter(environment: Environment) -> &'static str {
    if environment.is_development() {
        "debug"
    } else {
        "info"
    }
}

fn main() -> Result<()> {
    let environment = Environment::current();

    // Logs go to stderr so stdout carries notifications only
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(default_log_filter(environment)),
    )
    .format_timestamp_secs()
    .init();

    log::debug!("Environment: {}", environment);

    let cli = Cli::parse();
    let mut config = Config::load()?;

    match cli.command {
        Commands::Watch {
            identity,
            target,
            no_reconnect,
            reconnect_delay_ms,
            json,
        } => {
            apply_overrides(&mut config, identity, target);
            if no_reconnect {
                config.auto_reconnect = false;
            }
            if let Some(ms) = reconnect_delay_ms {
                config.reconnect_delay_ms = ms;
            }

            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("failed to start tokio runtime")?;
            runtime.block_on(watch(config, json))?;
        }
        Commands::Url { identity, target } => {
            apply_overrides(&mut config, identity, target);
            let live = config.connection_config();
            let url = config.endpoint().channel_url(
                Platform::Client,
                &live.user_id,
                live.token.as_deref(),
            );
            println!("{url}");
        }
        Commands::Config { save } => {
            print_config(&config)?;
            if save {
                config.save()?;
                eprintln!(
                    "Saved to {}",
                    Config::config_dir()?.join("config.json").display()
                );
            }
        }
    }

    Ok(())
}
