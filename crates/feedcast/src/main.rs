//! # feedcast
//!
//! Binary entry point: `serve` wires the bus, hub, bridge and HTTP listener
//! together; `publish` sends one feed-created event and exits.

#![deny(unsafe_code)]

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use feedcast_bus::feed::publish_created_feed;
use feedcast_bus::{ConnectOptions, EventBus};
use feedcast_core::FeedCreatedEvent;
use feedcast_core::logging::init_subscriber;
use feedcast_server::websocket::event_bridge::DEFAULT_BRIDGE_CAPACITY;
use feedcast_server::{EventBridge, FeedcastServer, ServerConfig};
use feedcast_settings::{FeedcastSettings, load_settings};

/// Slack on top of `shutdownTimeoutMs` for the hub task to report back.
const HUB_JOIN_GRACE: Duration = Duration::from_secs(1);

/// Bridge and HTTP tasks stop on the token; this only bounds a wedged task.
const TASK_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Push feed-created events to WebSocket clients.
#[derive(Parser, Debug)]
#[command(name = "feedcast", version, about = "Push feed-created events to WebSocket clients")]
struct Cli {
    /// Settings file (default: `~/.feedcast/settings.json`, if present).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the WebSocket server.
    Serve {
        /// Host to bind.
        #[arg(long)]
        host: Option<String>,

        /// Port to bind (0 for auto-assign).
        #[arg(long)]
        port: Option<u16>,

        /// Bus address (`nats://host:port` or `memory://`).
        #[arg(long)]
        bus: Option<String>,
    },
    /// Publish one feed-created event and exit.
    Publish {
        /// Feed title.
        #[arg(long)]
        title: String,

        /// Feed description.
        #[arg(long, default_value = "")]
        description: String,

        /// Bus address (`nats://host:port` or `memory://`).
        #[arg(long)]
        bus: Option<String>,
    },
}

impl Cli {
    /// Settings from file and environment, with command-line flags on top.
    fn resolve_settings(&self) -> Result<FeedcastSettings> {
        let mut settings =
            load_settings(self.config.as_deref()).context("Failed to load settings")?;
        match &self.command {
            Command::Serve { host, port, bus } => {
                if let Some(host) = host {
                    settings.server.host.clone_from(host);
                }
                if let Some(port) = port {
                    settings.server.port = *port;
                }
                if let Some(bus) = bus {
                    settings.bus.address.clone_from(bus);
                }
            }
            Command::Publish { bus, .. } => {
                if let Some(bus) = bus {
                    settings.bus.address.clone_from(bus);
                }
            }
        }
        settings.validate().context("Invalid settings")?;
        Ok(settings)
    }
}

fn connect_options(settings: &FeedcastSettings) -> ConnectOptions {
    ConnectOptions {
        client_name: settings.bus.client_name.clone(),
        connect_timeout: settings.bus.connect_timeout(),
    }
}

async fn connect_bus(settings: &FeedcastSettings) -> Result<Arc<dyn EventBus>> {
    feedcast_bus::connect(&settings.bus.address, &connect_options(settings))
        .await
        .with_context(|| format!("Failed to connect to bus at {}", settings.bus.address))
}

async fn serve(settings: FeedcastSettings) -> Result<()> {
    let bus = connect_bus(&settings).await?;

    let mut server = FeedcastServer::new(ServerConfig::from(&settings.server));
    match feedcast_server::metrics::install_recorder() {
        Ok(handle) => server = server.with_metrics(handle),
        Err(e) => tracing::warn!(error = %e, "metrics recorder not installed"),
    }

    let shutdown = Arc::clone(server.shutdown());
    run_server(server, bus, &settings, shutdown.wait_for_signal()).await
}

/// Serve until `stop` resolves or the bus subscription ends on its own.
///
/// Losing the subscription is fatal: the server drains like on a signal and
/// an error is returned so the process exits non-zero.
async fn run_server(
    server: FeedcastServer,
    bus: Arc<dyn EventBus>,
    settings: &FeedcastSettings,
    stop: impl Future<Output = ()>,
) -> Result<()> {
    let shutdown = Arc::clone(server.shutdown());
    let hub_handle = server.spawn_hub();

    let topic = &settings.bus.created_feed_topic;
    let (bridge, subscription) =
        EventBridge::subscribe(bus.as_ref(), topic, Arc::clone(server.hub()), DEFAULT_BRIDGE_CAPACITY)
            .await
            .with_context(|| format!("Failed to subscribe to {topic}"))?;
    let mut bridge_handle = tokio::spawn(bridge.run(shutdown.token()));

    let (addr, http_handle) = server.listen().await.context("Failed to bind server")?;
    tracing::info!(
        "feedcast listening on ws://{addr}{} (bus {}, topic {topic})",
        settings.server.ws_path,
        settings.bus.address
    );

    let bridge_done = tokio::select! {
        () = stop => false,
        _ = &mut bridge_handle => true,
    };
    let bus_lost = bridge_done && !shutdown.is_shutting_down();
    if bus_lost {
        tracing::error!(topic, bus_closed = bus.is_closed(), "event bus subscription ended, shutting down");
    }
    shutdown.shutdown();
    tracing::info!("Shutting down...");

    let _ = shutdown.join_phase("http", http_handle, TASK_JOIN_TIMEOUT).await;
    let hub_timeout = settings.server.shutdown_timeout() + HUB_JOIN_GRACE;
    let _ = shutdown.join_phase("hub", hub_handle, hub_timeout).await;
    if !bridge_done {
        let _ = shutdown.join_phase("bridge", bridge_handle, TASK_JOIN_TIMEOUT).await;
    }

    subscription.unsubscribe();
    bus.close().await;

    if bus_lost {
        anyhow::bail!("Lost the event bus subscription on {topic}");
    }
    tracing::info!("Shutdown complete");
    Ok(())
}

async fn publish(settings: &FeedcastSettings, title: String, description: String) -> Result<()> {
    let bus = connect_bus(settings).await?;
    let event = FeedCreatedEvent::new(title, description);
    let result = publish_created_feed(bus.as_ref(), &settings.bus.created_feed_topic, &event).await;
    bus.close().await;
    result.context("Failed to publish event")?;
    println!("{}", event.id());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = cli.resolve_settings()?;
    init_subscriber(&settings.logging.level, settings.logging.json);

    match cli.command {
        Command::Serve { .. } => serve(settings).await,
        Command::Publish {
            title, description, ..
        } => publish(&settings, title, description).await,
    }
}
