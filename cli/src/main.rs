//! TRONostr CLI — run the oracle or listen to what it publishes.
//!
//! # Commands
//! ```text
//! tronostr run     [--config ./config.yaml]
//! tronostr listen  [--config ./config.yaml] [--stream all|block|transfer|alerts]
//! tronostr info    [--config ./config.yaml]
//! tronostr version
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use tronostr_core::dispatch::Dispatcher;
use tronostr_core::watcher::Watcher;
use tronostr_nostr::{parse_keys, Keys, Publisher, ReceivedEvent, TronostrClient};
use tronostr_tron::TronGridClient;

mod config;
mod logging;

use config::AppConfig;

const PRIVATE_KEY_ENV: &str = "NOSTR_PRIVATE_KEY";
const TRON_API_KEY_ENV: &str = "TRON_PRO_API_KEY";

#[derive(Parser)]
#[command(
    name = "tronostr",
    about = "TRON → Nostr oracle: watches blocks, detects insights, publishes signed events",
    long_about = "
TRONostr watches TRON blocks, runs detectors over them and publishes the
resulting insights as signed Nostr events (kinds 6500..6599 by default).

ENVIRONMENT VARIABLES:
  NOSTR_PRIVATE_KEY   Hex or nsec secret key used to sign events (required for run)
  TRON_PRO_API_KEY    TronGrid API key (optional)
",
    version
)]
struct Cli {
    /// Path to the YAML config file
    #[arg(short, long, global = true, default_value = "./config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch TRON and publish insights to the configured relays
    Run,

    /// Subscribe to published insights and print them
    Listen {
        /// Which events to print
        #[arg(long, value_enum, default_value_t = Stream::All)]
        stream: Stream,
    },

    /// Show the effective configuration
    Info,

    /// Print version
    Version,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Stream {
    All,
    Block,
    Transfer,
    Alerts,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run => {
            let config = load_config(&cli.config)?;
            logging::init_tracing(&config.log);
            cmd_run(config).await
        }
        Commands::Listen { stream } => {
            let config = load_config(&cli.config)?;
            logging::init_tracing(&config.log);
            cmd_listen(config, stream).await
        }
        Commands::Info => cmd_info(&cli.config),
        Commands::Version => {
            println!("tronostr {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn load_config(path: &Path) -> Result<AppConfig> {
    let config = AppConfig::load(path)?;
    config.validate()?;
    Ok(config)
}

fn signing_keys() -> Result<Keys> {
    let secret = std::env::var(PRIVATE_KEY_ENV)
        .with_context(|| format!("{PRIVATE_KEY_ENV} is not set"))?;
    parse_keys(&secret).with_context(|| format!("{PRIVATE_KEY_ENV} is invalid"))
}

// ─── Command implementations ─────────────────────────────────────────────────

async fn cmd_run(config: AppConfig) -> Result<()> {
    let keys = signing_keys()?;
    let api_key = std::env::var(TRON_API_KEY_ENV).ok().filter(|k| !k.is_empty());

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "TRONostr oracle starting");

    let publisher = Arc::new(Publisher::new(config.publisher_config(), keys));
    let connected = publisher.connect().await;
    tracing::info!(
        relays = connected,
        configured = config.nostr.relays.len(),
        pubkey = %publisher.public_key(),
        "Publisher ready"
    );

    let registry = config.detector_registry()?;
    for name in registry.names() {
        tracing::info!(detector = name, "Detector enabled");
    }

    let source = TronGridClient::new(config.tron_grid_config(api_key))?;
    tracing::info!(full_host = source.url(), "Watching TRON");
    let mut watcher = Watcher::new(source, config.watcher_config());
    let mut dispatcher = Dispatcher::new(registry, Arc::clone(&publisher));

    let handle = watcher.handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown requested");
            handle.stop();
        }
    });

    watcher.start(&mut dispatcher).await;
    publisher.stop();
    tracing::info!(
        insights = dispatcher.published(),
        queued = publisher.queue_len(),
        "TRONostr oracle stopped"
    );
    Ok(())
}

async fn cmd_listen(config: AppConfig, stream: Stream) -> Result<()> {
    let mut client = TronostrClient::new(config.nostr.relays.clone(), config.nostr.kind_range.start);
    if client.connect().await == 0 {
        bail!("could not connect to any relay");
    }

    let mut events = match stream {
        Stream::All => client.on_all(),
        Stream::Block => client.on_block(),
        Stream::Transfer => client.on_transfer(),
        Stream::Alerts => client.on_alerts(),
    };

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => print_event(&event),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    client.close();
    Ok(())
}

fn print_event(received: &ReceivedEvent) {
    let event = &received.event;
    let kind_type = received.tag("type").unwrap_or("-");
    let severity = received.severity().unwrap_or("-");
    let content = received
        .parsed_content
        .as_ref()
        .map(|c| c.to_string())
        .unwrap_or_else(|| event.content.clone());
    println!(
        "[{}] kind={} type={} severity={} {}",
        received.relay,
        event.kind.as_u16(),
        kind_type,
        severity,
        content
    );
}

fn cmd_info(path: &Path) -> Result<()> {
    println!("TRONostr v{}", env!("CARGO_PKG_VERSION"));
    println!();

    let config = match AppConfig::load(path) {
        Ok(config) => {
            println!("Config:          {}", path.display());
            config
        }
        Err(e) => {
            println!("Config:          defaults ({e:#})");
            AppConfig::default()
        }
    };
    if let Err(e) = config.validate() {
        println!("Validation:      {e}");
    }

    let range = config.nostr.kind_range;
    let rate = config.nostr.rate_limit;
    println!("TRON node:       {}", config.tron.full_host);
    println!("Poll interval:   {} ms", config.tron.poll_interval_ms);
    println!("Relays:          {}", config.nostr.relays.join(", "));
    println!("Kind band:       {}..={}", range.start, range.end);
    println!(
        "Rate limit:      {} events/min, queue {}",
        rate.events_per_minute, rate.queue_size
    );
    match config.detector_registry() {
        Ok(registry) => println!("Detectors:       {}", registry.names().join(", ")),
        Err(e) => println!("Detectors:       {e}"),
    }
    match signing_keys() {
        Ok(keys) => println!("Public key:      {}", keys.public_key().to_hex()),
        Err(e) => println!("Public key:      {e:#}"),
    }
    Ok(())
}
