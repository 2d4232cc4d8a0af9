//! Hass Sensor Agent CLI
//!
//! Reports local sensor readings to a Home Assistant webhook.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use hass_sensor_agent::{
    api::{ApiClient, ApiConfig, Registration, StaticHostInfo},
    build_producers,
    config::{Config, ProducerConfig},
    preferences::keys,
    shutdown, spawn_producer, FilePreferences, MetadataStore, PreferenceStore, ReportStats,
    SensorTracker, VERSION,
};
use std::fs::File;
use std::sync::{Arc, Mutex};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const LOG_FILE: &str = "hass-sensor-agent.log";
const STATS_FILE: &str = "report_stats.json";
const METADATA_FILE: &str = "sensor_metadata.json";

#[derive(Parser)]
#[command(name = "hass-sensor-agent")]
#[command(version = VERSION)]
#[command(about = "Report local sensors to a Home Assistant webhook", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register this device with a server
    Register {
        /// Server address (host:port or full URL)
        #[arg(long)]
        server: String,

        /// Long-lived access token
        #[arg(long)]
        token: String,

        /// Use https for a bare host:port
        #[arg(long)]
        tls: bool,

        /// Register again even if already registered
        #[arg(long)]
        force: bool,
    },

    /// Start reporting sensors
    Run {
        /// Producers to run (memory, load, uptime, users, or all)
        #[arg(long)]
        producers: Option<String>,
    },

    /// Show registration state and reporting statistics
    Status,

    /// Show device identity
    Info,

    /// Show configuration
    Config,
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Register {
            server,
            token,
            tls,
            force,
        } => cmd_register(server, token, tls, force),
        Commands::Run { producers } => cmd_run(producers),
        Commands::Status => cmd_status(),
        Commands::Info => cmd_info(),
        Commands::Config => cmd_config(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

/// Load config and open the preference store under its data path.
fn open_store() -> anyhow::Result<(Config, FilePreferences)> {
    let config = Config::load().context("loading configuration")?;
    config
        .ensure_directories()
        .context("creating data directory")?;
    let prefs = FilePreferences::open(&config.data_path).context("opening preferences")?;
    Ok((config, prefs))
}

/// Log to stderr and to the agent's log file.
fn init_logging(config: &Config, prefs: &FilePreferences) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let log_path = prefs.storage_path(LOG_FILE)?;
    let (file_layer, file_error) = match File::options().create(true).append(true).open(&log_path) {
        Ok(file) => (
            Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file))),
            None,
        ),
        Err(e) => (None, Some(e)),
    };

    // A missing file layer leaves stderr only.
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .try_init()
        .context("installing log subscriber")?;

    if let Some(e) = file_error {
        tracing::warn!("Could not open log file {}: {e}", log_path.display());
    }
    Ok(())
}

fn runtime() -> anyhow::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("starting async runtime")
}

fn cmd_register(server: String, token: String, tls: bool, force: bool) -> anyhow::Result<()> {
    let (config, mut prefs) = open_store()?;
    init_logging(&config, &prefs)?;

    println!("Hass Sensor Agent v{VERSION}");
    println!("Registering with {server}...");

    let provider = StaticHostInfo::new(server, token, tls);
    let client = ApiClient::new(config.request_timeout)?;
    let mut registration = Registration::new(client).force(force);

    let credentials = runtime()?.block_on(registration.run(&provider, &mut prefs))?;

    println!("Registration complete.");
    println!("  Webhook ID: {}", credentials.webhook_id);
    println!(
        "  Encryption: {}",
        if credentials.secret.is_some() {
            "enabled"
        } else {
            "disabled"
        }
    );
    Ok(())
}

fn cmd_run(producers: Option<String>) -> anyhow::Result<()> {
    let (config, prefs) = open_store()?;
    init_logging(&config, &prefs)?;

    if !prefs.is_registered() {
        bail!("device is not registered; run `hass-sensor-agent register` first");
    }

    let producer_config = producers
        .as_deref()
        .map(ProducerConfig::from_csv)
        .unwrap_or_else(|| config.producers.clone());
    if !producer_config.any_enabled() {
        bail!("at least one producer must be enabled (memory, load, uptime or users)");
    }

    let api = ApiConfig::from_preferences(&prefs, config.require_encryption)?;
    let client = ApiClient::new(config.request_timeout)?;
    let stats = Arc::new(ReportStats::with_persistence(
        prefs.storage_path(STATS_FILE)?,
    ));
    let metadata = MetadataStore::new(prefs.storage_path(METADATA_FILE)?);

    println!("Hass Sensor Agent v{VERSION}");
    println!("  Endpoint: {}", api.api_url);
    println!(
        "  Encryption: {}",
        if api.encrypt { "enabled" } else { "disabled" }
    );
    println!("  Update interval: {}s", config.update_interval.as_secs());
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let (trigger, signal) = shutdown::channel();
    ctrlc::set_handler(move || trigger.trigger()).context("setting Ctrl+C handler")?;

    let device = prefs
        .get(keys::DEVICE_NAME)?
        .unwrap_or_else(|| "unknown".to_string());

    runtime()?.block_on(async {
        let span = tracing::info_span!("tracker", device = %device);
        let tracker = SensorTracker::new(
            client,
            api,
            Arc::clone(&stats),
            Some(metadata),
            signal.clone(),
            span,
        );

        let streams: Vec<_> = build_producers(&producer_config)
            .into_iter()
            .map(|producer| {
                tracing::info!(producer = producer.name(), "Starting producer");
                spawn_producer(producer, config.update_interval, signal.clone())
            })
            .collect();

        for task in tracker.start(streams) {
            if let Err(e) = task.await {
                tracing::error!("Consumption loop failed: {e}");
            }
        }
        tracker.drain().await;
        tracing::info!(sensors = tracker.sensor_list().len(), "Tracker stopped");
    });

    if let Err(e) = stats.save() {
        eprintln!("Warning: could not save report statistics: {e}");
    }

    println!();
    println!("{}", stats.summary());
    Ok(())
}

fn cmd_status() -> anyhow::Result<()> {
    let (config, prefs) = open_store()?;

    println!("Hass Sensor Agent Status");
    println!("========================");
    println!();

    if !prefs.is_registered() {
        println!("Registered: no");
        println!();
        println!("Run `hass-sensor-agent register --server <host:port> --token <token>`.");
        return Ok(());
    }

    println!("Registered: yes");
    match ApiConfig::from_preferences(&prefs, config.require_encryption) {
        Ok(api) => {
            println!("  Endpoint: {}", api.api_url);
            println!(
                "  Encryption: {}",
                if api.encrypt { "enabled" } else { "disabled" }
            );
        }
        Err(e) => println!("  Endpoint: unavailable ({e})"),
    }
    println!();

    let stats_path = prefs.storage_path(STATS_FILE)?;
    if stats_path.exists() {
        println!("{}", ReportStats::with_persistence(stats_path).summary());
    } else {
        println!("No previous session data found.");
    }
    Ok(())
}

fn cmd_info() -> anyhow::Result<()> {
    let (_, prefs) = open_store()?;
    let show = |label: &str, key: &str| -> anyhow::Result<()> {
        let value = prefs.get(key)?.unwrap_or_else(|| "(not set)".to_string());
        println!("  {label}: {value}");
        Ok(())
    };

    println!("Device");
    show("Name", keys::DEVICE_NAME)?;
    show("ID", keys::DEVICE_ID)?;
    show("Registered with version", keys::VERSION)?;
    Ok(())
}

fn cmd_config() -> anyhow::Result<()> {
    let config = Config::load()?;

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}
