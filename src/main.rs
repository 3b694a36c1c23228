use anyhow::{Context, Result};
use clap::Parser;
use cryptoinfo::coordinator::{Coordinator, RefreshOutcome};
use cryptoinfo::sensor::{self, CryptoSensor};
use cryptoinfo::sources::{self, MarketQuery, PriceSource};
use cryptoinfo::{config, defaults, flow, output};
use std::path::PathBuf;
use std::sync::{Arc, Weak};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(
    name = "cryptoinfo",
    about = "Poll CoinGecko market prices and publish them as per-coin sensors"
)]
struct Args {
    /// Path to config YAML file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Output format for --once: "table" (default) or "json"
    #[arg(short, long, default_value = "table")]
    output: String,

    /// Run the first refresh of every entry, print the sensors and exit
    #[arg(long)]
    once: bool,

    /// CoinGecko API base URL
    #[arg(long, env = "COINGECKO_BASE_URL", default_value = sources::coingecko::DEFAULT_BASE_URL)]
    base_url: String,

    /// Optional CoinGecko demo API key
    #[arg(long, env = "COINGECKO_API_KEY", hide_env_values = true)]
    api_key: Option<String>,
}

/// A running configuration entry: its coordinator and the sensors reading
/// from it.
struct Entry {
    id: String,
    coordinator: Arc<Coordinator>,
    sensors: Arc<Vec<CryptoSensor>>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let cfg = config::Config::load(&args.config)
        .with_context(|| format!("loading config from {}", args.config.display()))?;

    let mut flow = flow::ConfigFlow::new(defaults::DefaultsStore::new());
    for input in cfg.entries {
        flow.create_entry(input).context("creating config entry")?;
    }
    info!(
        "Loaded {} entr{} from config; shared min time between requests {} min (not enforced)",
        flow.entries().len(),
        if flow.entries().len() == 1 { "y" } else { "ies" },
        flow.defaults().min_time_between_requests()
    );

    let client = reqwest::Client::builder()
        .user_agent("cryptoinfo/0.1")
        .build()
        .context("building HTTP client")?;
    if args.api_key.is_none() {
        info!("COINGECKO_API_KEY not set; using the public CoinGecko API");
    }
    let source: Arc<dyn PriceSource> = Arc::new(sources::coingecko::CoinGecko::new(
        client,
        args.base_url.clone(),
        args.api_key.clone(),
    ));

    let mut entries: Vec<Entry> = Vec::new();
    for entry in flow.entries() {
        let query = MarketQuery::new(&entry.cryptocurrency_names, &entry.currency_name)
            .with_context(|| format!("building query for '{}'", entry.id))?;
        let interval = entry.update_interval()?;
        let coordinator = Arc::new(
            Coordinator::new(entry.title(), source.clone(), query, interval)
                .with_context(|| format!("creating coordinator for '{}'", entry.id))?,
        );

        if let Err(e) = coordinator.first_refresh().await {
            warn!("{:#}; sensors start as unknown", e);
        }

        let sensors = Arc::new(sensor::sensors_for_entry(entry, coordinator.clone()));
        info!(
            "[{}] registered {} sensor(s)",
            coordinator.name(),
            sensors.len()
        );
        entries.push(Entry {
            id: entry.id.clone(),
            coordinator,
            sensors,
        });
    }

    if args.once {
        let states: Vec<_> = entries
            .iter()
            .flat_map(|e| e.sensors.iter().map(CryptoSensor::snapshot_state))
            .collect();
        match args.output.as_str() {
            "json" => output::print_json(&states)?,
            _ => output::print_table(&states),
        }
        return Ok(());
    }

    let mut handles = Vec::new();
    for entry in &entries {
        let sensors = Arc::downgrade(&entry.sensors);
        entry
            .coordinator
            .subscribe(move |outcome| publish(&sensors, outcome));
        handles.push(entry.coordinator.clone().spawn());
    }

    tokio::signal::ctrl_c()
        .await
        .context("waiting for Ctrl-C")?;
    info!("Shutting down {} coordinator(s)", handles.len());
    for handle in handles {
        handle.shutdown();
    }
    for entry in entries {
        flow.remove_entry(&entry.id);
    }
    Ok(())
}

fn publish(sensors: &Weak<Vec<CryptoSensor>>, outcome: &RefreshOutcome) {
    let Some(sensors) = sensors.upgrade() else {
        return;
    };
    if let RefreshOutcome::Failed(_) = outcome {
        info!("{} sensor(s) keep their previous values", sensors.len());
        return;
    }
    for sensor in sensors.iter() {
        let state = sensor.snapshot_state();
        match state.state {
            Some(value) => info!(
                "{} = {:.2} {} (24h {})",
                state.entity_id,
                value,
                state.unit_of_measurement,
                state
                    .attributes
                    .change_24h
                    .map(|c| format!("{:+.2}%", c))
                    .unwrap_or_else(|| "unknown".to_string())
            ),
            None => info!("{} = unknown", state.entity_id),
        }
    }
}
