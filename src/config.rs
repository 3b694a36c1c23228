use crate::sources::{normalize_currency, normalize_ids};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_ID: &str = "Main btc stash";
pub const DEFAULT_CRYPTOCURRENCY: &str = "bitcoin";
pub const DEFAULT_CURRENCY: &str = "usd";
pub const DEFAULT_UNIT: &str = "$";
pub const DEFAULT_MULTIPLIER: u32 = 1;
pub const DEFAULT_UPDATE_FREQUENCY: f64 = 60.0;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub entries: Vec<EntryInput>,
}

/// User input for one entry, as typed into the form or the YAML file.
/// Missing fields take the form defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EntryInput {
    pub id: Option<String>,
    pub cryptocurrency_names: Option<String>,
    pub currency_name: Option<String>,
    pub unit_of_measurement: Option<String>,
    pub multiplier: Option<u32>,
    /// Minutes.
    pub update_frequency: Option<f64>,
    /// Minutes. Shared across entries; informational only.
    pub min_time_between_requests: Option<f64>,
}

/// A validated configuration record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntryConfig {
    pub id: String,
    pub cryptocurrency_names: String,
    pub currency_name: String,
    pub unit_of_measurement: String,
    pub multiplier: u32,
    pub update_frequency: f64,
    pub min_time_between_requests: f64,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let contents =
            std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let config: Config =
            serde_yaml::from_str(&contents).with_context(|| format!("parsing {}", path.display()))?;
        if config.entries.is_empty() {
            anyhow::bail!("{} has no entries", path.display());
        }
        Ok(config)
    }
}

impl EntryInput {
    /// Fills defaults, normalises and validates. `default_min_time` comes
    /// from the shared defaults store.
    pub fn resolve(self, default_min_time: f64) -> Result<EntryConfig> {
        let id = self
            .id
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|| DEFAULT_ID.to_string());

        let ids = normalize_ids(
            self.cryptocurrency_names
                .as_deref()
                .unwrap_or(DEFAULT_CRYPTOCURRENCY),
        );
        if ids.is_empty() {
            anyhow::bail!("entry '{}' lists no cryptocurrency ids", id);
        }

        let currency_name =
            normalize_currency(self.currency_name.as_deref().unwrap_or(DEFAULT_CURRENCY));
        if currency_name.is_empty() {
            anyhow::bail!("entry '{}' has an empty currency name", id);
        }

        let unit_of_measurement = self
            .unit_of_measurement
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|| DEFAULT_UNIT.to_string());

        let multiplier = self.multiplier.unwrap_or(DEFAULT_MULTIPLIER);
        if multiplier == 0 {
            anyhow::bail!("entry '{}' multiplier must be a positive integer", id);
        }

        let update_frequency = self.update_frequency.unwrap_or(DEFAULT_UPDATE_FREQUENCY);
        ensure_positive(&id, "update_frequency", update_frequency)?;
        interval_from_minutes(&id, update_frequency)?;

        let min_time_between_requests = self.min_time_between_requests.unwrap_or(default_min_time);
        ensure_positive(&id, "min_time_between_requests", min_time_between_requests)?;

        Ok(EntryConfig {
            id,
            cryptocurrency_names: ids.join(","),
            currency_name,
            unit_of_measurement,
            multiplier,
            update_frequency,
            min_time_between_requests,
        })
    }
}

impl EntryConfig {
    pub fn update_interval(&self) -> Result<Duration> {
        interval_from_minutes(&self.id, self.update_frequency)
    }

    pub fn title(&self) -> String {
        format!("Cryptoinfo for {}", self.id)
    }
}

fn interval_from_minutes(id: &str, minutes: f64) -> Result<Duration> {
    match Duration::try_from_secs_f64(minutes * 60.0) {
        Ok(interval) => Ok(interval),
        Err(_) => anyhow::bail!(
            "entry '{}' update_frequency {} is out of range for a timer interval",
            id,
            minutes
        ),
    }
}

fn ensure_positive(id: &str, field: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value <= 0.0 {
        anyhow::bail!("entry '{}' {} must be a positive number, got {}", id, field, value);
    }
    Ok(())
}
