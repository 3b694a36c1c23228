//! Read-only per-coin views over a coordinator's snapshot.

use crate::config::EntryConfig;
use crate::coordinator::Coordinator;
use crate::types::Snapshot;
use chrono::{DateTime, Local};
use serde::Serialize;
use std::sync::Arc;

const SENSOR_PREFIX: &str = "Cryptoinfo ";
const ICON: &str = "mdi:bitcoin";
const DEVICE_CLASS: &str = "monetary";
const STATE_CLASS: &str = "measurement";
const LAST_UPDATE_FORMAT: &str = "%d-%m-%Y %H:%M";

/// Attribute set published with every sensor state. `None` renders as
/// `null`, i.e. unknown.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorAttributes {
    pub last_update: String,
    pub base_price: Option<f64>,
    #[serde(rename = "24h_volume")]
    pub volume_24h: Option<f64>,
    #[serde(rename = "1h_change")]
    pub change_1h: Option<f64>,
    #[serde(rename = "24h_change")]
    pub change_24h: Option<f64>,
    #[serde(rename = "7d_change")]
    pub change_7d: Option<f64>,
    #[serde(rename = "30d_change")]
    pub change_30d: Option<f64>,
    pub market_cap: Option<f64>,
    pub circulating_supply: Option<f64>,
    pub total_supply: Option<f64>,
}

/// `price * multiplier` for `coin`, or `None` when the coin (or its price)
/// is missing from the snapshot.
pub fn project_value(snapshot: Option<&Snapshot>, coin: &str, multiplier: u32) -> Option<f64> {
    snapshot
        .and_then(|s| s.get(coin))
        .and_then(|record| record.current_price)
        .map(|price| price * f64::from(multiplier))
}

/// `last_update` is the time of evaluation, not of the fetch.
pub fn project_attributes(
    snapshot: Option<&Snapshot>,
    coin: &str,
    now: DateTime<Local>,
) -> SensorAttributes {
    let last_update = now.format(LAST_UPDATE_FORMAT).to_string();
    match snapshot.and_then(|s| s.get(coin)) {
        Some(record) => SensorAttributes {
            last_update,
            base_price: record.current_price,
            volume_24h: record.total_volume,
            change_1h: record.price_change_percentage_1h_in_currency,
            change_24h: record.price_change_percentage_24h_in_currency,
            change_7d: record.price_change_percentage_7d_in_currency,
            change_30d: record.price_change_percentage_30d_in_currency,
            market_cap: record.market_cap,
            circulating_supply: record.circulating_supply,
            total_supply: record.total_supply,
        },
        None => SensorAttributes {
            last_update,
            base_price: None,
            volume_24h: None,
            change_1h: None,
            change_24h: None,
            change_7d: None,
            change_30d: None,
            market_cap: None,
            circulating_supply: None,
            total_supply: None,
        },
    }
}

/// Everything the host needs to render one sensor.
#[derive(Debug, Clone, Serialize)]
pub struct SensorState {
    pub entity_id: String,
    pub unique_id: String,
    pub state: Option<f64>,
    pub unit_of_measurement: String,
    pub icon: &'static str,
    pub device_class: &'static str,
    pub state_class: &'static str,
    pub attributes: SensorAttributes,
}

pub struct CryptoSensor {
    coordinator: Arc<Coordinator>,
    coin: String,
    currency: String,
    unit_of_measurement: String,
    multiplier: u32,
    display_id: String,
}

impl CryptoSensor {
    pub fn new(
        coordinator: Arc<Coordinator>,
        coin: String,
        currency: String,
        unit_of_measurement: String,
        multiplier: u32,
        display_id: String,
    ) -> Self {
        Self {
            coordinator,
            coin,
            currency,
            unit_of_measurement,
            multiplier,
            display_id,
        }
    }

    pub fn coin(&self) -> &str {
        &self.coin
    }

    fn prefixed_id(&self) -> String {
        if self.display_id.is_empty() {
            SENSOR_PREFIX.to_string()
        } else {
            format!("{}{} ", SENSOR_PREFIX, self.display_id)
        }
    }

    pub fn unique_id(&self) -> String {
        format!(
            "{}{}{}{}",
            self.prefixed_id(),
            self.coin,
            self.currency,
            self.multiplier
        )
    }

    pub fn entity_id(&self) -> String {
        format!(
            "sensor.{}{}_{}_{}",
            self.prefixed_id().to_lowercase().replace(' ', "_"),
            self.coin,
            self.currency,
            self.multiplier
        )
    }

    pub fn state(&self) -> Option<f64> {
        let snapshot = self.coordinator.current_snapshot();
        project_value(snapshot.as_deref(), &self.coin, self.multiplier)
    }

    pub fn attributes(&self) -> SensorAttributes {
        let snapshot = self.coordinator.current_snapshot();
        project_attributes(snapshot.as_deref(), &self.coin, Local::now())
    }

    /// Value and attributes read from one snapshot.
    pub fn snapshot_state(&self) -> SensorState {
        let snapshot = self.coordinator.current_snapshot();
        SensorState {
            entity_id: self.entity_id(),
            unique_id: self.unique_id(),
            state: project_value(snapshot.as_deref(), &self.coin, self.multiplier),
            unit_of_measurement: self.unit_of_measurement.clone(),
            icon: ICON,
            device_class: DEVICE_CLASS,
            state_class: STATE_CLASS,
            attributes: project_attributes(snapshot.as_deref(), &self.coin, Local::now()),
        }
    }
}

/// One sensor per configured coin, all sharing `coordinator`.
pub fn sensors_for_entry(entry: &EntryConfig, coordinator: Arc<Coordinator>) -> Vec<CryptoSensor> {
    let currency = coordinator.query().vs_currency().to_string();
    coordinator
        .query()
        .ids()
        .iter()
        .map(|coin| {
            CryptoSensor::new(
                coordinator.clone(),
                coin.clone(),
                currency.clone(),
                entry.unit_of_measurement.clone(),
                entry.multiplier,
                entry.id.clone(),
            )
        })
        .collect()
}
