//! Periodic CoinGecko price polling shared across per-coin sensors.
//!
//! One [`coordinator::Coordinator`] per configuration entry fetches a batch
//! snapshot on a fixed interval; [`sensor::CryptoSensor`]s project a single
//! coin out of whatever snapshot completed last.

pub mod config;
pub mod coordinator;
pub mod defaults;
pub mod flow;
pub mod output;
pub mod sensor;
pub mod sources;
pub mod types;
