pub mod coingecko;

use crate::types::Snapshot;
use async_trait::async_trait;
use thiserror::Error;

/// A failed fetch. The coordinator treats every variant the same way and
/// keeps only the rendered message.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("upstream HTTP {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("parse error: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        FetchError::Transport(err.to_string())
    }
}

/// Normalised parameters for one batch request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketQuery {
    ids: Vec<String>,
    vs_currency: String,
}

impl MarketQuery {
    /// Trims and lower-cases the comma separated identifiers and the fiat
    /// currency. Blank identifiers are dropped.
    pub fn new(ids: &str, vs_currency: &str) -> anyhow::Result<Self> {
        let ids = normalize_ids(ids);
        if ids.is_empty() {
            anyhow::bail!("no cryptocurrency identifiers given");
        }
        let vs_currency = normalize_currency(vs_currency);
        if vs_currency.is_empty() {
            anyhow::bail!("no fiat currency given");
        }
        Ok(Self { ids, vs_currency })
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    /// Value of the `ids` query parameter.
    pub fn joined_ids(&self) -> String {
        self.ids.join(",")
    }

    pub fn vs_currency(&self) -> &str {
        &self.vs_currency
    }
}

/// Repeated identifiers collapse to their first occurrence.
pub fn normalize_ids(raw: &str) -> Vec<String> {
    let mut ids: Vec<String> = Vec::new();
    for id in raw.split(',').map(|id| id.trim().to_lowercase()) {
        if !id.is_empty() && !ids.contains(&id) {
            ids.push(id);
        }
    }
    ids
}

pub fn normalize_currency(raw: &str) -> String {
    raw.trim().to_lowercase()
}

#[async_trait]
pub trait PriceSource: Send + Sync {
    fn name(&self) -> &str;

    /// Issues exactly one request. No retries, no caching.
    async fn fetch_markets(&self, query: &MarketQuery) -> Result<Snapshot, FetchError>;
}
