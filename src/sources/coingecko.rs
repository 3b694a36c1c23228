use super::{FetchError, MarketQuery, PriceSource};
use crate::types::{CoinRecord, Snapshot};
use async_trait::async_trait;

pub const DEFAULT_BASE_URL: &str = "https://api.coingecko.com/api/v3";

const PRICE_CHANGE_WINDOWS: &str = "1h,24h,7d,30d";

pub struct CoinGecko {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl CoinGecko {
    pub fn new(client: reqwest::Client, base_url: String, api_key: Option<String>) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();
        Self {
            client,
            base_url,
            api_key,
        }
    }

    fn markets_url(&self) -> String {
        format!("{}/coins/markets", self.base_url)
    }
}

#[async_trait]
impl PriceSource for CoinGecko {
    fn name(&self) -> &str {
        "coingecko"
    }

    async fn fetch_markets(&self, query: &MarketQuery) -> Result<Snapshot, FetchError> {
        let ids = query.joined_ids();
        tracing::debug!(
            "GET {} ids={} vs_currency={}",
            self.markets_url(),
            ids,
            query.vs_currency()
        );

        let mut request = self
            .client
            .get(self.markets_url())
            .query(&[
                ("ids", ids.as_str()),
                ("vs_currency", query.vs_currency()),
                ("price_change_percentage", PRICE_CHANGE_WINDOWS),
            ])
            .header("Accept", "application/json");
        if let Some(key) = &self.api_key {
            request = request.header("x-cg-demo-api-key", key);
        }

        let resp = request.send().await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(FetchError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        let body = resp.text().await?;
        parse_markets(&body)
    }
}

/// Parses a `coins/markets` response body into a snapshot.
pub fn parse_markets(body: &str) -> Result<Snapshot, FetchError> {
    let records: Vec<CoinRecord> = serde_json::from_str(body)
        .map_err(|e| FetchError::Parse(format!("CoinGecko markets body: {}", e)))?;
    Ok(Snapshot::from_records(records))
}
