//! Gamma API client for market discovery
//!
//! Lists markets page by page from Polymarket's Gamma API. Each page request
//! runs under the configured [`RetryPolicy`].

use super::types::RawMarket;
use super::{MarketQuery, MarketSource};
use crate::retry::{check_response, RetryPolicy};
use crate::telemetry;
use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

/// Gamma API base URL
pub const GAMMA_API_URL: &str = "https://gamma-api.polymarket.com";

/// Configuration for the Gamma client
#[derive(Debug, Clone)]
pub struct GammaConfig {
    /// Base URL for the Gamma API
    pub base_url: String,
    /// Request timeout
    pub timeout: Duration,
    /// Markets requested per page
    pub page_size: usize,
    /// Upper bound on markets per universe refresh
    pub max_markets: usize,
}

impl Default for GammaConfig {
    fn default() -> Self {
        Self {
            base_url: GAMMA_API_URL.to_string(),
            timeout: Duration::from_secs(10),
            page_size: 100,
            max_markets: 1000,
        }
    }
}

/// Client for Polymarket's Gamma API
pub struct GammaClient {
    config: GammaConfig,
    retry: RetryPolicy,
    client: Client,
}

impl GammaClient {
    /// Create a new client
    pub fn new(config: GammaConfig, retry: RetryPolicy) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .context("building Gamma HTTP client")?;

        Ok(Self {
            config,
            retry,
            client,
        })
    }

    pub fn config(&self) -> &GammaConfig {
        &self.config
    }

    fn markets_url(&self) -> String {
        format!("{}/markets", self.config.base_url.trim_end_matches('/'))
    }

    async fn fetch_page(&self, query: MarketQuery) -> anyhow::Result<Vec<RawMarket>> {
        let url = self.markets_url();
        tracing::debug!(url = %url, offset = query.offset, limit = query.limit, "Fetching markets page");

        let response = self
            .client
            .get(&url)
            .query(&[
                ("active", query.active.to_string()),
                ("closed", query.closed.to_string()),
                ("limit", query.limit.to_string()),
                ("offset", query.offset.to_string()),
            ])
            .send()
            .await?;

        let body = check_response(response).await?.text().await?;
        decode_markets(&body)
    }
}

#[async_trait]
impl MarketSource for GammaClient {
    async fn fetch_markets(&self, query: MarketQuery) -> anyhow::Result<Vec<RawMarket>> {
        self.retry
            .run("gamma.fetch_markets", || self.fetch_page(query))
            .await
            .with_context(|| format!("Gamma markets page at offset {}", query.offset))
    }
}

/// Listing body: a bare array, or an object wrapping it under `data`
#[derive(Deserialize)]
#[serde(untagged)]
enum MarketsBody {
    List(Vec<Value>),
    Wrapped { data: Vec<Value> },
}

/// Decode a listing page record by record
///
/// A record that does not fit [`RawMarket`] is logged and dropped; the rest
/// of the page is kept.
fn decode_markets(body: &str) -> anyhow::Result<Vec<RawMarket>> {
    let decoded: MarketsBody =
        serde_json::from_str(body).context("decoding Gamma markets response")?;
    let records = match decoded {
        MarketsBody::List(records) => records,
        MarketsBody::Wrapped { data } => data,
    };

    Ok(records
        .into_iter()
        .enumerate()
        .filter_map(|(index, record)| {
            let id = record.get("id").map(Value::to_string);
            match serde_json::from_value::<RawMarket>(record) {
                Ok(market) => Some(market),
                Err(err) => {
                    tracing::warn!(
                        index,
                        market_id = id.as_deref().unwrap_or("unknown"),
                        error = %err,
                        "Dropping malformed market record"
                    );
                    telemetry::record_discard("malformed");
                    None
                }
            }
        })
        .collect())
}
