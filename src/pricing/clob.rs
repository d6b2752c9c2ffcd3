//! CLOB REST client for outcome token prices

use super::{PriceSource, YesNoPrices};
use crate::retry::{check_response, RetryPolicy};
use anyhow::Context;
use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;
use std::str::FromStr;
use std::time::Duration;

/// Polymarket CLOB REST URL
pub const CLOB_API_URL: &str = "https://clob.polymarket.com";

/// Configuration for the CLOB client
#[derive(Debug, Clone)]
pub struct ClobConfig {
    pub base_url: String,
    /// Per-request timeout
    pub timeout: Duration,
}

impl Default for ClobConfig {
    fn default() -> Self {
        Self {
            base_url: CLOB_API_URL.to_string(),
            timeout: Duration::from_secs(5),
        }
    }
}

/// Price client for the CLOB `/price` endpoint
pub struct ClobClient {
    config: ClobConfig,
    retry: RetryPolicy,
    client: Client,
    stale: Mutex<HashSet<String>>,
}

#[derive(Deserialize)]
struct PriceResponse {
    #[serde(default)]
    price: Option<Value>,
}

impl ClobClient {
    pub fn new(config: ClobConfig, retry: RetryPolicy) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .context("building CLOB HTTP client")?;

        Ok(Self {
            config,
            retry,
            client,
            stale: Mutex::new(HashSet::new()),
        })
    }

    fn price_url(&self) -> String {
        format!("{}/price", self.config.base_url.trim_end_matches('/'))
    }

    /// Best buy-side price for a token, `None` when the book has none
    pub async fn get_price(&self, token_id: &str) -> anyhow::Result<Option<Decimal>> {
        self.retry
            .run("clob.get_price", || self.fetch_price(token_id))
            .await
            .with_context(|| format!("CLOB price for token {}", token_id))
    }

    async fn fetch_price(&self, token_id: &str) -> anyhow::Result<Option<Decimal>> {
        let response = self
            .client
            .get(self.price_url())
            .query(&[("token_id", token_id), ("side", "BUY")])
            .send()
            .await?;

        let body = check_response(response).await?.text().await?;
        decode_price(&body)
    }
}

fn decode_price(body: &str) -> anyhow::Result<Option<Decimal>> {
    let response: PriceResponse =
        serde_json::from_str(body).context("decoding CLOB price response")?;

    let price = match response.price {
        Some(Value::String(s)) if s.trim().is_empty() => None,
        Some(Value::String(s)) => Some(
            Decimal::from_str(s.trim()).with_context(|| format!("invalid price {:?}", s))?,
        ),
        Some(Value::Number(n)) => Some(
            Decimal::from_str(&n.to_string()).with_context(|| format!("invalid price {}", n))?,
        ),
        _ => None,
    };
    Ok(price)
}

#[async_trait]
impl PriceSource for ClobClient {
    async fn get_yes_no_prices(
        &self,
        yes_token_id: &str,
        no_token_id: &str,
    ) -> anyhow::Result<Option<YesNoPrices>> {
        let Some(yes_price) = self.get_price(yes_token_id).await? else {
            return Ok(None);
        };
        let Some(no_price) = self.get_price(no_token_id).await? else {
            return Ok(None);
        };
        Ok(Some(YesNoPrices {
            yes_price,
            no_price,
        }))
    }

    fn is_stale(&self, market_id: &str) -> bool {
        self.stale.lock().contains(market_id)
    }

    fn mark_stale(&self, market_id: &str) {
        if self.stale.lock().insert(market_id.to_string()) {
            tracing::info!(market_id, "Market marked stale");
        }
    }

    fn clear_stale(&self, market_id: &str) {
        if self.stale.lock().remove(market_id) {
            tracing::info!(market_id, "Stale marker cleared");
        }
    }

    fn stale_count(&self) -> usize {
        self.stale.lock().len()
    }
}
