//! Live outcome prices
//!
//! A [`PriceSource`] quotes the YES/NO pair for a market and keeps a stale
//! set: markets whose last fetch failed are skipped until cleared.

mod clob;

pub use clob::{ClobClient, ClobConfig, CLOB_API_URL};

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Buy-side quotes for both outcomes of a market
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct YesNoPrices {
    pub yes_price: Decimal,
    pub no_price: Decimal,
}

/// Quote provider with a per-market stale marker
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Quote both tokens; `Ok(None)` when either side has no price
    async fn get_yes_no_prices(
        &self,
        yes_token_id: &str,
        no_token_id: &str,
    ) -> anyhow::Result<Option<YesNoPrices>>;

    fn is_stale(&self, market_id: &str) -> bool;

    fn mark_stale(&self, market_id: &str);

    /// Make a stale market eligible for refresh again
    fn clear_stale(&self, market_id: &str);

    fn stale_count(&self) -> usize;
}
