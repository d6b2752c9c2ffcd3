//! Market discovery module
//!
//! Pulls the active market list from a [`MarketSource`], validates records,
//! caches outcome tokens and parses titles into typed descriptors.

mod gamma;
mod parser;
mod source;
mod tokens;
mod types;

pub use gamma::{GammaClient, GammaConfig, GAMMA_API_URL};
pub use parser::{
    extract_asset, extract_reference_price, is_up_or_down, normalize_timeframe_minutes,
    normalize_title, parse_market, parse_timeframe, parse_timestamp, time_window_minutes,
    DiscardStats, MarketParser, MAX_DISCARD_LOGS,
};
pub use source::MergedSource;
pub use tokens::TokenMapper;
pub use types::{
    Asset, DiscardReason, LiveMarket, MarketDescriptor, RawMarket, Timeframe, TokenMapping,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Page request against a market listing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarketQuery {
    pub active: bool,
    pub closed: bool,
    pub limit: usize,
    pub offset: usize,
}

impl MarketQuery {
    /// Page of open markets
    pub fn active_page(limit: usize, offset: usize) -> Self {
        Self {
            active: true,
            closed: false,
            limit,
            offset,
        }
    }
}

/// Result of a full listing walk
#[derive(Debug, Clone, Default)]
pub struct Universe {
    pub markets: Vec<RawMarket>,
    /// False when a page after the first failed; the list may be partial
    pub complete: bool,
}

/// Structural liveness check applied before parsing
///
/// Rejects records without an id, not flagged active, whose end time (when
/// parseable) is not in the future, or carrying fewer than two token ids.
pub fn validate_liveness(raw: &RawMarket, now: DateTime<Utc>) -> Result<(), DiscardReason> {
    if raw.market_id().is_none() {
        return Err(DiscardReason::MissingId);
    }
    if !raw.is_active() {
        return Err(DiscardReason::StatusNotActive);
    }
    if let Some(end) = raw.end_date.as_deref().and_then(parse_timestamp) {
        if end <= now {
            return Err(DiscardReason::EndTimePassed);
        }
    }
    if raw.clob_token_ids.len() < 2 {
        return Err(DiscardReason::NoClobTokenIds);
    }
    Ok(())
}

/// Source of raw market records
#[async_trait]
pub trait MarketSource: Send + Sync {
    /// Fetch one page of markets
    async fn fetch_markets(&self, query: MarketQuery) -> anyhow::Result<Vec<RawMarket>>;

    /// Whether a record is live enough to consider
    fn validate(&self, raw: &RawMarket) -> Result<(), DiscardReason> {
        validate_liveness(raw, Utc::now())
    }

    /// Walk pages of active markets until a short page or `max_markets`
    ///
    /// A failure on the first page is returned as an error. A failure on a
    /// later page ends the walk and marks the universe incomplete.
    async fn fetch_all_active(
        &self,
        max_markets: usize,
        page_size: usize,
    ) -> anyhow::Result<Universe> {
        let page_size = page_size.max(1);
        let mut markets = Vec::new();
        let mut offset = 0;

        while markets.len() < max_markets {
            let limit = page_size.min(max_markets - markets.len());
            let page = match self.fetch_markets(MarketQuery::active_page(limit, offset)).await {
                Ok(page) => page,
                Err(err) if offset == 0 => return Err(err),
                Err(err) => {
                    tracing::warn!(
                        offset,
                        fetched = markets.len(),
                        error = %err,
                        "Market page failed, universe is partial"
                    );
                    return Ok(Universe {
                        markets,
                        complete: false,
                    });
                }
            };

            let received = page.len();
            markets.extend(page);
            tracing::debug!(offset, received, total = markets.len(), "Fetched market page");

            if received < limit {
                break;
            }
            offset += received;
        }

        Ok(Universe {
            markets,
            complete: true,
        })
    }
}
