//! Primary source with an optional fallback

use super::types::RawMarket;
use super::{MarketQuery, MarketSource, Universe};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;

/// Merges a primary market listing with an optional fallback listing
///
/// Records are deduplicated by id with the primary winning. The fallback is
/// best-effort: its failures are logged and never fail the merge.
pub struct MergedSource {
    primary: Arc<dyn MarketSource>,
    fallback: Option<Arc<dyn MarketSource>>,
}

impl MergedSource {
    pub fn new(primary: Arc<dyn MarketSource>) -> Self {
        Self {
            primary,
            fallback: None,
        }
    }

    pub fn with_fallback(mut self, fallback: Arc<dyn MarketSource>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn has_fallback(&self) -> bool {
        self.fallback.is_some()
    }
}

/// Append `extra` records whose id is not already present
fn merge_into(markets: &mut Vec<RawMarket>, extra: Vec<RawMarket>) -> usize {
    let mut seen: HashSet<String> = markets
        .iter()
        .filter_map(|m| m.market_id().map(str::to_string))
        .collect();

    let before = markets.len();
    for raw in extra {
        match raw.market_id() {
            Some(id) if seen.insert(id.to_string()) => markets.push(raw),
            _ => {}
        }
    }
    markets.len() - before
}

#[async_trait]
impl MarketSource for MergedSource {
    async fn fetch_markets(&self, query: MarketQuery) -> anyhow::Result<Vec<RawMarket>> {
        let mut markets = self.primary.fetch_markets(query).await?;
        if let Some(fallback) = &self.fallback {
            match fallback.fetch_markets(query).await {
                Ok(extra) => {
                    merge_into(&mut markets, extra);
                }
                Err(err) => tracing::warn!(error = %err, "Fallback market source failed"),
            }
        }
        Ok(markets)
    }

    fn validate(&self, raw: &RawMarket) -> Result<(), super::DiscardReason> {
        self.primary.validate(raw)
    }

    async fn fetch_all_active(
        &self,
        max_markets: usize,
        page_size: usize,
    ) -> anyhow::Result<Universe> {
        let mut universe = self.primary.fetch_all_active(max_markets, page_size).await?;

        if let Some(fallback) = &self.fallback {
            match fallback.fetch_all_active(max_markets, page_size).await {
                Ok(extra) => {
                    let added = merge_into(&mut universe.markets, extra.markets);
                    tracing::debug!(added, "Merged fallback markets");
                }
                Err(err) => tracing::warn!(error = %err, "Fallback market source failed"),
            }
        }

        Ok(universe)
    }
}
