//! Market id → outcome token cache

use super::types::{RawMarket, TokenMapping};
use parking_lot::Mutex;
use std::collections::HashMap;

/// Maps market ids to their YES/NO token ids
///
/// Written by the universe refresh, read from anywhere.
pub struct TokenMapper {
    cache: Mutex<HashMap<String, TokenMapping>>,
}

impl TokenMapper {
    pub fn new() -> Self {
        Self {
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Cache the tokens carried by a raw record
    ///
    /// Returns false when the record has no id or fewer than two token ids.
    /// Tokens are taken by position: first is YES, second is NO.
    pub fn update(&self, raw: &RawMarket) -> bool {
        let Some(market_id) = raw.market_id() else {
            tracing::warn!("Market missing 'id' field, skipping token mapping");
            return false;
        };

        let [yes, no, ..] = raw.clob_token_ids.as_slice() else {
            tracing::warn!(
                market_id,
                token_count = raw.clob_token_ids.len(),
                "Market missing or invalid clobTokenIds"
            );
            return false;
        };

        let mapping = TokenMapping {
            yes_token_id: yes.clone(),
            no_token_id: no.clone(),
            condition_id: raw.condition_id.clone().unwrap_or_default(),
        };

        tracing::debug!(market_id, yes = %yes, no = %no, "Cached token mapping");
        self.cache.lock().insert(market_id.to_string(), mapping);
        true
    }

    /// Tokens for a market, if cached
    pub fn lookup(&self, market_id: &str) -> Option<TokenMapping> {
        self.cache.lock().get(market_id).cloned()
    }

    /// Forget one market's tokens; returns whether a mapping existed
    pub fn remove(&self, market_id: &str) -> bool {
        self.cache.lock().remove(market_id).is_some()
    }

    pub fn contains(&self, market_id: &str) -> bool {
        self.cache.lock().contains_key(market_id)
    }

    pub fn len(&self) -> usize {
        self.cache.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.lock().is_empty()
    }

    /// Drop every cached mapping
    pub fn clear(&self) {
        self.cache.lock().clear();
    }
}

impl Default for TokenMapper {
    fn default() -> Self {
        Self::new()
    }
}
