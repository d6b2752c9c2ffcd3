//! Slow tick: market universe refresh

use super::ProviderState;
use crate::market::{DiscardReason, LiveMarket};
use crate::telemetry::{self, GaugeMetric, LatencyMetric};
use anyhow::Context;
use std::collections::HashSet;
use tokio::time::Instant;

/// Outcome of one universe refresh
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UniverseReport {
    /// Records returned by the source
    pub fetched: usize,
    /// Markets added to the live set
    pub admitted: usize,
    /// Markets removed from the live set
    pub evicted: usize,
    /// Live markets after the refresh
    pub live: usize,
    /// Whether the fetch covered the whole listing
    pub complete: bool,
}

impl ProviderState {
    /// Diff the active listing against the previous cycle
    ///
    /// Only ids not seen last cycle are validated and parsed. Evicted and
    /// rejected markets leave no token mapping or candles behind. Eviction is
    /// skipped when the listing is partial. A failed fetch leaves all state
    /// untouched.
    pub(super) async fn refresh_universe(&self) -> anyhow::Result<UniverseReport> {
        let started = Instant::now();
        self.parser.reset_stats();

        let universe = self
            .source
            .fetch_all_active(self.max_markets, self.page_size)
            .await
            .context("universe refresh aborted")?;

        let previous: HashSet<String> = self.known_ids.lock().clone();
        let mut current: HashSet<String> = HashSet::with_capacity(universe.markets.len());
        let mut admitted = Vec::new();

        for raw in &universe.markets {
            let Some(market_id) = raw.market_id() else {
                self.parser.record_discard(raw, DiscardReason::MissingId);
                continue;
            };
            if !current.insert(market_id.to_string()) || previous.contains(market_id) {
                continue;
            }

            if let Err(reason) = self.source.validate(raw) {
                self.parser.record_discard(raw, reason);
                continue;
            }
            if !self.tokens.update(raw) {
                self.parser.record_discard(raw, DiscardReason::NoClobTokenIds);
                continue;
            }
            let Ok(descriptor) = self.parser.parse(raw) else {
                self.tokens.remove(market_id);
                continue;
            };
            let Some(tokens) = self.tokens.lookup(market_id) else {
                continue;
            };
            admitted.push(LiveMarket::new(descriptor, tokens));
        }

        let admitted_count = admitted.len();
        let (evicted, live_ids) = {
            let mut markets = self.markets.write();
            for market in admitted {
                tracing::debug!(
                    market_id = market.market_id(),
                    asset = %market.descriptor.asset,
                    timeframe = %market.descriptor.timeframe,
                    "Market admitted"
                );
                markets.insert(market.market_id().to_string(), market);
            }

            let mut evicted = Vec::new();
            if universe.complete {
                for market_id in previous.difference(&current) {
                    if markets.remove(market_id).is_some() {
                        evicted.push(market_id.clone());
                    }
                }
            }

            let mut live_ids: Vec<String> = markets.keys().cloned().collect();
            live_ids.sort();
            (evicted, live_ids)
        };

        for market_id in &evicted {
            self.tokens.remove(market_id);
            self.candles.remove_market(market_id);
            tracing::info!(market_id = %market_id, "Removed closed market");
        }

        let live = live_ids.len();
        self.batcher.set_market_ids(live_ids);

        {
            let mut known = self.known_ids.lock();
            if universe.complete {
                *known = current;
            } else {
                known.extend(current);
            }
        }

        if !universe.complete {
            tracing::warn!("Market listing incomplete, eviction skipped this cycle");
        }

        let report = UniverseReport {
            fetched: universe.markets.len(),
            admitted: admitted_count,
            evicted: evicted.len(),
            live,
            complete: universe.complete,
        };

        let stats = self.parser.stats();
        tracing::info!(
            fetched = report.fetched,
            new = report.admitted,
            closed = report.evicted,
            total = report.live,
            discarded = stats.total(),
            "Market universe updated"
        );

        telemetry::set_gauge(GaugeMetric::LiveMarkets, live as f64);
        telemetry::record_latency(LatencyMetric::UniverseRefresh, started.elapsed());

        Ok(report)
    }
}
