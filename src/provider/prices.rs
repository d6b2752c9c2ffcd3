//! Fast tick: price refresh for one batch

use super::{ProviderState, Subscriber};
use crate::market::LiveMarket;
use crate::telemetry::{self, GaugeMetric, LatencyMetric};
use chrono::Utc;
use std::panic::{self, AssertUnwindSafe};
use tokio::time::Instant;

impl ProviderState {
    /// Quote every live, non-stale market in `batch`
    ///
    /// A failed or empty quote marks the market stale. Returns the number of
    /// markets updated.
    pub(super) async fn refresh_prices(&self, batch: &[String]) -> usize {
        let started = Instant::now();
        let mut updated = 0;

        for market_id in batch {
            if self.prices.is_stale(market_id) {
                continue;
            }

            let tokens = self
                .markets
                .read()
                .get(market_id)
                .map(|market| market.tokens.clone());
            let Some(tokens) = tokens else {
                continue;
            };

            let quote = match self
                .prices
                .get_yes_no_prices(&tokens.yes_token_id, &tokens.no_token_id)
                .await
            {
                Ok(Some(quote)) => quote,
                Ok(None) => {
                    tracing::warn!(market_id = %market_id, "No quote for market, marking stale");
                    telemetry::record_price_fetch_failure();
                    self.prices.mark_stale(market_id);
                    continue;
                }
                Err(err) => {
                    tracing::warn!(
                        market_id = %market_id,
                        error = %format!("{:#}", err),
                        "Price fetch failed, marking stale"
                    );
                    telemetry::record_price_fetch_failure();
                    self.prices.mark_stale(market_id);
                    continue;
                }
            };

            let now = Utc::now();
            let snapshot = {
                let mut markets = self.markets.write();
                let Some(market) = markets.get_mut(market_id) else {
                    // evicted while the quote was in flight
                    continue;
                };
                market.update_prices(quote.yes_price, quote.no_price, now);
                // held under the markets lock: series exist only for live markets
                self.candles.add_tick(market_id, now, quote.yes_price);
                market.clone()
            };

            self.notify(&snapshot);
            updated += 1;
        }

        tracing::debug!(batch = batch.len(), updated, "Fast tick complete");
        telemetry::set_gauge(GaugeMetric::StaleMarkets, self.prices.stale_count() as f64);
        telemetry::record_latency(LatencyMetric::PriceRefresh, started.elapsed());
        updated
    }

    /// Invoke subscribers in registration order, isolating their failures
    fn notify(&self, market: &LiveMarket) {
        let subscribers: Vec<Subscriber> = self.subscribers.read().clone();

        for (index, subscriber) in subscribers.iter().enumerate() {
            match panic::catch_unwind(AssertUnwindSafe(|| subscriber(market))) {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    telemetry::record_subscriber_error();
                    tracing::error!(
                        subscriber = index,
                        market_id = market.market_id(),
                        error = %format!("{:#}", err),
                        "Subscriber failed"
                    );
                }
                Err(_) => {
                    telemetry::record_subscriber_error();
                    tracing::error!(
                        subscriber = index,
                        market_id = market.market_id(),
                        "Subscriber panicked"
                    );
                }
            }
        }
    }
}
