//! Provider tests against in-memory market and price sources

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use polybot::market::{DiscardReason, MarketQuery, MarketSource, RawMarket, Universe};
use polybot::pricing::{PriceSource, YesNoPrices};
use polybot::provider::{MarketDataProvider, ProviderConfig};
use polybot::scheduler::SchedulerConfig;
use polybot::strategy::{MomentumConfig, MomentumStrategy};
use polybot::execution::{ExecutionEngine, OrderSide, PaperEngine};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone, Copy, PartialEq)]
enum Listing {
    Ok,
    Fail,
    Partial,
}

/// Market source serving a mutable listing
struct FakeSource {
    markets: Mutex<Vec<RawMarket>>,
    mode: Mutex<Listing>,
    fetches: AtomicUsize,
}

impl FakeSource {
    fn new(markets: Vec<RawMarket>) -> Arc<Self> {
        Arc::new(Self {
            markets: Mutex::new(markets),
            mode: Mutex::new(Listing::Ok),
            fetches: AtomicUsize::new(0),
        })
    }

    fn set(&self, markets: Vec<RawMarket>) {
        *self.markets.lock() = markets;
    }

    fn set_mode(&self, mode: Listing) {
        *self.mode.lock() = mode;
    }
}

#[async_trait]
impl MarketSource for FakeSource {
    async fn fetch_markets(&self, query: MarketQuery) -> anyhow::Result<Vec<RawMarket>> {
        Ok(self
            .markets
            .lock()
            .iter()
            .skip(query.offset)
            .take(query.limit)
            .cloned()
            .collect())
    }

    async fn fetch_all_active(&self, _max: usize, _page: usize) -> anyhow::Result<Universe> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let mode = *self.mode.lock();
        match mode {
            Listing::Fail => anyhow::bail!("listing unavailable"),
            Listing::Ok | Listing::Partial => Ok(Universe {
                markets: self.markets.lock().clone(),
                complete: mode == Listing::Ok,
            }),
        }
    }
}

/// Price source quoting from a token → price table
#[derive(Default)]
struct FakePrices {
    quotes: Mutex<HashMap<String, Decimal>>,
    failing: Mutex<HashSet<String>>,
    stale: Mutex<HashSet<String>>,
    calls: AtomicUsize,
}

impl FakePrices {
    fn quote(&self, token: &str, price: Decimal) {
        self.quotes.lock().insert(token.to_string(), price);
    }

    fn fail(&self, token: &str) {
        self.failing.lock().insert(token.to_string());
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PriceSource for FakePrices {
    async fn get_yes_no_prices(
        &self,
        yes_token_id: &str,
        no_token_id: &str,
    ) -> anyhow::Result<Option<YesNoPrices>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.lock().contains(yes_token_id) {
            anyhow::bail!("HTTP 404: no orderbook");
        }
        let quotes = self.quotes.lock();
        Ok(match (quotes.get(yes_token_id), quotes.get(no_token_id)) {
            (Some(yes), Some(no)) => Some(YesNoPrices {
                yes_price: *yes,
                no_price: *no,
            }),
            _ => None,
        })
    }

    fn is_stale(&self, market_id: &str) -> bool {
        self.stale.lock().contains(market_id)
    }

    fn mark_stale(&self, market_id: &str) {
        self.stale.lock().insert(market_id.to_string());
    }

    fn clear_stale(&self, market_id: &str) {
        self.stale.lock().remove(market_id);
    }

    fn stale_count(&self) -> usize {
        self.stale.lock().len()
    }
}

fn up_down(id: &str, asset: &str) -> RawMarket {
    serde_json::from_value(json!({
        "id": id,
        "question": format!("{} Up or Down - 15 minutes", asset),
        "active": true,
        "endDate": (Utc::now() + ChronoDuration::hours(1)).to_rfc3339(),
        "clobTokenIds": format!("[\"{}-yes\", \"{}-no\"]", id, id),
        "duration_minutes": 15,
        "conditionId": format!("0x{}", id),
    }))
    .unwrap()
}

fn provider(source: Arc<FakeSource>, prices: Arc<FakePrices>) -> MarketDataProvider {
    let config = ProviderConfig {
        scheduler: SchedulerConfig {
            fast_tick_interval: Duration::from_secs(5),
            slow_tick_interval: Duration::from_secs(60),
            max_markets_per_tick: 2,
            max_runtime: None,
        },
        ..Default::default()
    };
    MarketDataProvider::new(source, prices, config)
}

fn ids(provider: &MarketDataProvider) -> Vec<String> {
    provider
        .markets()
        .iter()
        .map(|m| m.market_id().to_string())
        .collect()
}

#[tokio::test]
async fn test_admits_parseable_markets() {
    let mut not_crypto = up_down("m3", "BTC");
    not_crypto.question = Some("Will it rain in Paris tomorrow?".to_string());

    let source = FakeSource::new(vec![up_down("m1", "Bitcoin"), up_down("m2", "ETH"), not_crypto]);
    let provider = provider(source, Arc::new(FakePrices::default()));

    let report = provider.refresh_universe().await.unwrap();
    assert_eq!(report.fetched, 3);
    assert_eq!(report.admitted, 2);
    assert!(report.complete);
    assert_eq!(ids(&provider), vec!["m1", "m2"]);

    let m1 = provider.market("m1").unwrap();
    assert_eq!(m1.descriptor.asset.symbol(), "BTC");
    assert_eq!(m1.descriptor.timeframe.label(), "15m");
    assert_eq!(m1.tokens.yes_token_id, "m1-yes");
    assert_eq!(m1.tokens.no_token_id, "m1-no");
    assert!(m1.yes_price.is_none());
    assert!(provider.tokens().contains("m2"));
    assert_eq!(provider.parser().stats().count(DiscardReason::NotUpOrDown), 1);
}

#[tokio::test]
async fn test_missing_token_ids_never_admitted() {
    let mut no_tokens = up_down("m1", "BTC");
    no_tokens.clob_token_ids.clear();
    let mut one_token = up_down("m2", "ETH");
    one_token.clob_token_ids.truncate(1);

    let source = FakeSource::new(vec![no_tokens, one_token]);
    let provider = provider(source.clone(), Arc::new(FakePrices::default()));

    let report = provider.refresh_universe().await.unwrap();
    assert_eq!(report.admitted, 0);
    assert!(provider.markets().is_empty());
    assert!(provider.tokens().is_empty());
    assert_eq!(
        provider.parser().stats().count(DiscardReason::NoClobTokenIds),
        2
    );

    // still excluded on later cycles
    provider.refresh_universe().await.unwrap();
    assert!(provider.markets().is_empty());
}

#[tokio::test]
async fn test_inactive_and_expired_rejected() {
    let mut inactive = up_down("m1", "BTC");
    inactive.active = Some(false);
    let mut expired = up_down("m2", "ETH");
    expired.end_date = Some((Utc::now() - ChronoDuration::minutes(5)).to_rfc3339());

    let source = FakeSource::new(vec![inactive, expired, up_down("m3", "SOL")]);
    let provider = provider(source, Arc::new(FakePrices::default()));
    provider.refresh_universe().await.unwrap();

    assert_eq!(ids(&provider), vec!["m3"]);
    let stats = provider.parser().stats();
    assert_eq!(stats.count(DiscardReason::StatusNotActive), 1);
    assert_eq!(stats.count(DiscardReason::EndTimePassed), 1);
}

#[tokio::test]
async fn test_eviction_then_price_refresh_is_noop() {
    let source = FakeSource::new(vec![up_down("m1", "BTC"), up_down("m2", "ETH")]);
    let prices = Arc::new(FakePrices::default());
    let provider = provider(source.clone(), prices.clone());
    provider.refresh_universe().await.unwrap();

    source.set(vec![up_down("m2", "ETH")]);
    let report = provider.refresh_universe().await.unwrap();
    assert_eq!(report.evicted, 1);
    assert!(provider.market("m1").is_none());
    assert_eq!(provider.scheduler().batcher().next_batch(), vec!["m2"]);

    let updated = provider.refresh_prices(&["m1".to_string()]).await;
    assert_eq!(updated, 0);
    assert_eq!(prices.calls(), 0);
    assert!(!prices.is_stale("m1"));
}

#[tokio::test]
async fn test_caches_follow_live_set_across_cycles() {
    let source = FakeSource::new(vec![]);
    let prices = Arc::new(FakePrices::default());
    let provider = provider(source.clone(), prices.clone());

    for cycle in 0..20 {
        let mut listing = Vec::new();
        for i in 0..5 {
            let id = format!("c{}-{}", cycle, i);
            prices.quote(&format!("{}-yes", id), dec!(0.5));
            prices.quote(&format!("{}-no", id), dec!(0.5));
            listing.push(up_down(&id, "BTC"));

            let mut other = up_down(&format!("x{}-{}", cycle, i), "BTC");
            other.question = Some("Will it rain in Paris tomorrow?".to_string());
            listing.push(other);
        }
        source.set(listing);
        provider.refresh_universe().await.unwrap();

        let live: Vec<String> = ids(&provider);
        provider.refresh_prices(&live).await;

        assert_eq!(provider.market_count(), 5, "cycle {}", cycle);
        assert_eq!(provider.tokens().len(), 5, "cycle {}", cycle);
        assert_eq!(provider.candles().market_count(), 5, "cycle {}", cycle);
    }

    assert!(!provider.tokens().contains("c0-0"));
    assert!(!provider.tokens().contains("x19-0"));
    assert!(provider.candles().get_candles("c0-0", 15, 10).is_empty());
    assert!(provider.candles().remove_market("c19-0"));
}

#[tokio::test]
async fn test_existing_markets_not_reparsed() {
    let source = FakeSource::new(vec![up_down("m1", "BTC")]);
    let provider = provider(source.clone(), Arc::new(FakePrices::default()));
    provider.refresh_universe().await.unwrap();

    let mut renamed = up_down("m1", "BTC");
    renamed.question = Some("Something else entirely".to_string());
    source.set(vec![renamed]);

    let report = provider.refresh_universe().await.unwrap();
    assert_eq!(report.admitted, 0);
    assert_eq!(report.evicted, 0);
    assert_eq!(
        provider.market("m1").unwrap().descriptor.title,
        "BTC Up or Down - 15 minutes"
    );
    assert_eq!(provider.parser().stats().total(), 0);
}

#[tokio::test]
async fn test_failed_fetch_leaves_state_untouched() {
    let source = FakeSource::new(vec![up_down("m1", "BTC")]);
    let provider = provider(source.clone(), Arc::new(FakePrices::default()));
    provider.refresh_universe().await.unwrap();

    source.set(vec![]);
    source.set_mode(Listing::Fail);
    assert!(provider.refresh_universe().await.is_err());
    assert_eq!(ids(&provider), vec!["m1"]);

    // the previous id set survives the failure
    source.set_mode(Listing::Ok);
    source.set(vec![up_down("m2", "ETH")]);
    let report = provider.refresh_universe().await.unwrap();
    assert_eq!(report.evicted, 1);
    assert_eq!(ids(&provider), vec!["m2"]);
}

#[tokio::test]
async fn test_partial_listing_skips_eviction() {
    let source = FakeSource::new(vec![up_down("m1", "BTC"), up_down("m2", "ETH")]);
    let provider = provider(source.clone(), Arc::new(FakePrices::default()));
    provider.refresh_universe().await.unwrap();

    source.set(vec![up_down("m2", "ETH"), up_down("m3", "SOL")]);
    source.set_mode(Listing::Partial);
    let report = provider.refresh_universe().await.unwrap();
    assert!(!report.complete);
    assert_eq!(report.admitted, 1);
    assert_eq!(report.evicted, 0);
    assert_eq!(ids(&provider), vec!["m1", "m2", "m3"]);

    // a complete listing evicts again
    source.set_mode(Listing::Ok);
    let report = provider.refresh_universe().await.unwrap();
    assert_eq!(report.evicted, 1);
    assert_eq!(ids(&provider), vec!["m2", "m3"]);
}

#[tokio::test]
async fn test_price_refresh_updates_and_notifies_in_order() {
    let source = FakeSource::new(vec![up_down("m1", "BTC")]);
    let prices = Arc::new(FakePrices::default());
    prices.quote("m1-yes", dec!(0.62));
    prices.quote("m1-no", dec!(0.39));
    let provider = provider(source, prices.clone());
    provider.refresh_universe().await.unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = seen.clone();
    provider.subscribe(move |m| {
        log.lock().push(format!("first:{}", m.market_id()));
        Ok(())
    });
    provider.subscribe(|_| anyhow::bail!("subscriber broke"));
    provider.subscribe(|_| panic!("subscriber panicked"));
    let log = seen.clone();
    assert_eq!(
        provider.subscribe(move |m| {
            log.lock().push(format!("last:{}", m.implied_probability.unwrap()));
            Ok(())
        }),
        4
    );

    let updated = provider.refresh_prices(&["m1".to_string()]).await;
    assert_eq!(updated, 1);
    assert_eq!(*seen.lock(), vec!["first:m1", "last:0.62"]);

    let market = provider.market("m1").unwrap();
    assert_eq!(market.yes_price, Some(dec!(0.62)));
    assert_eq!(market.no_price, Some(dec!(0.39)));
    assert_eq!(market.implied_probability, Some(dec!(0.62)));
    assert!(market.updated_at.is_some());
}

#[tokio::test]
async fn test_failed_quotes_mark_stale_until_cleared() {
    let source = FakeSource::new(vec![up_down("m1", "BTC"), up_down("m2", "ETH")]);
    let prices = Arc::new(FakePrices::default());
    prices.quote("m1-yes", dec!(0.5));
    prices.quote("m1-no", dec!(0.5));
    prices.fail("m2-yes");
    let provider = provider(source, prices.clone());
    provider.refresh_universe().await.unwrap();

    let batch = vec!["m1".to_string(), "m2".to_string()];
    assert_eq!(provider.refresh_prices(&batch).await, 1);
    assert!(prices.is_stale("m2"));
    assert_eq!(prices.calls(), 2);

    // stale markets are skipped without a fetch
    assert_eq!(provider.refresh_prices(&batch).await, 1);
    assert_eq!(prices.calls(), 3);

    prices.failing.lock().clear();
    prices.quote("m2-yes", dec!(0.7));
    prices.quote("m2-no", dec!(0.3));
    provider.price_source().clear_stale("m2");
    assert_eq!(provider.refresh_prices(&batch).await, 2);
    assert_eq!(provider.market("m2").unwrap().yes_price, Some(dec!(0.7)));
}

#[tokio::test]
async fn test_missing_quote_marks_stale() {
    let source = FakeSource::new(vec![up_down("m1", "BTC")]);
    let prices = Arc::new(FakePrices::default());
    let provider = provider(source, prices.clone());
    provider.refresh_universe().await.unwrap();

    assert_eq!(provider.refresh_prices(&["m1".to_string()]).await, 0);
    assert!(prices.is_stale("m1"));
    assert!(provider.market("m1").unwrap().yes_price.is_none());
}

#[tokio::test]
async fn test_strategy_trades_on_updates() {
    let source = FakeSource::new(vec![up_down("m1", "BTC")]);
    let prices = Arc::new(FakePrices::default());
    let provider = provider(source, prices.clone());
    provider.refresh_universe().await.unwrap();

    let engine = Arc::new(PaperEngine::new("momentum", dec!(1000)));
    let strategy = Arc::new(MomentumStrategy::new(
        "momentum",
        MomentumConfig::default(),
        engine.clone(),
    ));
    provider.subscribe_strategy(strategy);

    let batch = vec!["m1".to_string()];
    for (yes, no) in [(dec!(0.56), dec!(0.44)), (dec!(0.61), dec!(0.39))] {
        prices.quote("m1-yes", yes);
        prices.quote("m1-no", no);
        provider.refresh_prices(&batch).await;
    }

    let position = engine.get_position("m1").unwrap();
    assert_eq!(position.side, OrderSide::Yes);
    assert_eq!(position.entry_price, dec!(0.61));
    assert_eq!(engine.balance(), dec!(993.9));
}

#[tokio::test(start_paused = true)]
async fn test_start_refreshes_then_ticks() {
    let source = FakeSource::new(vec![
        up_down("m1", "BTC"),
        up_down("m2", "ETH"),
        up_down("m3", "SOL"),
    ]);
    let prices = Arc::new(FakePrices::default());
    for id in ["m1", "m2", "m3"] {
        prices.quote(&format!("{}-yes", id), dec!(0.5));
        prices.quote(&format!("{}-no", id), dec!(0.5));
    }
    let provider = provider(source.clone(), prices.clone());

    provider.start().await;
    assert!(provider.is_running());
    assert_eq!(provider.market_count(), 3);

    // batches of two: m1,m2 then m3 over two fast ticks
    tokio::time::sleep(Duration::from_secs(6)).await;
    for id in ["m1", "m2", "m3"] {
        assert!(provider.market(id).unwrap().yes_price.is_some(), "{}", id);
    }
    assert!(source.fetches.load(Ordering::SeqCst) >= 2);

    provider.stop().await;
    provider.stop().await;
    assert!(!provider.is_running());
}
