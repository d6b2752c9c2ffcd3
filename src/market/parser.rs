//! Title parser for crypto up/down markets
//!
//! Upstream titles are inconsistent: "Bitcoin Up or Down - January 5,
//! 7:30AM-7:45AM ET", "BTC up/down 15m", "Will ETH be higher or lower than
//! $3,400 in 4 hours?". The parser extracts (asset, timeframe, reference
//! price, resolution time) from whatever the record carries and rejects
//! everything else with a stable reason code.

use super::types::{Asset, DiscardReason, MarketDescriptor, RawMarket, Timeframe};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use parking_lot::Mutex;
use regex::Regex;
use rust_decimal::Decimal;
use serde_json::Value;
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::LazyLock;

/// Detailed discard logs emitted per refresh cycle before suppression
pub const MAX_DISCARD_LOGS: usize = 30;

/// Phrasings that mark a directional binary market
const DIRECTIONAL_PHRASES: [&str; 6] = [
    "up or down",
    "up/down",
    "updown",
    "up-down",
    "higher or lower",
    "above or below",
];

/// Synonym → ticker. Tickers outside [`Asset`] are recognized so they can be
/// reported as unsupported rather than missing.
const ASSET_SYNONYMS: [(&str, &str); 12] = [
    ("bitcoin", "BTC"),
    ("btc", "BTC"),
    ("ethereum", "ETH"),
    ("eth", "ETH"),
    ("solana", "SOL"),
    ("sol", "SOL"),
    ("xrp", "XRP"),
    ("ripple", "XRP"),
    ("dogecoin", "DOGE"),
    ("doge", "DOGE"),
    ("bnb", "BNB"),
    ("cardano", "ADA"),
];

macro_rules! re {
    ($pat:expr) => {
        LazyLock::new(|| Regex::new($pat).expect("valid regex"))
    };
}

static TITLE_TIMEFRAMES: LazyLock<Vec<(Regex, Timeframe)>> = LazyLock::new(|| {
    [
        (r"\b15[\s-]*m\b", Timeframe::M15),
        (r"\b15[\s-]*min(?:s|ute|utes)?\b", Timeframe::M15),
        (r"\b1[\s-]*h\b", Timeframe::H1),
        (r"\b1[\s-]*hr\b", Timeframe::H1),
        (r"\b1[\s-]*hours?\b", Timeframe::H1),
        (r"\b60[\s-]*min(?:s|ute|utes)?\b", Timeframe::H1),
        (r"\b4[\s-]*h\b", Timeframe::H4),
        (r"\b4[\s-]*hours?\b", Timeframe::H4),
        (r"\b240[\s-]*min(?:s|ute|utes)?\b", Timeframe::H4),
        (r"\b1[\s-]*d\b", Timeframe::D1),
        (r"\b1[\s-]*day\b", Timeframe::D1),
        (r"\b24[\s-]*hours?\b", Timeframe::D1),
        (r"\b1440[\s-]*min(?:s|ute|utes)?\b", Timeframe::D1),
    ]
    .into_iter()
    .map(|(pattern, timeframe)| (Regex::new(pattern).expect("valid regex"), timeframe))
    .collect()
});

static TIME_WINDOW: LazyLock<Regex> =
    re!(r"\b(\d{1,2})(?::(\d{2}))?\s*(am|pm)\s*-\s*(\d{1,2})(?::(\d{2}))?\s*(am|pm)");
static DOLLAR_AMOUNT: LazyLock<Regex> =
    re!(r"\$\s*(\d{1,3}(?:,\d{3})+(?:\.\d+)?|\d+(?:\.\d+)?)");
static GROUPED_AMOUNT: LazyLock<Regex> = re!(r"\b(\d{1,3}(?:,\d{3})+(?:\.\d+)?)\b");
static WHITESPACE: LazyLock<Regex> = re!(r"\s+");

/// Lowercase, map unicode dashes to '-', collapse whitespace, trim
pub fn normalize_title(title: &str) -> String {
    let lowered = title.to_lowercase().replace(['\u{2013}', '\u{2014}'], "-");
    WHITESPACE.replace_all(lowered.trim(), " ").into_owned()
}

/// Whether a normalized title uses one of the directional phrasings
pub fn is_up_or_down(title_norm: &str) -> bool {
    DIRECTIONAL_PHRASES
        .iter()
        .any(|phrase| title_norm.contains(phrase))
}

/// Ticker named by a normalized title
///
/// The earliest synonym wins; at the same position the longer one does.
/// Synonyms only count at the start of a word so "whether" is not ETH.
pub fn extract_asset(title_norm: &str) -> Option<&'static str> {
    let mut best: Option<(usize, usize, &'static str)> = None;

    for (synonym, ticker) in ASSET_SYNONYMS {
        let hit = title_norm
            .match_indices(synonym)
            .map(|(pos, _)| pos)
            .find(|&pos| starts_word(title_norm, pos));

        if let Some(pos) = hit {
            let better = match best {
                None => true,
                Some((best_pos, best_len, _)) => {
                    pos < best_pos || (pos == best_pos && synonym.len() > best_len)
                }
            };
            if better {
                best = Some((pos, synonym.len(), ticker));
            }
        }
    }

    best.map(|(_, _, ticker)| ticker)
}

fn starts_word(text: &str, pos: usize) -> bool {
    text[..pos]
        .chars()
        .next_back()
        .map_or(true, |c| !c.is_alphanumeric())
}

/// Map a window length to its canonical timeframe
///
/// Tolerance windows: 10..=20 → 15m, 45..=75 → 1h, 210..=270 → 4h, 1200..=1680 → 1d.
pub fn normalize_timeframe_minutes(minutes: i64) -> Option<Timeframe> {
    match minutes {
        10..=20 => Some(Timeframe::M15),
        45..=75 => Some(Timeframe::H1),
        210..=270 => Some(Timeframe::H4),
        1200..=1680 => Some(Timeframe::D1),
        _ => None,
    }
}

/// Timeframe from the explicit duration field, the title, or a time window
pub fn parse_timeframe(title_norm: &str, raw: &RawMarket) -> Option<Timeframe> {
    if let Some(tf) = raw
        .duration_minutes
        .as_ref()
        .and_then(value_as_minutes)
        .and_then(normalize_timeframe_minutes)
    {
        return Some(tf);
    }

    if let Some((_, tf)) = TITLE_TIMEFRAMES
        .iter()
        .find(|(pattern, _)| pattern.is_match(title_norm))
    {
        return Some(*tf);
    }

    let minutes = time_window_minutes(title_norm)?;
    let tf = normalize_timeframe_minutes(minutes);
    tracing::debug!(minutes, timeframe = ?tf, "Derived duration from time window");
    tf
}

fn value_as_minutes(value: &Value) -> Option<i64> {
    let minutes = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    (minutes.is_finite() && minutes > 0.0).then(|| minutes.round() as i64)
}

/// Length in minutes of an "h[:mm]am-h[:mm]pm" window, wrapping past midnight
pub fn time_window_minutes(title_norm: &str) -> Option<i64> {
    let caps = TIME_WINDOW.captures(title_norm)?;

    let clock = |hour: usize, minute: usize, period: usize| -> Option<i64> {
        let h: i64 = caps.get(hour)?.as_str().parse().ok()?;
        let m: i64 = match caps.get(minute) {
            Some(m) => m.as_str().parse().ok()?,
            None => 0,
        };
        if !(1..=12).contains(&h) || m >= 60 {
            return None;
        }
        let h24 = match (caps.get(period)?.as_str(), h) {
            ("am", 12) => 0,
            ("pm", 12) => 12,
            ("pm", h) => h + 12,
            (_, h) => h,
        };
        Some(h24 * 60 + m)
    };

    let start = clock(1, 2, 3)?;
    let end = clock(4, 5, 6)?;
    let mut duration = end - start;
    if duration < 0 {
        duration += 24 * 60;
    }
    Some(duration)
}

/// Reference price: explicit field, then the title, then description/rules
pub fn extract_reference_price(raw: &RawMarket, title: &str) -> Option<Decimal> {
    raw.price_to_beat
        .as_ref()
        .and_then(value_as_decimal)
        .or_else(|| price_in_text(title))
        .or_else(|| price_in_text(raw.details_text()))
}

fn value_as_decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => Decimal::from_str(&n.to_string())
            .or_else(|_| Decimal::from_scientific(&n.to_string()))
            .ok(),
        Value::String(s) => {
            let cleaned: String = s
                .trim()
                .chars()
                .filter(|c| *c != '$' && *c != ',')
                .collect();
            Decimal::from_str(cleaned.trim()).ok()
        }
        _ => None,
    }
}

/// First currency-like number: `$`-prefixed, else comma-grouped
fn price_in_text(text: &str) -> Option<Decimal> {
    DOLLAR_AMOUNT
        .captures(text)
        .or_else(|| GROUPED_AMOUNT.captures(text))
        .and_then(|caps| Decimal::from_str(&caps[1].replace(',', "")).ok())
}

/// Parse an ISO-8601 timestamp, tolerating `Z`, naive datetimes (taken as UTC)
/// and bare dates
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%#z") {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Validate and normalize a raw record
pub fn parse_market(raw: &RawMarket) -> Result<MarketDescriptor, DiscardReason> {
    let title = raw.title_text();
    let title_norm = normalize_title(title);

    if !is_up_or_down(&title_norm) {
        return Err(DiscardReason::NotUpOrDown);
    }

    let ticker = extract_asset(&title_norm).ok_or(DiscardReason::NoAsset)?;
    let asset = Asset::from_symbol(ticker).ok_or(DiscardReason::UnsupportedAsset)?;

    let timeframe =
        parse_timeframe(&title_norm, raw).ok_or(DiscardReason::UnsupportedTimeframe)?;

    let reference_price = extract_reference_price(raw, title);
    if reference_price.is_none() && !timeframe.is_intraday() {
        return Err(DiscardReason::NoPriceToBeat);
    }

    let resolution_time = raw.end_date.as_deref().and_then(|end| {
        let parsed = parse_timestamp(end);
        if parsed.is_none() {
            tracing::debug!(end_date = end, "Could not parse resolution time");
        }
        parsed
    });

    Ok(MarketDescriptor {
        market_id: raw.market_id().unwrap_or("unknown").to_string(),
        asset,
        timeframe,
        reference_price,
        resolution_time,
        title: title.to_string(),
        active: raw.is_active(),
    })
}

/// Discard counters for one refresh cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscardStats {
    /// Discards per reason code
    pub counts: BTreeMap<&'static str, usize>,
    /// Detailed log lines emitted this cycle
    pub logged: usize,
}

impl DiscardStats {
    /// Total discards this cycle
    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    pub fn count(&self, reason: DiscardReason) -> usize {
        self.counts.get(reason.code()).copied().unwrap_or(0)
    }
}

/// [`parse_market`] plus per-cycle discard diagnostics
pub struct MarketParser {
    stats: Mutex<DiscardStats>,
    max_logs: usize,
}

impl MarketParser {
    pub fn new() -> Self {
        Self::with_log_limit(MAX_DISCARD_LOGS)
    }

    /// Parser that logs at most `max_logs` detailed discards per cycle
    pub fn with_log_limit(max_logs: usize) -> Self {
        Self {
            stats: Mutex::new(DiscardStats::default()),
            max_logs,
        }
    }

    /// Parse a record, recording the reason if it is rejected
    pub fn parse(&self, raw: &RawMarket) -> Result<MarketDescriptor, DiscardReason> {
        let result = parse_market(raw);
        if let Err(reason) = &result {
            self.record_discard(raw, *reason);
        }
        result
    }

    /// Count a discard and log it while under the per-cycle limit
    pub fn record_discard(&self, raw: &RawMarket, reason: DiscardReason) {
        let position = {
            let mut stats = self.stats.lock();
            *stats.counts.entry(reason.code()).or_insert(0) += 1;
            let position = stats.logged;
            if position <= self.max_logs {
                stats.logged += 1;
            }
            position
        };

        crate::telemetry::record_discard(reason.code());

        if position < self.max_logs {
            let title = raw.title_text();
            tracing::warn!(
                market_id = raw.market_id().unwrap_or("unknown"),
                reason = reason.code(),
                title = %truncate(title, 160),
                title_norm = %truncate(&normalize_title(title), 160),
                "Market discarded"
            );
        } else if position == self.max_logs {
            tracing::info!(
                max_logs = self.max_logs,
                "Reached max discard logs, suppressing further detailed logs"
            );
        }
    }

    /// Current cycle's counters
    pub fn stats(&self) -> DiscardStats {
        self.stats.lock().clone()
    }

    /// Start a new cycle, logging and returning the previous cycle's counters
    pub fn reset_stats(&self) -> DiscardStats {
        let previous = std::mem::take(&mut *self.stats.lock());
        if !previous.counts.is_empty() {
            tracing::info!(summary = ?previous.counts, total = previous.total(), "Discard summary");
        }
        previous
    }
}

impl Default for MarketParser {
    fn default() -> Self {
        Self::new()
    }
}

fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
