//! Market types: raw upstream records and the canonical schema they normalize into

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// A market record as returned by the upstream market list
///
/// Every field is optional or defaulted: records come from several endpoints
/// (and the fallback source) and none of them are consistent.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMarket {
    /// Market identifier (string or number upstream)
    #[serde(default, deserialize_with = "de_opt_id")]
    pub id: Option<String>,
    /// Market question, the usual title field
    #[serde(default)]
    pub question: Option<String>,
    /// Alternate title field used by event listings
    #[serde(default)]
    pub title: Option<String>,
    /// Whether the market is open for trading
    #[serde(default, deserialize_with = "de_opt_bool")]
    pub active: Option<bool>,
    /// ISO-8601 resolution time
    #[serde(default, alias = "end_date")]
    pub end_date: Option<String>,
    /// Outcome token ids, first is YES and second is NO
    ///
    /// Gamma serves this as a JSON-encoded string; scraped records carry a list.
    #[serde(default, deserialize_with = "de_token_ids")]
    pub clob_token_ids: Vec<String>,
    /// Explicit window length in minutes
    #[serde(default, rename = "duration_minutes", alias = "durationMinutes")]
    pub duration_minutes: Option<Value>,
    /// Explicit reference price
    #[serde(
        default,
        rename = "price_to_beat",
        alias = "priceToBeats",
        alias = "priceToBeat"
    )]
    pub price_to_beat: Option<Value>,
    /// Long-form description
    #[serde(default)]
    pub description: Option<String>,
    /// Resolution rules text
    #[serde(default)]
    pub rules: Option<String>,
    /// CTF condition identifier
    #[serde(default)]
    pub condition_id: Option<String>,
}

impl RawMarket {
    /// Market id, if present and non-empty
    pub fn market_id(&self) -> Option<&str> {
        self.id.as_deref().filter(|id| !id.is_empty())
    }

    /// Display title: `question`, falling back to `title`
    pub fn title_text(&self) -> &str {
        non_empty(self.question.as_deref())
            .or_else(|| non_empty(self.title.as_deref()))
            .unwrap_or("")
    }

    /// Free text that may state the reference price
    pub fn details_text(&self) -> &str {
        non_empty(self.description.as_deref())
            .or_else(|| non_empty(self.rules.as_deref()))
            .unwrap_or("")
    }

    /// Whether the record is flagged active
    pub fn is_active(&self) -> bool {
        self.active.unwrap_or(false)
    }
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.filter(|s| !s.trim().is_empty())
}

fn value_to_string(value: Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn de_opt_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(Option::<Value>::deserialize(deserializer)?.and_then(value_to_string))
}

/// Booleans also arrive as `"true"`/`"false"` strings or 0/1
fn de_opt_bool<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<bool>, D::Error> {
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Bool(b)) => Some(b),
        Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            _ => None,
        },
        Some(Value::Number(n)) => n.as_i64().map(|n| n != 0),
        _ => None,
    })
}

fn de_token_ids<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    let items = match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Array(items)) => items,
        Some(Value::String(encoded)) => {
            serde_json::from_str::<Vec<Value>>(&encoded).unwrap_or_default()
        }
        _ => Vec::new(),
    };
    Ok(items.into_iter().filter_map(value_to_string).collect())
}

/// Supported underlying assets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Asset {
    Btc,
    Eth,
    Sol,
    Xrp,
}

impl Asset {
    /// All supported assets
    pub const ALL: [Asset; 4] = [Asset::Btc, Asset::Eth, Asset::Sol, Asset::Xrp];

    /// Ticker symbol
    pub fn symbol(&self) -> &'static str {
        match self {
            Asset::Btc => "BTC",
            Asset::Eth => "ETH",
            Asset::Sol => "SOL",
            Asset::Xrp => "XRP",
        }
    }

    /// Look up a supported asset by ticker
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|asset| asset.symbol().eq_ignore_ascii_case(symbol))
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Canonical market window lengths
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "4h")]
    H4,
    #[serde(rename = "1d")]
    D1,
}

impl Timeframe {
    /// All canonical timeframes, shortest first
    pub const ALL: [Timeframe; 4] = [Timeframe::M15, Timeframe::H1, Timeframe::H4, Timeframe::D1];

    /// Short label ("15m", "1h", ...)
    pub fn label(&self) -> &'static str {
        match self {
            Timeframe::M15 => "15m",
            Timeframe::H1 => "1h",
            Timeframe::H4 => "4h",
            Timeframe::D1 => "1d",
        }
    }

    /// Window length in minutes
    pub fn minutes(&self) -> u32 {
        match self {
            Timeframe::M15 => 15,
            Timeframe::H1 => 60,
            Timeframe::H4 => 240,
            Timeframe::D1 => 1440,
        }
    }

    /// Intraday windows settle against the price at window start
    pub fn is_intraday(&self) -> bool {
        matches!(self, Timeframe::M15)
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Validated, canonical description of a market
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketDescriptor {
    pub market_id: String,
    pub asset: Asset,
    pub timeframe: Timeframe,
    /// Stated target; absent only for 15m windows
    pub reference_price: Option<Decimal>,
    pub resolution_time: Option<DateTime<Utc>>,
    pub title: String,
    pub active: bool,
}

/// Outcome tokens for a market
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenMapping {
    pub yes_token_id: String,
    pub no_token_id: String,
    pub condition_id: String,
}

/// A tracked market with its latest prices
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveMarket {
    pub descriptor: MarketDescriptor,
    pub tokens: TokenMapping,
    pub yes_price: Option<Decimal>,
    pub no_price: Option<Decimal>,
    /// Equal to the YES price
    pub implied_probability: Option<Decimal>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl LiveMarket {
    /// Start tracking a market with no prices yet
    pub fn new(descriptor: MarketDescriptor, tokens: TokenMapping) -> Self {
        Self {
            descriptor,
            tokens,
            yes_price: None,
            no_price: None,
            implied_probability: None,
            updated_at: None,
        }
    }

    pub fn market_id(&self) -> &str {
        &self.descriptor.market_id
    }

    /// Record a fresh YES/NO quote
    pub fn update_prices(&mut self, yes_price: Decimal, no_price: Decimal, at: DateTime<Utc>) {
        self.yes_price = Some(yes_price);
        self.no_price = Some(no_price);
        self.implied_probability = Some(yes_price);
        self.updated_at = Some(at);
    }
}

/// Why a raw record was not admitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Error)]
pub enum DiscardReason {
    #[error("missing_id")]
    MissingId,
    #[error("status_not_active")]
    StatusNotActive,
    #[error("end_time_passed")]
    EndTimePassed,
    #[error("no_clobTokenIds")]
    NoClobTokenIds,
    #[error("not_up_or_down")]
    NotUpOrDown,
    #[error("no_asset")]
    NoAsset,
    #[error("unsupported_asset")]
    UnsupportedAsset,
    #[error("unsupported_timeframe")]
    UnsupportedTimeframe,
    #[error("no_price_to_beat")]
    NoPriceToBeat,
}

impl DiscardReason {
    /// Stable reason code for logs and metrics
    pub fn code(&self) -> &'static str {
        match self {
            DiscardReason::MissingId => "missing_id",
            DiscardReason::StatusNotActive => "status_not_active",
            DiscardReason::EndTimePassed => "end_time_passed",
            DiscardReason::NoClobTokenIds => "no_clobTokenIds",
            DiscardReason::NotUpOrDown => "not_up_or_down",
            DiscardReason::NoAsset => "no_asset",
            DiscardReason::UnsupportedAsset => "unsupported_asset",
            DiscardReason::UnsupportedTimeframe => "unsupported_timeframe",
            DiscardReason::NoPriceToBeat => "no_price_to_beat",
        }
    }
}
