//! Configuration types for polybot
//!
//! Every section and field has a default, so an empty file (or no file at
//! all) yields a runnable configuration. A handful of environment variables
//! override file values; see [`Config::apply_overrides`].

use crate::candles::{DEFAULT_MAX_HISTORY, DEFAULT_TIMEFRAMES};
use crate::market::GAMMA_API_URL;
use crate::pricing::CLOB_API_URL;
use crate::retry::RetryPolicy;
use crate::telemetry::LogFormat;
use anyhow::Context;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub gamma: GammaConfig,
    pub clob: ClobConfig,
    pub scheduler: SchedulerConfig,
    pub retry: RetryConfig,
    pub candles: CandleConfig,
    pub paper: PaperConfig,
    pub strategy: StrategyConfig,
    pub telemetry: TelemetryConfig,
}

/// Market listing API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GammaConfig {
    #[serde(default = "default_gamma_url")]
    pub base_url: String,
    /// Optional second listing merged into the primary one
    #[serde(default)]
    pub fallback_url: Option<String>,
    #[serde(default = "default_gamma_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_max_markets")]
    pub max_markets: usize,
}

fn default_gamma_url() -> String {
    GAMMA_API_URL.to_string()
}
fn default_gamma_timeout() -> u64 {
    10
}
fn default_page_size() -> usize {
    100
}
fn default_max_markets() -> usize {
    1000
}

impl Default for GammaConfig {
    fn default() -> Self {
        Self {
            base_url: default_gamma_url(),
            fallback_url: None,
            timeout_secs: default_gamma_timeout(),
            page_size: default_page_size(),
            max_markets: default_max_markets(),
        }
    }
}

impl GammaConfig {
    /// Client settings for `base_url`
    pub fn client_config(&self, base_url: &str) -> crate::market::GammaConfig {
        crate::market::GammaConfig {
            base_url: base_url.to_string(),
            timeout: Duration::from_secs(self.timeout_secs),
            page_size: self.page_size,
            max_markets: self.max_markets,
        }
    }
}

/// Price API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClobConfig {
    #[serde(default = "default_clob_url")]
    pub base_url: String,
    #[serde(default = "default_clob_timeout")]
    pub timeout_secs: u64,
}

fn default_clob_url() -> String {
    CLOB_API_URL.to_string()
}
fn default_clob_timeout() -> u64 {
    5
}

impl Default for ClobConfig {
    fn default() -> Self {
        Self {
            base_url: default_clob_url(),
            timeout_secs: default_clob_timeout(),
        }
    }
}

impl ClobConfig {
    pub fn client_config(&self) -> crate::pricing::ClobConfig {
        crate::pricing::ClobConfig {
            base_url: self.base_url.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

/// Tick timing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_fast_tick")]
    pub fast_tick_interval_secs: u64,
    #[serde(default = "default_slow_tick")]
    pub slow_tick_interval_secs: u64,
    #[serde(default = "default_max_markets_per_tick")]
    pub max_markets_per_tick: usize,
    /// Stop the loops after this many seconds
    #[serde(default)]
    pub max_runtime_secs: Option<u64>,
}

fn default_fast_tick() -> u64 {
    5
}
fn default_slow_tick() -> u64 {
    60
}
fn default_max_markets_per_tick() -> usize {
    50
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            fast_tick_interval_secs: default_fast_tick(),
            slow_tick_interval_secs: default_slow_tick(),
            max_markets_per_tick: default_max_markets_per_tick(),
            max_runtime_secs: None,
        }
    }
}

impl SchedulerConfig {
    pub fn scheduler_config(&self) -> crate::scheduler::SchedulerConfig {
        crate::scheduler::SchedulerConfig {
            fast_tick_interval: Duration::from_secs(self.fast_tick_interval_secs),
            slow_tick_interval: Duration::from_secs(self.slow_tick_interval_secs),
            max_markets_per_tick: self.max_markets_per_tick,
            max_runtime: self.max_runtime_secs.map(Duration::from_secs),
        }
    }
}

/// Backoff for remote calls
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

fn default_max_retries() -> u32 {
    3
}
fn default_initial_backoff_ms() -> u64 {
    1_000
}
fn default_max_backoff_ms() -> u64 {
    60_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
        }
    }
}

/// Candle aggregation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandleConfig {
    /// Timeframes in minutes
    #[serde(default = "default_timeframes")]
    pub timeframes: Vec<u32>,
    #[serde(default = "default_max_history")]
    pub max_history: usize,
}

fn default_timeframes() -> Vec<u32> {
    DEFAULT_TIMEFRAMES.to_vec()
}
fn default_max_history() -> usize {
    DEFAULT_MAX_HISTORY
}

impl Default for CandleConfig {
    fn default() -> Self {
        Self {
            timeframes: default_timeframes(),
            max_history: default_max_history(),
        }
    }
}

/// Paper execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperConfig {
    #[serde(default = "default_initial_balance")]
    pub initial_balance: Decimal,
    /// Fraction of notional charged per fill
    #[serde(default)]
    pub fee_rate: Decimal,
}

fn default_initial_balance() -> Decimal {
    Decimal::new(10_000, 0)
}

impl Default for PaperConfig {
    fn default() -> Self {
        Self {
            initial_balance: default_initial_balance(),
            fee_rate: Decimal::ZERO,
        }
    }
}

/// Momentum strategy parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfig {
    #[serde(default = "default_threshold")]
    pub threshold: Decimal,
    #[serde(default = "default_min_change")]
    pub min_change: Decimal,
    #[serde(default = "default_order_size")]
    pub order_size: Decimal,
}

fn default_threshold() -> Decimal {
    Decimal::new(55, 2) // 0.55
}
fn default_min_change() -> Decimal {
    Decimal::new(2, 2) // 0.02
}
fn default_order_size() -> Decimal {
    Decimal::new(10, 0)
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            min_change: default_min_change(),
            order_size: default_order_size(),
        }
    }
}

impl StrategyConfig {
    pub fn momentum_config(&self) -> crate::strategy::MomentumConfig {
        crate::strategy::MomentumConfig {
            threshold: self.threshold,
            min_change: self.min_change,
            order_size: self.order_size,
        }
    }
}

/// Telemetry configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_format: LogFormat,
    /// Serve Prometheus metrics on this port when set
    #[serde(default)]
    pub metrics_port: Option<u16>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::Pretty,
            metrics_port: None,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config)
    }

    /// Apply overrides from `lookup` (normally the process environment)
    ///
    /// Honoured keys: `GAMMA_API_URL`, `CLOB_API_URL`, `FAST_TICK_INTERVAL`,
    /// `SLOW_TICK_INTERVAL`, `MAX_MARKETS_PER_TICK`, `CANDLE_TIMEFRAMES`
    /// (comma-separated minutes) and `LOG_LEVEL`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("GAMMA_API_URL") {
            self.gamma.base_url = url;
        }
        if let Some(url) = lookup("CLOB_API_URL") {
            self.clob.base_url = url;
        }
        if let Some(value) = lookup("FAST_TICK_INTERVAL") {
            self.scheduler.fast_tick_interval_secs = parse_var("FAST_TICK_INTERVAL", &value)?;
        }
        if let Some(value) = lookup("SLOW_TICK_INTERVAL") {
            self.scheduler.slow_tick_interval_secs = parse_var("SLOW_TICK_INTERVAL", &value)?;
        }
        if let Some(value) = lookup("MAX_MARKETS_PER_TICK") {
            self.scheduler.max_markets_per_tick = parse_var("MAX_MARKETS_PER_TICK", &value)?;
        }
        if let Some(value) = lookup("CANDLE_TIMEFRAMES") {
            self.candles.timeframes = value
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| parse_var("CANDLE_TIMEFRAMES", s))
                .collect::<anyhow::Result<_>>()?;
        }
        if let Some(level) = lookup("LOG_LEVEL") {
            self.telemetry.log_level = level.to_lowercase();
        }
        Ok(())
    }

    /// Reject values the runtime cannot work with
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.scheduler.fast_tick_interval_secs == 0 || self.scheduler.slow_tick_interval_secs == 0
        {
            anyhow::bail!("tick intervals must be at least one second");
        }
        if self.scheduler.max_markets_per_tick == 0 {
            anyhow::bail!("max_markets_per_tick must be positive");
        }
        if self.gamma.page_size == 0 {
            anyhow::bail!("gamma.page_size must be positive");
        }
        if self.candles.timeframes.is_empty() || self.candles.timeframes.contains(&0) {
            anyhow::bail!("candles.timeframes must be non-empty positive minutes");
        }
        if self.paper.initial_balance < Decimal::ZERO {
            anyhow::bail!("paper.initial_balance must not be negative");
        }
        Ok(())
    }
}

fn parse_var<T>(name: &str, value: &str) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse()
        .with_context(|| format!("invalid {}={:?}", name, value))
}
