//! Config file loading and environment overrides

use polybot::config::Config;
use polybot::telemetry::LogFormat;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::io::Write;
use std::time::Duration;

const SAMPLE_CONFIG: &str = include_str!("../../config.toml.example");

fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key| vars.get(key).cloned()
}

#[test]
fn test_sample_file_matches_defaults() {
    let config: Config = toml::from_str(SAMPLE_CONFIG).unwrap();
    assert_eq!(config, Config::default());
    config.validate().unwrap();
}

#[test]
fn test_load_partial_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
[gamma]
fallback_url = "http://localhost:9000"
page_size = 250

[scheduler]
max_runtime_secs = 600

[paper]
initial_balance = 500
fee_rate = 0.01

[telemetry]
log_format = "json"
metrics_port = 9100
"#
    )
    .unwrap();

    let config = Config::load(file.path()).unwrap();
    assert_eq!(config.gamma.fallback_url.as_deref(), Some("http://localhost:9000"));
    assert_eq!(config.gamma.page_size, 250);
    assert_eq!(config.gamma.max_markets, 1000);
    assert_eq!(config.paper.initial_balance, dec!(500));
    assert_eq!(config.paper.fee_rate, dec!(0.01));
    assert_eq!(config.telemetry.log_format, LogFormat::Json);
    assert_eq!(config.telemetry.metrics_port, Some(9100));

    let scheduler = config.scheduler.scheduler_config();
    assert_eq!(scheduler.max_runtime, Some(Duration::from_secs(600)));
    assert_eq!(scheduler.fast_tick_interval, Duration::from_secs(5));
}

#[test]
fn test_load_errors_name_the_file() {
    let err = Config::load("/nonexistent/polybot.toml").unwrap_err();
    assert!(format!("{:#}", err).contains("/nonexistent/polybot.toml"));

    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[scheduler]\nfast_tick_interval_secs = \"soon\"").unwrap();
    let err = Config::load(file.path()).unwrap_err();
    assert!(format!("{:#}", err).contains("parsing config"));
}

#[test]
fn test_environment_overrides_file_values() {
    let mut config: Config = toml::from_str(SAMPLE_CONFIG).unwrap();
    config
        .apply_overrides(env(&[
            ("GAMMA_API_URL", "http://gamma.local"),
            ("CLOB_API_URL", "http://clob.local"),
            ("FAST_TICK_INTERVAL", "2"),
            ("SLOW_TICK_INTERVAL", " 30 "),
            ("MAX_MARKETS_PER_TICK", "20"),
            ("CANDLE_TIMEFRAMES", "15, 60,"),
            ("LOG_LEVEL", "DEBUG"),
        ]))
        .unwrap();

    assert_eq!(config.gamma.base_url, "http://gamma.local");
    assert_eq!(config.clob.base_url, "http://clob.local");
    assert_eq!(config.candles.timeframes, vec![15, 60]);
    assert_eq!(config.telemetry.log_level, "debug");

    let scheduler = config.scheduler.scheduler_config();
    assert_eq!(scheduler.fast_tick_interval, Duration::from_secs(2));
    assert_eq!(scheduler.slow_tick_interval, Duration::from_secs(30));
    assert_eq!(scheduler.max_markets_per_tick, 20);
    config.validate().unwrap();
}

#[test]
fn test_bad_override_is_rejected() {
    let mut config = Config::default();
    let err = config
        .apply_overrides(env(&[("FAST_TICK_INTERVAL", "fast")]))
        .unwrap_err();
    assert!(err.to_string().contains("FAST_TICK_INTERVAL"));

    let mut config = Config::default();
    config
        .apply_overrides(env(&[("MAX_MARKETS_PER_TICK", "0")]))
        .unwrap();
    assert!(config.validate().is_err());
}
