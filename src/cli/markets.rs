//! Markets command implementation

use super::build_provider;
use crate::config::Config;
use clap::Args;

#[derive(Args, Debug)]
pub struct MarketsArgs {
    /// Maximum markets to print
    #[arg(short, long, default_value_t = 50)]
    pub limit: usize,
}

impl MarketsArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let provider = build_provider(config)?;
        let report = provider.refresh_universe().await?;

        println!(
            "Fetched {} records, {} accepted{}",
            report.fetched,
            report.admitted,
            if report.complete { "" } else { " (listing incomplete)" }
        );
        println!();
        println!(
            "{:<12} {:<5} {:<4} {:>14} {:<25} TITLE",
            "ID", "ASSET", "TF", "REFERENCE", "RESOLVES"
        );

        for market in provider.markets().iter().take(self.limit) {
            let d = &market.descriptor;
            let reference = d
                .reference_price
                .map(|p| p.to_string())
                .unwrap_or_else(|| "-".to_string());
            let resolves = d
                .resolution_time
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "-".to_string());
            println!(
                "{:<12} {:<5} {:<4} {:>14} {:<25} {}",
                d.market_id,
                d.asset.symbol(),
                d.timeframe.label(),
                reference,
                resolves,
                d.title
            );
        }

        let stats = provider.parser().stats();
        if stats.total() > 0 {
            println!();
            println!("Discarded {} records:", stats.total());
            for (reason, count) in &stats.counts {
                println!("  {:<24} {}", reason, count);
            }
        }

        Ok(())
    }
}
