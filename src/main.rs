use anyhow::Context;
use clap::Parser;
use polybot::cli::{Cli, Commands};
use polybot::config::Config;
use std::path::Path;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = if Path::new(&cli.config).exists() {
        Config::load(&cli.config)?
    } else {
        eprintln!("Config {} not found, using defaults", cli.config);
        Config::default()
    };
    config
        .apply_overrides(|key| std::env::var(key).ok())
        .context("applying environment overrides")?;
    config.validate()?;

    // Initialize telemetry
    polybot::telemetry::init_telemetry(&config.telemetry)?;

    match cli.command {
        Commands::Run(args) => {
            tracing::info!("Starting paper trading mode");
            args.execute(&config).await?;
        }
        Commands::Markets(args) => {
            args.execute(&config).await?;
        }
        Commands::Config => {
            println!("# Effective configuration");
            print!("{}", toml::to_string_pretty(&config)?);
        }
    }

    Ok(())
}
