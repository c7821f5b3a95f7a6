// SPDX-FileCopyrightText: 2025 Joost van der Laan <joost@fashionunited.com>
//
// SPDX-License-Identifier: AGPL-3.0-only

mod api;
mod config;
mod currencies;
mod email;
mod error;
mod exchange_rates;
mod line_chart;
mod messages;
mod report;

use anyhow::Result;
use api::{CachedRates, EcbClient, RateSource};
use clap::{Parser, Subcommand};
use config::{Config, SmtpConfig};
use dotenvy::dotenv;
use email::SmtpMailer;
use exchange_rates::RateTable;
use line_chart::PngLineChart;
use log::{error, info};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about = "Chart ECB exchange rates against a base currency and email them")]
struct Cli {
    /// Path to config.toml
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Use the cached rates instead of downloading them
    #[arg(long)]
    offline: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the charts and email them (default)
    Report,
    /// Build the charts only
    Chart,
    /// Write the rebased rates of every group to CSV
    Export,
    /// List the available currencies with their latest EUR rate
    Currencies,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config_path = cli.config.unwrap_or_else(config::get_config_path);
    let config: Config = config::load_config(&config_path)?;

    match cli.command.unwrap_or(Commands::Report) {
        Commands::Report => {
            // Credentials and recipients are checked before any download
            config.validate()?;
            let smtp = SmtpConfig::from_env()?;
            let mailer = SmtpMailer::new(&smtp, config.smtp_timeout())?;

            let table = load_rates(&config, cli.offline).await?;
            let delivery =
                report::run_report(&table, &config, &PngLineChart, &mailer, None).await?;

            if delivery.none_delivered() {
                anyhow::bail!("Email could not be delivered to any recipient");
            }
        }
        Commands::Chart => {
            config.validate_charts()?;
            let table = load_rates(&config, cli.offline).await?;
            let charts = report::build_charts(&table, &config, &PngLineChart, None)?;
            println!("✅ {} chart(s) written to {}", charts.len(), config.output_dir.display());
        }
        Commands::Export => {
            config.validate_charts()?;
            let table = load_rates(&config, cli.offline).await?;
            for path in report::export_csvs(&table, &config, None)? {
                println!("{}", path.display());
            }
        }
        Commands::Currencies => {
            let table = load_rates(&config, cli.offline).await?;
            match report::latest_rates(&table) {
                Some((date, rates)) => {
                    println!("Rates per 1 EUR on {}:", date);
                    for (code, rate) in rates {
                        match rate {
                            Some(rate) => println!("{}: {}", code, rate),
                            None => println!("{}: N/A", code),
                        }
                    }
                }
                None => error!("The rate table is empty"),
            }
        }
    }

    Ok(())
}

async fn load_rates(config: &Config, offline: bool) -> Result<RateTable> {
    let source: Box<dyn RateSource> = if offline {
        info!("Offline mode, using cache in {}", config.cache_dir.display());
        Box::new(CachedRates::in_dir(&config.cache_dir))
    } else {
        Box::new(
            EcbClient::new(&config.source_url, config.fetch_timeout())?
                .with_cache_dir(&config.cache_dir),
        )
    };
    Ok(source.load().await?)
}
