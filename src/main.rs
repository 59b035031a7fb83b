mod cli;

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use cli::{Cli, Commands};
use polygon_cli::config::ClientConfig;
use polygon_cli::fetch::DateRange;
use polygon_cli::pricing::{decode_snapshots, OptionSnapshot, PriceSource};
use polygon_cli::services::{
    chain_snapshots, expiry_dates, fetch_financials, last_trade, resolve_option_ticker,
};
use polygon_cli::stream::{self, Feed, PrintHandler, StreamConfig};
use polygon_cli::PolygonClient;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;
    let client = PolygonClient::new(config).context("Failed to build API client")?;

    run_command(&client, &cli.command).await
}

fn load_config(cli: &Cli) -> Result<ClientConfig> {
    let mut config = ClientConfig::from_env().context("Failed to load configuration")?;
    if let Some(secs) = cli.timeout_secs {
        config.timeout = Duration::from_secs(secs);
    }
    if let Some(max_pages) = cli.max_pages {
        config.max_pages = max_pages;
    }
    if let Some(concurrency) = cli.concurrency {
        config.concurrency_limit = concurrency;
    }
    Ok(config)
}

async fn run_command(client: &PolygonClient, command: &Commands) -> Result<()> {
    match command {
        Commands::Ticker {
            underlying,
            expiration,
            strike,
            contract_type,
        } => {
            let ticker =
                resolve_option_ticker(client, underlying, *expiration, *strike, *contract_type)
                    .await?;
            println!("{ticker}");
        }
        Commands::Contracts {
            underlying,
            expiration,
            contract_type,
            limit,
        } => {
            let batch =
                chain_snapshots(client, underlying, *expiration, *contract_type, *limit).await?;
            for snapshot in decode_snapshots(&batch.snapshots) {
                print_snapshot(&snapshot);
            }
            if !batch.is_complete() {
                println!(
                    "{} of {} snapshots could not be fetched",
                    batch.missing(),
                    batch.requested
                );
            }
        }
        Commands::Expiries {
            underlying,
            from,
            to,
        } => {
            let range = DateRange::new(*from, *to)?;
            let dates = expiry_dates(client, underlying, range).await?;
            if dates.is_empty() {
                println!("No expirations for {underlying} between {from} and {to}");
            }
            for date in dates {
                println!("{date}");
            }
        }
        Commands::LastTrade { symbol } => {
            let trade = last_trade(client, symbol).await?;
            println!(
                "{} - ${} - Size: {} - {}",
                trade.symbol,
                trade.price,
                trade.size,
                trade.timestamp.format("%Y-%m-%d %H:%M:%S%.3f %Z")
            );
        }
        Commands::Financials { ticker, limit } => {
            let payload = fetch_financials(client, ticker, *limit).await?;
            println!("{}", serde_json::to_string_pretty(&payload)?);
        }
        Commands::Stream { symbols, delayed } => {
            let feed = if *delayed { Feed::Delayed } else { Feed::RealTime };
            let stream_config =
                StreamConfig::trades_and_quotes(feed, client.config().api_key.clone(), symbols);
            stream::run(&stream_config, &mut PrintHandler).await?;
        }
    }

    Ok(())
}

fn print_snapshot(snapshot: &OptionSnapshot) {
    let details = &snapshot.details;
    let field = |value: Option<f64>| value.map_or_else(|| "-".to_string(), |v| v.to_string());

    let price = match snapshot.price() {
        Some(estimate) => {
            let source = match estimate.source {
                PriceSource::MidQuote => "mid",
                PriceSource::LastTrade => "last",
            };
            format!("{:.2} ({source})", estimate.value)
        }
        None => "-".to_string(),
    };

    println!(
        "{:<24} {:>5} strike {:>9} price {:<14} iv {:<8} delta {:<8} oi {}",
        snapshot.ticker().unwrap_or("?"),
        details.contract_type.as_deref().unwrap_or("-"),
        field(details.strike_price),
        price,
        field(snapshot.implied_volatility),
        field(snapshot.greeks.delta),
        field(snapshot.open_interest),
    );
}
