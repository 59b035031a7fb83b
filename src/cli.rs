use chrono::NaiveDate;
use clap::{Parser, Subcommand};

use polygon_cli::services::ContractType;

#[derive(Parser)]
#[command(name = "polygon-cli")]
#[command(about = "Query option contracts, snapshots, quotes and filings from Polygon.io")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Per-request timeout in seconds (overrides POLYGON_TIMEOUT_SECS)
    #[arg(long, global = true)]
    pub timeout_secs: Option<u64>,

    /// Upper bound on pages followed per listing (overrides POLYGON_MAX_PAGES)
    #[arg(long, global = true)]
    pub max_pages: Option<usize>,

    /// Snapshot requests in flight at once (overrides POLYGON_CONCURRENCY)
    #[arg(long, global = true)]
    pub concurrency: Option<usize>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Resolve the exact option ticker for one contract
    Ticker {
        /// Underlying symbol (e.g. SPY)
        underlying: String,
        /// Expiration date, YYYY-MM-DD
        expiration: NaiveDate,
        /// Strike price
        strike: f64,
        /// call or put
        #[arg(value_parser = parse_contract_type)]
        contract_type: ContractType,
    },

    /// List contracts of one expiry and show snapshot prices for the first few
    Contracts {
        underlying: String,
        expiration: NaiveDate,
        #[arg(short = 't', long, value_parser = parse_contract_type)]
        contract_type: Option<ContractType>,
        /// How many contracts to snapshot
        #[arg(short, long, default_value_t = 5)]
        limit: usize,
    },

    /// Distinct upcoming expiration dates inside a window
    Expiries {
        underlying: String,
        /// Window start, YYYY-MM-DD
        #[arg(long)]
        from: NaiveDate,
        /// Window end, YYYY-MM-DD
        #[arg(long)]
        to: NaiveDate,
    },

    /// Most recent trade for a stock symbol
    LastTrade { symbol: String },

    /// Latest quarterly filings as JSON
    Financials {
        ticker: String,
        #[arg(short, long, default_value_t = 4)]
        limit: usize,
    },

    /// Stream live trades and quotes until the connection closes
    Stream {
        /// Symbols to subscribe to
        #[arg(required = true)]
        symbols: Vec<String>,
        /// Use the 15-minute delayed feed
        #[arg(long)]
        delayed: bool,
    },
}

fn parse_contract_type(value: &str) -> Result<ContractType, String> {
    value.parse().map_err(|err: polygon_cli::AppError| err.to_string())
}
