pub mod contracts;
pub mod financials;
pub mod quotes;

pub use contracts::{
    chain_snapshots, expiry_dates, list_contracts, resolve_option_ticker, ContractType,
};
pub use financials::fetch_financials;
pub use quotes::{last_trade, LastTrade};
