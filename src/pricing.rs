//! Typed view of an option snapshot and the rule for pricing it.

use serde::{Deserialize, Deserializer};

use crate::error::Result;
use crate::fetch::Record;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContractDetails {
    pub ticker: Option<String>,
    pub strike_price: Option<f64>,
    pub contract_type: Option<String>,
    pub expiration_date: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Greeks {
    pub delta: Option<f64>,
    pub gamma: Option<f64>,
    pub theta: Option<f64>,
    pub vega: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LastQuote {
    pub bid: Option<f64>,
    pub ask: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LastTrade {
    pub price: Option<f64>,
}

/// The parts of `/v3/snapshot/options` results the tool reads. The strike lives
/// under `details`, not at the root.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OptionSnapshot {
    #[serde(default, deserialize_with = "null_as_default")]
    pub details: ContractDetails,
    #[serde(default, deserialize_with = "null_as_default")]
    pub greeks: Greeks,
    #[serde(default, deserialize_with = "null_as_default")]
    pub last_quote: LastQuote,
    #[serde(default, deserialize_with = "null_as_default")]
    pub last_trade: LastTrade,
    pub implied_volatility: Option<f64>,
    pub open_interest: Option<f64>,
}

impl OptionSnapshot {
    pub fn from_record(record: &Record) -> Result<Self> {
        Ok(Self::deserialize(serde_json::Value::Object(record.clone()))?)
    }

    pub fn ticker(&self) -> Option<&str> {
        self.details.ticker.as_deref()
    }

    pub fn price(&self) -> Option<PriceEstimate> {
        option_price(self)
    }
}

/// Typed views of a batch in order. Records that do not decode are logged and skipped.
pub fn decode_snapshots(records: &[Record]) -> Vec<OptionSnapshot> {
    records
        .iter()
        .filter_map(|record| match OptionSnapshot::from_record(record) {
            Ok(snapshot) => Some(snapshot),
            Err(err) => {
                log::warn!(
                    "skipping undecodable snapshot {}: {}",
                    record
                        .get("details")
                        .and_then(|details| details.get("ticker"))
                        .and_then(serde_json::Value::as_str)
                        .unwrap_or("<unknown>"),
                    err
                );
                None
            }
        })
        .collect()
}

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceSource {
    MidQuote,
    LastTrade,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceEstimate {
    pub value: f64,
    pub source: PriceSource,
}

/// Mid-quote when both sides are positive, otherwise the last trade when it is
/// positive, otherwise no price.
pub fn option_price(snapshot: &OptionSnapshot) -> Option<PriceEstimate> {
    let positive = |value: Option<f64>| value.filter(|v| v.is_finite() && *v > 0.0);

    if let (Some(bid), Some(ask)) = (
        positive(snapshot.last_quote.bid),
        positive(snapshot.last_quote.ask),
    ) {
        return Some(PriceEstimate {
            value: (bid + ask) / 2.0,
            source: PriceSource::MidQuote,
        });
    }

    positive(snapshot.last_trade.price).map(|value| PriceEstimate {
        value,
        source: PriceSource::LastTrade,
    })
}
