use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::{America::New_York, Tz};
use serde_json::Value;

use crate::client::PolygonClient;
use crate::error::{AppError, Result};
use crate::fetch::decode::value_to_f64;
use crate::fetch::page::ensure_ok;

/// Most recent trade for a stock symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct LastTrade {
    pub symbol: String,
    pub price: f64,
    pub size: f64,
    pub exchange: Option<i64>,
    /// SIP timestamp in exchange local time.
    pub timestamp: DateTime<Tz>,
}

pub async fn last_trade(client: &PolygonClient, symbol: &str) -> Result<LastTrade> {
    let symbol = symbol.trim().to_uppercase();
    let query = client.query(format!("/v2/last/trade/{symbol}"));
    let body = client.get(&query).await?;
    parse_last_trade(&symbol, &body)
}

fn parse_last_trade(symbol: &str, body: &Value) -> Result<LastTrade> {
    ensure_ok(body)?;

    let results = body
        .get("results")
        .filter(|results| results.is_object())
        .ok_or_else(|| AppError::NotFound(format!("No last trade returned for {symbol}")))?;

    let field = |key: &str| -> Result<f64> {
        results.get(key).and_then(value_to_f64).ok_or_else(|| {
            AppError::message(format!("Last trade for {symbol} is missing `{key}`"))
        })
    };

    let nanos = results
        .get("t")
        .and_then(Value::as_i64)
        .ok_or_else(|| AppError::message(format!("Last trade for {symbol} has no timestamp")))?;

    Ok(LastTrade {
        symbol: results
            .get("T")
            .and_then(Value::as_str)
            .unwrap_or(symbol)
            .to_string(),
        price: field("p")?,
        size: field("s")?,
        exchange: results.get("x").and_then(Value::as_i64),
        timestamp: Utc.timestamp_nanos(nanos).with_timezone(&New_York),
    })
}
