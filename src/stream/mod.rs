use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{AppError, Result};

pub mod session;

pub use session::{run, Feed, StreamConfig};

pub const TRADE_TAG: &str = "T";
pub const QUOTE_TAG: &str = "Q";
pub const STATUS_TAG: &str = "status";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TradeEvent {
    #[serde(rename = "sym")]
    pub symbol: String,
    #[serde(rename = "p")]
    pub price: f64,
    #[serde(rename = "s")]
    pub size: f64,
    #[serde(rename = "x", default)]
    pub exchange: Option<i64>,
    /// Milliseconds since the epoch.
    #[serde(rename = "t", default)]
    pub timestamp: Option<i64>,
    #[serde(rename = "c", default)]
    pub conditions: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct QuoteEvent {
    #[serde(rename = "sym")]
    pub symbol: String,
    #[serde(rename = "bp", default)]
    pub bid_price: Option<f64>,
    #[serde(rename = "bs", default)]
    pub bid_size: Option<f64>,
    #[serde(rename = "ap", default)]
    pub ask_price: Option<f64>,
    #[serde(rename = "as", default)]
    pub ask_size: Option<f64>,
    #[serde(rename = "t", default)]
    pub timestamp: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Trade(TradeEvent),
    Quote(QuoteEvent),
    Ignored,
}

/// Route one event object by its `ev` tag. Unknown tags and undecodable
/// payloads come back as `Ignored`.
pub fn classify(event: &Value) -> StreamEvent {
    match event.get("ev").and_then(Value::as_str) {
        Some(TRADE_TAG) => match TradeEvent::deserialize(event) {
            Ok(trade) => StreamEvent::Trade(trade),
            Err(err) => {
                log::warn!("dropping malformed trade event: {}", err);
                StreamEvent::Ignored
            }
        },
        Some(QUOTE_TAG) => match QuoteEvent::deserialize(event) {
            Ok(quote) => StreamEvent::Quote(quote),
            Err(err) => {
                log::warn!("dropping malformed quote event: {}", err);
                StreamEvent::Ignored
            }
        },
        _ => StreamEvent::Ignored,
    }
}

/// Split a text frame into its event objects. Frames are usually arrays but a
/// lone object is accepted too.
pub fn decode_frame(text: &str) -> Result<Vec<Value>> {
    match serde_json::from_str::<Value>(text)? {
        Value::Array(events) => Ok(events),
        event @ Value::Object(_) => Ok(vec![event]),
        other => Err(AppError::message(format!(
            "Unexpected stream frame: {other}"
        ))),
    }
}

/// Receives classified events.
pub trait EventHandler {
    fn on_trade(&mut self, trade: TradeEvent);
    fn on_quote(&mut self, quote: QuoteEvent);
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    pub trades: usize,
    pub quotes: usize,
    pub ignored: usize,
}

/// Decode a frame and hand every trade and quote to `handler`, in frame order.
pub fn dispatch_frame<H: EventHandler + ?Sized>(text: &str, handler: &mut H) -> Result<DispatchSummary> {
    Ok(dispatch_events(&decode_frame(text)?, handler))
}

/// Hand every trade and quote among already decoded `events` to `handler`.
pub fn dispatch_events<H: EventHandler + ?Sized>(events: &[Value], handler: &mut H) -> DispatchSummary {
    let mut summary = DispatchSummary::default();
    for event in events {
        match classify(event) {
            StreamEvent::Trade(trade) => {
                summary.trades += 1;
                handler.on_trade(trade);
            }
            StreamEvent::Quote(quote) => {
                summary.quotes += 1;
                handler.on_quote(quote);
            }
            StreamEvent::Ignored => summary.ignored += 1,
        }
    }
    summary
}

/// Connection notices (`ev: "status"`) such as `connected` or `auth_success`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StatusNotice {
    pub status: String,
    #[serde(default)]
    pub message: String,
}

impl StatusNotice {
    pub fn is_auth_failure(&self) -> bool {
        self.status == "auth_failed"
    }
}

pub fn status_notices(events: &[Value]) -> Vec<StatusNotice> {
    events
        .iter()
        .filter(|event| event.get("ev").and_then(Value::as_str) == Some(STATUS_TAG))
        .filter_map(|event| StatusNotice::deserialize(event).ok())
        .collect()
}

pub fn auth_message(api_key: &str) -> String {
    json!({"action": "auth", "params": api_key}).to_string()
}

/// Subscribe to channels such as `T.AAPL` or `Q.MSFT`.
pub fn subscribe_message<S: AsRef<str>>(channels: &[S]) -> String {
    let params = channels
        .iter()
        .map(|channel| channel.as_ref().trim())
        .filter(|channel| !channel.is_empty())
        .collect::<Vec<_>>()
        .join(",");
    json!({"action": "subscribe", "params": params}).to_string()
}

/// Prints events as they arrive.
#[derive(Debug, Default)]
pub struct PrintHandler;

impl EventHandler for PrintHandler {
    fn on_trade(&mut self, trade: TradeEvent) {
        println!(
            "Trade: {} - ${} - Size: {}",
            trade.symbol, trade.price, trade.size
        );
    }

    fn on_quote(&mut self, quote: QuoteEvent) {
        let show = |value: Option<f64>| value.map_or_else(|| "-".to_string(), |v| v.to_string());
        println!(
            "Quote: {} - Bid: ${} - Ask: ${}",
            quote.symbol,
            show(quote.bid_price),
            show(quote.ask_price)
        );
    }
}
