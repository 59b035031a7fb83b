use futures::{SinkExt, StreamExt};
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};

use crate::config::ApiKey;
use crate::error::{AppError, Result};

use super::{
    auth_message, decode_frame, dispatch_events, status_notices, subscribe_message, EventHandler,
};

pub const REALTIME_STOCKS_URL: &str = "wss://socket.polygon.io/stocks";
pub const DELAYED_STOCKS_URL: &str = "wss://delayed.polygon.io/stocks";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Feed {
    #[default]
    RealTime,
    Delayed,
}

impl Feed {
    pub fn url(self) -> &'static str {
        match self {
            Feed::RealTime => REALTIME_STOCKS_URL,
            Feed::Delayed => DELAYED_STOCKS_URL,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub url: String,
    pub api_key: ApiKey,
    pub channels: Vec<String>,
}

impl StreamConfig {
    pub fn new(feed: Feed, api_key: ApiKey, channels: Vec<String>) -> Self {
        Self {
            url: feed.url().to_string(),
            api_key,
            channels,
        }
    }

    /// Trade and quote channels for each symbol.
    pub fn trades_and_quotes<S: AsRef<str>>(feed: Feed, api_key: ApiKey, symbols: &[S]) -> Self {
        let channels = symbols
            .iter()
            .flat_map(|symbol| {
                let symbol = symbol.as_ref().trim().to_uppercase();
                [format!("T.{symbol}"), format!("Q.{symbol}")]
            })
            .collect();
        Self::new(feed, api_key, channels)
    }
}

/// Connect, authenticate, subscribe and feed every frame to `handler` until the
/// server closes the connection. Reconnecting is left to the caller.
pub async fn run<H: EventHandler + ?Sized>(config: &StreamConfig, handler: &mut H) -> Result<()> {
    if config.channels.is_empty() {
        return Err(AppError::config("at least one stream channel is required"));
    }

    log::info!("connecting to {}", config.url);
    let (mut socket, _) = connect_async(config.url.as_str()).await?;
    log::info!("connection opened");

    socket
        .send(Message::Text(auth_message(config.api_key.expose()).into()))
        .await?;
    socket
        .send(Message::Text(subscribe_message(&config.channels).into()))
        .await?;
    log::info!("subscribed to {}", config.channels.join(","));

    while let Some(message) = socket.next().await {
        match message? {
            Message::Text(text) => {
                let events = match decode_frame(text.as_str()) {
                    Ok(events) => events,
                    Err(err) => {
                        log::warn!("error processing message: {}", err);
                        continue;
                    }
                };

                for notice in status_notices(&events) {
                    if notice.is_auth_failure() {
                        return Err(AppError::Auth(notice.message));
                    }
                    log::info!("stream status {}: {}", notice.status, notice.message);
                }

                let summary = dispatch_events(&events, &mut *handler);
                log::trace!("dispatched frame: {:?}", summary);
            }
            Message::Close(frame) => {
                match frame {
                    Some(frame) => log::info!(
                        "connection closed: {} (code: {})",
                        frame.reason,
                        u16::from(frame.code)
                    ),
                    None => log::info!("connection closed"),
                }
                break;
            }
            Message::Ping(_) | Message::Pong(_) | Message::Binary(_) | Message::Frame(_) => {}
        }
    }

    Ok(())
}
