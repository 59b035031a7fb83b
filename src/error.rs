use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    /// Connection failure or timeout. Never retried automatically.
    #[error("transport error for {url}: {message}")]
    Transport { url: String, message: String },
    /// The remote end answered but did not report `OK`.
    #[error("request returned status `{status}`{}", detail_suffix(.detail))]
    BadStatus {
        status: String,
        detail: Option<String>,
    },
    #[error("pagination did not finish within {max_pages} pages")]
    PaginationLimitExceeded { max_pages: usize },
    #[error("failed to decode response from {url}: {message}")]
    Decode { url: String, message: String },
    #[error("configuration error: {0}")]
    Config(String),
    #[error("{0}")]
    NotFound(String),
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error(transparent)]
    Chrono(#[from] chrono::ParseError),
    #[error("{0}")]
    Message(String),
}

impl AppError {
    pub fn message<T: Into<String>>(msg: T) -> Self {
        AppError::Message(msg.into())
    }

    pub fn config<T: Into<String>>(msg: T) -> Self {
        AppError::Config(msg.into())
    }

    pub fn bad_status<T: Into<String>>(status: T, detail: Option<String>) -> Self {
        AppError::BadStatus {
            status: status.into(),
            detail,
        }
    }
}

fn detail_suffix(detail: &Option<String>) -> String {
    match detail {
        Some(detail) if !detail.is_empty() => format!(": {detail}"),
        _ => String::new(),
    }
}
