use serde_json::Value;

use super::decode::Record;
use super::http::error_detail;
use super::FetchResult;
use crate::error::AppError;

/// Envelope status reported by the API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseStatus {
    Ok,
    Error,
    Other(String),
}

impl ResponseStatus {
    pub fn from_body(body: &Value) -> Self {
        match body.get("status").and_then(Value::as_str) {
            Some("OK") => ResponseStatus::Ok,
            Some("ERROR") => ResponseStatus::Error,
            Some(other) => ResponseStatus::Other(other.to_string()),
            None => ResponseStatus::Other(String::new()),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, ResponseStatus::Ok)
    }

    pub fn as_str(&self) -> &str {
        match self {
            ResponseStatus::Ok => "OK",
            ResponseStatus::Error => "ERROR",
            ResponseStatus::Other(status) if status.is_empty() => "<missing>",
            ResponseStatus::Other(status) => status,
        }
    }
}

/// Fail with `BadStatus` unless the envelope of `body` reports `OK`.
pub fn ensure_ok(body: &Value) -> FetchResult<()> {
    let status = ResponseStatus::from_body(body);
    if status.is_ok() {
        Ok(())
    } else {
        Err(AppError::bad_status(status.as_str(), error_detail(body)))
    }
}

/// One decoded page of a listing endpoint. `cursor` is absent exactly on the last page.
#[derive(Debug, Clone)]
pub struct Page {
    pub number: usize,
    pub status: ResponseStatus,
    pub results: Vec<Record>,
    /// Entries of `results` that were not JSON objects and could not be kept.
    pub skipped: usize,
    pub cursor: Option<String>,
}

impl Page {
    pub fn is_last(&self) -> bool {
        self.cursor.is_none()
    }
}

/// Decode a listing body, failing with `BadStatus` unless the envelope says `OK`.
pub fn parse_page(number: usize, body: Value) -> FetchResult<Page> {
    ensure_ok(&body)?;

    let cursor = body
        .get("next_url")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|cursor| !cursor.is_empty())
        .map(str::to_string);

    let mut skipped = 0;
    let results = match body.get("results") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| {
                let record = item.as_object().cloned();
                if record.is_none() {
                    skipped += 1;
                }
                record
            })
            .collect(),
        Some(Value::Null) | None => Vec::new(),
        Some(other) => {
            return Err(AppError::message(format!(
                "Expected `results` to be an array on page {number}, found {}",
                kind_of(other)
            )))
        }
    };

    if skipped > 0 {
        log::warn!(
            "page {} dropped {} result entries that were not objects",
            number,
            skipped
        );
    }

    Ok(Page {
        number,
        status: ResponseStatus::Ok,
        results,
        skipped,
        cursor,
    })
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
