use chrono::NaiveDate;
use serde_json::{Map, Value};

use crate::error::AppError;

use super::FetchResult;

/// One result object exactly as the API returned it.
pub type Record = Map<String, Value>;

pub const DATE_FORMAT: &str = "%Y-%m-%d";
/// Field the date filter reads when none is named.
pub const DEFAULT_DATE_FIELD: &str = "date";

/// Closed date interval applied client-side to one field of each record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateRange {
    field: String,
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> FetchResult<Self> {
        if start > end {
            return Err(AppError::config(format!(
                "date range start {start} is after end {end}"
            )));
        }
        Ok(Self {
            field: DEFAULT_DATE_FIELD.to_string(),
            start,
            end,
        })
    }

    /// Parse both bounds from `YYYY-MM-DD` strings.
    pub fn parse(start: &str, end: &str) -> FetchResult<Self> {
        Self::new(parse_date(start)?, parse_date(end)?)
    }

    /// Filter on `field` instead of `date`.
    pub fn on_field(mut self, field: impl Into<String>) -> Self {
        self.field = field.into();
        self
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn contains_date(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Records with a missing or unreadable date fall outside the range.
    pub fn contains(&self, record: &Record) -> bool {
        record
            .get(&self.field)
            .and_then(record_date)
            .map_or(false, |date| self.contains_date(date))
    }
}

pub fn parse_date(value: &str) -> FetchResult<NaiveDate> {
    Ok(NaiveDate::parse_from_str(value.trim(), DATE_FORMAT)?)
}

/// Read a date out of a JSON value, accepting full timestamps by their date prefix.
pub fn record_date(value: &Value) -> Option<NaiveDate> {
    let text = value.as_str()?.trim();
    let prefix = text.get(..10).unwrap_or(text);
    NaiveDate::parse_from_str(prefix, DATE_FORMAT).ok()
}

/// Numbers sometimes arrive quoted; accept both.
pub fn value_to_f64(value: &Value) -> Option<f64> {
    value
        .as_f64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse::<f64>().ok()))
}

pub fn str_field<'a>(record: &'a Record, key: &str) -> Option<&'a str> {
    record.get(key).and_then(Value::as_str)
}
