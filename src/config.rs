use std::fmt::{self, Debug};
use std::time::Duration;

use reqwest::Url;

use crate::error::{AppError, Result};
use crate::fetch::query::directory_base;

pub const API_KEY_ENV: &str = "POLYGON_API_KEY";
pub const BASE_URL_ENV: &str = "POLYGON_BASE_URL";
pub const TIMEOUT_ENV: &str = "POLYGON_TIMEOUT_SECS";
pub const MAX_PAGES_ENV: &str = "POLYGON_MAX_PAGES";
pub const CONCURRENCY_ENV: &str = "POLYGON_CONCURRENCY";

pub const DEFAULT_BASE_URL: &str = "https://api.polygon.io";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_PAGES: usize = 100;
/// Default concurrency guard applied when issuing snapshot requests.
pub const DEFAULT_CONCURRENCY_LIMIT: usize = 5;

/// Polygon credential. Kept out of `Debug` output and log lines.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new<T: Into<String>>(value: T) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

/// Explicit client settings handed to every fetcher; nothing is read from globals.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_key: ApiKey,
    pub base_url: String,
    pub timeout: Duration,
    pub max_pages: usize,
    pub concurrency_limit: usize,
}

impl ClientConfig {
    pub fn new(api_key: ApiKey) -> Self {
        Self {
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            max_pages: DEFAULT_MAX_PAGES,
            concurrency_limit: DEFAULT_CONCURRENCY_LIMIT,
        }
    }

    /// Build the configuration from the process environment, consulting a local
    /// `.env` file first. Variables already set in the environment win.
    pub fn from_env() -> Result<Self> {
        match dotenvy::dotenv() {
            Ok(path) => log::debug!("loaded environment overrides from {}", path.display()),
            Err(err) if err.not_found() => {}
            Err(err) => log::warn!("ignoring unreadable .env file: {}", err),
        }

        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`ClientConfig::from_env`] but reading variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup(API_KEY_ENV)
            .map(ApiKey::new)
            .filter(|key| !key.is_empty())
            .ok_or_else(|| {
                AppError::config(format!("{API_KEY_ENV} is not set in the environment or .env"))
            })?;

        let mut config = Self::new(api_key);

        if let Some(base_url) = lookup(BASE_URL_ENV) {
            config.base_url = base_url.trim().to_string();
        }
        if let Some(secs) = parse_var::<u64>(&lookup, TIMEOUT_ENV)? {
            config.timeout = Duration::from_secs(secs);
        }
        if let Some(max_pages) = parse_var::<usize>(&lookup, MAX_PAGES_ENV)? {
            config.max_pages = max_pages;
        }
        if let Some(limit) = parse_var::<usize>(&lookup, CONCURRENCY_ENV)? {
            config.concurrency_limit = limit;
        }

        config.validate()?;
        Ok(config)
    }

    /// Parsed base URL, always ending in `/` so endpoints resolve below its path.
    pub fn base_url(&self) -> Result<Url> {
        Url::parse(&self.base_url)
            .map(|url| directory_base(&url))
            .map_err(|err| AppError::config(format!("invalid base URL `{}`: {err}", self.base_url)))
    }

    /// Check every setting and report all problems at once.
    pub fn validate(&self) -> Result<()> {
        let mut issues = Vec::new();

        if self.api_key.is_empty() {
            issues.push("api key must not be empty".to_string());
        }
        match Url::parse(&self.base_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            Ok(url) => issues.push(format!(
                "base URL must use http or https, found `{}`",
                url.scheme()
            )),
            Err(err) => issues.push(format!("base URL `{}` is invalid: {err}", self.base_url)),
        }
        if self.timeout.is_zero() {
            issues.push("timeout must be greater than zero".to_string());
        }
        if self.max_pages == 0 {
            issues.push("max_pages must be at least 1".to_string());
        }
        if self.concurrency_limit == 0 {
            issues.push("concurrency_limit must be at least 1".to_string());
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(AppError::config(format!(
                "client config invalid:\n  - {}",
                issues.join("\n  - ")
            )))
        }
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: fmt::Display,
{
    match lookup(name) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|err| AppError::config(format!("{name}=`{raw}` is invalid: {err}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn reads_key_and_applies_defaults() {
        let config = ClientConfig::from_lookup(lookup_from(&[(API_KEY_ENV, "abc123")]))
            .expect("config loads");

        assert_eq!(config.api_key.expose(), "abc123");
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);
        assert_eq!(config.max_pages, DEFAULT_MAX_PAGES);
        assert_eq!(config.concurrency_limit, DEFAULT_CONCURRENCY_LIMIT);
    }

    #[test]
    fn missing_key_is_a_config_error() {
        let err = ClientConfig::from_lookup(lookup_from(&[])).expect_err("should fail");
        assert!(matches!(err, AppError::Config(_)), "unexpected error: {err}");
        assert!(err.to_string().contains(API_KEY_ENV));
    }

    #[test]
    fn applies_overrides() {
        let config = ClientConfig::from_lookup(lookup_from(&[
            (API_KEY_ENV, "k"),
            (BASE_URL_ENV, "http://localhost:8080/"),
            (TIMEOUT_ENV, "5"),
            (MAX_PAGES_ENV, "3"),
            (CONCURRENCY_ENV, "2"),
        ]))
        .expect("config loads");

        assert_eq!(config.base_url, "http://localhost:8080/");
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.max_pages, 3);
        assert_eq!(config.concurrency_limit, 2);
    }

    #[test]
    fn base_url_keeps_proxy_path() {
        let config = ClientConfig::from_lookup(lookup_from(&[
            (API_KEY_ENV, "k"),
            (BASE_URL_ENV, " http://proxy.test/polygon "),
        ]))
        .expect("config loads");

        assert_eq!(config.base_url().unwrap().as_str(), "http://proxy.test/polygon/");
    }

    #[test]
    fn reports_every_invalid_setting() {
        let err = ClientConfig::from_lookup(lookup_from(&[
            (API_KEY_ENV, "k"),
            (BASE_URL_ENV, "ftp://example.com"),
            (MAX_PAGES_ENV, "0"),
            (CONCURRENCY_ENV, "0"),
        ]))
        .expect_err("validation should fail");

        let message = err.to_string();
        assert!(message.contains("http or https"), "unexpected: {message}");
        assert!(message.contains("max_pages"), "unexpected: {message}");
        assert!(message.contains("concurrency_limit"), "unexpected: {message}");
    }

    #[test]
    fn rejects_unparsable_numbers() {
        let err = ClientConfig::from_lookup(lookup_from(&[
            (API_KEY_ENV, "k"),
            (TIMEOUT_ENV, "soon"),
        ]))
        .expect_err("should fail");
        assert!(err.to_string().contains(TIMEOUT_ENV));
    }

    #[test]
    fn debug_output_hides_the_key() {
        let config = ClientConfig::new(ApiKey::new("super-secret"));
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("super-secret"));
    }
}
