use std::collections::BTreeMap;

use reqwest::Url;

use crate::config::ApiKey;
use crate::error::AppError;

use super::FetchResult;

/// Query-string name the API expects the credential under.
pub const API_KEY_PARAM: &str = "apiKey";
/// Query-string name used when a cursor arrives as a bare token.
pub const CURSOR_PARAM: &str = "cursor";

/// Immutable description of one request against the REST API.
///
/// `endpoint` is either a path joined onto the configured base URL or an
/// absolute URL, which is how the API hands back `next_url` cursors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    endpoint: String,
    params: BTreeMap<String, String>,
    api_key: ApiKey,
}

impl Query {
    pub fn new(endpoint: impl Into<String>, api_key: ApiKey) -> Self {
        Self {
            endpoint: endpoint.into(),
            params: BTreeMap::new(),
            api_key,
        }
    }

    pub fn param(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.params.insert(key.into(), value.to_string());
        self
    }

    /// Add the parameter only when a value is present.
    pub fn param_opt<V: ToString>(self, key: impl Into<String>, value: Option<V>) -> Self {
        match value {
            Some(value) => self.param(key, value),
            None => self,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }

    /// Derive the query for the page a cursor points at.
    ///
    /// An absolute cursor already carries every filter, so it replaces the endpoint
    /// and drops the original parameters. Anything else is an opaque token sent as
    /// `cursor`. The credential is carried over either way.
    pub fn with_cursor(&self, cursor: &str) -> Query {
        if is_absolute(cursor) {
            Query {
                endpoint: cursor.to_string(),
                params: BTreeMap::new(),
                api_key: self.api_key.clone(),
            }
        } else {
            self.clone().param(CURSOR_PARAM, cursor)
        }
    }

    /// Resolve the full request URL, appending the credential last.
    pub fn to_url(&self, base: &Url) -> FetchResult<Url> {
        let mut url = if is_absolute(&self.endpoint) {
            Url::parse(&self.endpoint)
        } else {
            directory_base(base).join(self.endpoint.trim_start_matches('/'))
        }
        .map_err(|err| {
            AppError::message(format!("Invalid request endpoint `{}`: {err}", self.endpoint))
        })?;

        let existing: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(key, _)| key != API_KEY_PARAM && !self.params.contains_key(&**key))
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect();

        {
            let mut pairs = url.query_pairs_mut();
            pairs.clear();
            pairs.extend_pairs(existing);
            pairs.extend_pairs(&self.params);
            pairs.append_pair(API_KEY_PARAM, self.api_key.expose());
        }

        Ok(url)
    }
}

fn is_absolute(endpoint: &str) -> bool {
    endpoint.contains("://")
}

/// Endpoints resolve below the base path, so the base must end in `/`.
pub(crate) fn directory_base(base: &Url) -> Url {
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://api.polygon.io").unwrap()
    }

    fn key() -> ApiKey {
        ApiKey::new("k1")
    }

    #[test]
    fn builds_url_with_params_and_key() {
        let query = Query::new("/v3/reference/options/contracts", key())
            .param("underlying_ticker", "SPY")
            .param("limit", 1000);

        let url = query.to_url(&base()).unwrap();
        assert_eq!(url.path(), "/v3/reference/options/contracts");

        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("underlying_ticker".into(), "SPY".into())));
        assert!(pairs.contains(&("limit".into(), "1000".into())));
        assert_eq!(pairs.last(), Some(&("apiKey".into(), "k1".into())));
    }

    #[test]
    fn absolute_cursor_replaces_endpoint_and_params() {
        let query = Query::new("/v3/reference/options/contracts", key()).param("limit", 1000);
        let next = query.with_cursor(
            "https://api.polygon.io/v3/reference/options/contracts?cursor=YWJj&limit=1000",
        );

        assert!(next.params().is_empty());
        let url = next.to_url(&base()).unwrap();
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("cursor".into(), "YWJj".into()),
                ("limit".into(), "1000".into()),
                ("apiKey".into(), "k1".into()),
            ]
        );
    }

    #[test]
    fn opaque_cursor_becomes_a_parameter() {
        let query = Query::new("/v3/trades/X", key()).param("limit", 10);
        let next = query.with_cursor("p2");

        assert_eq!(next.params().get(CURSOR_PARAM).map(String::as_str), Some("p2"));
        assert_eq!(next.params().get("limit").map(String::as_str), Some("10"));
        assert!(query.params().get(CURSOR_PARAM).is_none());
    }

    #[test]
    fn keeps_path_of_configured_base() {
        let endpoint = "/v3/reference/options/contracts";
        for raw in ["http://proxy.test/polygon/", "http://proxy.test/polygon"] {
            let base = Url::parse(raw).unwrap();
            let url = Query::new(endpoint, key()).to_url(&base).unwrap();
            assert_eq!(url.path(), "/polygon/v3/reference/options/contracts", "base {raw}");
        }

        let url = Query::new(endpoint, key()).to_url(&base()).unwrap();
        assert_eq!(url.path(), endpoint);
    }

    #[test]
    fn api_key_is_not_duplicated() {
        let query = Query::new("https://api.polygon.io/v3/x?apiKey=old&a=1", key());
        let url = query.to_url(&base()).unwrap();
        let keys: Vec<String> = url
            .query_pairs()
            .filter(|(k, _)| k == API_KEY_PARAM)
            .map(|(_, v)| v.into_owned())
            .collect();
        assert_eq!(keys, vec!["k1".to_string()]);
    }
}
