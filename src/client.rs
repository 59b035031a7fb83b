use std::sync::Arc;

use reqwest::Url;
use serde_json::Value;

use crate::config::ClientConfig;
use crate::error::Result;
use crate::fetch::http::{get_json, redact_url};
use crate::fetch::{ConcurrentSnapshotFetcher, HttpClient, PaginatedFetcher, Query, ReqwestHttpClient};

/// Bundles one configuration with the fetchers built from it. Several clients
/// with different credentials can coexist.
pub struct PolygonClient {
    config: ClientConfig,
    http: Arc<dyn HttpClient>,
    base_url: Url,
    paginator: PaginatedFetcher,
    snapshots: ConcurrentSnapshotFetcher,
}

impl PolygonClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        Self::with_http_client(config, ReqwestHttpClient::shared())
    }

    pub fn with_http_client(config: ClientConfig, http: Arc<dyn HttpClient>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            base_url: config.base_url()?,
            paginator: PaginatedFetcher::new(Arc::clone(&http), &config)?,
            snapshots: ConcurrentSnapshotFetcher::new(Arc::clone(&http), &config)?,
            http,
            config,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Start a query against `endpoint` carrying this client's credential.
    pub fn query(&self, endpoint: impl Into<String>) -> Query {
        Query::new(endpoint, self.config.api_key.clone())
    }

    /// Single-shot GET returning the decoded body.
    pub async fn get(&self, query: &Query) -> Result<Value> {
        let url = query.to_url(&self.base_url)?;
        log::debug!("GET {}", redact_url(&url));
        get_json(self.http.as_ref(), &url, self.config.timeout).await
    }

    pub fn paginator(&self) -> &PaginatedFetcher {
        &self.paginator
    }

    pub fn snapshots(&self) -> &ConcurrentSnapshotFetcher {
        &self.snapshots
    }
}
