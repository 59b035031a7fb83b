use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use reqwest::Url;
use serde_json::Value;

use crate::config::{ApiKey, ClientConfig};
use crate::error::AppError;
use crate::fetch::{ensure_concurrency_limit, FetchResult};

use super::decode::{str_field, Record};
use super::http::{get_json, HttpClient};
use super::page::ensure_ok;
use super::query::{directory_base, Query};

/// One contract to look up: the underlying symbol and the option ticker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotRequest {
    pub underlying: String,
    pub contract: String,
}

impl SnapshotRequest {
    pub fn new(underlying: impl Into<String>, contract: impl Into<String>) -> Self {
        Self {
            underlying: underlying.into(),
            contract: contract.into(),
        }
    }

    /// Build a request from a contract listing record (`underlying_ticker` + `ticker`).
    pub fn from_contract(record: &Record) -> Option<Self> {
        Some(Self::new(
            str_field(record, "underlying_ticker")?,
            str_field(record, "ticker")?,
        ))
    }

    /// Snapshot URL below `base`, with both symbols percent-encoded as path segments.
    fn url(&self, base: &Url) -> FetchResult<Url> {
        let mut url = directory_base(base);
        url.path_segments_mut()
            .map_err(|_| AppError::config(format!("base URL `{base}` cannot carry a path")))?
            .pop_if_empty()
            .extend(["v3", "snapshot", "options"])
            .push(&self.underlying)
            .push(&self.contract);
        Ok(url)
    }
}

#[derive(Debug)]
pub struct SnapshotFailure {
    pub request: SnapshotRequest,
    pub error: AppError,
}

/// Outcome of a fan-out. Individual failures never fail the batch; they are
/// listed here instead so callers can tell a short result apart from a complete one.
#[derive(Debug, Default)]
pub struct SnapshotBatch {
    pub snapshots: Vec<Record>,
    pub failures: Vec<SnapshotFailure>,
    pub requested: usize,
}

impl SnapshotBatch {
    pub fn is_complete(&self) -> bool {
        self.snapshots.len() == self.requested
    }

    /// Number of requested items that produced no snapshot.
    pub fn missing(&self) -> usize {
        self.requested - self.snapshots.len()
    }
}

/// Fetches option snapshots concurrently. Progress is tracked per batch, so one
/// fetcher can serve several batches at once.
pub struct ConcurrentSnapshotFetcher {
    http: Arc<dyn HttpClient>,
    base_url: Url,
    api_key: ApiKey,
    timeout: Duration,
}

impl ConcurrentSnapshotFetcher {
    pub fn new(http: Arc<dyn HttpClient>, config: &ClientConfig) -> FetchResult<Self> {
        Ok(Self {
            http,
            base_url: config.base_url()?,
            api_key: config.api_key.clone(),
            timeout: config.timeout,
        })
    }

    /// Fetch one snapshot per item with at most `concurrency_limit` requests in flight.
    ///
    /// Results keep the input order. A limit of zero is treated as one.
    pub async fn fetch_snapshots(
        &self,
        items: Vec<SnapshotRequest>,
        concurrency_limit: usize,
    ) -> SnapshotBatch {
        self.fetch_snapshots_with_progress(items, concurrency_limit, &AtomicUsize::new(0))
            .await
    }

    /// Same as [`fetch_snapshots`](Self::fetch_snapshots), bumping `progress` once per
    /// completed request (successful or not) so callers can report on the batch.
    pub async fn fetch_snapshots_with_progress(
        &self,
        items: Vec<SnapshotRequest>,
        concurrency_limit: usize,
        progress: &AtomicUsize,
    ) -> SnapshotBatch {
        let concurrency_limit = ensure_concurrency_limit(concurrency_limit);
        let requested = items.len();

        // Each task owns its request; results are merged after collection.
        let outcomes: Vec<(SnapshotRequest, FetchResult<Record>)> = stream::iter(items)
            .map(|request| async move {
                let result = self.fetch_one(&request).await;
                progress.fetch_add(1, Ordering::SeqCst);
                (request, result)
            })
            .buffered(concurrency_limit)
            .collect()
            .await;

        let mut batch = SnapshotBatch {
            requested,
            ..SnapshotBatch::default()
        };
        for (request, result) in outcomes {
            match result {
                Ok(snapshot) => batch.snapshots.push(snapshot),
                Err(error) => {
                    log::warn!(
                        "snapshot for {} ({}) skipped: {}",
                        request.contract,
                        request.underlying,
                        error
                    );
                    batch.failures.push(SnapshotFailure { request, error });
                }
            }
        }

        if !batch.is_complete() {
            log::warn!(
                "fetched {} of {} snapshots",
                batch.snapshots.len(),
                batch.requested
            );
        }

        batch
    }

    async fn fetch_one(&self, request: &SnapshotRequest) -> FetchResult<Record> {
        let endpoint = request.url(&self.base_url)?;
        let url = Query::new(endpoint.as_str(), self.api_key.clone()).to_url(&self.base_url)?;
        let body = get_json(self.http.as_ref(), &url, self.timeout).await?;
        parse_snapshot(&request.contract, body)
    }
}

fn parse_snapshot(contract: &str, body: Value) -> FetchResult<Record> {
    ensure_ok(&body)?;

    match body.get("results") {
        Some(Value::Object(results)) => Ok(results.clone()),
        _ => Err(AppError::NotFound(format!(
            "No snapshot data returned for {contract}"
        ))),
    }
}
