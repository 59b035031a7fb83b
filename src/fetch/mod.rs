use crate::error::Result;

pub mod decode;
pub mod http;
pub mod page;
pub mod paginate;
pub mod query;
pub mod snapshots;

pub use decode::{DateRange, Record};
pub use http::{HttpClient, HttpResponse, ReqwestHttpClient};
pub use page::{Page, ResponseStatus};
pub use paginate::PaginatedFetcher;
pub use query::Query;
pub use snapshots::{ConcurrentSnapshotFetcher, SnapshotBatch, SnapshotFailure, SnapshotRequest};

pub type FetchResult<T> = Result<T>;

#[inline]
pub fn ensure_concurrency_limit(limit: usize) -> usize {
    limit.max(1)
}
