use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, Stream, TryStreamExt};
use reqwest::Url;

use crate::config::ClientConfig;
use crate::error::AppError;

use super::decode::{DateRange, Record};
use super::http::{get_json, redact_url, HttpClient};
use super::page::{parse_page, Page};
use super::query::Query;
use super::FetchResult;

enum PageState {
    Fetching { query: Query, number: usize },
    /// The last allowed page still carried a cursor.
    Exhausted,
    Done,
}

/// Walks a cursor-paginated listing one page at a time.
///
/// Pages are strictly sequential since each cursor is only known once the
/// previous response has arrived.
#[derive(Clone)]
pub struct PaginatedFetcher {
    http: Arc<dyn HttpClient>,
    base_url: Url,
    timeout: Duration,
    max_pages: usize,
}

impl PaginatedFetcher {
    pub fn new(http: Arc<dyn HttpClient>, config: &ClientConfig) -> FetchResult<Self> {
        Ok(Self {
            http,
            base_url: config.base_url()?,
            timeout: config.timeout,
            max_pages: config.max_pages.max(1),
        })
    }

    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }

    pub fn max_pages(&self) -> usize {
        self.max_pages
    }

    /// Lazily fetch pages starting from `query`.
    ///
    /// The stream ends after the page without a cursor. If page `max_pages` still
    /// has one, that page is yielded and then `PaginationLimitExceeded`. The first
    /// error ends the stream.
    pub fn pages(&self, query: Query) -> impl Stream<Item = FetchResult<Page>> + '_ {
        let initial = PageState::Fetching { query, number: 1 };

        stream::try_unfold(initial, move |state| async move {
            let (query, number) = match state {
                PageState::Fetching { query, number } => (query, number),
                PageState::Exhausted => {
                    return Err(AppError::PaginationLimitExceeded {
                        max_pages: self.max_pages,
                    })
                }
                PageState::Done => return Ok(None),
            };

            let url = query.to_url(&self.base_url)?;
            log::debug!("fetching page {} from {}", number, redact_url(&url));

            let body = get_json(self.http.as_ref(), &url, self.timeout).await?;
            let page = parse_page(number, body)?;

            let next = match page.cursor.as_deref() {
                None => PageState::Done,
                Some(_) if number >= self.max_pages => {
                    log::warn!(
                        "page {} of {} still has a cursor; stopping",
                        number,
                        self.max_pages
                    );
                    PageState::Exhausted
                }
                Some(cursor) => PageState::Fetching {
                    query: query.with_cursor(cursor),
                    number: number + 1,
                },
            };

            Ok(Some((page, next)))
        })
    }

    /// Collect every record of the listing, in page order.
    ///
    /// Fails on the first bad page and returns nothing in that case. `date_range`
    /// drops records outside the interval without refetching anything.
    pub async fn fetch_all(
        &self,
        query: Query,
        date_range: Option<DateRange>,
    ) -> FetchResult<Vec<Record>> {
        let endpoint = query.endpoint().to_string();
        if let Some(range) = &date_range {
            log::debug!(
                "filtering {} on `{}` within {}..={}",
                endpoint,
                range.field(),
                range.start(),
                range.end()
            );
        }
        let pages = self.pages(query);
        futures::pin_mut!(pages);

        let mut records = Vec::new();
        let mut page_count = 0;
        let mut dropped = 0;
        let mut skipped = 0;

        while let Some(page) = pages.try_next().await? {
            page_count += 1;
            skipped += page.skipped;
            for record in page.results {
                match &date_range {
                    Some(range) if !range.contains(&record) => dropped += 1,
                    _ => records.push(record),
                }
            }
        }

        log::info!(
            "fetched {} records from {} over {} page(s), {} outside date range, {} malformed",
            records.len(),
            endpoint,
            page_count,
            dropped,
            skipped
        );

        Ok(records)
    }
}
