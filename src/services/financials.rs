use serde_json::Value;

use crate::client::PolygonClient;
use crate::error::Result;
use crate::fetch::page::ensure_ok;

const FINANCIALS_ENDPOINT: &str = "/vX/reference/financials";

/// Most recent quarterly filings for `ticker`, newest first, as the raw payload.
pub async fn fetch_financials(client: &PolygonClient, ticker: &str, limit: usize) -> Result<Value> {
    let query = client
        .query(FINANCIALS_ENDPOINT)
        .param("ticker", ticker.trim().to_uppercase())
        .param("timeframe", "quarterly")
        .param("limit", limit.max(1))
        .param("sort", "period_of_report_date")
        .param("order", "desc");

    let body = client.get(&query).await?;
    ensure_ok(&body)?;

    Ok(body)
}
