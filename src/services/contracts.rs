use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;

use crate::client::PolygonClient;
use crate::error::{AppError, Result};
use crate::fetch::decode::{record_date, str_field};
use crate::fetch::page::parse_page;
use crate::fetch::{DateRange, Record, SnapshotBatch, SnapshotRequest};

const CONTRACTS_ENDPOINT: &str = "/v3/reference/options/contracts";
/// Largest page size the contracts endpoint accepts.
const CONTRACTS_PAGE_LIMIT: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractType {
    Call,
    Put,
}

impl ContractType {
    pub fn as_str(self) -> &'static str {
        match self {
            ContractType::Call => "call",
            ContractType::Put => "put",
        }
    }
}

impl FromStr for ContractType {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "call" => Ok(ContractType::Call),
            "put" => Ok(ContractType::Put),
            _ => Err(AppError::message(format!(
                "contract type must be either 'call' or 'put', got `{value}`"
            ))),
        }
    }
}

impl fmt::Display for ContractType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Look up the exact ticker the API uses for one contract instead of
/// assembling it by hand.
pub async fn resolve_option_ticker(
    client: &PolygonClient,
    underlying: &str,
    expiration: NaiveDate,
    strike: f64,
    contract_type: ContractType,
) -> Result<String> {
    let query = client
        .query(CONTRACTS_ENDPOINT)
        .param("underlying_ticker", underlying)
        .param("expiration_date", expiration)
        .param("strike_price", strike)
        .param("contract_type", contract_type)
        .param("limit", 1);

    let page = parse_page(1, client.get(&query).await?)?;

    page.results
        .first()
        .and_then(|contract| str_field(contract, "ticker"))
        .map(str::to_string)
        .ok_or_else(|| {
            AppError::NotFound(format!(
                "No {contract_type} contract found for {underlying} expiring {expiration} at strike {strike}"
            ))
        })
}

/// Every listed contract for `underlying`, optionally narrowed to one expiry and side.
pub async fn list_contracts(
    client: &PolygonClient,
    underlying: &str,
    expiration: Option<NaiveDate>,
    contract_type: Option<ContractType>,
) -> Result<Vec<Record>> {
    let query = client
        .query(CONTRACTS_ENDPOINT)
        .param("underlying_ticker", underlying)
        .param_opt("expiration_date", expiration)
        .param_opt("contract_type", contract_type)
        .param("limit", CONTRACTS_PAGE_LIMIT);

    client.paginator().fetch_all(query, None).await
}

/// Distinct expiration dates of unexpired contracts falling inside `range`, ascending.
pub async fn expiry_dates(
    client: &PolygonClient,
    underlying: &str,
    range: DateRange,
) -> Result<Vec<NaiveDate>> {
    let query = client
        .query(CONTRACTS_ENDPOINT)
        .param("underlying_ticker", underlying)
        .param("expired", false)
        .param("limit", CONTRACTS_PAGE_LIMIT);

    let contracts = client
        .paginator()
        .fetch_all(query, Some(range.on_field("expiration_date")))
        .await?;

    let dates: BTreeSet<NaiveDate> = contracts
        .iter()
        .filter_map(|contract| contract.get("expiration_date").and_then(record_date))
        .collect();

    Ok(dates.into_iter().collect())
}

/// List the contracts of one expiry and fetch snapshots for the first `limit` of them.
pub async fn chain_snapshots(
    client: &PolygonClient,
    underlying: &str,
    expiration: NaiveDate,
    contract_type: Option<ContractType>,
    limit: usize,
) -> Result<SnapshotBatch> {
    let contracts = list_contracts(client, underlying, Some(expiration), contract_type).await?;

    let requests: Vec<SnapshotRequest> = contracts
        .iter()
        .filter_map(SnapshotRequest::from_contract)
        .take(limit)
        .collect();

    log::info!(
        "requesting {} of {} {} contracts expiring {}",
        requests.len(),
        contracts.len(),
        underlying,
        expiration
    );

    Ok(client
        .snapshots()
        .fetch_snapshots(requests, client.config().concurrency_limit)
        .await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ApiKey, ClientConfig};
    use crate::fetch::http::testing::{Scripted, ScriptedHttpClient};
    use serde_json::json;
    use std::sync::Arc;

    fn client(http: Arc<ScriptedHttpClient>) -> PolygonClient {
        PolygonClient::with_http_client(ClientConfig::new(ApiKey::new("test-key")), http).unwrap()
    }

    fn date(value: &str) -> NaiveDate {
        NaiveDate::parse_from_str(value, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn parses_contract_type() {
        assert_eq!("CALL".parse::<ContractType>().unwrap(), ContractType::Call);
        assert_eq!(" put ".parse::<ContractType>().unwrap(), ContractType::Put);
        assert!("straddle".parse::<ContractType>().is_err());
    }

    #[tokio::test]
    async fn resolves_ticker_from_first_contract() {
        let http = Arc::new(ScriptedHttpClient::sequence([Scripted::Json(json!({
            "status": "OK",
            "results": [{"ticker": "O:SPY250115C00500000", "strike_price": 500}]
        }))]));
        let client = client(http.clone());

        let ticker = resolve_option_ticker(&client, "SPY", date("2025-01-15"), 500.0, ContractType::Call)
            .await
            .unwrap();

        assert_eq!(ticker, "O:SPY250115C00500000");
        let query = http.requests()[0].query().unwrap().to_string();
        assert!(query.contains("expiration_date=2025-01-15"), "{query}");
        assert!(query.contains("strike_price=500"), "{query}");
        assert!(query.contains("contract_type=call"), "{query}");
        assert!(query.contains("limit=1"), "{query}");
    }

    #[tokio::test]
    async fn missing_contract_is_not_found() {
        let http = Arc::new(ScriptedHttpClient::sequence([Scripted::Json(
            json!({"status": "OK", "results": []}),
        )]));
        let client = client(http);

        let err = resolve_option_ticker(&client, "SPY", date("2025-01-15"), 1.0, ContractType::Put)
            .await
            .expect_err("should fail");

        assert!(matches!(err, AppError::NotFound(_)));
        assert!(err.to_string().contains("No put contract found for SPY"));
    }

    #[tokio::test]
    async fn expiry_dates_are_unique_sorted_and_in_range() {
        let http = Arc::new(ScriptedHttpClient::sequence([
            Scripted::Json(json!({
                "status": "OK",
                "results": [
                    {"ticker": "a", "expiration_date": "2025-03-21"},
                    {"ticker": "b", "expiration_date": "2025-01-17"},
                    {"ticker": "c", "expiration_date": "2025-03-21"}
                ],
                "next_url": "https://api.polygon.io/v3/reference/options/contracts?cursor=2"
            })),
            Scripted::Json(json!({
                "status": "OK",
                "results": [
                    {"ticker": "d", "expiration_date": "2025-02-21"},
                    {"ticker": "e", "expiration_date": "2026-01-16"}
                ]
            })),
        ]));
        let client = client(http.clone());
        let range = DateRange::parse("2025-01-24", "2025-12-19").unwrap();

        let dates = expiry_dates(&client, "SPY", range).await.unwrap();

        assert_eq!(dates, vec![date("2025-02-21"), date("2025-03-21")]);
        assert!(http.requests()[0].query().unwrap().contains("expired=false"));
    }

    #[tokio::test]
    async fn chain_snapshots_fans_out_over_listed_contracts() {
        let http = Arc::new(ScriptedHttpClient::by_path([
            (
                CONTRACTS_ENDPOINT.to_string(),
                Scripted::Json(json!({
                    "status": "OK",
                    "results": [
                        {"underlying_ticker": "SPY", "ticker": "O:SPY1"},
                        {"underlying_ticker": "SPY", "ticker": "O:SPY2"},
                        {"underlying_ticker": "SPY", "ticker": "O:SPY3"}
                    ]
                })),
            ),
            (
                "/v3/snapshot/options/SPY/O:SPY1".to_string(),
                Scripted::Json(json!({"status": "OK", "results": {"details": {"ticker": "O:SPY1"}}})),
            ),
            (
                "/v3/snapshot/options/SPY/O:SPY2".to_string(),
                Scripted::Fail("reset".into()),
            ),
        ]));
        let client = client(http.clone());

        let batch = chain_snapshots(&client, "SPY", date("2025-01-08"), None, 2)
            .await
            .unwrap();

        assert_eq!(batch.requested, 2);
        assert_eq!(batch.snapshots.len(), 1);
        assert_eq!(batch.missing(), 1);
        assert_eq!(http.request_count(), 3);
    }
}
