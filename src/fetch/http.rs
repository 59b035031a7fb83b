use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use reqwest::Url;
use serde_json::Value;

use crate::error::AppError;

use super::FetchResult;

/// Raw HTTP answer handed back by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn ok_json(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }

    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

/// Transport seam used by every fetcher so tests can swap in a scripted double.
pub trait HttpClient: Send + Sync {
    fn get<'a>(&'a self, url: &'a Url, timeout: Duration) -> BoxFuture<'a, FetchResult<HttpResponse>>;
}

/// Production transport backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestHttpClient {
    client: reqwest::Client,
}

impl ReqwestHttpClient {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .user_agent(concat!("polygon-cli/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client }
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    pub fn shared() -> Arc<dyn HttpClient> {
        Arc::new(Self::new())
    }
}

impl Default for ReqwestHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient for ReqwestHttpClient {
    fn get<'a>(&'a self, url: &'a Url, timeout: Duration) -> BoxFuture<'a, FetchResult<HttpResponse>> {
        Box::pin(async move {
            let transport = |err: reqwest::Error| AppError::Transport {
                url: redact_url(url),
                message: if err.is_timeout() {
                    format!("timed out after {}s", timeout.as_secs_f32())
                } else {
                    err.without_url().to_string()
                },
            };

            let response = self
                .client
                .get(url.clone())
                .timeout(timeout)
                .send()
                .await
                .map_err(transport)?;

            let status = response.status().as_u16();
            let body = response.text().await.map_err(transport)?;

            Ok(HttpResponse { status, body })
        })
    }
}

/// Issue a GET and decode the JSON body, classifying failures.
///
/// Transport problems surface as [`AppError::Transport`]. A non-2xx HTTP status
/// becomes [`AppError::BadStatus`], preferring the `status`/`error` fields the
/// API puts in its error bodies. A 2xx body that is not JSON is [`AppError::Decode`].
pub async fn get_json(
    client: &dyn HttpClient,
    url: &Url,
    timeout: Duration,
) -> FetchResult<Value> {
    let response = client.get(url, timeout).await?;
    let parsed = serde_json::from_str::<Value>(&response.body);

    if !response.is_success() {
        let (status, detail) = match &parsed {
            Ok(body) => (
                body.get("status")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("HTTP {}", response.status)),
                error_detail(body),
            ),
            Err(_) => (format!("HTTP {}", response.status), None),
        };
        return Err(AppError::bad_status(status, detail));
    }

    parsed.map_err(|err| AppError::Decode {
        url: redact_url(url),
        message: err.to_string(),
    })
}

/// Human readable error text from an API error body, if any.
pub fn error_detail(body: &Value) -> Option<String> {
    ["error", "message"]
        .iter()
        .find_map(|key| body.get(*key).and_then(Value::as_str))
        .map(str::to_string)
}

/// Render a URL for logs with the credential masked.
pub fn redact_url(url: &Url) -> String {
    if !url.query_pairs().any(|(key, _)| key == "apiKey") {
        return url.to_string();
    }

    let mut redacted = url.clone();
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(key, value)| {
            let value = if key == "apiKey" {
                "***".to_string()
            } else {
                value.into_owned()
            };
            (key.into_owned(), value)
        })
        .collect();
    redacted.query_pairs_mut().clear().extend_pairs(pairs);
    redacted.to_string()
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;

    /// Canned outcome for one request.
    #[derive(Debug, Clone)]
    pub enum Scripted {
        Json(Value),
        Status(u16, String),
        Fail(String),
    }

    /// Replays responses either in call order or keyed by URL path, recording every URL.
    #[derive(Default)]
    pub struct ScriptedHttpClient {
        queue: Mutex<VecDeque<Scripted>>,
        by_path: Mutex<HashMap<String, Scripted>>,
        requests: Mutex<Vec<Url>>,
        delay: Option<Duration>,
        in_flight: AtomicUsize,
        peak_in_flight: AtomicUsize,
    }

    impl ScriptedHttpClient {
        pub fn sequence(responses: impl IntoIterator<Item = Scripted>) -> Self {
            Self {
                queue: Mutex::new(responses.into_iter().collect()),
                ..Self::default()
            }
        }

        pub fn by_path(responses: impl IntoIterator<Item = (String, Scripted)>) -> Self {
            Self {
                by_path: Mutex::new(responses.into_iter().collect()),
                ..Self::default()
            }
        }

        /// A client answering every request with the same body.
        pub fn repeating(body: Value) -> Self {
            Self::by_path([("*".to_string(), Scripted::Json(body))])
        }

        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        pub fn requests(&self) -> Vec<Url> {
            self.requests.lock().unwrap().clone()
        }

        pub fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }

        pub fn peak_in_flight(&self) -> usize {
            self.peak_in_flight.load(Ordering::SeqCst)
        }

        fn next_for(&self, url: &Url) -> Option<Scripted> {
            if let Some(next) = self.queue.lock().unwrap().pop_front() {
                return Some(next);
            }
            let by_path = self.by_path.lock().unwrap();
            by_path
                .get(url.path())
                .or_else(|| by_path.get("*"))
                .cloned()
        }
    }

    impl HttpClient for ScriptedHttpClient {
        fn get<'a>(
            &'a self,
            url: &'a Url,
            _timeout: Duration,
        ) -> BoxFuture<'a, FetchResult<HttpResponse>> {
            Box::pin(async move {
                self.requests.lock().unwrap().push(url.clone());
                let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                self.peak_in_flight.fetch_max(current, Ordering::SeqCst);

                if let Some(delay) = self.delay {
                    tokio::time::sleep(delay).await;
                }
                let outcome = self.next_for(url);
                self.in_flight.fetch_sub(1, Ordering::SeqCst);

                match outcome {
                    Some(Scripted::Json(body)) => Ok(HttpResponse::ok_json(body.to_string())),
                    Some(Scripted::Status(status, body)) => Ok(HttpResponse { status, body }),
                    Some(Scripted::Fail(message)) => Err(AppError::Transport {
                        url: redact_url(url),
                        message,
                    }),
                    None => Err(AppError::Transport {
                        url: redact_url(url),
                        message: "no scripted response".to_string(),
                    }),
                }
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{Scripted, ScriptedHttpClient};
    use super::*;
    use serde_json::json;

    fn url(raw: &str) -> Url {
        Url::parse(raw).unwrap()
    }

    #[tokio::test]
    async fn decodes_json_body() {
        let client = ScriptedHttpClient::sequence([Scripted::Json(json!({"status": "OK"}))]);
        let body = get_json(&client, &url("https://x.test/a"), Duration::from_secs(1))
            .await
            .expect("json body");
        assert_eq!(body["status"], "OK");
    }

    #[tokio::test]
    async fn http_error_uses_body_status() {
        let client = ScriptedHttpClient::sequence([Scripted::Status(
            403,
            json!({"status": "NOT_AUTHORIZED", "message": "plan too low"}).to_string(),
        )]);
        let err = get_json(&client, &url("https://x.test/a"), Duration::from_secs(1))
            .await
            .expect_err("should fail");
        match err {
            AppError::BadStatus { status, detail } => {
                assert_eq!(status, "NOT_AUTHORIZED");
                assert_eq!(detail.as_deref(), Some("plan too low"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn http_error_without_json_reports_code() {
        let client =
            ScriptedHttpClient::sequence([Scripted::Status(502, "bad gateway".to_string())]);
        let err = get_json(&client, &url("https://x.test/a"), Duration::from_secs(1))
            .await
            .expect_err("should fail");
        assert!(matches!(err, AppError::BadStatus { ref status, .. } if status == "HTTP 502"));
    }

    #[tokio::test]
    async fn invalid_json_is_a_decode_error() {
        let client = ScriptedHttpClient::sequence([Scripted::Status(200, "<html>".to_string())]);
        let err = get_json(&client, &url("https://x.test/a"), Duration::from_secs(1))
            .await
            .expect_err("should fail");
        assert!(matches!(err, AppError::Decode { .. }), "unexpected: {err}");
    }

    #[test]
    fn redacts_api_key() {
        let rendered = redact_url(&url("https://x.test/a?ticker=SPY&apiKey=secret"));
        assert!(!rendered.contains("secret"));
        assert!(rendered.contains("ticker=SPY"));
        assert!(rendered.contains("apiKey=***") || rendered.contains("apiKey=%2A%2A%2A"));
    }
}
