use std::fmt;
use std::time;

use reqwest::{header, StatusCode, Url};
use thiserror::Error;
use tracing::{error, info};

use crate::event::{ApiErrorDetail, LeadPayoutsPage};

pub const LEAD_PAYOUTS_PATH: &str = "/supplyAnalytics/leadPayouts";
const SHOW_CLIENT_TAGS: &str = "showClientTags";

/// 422 detail type meaning no more data is available yet.
const MALFORMED: &str = "malformed";
/// 422 detail type meaning the timestamp was absent or not understood.
const MISSING: &str = "missing";

/// Position in the lead payouts stream to request next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cursor {
    /// An ISO-8601 UTC timestamp (`2021-04-03T20:00:00Z`), passed through verbatim.
    Timestamp(String),
    /// The `nextUrl` handed back with the previous page.
    NextUrl(String),
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Cursor::Timestamp(timestamp) => write!(f, "timestamp={}", timestamp),
            Cursor::NextUrl(url) => write!(f, "{}", url),
        }
    }
}

/// One page of raw events and the cursor to follow, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedPage {
    pub events: Vec<serde_json::Value>,
    pub next_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Page(FetchedPage),
    /// Upstream answered 422 `malformed`: the end of the available data was reached.
    Exhausted(Vec<ApiErrorDetail>),
}

/// Enumeration of faults that end a fetch without a page.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("lead payouts request could not be set up: {0}")]
    Setup(String),
    #[error("lead payouts request was sent but no response was received: {0}")]
    Transport(reqwest::Error),
    #[error("timestamp is missing or its format is incorrect, expected e.g. 2021-04-03T20:00:00Z (status {status}): {details:?}")]
    MissingCursor {
        status: u16,
        details: Vec<ApiErrorDetail>,
    },
    #[error("lead payouts endpoint responded with status {status}: {body}")]
    Upstream { status: u16, body: String },
    #[error("lead payouts response body could not be decoded: {0}")]
    InvalidBody(String),
}

impl FetchError {
    pub fn category(&self) -> &'static str {
        match self {
            FetchError::Setup(_) => "setup",
            FetchError::Transport(_) => "transport",
            FetchError::MissingCursor { .. } => "missing_cursor",
            FetchError::Upstream { .. } => "upstream",
            FetchError::InvalidBody(_) => "invalid_body",
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::MissingCursor { status, .. } | FetchError::Upstream { status, .. } => {
                Some(*status)
            }
            _ => None,
        }
    }
}

/// Log a fetch fault with its category and upstream status, if there was one.
pub fn log_fetch_error(e: &FetchError) {
    match e.status() {
        Some(status) => error!(category = e.category(), status, "{}", e),
        None => error!(category = e.category(), "{}", e),
    }
}

/// Authenticated client for the supply analytics lead payouts endpoint.
pub struct LeadPayoutsClient {
    client: reqwest::Client,
    host: Url,
    bearer_token: String,
}

impl LeadPayoutsClient {
    pub fn new(
        host: &str,
        bearer_token: &str,
        request_timeout: time::Duration,
    ) -> Result<Self, FetchError> {
        let host: Url = host
            .parse()
            .map_err(|e: url::ParseError| FetchError::Setup(format!("invalid host {host}: {e}")))?;

        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/json"),
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(request_timeout)
            .build()
            .map_err(|e| FetchError::Setup(e.to_string()))?;

        Ok(Self {
            client,
            host,
            bearer_token: bearer_token.to_owned(),
        })
    }

    /// Resolve a cursor into the URL to request. Next-page URLs may be absolute or relative
    /// to the configured host. `showClientTags=true` is appended unless already present.
    pub fn cursor_url(&self, cursor: &Cursor) -> Result<Url, FetchError> {
        let mut url = match cursor {
            Cursor::Timestamp(timestamp) => {
                let mut url = self
                    .host
                    .join(LEAD_PAYOUTS_PATH)
                    .map_err(|e| FetchError::Setup(e.to_string()))?;
                url.query_pairs_mut().append_pair("timestamp", timestamp);
                url
            }
            Cursor::NextUrl(next) => self
                .host
                .join(next)
                .map_err(|e| FetchError::Setup(format!("invalid next url {next}: {e}")))?,
        };

        if !url.query_pairs().any(|(key, _)| key == SHOW_CLIENT_TAGS) {
            url.query_pairs_mut().append_pair(SHOW_CLIENT_TAGS, "true");
        }

        Ok(url)
    }

    /// Request one page. A 422 `malformed` answer is the expected end of the stream and comes
    /// back as `FetchOutcome::Exhausted`, not as an error.
    pub async fn fetch_page(&self, cursor: &Cursor) -> Result<FetchOutcome, FetchError> {
        let result = self.request_page(cursor).await;

        match &result {
            Ok(FetchOutcome::Page(_)) => {
                metrics::counter!("lead_payouts_pages_fetched").increment(1);
            }
            Ok(FetchOutcome::Exhausted(_)) => {}
            Err(e) => {
                metrics::counter!("lead_payouts_fetch_errors", &[("category", e.category())])
                    .increment(1);
            }
        }

        result
    }

    async fn request_page(&self, cursor: &Cursor) -> Result<FetchOutcome, FetchError> {
        let url = self.cursor_url(cursor)?;
        info!(%url, "attempting lead payouts request");

        let response = self
            .client
            .get(url)
            .bearer_auth(&self.bearer_token)
            .send()
            .await
            .map_err(|e| {
                if e.is_builder() {
                    FetchError::Setup(e.to_string())
                } else {
                    FetchError::Transport(e)
                }
            })?;

        let status = response.status();

        if status.is_success() {
            let page: LeadPayoutsPage = response
                .json()
                .await
                .map_err(|e| FetchError::InvalidBody(e.to_string()))?;

            return Ok(FetchOutcome::Page(FetchedPage {
                events: page.data,
                next_url: page.next_url,
            }));
        }

        let body = response.text().await.map_err(FetchError::Transport)?;

        classify_error_response(status, &body)
    }
}

/// Sort a non-2xx response into the terminal outcome or one of the fetch faults.
/// When several details are listed the last one decides.
fn classify_error_response(status: StatusCode, body: &str) -> Result<FetchOutcome, FetchError> {
    if status == StatusCode::UNPROCESSABLE_ENTITY {
        if let Ok(details) = serde_json::from_str::<Vec<ApiErrorDetail>>(body) {
            match details.last().map(|detail| detail.kind.as_str()) {
                Some(MALFORMED) => return Ok(FetchOutcome::Exhausted(details)),
                Some(MISSING) => {
                    return Err(FetchError::MissingCursor {
                        status: status.as_u16(),
                        details,
                    })
                }
                _ => {}
            }
        }
    }

    Err(FetchError::Upstream {
        status: status.as_u16(),
        body: body.to_owned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::Method::GET;
    use httpmock::MockServer;
    use serde_json::json;

    const TOKEN: &str = "test-token";
    const TIMESTAMP: &str = "2021-01-21T20:00:00Z";

    fn client_for(server: &MockServer) -> LeadPayoutsClient {
        LeadPayoutsClient::new(&server.base_url(), TOKEN, time::Duration::from_secs(5))
            .expect("failed to build client")
    }

    #[tokio::test]
    async fn test_fetch_page() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path(LEAD_PAYOUTS_PATH)
                    .query_param("timestamp", TIMESTAMP)
                    .query_param("showClientTags", "true")
                    .header("authorization", "Bearer test-token")
                    .header("accept", "application/json");
                then.status(200).json_body(json!({
                    "data": [
                        {"payoutInCents": 85, "leadUuid": "a", "clientTagJson": []},
                        {"payoutInCents": 90, "leadUuid": "b", "clientTagJson": []}
                    ],
                    "nextUrl": "/supplyAnalytics/leadPayouts?cursor=next"
                }));
            })
            .await;

        let outcome = client_for(&server)
            .fetch_page(&Cursor::Timestamp(TIMESTAMP.to_owned()))
            .await
            .expect("fetch failed");

        mock.assert_async().await;
        match outcome {
            FetchOutcome::Page(page) => {
                assert_eq!(page.events.len(), 2);
                assert_eq!(
                    page.next_url.as_deref(),
                    Some("/supplyAnalytics/leadPayouts?cursor=next")
                );
            }
            other => panic!("expected a page, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_malformed_is_exhaustion() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path(LEAD_PAYOUTS_PATH);
                then.status(422).json_body(json!([
                    {"type": "malformed", "message": "no data available after cursor"}
                ]));
            })
            .await;

        let outcome = client_for(&server)
            .fetch_page(&Cursor::Timestamp(TIMESTAMP.to_owned()))
            .await
            .expect("exhaustion must not be an error");

        assert_eq!(
            outcome,
            FetchOutcome::Exhausted(vec![ApiErrorDetail {
                kind: "malformed".to_owned(),
                message: "no data available after cursor".to_owned(),
            }])
        );
    }

    #[tokio::test]
    async fn test_missing_is_caller_fault() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path(LEAD_PAYOUTS_PATH);
                then.status(422)
                    .json_body(json!([{"type": "missing", "message": "timestamp is required"}]));
            })
            .await;

        let err = client_for(&server)
            .fetch_page(&Cursor::Timestamp("yesterday".to_owned()))
            .await
            .expect_err("missing must be an error");

        assert!(matches!(err, FetchError::MissingCursor { status: 422, .. }));
        assert_eq!(err.category(), "missing_cursor");
    }

    #[tokio::test]
    async fn test_last_detail_decides() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path(LEAD_PAYOUTS_PATH);
                then.status(422).json_body(json!([
                    {"type": "missing", "message": "a"},
                    {"type": "malformed", "message": "b"}
                ]));
            })
            .await;

        let outcome = client_for(&server)
            .fetch_page(&Cursor::Timestamp(TIMESTAMP.to_owned()))
            .await
            .expect("last detail is malformed");

        assert!(matches!(outcome, FetchOutcome::Exhausted(details) if details.len() == 2));
    }

    #[tokio::test]
    async fn test_other_statuses_are_upstream_faults() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path(LEAD_PAYOUTS_PATH);
                then.status(401).body("invalid token");
            })
            .await;

        let err = client_for(&server)
            .fetch_page(&Cursor::Timestamp(TIMESTAMP.to_owned()))
            .await
            .expect_err("401 must be an error");

        match err {
            FetchError::Upstream { status, body } => {
                assert_eq!(status, 401);
                assert_eq!(body, "invalid token");
            }
            other => panic!("expected upstream fault, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unknown_422_is_upstream_fault() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path(LEAD_PAYOUTS_PATH);
                then.status(422).json_body(json!([{"type": "invalid", "message": "?"}]));
            })
            .await;

        let err = client_for(&server)
            .fetch_page(&Cursor::Timestamp(TIMESTAMP.to_owned()))
            .await
            .expect_err("unknown 422 must be an error");

        assert_eq!(err.status(), Some(422));
        assert_eq!(err.category(), "upstream");
    }

    #[tokio::test]
    async fn test_undecodable_body() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path(LEAD_PAYOUTS_PATH);
                then.status(200).body("<html>maintenance</html>");
            })
            .await;

        let err = client_for(&server)
            .fetch_page(&Cursor::Timestamp(TIMESTAMP.to_owned()))
            .await
            .expect_err("html is not a page");

        assert_eq!(err.category(), "invalid_body");
    }

    #[tokio::test]
    async fn test_no_response_is_transport_fault() {
        // Bind and release a port so nothing is listening on it.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let client = LeadPayoutsClient::new(
            &format!("http://127.0.0.1:{port}"),
            TOKEN,
            time::Duration::from_secs(5),
        )
        .unwrap();

        let err = client
            .fetch_page(&Cursor::Timestamp(TIMESTAMP.to_owned()))
            .await
            .expect_err("nothing is listening");

        assert!(matches!(err, FetchError::Transport(_)));
    }

    #[test]
    fn test_invalid_host_is_setup_fault() {
        let result = LeadPayoutsClient::new("not a host", TOKEN, time::Duration::from_secs(5));
        assert!(matches!(result, Err(FetchError::Setup(_))));
    }

    #[test]
    fn test_cursor_url() {
        let client =
            LeadPayoutsClient::new("https://api.example.com", TOKEN, time::Duration::from_secs(5))
                .unwrap();

        let url = client
            .cursor_url(&Cursor::Timestamp(TIMESTAMP.to_owned()))
            .unwrap();
        assert_eq!(url.path(), LEAD_PAYOUTS_PATH);
        assert_eq!(
            url.query_pairs().find(|(k, _)| k == "timestamp").map(|(_, v)| v.into_owned()),
            Some(TIMESTAMP.to_owned())
        );

        let relative = client
            .cursor_url(&Cursor::NextUrl("/supplyAnalytics/leadPayouts?cursor=x".to_owned()))
            .unwrap();
        assert_eq!(
            relative.as_str(),
            "https://api.example.com/supplyAnalytics/leadPayouts?cursor=x&showClientTags=true"
        );

        let absolute = client
            .cursor_url(&Cursor::NextUrl(
                "https://other.example.com/supplyAnalytics/leadPayouts?cursor=y".to_owned(),
            ))
            .unwrap();
        assert_eq!(absolute.host_str(), Some("other.example.com"));
    }

    #[test]
    fn test_show_client_tags_is_not_repeated() {
        let client =
            LeadPayoutsClient::new("https://api.example.com", TOKEN, time::Duration::from_secs(5))
                .unwrap();

        let timestamp = client
            .cursor_url(&Cursor::Timestamp(TIMESTAMP.to_owned()))
            .unwrap();
        assert_eq!(
            timestamp.query_pairs().filter(|(k, _)| k == "showClientTags").count(),
            1
        );

        let next = client
            .cursor_url(&Cursor::NextUrl(
                "/supplyAnalytics/leadPayouts?cursor=x&showClientTags=true".to_owned(),
            ))
            .unwrap();
        assert_eq!(
            next.as_str(),
            "https://api.example.com/supplyAnalytics/leadPayouts?cursor=x&showClientTags=true"
        );
    }

    #[tokio::test]
    async fn test_next_url_with_client_tags_is_sent_once() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path(LEAD_PAYOUTS_PATH)
                    .query_param("cursor", "2")
                    .matches(|req| {
                        req.query_params
                            .as_ref()
                            .map(|params| {
                                params.iter().filter(|(k, _)| k == "showClientTags").count()
                            })
                            == Some(1)
                    });
                then.status(200).json_body(json!({"data": [], "nextUrl": null}));
            })
            .await;

        client_for(&server)
            .fetch_page(&Cursor::NextUrl(
                "/supplyAnalytics/leadPayouts?cursor=2&showClientTags=true".to_owned(),
            ))
            .await
            .expect("fetch failed");

        mock.assert_async().await;
    }
}
