use std::time;

use serde::Serialize;
use thiserror::Error;
use tracing::{error, info};

/// A postback that was delivered, as recorded in the dispatch log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PostbackOutcome {
    pub url: String,
    pub status_code: u16,
}

/// Enumeration of reasons a single postback was not delivered.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("error parsing postback url: {0}")]
    InvalidUrl(url::ParseError),
    #[error("postback request timed out: {0}")]
    Timeout(reqwest::Error),
    #[error("postback could not be delivered: {0}")]
    Connection(reqwest::Error),
    #[error("postback receiver responded with status {0}")]
    BadStatus(u16),
}

impl DispatchError {
    pub fn kind(&self) -> &'static str {
        match self {
            DispatchError::InvalidUrl(_) => "invalid_url",
            DispatchError::Timeout(_) => "timeout",
            DispatchError::Connection(_) => "connection",
            DispatchError::BadStatus(_) => "bad_status",
        }
    }
}

/// Postbacks boil down to a GET, so most failures come straight from reqwest.
/// Anything that isn't a timeout or a status is treated as a connection failure.
impl From<reqwest::Error> for DispatchError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            DispatchError::Timeout(error)
        } else if let Some(status) = error.status() {
            DispatchError::BadStatus(status.as_u16())
        } else {
            DispatchError::Connection(error)
        }
    }
}

/// Fires postback GETs one at a time.
pub struct PostbackDispatcher {
    client: reqwest::Client,
}

impl PostbackDispatcher {
    pub fn new(request_timeout: time::Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;

        Ok(Self { client })
    }

    /// Send one postback. Any 2xx counts as delivered and the body is ignored.
    pub async fn send(&self, url: &str) -> Result<PostbackOutcome, DispatchError> {
        let parsed: reqwest::Url = url.parse().map_err(DispatchError::InvalidUrl)?;

        let response = self.client.get(parsed).send().await?;
        let status = response.status();

        if !status.is_success() {
            return Err(DispatchError::BadStatus(status.as_u16()));
        }

        Ok(PostbackOutcome {
            url: url.to_owned(),
            status_code: status.as_u16(),
        })
    }

    /// Send every postback exactly once, in order. Failures are logged and left out of the
    /// returned log, so it may hold fewer entries than `urls`.
    pub async fn dispatch(&self, urls: &[String]) -> Vec<PostbackOutcome> {
        let mut outcomes = Vec::with_capacity(urls.len());

        for url in urls {
            let now = tokio::time::Instant::now();
            let result = self.send(url).await;
            let elapsed = now.elapsed().as_secs_f64();

            match result {
                Ok(outcome) => {
                    info!(url = %outcome.url, status = outcome.status_code, "postback sent");
                    metrics::counter!("postbacks_sent").increment(1);
                    metrics::histogram!("postback_duration_seconds").record(elapsed);
                    outcomes.push(outcome);
                }
                Err(e) => {
                    error!(url = %url, kind = e.kind(), "postback failed: {}", e);
                    metrics::counter!("postbacks_failed", &[("kind", e.kind())]).increment(1);
                }
            }
        }

        outcomes
    }
}
