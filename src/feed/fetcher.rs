use futures::StreamExt;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// ODIN's public alarm feed. Not user-editable.
pub const DEFAULT_FEED_URL: &str = "https://www.odin.dk/RSS/RSS.aspx";

/// Query parameter selecting the alarm group.
pub const IDENTIFIER_PARAM: &str = "beredskabsID";
/// Query parameter selecting the station.
pub const STATION_PARAM: &str = "enhed";
/// Query parameter asking the server for at most this many items.
pub const COUNT_PARAM: &str = "antal";

const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Errors that can occur while fetching the feed.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Attempt exceeded the per-attempt timeout
    #[error("Request timed out")]
    Timeout,
    /// Response body exceeded the 10MB size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// The feed URL could not be parsed
    #[error("Invalid feed URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// Every attempt failed; `last` is the error from the final one
    #[error("Giving up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: Box<FetchError> },
}

impl FetchError {
    /// The error of the final attempt, unwrapping [`FetchError::Exhausted`].
    pub fn last_error(&self) -> &FetchError {
        match self {
            FetchError::Exhausted { last, .. } => last.last_error(),
            other => other,
        }
    }
}

/// Returned when the HTTP client itself cannot be built.
///
/// This is the only failure that escapes the pipeline; the host should treat
/// it as "not ready yet" and try setting up again later.
#[derive(Debug, Error)]
#[error("HTTP client unavailable: {0}")]
pub struct NotReady(#[from] reqwest::Error);

/// Where to fetch the feed from: a base URL plus ordered query parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedSource {
    url: String,
    params: Vec<(String, String)>,
}

impl FeedSource {
    /// A source with no query parameters. A trailing `/` is dropped.
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            url: url.trim_end_matches('/').to_string(),
            params: Vec::new(),
        }
    }

    /// The ODIN alarm query: `beredskabsID`, `enhed`, `antal`, in that order,
    /// each only when non-empty / non-zero.
    pub fn alarms(url: impl Into<String>, identifier: &str, station: &str, count: u8) -> Self {
        let mut source = Self::new(url);
        if !identifier.is_empty() {
            source = source.param(IDENTIFIER_PARAM, identifier);
        }
        if !station.is_empty() {
            source = source.param(STATION_PARAM, station);
        }
        if count != 0 {
            source = source.param(COUNT_PARAM, count.to_string());
        }
        source
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((name.into(), value.into()));
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }

    /// Builds the full request URL with the query parameters appended.
    pub fn request_url(&self) -> Result<Url, FetchError> {
        let mut url = Url::parse(&self.url)?;
        if !self.params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (name, value) in &self.params {
                pairs.append_pair(name, value);
            }
        }
        Ok(url)
    }
}

/// Attempt count and timing for feed fetches.
///
/// Everything is measured in multiples of `time_unit` (one second in
/// production): each attempt may take 10 units, and failed attempt `n` is
/// followed by a `2^n` unit pause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub time_unit: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            time_unit: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    const ATTEMPT_TIMEOUT_UNITS: u32 = 10;

    /// Default attempt count with a different time unit.
    pub fn with_time_unit(time_unit: Duration) -> Self {
        Self {
            time_unit,
            ..Self::default()
        }
    }

    pub fn attempt_timeout(&self) -> Duration {
        self.time_unit.saturating_mul(Self::ATTEMPT_TIMEOUT_UNITS)
    }

    /// Pause after failed attempt `attempt` (1-based): 2, 4, 8, ... units.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.time_unit.saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// HTTP fetcher with per-attempt timeout and exponential backoff.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    policy: RetryPolicy,
}

impl Fetcher {
    /// Builds a fetcher with its own HTTP client.
    ///
    /// # Errors
    ///
    /// Returns [`NotReady`] if the TLS backend or resolver cannot be
    /// initialised.
    pub fn new(policy: RetryPolicy) -> Result<Self, NotReady> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("odin-feed/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self::with_client(client, policy))
    }

    pub fn with_client(client: reqwest::Client, policy: RetryPolicy) -> Self {
        Self { client, policy }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Fetches the raw feed body.
    ///
    /// Any failed attempt (network error, timeout, non-2xx status, oversized
    /// body) is logged and retried after a backoff pause, up to
    /// `max_attempts` attempts in total. The pause also follows the final
    /// failure, so three failures cost 2 + 4 + 8 units before the error is
    /// returned.
    ///
    /// # Errors
    ///
    /// - [`FetchError::InvalidUrl`] - the source URL does not parse (not retried)
    /// - [`FetchError::Exhausted`] - every attempt failed; wraps the last error
    pub async fn fetch(&self, source: &FeedSource) -> Result<Vec<u8>, FetchError> {
        let url = source.request_url().inspect_err(|e| {
            tracing::error!(url = %source.url(), error = %e, "Feed URL is invalid");
        })?;
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;

        let last = loop {
            match self.fetch_once(&url).await {
                Ok(bytes) => {
                    if attempt > 1 {
                        tracing::info!(url = %url, attempt = attempt, "Feed fetched after retry");
                    }
                    return Ok(bytes);
                }
                Err(e) => {
                    let delay = self.policy.backoff(attempt);
                    tracing::warn!(
                        url = %url,
                        attempt = attempt,
                        max_attempts = max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Feed fetch attempt failed"
                    );
                    tokio::time::sleep(delay).await;
                    if attempt >= max_attempts {
                        break e;
                    }
                    attempt += 1;
                }
            }
        };

        tracing::error!(
            url = %url,
            attempts = max_attempts,
            error = %last,
            "All feed fetch attempts failed"
        );
        Err(FetchError::Exhausted {
            attempts: max_attempts,
            last: Box::new(last),
        })
    }

    /// One attempt; the timeout covers both the request and the body read.
    async fn fetch_once(&self, url: &Url) -> Result<Vec<u8>, FetchError> {
        tokio::time::timeout(self.policy.attempt_timeout(), self.get_body(url))
            .await
            .map_err(|_| FetchError::Timeout)?
    }

    async fn get_body(&self, url: &Url) -> Result<Vec<u8>, FetchError> {
        let response = self.client.get(url.clone()).send().await?;
        if !response.status().is_success() {
            return Err(FetchError::HttpStatus(response.status().as_u16()));
        }
        read_limited_bytes(response, MAX_FEED_SIZE).await
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    // Fast path: check Content-Length header
    if let Some(len) = response.content_length() {
        if len > limit as u64 {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(FetchError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}
