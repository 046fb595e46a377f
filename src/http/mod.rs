// Blocking JSON-over-HTTP client shared by every remote provider.
// Owns the per-call timeout and the retry policy; callers map `HttpError`
// into their own error kinds.


use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, warn};
use url::Url;

pub const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
const EXPONENTIAL_BACKOFF_BASE: u32 = 2;
const DEFAULT_BACKOFF_UNIT: Duration = Duration::from_millis(1000);

/// Failure of a single remote call, after retries were exhausted
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("request timed out")]
    Timeout,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("failed to encode request body: {0}")]
    Encode(String),

    #[error("failed to decode response body: {0}")]
    Decode(String),
}

impl HttpError {
    #[inline]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }

    #[inline]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    #[inline]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::Status { status: 404, .. })
    }
}

#[derive(Debug, Clone)]
pub struct HttpClient {
    agent: ureq::Agent,
    retry_attempts: u32,
    backoff_unit: Duration,
}

impl Default for HttpClient {
    #[inline]
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_TIMEOUT_SECONDS))
    }
}

impl HttpClient {
    #[inline]
    pub fn new(timeout: Duration) -> Self {
        Self {
            agent: build_agent(timeout),
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            backoff_unit: DEFAULT_BACKOFF_UNIT,
        }
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = build_agent(timeout);
        self
    }

    #[inline]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts.max(1);
        self
    }

    /// Base delay of the exponential backoff (delay = unit * 2^(attempt - 1))
    #[inline]
    pub fn with_backoff_unit(mut self, unit: Duration) -> Self {
        self.backoff_unit = unit;
        self
    }

    #[inline]
    pub const fn retry_attempts(&self) -> u32 {
        self.retry_attempts
    }

    /// POST a JSON body and decode a JSON response
    #[inline]
    pub fn post_json<B, R>(&self, url: &Url, headers: &[(&str, &str)], body: &B) -> Result<R, HttpError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let request_json =
            serde_json::to_string(body).map_err(|e| HttpError::Encode(e.to_string()))?;

        debug!("POST {} ({} bytes)", url, request_json.len());

        let response_text = self.execute_with_retry(url, || {
            let mut request = self
                .agent
                .post(url.as_str())
                .header("Content-Type", "application/json");
            for (name, value) in headers {
                request = request.header(*name, *value);
            }
            request.send(&request_json)
        })?;

        decode(&response_text)
    }

    /// GET a JSON response
    #[inline]
    pub fn get_json<R>(&self, url: &Url, headers: &[(&str, &str)]) -> Result<R, HttpError>
    where
        R: DeserializeOwned,
    {
        debug!("GET {}", url);

        let response_text = self.execute_with_retry(url, || {
            let mut request = self.agent.get(url.as_str());
            for (name, value) in headers {
                request = request.header(*name, *value);
            }
            request.call()
        })?;

        decode(&response_text)
    }

    fn execute_with_retry<F>(&self, url: &Url, mut request_fn: F) -> Result<String, HttpError>
    where
        F: FnMut() -> Result<ureq::http::Response<ureq::Body>, ureq::Error>,
    {
        let mut last_error = None;

        for attempt in 1..=self.retry_attempts {
            debug!("HTTP request attempt {}/{}", attempt, self.retry_attempts);

            let error = match request_fn() {
                Ok(mut response) => {
                    let status = response.status().as_u16();
                    let body = response
                        .body_mut()
                        .read_to_string()
                        .map_err(|e| classify_transport(&e));

                    match (status, body) {
                        (200..=299, Ok(text)) => {
                            debug!("Request succeeded on attempt {}", attempt);
                            return Ok(text);
                        }
                        (200..=299, Err(e)) => e,
                        (400..=499, body) => {
                            let body = body.unwrap_or_default();
                            warn!("Client error (status {}), not retrying", status);
                            return Err(HttpError::Status { status, body });
                        }
                        (_, body) => {
                            warn!(
                                "Server error (status {}), attempt {}/{}",
                                status, attempt, self.retry_attempts
                            );
                            HttpError::Status {
                                status,
                                body: body.unwrap_or_default(),
                            }
                        }
                    }
                }
                Err(error) => {
                    let classified = classify_transport(&error);
                    if matches!(classified, HttpError::Encode(_)) {
                        warn!("Non-retryable error: {}", error);
                        return Err(classified);
                    }
                    warn!(
                        "Transport error: {}, attempt {}/{}",
                        error, attempt, self.retry_attempts
                    );
                    classified
                }
            };

            last_error = Some(error);

            if attempt < self.retry_attempts {
                let delay = self.backoff_delay(attempt);
                debug!("Waiting {:?} before retry", delay);
                std::thread::sleep(delay);
            }
        }

        error!("All retry attempts failed for request to {}", url);

        Err(last_error.unwrap_or_else(|| HttpError::Transport("request failed after retries".to_string())))
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        self.backoff_unit
            .saturating_mul(EXPONENTIAL_BACKOFF_BASE.saturating_pow(attempt.saturating_sub(1)))
    }
}

fn build_agent(timeout: Duration) -> ureq::Agent {
    ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .http_status_as_error(false)
        .build()
        .into()
}

fn decode<R: DeserializeOwned>(text: &str) -> Result<R, HttpError> {
    serde_json::from_str(text).map_err(|e| HttpError::Decode(e.to_string()))
}

fn classify_transport(error: &ureq::Error) -> HttpError {
    match error {
        ureq::Error::Timeout(_) => HttpError::Timeout,
        ureq::Error::StatusCode(status) => HttpError::Status {
            status: *status,
            body: String::new(),
        },
        ureq::Error::ConnectionFailed
        | ureq::Error::HostNotFound
        | ureq::Error::Io(_) => HttpError::Transport(error.to_string()),
        ureq::Error::BadUri(_) | ureq::Error::Http(_) => HttpError::Encode(error.to_string()),
        _ => HttpError::Transport(error.to_string()),
    }
}
