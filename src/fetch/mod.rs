pub mod retry;

use std::fmt;
use std::sync::{Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use snapstore::Window;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use retry::{RetryPolicy, Step};

#[derive(Debug)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("failed to read response body: {0}")]
    Body(String),
    #[error("request failed: {0}")]
    Request(String),
}

impl TransportError {
    fn kind(&self) -> FetchErrorKind {
        match self {
            Self::Timeout => FetchErrorKind::Timeout,
            Self::Connect(_) => FetchErrorKind::Connect,
            Self::Body(_) => FetchErrorKind::Body,
            Self::Request(_) => FetchErrorKind::Request,
        }
    }

    fn is_retryable(&self) -> bool {
        !matches!(self, Self::Request(_))
    }
}

/// Something that can GET a page. The production implementation lives in
/// `crate::http`.
pub trait Transport: Send + Sync {
    fn get(&self, url: &Url) -> Result<HttpResponse, TransportError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    Timeout,
    Connect,
    Status,
    Body,
    Request,
}

impl fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Timeout => "timeout",
            Self::Connect => "connection",
            Self::Status => "http status",
            Self::Body => "response body",
            Self::Request => "request",
        })
    }
}

#[derive(Debug, Error)]
#[error("fetching {window} trending failed after {attempts} attempt(s): {detail}")]
pub struct FetchError {
    pub window: Window,
    pub kind: FetchErrorKind,
    /// Status of the last response received, if any attempt got that far.
    pub status: Option<u16>,
    pub attempts: u32,
    pub detail: String,
}

struct Failure {
    kind: FetchErrorKind,
    retryable: bool,
    detail: String,
}

/// Server errors are transient; every 4xx, rate limiting included, is final.
fn is_retryable_status(status: u16) -> bool {
    (500..600).contains(&status)
}

pub struct Fetcher<T: Transport> {
    transport: T,
    base_url: Url,
    policy: RetryPolicy,
    /// Minimum gap between the start of two requests, across all windows.
    request_spacing: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl<T: Transport> Fetcher<T> {
    pub fn new(transport: T, base_url: Url, policy: RetryPolicy) -> Self {
        Self {
            transport,
            base_url,
            policy,
            request_spacing: Duration::ZERO,
            last_request: Mutex::new(None),
        }
    }

    pub fn with_request_spacing(mut self, spacing: Duration) -> Self {
        self.request_spacing = spacing;
        self
    }

    /// Blocks until `request_spacing` has passed since the previous request.
    /// The lock is held while sleeping so concurrent windows queue up.
    fn pace(&self, window: Window) {
        if self.request_spacing.is_zero() {
            return;
        }
        let mut last = self
            .last_request
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = *last {
            let wait = self.request_spacing.saturating_sub(previous.elapsed());
            if !wait.is_zero() {
                debug!(window = %window, wait_ms = wait.as_millis() as u64, "spacing requests");
                thread::sleep(wait);
            }
        }
        *last = Some(Instant::now());
    }

    pub fn url_for(&self, window: Window) -> Url {
        let mut url = self.base_url.clone();
        url.query_pairs_mut().append_pair("since", window.as_str());
        url
    }

    /// Returns the page body for `window`, retrying transient failures.
    pub fn fetch(&self, window: Window) -> Result<String, FetchError> {
        let url = self.url_for(window);
        let mut backoff = self.policy.backoff();
        let mut last_status = None;

        loop {
            let attempt = backoff.begin_attempt();
            self.pace(window);
            debug!(window = %window, %url, attempt, "requesting trending page");

            let failure = match self.transport.get(&url) {
                Ok(response) if (200..300).contains(&response.status) => {
                    debug!(
                        window = %window,
                        attempt,
                        bytes = response.body.len(),
                        "trending page fetched"
                    );
                    return Ok(response.body);
                }
                Ok(response) => {
                    last_status = Some(response.status);
                    Failure {
                        kind: FetchErrorKind::Status,
                        retryable: is_retryable_status(response.status),
                        detail: format!("HTTP {}", response.status),
                    }
                }
                Err(err) => Failure {
                    kind: err.kind(),
                    retryable: err.is_retryable(),
                    detail: err.to_string(),
                },
            };

            match backoff.after_failure(failure.retryable) {
                Step::Retry(delay) => {
                    warn!(
                        window = %window,
                        attempt,
                        error = %failure.detail,
                        delay_ms = delay.as_millis() as u64,
                        "transient fetch failure, retrying"
                    );
                    thread::sleep(delay);
                }
                Step::GiveUp => {
                    return Err(FetchError {
                        window,
                        kind: failure.kind,
                        status: last_status,
                        attempts: backoff.attempts(),
                        detail: failure.detail,
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::collections::VecDeque;

    /// Replays canned outcomes in order and records requested URLs.
    struct Scripted {
        outcomes: Mutex<VecDeque<Result<HttpResponse, TransportError>>>,
        requests: Mutex<Vec<String>>,
    }

    impl Scripted {
        fn new(outcomes: Vec<Result<HttpResponse, TransportError>>) -> Self {
            Self {
                outcomes: Mutex::new(outcomes.into()),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    impl Transport for Scripted {
        fn get(&self, url: &Url) -> Result<HttpResponse, TransportError> {
            self.requests.lock().unwrap().push(url.to_string());
            self.outcomes
                .lock()
                .unwrap()
                .pop_front()
                .expect("transport called more often than scripted")
        }
    }

    fn ok(body: &str) -> Result<HttpResponse, TransportError> {
        Ok(HttpResponse {
            status: 200,
            body: body.to_string(),
        })
    }

    fn status(code: u16) -> Result<HttpResponse, TransportError> {
        Ok(HttpResponse {
            status: code,
            body: String::new(),
        })
    }

    fn fetcher(outcomes: Vec<Result<HttpResponse, TransportError>>) -> Fetcher<Scripted> {
        Fetcher::new(
            Scripted::new(outcomes),
            Url::parse("https://github.com/trending").unwrap(),
            RetryPolicy {
                max_attempts: 3,
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(2),
            },
        )
    }

    #[test]
    fn test_url_carries_window_parameter() {
        let f = fetcher(vec![]);
        assert_eq!(
            f.url_for(Window::Weekly).as_str(),
            "https://github.com/trending?since=weekly"
        );
        assert_eq!(
            f.url_for(Window::Daily).as_str(),
            "https://github.com/trending?since=daily"
        );
    }

    #[test]
    fn test_success_on_first_attempt() {
        let f = fetcher(vec![ok("<html></html>")]);
        assert_eq!(f.fetch(Window::Daily).unwrap(), "<html></html>");
        assert_eq!(f.transport.request_count(), 1);
    }

    #[test]
    fn test_one_failure_then_success() {
        let f = fetcher(vec![Err(TransportError::Timeout), ok("page")]);
        assert_eq!(f.fetch(Window::Monthly).unwrap(), "page");
        assert_eq!(f.transport.request_count(), 2);
    }

    #[test]
    fn test_three_timeouts_exhaust_retries() {
        let f = fetcher(vec![
            Err(TransportError::Timeout),
            Err(TransportError::Timeout),
            Err(TransportError::Timeout),
        ]);
        let err = f.fetch(Window::Daily).unwrap_err();
        assert_eq!(err.kind, FetchErrorKind::Timeout);
        assert_eq!(err.attempts, 3);
        assert_eq!(err.window, Window::Daily);
        assert_eq!(err.status, None);
        assert_eq!(f.transport.request_count(), 3);
    }

    #[test]
    fn test_server_errors_are_retried() {
        let f = fetcher(vec![status(502), status(503), ok("recovered")]);
        assert_eq!(f.fetch(Window::Daily).unwrap(), "recovered");
    }

    #[test]
    fn test_rate_limit_fails_without_retry() {
        let f = fetcher(vec![status(429), ok("never requested")]);
        let err = f.fetch(Window::Daily).unwrap_err();
        assert_eq!(err.kind, FetchErrorKind::Status);
        assert_eq!(err.status, Some(429));
        assert_eq!(err.attempts, 1);
        assert_eq!(f.transport.request_count(), 1);
    }

    #[rstest]
    #[case(400, false)]
    #[case(403, false)]
    #[case(404, false)]
    #[case(429, false)]
    #[case(499, false)]
    #[case(500, true)]
    #[case(502, true)]
    #[case(503, true)]
    #[case(599, true)]
    fn test_status_classification(#[case] code: u16, #[case] retryable: bool) {
        assert_eq!(is_retryable_status(code), retryable);
    }

    #[test]
    fn test_requests_are_spaced_apart() {
        let spacing = Duration::from_millis(40);
        let f = fetcher(vec![ok("a"), ok("b"), ok("c")]).with_request_spacing(spacing);

        let started = Instant::now();
        for window in Window::ALL {
            f.fetch(window).unwrap();
        }
        assert!(started.elapsed() >= spacing * 2, "took {:?}", started.elapsed());
        assert_eq!(f.transport.request_count(), 3);
    }

    #[test]
    fn test_first_request_is_not_delayed() {
        let f = fetcher(vec![ok("a")]).with_request_spacing(Duration::from_secs(5));
        let started = Instant::now();
        f.fetch(Window::Daily).unwrap();
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_client_error_fails_without_retry() {
        let f = fetcher(vec![status(404)]);
        let err = f.fetch(Window::Weekly).unwrap_err();
        assert_eq!(err.kind, FetchErrorKind::Status);
        assert_eq!(err.status, Some(404));
        assert_eq!(err.attempts, 1);
        assert!(err.to_string().contains("404"), "got: {err}");
        assert_eq!(f.transport.request_count(), 1);
    }

    #[test]
    fn test_last_status_survives_later_timeout() {
        let f = fetcher(vec![
            status(500),
            status(503),
            Err(TransportError::Timeout),
        ]);
        let err = f.fetch(Window::Daily).unwrap_err();
        assert_eq!(err.kind, FetchErrorKind::Timeout);
        assert_eq!(err.status, Some(503));
        assert_eq!(err.attempts, 3);
    }

    #[test]
    fn test_malformed_request_is_not_retried() {
        let f = fetcher(vec![Err(TransportError::Request("bad header".to_string()))]);
        let err = f.fetch(Window::Daily).unwrap_err();
        assert_eq!(err.kind, FetchErrorKind::Request);
        assert_eq!(err.attempts, 1);
    }
}
