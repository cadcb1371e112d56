use std::time::Duration;

use anyhow::ensure;
use clap::Args;
use url::Url;

use crate::fetch::retry::RetryPolicy;

pub(crate) const DEFAULT_BASE_URL: &str = "https://github.com/trending";
pub(crate) const DEFAULT_ORIGIN: &str = "https://github.com/";

/// Where and how to fetch trending pages.
#[derive(Args, Debug, Clone)]
pub(crate) struct FetchArgs {
    /// Trending page URL; the window is appended as `?since=`
    #[arg(long, env = "TRENDING_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub base_url: Url,

    /// Site origin that relative repository links are resolved against
    #[arg(long, env = "TRENDING_ORIGIN", default_value = DEFAULT_ORIGIN)]
    pub origin: Url,

    /// Per-request timeout in milliseconds
    #[arg(long, env = "TRENDING_TIMEOUT_MS", default_value_t = 10_000)]
    pub timeout_ms: u64,

    /// Attempts per window before giving up
    #[arg(long, env = "TRENDING_ATTEMPTS", default_value_t = 3)]
    pub attempts: u32,

    /// Delay before the first retry, doubled on each further retry
    #[arg(long, env = "TRENDING_BACKOFF_MS", default_value_t = 4_000)]
    pub backoff_ms: u64,

    /// Upper bound for the retry delay
    #[arg(long, env = "TRENDING_MAX_BACKOFF_MS", default_value_t = 10_000)]
    pub max_backoff_ms: u64,

    /// Minimum pause between two requests to the site, 0 to disable
    #[arg(long, env = "TRENDING_DELAY_MS", default_value_t = 1_000)]
    pub delay_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FetchConfig {
    pub base_url: Url,
    pub origin: Url,
    pub timeout: Duration,
    pub policy: RetryPolicy,
    pub request_spacing: Duration,
}

impl TryFrom<FetchArgs> for FetchConfig {
    type Error = anyhow::Error;

    fn try_from(args: FetchArgs) -> anyhow::Result<Self> {
        ensure!(args.attempts >= 1, "--attempts must be at least 1");
        ensure!(args.timeout_ms > 0, "--timeout-ms must be positive");
        ensure!(
            args.backoff_ms <= args.max_backoff_ms,
            "--backoff-ms ({}) exceeds --max-backoff-ms ({})",
            args.backoff_ms,
            args.max_backoff_ms
        );
        ensure!(
            !args.origin.cannot_be_a_base(),
            "--origin must be a base URL, got {}",
            args.origin
        );

        Ok(Self {
            base_url: args.base_url,
            origin: args.origin,
            timeout: Duration::from_millis(args.timeout_ms),
            policy: RetryPolicy {
                max_attempts: args.attempts,
                base_delay: Duration::from_millis(args.backoff_ms),
                max_delay: Duration::from_millis(args.max_backoff_ms),
            },
            request_spacing: Duration::from_millis(args.delay_ms),
        })
    }
}
