//! Run configuration.
//!
//! Defaults for every knob live here and are overridden from the command
//! line. [`ScanConfig::validate`] is the only place a run can be refused.

use crate::errors::ProbeError;
use crate::probes::client::pinnable_host;
use crate::probes::ping::ParseStrategy;
use std::time::Duration;
use url::Url;

/// Default download target: a 100MB body from the Cloudflare speed endpoint.
pub const DEFAULT_TEST_URL: &str =
    "https://speed.cloudflare.com/__down?bytes=104857600";

/// Default per-download time box.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default number of concurrent probes of each kind.
pub const DEFAULT_CONCURRENCY: usize = 20;

/// Default number of echo requests per ping.
pub const DEFAULT_PING_COUNT: u32 = 10;

/// Browser-like user agent; some targets refuse obvious tools.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_14_6) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/83.0.4103.116 \
     Safari/537.36 Edg/83.0.478.64";

/// Settings for the bandwidth probe.
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    /// URL downloaded from every candidate.
    pub url: String,
    /// Hard time box for one download, including connect.
    pub timeout: Duration,
    /// Value of the `User-Agent` header.
    pub user_agent: String,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_TEST_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

/// Settings for the latency/loss probe.
#[derive(Debug, Clone)]
pub struct PingConfig {
    /// Echo requests sent to every candidate.
    pub count: u32,
    /// Program invoked as `<program> -c <count> <address>`.
    pub program: String,
    /// How summary lines are located in the program's output.
    pub strategy: ParseStrategy,
}

impl Default for PingConfig {
    fn default() -> Self {
        Self {
            count: DEFAULT_PING_COUNT,
            program: "ping".to_string(),
            strategy: ParseStrategy::FixedOffset,
        }
    }
}

/// Configuration for a complete probing run.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub download: DownloadConfig,
    pub ping: PingConfig,
    /// Maximum bandwidth probes in flight.
    pub download_concurrency: usize,
    /// Maximum ping probes in flight.
    pub ping_concurrency: usize,
    /// Capacity of the channel carrying partial results to the aggregator.
    pub result_buffer: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            download: DownloadConfig::default(),
            ping: PingConfig::default(),
            download_concurrency: DEFAULT_CONCURRENCY,
            ping_concurrency: DEFAULT_CONCURRENCY,
            result_buffer: DEFAULT_CONCURRENCY,
        }
    }
}

impl ScanConfig {
    /// Reject settings that would stall or break the run.
    pub fn validate(&self) -> Result<(), ProbeError> {
        if self.download_concurrency == 0 {
            return Err(ProbeError::config(
                "--download-concurrency must be at least 1",
            ));
        }
        if self.ping_concurrency == 0 {
            return Err(ProbeError::config(
                "--ping-concurrency must be at least 1",
            ));
        }
        if self.result_buffer == 0 {
            return Err(ProbeError::config("result buffer must be at least 1"));
        }
        if self.ping.count == 0 {
            return Err(ProbeError::config("--ping-count must be at least 1"));
        }
        if self.ping.program.trim().is_empty() {
            return Err(ProbeError::config("--ping-program must not be empty"));
        }
        if self.download.timeout.is_zero() {
            return Err(ProbeError::config("--timeout must be greater than zero"));
        }

        let url = Url::parse(&self.download.url).map_err(|e| {
            ProbeError::config(format!(
                "invalid test URL {}: {}",
                self.download.url, e
            ))
            .with_source(e)
        })?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(ProbeError::config(format!(
                "test URL must be http or https, got {}",
                url.scheme()
            )));
        }
        pinnable_host(&url)?;

        Ok(())
    }
}
