//! Bandwidth probe.
//!
//! Downloads the test URL from one candidate address inside a hard time
//! box and reports bytes per second. The body is counted and discarded as
//! it streams in. When the time box expires the in-flight request is
//! dropped, which closes its connection, and the transfer is charged the
//! full timeout.

use crate::config::DownloadConfig;
use crate::errors::{classify_error, ErrorKind, ProbeError};
use crate::measurements::{bytes_per_second, TransferOutcome};
use crate::probes::client::PinnedClient;
use crate::probes::{PartialResult, Probe};
use futures::StreamExt;
use log::{debug, warn};
use std::net::IpAddr;
use std::time::Duration;
use tokio::time::{timeout, Instant};

/// What a single download achieved.
#[derive(Debug)]
pub struct DownloadReport {
    /// Body bytes received before the transfer ended.
    pub bytes: u64,
    /// `None` when the probe failed before a transfer was attempted.
    pub outcome: Option<TransferOutcome>,
    /// Error that cut the transfer short, if any.
    pub error: Option<ProbeError>,
}

impl DownloadReport {
    fn not_started(error: ProbeError) -> Self {
        Self { bytes: 0, outcome: None, error: Some(error) }
    }

    /// Throughput in bytes per second, charging the full `timeout` to a
    /// timed out transfer.
    pub fn bytes_per_second(&self, timeout: Duration) -> f64 {
        match self.outcome {
            Some(outcome) => {
                bytes_per_second(self.bytes, outcome.charged_duration(timeout))
            }
            None => 0.0,
        }
    }
}

pub struct BandwidthProbe {
    config: DownloadConfig,
}

impl BandwidthProbe {
    pub fn new(config: DownloadConfig) -> Self {
        Self { config }
    }

    /// Run one time boxed download against `address`.
    pub async fn run(&self, address: &str) -> DownloadReport {
        let ip: IpAddr = match address.parse() {
            Ok(ip) => ip,
            Err(e) => {
                return DownloadReport::not_started(
                    ProbeError::new(
                        ErrorKind::Input,
                        format!("{} is not an IP address", address),
                    )
                    .with_source(e),
                )
            }
        };

        let client = match PinnedClient::new(&self.config, ip) {
            Ok(client) => client,
            Err(e) => return DownloadReport::not_started(e),
        };

        let mut bytes = 0u64;
        let start = Instant::now();

        let read = timeout(self.config.timeout, stream_body(&client, &mut bytes)).await;
        let elapsed = start.elapsed();

        match read {
            Ok(Ok(())) => DownloadReport {
                bytes,
                outcome: Some(TransferOutcome::Finished { elapsed }),
                error: None,
            },
            Ok(Err(e)) => DownloadReport {
                bytes,
                outcome: Some(TransferOutcome::Finished { elapsed }),
                error: Some(
                    ProbeError::new(classify_error(&e), "download failed")
                        .with_source(e),
                ),
            },
            Err(_) => DownloadReport {
                bytes,
                outcome: Some(TransferOutcome::TimedOut),
                error: None,
            },
        }
    }
}

impl Probe for BandwidthProbe {
    async fn measure(&self, address: &str) -> PartialResult {
        let report = self.run(address).await;
        let speed = report.bytes_per_second(self.config.timeout);

        match (&report.error, report.outcome) {
            (Some(e), _) => warn!(
                "{}: bandwidth degraded to {:.0} B/s after {} bytes ({}): {}",
                address,
                speed,
                report.bytes,
                e.kind.description(),
                e.source.as_ref().map(|s| s.to_string()).unwrap_or_default()
            ),
            (None, Some(TransferOutcome::TimedOut)) => debug!(
                "{}: time box reached after {} bytes, {:.0} B/s",
                address, report.bytes, speed
            ),
            (None, _) => debug!(
                "{}: downloaded {} bytes, {:.0} B/s",
                address, report.bytes, speed
            ),
        }

        PartialResult::bandwidth(address, speed)
    }
}

/// Stream the response body, adding every chunk's length to `bytes`.
///
/// `bytes` is updated as chunks arrive so the count survives the future
/// being dropped on timeout.
async fn stream_body(
    client: &PinnedClient,
    bytes: &mut u64,
) -> Result<(), reqwest::Error> {
    let response = client.get().send().await?;

    if !response.status().is_success() {
        debug!("test URL answered {}", response.status());
    }

    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
        *bytes += chunk?.len() as u64;
    }

    Ok(())
}
