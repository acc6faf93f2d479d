use std::future::Future;

pub mod client;
pub mod download;
pub mod ping;

/// A measurement that can be applied to one candidate address.
///
/// Implementations never fail: whatever goes wrong is logged and reflected
/// in the returned [`PartialResult`] as a degraded value.
pub trait Probe: Send + Sync + 'static {
    fn measure(
        &self,
        address: &str,
    ) -> impl Future<Output = PartialResult> + Send;
}

/// One probe's findings about one address.
///
/// Fields a probe does not measure are `None`; the aggregator only
/// overwrites fields that are present.
#[derive(Debug, Clone, PartialEq)]
pub struct PartialResult {
    pub address: String,
    /// Throughput in bytes per second.
    pub bandwidth: Option<f64>,
    /// Packet loss as reported by the latency probe.
    pub loss: Option<f64>,
    /// Average round trip time in milliseconds.
    pub latency: Option<f64>,
}

impl PartialResult {
    /// Result of a bandwidth probe.
    pub fn bandwidth(address: impl Into<String>, bytes_per_sec: f64) -> Self {
        Self {
            address: address.into(),
            bandwidth: Some(bytes_per_sec),
            loss: None,
            latency: None,
        }
    }

    /// Result of a latency/loss probe.
    pub fn latency(address: impl Into<String>, loss: f64, avg_ms: f64) -> Self {
        Self {
            address: address.into(),
            bandwidth: None,
            loss: Some(loss),
            latency: Some(avg_ms),
        }
    }
}
