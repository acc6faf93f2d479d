//! Wires candidates through both probes into the aggregator.
//!
//! ```text
//! candidates ─► splitter ─┬─► bandwidth scheduler ─┐
//!                         └─► latency scheduler ───┴─► results ─► aggregator
//! ```
//!
//! The two schedulers run side by side, each with its own cap. The result
//! channel closes only after both have drained, which is what lets the
//! aggregator finish.

pub mod aggregator;
pub mod scheduler;
pub mod splitter;

use crate::config::ScanConfig;
use crate::probes::{PartialResult, Probe};
use crate::results::Table;
use futures::future::BoxFuture;
use futures::{stream, FutureExt};
use log::{error, info};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Concurrency settings for one run.
#[derive(Debug, Clone, Copy)]
pub struct PipelineSettings {
    pub bandwidth_concurrency: usize,
    pub latency_concurrency: usize,
    pub result_buffer: usize,
}

impl From<&ScanConfig> for PipelineSettings {
    fn from(config: &ScanConfig) -> Self {
        Self {
            bandwidth_concurrency: config.download_concurrency,
            latency_concurrency: config.ping_concurrency,
            result_buffer: config.result_buffer,
        }
    }
}

/// Probe every candidate with both probes and merge the results.
///
/// Always completes once `candidates` closes and every probe has returned;
/// the table holds one record per distinct candidate.
pub async fn run<B, L>(
    candidates: mpsc::Receiver<String>,
    bandwidth: B,
    latency: L,
    settings: PipelineSettings,
) -> Table
where
    B: Probe,
    L: Probe,
{
    let (bandwidth_rx, latency_rx, splitter) = splitter::split(candidates);
    let (results_tx, results_rx) = mpsc::channel(settings.result_buffer.max(1));
    let aggregator = aggregator::spawn(results_rx);

    let (bandwidth_stats, latency_stats) = tokio::join!(
        scheduler::run_bounded(
            "bandwidth",
            receiver_stream(bandwidth_rx),
            settings.bandwidth_concurrency,
            worker(Arc::new(bandwidth), results_tx.clone()),
        ),
        scheduler::run_bounded(
            "latency",
            receiver_stream(latency_rx),
            settings.latency_concurrency,
            worker(Arc::new(latency), results_tx.clone()),
        ),
    );

    // Workers hold clones; this is the last sender once they are done.
    drop(results_tx);

    let candidates = splitter.await.unwrap_or_else(|e| {
        error!("splitter task failed: {}", e);
        0
    });
    info!(
        "{} candidates: {} bandwidth probes ({} failed), {} latency probes ({} failed)",
        candidates,
        bandwidth_stats.spawned,
        bandwidth_stats.panicked,
        latency_stats.spawned,
        latency_stats.panicked
    );

    aggregator.await.unwrap_or_else(|e| {
        error!("aggregator task failed: {}", e);
        Table::default()
    })
}

fn receiver_stream(
    mut rx: mpsc::UnboundedReceiver<String>,
) -> impl futures::Stream<Item = String> {
    stream::poll_fn(move |cx| rx.poll_recv(cx))
}

/// Build the per-address job for one probe: measure, then hand the
/// partial result to the aggregator.
fn worker<P: Probe>(
    probe: Arc<P>,
    results: mpsc::Sender<PartialResult>,
) -> impl Fn(String) -> BoxFuture<'static, ()> {
    move |address: String| {
        let probe = probe.clone();
        let results = results.clone();
        async move {
            let partial = probe.measure(&address).await;
            if results.send(partial).await.is_err() {
                error!("{}: aggregator gone, result dropped", address);
            }
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// In-memory probe that records call count and peak concurrency.
    struct FakeProbe {
        kind: &'static str,
        delay: Duration,
        current: AtomicUsize,
        peak: AtomicUsize,
        calls: AtomicUsize,
    }

    impl FakeProbe {
        fn new(kind: &'static str, delay: Duration) -> Self {
            Self {
                kind,
                delay,
                current: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl Probe for FakeProbe {
        async fn measure(&self, address: &str) -> PartialResult {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            self.calls.fetch_add(1, Ordering::SeqCst);

            tokio::time::sleep(self.delay).await;
            self.current.fetch_sub(1, Ordering::SeqCst);

            match self.kind {
                "bandwidth" => PartialResult::bandwidth(address, 1_000.0),
                _ => PartialResult::latency(address, 0.1, 20.0),
            }
        }
    }

    impl Probe for Arc<FakeProbe> {
        async fn measure(&self, address: &str) -> PartialResult {
            FakeProbe::measure(self, address).await
        }
    }

    fn settings(bandwidth: usize, latency: usize) -> PipelineSettings {
        PipelineSettings {
            bandwidth_concurrency: bandwidth,
            latency_concurrency: latency,
            result_buffer: 4,
        }
    }

    fn feed(addresses: Vec<String>) -> mpsc::Receiver<String> {
        let (tx, rx) = mpsc::channel(8);
        tokio::spawn(async move {
            for address in addresses {
                tx.send(address).await.unwrap();
            }
        });
        rx
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_every_candidate_gets_one_complete_row() {
        let addresses: Vec<String> =
            (0..40).map(|i| format!("10.0.{}.{}", i / 10, i)).collect();
        let bandwidth = Arc::new(FakeProbe::new("bandwidth", Duration::from_millis(5)));
        let latency = Arc::new(FakeProbe::new("latency", Duration::from_millis(3)));

        let table = run(
            feed(addresses.clone()),
            bandwidth.clone(),
            latency.clone(),
            settings(3, 5),
        )
        .await;

        let rows: BTreeSet<_> =
            table.records.iter().map(|r| r.address.clone()).collect();
        assert_eq!(table.records.len(), 40);
        assert_eq!(rows, addresses.into_iter().collect());

        for record in &table.records {
            assert_eq!(record.bandwidth, Some(1_000.0));
            assert_eq!(record.loss, Some(0.1));
            assert_eq!(record.latency, Some(20.0));
        }

        assert_eq!(bandwidth.calls.load(Ordering::SeqCst), 40);
        assert_eq!(latency.calls.load(Ordering::SeqCst), 40);
        assert!(bandwidth.peak.load(Ordering::SeqCst) <= 3);
        assert!(latency.peak.load(Ordering::SeqCst) <= 5);
    }

    #[tokio::test]
    async fn test_no_candidates_yields_header_only() {
        let table = run(
            feed(Vec::new()),
            FakeProbe::new("bandwidth", Duration::ZERO),
            FakeProbe::new("latency", Duration::ZERO),
            settings(2, 2),
        )
        .await;

        let mut out = Vec::new();
        table.write_csv(&mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "ip,bandwidth,loss,latency\n");
    }

    #[tokio::test]
    async fn test_duplicate_candidates_collapse_to_one_row() {
        let addresses = vec!["1.1.1.1".to_string(), "1.1.1.1".to_string()];

        let table = run(
            feed(addresses),
            FakeProbe::new("bandwidth", Duration::ZERO),
            FakeProbe::new("latency", Duration::ZERO),
            settings(1, 1),
        )
        .await;

        assert_eq!(table.records.len(), 1);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        /// N distinct candidates always give exactly N rows.
        #[test]
        fn row_count_matches_distinct_candidates(
            octets in prop::collection::btree_set(0u8..=255, 0..50),
            bandwidth_cap in 1usize..6,
            latency_cap in 1usize..6,
        ) {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(2)
                .enable_all()
                .build()
                .unwrap();

            let addresses: Vec<String> =
                octets.iter().map(|o| format!("192.0.2.{}", o)).collect();
            let expected = addresses.len();

            let table = runtime.block_on(async move {
                run(
                    feed(addresses),
                    FakeProbe::new("bandwidth", Duration::from_millis(1)),
                    FakeProbe::new("latency", Duration::ZERO),
                    settings(bandwidth_cap, latency_cap),
                )
                .await
            });

            prop_assert_eq!(table.records.len(), expected);
        }
    }
}
