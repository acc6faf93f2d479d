use crate::probes::PartialResult;
use crate::results::{AggregateRecord, Table};
use log::debug;
use std::collections::BTreeMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Merges partial results into one record per address.
///
/// Owned by a single task; probes reach it only through the result channel.
#[derive(Debug, Default)]
pub struct Aggregator {
    records: BTreeMap<String, AggregateRecord>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one partial result in. Only the fields it carries are written.
    pub fn merge(&mut self, partial: PartialResult) {
        let record = self
            .records
            .entry(partial.address)
            .or_insert_with_key(|address| AggregateRecord::new(address.clone()));

        if let Some(bandwidth) = partial.bandwidth {
            record.bandwidth = Some(bandwidth);
        }
        if let Some(loss) = partial.loss {
            record.loss = Some(loss);
        }
        if let Some(latency) = partial.latency {
            record.latency = Some(latency);
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Records in address order.
    pub fn into_table(self) -> Table {
        Table::new(self.records.into_values().collect())
    }
}

/// Spawn the aggregator task. It drains `results` until every sender is
/// dropped and then yields the finished table.
pub fn spawn(mut results: mpsc::Receiver<PartialResult>) -> JoinHandle<Table> {
    tokio::spawn(async move {
        let mut aggregator = Aggregator::new();

        while let Some(partial) = results.recv().await {
            debug!("{:?}", partial);
            aggregator.merge(partial);
        }

        debug!("aggregator: {} addresses", aggregator.len());
        aggregator.into_table()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_merges_fields_from_both_probes() {
        let mut aggregator = Aggregator::new();
        aggregator.merge(PartialResult::bandwidth("1.1.1.1", 1_000.0));
        aggregator.merge(PartialResult::latency("1.1.1.1", 0.2, 165.0));

        let table = aggregator.into_table();
        assert_eq!(table.records.len(), 1);

        let record = &table.records[0];
        assert_eq!(record.address, "1.1.1.1");
        assert_eq!(record.bandwidth, Some(1_000.0));
        assert_eq!(record.loss, Some(0.2));
        assert_eq!(record.latency, Some(165.0));
    }

    #[test]
    fn test_merge_order_does_not_matter() {
        let mut forward = Aggregator::new();
        forward.merge(PartialResult::bandwidth("1.1.1.1", 1_000.0));
        forward.merge(PartialResult::latency("1.1.1.1", 0.2, 165.0));

        let mut backward = Aggregator::new();
        backward.merge(PartialResult::latency("1.1.1.1", 0.2, 165.0));
        backward.merge(PartialResult::bandwidth("1.1.1.1", 1_000.0));

        assert_eq!(forward.into_table(), backward.into_table());
    }

    #[test]
    fn test_absent_fields_do_not_overwrite() {
        let mut aggregator = Aggregator::new();
        aggregator.merge(PartialResult::latency("1.1.1.1", 0.0, 12.0));
        aggregator.merge(PartialResult {
            address: "1.1.1.1".to_string(),
            bandwidth: None,
            loss: None,
            latency: None,
        });

        let table = aggregator.into_table();
        assert_eq!(table.records[0].loss, Some(0.0));
        assert_eq!(table.records[0].latency, Some(12.0));
        assert_eq!(table.records[0].bandwidth, None);
    }

    #[test]
    fn test_zero_measurement_is_kept() {
        let mut aggregator = Aggregator::new();
        aggregator.merge(PartialResult::bandwidth("1.1.1.1", 0.0));

        let table = aggregator.into_table();
        assert_eq!(table.records[0].bandwidth, Some(0.0));
    }

    #[tokio::test]
    async fn test_spawned_aggregator_finishes_when_senders_drop() {
        let (tx, rx) = mpsc::channel(2);
        let handle = spawn(rx);

        let other = tx.clone();
        tx.send(PartialResult::bandwidth("2.2.2.2", 10.0)).await.unwrap();
        other.send(PartialResult::latency("1.1.1.1", 1.0, 0.0)).await.unwrap();
        drop(tx);
        drop(other);

        let table = handle.await.unwrap();
        let addresses: Vec<_> =
            table.records.iter().map(|r| r.address.as_str()).collect();
        assert_eq!(addresses, vec!["1.1.1.1", "2.2.2.2"]);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// One record per distinct address, whatever the interleaving, and
        /// each record ends up with both probes' fields.
        #[test]
        fn one_record_per_address(
            octets in prop::collection::vec(0u8..=255, 0..30),
            seed in any::<u64>(),
        ) {
            let mut partials: Vec<PartialResult> = octets
                .iter()
                .flat_map(|o| {
                    let address = format!("10.0.0.{}", o);
                    [
                        PartialResult::bandwidth(address.clone(), f64::from(*o)),
                        PartialResult::latency(address, 0.0, f64::from(*o)),
                    ]
                })
                .collect();

            // Deterministic shuffle driven by the generated seed.
            let mut state = seed | 1;
            for i in (1..partials.len()).rev() {
                state ^= state << 13;
                state ^= state >> 7;
                state ^= state << 17;
                partials.swap(i, (state % (i as u64 + 1)) as usize);
            }

            let mut aggregator = Aggregator::new();
            for partial in partials {
                aggregator.merge(partial);
            }
            let table = aggregator.into_table();

            let mut distinct = octets.clone();
            distinct.sort_unstable();
            distinct.dedup();
            prop_assert_eq!(table.records.len(), distinct.len());

            for record in &table.records {
                prop_assert!(record.bandwidth.is_some());
                prop_assert!(record.loss.is_some());
                prop_assert!(record.latency.is_some());
            }
        }
    }
}
