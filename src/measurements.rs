use std::time::Duration;

/// How a download ended, which decides the duration it is charged for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferOutcome {
    /// The body was read to the end (or failed) after `elapsed`.
    Finished { elapsed: Duration },
    /// The time box expired first.
    TimedOut,
}

impl TransferOutcome {
    /// Duration used for the throughput figure.
    ///
    /// A timed out transfer is charged the whole time box rather than the
    /// time actually spent reading.
    pub fn charged_duration(&self, timeout: Duration) -> Duration {
        match self {
            TransferOutcome::Finished { elapsed } => *elapsed,
            TransferOutcome::TimedOut => timeout,
        }
    }
}

/// Throughput in bytes per second.
///
/// Returns 0.0 when no time was charged, so an instant failure never turns
/// into an infinite speed.
pub fn bytes_per_second(bytes: u64, duration: Duration) -> f64 {
    let secs = duration.as_secs_f64();
    if secs <= 0.0 {
        return 0.0;
    }

    bytes as f64 / secs
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_bytes_per_second() {
        let bps = bytes_per_second(1_000_000, Duration::from_secs(2));
        assert!((bps - 500_000.0).abs() < 0.001);
    }

    #[test]
    fn test_bytes_per_second_zero_duration() {
        assert_eq!(bytes_per_second(1_000, Duration::ZERO), 0.0);
    }

    #[test]
    fn test_timed_out_charges_full_timeout() {
        let timeout = Duration::from_secs(10);
        assert_eq!(TransferOutcome::TimedOut.charged_duration(timeout), timeout);

        let elapsed = Duration::from_millis(1500);
        let finished = TransferOutcome::Finished { elapsed };
        assert_eq!(finished.charged_duration(timeout), elapsed);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// A timed out transfer never reports more than a finished one that
        /// read the same bytes within the time box.
        #[test]
        fn timeout_is_conservative(
            bytes in 0u64..10_000_000_000,
            elapsed_ms in 1u64..10_000,
        ) {
            let timeout = Duration::from_secs(10);
            let finished = TransferOutcome::Finished {
                elapsed: Duration::from_millis(elapsed_ms),
            };

            let capped = bytes_per_second(
                bytes,
                TransferOutcome::TimedOut.charged_duration(timeout),
            );
            let actual =
                bytes_per_second(bytes, finished.charged_duration(timeout));

            prop_assert!(capped <= actual);
        }
    }
}
