use futures::{Stream, StreamExt};
use log::{debug, warn};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Totals from one scheduler run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Work items taken from the stream.
    pub spawned: usize,
    /// Invocations that panicked instead of completing.
    pub panicked: usize,
}

/// Run `worker` once per item of `tasks`, with at most `max_concurrency`
/// invocations in flight.
///
/// A permit is taken before the next item is pulled, so admission waits on
/// the semaphore rather than polling. Returns once the stream has ended and
/// every spawned invocation has finished. A panicking invocation is counted
/// and logged; it does not stop the run.
pub async fn run_bounded<T, S, F, Fut>(
    name: &str,
    tasks: S,
    max_concurrency: usize,
    worker: F,
) -> SchedulerStats
where
    S: Stream<Item = T>,
    F: Fn(T) -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(max_concurrency.max(1)));
    let mut in_flight = JoinSet::new();
    let mut stats = SchedulerStats::default();

    tokio::pin!(tasks);

    loop {
        // The semaphore is never closed, so acquiring only waits.
        let Ok(permit) = semaphore.clone().acquire_owned().await else {
            break;
        };

        let Some(task) = tasks.next().await else {
            break;
        };

        let work = worker(task);
        in_flight.spawn(async move {
            work.await;
            drop(permit);
        });
        stats.spawned += 1;

        while let Some(finished) = in_flight.try_join_next() {
            reap(name, finished, &mut stats);
        }
    }

    debug!("{}: input drained, waiting on {} probes", name, in_flight.len());

    while let Some(finished) = in_flight.join_next().await {
        reap(name, finished, &mut stats);
    }

    stats
}

fn reap(
    name: &str,
    finished: Result<(), tokio::task::JoinError>,
    stats: &mut SchedulerStats,
) {
    if let Err(e) = finished {
        stats.panicked += 1;
        warn!("{}: probe task failed: {}", name, e);
    }
}
