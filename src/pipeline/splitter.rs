use log::debug;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Copy every candidate onto two independent streams.
///
/// Each output is unbounded so a slow consumer on one side never holds up
/// the other. Both outputs close on their own once `source` is exhausted
/// and the returned task finishes. The task yields the number of
/// candidates forwarded.
pub fn split(
    mut source: mpsc::Receiver<String>,
) -> (
    mpsc::UnboundedReceiver<String>,
    mpsc::UnboundedReceiver<String>,
    JoinHandle<usize>,
) {
    let (left_tx, left_rx) = mpsc::unbounded_channel();
    let (right_tx, right_rx) = mpsc::unbounded_channel();

    let handle = tokio::spawn(async move {
        let mut forwarded = 0;

        while let Some(address) = source.recv().await {
            // A closed side just stops receiving; keep feeding the other.
            let _ = left_tx.send(address.clone());
            let _ = right_tx.send(address);
            forwarded += 1;
        }

        debug!("splitter: source closed after {} candidates", forwarded);
        forwarded
    });

    (left_rx, right_rx, handle)
}
