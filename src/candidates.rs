//! Candidate address source.
//!
//! Reads a line-oriented list of addresses or address prefixes. A prefix
//! line (ending in `.` or `:`) is completed with a random last component so
//! each run samples a different host in the range.

use crate::errors::ProbeError;
use log::{error, info};
use rand::Rng;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

/// Turn one input line into a candidate address.
///
/// Returns `None` for blank lines and `#` comments.
pub fn expand_line(line: &str) -> Option<String> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    let last: u8 = rand::thread_rng().gen_range(0..=255);
    if line.ends_with('.') {
        Some(format!("{}{}", line, last))
    } else if line.ends_with(':') {
        Some(format!("{}{:x}", line, last))
    } else {
        Some(line.to_string())
    }
}

/// Stream candidates from `path` into a channel of the given capacity.
///
/// The channel closes when the file is exhausted. If the file cannot be
/// opened or read the error is logged and the channel closes early.
pub fn spawn_candidate_source(
    path: PathBuf,
    capacity: usize,
) -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(capacity.max(1));

    tokio::spawn(async move {
        match feed(&path, &tx).await {
            Ok(sent) => info!("{}: {} candidates", path.display(), sent),
            Err(e) => error!("{}", e),
        }
    });

    rx
}

async fn feed(
    path: &Path,
    tx: &mpsc::Sender<String>,
) -> Result<usize, ProbeError> {
    let file = File::open(path).await.map_err(|e| {
        ProbeError::input(format!("cannot open {}", path.display()))
            .with_source(e)
    })?;

    let mut lines = BufReader::new(file).lines();
    let mut sent = 0;

    while let Some(line) = lines.next_line().await.map_err(|e| {
        ProbeError::input(format!("cannot read {}", path.display()))
            .with_source(e)
    })? {
        let Some(address) = expand_line(&line) else { continue };

        if tx.send(address).await.is_err() {
            // Nobody is listening any more.
            break;
        }
        sent += 1;
    }

    Ok(sent)
}
