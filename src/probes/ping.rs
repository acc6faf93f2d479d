//! Latency and packet loss probe built on the system `ping` utility.
//!
//! `ping -c <count> <address>` prints one line per echo reply, a blank
//! line, a statistics header and then two summary lines:
//!
//! ```text
//! 5 packets transmitted, 4 packets received, 20.0% packet loss
//! round-trip min/avg/max/stddev = 164.740/165.221/165.544/0.305 ms
//! ```
//!
//! Locating those lines is delegated to a [`PingParser`] so the output
//! format assumption can change without touching the process handling.

use crate::config::PingConfig;
use crate::errors::ProbeError;
use crate::probes::{PartialResult, Probe};
use log::{debug, warn};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

/// Loss reported when no valid statistics line was seen.
pub const DEFAULT_LOSS: f64 = 100.0;

/// Average round trip reported when no valid round-trip line was seen.
pub const DEFAULT_AVG_MS: f64 = 0.0;

const LOSS_MARKER: &str = "packet loss";
const RTT_MARKER: &str = "avg";

/// Loss and average latency extracted from one ping run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PingSummary {
    /// Fraction of one, or [`DEFAULT_LOSS`] when unknown.
    pub loss: f64,
    /// Milliseconds, or [`DEFAULT_AVG_MS`] when unknown.
    pub avg_ms: f64,
}

impl Default for PingSummary {
    fn default() -> Self {
        Self { loss: DEFAULT_LOSS, avg_ms: DEFAULT_AVG_MS }
    }
}

/// Parse `"5 packets transmitted, 4 packets received, 20.0% packet loss"`
/// into `0.2`.
pub fn parse_packet_loss(line: &str) -> Result<f64, ProbeError> {
    if !line.contains(LOSS_MARKER) {
        return Err(ProbeError::parse(format!(
            "invalid packet loss line: {:?}",
            line
        )));
    }

    let field = line.split(", ").nth(2).ok_or_else(|| {
        ProbeError::parse(format!("packet loss line too short: {:?}", line))
    })?;
    let token = field.split(' ').next().unwrap_or(field);
    let percent = token.strip_suffix('%').ok_or_else(|| {
        ProbeError::parse(format!("no loss percentage in {:?}", line))
    })?;

    let percent: f64 = percent.parse().map_err(|e| {
        ProbeError::parse(format!("bad loss percentage {:?}", percent))
            .with_source(e)
    })?;

    Ok(percent / 100.0)
}

/// Parse the average out of
/// `"round-trip min/avg/max/stddev = 164.740/165.221/165.544/0.305 ms"`.
pub fn parse_round_trip_avg(line: &str) -> Result<f64, ProbeError> {
    if !line.contains(RTT_MARKER) {
        return Err(ProbeError::parse(format!(
            "invalid round-trip line: {:?}",
            line
        )));
    }

    let field = line.split('/').nth(4).ok_or_else(|| {
        ProbeError::parse(format!("round-trip line too short: {:?}", line))
    })?;

    field.trim().parse().map_err(|e| {
        ProbeError::parse(format!("bad round-trip average {:?}", field))
            .with_source(e)
    })
}

/// Incremental parser fed with ping's stdout one line at a time.
pub trait PingParser: Send {
    /// Consume one line. An error is reported once per bad line; the
    /// summary keeps its defaults for the affected value.
    fn feed(&mut self, line: &str) -> Result<(), ProbeError>;

    fn summary(&self) -> PingSummary;
}

/// How summary lines are found in ping output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStrategy {
    /// By position: `count` echo lines, then blank, header, loss, rtt.
    FixedOffset,
    /// By the `packet loss` / `avg` markers, wherever they appear.
    Marker,
}

impl ParseStrategy {
    pub fn parser(&self, count: u32) -> Box<dyn PingParser> {
        match self {
            ParseStrategy::FixedOffset => Box::new(FixedOffsetParser::new(count)),
            ParseStrategy::Marker => Box::new(MarkerParser::default()),
        }
    }
}

/// Positional parser.
///
/// The line counter starts at -3 and is bumped before each check, which
/// skips the command's header line and lands the statistics line on
/// `count + 1` and the round-trip line on `count + 2`. Parsing stops at
/// the first bad summary line.
#[derive(Debug)]
pub struct FixedOffsetParser {
    count: i64,
    line: i64,
    stopped: bool,
    summary: PingSummary,
}

impl FixedOffsetParser {
    pub fn new(count: u32) -> Self {
        Self {
            count: i64::from(count),
            line: -3,
            stopped: false,
            summary: PingSummary::default(),
        }
    }
}

impl PingParser for FixedOffsetParser {
    fn feed(&mut self, line: &str) -> Result<(), ProbeError> {
        if self.stopped {
            return Ok(());
        }

        self.line += 1;

        let parsed = if self.line == self.count + 1 {
            parse_packet_loss(line).map(|loss| self.summary.loss = loss)
        } else if self.line == self.count + 2 {
            parse_round_trip_avg(line).map(|avg| self.summary.avg_ms = avg)
        } else {
            Ok(())
        };

        if parsed.is_err() {
            self.stopped = true;
        }

        parsed
    }

    fn summary(&self) -> PingSummary {
        self.summary
    }
}

/// Marker parser; tolerates missing echo lines.
#[derive(Debug, Default)]
pub struct MarkerParser {
    loss: Option<f64>,
    avg_ms: Option<f64>,
}

impl PingParser for MarkerParser {
    fn feed(&mut self, line: &str) -> Result<(), ProbeError> {
        if line.contains(LOSS_MARKER) {
            self.loss = Some(parse_packet_loss(line)?);
        } else if line.contains(RTT_MARKER) {
            self.avg_ms = Some(parse_round_trip_avg(line)?);
        }

        Ok(())
    }

    fn summary(&self) -> PingSummary {
        PingSummary {
            loss: self.loss.unwrap_or(DEFAULT_LOSS),
            avg_ms: self.avg_ms.unwrap_or(DEFAULT_AVG_MS),
        }
    }
}

pub struct PingProbe {
    config: PingConfig,
}

impl PingProbe {
    pub fn new(config: PingConfig) -> Self {
        Self { config }
    }

    /// Ping `address` and summarise the output.
    ///
    /// Never fails: if ping cannot be started or exits unsuccessfully the
    /// defaults are returned and the cause is logged.
    pub async fn run(&self, address: &str) -> PingSummary {
        match self.try_run(address).await {
            Ok(summary) => summary,
            Err(e) => {
                warn!("{}: ping unavailable: {}", address, e);
                PingSummary::default()
            }
        }
    }

    async fn try_run(&self, address: &str) -> Result<PingSummary, ProbeError> {
        let mut child = Command::new(&self.config.program)
            .arg("-c")
            .arg(self.config.count.to_string())
            .arg(address)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                ProbeError::process(format!(
                    "failed to start {}",
                    self.config.program
                ))
                .with_source(e)
            })?;

        let stdout = child.stdout.take().ok_or_else(|| {
            ProbeError::process("ping stdout was not captured")
        })?;

        let mut parser = self.config.strategy.parser(self.config.count);
        let mut lines = BufReader::new(stdout).lines();

        // Drain stdout while the child runs so it never blocks on a full pipe.
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if let Err(e) = parser.feed(&line) {
                        warn!("{}: {}", address, e);
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!("{}: error reading ping output: {}", address, e);
                    break;
                }
            }
        }

        let status = child.wait().await.map_err(|e| {
            ProbeError::process("failed to wait for ping").with_source(e)
        })?;

        if !status.success() {
            return Err(ProbeError::process(format!(
                "{} exited with {}",
                self.config.program, status
            )));
        }

        Ok(parser.summary())
    }
}

impl Probe for PingProbe {
    async fn measure(&self, address: &str) -> PartialResult {
        let summary = self.run(address).await;
        debug!(
            "{}: loss {:.2}, avg {:.3} ms",
            address, summary.loss, summary.avg_ms
        );

        PartialResult::latency(address, summary.loss, summary.avg_ms)
    }
}
