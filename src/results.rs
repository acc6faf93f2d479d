//! The final per-address table and its textual forms.
//!
//! CSV is the default, one row per address. JSON is offered for
//! scripting. Fields no probe reported are written as `0` in
//! CSV and `null` in JSON.

use serde::Serialize;
use std::cmp::Ordering;
use std::io::{self, Write};

/// CSV header line.
pub const CSV_HEADER: &str = "ip,bandwidth,loss,latency";

/// Everything known about one candidate address.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateRecord {
    #[serde(rename = "ip")]
    pub address: String,
    /// Bytes per second.
    pub bandwidth: Option<f64>,
    /// Packet loss, fraction of one (100 when ping gave no usable summary).
    pub loss: Option<f64>,
    /// Average round trip in milliseconds.
    pub latency: Option<f64>,
}

impl AggregateRecord {
    pub fn new(address: String) -> Self {
        Self { address, bandwidth: None, loss: None, latency: None }
    }
}

/// Output encoding for the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Csv,
    Json,
}

/// Row order for the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    /// Address order (the aggregator's natural order).
    Address,
    /// Fastest first.
    Bandwidth,
    /// Least loss first.
    Loss,
    /// Lowest latency first.
    Latency,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(transparent)]
pub struct Table {
    pub records: Vec<AggregateRecord>,
}

impl Table {
    pub fn new(records: Vec<AggregateRecord>) -> Self {
        Self { records }
    }

    /// Reorder rows for ranking. Rows missing the key go last; ties keep
    /// address order.
    pub fn sort_by(&mut self, key: SortKey) {
        let field = |record: &AggregateRecord| match key {
            SortKey::Address => None,
            SortKey::Bandwidth => record.bandwidth,
            SortKey::Loss => record.loss,
            SortKey::Latency => record.latency,
        };

        self.records.sort_by(|a, b| {
            let by_value = match (field(a), field(b)) {
                (Some(x), Some(y)) if key == SortKey::Bandwidth => y.total_cmp(&x),
                (Some(x), Some(y)) => x.total_cmp(&y),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            };

            by_value.then_with(|| a.address.cmp(&b.address))
        });
    }

    pub fn write<W: Write>(&self, format: OutputFormat, out: &mut W) -> io::Result<()> {
        match format {
            OutputFormat::Csv => self.write_csv(out),
            OutputFormat::Json => self.write_json(out),
        }
    }

    /// `ip,bandwidth,loss,latency` with bandwidth and latency as whole
    /// numbers and loss to two decimals.
    pub fn write_csv<W: Write>(&self, out: &mut W) -> io::Result<()> {
        writeln!(out, "{}", CSV_HEADER)?;

        for record in &self.records {
            writeln!(
                out,
                "{},{:.0},{:.2},{:.0}",
                record.address,
                record.bandwidth.unwrap_or(0.0),
                record.loss.unwrap_or(0.0),
                record.latency.unwrap_or(0.0)
            )?;
        }

        Ok(())
    }

    pub fn write_json<W: Write>(&self, out: &mut W) -> io::Result<()> {
        serde_json::to_writer_pretty(&mut *out, self)?;
        writeln!(out)
    }
}
