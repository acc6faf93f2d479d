extern crate clap;

mod candidates;
mod config;
mod errors;
mod measurements;
mod pipeline;
mod probes;
mod results;

use crate::config::{DownloadConfig, PingConfig, ScanConfig};
use crate::errors::{exit_codes, format_error_for_display, ProbeError};
use crate::pipeline::PipelineSettings;
use crate::probes::download::BandwidthProbe;
use crate::probes::ping::{ParseStrategy, PingProbe};
use crate::results::{OutputFormat, SortKey};
use clap::{Parser, ValueEnum};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use colored::Colorize;
use log::info;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(author, version = env!("EDGE_PROBE_VERSION"), about, long_about = None)]
struct Cli {
    /// File with one address or address prefix (e.g. `104.16.1.`) per line.
    #[arg(short, long, default_value = "ip.txt")]
    input: PathBuf,

    /// URL downloaded from every candidate.
    #[arg(long, default_value = config::DEFAULT_TEST_URL)]
    url: String,

    /// Time box for each download, in seconds.
    #[arg(long, default_value_t = config::DEFAULT_TIMEOUT.as_secs_f64())]
    timeout: f64,

    /// Maximum concurrent downloads.
    #[arg(long, default_value_t = config::DEFAULT_CONCURRENCY)]
    download_concurrency: usize,

    /// Maximum concurrent pings.
    #[arg(long, default_value_t = config::DEFAULT_CONCURRENCY)]
    ping_concurrency: usize,

    /// Echo requests sent to each candidate.
    #[arg(long, default_value_t = config::DEFAULT_PING_COUNT)]
    ping_count: u32,

    /// Ping program to run.
    #[arg(long, default_value = "ping")]
    ping_program: String,

    /// How to find the summary lines in ping output.
    #[arg(long, value_enum, default_value_t = PingParserArg::FixedOffset)]
    ping_parser: PingParserArg,

    /// Output format written to stdout.
    #[arg(long, value_enum, default_value_t = FormatArg::Csv)]
    format: FormatArg,

    /// Row order of the output.
    #[arg(long, value_enum, default_value_t = SortArg::Address)]
    sort: SortArg,

    #[command(flatten)]
    verbose: Verbosity<WarnLevel>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PingParserArg {
    FixedOffset,
    Marker,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FormatArg {
    Csv,
    Json,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SortArg {
    Address,
    Bandwidth,
    Loss,
    Latency,
}

impl Cli {
    fn scan_config(&self) -> Result<ScanConfig, ProbeError> {
        let timeout = Duration::try_from_secs_f64(self.timeout)
            .ok()
            .filter(|timeout| !timeout.is_zero())
            .ok_or_else(|| {
                ProbeError::config("--timeout must be a positive number of seconds")
            })?;

        let config = ScanConfig {
            download: DownloadConfig {
                url: self.url.clone(),
                timeout,
                ..DownloadConfig::default()
            },
            ping: PingConfig {
                count: self.ping_count,
                program: self.ping_program.clone(),
                strategy: match self.ping_parser {
                    PingParserArg::FixedOffset => ParseStrategy::FixedOffset,
                    PingParserArg::Marker => ParseStrategy::Marker,
                },
            },
            download_concurrency: self.download_concurrency,
            ping_concurrency: self.ping_concurrency,
            result_buffer: self.download_concurrency.max(self.ping_concurrency),
        };

        config.validate()?;

        Ok(config)
    }

    fn output_format(&self) -> OutputFormat {
        match self.format {
            FormatArg::Csv => OutputFormat::Csv,
            FormatArg::Json => OutputFormat::Json,
        }
    }

    fn sort_key(&self) -> SortKey {
        match self.sort {
            SortArg::Address => SortKey::Address,
            SortArg::Bandwidth => SortKey::Bandwidth,
            SortArg::Loss => SortKey::Loss,
            SortArg::Latency => SortKey::Latency,
        }
    }
}

#[tokio::main]
async fn main() {
    let cli: Cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(cli.verbose.log_level_filter())
        .format_timestamp_secs()
        .init();

    let config = match cli.scan_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", format_error_for_display(&e).red());
            std::process::exit(e.exit_code());
        }
    };

    info!(
        "probing candidates from {} ({} downloads, {} pings in flight)",
        cli.input.display(),
        config.download_concurrency,
        config.ping_concurrency
    );

    let candidates = candidates::spawn_candidate_source(
        cli.input.clone(),
        config.download_concurrency.max(config.ping_concurrency),
    );

    let mut table = pipeline::run(
        candidates,
        BandwidthProbe::new(config.download.clone()),
        PingProbe::new(config.ping.clone()),
        PipelineSettings::from(&config),
    )
    .await;

    table.sort_by(cli.sort_key());

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    if let Err(e) = table
        .write(cli.output_format(), &mut out)
        .and_then(|_| out.flush())
    {
        eprintln!("{}", format!("Error: failed to write results: {}", e).red());
        std::process::exit(exit_codes::UNKNOWN_ERROR);
    }

    std::process::exit(exit_codes::SUCCESS);
}
