//! Offline analysis of surge result logs.
//!
//! The log is streamed line by line; nothing but the running totals is kept
//! in memory, so logs of any length can be analyzed.
//!
//! # Example
//!
//! ```no_run
//! use surge_analyzer::{analyze_file, AnalyzeOptions};
//!
//! let report = analyze_file("surge-result.log", &AnalyzeOptions::default())?;
//! println!("requests: {}", report.requests);
//! report.print();
//! # Ok::<(), surge_analyzer::AnalyzeError>(())
//! ```

pub mod histogram;
pub mod reader;
pub mod report;

pub use histogram::{
    Bin, ElapsedHistogram, LatencyTracker, Percentiles, DEFAULT_BIN_WIDTH, MAX_FILLED_BINS,
};
pub use reader::LogReader;
pub use report::{Report, ReportBuilder};

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Errors analyzing a result log. All of them are fatal.
#[derive(Debug, thiserror::Error)]
pub enum AnalyzeError {
    #[error("Failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read line {line}: {source}")]
    Read {
        line: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("Result log is empty")]
    Empty,

    #[error("First line must be a config event, found {found}")]
    MissingConfig { found: &'static str },

    #[error("Malformed event at line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("Histogram bin width must be non-zero")]
    InvalidBinWidth,

    #[error("Failed to create histogram: {0}")]
    Histogram(String),
}

/// Analysis settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalyzeOptions {
    /// Width of a distribution bin.
    pub bin_width: Duration,
}

impl Default for AnalyzeOptions {
    fn default() -> Self {
        Self {
            bin_width: DEFAULT_BIN_WIDTH,
        }
    }
}

impl AnalyzeOptions {
    pub fn with_bin_width(mut self, width: Duration) -> Self {
        self.bin_width = width;
        self
    }
}

/// Analyze a result log from any buffered reader.
pub fn analyze<R: BufRead>(input: R, options: &AnalyzeOptions) -> Result<Report, AnalyzeError> {
    let mut reader = LogReader::new(input)?;
    let mut builder =
        ReportBuilder::new(reader.config().clone(), reader.opened(), options.bin_width)?;

    while let Some(event) = reader.next_event()? {
        builder.observe(&event);
    }
    debug!(lines = reader.line() - 1, "Result log read");

    Ok(builder.finish())
}

/// Analyze the result log at `path`.
pub fn analyze_file(
    path: impl AsRef<Path>,
    options: &AnalyzeOptions,
) -> Result<Report, AnalyzeError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| AnalyzeError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    analyze(BufReader::new(file), options)
}
