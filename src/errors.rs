use std::{io, path::PathBuf, process::ExitStatus, time::Duration};

use thiserror::Error;

/// Errors raised while decoding the fitter output stream
/// or a residual file.
#[derive(Error, Debug)]
pub enum ParsingError {
    /// Row does not carry the expected number of positional columns
    #[error("line {line}: expected {expected} columns, found {found}")]
    ColumnCount {
        line: usize,
        expected: usize,
        found: usize,
    },
    /// Column content is not a number
    #[error("line {line}: invalid number \"{token}\"")]
    InvalidNumber { line: usize, token: String },
    /// Residual file mixes rows with and without binary phase
    #[error("line {line}: inconsistent number of columns in residual file")]
    InconsistentColumns { line: usize },
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

/// External fitter invocation errors.
#[derive(Error, Debug)]
pub enum InvokeError {
    /// Fitter executable could not be started
    #[error("failed to spawn \"{program}\": {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    /// Fitter did not complete in time and was killed
    #[error("fit timed out after {0:?}")]
    Timeout(Duration),
    /// Fitter exited with a failure status
    #[error("fitter exited with {status}: {stderr}")]
    ExitStatus { status: ExitStatus, stderr: String },
    /// Temporary TOA list preparation failure
    #[error("failed to prepare temporary toa list {path}: {source}")]
    TemporaryToaList {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

/// Residual alignment errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AlignmentError {
    /// Residual phase was not tracked, nothing to rotate.
    #[error("residual phase not tracked: alignment impossible")]
    PhaseNotTracked,
    /// No record resembles the alignment marker
    #[error("alignment marker not found in residuals")]
    MarkerNotFound,
    /// Several records resemble the alignment marker
    #[error("{0} records match the alignment marker")]
    AmbiguousMarker(usize),
}

/// Statistics errors
#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum StatsError {
    /// Weighted statistics are not defined over an empty set
    #[error("empty input")]
    EmptyInput,
}

/// Timing model (parameter file) errors.
#[derive(Error, Debug)]
pub enum TimingModelError {
    #[error("timing model is empty")]
    Empty,
    #[error("line {line}: parameter \"{key}\" has no value")]
    MissingValue { line: usize, key: String },
    #[error("parameter \"{key}\": invalid number \"{value}\"")]
    InvalidNumber { key: String, value: String },
    /// Parameter required by the computation is absent
    #[error("missing parameter \"{0}\"")]
    MissingParameter(&'static str),
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

/// Residual file writing errors
#[derive(Error, Debug)]
pub enum FormattingError {
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("json serialization: {0}")]
    Json(#[from] serde_json::Error),
}

/// Plot data preparation errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReportError {
    /// Sequential numbering requires the channel count
    #[error("cannot get number of channels")]
    MissingChannelCount,
    /// TOA frequency does not fall within any channel
    #[error("error determining toa number: {0} MHz outside of the band")]
    ToaNumbering(f64),
    #[error(transparent)]
    Stats(#[from] StatsError),
}

/// Configuration loading errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid configuration: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Pipeline level [Error], wrapping every stage error.
#[derive(Error, Debug)]
pub enum Error {
    #[error("parsing error: {0}")]
    Parsing(#[from] ParsingError),
    #[error("fitter error: {0}")]
    Invoke(#[from] InvokeError),
    #[error("alignment error: {0}")]
    Alignment(#[from] AlignmentError),
    #[error("statistics error: {0}")]
    Stats(#[from] StatsError),
    #[error("timing model error: {0}")]
    TimingModel(#[from] TimingModelError),
    #[error("formatting error: {0}")]
    Formatting(#[from] FormattingError),
    #[error("report error: {0}")]
    Report(#[from] ReportError),
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}
