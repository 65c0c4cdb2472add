//! External timing model fitter invocation
mod process;

use std::{
    ffi::OsString,
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
    time::Duration,
};

use log::{debug, info};
use strum_macros::{Display, EnumString};
use tempfile::NamedTempFile;

use crate::{
    config::{AlignmentMarker, FitterConfig},
    decoder::RowLayout,
    errors::InvokeError,
};

/// What the fitter is asked to produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
pub enum FitMode {
    /// Post-fit residuals, one tagged row per TOA, no parameter fitted
    #[strum(serialize = "residuals")]
    Residuals,
    /// Dispersion measure fit, parameter summary on output
    #[strum(serialize = "dm")]
    DispersionMeasure,
}

/// [FitRequest] describes one fitter run.
#[derive(Debug, Clone, PartialEq)]
pub struct FitRequest {
    /// Timing model (parameter file)
    pub par: PathBuf,
    /// TOA list
    pub tim: PathBuf,
    /// Optional TOA selection file
    pub select: Option<PathBuf>,
    pub mode: FitMode,
}

impl FitRequest {
    pub fn new<P: AsRef<Path>, T: AsRef<Path>>(par: P, tim: T, mode: FitMode) -> Self {
        Self {
            par: par.as_ref().to_path_buf(),
            tim: tim.as_ref().to_path_buf(),
            select: None,
            mode,
        }
    }

    /// Copies and returns [FitRequest] with TOA selection file.
    pub fn with_select<P: AsRef<Path>>(&self, select: P) -> Self {
        let mut s = self.clone();
        s.select = Some(select.as_ref().to_path_buf());
        s
    }

    /// Copies and returns [FitRequest] using this TOA list.
    pub fn with_tim<P: AsRef<Path>>(&self, tim: P) -> Self {
        let mut s = self.clone();
        s.tim = tim.as_ref().to_path_buf();
        s
    }
}

/// [TimingFitter] runs a timing model fit and returns
/// the textual output stream.
pub trait TimingFitter {
    /// Runs this [FitRequest] to completion. Implementations block.
    fn run(&self, request: &FitRequest) -> Result<String, InvokeError>;
}

/// [Tempo2] invokes the tempo2 executable directly (no shell).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tempo2 {
    config: FitterConfig,
}

impl Tempo2 {
    pub fn new(config: FitterConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FitterConfig {
        &self.config
    }

    /// Residual row format, for the general2 output plugin
    fn row_format(&self) -> String {
        match RowLayout::new(self.config.track_phase) {
            RowLayout::WithPhase => format!(
                "{{bat}} {{post}} {{err}} {{freq}} {{post_phase}} {}\n",
                self.config.row_tag
            ),
            RowLayout::WithoutPhase => {
                format!("{{bat}} {{post}} {{err}} {{freq}} {}\n", self.config.row_tag)
            },
        }
    }

    /// Builds the argument list of this [FitRequest].
    pub fn arguments(&self, request: &FitRequest) -> Vec<OsString> {
        let mut args = Vec::<OsString>::with_capacity(24);
        let mut push = |arg: &str| args.push(OsString::from(arg));

        push("-nofit");
        if request.mode == FitMode::DispersionMeasure {
            push("-fit");
            push("DM");
        }

        push("-set");
        push("START");
        push(&self.config.start_mjd.to_string());
        push("-set");
        push("FINISH");
        push(&self.config.finish_mjd.to_string());

        if request.mode == FitMode::Residuals {
            push("-output");
            push("general2");
            push("-s");
            push(&self.row_format());
        }

        push("-nobs");
        push(&self.config.max_obs.to_string());
        push("-npsr");
        push("1");
        push("-f");

        args.push(request.par.clone().into_os_string());
        args.push(request.tim.clone().into_os_string());

        if let Some(select) = &request.select {
            args.push(OsString::from("-select"));
            args.push(select.clone().into_os_string());
        }

        args
    }
}

impl TimingFitter for Tempo2 {
    fn run(&self, request: &FitRequest) -> Result<String, InvokeError> {
        let args = self.arguments(request);
        let timeout = self.config.timeout_s.map(Duration::from_secs);
        process::run(&self.config.program, &args, timeout)
    }
}

/// Copies this TOA list into a temporary file, next to the original
/// (relative INCLUDE statements remain valid), and appends the marker.
/// The file is deleted when dropped.
fn marked_toa_list(tim: &Path, marker: &AlignmentMarker) -> Result<NamedTempFile, InvokeError> {
    let wrap = |source| InvokeError::TemporaryToaList {
        path: tim.to_path_buf(),
        source,
    };

    let dir = match tim.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };

    let content = std::fs::read(tim).map_err(wrap)?;

    let temp = tempfile::Builder::new()
        .prefix(".toa-residuals-")
        .suffix(".tim")
        .tempfile_in(&dir)
        .map_err(wrap)?;

    {
        let fd: &File = temp.as_file();
        let mut writer = BufWriter::new(fd);
        writer.write_all(&content).map_err(wrap)?;
        if !content.is_empty() && !content.ends_with(b"\n") {
            writer.write_all(b"\n").map_err(wrap)?;
        }
        writer.write_all(marker.toa_line().as_bytes()).map_err(wrap)?;
        writer.flush().map_err(wrap)?;
    }

    debug!("created temporary toa list {}", temp.path().display());
    Ok(temp)
}

/// Runs the fitter in residual mode. When a [AlignmentMarker] is
/// provided, the fit runs on a temporary copy of the TOA list ending with
/// that marker; that copy is removed whatever the outcome of the fit.
pub fn invoke_residuals<F: TimingFitter>(
    fitter: &F,
    par: &Path,
    tim: &Path,
    select: Option<&Path>,
    marker: Option<&AlignmentMarker>,
) -> Result<String, InvokeError> {
    let mut request = FitRequest::new(par, tim, FitMode::Residuals);
    if let Some(select) = select {
        request = request.with_select(select);
    }

    match marker {
        Some(marker) => {
            info!("toa alignment requested");
            let temp = marked_toa_list(tim, marker)?;
            let result = fitter.run(&request.with_tim(temp.path()));

            let path = temp.path().to_path_buf();
            temp.close().map_err(|source| InvokeError::TemporaryToaList { path, source })?;

            result
        },
        None => fitter.run(&request),
    }
}
