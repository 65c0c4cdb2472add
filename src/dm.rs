//! Dispersion measure (DM) measurement
use std::{
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use log::{debug, info, warn};
use scan_fmt::scan_fmt;
use serde::{Deserialize, Serialize};

use crate::{
    errors::{Error, FormattingError},
    fitter::{FitMode, FitRequest, TimingFitter},
    formatting::toa_list_stem,
    timing_model::TimingModel,
};

/// Parameter table row of the DM
const DM_ROW: &str = "DM (cm^-3 pc)";

/// [DmMeasurement] is the result of one DM fit.
/// Only exists when the DM uncertainty is finite.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DmMeasurement {
    /// Post-fit DM (cm^-3 pc)
    #[serde(rename = "DM")]
    pub dm: f64,
    /// DM uncertainty (cm^-3 pc)
    #[serde(rename = "ERR")]
    pub error: f64,
    /// DM reference epoch (MJD)
    #[serde(rename = "EPOCH")]
    pub epoch: f64,
    /// Reduced chi square of the fit
    #[serde(rename = "CHI2R")]
    pub reduced_chi2: f64,
    /// Post-fit residual RMS (us)
    #[serde(rename = "TRES")]
    pub residual_rms_us: f64,
}

impl DmMeasurement {
    /// Formats this [DmMeasurement] as `KEY value` lines.
    pub fn format<W: Write>(&self, writer: &mut BufWriter<W>) -> std::io::Result<()> {
        writeln!(writer, "DM {}", self.dm)?;
        writeln!(writer, "ERR {}", self.error)?;
        writeln!(writer, "EPOCH {}", self.epoch)?;
        writeln!(writer, "CHI2R {}", self.reduced_chi2)?;
        writeln!(writer, "TRES {}", self.residual_rms_us)?;
        writer.flush()
    }
}

/// [DmPaths] locates the DM files produced for one TOA list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DmPaths {
    /// `KEY value` text file
    pub text: PathBuf,
    /// JSON file
    pub json: PathBuf,
}

impl DmPaths {
    pub fn for_toa_list<P: AsRef<Path>, Q: AsRef<Path>>(tim: P, out_dir: Q) -> Self {
        let stem = toa_list_stem(tim.as_ref());
        let out_dir = out_dir.as_ref();
        Self {
            text: out_dir.join(format!("{}.dm", stem)),
            json: out_dir.join(format!("{}_dm.json", stem)),
        }
    }

    /// Removes both files, when they exist.
    fn remove(&self) -> Result<(), FormattingError> {
        for path in [&self.text, &self.json] {
            match std::fs::remove_file(path) {
                Ok(_) => debug!("removed {}", path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
                Err(source) => {
                    return Err(FormattingError::Write {
                        path: path.to_path_buf(),
                        source,
                    })
                },
            }
        }
        Ok(())
    }
}

/// Post-fit DM and its uncertainty, from the parameter table.
/// Columns: pre-fit, post-fit, uncertainty, difference, fit flag.
fn parse_dm_row(line: &str) -> Option<(f64, Option<f64>)> {
    let content = line.trim_start().strip_prefix(DM_ROW)?;
    let mut items = content.split_ascii_whitespace();
    let _prefit = items.next()?;
    let postfit = items.next()?.parse::<f64>().ok()?;
    let error = items.next().and_then(|item| item.parse::<f64>().ok());
    Some((postfit, error))
}

/// Reduced chi square: "Chisqr/nfree = a/b = c"
fn parse_reduced_chi2(line: &str) -> Option<f64> {
    let start = line.find("Chisqr/nfree")?;
    let value = line[start..].split('=').nth(2)?;
    value.split_ascii_whitespace().next()?.parse::<f64>().ok()
}

/// Post-fit residual RMS (us)
fn parse_rms(line: &str) -> Option<f64> {
    let (_, postfit) = scan_fmt!(
        line.trim(),
        "RMS pre-fit residual = {} (us), RMS post-fit residual = {} (us)",
        f64,
        f64
    );
    postfit
}

/// Reference epoch: DMEPOCH, defaulting to PEPOCH
fn dm_epoch(model: &TimingModel) -> f64 {
    for key in ["DMEPOCH", "PEPOCH"] {
        match model.get_f64(key) {
            Ok(Some(epoch)) => return epoch,
            Ok(None) => {},
            Err(e) => warn!("{}", e),
        }
    }
    f64::NAN
}

/// Extracts the [DmMeasurement] from the fitter DM fit summary.
/// Returns None when the DM or its uncertainty is missing,
/// or when the uncertainty is not finite.
pub fn parse_dm_fit(stdout: &str, model: &TimingModel) -> Option<DmMeasurement> {
    let (mut dm, mut reduced_chi2, mut residual_rms_us) = (None, f64::NAN, f64::NAN);

    for line in stdout.lines() {
        if let Some(row) = parse_dm_row(line) {
            dm = Some(row);
        } else if let Some(chi2) = parse_reduced_chi2(line) {
            reduced_chi2 = chi2;
        } else if line.contains("post-fit residual") {
            if let Some(rms) = parse_rms(line) {
                residual_rms_us = rms;
            }
        }
    }

    let (dm, error) = match dm {
        Some((dm, Some(error))) if error.is_finite() => (dm, error),
        Some((_, error)) => {
            warn!("invalid dm uncertainty: {:?}", error);
            return None;
        },
        None => {
            warn!("dm not found in fit summary");
            return None;
        },
    };

    Some(DmMeasurement {
        dm,
        error,
        epoch: dm_epoch(model),
        reduced_chi2,
        residual_rms_us,
    })
}

fn write_measurement(measurement: &DmMeasurement, paths: &DmPaths) -> Result<(), FormattingError> {
    let fd = File::create(&paths.text).map_err(|source| FormattingError::Write {
        path: paths.text.clone(),
        source,
    })?;
    let mut writer = BufWriter::new(fd);
    measurement
        .format(&mut writer)
        .map_err(|source| FormattingError::Write {
            path: paths.text.clone(),
            source,
        })?;

    let fd = File::create(&paths.json).map_err(|source| FormattingError::Write {
        path: paths.json.clone(),
        source,
    })?;
    let mut writer = BufWriter::new(fd);
    serde_json::to_writer_pretty(&mut writer, measurement)?;
    writer.flush().map_err(|source| FormattingError::Write {
        path: paths.json.clone(),
        source,
    })?;

    Ok(())
}

/// Fits the DM of this TOA list and writes the result in `out_dir`.
/// An invalid measurement removes any previous result
/// and nothing is written: Ok(None) is then returned.
pub fn measure_dm<F: TimingFitter>(
    fitter: &F,
    request: &FitRequest,
    out_dir: &Path,
) -> Result<Option<DmMeasurement>, Error> {
    let mut request = request.clone();
    request.mode = FitMode::DispersionMeasure;

    let paths = DmPaths::for_toa_list(&request.tim, out_dir);
    let stdout = fitter.run(&request)?;

    let model = match TimingModel::from_file(&request.par) {
        Ok(model) => model,
        Err(e) => {
            warn!("unable to parse {}: {}", request.par.display(), e);
            TimingModel::default()
        },
    };

    match parse_dm_fit(&stdout, &model) {
        Some(measurement) => {
            if let Err(e) = write_measurement(&measurement, &paths) {
                // no partial result
                if let Err(cleanup) = paths.remove() {
                    warn!("{}", cleanup);
                }
                return Err(e.into());
            }
            info!(
                "{}: DM={} +/- {}",
                request.tim.display(),
                measurement.dm,
                measurement.error
            );
            Ok(Some(measurement))
        },
        None => {
            info!("{}: invalid dm fit, no result", request.tim.display());
            paths.remove()?;
            Ok(None)
        },
    }
}
