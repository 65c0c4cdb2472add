//! Residual generation pipeline
use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::{
    align::{align, Alignment},
    config::PipelineConfig,
    decoder::{decode_stream, RowLayout},
    derived::{binary_phases, derive},
    errors::Error,
    fitter::{invoke_residuals, TimingFitter},
    formatting::{write_residuals, ResidualPaths},
    timing_model::{KeplerianPhase, TimingModel},
    toa::ResidualSet,
};

/// [ResidualRequest] describes the residuals to generate for one TOA list.
#[derive(Debug, Clone, PartialEq)]
pub struct ResidualRequest {
    /// Timing model (parameter file)
    pub par: PathBuf,
    /// TOA list
    pub tim: PathBuf,
    /// Optional TOA selection file
    pub select: Option<PathBuf>,
    /// Output directory
    pub out_dir: PathBuf,
    /// Phase align the residuals
    pub align: bool,
}

impl ResidualRequest {
    pub fn new<P: AsRef<Path>, T: AsRef<Path>>(par: P, tim: T) -> Self {
        Self {
            par: par.as_ref().to_path_buf(),
            tim: tim.as_ref().to_path_buf(),
            select: None,
            out_dir: PathBuf::from("."),
            align: false,
        }
    }

    /// Copies and returns [ResidualRequest] with TOA selection file.
    pub fn with_select<P: AsRef<Path>>(&self, select: P) -> Self {
        let mut s = self.clone();
        s.select = Some(select.as_ref().to_path_buf());
        s
    }

    /// Copies and returns [ResidualRequest] with output directory.
    pub fn with_out_dir<P: AsRef<Path>>(&self, out_dir: P) -> Self {
        let mut s = self.clone();
        s.out_dir = out_dir.as_ref().to_path_buf();
        s
    }

    /// Copies and returns [ResidualRequest] with phase alignment preference.
    pub fn with_alignment(&self, align: bool) -> Self {
        let mut s = self.clone();
        s.align = align;
        s
    }
}

/// [ResidualProducts] is the outcome of [generate_residuals].
#[derive(Debug, Clone, PartialEq)]
pub struct ResidualProducts {
    /// Residuals, as written. Empty when fewer than two were obtained.
    pub residuals: ResidualSet,
    /// Files written
    pub paths: ResidualPaths,
    /// Alignment outcome, when requested
    pub alignment: Option<Alignment>,
}

/// Loads the timing model and computes orbital phases when it
/// describes a binary system. Never fatal.
fn orbital_phases(par: &Path, mjds: &[f64]) -> Option<Vec<f64>> {
    match TimingModel::from_file(par) {
        Ok(model) => binary_phases(&KeplerianPhase, &model, mjds),
        Err(e) => {
            warn!("unable to parse timing model {}: {}", par.display(), e);
            None
        },
    }
}

/// Generates, aligns when requested, and writes the residuals of one TOA list.
///
/// Zero residuals is not an error: empty files are written.
/// A single residual (after alignment) is insufficient data
/// and is treated the same way.
pub fn generate_residuals<F: TimingFitter>(
    fitter: &F,
    request: &ResidualRequest,
    config: &PipelineConfig,
) -> Result<ResidualProducts, Error> {
    info!(
        "generating residuals from {} and {}",
        request.par.display(),
        request.tim.display()
    );

    let paths = ResidualPaths::for_toa_list(&request.tim, &request.out_dir);
    let marker = if request.align {
        Some(&config.alignment)
    } else {
        None
    };

    let stdout = invoke_residuals(
        fitter,
        &request.par,
        &request.tim,
        request.select.as_deref(),
        marker,
    )?;

    let layout = RowLayout::new(config.fitter.track_phase);
    let rows = decode_stream(&stdout, &config.fitter.row_tag, layout)?;

    if rows.is_empty() {
        info!("no toas from fitter for {}", request.tim.display());
        let residuals = ResidualSet::default();
        write_residuals(&residuals, &paths)?;
        return Ok(ResidualProducts {
            residuals,
            paths,
            alignment: None,
        });
    }

    let mjds = rows.iter().map(|row| row.mjd).collect::<Vec<_>>();
    let phases = orbital_phases(&request.par, &mjds);
    let mut residuals = derive(&rows, phases.as_deref());

    let alignment = match marker {
        Some(marker) => Some(align(&mut residuals, marker)?),
        None => None,
    };

    if residuals.len() == 1 {
        info!(
            "only one toa from {}: insufficient data",
            request.tim.display()
        );
        residuals.clear();
    }

    info!("writing {} residuals", residuals.len());
    write_residuals(&residuals, &paths)?;

    Ok(ResidualProducts {
        residuals,
        paths,
        alignment,
    })
}
