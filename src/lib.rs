#![cfg_attr(docsrs, feature(doc_cfg))]

//! Pulsar timing residual post-processing.
//!
//! This crate drives an external timing-model fitter (tempo2), decodes its
//! general output stream into [Toa] records, derives day-of-year, phase error
//! and orbital phase, optionally phase-aligns the residuals on a synthetic
//! reference TOA, and serializes the result in both full precision and
//! compact forms. Weighted statistics, robust outlier rejection and a
//! dispersion measure (DM) measurement path are provided as well.

pub mod align;
pub mod config;
pub mod decoder;
pub mod derived;
pub mod dm;
pub mod errors;
pub mod fitter;
pub mod formatting;
pub mod pipeline;
pub mod report;
pub mod stats;
pub mod timing_model;
pub mod toa;

#[cfg(test)]
mod tests;

pub mod prelude {
    pub use crate::{
        align::{align, rotate, Alignment},
        config::{AlignmentMarker, DisplayConfig, FitterConfig, OutlierConfig, PipelineConfig},
        decoder::{decode_stream, RawRow, RowLayout},
        derived::{day_of_year, phase_error},
        dm::{measure_dm, parse_dm_fit, DmMeasurement, DmPaths},
        errors::Error,
        fitter::{invoke_residuals, FitMode, FitRequest, Tempo2, TimingFitter},
        formatting::{read_residuals, write_residuals, ResidualPaths},
        pipeline::{generate_residuals, ResidualProducts, ResidualRequest},
        report::{reduce, PlotAxis, PlotOptions, PlotSeries},
        stats::{clean_outliers, recenter, weighted_mean, weighted_rms},
        timing_model::{BinaryModel, KeplerianPhase, OrbitalPhase, TimingModel},
        toa::{ResidualSet, Toa},
    };
    // pub re-export
    pub use hifitime::Epoch;
}

pub use crate::{
    errors::Error,
    toa::{ResidualSet, Toa},
};
