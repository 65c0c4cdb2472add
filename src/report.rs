//! Residual plot data preparation.
//!
//! Rendering is left to external tools: [PlotSeries] gathers the
//! transformed data (axis, residuals and errors in microseconds, colour
//! scale, limits and weighted RMS) a residual plot is made of.
use std::io::{BufWriter, Write};

use log::debug;
use strum_macros::{Display, EnumString};

use crate::{
    align::rotate,
    config::DisplayConfig,
    errors::ReportError,
    stats::{clean_outliers, recenter, weighted_rms},
    toa::ResidualSet,
};

/// Relative padding of the x axis limits
const XLIM_PADDING: f64 = 0.05;

/// Abscissa of a residual plot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, EnumString)]
pub enum PlotAxis {
    /// Arrival epoch
    #[default]
    #[strum(serialize = "mjd")]
    Mjd,
    /// TOA number, derived from the frequency channel
    /// of each TOA within one observation.
    #[strum(serialize = "sequential")]
    Sequential,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlotOptions {
    pub axis: PlotAxis,
    /// Rotate (a copy of) the residuals by their mean phase
    pub rebase: bool,
    /// Reject outliers and recentre on the weighted mean
    pub outlier_factor: Option<f64>,
    /// Pulsar name, used in titles
    pub pulsar: Option<String>,
    /// Replaces the default title
    pub title: Option<String>,
    /// Epoch of the observation being processed (MJD)
    pub marker_mjd: Option<f64>,
}

impl PlotOptions {
    /// Copies and returns [PlotOptions] with outlier rejection.
    pub fn with_outlier_factor(&self, factor: f64) -> Self {
        let mut s = self.clone();
        s.outlier_factor = Some(factor);
        s
    }

    /// Copies and returns [PlotOptions] with desired [PlotAxis].
    pub fn with_axis(&self, axis: PlotAxis) -> Self {
        let mut s = self.clone();
        s.axis = axis;
        s
    }

    /// Copies and returns [PlotOptions] with phase rebasing.
    pub fn with_rebase(&self, rebase: bool) -> Self {
        let mut s = self.clone();
        s.rebase = rebase;
        s
    }
}

/// [PlotSeries] is the data of one residual plot.
#[derive(Debug, Clone, PartialEq)]
pub struct PlotSeries {
    pub axis: PlotAxis,
    pub title: String,
    /// MJD or TOA number
    pub x: Vec<f64>,
    /// Residuals (us)
    pub y_us: Vec<f64>,
    /// Uncertainties (us)
    pub yerr_us: Vec<f64>,
    /// Colour scale data (MHz)
    pub freq_mhz: Vec<f64>,
    /// Colour scale limits (MHz): band edges
    pub color_range: (f64, f64),
    /// Weighted RMS (us), MJD plots only
    pub wrms_us: Option<f64>,
    /// Padded x axis limits
    pub xlim: Option<(f64, f64)>,
    /// Vertical marker (MJD), MJD plots only
    pub marker_mjd: Option<f64>,
}

/// Numbers each TOA from its frequency channel. The pulse counter
/// moves forward by `nchan` every time the channel index does not increase.
fn toa_numbers(set: &ResidualSet, display: &DisplayConfig) -> Result<Vec<f64>, ReportError> {
    let nchan = display.nchan.ok_or(ReportError::MissingChannelCount)?;
    let (f_min, _) = display.band_edges();
    let chan_bw = display.bandwidth_mhz / nchan as f64;

    let mut pulse = 0_usize;
    let mut last = Option::<usize>::None;
    let mut numbers = Vec::with_capacity(set.len());

    for toa in set.iter() {
        let channel = (0..nchan)
            .find(|i| {
                let low = f_min + *i as f64 * chan_bw;
                let high = f_min + (*i + 1) as f64 * chan_bw;
                low < toa.freq_mhz && toa.freq_mhz < high
            })
            .ok_or(ReportError::ToaNumbering(toa.freq_mhz))?;

        if matches!(last, Some(last) if channel <= last) {
            pulse += nchan;
        }

        numbers.push((pulse + channel) as f64);
        last = Some(channel);
    }

    Ok(numbers)
}

fn padded_limits(x: &[f64]) -> Option<(f64, f64)> {
    let min = x.iter().copied().reduce(f64::min)?;
    let max = x.iter().copied().reduce(f64::max)?;
    let spread = max - min;
    Some((min - XLIM_PADDING * spread, max + XLIM_PADDING * spread))
}

/// Returns the residuals a plot is drawn from: a copy of this [ResidualSet],
/// rebased on its mean phase and cleaned from outliers (then recentred)
/// as the [PlotOptions] request.
pub fn reduce(set: &ResidualSet, options: &PlotOptions) -> Result<ResidualSet, ReportError> {
    let mut set = set.clone();

    if options.rebase && !set.is_empty() {
        let mean =
            set.iter().map(|toa| toa.residual_phase as f64).sum::<f64>() / set.len() as f64;
        debug!("rebasing by mean phase {}", mean);
        rotate(set.toas_mut(), mean as f32);
    }

    if let Some(factor) = options.outlier_factor {
        set = clean_outliers(&set, factor);
        if !set.is_empty() {
            recenter(&mut set)?;
        }
    }

    Ok(set)
}

impl PlotSeries {
    /// Prepares the [PlotSeries] of this [ResidualSet]. The set itself
    /// is left untouched: rebasing and outlier rejection apply to a copy.
    pub fn prepare(
        set: &ResidualSet,
        options: &PlotOptions,
        display: &DisplayConfig,
    ) -> Result<Self, ReportError> {
        let reduced = reduce(set, options)?;
        Self::from_reduced(&reduced, options, display)
    }

    /// Builds the [PlotSeries] of residuals already passed through [reduce].
    pub fn from_reduced(
        set: &ResidualSet,
        options: &PlotOptions,
        display: &DisplayConfig,
    ) -> Result<Self, ReportError> {
        let x = match options.axis {
            PlotAxis::Mjd => set.iter().map(|toa| toa.mjd).collect::<Vec<_>>(),
            PlotAxis::Sequential => toa_numbers(&set, display)?,
        };

        let wrms_us = match options.axis {
            PlotAxis::Mjd if !set.is_empty() => Some(weighted_rms(&set)? * 1.0E6),
            _ => None,
        };

        let pulsar = options.pulsar.as_deref().unwrap_or("unk");
        let title = match (&options.title, options.axis, wrms_us) {
            (Some(title), _, _) => title.clone(),
            (None, PlotAxis::Sequential, _) => format!("Single-observation TOAs ({})", pulsar),
            (None, PlotAxis::Mjd, Some(wrms)) => {
                format!("Global TOAs ({}) | Wrms={:.2}us", pulsar, wrms)
            },
            (None, PlotAxis::Mjd, None) => format!("Global TOAs ({})", pulsar),
        };

        Ok(Self {
            axis: options.axis,
            title,
            xlim: padded_limits(&x),
            x,
            y_us: set.iter().map(|toa| toa.residual as f64 * 1.0E6).collect(),
            yerr_us: set.iter().map(|toa| toa.error as f64 * 1.0E6).collect(),
            freq_mhz: set.iter().map(|toa| toa.freq_mhz).collect(),
            color_range: display.band_edges(),
            wrms_us,
            marker_mjd: match options.axis {
                PlotAxis::Mjd => options.marker_mjd,
                PlotAxis::Sequential => None,
            },
        })
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// Formats this [PlotSeries] as commented, tab separated columns:
    /// x, residual (us), uncertainty (us), frequency (MHz).
    pub fn format<W: Write>(&self, writer: &mut BufWriter<W>) -> std::io::Result<()> {
        writeln!(writer, "# {}", self.title)?;
        writeln!(writer, "# axis: {}", self.axis)?;
        if let Some(wrms) = self.wrms_us {
            writeln!(writer, "# wrms_us: {}", wrms)?;
        }
        for i in 0..self.len() {
            writeln!(
                writer,
                "{}\t{}\t{}\t{}",
                self.x[i], self.y_us[i], self.yerr_us[i], self.freq_mhz[i]
            )?;
        }
        writer.flush()
    }
}
