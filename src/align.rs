//! Residual phase alignment
//!
//! Residuals produced by independent fitter runs (different epochs, software
//! versions, ...) do not share a phase origin. A synthetic reference TOA (the
//! [AlignmentMarker]) is appended to every TOA list: its post-fit residual
//! phase measures the phase origin offset, which is then removed from every
//! other residual.
use log::{debug, info, warn};

use crate::{
    config::AlignmentMarker,
    errors::AlignmentError,
    toa::{ResidualSet, Toa},
};

/// Outcome of [align]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Alignment {
    /// Nothing to align
    Skipped,
    /// The marker was the only residual: the set has been cleared
    Degenerate,
    /// Residuals rotated by `offset` (cycles), marker
    /// removed from position `index`.
    Rotated { offset: f32, index: usize },
}

/// Wraps a phase back into (-0.5, 0.5]. Correction is applied once only:
/// phase differences of two values within that range never need more.
fn wrap_phase(phase: f32) -> f32 {
    if phase > 0.5 {
        phase - 1.0
    } else if phase <= -0.5 {
        phase + 1.0
    } else {
        phase
    }
}

/// Rotates all residuals by this phase `offset` (cycles).
///
/// The time residual is rescaled so the phase to time ratio of each
/// record is preserved, which keeps the phase error consistent.
/// That ratio is not defined when the initial phase is exactly zero:
/// the residual is then kept as is when the rotated phase is zero as well,
/// and becomes NaN otherwise.
pub fn rotate(toas: &mut [Toa], offset: f32) {
    debug!("rotating by phase {}", offset);

    for toa in toas.iter_mut() {
        let phase = toa.residual_phase;
        let new_phase = wrap_phase(phase - offset);

        let new_residual = if phase != 0.0 {
            (new_phase / phase) * toa.residual
        } else if new_phase == 0.0 {
            toa.residual
        } else {
            warn!(
                "MJD {}: null residual phase, rotated time residual is undefined",
                toa.mjd
            );
            f32::NAN
        };

        toa.residual_phase = new_phase;
        toa.residual = new_residual;
    }
}

/// Locates the marker residual. The fitter preserves the TOA list order,
/// so the marker is expected last; any other unique match is accepted.
fn locate_marker(toas: &[Toa], marker: &AlignmentMarker) -> Result<usize, AlignmentError> {
    let last = toas.len() - 1;

    if marker.matches(toas[last].mjd, toas[last].freq_mhz) {
        return Ok(last);
    }

    let candidates = toas
        .iter()
        .enumerate()
        .filter(|(_, toa)| marker.matches(toa.mjd, toa.freq_mhz))
        .map(|(index, _)| index)
        .collect::<Vec<_>>();

    match candidates.as_slice() {
        [] => Err(AlignmentError::MarkerNotFound),
        [index] => {
            warn!("alignment marker found at position {}/{}", index, last);
            Ok(*index)
        },
        _ => Err(AlignmentError::AmbiguousMarker(candidates.len())),
    }
}

/// Aligns a [ResidualSet] produced from a TOA list to which the
/// [AlignmentMarker] was appended. The marker offset is captured once,
/// the marker record is removed and all remaining residuals rotated.
pub fn align(set: &mut ResidualSet, marker: &AlignmentMarker) -> Result<Alignment, AlignmentError> {
    match set.len() {
        0 => Ok(Alignment::Skipped),
        1 => {
            info!("alignment marker is the only residual: aborting rotation");
            set.clear();
            Ok(Alignment::Degenerate)
        },
        _ => {
            let index = locate_marker(set.toas(), marker)?;
            let offset = set.toas()[index].residual_phase;

            if offset.is_nan() {
                return Err(AlignmentError::PhaseNotTracked);
            }

            set.remove(index);
            rotate(set.toas_mut(), offset);

            info!("residuals rotated by {} cycles", offset);
            Ok(Alignment::Rotated { offset, index })
        },
    }
}
