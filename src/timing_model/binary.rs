//! Binary orbit models and orbital phase
use strum_macros::EnumString;

use super::TimingModel;
use crate::errors::TimingModelError;

/// Seconds per day
const SECONDS_PER_DAY: f64 = 86_400.0;

/// PBDOT values larger than this are expressed in units of 1E-12
const PBDOT_SCALING_THRESHOLD: f64 = 1.0E-7;

/// Binary orbit models, as declared by the BINARY parameter
#[derive(Debug, Clone, PartialEq, Eq, EnumString)]
pub enum BinaryModel {
    BT,
    BTX,
    DD,
    DDK,
    DDS,
    DDGR,
    DDH,
    ELL1,
    ELL1H,
    #[strum(serialize = "ELL1k")]
    ELL1K,
    T2,
    MSS,
    /// Model we have no special knowledge of
    #[strum(disabled)]
    Other(String),
}

impl BinaryModel {
    /// True for models parametrized by the epoch of ascending node (TASC)
    /// rather than the epoch of periastron (T0)
    pub fn uses_ascending_node(&self) -> bool {
        matches!(self, Self::ELL1 | Self::ELL1H | Self::ELL1K)
    }
}

impl std::fmt::Display for BinaryModel {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::ELL1K => f.write_str("ELL1k"),
            Self::Other(name) => f.write_str(name),
            model => write!(f, "{:?}", model),
        }
    }
}

/// [OrbitalPhase] computes the orbital phase of a binary pulsar
/// at the requested epochs.
pub trait OrbitalPhase {
    /// Returns one orbital phase (cycles, within [0, 1)) per epoch (MJD).
    fn orbital_phases(
        &self,
        mjds: &[f64],
        model: &TimingModel,
    ) -> Result<Vec<f64>, TimingModelError>;
}

/// [KeplerianPhase] propagates the mean anomaly from the reference
/// epoch, taking the orbital period derivative into account.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeplerianPhase;

impl KeplerianPhase {
    /// Orbital period (days)
    fn period_days(model: &TimingModel) -> Result<f64, TimingModelError> {
        if let Some(pb) = model.get_f64("PB")? {
            return Ok(pb);
        }
        match model.get_f64("FB0")? {
            Some(fb0) => Ok(1.0 / fb0 / SECONDS_PER_DAY),
            None => Err(TimingModelError::MissingParameter("PB")),
        }
    }

    /// Reference epoch (MJD)
    fn reference_epoch(model: &TimingModel) -> Result<f64, TimingModelError> {
        let ascending_node = model
            .binary_model()
            .map(|m| m.uses_ascending_node())
            .unwrap_or(false);

        if ascending_node {
            if let Some(tasc) = model.get_f64("TASC")? {
                return Ok(tasc);
            }
        }

        match model.get_f64("T0")? {
            Some(t0) => Ok(t0),
            None => match model.get_f64("TASC")? {
                Some(tasc) => Ok(tasc),
                None => Err(TimingModelError::MissingParameter("T0")),
            },
        }
    }

    /// Orbital period derivative (dimensionless)
    fn period_derivative(model: &TimingModel) -> Result<f64, TimingModelError> {
        let pbdot = model.get_f64("PBDOT")?.unwrap_or(0.0);
        if pbdot.abs() > PBDOT_SCALING_THRESHOLD {
            Ok(pbdot * 1.0E-12)
        } else {
            Ok(pbdot)
        }
    }
}

impl OrbitalPhase for KeplerianPhase {
    fn orbital_phases(
        &self,
        mjds: &[f64],
        model: &TimingModel,
    ) -> Result<Vec<f64>, TimingModelError> {
        let pb = Self::period_days(model)?;
        let t0 = Self::reference_epoch(model)?;
        let pbdot = Self::period_derivative(model)?;

        Ok(mjds
            .iter()
            .map(|mjd| {
                let orbits = (mjd - t0) / pb;
                let orbits = orbits - 0.5 * pbdot * orbits.powi(2);
                orbits.rem_euclid(1.0)
            })
            .collect())
    }
}
