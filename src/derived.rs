//! Derived residual fields: day of year, phase error, orbital phase
use hifitime::Epoch;
use log::{debug, info, warn};

use crate::{
    decoder::RawRow,
    timing_model::{OrbitalPhase, TimingModel},
    toa::{ResidualSet, Toa},
};

/// Julian year length (days)
pub const DAYS_PER_YEAR: f64 = 365.25;

/// Julian date of J2000.0
const J2000_JD: f64 = 2_451_545.0;

/// Converts an MJD to a day of year, using the fixed length Julian year
/// (365.25 days) counted from J2000.0, not the civil calendar.
pub fn day_of_year(mjd: f64) -> f64 {
    let jd = Epoch::from_mjd_utc(mjd).to_jde_utc_days();
    let jyear = 2000.0 + (jd - J2000_JD) / DAYS_PER_YEAR;
    DAYS_PER_YEAR * jyear.rem_euclid(1.0)
}

/// Converts the TOA uncertainty (s) to cycles, using the phase to time ratio
/// of the residual itself. Not defined for a null residual: NaN is returned.
pub fn phase_error(residual: f32, error: f32, residual_phase: f32) -> f32 {
    if residual == 0.0 {
        debug!("null residual: phase error is undefined");
        return f32::NAN;
    }
    (residual_phase / residual) * error
}

/// Computes orbital phases for these epochs, when the timing model
/// describes a binary system. Any failure is reported and skips
/// the orbital phase column, it is never fatal.
pub fn binary_phases<O: OrbitalPhase>(
    ephemeris: &O,
    model: &TimingModel,
    mjds: &[f64],
) -> Option<Vec<f64>> {
    if !model.is_binary() {
        return None;
    }

    info!("binary pulsar detected - calculating binary phases");

    match ephemeris.orbital_phases(mjds, model) {
        Ok(phases) => Some(phases),
        Err(e) => {
            warn!("binary phase calculation failed: {}", e);
            None
        },
    }
}

/// Builds a [ResidualSet] from decoded rows, deriving day of year and phase error.
/// When provided, `binary_phases` must contain one value per row.
pub fn derive(rows: &[RawRow], binary_phases: Option<&[f64]>) -> ResidualSet {
    let binary_phases = binary_phases.filter(|phases| {
        if phases.len() != rows.len() {
            warn!(
                "{} binary phases for {} toas - skipping binary phases",
                phases.len(),
                rows.len()
            );
            return false;
        }
        true
    });

    let toas = rows
        .iter()
        .enumerate()
        .map(|(i, row)| Toa {
            mjd: row.mjd,
            doy: day_of_year(row.mjd),
            residual: row.residual,
            residual_phase: row.residual_phase,
            error: row.error,
            phase_error: phase_error(row.residual, row.error, row.residual_phase),
            freq_mhz: row.freq_mhz,
            binary_phase: binary_phases.map(|phases| phases[i]),
        })
        .collect();

    let mut set = ResidualSet::new(toas);
    if set.is_empty() && binary_phases.is_some() {
        set = ResidualSet::empty(true);
    }
    set
}

#[cfg(test)]
mod test {
    use super::{binary_phases, day_of_year, derive, phase_error};
    use crate::{
        decoder::RawRow,
        timing_model::{KeplerianPhase, TimingModel},
    };
    use std::io::BufReader;

    fn model(content: &str) -> TimingModel {
        let mut reader = BufReader::new(content.as_bytes());
        TimingModel::parse(&mut reader).unwrap()
    }

    #[test]
    fn julian_day_of_year() {
        // 2000 + (58000 - 51544.5) / 365.25 = 2017 + 246.25 / 365.25
        assert!((day_of_year(58000.0) - 246.25).abs() < 1.0E-6);
        assert!((day_of_year(51644.5) - 100.0).abs() < 1.0E-6);
        // fixed length years: no leap day correction
        assert!((day_of_year(51544.5 + 4.0 * 365.25 + 10.0) - 10.0).abs() < 1.0E-6);
    }

    #[test]
    fn phase_errors() {
        let e = phase_error(2.0E-6, 1.0E-6, 0.002);
        assert!((e - 0.001).abs() < 1.0E-9);
        let e = phase_error(-2.0E-6, 1.0E-6, -0.002);
        assert!((e - 0.001).abs() < 1.0E-9);
        assert!(phase_error(0.0, 1.0E-6, 0.0).is_nan());
    }

    #[test]
    fn derivation() {
        let rows = [
            RawRow {
                mjd: 58000.0,
                residual: 1.0E-6,
                error: 5.0E-7,
                freq_mhz: 1284.0,
                residual_phase: 0.01,
            },
            RawRow {
                mjd: 58001.0,
                residual: 0.0,
                error: 5.0E-7,
                freq_mhz: 1000.0,
                residual_phase: 0.0,
            },
        ];

        let set = derive(&rows, None);
        assert_eq!(set.len(), 2);
        assert!(!set.has_binary_phase());
        assert!((set.toas()[0].doy - 246.25).abs() < 1.0E-6);
        assert!((set.toas()[0].phase_error - 0.005).abs() < 1.0E-7);
        assert!(set.toas()[1].phase_error.is_nan());

        let set = derive(&rows, Some(&[0.1, 0.2]));
        assert!(set.has_binary_phase());
        assert_eq!(set.toas()[1].binary_phase, Some(0.2));

        // mismatched lengths are ignored
        let set = derive(&rows, Some(&[0.1]));
        assert!(!set.has_binary_phase());

        let set = derive(&[], Some(&[]));
        assert!(set.is_empty());
        assert!(set.has_binary_phase());
    }

    #[test]
    fn binary_phase_skipped() {
        let isolated = model("PSRJ J1939+2134\nF0 641.9\n");
        assert!(binary_phases(&KeplerianPhase, &isolated, &[58000.0]).is_none());

        // binary without period: reported, not fatal
        let incomplete = model("BINARY DD\nT0 58000.0\n");
        assert!(binary_phases(&KeplerianPhase, &incomplete, &[58000.0]).is_none());

        let binary = model("BINARY BT\nPB 1.0\nT0 58000.0\n");
        let phases = binary_phases(&KeplerianPhase, &binary, &[58000.5]).unwrap();
        assert!((phases[0] - 0.5).abs() < 1.0E-12);
    }
}
