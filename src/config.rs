//! Pipeline configuration
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

/// Default TOA selection window (MJD)
const DEFAULT_START_MJD: f64 = 40_000.0;
const DEFAULT_FINISH_MJD: f64 = 99_999.0;

/// [FitterConfig] describes how the external fitter is invoked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitterConfig {
    /// Fitter executable
    pub program: PathBuf,
    /// Maximal run duration in seconds. None waits forever.
    pub timeout_s: Option<u64>,
    /// First MJD considered by the fitter
    pub start_mjd: f64,
    /// Last MJD considered by the fitter
    pub finish_mjd: f64,
    /// Maximal number of observations
    pub max_obs: u32,
    /// Trailing token identifying residual rows in the output stream
    pub row_tag: String,
    /// Request and decode the residual phase column
    pub track_phase: bool,
}

impl Default for FitterConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("tempo2"),
            timeout_s: Some(600),
            start_mjd: DEFAULT_START_MJD,
            finish_mjd: DEFAULT_FINISH_MJD,
            max_obs: 1_000_000,
            row_tag: "BLAH".to_string(),
            track_phase: true,
        }
    }
}

/// [AlignmentMarker] is the synthetic reference TOA
/// appended to the TOA list when alignment is requested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignmentMarker {
    /// Sentinel label (TOA file name column)
    pub label: String,
    /// Observing frequency (MHz)
    pub freq_mhz: f64,
    /// Site arrival time (MJD)
    pub mjd: f64,
    /// TOA uncertainty (us)
    pub error_us: f64,
    /// Observatory code
    pub site: String,
    /// Frequency tolerance (MHz) when locating the marker residual
    pub freq_tolerance_mhz: f64,
    /// Epoch tolerance (days) when locating the marker residual.
    /// The fitter reports barycentric times, which differ from the
    /// site arrival time by up to ~500 s.
    pub mjd_tolerance_days: f64,
}

impl Default for AlignmentMarker {
    fn default() -> Self {
        Self {
            label: "ALIGNFAKE".to_string(),
            freq_mhz: 1284.0,
            mjd: 57754.0,
            error_us: 10.0,
            site: "meerkat".to_string(),
            freq_tolerance_mhz: 1.0E-3,
            mjd_tolerance_days: 0.5,
        }
    }
}

impl AlignmentMarker {
    /// Formats this marker as a TOA list line.
    pub fn toa_line(&self) -> String {
        format!(
            "{} {:.1} {:.1} {} {}\n",
            self.label, self.freq_mhz, self.mjd, self.error_us, self.site
        )
    }

    /// True if a residual at (mjd, freq) may be this marker.
    pub fn matches(&self, mjd: f64, freq_mhz: f64) -> bool {
        (freq_mhz - self.freq_mhz).abs() <= self.freq_tolerance_mhz
            && (mjd - self.mjd).abs() <= self.mjd_tolerance_days
    }
}

/// Outlier rejection settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutlierConfig {
    /// Rejection threshold in units of robust sigma
    pub factor: f64,
}

impl Default for OutlierConfig {
    fn default() -> Self {
        Self { factor: 3.0 }
    }
}

/// Band description used by the reporting helpers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Band centre frequency (MHz)
    pub centre_freq_mhz: f64,
    /// Total bandwidth (MHz)
    pub bandwidth_mhz: f64,
    /// Number of frequency channels, when known
    pub nchan: Option<usize>,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            centre_freq_mhz: 1284.0,
            bandwidth_mhz: 856.0,
            nchan: None,
        }
    }
}

impl DisplayConfig {
    /// Returns (lowest, highest) frequency of the band (MHz)
    pub fn band_edges(&self) -> (f64, f64) {
        let half = self.bandwidth_mhz / 2.0;
        (self.centre_freq_mhz - half, self.centre_freq_mhz + half)
    }
}

/// [PipelineConfig] gathers all settings, passed explicitly
/// to every processing stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub fitter: FitterConfig,
    pub alignment: AlignmentMarker,
    pub outliers: OutlierConfig,
    pub display: DisplayConfig,
}

impl PipelineConfig {
    /// Parses a [PipelineConfig] from TOML content.
    /// Missing fields take their default value.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let cfg = toml::from_str(content)?;
        Ok(cfg)
    }

    /// Loads a [PipelineConfig] from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }
}

#[cfg(test)]
mod test {
    use super::{AlignmentMarker, PipelineConfig};
    use std::path::PathBuf;

    #[test]
    fn empty_toml_is_default() {
        let cfg = PipelineConfig::from_toml_str("").unwrap();
        assert_eq!(cfg, PipelineConfig::default());
        assert_eq!(cfg.fitter.program, PathBuf::from("tempo2"));
        assert_eq!(cfg.fitter.row_tag, "BLAH");
        assert_eq!(cfg.outliers.factor, 3.0);
    }

    #[test]
    fn partial_override() {
        let cfg = PipelineConfig::from_toml_str(
            "[fitter]\nprogram = \"/opt/tempo2/bin/tempo2\"\ntimeout_s = 30\n\n[display]\nnchan = 16\n",
        )
        .unwrap();
        assert_eq!(cfg.fitter.program, PathBuf::from("/opt/tempo2/bin/tempo2"));
        assert_eq!(cfg.fitter.timeout_s, Some(30));
        assert_eq!(cfg.fitter.max_obs, 1_000_000);
        assert_eq!(cfg.display.nchan, Some(16));
        assert_eq!(cfg.display.bandwidth_mhz, 856.0);
    }

    #[test]
    fn invalid_toml() {
        assert!(PipelineConfig::from_toml_str("[fitter]\ntimeout_s = \"soon\"").is_err());
    }

    #[test]
    fn marker_line() {
        let marker = AlignmentMarker::default();
        assert_eq!(marker.toa_line(), "ALIGNFAKE 1284.0 57754.0 10 meerkat\n");
        assert!(marker.matches(57754.004, 1284.0));
        assert!(!marker.matches(57754.004, 1283.0));
        assert!(!marker.matches(57755.0, 1284.0));
    }

    #[test]
    fn band_edges() {
        let cfg = PipelineConfig::default();
        assert_eq!(cfg.display.band_edges(), (856.0, 1712.0));
    }
}
