//! Residual files: full precision and compact forms
use std::{
    fs::File,
    io::{BufRead, BufReader, BufWriter, Read, Write},
    path::{Path, PathBuf},
    str::FromStr,
};

#[cfg(feature = "flate2")]
use flate2::read::GzDecoder;

use log::debug;

use crate::{
    errors::{FormattingError, ParsingError},
    toa::{ResidualSet, Toa},
};

/// Suffix of the full precision residual file
pub const RESIDUALS_SUFFIX: &str = "_res.txt";

/// Suffix of the compact residual file
pub const COMPACT_SUFFIX: &str = "_res_comp.txt";

/// Number of columns without orbital phase
const BASE_COLUMNS: usize = 7;

/// [ResidualPaths] locates both residual files produced for one TOA list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResidualPaths {
    /// Full precision file
    pub residuals: PathBuf,
    /// Compact file
    pub compact: PathBuf,
}

/// Base name of a TOA list, ".tim" extension removed
pub(crate) fn toa_list_stem(tim: &Path) -> String {
    let is_tim = tim
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("tim"))
        .unwrap_or(false);

    let name = if is_tim { tim.file_stem() } else { tim.file_name() };

    name.map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default()
}

impl ResidualPaths {
    /// Builds the [ResidualPaths] of this TOA list, within `out_dir`.
    pub fn for_toa_list<P: AsRef<Path>, Q: AsRef<Path>>(tim: P, out_dir: Q) -> Self {
        let stem = toa_list_stem(tim.as_ref());
        let out_dir = out_dir.as_ref();
        Self {
            residuals: out_dir.join(format!("{}{}", stem, RESIDUALS_SUFFIX)),
            compact: out_dir.join(format!("{}{}", stem, COMPACT_SUFFIX)),
        }
    }
}

/// Renders non finite values the way C printf does.
fn c_special(value: f64) -> Option<&'static str> {
    if value.is_nan() {
        Some(if value.is_sign_negative() { "-nan" } else { "nan" })
    } else if value.is_infinite() {
        Some(if value > 0.0 { "inf" } else { "-inf" })
    } else {
        None
    }
}

/// Equivalent of C "%{width}.{precision}f"
pub fn c_fixed(value: f64, width: usize, precision: usize) -> String {
    match c_special(value) {
        Some(special) => format!("{:>width$}", special, width = width),
        None => format!("{:>width$.precision$}", value, width = width, precision = precision),
    }
}

/// Equivalent of C "%.{precision}e": signed exponent of at least two digits.
pub fn c_exponent(value: f64, precision: usize) -> String {
    if let Some(special) = c_special(value) {
        return special.to_string();
    }

    let formatted = format!("{:.precision$e}", value, precision = precision);
    match formatted.split_once('e') {
        Some((mantissa, exponent)) => {
            let (sign, digits) = match exponent.strip_prefix('-') {
                Some(digits) => ('-', digits),
                None => ('+', exponent),
            };
            format!("{}e{}{:0>2}", mantissa, sign, digits)
        },
        None => formatted,
    }
}

impl Toa {
    /// Formats this [Toa] as one full precision (tab separated) line.
    /// Every value is written in its shortest exact decimal form.
    fn format_raw(&self, binary: bool) -> String {
        let mut line = format!(
            "{}\t{}\t{}\t{}\t{}\t{}\t{}",
            self.mjd,
            self.doy,
            self.residual,
            self.residual_phase,
            self.error,
            self.phase_error,
            self.freq_mhz
        );
        if binary {
            line.push_str(&format!("\t{}", self.binary_phase.unwrap_or(f64::NAN)));
        }
        line
    }

    /// Formats this [Toa] as one compact line.
    fn format_compact(&self, binary: bool) -> String {
        let mut line = [
            c_fixed(self.mjd, 12, 6),
            c_fixed(self.doy, 9, 6),
            c_exponent(self.residual as f64, 4),
            c_exponent(self.residual_phase as f64, 4),
            c_exponent(self.error as f64, 2),
            c_exponent(self.phase_error as f64, 2),
            c_fixed(self.freq_mhz, 9, 4),
        ]
        .join("\t");

        if binary {
            line.push('\t');
            line.push_str(&c_exponent(self.binary_phase.unwrap_or(f64::NAN), 8));
        }
        line
    }
}

impl ResidualSet {
    /// Formats this [ResidualSet] in full precision.
    pub fn format_raw<W: Write>(&self, writer: &mut BufWriter<W>) -> std::io::Result<()> {
        let binary = self.has_binary_phase();
        for toa in self.iter() {
            writeln!(writer, "{}", toa.format_raw(binary))?;
        }
        writer.flush()
    }

    /// Formats this [ResidualSet] in compact form.
    pub fn format_compact<W: Write>(&self, writer: &mut BufWriter<W>) -> std::io::Result<()> {
        let binary = self.has_binary_phase();
        for toa in self.iter() {
            writeln!(writer, "{}", toa.format_compact(binary))?;
        }
        writer.flush()
    }
}

fn write_file<F>(path: &Path, format: F) -> Result<(), FormattingError>
where
    F: Fn(&mut BufWriter<File>) -> std::io::Result<()>,
{
    let wrap = |source| FormattingError::Write {
        path: path.to_path_buf(),
        source,
    };

    let fd = File::create(path).map_err(wrap)?;
    let mut writer = BufWriter::new(fd);
    format(&mut writer).map_err(wrap)
}

/// Writes both residual files. Files are created (header-less,
/// without any line) even when the set is empty.
pub fn write_residuals(set: &ResidualSet, paths: &ResidualPaths) -> Result<(), FormattingError> {
    write_file(&paths.residuals, |w| set.format_raw(w))?;
    write_file(&paths.compact, |w| set.format_compact(w))?;

    debug!(
        "{} residuals written to {}",
        set.len(),
        paths.residuals.display()
    );

    Ok(())
}

fn parse_column<T: FromStr>(line: usize, token: &str) -> Result<T, ParsingError> {
    T::from_str(token).map_err(|_| ParsingError::InvalidNumber {
        line,
        token: token.to_string(),
    })
}

impl ResidualSet {
    /// Parse [ResidualSet] from any [Read]able full precision content.
    pub fn parse<R: Read>(reader: &mut BufReader<R>) -> Result<Self, ParsingError> {
        let mut toas = Vec::with_capacity(64);
        let mut width = Option::<usize>::None;

        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            let line_number = index + 1;

            let tokens = line.split_ascii_whitespace().collect::<Vec<_>>();
            if tokens.is_empty() {
                continue;
            }

            let found = tokens.len();
            if found != BASE_COLUMNS && found != BASE_COLUMNS + 1 {
                return Err(ParsingError::ColumnCount {
                    line: line_number,
                    expected: BASE_COLUMNS,
                    found,
                });
            }

            match width {
                Some(width) if width != found => {
                    return Err(ParsingError::InconsistentColumns { line: line_number });
                },
                _ => width = Some(found),
            }

            toas.push(Toa {
                mjd: parse_column(line_number, tokens[0])?,
                doy: parse_column(line_number, tokens[1])?,
                residual: parse_column(line_number, tokens[2])?,
                residual_phase: parse_column(line_number, tokens[3])?,
                error: parse_column(line_number, tokens[4])?,
                phase_error: parse_column(line_number, tokens[5])?,
                freq_mhz: parse_column(line_number, tokens[6])?,
                binary_phase: match tokens.get(7) {
                    Some(token) => Some(parse_column(line_number, token)?),
                    None => None,
                },
            });
        }

        let binary = width == Some(BASE_COLUMNS + 1);
        let mut set = ResidualSet::new(toas);
        if set.is_empty() && binary {
            set = ResidualSet::empty(true);
        }
        Ok(set)
    }
}

/// Reads a full precision residual file.
/// Gzip compressed files (.gz) are supported with the `flate2` feature.
pub fn read_residuals<P: AsRef<Path>>(path: P) -> Result<ResidualSet, ParsingError> {
    let path = path.as_ref();
    let fd = File::open(path)?;

    #[cfg(feature = "flate2")]
    {
        let gzip = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("gz"))
            .unwrap_or(false);

        if gzip {
            let mut reader = BufReader::new(GzDecoder::new(fd));
            return ResidualSet::parse(&mut reader);
        }
    }

    let mut reader = BufReader::new(fd);
    ResidualSet::parse(&mut reader)
}

#[cfg(test)]
mod test {
    use super::{c_exponent, c_fixed, read_residuals, write_residuals, ResidualPaths};
    use crate::{
        errors::ParsingError,
        toa::{ResidualSet, Toa},
    };
    use std::io::BufReader;
    use std::path::{Path, PathBuf};

    fn toa(binary_phase: Option<f64>) -> Toa {
        Toa {
            mjd: 58000.123456789,
            doy: 246.373456789,
            residual: 1.234_567E-6,
            residual_phase: 7.654_321E-4,
            error: 5.0E-7,
            phase_error: 3.1E-4,
            freq_mhz: 1284.208_984_375,
            binary_phase,
        }
    }

    #[test]
    fn c_style_numbers() {
        assert_eq!(c_exponent(1.234_567E-6, 4), "1.2346e-06");
        assert_eq!(c_exponent(-5.0E-7, 2), "-5.00e-07");
        assert_eq!(c_exponent(0.0, 2), "0.00e+00");
        assert_eq!(c_exponent(12345.0, 2), "1.23e+04");
        assert_eq!(c_exponent(1.0E-120, 2), "1.00e-120");
        assert_eq!(c_exponent(f64::NAN, 4), "nan");
        assert_eq!(c_exponent(f64::NEG_INFINITY, 4), "-inf");

        assert_eq!(c_fixed(58000.5, 12, 6), "58000.500000");
        assert_eq!(c_fixed(1.5, 9, 6), " 1.500000");
        assert_eq!(c_fixed(1284.0, 9, 4), "1284.0000");
        assert_eq!(c_fixed(856.0, 9, 4), " 856.0000");
        assert_eq!(c_fixed(f64::NAN, 9, 6), "      nan");
    }

    #[test]
    fn paths() {
        let paths = ResidualPaths::for_toa_list("/data/J0437-4715.tim", "/tmp/out");
        assert_eq!(paths.residuals, PathBuf::from("/tmp/out/J0437-4715_res.txt"));
        assert_eq!(paths.compact, PathBuf::from("/tmp/out/J0437-4715_res_comp.txt"));

        let paths = ResidualPaths::for_toa_list(Path::new("obs.toas"), ".");
        assert_eq!(paths.residuals, PathBuf::from("./obs.toas_res.txt"));
    }

    #[test]
    fn compact_line() {
        assert_eq!(
            toa(None).format_compact(false),
            "58000.123457\t246.373457\t1.2346e-06\t7.6543e-04\t5.00e-07\t3.10e-04\t1284.2090"
        );
        assert_eq!(
            toa(Some(0.25)).format_compact(true),
            "58000.123457\t246.373457\t1.2346e-06\t7.6543e-04\t5.00e-07\t3.10e-04\t1284.2090\t2.50000000e-01"
        );
    }

    #[test]
    fn raw_line() {
        let line = toa(None).format_raw(false);
        let tokens = line.split('\t').collect::<Vec<_>>();
        assert_eq!(tokens.len(), 7);
        assert_eq!(tokens[0], "58000.123456789");
        assert_eq!(tokens[2], "0.000001234567");
        assert_eq!(tokens[6], "1284.208984375");

        let line = toa(Some(0.5)).format_raw(true);
        assert!(line.ends_with("\t0.5"));
    }

    #[test]
    fn write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ResidualPaths::for_toa_list("J1939+2134.tim", dir.path());

        let mut second = toa(Some(0.75));
        second.mjd += 1.0;
        second.phase_error = f32::NAN;
        let set = ResidualSet::new(vec![toa(Some(0.125)), second]);

        write_residuals(&set, &paths).unwrap();

        let parsed = read_residuals(&paths.residuals).unwrap();
        assert_eq!(parsed.len(), 2);
        assert!(parsed.has_binary_phase());
        assert_eq!(parsed.toas()[0], set.toas()[0]);
        assert_eq!(parsed.toas()[1].mjd, second.mjd);
        assert!(parsed.toas()[1].phase_error.is_nan());
        assert_eq!(parsed.toas()[1].binary_phase, Some(0.75));

        let compact = std::fs::read_to_string(&paths.compact).unwrap();
        assert_eq!(compact.lines().count(), 2);
        assert!(compact.lines().all(|l| l.split('\t').count() == 8));
        assert!(compact.lines().nth(1).unwrap().contains("\tnan\t"));
    }

    #[test]
    fn empty_set_files() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ResidualPaths::for_toa_list("empty.tim", dir.path());

        write_residuals(&ResidualSet::default(), &paths).unwrap();

        assert_eq!(std::fs::read_to_string(&paths.residuals).unwrap(), "");
        assert_eq!(std::fs::read_to_string(&paths.compact).unwrap(), "");
        assert!(read_residuals(&paths.residuals).unwrap().is_empty());
    }

    #[test]
    fn malformed_files() {
        let parse = |content: &str| {
            let mut reader = BufReader::new(content.as_bytes());
            ResidualSet::parse(&mut reader)
        };

        assert!(matches!(
            parse("1\t2\t3\n"),
            Err(ParsingError::ColumnCount { line: 1, found: 3, .. })
        ));
        assert!(matches!(
            parse("1\t2\t3\t4\t5\t6\t7\n1\t2\t3\t4\t5\t6\t7\t8\n"),
            Err(ParsingError::InconsistentColumns { line: 2 })
        ));
        assert!(matches!(
            parse("1\t2\tres\t4\t5\t6\t7\n"),
            Err(ParsingError::InvalidNumber { line: 1, .. })
        ));
    }

    #[test]
    #[cfg(feature = "flate2")]
    fn gzip_compressed_file() {
        use flate2::{write::GzEncoder, Compression};
        use std::io::Write;

        let dir = tempfile::tempdir().unwrap();
        let paths = ResidualPaths::for_toa_list("J0437-4715.tim", dir.path());
        let set = ResidualSet::new(vec![toa(None)]);
        write_residuals(&set, &paths).unwrap();

        let content = std::fs::read(&paths.residuals).unwrap();
        let gz_path = dir.path().join("J0437-4715_res.txt.gz");
        let mut encoder = GzEncoder::new(
            std::fs::File::create(&gz_path).unwrap(),
            Compression::default(),
        );
        encoder.write_all(&content).unwrap();
        encoder.finish().unwrap();

        let parsed = read_residuals(&gz_path).unwrap();
        assert_eq!(parsed, set);
    }
}
