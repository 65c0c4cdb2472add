//! Fitter general output stream decoding
use log::trace;
use strum_macros::{Display, EnumString};

use crate::errors::ParsingError;

/// Scaling from the fitter uncertainty column (us) to seconds
const MICROSECONDS: f64 = 1.0E-6;

/// Positional column layout of a residual row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
pub enum RowLayout {
    /// epoch, residual, uncertainty, frequency, residual phase
    #[strum(serialize = "with-phase")]
    WithPhase,
    /// epoch, residual, uncertainty, frequency
    #[strum(serialize = "without-phase")]
    WithoutPhase,
}

impl RowLayout {
    pub fn new(track_phase: bool) -> Self {
        if track_phase {
            Self::WithPhase
        } else {
            Self::WithoutPhase
        }
    }

    /// Number of numeric columns preceding the row tag
    pub fn columns(&self) -> usize {
        match self {
            Self::WithPhase => 5,
            Self::WithoutPhase => 4,
        }
    }
}

/// [RawRow] is one decoded residual row, prior to any derivation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawRow {
    /// Barycentric arrival time (MJD)
    pub mjd: f64,
    /// Post-fit residual (s)
    pub residual: f32,
    /// Uncertainty (s)
    pub error: f32,
    /// Observing frequency (MHz)
    pub freq_mhz: f64,
    /// Post-fit residual (cycles). NaN when not tracked.
    pub residual_phase: f32,
}

fn parse_number(line: usize, token: &str) -> Result<f64, ParsingError> {
    token
        .parse::<f64>()
        .map_err(|_| ParsingError::InvalidNumber {
            line,
            token: token.to_string(),
        })
}

/// Decodes a single tagged line. `line` is the 1-based line number,
/// used in error reports.
fn decode_row(line: usize, content: &str, tag: &str, layout: RowLayout) -> Result<RawRow, ParsingError> {
    let tokens = content
        .split_ascii_whitespace()
        .take_while(|token| *token != tag)
        .collect::<Vec<_>>();

    let expected = layout.columns();
    if tokens.len() != expected {
        return Err(ParsingError::ColumnCount {
            line,
            expected,
            found: tokens.len(),
        });
    }

    let mjd = parse_number(line, tokens[0])?;
    let residual = parse_number(line, tokens[1])? as f32;
    let error = (parse_number(line, tokens[2])? * MICROSECONDS) as f32;
    let freq_mhz = parse_number(line, tokens[3])?;

    let residual_phase = match layout {
        RowLayout::WithPhase => parse_number(line, tokens[4])? as f32,
        RowLayout::WithoutPhase => f32::NAN,
    };

    Ok(RawRow {
        mjd,
        residual,
        error,
        freq_mhz,
        residual_phase,
    })
}

/// Decodes the fitter general output stream.
///
/// Only lines carrying `tag` as a whitespace separated token are considered:
/// banners, warnings and summaries printed by the fitter are ignored.
/// Tagged lines must then carry exactly [RowLayout::columns] numeric columns,
/// in this order: epoch, residual (s), uncertainty (us), frequency (MHz)
/// and, when tracked, residual phase (cycles).
pub fn decode_stream(stream: &str, tag: &str, layout: RowLayout) -> Result<Vec<RawRow>, ParsingError> {
    let mut rows = Vec::new();

    for (index, content) in stream.lines().enumerate() {
        if !content.split_ascii_whitespace().any(|token| token == tag) {
            continue;
        }

        let row = decode_row(index + 1, content, tag, layout)?;
        trace!("row #{}: {:?}", rows.len(), row);
        rows.push(row);
    }

    Ok(rows)
}

#[cfg(test)]
mod test {
    use super::{decode_stream, RowLayout};
    use crate::errors::ParsingError;
    use std::str::FromStr;

    const STREAM: &str = "This program comes with ABSOLUTELY NO WARRANTY.
[tempo2Util.C:396] Warning: [CLK3] no clock corrections available
Starting general2 plugin
58000.12345678901 1.2e-06 0.5 1284.0 0.000651 BLAH
58001.5 -3.5e-06 1.25 856.25 -0.0019 BLAH
Finished general2 plugin
";

    #[test]
    fn tagged_rows_only() {
        let rows = decode_stream(STREAM, "BLAH", RowLayout::WithPhase).unwrap();
        assert_eq!(rows.len(), 2);

        assert_eq!(rows[0].mjd, 58000.12345678901);
        assert_eq!(rows[0].residual, 1.2e-6_f32);
        assert!((rows[0].error - 0.5e-6).abs() < 1.0E-12);
        assert_eq!(rows[0].freq_mhz, 1284.0);
        assert_eq!(rows[0].residual_phase, 0.000651_f32);

        assert_eq!(rows[1].mjd, 58001.5);
        assert_eq!(rows[1].residual, -3.5e-6_f32);
        assert!((rows[1].error - 1.25e-6).abs() < 1.0E-12);
        assert_eq!(rows[1].freq_mhz, 856.25);
        assert_eq!(rows[1].residual_phase, -0.0019_f32);
    }

    #[test]
    fn without_phase() {
        let rows = decode_stream(
            "58000.5 1e-6 2 1284 BLAH\n",
            "BLAH",
            RowLayout::WithoutPhase,
        )
        .unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].residual_phase.is_nan());
        assert!((rows[0].error - 2.0e-6).abs() < 1.0E-12);
    }

    #[test]
    fn empty_stream() {
        let rows = decode_stream("no residuals today\n", "BLAH", RowLayout::WithPhase).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn column_count_mismatch() {
        let err = decode_stream(
            "header\n58000.5 1e-6 2 1284 BLAH\n",
            "BLAH",
            RowLayout::WithPhase,
        )
        .unwrap_err();
        match err {
            ParsingError::ColumnCount {
                line,
                expected,
                found,
            } => {
                assert_eq!(line, 2);
                assert_eq!(expected, 5);
                assert_eq!(found, 4);
            },
            e => panic!("unexpected error {:?}", e),
        }
    }

    #[test]
    fn invalid_number() {
        let err = decode_stream("58000.5 x 2 1284 0.1 BLAH\n", "BLAH", RowLayout::WithPhase)
            .unwrap_err();
        assert!(matches!(err, ParsingError::InvalidNumber { line: 1, .. }));
    }

    #[test]
    fn tag_must_be_a_token() {
        let rows = decode_stream("BLAHBLAH 1 2 3 4\n", "BLAH", RowLayout::WithPhase).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn layout() {
        assert_eq!(RowLayout::new(true), RowLayout::WithPhase);
        assert_eq!(RowLayout::WithoutPhase.columns(), 4);
        assert_eq!(
            RowLayout::from_str("with-phase").unwrap(),
            RowLayout::WithPhase
        );
        assert_eq!(RowLayout::WithoutPhase.to_string(), "without-phase");
    }
}
