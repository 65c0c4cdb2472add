//! Timing model (parameter file) parsing
mod binary;

pub use binary::{BinaryModel, KeplerianPhase, OrbitalPhase};

use std::{
    fs::File,
    io::{BufRead, BufReader, Read},
    path::Path,
    str::FromStr,
};

use crate::errors::TimingModelError;

/// One timing model entry
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    /// Parameter name, as written
    pub key: String,
    /// First value token
    pub value: String,
    /// Remaining tokens (fit flag, uncertainty..)
    pub extra: Vec<String>,
}

/// [TimingModel] is the key-value content of a parameter file.
/// Entries are kept in order; keys may repeat (JUMP, ..)
/// in which case lookups return the first occurrence.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimingModel {
    parameters: Vec<Parameter>,
}

/// Parses a parameter value, accepting Fortran style exponents.
fn parse_value(key: &str, value: &str) -> Result<f64, TimingModelError> {
    let normalized = value.replace(['D', 'd'], "E");
    f64::from_str(&normalized).map_err(|_| TimingModelError::InvalidNumber {
        key: key.to_string(),
        value: value.to_string(),
    })
}

impl TimingModel {
    /// Parse [TimingModel] from any [Read]able input.
    pub fn parse<R: Read>(reader: &mut BufReader<R>) -> Result<Self, TimingModelError> {
        let mut parameters = Vec::with_capacity(32);

        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            let trimmed = line.trim();

            if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with("C ") {
                continue;
            }

            let mut items = trimmed.split_ascii_whitespace();
            let key = match items.next() {
                Some(key) => key.to_string(),
                None => continue,
            };

            let value = items
                .next()
                .ok_or_else(|| TimingModelError::MissingValue {
                    line: index + 1,
                    key: key.clone(),
                })?
                .to_string();

            parameters.push(Parameter {
                key,
                value,
                extra: items.map(|s| s.to_string()).collect(),
            });
        }

        if parameters.is_empty() {
            return Err(TimingModelError::Empty);
        }

        Ok(Self { parameters })
    }

    /// Parse [TimingModel] from a local file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, TimingModelError> {
        let fd = File::open(path)?;
        let mut reader = BufReader::new(fd);
        Self::parse(&mut reader)
    }

    /// Iterates all [Parameter]s, in file order
    pub fn parameters(&self) -> impl Iterator<Item = &Parameter> {
        self.parameters.iter()
    }

    /// True if this key is defined
    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Returns the first value defined for this key
    pub fn get(&self, key: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|p| p.key == key)
            .map(|p| p.value.as_str())
    }

    /// Returns the first value defined for this key, as a number.
    pub fn get_f64(&self, key: &str) -> Result<Option<f64>, TimingModelError> {
        match self.get(key) {
            Some(value) => Ok(Some(parse_value(key, value)?)),
            None => Ok(None),
        }
    }

    /// Pulsar name (PSRJ, or PSR)
    pub fn pulsar(&self) -> Option<&str> {
        self.get("PSRJ").or_else(|| self.get("PSR"))
    }

    /// True if this timing model describes a binary system,
    /// identified by the presence of orbit defining parameters.
    pub fn is_binary(&self) -> bool {
        self.contains("BINARY") || self.contains("PB") || self.contains("FB0")
    }

    /// Returns the declared [BinaryModel], if any.
    pub fn binary_model(&self) -> Option<BinaryModel> {
        let name = self.get("BINARY")?;
        Some(BinaryModel::from_str(name).unwrap_or_else(|_| BinaryModel::Other(name.to_string())))
    }
}
