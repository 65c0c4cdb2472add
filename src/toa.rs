//! Time of arrival residual records

/// [Toa] is one time-of-arrival residual measurement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Toa {
    /// Arrival epoch (MJD)
    pub mjd: f64,
    /// Day of year, 365.25 day year convention
    pub doy: f64,
    /// Post-fit residual (s)
    pub residual: f32,
    /// Post-fit residual (cycles), within (-0.5, 0.5]
    pub residual_phase: f32,
    /// TOA uncertainty (s)
    pub error: f32,
    /// TOA uncertainty (cycles)
    pub phase_error: f32,
    /// Observing frequency (MHz)
    pub freq_mhz: f64,
    /// Orbital phase (cycles), binary pulsars only
    pub binary_phase: Option<f64>,
}

/// [ResidualSet] is the ordered collection of [Toa]s produced by one
/// fitter run. Ordering follows emission order, not epoch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResidualSet {
    toas: Vec<Toa>,
    /// True when the orbital phase column is present
    binary: bool,
}

impl ResidualSet {
    /// Builds a [ResidualSet]. The orbital phase column is
    /// declared present if any record carries one.
    pub fn new(toas: Vec<Toa>) -> Self {
        let binary = toas.iter().any(|toa| toa.binary_phase.is_some());
        Self { toas, binary }
    }

    /// Builds an empty [ResidualSet] declaring the orbital phase column.
    pub fn empty(binary: bool) -> Self {
        Self {
            toas: Vec::new(),
            binary,
        }
    }

    pub fn len(&self) -> usize {
        self.toas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.toas.is_empty()
    }

    /// True if orbital phases were computed for this set
    pub fn has_binary_phase(&self) -> bool {
        self.binary
    }

    pub fn toas(&self) -> &[Toa] {
        &self.toas
    }

    pub fn toas_mut(&mut self) -> &mut [Toa] {
        &mut self.toas
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Toa> {
        self.toas.iter()
    }

    /// Drops every record. The column layout is retained.
    pub fn clear(&mut self) {
        self.toas.clear();
    }

    /// Removes and returns the record at `index`.
    pub(crate) fn remove(&mut self, index: usize) -> Toa {
        self.toas.remove(index)
    }

    /// Returns a new [ResidualSet] with the records that satisfy `f`,
    /// preserving their relative order and the column layout.
    pub fn filter<F: Fn(&Toa) -> bool>(&self, f: F) -> Self {
        Self {
            toas: self.toas.iter().filter(|toa| f(toa)).copied().collect(),
            binary: self.binary,
        }
    }

    pub fn into_inner(self) -> Vec<Toa> {
        self.toas
    }
}

impl<'a> IntoIterator for &'a ResidualSet {
    type Item = &'a Toa;
    type IntoIter = std::slice::Iter<'a, Toa>;
    fn into_iter(self) -> Self::IntoIter {
        self.toas.iter()
    }
}
