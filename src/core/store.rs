//! Store of all loaded series, immutable for the process lifetime.

use crate::core::Series;

/// Ordered collection of usable series. Retains file order, drops series
/// shorter than the configured minimum and stops at the configured cap.
#[derive(Debug, Default)]
pub struct SeriesStore {
    series: Vec<Series>,
    min_length: usize,
    max_count: usize,
}

impl SeriesStore {
    /// Create an empty store with admission rules.
    /// `max_count == 0` means no cap.
    pub fn new(min_length: usize, max_count: usize) -> Self {
        Self {
            series: Vec::new(),
            min_length,
            max_count,
        }
    }

    /// Admit a series if it is long enough and the cap is not reached.
    /// Returns false once the store is full; the caller should stop
    /// feeding records at that point.
    pub fn push(&mut self, series: Series) -> bool {
        if self.is_full() {
            return false;
        }
        if series.len() >= self.min_length {
            self.series.push(series);
        }
        !self.is_full()
    }

    pub fn is_full(&self) -> bool {
        self.max_count > 0 && self.series.len() >= self.max_count
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Series> {
        self.series.iter()
    }

    /// Series by position, in admission (file) order.
    pub fn get(&self, idx: usize) -> &Series {
        &self.series[idx]
    }
}
