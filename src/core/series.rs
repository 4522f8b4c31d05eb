//! A single time series with its category indicator and optional
//! held-out backtest window.

use crate::error::{EsrnnError, Result};

/// Fixed category vocabulary. Every series must carry exactly one of
/// these; anything else aborts the run.
pub const CATEGORIES: [&str; 6] = [
    "Demographic",
    "Finance",
    "Industry",
    "Macro",
    "Micro",
    "Other",
];

/// One-hot indicator for a category name.
pub fn category_one_hot(category: &str) -> Result<Vec<f64>> {
    let mut one_hot = vec![0.0; CATEGORIES.len()];
    match CATEGORIES.iter().position(|c| *c == category) {
        Some(idx) => {
            one_hot[idx] = 1.0;
            Ok(one_hot)
        }
        None => Err(EsrnnError::UnknownCategory(category.to_string())),
    }
}

/// Strip punctuation from a raw series identifier field.
pub fn clean_series_id(raw: &str) -> String {
    raw.chars().filter(|c| !c.is_ascii_punctuation()).collect()
}

/// Parse comma-separated observation fields.
///
/// Quote characters and stray carriage returns are removed; a trailing
/// empty field terminates the series. Malformed numeric fields parse as
/// zero, a quirk preserved from the reference data pipeline rather than
/// a deliberate tolerance policy.
pub fn parse_observations(fields: &str) -> Vec<f64> {
    let mut vals = Vec::new();
    for field in fields.split(',') {
        let cleaned: String = field.chars().filter(|c| *c != '"' && *c != '\r').collect();
        if cleaned.is_empty() {
            break;
        }
        vals.push(cleaned.parse::<f64>().unwrap_or(0.0));
    }
    vals
}

/// Immutable per-series data: observations, optional held-out tail and
/// the category indicator. Loaded once, never mutated during training.
#[derive(Debug, Clone)]
pub struct Series {
    id: String,
    vals: Vec<f64>,
    test_vals: Vec<f64>,
    categories: Vec<f64>,
}

impl Series {
    /// Build a series, extracting the backtest window and truncating
    /// over-long history.
    ///
    /// With `holdback > 0`, the `holdback * horizon` trailing points are
    /// removed from the training-visible values and the first horizon of
    /// that removed region becomes the test window. Series shorter than
    /// the held-out region end up with zero usable points and are dropped
    /// by the store. The oldest points beyond `max_length` are discarded.
    pub fn new(
        id: String,
        category: &str,
        mut vals: Vec<f64>,
        holdback: usize,
        horizon: usize,
        max_length: usize,
    ) -> Result<Self> {
        let categories = category_one_hot(category)?;

        let mut test_vals = Vec::new();
        if holdback > 0 {
            let withheld = holdback * horizon;
            if vals.len() > withheld {
                let first = vals.len() - withheld;
                test_vals = vals[first..first + horizon].to_vec();
                vals.truncate(vals.len() - withheld);
            } else {
                vals.clear();
            }
        }
        if max_length > 0 && vals.len() > max_length {
            vals.drain(..vals.len() - max_length);
        }

        Ok(Self {
            id,
            vals,
            test_vals,
            categories,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Training-visible observations.
    pub fn vals(&self) -> &[f64] {
        &self.vals
    }

    /// Number of training-visible observations.
    pub fn len(&self) -> usize {
        self.vals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vals.is_empty()
    }

    /// Held-out test window; empty unless holdback > 0.
    pub fn test_vals(&self) -> &[f64] {
        &self.test_vals
    }

    /// One-hot category indicator.
    pub fn categories(&self) -> &[f64] {
        &self.categories
    }
}
