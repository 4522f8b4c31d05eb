//! Error types for the esrnn library.

use thiserror::Error;

/// Result type alias for forecasting operations.
pub type Result<T> = std::result::Result<T, EsrnnError>;

/// Diagnostic extremes captured when a per-series training step goes
/// numerically unstable. Recorded before the partial gradient is discarded.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct InstabilityReport {
    /// Smallest seasonal index seen in the first seasonal sequence.
    pub min_season: Option<f64>,
    /// Smallest seasonal index seen in the second seasonal sequence.
    pub min_season2: Option<f64>,
    /// Smallest level value.
    pub min_level: Option<f64>,
    /// Largest-magnitude recurrent memory state.
    pub max_abs_state: f64,
    /// Time step of the largest-magnitude state.
    pub time_of_max: usize,
    /// Layer index (within its chunk) of the largest-magnitude state.
    pub layer_of_max: usize,
    /// Chunk index of the largest-magnitude state.
    pub chunk_of_max: usize,
}

/// Errors that can occur during training and forecasting.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EsrnnError {
    /// A series carries a category outside the fixed vocabulary. Fatal.
    #[error("unknown category: {0}")]
    UnknownCategory(String),

    /// Seasonality order other than 0, 1 or 2 was configured. Fatal.
    #[error("unsupported seasonality order: {0}")]
    UnknownSeasonality(usize),

    /// Invalid configuration value.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Series too short to build a single training window.
    #[error("insufficient data: need at least {needed}, got {got}")]
    InsufficientData { needed: usize, got: usize },

    /// A per-series forward/backward step produced non-finite values.
    /// Recovered locally: the gradient is discarded and training continues.
    #[error("numeric instability while training series {series}")]
    NumericInstability {
        series: String,
        report: InstabilityReport,
    },

    /// Wrong number of command-line arguments.
    #[error("usage error: {0}")]
    Usage(String),

    /// I/O failure reading input or writing forecasts.
    #[error("io error: {0}")]
    Io(String),
}

impl From<std::io::Error> for EsrnnError {
    fn from(e: std::io::Error) -> Self {
        EsrnnError::Io(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages_are_descriptive() {
        let err = EsrnnError::UnknownCategory("Weather".to_string());
        assert_eq!(err.to_string(), "unknown category: Weather");

        let err = EsrnnError::UnknownSeasonality(3);
        assert_eq!(err.to_string(), "unsupported seasonality order: 3");

        let err = EsrnnError::InsufficientData { needed: 23, got: 5 };
        assert_eq!(err.to_string(), "insufficient data: need at least 23, got 5");
    }

    #[test]
    fn errors_are_clonable_and_comparable() {
        let err1 = EsrnnError::NumericInstability {
            series: "D17".to_string(),
            report: InstabilityReport::default(),
        };
        let err2 = err1.clone();
        assert_eq!(err1, err2);
    }
}
