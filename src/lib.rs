//! Hybrid exponential-smoothing / recurrent-network forecaster.
//!
//! Each series owns a learned multiplicative smoothing decomposition
//! (level plus up to two seasonal sequences) that normalizes its history
//! into stationary windows; a shared stack of dilated recurrent layers
//! learns the cross-series structure of those windows. Both halves sit
//! on one computation graph, so the smoothing weights train by the same
//! backward sweep as the network.
//!
//! Forecasts come from a dynamically managed ensemble: several
//! independently initialized networks compete per series, each series is
//! trained by its current top performers, and the final forecast is the
//! top-N mean of rolling per-epoch forecast averages.
//!
//! # Example
//!
//! ```no_run
//! use esrnn::config::Settings;
//! use esrnn::driver;
//! use esrnn::io;
//! use std::path::Path;
//!
//! # fn main() -> esrnn::Result<()> {
//! let mut settings = Settings::default();
//! settings.validate()?;
//! let categories = io::read_categories(Path::new("data/info.csv"))?;
//! let store = io::load_series(Path::new("data/train.csv"), &categories, &settings)?;
//! driver::run(&settings, &store, "output")?;
//! # Ok(())
//! # }
//! ```

pub mod cell;
pub mod config;
pub mod core;
pub mod driver;
pub mod ensemble;
pub mod error;
pub mod graph;
pub mod io;
pub mod model;

pub use error::{EsrnnError, Result};

/// Convenience re-exports for typical use.
pub mod prelude {
    pub use crate::config::{CellVariant, Invocation, Seasonality, Settings};
    pub use crate::core::{Series, SeriesStore};
    pub use crate::driver;
    pub use crate::error::{EsrnnError, Result};
    pub use crate::io;
}
