//! The hybrid model: smoothing decomposition, window normalization,
//! loss terms and the per-network forecaster.

mod loss;
mod network;
mod smoothing;
mod windows;

pub use loss::{
    holdout_error, level_variability_penalty, pinball_loss, smape, state_penalty, wquant_loss,
};
pub use network::{Network, TrainStats, ValidationOutcome};
pub use smoothing::{decompose, Decomposition, SmoothingParams};
pub use windows::{build_windows, denormalize_forecast, gaussian, NormalizedWindow};
