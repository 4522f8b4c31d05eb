//! Minimal reverse-mode computation graph.
//!
//! This is the capability contract the forecasting core consumes: a fresh
//! tape per series, scalar leaves, the handful of elementwise operations
//! the smoothing recurrence and recurrent cells need, forward values
//! computed eagerly, and a single backward sweep producing gradients. It
//! is deliberately not a general-purpose autodiff engine.

mod adam;
mod tape;

pub use adam::{AdamTrainer, ParamBinding, ParamId, ParamStore};
pub use tape::{Tape, Value};
