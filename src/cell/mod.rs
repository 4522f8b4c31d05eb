//! Dilated recurrent stack consumed by the forecasting core.
//!
//! The stack is the second external capability the pipeline relies on:
//! given a dilation pattern, input width and hidden width it exposes
//! "start a new sequence" and "consume one input, return hidden state",
//! plus read access to the internal memory-state history for the optional
//! state penalty and for instability diagnostics.

mod dilated;

pub use dilated::DilatedStack;
