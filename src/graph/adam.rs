//! Parameter storage and the first-order adaptive trainer.
//!
//! Two disjoint [`ParamStore`]s exist per network: one for the shared
//! recurrent/adapter weights, one for the per-series smoothing
//! parameters. Each store has its own [`AdamTrainer`]; both share the
//! global-norm gradient clipping threshold.

use crate::graph::{Tape, Value};

/// Handle to a parameter inside a [`ParamStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamId(usize);

/// Flat store of scalar parameters with Adam moment estimates.
#[derive(Debug, Default)]
pub struct ParamStore {
    vals: Vec<f64>,
    m: Vec<f64>,
    v: Vec<f64>,
}

impl ParamStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a parameter with an initial value.
    pub fn add(&mut self, init: f64) -> ParamId {
        self.vals.push(init);
        self.m.push(0.0);
        self.v.push(0.0);
        ParamId(self.vals.len() - 1)
    }

    pub fn value(&self, id: ParamId) -> f64 {
        self.vals[id.0]
    }

    pub fn set(&mut self, id: ParamId, value: f64) {
        self.vals[id.0] = value;
    }

    pub fn len(&self) -> usize {
        self.vals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vals.is_empty()
    }
}

/// Per-graph record of which tape leaf holds which parameter, so the
/// backward sweep's node gradients can be routed back to the store.
#[derive(Debug, Default)]
pub struct ParamBinding {
    entries: Vec<(ParamId, Value)>,
}

impl ParamBinding {
    pub fn new() -> Self {
        Self::default()
    }

    /// Materialize a parameter as a leaf on the tape.
    pub fn bind(&mut self, tape: &mut Tape, store: &ParamStore, id: ParamId) -> Value {
        let leaf = tape.leaf(store.value(id));
        self.entries.push((id, leaf));
        leaf
    }

    /// Collect per-parameter gradients from a backward sweep.
    pub fn gradients(&self, node_grads: &[f64]) -> Vec<(ParamId, f64)> {
        self.entries
            .iter()
            .map(|(id, leaf)| (*id, node_grads[leaf.index()]))
            .collect()
    }

    /// True if any collected gradient would be non-finite.
    pub fn has_non_finite(&self, node_grads: &[f64]) -> bool {
        self.entries
            .iter()
            .any(|(_, leaf)| !node_grads[leaf.index()].is_finite())
    }
}

/// Adam optimizer over one parameter store, with global-norm gradient
/// clipping applied before the moment updates.
#[derive(Debug, Clone)]
pub struct AdamTrainer {
    pub learning_rate: f64,
    beta1: f64,
    beta2: f64,
    eps: f64,
    pub clip_threshold: f64,
    step: u64,
}

impl AdamTrainer {
    pub fn new(learning_rate: f64, clip_threshold: f64) -> Self {
        Self {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-6,
            clip_threshold,
            step: 0,
        }
    }

    /// Apply one update from a gradient set. Gradients exceeding the clip
    /// threshold in global L2 norm are rescaled first.
    pub fn update(&mut self, store: &mut ParamStore, grads: &[(ParamId, f64)]) {
        if grads.is_empty() {
            return;
        }
        let norm: f64 = grads.iter().map(|(_, g)| g * g).sum::<f64>().sqrt();
        let rescale = if self.clip_threshold > 0.0 && norm > self.clip_threshold {
            self.clip_threshold / norm
        } else {
            1.0
        };

        self.step += 1;
        let bc1 = 1.0 - self.beta1.powi(self.step as i32);
        let bc2 = 1.0 - self.beta2.powi(self.step as i32);

        for (id, raw_grad) in grads {
            let g = raw_grad * rescale;
            let i = id.0;
            store.m[i] = self.beta1 * store.m[i] + (1.0 - self.beta1) * g;
            store.v[i] = self.beta2 * store.v[i] + (1.0 - self.beta2) * g * g;
            let m_hat = store.m[i] / bc1;
            let v_hat = store.v[i] / bc2;
            store.vals[i] -= self.learning_rate * m_hat / (v_hat.sqrt() + self.eps);
        }
    }
}
