//! Dilated LSTM stack with plain, residual and attentive variants.
//!
//! Layers are grouped into chunks following the configured dilation
//! pattern; a layer with dilation `d` reuses the hidden and memory state
//! from `d` steps back instead of the immediately preceding one. Chunks
//! beyond the first are combined with the running output through an
//! additive shortcut.

use rand::rngs::StdRng;
use rand::Rng;

use crate::config::CellVariant;
use crate::graph::{ParamBinding, ParamId, ParamStore, Tape, Value};

/// Parameters of one dilated LSTM layer: gate matrices over the layer
/// input and the dilated recurrent state, plus a bias per gate row.
#[derive(Debug)]
struct Layer {
    dilation: usize,
    input_size: usize,
    hidden: usize,
    /// Input weights, `4 * hidden` rows by `input_size` columns.
    w: Vec<Vec<ParamId>>,
    /// Recurrent weights, `4 * hidden` rows by `hidden` columns.
    u: Vec<Vec<ParamId>>,
    b: Vec<ParamId>,
    /// Attention scorer (attentive variant only).
    attn_w: Vec<Vec<ParamId>>,
    attn_v: Vec<ParamId>,
}

/// Per-sequence graph state of one layer.
#[derive(Debug, Default)]
struct LayerState {
    w: Vec<Vec<Value>>,
    u: Vec<Vec<Value>>,
    b: Vec<Value>,
    attn_w: Vec<Vec<Value>>,
    attn_v: Vec<Value>,
    h_hist: Vec<Vec<Value>>,
    c_hist: Vec<Vec<Value>>,
}

fn glorot(rng: &mut StdRng, fan_in: usize, fan_out: usize) -> f64 {
    let bound = (6.0 / (fan_in + fan_out) as f64).sqrt();
    rng.gen_range(-bound..bound)
}

impl Layer {
    fn new(
        store: &mut ParamStore,
        rng: &mut StdRng,
        dilation: usize,
        input_size: usize,
        hidden: usize,
        attention_hsize: usize,
        variant: CellVariant,
    ) -> Self {
        let rows = 4 * hidden;
        let w = (0..rows)
            .map(|_| {
                (0..input_size)
                    .map(|_| store.add(glorot(rng, input_size, hidden)))
                    .collect()
            })
            .collect();
        let u = (0..rows)
            .map(|_| {
                (0..hidden)
                    .map(|_| store.add(glorot(rng, hidden, hidden)))
                    .collect()
            })
            .collect();
        let b = (0..rows).map(|_| store.add(0.0)).collect();

        let (attn_w, attn_v) = if variant == CellVariant::Attentive {
            let attn_w = (0..attention_hsize)
                .map(|_| {
                    (0..hidden)
                        .map(|_| store.add(glorot(rng, hidden, attention_hsize)))
                        .collect()
                })
                .collect();
            let attn_v = (0..attention_hsize)
                .map(|_| store.add(glorot(rng, attention_hsize, 1)))
                .collect();
            (attn_w, attn_v)
        } else {
            (Vec::new(), Vec::new())
        };

        Self {
            dilation,
            input_size,
            hidden,
            w,
            u,
            b,
            attn_w,
            attn_v,
        }
    }

    fn bind(&self, tape: &mut Tape, binding: &mut ParamBinding, store: &ParamStore) -> LayerState {
        let bind_matrix = |tape: &mut Tape, binding: &mut ParamBinding, m: &Vec<Vec<ParamId>>| {
            m.iter()
                .map(|row| row.iter().map(|id| binding.bind(tape, store, *id)).collect())
                .collect::<Vec<Vec<Value>>>()
        };
        LayerState {
            w: bind_matrix(tape, binding, &self.w),
            u: bind_matrix(tape, binding, &self.u),
            b: self
                .b
                .iter()
                .map(|id| binding.bind(tape, store, *id))
                .collect(),
            attn_w: bind_matrix(tape, binding, &self.attn_w),
            attn_v: self
                .attn_v
                .iter()
                .map(|id| binding.bind(tape, store, *id))
                .collect(),
            h_hist: Vec::new(),
            c_hist: Vec::new(),
        }
    }
}

fn matvec(tape: &mut Tape, m: &[Vec<Value>], x: &[Value]) -> Vec<Value> {
    m.iter()
        .map(|row| {
            let terms: Vec<Value> = row
                .iter()
                .zip(x.iter())
                .map(|(w, xi)| tape.mul(*w, *xi))
                .collect();
            tape.sum(&terms)
        })
        .collect()
}

/// Softmax-weighted combination of candidate states under a learned
/// additive scorer.
fn attend(
    tape: &mut Tape,
    state: &LayerState,
    candidates: &[Vec<Value>],
) -> Vec<Value> {
    if candidates.len() == 1 {
        return candidates[0].clone();
    }
    let scores: Vec<Value> = candidates
        .iter()
        .map(|h| {
            let projected = matvec(tape, &state.attn_w, h);
            let activated: Vec<Value> = projected.iter().map(|p| tape.tanh(*p)).collect();
            let terms: Vec<Value> = state
                .attn_v
                .iter()
                .zip(activated.iter())
                .map(|(v, a)| tape.mul(*v, *a))
                .collect();
            tape.sum(&terms)
        })
        .collect();
    let exps: Vec<Value> = scores.iter().map(|s| tape.exp(*s)).collect();
    let total = tape.sum(&exps);
    let weights: Vec<Value> = exps.iter().map(|e| tape.div(*e, total)).collect();

    let hidden = candidates[0].len();
    (0..hidden)
        .map(|i| {
            let terms: Vec<Value> = candidates
                .iter()
                .zip(weights.iter())
                .map(|(h, w)| tape.mul(h[i], *w))
                .collect();
            tape.sum(&terms)
        })
        .collect()
}

/// Stack of dilated LSTM chunks behind one graph-facing interface.
/// The architecture variant is fixed at construction; callers never
/// branch on it.
#[derive(Debug)]
pub struct DilatedStack {
    chunks: Vec<Vec<Layer>>,
    states: Vec<Vec<LayerState>>,
    variant: CellVariant,
}

impl DilatedStack {
    /// Register all stack parameters in `store`. The first chunk's first
    /// layer consumes `input_size`-wide vectors; everything downstream is
    /// `hidden` wide.
    pub fn new(
        store: &mut ParamStore,
        rng: &mut StdRng,
        dilations: &[Vec<usize>],
        input_size: usize,
        hidden: usize,
        attention_hsize: usize,
        variant: CellVariant,
    ) -> Self {
        let mut chunks = Vec::with_capacity(dilations.len());
        for (chunk_idx, chunk_dilations) in dilations.iter().enumerate() {
            let mut layers = Vec::with_capacity(chunk_dilations.len());
            for (layer_idx, &dilation) in chunk_dilations.iter().enumerate() {
                let in_size = if chunk_idx == 0 && layer_idx == 0 {
                    input_size
                } else {
                    hidden
                };
                layers.push(Layer::new(
                    store,
                    rng,
                    dilation,
                    in_size,
                    hidden,
                    attention_hsize,
                    variant,
                ));
            }
            chunks.push(layers);
        }
        Self {
            chunks,
            states: Vec::new(),
            variant,
        }
    }

    /// Bind parameters onto a fresh tape and clear all state history.
    pub fn start_sequence(
        &mut self,
        tape: &mut Tape,
        binding: &mut ParamBinding,
        store: &ParamStore,
    ) {
        self.states = self
            .chunks
            .iter()
            .map(|layers| {
                layers
                    .iter()
                    .map(|layer| layer.bind(tape, binding, store))
                    .collect()
            })
            .collect();
    }

    /// Consume one input vector, return the stack's hidden output.
    /// Chunks beyond the first add their output to the running value.
    pub fn step(&mut self, tape: &mut Tape, input: &[Value]) -> Vec<Value> {
        let mut out: Vec<Value> = input.to_vec();
        for (chunk_idx, layers) in self.chunks.iter().enumerate() {
            let chunk_states = &mut self.states[chunk_idx];
            let mut x = out.clone();
            for (layer_idx, layer) in layers.iter().enumerate() {
                x = step_layer(tape, layer, &mut chunk_states[layer_idx], &x, self.variant);
            }
            if chunk_idx == 0 {
                out = x;
            } else {
                out = out
                    .iter()
                    .zip(x.iter())
                    .map(|(a, b)| tape.add(*a, *b))
                    .collect();
            }
        }
        out
    }

    /// Visit every recorded memory state: (chunk, layer, time, c-state).
    pub fn for_each_memory_state<F>(&self, mut f: F)
    where
        F: FnMut(usize, usize, usize, &[Value]),
    {
        for (chunk_idx, chunk_states) in self.states.iter().enumerate() {
            for (layer_idx, state) in chunk_states.iter().enumerate() {
                for (time, c) in state.c_hist.iter().enumerate() {
                    f(chunk_idx, layer_idx, time, c);
                }
            }
        }
    }

    /// Number of chunks in the stack.
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }
}

fn step_layer(
    tape: &mut Tape,
    layer: &Layer,
    state: &mut LayerState,
    input: &[Value],
    variant: CellVariant,
) -> Vec<Value> {
    debug_assert_eq!(input.len(), layer.input_size);
    let t = state.h_hist.len();
    let hidden = layer.hidden;

    let zeros: Vec<Value>;
    let (h_prev, c_prev): (Vec<Value>, Vec<Value>) = if t >= layer.dilation {
        let h_prev = match variant {
            CellVariant::Attentive => {
                let from = t - layer.dilation;
                let candidates: Vec<Vec<Value>> = state.h_hist[from..t].to_vec();
                attend(tape, state, &candidates)
            }
            _ => state.h_hist[t - layer.dilation].clone(),
        };
        (h_prev, state.c_hist[t - layer.dilation].clone())
    } else {
        zeros = (0..hidden).map(|_| tape.leaf(0.0)).collect();
        (zeros.clone(), zeros.clone())
    };

    let wx = matvec(tape, &state.w, input);
    let uh = matvec(tape, &state.u, &h_prev);
    let pre: Vec<Value> = wx
        .iter()
        .zip(uh.iter())
        .zip(state.b.iter())
        .map(|((a, b), bias)| {
            let s = tape.add(*a, *b);
            tape.add(s, *bias)
        })
        .collect();

    let mut h = Vec::with_capacity(hidden);
    let mut c = Vec::with_capacity(hidden);
    for i in 0..hidden {
        let in_gate = tape.logistic(pre[i]);
        let forget_gate = tape.logistic(pre[hidden + i]);
        let candidate = tape.tanh(pre[2 * hidden + i]);
        let out_gate = tape.logistic(pre[3 * hidden + i]);

        let keep = tape.mul(forget_gate, c_prev[i]);
        let write = tape.mul(in_gate, candidate);
        let ci = tape.add(keep, write);
        let ct = tape.tanh(ci);
        let hi = tape.mul(out_gate, ct);
        c.push(ci);
        h.push(hi);
    }

    if variant == CellVariant::Residual && layer.input_size == hidden {
        h = h
            .iter()
            .zip(input.iter())
            .map(|(a, b)| tape.add(*a, *b))
            .collect();
    }

    state.h_hist.push(h.clone());
    state.c_hist.push(c.clone());
    h
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn build_stack(variant: CellVariant) -> (ParamStore, DilatedStack) {
        let mut store = ParamStore::new();
        let mut rng = StdRng::seed_from_u64(7);
        let stack = DilatedStack::new(
            &mut store,
            &mut rng,
            &[vec![1, 2], vec![2]],
            3,
            4,
            4,
            variant,
        );
        (store, stack)
    }

    fn run_steps(
        store: &ParamStore,
        stack: &mut DilatedStack,
        steps: usize,
    ) -> (Tape, Vec<Vec<Value>>) {
        let mut tape = Tape::new();
        let mut binding = ParamBinding::new();
        stack.start_sequence(&mut tape, &mut binding, store);
        let mut outputs = Vec::new();
        for t in 0..steps {
            let input: Vec<Value> = (0..3).map(|i| tape.leaf((t + i) as f64 * 0.1)).collect();
            outputs.push(stack.step(&mut tape, &input));
        }
        (tape, outputs)
    }

    #[test]
    fn output_width_matches_hidden_size() {
        let (store, mut stack) = build_stack(CellVariant::Plain);
        let (_, outputs) = run_steps(&store, &mut stack, 5);
        for out in &outputs {
            assert_eq!(out.len(), 4);
        }
    }

    #[test]
    fn outputs_stay_finite_and_bounded_early() {
        let (store, mut stack) = build_stack(CellVariant::Plain);
        let (tape, outputs) = run_steps(&store, &mut stack, 6);
        for out in &outputs {
            for v in out {
                assert!(tape.value(*v).is_finite());
            }
        }
    }

    #[test]
    fn memory_state_history_covers_all_layers_and_steps() {
        let (store, mut stack) = build_stack(CellVariant::Plain);
        let (_, _) = run_steps(&store, &mut stack, 5);
        let mut count = 0;
        stack.for_each_memory_state(|_, _, _, c| {
            assert_eq!(c.len(), 4);
            count += 1;
        });
        // 3 layers x 5 steps
        assert_eq!(count, 15);
    }

    #[test]
    fn dilation_skips_recent_state() {
        // With dilation 2 the step at t=2 must read the state from t=0;
        // identical inputs at t=0 and t=2 plus untouched t=1 state should
        // produce a graph that only references t-2 entries. Verified
        // structurally: c_hist grows by exactly one entry per step.
        let (store, mut stack) = build_stack(CellVariant::Plain);
        run_steps(&store, &mut stack, 4);
        let mut per_layer = std::collections::HashMap::new();
        stack.for_each_memory_state(|chunk, layer, _, _| {
            *per_layer.entry((chunk, layer)).or_insert(0) += 1;
        });
        for (_, steps) in per_layer {
            assert_eq!(steps, 4);
        }
    }

    #[test]
    fn residual_and_attentive_variants_run() {
        for variant in [CellVariant::Residual, CellVariant::Attentive] {
            let (store, mut stack) = build_stack(variant);
            let (tape, outputs) = run_steps(&store, &mut stack, 5);
            for out in &outputs {
                assert_eq!(out.len(), 4);
                for v in out {
                    assert!(tape.value(*v).is_finite());
                }
            }
        }
    }

    #[test]
    fn gradients_flow_back_to_stack_parameters() {
        let mut store = ParamStore::new();
        let mut rng = StdRng::seed_from_u64(3);
        let mut stack = DilatedStack::new(
            &mut store,
            &mut rng,
            &[vec![1]],
            2,
            3,
            3,
            CellVariant::Plain,
        );

        let mut tape = Tape::new();
        let mut binding = ParamBinding::new();
        stack.start_sequence(&mut tape, &mut binding, &store);
        let input: Vec<Value> = vec![tape.leaf(0.5), tape.leaf(-0.25)];
        let out = stack.step(&mut tape, &input);
        let loss = tape.sum(&out);

        let node_grads = tape.backward(loss);
        let grads = binding.gradients(&node_grads);
        let nonzero = grads.iter().filter(|(_, g)| g.abs() > 0.0).count();
        assert!(nonzero > 0, "at least some parameters must receive gradient");
    }
}
