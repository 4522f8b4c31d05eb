//! Sliding-window normalization pipeline.
//!
//! One builder serves both the training and the validation pass, so the
//! deseasonalize → delevel → log-compress chain can never diverge
//! between them. Training injects Gaussian noise into the normalized
//! input; the category indicator is appended to every step's input.

use rand::rngs::StdRng;
use rand::Rng;

use crate::graph::{Tape, Value};
use crate::model::Decomposition;

/// One normalized window anchored at absolute position `anchor`.
///
/// `input` covers raw positions `anchor + 1 - I ..= anchor` followed by
/// the category one-hot; `labels` covers `anchor + 1 ..= anchor + H` and
/// is absent for the final out-of-sample window.
#[derive(Debug)]
pub struct NormalizedWindow {
    pub anchor: usize,
    pub input: Vec<Value>,
    pub labels: Option<Vec<Value>>,
}

/// Standard-normal draw via Box-Muller.
pub fn gaussian(rng: &mut StdRng) -> f64 {
    let u1: f64 = rng.gen::<f64>().max(f64::MIN_POSITIVE);
    let u2: f64 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

fn normalize_slice(
    tape: &mut Tape,
    vals: &[f64],
    from: usize,
    decomp: &Decomposition,
    anchor_level: Value,
) -> Vec<Value> {
    (0..vals.len())
        .map(|j| {
            let pos = from + j;
            let mut v = tape.leaf(vals[j]);
            if !decomp.seasons.is_empty() {
                v = tape.div(v, decomp.seasons[pos]);
            }
            if !decomp.seasons2.is_empty() {
                v = tape.div(v, decomp.seasons2[pos]);
            }
            let deleveled = tape.div(v, anchor_level);
            tape.ln(deleveled)
        })
        .collect()
}

/// Build every valid window of a series.
///
/// With `include_forecast_tail` the iteration runs through the last
/// observation, yielding label-less windows whose final entry is the
/// genuine out-of-sample input (validation pass). Without it, iteration
/// stops where a full label window still fits (training pass).
#[allow(clippy::too_many_arguments)]
pub fn build_windows(
    tape: &mut Tape,
    vals: &[f64],
    categories: &[f64],
    decomp: &Decomposition,
    input_size: usize,
    output_size: usize,
    include_forecast_tail: bool,
    mut noise: Option<(&mut StdRng, f64)>,
) -> Vec<NormalizedWindow> {
    let n = vals.len();
    let end = if include_forecast_tail {
        n
    } else {
        n.saturating_sub(output_size)
    };

    let mut windows = Vec::new();
    for i in (input_size - 1)..end {
        let anchor_level = decomp.levels[i];

        let from = i + 1 - input_size;
        let mut input = normalize_slice(tape, &vals[from..=i], from, decomp, anchor_level);
        if let Some((rng, std)) = noise.as_mut() {
            if *std > 0.0 {
                for v in input.iter_mut() {
                    *v = tape.add_const(*v, gaussian(rng) * *std);
                }
            }
        }
        for c in categories {
            input.push(tape.leaf(*c));
        }

        let labels = if i + output_size < n {
            let lfrom = i + 1;
            Some(normalize_slice(
                tape,
                &vals[lfrom..lfrom + output_size],
                lfrom,
                decomp,
                anchor_level,
            ))
        } else {
            None
        };

        windows.push(NormalizedWindow {
            anchor: i,
            input,
            labels,
        });
    }
    windows
}

/// Map a compressed-space forecast back to the original scale: undo the
/// log compression, restore the level, then the seasonal indices
/// covering the horizon.
pub fn denormalize_forecast(
    tape: &mut Tape,
    forecast: &[Value],
    decomp: &Decomposition,
    anchor: usize,
) -> Vec<Value> {
    forecast
        .iter()
        .enumerate()
        .map(|(h, v)| {
            let expanded = tape.exp(*v);
            let mut out = tape.mul(expanded, decomp.levels[anchor]);
            let pos = anchor + 1 + h;
            if !decomp.seasons.is_empty() {
                out = tape.mul(out, decomp.seasons[pos]);
            }
            if !decomp.seasons2.is_empty() {
                out = tape.mul(out, decomp.seasons2[pos]);
            }
            out
        })
        .collect()
}
