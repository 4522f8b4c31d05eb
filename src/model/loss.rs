//! Loss terms: pinball forecast loss, level-variability penalty,
//! memory-state penalty and the held-out diagnostic errors.

use crate::cell::DilatedStack;
use crate::graph::{Tape, Value};

/// Asymmetric quantile (pinball) loss over one forecast window, averaged
/// over the horizon and scaled by 2.
///
/// The branch direction is decided on current forward values; the graph
/// keeps the linear `(actual - forecast)` term so gradients stay exact
/// on either side of the quantile.
pub fn pinball_loss(tape: &mut Tape, forecast: &[Value], actuals: &[Value], tau: f64) -> Value {
    debug_assert_eq!(forecast.len(), actuals.len());
    let losses: Vec<Value> = forecast
        .iter()
        .zip(actuals.iter())
        .map(|(f, a)| {
            let diff = tape.sub(*a, *f);
            if tape.value(*a) > tape.value(*f) {
                tape.scale(diff, tau)
            } else {
                tape.scale(diff, tau - 1.0)
            }
        })
        .collect();
    let total = tape.sum(&losses);
    tape.scale(total, 2.0 / forecast.len() as f64)
}

/// Penalty against erratic level movement: squared first differences of
/// the log level ratios, averaged and weighted. Needs at least two
/// ratios to form one difference.
pub fn level_variability_penalty(
    tape: &mut Tape,
    log_level_diffs: &[Value],
    weight: f64,
) -> Option<Value> {
    if weight <= 0.0 || log_level_diffs.len() < 2 {
        return None;
    }
    let squared: Vec<Value> = log_level_diffs
        .windows(2)
        .map(|pair| {
            let d = tape.sub(pair[1], pair[0]);
            tape.square(d)
        })
        .collect();
    let avg = tape.average(&squared);
    Some(tape.scale(avg, weight))
}

/// Mean squared memory state of the first layer in every chunk, across
/// all time steps, weighted.
pub fn state_penalty(tape: &mut Tape, stack: &DilatedStack, weight: f64) -> Option<Value> {
    if weight <= 0.0 {
        return None;
    }
    let mut per_step: Vec<Value> = Vec::new();
    let mut squares: Vec<Vec<Value>> = Vec::new();
    stack.for_each_memory_state(|_, layer, _, c| {
        if layer == 0 {
            squares.push(c.to_vec());
        }
    });
    for c in squares {
        let sq: Vec<Value> = c.iter().map(|v| tape.square(*v)).collect();
        per_step.push(tape.average(&sq));
    }
    if per_step.is_empty() {
        return None;
    }
    let avg = tape.average(&per_step);
    Some(tape.scale(avg, weight))
}

/// Symmetric MAPE in percent, the median-forecast backtest diagnostic.
pub fn smape(forecast: &[f64], actuals: &[f64]) -> f64 {
    let mut sum = 0.0;
    for (f, a) in forecast.iter().zip(actuals.iter()) {
        sum += (f - a).abs() / (f.abs() + a.abs());
    }
    sum / forecast.len() as f64 * 200.0
}

/// Weighted quantile loss in percent, the backtest diagnostic for
/// off-median quantiles.
pub fn wquant_loss(forecast: &[f64], actuals: &[f64], tau: f64) -> f64 {
    let mut sum = 0.0;
    let mut sum_abs = 0.0;
    for (f, a) in forecast.iter().zip(actuals.iter()) {
        sum_abs += a.abs();
        if a > f {
            sum += (a - f) * tau;
        } else {
            sum += (a - f) * (tau - 1.0);
        }
    }
    sum / sum_abs * 200.0
}

/// Backtest error: sMAPE at the median, weighted quantile loss otherwise.
pub fn holdout_error(forecast: &[f64], actuals: &[f64], percentile: u32) -> f64 {
    if percentile == 50 {
        smape(forecast, actuals)
    } else {
        wquant_loss(forecast, actuals, percentile as f64 / 100.0)
    }
}
