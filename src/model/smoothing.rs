//! Per-series learned exponential-smoothing decomposition.
//!
//! Each (series, network) pair owns a level-smoothing logit, one
//! seasonal-smoothing logit per seasonality order and an initial seasonal
//! profile per order. The logits pass through a logistic squash so the
//! smoothing weights stay in (0, 1); initial seasonal values are
//! exponentiated so indices stay positive.

use crate::config::Seasonality;
use crate::graph::{ParamBinding, ParamId, ParamStore, Tape, Value};

/// Learnable smoothing parameters of one (series, network) pair.
/// Registered once per independent run and owned by it.
#[derive(Debug)]
pub struct SmoothingParams {
    pub lev_sm: ParamId,
    pub seas_sm: Option<ParamId>,
    pub init_seasonality: Vec<ParamId>,
    pub seas_sm2: Option<ParamId>,
    pub init_seasonality2: Vec<ParamId>,
}

impl SmoothingParams {
    /// All logits start at 0.5, matching the reference initialization.
    pub fn new(store: &mut ParamStore, seasonality: Seasonality) -> Self {
        let lev_sm = store.add(0.5);
        let (seas_sm, init_seasonality) = match seasonality.period() {
            Some(p) => (
                Some(store.add(0.5)),
                (0..p).map(|_| store.add(0.5)).collect(),
            ),
            None => (None, Vec::new()),
        };
        let (seas_sm2, init_seasonality2) = match seasonality.period2() {
            Some(p2) => (
                Some(store.add(0.5)),
                (0..p2).map(|_| store.add(0.5)).collect(),
            ),
            None => (None, Vec::new()),
        };
        Self {
            lev_sm,
            seas_sm,
            init_seasonality,
            seas_sm2,
            init_seasonality2,
        }
    }
}

/// Level and seasonal sequences of one series on one tape.
///
/// `levels` has one entry per observation. Seasonal sequences are
/// ever-growing: position `t` always reads position `t - P`, and the tail
/// is extended past the series end to cover the forecast horizon.
#[derive(Debug)]
pub struct Decomposition {
    pub level_sm: Value,
    pub season_sm: Option<Value>,
    pub season_sm2: Option<Value>,
    pub levels: Vec<Value>,
    pub seasons: Vec<Value>,
    pub seasons2: Vec<Value>,
    /// Log ratios of consecutive levels, feeding the variability penalty.
    pub log_level_diffs: Vec<Value>,
}

impl Decomposition {
    /// Smallest value in a sequence, for instability diagnostics.
    fn min_of(tape: &Tape, seq: &[Value]) -> Option<f64> {
        seq.iter()
            .map(|v| tape.value(*v))
            .fold(None, |acc, x| Some(acc.map_or(x, |a: f64| a.min(x))))
    }

    pub fn min_level(&self, tape: &Tape) -> Option<f64> {
        Self::min_of(tape, &self.levels)
    }

    pub fn min_season(&self, tape: &Tape) -> Option<f64> {
        Self::min_of(tape, &self.seasons)
    }

    pub fn min_season2(&self, tape: &Tape) -> Option<f64> {
        Self::min_of(tape, &self.seasons2)
    }
}

/// Seed a seasonal sequence: one exponentiated parameter per phase, plus
/// a duplicate of the first entry to bootstrap the same-phase update.
fn seed_seasons(
    tape: &mut Tape,
    binding: &mut ParamBinding,
    store: &ParamStore,
    init: &[ParamId],
) -> Vec<Value> {
    let mut seasons: Vec<Value> = init
        .iter()
        .map(|id| {
            let logit = binding.bind(tape, store, *id);
            tape.exp(logit)
        })
        .collect();
    seasons.push(seasons[0]);
    seasons
}

/// Repeat the most recent full period so the sequence covers the
/// forecast horizon.
fn extend_tail(seasons: &mut Vec<Value>, period: usize, horizon: usize) {
    if horizon > period {
        let start = seasons.len() - period;
        for i in 0..(horizon - period) {
            let v = seasons[start + i];
            seasons.push(v);
        }
    }
}

/// Run the multiplicative smoothing recurrence over a series' raw values.
pub fn decompose(
    tape: &mut Tape,
    binding: &mut ParamBinding,
    store: &ParamStore,
    params: &SmoothingParams,
    vals: &[f64],
    horizon: usize,
    seasonality: Seasonality,
) -> Decomposition {
    let lev_logit = binding.bind(tape, store, params.lev_sm);
    let level_sm = tape.logistic(lev_logit);
    let one_minus_lev = tape.one_minus(level_sm);

    let mut levels: Vec<Value> = Vec::with_capacity(vals.len());
    let mut log_level_diffs: Vec<Value> = Vec::new();

    match seasonality {
        Seasonality::None => {
            levels.push(tape.leaf(vals[0]));
            for i in 1..vals.len() {
                let term1 = tape.scale(level_sm, vals[i]);
                let term2 = tape.mul(one_minus_lev, levels[i - 1]);
                levels.push(tape.add(term1, term2));
            }
            Decomposition {
                level_sm,
                season_sm: None,
                season_sm2: None,
                levels,
                seasons: Vec::new(),
                seasons2: Vec::new(),
                log_level_diffs,
            }
        }
        Seasonality::Single(period) => {
            let sm_logit = binding.bind(
                tape,
                store,
                params.seas_sm.expect("single seasonality requires seas_sm"),
            );
            let season_sm = tape.logistic(sm_logit);
            let one_minus_seas = tape.one_minus(season_sm);
            let mut seasons = seed_seasons(tape, binding, store, &params.init_seasonality);

            let x0 = tape.leaf(vals[0]);
            levels.push(tape.div(x0, seasons[0]));
            for i in 1..vals.len() {
                let lev_ratio = tape.div(level_sm, seasons[i]);
                let term1 = tape.scale(lev_ratio, vals[i]);
                let term2 = tape.mul(one_minus_lev, levels[i - 1]);
                let new_level = tape.add(term1, term2);
                levels.push(new_level);

                let ratio = tape.div(new_level, levels[i - 1]);
                log_level_diffs.push(tape.ln(ratio));

                let seas_ratio = tape.div(season_sm, new_level);
                let s1 = tape.scale(seas_ratio, vals[i]);
                let s2 = tape.mul(one_minus_seas, seasons[i]);
                let new_season = tape.add(s1, s2);
                seasons.push(new_season);
            }
            extend_tail(&mut seasons, period, horizon);

            Decomposition {
                level_sm,
                season_sm: Some(season_sm),
                season_sm2: None,
                levels,
                seasons,
                seasons2: Vec::new(),
                log_level_diffs,
            }
        }
        Seasonality::Double(period, period2) => {
            let sm_logit = binding.bind(
                tape,
                store,
                params.seas_sm.expect("double seasonality requires seas_sm"),
            );
            let season_sm = tape.logistic(sm_logit);
            let one_minus_seas = tape.one_minus(season_sm);
            let sm2_logit = binding.bind(
                tape,
                store,
                params
                    .seas_sm2
                    .expect("double seasonality requires seas_sm2"),
            );
            let season_sm2 = tape.logistic(sm2_logit);
            let one_minus_seas2 = tape.one_minus(season_sm2);

            let mut seasons = seed_seasons(tape, binding, store, &params.init_seasonality);
            let mut seasons2 = seed_seasons(tape, binding, store, &params.init_seasonality2);

            let x0 = tape.leaf(vals[0]);
            let joint0 = tape.mul(seasons[0], seasons2[0]);
            levels.push(tape.div(x0, joint0));
            for i in 1..vals.len() {
                let joint = tape.mul(seasons[i], seasons2[i]);
                let lev_ratio = tape.div(level_sm, joint);
                let term1 = tape.scale(lev_ratio, vals[i]);
                let term2 = tape.mul(one_minus_lev, levels[i - 1]);
                let new_level = tape.add(term1, term2);
                levels.push(new_level);

                let ratio = tape.div(new_level, levels[i - 1]);
                log_level_diffs.push(tape.ln(ratio));

                // each seasonal update deseasonalizes by the other's
                // current index
                let denom1 = tape.mul(new_level, seasons2[i]);
                let seas_ratio = tape.div(season_sm, denom1);
                let s1 = tape.scale(seas_ratio, vals[i]);
                let s2 = tape.mul(one_minus_seas, seasons[i]);
                let new_season = tape.add(s1, s2);
                seasons.push(new_season);

                let denom2 = tape.mul(new_level, seasons[i]);
                let seas2_ratio = tape.div(season_sm2, denom2);
                let t1 = tape.scale(seas2_ratio, vals[i]);
                let t2 = tape.mul(one_minus_seas2, seasons2[i]);
                let new_season2 = tape.add(t1, t2);
                seasons2.push(new_season2);
            }
            extend_tail(&mut seasons, period, horizon);
            extend_tail(&mut seasons2, period2, horizon);

            Decomposition {
                level_sm,
                season_sm: Some(season_sm),
                season_sm2: Some(season_sm2),
                levels,
                seasons,
                seasons2,
                log_level_diffs,
            }
        }
    }
}
