//! One specialist network: shared recurrent/adapter parameters, the
//! per-series smoothing parameters it trains, and the pair of Adam
//! trainers over those two disjoint collections.
//!
//! The training and validation passes share one graph-assembly path so
//! the recurrence and window construction can never diverge.

use rand::rngs::StdRng;
use rand::Rng;

use crate::config::Settings;
use crate::core::Series;
use crate::error::{EsrnnError, InstabilityReport, Result};
use crate::graph::{AdamTrainer, ParamBinding, ParamId, ParamStore, Tape, Value};
use crate::cell::DilatedStack;
use crate::model::{
    build_windows, decompose, denormalize_forecast, level_variability_penalty, pinball_loss,
    state_penalty, Decomposition, SmoothingParams,
};

/// Loss components of one per-series training step.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrainStats {
    pub loss: f64,
    pub forecast_loss: f64,
    pub level_penalty: f64,
    pub state_penalty: f64,
    /// Squashed level-smoothing weight, kept for diagnostics history.
    pub level_sm: f64,
    pub season_sm: Option<f64>,
    pub season_sm2: Option<f64>,
}

/// Outcome of one per-series validation pass.
#[derive(Debug, Clone)]
pub struct ValidationOutcome {
    /// Average in-sample pinball loss over training-region windows; the
    /// ranking metric.
    pub in_sample_loss: f64,
    /// Out-of-sample point forecast in original scale.
    pub forecast: Vec<f64>,
}

/// A specialist network of the ensemble.
pub struct Network {
    pub shared: ParamStore,
    pub per_series: ParamStore,
    pub trainer: AdamTrainer,
    pub per_series_trainer: AdamTrainer,
    stack: DilatedStack,
    mlp_w: Option<Vec<Vec<ParamId>>>,
    mlp_b: Option<Vec<ParamId>>,
    adapter_w: Vec<Vec<ParamId>>,
    adapter_b: Vec<ParamId>,
    smoothing: Vec<SmoothingParams>,
}

fn init_matrix(
    store: &mut ParamStore,
    rng: &mut StdRng,
    rows: usize,
    cols: usize,
) -> Vec<Vec<ParamId>> {
    let bound = (6.0 / (rows + cols) as f64).sqrt();
    (0..rows)
        .map(|_| {
            (0..cols)
                .map(|_| store.add(rng.gen_range(-bound..bound)))
                .collect()
        })
        .collect()
}

fn bind_matrix(
    tape: &mut Tape,
    binding: &mut ParamBinding,
    store: &ParamStore,
    m: &[Vec<ParamId>],
) -> Vec<Vec<Value>> {
    m.iter()
        .map(|row| row.iter().map(|id| binding.bind(tape, store, *id)).collect())
        .collect()
}

fn matvec_add(tape: &mut Tape, m: &[Vec<Value>], x: &[Value], b: &[Value]) -> Vec<Value> {
    m.iter()
        .zip(b.iter())
        .map(|(row, bias)| {
            let terms: Vec<Value> = row
                .iter()
                .zip(x.iter())
                .map(|(w, xi)| tape.mul(*w, *xi))
                .collect();
            let s = tape.sum(&terms);
            tape.add(s, *bias)
        })
        .collect()
}

struct Assembled {
    tape: Tape,
    shared_binding: ParamBinding,
    series_binding: ParamBinding,
    decomp: Decomposition,
    window_losses: Vec<Value>,
    final_forecast: Option<Vec<Value>>,
}

impl Network {
    /// Fresh parameters for one independent run. Registers the smoothing
    /// parameters of every series in store order.
    pub fn new(settings: &Settings, series_count: usize, rng: &mut StdRng) -> Self {
        let mut shared = ParamStore::new();
        let mut per_series = ParamStore::new();

        let input_width = settings.input_size + crate::core::CATEGORIES.len();
        let stack = DilatedStack::new(
            &mut shared,
            rng,
            &settings.dilations,
            input_width,
            settings.state_hsize,
            settings.attention_hsize,
            settings.cell_variant,
        );

        let (mlp_w, mlp_b) = if settings.add_nl_layer {
            let w = init_matrix(&mut shared, rng, settings.state_hsize, settings.state_hsize);
            let b = (0..settings.state_hsize).map(|_| shared.add(0.0)).collect();
            (Some(w), Some(b))
        } else {
            (None, None)
        };
        let adapter_w = init_matrix(&mut shared, rng, settings.output_size, settings.state_hsize);
        let adapter_b = (0..settings.output_size).map(|_| shared.add(0.0)).collect();

        let smoothing = (0..series_count)
            .map(|_| SmoothingParams::new(&mut per_series, settings.seasonality))
            .collect();

        let trainer = AdamTrainer::new(settings.initial_learning_rate, settings.gradient_clipping);
        let per_series_trainer = AdamTrainer::new(
            settings.initial_learning_rate * settings.per_series_lr_multiplier,
            settings.gradient_clipping,
        );

        Self {
            shared,
            per_series,
            trainer,
            per_series_trainer,
            stack,
            mlp_w,
            mlp_b,
            adapter_w,
            adapter_b,
            smoothing,
        }
    }

    /// Apply a manual learning-rate override to both trainers.
    pub fn set_learning_rate(&mut self, rate: f64, per_series_multiplier: f64) {
        self.trainer.learning_rate = rate;
        self.per_series_trainer.learning_rate = rate * per_series_multiplier;
    }

    /// Build the full per-series graph: smoothing recurrence, normalized
    /// windows, recurrent stack and adapter, plus window losses and (for
    /// the validation pass) the final out-of-sample forecast.
    fn assemble(
        &mut self,
        series: &Series,
        series_idx: usize,
        settings: &Settings,
        include_forecast_tail: bool,
        mut noise_rng: Option<&mut StdRng>,
    ) -> Assembled {
        let mut tape = Tape::new();
        let mut shared_binding = ParamBinding::new();
        let mut series_binding = ParamBinding::new();

        let decomp = decompose(
            &mut tape,
            &mut series_binding,
            &self.per_series,
            &self.smoothing[series_idx],
            series.vals(),
            settings.output_size,
            settings.seasonality,
        );

        self.stack
            .start_sequence(&mut tape, &mut shared_binding, &self.shared);
        let mlp = match (&self.mlp_w, &self.mlp_b) {
            (Some(w), Some(b)) => Some((
                bind_matrix(&mut tape, &mut shared_binding, &self.shared, w),
                b.iter()
                    .map(|id| shared_binding.bind(&mut tape, &self.shared, *id))
                    .collect::<Vec<Value>>(),
            )),
            _ => None,
        };
        let adapter_w = bind_matrix(&mut tape, &mut shared_binding, &self.shared, &self.adapter_w);
        let adapter_b: Vec<Value> = self
            .adapter_b
            .iter()
            .map(|id| shared_binding.bind(&mut tape, &self.shared, *id))
            .collect();

        let noise = noise_rng
            .as_deref_mut()
            .map(|rng| (rng, settings.noise_std));
        let windows = build_windows(
            &mut tape,
            series.vals(),
            series.categories(),
            &decomp,
            settings.input_size,
            settings.output_size,
            include_forecast_tail,
            noise,
        );

        let mut window_losses = Vec::new();
        let mut final_forecast = None;
        let last_anchor = series.len() - 1;
        for window in &windows {
            let hidden = self.stack.step(&mut tape, &window.input);
            let out = match &mlp {
                Some((w, b)) => {
                    let pre = matvec_add(&mut tape, w, &hidden, b);
                    let act: Vec<Value> = pre.iter().map(|v| tape.tanh(*v)).collect();
                    matvec_add(&mut tape, &adapter_w, &act, &adapter_b)
                }
                None => matvec_add(&mut tape, &adapter_w, &hidden, &adapter_b),
            };

            if let Some(labels) = &window.labels {
                if window.anchor >= settings.input_size + settings.min_inp_seq_len {
                    let loss =
                        pinball_loss(&mut tape, &out, labels, settings.training_tau());
                    window_losses.push(loss);
                }
            }
            if include_forecast_tail && window.anchor == last_anchor {
                final_forecast = Some(denormalize_forecast(
                    &mut tape,
                    &out,
                    &decomp,
                    window.anchor,
                ));
            }
        }

        Assembled {
            tape,
            shared_binding,
            series_binding,
            decomp,
            window_losses,
            final_forecast,
        }
    }

    /// Diagnostic extremes for a numerically unstable step.
    fn instability_report(&self, tape: &Tape, decomp: &Decomposition) -> InstabilityReport {
        let mut report = InstabilityReport {
            min_season: decomp.min_season(tape),
            min_season2: decomp.min_season2(tape),
            min_level: decomp.min_level(tape),
            ..Default::default()
        };
        self.stack.for_each_memory_state(|chunk, layer, time, c| {
            for v in c {
                let abs = tape.value(*v).abs();
                if abs > report.max_abs_state || !abs.is_finite() {
                    report.max_abs_state = abs;
                    report.time_of_max = time;
                    report.layer_of_max = layer;
                    report.chunk_of_max = chunk;
                }
            }
        });
        report
    }

    /// One training step on one series: forward, backward, and an update
    /// of both trainers. On numeric instability the accumulated gradient
    /// is discarded and an error carrying diagnostics is returned; the
    /// caller continues with the next series.
    pub fn train_series(
        &mut self,
        series: &Series,
        series_idx: usize,
        settings: &Settings,
        rng: &mut StdRng,
    ) -> Result<TrainStats> {
        let assembled = self.assemble(series, series_idx, settings, false, Some(rng));
        let Assembled {
            mut tape,
            shared_binding,
            series_binding,
            decomp,
            window_losses,
            ..
        } = assembled;

        let forecast_loss = tape.average(&window_losses);
        let mut total = forecast_loss;

        let mut level_pen_val = 0.0;
        if let Some(pen) = level_variability_penalty(
            &mut tape,
            &decomp.log_level_diffs,
            settings.level_variability_penalty,
        ) {
            level_pen_val = tape.value(pen);
            total = tape.add(total, pen);
        }
        let mut state_pen_val = 0.0;
        if let Some(pen) = state_penalty(&mut tape, &self.stack, settings.c_state_penalty) {
            state_pen_val = tape.value(pen);
            total = tape.add(total, pen);
        }

        let loss = tape.value(total);
        let unstable = |report: InstabilityReport| EsrnnError::NumericInstability {
            series: series.id().to_string(),
            report,
        };
        if !loss.is_finite() {
            return Err(unstable(self.instability_report(&tape, &decomp)));
        }

        let node_grads = tape.backward(total);
        if shared_binding.has_non_finite(&node_grads)
            || series_binding.has_non_finite(&node_grads)
        {
            return Err(unstable(self.instability_report(&tape, &decomp)));
        }

        let shared_grads = shared_binding.gradients(&node_grads);
        let series_grads = series_binding.gradients(&node_grads);
        self.trainer.update(&mut self.shared, &shared_grads);
        self.per_series_trainer
            .update(&mut self.per_series, &series_grads);

        Ok(TrainStats {
            loss,
            forecast_loss: loss - level_pen_val - state_pen_val,
            level_penalty: level_pen_val,
            state_penalty: state_pen_val,
            level_sm: tape.value(decomp.level_sm),
            season_sm: decomp.season_sm.map(|v| tape.value(v)),
            season_sm2: decomp.season_sm2.map(|v| tape.value(v)),
        })
    }

    /// Gradient-free validation pass over the full series: the average
    /// in-sample loss used for ranking plus the out-of-sample forecast
    /// in original scale.
    pub fn validate_series(
        &mut self,
        series: &Series,
        series_idx: usize,
        settings: &Settings,
    ) -> ValidationOutcome {
        let assembled = self.assemble(series, series_idx, settings, true, None);
        let Assembled {
            mut tape,
            window_losses,
            final_forecast,
            ..
        } = assembled;

        let in_sample_loss = if window_losses.is_empty() {
            f64::INFINITY
        } else {
            let avg = tape.average(&window_losses);
            tape.value(avg)
        };

        let forecast = final_forecast
            .map(|vs| vs.iter().map(|v| tape.value(*v)).collect())
            .unwrap_or_default();

        ValidationOutcome {
            in_sample_loss,
            forecast,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Seasonality;
    use rand::SeedableRng;

    fn tiny_settings() -> Settings {
        Settings {
            seasonality: Seasonality::Single(4),
            input_size: 4,
            output_size: 4,
            dilations: vec![vec![1, 2]],
            state_hsize: 6,
            attention_hsize: 6,
            level_variability_penalty: 10.0,
            c_state_penalty: 0.0,
            epochs: 2,
            num_of_nets: 2,
            topn: 1,
            averaging_level: 2,
            big_loop: 1,
            ..Default::default()
        }
    }

    fn seasonal_series(n: usize) -> Series {
        let vals: Vec<f64> = (0..n)
            .map(|i| 100.0 + [5.0, -3.0, 1.0, -2.0][i % 4] + 0.1 * i as f64)
            .collect();
        Series::new("T1".into(), "Micro", vals, 0, 4, 1000).unwrap()
    }

    #[test]
    fn training_step_produces_finite_loss_and_updates() {
        let settings = tiny_settings();
        let mut rng = StdRng::seed_from_u64(5);
        let series = seasonal_series(40);
        let mut net = Network::new(&settings, 1, &mut rng);

        let before = net.shared.value(net.adapter_b[0]);
        let stats = net.train_series(&series, 0, &settings, &mut rng).unwrap();
        assert!(stats.loss.is_finite());
        assert!(stats.level_penalty >= 0.0);
        let after = net.shared.value(net.adapter_b[0]);
        assert_ne!(before, after, "shared parameters must move");
    }

    #[test]
    fn training_moves_per_series_parameters() {
        let settings = tiny_settings();
        let mut rng = StdRng::seed_from_u64(6);
        let series = seasonal_series(40);
        let mut net = Network::new(&settings, 1, &mut rng);

        let lev_id = net.smoothing[0].lev_sm;
        let before = net.per_series.value(lev_id);
        net.train_series(&series, 0, &settings, &mut rng).unwrap();
        let after = net.per_series.value(lev_id);
        assert_ne!(before, after, "per-series parameters must move");
    }

    #[test]
    fn validation_returns_full_horizon_forecast() {
        let settings = tiny_settings();
        let mut rng = StdRng::seed_from_u64(7);
        let series = seasonal_series(40);
        let mut net = Network::new(&settings, 1, &mut rng);

        let outcome = net.validate_series(&series, 0, &settings);
        assert!(outcome.in_sample_loss.is_finite());
        assert_eq!(outcome.forecast.len(), 4);
        for v in &outcome.forecast {
            assert!(v.is_finite());
            // forecasts of a ~100-level series should be in a sane range
            // even untrained, thanks to the smoothing normalization
            assert!(*v > 0.0 && *v < 1000.0);
        }
    }

    #[test]
    fn validation_never_trains() {
        let settings = tiny_settings();
        let mut rng = StdRng::seed_from_u64(8);
        let series = seasonal_series(40);
        let mut net = Network::new(&settings, 1, &mut rng);

        let shared_before = net.shared.value(net.adapter_b[0]);
        let series_before = net.per_series.value(net.smoothing[0].lev_sm);
        net.validate_series(&series, 0, &settings);
        assert_eq!(shared_before, net.shared.value(net.adapter_b[0]));
        assert_eq!(series_before, net.per_series.value(net.smoothing[0].lev_sm));
    }

    #[test]
    fn learning_rate_override_scales_per_series_trainer() {
        let settings = tiny_settings();
        let mut rng = StdRng::seed_from_u64(9);
        let mut net = Network::new(&settings, 1, &mut rng);
        net.set_learning_rate(1e-4, 2.0);
        assert_eq!(net.trainer.learning_rate, 1e-4);
        assert_eq!(net.per_series_trainer.learning_rate, 2e-4);
    }
}
