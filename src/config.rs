//! Run configuration for the hybrid forecaster.
//!
//! A [`Settings`] value describes one complete training/forecasting setup:
//! the smoothing seasonality, the recurrent stack geometry, the loss
//! weights, the optimizer schedule and the ensemble shape. Defaults mirror
//! a daily-data setup (weekly seasonality, 14-step horizon).

use crate::error::{EsrnnError, Result};

/// Seasonal structure of the smoothing recurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Seasonality {
    /// No seasonal indices; plain exponential smoothing of the level.
    None,
    /// One seasonal sequence with the given period.
    Single(usize),
    /// Two interacting seasonal sequences (e.g. daily and weekly for
    /// hourly data).
    Double(usize, usize),
}

impl Seasonality {
    /// Build from a numeric order, as configured externally.
    /// Orders other than 0/1/2 are a fatal configuration error.
    pub fn from_order(order: usize, period1: usize, period2: usize) -> Result<Self> {
        match order {
            0 => Ok(Seasonality::None),
            1 => Ok(Seasonality::Single(period1)),
            2 => Ok(Seasonality::Double(period1, period2)),
            other => Err(EsrnnError::UnknownSeasonality(other)),
        }
    }

    /// Number of seasonal sequences (0, 1 or 2).
    pub fn order(&self) -> usize {
        match self {
            Seasonality::None => 0,
            Seasonality::Single(_) => 1,
            Seasonality::Double(_, _) => 2,
        }
    }

    /// Period of the first seasonal sequence, if any.
    pub fn period(&self) -> Option<usize> {
        match self {
            Seasonality::None => None,
            Seasonality::Single(p) => Some(*p),
            Seasonality::Double(p, _) => Some(*p),
        }
    }

    /// Period of the second seasonal sequence, if any.
    pub fn period2(&self) -> Option<usize> {
        match self {
            Seasonality::Double(_, p2) => Some(*p2),
            _ => None,
        }
    }
}

/// Architecture variant of the recurrent stack. Selected once at
/// configuration time; the pipeline itself never branches on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CellVariant {
    /// Dilated LSTM chunks chained with additive shortcuts between chunks.
    #[default]
    Plain,
    /// Cell-internal residual connection from layer input to layer output.
    Residual,
    /// Attention over the dilation window of past hidden states.
    Attentive,
}

/// Full configuration of one forecasting run.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Display name of the data frequency, used in output file names.
    pub variable: String,
    /// Seasonal structure of the level/season engine.
    pub seasonality: Seasonality,
    /// Length of the sliding input window fed to the recurrent stack.
    pub input_size: usize,
    /// Forecast horizon; also the label window length.
    pub output_size: usize,
    /// Dilation pattern: one inner vector per chunk, one entry per layer.
    pub dilations: Vec<Vec<usize>>,
    /// Hidden width of every recurrent layer.
    pub state_hsize: usize,
    /// Width of the attention scorer (attentive variant only).
    pub attention_hsize: usize,
    /// Recurrent stack architecture variant.
    pub cell_variant: CellVariant,
    /// Insert one tanh hidden layer before the linear adapter.
    pub add_nl_layer: bool,
    /// Reporting quantile, in percent (50 = median / sMAPE diagnostics).
    pub percentile: u32,
    /// Training quantile, in percent. Kept slightly below the reporting
    /// quantile to counter the positive bias of the raw model.
    pub training_percentile: u32,
    /// Weight of the level-variability penalty. Forced to zero when no
    /// seasonality is configured.
    pub level_variability_penalty: f64,
    /// Weight of the squared-memory-state penalty (0 disables).
    pub c_state_penalty: f64,
    /// Initial Adam learning rate for the shared parameters.
    pub initial_learning_rate: f64,
    /// Epoch-indexed manual learning-rate overrides.
    pub learning_rates: Vec<(usize, f64)>,
    /// Multiplier applied to the shared learning rate for the per-series
    /// trainer.
    pub per_series_lr_multiplier: f64,
    /// Number of training epochs per repetition.
    pub epochs: usize,
    /// Global-norm gradient clipping threshold, shared by both trainers.
    pub gradient_clipping: f64,
    /// Standard deviation of the Gaussian noise injected into normalized
    /// training inputs.
    pub noise_std: f64,
    /// Number of specialist networks in the ensemble.
    pub num_of_nets: usize,
    /// Size of the active ensemble per series (top-N by validation loss).
    pub topn: usize,
    /// Ring size of the rolling forecast averager, in epochs.
    pub averaging_level: usize,
    /// Recompute rankings/averages every this many epochs.
    pub freq_of_test: usize,
    /// Number of independent run repetitions per process.
    pub big_loop: usize,
    /// Minimum number of fully-formed input windows before a window's loss
    /// counts towards training.
    pub min_inp_seq_len: usize,
    /// Number of forecast horizons withheld from training for backtesting.
    /// Zero means final mode: train on everything, forecast the unknown.
    pub holdback: usize,
    /// Longest retained history; older points are dropped.
    pub max_series_length: usize,
    /// Cap on the number of series loaded (0 = unlimited).
    pub max_series_count: usize,
    /// Identifier of this process instance, echoed in diagnostics.
    pub instance_id: i64,
    /// Offset added to the repetition index in output file names, so
    /// concurrently launched processes write distinct artifacts.
    pub big_loop_offset: usize,
    /// RNG seed; `None` seeds from system entropy (ensemble diversity).
    pub seed: Option<u64>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            variable: "Daily".to_string(),
            seasonality: Seasonality::Single(7),
            input_size: 7,
            output_size: 14,
            dilations: vec![vec![1, 3], vec![7, 14]],
            state_hsize: 40,
            attention_hsize: 40,
            cell_variant: CellVariant::Plain,
            add_nl_layer: false,
            percentile: 50,
            training_percentile: 49,
            level_variability_penalty: 100.0,
            c_state_penalty: 0.0,
            initial_learning_rate: 3e-4,
            learning_rates: vec![(9, 1e-4)],
            per_series_lr_multiplier: 1.0,
            epochs: 13,
            gradient_clipping: 50.0,
            noise_std: 0.001,
            num_of_nets: 5,
            topn: 4,
            averaging_level: 5,
            freq_of_test: 1,
            big_loop: 3,
            min_inp_seq_len: 0,
            holdback: 0,
            max_series_length: 1000,
            max_series_count: 0,
            instance_id: 0,
            big_loop_offset: 0,
            seed: None,
        }
    }
}

impl Settings {
    /// Reporting quantile as a fraction.
    pub fn tau(&self) -> f64 {
        self.percentile as f64 / 100.0
    }

    /// Training quantile as a fraction.
    pub fn training_tau(&self) -> f64 {
        self.training_percentile as f64 / 100.0
    }

    /// Shortest usable series: one input window, one label window, a slack
    /// of two points, plus the configured minimum input sequence.
    pub fn min_series_length(&self) -> usize {
        self.output_size + self.input_size + self.min_inp_seq_len + 2
    }

    /// Check cross-field consistency and normalize dependent fields.
    ///
    /// The level-variability penalty is meaningless without a seasonal
    /// decomposition; it is forced to zero rather than rejected.
    pub fn validate(&mut self) -> Result<()> {
        if self.input_size == 0 || self.output_size == 0 {
            return Err(EsrnnError::InvalidParameter(
                "input_size and output_size must be positive".to_string(),
            ));
        }
        if self.dilations.is_empty() || self.dilations.iter().any(|c| c.is_empty()) {
            return Err(EsrnnError::InvalidParameter(
                "dilations must contain at least one non-empty chunk".to_string(),
            ));
        }
        if self.topn == 0 || self.topn > self.num_of_nets {
            return Err(EsrnnError::InvalidParameter(format!(
                "topn must be in 1..={}, got {}",
                self.num_of_nets, self.topn
            )));
        }
        if self.averaging_level == 0 || self.freq_of_test == 0 {
            return Err(EsrnnError::InvalidParameter(
                "averaging_level and freq_of_test must be positive".to_string(),
            ));
        }
        if let Seasonality::Single(p) = self.seasonality {
            if p < 2 {
                return Err(EsrnnError::InvalidParameter(format!(
                    "seasonal period must be at least 2, got {p}"
                )));
            }
        }
        if let Seasonality::Double(p1, p2) = self.seasonality {
            if p1 < 2 || p2 < 2 {
                return Err(EsrnnError::InvalidParameter(format!(
                    "seasonal periods must be at least 2, got {p1} and {p2}"
                )));
            }
        }
        if self.seasonality.order() == 0 && self.level_variability_penalty > 0.0 {
            log::warn!("level_variability_penalty requires seasonality; forcing to zero");
            self.level_variability_penalty = 0.0;
        }
        Ok(())
    }

    /// Learning rate effective at the given epoch, following the manual
    /// override schedule.
    pub fn learning_rate_at(&self, epoch: usize) -> f64 {
        let mut rate = self.initial_learning_rate;
        let mut overrides: Vec<(usize, f64)> = self.learning_rates.clone();
        overrides.sort_by_key(|(e, _)| *e);
        for (at, lr) in overrides {
            if at <= epoch {
                rate = lr;
            }
        }
        rate
    }
}

/// How the process was invoked on the command line.
#[derive(Debug, Clone, PartialEq)]
pub enum Invocation {
    /// Full seven-argument form overriding data paths and limits.
    Configured {
        instance_id: i64,
        input_path: String,
        category_path: String,
        output_dir: String,
        holdback: usize,
        max_series_length: usize,
        max_series_count: usize,
    },
    /// Single-argument form: offset added to the repetition index, used
    /// when launching several ensemble members concurrently.
    OffsetOnly(usize),
}

impl Invocation {
    /// Parse positional arguments (program name excluded). Exactly seven
    /// or exactly one argument is accepted; anything else is a usage error.
    pub fn parse(args: &[String]) -> Result<Self> {
        match args.len() {
            7 => {
                let parse_int = |s: &String, name: &str| -> Result<i64> {
                    s.parse::<i64>().map_err(|_| {
                        EsrnnError::Usage(format!("{name} must be an integer, got {s:?}"))
                    })
                };
                Ok(Invocation::Configured {
                    instance_id: parse_int(&args[0], "instance id")?,
                    input_path: args[1].clone(),
                    category_path: args[2].clone(),
                    output_dir: args[3].clone(),
                    holdback: parse_int(&args[4], "holdback")? as usize,
                    max_series_length: parse_int(&args[5], "max series length")? as usize,
                    max_series_count: parse_int(&args[6], "max series count")? as usize,
                })
            }
            1 => {
                let offset = args[0].parse::<usize>().map_err(|_| {
                    EsrnnError::Usage(format!("offset must be an integer, got {:?}", args[0]))
                })?;
                Ok(Invocation::OffsetOnly(offset))
            }
            n => Err(EsrnnError::Usage(format!(
                "expected exactly 7 arguments \
                 (instance_id input category output_dir holdback max_length max_count) \
                 or exactly 1 (big-loop offset), got {n}"
            ))),
        }
    }

    /// Fold the parsed invocation into a settings value.
    pub fn apply(&self, settings: &mut Settings) {
        match self {
            Invocation::Configured {
                instance_id,
                holdback,
                max_series_length,
                max_series_count,
                ..
            } => {
                settings.instance_id = *instance_id;
                settings.holdback = *holdback;
                settings.max_series_length = *max_series_length;
                settings.max_series_count = *max_series_count;
            }
            Invocation::OffsetOnly(offset) => {
                settings.big_loop_offset = *offset;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strs(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn seasonality_from_order() {
        assert_eq!(Seasonality::from_order(0, 7, 0).unwrap(), Seasonality::None);
        assert_eq!(
            Seasonality::from_order(1, 7, 0).unwrap(),
            Seasonality::Single(7)
        );
        assert_eq!(
            Seasonality::from_order(2, 24, 168).unwrap(),
            Seasonality::Double(24, 168)
        );
        assert!(matches!(
            Seasonality::from_order(3, 7, 0),
            Err(EsrnnError::UnknownSeasonality(3))
        ));
    }

    #[test]
    fn min_series_length_derivation() {
        let settings = Settings::default();
        // horizon 14 + window 7 + slack 2
        assert_eq!(settings.min_series_length(), 23);
    }

    #[test]
    fn level_penalty_forced_to_zero_without_seasonality() {
        let mut settings = Settings {
            seasonality: Seasonality::None,
            level_variability_penalty: 100.0,
            ..Default::default()
        };
        settings.validate().unwrap();
        assert_eq!(settings.level_variability_penalty, 0.0);
    }

    #[test]
    fn topn_must_not_exceed_net_count() {
        let mut settings = Settings {
            topn: 6,
            num_of_nets: 5,
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn learning_rate_schedule() {
        let settings = Settings::default();
        assert_eq!(settings.learning_rate_at(0), 3e-4);
        assert_eq!(settings.learning_rate_at(8), 3e-4);
        assert_eq!(settings.learning_rate_at(9), 1e-4);
        assert_eq!(settings.learning_rate_at(12), 1e-4);
    }

    #[test]
    fn invocation_seven_args() {
        let args = strs(&["3", "train.csv", "info.csv", "out", "1", "1000", "0"]);
        let inv = Invocation::parse(&args).unwrap();
        let mut settings = Settings::default();
        inv.apply(&mut settings);
        assert_eq!(settings.instance_id, 3);
        assert_eq!(settings.holdback, 1);
        assert_eq!(settings.max_series_length, 1000);
        assert_eq!(settings.max_series_count, 0);
    }

    #[test]
    fn invocation_offset_only() {
        let inv = Invocation::parse(&strs(&["20"])).unwrap();
        assert_eq!(inv, Invocation::OffsetOnly(20));
        let mut settings = Settings::default();
        inv.apply(&mut settings);
        assert_eq!(settings.big_loop_offset, 20);
    }

    #[test]
    fn invocation_wrong_arity_is_usage_error() {
        assert!(matches!(
            Invocation::parse(&strs(&["a", "b"])),
            Err(EsrnnError::Usage(_))
        ));
        assert!(matches!(
            Invocation::parse(&[]),
            Err(EsrnnError::Usage(_))
        ));
    }
}
