//! End-to-end pipeline tests on small synthetic data.

use std::fs;
use std::path::PathBuf;

use rand::rngs::StdRng;
use rand::SeedableRng;

use esrnn::config::{Seasonality, Settings};
use esrnn::core::{Series, SeriesStore};
use esrnn::driver::{self, run_repetition};
use esrnn::io;

fn tiny_settings() -> Settings {
    let mut settings = Settings {
        variable: "Test".to_string(),
        seasonality: Seasonality::Single(3),
        input_size: 3,
        output_size: 3,
        dilations: vec![vec![1, 2]],
        state_hsize: 4,
        attention_hsize: 4,
        level_variability_penalty: 10.0,
        epochs: 3,
        num_of_nets: 2,
        topn: 2,
        averaging_level: 2,
        big_loop: 1,
        seed: Some(99),
        ..Default::default()
    };
    settings.validate().unwrap();
    settings
}

fn seasonal_vals(base: f64, n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| base * (1.0 + [0.1, -0.05, 0.02][i % 3]))
        .collect()
}

fn store_of(settings: &Settings, series: Vec<Series>) -> SeriesStore {
    let mut store = SeriesStore::new(settings.min_series_length(), 0);
    for s in series {
        store.push(s);
    }
    store
}

fn scratch_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("esrnn-e2e-{tag}-{}", std::process::id()));
    fs::create_dir_all(&dir).unwrap();
    dir
}

#[test]
fn repetition_forecasts_every_series_over_the_horizon() {
    let settings = tiny_settings();
    let store = store_of(
        &settings,
        vec![
            Series::new("A1".into(), "Micro", seasonal_vals(50.0, 24), 0, 3, 1000).unwrap(),
            Series::new("A2".into(), "Macro", seasonal_vals(80.0, 30), 0, 3, 1000).unwrap(),
        ],
    );
    let mut rng = StdRng::seed_from_u64(99);
    let finals = run_repetition(&settings, &store, &mut rng).unwrap();

    assert_eq!(finals.len(), 2);
    for f in &finals {
        assert_eq!(f.len(), 3);
        for v in f {
            assert!(v.is_finite() && *v > 0.0);
        }
    }
}

#[test]
fn forecasts_follow_the_series_scale() {
    // The per-series decomposition carries the scale, so series six
    // orders of magnitude apart must come out on their own scales even
    // after only a few epochs.
    let settings = tiny_settings();
    let store = store_of(
        &settings,
        vec![
            Series::new("S".into(), "Micro", seasonal_vals(1.0, 24), 0, 3, 1000).unwrap(),
            Series::new("L".into(), "Micro", seasonal_vals(1e6, 24), 0, 3, 1000).unwrap(),
        ],
    );
    let mut rng = StdRng::seed_from_u64(7);
    let finals = run_repetition(&settings, &store, &mut rng).unwrap();

    let mean = |f: &[f64]| f.iter().sum::<f64>() / f.len() as f64;
    assert!(mean(&finals[1]) > mean(&finals[0]) * 100.0);
}

#[test]
fn seeded_runs_are_reproducible() {
    let settings = tiny_settings();
    let store = store_of(
        &settings,
        vec![Series::new("R1".into(), "Other", seasonal_vals(20.0, 24), 0, 3, 1000).unwrap()],
    );

    let mut rng_a = StdRng::seed_from_u64(1234);
    let mut rng_b = StdRng::seed_from_u64(1234);
    let a = run_repetition(&settings, &store, &mut rng_a).unwrap();
    let b = run_repetition(&settings, &store, &mut rng_b).unwrap();
    assert_eq!(a, b);
}

fn convergence_settings(epochs: usize, freq_of_test: usize, averaging_level: usize) -> Settings {
    let mut settings = Settings {
        variable: "Const".to_string(),
        seasonality: Seasonality::Single(4),
        input_size: 4,
        output_size: 4,
        dilations: vec![vec![1]],
        state_hsize: 6,
        attention_hsize: 6,
        level_variability_penalty: 10.0,
        initial_learning_rate: 0.02,
        learning_rates: Vec::new(),
        noise_std: 0.0,
        epochs,
        num_of_nets: 1,
        topn: 1,
        averaging_level,
        freq_of_test,
        big_loop: 1,
        seed: Some(42),
        ..Default::default()
    };
    settings.validate().unwrap();
    settings
}

#[test]
fn constant_series_forecast_converges_to_the_constant() {
    // A constant series is the fixed point of the whole pipeline: the
    // decomposition absorbs the scale and the network only has to learn
    // a constant mapping, so the denormalized forecast must come back
    // to the input value.
    let settings = convergence_settings(50, 1, 5);
    let store = store_of(
        &settings,
        vec![Series::new("C1".into(), "Micro", vec![42.0; 32], 0, 4, 1000).unwrap()],
    );
    let mut rng = StdRng::seed_from_u64(42);
    let finals = run_repetition(&settings, &store, &mut rng).unwrap();

    assert_eq!(finals[0].len(), 4);
    for v in &finals[0] {
        assert!(
            (v / 42.0 - 1.0).abs() < 0.3,
            "forecast {v} strayed from the constant 42"
        );
    }
}

#[test]
fn sparse_reporting_still_averages_real_forecasts() {
    // With a reporting frequency larger than one, forecasts must keep
    // flowing into the ring between reporting epochs; otherwise the
    // ring average mixes in never-written slots and collapses the
    // combined forecast toward zero.
    let settings = convergence_settings(41, 4, 4);
    let store = store_of(
        &settings,
        vec![Series::new("C2".into(), "Micro", vec![42.0; 32], 0, 4, 1000).unwrap()],
    );
    let mut rng = StdRng::seed_from_u64(42);
    let finals = run_repetition(&settings, &store, &mut rng).unwrap();

    for v in &finals[0] {
        assert!(
            *v > 0.6 * 42.0 && *v < 1.5 * 42.0,
            "ring-averaged forecast {v} lost the series scale"
        );
    }
}

#[test]
fn backtest_mode_holds_out_the_final_horizon() {
    let mut settings = tiny_settings();
    settings.holdback = 1;
    let vals = seasonal_vals(40.0, 27);
    let series = Series::new("B1".into(), "Finance", vals.clone(), 0, 3, 1000).unwrap();
    let held = Series::new("B1".into(), "Finance", vals, 1, 3, 1000).unwrap();
    assert_eq!(held.len(), series.len() - 3);
    assert_eq!(held.test_vals().len(), 3);

    let store = store_of(&settings, vec![held]);
    let mut rng = StdRng::seed_from_u64(5);
    let finals = run_repetition(&settings, &store, &mut rng).unwrap();
    assert_eq!(finals[0].len(), 3);
}

#[test]
fn full_run_writes_one_artifact_per_repetition() {
    let dir = scratch_dir("artifacts");
    let info = dir.join("info.csv");
    let train = dir.join("train.csv");
    let out = dir.join("out");

    let vals: Vec<String> = seasonal_vals(60.0, 24).iter().map(|v| v.to_string()).collect();
    fs::write(&info, "id,category\nD1,Macro\nD2,Micro\n").unwrap();
    fs::write(
        &train,
        format!("id,...\nD1,{}\nD2,{}\n", vals.join(","), vals.join(",")),
    )
    .unwrap();

    let mut settings = tiny_settings();
    settings.big_loop = 2;
    settings.big_loop_offset = 10;

    let categories = io::read_categories(&info).unwrap();
    let store = io::load_series(&train, &categories, &settings).unwrap();
    assert_eq!(store.len(), 2);

    driver::run(&settings, &store, out.to_str().unwrap()).unwrap();

    for rep in 0..2 {
        let path = out.join(format!("Test_{}_LB0.csv", 10 + rep));
        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        for line in lines {
            let fields: Vec<&str> = line.split(',').collect();
            assert_eq!(fields.len(), 4);
            for v in &fields[1..] {
                assert!(v.parse::<f64>().unwrap() > 0.0);
            }
        }
    }
    fs::remove_dir_all(&dir).unwrap();
}
