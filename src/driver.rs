//! The training driver: repetitions of the full ensemble life cycle.
//!
//! Each repetition builds a fresh ensemble of specialist networks,
//! alternates training and validation epochs, re-ranks the networks per
//! series after every validation pass, and keeps the latest combined
//! forecast of each series as that repetition's result.

use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::config::Settings;
use crate::core::SeriesStore;
use crate::ensemble::{perf_to_ranking, Assignments, RollingForecasts, BIG_LOSS};
use crate::error::{EsrnnError, Result};
use crate::io::{output_path, write_forecasts};
use crate::model::{holdout_error, Network, TrainStats};

/// Run every configured repetition and write one forecast artifact per
/// repetition.
pub fn run(settings: &Settings, store: &SeriesStore, output_dir: &str) -> Result<()> {
    if store.is_empty() {
        return Err(EsrnnError::InsufficientData {
            needed: settings.min_series_length(),
            got: 0,
        });
    }
    let mut rng = match settings.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    for rep in 0..settings.big_loop {
        info!(
            "instance {} repetition {}/{} over {} series",
            settings.instance_id,
            rep + 1,
            settings.big_loop,
            store.len()
        );
        let finals = run_repetition(settings, store, &mut rng)?;
        let path = output_path(output_dir, settings, rep);
        write_forecasts(&path, store, &finals)?;
        info!("wrote {}", path.display());
    }
    Ok(())
}

/// One independent ensemble run. Returns the final combined forecast of
/// every series, in store order.
pub fn run_repetition(
    settings: &Settings,
    store: &SeriesStore,
    rng: &mut StdRng,
) -> Result<Vec<Vec<f64>>> {
    let n_series = store.len();
    let mut nets: Vec<Network> = (0..settings.num_of_nets)
        .map(|_| Network::new(settings, n_series, rng))
        .collect();
    let mut assignments = Assignments::initial(settings.num_of_nets, n_series, rng);
    let mut rolling = RollingForecasts::new(
        n_series,
        settings.num_of_nets,
        settings.output_size,
        settings.averaging_level,
    );
    let mut final_results: Vec<Vec<f64>> = vec![Vec::new(); n_series];
    // smoothing history of one sampled series, dumped at repetition end
    let sampled = 0usize;
    let mut sampled_history: Vec<(usize, usize, TrainStats)> = Vec::new();

    for epoch in 0..settings.epochs {
        let rate = settings.learning_rate_at(epoch);
        for net in nets.iter_mut() {
            net.set_learning_rate(rate, settings.per_series_lr_multiplier);
        }

        train_epoch(
            settings,
            store,
            &mut nets,
            &assignments,
            epoch,
            rate,
            sampled,
            &mut sampled_history,
            rng,
        )?;

        // validation forecasts feed the ring every epoch; ranking,
        // averaging and reporting only happen on reporting epochs
        let perf = validate_and_record(settings, store, &mut nets, &mut rolling, epoch);

        if epoch % settings.freq_of_test == 0 {
            let rankings = reporting_pass(
                settings,
                store,
                &perf,
                &mut rolling,
                &mut final_results,
                epoch,
            );
            let mut next = Assignments::rebuild(&rankings, settings.num_of_nets);
            let repaired = next.repair(n_series, rng);
            if repaired > 0 {
                debug!("epoch {epoch}: re-seeded {repaired} starved networks");
            }
            assignments = next;
        }
    }

    if !sampled_history.is_empty() {
        debug!("smoothing history of {}:", store.get(sampled).id());
        for (epoch, net, stats) in &sampled_history {
            debug!(
                "  epoch {epoch} net {net}: lev_sm {:.4}, seas_sm {:?}, seas_sm2 {:?}, \
                 loss {:.5}",
                stats.level_sm, stats.season_sm, stats.season_sm2, stats.loss
            );
        }
    }
    Ok(final_results)
}

/// Train every network on its currently assigned series, in shuffled
/// order. A numerically unstable step is logged and skipped; the
/// network keeps its parameters from before that step.
#[allow(clippy::too_many_arguments)]
fn train_epoch(
    settings: &Settings,
    store: &SeriesStore,
    nets: &mut [Network],
    assignments: &Assignments,
    epoch: usize,
    rate: f64,
    sampled: usize,
    sampled_history: &mut Vec<(usize, usize, TrainStats)>,
    rng: &mut StdRng,
) -> Result<()> {
    for (ni, net) in nets.iter_mut().enumerate() {
        let mut batch: Vec<usize> = assignments.for_net(ni).to_vec();
        batch.shuffle(rng);

        let mut loss_sum = 0.0;
        let mut level_pen_sum = 0.0;
        let mut state_pen_sum = 0.0;
        let mut trained = 0usize;
        let mut unstable = 0usize;
        for sidx in batch {
            let series = store.get(sidx);
            match net.train_series(series, sidx, settings, rng) {
                Ok(stats) => {
                    loss_sum += stats.loss;
                    level_pen_sum += stats.level_penalty;
                    state_pen_sum += stats.state_penalty;
                    trained += 1;
                    if sidx == sampled {
                        sampled_history.push((epoch, ni, stats));
                    }
                }
                Err(EsrnnError::NumericInstability { series, report }) => {
                    warn!(
                        "net {ni} epoch {epoch}: unstable step on {series} \
                         (min season {:?}, min level {:?}, max |c| {:.3e} \
                         at t={} chunk={} layer={}); gradient discarded",
                        report.min_season,
                        report.min_level,
                        report.max_abs_state,
                        report.time_of_max,
                        report.chunk_of_max,
                        report.layer_of_max
                    );
                    unstable += 1;
                }
                Err(e) => return Err(e),
            }
        }
        if trained > 0 {
            let n = trained as f64;
            info!(
                "net {ni} epoch {epoch}: loss {:.5} (level pen {:.5}, state pen {:.5}) \
                 over {trained} series, lr {rate:.1e}{}",
                loss_sum / n,
                level_pen_sum / n,
                state_pen_sum / n,
                if unstable > 0 {
                    format!(", {unstable} unstable")
                } else {
                    String::new()
                }
            );
        }
    }
    Ok(())
}

/// Validate every network on every series and record this epoch's
/// forecasts in the ring. Returns the in-sample loss matrix
/// `[series][net]`.
fn validate_and_record(
    settings: &Settings,
    store: &SeriesStore,
    nets: &mut [Network],
    rolling: &mut RollingForecasts,
    epoch: usize,
) -> Vec<Vec<f64>> {
    let n_series = store.len();
    let mut perf = vec![vec![BIG_LOSS; nets.len()]; n_series];

    for (ni, net) in nets.iter_mut().enumerate() {
        for sidx in 0..n_series {
            let outcome = net.validate_series(store.get(sidx), sidx, settings);
            if outcome.in_sample_loss.is_finite() {
                perf[sidx][ni] = outcome.in_sample_loss;
            }
            rolling.record(sidx, ni, epoch, &outcome.forecast);
        }
    }
    perf
}

/// Reporting-epoch work: refresh ring averages once the ring is full,
/// score the backtest, rebuild the per-series final forecasts, and
/// return the fresh rankings.
fn reporting_pass(
    settings: &Settings,
    store: &SeriesStore,
    perf: &[Vec<f64>],
    rolling: &mut RollingForecasts,
    final_results: &mut [Vec<f64>],
    epoch: usize,
) -> Vec<Vec<usize>> {
    let n_series = store.len();
    let num_nets = perf.first().map_or(0, Vec::len);

    let use_average = epoch >= settings.averaging_level;
    if use_average {
        for sidx in 0..n_series {
            for ni in 0..num_nets {
                rolling.recompute_average(sidx, ni);
            }
        }
    }

    let rankings: Vec<Vec<usize>> = perf
        .iter()
        .map(|row| perf_to_ranking(row, settings.topn))
        .collect();

    if settings.holdback > 0 {
        report_backtest(settings, store, rolling, &rankings, epoch, use_average);
    }

    for sidx in 0..n_series {
        final_results[sidx] = rolling.combine(sidx, &rankings[sidx], epoch, use_average);
    }
    rankings
}

/// Backtest diagnostics against the held-out windows: the best single
/// network, the top-N combination of this epoch, and the top-N
/// combination of ring averages once the ring is full.
fn report_backtest(
    settings: &Settings,
    store: &SeriesStore,
    rolling: &RollingForecasts,
    rankings: &[Vec<usize>],
    epoch: usize,
    use_average: bool,
) {
    let n_series = store.len();
    let mut best_err = 0.0;
    let mut topn_err = 0.0;
    let mut avg_err = 0.0;
    for sidx in 0..n_series {
        let actuals = store.get(sidx).test_vals();
        let ranking = &rankings[sidx];

        let best = rolling.latest(sidx, ranking[0], epoch);
        best_err += holdout_error(best, actuals, settings.percentile);

        let combined = rolling.combine(sidx, ranking, epoch, false);
        topn_err += holdout_error(&combined, actuals, settings.percentile);

        if use_average {
            let averaged = rolling.combine(sidx, ranking, epoch, true);
            avg_err += holdout_error(&averaged, actuals, settings.percentile);
        }
    }
    let n = n_series as f64;
    if use_average {
        info!(
            "epoch {epoch} backtest p{}: best {:.4}, top{} {:.4}, top{} avg {:.4}",
            settings.percentile,
            best_err / n,
            settings.topn,
            topn_err / n,
            settings.topn,
            avg_err / n
        );
    } else {
        info!(
            "epoch {epoch} backtest p{}: best {:.4}, top{} {:.4}",
            settings.percentile,
            best_err / n,
            settings.topn,
            topn_err / n
        );
    }
}
