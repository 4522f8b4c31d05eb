//! Per-series network ranking and the series-to-network assignment it
//! drives.

use rand::rngs::StdRng;
use rand::Rng;

/// Sentinel standing in for "no validation loss recorded yet". Any real
/// loss beats it, and a network whose loss never improves on it is
/// treated as degenerate.
pub const BIG_LOSS: f64 = 1e38;

/// Indices of the `topn` best performers, best first. Ties break toward
/// the lower index; non-finite losses rank behind everything real.
pub fn perf_to_ranking(perf: &[f64], topn: usize) -> Vec<usize> {
    let mut remaining: Vec<f64> = perf
        .iter()
        .map(|p| if p.is_finite() { *p } else { BIG_LOSS })
        .collect();
    let mut ranking = Vec::with_capacity(topn.min(perf.len()));
    for _ in 0..topn.min(perf.len()) {
        let mut best = 0;
        let mut best_loss = f64::INFINITY;
        for (i, loss) in remaining.iter().enumerate() {
            if *loss < best_loss {
                best_loss = *loss;
                best = i;
            }
        }
        ranking.push(best);
        // infinity keeps ranked entries out of later scans while the
        // sentinel itself stays selectable
        remaining[best] = f64::INFINITY;
    }
    ranking
}

/// Which series each network trains on. A series is trained by every
/// network currently ranked in its top-N, so networks specialize on the
/// series they forecast well.
#[derive(Debug, Clone)]
pub struct Assignments {
    per_net: Vec<Vec<usize>>,
}

impl Assignments {
    /// Random warm-up assignment before any ranking exists: half as many
    /// passes as there are networks, each pass giving every series to one
    /// uniformly drawn network. Duplicates are possible and harmless.
    pub fn initial(num_nets: usize, series_count: usize, rng: &mut StdRng) -> Self {
        let mut per_net = vec![Vec::new(); num_nets];
        for _ in 0..(num_nets / 2).max(1) {
            for series in 0..series_count {
                let net = rng.gen_range(0..num_nets);
                per_net[net].push(series);
            }
        }
        Self { per_net }
    }

    /// Rebuild from fresh per-series rankings: each series goes to every
    /// network in its current top-N.
    pub fn rebuild(rankings: &[Vec<usize>], num_nets: usize) -> Self {
        let mut per_net = vec![Vec::new(); num_nets];
        for (series, ranking) in rankings.iter().enumerate() {
            for net in ranking {
                per_net[*net].push(series);
            }
        }
        Self { per_net }
    }

    /// Re-seed networks the ranking starved: an empty network receives
    /// half the series count in uniform random draws so it can re-enter
    /// the competition.
    pub fn repair(&mut self, series_count: usize, rng: &mut StdRng) -> usize {
        let mut repaired = 0;
        for list in &mut self.per_net {
            if list.is_empty() {
                for _ in 0..(series_count / 2).max(1) {
                    list.push(rng.gen_range(0..series_count));
                }
                repaired += 1;
            }
        }
        repaired
    }

    /// Series indices the given network trains on.
    pub fn for_net(&self, net: usize) -> &[usize] {
        &self.per_net[net]
    }

    pub fn num_nets(&self) -> usize {
        self.per_net.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn ranking_orders_by_loss() {
        let perf = [5.0, 1.0, 3.0, 0.5, 4.0];
        assert_eq!(perf_to_ranking(&perf, 3), vec![3, 1, 2]);
    }

    #[test]
    fn ranking_breaks_ties_toward_low_index() {
        let perf = [2.0, 1.0, 1.0, 2.0];
        assert_eq!(perf_to_ranking(&perf, 2), vec![1, 2]);
        let equal = [7.0, 7.0, 7.0];
        assert_eq!(perf_to_ranking(&equal, 3), vec![0, 1, 2]);
    }

    #[test]
    fn ranking_puts_unscored_nets_last() {
        let perf = [BIG_LOSS, 2.0, f64::NAN, 1.0];
        assert_eq!(perf_to_ranking(&perf, 4), vec![3, 1, 0, 2]);
    }

    #[test]
    fn ranking_is_distinct_even_when_nothing_is_scored() {
        // all-sentinel rows still must produce distinct indices in
        // low-index order, or downstream assignment double-counts nets
        let perf = [BIG_LOSS; 5];
        assert_eq!(perf_to_ranking(&perf, 4), vec![0, 1, 2, 3]);
        let mixed = [BIG_LOSS, 0.5, BIG_LOSS, BIG_LOSS];
        assert_eq!(perf_to_ranking(&mixed, 3), vec![1, 0, 2]);
    }

    #[test]
    fn initial_assignment_distributes_every_series() {
        let mut rng = StdRng::seed_from_u64(3);
        let assignments = Assignments::initial(5, 100, &mut rng);
        // 5 nets -> 2 passes of 100 series each
        let total: usize = (0..5).map(|n| assignments.for_net(n).len()).sum();
        assert_eq!(total, 200);
    }

    #[test]
    fn rebuild_assigns_each_series_to_its_topn() {
        let rankings = vec![vec![0, 2], vec![2, 1], vec![0, 1]];
        let assignments = Assignments::rebuild(&rankings, 3);
        assert_eq!(assignments.for_net(0), &[0, 2]);
        assert_eq!(assignments.for_net(1), &[1, 2]);
        assert_eq!(assignments.for_net(2), &[0, 1]);
    }

    #[test]
    fn repair_reseeds_empty_nets() {
        let rankings = vec![vec![0], vec![0]];
        let mut assignments = Assignments::rebuild(&rankings, 3);
        assert!(assignments.for_net(1).is_empty());
        assert!(assignments.for_net(2).is_empty());

        let mut rng = StdRng::seed_from_u64(4);
        let repaired = assignments.repair(10, &mut rng);
        assert_eq!(repaired, 2);
        for net in 0..3 {
            assert!(!assignments.for_net(net).is_empty());
        }
        assert_eq!(assignments.for_net(1).len(), 5);
        for s in assignments.for_net(1) {
            assert!(*s < 10);
        }
    }
}
