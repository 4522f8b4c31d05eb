//! Rolling forecast averager.
//!
//! Validation forecasts are noisy epoch to epoch, so each (series,
//! network) pair keeps a ring of the last `K` epoch forecasts plus one
//! derived slot holding their mean. The final forecast of a series is
//! the mean of its top-N networks' ring averages.

/// Ring buffer of recent validation forecasts per (series, network).
#[derive(Debug, Clone)]
pub struct RollingForecasts {
    // [series][net][slot][horizon]; slot `window` holds the ring average
    slots: Vec<Vec<Vec<Vec<f64>>>>,
    window: usize,
    horizon: usize,
}

impl RollingForecasts {
    pub fn new(series_count: usize, num_nets: usize, horizon: usize, window: usize) -> Self {
        let slots =
            vec![vec![vec![vec![0.0; horizon]; window + 1]; num_nets]; series_count];
        Self {
            slots,
            window,
            horizon,
        }
    }

    /// Store this epoch's forecast in its ring slot.
    pub fn record(&mut self, series: usize, net: usize, epoch: usize, forecast: &[f64]) {
        debug_assert_eq!(forecast.len(), self.horizon);
        self.slots[series][net][epoch % self.window].copy_from_slice(forecast);
    }

    /// Refresh the derived average slot from the ring. Only meaningful
    /// once `epoch >= window`, when every slot has been written.
    pub fn recompute_average(&mut self, series: usize, net: usize) {
        let rings = &mut self.slots[series][net];
        let mut avg = vec![0.0; self.horizon];
        for slot in rings.iter().take(self.window) {
            for (a, v) in avg.iter_mut().zip(slot.iter()) {
                *a += v;
            }
        }
        for a in avg.iter_mut() {
            *a /= self.window as f64;
        }
        rings[self.window].copy_from_slice(&avg);
    }

    /// The ring average last produced by [`recompute_average`].
    ///
    /// [`recompute_average`]: RollingForecasts::recompute_average
    pub fn average(&self, series: usize, net: usize) -> &[f64] {
        &self.slots[series][net][self.window]
    }

    /// The forecast recorded at the given epoch, while it is still in
    /// the ring.
    pub fn latest(&self, series: usize, net: usize, epoch: usize) -> &[f64] {
        &self.slots[series][net][epoch % self.window]
    }

    /// Mean over the given networks of the chosen slot (ring average or
    /// this epoch's forecast).
    pub fn combine(
        &self,
        series: usize,
        nets: &[usize],
        epoch: usize,
        use_average: bool,
    ) -> Vec<f64> {
        let mut out = vec![0.0; self.horizon];
        for net in nets {
            let slot = if use_average {
                self.average(series, *net)
            } else {
                self.latest(series, *net, epoch)
            };
            for (o, v) in out.iter_mut().zip(slot.iter()) {
                *o += v;
            }
        }
        for o in out.iter_mut() {
            *o /= nets.len() as f64;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn ring_slots_wrap_by_epoch() {
        let mut rf = RollingForecasts::new(1, 1, 2, 3);
        rf.record(0, 0, 0, &[1.0, 1.0]);
        rf.record(0, 0, 1, &[2.0, 2.0]);
        rf.record(0, 0, 2, &[3.0, 3.0]);
        // epoch 3 overwrites epoch 0's slot
        rf.record(0, 0, 3, &[9.0, 9.0]);
        assert_eq!(rf.latest(0, 0, 3), &[9.0, 9.0]);
        assert_eq!(rf.latest(0, 0, 1), &[2.0, 2.0]);
    }

    #[test]
    fn average_covers_the_full_ring() {
        let mut rf = RollingForecasts::new(1, 1, 1, 4);
        for epoch in 0..4 {
            rf.record(0, 0, epoch, &[epoch as f64]);
        }
        rf.recompute_average(0, 0);
        assert_relative_eq!(rf.average(0, 0)[0], 1.5);

        // overwriting one slot shifts the mean accordingly
        rf.record(0, 0, 4, &[8.0]);
        rf.recompute_average(0, 0);
        assert_relative_eq!(rf.average(0, 0)[0], 3.5);
    }

    #[test]
    fn combine_means_across_networks() {
        let mut rf = RollingForecasts::new(1, 3, 2, 2);
        rf.record(0, 0, 1, &[2.0, 4.0]);
        rf.record(0, 1, 1, &[4.0, 8.0]);
        rf.record(0, 2, 1, &[100.0, 100.0]);
        let combined = rf.combine(0, &[0, 1], 1, false);
        assert_relative_eq!(combined[0], 3.0);
        assert_relative_eq!(combined[1], 6.0);
    }

    #[test]
    fn combine_can_use_ring_averages() {
        let mut rf = RollingForecasts::new(1, 2, 1, 2);
        rf.record(0, 0, 0, &[1.0]);
        rf.record(0, 0, 1, &[3.0]);
        rf.record(0, 1, 0, &[5.0]);
        rf.record(0, 1, 1, &[7.0]);
        rf.recompute_average(0, 0);
        rf.recompute_average(0, 1);
        let combined = rf.combine(0, &[0, 1], 1, true);
        // (mean(1,3) + mean(5,7)) / 2
        assert_relative_eq!(combined[0], 4.0);
    }
}
