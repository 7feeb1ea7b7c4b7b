//! M/M/1-style dynamic cost update (spec §4.9).
//!
//! `λ = received/interval`, `ts = average_wait`, `ρ = λ·ts` (clamped to
//! 0.99 — see [`RHO_CLAMP`] and `DESIGN.md`'s Open Question decision),
//! `tw = ρ/(1-ρ)·ts`; the resulting `tw` (in milliseconds) becomes the
//! node's self cost.

use crate::link::Measurement;
use crate::node::identity::Cost;
use crate::sync::Debounce;
use crate::time::{Duration, Instant};

pub const DYNAMIC_COST_UPDATE_INTERVAL: Duration = Duration::from_secs(30);

/// `ρ` (server utilization) must stay below 1 for the M/M/1 wait formula
/// to be defined; a burst that would push it to or past 1 is clamped here
/// rather than skipping the update, so cost still reflects "very
/// congested" instead of freezing at its last value.
const RHO_CLAMP: f32 = 0.99;

pub struct DynamicCostUpdater {
    debounce: Debounce,
}

impl DynamicCostUpdater {
    pub fn new(now: Instant) -> Self {
        Self { debounce: Debounce::new(now, DYNAMIC_COST_UPDATE_INTERVAL) }
    }

    /// Returns the freshly computed cost if the debounce interval elapsed,
    /// resetting `measurement` as a side effect either way is avoided: the
    /// caller only resets when this actually fires.
    pub fn poll_update(&mut self, now: Instant, measurement: &mut Measurement) -> Option<Cost> {
        if self.debounce.poll(now).is_pending() {
            return None;
        }
        let received = measurement.received_frame_count();
        let accepted = measurement.accepted_frame_count();
        let interval_secs = DYNAMIC_COST_UPDATE_INTERVAL.as_secs() as f32;

        let cost = if received == 0 || accepted == 0 {
            0
        } else {
            let lambda = received as f32 / interval_secs;
            let ts_ms = measurement.wait_time_sum().as_millis() as f32 / accepted as f32;
            let ts_secs = ts_ms / 1000.0;
            let rho = (lambda * ts_secs).min(RHO_CLAMP);
            let tw_secs = rho / (1.0 - rho) * ts_secs;
            (tw_secs * 1000.0) as Cost
        };

        measurement.reset();
        Some(cost)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_traffic_yields_zero_cost() {
        let t0 = Instant::from_millis(0);
        let mut updater = DynamicCostUpdater::new(t0);
        let mut measurement = Measurement::new();
        let result = updater.poll_update(t0 + DYNAMIC_COST_UPDATE_INTERVAL, &mut measurement);
        assert_eq!(result, Some(0));
    }

    #[test]
    fn does_not_fire_before_interval_elapses() {
        let t0 = Instant::from_millis(0);
        let mut updater = DynamicCostUpdater::new(t0);
        let mut measurement = Measurement::new();
        assert_eq!(updater.poll_update(t0 + Duration::from_secs(1), &mut measurement), None);
    }
}
