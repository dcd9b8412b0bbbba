use rand::Rng;
use std::time::Duration;
use talon_core::IntervalBounds;

/// Draw an idle wait uniformly from [min, max] seconds. Randomized spacing
/// keeps the request cadence against the carrier from being mechanically
/// regular.
pub fn jittered_delay(bounds: &IntervalBounds) -> Duration {
    jittered_delay_with(bounds, &mut rand::thread_rng())
}

pub fn jittered_delay_with(bounds: &IntervalBounds, rng: &mut impl Rng) -> Duration {
    let secs = rng.gen_range(bounds.min_secs as f64..=bounds.max_secs as f64);
    Duration::from_secs_f64(secs)
}
