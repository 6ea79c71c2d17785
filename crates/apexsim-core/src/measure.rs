//! Performance Measurement
//!
//! Drives an isolated `VehicleModel` through a scripted straight-line
//! scenario and extracts scalar metrics: 0–100 km/h time and top
//! speed. Both runs are pure functions of the config (identical config
//! and timestep sequence give bit-identical results) and poll
//! a cooperative wall-clock deadline every simulated tick, aborting
//! with a partial result instead of being preempted.

use crate::clock::{Clock, Deadline};
use crate::config::CarConfig;
use crate::units::mps_to_kph;
use crate::vehicle::VehicleModel;

/// Fixed measurement timestep (s).
pub const MEASUREMENT_DT: f64 = 1.0 / 200.0;
/// Hard cap on a 0–100 run (s).
pub const ZERO_TO_HUNDRED_CAP_S: f64 = 15.0;
/// Hard cap on a top-speed run (s).
pub const TOP_SPEED_CAP_S: f64 = 160.0;
/// The observed maximum must hold steady for this long (s).
const TOP_SPEED_SETTLE_S: f64 = 7.0;
/// Minimum elapsed time before the settle window may close (s).
const TOP_SPEED_MIN_ELAPSED_S: f64 = 20.0;
/// Maximum change still counted as "stable" (km/h).
const TOP_SPEED_EPSILON_KPH: f64 = 0.1;
/// Coarse sample spacing (s).
const SAMPLE_INTERVAL_S: f64 = 0.25;

/// One coarse telemetry sample from a measurement run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// Simulated time (s)
    pub time_s: f64,
    /// Speed (km/h)
    pub speed_kph: f64,
    /// Engine speed (RPM)
    pub rpm: f64,
    /// Gear index
    pub gear: i8,
}

/// Result of a 0–100 km/h run.
#[derive(Debug, Clone)]
pub struct ZeroToHundred {
    /// Interpolated crossing time, when 100 km/h was reached
    pub time_s: Option<f64>,
    /// True when 100 km/h was reached before the cap
    pub reached: bool,
    /// True when the wall-clock deadline cut the run short
    pub aborted: bool,
    /// Simulated ticks consumed
    pub ticks: u64,
    /// Coarse samples, when collection was requested
    pub samples: Vec<Sample>,
}

/// Result of a top-speed run.
#[derive(Debug, Clone)]
pub struct TopSpeed {
    /// Highest observed speed (km/h)
    pub max_speed_kph: f64,
    /// Simulated duration of the run (s)
    pub duration_s: f64,
    /// True when the wall-clock deadline cut the run short
    pub aborted: bool,
    /// Simulated ticks consumed
    pub ticks: u64,
    /// Coarse samples, when collection was requested
    pub samples: Vec<Sample>,
}

fn maybe_sample(samples: &mut Vec<Sample>, collect: bool, next_at: &mut f64, t: f64, model: &VehicleModel) {
    if collect && t >= *next_at {
        samples.push(Sample {
            time_s: t,
            speed_kph: mps_to_kph(model.state().speed()),
            rpm: model.state().rpm,
            gear: model.state().gear,
        });
        *next_at += SAMPLE_INTERVAL_S;
    }
}

/// Measure the 0–100 km/h time: full throttle from rest, fixed
/// timestep, linear-interpolated crossing, 15 s cap.
pub fn measure_zero_to_hundred(
    config: &CarConfig,
    deadline: Deadline,
    clock: &dyn Clock,
    collect_samples: bool,
) -> ZeroToHundred {
    let mut model = VehicleModel::new(config.clone());
    let mut samples = Vec::new();
    let mut next_sample_at = 0.0;
    let mut ticks = 0u64;
    let mut t = 0.0;
    let mut prev_kph = 0.0;

    while t < ZERO_TO_HUNDRED_CAP_S {
        if deadline.expired(clock) {
            return ZeroToHundred {
                time_s: None,
                reached: false,
                aborted: true,
                ticks,
                samples,
            };
        }
        model.step(1.0, 0.0, 0.0, MEASUREMENT_DT);
        ticks += 1;
        t += MEASUREMENT_DT;
        let kph = mps_to_kph(model.state().speed());
        maybe_sample(&mut samples, collect_samples, &mut next_sample_at, t, &model);

        if kph >= 100.0 {
            // Interpolate the crossing between the bracketing samples.
            let span = (kph - prev_kph).max(f64::MIN_POSITIVE);
            let frac = ((100.0 - prev_kph) / span).clamp(0.0, 1.0);
            return ZeroToHundred {
                time_s: Some(t - MEASUREMENT_DT + frac * MEASUREMENT_DT),
                reached: true,
                aborted: false,
                ticks,
                samples,
            };
        }
        prev_kph = kph;
    }

    ZeroToHundred {
        time_s: None,
        reached: false,
        aborted: false,
        ticks,
        samples,
    }
}

/// Measure the top speed: full throttle until the observed maximum has
/// been stable for the settle window, or the duration cap elapses.
pub fn measure_top_speed(
    config: &CarConfig,
    deadline: Deadline,
    clock: &dyn Clock,
    collect_samples: bool,
) -> TopSpeed {
    let mut model = VehicleModel::new(config.clone());
    let mut samples = Vec::new();
    let mut next_sample_at = 0.0;
    let mut ticks = 0u64;
    let mut t = 0.0;
    let mut max_kph = 0.0f64;
    let mut stable_s = 0.0;

    while t < TOP_SPEED_CAP_S {
        if deadline.expired(clock) {
            return TopSpeed {
                max_speed_kph: max_kph,
                duration_s: t,
                aborted: true,
                ticks,
                samples,
            };
        }
        model.step(1.0, 0.0, 0.0, MEASUREMENT_DT);
        ticks += 1;
        t += MEASUREMENT_DT;
        let kph = mps_to_kph(model.state().speed());
        maybe_sample(&mut samples, collect_samples, &mut next_sample_at, t, &model);

        if kph > max_kph + TOP_SPEED_EPSILON_KPH {
            max_kph = kph;
            stable_s = 0.0;
        } else {
            stable_s += MEASUREMENT_DT;
            if t >= TOP_SPEED_MIN_ELAPSED_S && stable_s >= TOP_SPEED_SETTLE_S {
                break;
            }
        }
    }

    TopSpeed {
        max_speed_kph: max_kph,
        duration_s: t,
        aborted: false,
        ticks,
        samples,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[test]
    fn zero_to_hundred_reaches_for_default_car() {
        let clock = ManualClock::new();
        let r = measure_zero_to_hundred(&CarConfig::default(), Deadline::none(), &clock, false);
        assert!(r.reached);
        assert!(!r.aborted);
        let t = r.time_s.unwrap();
        assert!(t > 1.0 && t < 15.0, "time {t}");
    }

    #[test]
    fn measurements_are_bit_reproducible() {
        let clock = ManualClock::new();
        let config = CarConfig::default();
        let a = measure_zero_to_hundred(&config, Deadline::none(), &clock, true);
        let b = measure_zero_to_hundred(&config, Deadline::none(), &clock, true);
        assert_eq!(a.time_s, b.time_s);
        assert_eq!(a.ticks, b.ticks);
        assert_eq!(a.samples, b.samples);
    }

    #[test]
    fn expired_deadline_aborts_without_ticks() {
        let clock = ManualClock::new();
        let deadline = Deadline::after(&clock, 0);
        let r = measure_zero_to_hundred(&CarConfig::default(), deadline, &clock, false);
        assert!(r.aborted);
        assert_eq!(r.ticks, 0);
        let r = measure_top_speed(&CarConfig::default(), deadline, &clock, false);
        assert!(r.aborted);
        assert_eq!(r.ticks, 0);
    }

    #[test]
    fn top_speed_exceeds_hundred_for_default_car() {
        let clock = ManualClock::new();
        let r = measure_top_speed(&CarConfig::default(), Deadline::none(), &clock, false);
        assert!(!r.aborted);
        assert!(r.max_speed_kph > 100.0, "top speed {}", r.max_speed_kph);
        assert!(r.duration_s <= TOP_SPEED_CAP_S + 1e-9);
    }

    #[test]
    fn sample_collection_is_coarse() {
        let clock = ManualClock::new();
        let r = measure_zero_to_hundred(&CarConfig::default(), Deadline::none(), &clock, true);
        assert!(!r.samples.is_empty());
        // Far fewer samples than ticks.
        assert!((r.samples.len() as u64) < r.ticks / 10);
    }
}
