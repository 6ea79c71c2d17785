//! Calibration Controller
//!
//! Tunes the unmeasured physical coefficients (aerodynamic drag,
//! rolling resistance, drivetrain efficiency) so a simulated vehicle
//! reproduces its published 0–100 km/h time and top speed. The
//! controller treats the simulator as a black box: it measures, then
//! applies damped multiplicative corrections to a private working copy
//! of the config, bounded by an iteration budget and a cooperative
//! wall-clock deadline.
//!
//! This is a best-effort heuristic optimizer, not a root-finder with
//! proven convergence; the bounded iteration count and the deadline
//! are the only termination guarantees.

pub mod service;
pub mod store;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::clock::{Clock, Deadline};
use crate::config::{CarConfig, CarSpec, PerformanceFigures};
use crate::measure::{measure_top_speed, measure_zero_to_hundred, ZERO_TO_HUNDRED_CAP_S};
use crate::units::mph_to_kph;

pub use store::{CalibrationRecord, CalibrationStore, FileStore, KeyValueStore, MemoryStore,
    StoreError, CALIBRATION_SCHEMA_VERSION};

/// 0–60 mph → 0–100 km/h approximation factor.
const ZERO_TO_SIXTY_FACTOR: f64 = 1.05;

/// Relative tolerance on the 0–100 time.
const TIME_TOLERANCE: f64 = 0.04;
/// Relative tolerance on the top speed.
const SPEED_TOLERANCE: f64 = 0.03;
/// Clamp on the 0–100 pace ratio before it feeds a correction.
const TIME_RATIO_BOUNDS: (f64, f64) = (0.25, 4.0);
/// Clamp on the top-speed ratio before it feeds a correction.
const SPEED_RATIO_BOUNDS: (f64, f64) = (0.5, 1.6);
/// Exponent shaping the efficiency correction.
const EFFICIENCY_EXPONENT: f64 = 0.92;
/// Gain shaping the rolling-resistance correction.
const ROLLING_GAIN: f64 = 0.45;
/// Allowed drivetrain-efficiency range.
const EFFICIENCY_BOUNDS: (f64, f64) = (0.6, 1.0);
/// Allowed rolling-resistance range.
const ROLLING_BOUNDS: (f64, f64) = (0.0045, 0.03);
/// Allowed drag-coefficient range.
const DRAG_BOUNDS: (f64, f64) = (0.16, 0.9);
/// Blend fractions: how far each correction moves toward its proposal.
const TIME_EFFICIENCY_BLEND: f64 = 0.45;
const TIME_ROLLING_BLEND: f64 = 0.35;
const SPEED_DRAG_BLEND: f64 = 0.60;
const SPEED_EFFICIENCY_BLEND: f64 = 0.25;
const SPEED_ROLLING_BLEND: f64 = 0.20;
/// Overrides smaller than this are dropped from the delta.
const OVERRIDE_EPSILON: f64 = 1e-4;

/// Canonical performance targets, in km/h and seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceTarget {
    /// Target top speed (km/h)
    pub top_speed_kph: Option<f64>,
    /// Target 0–100 km/h time (s)
    pub zero_to_hundred_sec: Option<f64>,
}

/// Metrics observed in the final measurement pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MeasuredMetrics {
    /// Measured top speed (km/h)
    pub top_speed_kph: Option<f64>,
    /// Measured 0–100 km/h time (s)
    pub zero_to_hundred_sec: Option<f64>,
}

/// Override deltas produced by a calibration run. Only keys that moved
/// away from the base config are present.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CalibrationOverrides {
    /// Tuned drag coefficient
    pub drag_coefficient: Option<f64>,
    /// Tuned rolling-resistance coefficient
    pub rolling_resistance: Option<f64>,
    /// Tuned drivetrain efficiency
    pub drivetrain_efficiency: Option<f64>,
}

impl CalibrationOverrides {
    /// True when no key differs from the base config.
    pub fn is_empty(&self) -> bool {
        self.drag_coefficient.is_none()
            && self.rolling_resistance.is_none()
            && self.drivetrain_efficiency.is_none()
    }
}

/// Iteration and wall-clock budget for one calibration run.
#[derive(Debug, Clone, Copy)]
pub struct CalibrationOptions {
    /// Wall-clock budget (ms)
    pub timeout_ms: u64,
    /// Maximum correction iterations
    pub max_iterations: u32,
}

impl Default for CalibrationOptions {
    fn default() -> Self {
        Self {
            timeout_ms: 120_000,
            max_iterations: 12,
        }
    }
}

/// A finished calibration run: the record to persist plus the number
/// of simulated ticks it consumed.
#[derive(Debug, Clone)]
pub struct CalibrationRun {
    /// Record to persist for this vehicle
    pub record: CalibrationRecord,
    /// Simulated measurement ticks consumed by the run
    pub ticks: u64,
}

fn positive(v: Option<f64>) -> Option<f64> {
    v.filter(|x| x.is_finite() && *x > 0.0)
}

/// Normalize the synonymous performance fields of a spec into canonical
/// units, probing the top level first, then `performance`, then `stats`.
/// Returns `None` when no recognized figure is present.
pub fn extract_targets(spec: &CarSpec) -> Option<PerformanceTarget> {
    let layers: [Option<&PerformanceFigures>; 3] = [
        Some(&spec.figures),
        spec.performance.as_ref(),
        spec.stats.as_ref(),
    ];
    let mut target = PerformanceTarget::default();
    for figures in layers.into_iter().flatten() {
        target.top_speed_kph = target
            .top_speed_kph
            .or(positive(figures.top_speed_kph))
            .or(positive(figures.top_speed_mph).map(mph_to_kph));
        target.zero_to_hundred_sec = target
            .zero_to_hundred_sec
            .or(positive(figures.zero_to_hundred_sec))
            .or(positive(figures.zero_to_sixty_sec).map(|t| t * ZERO_TO_SIXTY_FACTOR));
    }
    if target.top_speed_kph.is_none() && target.zero_to_hundred_sec.is_none() {
        None
    } else {
        Some(target)
    }
}

/// Move `current` toward `proposed` by the blend fraction.
fn damped(current: f64, proposed: f64, blend: f64) -> f64 {
    current + (proposed - current) * blend
}

fn round_coeff(v: f64) -> f64 {
    (v * 10_000.0).round() / 10_000.0
}

fn override_delta(base: f64, tuned: f64) -> Option<f64> {
    if (tuned - base).abs() > OVERRIDE_EPSILON {
        Some(round_coeff(tuned))
    } else {
        None
    }
}

/// Calibrate one vehicle against its published performance figures.
///
/// Operates on a private clone of the config built from the spec; the
/// live vehicle config is never touched. The returned record carries
/// the override delta, the final measured metrics, and a note when the
/// run was skipped, timed out, or failed to converge.
pub fn run_calibration(
    spec: &CarSpec,
    options: CalibrationOptions,
    clock: &dyn Clock,
) -> CalibrationRun {
    let Some(target) = extract_targets(spec) else {
        info!(vehicle = %spec.id, "calibration skipped: no performance targets");
        return CalibrationRun {
            record: CalibrationRecord {
                schema_version: CALIBRATION_SCHEMA_VERSION,
                verified: true,
                overrides: CalibrationOverrides::default(),
                measured: MeasuredMetrics::default(),
                target: PerformanceTarget::default(),
                iterations: 0,
                timestamp: Utc::now().to_rfc3339(),
                note: Some("skipped: no performance targets".to_string()),
            },
            ticks: 0,
        };
    };

    let base = CarConfig::from_spec(spec);
    let mut work = base.clone();
    let deadline = Deadline::after(clock, options.timeout_ms);
    let mut ticks = 0u64;
    let mut iterations = 0u32;
    let mut timed_out = false;
    let mut converged = false;

    while iterations < options.max_iterations {
        if deadline.expired(clock) {
            timed_out = true;
            break;
        }
        iterations += 1;
        let mut all_within = true;

        if let Some(target_time) = target.zero_to_hundred_sec {
            let run = measure_zero_to_hundred(&work, deadline, clock, false);
            ticks += run.ticks;
            if run.aborted {
                timed_out = true;
                break;
            }
            let measured = run.time_s.unwrap_or(ZERO_TO_HUNDRED_CAP_S);
            let error = (measured - target_time) / target_time;
            debug!(
                vehicle = %spec.id,
                iteration = iterations,
                measured_0_100 = measured,
                target_0_100 = target_time,
                "0-100 measurement"
            );
            if error.abs() > TIME_TOLERANCE {
                all_within = false;
                let ratio =
                    (measured / target_time).clamp(TIME_RATIO_BOUNDS.0, TIME_RATIO_BOUNDS.1);
                // Too slow (ratio > 1): raise efficiency, shed rolling
                // resistance; too fast: the reverse.
                let eff = (work.drivetrain_efficiency * ratio.powf(EFFICIENCY_EXPONENT))
                    .clamp(EFFICIENCY_BOUNDS.0, EFFICIENCY_BOUNDS.1);
                work.drivetrain_efficiency =
                    damped(work.drivetrain_efficiency, eff, TIME_EFFICIENCY_BLEND);
                let rolling = (work.rolling_resistance
                    * (1.0 + (1.0 / ratio - 1.0) * ROLLING_GAIN))
                    .clamp(ROLLING_BOUNDS.0, ROLLING_BOUNDS.1);
                work.rolling_resistance =
                    damped(work.rolling_resistance, rolling, TIME_ROLLING_BLEND);
            }
        }

        if deadline.expired(clock) {
            timed_out = true;
            break;
        }

        if let Some(target_speed) = target.top_speed_kph {
            let run = measure_top_speed(&work, deadline, clock, false);
            ticks += run.ticks;
            if run.aborted {
                timed_out = true;
                break;
            }
            let measured = run.max_speed_kph;
            let error = (measured - target_speed) / target_speed;
            debug!(
                vehicle = %spec.id,
                iteration = iterations,
                measured_top = measured,
                target_top = target_speed,
                "top-speed measurement"
            );
            if error.abs() > SPEED_TOLERANCE {
                all_within = false;
                let ratio =
                    (measured / target_speed).clamp(SPEED_RATIO_BOUNDS.0, SPEED_RATIO_BOUNDS.1);
                // Too fast (ratio > 1): more drag, less efficiency,
                // more rolling resistance.
                let drag = (work.drag_coefficient * ratio * ratio)
                    .clamp(DRAG_BOUNDS.0, DRAG_BOUNDS.1);
                work.drag_coefficient = damped(work.drag_coefficient, drag, SPEED_DRAG_BLEND);
                let eff = (work.drivetrain_efficiency / ratio.powf(EFFICIENCY_EXPONENT))
                    .clamp(EFFICIENCY_BOUNDS.0, EFFICIENCY_BOUNDS.1);
                work.drivetrain_efficiency =
                    damped(work.drivetrain_efficiency, eff, SPEED_EFFICIENCY_BLEND);
                let rolling = (work.rolling_resistance * (1.0 + (ratio - 1.0) * ROLLING_GAIN))
                    .clamp(ROLLING_BOUNDS.0, ROLLING_BOUNDS.1);
                work.rolling_resistance =
                    damped(work.rolling_resistance, rolling, SPEED_ROLLING_BLEND);
            }
        }

        if all_within {
            break;
        }
    }

    // Final reported metrics, with sample collection. Convergence is
    // judged from this pass: the loop may have applied corrections
    // after its last measurement.
    let mut measured = MeasuredMetrics::default();
    if !timed_out {
        converged = true;
        if let Some(target_time) = target.zero_to_hundred_sec {
            let run = measure_zero_to_hundred(&work, deadline, clock, true);
            ticks += run.ticks;
            timed_out |= run.aborted;
            measured.zero_to_hundred_sec = run.time_s;
            match run.time_s {
                Some(t) => {
                    converged &= ((t - target_time) / target_time).abs() <= TIME_TOLERANCE;
                }
                None => converged = false,
            }
        }
        if let Some(target_speed) = target.top_speed_kph {
            let run = measure_top_speed(&work, deadline, clock, true);
            ticks += run.ticks;
            timed_out |= run.aborted;
            if run.aborted {
                converged = false;
            } else {
                measured.top_speed_kph = Some(run.max_speed_kph);
                converged &=
                    ((run.max_speed_kph - target_speed) / target_speed).abs() <= SPEED_TOLERANCE;
            }
        }
        if timed_out {
            converged = false;
        }
    }

    let note = if timed_out {
        warn!(vehicle = %spec.id, iterations, "calibration timed out");
        Some(format!("timed out after {iterations} iterations"))
    } else if !converged {
        warn!(vehicle = %spec.id, iterations, "calibration did not converge");
        Some(format!(
            "did not converge within tolerance after {iterations} iterations"
        ))
    } else {
        info!(vehicle = %spec.id, iterations, "calibration converged");
        None
    };

    let overrides = CalibrationOverrides {
        drag_coefficient: override_delta(base.drag_coefficient, work.drag_coefficient),
        rolling_resistance: override_delta(base.rolling_resistance, work.rolling_resistance),
        drivetrain_efficiency: override_delta(
            base.drivetrain_efficiency,
            work.drivetrain_efficiency,
        ),
    };

    CalibrationRun {
        record: CalibrationRecord {
            schema_version: CALIBRATION_SCHEMA_VERSION,
            verified: !timed_out && converged,
            overrides,
            measured,
            target,
            iterations,
            timestamp: Utc::now().to_rfc3339(),
            note,
        },
        ticks,
    }
}
