//! Powertrain Model
//!
//! Engine torque curve, gear ratio selection, and rev-limiter behavior.
//! The torque curve is piecewise in RPM:
//! - idle → peak RPM: power-law rise (exponent 1.25) from 65% to 100%
//!   of peak torque
//! - peak RPM → rev limiter: power-derived hyperbola (torque = P/ω)
//!   clamped to [45%, 100%] of peak
//! - beyond the limiter: collapse toward 5–12% of peak, scaled down by
//!   the overshoot ratio
//!
//! Peak RPM is derived from the quoted horsepower and peak torque via
//! the P = τ·ω identity rather than taken from the spec sheet.

use crate::config::CarConfig;
use crate::units::{hp_to_watts, rad_per_sec_to_rpm, rpm_to_rad_per_sec};

/// Torque at the bottom of the rise segment, as a fraction of peak.
const RISE_FLOOR: f64 = 0.65;
/// Shape exponent of the rise segment.
const RISE_EXPONENT: f64 = 1.25;
/// Clamp bounds for the hyperbola segment, as fractions of peak.
const HYPERBOLA_MIN: f64 = 0.45;
/// Torque fraction the over-limiter collapse starts from.
const COLLAPSE_CEILING: f64 = 0.12;
/// Torque fraction the over-limiter collapse bottoms out at.
const COLLAPSE_FLOOR: f64 = 0.05;

/// RPM may overshoot the limiter by this factor before hard clamping.
pub const LIMITER_OVERSHOOT: f64 = 1.05;
/// Throttle attenuation applied while the limiter is cutting.
pub const LIMITER_THROTTLE_CUT: f64 = 0.25;
/// Automatic upshift at this fraction of the scaled redline.
pub const UPSHIFT_FRACTION: f64 = 0.95;
/// Automatic downshift below this fraction of the redline.
pub const DOWNSHIFT_FRACTION: f64 = 0.40;

/// RPM at which the engine makes peak power, from P = τ·ω.
pub fn peak_torque_rpm(config: &CarConfig) -> f64 {
    let peak_power_w = hp_to_watts(config.horsepower);
    let omega = peak_power_w / config.peak_torque_nm.max(1.0);
    rad_per_sec_to_rpm(omega).clamp(config.idle_rpm + 100.0, config.rev_limiter_rpm)
}

/// Engine torque (N·m) at the given RPM, wide-open throttle.
pub fn engine_torque(config: &CarConfig, rpm: f64) -> f64 {
    let peak = config.peak_torque_nm;
    let peak_rpm = peak_torque_rpm(config);
    let limiter = config.rev_limiter_rpm;

    if rpm <= peak_rpm {
        let span = (peak_rpm - config.idle_rpm).max(1.0);
        let t = ((rpm - config.idle_rpm) / span).clamp(0.0, 1.0);
        peak * (RISE_FLOOR + (1.0 - RISE_FLOOR) * t.powf(RISE_EXPONENT))
    } else if rpm <= limiter {
        let omega = rpm_to_rad_per_sec(rpm);
        let hyperbola = hp_to_watts(config.horsepower) / omega.max(1e-6);
        hyperbola.clamp(HYPERBOLA_MIN * peak, peak)
    } else {
        // Past the limiter the cut dominates; deeper overshoot cuts harder.
        let overshoot = rpm / limiter.max(1.0);
        (COLLAPSE_CEILING * peak / overshoot).max(COLLAPSE_FLOOR * peak)
    }
}

/// Effective gearbox ratio for a gear index.
///
/// Gear 0 is neutral (0.0). Reverse (−1) uses the magnitude of the
/// first forward ratio as a proxy.
pub fn effective_gear_ratio(config: &CarConfig, gear: i8) -> f64 {
    if gear > 0 {
        config
            .gear_ratios
            .get(gear as usize)
            .copied()
            .unwrap_or(0.0)
    } else if gear < 0 {
        config.gear_ratios.get(1).copied().unwrap_or(0.0).abs()
    } else {
        0.0
    }
}

/// Engine RPM implied by wheel speed through the given total ratio.
pub fn rpm_from_wheel_speed(config: &CarConfig, v_long_abs: f64, gear_ratio: f64) -> f64 {
    let wheel_omega = v_long_abs / config.wheel_radius_m.max(1e-6);
    rad_per_sec_to_rpm(wheel_omega * gear_ratio * config.final_drive)
}

/// RPM above which the automatic gearbox upshifts.
pub fn upshift_rpm(config: &CarConfig) -> f64 {
    config.rev_limiter_rpm * UPSHIFT_FRACTION
}

/// RPM below which the automatic gearbox downshifts (throttle permitting).
pub fn downshift_rpm(config: &CarConfig) -> f64 {
    config.rev_limiter_rpm * DOWNSHIFT_FRACTION
}
