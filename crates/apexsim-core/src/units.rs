//! Unit Conversion Functions
//!
//! Conversion helpers shared by the simulation and calibration code:
//! - Speed: m/s ↔ km/h, mph ↔ km/h
//! - Power: hp ↔ watts
//! - Rotation: RPM ↔ rad/s
//! - World units: rendering pixels ↔ meters (1 px = 1/16 m)
//! - Angles: normalization into (−π, π]

/// Rendering pixels per meter (1 px = 1/16 m).
pub const PIXELS_PER_METER: f64 = 16.0;

/// Mechanical watts per imperial horsepower.
pub const WATTS_PER_HP: f64 = 745.699872;

/// Convert meters per second to km/h
pub fn mps_to_kph(mps: f64) -> f64 {
    mps * 3.6
}

/// Convert km/h to meters per second
pub fn kph_to_mps(kph: f64) -> f64 {
    kph / 3.6
}

/// Convert mph to km/h
pub fn mph_to_kph(mph: f64) -> f64 {
    mph * 1.60934
}

/// Convert km/h to mph
pub fn kph_to_mph(kph: f64) -> f64 {
    kph / 1.60934
}

/// Convert horsepower to watts
pub fn hp_to_watts(hp: f64) -> f64 {
    hp * WATTS_PER_HP
}

/// Convert RPM to radians per second
pub fn rpm_to_rad_per_sec(rpm: f64) -> f64 {
    rpm * std::f64::consts::TAU / 60.0
}

/// Convert radians per second to RPM
pub fn rad_per_sec_to_rpm(rad_per_sec: f64) -> f64 {
    rad_per_sec * 60.0 / std::f64::consts::TAU
}

/// Convert rendering pixels to meters
pub fn pixels_to_meters(px: f64) -> f64 {
    px / PIXELS_PER_METER
}

/// Convert meters to rendering pixels
pub fn meters_to_pixels(m: f64) -> f64 {
    m * PIXELS_PER_METER
}

/// Normalize an angle in radians into (−π, π]
pub fn normalize_angle(angle: f64) -> f64 {
    use std::f64::consts::{PI, TAU};
    let mut a = angle % TAU;
    if a <= -PI {
        a += TAU;
    } else if a > PI {
        a -= TAU;
    }
    a
}
