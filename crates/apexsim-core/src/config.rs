//! Car configuration and catalog specs
//!
//! `CarSpec` is the serde-facing catalog entry: everything is optional
//! and tolerant of sloppy source data. `CarConfig` is the immutable
//! snapshot one `VehicleModel` instance consumes. The two are bridged
//! by a layered builder: defaults → spec values → calibration
//! overrides, each layer pure and order-explicit.

use serde::{Deserialize, Serialize};

use crate::calibration::CalibrationOverrides;

/// Which axle(s) receive drive torque.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DriveType {
    /// Front-wheel drive
    Fwd,
    /// Rear-wheel drive
    #[default]
    Rwd,
    /// All-wheel drive
    Awd,
}

impl DriveType {
    /// Fraction of drive force sent to the (front, rear) axle.
    pub fn drive_split(self) -> (f64, f64) {
        match self {
            DriveType::Fwd => (1.0, 0.0),
            DriveType::Rwd => (0.0, 1.0),
            DriveType::Awd => (0.45, 0.55),
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "fwd" | "front" => Some(DriveType::Fwd),
            "rwd" | "rear" => Some(DriveType::Rwd),
            "awd" | "4wd" | "all" => Some(DriveType::Awd),
            _ => None,
        }
    }
}

/// Array-valued spec field that accepts scalar, delimited-string, or
/// array JSON forms.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FlexArray {
    /// Single value replicated across all four wheels
    Scalar(f64),
    /// Comma/whitespace-delimited numbers, e.g. `"1.1, 1.1, 1.0, 1.0"`
    Text(String),
    /// Explicit list; shorter lists replicate modulo their length
    List(Vec<f64>),
}

impl FlexArray {
    /// Normalize to exactly four finite entries ([FL, FR, RL, RR]).
    /// Returns `None` when nothing usable was given.
    pub fn to_four(&self) -> Option<[f64; 4]> {
        let values: Vec<f64> = match self {
            FlexArray::Scalar(v) => vec![*v],
            FlexArray::Text(s) => s
                .split(|c: char| c == ',' || c.is_whitespace())
                .filter(|p| !p.is_empty())
                .filter_map(|p| p.parse::<f64>().ok())
                .collect(),
            FlexArray::List(v) => v.clone(),
        };
        let finite: Vec<f64> = values.into_iter().filter(|v| v.is_finite()).collect();
        if finite.is_empty() {
            return None;
        }
        let mut out = [0.0; 4];
        for (i, slot) in out.iter_mut().enumerate() {
            *slot = finite[i % finite.len()];
        }
        Some(out)
    }
}

/// Published performance figures, in any of the synonymous source units.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceFigures {
    /// Top speed in km/h
    pub top_speed_kph: Option<f64>,
    /// Top speed in mph
    pub top_speed_mph: Option<f64>,
    /// 0–100 km/h time in seconds
    pub zero_to_hundred_sec: Option<f64>,
    /// 0–60 mph time in seconds
    pub zero_to_sixty_sec: Option<f64>,
}

/// A vehicle catalog entry as it arrives from data files.
///
/// Every physical field is optional; absent or non-finite values fall
/// back to documented defaults during config construction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CarSpec {
    /// Stable vehicle identity used as the calibration store key
    pub id: String,
    /// Display name
    pub name: Option<String>,
    /// Set once a calibration for this spec has been accepted
    pub verified: bool,

    /// Curb mass (kg)
    pub mass_kg: Option<f64>,
    /// Drive type: "fwd", "rwd", "awd"
    pub drive_type: Option<String>,
    /// Forward gear ratios; a leading 0.0 neutral entry is optional
    pub gear_ratios: Option<Vec<f64>>,
    /// Final drive ratio
    pub final_drive: Option<f64>,
    /// Peak power (hp)
    pub horsepower: Option<f64>,
    /// Peak torque (N·m)
    pub peak_torque_nm: Option<f64>,
    /// Brake horsepower, when quoted separately from `horsepower`
    pub brake_horsepower: Option<f64>,
    /// Aerodynamic drag coefficient
    pub drag_coefficient: Option<f64>,
    /// Downforce coefficient
    pub downforce_coefficient: Option<f64>,
    /// Frontal area (m²)
    pub frontal_area_m2: Option<f64>,
    /// Wheel radius (m)
    pub wheel_radius_m: Option<f64>,
    /// Longitudinal tire grip per wheel
    pub tire_grip_long: Option<FlexArray>,
    /// Lateral tire grip per wheel
    pub tire_grip_lat: Option<FlexArray>,
    /// Wheelbase (m)
    pub wheelbase_m: Option<f64>,
    /// Center-of-gravity height (m)
    pub cg_height_m: Option<f64>,
    /// Track width (m)
    pub track_width_m: Option<f64>,
    /// Front weight distribution (0–1)
    pub front_weight_dist: Option<f64>,
    /// Drivetrain efficiency (0–1)
    pub drivetrain_efficiency: Option<f64>,
    /// Rolling resistance coefficient
    pub rolling_resistance: Option<f64>,
    /// Rev limiter (RPM)
    pub rev_limiter_rpm: Option<f64>,
    /// Idle speed (RPM)
    pub idle_rpm: Option<f64>,
    /// Brake torque per wheel (N·m)
    pub brake_torque_nm: Option<FlexArray>,
    /// Front brake bias (0–1)
    pub front_brake_bias: Option<f64>,

    /// Performance figures at the top level
    #[serde(flatten)]
    pub figures: PerformanceFigures,
    /// Nested `performance` sub-object, probed after the top level
    pub performance: Option<PerformanceFigures>,
    /// Nested `stats` sub-object, probed last
    pub stats: Option<PerformanceFigures>,
}

/// Immutable physical description consumed by one `VehicleModel`.
///
/// Invariants: all four-element arrays have exactly 4 entries
/// ([FL, FR, RL, RR]) and `gear_ratios[0] == 0.0` (neutral).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CarConfig {
    /// Curb mass (kg)
    pub mass_kg: f64,
    /// Driven axle layout
    pub drive_type: DriveType,
    /// Gear ratios; index 0 is reserved neutral (0.0), 1..N forward
    pub gear_ratios: Vec<f64>,
    /// Final drive ratio
    pub final_drive: f64,
    /// Peak power (hp)
    pub horsepower: f64,
    /// Peak torque (N·m)
    pub peak_torque_nm: f64,
    /// Brake horsepower; follows `horsepower` when not quoted separately
    pub brake_horsepower: f64,
    /// Aerodynamic drag coefficient
    pub drag_coefficient: f64,
    /// Downforce coefficient
    pub downforce_coefficient: f64,
    /// Frontal area (m²)
    pub frontal_area_m2: f64,
    /// Wheel radius (m)
    pub wheel_radius_m: f64,
    /// Longitudinal tire grip per wheel
    pub tire_grip_long: [f64; 4],
    /// Lateral tire grip per wheel
    pub tire_grip_lat: [f64; 4],
    /// Wheelbase (m)
    pub wheelbase_m: f64,
    /// Center-of-gravity height (m)
    pub cg_height_m: f64,
    /// Track width (m)
    pub track_width_m: f64,
    /// Front weight distribution (0–1)
    pub front_weight_dist: f64,
    /// Drivetrain efficiency (0–1)
    pub drivetrain_efficiency: f64,
    /// Rolling resistance coefficient
    pub rolling_resistance: f64,
    /// Rev limiter (RPM)
    pub rev_limiter_rpm: f64,
    /// Idle speed (RPM)
    pub idle_rpm: f64,
    /// Brake torque per wheel (N·m)
    pub brake_torque_nm: [f64; 4],
    /// Front brake bias (0–1)
    pub front_brake_bias: f64,
}

impl Default for CarConfig {
    fn default() -> Self {
        Self {
            mass_kg: 1300.0,
            drive_type: DriveType::Rwd,
            gear_ratios: vec![0.0, 3.6, 2.19, 1.41, 1.0, 0.83, 0.68],
            final_drive: 3.9,
            horsepower: 180.0,
            peak_torque_nm: 260.0,
            brake_horsepower: 180.0,
            drag_coefficient: 0.32,
            downforce_coefficient: 0.35,
            frontal_area_m2: 2.1,
            wheel_radius_m: 0.31,
            tire_grip_long: [1.25; 4],
            tire_grip_lat: [1.15; 4],
            wheelbase_m: 2.6,
            cg_height_m: 0.52,
            track_width_m: 1.56,
            front_weight_dist: 0.52,
            drivetrain_efficiency: 0.85,
            rolling_resistance: 0.015,
            rev_limiter_rpm: 6800.0,
            idle_rpm: 900.0,
            brake_torque_nm: [1300.0, 1300.0, 1100.0, 1100.0],
            front_brake_bias: 0.62,
        }
    }
}

impl CarConfig {
    /// Start a layered builder seeded with documented defaults.
    pub fn builder() -> CarConfigBuilder {
        CarConfigBuilder::new()
    }

    /// Build a config from a spec with no calibration overrides.
    pub fn from_spec(spec: &CarSpec) -> Self {
        Self::builder().apply_spec(spec).build()
    }

    /// Number of forward gears.
    pub fn forward_gears(&self) -> i8 {
        (self.gear_ratios.len() as i8 - 1).max(0)
    }
}

/// Coalesce an optional spec value onto a default, rejecting
/// non-finite input.
fn finite_or(value: Option<f64>, default: f64) -> f64 {
    match value {
        Some(v) if v.is_finite() => v,
        _ => default,
    }
}

/// Layered `CarConfig` construction: defaults, then spec values, then
/// calibration overrides. Each layer only replaces what it names.
#[derive(Debug, Clone, Default)]
pub struct CarConfigBuilder {
    config: CarConfig,
}

impl CarConfigBuilder {
    /// Builder holding only the defaults layer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Layer spec values over the current state. Absent or non-finite
    /// fields keep their previous value, with one exception: brake
    /// horsepower tracks the effective horsepower unless the spec
    /// quotes it separately.
    pub fn apply_spec(mut self, spec: &CarSpec) -> Self {
        let c = &mut self.config;
        c.mass_kg = finite_or(spec.mass_kg, c.mass_kg);
        if let Some(dt) = spec.drive_type.as_deref().and_then(DriveType::parse) {
            c.drive_type = dt;
        }
        if let Some(ratios) = &spec.gear_ratios {
            let forward: Vec<f64> = ratios
                .iter()
                .copied()
                .filter(|r| r.is_finite() && *r > 0.0)
                .collect();
            if !forward.is_empty() {
                let mut seq = Vec::with_capacity(forward.len() + 1);
                seq.push(0.0);
                seq.extend(forward);
                c.gear_ratios = seq;
            }
        }
        c.final_drive = finite_or(spec.final_drive, c.final_drive);
        c.horsepower = finite_or(spec.horsepower, c.horsepower);
        c.peak_torque_nm = finite_or(spec.peak_torque_nm, c.peak_torque_nm);
        // Catalogs rarely quote bhp on its own; default it to the
        // effective horsepower rather than a stale previous layer.
        c.brake_horsepower = finite_or(spec.brake_horsepower, c.horsepower);
        c.drag_coefficient = finite_or(spec.drag_coefficient, c.drag_coefficient);
        c.downforce_coefficient = finite_or(spec.downforce_coefficient, c.downforce_coefficient);
        c.frontal_area_m2 = finite_or(spec.frontal_area_m2, c.frontal_area_m2);
        c.wheel_radius_m = finite_or(spec.wheel_radius_m, c.wheel_radius_m);
        if let Some(grip) = spec.tire_grip_long.as_ref().and_then(FlexArray::to_four) {
            c.tire_grip_long = grip;
        }
        if let Some(grip) = spec.tire_grip_lat.as_ref().and_then(FlexArray::to_four) {
            c.tire_grip_lat = grip;
        }
        c.wheelbase_m = finite_or(spec.wheelbase_m, c.wheelbase_m);
        c.cg_height_m = finite_or(spec.cg_height_m, c.cg_height_m);
        c.track_width_m = finite_or(spec.track_width_m, c.track_width_m);
        c.front_weight_dist = finite_or(spec.front_weight_dist, c.front_weight_dist);
        c.drivetrain_efficiency = finite_or(spec.drivetrain_efficiency, c.drivetrain_efficiency);
        c.rolling_resistance = finite_or(spec.rolling_resistance, c.rolling_resistance);
        c.rev_limiter_rpm = finite_or(spec.rev_limiter_rpm, c.rev_limiter_rpm);
        c.idle_rpm = finite_or(spec.idle_rpm, c.idle_rpm);
        if let Some(bt) = spec.brake_torque_nm.as_ref().and_then(FlexArray::to_four) {
            c.brake_torque_nm = bt;
        }
        c.front_brake_bias = finite_or(spec.front_brake_bias, c.front_brake_bias);
        self
    }

    /// Layer calibration overrides over the current state.
    pub fn apply_overrides(mut self, overrides: &CalibrationOverrides) -> Self {
        let c = &mut self.config;
        c.drag_coefficient = finite_or(overrides.drag_coefficient, c.drag_coefficient);
        c.rolling_resistance = finite_or(overrides.rolling_resistance, c.rolling_resistance);
        c.drivetrain_efficiency =
            finite_or(overrides.drivetrain_efficiency, c.drivetrain_efficiency);
        self
    }

    /// Finalize, enforcing the structural invariants.
    pub fn build(mut self) -> CarConfig {
        let c = &mut self.config;
        if c.gear_ratios.is_empty() {
            c.gear_ratios = vec![0.0];
        }
        c.gear_ratios[0] = 0.0;
        c.mass_kg = c.mass_kg.max(1.0);
        c.wheel_radius_m = c.wheel_radius_m.max(0.05);
        c.wheelbase_m = c.wheelbase_m.max(0.5);
        c.track_width_m = c.track_width_m.max(0.5);
        c.front_weight_dist = c.front_weight_dist.clamp(0.1, 0.9);
        c.drivetrain_efficiency = c.drivetrain_efficiency.clamp(0.0, 1.0);
        c.front_brake_bias = c.front_brake_bias.clamp(0.0, 1.0);
        c.rev_limiter_rpm = c.rev_limiter_rpm.max(c.idle_rpm + 500.0);
        self.config
    }
}
