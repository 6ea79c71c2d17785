//! Vehicle Model
//!
//! Deterministic per-tick dynamics integrator: body-frame velocity
//! decomposition, powertrain and gearbox state, load transfer with
//! one-tick-delayed acceleration feedback, slip-angle tire forces with
//! per-wheel friction-ellipse saturation, and semi-implicit Euler
//! integration.
//!
//! `step` never panics and never produces NaN: every division carries
//! an epsilon guard, non-finite inputs are treated as zero, and the
//! brake direction falls back to forward when the longitudinal speed
//! is indeterminate.

use serde::{Deserialize, Serialize};

use crate::config::CarConfig;
use crate::powertrain;
use crate::units::normalize_angle;

/// Standard air density at sea level (kg/m³).
pub const AIR_DENSITY: f64 = 1.225;
/// Gravitational acceleration (m/s²).
pub const GRAVITY: f64 = 9.81;

/// Throttle smoothing rate (units of full range per second).
const THROTTLE_RATE: f64 = 4.0;
/// Brake smoothing rate.
const BRAKE_RATE: f64 = 6.0;
/// Steering rate limit (rad/s).
const STEER_RATE: f64 = 2.8;
/// Maximum steering lock (rad).
const MAX_STEER: f64 = 0.55;
/// Below this longitudinal speed reverse may engage/disengage (m/s).
const REVERSE_ENGAGE_SPEED: f64 = 0.8;
/// Negative throttle must be held this long before reverse engages (s).
const REVERSE_INTENT_TIME: f64 = 0.25;
/// Throttle magnitude that counts as reverse/forward intent.
const INTENT_THROTTLE: f64 = 0.2;
/// RPM decay rate toward idle when the wheels are not driving it (1/s).
const RPM_DECAY: f64 = 3.0;
/// Speed floor in the slip-angle denominator (m/s).
const SLIP_SPEED_FLOOR: f64 = 0.8;
/// Cornering stiffness per radian, as a multiple of the grip-scaled load.
const CORNERING_STIFFNESS: f64 = 9.0;
/// Speed at which the downforce ramp saturates (m/s, ~40 mph).
const DOWNFORCE_RAMP_SPEED: f64 = 17.9;
/// Clamp on the lateral load-transfer bias.
const LATERAL_BIAS_LIMIT: f64 = 0.45;
/// Below this speed the brake direction falls back to forward (m/s).
const BRAKE_DIRECTION_FLOOR: f64 = 0.05;
/// Speed under which the vehicle settles to an exact stop (m/s).
const STOP_SPEED: f64 = 0.15;
/// Input magnitude under which the stop settle may trigger.
const STOP_INPUT: f64 = 0.05;
/// Generic division guard.
const EPSILON: f64 = 1e-9;

/// Minimal 2D vector used for world-frame position and velocity.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec2 {
    /// X component
    pub x: f64,
    /// Y component
    pub y: f64,
}

impl Vec2 {
    /// The zero vector.
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    /// Construct from components.
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean length.
    pub fn length(self) -> f64 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    /// Dot product.
    pub fn dot(self, other: Vec2) -> f64 {
        self.x * other.x + self.y * other.y
    }
}

/// Saturated force state of one tire for the current tick.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TireForces {
    /// Longitudinal force in the tire frame (N)
    pub longitudinal: f64,
    /// Lateral force in the tire frame (N)
    pub lateral: f64,
    /// Longitudinal friction bound (N)
    pub long_max: f64,
    /// Lateral friction bound (N)
    pub lat_max: f64,
}

/// Mutable vehicle state, owned exclusively by one `VehicleModel` and
/// mutated once per tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VehicleState {
    /// World position (m)
    pub position: Vec2,
    /// World velocity (m/s)
    pub velocity: Vec2,
    /// Heading (rad), normalized into (−π, π]
    pub heading: f64,
    /// Yaw rate (rad/s)
    pub yaw_rate: f64,
    /// Rate-limited steering angle (rad)
    pub steer_angle: f64,
    /// Smoothed throttle (−1..1)
    pub throttle: f64,
    /// Smoothed brake (0..1)
    pub brake: f64,
    /// Gear index: −1 reverse, 0 neutral, 1..N forward
    pub gear: i8,
    /// True while the transmission is in reverse
    pub reverse_mode: bool,
    /// True when the driver shifts manually
    pub manual_mode: bool,
    /// Engine speed (RPM), clamped to [idle, limiter × 1.05]
    pub rpm: f64,
    /// Longitudinal acceleration recorded last tick (m/s²)
    pub last_long_accel: f64,
    /// Lateral acceleration recorded last tick (m/s²)
    pub last_lat_accel: f64,
    /// Per-wheel saturated tire forces from the last tick [FL, FR, RL, RR]
    pub tire_forces: [TireForces; 4],
    /// Accumulated reverse/forward intent time (s)
    reverse_intent_s: f64,
}

impl VehicleState {
    fn at_rest(idle_rpm: f64) -> Self {
        Self {
            position: Vec2::ZERO,
            velocity: Vec2::ZERO,
            heading: 0.0,
            yaw_rate: 0.0,
            steer_angle: 0.0,
            throttle: 0.0,
            brake: 0.0,
            gear: 1,
            reverse_mode: false,
            manual_mode: false,
            rpm: idle_rpm,
            last_long_accel: 0.0,
            last_lat_accel: 0.0,
            tire_forces: [TireForces::default(); 4],
            reverse_intent_s: 0.0,
        }
    }

    /// Speed over ground (m/s).
    pub fn speed(&self) -> f64 {
        self.velocity.length()
    }
}

/// One simulated vehicle: an immutable config plus the state it owns.
#[derive(Debug, Clone)]
pub struct VehicleModel {
    config: CarConfig,
    state: VehicleState,
}

impl VehicleModel {
    /// Construct a vehicle at rest at the world origin, in first gear,
    /// automatic mode, engine at idle.
    pub fn new(config: CarConfig) -> Self {
        let state = VehicleState::at_rest(config.idle_rpm);
        Self { config, state }
    }

    /// The config this model was constructed with.
    pub fn config(&self) -> &CarConfig {
        &self.config
    }

    /// Current state, read-only.
    pub fn state(&self) -> &VehicleState {
        &self.state
    }

    /// Switch between manual and automatic shifting.
    pub fn set_manual_mode(&mut self, manual: bool) {
        self.state.manual_mode = manual;
    }

    /// Manual upshift by exactly one gear, bounded to [−1, N].
    pub fn shift_up(&mut self) {
        let max = self.config.forward_gears();
        self.state.gear = (self.state.gear + 1).min(max);
        self.state.reverse_mode = self.state.gear < 0;
    }

    /// Manual downshift by exactly one gear, bounded to [−1, N].
    pub fn shift_down(&mut self) {
        self.state.gear = (self.state.gear - 1).max(-1);
        self.state.reverse_mode = self.state.gear < 0;
    }

    /// Fold a corrective world-space displacement from the external
    /// collision system back into the position state.
    pub fn apply_world_displacement(&mut self, dx: f64, dy: f64) {
        if dx.is_finite() && dy.is_finite() {
            self.state.position.x += dx;
            self.state.position.y += dy;
        }
    }

    /// Advance the state by one timestep.
    ///
    /// `throttle_input` ∈ [−1, 1], `brake_input` ∈ [0, 1],
    /// `steer_input` ∈ [−1, 1], `dt` > 0 seconds. Out-of-range values
    /// are clamped; non-finite values are treated as zero.
    pub fn step(&mut self, throttle_input: f64, brake_input: f64, steer_input: f64, dt: f64) {
        if !dt.is_finite() || dt <= 0.0 {
            return;
        }
        let throttle_input = sanitize(throttle_input).clamp(-1.0, 1.0);
        let brake_input = sanitize(brake_input).clamp(0.0, 1.0);
        let steer_input = sanitize(steer_input).clamp(-1.0, 1.0);

        let c = &self.config;
        let s = &mut self.state;

        // 1. Body frame: x forward, y left.
        let forward = Vec2::new(s.heading.cos(), s.heading.sin());
        let left = Vec2::new(-s.heading.sin(), s.heading.cos());
        let v_long = s.velocity.dot(forward);
        let v_lat = s.velocity.dot(left);
        let speed = s.velocity.length();

        // 2. Input smoothing and transmission state.
        s.throttle += (throttle_input - s.throttle).clamp(-THROTTLE_RATE * dt, THROTTLE_RATE * dt);
        s.brake += (brake_input - s.brake).clamp(-BRAKE_RATE * dt, BRAKE_RATE * dt);
        let steer_target = steer_input * MAX_STEER;
        s.steer_angle += (steer_target - s.steer_angle).clamp(-STEER_RATE * dt, STEER_RATE * dt);

        if !s.manual_mode {
            let near_stop = v_long.abs() < REVERSE_ENGAGE_SPEED;
            let intent = if s.reverse_mode {
                s.throttle > INTENT_THROTTLE
            } else {
                s.throttle < -INTENT_THROTTLE
            };
            if near_stop && intent {
                s.reverse_intent_s += dt;
                if s.reverse_intent_s >= REVERSE_INTENT_TIME {
                    s.reverse_mode = !s.reverse_mode;
                    s.gear = if s.reverse_mode { -1 } else { 1 };
                    s.reverse_intent_s = 0.0;
                }
            } else {
                s.reverse_intent_s = 0.0;
            }
        }

        let mut gear_ratio = powertrain::effective_gear_ratio(c, s.gear);

        // Engine RPM follows the wheels when engaged and moving, else
        // decays toward idle.
        if gear_ratio.abs() > EPSILON && v_long.abs() > 0.1 {
            s.rpm = powertrain::rpm_from_wheel_speed(c, v_long.abs(), gear_ratio);
        } else {
            s.rpm += (c.idle_rpm - s.rpm) * (RPM_DECAY * dt).min(1.0);
        }
        s.rpm = s
            .rpm
            .clamp(c.idle_rpm, c.rev_limiter_rpm * powertrain::LIMITER_OVERSHOOT);

        let mut throttle_eff = s.throttle;
        if s.rpm >= c.rev_limiter_rpm {
            throttle_eff *= powertrain::LIMITER_THROTTLE_CUT;
        }

        if !s.manual_mode && s.gear >= 1 {
            if s.rpm > powertrain::upshift_rpm(c) && s.gear < c.forward_gears() {
                s.gear += 1;
            } else if s.rpm < powertrain::downshift_rpm(c) && s.gear > 1 && s.throttle < 0.9 {
                s.gear -= 1;
            }
            let new_ratio = powertrain::effective_gear_ratio(c, s.gear);
            if new_ratio != gear_ratio {
                gear_ratio = new_ratio;
                if gear_ratio.abs() > EPSILON && v_long.abs() > 0.1 {
                    s.rpm = powertrain::rpm_from_wheel_speed(c, v_long.abs(), gear_ratio)
                        .clamp(c.idle_rpm, c.rev_limiter_rpm * powertrain::LIMITER_OVERSHOOT);
                }
            }
        }

        // 3–4. Drive and brake forces.
        let torque = powertrain::engine_torque(c, s.rpm);
        let drive_throttle = if s.reverse_mode {
            (-throttle_eff).max(0.0)
        } else {
            throttle_eff.max(0.0)
        };
        let drive_sign = if s.reverse_mode { -1.0 } else { 1.0 };
        let drive_total = torque * drive_throttle * c.drivetrain_efficiency * gear_ratio
            * c.final_drive
            / c.wheel_radius_m.max(EPSILON)
            * drive_sign;
        let (front_frac, rear_frac) = c.drive_type.drive_split();
        let drive_per_wheel = [
            drive_total * front_frac * 0.5,
            drive_total * front_frac * 0.5,
            drive_total * rear_frac * 0.5,
            drive_total * rear_frac * 0.5,
        ];

        // Opposite-direction throttle acts as brake until reverse engages.
        let counter_throttle = if s.reverse_mode {
            s.throttle.max(0.0)
        } else {
            (-s.throttle).max(0.0)
        };
        let brake_level = s.brake.max(if v_long.abs() > REVERSE_ENGAGE_SPEED {
            counter_throttle
        } else {
            0.0
        });
        // Brake opposes travel; direction falls back to forward at rest.
        let travel_sign = if v_long.abs() > BRAKE_DIRECTION_FLOOR {
            v_long.signum()
        } else {
            1.0
        };
        let bias = [
            2.0 * c.front_brake_bias,
            2.0 * c.front_brake_bias,
            2.0 * (1.0 - c.front_brake_bias),
            2.0 * (1.0 - c.front_brake_bias),
        ];

        // 5. Aerodynamics.
        let mut drag = 0.5 * AIR_DENSITY * c.drag_coefficient * c.frontal_area_m2 * speed * speed;
        if v_long < -0.1 {
            drag *= 2.0;
        }
        let ramp = (speed / DOWNFORCE_RAMP_SPEED).clamp(0.0, 1.0);
        let downforce =
            0.5 * AIR_DENSITY * c.downforce_coefficient * c.frontal_area_m2 * speed * speed * ramp;

        // 6. Load transfer, fed by last tick's accelerations.
        let total_weight = c.mass_kg * GRAVITY + downforce;
        let front_static = total_weight * c.front_weight_dist;
        let rear_static = total_weight * (1.0 - c.front_weight_dist);
        let long_transfer =
            c.mass_kg * s.last_long_accel * c.cg_height_m / c.wheelbase_m.max(EPSILON);
        let front_load = (front_static - long_transfer).max(0.0);
        let rear_load = (rear_static + long_transfer).max(0.0);
        let lat_bias = (s.last_lat_accel * c.cg_height_m
            / (GRAVITY * c.track_width_m.max(EPSILON)))
        .clamp(-LATERAL_BIAS_LIMIT, LATERAL_BIAS_LIMIT);
        let left_share = 0.5 - lat_bias;
        let right_share = 0.5 + lat_bias;
        let loads = [
            front_load * left_share,
            front_load * right_share,
            rear_load * left_share,
            rear_load * right_share,
        ];

        // 7. Tire forces with friction-ellipse saturation.
        let dist_front = c.wheelbase_m * (1.0 - c.front_weight_dist);
        let dist_rear = c.wheelbase_m * c.front_weight_dist;
        let slip_denom = v_long.abs().max(SLIP_SPEED_FLOOR);
        let alpha_front = (v_lat + s.yaw_rate * dist_front).atan2(slip_denom) - s.steer_angle;
        let alpha_rear = (v_lat - s.yaw_rate * dist_rear).atan2(slip_denom);

        let half_track = c.track_width_m * 0.5;
        let wheel_pos = [
            Vec2::new(dist_front, half_track),
            Vec2::new(dist_front, -half_track),
            Vec2::new(-dist_rear, half_track),
            Vec2::new(-dist_rear, -half_track),
        ];

        let mut body_force = Vec2::ZERO;
        let mut yaw_moment = 0.0;
        for i in 0..4 {
            let load = loads[i];
            let long_max = c.tire_grip_long[i] * load + EPSILON;
            let lat_max = c.tire_grip_lat[i] * load + EPSILON;
            let alpha = if i < 2 { alpha_front } else { alpha_rear };

            let mut f_lat = (-CORNERING_STIFFNESS * c.tire_grip_lat[i] * load * alpha)
                .clamp(-lat_max, lat_max);
            // The brake never pushes the car through zero: each wheel is
            // capped at the force that removes its share of the
            // longitudinal momentum within this tick, so at rest it is a
            // static clamp rather than a rearward kick.
            let momentum_cap =
                load / total_weight.max(EPSILON) * c.mass_kg * v_long.abs() / dt;
            let brake_magnitude =
                bias[i] * c.brake_torque_nm[i] * brake_level / c.wheel_radius_m.max(EPSILON);
            let brake_force = brake_magnitude.min(momentum_cap) * -travel_sign;
            let mut f_long = (drive_per_wheel[i] + brake_force).clamp(-long_max, long_max);

            // Friction ellipse: scale both components together, never
            // one axis alone.
            let usage = (f_long / long_max).powi(2) + (f_lat / lat_max).powi(2);
            if usage > 1.0 {
                let scale = 1.0 / usage.sqrt();
                f_long *= scale;
                f_lat *= scale;
            }
            s.tire_forces[i] = TireForces {
                longitudinal: f_long,
                lateral: f_lat,
                long_max,
                lat_max,
            };

            // Front tires act in the steered frame.
            let (fx, fy) = if i < 2 {
                let (sin_d, cos_d) = s.steer_angle.sin_cos();
                (f_long * cos_d - f_lat * sin_d, f_long * sin_d + f_lat * cos_d)
            } else {
                (f_long, f_lat)
            };
            body_force.x += fx;
            body_force.y += fy;
            yaw_moment += wheel_pos[i].x * fy - wheel_pos[i].y * fx;
        }

        // 8. Integration (semi-implicit Euler).
        let mut world_force = Vec2::new(
            forward.x * body_force.x + left.x * body_force.y,
            forward.y * body_force.x + left.y * body_force.y,
        );
        if speed > BRAKE_DIRECTION_FLOOR {
            let inv = 1.0 / (speed + EPSILON);
            let resist = drag + c.rolling_resistance * total_weight;
            world_force.x -= s.velocity.x * inv * resist;
            world_force.y -= s.velocity.y * inv * resist;
        }

        let accel = Vec2::new(world_force.x / c.mass_kg, world_force.y / c.mass_kg);
        s.velocity.x += accel.x * dt;
        s.velocity.y += accel.y * dt;
        s.position.x += s.velocity.x * dt;
        s.position.y += s.velocity.y * dt;

        let inertia = c.mass_kg
            * (c.wheelbase_m * c.wheelbase_m + c.track_width_m * c.track_width_m)
            / 12.0;
        s.yaw_rate += yaw_moment / inertia.max(EPSILON) * dt;
        s.heading = normalize_angle(s.heading + s.yaw_rate * dt);

        // Recorded for next tick's load transfer.
        s.last_long_accel = accel.dot(forward);
        s.last_lat_accel = accel.dot(left);

        // 9. Low-speed settle: snap to an exact stop instead of creeping.
        if s.velocity.length() < STOP_SPEED && s.throttle.abs() < STOP_INPUT {
            s.velocity = Vec2::ZERO;
            s.yaw_rate = 0.0;
            s.last_long_accel = 0.0;
            s.last_lat_accel = 0.0;
        }
    }
}

fn sanitize(v: f64) -> f64 {
    if v.is_finite() {
        v
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: f64 = 1.0 / 200.0;

    fn model() -> VehicleModel {
        VehicleModel::new(CarConfig::default())
    }

    #[test]
    fn full_throttle_accelerates_forward() {
        let mut m = model();
        for _ in 0..400 {
            m.step(1.0, 0.0, 0.0, DT);
        }
        let s = m.state();
        assert!(s.speed() > 5.0, "speed {}", s.speed());
        assert!(s.position.x > 0.0);
        assert!(s.position.y.abs() < 1.0);
    }

    #[test]
    fn automatic_gearbox_upshifts() {
        let mut m = model();
        for _ in 0..4000 {
            m.step(1.0, 0.0, 0.0, DT);
        }
        assert!(m.state().gear > 1, "gear {}", m.state().gear);
    }

    #[test]
    fn rpm_stays_in_bounds() {
        let mut m = model();
        let limit = m.config().rev_limiter_rpm * powertrain::LIMITER_OVERSHOOT;
        for _ in 0..6000 {
            m.step(1.0, 0.0, 0.0, DT);
            let rpm = m.state().rpm;
            assert!(rpm >= m.config().idle_rpm - 1e-9);
            assert!(rpm <= limit + 1e-9);
        }
    }

    #[test]
    fn steering_turns_the_car() {
        let mut m = model();
        for _ in 0..600 {
            m.step(1.0, 0.0, 0.0, DT);
        }
        for _ in 0..400 {
            m.step(0.5, 0.0, 1.0, DT);
        }
        assert!(m.state().heading.abs() > 0.05);
    }

    #[test]
    fn braking_stops_the_car_exactly() {
        let mut m = model();
        for _ in 0..600 {
            m.step(1.0, 0.0, 0.0, DT);
        }
        for _ in 0..4000 {
            m.step(0.0, 1.0, 0.0, DT);
        }
        assert_eq!(m.state().velocity, Vec2::ZERO);
    }

    #[test]
    fn reverse_engages_only_near_stop_with_sustained_intent() {
        let mut m = model();
        // A brief tap must not engage reverse.
        for _ in 0..20 {
            m.step(-1.0, 0.0, 0.0, DT);
        }
        assert!(!m.state().reverse_mode);
        // Sustained negative throttle at rest does.
        for _ in 0..200 {
            m.step(-1.0, 0.0, 0.0, DT);
        }
        assert!(m.state().reverse_mode);
        assert_eq!(m.state().gear, -1);
        // And the car moves backwards.
        for _ in 0..400 {
            m.step(-1.0, 0.0, 0.0, DT);
        }
        assert!(m.state().position.x < -0.5);
    }

    #[test]
    fn manual_shift_bounds() {
        let mut m = model();
        m.set_manual_mode(true);
        for _ in 0..20 {
            m.shift_down();
        }
        assert_eq!(m.state().gear, -1);
        assert!(m.state().reverse_mode);
        for _ in 0..20 {
            m.shift_up();
        }
        assert_eq!(m.state().gear, m.config().forward_gears());
        assert!(!m.state().reverse_mode);
    }

    #[test]
    fn friction_ellipse_holds_every_tick() {
        let mut m = model();
        for tick in 0..2000 {
            let steer = if tick > 600 { 1.0 } else { 0.0 };
            m.step(1.0, 0.0, steer, DT);
            for (i, tf) in m.state().tire_forces.iter().enumerate() {
                let usage = (tf.longitudinal / tf.long_max).powi(2)
                    + (tf.lateral / tf.lat_max).powi(2);
                assert!(usage <= 1.0 + 1e-6, "wheel {i} tick {tick}: usage {usage}");
            }
        }
    }

    #[test]
    fn non_finite_inputs_are_harmless() {
        let mut m = model();
        for _ in 0..200 {
            m.step(f64::NAN, f64::INFINITY, f64::NEG_INFINITY, DT);
        }
        assert!(m.state().velocity.x.is_finite());
        assert!(m.state().velocity.y.is_finite());
        assert!(m.state().heading.is_finite());
    }

    #[test]
    fn world_displacement_folds_into_position() {
        let mut m = model();
        m.apply_world_displacement(1.5, -0.5);
        assert_eq!(m.state().position, Vec2::new(1.5, -0.5));
        m.apply_world_displacement(f64::NAN, 1.0);
        assert_eq!(m.state().position, Vec2::new(1.5, -0.5));
    }
}
