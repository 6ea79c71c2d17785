//! Brake-at-rest safety: the brake-direction fallback must not creep
//! the car or inject NaN into the tire forces.

use apexsim_core::prelude::*;

const DT: f64 = 1.0 / 200.0;
/// The interactive simulation cadence; coarser than the measurement
/// timestep, so per-tick impulses are much larger here.
const LIVE_DT: f64 = 1.0 / 60.0;

#[test]
fn brake_at_rest_holds_exact_zero_for_a_thousand_ticks() {
    let mut model = VehicleModel::new(CarConfig::default());
    for tick in 0..1000 {
        model.step(0.0, 1.0, 0.0, DT);
        let state = model.state();
        assert_eq!(
            state.velocity,
            Vec2::ZERO,
            "velocity crept at tick {tick}"
        );
        for (i, tf) in state.tire_forces.iter().enumerate() {
            assert!(
                tf.longitudinal.is_finite() && tf.lateral.is_finite(),
                "NaN tire force on wheel {i} at tick {tick}"
            );
            assert!(tf.long_max.is_finite() && tf.lat_max.is_finite());
        }
        assert!(state.position.x.abs() < 1e-6);
    }
}

#[test]
fn brake_at_rest_holds_exact_zero_at_the_live_tick_rate() {
    // At 60 Hz a full rearward brake impulse would exceed the settle
    // speed in a single tick; the momentum cap must keep the car from
    // entering a kick-settle limit cycle and walking backwards.
    let mut model = VehicleModel::new(CarConfig::default());
    for tick in 0..1000 {
        model.step(0.0, 1.0, 0.0, LIVE_DT);
        let state = model.state();
        assert_eq!(
            state.velocity,
            Vec2::ZERO,
            "velocity crept at tick {tick}"
        );
        assert!(
            state.position.x.abs() < 1e-9 && state.position.y.abs() < 1e-9,
            "position drifted at tick {tick}"
        );
    }
}

#[test]
fn braking_from_speed_at_the_live_tick_rate_reaches_exact_zero() {
    let mut model = VehicleModel::new(CarConfig::default());
    for _ in 0..240 {
        model.step(1.0, 0.0, 0.0, LIVE_DT);
    }
    assert!(model.state().speed() > 10.0);
    for _ in 0..1200 {
        model.step(0.0, 1.0, 0.0, LIVE_DT);
    }
    assert_eq!(model.state().velocity, Vec2::ZERO);
    // And it stays held.
    for _ in 0..120 {
        model.step(0.0, 1.0, 0.0, LIVE_DT);
        assert_eq!(model.state().velocity, Vec2::ZERO);
    }
}

#[test]
fn braking_from_speed_reaches_exact_zero() {
    let mut model = VehicleModel::new(CarConfig::default());
    for _ in 0..800 {
        model.step(1.0, 0.0, 0.0, DT);
    }
    assert!(model.state().speed() > 10.0);
    let mut stopped_at = None;
    for tick in 0..6000 {
        model.step(0.0, 1.0, 0.0, DT);
        if model.state().velocity == Vec2::ZERO {
            stopped_at = Some(tick);
            break;
        }
    }
    let stopped_at = stopped_at.expect("car never stopped");
    // Once stopped it must stay stopped.
    for _ in stopped_at..stopped_at + 200 {
        model.step(0.0, 1.0, 0.0, DT);
        assert_eq!(model.state().velocity, Vec2::ZERO);
    }
}
