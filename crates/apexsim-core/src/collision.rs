//! External collision-system interface
//!
//! The broad-phase collision/physics body system lives outside this
//! crate. The simulation only needs a narrow surface: create a box
//! body, ask the system to separate it from the world, and fold the
//! corrective world displacement back into the vehicle's position via
//! [`VehicleModel::apply_world_displacement`](crate::vehicle::VehicleModel::apply_world_displacement).

/// Pose of an externally owned collision body.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BodyHandle {
    /// World X (m)
    pub x: f64,
    /// World Y (m)
    pub y: f64,
    /// Orientation (rad)
    pub angle: f64,
}

/// Options accepted when registering a box body.
#[derive(Debug, Clone, Copy, Default)]
pub struct BodyOptions {
    /// Body participates in separation but never moves.
    pub is_static: bool,
    /// Opaque collision-group tag interpreted by the host.
    pub group: u32,
}

/// The collision system the host environment provides.
///
/// `separate_body` resolves overlaps and reports each contact through
/// the callback; the returned displacement is what the vehicle folds
/// back into its own position after its dynamics tick.
pub trait CollisionWorld {
    /// Register an axis-aligned box at `(x, y)` with the given extents.
    fn create_box(&mut self, x: f64, y: f64, width: f64, height: f64, options: BodyOptions)
        -> BodyHandle;

    /// Push `body` out of penetration. Returns the applied world-space
    /// displacement `(dx, dy)`; `on_collision` fires once per contact.
    fn separate_body(
        &mut self,
        body: &mut BodyHandle,
        on_collision: &mut dyn FnMut(&BodyHandle),
    ) -> (f64, f64);
}
