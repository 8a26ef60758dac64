//! # Navigation collaborator interfaces
//!
//! The waypoint navigation core does not own any of the estimators or
//! controllers it works with. Instead each is described by a narrow trait and
//! borrowed for the duration of a single call through [`NavIo`]. The caller
//! owns the collaborators and must outlive any `NavIo` built from them.
//!
//! Frames and units: positions are in centimeters in the North-East-Up (NEU)
//! frame relative to the world origin, velocities in cm/s, accelerations in
//! cm/s^2 and headings in centi-degrees.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use nalgebra::{Vector2, Vector3};

// Internal
use crate::location::Location;

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// Position and velocity estimator.
pub trait InertialNav {
    /// Current position estimate.
    ///
    /// Units: centimeters, Frame: NEU from world origin
    fn position(&self) -> Vector3<f64>;

    /// Current velocity estimate.
    ///
    /// Units: centimeters/second, Frame: NEU
    fn velocity(&self) -> Vector3<f64>;

    /// Current altitude above the world origin.
    ///
    /// Units: centimeters
    fn altitude(&self) -> f64;
}

/// Attitude and world-frame reference.
pub trait AttitudeReference {
    /// The world-frame origin, or `None` if it has not been set yet.
    fn origin(&self) -> Option<Location>;

    /// The attitude controller's current heading target.
    ///
    /// Units: centi-degrees
    fn yaw_target_cd(&self) -> f64;

    /// The maximum lean angle the attitude controller will command.
    ///
    /// Units: centi-degrees
    fn lean_angle_max_cd(&self) -> f64;
}

/// Position controller.
///
/// The navigation core both reads and mutates the position controller. All
/// speed limits are positive except `max_speed_down` which follows the
/// convention of being negative (or zero).
pub trait PosControl {
    /// Control cycle period.
    ///
    /// Units: seconds
    fn dt(&self) -> f64;

    fn pos_target(&self) -> Vector3<f64>;
    fn set_pos_target(&mut self, target: Vector3<f64>);

    /// The velocity target produced by the last controller update.
    fn vel_target(&self) -> Vector3<f64>;

    fn max_speed_xy(&self) -> f64;
    fn set_max_speed_xy(&mut self, speed_cms: f64);

    fn max_accel_xy(&self) -> f64;
    fn set_max_accel_xy(&mut self, accel_cmss: f64);

    fn max_speed_up(&self) -> f64;

    /// Maximum descent speed, negative or zero.
    fn max_speed_down(&self) -> f64;

    fn set_max_speed_z(&mut self, speed_down_cms: f64, speed_up_cms: f64);
    fn set_max_accel_z(&mut self, accel_cmss: f64);

    /// Horizontal leash length, the maximum allowed horizontal distance
    /// between the position target and the vehicle.
    fn leash_xy(&self) -> f64;

    /// Vertical leash length used while the target is above the vehicle.
    fn leash_up_z(&self) -> f64;

    /// Vertical leash length used while the target is below the vehicle.
    fn leash_down_z(&self) -> f64;

    fn calc_leash_length_xy(&mut self);
    fn calc_leash_length_z(&mut self);

    /// Proportional gain of the horizontal position controller.
    fn pos_xy_kp(&self) -> f64;

    /// Horizontal point at which the vehicle would stop if it began braking
    /// now.
    fn stopping_point_xy(&self) -> Vector2<f64>;

    /// Altitude at which the vehicle would stop if it began braking now.
    fn stopping_point_z(&self) -> f64;

    fn init_xy_controller(&mut self);
    fn update_xy_controller(&mut self);

    fn set_desired_velocity_xy(&mut self, vel_cms: Vector2<f64>);
    fn set_desired_accel_xy(&mut self, accel_cmss: Vector2<f64>);

    /// Freeze the vertical feed-forward for one cycle.
    fn freeze_ff_z(&mut self);
    fn clear_desired_velocity_ff_z(&mut self);
}

/// Terrain height database.
pub trait TerrainProvider {
    /// Height of the vehicle above the terrain beneath it, or `None` if no
    /// terrain data is available for the current position.
    ///
    /// Units: meters
    fn height_above_terrain_m(&self, extrapolate: bool) -> Option<f64>;

    /// Altitude of the terrain above mean sea level at the given location, or
    /// `None` if the database has no data there.
    ///
    /// Units: centimeters
    fn terrain_alt_amsl_cm(&self, loc: &Location) -> Option<f64>;
}

/// Downward facing range finder.
pub trait RangeFinder {
    /// True if a range finder is fitted and enabled.
    fn available(&self) -> bool;

    /// True if the latest reading can be trusted.
    fn healthy(&self) -> bool;

    /// Latest (tilt corrected) distance to the ground.
    ///
    /// Units: centimeters
    fn alt_cm(&self) -> f64;
}

/// Persistent parameter storage.
pub trait ParamStore {
    /// Set the named parameter and persist it.
    fn set_and_save(&mut self, name: &str, value: f64);
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The collaborators borrowed by the navigation core for a single call.
pub struct NavIo<'a> {
    /// Current system time.
    ///
    /// Units: milliseconds
    pub now_ms: u64,

    pub inav: &'a dyn InertialNav,
    pub ahrs: &'a dyn AttitudeReference,
    pub pos_control: &'a mut dyn PosControl,

    /// Terrain database, if fitted.
    pub terrain: Option<&'a dyn TerrainProvider>,

    /// Range finder, if fitted.
    pub rangefinder: Option<&'a dyn RangeFinder>,

    pub param_store: &'a mut dyn ParamStore
}
