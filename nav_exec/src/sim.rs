//! # Simulated navigation collaborators
//!
//! A point-mass vehicle and simple stand-ins for the estimators, position
//! controller, terrain sources and parameter storage. The vehicle flies at
//! exactly the velocity the position controller demands, which is enough to
//! exercise the navigation core closed loop without a flight dynamics model.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::trace;
use nalgebra::{Vector2, Vector3};
use serde::Deserialize;

// Internal
use crate::location::{AltFrame, Location};
use crate::nav_io::*;
use crate::wp_nav::WPNAV_LEASH_LENGTH_MIN;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Default control period, 100 Hz.
///
/// Units: seconds
pub const SIM_DT_S: f64 = 0.01;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters of the simulated world.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimParams {
    /// Control period.
    ///
    /// Units: seconds
    pub dt_s: f64,

    /// Proportional gain of the horizontal position controller.
    pub pos_xy_kp: f64,

    /// Proportional gain of the vertical position controller.
    pub pos_z_kp: f64,

    /// Maximum lean angle.
    ///
    /// Units: centi-degrees
    pub lean_angle_max_cd: f64,

    /// World origin.
    pub origin: Location,

    /// Altitude of the (flat) ground above the world origin.
    ///
    /// Units: centimeters
    pub ground_alt_cm: f64,

    pub rangefinder_available: bool
}

/// Simulated vehicle, reports its true state as the inertial estimate.
#[derive(Debug, Clone, Default)]
pub struct SimVehicle {
    /// Units: centimeters, Frame: NEU from world origin
    pub position: Vector3<f64>,

    /// Units: centimeters/second, Frame: NEU
    pub velocity: Vector3<f64>
}

#[derive(Debug, Clone)]
pub struct SimAhrs {
    pub origin: Option<Location>,
    pub yaw_target_cd: f64,
    pub lean_angle_max_cd: f64
}

/// Proportional position controller with the leash law of a real
/// multicopter position controller.
#[derive(Debug, Clone)]
pub struct SimPosControl {
    pub dt: f64,
    pub kp_xy: f64,
    pub kp_z: f64,

    pub pos_target: Vector3<f64>,
    pub vel_target: Vector3<f64>,

    pub speed_xy_cms: f64,
    pub accel_xy_cmss: f64,
    pub speed_up_cms: f64,
    pub speed_down_cms: f64,
    pub accel_z_cmss: f64,

    pub leash_xy_cm: f64,
    pub leash_up_cm: f64,
    pub leash_down_cm: f64,

    recalc_leash_xy: bool,
    recalc_leash_z: bool,

    /// Number of horizontal controller updates run.
    pub xy_updates: usize,

    /// Number of times the vertical feed-forward was frozen.
    pub ff_z_freezes: usize,

    vehicle_pos: Vector3<f64>,
    vehicle_vel: Vector3<f64>
}

/// Flat terrain under the vehicle, seen through both a range finder and a
/// terrain database.
#[derive(Debug, Clone)]
pub struct SimTerrain {
    /// Units: centimeters above the world origin
    pub ground_alt_cm: f64,

    pub database_available: bool,

    /// Error added to the database's terrain height.
    ///
    /// Units: centimeters
    pub database_bias_cm: f64,

    pub rangefinder_available: bool,
    pub rangefinder_healthy: bool,

    /// Absolute altitude of the world origin.
    ///
    /// Units: centimeters
    origin_alt_cm: f64,

    vehicle_alt_cm: f64
}

/// Records every parameter saved.
#[derive(Debug, Clone, Default)]
pub struct SimParamStore {
    pub saved: Vec<(String, f64)>
}

/// All simulated collaborators plus the clock.
#[derive(Debug, Clone)]
pub struct SimWorld {
    pub vehicle: SimVehicle,
    pub ahrs: SimAhrs,
    pub pos_control: SimPosControl,
    pub terrain: SimTerrain,
    pub param_store: SimParamStore,

    /// Units: milliseconds
    pub now_ms: u64
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for SimParams {
    fn default() -> Self {
        Self {
            dt_s: SIM_DT_S,
            pos_xy_kp: 1.0,
            pos_z_kp: 1.0,
            lean_angle_max_cd: 3000.0,
            origin: Location::new(-353_632_620, 1_491_652_370, 58_400, AltFrame::Absolute),
            ground_alt_cm: 0.0,
            rangefinder_available: false
        }
    }
}

impl SimWorld {
    /// Create a world with default parameters and a stationary vehicle at
    /// the given position.
    pub fn new(position: Vector3<f64>) -> Self {
        Self::from_params(&SimParams::default(), position)
    }

    pub fn from_params(params: &SimParams, position: Vector3<f64>) -> Self {
        let mut pos_control = SimPosControl {
            dt: params.dt_s,
            kp_xy: params.pos_xy_kp,
            kp_z: params.pos_z_kp,
            pos_target: position,
            vel_target: Vector3::zeros(),
            speed_xy_cms: 500.0,
            accel_xy_cmss: 100.0,
            speed_up_cms: 250.0,
            speed_down_cms: -150.0,
            accel_z_cmss: 100.0,
            leash_xy_cm: WPNAV_LEASH_LENGTH_MIN,
            leash_up_cm: WPNAV_LEASH_LENGTH_MIN,
            leash_down_cm: WPNAV_LEASH_LENGTH_MIN,
            recalc_leash_xy: false,
            recalc_leash_z: false,
            xy_updates: 0,
            ff_z_freezes: 0,
            vehicle_pos: position,
            vehicle_vel: Vector3::zeros()
        };
        pos_control.calc_leash_length_xy();
        pos_control.calc_leash_length_z();

        let mut world = Self {
            vehicle: SimVehicle { position, velocity: Vector3::zeros() },
            ahrs: SimAhrs {
                origin: Some(params.origin),
                yaw_target_cd: 0.0,
                lean_angle_max_cd: params.lean_angle_max_cd
            },
            pos_control,
            terrain: SimTerrain {
                ground_alt_cm: params.ground_alt_cm,
                database_available: true,
                database_bias_cm: 0.0,
                rangefinder_available: params.rangefinder_available,
                rangefinder_healthy: true,
                origin_alt_cm: params.origin.alt_cm as f64,
                vehicle_alt_cm: position[2]
            },
            param_store: SimParamStore::default(),
            now_ms: 1000
        };
        world.sync();

        world
    }

    /// Copy the vehicle's state into the collaborators which observe it.
    ///
    /// Must be called after modifying the vehicle directly.
    pub fn sync(&mut self) {
        self.pos_control.vehicle_pos = self.vehicle.position;
        self.pos_control.vehicle_vel = self.vehicle.velocity;
        self.terrain.vehicle_alt_cm = self.vehicle.position[2];
    }

    /// Borrow the collaborators for a single navigation call.
    pub fn io(&mut self) -> NavIo<'_> {
        NavIo {
            now_ms: self.now_ms,
            inav: &self.vehicle,
            ahrs: &self.ahrs,
            pos_control: &mut self.pos_control,
            terrain: Some(&self.terrain),
            rangefinder: Some(&self.terrain),
            param_store: &mut self.param_store
        }
    }

    /// Fly the vehicle at the controller's velocity target for one control
    /// period and advance the clock.
    pub fn step(&mut self) {
        let dt = self.pos_control.dt;

        self.vehicle.velocity = self.pos_control.vel_target;
        self.vehicle.position += self.vehicle.velocity * dt;
        self.now_ms += (dt * 1000.0).round() as u64;

        self.sync();

        trace!(
            "Vehicle at {:?} moving at {:?}",
            self.vehicle.position.data, self.vehicle.velocity.data
        );
    }
}

impl InertialNav for SimVehicle {
    fn position(&self) -> Vector3<f64> {
        self.position
    }

    fn velocity(&self) -> Vector3<f64> {
        self.velocity
    }

    fn altitude(&self) -> f64 {
        self.position[2]
    }
}

impl AttitudeReference for SimAhrs {
    fn origin(&self) -> Option<Location> {
        self.origin
    }

    fn yaw_target_cd(&self) -> f64 {
        self.yaw_target_cd
    }

    fn lean_angle_max_cd(&self) -> f64 {
        self.lean_angle_max_cd
    }
}

impl PosControl for SimPosControl {
    fn dt(&self) -> f64 {
        self.dt
    }

    fn pos_target(&self) -> Vector3<f64> {
        self.pos_target
    }

    fn set_pos_target(&mut self, target: Vector3<f64>) {
        self.pos_target = target;
    }

    fn vel_target(&self) -> Vector3<f64> {
        self.vel_target
    }

    fn max_speed_xy(&self) -> f64 {
        self.speed_xy_cms
    }

    fn set_max_speed_xy(&mut self, speed_cms: f64) {
        if (self.speed_xy_cms - speed_cms).abs() > f64::EPSILON {
            self.speed_xy_cms = speed_cms;
            self.recalc_leash_xy = true;
        }
    }

    fn max_accel_xy(&self) -> f64 {
        self.accel_xy_cmss
    }

    fn set_max_accel_xy(&mut self, accel_cmss: f64) {
        if (self.accel_xy_cmss - accel_cmss).abs() > f64::EPSILON {
            self.accel_xy_cmss = accel_cmss;
            self.recalc_leash_xy = true;
        }
    }

    fn max_speed_up(&self) -> f64 {
        self.speed_up_cms
    }

    fn max_speed_down(&self) -> f64 {
        self.speed_down_cms
    }

    fn set_max_speed_z(&mut self, speed_down_cms: f64, speed_up_cms: f64) {
        // Down speed is always negative
        let speed_down_cms = -speed_down_cms.abs();

        if (self.speed_up_cms - speed_up_cms).abs() > f64::EPSILON
            || (self.speed_down_cms - speed_down_cms).abs() > f64::EPSILON
        {
            self.speed_up_cms = speed_up_cms;
            self.speed_down_cms = speed_down_cms;
            self.recalc_leash_z = true;
        }
    }

    fn set_max_accel_z(&mut self, accel_cmss: f64) {
        if (self.accel_z_cmss - accel_cmss).abs() > f64::EPSILON {
            self.accel_z_cmss = accel_cmss;
            self.recalc_leash_z = true;
        }
    }

    fn leash_xy(&self) -> f64 {
        self.leash_xy_cm
    }

    fn leash_up_z(&self) -> f64 {
        self.leash_up_cm
    }

    fn leash_down_z(&self) -> f64 {
        self.leash_down_cm
    }

    fn calc_leash_length_xy(&mut self) {
        self.leash_xy_cm = calc_leash_length(self.speed_xy_cms, self.accel_xy_cmss, self.kp_xy);
        self.recalc_leash_xy = false;
    }

    fn calc_leash_length_z(&mut self) {
        self.leash_up_cm = calc_leash_length(self.speed_up_cms, self.accel_z_cmss, self.kp_z);
        self.leash_down_cm = calc_leash_length(-self.speed_down_cms, self.accel_z_cmss, self.kp_z);
        self.recalc_leash_z = false;
    }

    fn pos_xy_kp(&self) -> f64 {
        self.kp_xy
    }

    fn stopping_point_xy(&self) -> Vector2<f64> {
        let pos = Vector2::new(self.vehicle_pos[0], self.vehicle_pos[1]);
        let vel = Vector2::new(self.vehicle_vel[0], self.vehicle_vel[1]);

        if self.accel_xy_cmss <= 0.0 {
            return pos
        }

        pos + vel * (vel.norm() / (2.0 * self.accel_xy_cmss))
    }

    fn stopping_point_z(&self) -> f64 {
        let vel_z = self.vehicle_vel[2];

        if self.accel_z_cmss <= 0.0 {
            return self.vehicle_pos[2]
        }

        self.vehicle_pos[2] + vel_z * vel_z.abs() / (2.0 * self.accel_z_cmss)
    }

    fn init_xy_controller(&mut self) {
        self.pos_target = self.vehicle_pos;
        self.vel_target = self.vehicle_vel;
    }

    fn update_xy_controller(&mut self) {
        if self.recalc_leash_xy {
            self.calc_leash_length_xy();
        }
        if self.recalc_leash_z {
            self.calc_leash_length_z();
        }

        let err = self.pos_target - self.vehicle_pos;

        let mut vel_xy = Vector2::new(err[0], err[1]) * self.kp_xy;
        let speed_xy = vel_xy.norm();
        if speed_xy > self.speed_xy_cms && speed_xy > 0.0 {
            vel_xy *= self.speed_xy_cms / speed_xy;
        }

        let vel_z = (err[2] * self.kp_z).max(self.speed_down_cms).min(self.speed_up_cms);

        self.vel_target = Vector3::new(vel_xy[0], vel_xy[1], vel_z);
        self.xy_updates += 1;
    }

    fn set_desired_velocity_xy(&mut self, vel_cms: Vector2<f64>) {
        self.vel_target[0] = vel_cms[0];
        self.vel_target[1] = vel_cms[1];
    }

    fn set_desired_accel_xy(&mut self, _accel_cmss: Vector2<f64>) {}

    fn freeze_ff_z(&mut self) {
        self.ff_z_freezes += 1;
    }

    fn clear_desired_velocity_ff_z(&mut self) {}
}

impl TerrainProvider for SimTerrain {
    fn height_above_terrain_m(&self, _extrapolate: bool) -> Option<f64> {
        if self.database_available {
            Some((self.vehicle_alt_cm - self.ground_alt_cm - self.database_bias_cm) * 0.01)
        }
        else {
            None
        }
    }

    fn terrain_alt_amsl_cm(&self, _loc: &Location) -> Option<f64> {
        if self.database_available {
            Some(self.origin_alt_cm + self.ground_alt_cm + self.database_bias_cm)
        }
        else {
            None
        }
    }
}

impl RangeFinder for SimTerrain {
    fn available(&self) -> bool {
        self.rangefinder_available
    }

    fn healthy(&self) -> bool {
        self.rangefinder_healthy
    }

    fn alt_cm(&self) -> f64 {
        self.vehicle_alt_cm - self.ground_alt_cm
    }
}

impl ParamStore for SimParamStore {
    fn set_and_save(&mut self, name: &str, value: f64) {
        self.saved.push((String::from(name), value));
    }
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Leash length for the given speed, acceleration and proportional gain.
///
/// Below the linear velocity (`accel / kp`) the controller's response is
/// linear, above it the leash grows with the square of the speed.
pub fn calc_leash_length(speed_cms: f64, accel_cmss: f64, kp: f64) -> f64 {
    if accel_cmss <= 0.0 || kp <= 0.0 {
        return WPNAV_LEASH_LENGTH_MIN
    }

    let leash = if speed_cms <= accel_cmss / kp {
        speed_cms / kp
    }
    else {
        accel_cmss / (2.0 * kp * kp) + speed_cms * speed_cms / (2.0 * accel_cmss)
    };

    leash.max(WPNAV_LEASH_LENGTH_MIN)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_leash_law() {
        assert_eq!(calc_leash_length(500.0, 100.0, 1.0), 1300.0);
        assert_eq!(calc_leash_length(50.0, 100.0, 1.0), WPNAV_LEASH_LENGTH_MIN);
        assert_eq!(calc_leash_length(500.0, 0.0, 1.0), WPNAV_LEASH_LENGTH_MIN);
        assert_eq!(calc_leash_length(250.0, 100.0, 1.0), 362.5);
    }

    #[test]
    fn test_step_follows_target() {
        let mut world = SimWorld::new(Vector3::zeros());
        world.pos_control.set_pos_target(Vector3::new(100.0, 0.0, 10.0));
        world.pos_control.update_xy_controller();
        world.step();

        assert_eq!(world.vehicle.velocity, Vector3::new(100.0, 0.0, 10.0));
        assert!((world.vehicle.position - Vector3::new(1.0, 0.0, 0.1)).norm() < 1e-9);
        assert_eq!(world.now_ms, 1010);
    }

    #[test]
    fn test_stopping_point() {
        let mut world = SimWorld::new(Vector3::zeros());
        world.vehicle.velocity = Vector3::new(200.0, 0.0, -100.0);
        world.sync();

        let xy = world.pos_control.stopping_point_xy();
        assert!((xy[0] - 200.0).abs() < 1e-9);
        assert_eq!(xy[1], 0.0);
        assert!((world.pos_control.stopping_point_z() + 50.0).abs() < 1e-9);
    }
}
