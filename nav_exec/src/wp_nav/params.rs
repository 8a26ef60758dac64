//! Waypoint navigation parameters

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::Deserialize;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for waypoint navigation.
///
/// Any field missing from the parameter file takes its default value.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Params {

    /// Horizontal speed the vehicle will attempt to maintain during a
    /// mission. Range 20 to 2000.
    ///
    /// Units: centimeters/second
    pub speed_cms: f64,

    /// Distance from a waypoint which, when crossed, indicates the waypoint
    /// has been reached. Range 5 to 1000.
    ///
    /// Units: centimeters
    pub radius_cm: f64,

    /// Climb speed. Range 10 to 1000.
    ///
    /// Units: centimeters/second
    pub speed_up_cms: f64,

    /// Descent speed. Range 10 to 500.
    ///
    /// Units: centimeters/second
    pub speed_down_cms: f64,

    /// Horizontal acceleration. Range 50 to 500.
    ///
    /// Units: centimeters/second^2
    pub accel_cmss: f64,

    /// Vertical acceleration. Range 50 to 500.
    ///
    /// Units: centimeters/second^2
    pub accel_z_cmss: f64,

    /// Use the range finder (when fitted) for terrain following.
    pub rangefinder_use: bool,

    /// Largest spline time at which a chained spline segment carries the
    /// overshoot past 1.0 into the next segment.
    pub spline_time_overshoot_max: f64
}

impl Default for Params {
    fn default() -> Self {
        Self {
            speed_cms: 500.0,
            radius_cm: 200.0,
            speed_up_cms: 250.0,
            speed_down_cms: 150.0,
            accel_cmss: 100.0,
            accel_z_cmss: 100.0,
            rangefinder_use: true,
            spline_time_overshoot_max: 1.1
        }
    }
}
