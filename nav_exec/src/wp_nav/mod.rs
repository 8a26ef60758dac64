//! # Waypoint navigation module
//!
//! Waypoint navigation turns a destination into a continuously advancing
//! intermediate target which the position controller tracks. Mission logic
//! sets a destination once per segment and then calls the matching update
//! function every control cycle until the segment reports that the
//! destination has been reached.
//!
//! Two kinds of segment are supported:
//!
//!  - Straight segments move the intermediate target along the line from the
//!    origin to the destination.
//!  - Spline segments move the target along a cubic Hermite spline whose end
//!    velocities are chosen to be continuous with the neighbouring segments.
//!
//! In both cases the target is kept on a "leash": it is never allowed to get
//! further ahead of the vehicle than the position controller can recover
//! from, which bounds the tracking error. The target's speed ramps up under
//! the acceleration limit and ramps down on approach to the destination.
//!
//! All positions are in centimeters in the NEU frame relative to the world
//! origin.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod leash;
pub mod params;
pub mod speed;
pub mod spline;
pub mod state;
pub mod straight;
pub mod terrain;
pub mod yaw;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// Internal
pub use params::Params;
pub use spline::{HermiteSpline, SplineSegmentEnd};
pub use state::*;

use crate::location::LocationError;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Default horizontal acceleration, used to replace invalid configurations.
///
/// Units: centimeters/second^2
pub const WPNAV_ACCELERATION: f64 = 100.0;

/// Minimum track leash length. Prevents divide by zero in the leash maths.
///
/// Units: centimeters
pub const WPNAV_LEASH_LENGTH_MIN: f64 = 100.0;

/// Minimum horizontal speed which can be requested.
///
/// Units: centimeters/second
pub const WPNAV_WP_SPEED_MIN: f64 = 20.0;

/// Minimum speed of the target while slowing down on approach.
///
/// Units: centimeters/second
pub const WPNAV_WP_TRACK_SPEED_MIN: f64 = 50.0;

/// Minimum arrival radius.
///
/// Units: centimeters
pub const WPNAV_WP_RADIUS_MIN: f64 = 5.0;

/// Distance the target may pass the destination of a fast waypoint.
///
/// Units: centimeters
pub const WPNAV_WP_FAST_OVERSHOOT_MAX: f64 = 200.0;

/// Minimum horizontal track length (and leash length) for the heading to
/// be updated.
///
/// Units: centimeters
pub const WPNAV_YAW_DIST_MIN: f64 = 200.0;

/// Fraction of the horizontal leash the target must be away from the
/// vehicle before the heading follows it.
pub const WPNAV_YAW_LEASH_PCT_MIN: f64 = 0.134;

/// Time after the last update within which the controller is considered to
/// still be active.
///
/// Units: milliseconds
pub const WPNAV_ACTIVE_TIMEOUT_MS: u64 = 1000;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Possible errors that can occur during waypoint navigation.
#[derive(Debug, thiserror::Error)]
pub enum WpNavError {
    #[error("Could not load parameters: {0}")]
    ParamLoadError(util::params::LoadError),

    /// Neither the range finder nor the terrain database could provide the
    /// vehicle's height above terrain.
    #[error("Terrain offset unavailable, no healthy range finder or terrain data")]
    TerrainUnavailable,

    /// A location could not be converted into a vector from the world origin.
    #[error("Could not convert location: {0}")]
    LocationConversion(#[from] LocationError),

    /// The spline controller was updated while a straight segment is active.
    #[error("Attempted to update the spline controller on a straight segment")]
    NotSplineSegment
}

/// The kind of the active segment.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SegmentKind {
    Straight,
    Spline
}
