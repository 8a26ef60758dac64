//! Heading selection
//!
//! The heading is only driven by the track when the segment is at least
//! `WPNAV_YAW_DIST_MIN` long horizontally, otherwise small position
//! corrections would spin the vehicle. Until the track sets a heading the
//! attitude controller's own heading target is reported.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use nalgebra::Vector3;

// Internal
use super::{WPNAV_YAW_DIST_MIN, WPNAV_YAW_LEASH_PCT_MIN};
use util::maths::{is_zero, rad_to_cd, wrap_360_cd};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The heading chosen for the current segment.
#[derive(Debug, Copy, Clone, Default)]
pub struct YawState {
    /// Units: centi-degrees, range [0, 36000)
    yaw_cd: f64,

    /// True once a heading has been computed for this segment
    set: bool
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl YawState {
    pub fn set_cd(&mut self, heading_cd: f64) {
        self.yaw_cd = wrap_360_cd(heading_cd);
        self.set = true;
    }

    pub fn clear(&mut self) {
        self.set = false;
    }

    pub fn is_set(&self) -> bool {
        self.set
    }

    /// The heading to fly, falling back to `fallback_cd` if no heading has
    /// been set for this segment.
    pub fn get_cd(&self, fallback_cd: f64) -> f64 {
        if self.set {
            self.yaw_cd
        }
        else {
            fallback_cd
        }
    }
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Bearing from one position to another, ignoring altitude.
///
/// Units: centi-degrees, range [0, 36000)
pub fn get_bearing_cd(from: &Vector3<f64>, to: &Vector3<f64>) -> f64 {
    wrap_360_cd(rad_to_cd((to[1] - from[1]).atan2(to[0] - from[0])))
}

/// Heading for a straight segment.
///
/// With a short leash (slow flight) the vehicle points along the segment.
/// Otherwise it points at the intermediate target, once the target is far
/// enough from the vehicle for the direction to be meaningful.
pub fn straight_segment_yaw_cd(
    track_length_xy_cm: f64,
    leash_xy_cm: f64,
    origin: &Vector3<f64>,
    destination: &Vector3<f64>,
    target: &Vector3<f64>,
    curr_pos: &Vector3<f64>
) -> Option<f64> {
    if track_length_xy_cm < WPNAV_YAW_DIST_MIN {
        return None
    }

    if leash_xy_cm < WPNAV_YAW_DIST_MIN {
        return Some(get_bearing_cd(origin, destination))
    }

    let dx = target[0] - curr_pos[0];
    let dy = target[1] - curr_pos[1];
    if dx.hypot(dy) > WPNAV_YAW_DIST_MIN.min(leash_xy_cm * WPNAV_YAW_LEASH_PCT_MIN) {
        Some(rad_to_cd(dy.atan2(dx)))
    }
    else {
        None
    }
}

/// Heading for a spline segment.
///
/// With a short leash the vehicle points along the target's velocity,
/// otherwise towards the target point. `track_error` is the vector from the
/// target to the vehicle.
pub fn spline_segment_yaw_cd(
    track_length_xy_cm: f64,
    leash_xy_cm: f64,
    target_vel: &Vector3<f64>,
    track_error: &Vector3<f64>
) -> Option<f64> {
    if track_length_xy_cm < WPNAV_YAW_DIST_MIN {
        return None
    }

    if leash_xy_cm < WPNAV_YAW_DIST_MIN {
        if !is_zero(target_vel[0]) && !is_zero(target_vel[1]) {
            return Some(rad_to_cd(target_vel[1].atan2(target_vel[0])))
        }
        return None
    }

    if track_error[0].hypot(track_error[1])
        > WPNAV_YAW_DIST_MIN.min(leash_xy_cm * WPNAV_YAW_LEASH_PCT_MIN)
    {
        Some(rad_to_cd((-track_error[1]).atan2(-track_error[0])))
    }
    else {
        None
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_bearing() {
        let o = Vector3::zeros();
        assert!(get_bearing_cd(&o, &Vector3::new(100.0, 0.0, 0.0)).abs() < 1e-9);
        assert!((get_bearing_cd(&o, &Vector3::new(0.0, 100.0, 50.0)) - 9000.0).abs() < 1e-9);
        assert!((get_bearing_cd(&o, &Vector3::new(0.0, -100.0, 0.0)) - 27000.0).abs() < 1e-9);
    }

    #[test]
    fn test_fallback() {
        let mut yaw = YawState::default();
        assert_eq!(yaw.get_cd(4500.0), 4500.0);

        yaw.set_cd(-9000.0);
        assert!(yaw.is_set());
        assert_eq!(yaw.get_cd(4500.0), 27000.0);

        yaw.clear();
        assert_eq!(yaw.get_cd(4500.0), 4500.0);
    }

    #[test]
    fn test_straight_short_track() {
        let o = Vector3::zeros();
        let d = Vector3::new(150.0, 0.0, 1000.0);
        assert_eq!(straight_segment_yaw_cd(150.0, 1300.0, &o, &d, &d, &o), None);
    }

    #[test]
    fn test_straight_short_leash() {
        let o = Vector3::zeros();
        let d = Vector3::new(0.0, 1000.0, 0.0);
        let yaw = straight_segment_yaw_cd(1000.0, 150.0, &o, &d, &o, &o).unwrap();
        assert!((yaw - 9000.0).abs() < 1e-9);
    }

    #[test]
    fn test_straight_towards_target() {
        let o = Vector3::zeros();
        let d = Vector3::new(1000.0, 0.0, 0.0);

        // Target within the dead zone around the vehicle
        let near = Vector3::new(100.0, 0.0, 0.0);
        assert_eq!(straight_segment_yaw_cd(1000.0, 1300.0, &o, &d, &near, &o), None);

        // Target well ahead and to the east
        let far = Vector3::new(300.0, 300.0, 0.0);
        let yaw = straight_segment_yaw_cd(1000.0, 1300.0, &o, &d, &far, &o).unwrap();
        assert!((yaw - 4500.0).abs() < 1e-9);
    }

    #[test]
    fn test_spline() {
        let vel = Vector3::new(100.0, 100.0, 0.0);
        let yaw = spline_segment_yaw_cd(1000.0, 150.0, &vel, &Vector3::zeros()).unwrap();
        assert!((yaw - 4500.0).abs() < 1e-9);

        // Velocity along a single axis is not used
        let north = Vector3::new(100.0, 0.0, 0.0);
        assert_eq!(spline_segment_yaw_cd(1000.0, 150.0, &north, &Vector3::zeros()), None);

        // Long leash, vehicle 300cm south of the target so it points north
        let err = Vector3::new(-300.0, 0.0, 0.0);
        let yaw = spline_segment_yaw_cd(1000.0, 1300.0, &vel, &err).unwrap();
        assert!(yaw.abs() < 1e-9);
    }
}
