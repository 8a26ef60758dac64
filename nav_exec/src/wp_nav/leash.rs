//! # Leash geometry
//!
//! The position controller has separate speed, acceleration and leash limits
//! for the horizontal and vertical axes. When the target travels along an
//! arbitrary 3D direction these have to be projected onto that direction.
//! Each axis limit is scaled by the inverse of the direction's component on
//! that axis, and where the direction has both components the more
//! restrictive of the two is used so neither axis limit is exceeded.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use nalgebra::Vector3;

// Internal
use super::{WPNAV_LEASH_LENGTH_MIN, WPNAV_WP_TRACK_SPEED_MIN};
use crate::nav_io::PosControl;
use util::maths::{is_zero, safe_sqrt};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Per-axis limits from which the along-track limits are derived.
#[derive(Debug, Copy, Clone, Default)]
pub struct AxisLimits {
    pub speed_xy_cms: f64,

    /// Positive climb speed.
    pub speed_up_cms: f64,

    /// Descent speed, positive.
    pub speed_down_cms: f64,

    pub accel_xy_cmss: f64,
    pub accel_z_cmss: f64,

    pub leash_xy_cm: f64,
    pub leash_up_cm: f64,
    pub leash_down_cm: f64
}

/// Acceleration, speed and leash length along the direction of travel.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct TrackLimits {
    pub accel_cmss: f64,
    pub speed_cms: f64,
    pub leash_cm: f64,

    /// Distance from the destination at which the target should begin to
    /// slow down.
    pub slow_down_dist_cm: f64
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl AxisLimits {
    /// Read the speed and leash limits from the position controller, combined
    /// with the navigation accelerations.
    pub fn from_pos_control(
        pos_control: &dyn PosControl,
        accel_xy_cmss: f64,
        accel_z_cmss: f64
    ) -> Self {
        Self {
            speed_xy_cms: pos_control.max_speed_xy(),
            speed_up_cms: pos_control.max_speed_up(),
            speed_down_cms: pos_control.max_speed_down().abs(),
            accel_xy_cmss,
            accel_z_cmss,
            leash_xy_cm: pos_control.leash_xy(),
            leash_up_cm: pos_control.leash_up_z(),
            leash_down_cm: pos_control.leash_down_z()
        }
    }
}

impl Default for TrackLimits {
    fn default() -> Self {
        Self {
            accel_cmss: 0.0,
            speed_cms: 0.0,
            leash_cm: WPNAV_LEASH_LENGTH_MIN,
            slow_down_dist_cm: 0.0
        }
    }
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Calculate the track limits along the given unit direction.
///
/// The direction may be the zero vector (a degenerate track), in which case
/// the acceleration and speed are zero and the leash takes its minimum
/// length. The leash length is never below `WPNAV_LEASH_LENGTH_MIN`.
pub fn calc_track_limits(pos_delta_unit: &Vector3<f64>, limits: &AxisLimits) -> TrackLimits {
    // Length of the unit direction vector in the horizontal and vertical
    let unit_xy = pos_delta_unit[0].hypot(pos_delta_unit[1]);
    let unit_z = pos_delta_unit[2].abs();

    // Use the climb limits when moving up and the descent limits when moving down
    let (speed_z, leash_z) = if pos_delta_unit[2] >= 0.0 {
        (limits.speed_up_cms, limits.leash_up_cm)
    }
    else {
        (limits.speed_down_cms, limits.leash_down_cm)
    };

    let (accel_cmss, speed_cms, leash_cm) = if is_zero(unit_z) && is_zero(unit_xy) {
        (0.0, 0.0, WPNAV_LEASH_LENGTH_MIN)
    }
    else if is_zero(unit_z) {
        (
            limits.accel_xy_cmss / unit_xy,
            limits.speed_xy_cms / unit_xy,
            limits.leash_xy_cm / unit_xy
        )
    }
    else if is_zero(unit_xy) {
        (
            limits.accel_z_cmss / unit_z,
            speed_z / unit_z,
            leash_z / unit_z
        )
    }
    else {
        (
            (limits.accel_z_cmss / unit_z).min(limits.accel_xy_cmss / unit_xy),
            (speed_z / unit_z).min(limits.speed_xy_cms / unit_xy),
            (leash_z / unit_z).min(limits.leash_xy_cm / unit_xy)
        )
    };

    TrackLimits {
        accel_cmss,
        speed_cms,
        leash_cm: leash_cm.max(WPNAV_LEASH_LENGTH_MIN),
        slow_down_dist_cm: slow_down_distance(speed_cms, accel_cmss)
    }
}

/// Distance before the destination at which a target travelling at full
/// speed should begin to slow down.
///
/// Non-positive accelerations give a zero distance.
pub fn slow_down_distance(speed_cms: f64, accel_cmss: f64) -> f64 {
    if accel_cmss <= 0.0 {
        return 0.0
    }

    speed_cms * speed_cms / (4.0 * accel_cmss)
}

/// Target speed at the given distance from the destination while slowing
/// down.
///
/// Never less than `WPNAV_WP_TRACK_SPEED_MIN`, which is also returned once the
/// destination has been reached or passed.
pub fn slow_down_speed(dist_from_dest_cm: f64, accel_cmss: f64) -> f64 {
    if dist_from_dest_cm <= 0.0 {
        return WPNAV_WP_TRACK_SPEED_MIN
    }

    safe_sqrt(dist_from_dest_cm * 4.0 * accel_cmss).max(WPNAV_WP_TRACK_SPEED_MIN)
}

#[cfg(test)]
mod test {
    use super::*;

    fn limits() -> AxisLimits {
        AxisLimits {
            speed_xy_cms: 500.0,
            speed_up_cms: 250.0,
            speed_down_cms: 150.0,
            accel_xy_cmss: 100.0,
            accel_z_cmss: 50.0,
            leash_xy_cm: 1300.0,
            leash_up_cm: 400.0,
            leash_down_cm: 300.0
        }
    }

    #[test]
    fn test_degenerate_direction() {
        let tl = calc_track_limits(&Vector3::zeros(), &limits());

        assert_eq!(tl.accel_cmss, 0.0);
        assert_eq!(tl.speed_cms, 0.0);
        assert_eq!(tl.leash_cm, WPNAV_LEASH_LENGTH_MIN);
        assert_eq!(tl.slow_down_dist_cm, 0.0);
    }

    #[test]
    fn test_horizontal() {
        let tl = calc_track_limits(&Vector3::new(0.6, 0.8, 0.0), &limits());

        assert!((tl.accel_cmss - 100.0).abs() < 1e-9);
        assert!((tl.speed_cms - 500.0).abs() < 1e-9);
        assert!((tl.leash_cm - 1300.0).abs() < 1e-9);
        assert!((tl.slow_down_dist_cm - 625.0).abs() < 1e-9);
    }

    #[test]
    fn test_vertical() {
        let up = calc_track_limits(&Vector3::new(0.0, 0.0, 1.0), &limits());
        assert_eq!(up.speed_cms, 250.0);
        assert_eq!(up.leash_cm, 400.0);
        assert_eq!(up.accel_cmss, 50.0);

        let down = calc_track_limits(&Vector3::new(0.0, 0.0, -1.0), &limits());
        assert_eq!(down.speed_cms, 150.0);
        assert_eq!(down.leash_cm, 300.0);
    }

    #[test]
    fn test_mixed_takes_most_restrictive() {
        // 45 degree climb
        let c = std::f64::consts::FRAC_1_SQRT_2;
        let tl = calc_track_limits(&Vector3::new(c, 0.0, c), &limits());

        assert!((tl.accel_cmss - 50.0 / c).abs() < 1e-9);
        assert!((tl.speed_cms - 250.0 / c).abs() < 1e-9);
        assert!((tl.leash_cm - 400.0 / c).abs() < 1e-9);
    }

    #[test]
    fn test_leash_never_below_min() {
        let mut short = limits();
        short.leash_xy_cm = 10.0;
        short.leash_up_cm = 0.0;
        short.leash_down_cm = 0.0;

        let dirs = [
            Vector3::zeros(),
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(0.0, 0.0, 1.0),
            Vector3::new(0.0, 0.0, -1.0),
            Vector3::new(0.6, 0.0, -0.8)
        ];
        for d in dirs.iter() {
            assert!(calc_track_limits(d, &short).leash_cm >= WPNAV_LEASH_LENGTH_MIN);
        }
    }

    #[test]
    fn test_slow_down() {
        assert_eq!(slow_down_distance(500.0, 0.0), 0.0);
        assert_eq!(slow_down_distance(500.0, -10.0), 0.0);
        assert_eq!(slow_down_distance(400.0, 100.0), 400.0);

        assert_eq!(slow_down_speed(0.0, 100.0), WPNAV_WP_TRACK_SPEED_MIN);
        assert_eq!(slow_down_speed(-5.0, 100.0), WPNAV_WP_TRACK_SPEED_MIN);
        assert_eq!(slow_down_speed(1.0, 100.0), WPNAV_WP_TRACK_SPEED_MIN);
        assert!((slow_down_speed(100.0, 100.0) - 200.0).abs() < 1e-9);
        assert!((slow_down_speed(625.0, 100.0) - 500.0).abs() < 1e-9);
    }
}
