//! Horizontal speed governing
//!
//! Speed changes requested while a segment is being flown are not applied
//! instantly. Instead the position controller's speed limit is moved towards
//! the requested speed at the navigation acceleration.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use util::maths::is_equal;

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Step the current speed limit towards the desired speed.
///
/// Returns `None` if the limit is already at the desired speed, otherwise the
/// new limit. The limit moves by at most `accel_cmss * dt` and never passes
/// the desired speed.
pub fn step_speed_limit(
    curr_speed_cms: f64,
    desired_speed_cms: f64,
    accel_cmss: f64,
    dt: f64
) -> Option<f64> {
    if is_equal(desired_speed_cms, curr_speed_cms) {
        return None
    }

    let step = accel_cmss * dt;

    let new_speed = if desired_speed_cms > curr_speed_cms {
        (curr_speed_cms + step).min(desired_speed_cms)
    }
    else {
        (curr_speed_cms - step).max(desired_speed_cms)
    };

    Some(new_speed)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_no_change() {
        assert_eq!(step_speed_limit(500.0, 500.0, 100.0, 0.01), None);
    }

    #[test]
    fn test_ramp_up_and_down() {
        assert_eq!(step_speed_limit(500.0, 600.0, 100.0, 0.1), Some(510.0));
        assert_eq!(step_speed_limit(500.0, 400.0, 100.0, 0.1), Some(490.0));
    }

    #[test]
    fn test_no_overshoot() {
        assert_eq!(step_speed_limit(500.0, 505.0, 100.0, 0.1), Some(505.0));
        assert_eq!(step_speed_limit(500.0, 495.0, 100.0, 0.1), Some(495.0));
    }

    #[test]
    fn test_converges() {
        let mut speed = 200.0;
        let mut cycles = 0;
        while let Some(s) = step_speed_limit(speed, 1000.0, 100.0, 0.01) {
            assert!(s > speed && s <= 1000.0);
            speed = s;
            cycles += 1;
            assert!(cycles < 1000);
        }
        assert_eq!(speed, 1000.0);
    }
}
