//! Straight line segment tracking
//!
//! The intermediate target is advanced along the line from the origin to the
//! destination. Its progress is limited by the leash: the target may only
//! move ahead of the vehicle's own progress along the track by the slack the
//! leash leaves once the vehicle's cross track error is taken up.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, trace};
use nalgebra::Vector3;

// Internal
use super::{
    leash, state::get_vector_neu, yaw, NavSegment, SegmentKind, WpNav, WpNavError,
    WPNAV_WP_FAST_OVERSHOOT_MAX
};
use crate::location::Location;
use crate::nav_io::NavIo;
use util::maths::{constrain, is_positive, is_zero, safe_sqrt};

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl WpNav {
    /// Set a straight segment to the given destination.
    ///
    /// The origin is the current position target if the controller is
    /// active, otherwise the vehicle's stopping point. If `terrain_alt` is
    /// set the destination's z is an altitude above terrain.
    pub fn set_wp_destination(
        &mut self,
        io: &mut NavIo,
        destination: Vector3<f64>,
        terrain_alt: bool
    ) -> Result<(), WpNavError> {
        let mut origin = self.default_origin(io);

        // The default origin is above the world origin, move it into the
        // terrain frame if needed
        if terrain_alt {
            origin[2] -= self.terrain_offset(io)?;
        }

        self.set_wp_origin_and_destination(io, origin, destination, terrain_alt)
    }

    /// Set a straight segment to a geodetic destination.
    pub fn set_wp_destination_location(
        &mut self,
        io: &mut NavIo,
        destination: &Location
    ) -> Result<(), WpNavError> {
        let (dest_neu, terrain_alt) = get_vector_neu(destination, io.ahrs)?;

        self.set_wp_destination(io, dest_neu, terrain_alt)
    }

    /// Set a straight segment to a destination given in meters in the NED
    /// frame.
    pub fn set_wp_destination_ned(
        &mut self,
        io: &mut NavIo,
        destination_ned_m: Vector3<f64>
    ) -> Result<(), WpNavError> {
        let dest_neu = Vector3::new(
            destination_ned_m[0] * 100.0,
            destination_ned_m[1] * 100.0,
            -destination_ned_m[2] * 100.0
        );

        self.set_wp_destination(io, dest_neu, false)
    }

    /// Set a straight segment with an explicit origin.
    ///
    /// If the terrain offset cannot be found the segment is not changed.
    pub fn set_wp_origin_and_destination(
        &mut self,
        io: &mut NavIo,
        origin: Vector3<f64>,
        destination: Vector3<f64>,
        terrain_alt: bool
    ) -> Result<(), WpNavError> {
        let terr_offset = if terrain_alt {
            self.terrain_offset(io)?
        }
        else {
            0.0
        };

        let pos_delta = destination - origin;
        let track_length_cm = pos_delta.norm();
        let pos_delta_unit = if is_zero(track_length_cm) {
            Vector3::zeros()
        }
        else {
            pos_delta / track_length_cm
        };

        self.segment = NavSegment {
            origin,
            destination,
            pos_delta_unit,
            track_length_cm,
            track_length_xy_cm: pos_delta[0].hypot(pos_delta[1]),
            kind: SegmentKind::Straight,
            terrain_alt
        };

        self.calculate_wp_leash_length(&*io.pos_control);

        io.pos_control.set_pos_target(origin + Vector3::new(0.0, 0.0, terr_offset));
        self.track.track_desired_cm = 0.0;

        self.flags.reached_destination = false;
        self.flags.fast_waypoint = false;
        self.flags.slowing_down = false;
        self.flags.new_wp_destination = true;
        self.yaw.clear();

        // Start the target off at the vehicle's current speed along the track
        let speed_along_track = io.inav.velocity().dot(&pos_delta_unit);
        self.track.limited_speed_xy_cms =
            constrain(speed_along_track, 0.0, io.pos_control.max_speed_xy());

        debug!(
            "Straight segment set: origin {:?}, destination {:?}, length {:.1} cm",
            origin.data, destination.data, track_length_cm
        );

        Ok(())
    }

    /// Shift the segment so that it starts at the vehicle's current position.
    ///
    /// Both ends move by the offset between the vehicle and the position
    /// target. Does nothing once the target has started moving.
    pub fn shift_wp_origin_to_current_pos(&mut self, io: &mut NavIo) {
        if self.track.track_desired_cm > 0.0 {
            return
        }

        let curr_pos = io.inav.position();
        let pos_diff = curr_pos - io.pos_control.pos_target();

        self.segment.origin += pos_diff;
        self.segment.destination += pos_diff;
        self.track.track_desired_cm = 0.0;

        io.pos_control.set_pos_target(curr_pos);
        io.pos_control.freeze_ff_z();

        debug!("Segment origin shifted by {:?}", pos_diff.data);
    }

    /// Run the straight segment controller.
    ///
    /// Should be called at the position controller's rate. The position
    /// controller is always updated, even if the target could not be
    /// advanced, in which case the error is returned afterwards.
    pub fn update_wpnav(&mut self, io: &mut NavIo) -> Result<(), WpNavError> {
        let dt = io.pos_control.dt();

        io.pos_control.set_max_accel_xy(self.params.accel_cmss);
        io.pos_control.set_max_accel_z(self.params.accel_z_cmss);

        self.wp_speed_update(&mut *io.pos_control, dt);

        let res = self.advance_wp_target_along_track(io, dt);

        if self.flags.new_wp_destination {
            self.flags.new_wp_destination = false;
            io.pos_control.freeze_ff_z();
        }

        io.pos_control.update_xy_controller();
        self.check_wp_leash_length(&*io.pos_control);

        self.last_update_ms = Some(io.now_ms);

        res
    }

    /// Advance the intermediate target along the track.
    pub(crate) fn advance_wp_target_along_track(
        &mut self,
        io: &mut NavIo,
        dt: f64
    ) -> Result<(), WpNavError> {
        let curr_pos = io.inav.position();

        let terr_offset = if self.segment.terrain_alt {
            self.terrain_offset(io)?
        }
        else {
            0.0
        };

        let unit = self.segment.pos_delta_unit;
        let limits = self.track.limits;

        // Vehicle's progress along the track and its error from the track
        let curr_delta = curr_pos - Vector3::new(0.0, 0.0, terr_offset) - self.segment.origin;
        let track_covered = curr_delta.dot(&unit);
        let track_error = curr_delta - unit * track_covered;

        self.track.track_error_xy_cm = track_error[0].hypot(track_error[1]);
        self.track.track_error_z_cm = track_error[2].abs();

        // Express the cross track error as a fraction of the track leash on
        // whichever axis is worse
        let leash_xy = io.pos_control.leash_xy();
        let leash_z = if track_error[2] >= 0.0 {
            io.pos_control.leash_up_z()
        }
        else {
            io.pos_control.leash_down_z()
        };
        let track_error_max = scale_error_to_leash(limits.leash_cm, self.track.track_error_z_cm, leash_z)
            .max(scale_error_to_leash(limits.leash_cm, self.track.track_error_xy_cm, leash_xy));

        let track_leash_slack = if limits.leash_cm > track_error_max {
            safe_sqrt(limits.leash_cm.powi(2) - track_error_max.powi(2))
        }
        else {
            0.0
        };
        let track_desired_max = track_covered + track_leash_slack;

        let reached_leash_limit = self.track.track_desired_cm > track_desired_max;

        let speed_along_track = io.inav.velocity().dot(&unit);

        // Speed error the position controller converts into the track
        // acceleration
        let kp = io.pos_control.pos_xy_kp();
        let linear_velocity = if is_positive(kp) {
            limits.accel_cmss / kp
        }
        else {
            io.pos_control.max_speed_xy()
        };

        if speed_along_track < -linear_velocity {
            // Vehicle is moving backwards along the track, let it stop first
            self.track.limited_speed_xy_cms = 0.0;
        }
        else {
            if dt > 0.0 && !reached_leash_limit {
                self.track.limited_speed_xy_cms += 2.0 * limits.accel_cmss * dt;
            }

            self.track.limited_speed_xy_cms =
                constrain(self.track.limited_speed_xy_cms, 0.0, limits.speed_cms);

            if !self.flags.fast_waypoint {
                let dist_to_dest = self.segment.track_length_cm - self.track.track_desired_cm;

                if !self.flags.slowing_down && dist_to_dest <= limits.slow_down_dist_cm {
                    self.flags.slowing_down = true;
                }

                if self.flags.slowing_down {
                    self.track.limited_speed_xy_cms = self
                        .track
                        .limited_speed_xy_cms
                        .min(leash::slow_down_speed(dist_to_dest, limits.accel_cmss));
                }
            }

            // Keep the target within the controller's linear region of the
            // vehicle's actual speed
            if speed_along_track.abs() < linear_velocity {
                self.track.limited_speed_xy_cms = constrain(
                    self.track.limited_speed_xy_cms,
                    speed_along_track - linear_velocity,
                    speed_along_track + linear_velocity
                );
            }
        }

        if !reached_leash_limit {
            self.track.track_desired_cm += self.track.limited_speed_xy_cms * dt;

            if self.track.track_desired_cm > track_desired_max {
                self.track.track_desired_cm = track_desired_max;
                self.track.limited_speed_xy_cms =
                    (self.track.limited_speed_xy_cms - 2.0 * limits.accel_cmss * dt).max(0.0);
            }
        }

        let track_desired_limit = if self.flags.fast_waypoint {
            self.segment.track_length_cm + WPNAV_WP_FAST_OVERSHOOT_MAX
        }
        else {
            self.segment.track_length_cm
        };
        self.track.track_desired_cm =
            constrain(self.track.track_desired_cm, 0.0, track_desired_limit);

        let target = self.segment.origin
            + unit * self.track.track_desired_cm
            + Vector3::new(0.0, 0.0, terr_offset);
        io.pos_control.set_pos_target(target);

        if !self.flags.reached_destination
            && self.track.track_desired_cm >= self.segment.track_length_cm
        {
            if self.flags.fast_waypoint {
                self.flags.reached_destination = true;
            }
            else {
                let dist_to_dest = (curr_pos - Vector3::new(0.0, 0.0, terr_offset)
                    - self.segment.destination)
                    .norm();

                if dist_to_dest <= self.params.radius_cm {
                    self.flags.reached_destination = true;
                }
            }

            if self.flags.reached_destination {
                debug!("Reached destination {:?}", self.segment.destination.data);
            }
        }

        if let Some(heading_cd) = yaw::straight_segment_yaw_cd(
            self.segment.track_length_xy_cm,
            leash_xy,
            &self.segment.origin,
            &self.segment.destination,
            &target,
            &curr_pos
        ) {
            self.yaw.set_cd(heading_cd);
        }

        trace!(
            "track_desired {:.1} cm, limited speed {:.1} cm/s, slack {:.1} cm, error xy {:.1} z {:.1}",
            self.track.track_desired_cm,
            self.track.limited_speed_xy_cms,
            track_leash_slack,
            self.track.track_error_xy_cm,
            self.track.track_error_z_cm
        );

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Scale an axis error into the track leash.
///
/// With a zero length axis leash any error uses up the whole track leash.
fn scale_error_to_leash(track_leash_cm: f64, error_cm: f64, axis_leash_cm: f64) -> f64 {
    if is_positive(axis_leash_cm) {
        track_leash_cm * error_cm / axis_leash_cm
    }
    else if is_zero(error_cm) {
        0.0
    }
    else {
        track_leash_cm
    }
}
