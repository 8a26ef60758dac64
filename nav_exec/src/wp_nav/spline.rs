//! # Spline segment tracking
//!
//! Spline segments are cubic Hermite curves between the origin and the
//! destination. The curve is parameterised by a dimensionless time running
//! from 0 at the origin to 1 at the destination. The boundary velocities are
//! chosen from the neighbouring segments so consecutive segments join with
//! a continuous velocity direction:
//!
//!  - Starting from rest, or with no previous segment, the origin velocity is
//!    a small vector along the segment.
//!  - After a straight segment the origin velocity is the previous segment's
//!    direction (origin to destination).
//!  - After a spline segment the origin velocity is the previous segment's
//!    destination velocity.
//!
//! At the destination the velocity is a small vector along the segment when
//! stopping, the direction of the next leg when it is straight, or the chord
//! from this origin to the next destination when it is another spline.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, trace};
use nalgebra::Vector3;

// Internal
use super::{
    leash, state::get_vector_neu, yaw, NavSegment, SegmentKind, WpNav, WpNavError
};
use crate::location::{Location, LocationError};
use crate::nav_io::NavIo;
use util::maths::{constrain, is_positive, is_zero};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Cubic Hermite polynomial in 3D.
///
/// `p(t) = c0 + c1 t + c2 t^2 + c3 t^3` for `t` in `[0, 1]`.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct HermiteSpline {
    coeffs: [Vector3<f64>; 4]
}

/// State of the active spline segment.
#[derive(Debug, Copy, Clone, Default)]
pub struct SplineState {
    /// Curve derivative at the origin.
    pub origin_vel: Vector3<f64>,

    /// Curve derivative at the destination.
    pub destination_vel: Vector3<f64>,

    pub solution: HermiteSpline,

    /// Curve parameter of the intermediate target. Reaches or passes 1 at the
    /// destination.
    pub time: f64,

    /// Speed of the intermediate target along the curve.
    ///
    /// Units: centimeters/second
    pub vel_scaler_cms: f64,

    /// Rate of change of the curve parameter.
    ///
    /// Units: 1/second
    pub time_scale: f64
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// What follows the destination of a spline segment.
///
/// `P` is the representation of the next destination, a NEU vector by
/// default or a [`Location`].
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum SplineSegmentEnd<P = Vector3<f64>> {
    /// The vehicle stops at the destination.
    Stop,

    /// A straight segment to the given destination follows.
    Straight(P),

    /// Another spline segment to the given destination follows.
    Spline(P)
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl HermiteSpline {
    /// Solve for the curve with the given end points and end derivatives.
    pub fn solve(
        origin: &Vector3<f64>,
        destination: &Vector3<f64>,
        origin_vel: &Vector3<f64>,
        destination_vel: &Vector3<f64>
    ) -> Self {
        let (p0, p1, v0, v1) = (*origin, *destination, *origin_vel, *destination_vel);

        Self {
            coeffs: [
                p0,
                v0,
                p0 * -3.0 + p1 * 3.0 - v0 * 2.0 - v1,
                p0 * 2.0 - p1 * 2.0 + v0 + v1
            ]
        }
    }

    pub fn position(&self, t: f64) -> Vector3<f64> {
        let c = &self.coeffs;
        c[0] + c[1] * t + c[2] * t.powi(2) + c[3] * t.powi(3)
    }

    /// Derivative of the position with respect to the curve parameter.
    pub fn velocity(&self, t: f64) -> Vector3<f64> {
        let c = &self.coeffs;
        c[1] + c[2] * (2.0 * t) + c[3] * (3.0 * t.powi(2))
    }

    pub fn pos_vel(&self, t: f64) -> (Vector3<f64>, Vector3<f64>) {
        (self.position(t), self.velocity(t))
    }
}

impl<P> SplineSegmentEnd<P> {
    /// Convert the next destination into another representation.
    pub fn try_map<Q, E, F>(self, f: F) -> Result<SplineSegmentEnd<Q>, E>
    where
        F: FnOnce(P) -> Result<Q, E>
    {
        Ok(match self {
            SplineSegmentEnd::Stop => SplineSegmentEnd::Stop,
            SplineSegmentEnd::Straight(p) => SplineSegmentEnd::Straight(f(p)?),
            SplineSegmentEnd::Spline(p) => SplineSegmentEnd::Spline(f(p)?)
        })
    }
}

impl WpNav {
    /// Set a spline segment to the given destination.
    ///
    /// The origin is chosen as for [`WpNav::set_wp_destination`].
    /// `stopped_at_start` forces the origin velocity as if starting from
    /// rest, and `seg_end` describes what follows the destination.
    pub fn set_spline_destination(
        &mut self,
        io: &mut NavIo,
        destination: Vector3<f64>,
        terrain_alt: bool,
        stopped_at_start: bool,
        seg_end: SplineSegmentEnd
    ) -> Result<(), WpNavError> {
        let mut origin = self.default_origin(io);

        if terrain_alt {
            origin[2] -= self.terrain_offset(io)?;
        }

        self.set_spline_origin_and_destination(
            io, origin, destination, terrain_alt, stopped_at_start, seg_end
        )
    }

    /// Set a spline segment to a geodetic destination.
    ///
    /// The next destination is converted into the destination's altitude
    /// frame before use, through the terrain database if either is above
    /// terrain.
    pub fn set_spline_destination_location(
        &mut self,
        io: &mut NavIo,
        destination: &Location,
        stopped_at_start: bool,
        seg_end: SplineSegmentEnd<Location>
    ) -> Result<(), WpNavError> {
        let (dest_neu, terrain_alt) = get_vector_neu(destination, io.ahrs)?;
        let world_origin = io.ahrs.origin().ok_or(LocationError::NoOrigin)?;

        let (ahrs, terrain) = (io.ahrs, io.terrain);
        let seg_end = seg_end.try_map(|mut next| -> Result<Vector3<f64>, WpNavError> {
            next.change_alt_frame(destination.frame, &world_origin, terrain)?;
            get_vector_neu(&next, ahrs).map(|(v, _)| v)
        })?;

        self.set_spline_destination(io, dest_neu, terrain_alt, stopped_at_start, seg_end)
    }

    /// Set a spline segment with an explicit origin.
    ///
    /// If the terrain offset cannot be found the segment is not changed.
    pub fn set_spline_origin_and_destination(
        &mut self,
        io: &mut NavIo,
        origin: Vector3<f64>,
        destination: Vector3<f64>,
        terrain_alt: bool,
        stopped_at_start: bool,
        seg_end: SplineSegmentEnd
    ) -> Result<(), WpNavError> {
        let terr_offset = if terrain_alt {
            self.terrain_offset(io)?
        }
        else {
            0.0
        };

        // Previous segment can only be joined if it completed recently
        let prev_segment_exists =
            self.flags.reached_destination && self.is_active(io.now_ms);
        let dt = io.pos_control.dt();

        self.sanitise_accel(&mut *io.param_store);

        if stopped_at_start || !prev_segment_exists {
            self.spline.origin_vel = (destination - origin) * dt;
            self.spline.time = 0.0;
            self.spline.vel_scaler_cms = 0.0;
        }
        else if self.segment.kind == SegmentKind::Straight {
            self.spline.origin_vel = self.segment.destination - self.segment.origin;
            self.spline.time = 0.0;
            self.spline.vel_scaler_cms = io.pos_control.vel_target().norm();
        }
        else {
            self.spline.origin_vel = self.spline.destination_vel;

            // Carry any small overshoot of the previous spline into this one
            if self.spline.time > 1.0 && self.spline.time < self.params.spline_time_overshoot_max {
                self.spline.time -= 1.0;
            }
            else {
                self.spline.time = 0.0;
            }
        }

        let (destination_vel, fast_waypoint) = match seg_end {
            SplineSegmentEnd::Stop => ((destination - origin) * dt, false),
            SplineSegmentEnd::Straight(next) => (next - destination, true),
            SplineSegmentEnd::Spline(next) => (next - origin, true)
        };
        self.spline.destination_vel = destination_vel;

        // Only the curve sees the scaled velocities, the next segment joins
        // using the unscaled ones
        let (origin_vel, destination_vel) = scale_boundary_velocities(
            &self.spline.origin_vel, &self.spline.destination_vel, &origin, &destination
        );
        self.spline.solution =
            HermiteSpline::solve(&origin, &destination, &origin_vel, &destination_vel);

        let pos_delta = destination - origin;
        let track_length_cm = pos_delta.norm();

        self.segment = NavSegment {
            origin,
            destination,
            pos_delta_unit: if is_zero(track_length_cm) {
                Vector3::zeros()
            }
            else {
                pos_delta / track_length_cm
            },
            track_length_cm,
            track_length_xy_cm: pos_delta[0].hypot(pos_delta[1]),
            kind: SegmentKind::Spline,
            terrain_alt
        };

        self.flags.fast_waypoint = fast_waypoint;
        self.flags.reached_destination = false;
        self.flags.new_wp_destination = true;
        self.yaw.clear();

        self.track.limits.slow_down_dist_cm = leash::slow_down_distance(
            io.pos_control.max_speed_xy(), self.params.accel_cmss
        );

        io.pos_control.set_pos_target(origin + Vector3::new(0.0, 0.0, terr_offset));

        debug!(
            "Spline segment set: origin {:?}, destination {:?}, origin vel {:?}, destination vel {:?}",
            origin.data, destination.data, self.spline.origin_vel.data, self.spline.destination_vel.data
        );

        Ok(())
    }

    /// Run the spline segment controller.
    ///
    /// Fails with [`WpNavError::NotSplineSegment`] without touching any state
    /// if the active segment is straight. Otherwise the position controller
    /// is always updated, and any error advancing the target is returned
    /// afterwards.
    pub fn update_spline(&mut self, io: &mut NavIo) -> Result<(), WpNavError> {
        if self.segment.kind != SegmentKind::Spline {
            return Err(WpNavError::NotSplineSegment)
        }

        let dt = io.pos_control.dt();

        self.wp_speed_update(&mut *io.pos_control, dt);

        let res = self.advance_spline_target_along_track(io, dt);

        if self.flags.new_wp_destination {
            self.flags.new_wp_destination = false;
            io.pos_control.freeze_ff_z();
        }

        io.pos_control.update_xy_controller();

        self.last_update_ms = Some(io.now_ms);

        res
    }

    /// Advance the intermediate target along the curve.
    pub(crate) fn advance_spline_target_along_track(
        &mut self,
        io: &mut NavIo,
        dt: f64
    ) -> Result<(), WpNavError> {
        if self.flags.reached_destination {
            return Ok(())
        }

        let (mut target_pos, target_vel) = self.spline.solution.pos_vel(self.spline.time);
        let target_vel_length = target_vel.norm();

        // A stationary curve cannot be advanced along
        if is_zero(target_vel_length) {
            self.flags.reached_destination = true;
            debug!("Spline has zero velocity, marking destination reached");
            return Ok(())
        }

        self.segment.pos_delta_unit = target_vel / target_vel_length;
        self.calculate_wp_leash_length(&*io.pos_control);

        let curr_pos = io.inav.position();

        let terr_offset = if self.segment.terrain_alt {
            self.terrain_offset(io)?
        }
        else {
            0.0
        };

        let mut track_error = curr_pos - target_pos;
        track_error[2] -= terr_offset;

        self.track.track_error_xy_cm = track_error[0].hypot(track_error[1]);
        self.track.track_error_z_cm = track_error[2].abs();

        let leash_xy = io.pos_control.leash_xy();
        let leash_z = if track_error[2] >= 0.0 {
            io.pos_control.leash_up_z()
        }
        else {
            io.pos_control.leash_down_z()
        };

        let leash_cm = self.track.limits.leash_cm;
        let track_leash_slack = (leash_cm * leash_fraction_remaining(self.track.track_error_z_cm, leash_z))
            .min(leash_cm * leash_fraction_remaining(self.track.track_error_xy_cm, leash_xy))
            .max(0.0);

        let dist_to_dest = (self.segment.destination - target_pos).norm();

        let mut vel_limit = io.pos_control.max_speed_xy();
        if !is_zero(dt) {
            vel_limit = vel_limit.min(track_leash_slack / dt);
        }

        let accel = self.params.accel_cmss;
        if !self.flags.fast_waypoint && dist_to_dest < self.track.limits.slow_down_dist_cm {
            self.spline.vel_scaler_cms = leash::slow_down_speed(dist_to_dest, accel);
        }
        else if self.spline.vel_scaler_cms < vel_limit {
            self.spline.vel_scaler_cms += accel * dt;
        }
        self.spline.vel_scaler_cms = constrain(self.spline.vel_scaler_cms, 0.0, vel_limit);

        self.spline.time_scale = self.spline.vel_scaler_cms / target_vel_length;

        target_pos[2] += terr_offset;
        io.pos_control.set_pos_target(target_pos);

        if let Some(heading_cd) = yaw::spline_segment_yaw_cd(
            self.segment.track_length_xy_cm,
            leash_xy,
            &target_vel,
            &track_error
        ) {
            self.yaw.set_cd(heading_cd);
        }

        self.spline.time += self.spline.time_scale * dt;

        if self.spline.time >= 1.0 {
            self.flags.reached_destination = true;
            debug!("Reached spline destination {:?}", self.segment.destination.data);
        }

        trace!(
            "spline time {:.4}, vel scaler {:.1} cm/s, slack {:.1} cm, error xy {:.1} z {:.1}",
            self.spline.time,
            self.spline.vel_scaler_cms,
            track_leash_slack,
            self.track.track_error_xy_cm,
            self.track.track_error_z_cm
        );

        Ok(())
    }

    pub fn spline_origin_vel(&self) -> Vector3<f64> {
        self.spline.origin_vel
    }

    pub fn spline_destination_vel(&self) -> Vector3<f64> {
        self.spline.destination_vel
    }

    pub fn spline_time(&self) -> f64 {
        self.spline.time
    }
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Scale the boundary velocities down so the curve does not overshoot.
///
/// If the sum of the two velocity lengths exceeds four times the segment
/// length both velocities are scaled by the same factor, which is zero for a
/// zero length segment.
pub fn scale_boundary_velocities(
    origin_vel: &Vector3<f64>,
    destination_vel: &Vector3<f64>,
    origin: &Vector3<f64>,
    destination: &Vector3<f64>
) -> (Vector3<f64>, Vector3<f64>) {
    let vel_len = origin_vel.norm() + destination_vel.norm();
    let pos_len = (*destination - *origin).norm() * 4.0;

    if vel_len > pos_len {
        let scaling = if is_positive(vel_len) { pos_len / vel_len } else { 0.0 };
        (*origin_vel * scaling, *destination_vel * scaling)
    }
    else {
        (*origin_vel, *destination_vel)
    }
}

/// Fraction of an axis leash not taken up by the error on that axis.
fn leash_fraction_remaining(error_cm: f64, axis_leash_cm: f64) -> f64 {
    if is_positive(axis_leash_cm) {
        (axis_leash_cm - error_cm) / axis_leash_cm
    }
    else {
        0.0
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::location::AltFrame;
    use crate::nav_io::PosControl;
    use crate::sim::SimWorld;
    use crate::wp_nav::Params;

    fn setup() -> (SimWorld, WpNav) {
        setup_with(Vector3::zeros(), Params::default())
    }

    fn setup_with(position: Vector3<f64>, params: Params) -> (SimWorld, WpNav) {
        let mut world = SimWorld::new(position);
        let mut wp_nav = WpNav::new(params, &world.ahrs);
        wp_nav.wp_and_spline_init(&mut world.io());
        (world, wp_nav)
    }

    fn fly(world: &mut SimWorld, wp_nav: &mut WpNav, max_cycles: usize) -> bool {
        for _ in 0..max_cycles {
            wp_nav.update_spline(&mut world.io()).unwrap();
            world.step();
            if wp_nav.reached_destination() {
                return true
            }
        }
        false
    }

    #[test]
    fn test_hermite_end_points() {
        let o = Vector3::new(0.0, 0.0, 100.0);
        let d = Vector3::new(1000.0, 500.0, 300.0);
        let ov = Vector3::new(200.0, 0.0, 0.0);
        let dv = Vector3::new(0.0, 400.0, 0.0);

        let s = HermiteSpline::solve(&o, &d, &ov, &dv);

        assert!((s.position(0.0) - o).norm() < 1e-9);
        assert!((s.position(1.0) - d).norm() < 1e-9);
        assert!((s.velocity(0.0) - ov).norm() < 1e-9);
        assert!((s.velocity(1.0) - dv).norm() < 1e-9);
    }

    #[test]
    fn test_boundary_scaling() {
        let o = Vector3::zeros();
        let d = Vector3::new(100.0, 0.0, 0.0);

        // Within four segment lengths, unchanged
        let ov = Vector3::new(100.0, 0.0, 0.0);
        let dv = Vector3::new(200.0, 0.0, 0.0);
        assert_eq!(scale_boundary_velocities(&ov, &dv, &o, &d), (ov, dv));

        // Too long, scaled to exactly four segment lengths
        let dv = Vector3::new(700.0, 0.0, 0.0);
        let (sov, sdv) = scale_boundary_velocities(&ov, &dv, &o, &d);
        assert!((sov.norm() + sdv.norm() - 400.0).abs() < 1e-9);
        assert!((sdv[0] / sov[0] - 7.0).abs() < 1e-9);

        // Zero length segment
        let (sov, sdv) = scale_boundary_velocities(&ov, &dv, &o, &o);
        assert_eq!(sov, Vector3::zeros());
        assert_eq!(sdv, Vector3::zeros());
    }

    #[test]
    fn test_boundary_scaling_opposed_velocities() {
        let o = Vector3::zeros();
        let d = Vector3::new(100.0, 0.0, 0.0);

        // Opposed velocities cancel when summed but still make the curve
        // loop out sideways, so they are scaled on their lengths
        let ov = Vector3::new(0.0, 400.0, 0.0);
        let dv = Vector3::new(0.0, -400.0, 0.0);
        let (sov, sdv) = scale_boundary_velocities(&ov, &dv, &o, &d);
        assert!((sov - Vector3::new(0.0, 200.0, 0.0)).norm() < 1e-9);
        assert!((sdv - Vector3::new(0.0, -200.0, 0.0)).norm() < 1e-9);

        // Perpendicular
        let ov = Vector3::new(300.0, 0.0, 0.0);
        let dv = Vector3::new(0.0, 0.0, 500.0);
        let (sov, sdv) = scale_boundary_velocities(&ov, &dv, &o, &d);
        assert!((sov.norm() + sdv.norm() - 400.0).abs() < 1e-9);
        assert!((sov - Vector3::new(150.0, 0.0, 0.0)).norm() < 1e-9);
        assert!((sdv - Vector3::new(0.0, 0.0, 250.0)).norm() < 1e-9);
    }

    #[test]
    fn test_end_map() {
        let end: SplineSegmentEnd<i32> = SplineSegmentEnd::Spline(2);
        let mapped: Result<_, ()> = end.try_map(|v| Ok(v as f64 * 1.5));
        assert_eq!(mapped, Ok(SplineSegmentEnd::Spline(3.0)));

        let stop: SplineSegmentEnd<i32> = SplineSegmentEnd::Stop;
        let mapped: Result<SplineSegmentEnd<f64>, ()> = stop.try_map(|_| Err(()));
        assert_eq!(mapped, Ok(SplineSegmentEnd::Stop));
    }

    #[test]
    fn test_update_on_straight_fails() {
        let (mut world, mut wp_nav) = setup();
        wp_nav.set_wp_destination(&mut world.io(), Vector3::new(1000.0, 0.0, 0.0), false).unwrap();

        let target = world.pos_control.pos_target();
        let updates = world.pos_control.xy_updates;

        assert!(matches!(wp_nav.update_spline(&mut world.io()), Err(WpNavError::NotSplineSegment)));
        assert_eq!(world.pos_control.pos_target(), target);
        assert_eq!(world.pos_control.xy_updates, updates);
        assert!(!wp_nav.is_active(world.now_ms));
    }

    #[test]
    fn test_fly_spline_to_stop() {
        let (mut world, mut wp_nav) = setup();
        let dest = Vector3::new(1000.0, 1000.0, 200.0);
        wp_nav.set_spline_destination(&mut world.io(), dest, false, true, SplineSegmentEnd::Stop).unwrap();

        assert!(!wp_nav.is_fast_waypoint());
        assert_eq!(wp_nav.segment().kind, SegmentKind::Spline);

        // Stopping at both ends gives tiny boundary velocities along the chord
        let dt = world.pos_control.dt();
        assert!((wp_nav.spline_origin_vel() - dest * dt).norm() < 1e-9);
        assert!((wp_nav.spline_destination_vel() - dest * dt).norm() < 1e-9);

        let mut prev_time = 0.0;
        let mut reached = false;
        for _ in 0..6000 {
            wp_nav.update_spline(&mut world.io()).unwrap();
            world.step();

            assert!(wp_nav.spline_time() >= prev_time);
            prev_time = wp_nav.spline_time();

            if wp_nav.reached_destination() {
                reached = true;
                break
            }
        }

        assert!(reached);
        assert!(wp_nav.spline_time() >= 1.0);
        assert!((world.pos_control.pos_target() - dest).norm() < 50.0);
    }

    #[test]
    fn test_chained_splines_continuous() {
        let (mut world, mut wp_nav) = setup();

        let next = Vector3::new(2000.0, 1000.0, 0.0);
        wp_nav.set_spline_destination(
            &mut world.io(),
            Vector3::new(1000.0, 0.0, 0.0),
            false,
            true,
            SplineSegmentEnd::Spline(next)
        ).unwrap();

        // The next leg is a spline so the destination velocity is the chord
        // from this origin to the next destination
        assert!(wp_nav.is_fast_waypoint());
        assert_eq!(wp_nav.spline_destination_vel(), next);

        assert!(fly(&mut world, &mut wp_nav, 6000));
        let first_dest_vel = wp_nav.spline_destination_vel();
        let overshoot = wp_nav.spline_time() - 1.0;

        wp_nav.set_spline_destination(&mut world.io(), next, false, false, SplineSegmentEnd::Stop).unwrap();

        // Joined at the last position target, just short of the first destination
        assert!((wp_nav.origin() - Vector3::new(1000.0, 0.0, 0.0)).norm() < 20.0);
        assert_eq!(wp_nav.spline_origin_vel(), first_dest_vel);
        assert!((wp_nav.spline_time() - overshoot).abs() < 1e-9);

        assert!(fly(&mut world, &mut wp_nav, 6000));
    }

    #[test]
    fn test_spline_after_straight() {
        let (mut world, mut wp_nav) = setup();
        wp_nav.set_wp_destination(&mut world.io(), Vector3::new(1000.0, 0.0, 0.0), false).unwrap();
        wp_nav.set_fast_waypoint(true);

        for _ in 0..6000 {
            wp_nav.update_wpnav(&mut world.io()).unwrap();
            world.step();
            if wp_nav.reached_destination() {
                break
            }
        }
        assert!(wp_nav.reached_destination());

        let vel_target = world.pos_control.vel_target().norm();
        wp_nav.set_spline_destination(
            &mut world.io(), Vector3::new(2000.0, 500.0, 0.0), false, false, SplineSegmentEnd::Stop
        ).unwrap();

        assert_eq!(wp_nav.spline_origin_vel(), Vector3::new(1000.0, 0.0, 0.0));
        assert!((wp_nav.spline.vel_scaler_cms - vel_target).abs() < 1e-9);
        assert_eq!(wp_nav.spline_time(), 0.0);
    }

    #[test]
    fn test_degenerate_spline_reached() {
        let (mut world, mut wp_nav) = setup();

        // Zero length segment followed by a straight leg, the boundary
        // scaling removes the end velocity from the curve only
        let next = Vector3::new(1000.0, 0.0, 0.0);
        wp_nav.set_spline_destination(
            &mut world.io(),
            Vector3::zeros(),
            false,
            true,
            SplineSegmentEnd::Straight(next)
        ).unwrap();
        assert_eq!(wp_nav.spline_destination_vel(), next);
        assert_eq!(wp_nav.spline.solution.velocity(0.0), Vector3::zeros());
        assert_eq!(wp_nav.spline.solution.velocity(1.0), Vector3::zeros());

        wp_nav.update_spline(&mut world.io()).unwrap();
        assert!(wp_nav.reached_destination());
    }

    #[test]
    fn test_spline_location_destination() {
        let (mut world, mut wp_nav) = setup();
        let world_origin = world.ahrs.origin.unwrap();

        let mut dest = world_origin;
        dest.offset(10.0, 0.0);
        dest.alt_cm += 500;

        let mut next = Location::new(world_origin.lat, world_origin.lng, 500, AltFrame::AboveOrigin);
        next.offset(10.0, 10.0);

        wp_nav.set_spline_destination_location(
            &mut world.io(), &dest, true, SplineSegmentEnd::Straight(next)
        ).unwrap();

        assert!((wp_nav.destination() - Vector3::new(1000.0, 0.0, 500.0)).norm() < 2.0);

        // Next leg heads east at the same altitude
        let dv = wp_nav.spline_destination_vel();
        assert!((dv - Vector3::new(0.0, 1000.0, 0.0)).norm() < 3.0);
    }

    #[test]
    fn test_short_spline_keeps_unscaled_join() {
        let (mut world, mut wp_nav) = setup();

        // Short segment into a long one, the curve's end velocities are
        // scaled down to four segment lengths
        let next = Vector3::new(10_000.0, 0.0, 0.0);
        wp_nav.set_spline_destination(
            &mut world.io(),
            Vector3::new(200.0, 0.0, 0.0),
            false,
            true,
            SplineSegmentEnd::Spline(next)
        ).unwrap();

        let solution = wp_nav.spline.solution;
        assert!((solution.velocity(0.0).norm() + solution.velocity(1.0).norm() - 800.0).abs() < 1e-6);
        assert_eq!(wp_nav.spline_destination_vel(), next);

        assert!(fly(&mut world, &mut wp_nav, 6000));

        // The long segment starts with the full velocity towards the next
        // destination
        wp_nav.set_spline_destination(&mut world.io(), next, false, false, SplineSegmentEnd::Stop).unwrap();
        assert_eq!(wp_nav.spline_origin_vel(), next);
        assert!((wp_nav.spline.solution.velocity(0.0) - next).norm() < 1e-9);
    }

    #[test]
    fn test_feed_forward_frozen_once_per_destination() {
        let (mut world, mut wp_nav) = setup();
        let freezes = world.pos_control.ff_z_freezes;

        wp_nav.set_wp_destination(&mut world.io(), Vector3::new(1000.0, 0.0, 0.0), false).unwrap();
        assert_eq!(world.pos_control.ff_z_freezes, freezes);

        for _ in 0..2 {
            wp_nav.update_wpnav(&mut world.io()).unwrap();
            world.step();
        }
        assert_eq!(world.pos_control.ff_z_freezes, freezes + 1);

        wp_nav.set_spline_destination(
            &mut world.io(), Vector3::new(2000.0, 0.0, 0.0), false, false, SplineSegmentEnd::Stop
        ).unwrap();

        for _ in 0..2 {
            wp_nav.update_spline(&mut world.io()).unwrap();
            world.step();
        }
        assert_eq!(world.pos_control.ff_z_freezes, freezes + 2);
    }

    #[test]
    fn test_terrain_spline() {
        let (mut world, mut wp_nav) = setup_with(Vector3::new(0.0, 0.0, 1500.0), Params::default());
        world.terrain.ground_alt_cm = 500.0;
        world.sync();

        // 1000 cm above terrain at both ends, the vehicle is already there
        let dest = Vector3::new(1000.0, 500.0, 1000.0);
        wp_nav.set_spline_destination(&mut world.io(), dest, true, true, SplineSegmentEnd::Stop).unwrap();

        assert!(wp_nav.segment().terrain_alt);
        assert!((wp_nav.origin()[2] - 1000.0).abs() < 1e-9);
        assert!((world.pos_control.pos_target()[2] - 1500.0).abs() < 1e-9);

        let mut reached = false;
        for _ in 0..6000 {
            wp_nav.update_spline(&mut world.io()).unwrap();
            world.step();

            // The curve is level above terrain, so the target stays level
            assert!((world.pos_control.pos_target()[2] - 1500.0).abs() < 1e-6);

            if wp_nav.reached_destination() {
                reached = true;
                break
            }
        }

        assert!(reached);
        assert!((world.pos_control.pos_target() - Vector3::new(1000.0, 500.0, 1500.0)).norm() < 50.0);
    }

    #[test]
    fn test_spline_terrain_failure_leaves_segment() {
        let (mut world, mut wp_nav) = setup();
        wp_nav.set_spline_destination(
            &mut world.io(),
            Vector3::new(1000.0, 0.0, 0.0),
            false,
            true,
            SplineSegmentEnd::Spline(Vector3::new(2000.0, 1000.0, 0.0))
        ).unwrap();

        let origin = wp_nav.origin();
        let destination = wp_nav.destination();
        let origin_vel = wp_nav.spline_origin_vel();
        let destination_vel = wp_nav.spline_destination_vel();
        let solution = wp_nav.spline.solution;
        let target = world.pos_control.pos_target();

        world.terrain.database_available = false;

        let res = wp_nav.set_spline_destination(
            &mut world.io(), Vector3::new(0.0, 1000.0, 1000.0), true, false, SplineSegmentEnd::Stop
        );
        assert!(matches!(res, Err(WpNavError::TerrainUnavailable)));

        let res = wp_nav.set_spline_origin_and_destination(
            &mut world.io(),
            Vector3::new(0.0, 0.0, 1000.0),
            Vector3::new(0.0, 1000.0, 1000.0),
            true,
            false,
            SplineSegmentEnd::Stop
        );
        assert!(matches!(res, Err(WpNavError::TerrainUnavailable)));

        assert_eq!(wp_nav.origin(), origin);
        assert_eq!(wp_nav.destination(), destination);
        assert_eq!(wp_nav.spline_origin_vel(), origin_vel);
        assert_eq!(wp_nav.spline_destination_vel(), destination_vel);
        assert_eq!(wp_nav.spline.solution, solution);
        assert_eq!(world.pos_control.pos_target(), target);
        assert!(!wp_nav.segment().terrain_alt);
        assert!(wp_nav.is_fast_waypoint());
    }

    /// Fly a spline into another one, then start the next spline with the
    /// given curve time left over from the first.
    fn carried_spline_time(overshoot_max: f64, time: f64) -> f64 {
        let params = Params { spline_time_overshoot_max: overshoot_max, ..Params::default() };
        let (mut world, mut wp_nav) = setup_with(Vector3::zeros(), params);

        let next = Vector3::new(2000.0, 1000.0, 0.0);
        wp_nav.set_spline_destination(
            &mut world.io(), Vector3::new(1000.0, 0.0, 0.0), false, true, SplineSegmentEnd::Spline(next)
        ).unwrap();
        assert!(fly(&mut world, &mut wp_nav, 6000));

        wp_nav.spline.time = time;
        wp_nav.set_spline_destination(&mut world.io(), next, false, false, SplineSegmentEnd::Stop).unwrap();
        wp_nav.spline_time()
    }

    #[test]
    fn test_spline_time_overshoot_limit() {
        assert!((carried_spline_time(1.1, 1.05) - 0.05).abs() < 1e-9);
        assert_eq!(carried_spline_time(1.1, 1.1), 0.0);
        assert_eq!(carried_spline_time(1.1, 1.2), 0.0);

        // A larger limit carries the same overshoot
        assert!((carried_spline_time(1.5, 1.2) - 0.2).abs() < 1e-9);
        assert_eq!(carried_spline_time(1.5, 1.5), 0.0);
        assert_eq!(carried_spline_time(1.5, 1.0), 0.0);
    }

    #[test]
    fn test_spline_location_next_above_terrain() {
        let (mut world, mut wp_nav) = setup();
        world.terrain.ground_alt_cm = 500.0;
        world.sync();
        let world_origin = world.ahrs.origin.unwrap();

        let mut dest = Location::new(world_origin.lat, world_origin.lng, 500, AltFrame::AboveOrigin);
        dest.offset(10.0, 0.0);

        // 500 cm above terrain which is itself 500 cm above the origin
        let mut next = Location::new(world_origin.lat, world_origin.lng, 500, AltFrame::AboveTerrain);
        next.offset(10.0, 10.0);

        wp_nav.set_spline_destination_location(
            &mut world.io(), &dest, true, SplineSegmentEnd::Straight(next)
        ).unwrap();

        let dv = wp_nav.spline_destination_vel();
        assert!((dv - Vector3::new(0.0, 1000.0, 500.0)).norm() < 3.0);

        // Without a terrain database the next destination cannot be converted
        world.terrain.database_available = false;
        let res = wp_nav.set_spline_destination_location(
            &mut world.io(), &dest, true, SplineSegmentEnd::Straight(next)
        );
        assert!(matches!(
            res,
            Err(WpNavError::LocationConversion(LocationError::TerrainFrameConversion { .. }))
        ));
    }
}
