//! Waypoint navigation state
//!
//! The straight and spline trackers are implemented on [`WpNav`] in their own
//! modules. This module holds the state they share and the operations common
//! to both.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, trace, warn};
use nalgebra::{Vector2, Vector3};

// Internal
use super::{
    leash::{self, AxisLimits, TrackLimits},
    speed,
    spline::SplineState,
    terrain,
    yaw::{self, YawState},
    Params, SegmentKind, WpNavError,
    WPNAV_ACCELERATION, WPNAV_ACTIVE_TIMEOUT_MS, WPNAV_WP_RADIUS_MIN, WPNAV_WP_SPEED_MIN
};
use crate::location::{AltFrame, Location, LocationError};
use crate::nav_io::{AttitudeReference, NavIo, ParamStore, PosControl};
use util::{
    maths::GRAVITY_MSS,
    params
};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Waypoint navigation controller.
///
/// Owns the geometry and progress of the active segment. Collaborators are
/// borrowed through [`NavIo`] on each call.
pub struct WpNav {
    pub(crate) params: Params,

    /// Horizontal speed requested by the operator, which the position
    /// controller's speed limit is ramped towards.
    pub(crate) wp_desired_speed_xy_cms: f64,

    pub(crate) segment: NavSegment,
    pub(crate) track: TrackState,
    pub(crate) spline: SplineState,
    pub(crate) yaw: YawState,
    pub(crate) flags: Flags,

    /// Time of the last straight or spline update, `None` before the first.
    ///
    /// Units: milliseconds
    pub(crate) last_update_ms: Option<u64>
}

/// Geometry of the active segment.
#[derive(Debug, Copy, Clone)]
pub struct NavSegment {
    /// Start of the segment.
    ///
    /// Units: centimeters, Frame: NEU from world origin (z above terrain if
    /// `terrain_alt`)
    pub origin: Vector3<f64>,

    /// End of the segment, in the same frame as `origin`.
    pub destination: Vector3<f64>,

    /// Unit vector in the current direction of travel. Zero for a zero
    /// length straight segment.
    pub pos_delta_unit: Vector3<f64>,

    pub track_length_cm: f64,

    /// Horizontal track length, used to decide whether to update the heading.
    pub track_length_xy_cm: f64,

    pub kind: SegmentKind,

    /// True if the z components of `origin` and `destination` are altitudes
    /// above terrain.
    pub terrain_alt: bool
}

/// Progress of the target along the active segment.
#[derive(Debug, Copy, Clone, Default)]
pub struct TrackState {
    /// Distance along the track of the intermediate target.
    ///
    /// Units: centimeters
    pub track_desired_cm: f64,

    /// Speed of the intermediate target along the track.
    ///
    /// Units: centimeters/second
    pub limited_speed_xy_cms: f64,

    /// Acceleration, speed and leash along the direction of travel.
    pub limits: TrackLimits,

    /// Horizontal distance between the vehicle and the track.
    ///
    /// Units: centimeters
    pub track_error_xy_cm: f64,

    /// Vertical distance between the vehicle and the track.
    ///
    /// Units: centimeters
    pub track_error_z_cm: f64
}

/// Status flags for the active segment.
#[derive(Debug, Copy, Clone, Default)]
pub struct Flags {
    pub reached_destination: bool,

    /// Fly through the destination without the arrival radius check.
    pub fast_waypoint: bool,

    /// The target has begun slowing down on approach to the destination.
    pub slowing_down: bool,

    /// The track limits must be recalculated after the next controller
    /// update.
    pub recalc_wp_leash: bool,

    /// A new destination was set, the vertical feed-forward must be frozen
    /// for one cycle.
    pub new_wp_destination: bool
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for NavSegment {
    fn default() -> Self {
        Self {
            origin: Vector3::zeros(),
            destination: Vector3::zeros(),
            pos_delta_unit: Vector3::zeros(),
            track_length_cm: 0.0,
            track_length_xy_cm: 0.0,
            kind: SegmentKind::Straight,
            terrain_alt: false
        }
    }
}

impl WpNav {
    /// Create a new controller from the parameters.
    ///
    /// The horizontal acceleration is capped at what the attitude
    /// controller's lean angle limit can produce, and the arrival radius is
    /// raised to its minimum.
    pub fn new(mut params: Params, ahrs: &dyn AttitudeReference) -> Self {
        let lean_max_rad = (ahrs.lean_angle_max_cd() * 0.01).to_radians();
        let accel_max_cmss = GRAVITY_MSS * 100.0 * lean_max_rad.tan();

        if params.accel_cmss > accel_max_cmss {
            warn!(
                "Waypoint acceleration {:.1} cm/s/s exceeds lean angle limit, capping to {:.1}",
                params.accel_cmss, accel_max_cmss
            );
            params.accel_cmss = accel_max_cmss;
        }
        params.radius_cm = params.radius_cm.max(WPNAV_WP_RADIUS_MIN);

        Self {
            wp_desired_speed_xy_cms: params.speed_cms,
            params,
            segment: NavSegment::default(),
            track: TrackState::default(),
            spline: SplineState::default(),
            yaw: YawState::default(),
            flags: Flags::default(),
            last_update_ms: None
        }
    }

    /// Initialise the controller from a parameter file.
    ///
    /// The path is relative to the parameters directory.
    pub fn init(
        params_path: &str,
        ahrs: &dyn AttitudeReference
    ) -> Result<Self, WpNavError> {
        let params = params::load(params_path)
            .map_err(WpNavError::ParamLoadError)?;

        Ok(Self::new(params, ahrs))
    }

    /// Initialise the straight and spline controllers.
    ///
    /// Must be called once before the controller is first used, but not
    /// between segments. Resets the position controller's feed-forward and
    /// pushes the navigation speed and acceleration limits into it.
    pub fn wp_and_spline_init(&mut self, io: &mut NavIo) {
        self.sanitise_accel(&mut *io.param_store);

        let pc = &mut *io.pos_control;

        pc.set_desired_accel_xy(Vector2::zeros());
        pc.init_xy_controller();
        pc.clear_desired_velocity_ff_z();
        pc.set_desired_velocity_xy(Vector2::zeros());

        self.wp_desired_speed_xy_cms = self.params.speed_cms;

        pc.set_max_speed_xy(self.params.speed_cms);
        pc.set_max_accel_xy(self.params.accel_cmss);
        pc.set_max_speed_z(-self.params.speed_down_cms, self.params.speed_up_cms);
        pc.set_max_accel_z(self.params.accel_z_cmss);
        pc.calc_leash_length_xy();
        pc.calc_leash_length_z();

        self.yaw.clear();

        debug!(
            "Waypoint controller initialised: speed {} cm/s, accel {} cm/s/s",
            self.params.speed_cms, self.params.accel_cmss
        );
    }

    /// Request a new horizontal speed.
    ///
    /// Speeds below `WPNAV_WP_SPEED_MIN` are ignored. The change is applied
    /// gradually by subsequent updates.
    pub fn set_speed_xy(&mut self, speed_cms: f64) {
        if speed_cms >= WPNAV_WP_SPEED_MIN {
            self.wp_desired_speed_xy_cms = speed_cms;
        }
    }

    /// Set the climb speed.
    pub fn set_speed_up(&mut self, pos_control: &mut dyn PosControl, speed_up_cms: f64) {
        let speed_down = pos_control.max_speed_down();
        pos_control.set_max_speed_z(speed_down, speed_up_cms);
        self.flags.recalc_wp_leash = true;
    }

    /// Set the descent speed. The speed is given as a negative value.
    pub fn set_speed_down(&mut self, pos_control: &mut dyn PosControl, speed_down_cms: f64) {
        let speed_up = pos_control.max_speed_up();
        pos_control.set_max_speed_z(speed_down_cms, speed_up);
        self.flags.recalc_wp_leash = true;
    }

    /// Mark the current segment as a fast waypoint (or not).
    ///
    /// Setting a new destination resets this flag, so it must be set after
    /// each destination.
    pub fn set_fast_waypoint(&mut self, fast: bool) {
        self.flags.fast_waypoint = fast;
    }

    /// The heading to fly, falling back to the attitude controller's target
    /// until the track has set one.
    ///
    /// Units: centi-degrees
    pub fn yaw_cd(&self, ahrs: &dyn AttitudeReference) -> f64 {
        self.yaw.get_cd(ahrs.yaw_target_cd())
    }

    /// Horizontal point at which the vehicle would stop.
    pub fn wp_stopping_point_xy(&self, pos_control: &dyn PosControl) -> Vector3<f64> {
        let xy = pos_control.stopping_point_xy();
        Vector3::new(xy[0], xy[1], pos_control.pos_target()[2])
    }

    /// Point at which the vehicle would stop, including altitude.
    pub fn wp_stopping_point(&self, pos_control: &dyn PosControl) -> Vector3<f64> {
        let xy = pos_control.stopping_point_xy();
        Vector3::new(xy[0], xy[1], pos_control.stopping_point_z())
    }

    /// Horizontal distance from the vehicle to the destination.
    ///
    /// Units: centimeters
    pub fn wp_distance_to_destination(&self, io: &NavIo) -> f64 {
        let curr = io.inav.position();
        (self.segment.destination[0] - curr[0]).hypot(self.segment.destination[1] - curr[1])
    }

    /// Bearing from the vehicle to the destination.
    ///
    /// Units: centi-degrees
    pub fn wp_bearing_to_destination(&self, io: &NavIo) -> f64 {
        yaw::get_bearing_cd(&io.inav.position(), &self.segment.destination)
    }

    /// The destination as a geodetic location.
    pub fn wp_destination_location(
        &self,
        ahrs: &dyn AttitudeReference
    ) -> Result<Location, WpNavError> {
        let mut loc = ahrs.origin().ok_or(LocationError::NoOrigin)?;
        let dest = self.segment.destination;

        loc.offset(dest[0] * 0.01, dest[1] * 0.01);

        if self.segment.terrain_alt {
            loc.alt_cm = dest[2].round() as i32;
            loc.frame = AltFrame::AboveTerrain;
        }
        else {
            loc.alt_cm += dest[2].round() as i32;
        }

        Ok(loc)
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn origin(&self) -> Vector3<f64> {
        self.segment.origin
    }

    pub fn destination(&self) -> Vector3<f64> {
        self.segment.destination
    }

    pub fn segment(&self) -> &NavSegment {
        &self.segment
    }

    pub fn track(&self) -> &TrackState {
        &self.track
    }

    pub fn reached_destination(&self) -> bool {
        self.flags.reached_destination
    }

    pub fn is_fast_waypoint(&self) -> bool {
        self.flags.fast_waypoint
    }

    pub fn wp_radius_cm(&self) -> f64 {
        self.params.radius_cm
    }

    /// Operator requested horizontal speed.
    pub fn desired_speed_xy_cms(&self) -> f64 {
        self.wp_desired_speed_xy_cms
    }

    /// True if the controller has been updated within the activity timeout.
    pub fn is_active(&self, now_ms: u64) -> bool {
        match self.last_update_ms {
            Some(t) => now_ms.saturating_sub(t) < WPNAV_ACTIVE_TIMEOUT_MS,
            None => false
        }
    }

    /// Recalculate the track limits if a speed change has requested it.
    ///
    /// Must be called after the position controller update, which may have
    /// changed the controller's leash lengths.
    pub(crate) fn check_wp_leash_length(&mut self, pos_control: &dyn PosControl) {
        if self.flags.recalc_wp_leash {
            self.calculate_wp_leash_length(pos_control);
        }
    }

    /// Calculate the track limits along the current direction of travel.
    pub(crate) fn calculate_wp_leash_length(&mut self, pos_control: &dyn PosControl) {
        let axis_limits = AxisLimits::from_pos_control(
            pos_control,
            self.params.accel_cmss,
            self.params.accel_z_cmss
        );

        self.track.limits = leash::calc_track_limits(&self.segment.pos_delta_unit, &axis_limits);
        self.flags.recalc_wp_leash = false;

        trace!(
            "Track limits: accel {:.1} cm/s/s, speed {:.1} cm/s, leash {:.1} cm, slow down {:.1} cm",
            self.track.limits.accel_cmss,
            self.track.limits.speed_cms,
            self.track.limits.leash_cm,
            self.track.limits.slow_down_dist_cm
        );
    }

    /// Ramp the position controller's horizontal speed limit towards the
    /// requested speed.
    pub(crate) fn wp_speed_update(&mut self, pos_control: &mut dyn PosControl, dt: f64) {
        if let Some(new_speed) = speed::step_speed_limit(
            pos_control.max_speed_xy(),
            self.wp_desired_speed_xy_cms,
            self.params.accel_cmss,
            dt
        ) {
            pos_control.set_max_speed_xy(new_speed);
            self.flags.recalc_wp_leash = true;
        }
    }

    /// Replace a non-positive acceleration with the default and persist it.
    pub(crate) fn sanitise_accel(&mut self, param_store: &mut dyn ParamStore) {
        if self.params.accel_cmss <= 0.0 {
            warn!(
                "Invalid waypoint acceleration {} cm/s/s, resetting to {}",
                self.params.accel_cmss, WPNAV_ACCELERATION
            );
            self.params.accel_cmss = WPNAV_ACCELERATION;
            param_store.set_and_save("accel_cmss", WPNAV_ACCELERATION);
        }
    }

    /// Origin for a new segment.
    ///
    /// If the controller is active the current position target is used so
    /// that consecutive segments join up, otherwise the vehicle's stopping
    /// point.
    pub(crate) fn default_origin(&self, io: &NavIo) -> Vector3<f64> {
        if self.is_active(io.now_ms) {
            io.pos_control.pos_target()
        }
        else {
            let xy = io.pos_control.stopping_point_xy();
            Vector3::new(xy[0], xy[1], io.pos_control.stopping_point_z())
        }
    }

    /// Terrain offset at the vehicle's current position.
    pub(crate) fn terrain_offset(&self, io: &NavIo) -> Result<f64, WpNavError> {
        terrain::terrain_offset_cm(&self.params, io.inav, io.rangefinder, io.terrain)
    }
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Convert a location into a NEU vector from the world origin.
///
/// Returns the vector and whether its z component is an altitude above
/// terrain.
pub fn get_vector_neu(
    loc: &Location,
    ahrs: &dyn AttitudeReference
) -> Result<(Vector3<f64>, bool), WpNavError> {
    let origin = ahrs.origin().ok_or(LocationError::NoOrigin)?;

    let ne = loc.vector_ne_from_origin_cm(&origin);

    let (z, terrain_alt) = match loc.frame {
        AltFrame::AboveTerrain => (loc.alt_cm as f64, true),
        _ => (loc.alt_cm_in_frame(AltFrame::AboveOrigin, &origin, None)? as f64, false)
    };

    Ok((Vector3::new(ne[0], ne[1], z), terrain_alt))
}
