//! # Geodetic locations
//!
//! A [`Location`] is a latitude/longitude pair in units of 1e-7 degrees plus
//! an altitude in centimeters expressed in one of several altitude frames.
//! Locations are converted into NEU vectors from the world origin using a
//! flat-earth approximation, which is accurate over the few kilometers a
//! single mission covers.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

// Internal
use crate::nav_io::TerrainProvider;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Meters per 1e-7 degree of latitude.
pub const LOCATION_SCALING_FACTOR: f64 = 0.011131884502145034;

/// 1e-7 degrees of latitude per meter.
pub const LOCATION_SCALING_FACTOR_INV: f64 = 89.83204953368922;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A point on the earth with an altitude.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// Latitude.
    ///
    /// Units: 1e-7 degrees
    pub lat: i32,

    /// Longitude.
    ///
    /// Units: 1e-7 degrees
    pub lng: i32,

    /// Altitude in the frame given by `frame`.
    ///
    /// Units: centimeters
    pub alt_cm: i32,

    pub frame: AltFrame
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// The reference an altitude is measured from.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AltFrame {
    /// Above mean sea level.
    Absolute,

    /// Above the world origin.
    AboveOrigin,

    /// Above the terrain directly beneath the location.
    AboveTerrain
}

/// Errors that can occur while converting locations.
#[derive(Debug, thiserror::Error)]
pub enum LocationError {
    #[error("The world origin has not been set")]
    NoOrigin,

    #[error("Cannot convert an altitude from {from:?} to {to:?} without terrain data")]
    TerrainFrameConversion { from: AltFrame, to: AltFrame }
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Location {
    pub fn new(lat: i32, lng: i32, alt_cm: i32, frame: AltFrame) -> Self {
        Self { lat, lng, alt_cm, frame }
    }

    /// Horizontal vector from `origin` to this location.
    ///
    /// Units: centimeters, Frame: NE
    pub fn vector_ne_from_origin_cm(&self, origin: &Location) -> Vector2<f64> {
        Vector2::new(
            (self.lat - origin.lat) as f64 * LOCATION_SCALING_FACTOR * 100.0,
            diff_longitude(self.lng, origin.lng) as f64
                * LOCATION_SCALING_FACTOR
                * longitude_scale(origin.lat)
                * 100.0
        )
    }

    /// Move this location by the given distances.
    ///
    /// Units: meters
    pub fn offset(&mut self, north_m: f64, east_m: f64) {
        let dlat = north_m * LOCATION_SCALING_FACTOR_INV;
        let dlng = east_m * LOCATION_SCALING_FACTOR_INV / longitude_scale(self.lat);

        self.lat = (self.lat as f64 + dlat).round() as i32;
        self.lng = wrap_longitude(self.lng as i64 + dlng.round() as i64);
    }

    /// Get this location's altitude expressed in another frame.
    ///
    /// `origin` must be the world origin with an absolute altitude. Moving
    /// into or out of the terrain frame needs the terrain height at this
    /// location, which is read from `terrain`.
    pub fn alt_cm_in_frame(
        &self,
        frame: AltFrame,
        origin: &Location,
        terrain: Option<&dyn TerrainProvider>
    ) -> Result<i32, LocationError> {
        if frame == self.frame {
            return Ok(self.alt_cm)
        }

        let terrain_amsl_cm = || {
            terrain
                .and_then(|t| t.terrain_alt_amsl_cm(self))
                .map(|alt| alt.round() as i32)
                .ok_or(LocationError::TerrainFrameConversion { from: self.frame, to: frame })
        };

        let alt_amsl_cm = match self.frame {
            AltFrame::Absolute => self.alt_cm,
            AltFrame::AboveOrigin => self.alt_cm + origin.alt_cm,
            AltFrame::AboveTerrain => self.alt_cm + terrain_amsl_cm()?
        };

        Ok(match frame {
            AltFrame::Absolute => alt_amsl_cm,
            AltFrame::AboveOrigin => alt_amsl_cm - origin.alt_cm,
            AltFrame::AboveTerrain => alt_amsl_cm - terrain_amsl_cm()?
        })
    }

    /// Convert this location's altitude into the given frame in place.
    ///
    /// On error the location is left unchanged.
    pub fn change_alt_frame(
        &mut self,
        frame: AltFrame,
        origin: &Location,
        terrain: Option<&dyn TerrainProvider>
    ) -> Result<(), LocationError> {
        self.alt_cm = self.alt_cm_in_frame(frame, origin, terrain)?;
        self.frame = frame;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Ratio of the length of a degree of longitude to a degree of latitude at the
/// given latitude.
fn longitude_scale(lat: i32) -> f64 {
    let scale = (lat as f64 * 1.0e-7).to_radians().cos();
    scale.max(0.01)
}

/// Difference between two longitudes accounting for the antimeridian.
fn diff_longitude(lng_1: i32, lng_2: i32) -> i64 {
    let mut dlng = lng_1 as i64 - lng_2 as i64;
    if dlng > 1_800_000_000 {
        dlng -= 3_600_000_000;
    }
    else if dlng < -1_800_000_000 {
        dlng += 3_600_000_000;
    }
    dlng
}

fn wrap_longitude(lng: i64) -> i32 {
    if lng > 1_800_000_000 {
        (lng - 3_600_000_000) as i32
    }
    else if lng < -1_800_000_000 {
        (lng + 3_600_000_000) as i32
    }
    else {
        lng as i32
    }
}
