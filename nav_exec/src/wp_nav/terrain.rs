//! Terrain offset resolution
//!
//! Segments may be flown at an altitude above terrain rather than above the
//! world origin. The terrain offset is the altitude of the terrain below the
//! vehicle above the world origin, so that
//! `alt_above_origin = alt_above_terrain + offset`.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::warn;

// Internal
use super::{Params, WpNavError};
use crate::nav_io::{InertialNav, RangeFinder, TerrainProvider};

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Get the terrain offset at the vehicle's current position.
///
/// A fitted range finder is preferred when `params.rangefinder_use` is set,
/// and in that case an unhealthy reading is a failure: the terrain database
/// is not used as a fallback. Otherwise the terrain database is queried.
///
/// Units: centimeters
pub fn terrain_offset_cm(
    params: &Params,
    inav: &dyn InertialNav,
    rangefinder: Option<&dyn RangeFinder>,
    terrain: Option<&dyn TerrainProvider>
) -> Result<f64, WpNavError> {
    if let Some(rf) = rangefinder {
        if rf.available() && params.rangefinder_use {
            if rf.healthy() {
                return Ok(inav.altitude() - rf.alt_cm())
            }

            warn!("Range finder unhealthy, no terrain offset available");
            return Err(WpNavError::TerrainUnavailable)
        }
    }

    if let Some(t) = terrain {
        if let Some(height_m) = t.height_above_terrain_m(true) {
            return Ok(inav.altitude() - height_m * 100.0)
        }
    }

    warn!("No terrain data for the current position");
    Err(WpNavError::TerrainUnavailable)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::sim::SimWorld;
    use nalgebra::Vector3;

    #[test]
    fn test_rangefinder_preferred() {
        let mut world = SimWorld::new(Vector3::new(0.0, 0.0, 1500.0));
        world.terrain.ground_alt_cm = 300.0;
        world.terrain.rangefinder_available = true;
        world.sync();

        // The database disagrees with the range finder, which must win
        world.terrain.database_bias_cm = 50.0;

        let offset = terrain_offset_cm(
            &Params::default(), &world.vehicle, Some(&world.terrain), Some(&world.terrain)
        ).unwrap();
        assert!((offset - 300.0).abs() < 1e-9);
    }

    #[test]
    fn test_unhealthy_rangefinder_fails() {
        let mut world = SimWorld::new(Vector3::new(0.0, 0.0, 1500.0));
        world.terrain.rangefinder_available = true;
        world.terrain.rangefinder_healthy = false;
        world.sync();

        let res = terrain_offset_cm(
            &Params::default(), &world.vehicle, Some(&world.terrain), Some(&world.terrain)
        );
        assert!(matches!(res, Err(WpNavError::TerrainUnavailable)));
    }

    #[test]
    fn test_database_fallback() {
        let mut world = SimWorld::new(Vector3::new(0.0, 0.0, 1500.0));
        world.terrain.ground_alt_cm = 200.0;
        world.terrain.rangefinder_available = true;
        world.sync();

        // Range finder fitted but not to be used
        let params = Params { rangefinder_use: false, ..Params::default() };

        let offset = terrain_offset_cm(
            &params, &world.vehicle, Some(&world.terrain), Some(&world.terrain)
        ).unwrap();
        assert!((offset - 200.0).abs() < 1e-9);
    }

    #[test]
    fn test_no_source_fails() {
        let mut world = SimWorld::new(Vector3::new(0.0, 0.0, 1500.0));
        world.terrain.database_available = false;
        world.sync();

        assert!(terrain_offset_cm(&Params::default(), &world.vehicle, None, None).is_err());
        assert!(terrain_offset_cm(
            &Params::default(), &world.vehicle, Some(&world.terrain), Some(&world.terrain)
        ).is_err());
    }
}
