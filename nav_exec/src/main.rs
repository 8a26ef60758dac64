//! Waypoint navigation executable entry point.
//!
//! Flies a mission against the simulated vehicle, running the navigation core
//! exactly as a flight controller would:
//!
//!     - Initialise the session, logging and parameters
//!     - For each mission item:
//!         - Set the segment destination
//!         - Update the navigation core and step the vehicle every control
//!           cycle until the destination is reached
//!     - Write a summary of the flight to the session directory
//!
//! Usage: `nav_exec [mission.toml]`, where the mission file path is relative
//! to the parameters directory.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use color_eyre::{eyre::{eyre, WrapErr}, Report};
use log::{debug, info, warn};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::env;

// Internal
use nav_lib::{
    location::{AltFrame, Location},
    sim::{SimParams, SimWorld},
    wp_nav::{SplineSegmentEnd, WpNav}
};
use util::{
    logger::{logger_init, LevelFilter},
    session::Session
};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

const DEFAULT_MISSION: &str = "mission.toml";

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A mission to fly.
#[derive(Debug, Deserialize)]
struct Mission {
    #[serde(default)]
    sim: SimParams,

    /// Starting position of the vehicle relative to the world origin.
    ///
    /// Units: meters, Frame: NEU
    #[serde(default)]
    start_m: [f64; 3],

    /// Maximum time allowed to reach each item's destination.
    ///
    /// Units: seconds
    item_timeout_s: f64,

    items: Vec<MissionItem>
}

#[derive(Debug, Clone, Deserialize)]
struct MissionItem {
    kind: ItemKind,

    /// Units: meters from the world origin
    north_m: f64,
    east_m: f64,

    /// Altitude above the world origin, or above terrain if `terrain_alt` is
    /// set.
    ///
    /// Units: meters
    alt_m: f64,

    #[serde(default)]
    terrain_alt: bool,

    /// Fly through a straight segment's destination without stopping.
    #[serde(default)]
    fast: bool,

    /// New horizontal speed to request for this item.
    speed_cms: Option<f64>
}

#[derive(Debug, Copy, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
enum ItemKind {
    Straight,
    Spline
}

/// Outcome of a single mission item.
#[derive(Debug, Serialize)]
struct ItemSummary {
    index: usize,
    kind: ItemKind,
    reached: bool,
    duration_s: f64,

    /// Maximum horizontal and vertical track error seen.
    ///
    /// Units: centimeters
    max_track_error_xy_cm: f64,
    max_track_error_z_cm: f64,

    /// Distance from the vehicle to the destination on completion.
    ///
    /// Units: centimeters
    final_distance_cm: f64,

    final_yaw_cd: f64
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

fn main() -> Result<(), Report> {
    color_eyre::install()?;

    // ---- EARLY INITIALISATION ----

    let session = Session::new("nav_exec", "sessions")
        .wrap_err("Failed to create the session")?;

    logger_init(LevelFilter::Debug, LevelFilter::Debug, &session)
        .wrap_err("Failed to initialise logging")?;

    info!("Waypoint Navigation Executable\n");
    info!("Session directory: {:?}\n", session.session_root);

    // ---- LOAD PARAMETERS ----

    let args: Vec<String> = env::args().collect();
    let mission_path = match args.len() {
        1 => DEFAULT_MISSION,
        2 => args[1].as_str(),
        n => return Err(eyre!("Expected zero or one argument, found {}", n - 1))
    };

    let mission: Mission = util::params::load(mission_path)
        .wrap_err_with(|| format!("Could not load mission \"{}\"", mission_path))?;
    info!("Loaded mission \"{}\" with {} items", mission_path, mission.items.len());

    let start = Vector3::new(
        mission.start_m[0] * 100.0,
        mission.start_m[1] * 100.0,
        mission.start_m[2] * 100.0
    );
    let mut world = SimWorld::from_params(&mission.sim, start);

    let mut wp_nav = WpNav::init("wp_nav.toml", &world.ahrs)
        .wrap_err("Failed to initialise WpNav")?;
    info!("WpNav parameters: {:?}", wp_nav.params());

    wp_nav.wp_and_spline_init(&mut world.io());

    // ---- FLY ----

    let origin = world.ahrs.origin
        .ok_or_else(|| eyre!("The simulated world has no origin"))?;

    let mut summaries = Vec::with_capacity(mission.items.len());

    for (index, item) in mission.items.iter().enumerate() {
        let summary = fly_item(
            &mut world,
            &mut wp_nav,
            &origin,
            index,
            item,
            mission.items.get(index + 1),
            mission.item_timeout_s
        ).wrap_err_with(|| format!("Failed to fly mission item {}", index))?;

        if !summary.reached {
            warn!("Item {} timed out after {:.2} s", index, summary.duration_s);
        }
        summaries.push(summary);
    }

    // ---- SUMMARY ----

    let summary_json = serde_json::to_string_pretty(&summaries)
        .wrap_err("Failed to serialise the mission summary")?;

    let mut summary_path = session.session_root.clone();
    summary_path.push("summary.json");
    std::fs::write(&summary_path, &summary_json)
        .wrap_err("Failed to write the mission summary")?;

    info!("Mission summary written to {:?}", summary_path);
    info!("End of execution");

    Ok(())
}

/// Fly a single mission item until its destination is reached or the
/// timeout expires.
fn fly_item(
    world: &mut SimWorld,
    wp_nav: &mut WpNav,
    origin: &Location,
    index: usize,
    item: &MissionItem,
    next: Option<&MissionItem>,
    timeout_s: f64
) -> Result<ItemSummary, Report> {
    if let Some(speed) = item.speed_cms {
        wp_nav.set_speed_xy(speed);
    }

    let dest = item_location(origin, item);

    match item.kind {
        ItemKind::Straight => {
            wp_nav.set_wp_destination_location(&mut world.io(), &dest)?;
            wp_nav.set_fast_waypoint(item.fast);
        },
        ItemKind::Spline => {
            let seg_end = match next {
                Some(n) if n.kind == ItemKind::Spline => {
                    SplineSegmentEnd::Spline(item_location(origin, n))
                },
                Some(n) => SplineSegmentEnd::Straight(item_location(origin, n)),
                None => SplineSegmentEnd::Stop
            };
            wp_nav.set_spline_destination_location(&mut world.io(), &dest, index == 0, seg_end)?;
        }
    }

    info!(
        "Item {}: {:?} to {:.1} m N, {:.1} m E, {:.1} m",
        index, item.kind, item.north_m, item.east_m, item.alt_m
    );

    let dt = world.pos_control.dt;
    let max_cycles = (timeout_s / dt).ceil() as usize;

    let mut cycles = 0;
    let mut max_err_xy: f64 = 0.0;
    let mut max_err_z: f64 = 0.0;

    while !wp_nav.reached_destination() && cycles < max_cycles {
        match item.kind {
            ItemKind::Straight => wp_nav.update_wpnav(&mut world.io())?,
            ItemKind::Spline => wp_nav.update_spline(&mut world.io())?
        }
        world.step();

        max_err_xy = max_err_xy.max(wp_nav.track().track_error_xy_cm);
        max_err_z = max_err_z.max(wp_nav.track().track_error_z_cm);
        cycles += 1;
    }

    let summary = ItemSummary {
        index,
        kind: item.kind,
        reached: wp_nav.reached_destination(),
        duration_s: cycles as f64 * dt,
        max_track_error_xy_cm: max_err_xy,
        max_track_error_z_cm: max_err_z,
        final_distance_cm: wp_nav.wp_distance_to_destination(&world.io()),
        final_yaw_cd: wp_nav.yaw_cd(&world.ahrs)
    };

    debug!("Item {} summary: {:?}", index, summary);

    Ok(summary)
}

/// Convert a mission item into a location.
fn item_location(origin: &Location, item: &MissionItem) -> Location {
    let mut loc = Location::new(
        origin.lat,
        origin.lng,
        (item.alt_m * 100.0).round() as i32,
        if item.terrain_alt { AltFrame::AboveTerrain } else { AltFrame::AboveOrigin }
    );
    loc.offset(item.north_m, item.east_m);
    loc
}
