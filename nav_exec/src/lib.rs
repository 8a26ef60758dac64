//! # Navigation library.
//!
//! This library allows other crates in the workspace to access items defined inside the
//! navigation crate.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Geodetic locations and their conversion into vectors from the world origin
pub mod location;

/// Collaborator interfaces - the estimators and controllers the navigation core reads and drives
pub mod nav_io;

/// Simulated vehicle - a kinematic stand-in for the collaborators, used for testing
pub mod sim;

/// Waypoint navigation - advances an intermediate target along straight and spline segments
pub mod wp_nav;
