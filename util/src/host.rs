//! Host platform utility functions

use std::env;
use std::path::PathBuf;

/// Environment variable pointing at the root of the navigation software tree.
pub const SW_ROOT_ENV_VAR: &str = "WPNAV_SW_ROOT";

/// Get the root directory of the software tree.
///
/// The root is read from `WPNAV_SW_ROOT`. Parameter files live in
/// `<root>/params` and sessions are created beneath the root.
pub fn get_wpnav_sw_root() -> Result<PathBuf, env::VarError> {
    env::var(SW_ROOT_ENV_VAR).map(PathBuf::from)
}
