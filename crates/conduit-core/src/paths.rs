//! Default filesystem locations.

use std::env;
use std::path::PathBuf;

/// Return the user's home directory path.
///
/// Uses HOME on Unix-like systems and USERPROFILE on Windows.
pub fn get_home_dir() -> Option<PathBuf> {
    ["HOME", "USERPROFILE"]
        .into_iter()
        .filter_map(|key| env::var(key).ok())
        .find(|value| !value.is_empty())
        .map(PathBuf::from)
}

/// `~/.config/conduit`
pub fn config_dir() -> Option<PathBuf> {
    get_home_dir().map(|home| home.join(".config").join("conduit"))
}

/// `~/.config/conduit/config.json`
pub fn default_config_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("config.json"))
}
