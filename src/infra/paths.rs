// src/infra/paths.rs — Config file location
//
// PAGEPULSE_HOME overrides everything. Otherwise the platform config
// directory is used (e.g. ~/.config/pagepulse on Linux).

use directories::ProjectDirs;
use std::path::PathBuf;

fn pagepulse_home() -> Option<PathBuf> {
    std::env::var_os("PAGEPULSE_HOME").map(PathBuf::from)
}

/// Configuration directory, or `None` when no home directory can be found.
pub fn config_dir() -> Option<PathBuf> {
    if let Some(home) = pagepulse_home() {
        return Some(home);
    }
    ProjectDirs::from("", "", "pagepulse").map(|dirs| dirs.config_dir().to_path_buf())
}

/// Config file path
pub fn config_file_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("config.toml"))
}
