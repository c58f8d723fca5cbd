// ~/src/bootstrap.rs

use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::{info, utility::sentinel_addons_dir, warn, ADDON_NAME};

pub const CONFIG_FILE_NAME: &str = "config.yaml";
pub const STATE_FILE_NAME: &str = "state.json";

const DEFAULT_CONFIG: &str = r#"# Wallpaper host configuration. Changes are picked up while running.
debug: false
log_level: warn

settings:
  placeholder:
    # Install a still frame of video wallpapers as the OS background.
    enabled: true
    frame_time_secs: 1.0
  interactions:
    send_move: true
    send_click: true
  runtime:
    tick_sleep_ms: 8
    display_check_interval_ms: 2000
  watcher:
    enabled: true
    interval_ms: 600
  development:
    debug: false
    log_level: warn

wallpaper:
  enabled: true
  # Folder containing project.json
  directory: ""
"#;

/// `~/.Sentinel/Addons/wallpaper-host/`
pub fn addon_dir() -> PathBuf {
    sentinel_addons_dir().join(ADDON_NAME)
}

pub fn config_path() -> PathBuf {
    addon_dir().join(CONFIG_FILE_NAME)
}

pub fn state_path() -> PathBuf {
    addon_dir().join(STATE_FILE_NAME)
}

/// Creates the addon directory and a default `config.yaml` if missing.
pub fn bootstrap_addon() {
    let dir = addon_dir();
    if let Err(e) = fs::create_dir_all(&dir) {
        warn!("[{}] Failed to create {}: {e}", ADDON_NAME, dir.display());
        return;
    }
    scaffold_config_yaml(&dir);
}

/// Returns `true` when a new file was written.
pub fn scaffold_config_yaml(dir: &Path) -> bool {
    let path = dir.join(CONFIG_FILE_NAME);
    if path.exists() {
        return false;
    }

    match fs::write(&path, DEFAULT_CONFIG) {
        Ok(_) => {
            info!("[{}] Created {}", ADDON_NAME, path.display());
            true
        }
        Err(e) => {
            warn!("[{}] Failed to create {}: {e}", ADDON_NAME, path.display());
            false
        }
    }
}
