use std::path::{Path, PathBuf};

use serde_yaml::{Mapping, Value};

use super::yaml::load_yaml;

#[derive(Debug, Clone, PartialEq)]
pub struct HostConfig {
    pub debug: bool,
    pub log_level: String,
    pub settings: HostSettings,
    pub wallpaper: Option<WallpaperSelection>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct HostSettings {
    pub placeholder: PlaceholderSettings,
    pub interactions: InteractionSettings,
    pub runtime: RuntimeSettings,
    pub watcher: WatcherSettings,
    pub development: DevelopmentSettings,
}

/// Upper bound for the placeholder frame timestamp.
pub const MAX_FRAME_TIME_SECS: f64 = 3600.0;

#[derive(Debug, Clone, PartialEq)]
pub struct PlaceholderSettings {
    pub enabled: bool,
    pub frame_time_secs: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InteractionSettings {
    pub send_move: bool,
    pub send_click: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeSettings {
    pub tick_sleep_ms: u64,
    pub display_check_interval_ms: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WatcherSettings {
    pub enabled: bool,
    pub interval_ms: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DevelopmentSettings {
    pub debug: bool,
    pub log_level: String,
}

/// The wallpaper the host should display: a directory holding `project.json`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WallpaperSelection {
    pub directory: PathBuf,
}

impl Default for PlaceholderSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            frame_time_secs: 1.0,
        }
    }
}

impl Default for InteractionSettings {
    fn default() -> Self {
        Self {
            send_move: true,
            send_click: true,
        }
    }
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            tick_sleep_ms: 8,
            display_check_interval_ms: 2000,
        }
    }
}

impl Default for WatcherSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: 600,
        }
    }
}

impl Default for DevelopmentSettings {
    fn default() -> Self {
        Self {
            debug: false,
            log_level: "warn".to_string(),
        }
    }
}

impl Default for HostConfig {
    fn default() -> Self {
        let settings = HostSettings::default();
        Self {
            debug: settings.development.debug,
            log_level: settings.development.log_level.clone(),
            settings,
            wallpaper: None,
        }
    }
}

impl HostConfig {
    pub fn load(path: &Path) -> Option<Self> {
        let value = load_yaml(path)?;
        Self::from_yaml(&value)
    }

    pub fn from_yaml(root: &Value) -> Option<Self> {
        let map = root.as_mapping()?;

        let settings = parse_settings(map);
        let wallpaper = mapping_at(map, "wallpaper").and_then(parse_wallpaper_selection);

        Some(Self {
            debug: settings.development.debug,
            log_level: settings.development.log_level.clone(),
            settings,
            wallpaper,
        })
    }
}

fn parse_wallpaper_selection(section: &Mapping) -> Option<WallpaperSelection> {
    if !bool_at(section, "enabled").unwrap_or(true) {
        return None;
    }

    let directory = str_any(section, &["directory", "path", "wallpaper_dir"])?.trim();
    if directory.is_empty() {
        return None;
    }

    Some(WallpaperSelection {
        directory: PathBuf::from(directory),
    })
}

fn parse_settings(root: &Mapping) -> HostSettings {
    let mut settings = HostSettings::default();

    settings.development.debug = bool_at(root, "debug").unwrap_or(settings.development.debug);
    settings.development.log_level = str_at(root, "log_level")
        .unwrap_or(&settings.development.log_level)
        .to_lowercase();

    let Some(settings_map) = mapping_at(root, "settings") else {
        return settings;
    };

    if let Some(placeholder) = mapping_at(settings_map, "placeholder") {
        settings.placeholder.enabled = bool_any(placeholder, &["enabled", "install_placeholder"])
            .unwrap_or(settings.placeholder.enabled);
        settings.placeholder.frame_time_secs =
            f64_any(placeholder, &["frame_time_secs", "frame_time", "timestamp_secs"])
                .filter(|v| v.is_finite())
                .map(|v| v.clamp(0.0, MAX_FRAME_TIME_SECS))
                .unwrap_or(settings.placeholder.frame_time_secs);
    }

    if let Some(interactions) = mapping_at(settings_map, "interactions") {
        settings.interactions.send_move = bool_any(
            interactions,
            &["send_move", "pointer_move", "cursor_move", "track_pointer"],
        )
        .unwrap_or(settings.interactions.send_move);
        settings.interactions.send_click = bool_any(
            interactions,
            &["send_click", "pointer_click", "cursor_click"],
        )
        .unwrap_or(settings.interactions.send_click);
    }

    if let Some(runtime) = mapping_at(settings_map, "runtime") {
        settings.runtime.tick_sleep_ms = u64_at(runtime, "tick_sleep_ms")
            .unwrap_or(settings.runtime.tick_sleep_ms)
            .max(1);
        settings.runtime.display_check_interval_ms =
            u64_any(runtime, &["display_check_interval_ms", "monitor_check_interval_ms"])
                .unwrap_or(settings.runtime.display_check_interval_ms)
                .max(250);
    }

    if let Some(watcher) = mapping_at(settings_map, "watcher") {
        settings.watcher.enabled = bool_any(watcher, &["enabled", "auto_reload", "live_reload"])
            .unwrap_or(settings.watcher.enabled);
        settings.watcher.interval_ms = u64_any(watcher, &["interval_ms", "check_interval_ms"])
            .unwrap_or(settings.watcher.interval_ms)
            .max(100);
    }

    if let Some(dev) = mapping_at(settings_map, "development") {
        settings.development.debug =
            bool_any(dev, &["debug", "debug_mode"]).unwrap_or(settings.development.debug);
        settings.development.log_level = str_any(dev, &["log_level", "logging"])
            .unwrap_or(&settings.development.log_level)
            .to_lowercase();
    }

    settings
}

fn bool_at(map: &Mapping, key: &str) -> Option<bool> {
    map.get(Value::String(key.to_string()))?.as_bool()
}

fn bool_any(map: &Mapping, keys: &[&str]) -> Option<bool> {
    keys.iter().find_map(|k| bool_at(map, k))
}

fn str_at<'a>(map: &'a Mapping, key: &str) -> Option<&'a str> {
    map.get(Value::String(key.to_string()))?.as_str()
}

fn str_any<'a>(map: &'a Mapping, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|k| str_at(map, k))
}

fn mapping_at<'a>(map: &'a Mapping, key: &str) -> Option<&'a Mapping> {
    map.get(Value::String(key.to_string()))?.as_mapping()
}

fn u64_at(map: &Mapping, key: &str) -> Option<u64> {
    map.get(Value::String(key.to_string()))?
        .as_i64()
        .and_then(|v| if v >= 0 { Some(v as u64) } else { None })
}

fn u64_any(map: &Mapping, keys: &[&str]) -> Option<u64> {
    keys.iter().find_map(|k| u64_at(map, k))
}

fn f64_at(map: &Mapping, key: &str) -> Option<f64> {
    map.get(Value::String(key.to_string()))?.as_f64()
}

fn f64_any(map: &Mapping, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|k| f64_at(map, k))
}
