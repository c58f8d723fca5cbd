use std::{
    env,
    path::{Path, PathBuf},
};

#[cfg(windows)]
pub fn to_wstring(s: &str) -> Vec<u16> {
    use std::{ffi::OsStr, os::windows::ffi::OsStrExt};

    OsStr::new(s)
        .encode_wide()
        .chain(std::iter::once(0))
        .collect()
}

#[cfg(windows)]
pub fn from_wide_nul(buffer: &[u16]) -> String {
    let len = buffer.iter().position(|&c| c == 0).unwrap_or(buffer.len());
    String::from_utf16_lossy(&buffer[..len])
}

pub fn user_home_dir() -> Option<PathBuf> {
    env::var("USERPROFILE")
        .or_else(|_| env::var("HOME"))
        .map(PathBuf::from)
        .ok()
}

/// The canonical Sentinel root is always `~/.Sentinel/`.
/// Falls back to the executable's directory when no home can be resolved.
pub fn sentinel_root_dir() -> PathBuf {
    if let Some(home) = user_home_dir() {
        return home.join(".Sentinel");
    }

    env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
}

pub fn sentinel_addons_dir() -> PathBuf {
    sentinel_root_dir().join("Addons")
}

/// `%LOCALAPPDATA%\Sentinel\Caches`, or `~/.Sentinel/Caches` when the
/// per-user local app data folder is not defined.
pub fn user_caches_dir() -> PathBuf {
    match env::var("LOCALAPPDATA") {
        Ok(local) if !local.trim().is_empty() => PathBuf::from(local).join("Sentinel").join("Caches"),
        _ => sentinel_root_dir().join("Caches"),
    }
}

pub fn path_to_file_url(path: &Path) -> String {
    let normalized = path.to_string_lossy().replace('\\', "/");
    let trimmed = normalized.trim_start_matches('/');
    format!("file:///{trimmed}")
}
