// ~/src/state_store.rs
//
// Keeps the user's real desktop background recoverable across host runs.

use std::{
    fs,
    path::{Path, PathBuf},
    rc::Rc,
};

use serde_json::{Map, Value};

use crate::{
    errors::{HostError, Result},
    error, info, warn, DEBUG_NAME,
};

/// Preference key holding the background to restore at shutdown.
pub const BACKGROUND_KEY: &str = "OSWallpaper";

/// File-name marker carried by every placeholder the host generates.
pub const PLACEHOLDER_MARKER: &str = "staticWP";

/// The OS desktop background setting of the primary display.
pub trait DesktopBackground {
    /// `Ok(None)` when the OS reports no background image (solid color).
    fn current(&self) -> Result<Option<String>>;
    fn set(&self, url: &str) -> Result<()>;
}

/// Durable string key-value preferences.
pub trait PreferenceStore {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
}

pub fn is_placeholder_name(url: &str) -> bool {
    let file_name = url
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or(url);
    file_name.contains(PLACEHOLDER_MARKER)
}

/// Picks the value to persist given what is stored and what the OS reports.
///
/// A stored placeholder is kept only while the OS is itself showing a
/// (different) placeholder: that one was installed by an earlier run and never
/// cleared, so the stored value still names what the user had. Any
/// non-placeholder OS value is the user's own choice and wins.
pub fn resolve_persisted_background(
    stored: Option<&str>,
    os_background: &str,
    is_placeholder: impl Fn(&str) -> bool,
) -> String {
    match stored {
        Some(stored)
            if stored != os_background && is_placeholder(stored) && is_placeholder(os_background) =>
        {
            stored.to_string()
        }
        _ => os_background.to_string(),
    }
}

pub struct WallpaperStateStore {
    prefs: Box<dyn PreferenceStore>,
    background: Rc<dyn DesktopBackground>,
}

impl WallpaperStateStore {
    pub fn new(prefs: Box<dyn PreferenceStore>, background: Rc<dyn DesktopBackground>) -> Self {
        Self { prefs, background }
    }

    pub fn stored(&self) -> Option<String> {
        self.prefs.get(BACKGROUND_KEY)
    }

    /// Runs once at startup, before the desktop window exists.
    /// Returns the value persisted afterwards, if any.
    pub fn capture_if_needed(&self) -> Option<String> {
        let stored = self.stored();

        let os_background = match self.background.current() {
            Ok(Some(url)) if !url.trim().is_empty() => url,
            Ok(_) => {
                warn!(
                    "[{}][STATE] OS reports no desktop background; keeping stored value {:?}",
                    DEBUG_NAME, stored
                );
                return stored;
            }
            Err(e) => {
                warn!(
                    "[{}][STATE] Failed to read OS desktop background: {}; keeping stored value {:?}",
                    DEBUG_NAME, e, stored
                );
                return stored;
            }
        };

        let resolved =
            resolve_persisted_background(stored.as_deref(), &os_background, is_placeholder_name);

        if let Err(e) = self.prefs.set(BACKGROUND_KEY, &resolved) {
            error!("[{}][STATE] Failed to persist '{}': {}", DEBUG_NAME, resolved, e);
            return stored;
        }

        info!(
            "[{}][STATE] stored={:?} os='{}' -> persisted='{}'",
            DEBUG_NAME, stored, os_background, resolved
        );
        Some(resolved)
    }

    /// Best-effort: the process is exiting either way.
    pub fn restore(&self) -> bool {
        let Some(original) = self.stored() else {
            info!("[{}][STATE] Nothing persisted; leaving desktop background as is", DEBUG_NAME);
            return false;
        };

        match self.background.set(&original) {
            Ok(()) => {
                info!("[{}][STATE] Restored desktop background '{}'", DEBUG_NAME, original);
                true
            }
            Err(e) => {
                error!(
                    "[{}][STATE] Failed to restore desktop background '{}': {}",
                    DEBUG_NAME, original, e
                );
                false
            }
        }
    }
}

/// Preferences kept as a flat JSON object on disk.
pub struct JsonPreferenceStore {
    path: PathBuf,
}

impl JsonPreferenceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn read_all(&self) -> Map<String, Value> {
        let Ok(raw) = fs::read_to_string(&self.path) else {
            return Map::new();
        };

        match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Object(map)) => map,
            Ok(_) | Err(_) => {
                warn!(
                    "[{}][STATE] {} is not a JSON object; starting from empty preferences",
                    DEBUG_NAME,
                    self.path.display()
                );
                Map::new()
            }
        }
    }
}

impl PreferenceStore for JsonPreferenceStore {
    fn get(&self, key: &str) -> Option<String> {
        self.read_all()
            .get(key)
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut all = self.read_all();
        all.insert(key.to_string(), Value::String(value.to_string()));
        let bytes = serde_json::to_vec_pretty(&Value::Object(all))?;
        write_atomic(&self.path, &bytes)
    }
}

/// Writes through a sibling temp file and renames it over `path`.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| HostError::io(parent, e))?;
    }

    let mut tmp_name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);

    fs::write(&tmp, bytes).map_err(|e| HostError::io(&tmp, e))?;
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(HostError::io(path, e));
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod testing {
    use std::{cell::RefCell, collections::HashMap};

    use super::*;

    #[derive(Default)]
    pub struct MemoryPreferenceStore {
        pub values: RefCell<HashMap<String, String>>,
    }

    impl MemoryPreferenceStore {
        pub fn with(key: &str, value: &str) -> Self {
            let store = Self::default();
            store.values.borrow_mut().insert(key.to_string(), value.to_string());
            store
        }
    }

    impl PreferenceStore for Rc<MemoryPreferenceStore> {
        fn get(&self, key: &str) -> Option<String> {
            self.values.borrow().get(key).cloned()
        }

        fn set(&self, key: &str, value: &str) -> Result<()> {
            self.values.borrow_mut().insert(key.to_string(), value.to_string());
            Ok(())
        }
    }

    /// Records every `set` call; `current` reports the last value set.
    #[derive(Default)]
    pub struct FakeBackground {
        pub current: RefCell<Option<String>>,
        pub set_calls: RefCell<Vec<String>>,
        pub fail_set: bool,
        pub fail_current: bool,
    }

    impl FakeBackground {
        pub fn showing(url: &str) -> Self {
            Self {
                current: RefCell::new(Some(url.to_string())),
                ..Default::default()
            }
        }
    }

    impl DesktopBackground for FakeBackground {
        fn current(&self) -> Result<Option<String>> {
            if self.fail_current {
                return Err(HostError::Platform("SPI_GETDESKWALLPAPER failed".to_string()));
            }
            Ok(self.current.borrow().clone())
        }

        fn set(&self, url: &str) -> Result<()> {
            self.set_calls.borrow_mut().push(url.to_string());
            if self.fail_set {
                return Err(HostError::Platform("SPI_SETDESKWALLPAPER refused".to_string()));
            }
            *self.current.borrow_mut() = Some(url.to_string());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{FakeBackground, MemoryPreferenceStore};
    use super::*;

    fn store_with(
        prefs: MemoryPreferenceStore,
        background: FakeBackground,
    ) -> (WallpaperStateStore, Rc<MemoryPreferenceStore>, Rc<FakeBackground>) {
        let prefs = Rc::new(prefs);
        let background = Rc::new(background);
        let store = WallpaperStateStore::new(Box::new(prefs.clone()), background.clone());
        (store, prefs, background)
    }

    #[test]
    fn placeholder_marker_is_matched_on_file_name_only() {
        assert!(is_placeholder_name("/Caches/staticWP_42.tiff"));
        assert!(is_placeholder_name(r"C:\Users\me\AppData\Local\Sentinel\Caches\staticWP_9.tiff"));
        assert!(!is_placeholder_name("/staticWP/wallpapers/b.jpg"));
        assert!(!is_placeholder_name("/Pictures/a.jpg"));
    }

    #[test]
    fn decision_rule_covers_all_cases() {
        let marker = is_placeholder_name;
        assert_eq!(resolve_persisted_background(None, "/a.jpg", marker), "/a.jpg");
        assert_eq!(resolve_persisted_background(Some("/a.jpg"), "/a.jpg", marker), "/a.jpg");
        assert_eq!(
            resolve_persisted_background(Some("/C/staticWP_1.tiff"), "/C/staticWP_2.tiff", marker),
            "/C/staticWP_1.tiff"
        );
        assert_eq!(
            resolve_persisted_background(Some("/C/staticWP_1.tiff"), "/Pictures/b.jpg", marker),
            "/Pictures/b.jpg"
        );
        assert_eq!(resolve_persisted_background(Some("/old.jpg"), "/new.jpg", marker), "/new.jpg");
    }

    #[test]
    fn decision_rule_uses_the_supplied_predicate() {
        assert_eq!(
            resolve_persisted_background(Some("/keep.jpg"), "/os.jpg", |_| true),
            "/keep.jpg"
        );
        assert_eq!(
            resolve_persisted_background(Some("/C/staticWP_1.tiff"), "/C/staticWP_2.tiff", |_| false),
            "/C/staticWP_2.tiff"
        );
    }

    #[test]
    fn first_run_persists_os_background() {
        let (store, prefs, _) =
            store_with(MemoryPreferenceStore::default(), FakeBackground::showing("/Pictures/a.jpg"));

        assert_eq!(store.capture_if_needed().as_deref(), Some("/Pictures/a.jpg"));
        assert_eq!(prefs.get(BACKGROUND_KEY).as_deref(), Some("/Pictures/a.jpg"));
    }

    #[test]
    fn capture_is_idempotent() {
        let (store, prefs, _) =
            store_with(MemoryPreferenceStore::default(), FakeBackground::showing("/Pictures/a.jpg"));

        let first = store.capture_if_needed();
        let second = store.capture_if_needed();
        assert_eq!(first, second);
        assert_eq!(prefs.get(BACKGROUND_KEY), first);
    }

    #[test]
    fn stale_placeholder_in_store_wins_over_differing_os_value() {
        let (store, prefs, _) = store_with(
            MemoryPreferenceStore::with(BACKGROUND_KEY, "/Caches/staticWP_123.tiff"),
            FakeBackground::showing("/Caches/staticWP_456.tiff"),
        );

        assert_eq!(store.capture_if_needed().as_deref(), Some("/Caches/staticWP_123.tiff"));
        assert_eq!(prefs.get(BACKGROUND_KEY).as_deref(), Some("/Caches/staticWP_123.tiff"));
    }

    #[test]
    fn placeholder_left_installed_after_crash_stays_persisted() {
        let (store, prefs, _) = store_with(
            MemoryPreferenceStore::with(BACKGROUND_KEY, "/Caches/staticWP_42.tiff"),
            FakeBackground::showing("/Caches/staticWP_42.tiff"),
        );

        assert_eq!(store.capture_if_needed().as_deref(), Some("/Caches/staticWP_42.tiff"));
        assert_eq!(prefs.get(BACKGROUND_KEY).as_deref(), Some("/Caches/staticWP_42.tiff"));
    }

    #[test]
    fn user_change_since_last_run_is_trusted() {
        let (store, prefs, _) = store_with(
            MemoryPreferenceStore::with(BACKGROUND_KEY, "/Caches/staticWP_42.tiff"),
            FakeBackground::showing("/Pictures/b.jpg"),
        );

        assert_eq!(store.capture_if_needed().as_deref(), Some("/Pictures/b.jpg"));
        assert_eq!(prefs.get(BACKGROUND_KEY).as_deref(), Some("/Pictures/b.jpg"));
    }

    #[test]
    fn changed_real_background_replaces_stored_one() {
        let (store, prefs, _) = store_with(
            MemoryPreferenceStore::with(BACKGROUND_KEY, "/Pictures/old.jpg"),
            FakeBackground::showing("/Pictures/new.jpg"),
        );

        assert_eq!(store.capture_if_needed().as_deref(), Some("/Pictures/new.jpg"));
        assert_eq!(prefs.get(BACKGROUND_KEY).as_deref(), Some("/Pictures/new.jpg"));
    }

    #[test]
    fn missing_os_background_keeps_stored_value() {
        let (store, prefs, _) = store_with(
            MemoryPreferenceStore::with(BACKGROUND_KEY, "/Pictures/a.jpg"),
            FakeBackground::default(),
        );

        assert_eq!(store.capture_if_needed().as_deref(), Some("/Pictures/a.jpg"));
        assert_eq!(prefs.get(BACKGROUND_KEY).as_deref(), Some("/Pictures/a.jpg"));
    }

    #[test]
    fn unreadable_os_background_leaves_store_untouched() {
        let background = FakeBackground {
            fail_current: true,
            ..FakeBackground::showing("/C/staticWP_1.tiff")
        };
        let (store, prefs, _) = store_with(
            MemoryPreferenceStore::with(BACKGROUND_KEY, "/Pictures/a.jpg"),
            background,
        );

        assert_eq!(store.capture_if_needed().as_deref(), Some("/Pictures/a.jpg"));
        assert_eq!(prefs.get(BACKGROUND_KEY).as_deref(), Some("/Pictures/a.jpg"));

        let (store, prefs, _) = store_with(
            MemoryPreferenceStore::default(),
            FakeBackground {
                fail_current: true,
                ..Default::default()
            },
        );
        assert_eq!(store.capture_if_needed(), None);
        assert_eq!(prefs.get(BACKGROUND_KEY), None);
    }

    #[test]
    fn restore_sets_persisted_value_exactly_once() {
        let (store, _, background) = store_with(
            MemoryPreferenceStore::with(BACKGROUND_KEY, "/Pictures/a.jpg"),
            FakeBackground::showing("/Caches/staticWP_1.tiff"),
        );

        assert!(store.restore());
        assert_eq!(*background.set_calls.borrow(), vec!["/Pictures/a.jpg".to_string()]);
    }

    #[test]
    fn restore_without_persisted_value_is_silent() {
        let (store, _, background) =
            store_with(MemoryPreferenceStore::default(), FakeBackground::showing("/a.jpg"));

        assert!(!store.restore());
        assert!(background.set_calls.borrow().is_empty());
    }

    #[test]
    fn restore_failure_is_swallowed() {
        let background = FakeBackground {
            fail_set: true,
            ..FakeBackground::showing("/Caches/staticWP_1.tiff")
        };
        let (store, _, background) =
            store_with(MemoryPreferenceStore::with(BACKGROUND_KEY, "/Pictures/a.jpg"), background);

        assert!(!store.restore());
        assert_eq!(background.set_calls.borrow().len(), 1);
    }

    #[test]
    fn json_store_round_trips_and_keeps_other_keys() {
        let dir = std::env::temp_dir().join(format!("sentinel-prefs-{}", std::process::id()));
        let path = dir.join("state.json");
        let _ = fs::remove_file(&path);

        let store = JsonPreferenceStore::new(&path);
        assert_eq!(store.get(BACKGROUND_KEY), None);

        store.set("other", "value").unwrap();
        store.set(BACKGROUND_KEY, r"C:\Pictures\a.jpg").unwrap();

        let reopened = JsonPreferenceStore::new(&path);
        assert_eq!(reopened.get(BACKGROUND_KEY).as_deref(), Some(r"C:\Pictures\a.jpg"));
        assert_eq!(reopened.get("other").as_deref(), Some("value"));
        assert!(!dir.join("state.json.tmp").exists());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn json_store_tolerates_corrupt_file() {
        let dir = std::env::temp_dir().join(format!("sentinel-prefs-bad-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("state.json");
        fs::write(&path, "[1, 2").unwrap();

        let store = JsonPreferenceStore::new(&path);
        assert_eq!(store.get(BACKGROUND_KEY), None);
        store.set(BACKGROUND_KEY, "/a.jpg").unwrap();
        assert_eq!(store.get(BACKGROUND_KEY).as_deref(), Some("/a.jpg"));

        let _ = fs::remove_dir_all(&dir);
    }
}
