// ~/src/data_loaders/yaml.rs

use std::{
    collections::HashMap,
    fs,
    path::Path,
    sync::{LazyLock, RwLock},
    time::{Duration, Instant},
};

use serde_yaml::Value;

/* =========================
   CONFIG CACHE
========================= */

static YAML_CACHE: LazyLock<RwLock<HashMap<String, (Value, Instant)>>> =
    LazyLock::new(|| RwLock::new(HashMap::new()));
const CACHE_TTL: Duration = Duration::from_secs(1);
const CACHE_CAPACITY: usize = 32;

/// YAML loader with a short per-file cache.
pub fn load_yaml(path: &Path) -> Option<Value> {
    let now = Instant::now();
    let key = path.to_string_lossy().to_string();

    if let Ok(cache) = YAML_CACHE.read() {
        if let Some((v, t)) = cache.get(&key) {
            if now.duration_since(*t) < CACHE_TTL {
                return Some(v.clone());
            }
        }
    }

    let txt = fs::read_to_string(path).ok()?;
    let v = parse_yaml(&txt)?;

    if let Ok(mut cache) = YAML_CACHE.write() {
        if cache.len() >= CACHE_CAPACITY {
            if let Some(oldest_key) = cache
                .iter()
                .min_by_key(|(_, (_, t))| *t)
                .map(|(k, _)| k.clone())
            {
                cache.remove(&oldest_key);
            }
        }
        cache.insert(key, (v.clone(), now));
    }

    Some(v)
}

pub fn parse_yaml(txt: &str) -> Option<Value> {
    serde_yaml::from_str(txt).ok()
}

/// Drops the cached copy so the next load hits the disk.
pub fn invalidate(path: &Path) {
    if let Ok(mut cache) = YAML_CACHE.write() {
        cache.remove(path.to_string_lossy().as_ref());
    }
}
