// ~/src/data_loaders/project.rs

use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::Deserialize;

use crate::errors::{HostError, Result};

pub const PROJECT_FILE_NAME: &str = "project.json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectKind {
    Video,
    Web,
    Image,
    Scene,
    Other(String),
}

impl ProjectKind {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "video" => Self::Video,
            "web" => Self::Web,
            "image" => Self::Image,
            "scene" => Self::Scene,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Video => "video",
            Self::Web => "web",
            Self::Image => "image",
            Self::Scene => "scene",
            Self::Other(name) => name,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawProject {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    file: String,
    #[serde(default)]
    title: Option<String>,
}

/// A wallpaper asset on disk. Never mutated after loading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WallpaperProject {
    pub kind: ProjectKind,
    pub file: String,
    pub directory: PathBuf,
    pub title: Option<String>,
}

impl WallpaperProject {
    #[cfg(test)]
    pub fn new(kind: ProjectKind, file: impl Into<String>, directory: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            file: file.into(),
            directory: directory.into(),
            title: None,
        }
    }

    /// Reads `<directory>/project.json`.
    pub fn load(directory: &Path) -> Result<Self> {
        let manifest = directory.join(PROJECT_FILE_NAME);
        let raw = fs::read_to_string(&manifest).map_err(|e| HostError::io(&manifest, e))?;
        Self::from_json(&raw, directory)
    }

    pub fn from_json(raw: &str, directory: &Path) -> Result<Self> {
        let parsed: RawProject = serde_json::from_str(raw)?;

        if parsed.kind.trim().is_empty() {
            return Err(HostError::Project(format!(
                "{} has no 'type'",
                directory.join(PROJECT_FILE_NAME).display()
            )));
        }
        if parsed.file.trim().is_empty() {
            return Err(HostError::Project(format!(
                "{} has no 'file'",
                directory.join(PROJECT_FILE_NAME).display()
            )));
        }

        Ok(Self {
            kind: ProjectKind::parse(&parsed.kind),
            file: parsed.file,
            directory: directory.to_path_buf(),
            title: parsed.title,
        })
    }

    pub fn asset_path(&self) -> PathBuf {
        self.directory.join(&self.file)
    }

    pub fn display_name(&self) -> String {
        match &self.title {
            Some(title) if !title.trim().is_empty() => title.clone(),
            _ => self
                .directory
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| self.file.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_wallpaper_engine_manifest() {
        let dir = Path::new("/walls/rain");
        let project = WallpaperProject::from_json(
            r#"{"type":"Video","file":"rain.mp4","title":"Rainy window","tags":["Nature"]}"#,
            dir,
        )
        .unwrap();

        assert_eq!(project.kind, ProjectKind::Video);
        assert_eq!(project.file, "rain.mp4");
        assert_eq!(project.asset_path(), dir.join("rain.mp4"));
        assert_eq!(project.display_name(), "Rainy window");
    }

    #[test]
    fn unknown_types_are_preserved() {
        let project =
            WallpaperProject::from_json(r#"{"type":"application","file":"a.exe"}"#, Path::new("/w/app"))
                .unwrap();
        assert_eq!(project.kind, ProjectKind::Other("application".to_string()));
        assert_eq!(project.kind.as_str(), "application");
        assert_eq!(project.display_name(), "app");
    }

    #[test]
    fn missing_fields_are_rejected() {
        assert!(matches!(
            WallpaperProject::from_json(r#"{"file":"a.mp4"}"#, Path::new("/w")),
            Err(HostError::Project(_))
        ));
        assert!(matches!(
            WallpaperProject::from_json(r#"{"type":"web"}"#, Path::new("/w")),
            Err(HostError::Project(_))
        ));
        assert!(matches!(
            WallpaperProject::from_json("not json", Path::new("/w")),
            Err(HostError::Json(_))
        ));
    }
}
