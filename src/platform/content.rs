// What the embedded renderer loads, and what it is sent.

use std::path::{Path, PathBuf};

use serde_json::json;

use crate::{
    data_loaders::project::{ProjectKind, WallpaperProject},
    errors::{HostError, Result},
    event_router::{ForwardedKind, PointerEvent, RawEventKind},
    geometry::ScreenRect,
    placeholder::placeholder_file_name,
    utility::path_to_file_url,
};

/// Where the renderer navigates for `project`.
pub enum RendererTarget {
    /// The project's own page.
    Url(String),
    /// A generated page that must be written to `path` first.
    Page { path: PathBuf, html: String },
}

impl RendererTarget {
    pub fn url(&self) -> String {
        match self {
            Self::Url(url) => url.clone(),
            Self::Page { path, .. } => path_to_file_url(path),
        }
    }
}

pub fn renderer_target(project: &WallpaperProject, caches_dir: &Path) -> Result<RendererTarget> {
    let asset_url = path_to_file_url(&project.asset_path());

    let body = match project.kind {
        ProjectKind::Web => return Ok(RendererTarget::Url(asset_url)),
        ProjectKind::Video => format!(
            r#"<video src="{}" autoplay loop muted playsinline></video>"#,
            escape_attr(&asset_url)
        ),
        ProjectKind::Image => format!(r#"<img src="{}" alt="">"#, escape_attr(&asset_url)),
        ProjectKind::Scene | ProjectKind::Other(_) => {
            return Err(HostError::Project(format!(
                "'{}' wallpapers cannot be rendered ({})",
                project.kind.as_str(),
                project.display_name()
            )));
        }
    };

    let stem = placeholder_file_name(&project.directory)
        .replace(crate::state_store::PLACEHOLDER_MARKER, "renderer")
        .replace(".tiff", ".html");

    Ok(RendererTarget::Page {
        path: caches_dir.join(stem),
        html: format!(
            "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><style>\
             html,body{{margin:0;height:100%;overflow:hidden;background:#000}}\
             video,img{{width:100%;height:100%;object-fit:cover;display:block}}\
             </style></head><body>{body}</body></html>\n"
        ),
    })
}

fn escape_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// JSON web message for a forwarded pointer event. Coordinates are local to
/// `frame`, plus the same position normalized to `0..=1`.
pub fn pointer_payload(kind: ForwardedKind, event: &PointerEvent, frame: ScreenRect) -> String {
    let kind_name = match kind {
        ForwardedKind::Move => "pointer_move",
        ForwardedKind::Enter => "pointer_enter",
        ForwardedKind::Exit => "pointer_exit",
        ForwardedKind::Up => "pointer_up",
        ForwardedKind::Down => "pointer_down",
        ForwardedKind::Drag => "pointer_drag",
    };
    let button = match event.kind {
        RawEventKind::LeftMouseDown | RawEventKind::LeftMouseUp | RawEventKind::LeftMouseDragged => {
            Some("left")
        }
        RawEventKind::RightMouseDown | RawEventKind::RightMouseUp | RawEventKind::RightMouseDragged => {
            Some("right")
        }
        _ => None,
    };
    let (x, y, nx, ny) = frame.local(event.position);

    json!({
        "type": kind_name,
        "x": x,
        "y": y,
        "nx": nx,
        "ny": ny,
        "button": button,
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::*;
    use crate::geometry::ScreenPoint;

    #[test]
    fn web_projects_load_their_own_page() {
        let project = WallpaperProject::new(ProjectKind::Web, "index.html", "/walls/aurora");
        let target = renderer_target(&project, Path::new("/caches")).unwrap();
        assert!(matches!(target, RendererTarget::Url(_)));
        assert_eq!(target.url(), "file:///walls/aurora/index.html");
    }

    #[test]
    fn video_projects_get_a_generated_page_in_the_caches() {
        let project = WallpaperProject::new(ProjectKind::Video, "rain & fog.mp4", "/walls/rain");
        let RendererTarget::Page { path, html } = renderer_target(&project, Path::new("/caches")).unwrap()
        else {
            panic!("expected a generated page");
        };

        assert_eq!(path.parent(), Some(Path::new("/caches")));
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("renderer_") && name.ends_with(".html"), "{name}");
        assert!(html.contains(r#"<video src="file:///walls/rain/rain &amp; fog.mp4""#));
        assert!(html.contains("loop"));
    }

    #[test]
    fn scene_projects_are_rejected() {
        let project = WallpaperProject::new(ProjectKind::Scene, "scene.pkg", "/walls/s");
        assert!(matches!(
            renderer_target(&project, Path::new("/caches")),
            Err(HostError::Project(_))
        ));
    }

    #[test]
    fn payload_carries_local_and_normalized_position() {
        let frame = ScreenRect::new(100, 0, 500, 200);
        let event = PointerEvent::new(RawEventKind::RightMouseDragged, ScreenPoint::new(300, 50));
        let payload: Value = serde_json::from_str(&pointer_payload(ForwardedKind::Drag, &event, frame)).unwrap();

        assert_eq!(payload["type"], "pointer_drag");
        assert_eq!(payload["x"], 200);
        assert_eq!(payload["y"], 50);
        assert_eq!(payload["nx"], 0.5);
        assert_eq!(payload["ny"], 0.25);
        assert_eq!(payload["button"], "right");

        let moved = PointerEvent::new(RawEventKind::MouseMoved, ScreenPoint::new(100, 0));
        let payload: Value = serde_json::from_str(&pointer_payload(ForwardedKind::Move, &moved, frame)).unwrap();
        assert_eq!(payload["type"], "pointer_move");
        assert!(payload["button"].is_null());
    }
}
