// Builds off Windows: no desktop layer, so the host stops at startup with
// `NoPrimaryDisplay`. Keeps the crate and its tests building everywhere.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use image::RgbaImage;

use crate::{
    data_loaders::project::WallpaperProject,
    errors::{HostError, Result},
    event_router::{PointerEvent, PointerEventSource, PointerSink},
    geometry::ScreenRect,
    host::{DesktopSurface, HostEvent},
    placeholder::FrameDecoder,
    state_store::DesktopBackground,
};

fn unsupported<T>(what: &str) -> Result<T> {
    Err(HostError::Platform(format!("{what} is only available on Windows")))
}

pub fn init_ui_thread() {}

pub fn pump_messages() -> bool {
    false
}

pub fn set_event_handler(_handler: impl FnMut(HostEvent) + 'static) {}

/// No session notices to listen for.
pub struct SessionWindow;

impl SessionWindow {
    pub fn create() -> Result<Self> {
        Ok(Self)
    }
}

#[derive(Debug, Default)]
pub struct SystemBackground;

impl DesktopBackground for SystemBackground {
    fn current(&self) -> Result<Option<String>> {
        unsupported("Reading the desktop background")
    }

    fn set(&self, _url: &str) -> Result<()> {
        unsupported("Setting the desktop background")
    }
}

#[derive(Debug, Default)]
pub struct MediaFoundationDecoder;

impl FrameDecoder for MediaFoundationDecoder {
    fn decode_frame(&self, _asset: &Path, _at: Duration) -> Result<RgbaImage> {
        unsupported("Video frame decoding")
    }
}

#[derive(Debug, Default)]
pub struct LowLevelMouseSource;

impl LowLevelMouseSource {
    pub fn new() -> Self {
        Self
    }
}

impl PointerEventSource for LowLevelMouseSource {
    fn install(&mut self, _callback: Box<dyn FnMut(PointerEvent)>) -> Result<()> {
        unsupported("The global pointer monitor")
    }

    fn uninstall(&mut self) {}
}

pub struct DesktopWindow;

impl DesktopWindow {
    pub fn new(_caches_dir: impl Into<PathBuf>) -> Self {
        Self
    }
}

impl DesktopSurface for DesktopWindow {
    fn primary_display_frame(&self) -> Option<ScreenRect> {
        None
    }

    fn create_desktop_window(&mut self, _frame: ScreenRect) -> Result<()> {
        unsupported("The desktop window")
    }

    fn set_frame(&mut self, _frame: ScreenRect) -> Result<()> {
        unsupported("The desktop window")
    }

    fn embed_renderer(&mut self, _project: &WallpaperProject) -> Result<Box<dyn PointerSink>> {
        unsupported("The WebView2 renderer")
    }

    fn teardown_renderer(&mut self) {}

    fn order_front(&mut self) {}
}
