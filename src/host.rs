// ~/src/host.rs

use std::{rc::Rc, time::Duration};

use crate::{
    data_loaders::{config::HostConfig, project::WallpaperProject},
    debug,
    errors::{HostError, Result},
    error,
    event_router::{
        new_surface_slot, ForwardFilter, GlobalEventRouter, PointerEventSource, PointerSink,
        RenderSurfaceHandle, SurfaceSlot,
    },
    geometry::ScreenRect,
    info,
    placeholder::{GenerationToken, PlaceholderGenerator},
    state_store::WallpaperStateStore,
    warn, DEBUG_NAME,
};

const DEFAULT_FRAME_TIME: Duration = Duration::from_secs(1);

/// Platform side of the desktop-level window.
pub trait DesktopSurface {
    /// Full frame of the primary display, `None` if it cannot be resolved.
    fn primary_display_frame(&self) -> Option<ScreenRect>;

    /// Creates the borderless desktop-layer window covering `frame`.
    fn create_desktop_window(&mut self, frame: ScreenRect) -> Result<()>;

    fn set_frame(&mut self, frame: ScreenRect) -> Result<()>;

    /// Loads `project` into a fresh renderer inside the desktop window and
    /// returns the renderer's input surface.
    fn embed_renderer(&mut self, project: &WallpaperProject) -> Result<Box<dyn PointerSink>>;

    fn teardown_renderer(&mut self);

    fn order_front(&mut self);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveWallpaper {
    pub project: WallpaperProject,
    pub placeholder: Option<GenerationToken>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowRole {
    Desktop,
    /// Hidden top-level window that receives session and close notices.
    Session,
}

/// Notifications the platform windows deliver to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostEvent {
    WindowWillClose(WindowRole),
    /// Logoff, restart or shutdown has been requested.
    QueryEndSession,
    /// `ending` is false when the session end was cancelled.
    EndSession { ending: bool },
}

pub struct WallpaperWindowHost<D: DesktopSurface, S: PointerEventSource> {
    surface: D,
    state: WallpaperStateStore,
    placeholder: PlaceholderGenerator,
    router: GlobalEventRouter<S>,
    slot: SurfaceSlot,
    frame: Option<ScreenRect>,
    renderer_embedded: bool,
    shown: bool,
    show_pending: bool,
    active: Option<ActiveWallpaper>,
    stopped: bool,
}

impl<D: DesktopSurface, S: PointerEventSource> WallpaperWindowHost<D, S> {
    pub fn new(
        surface: D,
        state: WallpaperStateStore,
        placeholder: PlaceholderGenerator,
        source: S,
    ) -> Self {
        let slot = new_surface_slot();
        let router = GlobalEventRouter::new(source, Rc::new(RenderSurfaceHandle::new(&slot)));
        Self {
            surface,
            state,
            placeholder,
            router,
            slot,
            frame: None,
            renderer_embedded: false,
            shown: false,
            show_pending: false,
            active: None,
            stopped: false,
        }
    }

    #[cfg(test)]
    pub fn surface(&self) -> &D {
        &self.surface
    }

    pub fn active(&self) -> Option<&ActiveWallpaper> {
        self.active.as_ref()
    }

    #[cfg(test)]
    pub fn frame(&self) -> Option<ScreenRect> {
        self.frame
    }

    #[cfg(test)]
    pub fn is_shown(&self) -> bool {
        self.shown
    }

    #[cfg(test)]
    pub fn is_routing(&self) -> bool {
        self.router.is_running()
    }

    pub fn apply_settings(&mut self, config: &HostConfig) {
        let placeholder = &config.settings.placeholder;
        self.placeholder.set_enabled(placeholder.enabled);
        let frame_time = Duration::try_from_secs_f64(placeholder.frame_time_secs).unwrap_or_else(|_| {
            warn!(
                "[{}][HOST] Invalid placeholder frame time {}; using {:?}",
                DEBUG_NAME, placeholder.frame_time_secs, DEFAULT_FRAME_TIME
            );
            DEFAULT_FRAME_TIME
        });
        self.placeholder.set_frame_time(frame_time);

        self.router.set_filter(ForwardFilter {
            send_move: config.settings.interactions.send_move,
            send_click: config.settings.interactions.send_click,
        });
    }

    /// Startup sequence: remember the real background, bring up the desktop
    /// window with the renderer, show it, then start forwarding input.
    /// Only a missing primary display is an error.
    pub fn launch(&mut self, project: Option<WallpaperProject>) -> Result<()> {
        self.state.capture_if_needed();
        self.create_window(project)?;
        self.show();

        if let Err(e) = self.router.start() {
            error!("[{}][HOST] Pointer forwarding unavailable: {}", DEBUG_NAME, e);
        }
        Ok(())
    }

    pub fn create_window(&mut self, project: Option<WallpaperProject>) -> Result<()> {
        let frame = self
            .surface
            .primary_display_frame()
            .filter(|f| !f.is_empty())
            .ok_or(HostError::NoPrimaryDisplay)?;

        if self.frame.is_none() {
            info!(
                "[{}][HOST] Creating desktop window [l={},t={},r={},b={}]",
                DEBUG_NAME, frame.left, frame.top, frame.right, frame.bottom
            );
            self.surface.create_desktop_window(frame)?;
            self.frame = Some(frame);
            self.router.set_frame(frame);
        }

        match project {
            Some(project) => self.set_wallpaper(project),
            None => warn!("[{}][HOST] No wallpaper selected; desktop window left empty", DEBUG_NAME),
        }
        Ok(())
    }

    /// Brings the desktop window to front, but only once a renderer is in it;
    /// an earlier request is held until the next successful embed.
    pub fn show(&mut self) -> bool {
        if !self.renderer_embedded {
            info!("[{}][HOST] Deferring show until a renderer is embedded", DEBUG_NAME);
            self.show_pending = true;
            return false;
        }
        self.surface.order_front();
        self.show_pending = false;
        if !self.shown {
            info!("[{}][HOST] Desktop window shown", DEBUG_NAME);
        }
        self.shown = true;
        true
    }

    /// Replaces the active wallpaper: old renderer out, new renderer in, and a
    /// fresh placeholder for the new project.
    pub fn set_wallpaper(&mut self, project: WallpaperProject) {
        if self.frame.is_none() {
            warn!(
                "[{}][HOST] Desktop window not created; cannot load '{}'",
                DEBUG_NAME,
                project.display_name()
            );
            return;
        }

        self.teardown_renderer();

        match self.surface.embed_renderer(&project) {
            Ok(sink) => {
                *self.slot.borrow_mut() = Some(sink);
                self.renderer_embedded = true;
                info!(
                    "[{}][HOST] Embedded {} wallpaper '{}'",
                    DEBUG_NAME,
                    project.kind.as_str(),
                    project.display_name()
                );
            }
            Err(e) => error!(
                "[{}][HOST] Failed to embed '{}': {}",
                DEBUG_NAME,
                project.display_name(),
                e
            ),
        }

        let placeholder = self.placeholder.generate(&project);
        self.active = Some(ActiveWallpaper {
            project,
            placeholder,
        });

        if self.renderer_embedded && self.show_pending {
            self.show();
        }
    }

    fn teardown_renderer(&mut self) {
        self.slot.borrow_mut().take();
        if self.renderer_embedded {
            self.surface.teardown_renderer();
            self.renderer_embedded = false;
        }
    }

    /// Returns true when the host has shut down and the process should exit.
    pub fn handle_event(&mut self, event: HostEvent) -> bool {
        match event {
            HostEvent::WindowWillClose(role) => self.on_window_will_close(role),
            HostEvent::QueryEndSession => {
                info!("[{}][HOST] Session ending", DEBUG_NAME);
                self.shutdown();
                true
            }
            HostEvent::EndSession { ending: true } => {
                self.shutdown();
                true
            }
            HostEvent::EndSession { ending: false } => {
                info!("[{}][HOST] Session end cancelled", DEBUG_NAME);
                false
            }
        }
    }

    pub fn on_window_will_close(&mut self, role: WindowRole) -> bool {
        match role {
            WindowRole::Desktop => {
                info!("[{}][HOST] Ignoring close for the desktop window", DEBUG_NAME);
                false
            }
            WindowRole::Session => {
                info!("[{}][HOST] Close requested", DEBUG_NAME);
                self.shutdown();
                true
            }
        }
    }

    /// Follows primary display changes (resolution, arrangement).
    pub fn refresh_display_frame(&mut self) -> bool {
        let Some(current) = self.frame else {
            return false;
        };

        let Some(frame) = self.surface.primary_display_frame().filter(|f| !f.is_empty()) else {
            warn!("[{}][HOST] Primary display not resolvable; keeping current frame", DEBUG_NAME);
            return false;
        };

        if frame == current {
            return false;
        }

        if let Err(e) = self.surface.set_frame(frame) {
            warn!("[{}][HOST] Failed to resize desktop window: {}", DEBUG_NAME, e);
            return false;
        }
        self.frame = Some(frame);
        self.router.set_frame(frame);
        info!(
            "[{}][HOST] Primary display changed -> [l={},t={},r={},b={}]",
            DEBUG_NAME, frame.left, frame.top, frame.right, frame.bottom
        );
        true
    }

    /// Main-loop hook: delivers finished placeholder work.
    pub fn tick(&mut self) {
        if self.placeholder.poll_completions() == 0 {
            return;
        }
        if let Some(active) = &self.active {
            debug!(
                "[{}][HOST] Placeholder {:?} for '{}' is now the desktop background",
                DEBUG_NAME,
                active.placeholder,
                active.project.display_name()
            );
        }
    }

    /// Stops forwarding and puts the user's background back. Only the first
    /// call does anything.
    pub fn shutdown(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        info!("[{}][HOST] Shutting down", DEBUG_NAME);
        self.router.stop();
        self.state.restore();
    }
}
