// OS-facing implementations of the host seams.

#[cfg_attr(not(windows), allow(dead_code))]
pub mod content;
#[cfg_attr(not(windows), allow(dead_code))]
pub mod pixels;

#[cfg(windows)]
mod desktop_background;
#[cfg(windows)]
mod desktop_window;
#[cfg(windows)]
mod mouse_hook;
#[cfg(windows)]
mod session;
#[cfg(windows)]
mod video_frame;

#[cfg(windows)]
pub use self::{
    desktop_background::SystemBackground,
    desktop_window::DesktopWindow,
    mouse_hook::LowLevelMouseSource,
    session::{init_ui_thread, pump_messages, set_event_handler, SessionWindow},
    video_frame::MediaFoundationDecoder,
};

#[cfg(not(windows))]
mod unsupported;
#[cfg(not(windows))]
pub use self::unsupported::{
    init_ui_thread, pump_messages, set_event_handler, DesktopWindow, LowLevelMouseSource,
    MediaFoundationDecoder, SessionWindow, SystemBackground,
};
