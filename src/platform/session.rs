use std::{cell::RefCell, ptr, sync::OnceLock};

use windows::{
    core::{w, PCWSTR},
    Win32::{
        Foundation::{HINSTANCE, HWND, LPARAM, LRESULT, WPARAM},
        System::{
            Com::{CoInitializeEx, COINIT_APARTMENTTHREADED},
            LibraryLoader::GetModuleHandleW,
        },
        UI::{
            HiDpi::{SetProcessDpiAwarenessContext, DPI_AWARENESS_CONTEXT_PER_MONITOR_AWARE_V2},
            WindowsAndMessaging::{
                CreateWindowExW, DefWindowProcW, DestroyWindow, DispatchMessageW, PeekMessageW,
                RegisterClassW, TranslateMessage, MSG, PM_REMOVE, WINDOW_EX_STYLE, WINDOW_STYLE,
                WM_CLOSE, WM_ENDSESSION, WM_QUERYENDSESSION, WM_QUIT, WNDCLASSW, WS_EX_TOOLWINDOW,
                WS_OVERLAPPED,
            },
        },
    },
};

use crate::{
    errors::{HostError, Result},
    host::{HostEvent, WindowRole},
    info, warn, DEBUG_NAME,
};

const SESSION_CLASS_NAME: PCWSTR = w!("SentinelWallpaperHostSession");

type EventHandler = Box<dyn FnMut(HostEvent)>;

thread_local! {
    static EVENT_HANDLER: RefCell<Option<EventHandler>> = RefCell::new(None);
}

/// Per-monitor DPI awareness plus a single-threaded apartment for WebView2.
/// Call once, on the thread that runs [`pump_messages`].
pub fn init_ui_thread() {
    unsafe {
        if SetProcessDpiAwarenessContext(DPI_AWARENESS_CONTEXT_PER_MONITOR_AWARE_V2).is_err() {
            warn!(
                "[{}] Failed to set process DPI awareness to PerMonitorV2; display frames may be scaled",
                DEBUG_NAME
            );
        }
        if let Err(e) = CoInitializeEx(None, COINIT_APARTMENTTHREADED).ok() {
            warn!("[{}] CoInitializeEx failed: {:?}", DEBUG_NAME, e);
        }
    }
}

/// Drains the thread's message queue. Returns `false` once `WM_QUIT` arrives.
pub fn pump_messages() -> bool {
    unsafe {
        let mut msg = MSG::default();
        while PeekMessageW(&mut msg, None, 0, 0, PM_REMOVE).as_bool() {
            if msg.message == WM_QUIT {
                return false;
            }
            let _ = TranslateMessage(&msg);
            DispatchMessageW(&msg);
        }
    }
    true
}

/// Installs the receiver for window and session notices on this thread.
pub fn set_event_handler(handler: impl FnMut(HostEvent) + 'static) {
    EVENT_HANDLER.with(|slot| *slot.borrow_mut() = Some(Box::new(handler)));
}

pub(super) fn dispatch(event: HostEvent) {
    EVENT_HANDLER.with(|slot| match slot.try_borrow_mut() {
        Ok(mut handler) => {
            if let Some(handler) = handler.as_mut() {
                handler(event);
            }
        }
        Err(_) => warn!("[{}][SESSION] Dropped re-entrant {:?}", DEBUG_NAME, event),
    });
}

fn host_event(msg: u32, wparam: WPARAM) -> Option<HostEvent> {
    match msg {
        WM_QUERYENDSESSION => Some(HostEvent::QueryEndSession),
        WM_ENDSESSION => Some(HostEvent::EndSession { ending: wparam.0 != 0 }),
        WM_CLOSE => Some(HostEvent::WindowWillClose(WindowRole::Session)),
        _ => None,
    }
}

/// Hidden top-level window. Windows only delivers logoff and shutdown notices
/// to top-level windows, and the desktop window is a child of WorkerW.
pub struct SessionWindow {
    hwnd: HWND,
}

impl SessionWindow {
    pub fn create() -> Result<Self> {
        let hinstance = unsafe {
            GetModuleHandleW(None)
                .map(|h| HINSTANCE(h.0))
                .map_err(|e| HostError::Platform(format!("GetModuleHandleW failed: {e:?}")))?
        };
        ensure_session_class(hinstance)?;

        let hwnd = unsafe {
            CreateWindowExW(
                WINDOW_EX_STYLE(WS_EX_TOOLWINDOW.0),
                SESSION_CLASS_NAME,
                w!("Sentinel Wallpaper Host"),
                WINDOW_STYLE(WS_OVERLAPPED.0),
                0,
                0,
                0,
                0,
                None,
                None,
                Some(hinstance),
                Some(ptr::null()),
            )
        }
        .map_err(|e| HostError::Platform(format!("CreateWindowExW failed for the session window: {e:?}")))?;

        info!("[{}][SESSION] Listening for session end on hwnd={:?}", DEBUG_NAME, hwnd);
        Ok(Self { hwnd })
    }
}

impl Drop for SessionWindow {
    fn drop(&mut self) {
        unsafe {
            let _ = DestroyWindow(self.hwnd);
        }
    }
}

fn ensure_session_class(hinstance: HINSTANCE) -> Result<()> {
    static CLASS_ONCE: OnceLock<()> = OnceLock::new();
    if CLASS_ONCE.get().is_some() {
        return Ok(());
    }

    let wc = WNDCLASSW {
        lpfnWndProc: Some(session_window_proc),
        hInstance: hinstance,
        lpszClassName: SESSION_CLASS_NAME,
        ..Default::default()
    };

    if unsafe { RegisterClassW(&wc) } == 0 {
        return Err(HostError::Platform(
            "RegisterClassW failed for the session window class".to_string(),
        ));
    }

    let _ = CLASS_ONCE.set(());
    Ok(())
}

// Shutdown runs inside the handler: once WM_ENDSESSION returns with
// `wparam != 0` the process may be terminated at any point.
unsafe extern "system" fn session_window_proc(
    hwnd: HWND,
    msg: u32,
    wparam: WPARAM,
    lparam: LPARAM,
) -> LRESULT {
    match host_event(msg, wparam) {
        Some(event) => {
            dispatch(event);
            if msg == WM_QUERYENDSESSION {
                LRESULT(1)
            } else {
                LRESULT(0)
            }
        }
        None => DefWindowProcW(hwnd, msg, wparam, lparam),
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::Cell, rc::Rc};

    use super::*;

    #[test]
    fn session_messages_map_to_host_events() {
        assert_eq!(host_event(WM_QUERYENDSESSION, WPARAM(0)), Some(HostEvent::QueryEndSession));
        assert_eq!(
            host_event(WM_ENDSESSION, WPARAM(1)),
            Some(HostEvent::EndSession { ending: true })
        );
        assert_eq!(
            host_event(WM_ENDSESSION, WPARAM(0)),
            Some(HostEvent::EndSession { ending: false })
        );
        assert_eq!(
            host_event(WM_CLOSE, WPARAM(0)),
            Some(HostEvent::WindowWillClose(WindowRole::Session))
        );
        assert_eq!(host_event(WM_QUIT, WPARAM(0)), None);
    }

    #[test]
    fn dispatch_reaches_the_installed_handler() {
        let seen = Rc::new(Cell::new(0));
        let counter = Rc::clone(&seen);
        set_event_handler(move |event| {
            if event == HostEvent::QueryEndSession {
                counter.set(counter.get() + 1);
            }
        });

        dispatch(HostEvent::QueryEndSession);
        dispatch(HostEvent::EndSession { ending: false });

        assert_eq!(seen.get(), 1);
    }
}
