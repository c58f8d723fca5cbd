use std::cell::RefCell;

use windows::Win32::{
    Foundation::{LPARAM, LRESULT, WPARAM},
    UI::WindowsAndMessaging::{
        CallNextHookEx, SetWindowsHookExW, UnhookWindowsHookEx, HHOOK, MSLLHOOKSTRUCT,
        WH_MOUSE_LL, WM_LBUTTONDOWN, WM_LBUTTONUP, WM_MOUSEMOVE, WM_RBUTTONDOWN, WM_RBUTTONUP,
    },
};

use crate::{
    errors::{HostError, Result},
    event_router::{HookMessage, PointerEvent, PointerEventSource, PointerTracker},
    geometry::{ScreenPoint, ScreenRect},
    info, warn, DEBUG_NAME,
};

type HookCallback = Box<dyn FnMut(PointerEvent)>;

// The hook procedure runs on the thread that installed it, inside its
// message pump.
thread_local! {
    static TRACKER: RefCell<PointerTracker> = RefCell::new(PointerTracker::default());
    static CALLBACK: RefCell<Option<HookCallback>> = const { RefCell::new(None) };
}

/// `WH_MOUSE_LL` monitor. Observes every pointer message system-wide and
/// always passes it on down the hook chain.
#[derive(Default)]
pub struct LowLevelMouseSource {
    hook: Option<HHOOK>,
}

impl LowLevelMouseSource {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PointerEventSource for LowLevelMouseSource {
    fn install(&mut self, callback: Box<dyn FnMut(PointerEvent)>) -> Result<()> {
        if self.hook.is_some() {
            return Ok(());
        }

        CALLBACK.with(|slot| *slot.borrow_mut() = Some(callback));

        let hook = unsafe { SetWindowsHookExW(WH_MOUSE_LL, Some(mouse_ll_hook_proc), None, 0) }
            .map_err(|e| {
                CALLBACK.with(|slot| slot.borrow_mut().take());
                HostError::Platform(format!("SetWindowsHookExW(WH_MOUSE_LL) failed: {e:?}"))
            })?;

        self.hook = Some(hook);
        info!("[{}][HOOK] Low-level mouse hook installed", DEBUG_NAME);
        Ok(())
    }

    fn uninstall(&mut self) {
        let Some(hook) = self.hook.take() else {
            return;
        };

        if let Err(e) = unsafe { UnhookWindowsHookEx(hook) } {
            warn!("[{}][HOOK] UnhookWindowsHookEx failed: {:?}", DEBUG_NAME, e);
        }
        CALLBACK.with(|slot| slot.borrow_mut().take());
        info!("[{}][HOOK] Low-level mouse hook removed", DEBUG_NAME);
    }

    fn set_frame(&mut self, frame: ScreenRect) {
        TRACKER.with(|tracker| tracker.borrow_mut().set_frame(frame));
    }
}

impl Drop for LowLevelMouseSource {
    fn drop(&mut self) {
        self.uninstall();
    }
}

fn hook_message(message: u32) -> Option<HookMessage> {
    match message {
        WM_MOUSEMOVE => Some(HookMessage::Move),
        WM_LBUTTONDOWN => Some(HookMessage::LeftDown),
        WM_LBUTTONUP => Some(HookMessage::LeftUp),
        WM_RBUTTONDOWN => Some(HookMessage::RightDown),
        WM_RBUTTONUP => Some(HookMessage::RightUp),
        _ => None,
    }
}

fn dispatch(message: HookMessage, position: ScreenPoint) {
    let events = TRACKER.with(|tracker| match tracker.try_borrow_mut() {
        Ok(mut tracker) => tracker.track(message, position),
        Err(_) => Vec::new(),
    });
    if events.is_empty() {
        return;
    }

    CALLBACK.with(|slot| {
        // A renderer call that pumps messages can re-enter the hook; the
        // nested notification is skipped.
        let Ok(mut slot) = slot.try_borrow_mut() else {
            return;
        };
        if let Some(callback) = slot.as_mut() {
            for event in events {
                callback(event);
            }
        }
    });
}

unsafe extern "system" fn mouse_ll_hook_proc(ncode: i32, wparam: WPARAM, lparam: LPARAM) -> LRESULT {
    if ncode >= 0 {
        if let Some(message) = hook_message(wparam.0 as u32) {
            let info = &*(lparam.0 as *const MSLLHOOKSTRUCT);
            dispatch(message, ScreenPoint::new(info.pt.x, info.pt.y));
        }
    }

    CallNextHookEx(None, ncode, wparam, lparam)
}
