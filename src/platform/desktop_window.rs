use std::{
    cell::Cell,
    mem,
    path::PathBuf,
    ptr,
    rc::Rc,
    sync::{mpsc, OnceLock},
};

use webview2_com::Microsoft::Web::WebView2::Win32::*;
use windows::{
    core::{w, BOOL, PCWSTR},
    Win32::{
        Foundation::{E_POINTER, HINSTANCE, HWND, LPARAM, LRESULT, RECT, WPARAM},
        Graphics::Gdi::{EnumDisplayMonitors, GetMonitorInfoW, HDC, HMONITOR, MONITORINFOEXW},
        System::LibraryLoader::GetModuleHandleW,
        UI::WindowsAndMessaging::{
            CreateWindowExW, DefWindowProcW, DestroyWindow, EnumWindows, FindWindowExW, FindWindowW,
            GetWindowLongW, GetWindowRect, RegisterClassW, SendMessageTimeoutW, SetWindowLongW,
            SetWindowPos, GWL_EXSTYLE, GWL_STYLE, HWND_TOP, MONITORINFOF_PRIMARY, SMTO_NORMAL,
            SWP_FRAMECHANGED, SWP_NOACTIVATE, SWP_NOMOVE, SWP_NOSIZE, SWP_NOZORDER, SWP_SHOWWINDOW,
            WINDOW_EX_STYLE, WINDOW_STYLE, WM_CLOSE, WNDCLASSW, WS_CAPTION, WS_CHILD,
            WS_CLIPCHILDREN, WS_CLIPSIBLINGS, WS_EX_APPWINDOW, WS_EX_DLGMODALFRAME, WS_EX_NOACTIVATE,
            WS_EX_TOOLWINDOW, WS_EX_WINDOWEDGE, WS_MAXIMIZEBOX, WS_MINIMIZEBOX, WS_SYSMENU,
            WS_THICKFRAME,
        },
    },
};

use super::content::{pointer_payload, renderer_target, RendererTarget};
use crate::{
    data_loaders::project::WallpaperProject,
    debug,
    errors::{HostError, Result},
    event_router::{forward_kind, PointerEvent, PointerSink},
    geometry::ScreenRect,
    host::{DesktopSurface, HostEvent, WindowRole},
    info,
    state_store::write_atomic,
    utility::to_wstring,
    warn, DEBUG_NAME,
};

const HOST_CLASS_NAME: PCWSTR = w!("SentinelWallpaperHostWindow");

struct HostWindow {
    hwnd: HWND,
    parent: HWND,
}

struct Renderer {
    controller: ICoreWebView2Controller,
}

impl Drop for Renderer {
    fn drop(&mut self) {
        unsafe {
            let _ = self.controller.Close();
        }
    }
}

/// Borderless child of the desktop `WorkerW`, so it sits behind the icons and
/// outside the normal window stack. Holds one WebView2 renderer at a time.
pub struct DesktopWindow {
    caches_dir: PathBuf,
    host: Option<HostWindow>,
    renderer: Option<Renderer>,
    frame: Rc<Cell<ScreenRect>>,
}

impl DesktopWindow {
    pub fn new(caches_dir: impl Into<PathBuf>) -> Self {
        Self {
            caches_dir: caches_dir.into(),
            host: None,
            renderer: None,
            frame: Rc::new(Cell::new(ScreenRect::default())),
        }
    }

    fn hwnd(&self) -> Result<HWND> {
        self.host
            .as_ref()
            .map(|h| h.hwnd)
            .ok_or_else(|| HostError::Platform("desktop window not created".to_string()))
    }
}

impl Drop for DesktopWindow {
    fn drop(&mut self) {
        self.renderer.take();
        if let Some(host) = self.host.take() {
            unsafe {
                let _ = DestroyWindow(host.hwnd);
            }
        }
    }
}

impl DesktopSurface for DesktopWindow {
    fn primary_display_frame(&self) -> Option<ScreenRect> {
        enumerate_monitors()
            .into_iter()
            .find(|m| m.primary)
            .map(|m| rect_to_frame(m.rect))
    }

    fn create_desktop_window(&mut self, frame: ScreenRect) -> Result<()> {
        if self.host.is_some() {
            return self.set_frame(frame);
        }

        ensure_host_class().map_err(HostError::Platform)?;
        let parent = ensure_desktop_host()
            .ok_or_else(|| HostError::Platform("Failed to locate WorkerW desktop host window".to_string()))?;
        let parent_rect = window_rect(parent)
            .ok_or_else(|| HostError::Platform("Failed to read desktop host window rect".to_string()))?;

        let hwnd = create_desktop_child_window(parent, parent_rect, frame_to_rect(frame))
            .map_err(HostError::Platform)?;
        apply_host_style(hwnd).map_err(HostError::Platform)?;

        self.host = Some(HostWindow { hwnd, parent });
        self.frame.set(frame);
        info!("[{}][WINDOW] Desktop window {:?} under {:?}", DEBUG_NAME, hwnd, parent);
        Ok(())
    }

    fn set_frame(&mut self, frame: ScreenRect) -> Result<()> {
        let host = self
            .host
            .as_ref()
            .ok_or_else(|| HostError::Platform("desktop window not created".to_string()))?;
        let parent_rect = window_rect(host.parent).unwrap_or_default();

        unsafe {
            SetWindowPos(
                host.hwnd,
                None,
                frame.left - parent_rect.left,
                frame.top - parent_rect.top,
                frame.width(),
                frame.height(),
                SWP_NOZORDER | SWP_NOACTIVATE,
            )
        }
        .map_err(|e| HostError::Platform(format!("SetWindowPos failed: {e:?}")))?;

        if let Some(renderer) = &self.renderer {
            unsafe { renderer.controller.SetBounds(local_bounds(frame)) }
                .map_err(|e| HostError::Platform(format!("WebView2 SetBounds failed: {e:?}")))?;
        }
        self.frame.set(frame);
        Ok(())
    }

    fn embed_renderer(&mut self, project: &WallpaperProject) -> Result<Box<dyn PointerSink>> {
        let hwnd = self.hwnd()?;

        let target = renderer_target(project, &self.caches_dir)?;
        if let RendererTarget::Page { path, html } = &target {
            write_atomic(path, html.as_bytes())?;
        }
        let url = target.url();

        let controller =
            create_webview_controller(hwnd, frame_to_rect(self.frame.get()), &url).map_err(HostError::Platform)?;
        let webview = unsafe { controller.CoreWebView2() }
            .map_err(|e| HostError::Platform(format!("WebView2 CoreWebView2 unavailable: {e:?}")))?;

        self.renderer = Some(Renderer { controller });
        Ok(Box::new(WebViewSink {
            webview,
            frame: Rc::clone(&self.frame),
        }))
    }

    fn teardown_renderer(&mut self) {
        if self.renderer.take().is_some() {
            debug!("[{}][WINDOW] WebView2 controller closed", DEBUG_NAME);
        }
    }

    fn order_front(&mut self) {
        let Ok(hwnd) = self.hwnd() else {
            return;
        };
        let shown = unsafe {
            SetWindowPos(
                hwnd,
                Some(HWND_TOP),
                0,
                0,
                0,
                0,
                SWP_NOMOVE | SWP_NOSIZE | SWP_NOACTIVATE | SWP_SHOWWINDOW,
            )
        };
        if let Err(e) = shown {
            warn!("[{}][WINDOW] Failed to show desktop window: {:?}", DEBUG_NAME, e);
        }
    }
}

/// Posts forwarded pointer events into the page as JSON web messages.
struct WebViewSink {
    webview: ICoreWebView2,
    frame: Rc<Cell<ScreenRect>>,
}

impl WebViewSink {
    fn post(&self, event: &PointerEvent) {
        let Some(kind) = forward_kind(event.kind) else {
            return;
        };
        let payload = pointer_payload(kind, event, self.frame.get());
        if let Err(e) = post_webview_json(&self.webview, &payload) {
            debug!("[{}][WINDOW] {}", DEBUG_NAME, e);
        }
    }
}

impl PointerSink for WebViewSink {
    fn move_to(&self, event: &PointerEvent) {
        self.post(event);
    }

    fn enter(&self, event: &PointerEvent) {
        self.post(event);
    }

    fn exit(&self, event: &PointerEvent) {
        self.post(event);
    }

    fn up(&self, event: &PointerEvent) {
        self.post(event);
    }

    fn down(&self, event: &PointerEvent) {
        self.post(event);
    }

    fn drag(&self, event: &PointerEvent) {
        self.post(event);
    }
}

struct MonitorArea {
    primary: bool,
    rect: RECT,
}

fn rect_to_frame(rect: RECT) -> ScreenRect {
    ScreenRect::new(rect.left, rect.top, rect.right, rect.bottom)
}

fn frame_to_rect(frame: ScreenRect) -> RECT {
    RECT {
        left: frame.left,
        top: frame.top,
        right: frame.right,
        bottom: frame.bottom,
    }
}

fn local_bounds(frame: ScreenRect) -> RECT {
    RECT {
        left: 0,
        top: 0,
        right: frame.width(),
        bottom: frame.height(),
    }
}

fn post_webview_json(webview: &ICoreWebView2, payload: &str) -> std::result::Result<(), String> {
    let payload_wide = to_wstring(payload);
    unsafe {
        webview
            .PostWebMessageAsJson(PCWSTR(payload_wide.as_ptr()))
            .map_err(|e| format!("WebView2 PostWebMessageAsJson failed: {e:?}"))
    }
}

fn ensure_host_class() -> std::result::Result<(), String> {
    static CLASS_ONCE: OnceLock<()> = OnceLock::new();
    if CLASS_ONCE.get().is_some() {
        return Ok(());
    }

    let hinstance = unsafe {
        GetModuleHandleW(None)
            .map(|h| HINSTANCE(h.0))
            .map_err(|e| format!("GetModuleHandleW failed: {e:?}"))?
    };

    let wc = WNDCLASSW {
        lpfnWndProc: Some(host_window_proc),
        hInstance: hinstance,
        lpszClassName: HOST_CLASS_NAME,
        ..Default::default()
    };

    if unsafe { RegisterClassW(&wc) } == 0 {
        return Err("RegisterClassW failed for the desktop window class".to_string());
    }

    let _ = CLASS_ONCE.set(());
    Ok(())
}

unsafe extern "system" fn host_window_proc(
    hwnd: HWND,
    msg: u32,
    wparam: WPARAM,
    lparam: LPARAM,
) -> LRESULT {
    // The desktop window lives as long as the process.
    if msg == WM_CLOSE {
        super::session::dispatch(HostEvent::WindowWillClose(WindowRole::Desktop));
        return LRESULT(0);
    }
    DefWindowProcW(hwnd, msg, wparam, lparam)
}

fn create_desktop_child_window(worker: HWND, parent_rect: RECT, rect: RECT) -> std::result::Result<HWND, String> {
    let x = rect.left - parent_rect.left;
    let y = rect.top - parent_rect.top;
    let width = rect.right - rect.left;
    let height = rect.bottom - rect.top;
    debug!(
        "[{}][WINDOW] creating child window parent={:?} pos=({}, {}) size={}x{}",
        DEBUG_NAME, worker, x, y, width, height
    );

    // Created hidden; shown once a renderer is in place.
    let style = WINDOW_STYLE((WS_CHILD | WS_CLIPSIBLINGS | WS_CLIPCHILDREN).0);
    let ex_style = WINDOW_EX_STYLE((WS_EX_TOOLWINDOW | WS_EX_NOACTIVATE).0);

    let hinstance = unsafe {
        GetModuleHandleW(None)
            .map(|h| HINSTANCE(h.0))
            .map_err(|e| format!("GetModuleHandleW failed: {e:?}"))?
    };

    unsafe {
        CreateWindowExW(
            ex_style,
            HOST_CLASS_NAME,
            PCWSTR::null(),
            style,
            x,
            y,
            width,
            height,
            Some(worker),
            None,
            Some(hinstance),
            Some(ptr::null()),
        )
    }
    .map_err(|e| format!("CreateWindowExW failed: {e:?}"))
}

fn window_rect(hwnd: HWND) -> Option<RECT> {
    let mut rect = RECT::default();
    unsafe { GetWindowRect(hwnd, &mut rect) }.ok().map(|_| rect)
}

/// Strips everything a user could grab: no caption, no resize frame, no
/// minimize/maximize/close, no taskbar button, never activated.
fn apply_host_style(hwnd: HWND) -> std::result::Result<(), String> {
    unsafe {
        let style = GetWindowLongW(hwnd, GWL_STYLE) as u32;
        let new_style = (style
            & !(WS_CAPTION.0 | WS_THICKFRAME.0 | WS_MINIMIZEBOX.0 | WS_MAXIMIZEBOX.0 | WS_SYSMENU.0))
            | WS_CHILD.0;
        let _ = SetWindowLongW(hwnd, GWL_STYLE, new_style as i32);

        let ex_style = GetWindowLongW(hwnd, GWL_EXSTYLE) as u32;
        let new_ex = (ex_style & !(WS_EX_APPWINDOW.0 | WS_EX_WINDOWEDGE.0 | WS_EX_DLGMODALFRAME.0))
            | WS_EX_TOOLWINDOW.0
            | WS_EX_NOACTIVATE.0;
        let _ = SetWindowLongW(hwnd, GWL_EXSTYLE, new_ex as i32);

        debug!(
            "[{}][WINDOW] hwnd={:?} style 0x{:X}->0x{:X} ex 0x{:X}->0x{:X}",
            DEBUG_NAME, hwnd, style, new_style, ex_style, new_ex
        );

        SetWindowPos(
            hwnd,
            None,
            0,
            0,
            0,
            0,
            SWP_NOMOVE | SWP_NOSIZE | SWP_NOZORDER | SWP_NOACTIVATE | SWP_FRAMECHANGED,
        )
        .map_err(|e| format!("SetWindowPos failed for host style: {e:?}"))
    }
}

fn create_webview_controller(
    hwnd: HWND,
    rect: RECT,
    url: &str,
) -> std::result::Result<ICoreWebView2Controller, String> {
    debug!("[{}][WEBVIEW] creating environment for hwnd={:?}", DEBUG_NAME, hwnd);
    let environment = {
        let (tx, rx) = mpsc::channel();

        webview2_com::CreateCoreWebView2EnvironmentCompletedHandler::wait_for_async_operation(
            Box::new(|handler| unsafe {
                CreateCoreWebView2Environment(&handler).map_err(webview2_com::Error::WindowsError)
            }),
            Box::new(move |error_code, environment| {
                error_code?;
                let _ = tx.send(environment.ok_or_else(|| windows::core::Error::from(E_POINTER)));
                Ok(())
            }),
        )
        .map_err(|e| format!("CreateCoreWebView2Environment failed: {e:?}"))?;

        rx.recv()
            .map_err(|_| "Failed to receive WebView2 environment".to_string())?
            .map_err(|e| format!("WebView2 environment unavailable: {e:?}"))?
    };

    let controller = {
        let (tx, rx) = mpsc::channel();

        webview2_com::CreateCoreWebView2ControllerCompletedHandler::wait_for_async_operation(
            Box::new(move |handler| unsafe {
                environment
                    .CreateCoreWebView2Controller(hwnd, &handler)
                    .map_err(webview2_com::Error::WindowsError)
            }),
            Box::new(move |error_code, controller| {
                error_code?;
                let _ = tx.send(controller.ok_or_else(|| windows::core::Error::from(E_POINTER)));
                Ok(())
            }),
        )
        .map_err(|e| format!("CreateCoreWebView2Controller failed: {e:?}"))?;

        rx.recv()
            .map_err(|_| "Failed to receive WebView2 controller".to_string())?
            .map_err(|e| format!("WebView2 controller unavailable: {e:?}"))?
    };

    unsafe {
        controller
            .SetBounds(local_bounds(rect_to_frame(rect)))
            .map_err(|e| format!("WebView2 SetBounds failed: {e:?}"))?;
        controller
            .SetIsVisible(true)
            .map_err(|e| format!("WebView2 SetIsVisible failed: {e:?}"))?;

        let webview = controller
            .CoreWebView2()
            .map_err(|e| format!("WebView2 CoreWebView2 unavailable: {e:?}"))?;

        let url_wide = to_wstring(url);
        webview
            .Navigate(PCWSTR(url_wide.as_ptr()))
            .map_err(|e| format!("WebView2 Navigate failed for '{}': {e:?}", url))?;
    }
    debug!("[{}][WEBVIEW] navigating hwnd={:?} to '{}'", DEBUG_NAME, hwnd, url);

    Ok(controller)
}

fn enumerate_monitors() -> Vec<MonitorArea> {
    unsafe extern "system" fn enum_monitor_proc(
        monitor: HMONITOR,
        _hdc: HDC,
        _rect: *mut RECT,
        lparam: LPARAM,
    ) -> BOOL {
        let areas = &mut *(lparam.0 as *mut Vec<MonitorArea>);

        let mut info: MONITORINFOEXW = mem::zeroed();
        info.monitorInfo.cbSize = mem::size_of::<MONITORINFOEXW>() as u32;

        if GetMonitorInfoW(monitor, &mut info as *mut MONITORINFOEXW as *mut _).as_bool() {
            areas.push(MonitorArea {
                primary: info.monitorInfo.dwFlags & MONITORINFOF_PRIMARY != 0,
                rect: info.monitorInfo.rcMonitor,
            });
        }

        BOOL(1)
    }

    let mut monitors = Vec::<MonitorArea>::new();
    unsafe {
        let _ = EnumDisplayMonitors(
            None,
            None,
            Some(enum_monitor_proc),
            LPARAM((&mut monitors as *mut Vec<MonitorArea>) as isize),
        );
    }

    monitors
}

/// Asks Progman to split off the `WorkerW` that sits behind the desktop icons
/// (message `0x052C`), then finds it as the sibling after `SHELLDLL_DefView`'s
/// host.
fn ensure_desktop_host() -> Option<HWND> {
    unsafe {
        let progman = FindWindowW(w!("Progman"), None).ok()?;

        let mut spawn_result = 0usize;
        let _ = SendMessageTimeoutW(
            progman,
            0x052C,
            WPARAM(0),
            LPARAM(0),
            SMTO_NORMAL,
            1000,
            Some(&mut spawn_result),
        );

        let mut defview_host: Option<HWND> = None;
        unsafe extern "system" fn enum_proc(hwnd: HWND, lparam: LPARAM) -> BOOL {
            let Some(out) = (lparam.0 as *mut Option<HWND>).as_mut() else {
                return BOOL(0);
            };
            if FindWindowExW(Some(hwnd), None, w!("SHELLDLL_DefView"), None).is_ok() {
                *out = Some(hwnd);
                return BOOL(0);
            }
            BOOL(1)
        }
        let _ = EnumWindows(
            Some(enum_proc),
            LPARAM((&mut defview_host) as *mut Option<HWND> as isize),
        );

        if let Some(host) = defview_host {
            if let Ok(workerw) = FindWindowExW(None, Some(host), w!("WorkerW"), None) {
                debug!("[{}][WINDOW] WorkerW sibling of DefView host={:?}", DEBUG_NAME, workerw);
                return Some(workerw);
            }

            // Windows 11 24H2 keeps the WorkerW inside Progman.
            if let Ok(workerw) = FindWindowExW(Some(progman), None, w!("WorkerW"), None) {
                debug!("[{}][WINDOW] WorkerW under Progman={:?}", DEBUG_NAME, workerw);
                return Some(workerw);
            }

            warn!("[{}][WINDOW] No WorkerW found; using DefView host", DEBUG_NAME);
            return Some(host);
        }

        if let Ok(workerw) = FindWindowExW(Some(progman), None, w!("WorkerW"), None) {
            return Some(workerw);
        }

        warn!("[{}][WINDOW] Falling back to Progman as desktop host", DEBUG_NAME);
        Some(progman)
    }
}
