// Overlay window: a layered, transparent, click-through, topmost popup that
// never activates. It has no redirection bitmap, so nothing shows until the
// composition tree supplies content.
//
// The window starts hidden at 1x1; the frame loop places it over the target.

use super::input;
use crate::error::{InitError, PlatformError};
use crate::geometry::Rect;
use crate::gui::Gui;
use log::{debug, trace, warn};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;
use windows::core::PCWSTR;
use windows::Win32::Foundation::{
    GetLastError, ERROR_CLASS_ALREADY_EXISTS, HINSTANCE, HWND, LPARAM, LRESULT, RECT, WPARAM,
};
use windows::Win32::System::LibraryLoader::GetModuleHandleW;
use windows::Win32::UI::WindowsAndMessaging::{
    CreateWindowExW, DefWindowProcW, DestroyWindow, DispatchMessageW, GetWindowLongW,
    GetWindowRect, IsWindowVisible, MsgWaitForMultipleObjects, PeekMessageW, RegisterClassW,
    SetWindowPos, ShowWindow, TranslateMessage, UnregisterClassW, CS_HREDRAW, CS_VREDRAW,
    GWLP_USERDATA, GWL_EXSTYLE, GWL_STYLE, HWND_TOPMOST, MSG, PM_REMOVE, QS_ALLINPUT,
    SWP_NOACTIVATE, SWP_SHOWWINDOW, SW_HIDE, WINDOW_EX_STYLE, WINDOW_STYLE, WM_QUIT, WNDCLASSW,
    WS_CLIPSIBLINGS, WS_EX_LAYERED, WS_EX_NOACTIVATE, WS_EX_NOREDIRECTIONBITMAP,
    WS_EX_TOPMOST, WS_EX_TRANSPARENT, WS_POPUP,
};

#[cfg(target_pointer_width = "64")]
use windows::Win32::UI::WindowsAndMessaging::{GetWindowLongPtrW, SetWindowLongPtrW};
#[cfg(target_pointer_width = "32")]
use windows::Win32::UI::WindowsAndMessaging::SetWindowLongW;

/// Base style. Deliberately not WS_VISIBLE: visibility follows target focus.
pub const OVERLAY_STYLE: WINDOW_STYLE = WINDOW_STYLE(WS_POPUP.0 | WS_CLIPSIBLINGS.0);

pub const OVERLAY_EX_STYLE: WINDOW_EX_STYLE = WINDOW_EX_STYLE(
    WS_EX_NOACTIVATE.0
        | WS_EX_NOREDIRECTIONBITMAP.0
        | WS_EX_LAYERED.0
        | WS_EX_TRANSPARENT.0
        | WS_EX_TOPMOST.0,
);

fn wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

#[cfg(target_pointer_width = "64")]
unsafe fn set_user_data(hwnd: HWND, value: isize) {
    SetWindowLongPtrW(hwnd, GWLP_USERDATA, value);
}

#[cfg(target_pointer_width = "32")]
unsafe fn set_user_data(hwnd: HWND, value: isize) {
    SetWindowLongW(hwnd, GWLP_USERDATA, value as i32);
}

#[cfg(target_pointer_width = "64")]
unsafe fn user_data(hwnd: HWND) -> isize {
    GetWindowLongPtrW(hwnd, GWLP_USERDATA)
}

#[cfg(target_pointer_width = "32")]
unsafe fn user_data(hwnd: HWND) -> isize {
    GetWindowLongW(hwnd, GWLP_USERDATA) as isize
}

/// Every message goes through the GUI input hook first, then default
/// handling. The GUI context is reached through GWLP_USERDATA, set once
/// creation returns; messages that arrive mid-frame are not seen by it.
unsafe extern "system" fn wnd_proc(
    hwnd: HWND,
    msg: u32,
    wparam: WPARAM,
    lparam: LPARAM,
) -> LRESULT {
    let gui = user_data(hwnd) as *const RefCell<Gui>;
    if !gui.is_null() {
        if let Ok(mut gui) = (*gui).try_borrow_mut() {
            if input::handle_message(gui.io_mut(), msg, wparam, lparam) {
                trace!("Overlay input message {:#06x}", msg);
            }
        }
    }
    DefWindowProcW(hwnd, msg, wparam, lparam)
}

/// A registered window class, unregistered again when dropped.
struct WindowClass {
    name: Vec<u16>,
    hinstance: HINSTANCE,
}

impl WindowClass {
    fn register(name: &str) -> Result<Self, InitError> {
        let name = wide(name);
        unsafe {
            let hinstance: HINSTANCE = GetModuleHandleW(PCWSTR::null())
                .map_err(|e| InitError::WindowCreationFailed(e.into()))?
                .into();

            let wc = WNDCLASSW {
                style: CS_HREDRAW | CS_VREDRAW,
                lpfnWndProc: Some(wnd_proc),
                hInstance: hinstance,
                lpszClassName: PCWSTR(name.as_ptr()),
                ..Default::default()
            };

            if RegisterClassW(&wc) == 0 && GetLastError() != ERROR_CLASS_ALREADY_EXISTS {
                return Err(InitError::WindowCreationFailed(PlatformError::last_os_error()));
            }
        }
        Ok(Self { name, hinstance })
    }

    fn name(&self) -> PCWSTR {
        PCWSTR(self.name.as_ptr())
    }
}

impl Drop for WindowClass {
    fn drop(&mut self) {
        unsafe {
            let _ = UnregisterClassW(self.name(), Some(self.hinstance));
        }
    }
}

pub struct OverlayWindow {
    hwnd: HWND,
    // Keeps the context behind GWLP_USERDATA alive as long as the window.
    _gui: Rc<RefCell<Gui>>,
    // Dropped after the window is destroyed.
    class: WindowClass,
}

impl OverlayWindow {
    /// Create the overlay window; its input goes to `gui`. If creation fails
    /// the class is unregistered again.
    pub fn create(class: &str, title: &str, gui: Rc<RefCell<Gui>>) -> Result<Self, InitError> {
        let class = WindowClass::register(class)?;
        let title = wide(title);

        unsafe {
            let hwnd = CreateWindowExW(
                OVERLAY_EX_STYLE,
                class.name(),
                PCWSTR(title.as_ptr()),
                OVERLAY_STYLE,
                0,
                0,
                1,
                1,
                None,
                None,
                Some(class.hinstance),
                None,
            )
            .map_err(|e| InitError::WindowCreationFailed(e.into()))?;

            set_user_data(hwnd, Rc::as_ptr(&gui) as isize);

            debug!(
                "Overlay window created: style={:#010x} ex_style={:#010x}",
                GetWindowLongW(hwnd, GWL_STYLE) as u32,
                GetWindowLongW(hwnd, GWL_EXSTYLE) as u32
            );

            Ok(Self {
                hwnd,
                _gui: gui,
                class,
            })
        }
    }

    pub fn hwnd(&self) -> HWND {
        self.hwnd
    }

    pub fn is_visible(&self) -> bool {
        unsafe { IsWindowVisible(self.hwnd).as_bool() }
    }

    pub fn rect(&self) -> Option<Rect> {
        let mut r = RECT::default();
        unsafe { GetWindowRect(self.hwnd, &mut r) }.ok()?;
        Some(r.into())
    }

    pub fn hide(&self) {
        unsafe {
            let _ = ShowWindow(self.hwnd, SW_HIDE);
        }
    }

    /// Match `rect` exactly, topmost and shown, without taking activation.
    pub fn place(&self, rect: Rect) {
        let result = unsafe {
            SetWindowPos(
                self.hwnd,
                Some(HWND_TOPMOST),
                rect.left,
                rect.top,
                rect.width(),
                rect.height(),
                SWP_SHOWWINDOW | SWP_NOACTIVATE,
            )
        };
        if let Err(e) = result {
            warn!("SetWindowPos failed: {:?}", e);
        }
    }
}

impl Drop for OverlayWindow {
    fn drop(&mut self) {
        unsafe {
            set_user_data(self.hwnd, 0);
            let _ = DestroyWindow(self.hwnd);
        }
        debug!("Overlay window destroyed");
    }
}

/// Dispatch at most one pending message for this thread.
pub fn pump_message() -> crate::frame_loop::Pump {
    use crate::frame_loop::Pump;

    let mut msg = MSG::default();
    unsafe {
        if !PeekMessageW(&mut msg, None, 0, 0, PM_REMOVE).as_bool() {
            return Pump::Empty;
        }
        if msg.message == WM_QUIT {
            return Pump::Quit;
        }
        let _ = TranslateMessage(&msg);
        DispatchMessageW(&msg);
    }
    Pump::Dispatched
}

/// Sleep until a message is queued or `timeout` elapses.
pub fn wait_for_message(timeout: Duration) {
    let ms = timeout.as_millis().min(u32::MAX as u128) as u32;
    unsafe {
        let _ = MsgWaitForMultipleObjects(None, false, ms, QS_ALLINPUT);
    }
}
