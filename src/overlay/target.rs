// Read-only queries on the foreign window being overlaid.

use crate::frame_loop::TargetWindow;
use crate::geometry::Rect;
use windows::core::PCWSTR;
use windows::Win32::Foundation::{HWND, RECT};
use windows::Win32::UI::WindowsAndMessaging::{
    FindWindowW, GetForegroundWindow, GetWindowRect, IsWindow, IsWindowVisible,
};

/// A window owned by some other thread or process. Never messaged or modified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForeignWindow(HWND);

impl ForeignWindow {
    pub fn new(hwnd: HWND) -> Self {
        Self(hwnd)
    }

    /// Look up a top-level window by title and/or class.
    pub fn find(title: Option<&str>, class: Option<&str>) -> Option<Self> {
        let wide = |s: &str| -> Vec<u16> { s.encode_utf16().chain(std::iter::once(0)).collect() };
        let title = title.map(wide);
        let class = class.map(wide);
        let ptr = |s: &Option<Vec<u16>>| s.as_ref().map_or(PCWSTR::null(), |v| PCWSTR(v.as_ptr()));

        unsafe { FindWindowW(ptr(&class), ptr(&title)) }
            .ok()
            .filter(|hwnd| !hwnd.is_invalid())
            .map(Self)
    }

    pub fn hwnd(&self) -> HWND {
        self.0
    }
}

impl TargetWindow for ForeignWindow {
    fn rect(&self) -> Option<Rect> {
        let mut r = RECT::default();
        unsafe { GetWindowRect(self.0, &mut r) }.ok()?;
        Some(r.into())
    }

    fn is_foreground(&self) -> bool {
        unsafe { GetForegroundWindow() == self.0 }
    }

    fn exists(&self) -> bool {
        unsafe { IsWindow(Some(self.0)).as_bool() }
    }

    fn is_visible(&self) -> bool {
        unsafe { IsWindowVisible(self.0).as_bool() }
    }
}
