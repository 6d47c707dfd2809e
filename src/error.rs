// Error taxonomy for the overlay pipeline.
//
// InitError is fatal: the loop is never entered without a complete pipeline.
// RuntimeError is per-frame: the loop drops the frame and carries on.

use std::fmt;
use thiserror::Error;

/// A failed platform call: the HRESULT plus the system message for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformError {
    pub code: i32,
    pub message: String,
}

impl PlatformError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Wraps the calling thread's last Win32 error.
    #[cfg(windows)]
    pub fn last_os_error() -> Self {
        let code = unsafe { windows::Win32::Foundation::GetLastError() }.to_hresult();
        windows::core::Error::from(code).into()
    }
}

impl fmt::Display for PlatformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "HRESULT 0x{:08X}", self.code as u32)
        } else {
            write!(f, "{} (HRESULT 0x{:08X})", self.message, self.code as u32)
        }
    }
}

impl std::error::Error for PlatformError {}

#[cfg(windows)]
impl From<windows::core::Error> for PlatformError {
    fn from(e: windows::core::Error) -> Self {
        Self::new(e.code().0, e.message())
    }
}

/// Startup failures. Any of these aborts initialization.
#[derive(Debug, Error)]
pub enum InitError {
    #[error("failed to register or create the overlay window: {0}")]
    WindowCreationFailed(#[source] PlatformError),
    #[error("failed to create the rendering device: {0}")]
    DeviceCreationFailed(#[source] PlatformError),
    #[error("failed to create the output surface: {0}")]
    SurfaceCreationFailed(#[source] PlatformError),
    #[error("failed to attach the surface to the composition tree: {0}")]
    CompositionFailed(#[source] PlatformError),
    #[error("failed to create the GUI renderer: {0}")]
    RendererCreationFailed(#[source] PlatformError),
}

/// Per-frame failures. These only drop the current frame.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("back buffer unavailable: {0}")]
    BackBufferUnavailable(#[source] PlatformError),
    #[error("render target view creation failed: {0}")]
    ViewCreationFailed(#[source] PlatformError),
    #[error("surface resize to {width}x{height} failed: {source}")]
    SurfaceResizeFailed {
        width: u32,
        height: u32,
        #[source]
        source: PlatformError,
    },
    #[error("draw submission failed: {0}")]
    RenderFailed(#[source] PlatformError),
    #[error("present failed: {0}")]
    PresentFailed(#[source] PlatformError),
}
