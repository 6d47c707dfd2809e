// Back-buffer binding: the render-target view of the swap chain's current
// buffer. It holds a reference to the buffers, so it is dropped before every
// resize and rebuilt after.

use crate::error::{PlatformError, RuntimeError};
use log::trace;
use windows::Win32::Foundation::E_POINTER;
use windows::Win32::Graphics::Direct3D11::{
    ID3D11Device, ID3D11DeviceContext, ID3D11RenderTargetView, ID3D11Texture2D,
};
use windows::Win32::Graphics::Dxgi::IDXGISwapChain1;

pub struct RenderTargetView {
    rtv: ID3D11RenderTargetView,
}

impl RenderTargetView {
    /// Wrap buffer 0 of `swap_chain`. No other view of it may be held.
    pub fn create(swap_chain: &IDXGISwapChain1, device: &ID3D11Device) -> Result<Self, RuntimeError> {
        unsafe {
            let back_buffer: ID3D11Texture2D = swap_chain
                .GetBuffer(0)
                .map_err(|e| RuntimeError::BackBufferUnavailable(e.into()))?;

            let mut rtv: Option<ID3D11RenderTargetView> = None;
            device
                .CreateRenderTargetView(&back_buffer, None, Some(&mut rtv))
                .map_err(|e| RuntimeError::ViewCreationFailed(e.into()))?;
            let rtv = rtv.ok_or_else(|| {
                RuntimeError::ViewCreationFailed(PlatformError::new(E_POINTER.0, "no view returned"))
            })?;

            trace!("Render target view created");
            Ok(Self { rtv })
        }
    }

    /// Make this the active render target and clear it.
    pub fn bind(&self, context: &ID3D11DeviceContext, clear_color: &[f32; 4]) {
        unsafe {
            context.OMSetRenderTargets(Some(&[Some(self.rtv.clone())]), None);
            context.ClearRenderTargetView(&self.rtv, clear_color);
        }
    }
}

/// Drop the current view, unbinding it first so no reference to the back
/// buffer survives. A no-op when nothing is held.
pub fn release(view: &mut Option<RenderTargetView>, context: &ID3D11DeviceContext) {
    if view.take().is_none() {
        return;
    }
    unsafe {
        context.OMSetRenderTargets(None, None);
        context.ClearState();
        context.Flush();
    }
    trace!("Render target view released");
}
