// DirectComposition tree: overlay window -> target -> visual -> swap chain.
// Built once; resizing the swap chain does not touch it.

use crate::error::InitError;
use log::info;
use windows::Win32::Foundation::HWND;
use windows::Win32::Graphics::DirectComposition::{
    DCompositionCreateDevice, IDCompositionDevice, IDCompositionTarget, IDCompositionVisual,
};
use windows::Win32::Graphics::Dxgi::{IDXGIDevice, IDXGISwapChain1};

pub struct Composition {
    _device: IDCompositionDevice,
    _target: IDCompositionTarget,
    _visual: IDCompositionVisual,
}

impl Composition {
    pub fn attach(
        dxgi: &IDXGIDevice,
        swap_chain: &IDXGISwapChain1,
        hwnd: HWND,
    ) -> Result<Self, InitError> {
        let fail = |e: windows::core::Error| InitError::CompositionFailed(e.into());

        unsafe {
            let device: IDCompositionDevice = DCompositionCreateDevice(dxgi).map_err(fail)?;
            let target = device.CreateTargetForHwnd(hwnd, true).map_err(fail)?;
            let visual = device.CreateVisual().map_err(fail)?;
            visual.SetContent(swap_chain).map_err(fail)?;
            target.SetRoot(&visual).map_err(fail)?;
            device.Commit().map_err(fail)?;

            info!("Swap chain attached to the composition tree");
            Ok(Self {
                _device: device,
                _target: target,
                _visual: visual,
            })
        }
    }
}
