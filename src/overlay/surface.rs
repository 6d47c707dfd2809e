// Rendering device and output surface.
//
// The swap chain is created for composition rather than for a window, so it
// can carry per-pixel alpha into the DirectComposition tree. It starts at 1x1
// and is only ever resized in place afterwards.

use crate::error::{InitError, PlatformError, RuntimeError};
use log::info;
use windows::core::Interface;
use windows::Win32::Foundation::{E_POINTER, HMODULE};
use windows::Win32::Graphics::Direct3D::D3D_DRIVER_TYPE_HARDWARE;
use windows::Win32::Graphics::Direct3D11::{
    D3D11CreateDevice, ID3D11Device, ID3D11DeviceContext, D3D11_CREATE_DEVICE_BGRA_SUPPORT,
    D3D11_SDK_VERSION,
};
use windows::Win32::Graphics::Dxgi::Common::{
    DXGI_ALPHA_MODE_PREMULTIPLIED, DXGI_FORMAT_B8G8R8A8_UNORM, DXGI_FORMAT_UNKNOWN,
    DXGI_SAMPLE_DESC,
};
use windows::Win32::Graphics::Dxgi::{
    CreateDXGIFactory2, IDXGIDevice, IDXGIFactory2, IDXGISwapChain1, DXGI_CREATE_FACTORY_DEBUG,
    DXGI_CREATE_FACTORY_FLAGS, DXGI_PRESENT, DXGI_SCALING_STRETCH, DXGI_SWAP_CHAIN_DESC1,
    DXGI_SWAP_CHAIN_FLAG, DXGI_SWAP_EFFECT_FLIP_SEQUENTIAL, DXGI_USAGE_RENDER_TARGET_OUTPUT,
};

/// Hardware device, its immediate context, and the DXGI view of the device
/// shared by the swap chain and the composition device.
pub struct Device {
    pub device: ID3D11Device,
    pub context: ID3D11DeviceContext,
    pub dxgi: IDXGIDevice,
}

pub fn create_device() -> Result<Device, InitError> {
    let mut device: Option<ID3D11Device> = None;
    let mut context: Option<ID3D11DeviceContext> = None;

    // The composition swap chain is BGRA, which needs BGRA support on the device.
    unsafe {
        D3D11CreateDevice(
            None,
            D3D_DRIVER_TYPE_HARDWARE,
            HMODULE::default(),
            D3D11_CREATE_DEVICE_BGRA_SUPPORT,
            None,
            D3D11_SDK_VERSION,
            Some(&mut device),
            None,
            Some(&mut context),
        )
    }
    .map_err(|e| InitError::DeviceCreationFailed(e.into()))?;

    let missing =
        || InitError::DeviceCreationFailed(PlatformError::new(E_POINTER.0, "no device returned"));
    let device = device.ok_or_else(missing)?;
    let context = context.ok_or_else(missing)?;
    let dxgi = device
        .cast::<IDXGIDevice>()
        .map_err(|e| InitError::DeviceCreationFailed(e.into()))?;

    info!("Direct3D 11 device created");
    Ok(Device {
        device,
        context,
        dxgi,
    })
}

pub fn create_swap_chain(device: &Device, debug: bool) -> Result<IDXGISwapChain1, InitError> {
    let flags = if debug {
        DXGI_CREATE_FACTORY_DEBUG
    } else {
        DXGI_CREATE_FACTORY_FLAGS(0)
    };
    let factory: IDXGIFactory2 = unsafe { CreateDXGIFactory2(flags) }
        .map_err(|e| InitError::SurfaceCreationFailed(e.into()))?;

    let desc = DXGI_SWAP_CHAIN_DESC1 {
        Width: 1,
        Height: 1,
        Format: DXGI_FORMAT_B8G8R8A8_UNORM,
        SampleDesc: DXGI_SAMPLE_DESC {
            Count: 1,
            Quality: 0,
        },
        BufferUsage: DXGI_USAGE_RENDER_TARGET_OUTPUT,
        BufferCount: 2,
        Scaling: DXGI_SCALING_STRETCH,
        SwapEffect: DXGI_SWAP_EFFECT_FLIP_SEQUENTIAL,
        AlphaMode: DXGI_ALPHA_MODE_PREMULTIPLIED,
        ..Default::default()
    };

    let swap_chain = unsafe { factory.CreateSwapChainForComposition(&device.dxgi, &desc, None) }
        .map_err(|e| InitError::SurfaceCreationFailed(e.into()))?;

    info!("Composition swap chain created");
    Ok(swap_chain)
}

/// Resize both buffers, keeping format and flags. The caller must hold no
/// view of either buffer.
pub fn resize(swap_chain: &IDXGISwapChain1, width: u32, height: u32) -> Result<(), RuntimeError> {
    unsafe {
        swap_chain.ResizeBuffers(0, width, height, DXGI_FORMAT_UNKNOWN, DXGI_SWAP_CHAIN_FLAG(0))
    }
    .map_err(|e| RuntimeError::SurfaceResizeFailed {
        width,
        height,
        source: e.into(),
    })
}

/// Present on the next vertical refresh. Blocks, and paces the loop.
pub fn present(swap_chain: &IDXGISwapChain1) -> Result<(), RuntimeError> {
    unsafe { swap_chain.Present(1, DXGI_PRESENT(0)) }
        .ok()
        .map_err(|e| RuntimeError::PresentFailed(e.into()))
}
