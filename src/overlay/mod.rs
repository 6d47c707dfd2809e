// Win32 overlay controller.
//
// Owns every native resource the overlay needs and drives them through the
// generic frame loop:
//   window:      click-through topmost popup hosting the composition target
//   surface:     D3D11 device + composition swap chain (1x1 until first sync)
//   composition: DirectComposition tree showing the swap chain in the window
//   view:        back-buffer view, rebuilt around every resize
//   renderer:    submits the GUI context's draw data through D3D11
//
// Everything runs on the thread that called `initialize`.

pub mod composition;
pub mod input;
pub mod renderer;
pub mod surface;
pub mod target;
pub mod view;
pub mod window;

use crate::config::OverlayConfig;
use crate::error::{InitError, PlatformError, RuntimeError};
use crate::frame_loop::{Backend, FrameLoop, LoopExit, LoopOptions, Pump, TargetWindow};
use crate::geometry::Rect;
use crate::gui::Gui;
use composition::Composition;
use imgui::Ui;
use log::{error, info};
use renderer::Renderer;
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;
use surface::Device;
use target::ForeignWindow;
use view::RenderTargetView;
use window::OverlayWindow;
use windows::Win32::Foundation::{E_POINTER, HWND};
use windows::Win32::Graphics::Dxgi::IDXGISwapChain1;

/// The live pipeline. Fields drop top to bottom, view first, GUI context last.
struct Pipeline {
    view: Option<RenderTargetView>,
    renderer: Renderer,
    _composition: Composition,
    swap_chain: IDXGISwapChain1,
    device: Device,
    window: OverlayWindow,
    gui: Rc<RefCell<Gui>>,
    clear_color: [f32; 4],
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        view::release(&mut self.view, &self.device.context);
        unsafe { self.device.context.Flush() };
    }
}

impl Backend for Pipeline {
    type Ui = imgui::Ui;

    fn pump_message(&mut self) -> Pump {
        window::pump_message()
    }

    fn overlay_visible(&self) -> bool {
        self.window.is_visible()
    }

    fn overlay_rect(&self) -> Option<Rect> {
        self.window.rect()
    }

    fn hide_overlay(&mut self) {
        self.window.hide();
        self.gui.borrow_mut().suspend();
    }

    fn place_overlay(&mut self, rect: Rect) {
        self.window.place(rect);
    }

    fn has_view(&self) -> bool {
        self.view.is_some()
    }

    fn release_view(&mut self) {
        view::release(&mut self.view, &self.device.context);
    }

    fn resize_surface(&mut self, width: u32, height: u32) -> Result<(), RuntimeError> {
        surface::resize(&self.swap_chain, width, height)
    }

    fn create_view(&mut self) -> Result<(), RuntimeError> {
        let view = RenderTargetView::create(&self.swap_chain, &self.device.device)?;
        self.view = Some(view);
        Ok(())
    }

    fn build_frame(&mut self, size: (u32, u32), draw: &mut dyn FnMut(&Ui)) {
        self.gui.borrow_mut().frame(size, |ui| draw(ui));
    }

    fn bind_view(&mut self) -> Result<(), RuntimeError> {
        let view = self.view.as_ref().ok_or_else(|| {
            RuntimeError::ViewCreationFailed(PlatformError::new(E_POINTER.0, "no view is bound"))
        })?;
        view.bind(&self.device.context, &self.clear_color);
        Ok(())
    }

    fn render(&mut self) -> Result<(), RuntimeError> {
        let gui = self.gui.borrow();
        match gui.draw_data() {
            Some(draw_data) => self.renderer.render(draw_data),
            None => Ok(()),
        }
    }

    fn present(&mut self) -> Result<(), RuntimeError> {
        surface::present(&self.swap_chain)
    }

    fn idle(&mut self, timeout: Duration) {
        window::wait_for_message(timeout);
    }
}

/// Single owner of the overlay's native state.
pub struct Overlay {
    pipeline: Option<Pipeline>,
    options: LoopOptions,
}

impl Overlay {
    /// Build the whole pipeline. Call once, on the thread that will run the loop.
    pub fn initialize(config: &OverlayConfig) -> Result<Self, InitError> {
        let gui = Rc::new(RefCell::new(Gui::new(config)));
        let window =
            OverlayWindow::create(&config.window_class, &config.window_title, Rc::clone(&gui))?;
        let device = surface::create_device()?;
        let swap_chain = surface::create_swap_chain(&device, config.dxgi_debug)?;
        let composition = Composition::attach(&device.dxgi, &swap_chain, window.hwnd())?;
        let renderer = Renderer::new(&device.device, &device.context, gui.borrow_mut().fonts())?;

        info!("Overlay initialized");
        Ok(Self {
            pipeline: Some(Pipeline {
                view: None,
                renderer,
                _composition: composition,
                swap_chain,
                device,
                window,
                gui,
                clear_color: config.clear_color,
            }),
            options: LoopOptions {
                idle_wait: config.idle_wait(),
            },
        })
    }

    pub fn hwnd(&self) -> Option<HWND> {
        self.pipeline.as_ref().map(|p| p.window.hwnd())
    }

    /// Track and draw over `target` until it closes or WM_QUIT arrives.
    pub fn main_loop<F>(&mut self, target: HWND, callback: F) -> LoopExit
    where
        F: FnMut(bool, Rect, Option<&Ui>),
    {
        self.run(&ForeignWindow::new(target), callback)
    }

    pub fn run<T, F>(&mut self, target: &T, callback: F) -> LoopExit
    where
        T: TargetWindow + ?Sized,
        F: FnMut(bool, Rect, Option<&Ui>),
    {
        let Some(pipeline) = self.pipeline.as_mut() else {
            error!("Overlay loop started after cleanup");
            return LoopExit::CleanedUp;
        };
        FrameLoop::new(self.options.clone()).run(pipeline, target, callback)
    }

    /// Release every device, surface and window resource. Later calls do nothing.
    pub fn cleanup(&mut self) {
        if let Some(pipeline) = self.pipeline.take() {
            drop(pipeline);
            info!("Overlay resources released");
        }
    }
}

impl Drop for Overlay {
    fn drop(&mut self) {
        self.cleanup();
    }
}
