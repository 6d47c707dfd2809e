// Dear ImGui context owned by the overlay.
//
// The window procedure queues input into it between frames, the frame loop
// builds one frame per focused iteration, and the renderer submits the draw
// data that frame leaves behind.

use crate::config::OverlayConfig;
use imgui::{Context, DrawData, FontAtlas, FontConfig, FontSource, Io, Ui};
use std::time::{Duration, Instant};

/// Timestep reported for the first frame after the overlay was hidden.
const RESUME_DELTA: Duration = Duration::from_micros(16_667);

pub struct Gui {
    ctx: Context,
    last_frame: Option<Instant>,
    finalized: bool,
}

impl Gui {
    pub fn new(config: &OverlayConfig) -> Self {
        let mut ctx = Context::create();
        ctx.set_ini_filename(None);
        ctx.set_log_filename(None);
        ctx.set_platform_name(Some(format!("glasspane {}", env!("CARGO_PKG_VERSION"))));
        ctx.style_mut().use_classic_colors();

        ctx.fonts().add_font(&[FontSource::DefaultFontData {
            config: Some(FontConfig {
                size_pixels: config.font_size.max(1.0),
                ..FontConfig::default()
            }),
        }]);
        // Built up front so frames can run before a renderer uploads it.
        ctx.fonts().build_rgba32_texture();

        Self {
            ctx,
            last_frame: None,
            finalized: false,
        }
    }

    pub fn io_mut(&mut self) -> &mut Io {
        self.ctx.io_mut()
    }

    pub fn fonts(&mut self) -> &mut FontAtlas {
        self.ctx.fonts()
    }

    /// The next frame reports a nominal timestep instead of the time spent
    /// hidden, so the framerate counter does not dip after every refocus.
    pub fn suspend(&mut self) {
        self.last_frame = None;
    }

    /// New frame sized `size`, built by `draw`, then finalized.
    pub fn frame(&mut self, size: (u32, u32), draw: impl FnOnce(&Ui)) {
        let now = Instant::now();
        let delta = self.last_frame.map_or(RESUME_DELTA, |last| now - last);
        self.last_frame = Some(now);

        let io = self.ctx.io_mut();
        io.display_size = [size.0 as f32, size.1 as f32];
        io.update_delta_time(delta);

        let ui = self.ctx.new_frame();
        draw(ui);
        self.ctx.render();
        self.finalized = true;
    }

    /// Draw data of the last finished frame, valid until the next `frame`.
    pub fn draw_data(&self) -> Option<&DrawData> {
        if !self.finalized {
            return None;
        }
        // DrawData is a transparent view of the ImDrawData the context keeps
        // until its next NewFrame, which needs `&mut self`.
        unsafe { imgui::sys::igGetDrawData().cast::<DrawData>().as_ref() }
    }
}

/// Serializes tests that create a context; only one may exist at a time.
#[cfg(test)]
pub(crate) fn test_lock() -> std::sync::MutexGuard<'static, ()> {
    use std::sync::Mutex;
    static LOCK: Mutex<()> = Mutex::new(());
    LOCK.lock().unwrap_or_else(|e| e.into_inner())
}
