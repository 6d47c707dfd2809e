//! Click-through overlay that stays pixel-aligned with a foreign window and
//! draws a caller-supplied Dear ImGui scene over it while that window has
//! focus.
//!
//! The frame loop, geometry and GUI context are platform independent; the
//! native pipeline lives in [`overlay`] (Windows only).

pub mod config;
pub mod error;
pub mod frame_loop;
pub mod geometry;
pub mod gui;
#[cfg(windows)]
pub mod overlay;

pub use config::OverlayConfig;
pub use error::{InitError, PlatformError, RuntimeError};
pub use frame_loop::{Backend, FrameLoop, LoopExit, LoopOptions, TargetWindow};
pub use geometry::Rect;
pub use gui::Gui;
pub use imgui;
#[cfg(windows)]
pub use overlay::Overlay;
