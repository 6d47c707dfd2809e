use log::warn;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Overlay configuration stored in JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    /// Title of the window to overlay (used by the launcher binary)
    pub target_title: Option<String>,
    /// Window class of the window to overlay, if the title is ambiguous
    pub target_class: Option<String>,
    pub window_class: String,
    pub window_title: String,
    /// How long to wait between polls while the target is unfocused
    pub idle_wait_ms: u64,
    /// Premultiplied RGBA the surface is cleared to every frame
    pub clear_color: [f32; 4],
    /// Pixel height of the GUI font
    pub font_size: f32,
    /// Create the DXGI factory with the debug layer
    pub dxgi_debug: bool,
    pub log_filter: String,
    pub show_framerate: bool,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            target_title: None,
            target_class: None,
            window_class: "GlasspaneOverlay".into(),
            window_title: "Glasspane".into(),
            idle_wait_ms: 100,
            clear_color: [0.0, 0.0, 0.0, 0.0],
            font_size: 14.0,
            dxgi_debug: false,
            log_filter: "info".into(),
            show_framerate: true,
        }
    }
}

impl OverlayConfig {
    pub fn idle_wait(&self) -> Duration {
        Duration::from_millis(self.idle_wait_ms)
    }
}

pub fn config_path() -> PathBuf {
    let base = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    base.join("Glasspane").join("config.json")
}

pub fn load_config() -> OverlayConfig {
    load_from(&config_path())
}

/// Missing files give the defaults; unreadable ones are reported and ignored.
pub fn load_from(path: &Path) -> OverlayConfig {
    let data = match fs::read_to_string(path) {
        Ok(data) => data,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return OverlayConfig::default(),
        Err(e) => {
            warn!("Could not read {}: {}", path.display(), e);
            return OverlayConfig::default();
        }
    };
    serde_json::from_str(&data).unwrap_or_else(|e| {
        warn!("Ignoring malformed config {}: {}", path.display(), e);
        OverlayConfig::default()
    })
}

pub fn save_config(config: &OverlayConfig) -> io::Result<()> {
    save_to(&config_path(), config)
}

pub fn save_to(path: &Path, config: &OverlayConfig) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let data = serde_json::to_string_pretty(config)?;
    fs::write(path, data)
}
