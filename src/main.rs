// Prevents console window in release builds
#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

use glasspane::config;
use std::process::ExitCode;

fn init_logging(filter: &str) {
    env_logger::Builder::new()
        .parse_filters(filter)
        .parse_default_env()
        .format_timestamp_millis()
        .init();
}

#[cfg(windows)]
fn main() -> ExitCode {
    use glasspane::imgui::{Condition, WindowFlags};
    use glasspane::overlay::target::ForeignWindow;
    use glasspane::{Overlay, TargetWindow};
    use log::{error, info, warn};

    let mut cfg = config::load_config();
    init_logging(&cfg.log_filter);

    // A title on the command line wins over the config file
    if let Some(title) = std::env::args().nth(1) {
        cfg.target_title = Some(title);
    }
    if cfg.target_title.is_none() && cfg.target_class.is_none() {
        error!(
            "No target window configured; pass a window title or set target_title in {}",
            config::config_path().display()
        );
        return ExitCode::FAILURE;
    }

    let Some(target) = ForeignWindow::find(cfg.target_title.as_deref(), cfg.target_class.as_deref())
    else {
        error!(
            "Target window not found (title {:?}, class {:?})",
            cfg.target_title, cfg.target_class
        );
        return ExitCode::FAILURE;
    };
    if !target.is_visible() {
        warn!("Target window is not visible yet; the overlay appears once it has focus");
    }

    let mut overlay = match Overlay::initialize(&cfg) {
        Ok(overlay) => overlay,
        Err(e) => {
            error!("Overlay initialization failed: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let show_framerate = cfg.show_framerate;
    let exit = overlay.run(&target, |focused, rect, ui| {
        let Some(ui) = ui else {
            return;
        };
        debug_assert!(focused);

        let (w, h) = (rect.width() as f32, rect.height() as f32);
        ui.get_foreground_draw_list()
            .add_rect([0.5, 0.5], [w - 0.5, h - 0.5], [0.0, 0.0, 1.0, 1.0])
            .build();

        if show_framerate {
            let fps = ui.io().framerate;
            let ms = if fps > 0.0 { 1000.0 / fps } else { 0.0 };
            ui.window("Framerate")
                .position([15.0, 80.0], Condition::Always)
                .size([200.0, 30.0], Condition::Always)
                .flags(WindowFlags::NO_RESIZE | WindowFlags::NO_TITLE_BAR)
                .build(|| ui.text(format!("{:.3} ms/frame ({:.1} FPS)", ms, fps)));
        }
    });
    info!("Overlay stopped: {:?}", exit);

    overlay.cleanup();
    ExitCode::SUCCESS
}

#[cfg(not(windows))]
fn main() -> ExitCode {
    let cfg = config::load_config();
    init_logging(&cfg.log_filter);
    log::error!("The overlay requires Windows (DirectComposition)");
    ExitCode::FAILURE
}
