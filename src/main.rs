mod app;
mod config;
mod data;
mod export;
mod gui;
mod log;
mod session;

use app::VasoApp;

fn main() -> eframe::Result<()> {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    ::log::info!(
        "Starting Vessel Diameter Viewer v{}",
        env!("CARGO_PKG_VERSION")
    );

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1400.0, 900.0])
            .with_min_inner_size([900.0, 600.0])
            .with_maximized(true)
            .with_title("Vessel Diameter Viewer")
            .with_drag_and_drop(true),
        ..Default::default()
    };

    eframe::run_native(
        "Vessel Diameter Viewer",
        options,
        Box::new(|cc| Ok(Box::new(VasoApp::new(cc)))),
    )
}
