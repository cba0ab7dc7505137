// main.rs
mod app;
mod settings;
mod utils;

use app::App;
use eframe::NativeOptions;
use settings::Settings;

fn main() {
    let settings = Settings::from_env();

    let native_options = NativeOptions {
        initial_window_size: Some(egui::Vec2::new(720.0, 560.0)),
        resizable: true,
        ..Default::default()
    };
    eframe::run_native(
        "WebP Batch Converter",
        native_options,
        Box::new(move |_cc| Box::new(App::new(settings))),
    );
}
