use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::channel;
use std::sync::Arc;
use crate::app::App;
use crate::app::conversion::{self, ConversionJob, Encoder, OutputConfig, SelectionMode};
use crate::app::file_dialogs;
use crate::settings::{quality_label, QUALITY_PRESETS};
use egui::{Color32, Frame, ProgressBar, Rounding, Stroke, RichText};

const ACCENT: Color32 = Color32::from_rgb(100, 200, 250);

pub fn render(app: &mut App, ctx: &egui::Context) {
    let frame = Frame {
        fill: Color32::from_rgb(30, 30, 40),
        rounding: Rounding::same(10.0),
        stroke: Stroke::new(1.0, ACCENT),
        inner_margin: egui::style::Margin::same(20.0),
        ..Default::default()
    };

    render_alert(app, ctx);

    egui::CentralPanel::default().frame(frame).show(ctx, |ui| {
        ui.heading(RichText::new("WebP Batch Converter").size(28.0).color(ACCENT));
        ui.add_space(20.0);

        let idle = !app.is_converting();

        ui.add_enabled_ui(idle, |ui| {
            ui.label("Title (optional):");
            ui.text_edit_singleline(&mut app.custom_title);
            ui.add_space(10.0);

            ui.label("Compression level (quality):");
            egui::ComboBox::from_id_source("quality")
                .selected_text(quality_label(app.quality))
                .width(300.0)
                .show_ui(ui, |ui| {
                    for (value, label) in QUALITY_PRESETS {
                        ui.selectable_value(&mut app.quality, value, label);
                    }
                });
            ui.add_space(10.0);

            ui.horizontal(|ui| {
                if ui.button("Select 1 file").clicked() {
                    if let Some(file) = file_dialogs::select_image() {
                        app.select(file, SelectionMode::SingleFile);
                    }
                }
                if ui.button("Select folder").clicked() {
                    if let Some(folder) = file_dialogs::select_folder("Select a folder") {
                        app.select(folder, SelectionMode::FlatFolder);
                    }
                }
                if ui.button("Convert whole directory").clicked() {
                    if let Some(folder) = file_dialogs::select_folder("Select the root directory") {
                        app.select(folder, SelectionMode::DirectoryTree);
                    }
                }
                if ui.button("Choose destination folder").clicked() {
                    if let Some(dir) = file_dialogs::select_folder("Select the destination folder") {
                        app.logger.log(format!("Output directory: {}", dir.display()));
                        app.output_directory = Some(dir);
                    }
                }
            });
        });

        ui.add_space(10.0);

        ui.group(|ui| {
            ui.set_min_width(ui.available_width());
            let source = match &app.selection {
                Some(selection) => format!(
                    "{} image(s) from {}",
                    app.input_files.len(),
                    selection.root.display()
                ),
                None => "Nothing selected".to_string(),
            };
            ui.label(format!("Input: {}", source));
            match &app.output_directory {
                Some(dir) => ui.label(format!("Destination: {}", dir.display())),
                None => ui.label("Destination: not selected"),
            };
        });

        ui.add_space(10.0);

        if idle {
            let start = egui::Button::new(RichText::new("Start conversion").strong())
                .fill(Color32::from_rgb(40, 120, 60));
            if ui.add_sized([ui.available_width(), 30.0], start).clicked() {
                start_conversion(app);
            }
        } else if ui.add_sized([ui.available_width(), 30.0], egui::Button::new("Stop")).clicked() {
            app.cancel_flag.store(true, Ordering::SeqCst);
            app.logger.log("Stopping after the current file...".to_string());
        }

        ui.add_space(10.0);

        // Conversion Log with Progress Bar
        ui.group(|ui| {
            ui.set_min_width(ui.available_width());
            ui.label(RichText::new("Conversion Log").size(16.0).color(ACCENT));

            let progress = &app.conversion_progress;
            if progress.total > 0 {
                let ratio = progress.ratio();
                ui.add(ProgressBar::new(ratio).text(format!(
                    "{} / {} ({:.0}%)",
                    progress.completed,
                    progress.total,
                    ratio * 100.0
                )));
            }
            if !progress.status.is_empty() {
                ui.label(&progress.status);
            }

            egui::ScrollArea::vertical()
                .max_height(200.0)
                .auto_shrink([false; 2])
                .show(ui, |ui| {
                    let logs = app.log_messages.lock();
                    for log in logs.iter() {
                        if log.contains("error") || log.contains("Failed") {
                            ui.label(RichText::new(log).color(Color32::RED));
                        } else {
                            ui.label(log);
                        }
                    }
                });
        });
    });
}

fn render_alert(app: &mut App, ctx: &egui::Context) {
    let mut dismissed = false;
    if let Some(alert) = &app.alert {
        egui::Window::new(alert.title.as_str())
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
            .show(ctx, |ui| {
                ui.label(alert.message.as_str());
                if ui.button("OK").clicked() {
                    dismissed = true;
                }
            });
    }
    if dismissed {
        app.alert = None;
    }
}

fn output_config(app: &App) -> OutputConfig {
    let title = app.custom_title.as_str();
    let tree = app
        .selection
        .as_ref()
        .filter(|selection| selection.mode == SelectionMode::DirectoryTree);

    OutputConfig {
        output_root: app.output_directory.clone().unwrap_or_default(),
        custom_title: if title.trim().is_empty() { None } else { Some(title.to_string()) },
        preserve_structure: tree.is_some(),
        base_root: tree.map(|selection| selection.root.clone()),
    }
}

fn start_conversion(app: &mut App) {
    if app.is_converting() {
        return;
    }

    let job = match ConversionJob::build(
        app.input_files.clone(),
        &output_config(app),
        u32::from(app.quality),
    ) {
        Ok(job) => job,
        Err(err) => {
            app.logger.log(format!("error: {}", err));
            app.show_alert("Error", err.to_string());
            return;
        }
    };

    let encoder = Encoder::new(app.settings.encoder_path.clone())
        .with_timeout(app.settings.encoder_timeout);
    let logger = app.logger.clone();
    let cancel = Arc::new(AtomicBool::new(false));
    app.cancel_flag = cancel.clone();

    app.conversion_progress.total = job.len();
    app.conversion_progress.completed = 0;
    app.conversion_progress.status = "Starting conversion...".to_string();

    let (sender, receiver) = channel();
    app.conversion_receiver = Some(receiver);

    std::thread::spawn(move || {
        conversion::convert_images(job, encoder, cancel, logger, sender);
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::Selection;
    use crate::settings::Settings;
    use std::path::PathBuf;

    fn app() -> App {
        App::new(Settings {
            encoder_path: PathBuf::from("cwebp"),
            encoder_timeout: None,
        })
    }

    #[test]
    fn whole_directory_selection_preserves_structure() {
        let mut app = app();
        app.output_directory = Some(PathBuf::from("/out"));
        app.custom_title = "  trip ".to_string();
        app.selection = Some(Selection {
            root: PathBuf::from("/photos"),
            mode: SelectionMode::DirectoryTree,
        });

        let config = output_config(&app);
        assert_eq!(config.output_root, PathBuf::from("/out"));
        assert_eq!(config.custom_title.as_deref(), Some("  trip "));
        assert!(config.preserve_structure);
        assert_eq!(config.base_root, Some(PathBuf::from("/photos")));
    }

    #[test]
    fn folder_selection_writes_flat() {
        let mut app = app();
        app.selection = Some(Selection {
            root: PathBuf::from("/photos"),
            mode: SelectionMode::FlatFolder,
        });

        let config = output_config(&app);
        assert!(!config.preserve_structure);
        assert!(config.base_root.is_none());
        assert!(config.custom_title.is_none());
    }

    #[test]
    fn start_without_destination_shows_error_and_stays_idle() {
        let mut app = app();
        app.input_files = vec![PathBuf::from("/photos/a.png")];

        start_conversion(&mut app);

        assert!(!app.is_converting());
        let alert = app.alert.expect("alert");
        assert_eq!(alert.title, "Error");
        assert_eq!(alert.message, "Select a destination folder.");
    }
}
