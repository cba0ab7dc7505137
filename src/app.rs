// app.rs
pub mod gui;
pub mod conversion;
pub mod file_dialogs;

use eframe::egui;
use eframe::App as EframeApp;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use parking_lot::Mutex;
use std::sync::mpsc::{Receiver, TryRecvError};

use crate::settings::{Settings, DEFAULT_QUALITY};
use crate::utils::Logger;
use conversion::{enumerate, BatchReport, ProgressEvent, SelectionMode};

pub struct App {
    pub settings: Settings,
    // Application state
    pub input_files: Vec<PathBuf>,
    pub selection: Option<Selection>,
    pub output_directory: Option<PathBuf>,
    pub custom_title: String,
    pub quality: u8,
    pub conversion_progress: ConversionProgress,
    pub log_messages: Arc<Mutex<Vec<String>>>,
    pub logger: Logger,
    pub cancel_flag: Arc<AtomicBool>,
    pub conversion_receiver: Option<Receiver<ConversionUpdate>>,
    pub alert: Option<Alert>,
}

/// What the user picked, and how it was expanded into `input_files`.
#[derive(Clone, Debug)]
pub struct Selection {
    pub root: PathBuf,
    pub mode: SelectionMode,
}

pub enum ConversionUpdate {
    Progress(ProgressEvent),
    Completed(BatchReport),
}

#[derive(Default)]
pub struct ConversionProgress {
    pub total: usize,
    pub completed: usize,
    pub status: String,
}

impl ConversionProgress {
    pub fn ratio(&self) -> f32 {
        if self.total == 0 {
            0.0
        } else {
            self.completed as f32 / self.total as f32
        }
    }
}

/// Modal message shown on top of the main panel.
#[derive(Clone, Debug)]
pub struct Alert {
    pub title: String,
    pub message: String,
}

impl App {
    pub fn new(settings: Settings) -> Self {
        let log_messages = Arc::new(Mutex::new(Vec::new()));
        let logger = Logger::new(log_messages.clone());
        logger.log(format!("Using encoder {}", settings.encoder_path.display()));

        Self {
            settings,
            input_files: Vec::new(),
            selection: None,
            output_directory: None,
            custom_title: String::new(),
            quality: DEFAULT_QUALITY,
            conversion_progress: ConversionProgress::default(),
            log_messages,
            logger,
            cancel_flag: Arc::new(AtomicBool::new(false)),
            conversion_receiver: None,
            alert: None,
        }
    }

    pub fn is_converting(&self) -> bool {
        self.conversion_receiver.is_some()
    }

    /// Replaces the current selection with the images found under `root`.
    pub fn select(&mut self, root: PathBuf, mode: SelectionMode) {
        match enumerate(&root, mode) {
            Ok(files) => {
                self.logger.log(format!(
                    "Selected {} image(s) from {}",
                    files.len(),
                    root.display()
                ));
                self.input_files = files;
                self.selection = Some(Selection { root, mode });
            }
            Err(err) => {
                self.logger.log(format!("Failed to read {}: {}", root.display(), err));
                self.show_alert("Error", format!("Could not read {}: {}", root.display(), err));
            }
        }
    }

    pub fn show_alert(&mut self, title: &str, message: String) {
        self.alert = Some(Alert {
            title: title.to_string(),
            message,
        });
    }

    /// Applies every update the worker has queued since the last frame.
    fn drain_updates(&mut self) {
        let mut finished = None;
        let mut disconnected = false;

        if let Some(receiver) = &self.conversion_receiver {
            loop {
                match receiver.try_recv() {
                    Ok(ConversionUpdate::Progress(event)) => {
                        self.conversion_progress.completed = event.completed;
                        self.conversion_progress.total = event.total;
                        self.conversion_progress.status =
                            format!("Converting image {} of {}", event.completed, event.total);
                    }
                    Ok(ConversionUpdate::Completed(report)) => {
                        finished = Some(report);
                        break;
                    }
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        disconnected = true;
                        break;
                    }
                }
            }
        }

        if let Some(report) = finished {
            self.conversion_receiver = None;
            self.finish(report);
        } else if disconnected {
            self.conversion_receiver = None;
            let message = "The conversion stopped unexpectedly before finishing.".to_string();
            self.logger.log(format!("error: {}", message));
            self.conversion_progress.status = message.clone();
            self.show_alert("Error", message);
        }
    }

    fn finish(&mut self, report: BatchReport) {
        for failure in &report.failures {
            self.logger.log(format!(
                "error: {} failed: {}",
                failure.input.display(),
                failure.error
            ));
        }

        let summary = report.summary();
        self.logger.log(summary.clone());
        self.conversion_progress.status = summary.clone();

        if let Some(dir) = &self.output_directory {
            if let Err(err) = open::that(dir) {
                self.logger.log(format!("Could not open {}: {}", dir.display(), err));
            }
        }

        self.show_alert("Completed", summary);
    }
}

impl EframeApp for App {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.drain_updates();

        // Render the GUI
        gui::render(self, ctx);

        // The worker cannot wake the UI, so keep polling while it runs.
        if self.is_converting() {
            ctx.request_repaint();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app() -> App {
        App::new(Settings {
            encoder_path: PathBuf::from("cwebp"),
            encoder_timeout: None,
        })
    }

    #[test]
    fn selecting_a_folder_lists_its_images() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.png"), b"").unwrap();
        std::fs::write(dir.path().join("b.txt"), b"").unwrap();

        let mut app = app();
        app.select(dir.path().to_path_buf(), SelectionMode::FlatFolder);

        assert_eq!(app.input_files, vec![dir.path().join("a.png")]);
        assert_eq!(app.selection.as_ref().map(|s| s.mode), Some(SelectionMode::FlatFolder));
    }

    #[test]
    fn unreadable_selection_keeps_previous_state() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app();
        app.select(dir.path().join("missing"), SelectionMode::DirectoryTree);

        assert!(app.input_files.is_empty());
        assert!(app.selection.is_none());
        assert_eq!(app.alert.as_ref().map(|a| a.title.as_str()), Some("Error"));
    }

    #[test]
    fn dead_worker_returns_ui_to_idle() {
        let mut app = app();
        let (sender, receiver) = std::sync::mpsc::channel();
        app.conversion_receiver = Some(receiver);

        sender
            .send(ConversionUpdate::Progress(ProgressEvent { completed: 1, total: 3 }))
            .unwrap();
        app.drain_updates();
        assert!(app.is_converting());
        assert_eq!(app.conversion_progress.completed, 1);

        drop(sender);
        app.drain_updates();

        assert!(!app.is_converting());
        assert_eq!(app.alert.as_ref().map(|a| a.title.as_str()), Some("Error"));
    }

    #[test]
    fn completion_is_acknowledged_once_with_failure_count() {
        let mut app = app();
        app.finish(BatchReport {
            total: 2,
            converted: 1,
            failures: vec![conversion::FileFailure {
                input: PathBuf::from("a.png"),
                output: PathBuf::from("a.webp"),
                error: conversion::ConvertError::Exit {
                    code: Some(1),
                    stderr: String::new(),
                },
            }],
            ..Default::default()
        });

        let alert = app.alert.expect("alert");
        assert_eq!(alert.title, "Completed");
        assert_eq!(alert.message, "Conversion finished! 1 converted, 1 failed.");
        assert_eq!(app.conversion_progress.status, alert.message);
    }
}
