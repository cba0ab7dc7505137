// file_dialogs.rs
use rfd::FileDialog;
use std::path::PathBuf;

use super::conversion::IMAGE_EXTENSIONS;

pub fn select_image() -> Option<PathBuf> {
    FileDialog::new()
        .add_filter("Image", &IMAGE_EXTENSIONS)
        .pick_file()
}

pub fn select_folder(title: &str) -> Option<PathBuf> {
    FileDialog::new().set_title(title).pick_folder()
}
