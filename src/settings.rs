// settings.rs
use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENCODER_PATH_VAR: &str = "CWEBP_PATH";
pub const ENCODER_TIMEOUT_VAR: &str = "CWEBP_TIMEOUT_SECS";
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_QUALITY: u8 = 80;

/// Quality choices offered in the UI: (value, label).
pub const QUALITY_PRESETS: [(u8, &str); 5] = [
    (100, "100 - Low compression (best quality)"),
    (80, "80 - Medium"),
    (60, "60 - High compression"),
    (40, "40 - Very high compression"),
    (20, "20 - Extreme compression"),
];

#[derive(Debug, Clone)]
pub struct Settings {
    pub encoder_path: PathBuf,
    /// `None` means wait for the encoder indefinitely.
    pub encoder_timeout: Option<Duration>,
}

impl Settings {
    /// Resolves settings from the environment and the executable location.
    pub fn from_env() -> Self {
        let exe_dir = env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf));

        Self {
            encoder_path: resolve_encoder_path(env::var_os(ENCODER_PATH_VAR), exe_dir.as_deref()),
            encoder_timeout: parse_timeout(env::var(ENCODER_TIMEOUT_VAR).ok().as_deref()),
        }
    }
}

pub fn encoder_file_name() -> String {
    format!("cwebp{}", env::consts::EXE_SUFFIX)
}

pub fn resolve_encoder_path(from_env: Option<OsString>, exe_dir: Option<&Path>) -> PathBuf {
    if let Some(path) = from_env.filter(|p| !p.is_empty()) {
        return PathBuf::from(path);
    }

    if let Some(dir) = exe_dir {
        let bundled = dir.join(encoder_file_name());
        if bundled.is_file() {
            return bundled;
        }
    }

    // Left to the OS PATH lookup.
    PathBuf::from(encoder_file_name())
}

pub fn parse_timeout(raw: Option<&str>) -> Option<Duration> {
    let secs = raw
        .and_then(|s| s.trim().parse::<u64>().ok())
        .unwrap_or(DEFAULT_TIMEOUT_SECS);
    if secs == 0 {
        None
    } else {
        Some(Duration::from_secs(secs))
    }
}

pub fn quality_label(quality: u8) -> String {
    QUALITY_PRESETS
        .iter()
        .find(|(value, _)| *value == quality)
        .map(|(_, label)| label.to_string())
        .unwrap_or_else(|| quality.to_string())
}
