// conversion.rs
//! Batch conversion pipeline: enumerate inputs, plan output names, run the
//! external encoder once per file and report progress as it goes.

use std::fmt;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;
use walkdir::WalkDir;

use crate::app::ConversionUpdate;
use crate::settings::DEFAULT_QUALITY;
use crate::utils::{get_memory_usage, measure_time, Logger};

pub const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];
pub const OUTPUT_EXTENSION: &str = "webp";

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Problems that prevent a batch from starting at all.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Select a file or folder first.")]
    NoInput,
    #[error("Select a destination folder.")]
    NoDestination,
    #[error("Preserving the directory structure requires a base input folder.")]
    MissingBaseRoot,
    #[error("Quality must be between 0 and 100, got {0}.")]
    QualityOutOfRange(u32),
    #[error("{} is not a PNG or JPEG image.", .0.display())]
    UnsupportedInput(PathBuf),
    #[error("{} is not inside {}.", .input.display(), .base.display())]
    OutsideBaseRoot { input: PathBuf, base: PathBuf },
}

/// Failure of a single file. Never aborts the batch.
#[derive(Error, Debug)]
pub enum ConvertError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to create output directory {}: {source}", .path.display())]
    CreateDir { path: PathBuf, source: io::Error },
    #[error("failed to start encoder: {0}")]
    Spawn(io::Error),
    #[error("failed while waiting for encoder: {0}")]
    Wait(io::Error),
    #[error("encoder exited with {}{}", describe_exit(.code), last_line(.stderr))]
    Exit { code: Option<i32>, stderr: String },
    #[error("encoder timed out after {0:?}")]
    TimedOut(Duration),
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("code {}", code),
        None => "no exit code (terminated by signal)".to_string(),
    }
}

fn last_line(stderr: &str) -> String {
    stderr
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .last()
        .map(|line| format!(": {}", line))
        .unwrap_or_default()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(u8);

impl Quality {
    pub fn new(value: u32) -> Result<Self, ConfigError> {
        if value > 100 {
            return Err(ConfigError::QualityOutOfRange(value));
        }
        Ok(Quality(value as u8))
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Quality(DEFAULT_QUALITY)
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionMode {
    /// One image picked directly.
    SingleFile,
    /// Images directly inside a folder, subfolders ignored.
    FlatFolder,
    /// Every image below a root, at any depth.
    DirectoryTree,
}

pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.iter().any(|known| ext.eq_ignore_ascii_case(known)))
        .unwrap_or(false)
}

/// Lists the convertible images for a selection, in file-name order.
pub fn enumerate(selection: &Path, mode: SelectionMode) -> io::Result<Vec<PathBuf>> {
    match mode {
        SelectionMode::SingleFile => {
            if is_image_file(selection) {
                Ok(vec![selection.to_path_buf()])
            } else {
                Ok(Vec::new())
            }
        }
        SelectionMode::FlatFolder => {
            let mut files = Vec::new();
            for entry in fs::read_dir(selection)? {
                let path = match entry {
                    Ok(entry) => entry.path(),
                    Err(_) => continue,
                };
                if path.is_file() && is_image_file(&path) {
                    files.push(path);
                }
            }
            files.sort();
            Ok(files)
        }
        SelectionMode::DirectoryTree => {
            // Surface a missing root instead of returning an empty tree.
            fs::metadata(selection)?;
            Ok(WalkDir::new(selection)
                .sort_by_file_name()
                .into_iter()
                .filter_map(|entry| entry.ok())
                .filter(|entry| entry.file_type().is_file() && is_image_file(entry.path()))
                .map(|entry| entry.into_path())
                .collect())
        }
    }
}

/// Where and under which names outputs are written.
#[derive(Debug, Clone, Default)]
pub struct OutputConfig {
    pub output_root: PathBuf,
    pub custom_title: Option<String>,
    pub preserve_structure: bool,
    /// Only consulted when `preserve_structure` is set.
    pub base_root: Option<PathBuf>,
}

impl OutputConfig {
    fn title(&self) -> Option<&str> {
        self.custom_title
            .as_deref()
            .filter(|title| !title.trim().is_empty())
    }
}

/// Output file name without extension. `index` is 1-based.
pub fn output_name(input: &Path, index: usize, config: &OutputConfig) -> String {
    match config.title() {
        Some(title) => format!("{}_{}", title, index),
        None => input
            .file_stem()
            .unwrap_or_default()
            .to_string_lossy()
            .into_owned(),
    }
}

/// Computes the destination path without touching the filesystem.
pub fn plan_output_path(
    input: &Path,
    index: usize,
    config: &OutputConfig,
) -> Result<PathBuf, ConfigError> {
    let file_name = format!("{}.{}", output_name(input, index, config), OUTPUT_EXTENSION);

    if !config.preserve_structure {
        return Ok(config.output_root.join(file_name));
    }

    let base = config.base_root.as_deref().ok_or(ConfigError::MissingBaseRoot)?;
    let parent = input.parent().unwrap_or_else(|| Path::new(""));
    let relative = parent
        .strip_prefix(base)
        .map_err(|_| ConfigError::OutsideBaseRoot {
            input: input.to_path_buf(),
            base: base.to_path_buf(),
        })?;

    Ok(config.output_root.join(relative).join(file_name))
}

/// Like [`plan_output_path`], but also creates the mirrored directory in
/// preserve-structure mode.
pub fn compute_output_path(
    input: &Path,
    index: usize,
    config: &OutputConfig,
) -> Result<PathBuf, ConvertError> {
    let output = plan_output_path(input, index, config)?;
    if config.preserve_structure {
        ensure_parent_dir(&output)?;
    }
    Ok(output)
}

fn ensure_parent_dir(output: &Path) -> Result<(), ConvertError> {
    match output.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => {
            fs::create_dir_all(dir).map_err(|source| ConvertError::CreateDir {
                path: dir.to_path_buf(),
                source,
            })
        }
        _ => Ok(()),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub input: PathBuf,
    pub output: PathBuf,
}

/// Everything one run needs. Consumed by [`run_batch`].
#[derive(Debug, Clone)]
pub struct ConversionJob {
    items: Vec<WorkItem>,
    quality: Quality,
    mirror_dirs: bool,
}

impl ConversionJob {
    pub fn build(
        inputs: Vec<PathBuf>,
        config: &OutputConfig,
        quality: u32,
    ) -> Result<Self, ConfigError> {
        if inputs.is_empty() {
            return Err(ConfigError::NoInput);
        }
        if config.output_root.as_os_str().is_empty() {
            return Err(ConfigError::NoDestination);
        }
        if config.preserve_structure && config.base_root.is_none() {
            return Err(ConfigError::MissingBaseRoot);
        }
        let quality = Quality::new(quality)?;

        let items = inputs
            .into_iter()
            .enumerate()
            .map(|(position, input)| {
                if !is_image_file(&input) {
                    return Err(ConfigError::UnsupportedInput(input));
                }
                let output = plan_output_path(&input, position + 1, config)?;
                Ok(WorkItem { input, output })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            items,
            quality,
            mirror_dirs: config.preserve_structure,
        })
    }

    pub fn items(&self) -> &[WorkItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn quality(&self) -> Quality {
        self.quality
    }
}

/// Handle on the external `cwebp`-compatible encoder.
#[derive(Debug, Clone)]
pub struct Encoder {
    path: PathBuf,
    timeout: Option<Duration>,
}

impl Encoder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Runs `<encoder> -q <quality> <input> -o <output>` without a shell.
    pub fn convert_one(
        &self,
        input: &Path,
        output: &Path,
        quality: Quality,
    ) -> Result<(), ConvertError> {
        let mut child = Command::new(&self.path)
            .arg("-q")
            .arg(quality.to_string())
            .arg(input)
            .arg("-o")
            .arg(output)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(ConvertError::Spawn)?;

        // Drained on its own thread so a chatty encoder never blocks on a full pipe.
        let stderr_handle = child.stderr.take().map(|mut stderr| {
            thread::spawn(move || {
                let mut buf = Vec::new();
                let _ = stderr.read_to_end(&mut buf);
                String::from_utf8_lossy(&buf).into_owned()
            })
        });

        let status = self.wait(&mut child)?;
        if status.success() {
            return Ok(());
        }

        let stderr = stderr_handle
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();
        Err(ConvertError::Exit {
            code: status.code(),
            stderr,
        })
    }

    fn wait(&self, child: &mut Child) -> Result<ExitStatus, ConvertError> {
        let limit = match self.timeout {
            Some(limit) => limit,
            None => return child.wait().map_err(ConvertError::Wait),
        };

        let started = Instant::now();
        loop {
            match child.try_wait() {
                Ok(Some(status)) => return Ok(status),
                Ok(None) if started.elapsed() >= limit => {
                    kill_and_reap(child);
                    return Err(ConvertError::TimedOut(limit));
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(err) => {
                    kill_and_reap(child);
                    return Err(ConvertError::Wait(err));
                }
            }
        }
    }
}

/// Kills the child and waits on it so no zombie is left behind.
fn kill_and_reap(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressEvent {
    pub completed: usize,
    pub total: usize,
}

#[derive(Debug)]
pub struct FileFailure {
    pub input: PathBuf,
    pub output: PathBuf,
    pub error: ConvertError,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub total: usize,
    pub converted: usize,
    pub failures: Vec<FileFailure>,
    pub cancelled: bool,
    pub elapsed: Duration,
}

impl BatchReport {
    pub fn attempted(&self) -> usize {
        self.converted + self.failures.len()
    }

    pub fn summary(&self) -> String {
        let mut message = if self.cancelled {
            format!(
                "Conversion stopped after {} of {} files.",
                self.attempted(),
                self.total
            )
        } else {
            "Conversion finished!".to_string()
        };
        message.push_str(&format!(" {} converted", self.converted));
        if self.failures.is_empty() {
            message.push('.');
        } else {
            message.push_str(&format!(", {} failed.", self.failures.len()));
        }
        message
    }
}

/// Iterator over the progress of one batch. Yields one event per attempted
/// file and is exhausted once the job is done or cancelled.
pub struct BatchRun {
    items: std::vec::IntoIter<WorkItem>,
    encoder: Encoder,
    quality: Quality,
    mirror_dirs: bool,
    total: usize,
    completed: usize,
    converted: usize,
    failures: Vec<FileFailure>,
    cancel: Option<Arc<AtomicBool>>,
    cancelled: bool,
    started: Instant,
    logger: Option<Logger>,
}

pub fn run_batch(job: ConversionJob, encoder: &Encoder) -> BatchRun {
    BatchRun {
        total: job.items.len(),
        items: job.items.into_iter(),
        encoder: encoder.clone(),
        quality: job.quality,
        mirror_dirs: job.mirror_dirs,
        completed: 0,
        converted: 0,
        failures: Vec::new(),
        cancel: None,
        cancelled: false,
        started: Instant::now(),
        logger: None,
    }
}

impl BatchRun {
    /// The flag is checked between files, never while the encoder runs.
    pub fn with_cancel(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn into_report(self) -> BatchReport {
        BatchReport {
            total: self.total,
            converted: self.converted,
            failures: self.failures,
            cancelled: self.cancelled,
            elapsed: self.started.elapsed(),
        }
    }

    fn log(&self, message: String) {
        if let Some(logger) = &self.logger {
            logger.log(message);
        }
    }

    fn cancel_requested(&self) -> bool {
        self.cancel
            .as_ref()
            .map(|flag| flag.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    fn process(&self, item: &WorkItem) -> Result<(), ConvertError> {
        if self.mirror_dirs {
            ensure_parent_dir(&item.output)?;
        }
        self.encoder.convert_one(&item.input, &item.output, self.quality)
    }
}

impl Iterator for BatchRun {
    type Item = ProgressEvent;

    fn next(&mut self) -> Option<ProgressEvent> {
        if self.items.len() == 0 {
            return None;
        }
        if self.cancel_requested() {
            self.cancelled = true;
            self.items = Vec::new().into_iter();
            self.log(format!(
                "Cancelled with {} of {} files remaining",
                self.total - self.completed,
                self.total
            ));
            return None;
        }

        let item = self.items.next()?;
        let (result, duration) = measure_time(|| self.process(&item));
        self.completed += 1;

        match result {
            Ok(()) => {
                self.converted += 1;
                self.log(format!(
                    "Converted {} -> {} in {:?}",
                    item.input.display(),
                    item.output.display(),
                    duration
                ));
            }
            Err(error) => {
                self.log(format!("Failed to convert {}: {}", item.input.display(), error));
                self.failures.push(FileFailure {
                    input: item.input,
                    output: item.output,
                    error,
                });
            }
        }

        Some(ProgressEvent {
            completed: self.completed,
            total: self.total,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.items.len()))
    }
}

/// Background worker body: drives one batch and forwards its progress.
pub fn convert_images(
    job: ConversionJob,
    encoder: Encoder,
    cancel: Arc<AtomicBool>,
    logger: Logger,
    sender: Sender<ConversionUpdate>,
) {
    logger.log(format!(
        "Starting conversion of {} files at quality {} using {}",
        job.len(),
        job.quality(),
        encoder.path().display()
    ));
    logger.log(get_memory_usage());

    let mut run = run_batch(job, &encoder)
        .with_cancel(cancel)
        .with_logger(logger.clone());

    for event in run.by_ref() {
        if sender.send(ConversionUpdate::Progress(event)).is_err() {
            logger.log("Window closed, stopping conversion".to_string());
            return;
        }
    }

    let report = run.into_report();
    logger.log(format!("Conversion process completed in {:?}", report.elapsed));
    logger.log(get_memory_usage());
    let _ = sender.send(ConversionUpdate::Completed(report));
}
