use std::time::{Instant, Duration};
use std::sync::Arc;
use std::sync::mpsc;
use std::thread;
use parking_lot::Mutex;

/// Timestamped log sink shared between the worker and the GUI.
#[derive(Clone)]
pub struct Logger {
    sender: mpsc::Sender<String>,
}

impl Logger {
    pub fn new(log_messages: Arc<Mutex<Vec<String>>>) -> Self {
        let (sender, receiver) = mpsc::channel();

        thread::spawn(move || {
            for message in receiver {
                log_messages.lock().push(message);
            }
        });

        Logger { sender }
    }

    pub fn log(&self, message: impl Into<String>) {
        let _ = self.sender.send(stamp(&message.into()));
    }
}

pub fn stamp(message: &str) -> String {
    let timestamp = chrono::Local::now().format("%H:%M:%S%.3f");
    format!("[{}] {}", timestamp, message)
}

pub fn measure_time<F, T>(f: F) -> (T, Duration)
where
    F: FnOnce() -> T,
{
    let start = Instant::now();
    let result = f();
    let duration = start.elapsed();
    (result, duration)
}

pub fn get_memory_usage() -> String {
    if let Ok(mem_info) = sys_info::mem_info() {
        format!(
            "Memory: Total: {} MB, Free: {} MB, Used: {} MB",
            mem_info.total / 1024,
            mem_info.free / 1024,
            mem_info.total.saturating_sub(mem_info.free) / 1024
        )
    } else {
        "Unable to get memory info".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logger_delivers_timestamped_lines() {
        let sink = Arc::new(Mutex::new(Vec::new()));
        let logger = Logger::new(sink.clone());
        logger.log("hello");

        let deadline = Instant::now() + Duration::from_secs(2);
        while sink.lock().is_empty() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }

        let lines = sink.lock();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with('['));
        assert!(lines[0].ends_with("] hello"));
    }

    #[test]
    fn measure_time_returns_closure_value() {
        let (value, elapsed) = measure_time(|| 41 + 1);
        assert_eq!(value, 42);
        assert!(elapsed < Duration::from_secs(1));
    }
}
