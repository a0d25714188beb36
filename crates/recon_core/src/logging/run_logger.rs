//! Per-run logger with file and callback output.
//!
//! Lines go to `<log_dir>/<run_name>.log` and, when set, to a console
//! callback. Tool output is kept in a bounded tail that is replayed into
//! the log when a stage fails.

use std::collections::VecDeque;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use chrono::Local;
use parking_lot::Mutex;

use super::types::{LogCallback, LogConfig, LogLevel};

/// Per-run logger shared by the pipeline steps and the stage runner.
pub struct RunLogger {
    config: LogConfig,
    callback: Option<LogCallback>,
    inner: Mutex<Sinks>,
}

struct Sinks {
    file: BufWriter<File>,
    tail: VecDeque<String>,
}

impl RunLogger {
    /// Create a logger writing `<log_dir>/<run_name>.log`.
    pub fn new(
        run_name: &str,
        log_dir: impl AsRef<Path>,
        config: LogConfig,
        callback: Option<LogCallback>,
    ) -> std::io::Result<Self> {
        let log_dir = log_dir.as_ref();
        fs::create_dir_all(log_dir)?;
        let file = File::create(log_dir.join(format!("{}.log", sanitize_filename(run_name))))?;

        Ok(Self {
            inner: Mutex::new(Sinks {
                file: BufWriter::new(file),
                tail: VecDeque::with_capacity(config.error_tail),
            }),
            callback,
            config,
        })
    }

    pub fn debug(&self, message: &str) {
        self.emit(LogLevel::Debug, message);
    }

    pub fn info(&self, message: &str) {
        self.emit(LogLevel::Info, message);
    }

    pub fn warn(&self, message: &str) {
        self.emit(LogLevel::Warn, &format!("[WARNING] {}", message));
    }

    pub fn error(&self, message: &str) {
        self.emit(LogLevel::Error, &format!("[ERROR] {}", message));
    }

    /// Log a command line about to be executed.
    pub fn command(&self, command: &str) {
        self.emit(LogLevel::Info, &format!("$ {}", command));
    }

    /// Log a pipeline phase marker.
    pub fn phase(&self, phase: &str) {
        self.emit(LogLevel::Info, &format!("=== {} ===", phase));
    }

    pub fn success(&self, message: &str) {
        self.emit(LogLevel::Info, &format!("[SUCCESS] {}", message));
    }

    /// Record a line of tool output.
    ///
    /// The line always enters the tail; in compact mode it goes nowhere else.
    pub fn output_line(&self, line: &str, is_stderr: bool) {
        if self.config.error_tail > 0 {
            let mut sinks = self.inner.lock();
            if sinks.tail.len() == self.config.error_tail {
                sinks.tail.pop_front();
            }
            sinks.tail.push_back(line.to_string());
        }

        if !self.config.compact {
            let tagged = if is_stderr {
                format!("[stderr] {}", line)
            } else {
                line.to_string()
            };
            self.write_line(&self.stamp(&tagged));
        }
    }

    /// Replay the tail into the log under a `[<header>/tail]` marker.
    pub fn show_tail(&self, header: &str) {
        let lines = self.tail();
        if lines.is_empty() {
            return;
        }
        self.write_line(&self.stamp(&format!("[{}/tail]", header)));
        for line in &lines {
            self.write_line(&self.stamp(line));
        }
    }

    /// Drop the tail before the next stage starts.
    pub fn clear_tail(&self) {
        self.inner.lock().tail.clear();
    }

    /// Current tail, oldest line first.
    pub fn tail(&self) -> Vec<String> {
        self.inner.lock().tail.iter().cloned().collect()
    }

    pub fn flush(&self) {
        let _ = self.inner.lock().file.flush();
    }

    fn emit(&self, level: LogLevel, message: &str) {
        if level >= self.config.level {
            self.write_line(&self.stamp(message));
        }
    }

    fn stamp(&self, message: &str) -> String {
        if self.config.show_timestamps {
            format!("[{}] {}", Local::now().format("%H:%M:%S"), message)
        } else {
            message.to_string()
        }
    }

    fn write_line(&self, line: &str) {
        let _ = writeln!(self.inner.lock().file, "{}", line);
        if let Some(callback) = &self.callback {
            callback(line);
        }
    }
}

impl Drop for RunLogger {
    fn drop(&mut self) {
        self.flush();
    }
}

/// Replace characters that are not allowed in file names.
fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            _ => c,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::tempdir;

    fn plain() -> LogConfig {
        LogConfig {
            show_timestamps: false,
            ..LogConfig::default()
        }
    }

    #[test]
    fn writes_prefixed_lines_to_file() {
        let dir = tempdir().unwrap();
        let logger = RunLogger::new("run", dir.path(), plain(), None).unwrap();

        logger.phase("Map");
        logger.command("colmap mapper");
        logger.warn("slow");
        logger.flush();

        let content = fs::read_to_string(dir.path().join("run.log")).unwrap();
        assert_eq!(content, "=== Map ===\n$ colmap mapper\n[WARNING] slow\n");
    }

    #[test]
    fn callback_sees_lines_above_level() {
        let dir = tempdir().unwrap();
        let call_count = Arc::new(AtomicUsize::new(0));
        let count_clone = call_count.clone();

        let callback: LogCallback = Box::new(move |_msg| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });

        let logger =
            RunLogger::new("run", dir.path(), LogConfig::default(), Some(callback)).unwrap();

        logger.info("Message 1");
        logger.debug("filtered at info level");
        logger.error("Message 2");

        assert_eq!(call_count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn compact_mode_keeps_output_in_tail_only() {
        let dir = tempdir().unwrap();
        let config = LogConfig {
            error_tail: 5,
            ..plain()
        };
        let logger = RunLogger::new("run", dir.path(), config, None).unwrap();
        let log_path = dir.path().join("run.log");

        for i in 0..10 {
            logger.output_line(&format!("Line {}", i), false);
        }
        logger.flush();

        let tail = logger.tail();
        assert_eq!(tail.len(), 5);
        assert_eq!(tail[0], "Line 5");
        assert_eq!(tail[4], "Line 9");
        assert!(!fs::read_to_string(&log_path).unwrap().contains("Line 9"));

        logger.show_tail("mapper");
        logger.flush();
        let content = fs::read_to_string(&log_path).unwrap();
        assert!(content.contains("[mapper/tail]"));
        assert!(content.contains("Line 9"));

        logger.clear_tail();
        assert!(logger.tail().is_empty());
    }

    #[test]
    fn verbose_mode_tags_stderr() {
        let dir = tempdir().unwrap();
        let config = LogConfig {
            compact: false,
            ..plain()
        };
        let logger = RunLogger::new("run", dir.path(), config, None).unwrap();

        logger.output_line("bad thing", true);
        logger.flush();

        let content = fs::read_to_string(dir.path().join("run.log")).unwrap();
        assert_eq!(content, "[stderr] bad thing\n");
    }

    #[test]
    fn sanitizes_filename() {
        assert_eq!(sanitize_filename("normal_name"), "normal_name");
        assert_eq!(sanitize_filename("has/slash"), "has_slash");
        assert_eq!(sanitize_filename("a<b>c"), "a_b_c");
    }
}
