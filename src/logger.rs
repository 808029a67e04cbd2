//! Leveled logger with console and size-rolled file sinks, synchronous or
//! double-buffered asynchronous operation, and a hex-dump helper.

use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write as _;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU32, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use crate::sync::Mutex;
use crate::thread::{STOP_WAIT_INFINITE, StopToken, Thread};
use crate::time_fmt::LocalTime;

/// Internal line buffer size in bytes.
pub const MAX_LOG_BUFFER_SIZE: usize = 4096;

/// Maximum length of a single log entry's text; the difference covers the
/// timestamp and level prefix.
pub const MAX_LOG_INFO_SIZE: usize = MAX_LOG_BUFFER_SIZE - 36;

/// Width of the line prefix, used to indent continuation lines.
const PREFIX_WIDTH: usize = 34;

/// Log severity, lowest to highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Level {
    Trace = 0,
    Debug = 1,
    Info = 2,
    Warn = 3,
    Error = 4,
    Fatal = 5,
}

impl Level {
    fn name(self) -> &'static str {
        match self {
            Level::Trace => "Trace",
            Level::Debug => "Debug",
            Level::Info => "Info",
            Level::Warn => "Warn",
            Level::Error => "Error",
            Level::Fatal => "Fatal",
        }
    }

    fn from_u8(v: u8) -> Level {
        match v {
            0 => Level::Trace,
            1 => Level::Debug,
            2 => Level::Info,
            3 => Level::Warn,
            4 => Level::Error,
            _ => Level::Fatal,
        }
    }
}

struct FileSink {
    /// Current log file, or None until the first file write.
    filename: Option<PathBuf>,
}

/// Leveled logger.
///
/// Entries below the threshold level (default `Info`) are discarded.
/// Console output is on by default; file output is off until enabled and
/// rolls to a new `<module><yyyymmddhhmmss>.log` file once the current one
/// exceeds the size limit. In background mode entries are queued and
/// drained by a worker thread every 100 ms; [`flush`](Logger::flush)
/// blocks until the queue is empty.
pub struct Logger {
    level: AtomicU8,
    module: StdMutex<String>,
    path: StdMutex<PathBuf>,
    limit_mib: AtomicU32,
    to_file: AtomicBool,
    to_screen: AtomicBool,
    asyn: AtomicBool,
    file: StdMutex<FileSink>,
    /// Serializes sink writes across threads.
    write_lock: Mutex,
    input: StdMutex<Vec<String>>,
    background: StdMutex<Thread>,
}

impl Default for Logger {
    fn default() -> Self {
        Self::new()
    }
}

impl Logger {
    pub fn new() -> Self {
        Logger {
            level: AtomicU8::new(Level::Info as u8),
            module: StdMutex::new(String::new()),
            path: StdMutex::new(PathBuf::from("log")),
            limit_mib: AtomicU32::new(10),
            to_file: AtomicBool::new(false),
            to_screen: AtomicBool::new(true),
            asyn: AtomicBool::new(false),
            file: StdMutex::new(FileSink { filename: None }),
            write_lock: Mutex::new(),
            input: StdMutex::new(Vec::new()),
            background: StdMutex::new(Thread::new("litenet-logger")),
        }
    }

    /// Module name used in log file names.
    pub fn set_module(&self, module_name: &str) {
        *self.module.lock().unwrap() = module_name.to_string();
    }

    /// Directory for log files (default `log/`, created on demand).
    pub fn set_path(&self, path_name: &str) {
        *self.path.lock().unwrap() = PathBuf::from(path_name);
    }

    /// Per-file size limit in MiB (default 10). Zero and values above 2048
    /// are ignored.
    pub fn set_limit(&self, file_size_mib: u32) {
        if file_size_mib == 0 || file_size_mib > 2048 {
            return;
        }
        self.limit_mib.store(file_size_mib, Ordering::Relaxed);
    }

    /// Enable or disable the file sink.
    pub fn set_output_to_file(&self, to_file: bool) {
        self.to_file.store(to_file, Ordering::Relaxed);
    }

    /// Enable or disable the console sink.
    pub fn set_output_to_screen(&self, to_screen: bool) {
        self.to_screen.store(to_screen, Ordering::Relaxed);
    }

    /// Threshold level; entries below it are discarded.
    pub fn set_log_level(&self, level: Level) {
        self.level.store(level as u8, Ordering::Relaxed);
    }

    /// Current threshold level.
    pub fn log_level(&self) -> Level {
        Level::from_u8(self.level.load(Ordering::Relaxed))
    }

    /// Switch between synchronous and background (double-buffered) writing.
    /// Disabling drains whatever is still queued.
    pub fn set_background_running(self: &Arc<Self>, asyn: bool) {
        if self.asyn.swap(asyn, Ordering::SeqCst) == asyn {
            return;
        }
        let mut thread = self.background.lock().unwrap();
        if asyn {
            let logger = self.clone();
            let _ = thread.start(move |token| logger.run_background(token));
        } else {
            thread.stop(STOP_WAIT_INFINITE);
            self.drain();
        }
    }

    pub fn trace(&self, text: &str) {
        self.write(Level::Trace, text);
    }

    pub fn debug(&self, text: &str) {
        self.write(Level::Debug, text);
    }

    pub fn info(&self, text: &str) {
        self.write(Level::Info, text);
    }

    pub fn warn(&self, text: &str) {
        self.write(Level::Warn, text);
    }

    pub fn error(&self, text: &str) {
        self.write(Level::Error, text);
    }

    pub fn fatal(&self, text: &str) {
        self.write(Level::Fatal, text);
    }

    /// Formatted entry point: `logger.log(Level::Info, format_args!(...))`.
    pub fn log(&self, level: Level, args: fmt::Arguments<'_>) {
        if level < self.log_level() {
            return;
        }
        self.write(level, &args.to_string());
    }

    /// Hex-dump up to [`MAX_LOG_INFO_SIZE`] bytes at Debug level,
    /// `bytes_per_line` per row, optionally space-separated.
    pub fn debug_hex(&self, buf: &[u8], bytes_per_line: usize, space_gap: bool) {
        if Level::Debug < self.log_level() || buf.is_empty() {
            return;
        }
        let bytes_per_line = bytes_per_line.max(1);
        let take = buf.len().min(MAX_LOG_INFO_SIZE / if space_gap { 3 } else { 2 });
        let mut dump = String::with_capacity(take * 3 + take / bytes_per_line + 1);
        for (i, byte) in buf[..take].iter().enumerate() {
            if i > 0 && i % bytes_per_line == 0 {
                dump.push('\n');
            }
            dump.push_str(&format!("{byte:02X}"));
            if space_gap {
                dump.push(' ');
            }
        }
        self.write(Level::Debug, dump.trim_end());
    }

    /// Block until the background queue is empty. A no-op in synchronous
    /// mode.
    pub fn flush(&self) {
        while self.asyn.load(Ordering::SeqCst) {
            if self.input.lock().unwrap().is_empty() {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    fn write(&self, level: Level, text: &str) {
        if level < self.log_level() {
            return;
        }
        let line = format!(
            "[{}] [{}] {}",
            LocalTime::now().with_millis(),
            level.name(),
            text
        );
        if self.asyn.load(Ordering::SeqCst) {
            self.input.lock().unwrap().push(line);
        } else {
            let _guard = self.write_lock.lock();
            self.write_line(&line);
        }
    }

    /// Background loop: swap the input list against an empty one every
    /// 100 ms and drain the snapshot, once more on the way out.
    fn run_background(&self, token: &StopToken) {
        while !token.wait(100) {
            self.drain();
        }
        self.drain();
    }

    fn drain(&self) {
        let output = std::mem::take(&mut *self.input.lock().unwrap());
        if output.is_empty() {
            return;
        }
        let _guard = self.write_lock.lock();
        for line in &output {
            self.write_line(line);
        }
    }

    fn write_line(&self, line: &str) {
        if self.to_screen.load(Ordering::Relaxed) {
            let mut out = std::io::stdout().lock();
            for (i, part) in line.split('\n').enumerate() {
                if i == 0 {
                    let _ = writeln!(out, "{part}");
                } else if !part.is_empty() {
                    let _ = writeln!(out, "{:width$}{part}", "", width = PREFIX_WIDTH);
                }
            }
        }

        if self.to_file.load(Ordering::Relaxed) {
            let mut sink = self.file.lock().unwrap();
            if sink.filename.is_none() {
                sink.filename = Some(self.new_log_file_name());
            }

            // Size check before the write: roll once the current file has
            // exceeded the limit.
            let limit_bytes = self.limit_mib.load(Ordering::Relaxed) as u64 * 1024 * 1024;
            if let Some(name) = &sink.filename
                && fs::metadata(name).map(|m| m.len()).unwrap_or(0) >= limit_bytes
            {
                sink.filename = Some(self.new_log_file_name());
            }

            let Some(name) = sink.filename.clone() else {
                return;
            };
            if let Some(dir) = name.parent()
                && !dir.as_os_str().is_empty()
            {
                let _ = fs::create_dir_all(dir);
            }
            if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(&name) {
                for (i, part) in line.split('\n').enumerate() {
                    if i == 0 {
                        let _ = writeln!(file, "{part}");
                    } else if !part.is_empty() {
                        let _ = writeln!(file, "{:width$}{part}", "", width = PREFIX_WIDTH);
                    }
                }
            }
        }
    }

    fn new_log_file_name(&self) -> PathBuf {
        let stamp = LocalTime::now().compact();
        let module = self.module.lock().unwrap().clone();
        self.path.lock().unwrap().join(format!("{module}{stamp}.log"))
    }
}

impl Drop for Logger {
    fn drop(&mut self) {
        if self.asyn.load(Ordering::SeqCst) {
            self.background.lock().unwrap().stop(STOP_WAIT_INFINITE);
            self.drain();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "litenet-logger-{tag}-{}",
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn log_files(dir: &PathBuf) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .filter(|p| p.extension().is_some_and(|e| e == "log"))
            .collect();
        files.sort();
        files
    }

    #[test]
    fn level_threshold_filters() {
        let dir = temp_dir("threshold");
        let logger = Logger::new();
        logger.set_output_to_screen(false);
        logger.set_output_to_file(true);
        logger.set_path(dir.to_str().unwrap());
        logger.set_module("threshold");

        logger.debug("dropped");
        logger.info("kept-info");
        logger.error("kept-error");

        let files = log_files(&dir);
        assert_eq!(files.len(), 1);
        let content = fs::read_to_string(&files[0]).unwrap();
        assert!(!content.contains("dropped"));
        assert!(content.contains("[Info] kept-info"));
        assert!(content.contains("[Error] kept-error"));
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn line_format_has_stamp_and_level() {
        let dir = temp_dir("format");
        let logger = Logger::new();
        logger.set_output_to_screen(false);
        logger.set_output_to_file(true);
        logger.set_path(dir.to_str().unwrap());
        logger.set_module("format");
        logger.warn("formatted");

        let files = log_files(&dir);
        let content = fs::read_to_string(&files[0]).unwrap();
        let line = content.lines().next().unwrap();
        // "[yyyy-mm-dd hh:mm:ss.mmm] [Warn] formatted"
        assert!(line.starts_with('['));
        assert_eq!(&line[5..6], "-");
        assert!(line.contains("] [Warn] formatted"));
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn multiline_entries_indent_continuations() {
        let dir = temp_dir("multiline");
        let logger = Logger::new();
        logger.set_output_to_screen(false);
        logger.set_output_to_file(true);
        logger.set_path(dir.to_str().unwrap());
        logger.set_module("multiline");
        logger.info("first\nsecond");

        let files = log_files(&dir);
        let content = fs::read_to_string(&files[0]).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("first"));
        assert!(lines[1].starts_with(&" ".repeat(PREFIX_WIDTH)));
        assert!(lines[1].ends_with("second"));
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn hex_dump_layout() {
        let dir = temp_dir("hex");
        let logger = Logger::new();
        logger.set_log_level(Level::Debug);
        logger.set_output_to_screen(false);
        logger.set_output_to_file(true);
        logger.set_path(dir.to_str().unwrap());
        logger.set_module("hex");
        logger.debug_hex(&[0x01, 0xAB, 0xFF, 0x00, 0x10], 4, true);

        let files = log_files(&dir);
        let content = fs::read_to_string(&files[0]).unwrap();
        assert!(content.contains("01 AB FF 00"));
        assert!(content.lines().nth(1).unwrap().trim().starts_with("10"));
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn background_mode_flush_drains_queue() {
        let dir = temp_dir("async");
        let logger = Arc::new(Logger::new());
        logger.set_output_to_screen(false);
        logger.set_output_to_file(true);
        logger.set_path(dir.to_str().unwrap());
        logger.set_module("async");
        logger.set_background_running(true);

        for i in 0..50 {
            logger.info(&format!("entry-{i}"));
        }
        logger.flush();
        logger.set_background_running(false);

        let files = log_files(&dir);
        assert_eq!(files.len(), 1);
        let content = fs::read_to_string(&files[0]).unwrap();
        let count = content.lines().filter(|l| l.contains("entry-")).count();
        assert_eq!(count, 50);
        // Submission order preserved.
        let first = content
            .lines()
            .position(|l| l.contains("entry-0"))
            .unwrap();
        let last = content
            .lines()
            .position(|l| l.contains("entry-49"))
            .unwrap();
        assert!(first < last);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn limit_setter_ignores_out_of_range() {
        let logger = Logger::new();
        logger.set_limit(0);
        assert_eq!(logger.limit_mib.load(Ordering::Relaxed), 10);
        logger.set_limit(4096);
        assert_eq!(logger.limit_mib.load(Ordering::Relaxed), 10);
        logger.set_limit(1);
        assert_eq!(logger.limit_mib.load(Ordering::Relaxed), 1);
    }
}
