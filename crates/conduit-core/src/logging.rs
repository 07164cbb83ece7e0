//! Per-session transcript files.
//!
//! When a log directory is configured, every Session gets
//! `{log_dir}/{session_id}.log` holding the raw agent output and the events
//! decoded from it, one timestamped line each.

use std::{
    fs::{File, OpenOptions},
    io::Write,
    path::Path,
    sync::{Arc, Mutex},
};

use chrono::{SecondsFormat, Utc};

/// Thread-safe handle to an append-only log file.
pub type LogHandle = Arc<Mutex<Option<File>>>;

/// Current UTC time as ISO 8601 with milliseconds (e.g. 2026-02-04T10:15:30.123Z).
fn utc_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Write a timestamped line to the log file (if present).
pub fn log_line(handle: &LogHandle, direction: &str, data: &str) {
    let mut guard = handle.lock().unwrap_or_else(|e| e.into_inner());
    if let Some(ref mut file) = *guard {
        let _ = writeln!(file, "[{}] {}: {}", utc_timestamp(), direction, data);
        let _ = file.flush();
    }
}

/// Open (or create) `{log_dir}/{log_id}.log` and return a shared handle.
///
/// Any failure, including `log_dir` being `None`, yields a handle that
/// silently discards writes.
pub fn open_log_file(log_dir: Option<&Path>, log_id: &str) -> LogHandle {
    let file = log_dir.and_then(|dir| {
        std::fs::create_dir_all(dir)
            .map_err(|e| log::warn!("Failed to create log dir {}: {}", dir.display(), e))
            .ok()?;
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join(format!("{log_id}.log")))
            .map_err(|e| log::warn!("Failed to open transcript for {log_id}: {e}"))
            .ok()
    });
    Arc::new(Mutex::new(file))
}

/// A handle that discards everything.
pub fn disabled() -> LogHandle {
    Arc::new(Mutex::new(None))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn utc_timestamp_format() {
        let ts = utc_timestamp();
        assert!(ts.ends_with('Z'));
        assert_eq!(ts.len(), 24);
        assert_eq!(&ts[10..11], "T");
        assert_eq!(&ts[19..20], ".");
    }

    #[test]
    fn open_log_file_creates_nested_dir() {
        let dir = tempdir().unwrap();
        let log_dir = dir.path().join("nested").join("logs");

        let handle = open_log_file(Some(&log_dir), "sess");
        assert!(handle.lock().unwrap().is_some());
        assert!(log_dir.join("sess.log").exists());
    }

    #[test]
    fn open_log_file_none_dir() {
        let handle = open_log_file(None, "test");
        assert!(handle.lock().unwrap().is_none());
    }

    #[test]
    fn log_line_appends_direction_and_data() {
        let dir = tempdir().unwrap();
        let handle = open_log_file(Some(dir.path()), "sess");
        log_line(&handle, "STDOUT", "{\"type\":\"result\"}");
        log_line(&handle, "EVENT", "done");

        let contents = std::fs::read_to_string(dir.path().join("sess.log")).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("STDOUT: {\"type\":\"result\"}"));
        assert!(lines[1].starts_with('['));
        assert!(lines[1].ends_with("EVENT: done"));
    }

    #[test]
    fn disabled_handle_discards() {
        log_line(&disabled(), "STDERR", "ignored");
    }
}
