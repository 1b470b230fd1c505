//! Unit tests for log.rs
//!
//! Tests LogSeverity, LogEntry, the global logger slot and the error macros.

use crate::log::{reset_logger, set_logger, LogEntry, LogSeverity, Logger};
use crate::error::Error;
use serial_test::serial;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

/// Logger capturing entries for assertions
struct CaptureLogger {
    entries: Arc<Mutex<Vec<LogEntry>>>,
}

impl Logger for CaptureLogger {
    fn log(&self, entry: &LogEntry) {
        self.entries.lock().unwrap().push(entry.clone());
    }
}

/// Entries emitted by this test module only (other tests may log concurrently)
fn captured_from_tests(entries: &Arc<Mutex<Vec<LogEntry>>>) -> Vec<LogEntry> {
    entries
        .lock()
        .unwrap()
        .iter()
        .filter(|entry| entry.source == "ember::test")
        .cloned()
        .collect()
}

fn install_capture() -> Arc<Mutex<Vec<LogEntry>>> {
    let entries = Arc::new(Mutex::new(Vec::new()));
    set_logger(CaptureLogger {
        entries: Arc::clone(&entries),
    });
    entries
}

// ============================================================================
// LOG SEVERITY TESTS
// ============================================================================

#[test]
fn test_log_severity_ordering() {
    assert!(LogSeverity::Trace < LogSeverity::Debug);
    assert!(LogSeverity::Debug < LogSeverity::Info);
    assert!(LogSeverity::Info < LogSeverity::Warn);
    assert!(LogSeverity::Warn < LogSeverity::Error);
}

#[test]
fn test_log_severity_debug() {
    assert_eq!(format!("{:?}", LogSeverity::Trace), "Trace");
    assert_eq!(format!("{:?}", LogSeverity::Error), "Error");
}

// ============================================================================
// LOG ENTRY TESTS
// ============================================================================

#[test]
fn test_log_entry_without_file_line() {
    let entry = LogEntry {
        severity: LogSeverity::Info,
        timestamp: SystemTime::now(),
        source: "ember::Device".to_string(),
        message: "Device created".to_string(),
        file: None,
        line: None,
    };
    assert_eq!(entry.source, "ember::Device");
    assert!(entry.file.is_none());
}

// ============================================================================
// GLOBAL LOGGER TESTS
// ============================================================================

#[test]
#[serial]
fn test_custom_logger_receives_macro_output() {
    let entries = install_capture();

    crate::ember_info!("ember::test", "hello {}", 42);
    crate::ember_warn!("ember::test", "careful");

    let captured = captured_from_tests(&entries);
    reset_logger();

    assert_eq!(captured.len(), 2);
    assert_eq!(captured[0].severity, LogSeverity::Info);
    assert_eq!(captured[0].message, "hello 42");
    assert_eq!(captured[1].severity, LogSeverity::Warn);
    assert!(captured[1].line.is_none());
}

#[test]
#[serial]
fn test_error_macro_carries_location() {
    let entries = install_capture();

    crate::ember_error!("ember::test", "broken");

    let captured = captured_from_tests(&entries);
    reset_logger();

    assert_eq!(captured.len(), 1);
    assert_eq!(captured[0].severity, LogSeverity::Error);
    assert!(captured[0].file.unwrap().ends_with("log_tests.rs"));
    assert!(captured[0].line.is_some());
}

#[test]
#[serial]
fn test_ember_err_logs_and_builds_backend_error() {
    let entries = install_capture();

    let err = crate::ember_err!("ember::test", "native call failed: {}", -4);

    let captured = captured_from_tests(&entries);
    reset_logger();

    assert!(matches!(err, Error::BackendError(ref msg) if msg == "native call failed: -4"));
    assert_eq!(captured.len(), 1);
    assert_eq!(captured[0].message, "native call failed: -4");
}

fn bails(flag: bool) -> crate::error::Result<u32> {
    if flag {
        crate::ember_bail!("ember::test", "bailing out");
    }
    Ok(7)
}

#[test]
#[serial]
fn test_ember_bail_returns_early() {
    let entries = install_capture();

    assert_eq!(bails(false).unwrap(), 7);
    assert!(bails(true).is_err());

    let count = captured_from_tests(&entries).len();
    reset_logger();
    assert_eq!(count, 1);
}
