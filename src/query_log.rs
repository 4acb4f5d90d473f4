// query_log.rs
use chrono::{DateTime, SecondsFormat, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use crate::config::Config;
use crate::rotation::RotationPolicy;

const NOT_AVAILABLE: &str = "N/A";
const NO_ERROR: &str = "None";

/// One query event as handed over by the caller. Only the first three fields
/// are required; the rest fall back to placeholders in the written entry.
#[derive(Debug, Clone, Default)]
pub struct QueryEvent {
    pub user_id: String,
    pub query: String,
    pub specialization: String,
    pub response: Option<String>,
    // Seconds
    pub response_time: Option<f64>,
    pub feedback: Option<String>,
    pub error: Option<String>,
}

impl QueryEvent {
    pub fn new(user_id: &str, query: &str, specialization: &str) -> Self {
        QueryEvent {
            user_id: user_id.to_string(),
            query: query.to_string(),
            specialization: specialization.to_string(),
            ..QueryEvent::default()
        }
    }

    pub fn response(mut self, response: &str) -> Self {
        self.response = Some(response.to_string());
        self
    }

    pub fn response_time(mut self, seconds: f64) -> Self {
        self.response_time = Some(seconds);
        self
    }

    pub fn feedback(mut self, feedback: &str) -> Self {
        self.feedback = Some(feedback.to_string());
        self
    }

    pub fn error(mut self, error: &str) -> Self {
        self.error = Some(error.to_string());
        self
    }
}

/// A single line of the query log. Field order is the on-disk order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: String,
    pub user_id: String,
    pub query: String,
    pub specialization: String,
    pub response: String,
    pub response_time: String,
    pub user_feedback: String,
    pub error: String,
}

impl LogEntry {
    pub fn from_event(event: &QueryEvent, at: DateTime<Utc>) -> Self {
        LogEntry {
            timestamp: at.to_rfc3339_opts(SecondsFormat::Micros, true),
            user_id: event.user_id.clone(),
            query: event.query.clone(),
            specialization: event.specialization.clone(),
            response: non_empty_or(event.response.as_deref(), NOT_AVAILABLE),
            response_time: match event.response_time {
                Some(seconds) if seconds.is_finite() && seconds != 0.0 => {
                    format!("{:.2}s", seconds)
                }
                _ => NOT_AVAILABLE.to_string(),
            },
            // An explicitly empty feedback is kept as given
            user_feedback: event
                .feedback
                .clone()
                .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
            error: non_empty_or(event.error.as_deref(), NO_ERROR),
        }
    }

    /// Indented rendering used for the stdout echo.
    pub fn to_pretty_json(&self) -> io::Result<String> {
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
        self.serialize(&mut serializer)?;
        String::from_utf8(buf).map_err(|e| io::Error::new(ErrorKind::InvalidData, e))
    }
}

fn non_empty_or(value: Option<&str>, fallback: &str) -> String {
    match value {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => fallback.to_string(),
    }
}

/// Appends query events to a size-rotated JSON Lines file.
///
/// Built with [`QueryLogger::init`] and finished with [`QueryLogger::close`].
/// The file handle is opened per call and dropped right after the write, so
/// nothing stays open between calls.
pub struct QueryLogger {
    log_path: PathBuf,
    policy: RotationPolicy,
    echo_stdout: bool,
    // Serializes the rotate-then-append sequence between threads
    write_lock: Mutex<()>,
}

impl QueryLogger {
    /// Creates the log directory and an empty log file when they are missing.
    /// Existing content is left untouched, so calling this repeatedly against
    /// the same directory is safe.
    pub fn init(config: &Config) -> io::Result<Self> {
        fs::create_dir_all(&config.log_dir)?;

        let log_path = config.log_path();
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)?;

        info!(
            "Query log ready at {} (max {} bytes, {} archives)",
            log_path.display(),
            config.max_bytes,
            config.backup_count
        );

        Ok(QueryLogger {
            log_path,
            policy: config.policy(),
            echo_stdout: config.echo_stdout,
            write_lock: Mutex::new(()),
        })
    }

    /// Records one event: echoes it to stdout (when enabled) and appends it as
    /// one compact JSON line, rotating the file first if it is full.
    pub fn log_query(&self, event: &QueryEvent) -> io::Result<()> {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        self.log_query_to(event, &mut out)
    }

    fn log_query_to<W: Write>(&self, event: &QueryEvent, echo: &mut W) -> io::Result<()> {
        let entry = LogEntry::from_event(event, Utc::now());

        if self.echo_stdout {
            writeln!(echo, "{}", entry.to_pretty_json()?)?;
        }

        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');

        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let current_len = match fs::metadata(&self.log_path) {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == ErrorKind::NotFound => 0,
            Err(e) => return Err(e),
        };
        if self.policy.should_rotate(current_len, line.len() as u64) {
            self.policy.rotate(&self.log_path)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)?;
        file.write_all(line.as_bytes())?;

        debug!(
            "Logged query from user {} ({} bytes)",
            entry.user_id,
            line.len()
        );
        Ok(())
    }

    /// Flushes the active file to disk and ends the logger's lifetime.
    pub fn close(self) -> io::Result<()> {
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let file = OpenOptions::new().append(true).open(&self.log_path)?;
        file.sync_all()?;
        info!("Query log closed: {}", self.log_path.display());
        Ok(())
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    pub fn policy(&self) -> RotationPolicy {
        self.policy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rotation::archive_path;
    use chrono::TimeZone;
    use std::sync::Arc;
    use std::thread;
    use tempfile::tempdir;

    fn quiet_config(dir: &Path) -> Config {
        Config {
            echo_stdout: false,
            ..Config::in_dir(dir)
        }
    }

    fn read_entries(path: &Path) -> Vec<LogEntry> {
        fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[test]
    fn defaults_are_substituted() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
        let entry = LogEntry::from_event(&QueryEvent::new("u", "q", "s"), at);

        assert_eq!(entry.timestamp, "2024-05-01T12:30:00.000000Z");
        assert_eq!(entry.response, "N/A");
        assert_eq!(entry.response_time, "N/A");
        assert_eq!(entry.user_feedback, "N/A");
        assert_eq!(entry.error, "None");
    }

    #[test]
    fn empty_and_zero_values_count_as_missing() {
        let event = QueryEvent::new("u", "q", "s")
            .response("")
            .response_time(0.0)
            .error("")
            .feedback("");
        let entry = LogEntry::from_event(&event, Utc::now());

        assert_eq!(entry.response, "N/A");
        assert_eq!(entry.response_time, "N/A");
        assert_eq!(entry.error, "None");
        assert_eq!(entry.user_feedback, "");
    }

    #[test]
    fn non_finite_response_time_counts_as_missing() {
        for seconds in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let event = QueryEvent::new("u", "q", "s").response_time(seconds);
            assert_eq!(LogEntry::from_event(&event, Utc::now()).response_time, "N/A");
        }
    }

    #[test]
    fn echo_prints_one_indented_block_per_call() {
        let dir = tempdir().unwrap();
        let config = Config {
            echo_stdout: true,
            ..Config::in_dir(dir.path())
        };
        let logger = QueryLogger::init(&config).unwrap();

        let mut echo = Vec::new();
        logger
            .log_query_to(&QueryEvent::new("u1", "first", "general"), &mut echo)
            .unwrap();
        logger
            .log_query_to(
                &QueryEvent::new("u2", "second", "support").error("timeout"),
                &mut echo,
            )
            .unwrap();

        let echoed: Vec<LogEntry> = serde_json::Deserializer::from_slice(&echo)
            .into_iter::<LogEntry>()
            .map(|entry| entry.unwrap())
            .collect();
        assert_eq!(echoed, read_entries(logger.log_path()));

        let text = String::from_utf8(echo).unwrap();
        assert_eq!(text.matches("{\n    \"timestamp\": ").count(), 2);
        assert!(text.contains("\n    \"error\": \"timeout\"\n}\n"));
    }

    #[test]
    fn quiet_logger_echoes_nothing() {
        let dir = tempdir().unwrap();
        let logger = QueryLogger::init(&quiet_config(dir.path())).unwrap();

        let mut echo = Vec::new();
        logger
            .log_query_to(&QueryEvent::new("u", "q", "s"), &mut echo)
            .unwrap();

        assert!(echo.is_empty());
        assert_eq!(read_entries(logger.log_path()).len(), 1);
    }

    #[test]
    fn response_time_has_two_decimals() {
        let event = QueryEvent::new("u", "q", "s").response_time(3.14159);
        assert_eq!(LogEntry::from_event(&event, Utc::now()).response_time, "3.14s");

        let event = QueryEvent::new("u", "q", "s").response_time(12.0);
        assert_eq!(LogEntry::from_event(&event, Utc::now()).response_time, "12.00s");
    }

    #[test]
    fn pretty_json_is_indented_with_four_spaces() {
        let entry = LogEntry::from_event(&QueryEvent::new("u", "q", "s"), Utc::now());
        let pretty = entry.to_pretty_json().unwrap();

        assert!(pretty.starts_with("{\n    \"timestamp\": "));
        let parsed: LogEntry = serde_json::from_str(&pretty).unwrap();
        assert_eq!(parsed, entry);
    }

    #[test]
    fn init_creates_empty_file_and_keeps_existing_content() {
        let dir = tempdir().unwrap();
        let log_dir = dir.path().join("nested").join("logs");
        let config = quiet_config(&log_dir);

        let logger = QueryLogger::init(&config).unwrap();
        assert_eq!(fs::read_to_string(logger.log_path()).unwrap(), "");

        logger.log_query(&QueryEvent::new("u1", "q", "s")).unwrap();
        drop(logger);

        let again = QueryLogger::init(&config).unwrap();
        assert_eq!(read_entries(again.log_path()).len(), 1);
    }

    #[test]
    fn each_call_appends_one_line() {
        let dir = tempdir().unwrap();
        let logger = QueryLogger::init(&quiet_config(dir.path())).unwrap();

        logger
            .log_query(
                &QueryEvent::new("u1", "What is X?", "general")
                    .response("X is Y")
                    .response_time(1.23)
                    .feedback("good"),
            )
            .unwrap();
        logger
            .log_query(&QueryEvent::new("u2", "bad query", "support").error("timeout"))
            .unwrap();

        let entries = read_entries(logger.log_path());
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].response_time, "1.23s");
        assert_eq!(entries[0].user_feedback, "good");
        assert_eq!(entries[1].error, "timeout");
        assert_eq!(entries[1].response, "N/A");
    }

    #[test]
    fn full_file_is_rotated_before_append() {
        let dir = tempdir().unwrap();
        let config = Config {
            max_bytes: 400,
            backup_count: 2,
            ..quiet_config(dir.path())
        };
        let logger = QueryLogger::init(&config).unwrap();

        for i in 0..20 {
            logger
                .log_query(&QueryEvent::new(&format!("user{}", i), "query", "general"))
                .unwrap();
        }

        let path = logger.log_path();
        assert!(fs::metadata(path).unwrap().len() < 400);
        assert!(archive_path(path, 1).exists());
        assert!(archive_path(path, 2).exists());
        assert!(!archive_path(path, 3).exists());

        let newest = read_entries(path);
        assert_eq!(newest.last().unwrap().user_id, "user19");
    }

    #[test]
    fn zero_backups_keeps_every_entry() {
        let dir = tempdir().unwrap();
        let config = Config {
            max_bytes: 400,
            backup_count: 0,
            ..quiet_config(dir.path())
        };
        let logger = QueryLogger::init(&config).unwrap();

        for i in 0..10 {
            logger
                .log_query(&QueryEvent::new(&format!("user{}", i), "query", "general"))
                .unwrap();
        }

        let path = logger.log_path();
        assert_eq!(read_entries(path).len(), 10);
        assert!(!archive_path(path, 1).exists());
    }

    #[test]
    fn write_failure_propagates() {
        let dir = tempdir().unwrap();
        let log_dir = dir.path().join("logs");
        let logger = QueryLogger::init(&quiet_config(&log_dir)).unwrap();

        fs::remove_dir_all(&log_dir).unwrap();

        let err = logger
            .log_query(&QueryEvent::new("u", "q", "s"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn concurrent_calls_do_not_interleave() {
        let dir = tempdir().unwrap();
        let config = Config {
            max_bytes: 2_000,
            backup_count: 50,
            ..quiet_config(dir.path())
        };
        let logger = Arc::new(QueryLogger::init(&config).unwrap());

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let logger = Arc::clone(&logger);
                thread::spawn(move || {
                    for i in 0..25 {
                        let event = QueryEvent::new(&format!("t{}", t), &format!("q{}", i), "s");
                        logger.log_query(&event).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let path = logger.log_path().to_path_buf();
        let mut total = read_entries(&path).len();
        for index in 1..=50 {
            let archive = archive_path(&path, index);
            if archive.exists() {
                total += read_entries(&archive).len();
            }
        }
        assert_eq!(total, 100);
    }

    #[test]
    fn close_consumes_the_logger() {
        let dir = tempdir().unwrap();
        let logger = QueryLogger::init(&quiet_config(dir.path())).unwrap();
        logger.log_query(&QueryEvent::new("u", "q", "s")).unwrap();
        let path = logger.log_path().to_path_buf();

        logger.close().unwrap();
        assert_eq!(read_entries(&path).len(), 1);
    }
}
