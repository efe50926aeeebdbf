use colored::Colorize;
use indicatif::ProgressBar;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Mutex;

static LOG_FILE: Mutex<Option<PathBuf>> = Mutex::new(None);
static SEVERITY: AtomicU8 = AtomicU8::new(Severity::Warning as u8);
static ERROR_COUNT: AtomicUsize = AtomicUsize::new(0);
static SPINNER: Mutex<Option<ProgressBar>> = Mutex::new(None);

/// Message severity, ordered from most to least critical.
///
/// Messages are emitted to the console only when their severity is at or
/// above the configured threshold; the log file always receives everything
/// except `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    None,
    Fatal,
    Error,
    #[default]
    Warning,
    Info,
    Debug,
    Verbose,
}

impl Severity {
    fn as_str(self) -> &'static str {
        match self {
            Severity::None => "NONE",
            Severity::Fatal => "FATAL",
            Severity::Error => "ERROR",
            Severity::Warning => "WARN",
            Severity::Info => "INFO",
            Severity::Debug => "DEBUG",
            Severity::Verbose => "VERBOSE",
        }
    }

    fn from_u8(value: u8) -> Severity {
        match value {
            0 => Severity::None,
            1 => Severity::Fatal,
            2 => Severity::Error,
            3 => Severity::Warning,
            4 => Severity::Info,
            5 => Severity::Debug,
            _ => Severity::Verbose,
        }
    }
}

/// Set the console severity threshold.
pub fn set_severity(severity: Severity) {
    SEVERITY.store(severity as u8, Ordering::Relaxed);
}

/// Get the current console severity threshold.
pub fn severity() -> Severity {
    Severity::from_u8(SEVERITY.load(Ordering::Relaxed))
}

/// Initialize the file sink at the default location (`<config dir>/glot/glot.log`).
///
/// The log file is truncated on each run. Console logging works without this.
pub fn init() -> Result<(), String> {
    let config_dir = get_config_dir()?;
    fs::create_dir_all(&config_dir)
        .map_err(|e| format!("Failed to create config directory: {}", e))?;

    let log_file = config_dir.join("glot.log");
    if log_file.exists() {
        let _ = fs::remove_file(&log_file);
    }

    let mut guard = LOG_FILE.lock().unwrap();
    *guard = Some(log_file);
    Ok(())
}

/// Initialize the file sink at an explicit path.
pub fn init_with_file(path: PathBuf) {
    if let Ok(mut guard) = LOG_FILE.lock() {
        *guard = Some(path);
    }
}

fn get_config_dir() -> Result<PathBuf, String> {
    #[cfg(not(target_os = "windows"))]
    let config_dir = dirs::home_dir()
        .ok_or("Could not determine home directory")?
        .join(".config")
        .join("glot");

    #[cfg(target_os = "windows")]
    let config_dir = dirs::config_dir()
        .ok_or("Could not determine config directory")?
        .join("glot");

    Ok(config_dir)
}

fn write_to_log(severity: Severity, message: &str) {
    if let Ok(guard) = LOG_FILE.lock() {
        if let Some(ref log_path) = *guard {
            if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(log_path) {
                let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
                let _ = writeln!(file, "[{}] [{}] {}", timestamp, severity.as_str(), message);
            }
        }
    }
}

/// Log an error and bump the process error counter.
pub fn error(message: &str) {
    ERROR_COUNT.fetch_add(1, Ordering::Relaxed);
    write_to_log(Severity::Error, message);
    if severity() >= Severity::Error {
        eprintln!("{} {}", "Error:".red().bold(), message);
    }
}

/// Log a warning.
pub fn warn(message: &str) {
    write_to_log(Severity::Warning, message);
    if severity() >= Severity::Warning {
        eprintln!("{} {}", "warning:".yellow().bold(), message);
    }
}

/// Log an informational message.
pub fn info(message: &str) {
    write_to_log(Severity::Info, message);
    if severity() >= Severity::Info {
        eprintln!("{}", message);
    }
}

/// Log a debug message.
pub fn debug(message: &str) {
    write_to_log(Severity::Debug, message);
    if severity() >= Severity::Debug {
        eprintln!("{} {}", "DEBUG:".blue().bold(), message);
    }
}

/// Log a verbose trace message.
pub fn verbose(message: &str) {
    write_to_log(Severity::Verbose, message);
    if severity() >= Severity::Verbose {
        eprintln!("{} {}", "TRACE:".dimmed(), message);
    }
}

/// Log a success message (always shown, with a check mark).
pub fn success(message: &str) {
    write_to_log(Severity::Info, message);
    eprintln!("{} {}", "\u{2714}".green().bold(), message);
}

/// Number of errors logged since startup or the last reset.
///
/// The CLI uses this for its exit code: any error logged during an
/// operation makes the run fatal.
pub fn error_count() -> usize {
    ERROR_COUNT.load(Ordering::Relaxed)
}

/// Reset the error counter, e.g. before starting a new operation.
pub fn reset_error_count() {
    ERROR_COUNT.store(0, Ordering::Relaxed);
}

/// Start a spinner with the given message (suppressed in debug and above).
pub fn spinner_start(message: &str) {
    if severity() >= Severity::Debug {
        return;
    }

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        indicatif::ProgressStyle::default_spinner()
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"])
            .template("{spinner:.cyan} {msg}")
            .unwrap(),
    );
    spinner.enable_steady_tick(std::time::Duration::from_millis(80));
    spinner.set_message(message.to_string());

    if let Ok(mut guard) = SPINNER.lock() {
        *guard = Some(spinner);
    }
}

/// Stop the spinner without any message.
pub fn spinner_stop() {
    if let Ok(mut guard) = SPINNER.lock() {
        if let Some(spinner) = guard.take() {
            spinner.finish_and_clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_ordering() {
        assert!(Severity::Error < Severity::Warning);
        assert!(Severity::Warning < Severity::Verbose);
        assert_eq!(Severity::from_u8(Severity::Debug as u8), Severity::Debug);
    }

    #[test]
    fn error_counter_tracks_errors() {
        reset_error_count();
        set_severity(Severity::None);
        error("boom");
        error("boom again");
        assert_eq!(error_count(), 2);
        reset_error_count();
        assert_eq!(error_count(), 0);
    }
}
