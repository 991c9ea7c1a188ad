//! Console and file logging for the `hashfeed-dl` binary.
//!
//! Events go to stdout and are appended to a plain-text log file through a
//! non-blocking writer. Verbosity follows `RUST_LOG`, defaulting to `info`.

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Default log file, relative to the working directory
pub const DEFAULT_LOG_FILE: &str = "hashfeed-dl.log";

/// Keeps the background log writer alive.
///
/// Dropping it flushes buffered lines and closes the log file, so hold it until the
/// process is about to exit.
pub struct LoggingGuard {
    _file_guard: WorkerGuard,
}

/// Install the global subscriber writing to stdout and to `log_file`.
///
/// The file's parent directory is created if needed and existing content is kept;
/// each run appends. A subscriber installed earlier is left in place.
///
/// # Errors
///
/// Returns an error if the log directory cannot be created or the file cannot be opened.
pub fn init_logging(log_file: &Path) -> io::Result<LoggingGuard> {
    let (file_writer, file_guard) = file_writer(log_file)?;

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(file_writer)
        .with_ansi(false);

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stdout)
        .compact();

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer)
        .try_init()
        .ok(); // Ignore error if already initialized

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}

/// Open `log_file` for appending behind a non-blocking writer
fn file_writer(log_file: &Path) -> io::Result<(NonBlocking, WorkerGuard)> {
    let (dir, name) = split_log_path(log_file)?;
    fs::create_dir_all(&dir)?;
    // rolling::never panics on open failure, so surface it here first
    fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join(&name))?;

    let appender = tracing_appender::rolling::never(dir, name);
    Ok(tracing_appender::non_blocking(appender))
}

/// Split a log path into the directory and file name the appender expects
fn split_log_path(log_file: &Path) -> io::Result<(PathBuf, OsString)> {
    let name = log_file.file_name().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("log file path has no file name: {}", log_file.display()),
        )
    })?;

    let dir = match log_file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };

    Ok((dir, name.to_owned()))
}
