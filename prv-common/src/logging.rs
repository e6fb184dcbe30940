//! Logging handle passed explicitly to every component that logs
//!
//! `LogHandle::init` builds the process-wide subscriber (console + optional
//! log file) on first use and installs it as the global default; later calls
//! return the same handle. Components receive the handle through their
//! constructors and run their logging inside `LogHandle::in_scope`, so tests
//! can hand them a capturing or silent handle instead.

use crate::config::LoggingConfig;
use crate::{Error, Result};
use once_cell::sync::OnceCell;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::Dispatch;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

static PROCESS_LOGGER: OnceCell<LogHandle> = OnceCell::new();

/// Cloneable handle to a tracing dispatcher
#[derive(Clone, Debug)]
pub struct LogHandle {
    dispatch: Dispatch,
    log_file: Option<PathBuf>,
}

impl LogHandle {
    /// Initialize the process-wide logger once and return it
    ///
    /// `name` selects the log file (`{directory}/{name}.log`). The directory
    /// can only be chosen before the first call; later calls with a different
    /// directory get the existing handle and a warning.
    pub fn init(name: &str, config: &LoggingConfig) -> Result<LogHandle> {
        let handle = PROCESS_LOGGER.get_or_try_init(|| -> Result<LogHandle> {
            let handle = Self::build(name, config)?;
            tracing::dispatcher::set_global_default(handle.dispatch.clone())
                .map_err(|e| Error::Logging(format!("Global subscriber already set: {}", e)))?;
            Ok(handle)
        })?;

        if config.file_logging {
            let requested = config.directory.join(format!("{}.log", name));
            if handle.log_file.as_deref() != Some(requested.as_path()) {
                handle.in_scope(|| {
                    tracing::warn!(
                        requested = %requested.display(),
                        "Logger already initialized; log location unchanged"
                    );
                });
            }
        }

        Ok(handle.clone())
    }

    /// Handle that drops every event
    pub fn discard() -> LogHandle {
        LogHandle {
            dispatch: Dispatch::none(),
            log_file: None,
        }
    }

    /// Handle that records formatted events in memory, for tests
    pub fn capture() -> (LogHandle, LogCapture) {
        let capture = LogCapture::default();
        let subscriber = fmt()
            .with_ansi(false)
            .with_max_level(tracing::Level::TRACE)
            .with_writer(capture.clone())
            .finish();
        let handle = LogHandle {
            dispatch: Dispatch::new(subscriber),
            log_file: None,
        };
        (handle, capture)
    }

    /// Run `f` with this handle as the current dispatcher
    pub fn in_scope<T>(&self, f: impl FnOnce() -> T) -> T {
        tracing::dispatcher::with_default(&self.dispatch, f)
    }

    /// Log file written by this handle, if any
    pub fn log_file(&self) -> Option<&Path> {
        self.log_file.as_deref()
    }

    fn build(name: &str, config: &LoggingConfig) -> Result<LogHandle> {
        // RUST_LOG overrides the configured level
        let filter = match EnvFilter::try_from_default_env() {
            Ok(filter) => filter,
            Err(_) => EnvFilter::try_new(&config.level).map_err(|e| {
                Error::Config(format!("Invalid logging.level '{}': {}", config.level, e))
            })?,
        };

        let (file_layer, log_file) = if config.file_logging {
            std::fs::create_dir_all(&config.directory)?;
            let path = config.directory.join(format!("{}.log", name));
            let file = OpenOptions::new().create(true).append(true).open(&path)?;
            let layer = fmt::layer()
                .with_ansi(false)
                .with_file(true)
                .with_line_number(true)
                .with_writer(Mutex::new(file));
            (Some(layer), Some(path))
        } else {
            (None, None)
        };

        let subscriber = Registry::default()
            .with(filter)
            .with(fmt::layer().with_target(false).with_writer(io::stdout))
            .with(file_layer);

        Ok(LogHandle {
            dispatch: Dispatch::new(subscriber),
            log_file,
        })
    }
}

/// In-memory sink behind `LogHandle::capture`
#[derive(Clone, Default)]
pub struct LogCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl LogCapture {
    /// Everything logged so far
    pub fn contents(&self) -> String {
        match self.buffer.lock() {
            Ok(buffer) => String::from_utf8_lossy(&buffer).into_owned(),
            Err(poisoned) => String::from_utf8_lossy(&poisoned.into_inner()).into_owned(),
        }
    }

    /// Number of captured lines containing `needle`
    pub fn count_matching(&self, needle: &str) -> usize {
        self.contents().lines().filter(|l| l.contains(needle)).count()
    }
}

pub struct CaptureWriter {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl Write for CaptureWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut buffer = self
            .buffer
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "log capture poisoned"))?;
        buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = CaptureWriter;

    fn make_writer(&'a self) -> Self::Writer {
        CaptureWriter {
            buffer: Arc::clone(&self.buffer),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_records_scoped_events() {
        let (log, capture) = LogHandle::capture();
        log.in_scope(|| tracing::warn!("Missing RECOMMENDED fields: [\"Manufacturer\"]"));

        let contents = capture.contents();
        assert!(contents.contains("WARN"));
        assert!(contents.contains("Missing RECOMMENDED fields"));
        assert_eq!(capture.count_matching("RECOMMENDED"), 1);
    }

    #[test]
    fn test_capture_ignores_events_outside_scope() {
        let (_log, capture) = LogHandle::capture();
        tracing::warn!("not captured");
        assert!(capture.contents().is_empty());
    }

    #[test]
    fn test_discard_has_no_file() {
        let log = LogHandle::discard();
        assert!(log.log_file().is_none());
        log.in_scope(|| tracing::error!("dropped"));
    }
}
