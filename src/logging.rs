//! Run log: console plus a log file truncated at the start of every run.
//!
//! Every event becomes one line:
//!
//! ```text
//! [2026/10/16 09:30:00] Processing category: online (在线)
//! [2026/10/16 09:30:02] ERROR: Download failed url=https://... error=Status code: 404
//! ```
//!
//! ERROR lines go to stderr, everything else to stdout. `RUST_LOG` adjusts
//! verbosity as usual, defaulting to `info`.

use chrono::Local;
use std::fmt;
use std::fs::{self, File};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

const TIMESTAMP_FORMAT: &str = "%Y/%m/%d %H:%M:%S";

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Failed to create log file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to install tracing subscriber: {0}")]
    Init(#[from] TryInitError),
}

/// Local wall-clock time as `YYYY/MM/DD HH:MM:SS`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalTimestamp;

impl FormatTime for LocalTimestamp {
    fn format_time(&self, w: &mut Writer<'_>) -> fmt::Result {
        write!(w, "{}", Local::now().format(TIMESTAMP_FORMAT))
    }
}

/// `[timestamp] message` lines, with `ERROR: ` / `WARN: ` tags.
#[derive(Debug, Clone, Copy)]
pub struct RunLogFormat<T = LocalTimestamp> {
    timer: T,
}

impl RunLogFormat {
    pub fn new() -> Self {
        Self::with_timer(LocalTimestamp)
    }
}

impl<T> RunLogFormat<T> {
    pub fn with_timer(timer: T) -> Self {
        Self { timer }
    }
}

impl<S, N, T> FormatEvent<S, N> for RunLogFormat<T>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
    T: FormatTime,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        writer.write_char('[')?;
        self.timer.format_time(&mut writer)?;
        writer.write_str("] ")?;
        match *event.metadata().level() {
            Level::ERROR => writer.write_str("ERROR: ")?,
            Level::WARN => writer.write_str("WARN: ")?,
            _ => {}
        }
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Truncate `log_path` and install the global subscriber.
pub fn init(log_path: &Path) -> Result<(), LoggingError> {
    let io_err = |source: std::io::Error| LoggingError::Io {
        path: log_path.to_path_buf(),
        source,
    };
    if let Some(parent) = log_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    let file = File::create(log_path).map_err(io_err)?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let console = std::io::stderr
        .with_max_level(Level::ERROR)
        .or_else(std::io::stdout);

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tfmt::layer()
                .event_format(RunLogFormat::new())
                .with_ansi(std::io::stdout().is_terminal())
                .with_writer(console),
        )
        .with(
            tfmt::layer()
                .event_format(RunLogFormat::new())
                .with_ansi(false)
                .with_writer(Mutex::new(file)),
        )
        .try_init()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct Buffer(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Buffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct FixedTime;

    impl FormatTime for FixedTime {
        fn format_time(&self, w: &mut Writer<'_>) -> fmt::Result {
            w.write_str("2026/01/02 03:04:05")
        }
    }

    fn capture(f: impl FnOnce()) -> String {
        let buf = Buffer::default();
        let writer = buf.clone();
        let subscriber = tfmt()
            .with_ansi(false)
            .event_format(RunLogFormat::with_timer(FixedTime))
            .with_writer(move || writer.clone())
            .finish();
        tracing::subscriber::with_default(subscriber, f);
        let bytes = buf.0.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn test_info_line_format() {
        let out = capture(|| tracing::info!("Starting update process..."));
        assert_eq!(out, "[2026/01/02 03:04:05] Starting update process...\n");
    }

    #[test]
    fn test_error_line_is_tagged() {
        let url = "https://example.com/a.json";
        let out = capture(|| tracing::error!(url = %url, "No cache available, skipping"));
        assert!(out.starts_with("[2026/01/02 03:04:05] ERROR: No cache available, skipping"));
        assert!(out.contains("https://example.com/a.json"));
        assert!(!out.contains('\x1b'), "escape codes in plain output: {out:?}");
        assert!(out.ends_with('\n'));
    }

    #[test]
    fn test_warn_line_is_tagged() {
        let out = capture(|| tracing::warn!("Using cached file"));
        assert_eq!(out, "[2026/01/02 03:04:05] WARN: Using cached file\n");
    }

    #[test]
    fn test_local_timestamp_shape() {
        let mut s = String::new();
        LocalTimestamp.format_time(&mut Writer::new(&mut s)).unwrap();
        assert_eq!(s.len(), "2026/01/02 03:04:05".len());
        assert_eq!(&s[4..5], "/");
        assert_eq!(&s[10..11], " ");
    }
}
