//! # Logging
//!
//! All output goes through `tracing`. The subscriber prints one text line per
//! event to stdout, filtered by the `LOG_LEVEL` threshold.
//!
//! ## Levels
//!
//! `LOG_LEVEL` accepts exactly `ERROR`, `WARN`, `INFO` or `DEBUG` (case
//! sensitive). Anything else, including an empty value, falls back to `INFO`.
//!
//! ## Subscriber construction
//!
//! [`subscriber`] builds the subscriber without installing it. The binary
//! installs the stdout variant process-wide through [`init_logging`]; tests
//! install a capturing variant for the current thread with
//! `tracing::subscriber::set_default`, so nothing depends on global state.

use std::io::IsTerminal;
use tracing::Subscriber;
use tracing_subscriber::{
    filter::LevelFilter,
    fmt::{self, MakeWriter, time::ChronoLocal},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Maps a raw `LOG_LEVEL` value to a level filter.
pub fn parse_log_level(raw: Option<&str>) -> LevelFilter {
    match raw {
        Some("ERROR") => LevelFilter::ERROR,
        Some("WARN") => LevelFilter::WARN,
        Some("INFO") => LevelFilter::INFO,
        Some("DEBUG") => LevelFilter::DEBUG,
        _ => LevelFilter::INFO,
    }
}

/// Builds the process subscriber writing formatted lines to `writer`.
pub fn subscriber<W>(level: LevelFilter, writer: W, ansi: bool) -> impl Subscriber + Send + Sync
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    tracing_subscriber::registry().with(level).with(
        fmt::layer()
            .with_writer(writer)
            .with_ansi(ansi)
            .with_target(false)
            .with_timer(ChronoLocal::rfc_3339()),
    )
}

/// Installs the stdout subscriber as the global default.
///
/// # Errors
///
/// Fails if a global subscriber was already installed.
pub fn init_logging(level: LevelFilter) -> anyhow::Result<()> {
    let ansi = std::io::stdout().is_terminal();
    subscriber(level, std::io::stdout, ansi).try_init()?;
    Ok(())
}

#[cfg(test)]
pub(crate) mod capture {
    use parking_lot::Mutex;
    use std::{io, sync::Arc};
    use tracing::subscriber::DefaultGuard;
    use tracing_subscriber::{filter::LevelFilter, fmt::MakeWriter};

    /// In-memory log sink for asserting on emitted lines.
    #[derive(Clone, Default)]
    pub(crate) struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl CapturedLogs {
        /// Routes this thread's events into the sink until the guard drops.
        pub(crate) fn set_default(&self, level: LevelFilter) -> DefaultGuard {
            tracing::subscriber::set_default(super::subscriber(level, self.clone(), false))
        }

        pub(crate) fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock()).into_owned()
        }

        pub(crate) fn lines(&self) -> Vec<String> {
            self.contents().lines().map(str::to_owned).collect()
        }

        /// Number of lines containing `needle`.
        pub(crate) fn count(&self, needle: &str) -> usize {
            self.lines().iter().filter(|l| l.contains(needle)).count()
        }
    }

    impl io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'w> MakeWriter<'w> for CapturedLogs {
        type Writer = Self;

        fn make_writer(&'w self) -> Self::Writer {
            self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::capture::CapturedLogs;
    use super::*;

    #[test]
    fn recognised_levels_are_case_sensitive() {
        assert_eq!(parse_log_level(Some("ERROR")), LevelFilter::ERROR);
        assert_eq!(parse_log_level(Some("WARN")), LevelFilter::WARN);
        assert_eq!(parse_log_level(Some("INFO")), LevelFilter::INFO);
        assert_eq!(parse_log_level(Some("DEBUG")), LevelFilter::DEBUG);
    }

    #[test]
    fn anything_else_is_info() {
        for raw in [
            "", "debug", "Debug", "warn", "error", "TRACE", "WARNING", " INFO", "DEBUG ", "0",
            "OFF",
        ] {
            assert_eq!(parse_log_level(Some(raw)), LevelFilter::INFO, "LOG_LEVEL={raw:?}");
        }
        assert_eq!(parse_log_level(None), LevelFilter::INFO);
    }

    #[test]
    fn threshold_filters_lower_levels() {
        let logs = CapturedLogs::default();
        let _guard = logs.set_default(LevelFilter::WARN);

        tracing::info!("quiet");
        tracing::warn!(port = 50051, "loud");

        let lines = logs.lines();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("WARN"));
        assert!(lines[0].contains("loud"));
        assert!(lines[0].contains("port=50051"));
    }
}
