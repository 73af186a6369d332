//! Logging setup.
//!
//! Console output always, plus a daily-rolling file when a log directory is
//! configured. Timestamps use the local timezone.

use std::path::Path;

use chrono::Local;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::Writer, time::FormatTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Default log filter directive.
pub const DEFAULT_LOG_FILTER: &str = "sms_relay=info,sqlx=warn";

/// Filter used when the `debug` flag is set.
pub const DEBUG_LOG_FILTER: &str = "sms_relay=debug,sqlx=warn";

const LOG_FILE_PREFIX: &str = "sms-relay.log";

#[derive(Debug, Clone, Copy)]
struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        let now = Local::now();
        write!(w, "{}", now.format("%Y-%m-%dT%H:%M:%S%.3f%:z"))
    }
}

/// `RUST_LOG` wins; otherwise the default or debug directive.
pub fn default_filter(debug: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if debug {
            DEBUG_LOG_FILTER
        } else {
            DEFAULT_LOG_FILTER
        })
    })
}

/// Install the global subscriber.
///
/// Keep the returned guard alive for the lifetime of the process, or buffered
/// file output is lost.
pub fn init_logging(log_dir: Option<&Path>, debug: bool) -> crate::Result<Option<WorkerGuard>> {
    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_timer(LocalTimer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(default_filter(debug))
        .with(fmt::layer().with_ansi(true).with_timer(LocalTimer))
        .with(file_layer)
        .try_init()
        .map_err(|e| crate::Error::Other(format!("Failed to set global default subscriber: {}", e)))?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter() {
        assert!(DEFAULT_LOG_FILTER.contains("sms_relay=info"));
        assert!(DEFAULT_LOG_FILTER.contains("sqlx=warn"));
        assert!(DEBUG_LOG_FILTER.contains("sms_relay=debug"));
    }

    #[test]
    fn test_local_timer_writes_offset() {
        let mut out = String::new();
        LocalTimer.format_time(&mut Writer::new(&mut out)).unwrap();
        // 2025-03-01T10:00:00.000+01:00
        assert_eq!(out.len(), 29);
        assert_eq!(&out[10..11], "T");
    }
}
