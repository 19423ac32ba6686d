//! Logging sink shared by the components
//!
//! By default every message goes through `tracing` under the emitting
//! module's target, so `RUST_LOG=bulksync::rate_limit=debug` selects one
//! component. Callers that want the plain strings (tests, embedding hosts
//! with their own log pipeline) can hand in a closure instead.

use crate::types::LogLevel;
use std::fmt;
use std::sync::Arc;

/// Closure receiving one formatted log line
pub type SinkFn = Arc<dyn Fn(&str) + Send + Sync>;

/// Where component log messages go
#[derive(Clone, Default)]
pub enum Logger {
    /// Emit through the `tracing` macros
    #[default]
    Tracing,
    /// Forward the plain message to a caller closure
    Sink(SinkFn),
}

impl Logger {
    /// Create a logger that forwards messages to `f`
    pub fn sink(f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        Self::Sink(Arc::new(f))
    }

    /// Drop every message
    pub fn silent() -> Self {
        Self::sink(|_| {})
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tracing => f.write_str("Logger::Tracing"),
            Self::Sink(_) => f.write_str("Logger::Sink"),
        }
    }
}

/// Emit a message at `$level` through `$logger`, targeted at the calling module
macro_rules! log_at {
    ($level:ident, $logger:expr, $($arg:tt)+) => {
        match &$logger {
            $crate::logging::Logger::Tracing => {
                ::tracing::$level!(target: module_path!(), $($arg)+)
            }
            $crate::logging::Logger::Sink(sink) => sink(::std::format!($($arg)+).as_str()),
        }
    };
}

macro_rules! log_debug {
    ($logger:expr, $($arg:tt)+) => {
        $crate::logging::log_at!(debug, $logger, $($arg)+)
    };
}

macro_rules! log_info {
    ($logger:expr, $($arg:tt)+) => {
        $crate::logging::log_at!(info, $logger, $($arg)+)
    };
}

macro_rules! log_warn {
    ($logger:expr, $($arg:tt)+) => {
        $crate::logging::log_at!(warn, $logger, $($arg)+)
    };
}

pub(crate) use log_at;
pub(crate) use log_debug;
pub(crate) use log_info;
pub(crate) use log_warn;

/// Install the global fmt subscriber used by the binary.
///
/// `RUST_LOG` wins over `level` when set. Output goes to stderr so stdout
/// can carry records.
pub fn init_tracing(level: LogLevel) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::default()
            .add_directive(tracing::Level::from(level).into())
    });

    // A second call (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Test helper: a sink that records every line it receives
#[cfg(test)]
pub(crate) fn capture() -> (Logger, Arc<std::sync::Mutex<Vec<String>>>) {
    let lines = Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink_lines = Arc::clone(&lines);
    let logger = Logger::sink(move |msg| {
        if let Ok(mut lines) = sink_lines.lock() {
            lines.push(msg.to_string());
        }
    });
    (logger, lines)
}

/// Test helper: formatted `tracing` output, with targets
#[cfg(test)]
#[derive(Clone, Default)]
pub(crate) struct TraceBuffer(Arc<std::sync::Mutex<Vec<u8>>>);

#[cfg(test)]
impl TraceBuffer {
    pub(crate) fn contents(&self) -> String {
        let bytes = self.0.lock().map(|b| b.clone()).unwrap_or_default();
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

#[cfg(test)]
impl std::io::Write for TraceBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if let Ok(mut bytes) = self.0.lock() {
            bytes.extend_from_slice(buf);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Test helper: route `tracing` events on this thread into a buffer until
/// the guard drops
#[cfg(test)]
pub(crate) fn capture_tracing() -> (tracing::subscriber::DefaultGuard, TraceBuffer) {
    let buffer = TraceBuffer::default();
    let writer = buffer.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_target(true)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();
    (tracing::subscriber::set_default(subscriber), buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sink_receives_messages() {
        let (logger, lines) = capture();
        log_info!(logger, "first");
        log_warn!(logger, "second {}", 2);
        log_debug!(logger, "third");

        let lines = lines.lock().unwrap();
        assert_eq!(*lines, vec!["first", "second 2", "third"]);
    }

    #[test]
    fn test_default_is_tracing() {
        let logger = Logger::default();
        assert!(matches!(logger, Logger::Tracing));
        assert_eq!(format!("{logger:?}"), "Logger::Tracing");
        // Must not panic without a subscriber installed
        log_info!(logger, "no subscriber");
    }

    #[test]
    fn test_tracing_events_carry_calling_module() {
        let (_guard, output) = capture_tracing();
        log_warn!(Logger::Tracing, "from the tests module");

        let output = output.contents();
        assert!(output.contains("bulksync::logging::tests"), "{output}");
        assert!(output.contains("from the tests module"), "{output}");
    }
}
