use std::io;
use std::sync::{Arc, Mutex, PoisonError};

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::MakeWriter;

#[doc(hidden)]
pub fn __init_test(target: &'static str) {
    let target = target.split("::").next().unwrap_or(target);

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(format!("{target}=trace")))
        .with_test_writer()
        .try_init()
        .ok();
}

/// Initialize the logger for testing.
///
/// This logs to the stdout registered by the Rust test runner, and only captures logs from the
/// calling crate. Pass a target prefix to capture logs from all crates whose name starts with it.
///
/// # Example
///
/// ```
/// tally_log::init_test!();
/// tally_log::init_test!("tally");
/// ```
#[macro_export]
macro_rules! init_test {
    () => {
        $crate::__init_test(::std::module_path!());
    };
    ($target:expr) => {
        $crate::__init_test($target);
    };
}

/// Runs `f` with a scoped logger and returns everything it logged.
///
/// Every event is rendered as one JSON object per line with its fields flattened into the top
/// level object. The scoped logger only applies to the current thread and records all levels.
///
/// # Example
///
/// ```
/// let ((), logs) = tally_log::capture_logs(|| tally_log::warn!(metric = "cpu", "skipped"));
///
/// assert_eq!(logs.len(), 1);
/// assert!(logs[0].contains(r#""metric":"cpu""#));
/// ```
pub fn capture_logs<R>(f: impl FnOnce() -> R) -> (R, Vec<String>) {
    let writer = CaptureWriter::default();

    let subscriber = tracing_subscriber::fmt()
        .json()
        .flatten_event(true)
        .without_time()
        .with_max_level(tracing::Level::TRACE)
        .with_writer(writer.clone())
        .finish();

    let result = tracing::subscriber::with_default(subscriber, f);
    (result, writer.lines())
}

#[derive(Clone, Debug, Default)]
struct CaptureWriter(Arc<Mutex<Vec<u8>>>);

impl CaptureWriter {
    fn lines(&self) -> Vec<String> {
        let buffer = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&buffer)
            .lines()
            .map(str::to_owned)
            .collect()
    }
}

impl io::Write for CaptureWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut buffer = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CaptureWriter {
    type Writer = Self;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
