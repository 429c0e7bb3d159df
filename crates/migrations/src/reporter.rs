//! Console output for migration runs
//!
//! The reporter is the sink for announcement lines. Verbosity travels with the
//! reporter value, so a quiet run is a quiet reporter, not a global toggle.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::version::Version;

/// Width the announcement text is padded to with `=`
const ANNOUNCE_WIDTH: usize = 75;

type Sink = Arc<dyn Fn(&str) + Send + Sync>;

/// Output sink for migration announcements
#[derive(Clone)]
pub struct Reporter {
    verbose: bool,
    sink: Sink,
}

impl fmt::Debug for Reporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reporter")
            .field("verbose", &self.verbose)
            .finish()
    }
}

impl Default for Reporter {
    fn default() -> Self {
        Self::stdout()
    }
}

impl Reporter {
    /// Reporter printing to standard output
    pub fn stdout() -> Self {
        Self::with_sink(|line| println!("{}", line))
    }

    /// Reporter discarding everything
    pub fn silent() -> Self {
        Self::stdout().with_verbose(false)
    }

    /// Reporter recording lines in memory
    pub fn capture() -> (Self, CapturedOutput) {
        let captured = CapturedOutput::default();
        let lines = captured.lines.clone();
        let reporter = Self::with_sink(move |line| {
            if let Ok(mut lines) = lines.lock() {
                lines.push(line.to_string());
            }
        });
        (reporter, captured)
    }

    /// Reporter forwarding each line to a custom sink
    pub fn with_sink<F>(sink: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        Self {
            verbose: true,
            sink: Arc::new(sink),
        }
    }

    /// Same sink, different verbosity
    pub fn with_verbose(&self, verbose: bool) -> Self {
        Self {
            verbose,
            sink: self.sink.clone(),
        }
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    pub fn write(&self, text: &str) {
        if self.verbose {
            (self.sink)(text);
        }
    }

    /// `== <version> <name>: <message> =====...`
    pub fn announce(&self, version: Version, name: &str, message: &str) {
        self.write(&announcement(version, name, message));
    }

    pub fn say(&self, message: &str) {
        self.write(&format!("-- {}", message));
    }

    pub fn say_subitem(&self, message: &str) {
        self.write(&format!("   -> {}", message));
    }

    /// Print the message, await the work, then print its duration and row count
    pub async fn say_with_time<F, T>(&self, message: &str, work: F) -> T
    where
        F: Future<Output = T>,
        T: RowCount,
    {
        self.say(message);
        let started = Instant::now();
        let result = work.await;
        self.say_subitem(&format!("{:.4}s", started.elapsed().as_secs_f64()));
        if let Some(rows) = result.row_count() {
            self.say_subitem(&format!("{} rows", rows));
        }
        result
    }
}

/// Format an announcement line
pub fn announcement(version: Version, name: &str, message: &str) -> String {
    let text = format!("{} {}: {}", version, name, message);
    let padding = ANNOUNCE_WIDTH.saturating_sub(text.chars().count());
    format!("== {} {}", text, "=".repeat(padding))
}

/// Lines recorded by [`Reporter::capture`]
#[derive(Debug, Clone, Default)]
pub struct CapturedOutput {
    lines: Arc<Mutex<Vec<String>>>,
}

impl CapturedOutput {
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().map(|lines| lines.clone()).unwrap_or_default()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lines().iter().any(|line| line.contains(needle))
    }

    pub fn clear(&self) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.clear();
        }
    }
}

/// Results that can report an affected-row count
pub trait RowCount {
    fn row_count(&self) -> Option<u64>;
}

impl RowCount for () {
    fn row_count(&self) -> Option<u64> {
        None
    }
}

impl RowCount for u64 {
    fn row_count(&self) -> Option<u64> {
        Some(*self)
    }
}

impl RowCount for usize {
    fn row_count(&self) -> Option<u64> {
        Some(*self as u64)
    }
}

impl<T: RowCount> RowCount for Option<T> {
    fn row_count(&self) -> Option<u64> {
        self.as_ref().and_then(RowCount::row_count)
    }
}

impl<T: RowCount, E> RowCount for Result<T, E> {
    fn row_count(&self) -> Option<u64> {
        self.as_ref().ok().and_then(RowCount::row_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_announcement_padding() {
        let line = announcement(Version(20111116172729), "Foo", "migrating");
        assert!(line.starts_with("== 20111116172729 Foo: migrating ="));
        assert_eq!(line.chars().count(), 3 + ANNOUNCE_WIDTH + 1);
    }

    #[test]
    fn test_long_announcement_is_not_padded() {
        let name = "A".repeat(100);
        let line = announcement(Version(1), &name, "migrating");
        assert!(line.ends_with("migrating "));
    }

    #[test]
    fn test_quiet_reporter_writes_nothing() {
        let (reporter, output) = Reporter::capture();
        let quiet = reporter.with_verbose(false);

        quiet.say("hidden");
        reporter.say("shown");

        assert_eq!(output.lines(), vec!["-- shown".to_string()]);
        assert!(reporter.is_verbose());
    }

    #[tokio::test]
    async fn test_say_with_time_reports_rows() {
        let (reporter, output) = Reporter::capture();

        let rows = reporter.say_with_time("backfill", async { 42u64 }).await;

        assert_eq!(rows, 42);
        let lines = output.lines();
        assert_eq!(lines[0], "-- backfill");
        assert!(lines[1].starts_with("   -> ") && lines[1].ends_with('s'));
        assert_eq!(lines[2], "   -> 42 rows");
    }

    #[tokio::test]
    async fn test_say_with_time_without_count() {
        let (reporter, output) = Reporter::capture();

        reporter.say_with_time("noop", async {}).await;

        assert_eq!(output.lines().len(), 2);
    }
}
