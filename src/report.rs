//! Leveled reporting sink.
//!
//! Pipeline components never print directly. They report through a
//! [`Reporter`], which the CLI backs with the colored terminal logger and
//! tests back with [`MemoryReporter`].

use std::sync::Arc;

use parking_lot::Mutex;

/// Message severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    /// Diagnostic detail, shown only with `--verbose`.
    Verbose,
    Output,
    Warning,
    Error,
}

/// Sink for leveled, module-prefixed messages.
pub trait Reporter: Send + Sync {
    fn report(&self, level: Level, module: &str, message: &str);

    fn verbose(&self, module: &str, message: &str) {
        self.report(Level::Verbose, module, message);
    }

    fn output(&self, module: &str, message: &str) {
        self.report(Level::Output, module, message);
    }

    fn warn(&self, module: &str, message: &str) {
        self.report(Level::Warning, module, message);
    }

    fn error(&self, module: &str, message: &str) {
        self.report(Level::Error, module, message);
    }
}

pub type SharedReporter = Arc<dyn Reporter>;

/// Terminal reporter built on the `log!` prefixes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleReporter;

impl ConsoleReporter {
    pub fn shared() -> SharedReporter {
        Arc::new(Self)
    }
}

impl Reporter for ConsoleReporter {
    fn report(&self, level: Level, module: &str, message: &str) {
        match level {
            Level::Verbose => crate::debug!(module; "{}", message),
            Level::Output => crate::logger::log(module, message),
            Level::Warning => crate::logger::log_err(module, &format!("warning: {message}")),
            Level::Error => crate::logger::log_err("error", &format!("{module}: {message}")),
        }
    }
}

/// One captured report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub level: Level,
    pub module: String,
    pub message: String,
}

/// Reporter that records everything, for tests and embedding hosts.
#[derive(Debug, Default)]
pub struct MemoryReporter {
    entries: Mutex<Vec<Entry>>,
}

impl MemoryReporter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn entries(&self) -> Vec<Entry> {
        self.entries.lock().clone()
    }

    /// Messages reported at `level`, in order.
    pub fn messages(&self, level: Level) -> Vec<String> {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.level == level)
            .map(|e| e.message.clone())
            .collect()
    }

    /// Whether any message contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        self.entries.lock().iter().any(|e| e.message.contains(needle))
    }
}

impl Reporter for MemoryReporter {
    fn report(&self, level: Level, module: &str, message: &str) {
        self.entries.lock().push(Entry {
            level,
            module: module.to_string(),
            message: message.to_string(),
        });
    }
}
