// 📝 Logging - Injected event log capability
// Components receive an EventLog instead of reaching for a global logger,
// so tests can assert on what was emitted.

use std::sync::{Arc, Mutex};

/// Minimal logging capability passed to every component
pub trait EventLog: Send + Sync {
    fn info(&self, message: &str);
    fn warn(&self, message: &str);
    fn error(&self, message: &str);
}

/// Shared handle used by the engines
pub type SharedLog = Arc<dyn EventLog>;

// ============================================================================
// TRACING BACKEND
// ============================================================================

/// Forwards events to `tracing`, tagged with the owning component
#[derive(Debug, Clone)]
pub struct TracingLog {
    component: &'static str,
}

impl TracingLog {
    pub fn new(component: &'static str) -> Self {
        TracingLog { component }
    }

    pub fn shared(component: &'static str) -> SharedLog {
        Arc::new(Self::new(component))
    }
}

impl EventLog for TracingLog {
    fn info(&self, message: &str) {
        tracing::info!(component = self.component, "{}", message);
    }

    fn warn(&self, message: &str) {
        tracing::warn!(component = self.component, "{}", message);
    }

    fn error(&self, message: &str) {
        tracing::error!(component = self.component, "{}", message);
    }
}

/// Install the fmt subscriber for binaries (RUST_LOG, default `info`)
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    // A second install (tests, embedding) is not an error
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

// ============================================================================
// IN-MEMORY BACKEND
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEvent {
    pub level: Level,
    pub message: String,
}

/// Records every event; used by tests and by callers that surface logs in a UI
#[derive(Debug, Default)]
pub struct MemoryLog {
    events: Mutex<Vec<LogEvent>>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<LogEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn messages(&self, level: Level) -> Vec<String> {
        self.events()
            .into_iter()
            .filter(|e| e.level == level)
            .map(|e| e.message)
            .collect()
    }

    /// True when any event at `level` contains `needle`
    pub fn contains(&self, level: Level, needle: &str) -> bool {
        self.messages(level).iter().any(|m| m.contains(needle))
    }

    fn push(&self, level: Level, message: &str) {
        if let Ok(mut events) = self.events.lock() {
            events.push(LogEvent {
                level,
                message: message.to_string(),
            });
        }
    }
}

impl EventLog for MemoryLog {
    fn info(&self, message: &str) {
        self.push(Level::Info, message);
    }

    fn warn(&self, message: &str) {
        self.push(Level::Warn, message);
    }

    fn error(&self, message: &str) {
        self.push(Level::Error, message);
    }
}
