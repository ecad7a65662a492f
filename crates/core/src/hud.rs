use std::fmt;

use parking_lot::Mutex;
use serde_json::json;

use crate::logger;
use crate::pool::StatePool;

/// Severity of a user-facing HUD message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Ok,
    Succ,
    Att,
    Err,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Ok => "ok",
            Severity::Succ => "succ",
            Severity::Att => "att",
            Severity::Err => "err",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sink for user-visible messages. Attached once at startup.
pub trait HudSink: Send + Sync {
    fn log(&self, text: &str);
    fn hud(&self, severity: Severity, text: &str);

    /// HUD line that also lands in `ui_status.<scope>`.
    fn status(&self, scope: &str, severity: Severity, text: &str) {
        let _ = scope;
        self.hud(severity, text);
    }
}

/// Routes HUD lines to the global logger and mirrors them into the pool.
pub struct LogHud {
    pool: StatePool,
}

impl LogHud {
    pub fn new(pool: StatePool) -> Self {
        Self { pool }
    }
}

impl HudSink for LogHud {
    fn log(&self, text: &str) {
        logger::info(text);
    }

    fn hud(&self, severity: Severity, text: &str) {
        match severity {
            Severity::Err => logger::error_p("hud", text),
            Severity::Att => logger::warn_p("hud", text),
            _ => logger::info_p("hud", text),
        }
        self.pool.set("ui_status.hud", json!({ "text": text, "severity": severity.as_str() }));
    }

    fn status(&self, scope: &str, severity: Severity, text: &str) {
        self.hud(severity, text);
        let ok = !matches!(severity, Severity::Err);
        self.pool
            .write(&format!("ui_status.{}", scope), json!({ "text": text, "ok": ok }))
            .ok();
    }
}

/// Keeps every HUD line in memory. Used by tests and the stub runtime.
#[derive(Default)]
pub struct MemoryHud {
    lines: Mutex<Vec<(Severity, String)>>,
}

impl MemoryHud {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<(Severity, String)> {
        self.lines.lock().clone()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lines.lock().iter().any(|(_, l)| l.contains(needle))
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.lines.lock().iter().filter(|(s, _)| *s == severity).count()
    }
}

impl HudSink for MemoryHud {
    fn log(&self, _text: &str) {}

    fn hud(&self, severity: Severity, text: &str) {
        self.lines.lock().push((severity, text.to_string()));
    }
}
