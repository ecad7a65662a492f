//! Process-wide log: `logs/app.log` plus a structured feed for the TUI.
//!
//! TUI lines are `level\x1fprefix\x1fcolor\x1ftime\x1fmessage`; the shell
//! splits them back into colored spans.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::{mpsc, OnceLock};

use chrono::Local;
use parking_lot::Mutex;

// Color indices understood by the TUI
pub const COLOR_GRAY: u8 = 1;
pub const COLOR_BLUE: u8 = 2;
pub const COLOR_GREEN: u8 = 3;
pub const COLOR_YELLOW: u8 = 4;
pub const COLOR_RED: u8 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Level {
    Info,
    Warn,
    Error,
}

impl Level {
    fn as_str(self) -> &'static str {
        match self {
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
        }
    }
}

struct Sinks {
    file: Option<File>,
    tui: Option<mpsc::Sender<String>>,
    colors: HashMap<String, u8>,
}

static SINKS: OnceLock<Mutex<Sinks>> = OnceLock::new();

/// Open (and truncate) `log_dir/app.log`. Safe to call once; later calls
/// are ignored. Without a writable directory only the TUI feed works.
pub fn init(log_dir: &Path) {
    fs::create_dir_all(log_dir).ok();
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(log_dir.join("app.log"))
        .ok();
    SINKS.set(Mutex::new(Sinks { file, tui: None, colors: HashMap::new() })).ok();
}

fn with_sinks(f: impl FnOnce(&mut Sinks)) {
    if let Some(sinks) = SINKS.get() {
        f(&mut sinks.lock());
    }
}

pub fn set_tui_sender(tx: mpsc::Sender<String>) {
    with_sinks(|s| s.tui = Some(tx));
}

/// Drop the TUI feed before its receiver goes away.
pub fn clear_tui_sender() {
    with_sinks(|s| s.tui = None);
}

/// Color every later `*_p` line carrying `prefix`.
pub fn register_prefix(prefix: &str, color: u8) {
    with_sinks(|s| {
        s.colors.insert(prefix.to_string(), color);
    });
}

/// Prefixes used across the core: plumbing in gray, services blue,
/// engines green, HUD yellow.
pub fn register_core_prefixes() {
    let groups: [(&[&str], u8); 4] = [
        (&["pool", "vision", "flow", "prefs", "record"], COLOR_GRAY),
        (&["serial", "vitals", "focus", "macros", "coordinator", "pipeline"], COLOR_BLUE),
        (&["respawn", "buff", "teleport", "stabilize", "autofarm", "ui_guard"], COLOR_GREEN),
        (&["hud"], COLOR_YELLOW),
    ];
    for (names, color) in groups {
        for name in names {
            register_prefix(name, color);
        }
    }
}

fn file_line(ts: &str, level: Level, prefix: &str, msg: &str) -> String {
    if prefix.is_empty() {
        format!("[{}] [{}] {}", ts, level.as_str(), msg)
    } else {
        format!("[{}] [{}] [{}] {}", ts, level.as_str(), prefix, msg)
    }
}

fn tui_line(ts: &str, level: Level, prefix: &str, color: u8, msg: &str) -> String {
    [level.as_str(), prefix, &color.to_string(), ts, msg].join("\x1f")
}

fn emit(level: Level, prefix: &str, msg: &str) {
    with_sinks(|s| {
        let ts = Local::now().format("%H:%M:%S").to_string();
        if let Some(file) = s.file.as_mut() {
            writeln!(file, "{}", file_line(&ts, level, prefix, msg)).ok();
        }
        if let Some(tx) = &s.tui {
            let color = s.colors.get(prefix).copied().unwrap_or(0);
            tx.send(tui_line(&ts, level, prefix, color, msg)).ok();
        }
    });
}

pub fn info(msg: &str) {
    emit(Level::Info, "", msg);
}

pub fn warn(msg: &str) {
    emit(Level::Warn, "", msg);
}

pub fn error(msg: &str) {
    emit(Level::Error, "", msg);
}

pub fn info_p(prefix: &str, msg: &str) {
    emit(Level::Info, prefix, msg);
}

pub fn warn_p(prefix: &str, msg: &str) {
    emit(Level::Warn, prefix, msg);
}

pub fn error_p(prefix: &str, msg: &str) {
    emit(Level::Error, prefix, msg);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_line_with_and_without_prefix() {
        assert_eq!(file_line("10:00:00", Level::Info, "", "hello"), "[10:00:00] [INFO] hello");
        assert_eq!(
            file_line("10:00:00", Level::Warn, "respawn", "dead"),
            "[10:00:00] [WARN] [respawn] dead"
        );
    }

    #[test]
    fn test_tui_line_fields() {
        let line = tui_line("12:34:56", Level::Error, "serial", COLOR_BLUE, "port a:b closed");
        let fields: Vec<&str> = line.splitn(5, '\x1f').collect();
        assert_eq!(fields, vec!["ERROR", "serial", "2", "12:34:56", "port a:b closed"]);
    }
}
