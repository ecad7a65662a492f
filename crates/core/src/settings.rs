use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::logger;
use crate::transport::serial::DEFAULT_BAUD;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportSettings {
    /// Serial port name; empty runs without hardware input.
    pub port: String,
    pub baud: u32,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self { port: String::new(), baud: DEFAULT_BAUD }
    }
}

pub const PORT_ENV: &str = "REVIVE_PORT";

impl TransportSettings {
    /// `REVIVE_PORT` when set and non-empty, else the configured port.
    pub fn resolved_port(&self) -> String {
        Self::pick_port(std::env::var(PORT_ENV).ok(), &self.port)
    }

    fn pick_port(env: Option<String>, configured: &str) -> String {
        match env {
            Some(p) if !p.trim().is_empty() => p.trim().to_string(),
            _ => configured.to_string(),
        }
    }
}

/// Process wiring read from `settings.json` in the working directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub templates_dir: PathBuf,
    pub transport: TransportSettings,
    /// Server id forced over the preferences when set.
    pub server: Option<String>,
    pub stub: bool,
    /// Substring of the game window title.
    pub window_title: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            templates_dir: PathBuf::from("templates"),
            transport: TransportSettings::default(),
            server: None,
            stub: false,
            window_title: "Lineage".to_string(),
        }
    }
}

impl Settings {
    /// Missing file means defaults; a broken one is logged and ignored.
    pub fn load(path: &Path) -> Self {
        let Ok(text) = std::fs::read_to_string(path) else {
            return Self::default();
        };
        match serde_json::from_str(&text) {
            Ok(s) => s,
            Err(e) => {
                logger::warn(&format!("{}: {}, using defaults", path.display(), e));
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> crate::Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// `templates_dir` resolved against `base` when relative.
    pub fn templates_root(&self, base: &Path) -> PathBuf {
        if self.templates_dir.is_absolute() {
            self.templates_dir.clone()
        } else {
            base.join(&self.templates_dir)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"transport": {"port": "COM5"}, "stub": true}"#).unwrap();
        let s = Settings::load(&path);
        assert_eq!(s.transport.port, "COM5");
        assert_eq!(s.transport.baud, DEFAULT_BAUD);
        assert!(s.stub);
        assert_eq!(s.templates_root(dir.path()), dir.path().join("templates"));
    }

    #[test]
    fn test_missing_or_broken_is_default() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(Settings::load(&dir.path().join("none.json")), Settings::default());
        let broken = dir.path().join("broken.json");
        std::fs::write(&broken, "[1, 2").unwrap();
        assert_eq!(Settings::load(&broken), Settings::default());
    }

    #[test]
    fn test_env_port_wins_when_set() {
        assert_eq!(TransportSettings::pick_port(Some("COM7".into()), "COM5"), "COM7");
        assert_eq!(TransportSettings::pick_port(Some("  ".into()), "COM5"), "COM5");
        assert_eq!(TransportSettings::pick_port(None, ""), "");
    }

    #[test]
    fn test_save_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let s = Settings { server: Some("boh".into()), ..Settings::default() };
        s.save(&path).unwrap();
        assert_eq!(Settings::load(&path), s);
    }
}
