//! Server manifest: which languages, buff modes, teleport destinations and
//! farm modes each server offers. Preferences are validated against it.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::logger;
use crate::rules::boh::data as boh;
use crate::Result;

pub const FILE_NAME: &str = "manifest.json";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Choices {
    pub methods: Vec<String>,
    pub modes: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TeleportChoices {
    pub methods: Vec<String>,
    /// Category id to its locations.
    pub categories: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerManifest {
    pub languages: Vec<String>,
    /// UI sections shown for this server.
    pub sections: BTreeMap<String, bool>,
    pub buff: Choices,
    pub teleport: TeleportChoices,
    pub autofarm: Choices,
}

impl ServerManifest {
    /// Categories in order, populated ones first.
    pub fn categories(&self) -> Vec<String> {
        let (mut full, empty): (Vec<_>, Vec<_>) =
            self.teleport.categories.iter().partition(|(_, locs)| !locs.is_empty());
        full.extend(empty);
        full.into_iter().map(|(c, _)| c.clone()).collect()
    }

    pub fn locations(&self, category: &str) -> Vec<String> {
        self.teleport.categories.get(category).cloned().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub servers: BTreeMap<String, ServerManifest>,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Manifest {
    /// Single-server manifest for `boh`, used when no file is shipped.
    pub fn builtin() -> Self {
        let sections = ["respawn", "buff", "macros", "teleport", "record", "autofarm"]
            .into_iter()
            .map(|s| (s.to_string(), true))
            .collect();
        let mut categories: BTreeMap<String, Vec<String>> =
            boh::TELEPORT_CATEGORIES.iter().map(|c| (c.to_string(), Vec::new())).collect();
        for loc in boh::LOCATIONS {
            categories.entry(loc.category.to_string()).or_default().push(loc.id.to_string());
        }
        let server = ServerManifest {
            languages: strings(&boh::LANGUAGES),
            sections,
            buff: Choices { methods: strings(&["dashboard"]), modes: strings(&boh::BUFF_MODES) },
            teleport: TeleportChoices { methods: strings(&["dashboard"]), categories },
            autofarm: Choices { methods: Vec::new(), modes: strings(&["auto", "manual"]) },
        };
        Self { servers: BTreeMap::from([("boh".to_string(), server)]) }
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// First readable manifest among `candidates`; the built-in one when
    /// none is found or the file is broken or lists no servers.
    pub fn load(candidates: &[PathBuf]) -> Self {
        for path in candidates {
            let Ok(text) = std::fs::read_to_string(path) else { continue };
            match Self::from_json(&text) {
                Ok(m) if !m.servers.is_empty() => {
                    logger::info(&format!("manifest: {} ({} server(s))", path.display(), m.servers.len()));
                    return m;
                }
                Ok(_) => logger::warn(&format!("manifest {} lists no servers", path.display())),
                Err(e) => logger::warn(&format!("manifest {}: {}", path.display(), e)),
            }
        }
        Self::builtin()
    }

    /// Next to the executable, then the working directory.
    pub fn default_candidates(cwd: &Path) -> Vec<PathBuf> {
        let mut out = Vec::new();
        if let Some(dir) = std::env::current_exe().ok().and_then(|p| p.parent().map(Path::to_path_buf)) {
            out.push(dir.join(FILE_NAME));
        }
        out.push(cwd.join(FILE_NAME));
        out
    }

    pub fn server_ids(&self) -> Vec<String> {
        self.servers.keys().cloned().collect()
    }

    pub fn server(&self, id: &str) -> Option<&ServerManifest> {
        self.servers.get(id)
    }
}
