use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;

use super::ENGINE;
use crate::engines::slugify;
use crate::logger;

/// A monster's display names. Any of them may be missing.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct MonsterNames {
    #[serde(default)]
    pub rus_short: Option<String>,
    #[serde(default)]
    pub eng_short: Option<String>,
    #[serde(default)]
    pub rus_full: Option<String>,
    #[serde(default)]
    pub eng_full: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Monster {
    pub id: String,
    pub names: MonsterNames,
}

fn clean(s: &Option<String>) -> Option<&str> {
    s.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl Monster {
    fn ru(lang: &str) -> bool {
        lang.starts_with("ru")
    }

    pub fn short_name(&self, lang: &str) -> Option<&str> {
        let n = &self.names;
        if Self::ru(lang) { clean(&n.rus_short) } else { clean(&n.eng_short) }
    }

    pub fn full_name(&self, lang: &str) -> Option<&str> {
        let n = &self.names;
        if Self::ru(lang) { clean(&n.rus_full) } else { clean(&n.eng_full) }
    }

    /// Name typed into `/target`: short form first, the id as last resort.
    pub fn target_name(&self, lang: &str) -> String {
        self.short_name(lang)
            .or_else(|| self.full_name(lang))
            .map(str::to_string)
            .unwrap_or_else(|| self.id.clone())
    }

    /// Template file stems to try, full name first.
    pub fn template_slugs(&self, lang: &str) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for s in [self.full_name(lang).map(slugify), self.short_name(lang).map(slugify), Some(self.id.clone())]
            .into_iter()
            .flatten()
        {
            if !s.is_empty() && !out.contains(&s) {
                out.push(s);
            }
        }
        out
    }

    fn matches(&self, wanted: &str) -> bool {
        let wanted = wanted.trim();
        if wanted == self.id {
            return true;
        }
        let n = &self.names;
        [&n.rus_short, &n.eng_short, &n.rus_full, &n.eng_full]
            .into_iter()
            .filter_map(clean)
            .any(|name| name == wanted || slugify(name) == slugify(wanted))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FarmZone {
    pub id: String,
    /// Ordered by id.
    pub monsters: Vec<Monster>,
}

impl FarmZone {
    /// Monsters picked in the config; an empty pick allows the whole zone.
    pub fn allowed(&self, picked: &[String]) -> Vec<&Monster> {
        if picked.is_empty() {
            return self.monsters.iter().collect();
        }
        self.monsters.iter().filter(|m| picked.iter().any(|p| m.matches(p))).collect()
    }
}

#[derive(Debug, Deserialize)]
struct RawZone {
    #[serde(default)]
    monsters: BTreeMap<String, MonsterNames>,
}

/// `zones.json`: `{zone_id: {monsters: {slug: {rus_short, eng_short, rus_full, eng_full}}}}`.
#[derive(Debug, Clone, Default)]
pub struct ZoneRepo {
    zones: HashMap<String, FarmZone>,
}

impl ZoneRepo {
    pub fn from_value(v: &Value) -> Self {
        let raw = match serde_json::from_value::<HashMap<String, RawZone>>(v.clone()) {
            Ok(m) => m,
            Err(e) => {
                logger::warn_p(ENGINE, &format!("bad zones: {}", e));
                HashMap::new()
            }
        };
        let zones = raw
            .into_iter()
            .map(|(id, z)| {
                let monsters = z.monsters.into_iter().map(|(id, names)| Monster { id, names }).collect();
                (id.clone(), FarmZone { id, monsters })
            })
            .collect();
        Self { zones }
    }

    /// Missing file means no zones.
    pub fn load(path: &Path) -> Self {
        let Ok(text) = std::fs::read_to_string(path) else {
            return Self::default();
        };
        match serde_json::from_str::<Value>(&text) {
            Ok(v) => Self::from_value(&v),
            Err(e) => {
                logger::warn_p(ENGINE, &format!("{}: {}", path.display(), e));
                Self::default()
            }
        }
    }

    pub fn zone(&self, id: &str) -> Option<&FarmZone> {
        self.zones.get(id)
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.zones.keys().cloned().collect();
        ids.sort();
        ids
    }
}
