//! User preferences: a whitelisted slice of the pool, stored flat as
//! `{ "features.buff.mode": "mage", ... }` and validated against the
//! server manifest on load.

use std::path::{Path, PathBuf};

use serde_json::{json, Map, Value};

use crate::engines::autofarm::Skill;
use crate::logger;
use crate::manifest::{Manifest, ServerManifest};
use crate::pool::{StatePool, DEFAULT_ORDER};
use crate::services::macros_repeat::MacroRow;
use crate::Result;

/// Pool paths that survive a restart.
pub const PREF_KEYS: [&str; 24] = [
    "config.server",
    "config.language",
    "config.app_language",
    "pipeline.order",
    "features.respawn.enabled",
    "features.respawn.wait_enabled",
    "features.respawn.wait_seconds",
    "features.macros.enabled",
    "features.macros.repeat_enabled",
    "features.macros.rows",
    "features.buff.enabled",
    "features.buff.method",
    "features.buff.mode",
    "features.buff.checker",
    "features.teleport.enabled",
    "features.teleport.method",
    "features.teleport.category",
    "features.teleport.location",
    "features.autofarm.enabled",
    "features.autofarm.mode",
    "features.autofarm.config",
    "features.record.enabled",
    "features.record.current_record",
    "features.stabilize.enabled",
];

/// Copied through unchecked when present.
const PASSTHROUGH: [&str; 11] = [
    "features.respawn.enabled",
    "features.respawn.wait_enabled",
    "features.respawn.wait_seconds",
    "features.macros.enabled",
    "features.macros.repeat_enabled",
    "features.buff.enabled",
    "features.buff.checker",
    "features.teleport.enabled",
    "features.autofarm.enabled",
    "features.record.current_record",
    "features.stabilize.enabled",
];

pub type Prefs = Map<String, Value>;

/// `prefs.json` on disk.
#[derive(Debug, Clone)]
pub struct PrefsStore {
    path: PathBuf,
}

impl PrefsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `~/.revive/records/prefs.json`, next to the records.
    pub fn default_path() -> PathBuf {
        dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")).join(".revive").join("records").join("prefs.json")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing or unreadable file means no prefs.
    pub fn load(&self) -> Prefs {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(t) => t,
            Err(_) => {
                logger::info_p("prefs", &format!("{} not found, using manifest defaults", self.path.display()));
                return Prefs::new();
            }
        };
        match serde_json::from_str::<Value>(&text) {
            Ok(Value::Object(m)) => {
                logger::info_p("prefs", &format!("loaded {} key(s)", m.len()));
                m
            }
            Ok(_) => {
                logger::warn_p("prefs", "prefs file is not an object");
                Prefs::new()
            }
            Err(e) => {
                logger::warn_p("prefs", &format!("load error: {}", e));
                Prefs::new()
            }
        }
    }

    /// Write every whitelisted, non-null pool value.
    pub fn save(&self, pool: &StatePool) -> Result<()> {
        let mut out = Prefs::new();
        for key in PREF_KEYS {
            let v = pool.get(key, Value::Null);
            if !v.is_null() {
                out.insert(key.to_string(), v);
            }
        }
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(&Value::Object(out))?)?;
        logger::info_p("prefs", &format!("saved to {}", self.path.display()));
        Ok(())
    }
}

fn text(prefs: &Prefs, key: &str) -> String {
    match prefs.get(key) {
        Some(Value::String(s)) => s.trim().to_string(),
        _ => String::new(),
    }
}

/// `wanted` when it is among `allowed`, else the first choice. A rejected
/// non-empty value is logged.
fn pick(what: &str, wanted: &str, allowed: &[String]) -> String {
    if allowed.iter().any(|a| a == wanted) {
        return wanted.to_string();
    }
    let fallback = allowed.first().cloned().unwrap_or_default();
    if !wanted.is_empty() {
        logger::warn_p("prefs", &format!("{} '{}' not in {:?}, using '{}'", what, wanted, allowed, fallback));
    }
    fallback
}

fn order(prefs: &Prefs) -> Vec<String> {
    let Some(Value::Array(items)) = prefs.get("pipeline.order") else {
        return DEFAULT_ORDER.iter().map(|s| s.to_string()).collect();
    };
    let mut out = Vec::new();
    for item in items {
        let step = item.as_str().unwrap_or("").trim().to_lowercase();
        if DEFAULT_ORDER.contains(&step.as_str()) {
            if !out.contains(&step) {
                out.push(step);
            }
        } else {
            logger::warn_p("prefs", &format!("pipeline.order: dropped '{}'", item));
        }
    }
    if out.is_empty() {
        return DEFAULT_ORDER.iter().map(|s| s.to_string()).collect();
    }
    out
}

fn macro_rows(v: &Value) -> Value {
    let rows: Vec<MacroRow> = match v {
        Value::Array(items) => items.iter().map(MacroRow::from_value).collect(),
        _ => Vec::new(),
    };
    serde_json::to_value(rows).unwrap_or_else(|_| json!([]))
}

fn farm_config(v: &Value) -> Value {
    let field = |k: &str| v.get(k).and_then(Value::as_str).unwrap_or("").to_string();
    let skills: Vec<Value> = match v.get("skills") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Skill::from_value)
            .map(|s| json!({ "key": s.key, "slug": s.slug, "cast_ms": s.cast_ms, "cooldown_ms": s.cooldown_ms }))
            .collect(),
        _ => Vec::new(),
    };
    let monsters: Vec<String> = match v.get("monsters") {
        Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).map(str::to_string).collect(),
        _ => Vec::new(),
    };
    json!({ "profession": field("profession"), "skills": skills, "zone": field("zone"), "monsters": monsters })
}

/// Pool values to apply: stored prefs checked against the manifest, with
/// manifest choice lists alongside. Ordered so that parents are written
/// before dependent fields.
pub fn resolve(prefs: &Prefs, manifest: &Manifest) -> Vec<(String, Value)> {
    let mut out: Vec<(String, Value)> = Vec::new();
    let mut put = |k: &str, v: Value| out.push((k.to_string(), v));

    let servers = manifest.server_ids();
    let server = pick("server", &text(prefs, "config.server"), &servers);
    let empty = ServerManifest::default();
    let sm = manifest.server(&server).unwrap_or(&empty);
    put("config.servers", json!(servers));
    put("config.server", json!(server));

    let lang = pick("language", &text(prefs, "config.language"), &sm.languages);
    let app_lang = match text(prefs, "config.app_language") {
        s if s.is_empty() => lang.clone(),
        s => s,
    };
    put("config.language", json!(lang));
    put("config.app_language", json!(app_lang));
    put("ui.sections", json!(sm.sections));

    put("pipeline.allowed", json!(DEFAULT_ORDER));
    put("pipeline.order", json!(order(prefs)));

    put("features.buff.methods", json!(sm.buff.methods));
    put("features.buff.modes", json!(sm.buff.modes));
    put("features.buff.method", json!(pick("buff.method", &text(prefs, "features.buff.method"), &sm.buff.methods)));
    put("features.buff.mode", json!(pick("buff.mode", &text(prefs, "features.buff.mode"), &sm.buff.modes)));

    let categories = sm.categories();
    let category = pick("teleport.category", &text(prefs, "features.teleport.category"), &categories);
    let locations = sm.locations(&category);
    put("features.teleport.methods", json!(sm.teleport.methods));
    put(
        "features.teleport.method",
        json!(pick("teleport.method", &text(prefs, "features.teleport.method"), &sm.teleport.methods)),
    );
    put("features.teleport.category", json!(category));
    put(
        "features.teleport.location",
        json!(pick("teleport.location", &text(prefs, "features.teleport.location"), &locations)),
    );

    put("features.autofarm.modes", json!(sm.autofarm.modes));
    put(
        "features.autofarm.mode",
        json!(pick("autofarm.mode", &text(prefs, "features.autofarm.mode"), &sm.autofarm.modes)),
    );

    for key in PASSTHROUGH {
        if let Some(v) = prefs.get(key) {
            put(key, v.clone());
        }
    }
    if let Some(rows) = prefs.get("features.macros.rows") {
        put("features.macros.rows", macro_rows(rows));
    }
    if let Some(cfg) = prefs.get("features.autofarm.config") {
        put("features.autofarm.config", farm_config(cfg));
    }
    // playback is a one-shot request; never start with one pending
    put("features.record.enabled", json!(false));
    out
}

pub fn apply(pool: &StatePool, resolved: &[(String, Value)]) {
    for (path, v) in resolved {
        pool.set(path, v.clone());
    }
    logger::info_p(
        "prefs",
        &format!(
            "server={} lang={} tp={}/{} buff={}/{} autofarm={}",
            pool.get_str("config.server", ""),
            pool.get_str("config.language", ""),
            pool.get_str("features.teleport.category", ""),
            pool.get_str("features.teleport.location", ""),
            pool.get_str("features.buff.method", ""),
            pool.get_str("features.buff.mode", ""),
            pool.get_str("features.autofarm.mode", ""),
        ),
    );
}

/// Load, validate and apply in one go.
pub fn load_into(store: &PrefsStore, manifest: &Manifest, pool: &StatePool) {
    apply(pool, &resolve(&store.load(), manifest));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prefs(v: Value) -> Prefs {
        match v {
            Value::Object(m) => m,
            _ => Prefs::new(),
        }
    }

    fn get<'a>(r: &'a [(String, Value)], key: &str) -> Option<&'a Value> {
        r.iter().rev().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    #[test]
    fn test_invalid_values_fall_back_to_first_choice() {
        let p = prefs(json!({
            "config.server": "l2mad",
            "config.language": "deu",
            "features.buff.mode": "mage",
            "features.teleport.category": "towns",
            "features.teleport.location": "Atlantis",
            "features.autofarm.mode": "turbo",
        }));
        let r = resolve(&p, &Manifest::builtin());
        assert_eq!(get(&r, "config.server"), Some(&json!("boh")));
        assert_eq!(get(&r, "config.language"), Some(&json!("rus")));
        assert_eq!(get(&r, "config.app_language"), Some(&json!("rus")));
        assert_eq!(get(&r, "features.buff.mode"), Some(&json!("mage")));
        assert_eq!(get(&r, "features.teleport.location"), Some(&json!("VarkaSilenosStronghold")));
        assert_eq!(get(&r, "features.autofarm.mode"), Some(&json!("auto")));
    }

    #[test]
    fn test_order_and_rows_are_normalized() {
        let p = prefs(json!({
            "pipeline.order": ["Buff", "fishing", "respawn", "buff"],
            "features.macros.rows": [{ "key": "x", "cast_s": "3" }],
            "features.autofarm.config": { "zone": "varka", "skills": [{ "key": "2", "cd": 5000 }, { "slug": "nokey" }] },
        }));
        let r = resolve(&p, &Manifest::builtin());
        assert_eq!(get(&r, "pipeline.order"), Some(&json!(["buff", "respawn"])));
        assert_eq!(get(&r, "features.macros.rows"), Some(&json!([{ "key": "1", "cast_s": 3, "repeat_s": 0 }])));
        let cfg = get(&r, "features.autofarm.config").unwrap();
        assert_eq!(cfg["zone"], "varka");
        assert_eq!(cfg["skills"], json!([{ "key": "2", "slug": "", "cast_ms": 850, "cooldown_ms": 5000 }]));
    }

    #[test]
    fn test_save_then_load_keeps_whitelist_only() {
        let dir = tempfile::tempdir().unwrap();
        let store = PrefsStore::new(dir.path().join("records").join("prefs.json"));
        let pool = StatePool::with_defaults();
        pool.set("features.buff.mode", json!("archer"));
        pool.set("features.stabilize.enabled", json!(true));
        pool.set("account.password", json!("hunter2"));
        store.save(&pool).unwrap();

        let loaded = store.load();
        assert_eq!(loaded.get("features.buff.mode"), Some(&json!("archer")));
        assert_eq!(loaded.get("features.stabilize.enabled"), Some(&json!(true)));
        assert!(loaded.keys().all(|k| PREF_KEYS.contains(&k.as_str())));

        let fresh = StatePool::with_defaults();
        load_into(&store, &Manifest::builtin(), &fresh);
        assert_eq!(fresh.get_str("features.buff.mode", ""), "archer");
        assert!(fresh.get_bool("features.stabilize.enabled", false));
        assert!(!fresh.get_bool("features.record.enabled", true));
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(PrefsStore::new(dir.path().join("nope.json")).load().is_empty());
    }
}
