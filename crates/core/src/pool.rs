//! Shared state pool: one JSON tree addressed by dotted paths.
//!
//! Every live piece of application state is reachable from here. Writes are
//! shallow merges at the addressed node; a single lock around the tree makes
//! each `get`/`write` atomic. There are no cross-path transactions, so
//! readers that combine several paths build a [`crate::snapshot::Snapshot`].

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{json, Map, Value};

use crate::error::{Error, Result};
use crate::logger;
use crate::sleep::mono_now;

pub const FEATURES: [&str; 8] = [
    "respawn", "buff", "macros", "teleport", "autofarm", "record", "stabilize", "ui_guard",
];

pub const SERVICES: [&str; 4] = ["player_state", "window_focus", "macros_repeat", "autofarm"];

pub const DEFAULT_ORDER: [&str; 6] = ["respawn", "buff", "macros", "teleport", "record", "autofarm"];

/// `alive = hp_ratio > ALIVE_EPSILON`
pub const ALIVE_EPSILON: f64 = 0.001;

#[derive(Clone, Default)]
pub struct StatePool {
    root: Arc<Mutex<Value>>,
}

fn split_path(path: &str) -> Result<Vec<&str>> {
    let path = path.trim();
    if path.is_empty() {
        return Err(Error::InvalidPath(path.to_string()));
    }
    Ok(path.split('.').filter(|s| !s.is_empty()).collect())
}

fn as_object(v: &mut Value) -> &mut Map<String, Value> {
    if !v.is_object() {
        *v = Value::Object(Map::new());
    }
    let Value::Object(map) = v else { unreachable!("replaced with an object above") };
    map
}

/// Walk to `keys`, creating objects on the way.
fn node_mut<'a>(root: &'a mut Value, keys: &[&str]) -> &'a mut Map<String, Value> {
    let mut cur = root;
    for k in keys {
        cur = as_object(cur).entry(k.to_string()).or_insert_with(|| Value::Object(Map::new()));
    }
    as_object(cur)
}

fn lookup<'a>(root: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    let mut cur = root;
    for k in keys {
        cur = cur.as_object()?.get(*k)?;
    }
    Some(cur)
}

/// Fill keys missing in `dst` from `src`, recursively. Existing values win.
fn fill_missing(dst: &mut Value, src: &Value) {
    let (Value::Object(d), Value::Object(s)) = (dst, src) else { return };
    for (k, v) in s {
        match d.get_mut(k) {
            Some(existing) => fill_missing(existing, v),
            None => {
                d.insert(k.clone(), v.clone());
            }
        }
    }
}

/// `window.found ⇔ window.info` has all of x, y, width, height.
pub fn window_info_complete(info: &Value) -> bool {
    ["x", "y", "width", "height"]
        .iter()
        .all(|k| info.get(*k).map_or(false, |v| v.is_number()))
}

impl StatePool {
    pub fn new() -> Self {
        Self { root: Arc::new(Mutex::new(Value::Object(Map::new()))) }
    }

    /// Pool seeded with every default node.
    pub fn with_defaults() -> Self {
        let pool = Self::new();
        pool.ensure_defaults();
        pool
    }

    /// Value at `path`, or `default` when absent. An empty path returns `default`.
    pub fn get(&self, path: &str, default: Value) -> Value {
        let Ok(keys) = split_path(path) else { return default };
        let root = self.root.lock();
        match lookup(&root, &keys) {
            Some(Value::Null) | None => default,
            Some(v) => v.clone(),
        }
    }

    /// Shallow-merge `fields` into the node at `path`, creating it if needed.
    /// Adds `ts` (monotonic seconds) when `fields` carries none; the stored
    /// `ts` never goes backwards.
    pub fn write(&self, path: &str, fields: Value) -> Result<()> {
        let keys = split_path(path)?;
        let Value::Object(fields) = fields else {
            logger::warn_p("pool", &format!("write({}) ignored: fields must be a mapping", path));
            return Ok(());
        };

        let mut root = self.root.lock();
        let node = node_mut(&mut root, &keys);
        let prev_ts = node.get("ts").and_then(Value::as_f64).unwrap_or(0.0);
        let ts = fields.get("ts").and_then(Value::as_f64).unwrap_or_else(mono_now);
        for (k, v) in fields {
            node.insert(k, v);
        }
        node.insert("ts".into(), json!(ts.max(prev_ts)));

        if keys[0] == "window" {
            let found = root
                .get("window")
                .and_then(|w| w.get("info"))
                .map_or(false, window_info_complete);
            node_mut(&mut root, &["window"]).insert("found".into(), json!(found));
        }
        Ok(())
    }

    /// Write one leaf. `set("features.buff.mode", "mage")` merges
    /// `{mode: "mage"}` into `features.buff`.
    pub fn set(&self, path: &str, value: Value) {
        let Ok(keys) = split_path(path) else {
            logger::warn_p("pool", "set() with empty path");
            return;
        };
        let (leaf, parent) = keys.split_last().map(|(l, p)| (*l, p.join("."))).unwrap_or(("", String::new()));
        if parent.is_empty() {
            let mut root = self.root.lock();
            if let Value::Object(map) = &mut *root {
                map.insert(leaf.to_string(), value);
            }
            return;
        }
        let mut m = Map::new();
        m.insert(leaf.to_string(), value);
        self.write(&parent, Value::Object(m)).ok();
    }

    /// Serialized tree (pretty unless `compact`).
    pub fn dump(&self, compact: bool) -> String {
        let root = self.root.lock();
        let out = if compact { serde_json::to_string(&*root) } else { serde_json::to_string_pretty(&*root) };
        out.unwrap_or_default()
    }

    /// Deep copy of the whole tree.
    pub fn clone_tree(&self) -> Value {
        self.root.lock().clone()
    }

    // -- typed readers; all tolerate missing or mistyped fields --

    pub fn get_bool(&self, path: &str, default: bool) -> bool {
        self.get(path, Value::Null).as_bool().unwrap_or(default)
    }

    pub fn get_opt_bool(&self, path: &str) -> Option<bool> {
        self.get(path, Value::Null).as_bool()
    }

    pub fn get_f64(&self, path: &str, default: f64) -> f64 {
        self.get(path, Value::Null).as_f64().unwrap_or(default)
    }

    pub fn get_opt_f64(&self, path: &str) -> Option<f64> {
        self.get(path, Value::Null).as_f64()
    }

    pub fn get_i64(&self, path: &str, default: i64) -> i64 {
        let v = self.get(path, Value::Null);
        v.as_i64().or_else(|| v.as_f64().map(|f| f as i64)).unwrap_or(default)
    }

    pub fn get_str(&self, path: &str, default: &str) -> String {
        match self.get(path, Value::Null) {
            Value::String(s) => s,
            _ => default.to_string(),
        }
    }

    pub fn get_str_list(&self, path: &str) -> Vec<String> {
        match self.get(path, Value::Null) {
            Value::Array(items) => items
                .into_iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// `runtime.debug.<name>` toggle.
    pub fn debug(&self, name: &str) -> bool {
        self.get_bool(&format!("runtime.debug.{}", name), false)
    }

    /// Effective game language (`rus` when unset).
    pub fn language(&self) -> String {
        let lang = self.get_str("config.language", "rus").to_lowercase();
        if lang.is_empty() { "rus".into() } else { lang }
    }

    pub fn server(&self) -> String {
        self.get_str("config.server", "boh").to_lowercase()
    }

    // -- feature helpers shared by behaviors --

    pub fn attempts(&self, feature: &str) -> i64 {
        self.get_i64(&format!("features.{}.attempts", feature), 0)
    }

    pub fn set_attempts(&self, feature: &str, n: i64) {
        self.write(&format!("features.{}", feature), json!({ "attempts": n.max(0) })).ok();
    }

    /// Increment and return the new attempt count.
    pub fn bump_attempts(&self, feature: &str) -> i64 {
        let n = self.attempts(feature) + 1;
        self.set_attempts(feature, n);
        n
    }

    pub fn set_busy(&self, feature: &str, busy: bool) {
        self.write(&format!("features.{}", feature), json!({ "busy": busy })).ok();
    }

    pub fn feature_paused(&self, feature: &str) -> bool {
        self.get_bool(&format!("features.{}.paused", feature), false)
    }

    /// Seed every default node. Existing values are never overwritten.
    pub fn ensure_defaults(&self) {
        let defaults = default_tree();
        let mut root = self.root.lock();
        if !root.is_object() {
            *root = Value::Object(Map::new());
        }
        fill_missing(&mut root, &defaults);
    }
}

fn feature_node(extra: Value) -> Value {
    let mut base = json!({
        "enabled": false,
        "busy": false,
        "paused": false,
        "pause_reason": "",
        "status": "idle",
        "attempts": 0,
        "ts": 0.0,
    });
    if let (Value::Object(b), Value::Object(e)) = (&mut base, extra) {
        b.extend(e);
    }
    base
}

fn default_tree() -> Value {
    let mut features = Map::new();
    for name in FEATURES {
        let extra = match name {
            "respawn" => json!({
                "wait_enabled": false,
                "wait_seconds": 120,
                "click_threshold": 0.70,
                "confirm_timeout_s": 6.0,
                "last_respawn": null,
            }),
            "buff" => json!({ "method": "dashboard", "mode": "profile", "checker": [], "methods": [], "modes": [] }),
            "macros" => json!({ "rows": [], "repeat_enabled": false }),
            "teleport" => json!({ "method": "dashboard", "category": "", "location": "", "methods": [] }),
            "autofarm" => json!({
                "mode": "auto",
                "modes": [],
                "config": { "profession": "", "skills": [], "zone": "", "monsters": [] },
            }),
            "record" => json!({ "records": [], "current_record": "" }),
            "ui_guard" => json!({ "report": "empty" }),
            _ => json!({}),
        };
        features.insert(name.to_string(), feature_node(extra));
    }

    let mut services = Map::new();
    for name in SERVICES {
        services.insert(
            name.to_string(),
            json!({ "running": false, "paused": false, "pause_reason": "", "ts": 0.0 }),
        );
    }

    let mut ui_status = Map::new();
    for scope in [
        "driver", "window", "watcher", "update", "buff", "macros", "tp", "respawn", "focus", "autofarm",
        "record", "ui_guard",
    ] {
        ui_status.insert(scope.to_string(), json!({ "text": "", "ok": null }));
    }

    json!({
        "app": { "version": env!("CARGO_PKG_VERSION") },
        "config": { "server": "boh", "language": "rus", "app_language": "rus", "servers": [] },
        "window": { "info": null, "found": false, "title": "", "ts": 0.0 },
        "focus": { "is_focused": null, "ts": 0.0 },
        "player": { "alive": null, "hp_ratio": null, "cp_ratio": null, "ts": 0.0 },
        "account": { "login": "", "password": "", "pin": "" },
        "features": features,
        "services": services,
        "pipeline": {
            "allowed": DEFAULT_ORDER,
            "order": DEFAULT_ORDER,
            "active": false,
            "idx": 0,
            "last_step": "",
            "paused": false,
            "pause_reason": "",
            "ts": 0.0,
        },
        "runtime": {
            "pauses": { "reasons": {} },
            "focus_pause": { "saved": null, "saved_busy": null },
            "debug": {
                "pipeline": false, "coordinator": false, "vitals": false, "focus": false,
                "macros": false, "autofarm": false, "flow": false,
            },
        },
        "ui_status": ui_status,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_write_merges_and_creates_nodes() {
        let pool = StatePool::new();
        pool.write("features.buff", json!({ "mode": "mage" })).unwrap();
        pool.write("features.buff", json!({ "enabled": true })).unwrap();
        assert_eq!(pool.get_str("features.buff.mode", ""), "mage");
        assert!(pool.get_bool("features.buff.enabled", false));
        assert!(pool.get_opt_f64("features.buff.ts").is_some());
    }

    #[test]
    fn test_merge_is_shallow() {
        let pool = StatePool::new();
        pool.write("a", json!({ "b": { "x": 1, "y": 2 } })).unwrap();
        pool.write("a", json!({ "b": { "x": 5 } })).unwrap();
        assert_eq!(pool.get("a.b", Value::Null), json!({ "x": 5 }));
    }

    #[test]
    fn test_ts_never_goes_backwards() {
        let pool = StatePool::new();
        pool.write("focus", json!({ "is_focused": true, "ts": 10.0 })).unwrap();
        pool.write("focus", json!({ "is_focused": false, "ts": 3.0 })).unwrap();
        assert_eq!(pool.get_f64("focus.ts", 0.0), 10.0);
        let before = pool.get_f64("focus.ts", 0.0);
        pool.write("focus", json!({ "is_focused": true })).unwrap();
        assert!(pool.get_f64("focus.ts", 0.0) >= before);
    }

    #[test]
    fn test_empty_path_is_invalid() {
        let pool = StatePool::new();
        assert!(matches!(pool.write("", json!({})), Err(Error::InvalidPath(_))));
        assert_eq!(pool.get("", json!(7)), json!(7));
    }

    #[test]
    fn test_get_default_for_missing_and_null() {
        let pool = StatePool::with_defaults();
        assert_eq!(pool.get("player.alive", json!("x")), json!("x"));
        assert_eq!(pool.get("nope.deeper", json!(3)), json!(3));
    }

    #[test]
    fn test_window_found_tracks_info() {
        let pool = StatePool::with_defaults();
        pool.write("window", json!({ "info": { "x": 0, "y": 0, "width": 800 } })).unwrap();
        assert!(!pool.get_bool("window.found", true));
        pool.write("window", json!({ "info": { "x": 0, "y": 0, "width": 800, "height": 600, "hwnd": 1 } }))
            .unwrap();
        assert!(pool.get_bool("window.found", false));
        pool.write("window", json!({ "info": null })).unwrap();
        assert!(!pool.get_bool("window.found", true));
    }

    #[test]
    fn test_ensure_defaults_keeps_existing() {
        let pool = StatePool::new();
        pool.write("features.respawn", json!({ "wait_seconds": 30 })).unwrap();
        pool.ensure_defaults();
        assert_eq!(pool.get_i64("features.respawn.wait_seconds", 0), 30);
        assert_eq!(pool.get_f64("features.respawn.click_threshold", 0.0), 0.70);
        assert_eq!(pool.get_str_list("pipeline.order")[0], "respawn");
    }

    #[test]
    fn test_set_leaf() {
        let pool = StatePool::with_defaults();
        pool.set("features.record.current_record", json!("farm_route"));
        assert_eq!(pool.get_str("features.record.current_record", ""), "farm_route");
    }

    #[test]
    fn test_attempt_helpers() {
        let pool = StatePool::with_defaults();
        assert_eq!(pool.bump_attempts("buff"), 1);
        assert_eq!(pool.bump_attempts("buff"), 2);
        pool.set_attempts("buff", 0);
        assert_eq!(pool.attempts("buff"), 0);
    }

    #[test]
    fn test_concurrent_writes_are_atomic() {
        let pool = StatePool::new();
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let p = pool.clone();
                thread::spawn(move || {
                    for j in 0..100 {
                        p.write(&format!("t.n{}", i), json!({ "v": j })).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        for i in 0..8 {
            assert_eq!(pool.get_i64(&format!("t.n{}.v", i), -1), 99);
        }
    }

    #[test]
    fn test_dump_compact() {
        let pool = StatePool::new();
        pool.write("a", json!({ "ts": 1.0 })).unwrap();
        assert_eq!(pool.dump(true), r#"{"a":{"ts":1.0}}"#);
    }
}
