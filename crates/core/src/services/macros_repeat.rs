use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Service, Worker};
use crate::logger;
use crate::pool::StatePool;
use crate::sleep::{mono_now, sleep_until_stopped};
use crate::transport::Controller;

/// One macro row: press `key`, wait `cast_s`, repeat every `repeat_s`
/// seconds (0 = never).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MacroRow {
    pub key: String,
    pub cast_s: u32,
    pub repeat_s: u32,
}

/// First char when it is a digit, else `"1"`.
pub fn normalize_key(raw: &str) -> String {
    match raw.trim().chars().next() {
        Some(c) if c.is_ascii_digit() => c.to_string(),
        _ => "1".to_string(),
    }
}

fn number(v: &Value, key: &str) -> f64 {
    match v.get(key) {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

impl MacroRow {
    pub fn from_value(v: &Value) -> Self {
        let key = match v.get("key") {
            Some(Value::String(s)) => normalize_key(s),
            Some(Value::Number(n)) => normalize_key(&n.to_string()),
            _ => "1".to_string(),
        };
        Self {
            key,
            cast_s: number(v, "cast_s").clamp(0.0, 99.0) as u32,
            repeat_s: number(v, "repeat_s").clamp(0.0, 9999.0) as u32,
        }
    }
}

/// Normalized `features.macros.rows`.
pub fn rows_from_pool(pool: &StatePool) -> Vec<MacroRow> {
    match pool.get("features.macros.rows", Value::Null) {
        Value::Array(rows) => rows.iter().map(MacroRow::from_value).collect(),
        _ => Vec::new(),
    }
}

struct Inner {
    pool: StatePool,
    controller: Controller,
    last_exec: Mutex<HashMap<usize, f64>>,
    prev_alive: Mutex<Option<bool>>,
}

/// Fires macro rows with `repeat_s > 0` on their own periods.
pub struct MacrosRepeatService {
    inner: Arc<Inner>,
    worker: Worker,
}

impl MacrosRepeatService {
    pub fn new(pool: StatePool, controller: Controller) -> Self {
        Self {
            inner: Arc::new(Inner {
                pool,
                controller,
                last_exec: Mutex::new(HashMap::new()),
                prev_alive: Mutex::new(None),
            }),
            worker: Worker::new("macros_repeat"),
        }
    }

    /// Restart every row's period from now.
    pub fn bump_all(&self) {
        self.inner.bump_all();
    }

    /// One pass; returns how many rows fired.
    pub fn tick(&self, stop: &AtomicBool) -> usize {
        self.inner.tick(stop)
    }
}

impl Inner {
    fn bump_all(&self) {
        let now = mono_now();
        let rows = rows_from_pool(&self.pool).len();
        let mut last = self.last_exec.lock();
        for idx in 0..rows {
            last.insert(idx, now);
        }
    }

    fn tick(&self, stop: &AtomicBool) -> usize {
        let pool = &self.pool;
        if !pool.get_bool("features.macros.enabled", false) || !pool.get_bool("features.macros.repeat_enabled", false) {
            return 0;
        }
        if pool.get_bool("services.macros_repeat.paused", false) {
            return 0;
        }

        let alive = pool.get_opt_bool("player.alive");
        let revived = {
            let mut prev = self.prev_alive.lock();
            let revived = *prev == Some(false) && alive == Some(true);
            *prev = alive;
            revived
        };
        if revived {
            self.bump_all();
        }
        let focused = pool.get_opt_bool("focus.is_focused");
        match alive {
            Some(false) => return 0,
            None if focused != Some(true) => return 0,
            _ if focused == Some(false) => return 0,
            _ => {}
        }

        let now = mono_now();
        let due: Vec<(usize, MacroRow)> = {
            let last = self.last_exec.lock();
            rows_from_pool(pool)
                .into_iter()
                .enumerate()
                .filter(|(idx, row)| {
                    row.repeat_s > 0 && last.get(idx).map_or(true, |t| now - t >= row.repeat_s as f64)
                })
                .collect()
        };

        let mut fired = 0;
        for (idx, row) in due {
            self.last_exec.lock().insert(idx, mono_now());
            if !self.controller.send(&row.key) {
                logger::warn_p("macros", &format!("repeat {} failed", row.key));
                continue;
            }
            fired += 1;
            if pool.debug("macros") {
                logger::info_p("macros", &format!("repeat key {} (cast {}s)", row.key, row.cast_s));
            }
            if !sleep_until_stopped(Duration::from_secs(row.cast_s as u64), stop) {
                break;
            }
        }
        fired
    }
}

impl Service for MacrosRepeatService {
    fn name(&self) -> &'static str {
        "macros_repeat"
    }

    fn start(&self, poll: Duration) {
        let inner = Arc::clone(&self.inner);
        self.worker.start(poll, move |stop| {
            inner.tick(stop);
        });
    }

    fn stop(&self) {
        self.worker.stop();
    }

    fn is_running(&self) -> bool {
        self.worker.is_running()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::stub::StubPlatform;
    use crate::transport::{RecordingLink, SentLog};
    use serde_json::json;

    fn service(rows: Value) -> (MacrosRepeatService, StatePool, SentLog) {
        let pool = StatePool::with_defaults();
        pool.write("features.macros", json!({ "enabled": true, "repeat_enabled": true, "rows": rows })).unwrap();
        pool.write("player", json!({ "alive": true })).unwrap();
        pool.write("focus", json!({ "is_focused": true })).unwrap();
        let (link, log) = RecordingLink::new();
        let ctl = Controller::new(Box::new(link), Arc::new(StubPlatform::new()));
        (MacrosRepeatService::new(pool.clone(), ctl), pool, log)
    }

    #[test]
    fn test_row_normalization() {
        let row = MacroRow::from_value(&json!({ "key": "x7", "cast_s": 500, "repeat_s": "-3" }));
        assert_eq!(row, MacroRow { key: "1".into(), cast_s: 99, repeat_s: 0 });
        let row = MacroRow::from_value(&json!({ "key": 42, "cast_s": 1.5, "repeat_s": 30 }));
        assert_eq!(row, MacroRow { key: "4".into(), cast_s: 1, repeat_s: 30 });
    }

    #[test]
    fn test_fires_due_rows_once_per_period() {
        let stop = AtomicBool::new(false);
        let (svc, _pool, log) =
            service(json!([{ "key": "2", "cast_s": 0, "repeat_s": 60 }, { "key": "3", "cast_s": 0, "repeat_s": 0 }]));
        assert_eq!(svc.tick(&stop), 1);
        assert_eq!(svc.tick(&stop), 0);
        assert_eq!(log.lines(), vec!["2"]);
    }

    #[test]
    fn test_dead_skips_and_revive_bumps() {
        let stop = AtomicBool::new(false);
        let (svc, pool, log) = service(json!([{ "key": "5", "cast_s": 0, "repeat_s": 60 }]));
        pool.write("player", json!({ "alive": false })).unwrap();
        assert_eq!(svc.tick(&stop), 0);
        pool.write("player", json!({ "alive": true })).unwrap();
        // revival restarts the period instead of firing at once
        assert_eq!(svc.tick(&stop), 0);
        assert!(log.lines().is_empty());
    }

    #[test]
    fn test_unknown_vitals_need_focus() {
        let stop = AtomicBool::new(false);
        let (svc, pool, _log) = service(json!([{ "key": "5", "cast_s": 0, "repeat_s": 60 }]));
        pool.write("player", json!({ "alive": null })).unwrap();
        pool.write("focus", json!({ "is_focused": null })).unwrap();
        assert_eq!(svc.tick(&stop), 0);
        pool.write("focus", json!({ "is_focused": true })).unwrap();
        assert_eq!(svc.tick(&stop), 1);
    }

    #[test]
    fn test_requires_repeat_enabled() {
        let stop = AtomicBool::new(false);
        let (svc, pool, _log) = service(json!([{ "key": "5", "cast_s": 0, "repeat_s": 60 }]));
        pool.write("features.macros", json!({ "repeat_enabled": false })).unwrap();
        assert_eq!(svc.tick(&stop), 0);
    }
}
