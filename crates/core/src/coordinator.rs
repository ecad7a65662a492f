//! Pause coordination. Reason providers are evaluated every period; a reason
//! turning on pauses every pausable path that is not paused yet and keeps
//! those paths in its bucket, turning off releases what its bucket holds.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{json, Value};

use crate::engines::ui_guard::UiGuard;
use crate::hud::{HudSink, Severity};
use crate::logger;
use crate::pool::{StatePool, FEATURES};
use crate::services::Worker;
use crate::sleep::mono_now;

/// Every reason, highest priority first.
pub const REASONS: [&str; 4] = ["cor_2", "cor_3", "ui_guard", "cor_1"];

const PAUSED_SERVICES: [&str; 3] = ["player_state", "macros_repeat", "autofarm"];

/// Pipeline, every feature but `ui_guard`, every service but focus tracking.
pub fn pausable_paths() -> Vec<String> {
    let mut paths = vec!["pipeline".to_string()];
    paths.extend(FEATURES.iter().filter(|f| **f != "ui_guard").map(|f| format!("features.{}", f)));
    paths.extend(PAUSED_SERVICES.iter().map(|s| format!("services.{}", s)));
    paths
}

/// The part of the UI guard the coordinator drives.
pub trait GuardWatch: Send + Sync {
    fn ensure_watch(&self);
    fn stop_watch(&self);
    fn set_suspended(&self, suspended: bool);
    fn passes(&self) -> u64;
}

impl GuardWatch for UiGuard {
    fn ensure_watch(&self) {
        UiGuard::ensure_watch(self);
    }
    fn stop_watch(&self) {
        UiGuard::stop_watch(self);
    }
    fn set_suspended(&self, suspended: bool) {
        UiGuard::set_suspended(self, suspended);
    }
    fn passes(&self) -> u64 {
        UiGuard::passes(self)
    }
}

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub period: Duration,
    /// Focus must stay lost this long before `cor_1` fires.
    pub grace_s: f64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self { period: Duration::from_millis(500), grace_s: 0.4 }
    }
}

#[derive(Default)]
struct State {
    active: BTreeSet<&'static str>,
    forced: BTreeSet<&'static str>,
    buckets: HashMap<&'static str, Vec<String>>,
    unfocused_since: Option<f64>,
    guard_passes: u64,
    guard_reason: String,
    /// `cor_2` whose paths were already released after a clean guard pass.
    cor_2_resolved: bool,
}

struct Inner {
    pool: StatePool,
    hud: Arc<dyn HudSink>,
    guard: Option<Arc<dyn GuardWatch>>,
    cfg: CoordinatorConfig,
    state: Mutex<State>,
}

pub struct Coordinator {
    inner: Arc<Inner>,
    worker: Worker,
}

fn reason_key(reason: &str) -> Option<&'static str> {
    REASONS.iter().copied().find(|r| *r == reason)
}

impl Inner {
    fn debug(&self, text: &str) {
        if self.pool.debug("coordinator") {
            logger::info_p("coordinator", text);
        }
    }

    fn wanted(&self, now: f64, st: &mut State) -> BTreeSet<&'static str> {
        let pool = &self.pool;
        let focused = pool.get_opt_bool("focus.is_focused");
        let unfocused = focused == Some(false);
        if unfocused {
            st.unfocused_since.get_or_insert(now);
        } else {
            st.unfocused_since = None;
        }
        let guard_busy = pool.get_bool("features.ui_guard.busy", false);

        let mut want = BTreeSet::new();
        if st.unfocused_since.map_or(false, |t| now - t >= self.cfg.grace_s) {
            want.insert("cor_1");
        }
        if pool.get_opt_bool("player.alive") == Some(true)
            && pool.get_opt_f64("player.hp_ratio").is_none()
            && pool.get_bool("features.autofarm.busy", false)
        {
            want.insert("cor_2");
        }
        if guard_busy && unfocused {
            want.insert("cor_3");
        }
        if guard_busy {
            want.insert("ui_guard");
        }
        want.extend(st.forced.iter().copied());
        want
    }

    fn tick_at(&self, now: f64) {
        let mut st = self.state.lock();
        let want = self.wanted(now, &mut st);
        for reason in REASONS {
            match (st.active.contains(reason), want.contains(reason)) {
                (false, true) => self.activate(reason, &mut st),
                (true, false) => self.deactivate(reason, &mut st),
                _ => {}
            }
        }
        self.follow_guard(&mut st);
    }

    fn activate(&self, reason: &'static str, st: &mut State) {
        let pool = &self.pool;
        st.active.insert(reason);
        let mut bucket = Vec::new();
        for path in pausable_paths() {
            if !pool.get_bool(&format!("{}.paused", path), false) {
                pool.write(&path, json!({ "paused": true, "pause_reason": reason })).ok();
                bucket.push(path);
            }
        }
        pool.set(&format!("runtime.pauses.reasons.{}", reason), json!(true));
        self.debug(&format!("{} on, paused {}", reason, bucket.len()));

        match reason {
            "cor_1" => {
                let busy: Vec<&str> = FEATURES
                    .iter()
                    .copied()
                    .filter(|f| pool.get_bool(&format!("features.{}.busy", f), false))
                    .collect();
                pool.write("runtime.focus_pause", json!({ "saved": bucket.clone(), "saved_busy": busy })).ok();
                self.hud.hud(Severity::Att, "services stopped, return to game");
            }
            "cor_2" => {
                st.cor_2_resolved = false;
                st.guard_reason.clear();
                if let Some(guard) = &self.guard {
                    st.guard_passes = guard.passes();
                    guard.ensure_watch();
                }
                self.hud.hud(Severity::Att, "HP bar hidden, checking the interface");
            }
            "cor_3" => {
                if let Some(guard) = &self.guard {
                    guard.set_suspended(true);
                }
            }
            _ => {}
        }
        st.buckets.insert(reason, bucket);
    }

    fn deactivate(&self, reason: &'static str, st: &mut State) {
        st.active.remove(reason);
        match reason {
            "cor_1" => {
                self.pool.write("runtime.focus_pause", json!({ "saved": Value::Null, "saved_busy": Value::Null })).ok();
                self.hud.hud(Severity::Succ, "focus restored, services resumed");
            }
            "cor_2" => {
                if let Some(guard) = &self.guard {
                    guard.stop_watch();
                }
            }
            "cor_3" => {
                if let Some(guard) = &self.guard {
                    guard.set_suspended(false);
                }
            }
            _ => {}
        }
        self.release(reason, st);
        self.pool.set(&format!("runtime.pauses.reasons.{}", reason), json!(false));
        self.debug(&format!("{} off", reason));
    }

    /// Release the bucket. A path still wanted by another active reason is
    /// handed over to it instead.
    fn release(&self, reason: &'static str, st: &mut State) {
        let heir = REASONS
            .iter()
            .copied()
            .find(|r| *r != reason && st.active.contains(*r) && !(*r == "cor_2" && st.cor_2_resolved));
        let paths = st.buckets.remove(reason).unwrap_or_default();
        for path in paths {
            if self.pool.get_str(&format!("{}.pause_reason", path), "") != reason {
                continue;
            }
            match heir {
                Some(h) => {
                    self.pool.write(&path, json!({ "pause_reason": h })).ok();
                    st.buckets.entry(h).or_default().push(path);
                }
                None => {
                    self.pool.write(&path, json!({ "paused": false, "pause_reason": "" })).ok();
                }
            }
        }
    }

    /// While `cor_2` holds, a clean guard pass releases its paths; a
    /// blocker keeps them and is shown once.
    fn follow_guard(&self, st: &mut State) {
        let Some(guard) = &self.guard else { return };
        if !st.active.contains("cor_2") || st.cor_2_resolved {
            return;
        }
        let passes = guard.passes();
        if passes <= st.guard_passes {
            return;
        }
        st.guard_passes = passes;
        let blocker = self.pool.get_str("features.ui_guard.pause_reason", "");
        if blocker.is_empty() {
            st.cor_2_resolved = true;
            self.release("cor_2", st);
            self.hud.hud(Severity::Succ, "interface clear, resuming");
        } else if blocker != st.guard_reason {
            self.hud.hud(Severity::Err, &format!("interface blocked: {}", blocker));
            st.guard_reason = blocker;
        }
    }

    fn set_reason_active(&self, reason: &str, active: bool) {
        let Some(reason) = reason_key(reason) else {
            logger::warn_p("coordinator", &format!("unknown reason '{}'", reason));
            return;
        };
        let mut st = self.state.lock();
        if active {
            st.forced.insert(reason);
            if !st.active.contains(reason) {
                self.activate(reason, &mut st);
            }
        } else {
            st.forced.remove(reason);
            if st.active.contains(reason) {
                self.deactivate(reason, &mut st);
            }
        }
    }
}

impl Coordinator {
    pub fn new(
        pool: StatePool,
        hud: Arc<dyn HudSink>,
        guard: Option<Arc<dyn GuardWatch>>,
        cfg: CoordinatorConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner { pool, hud, guard, cfg, state: Mutex::new(State::default()) }),
            worker: Worker::new("coordinator"),
        }
    }

    pub fn tick(&self) {
        self.inner.tick_at(mono_now());
    }

    /// Force a reason on, or clear a forced one.
    pub fn set_reason_active(&self, reason: &str, active: bool) {
        self.inner.set_reason_active(reason, active);
    }

    /// Active reasons in priority order.
    pub fn reasons_snapshot(&self) -> Vec<String> {
        let st = self.inner.state.lock();
        REASONS.iter().filter(|r| st.active.contains(**r)).map(|r| r.to_string()).collect()
    }

    pub fn start(&self) {
        let inner = Arc::clone(&self.inner);
        self.worker.start(self.inner.cfg.period, move |_| inner.tick_at(mono_now()));
    }

    pub fn stop(&self) {
        self.worker.stop();
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_running()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hud::MemoryHud;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

    #[derive(Default)]
    struct FakeGuard {
        watching: AtomicBool,
        suspended: AtomicBool,
        passes: AtomicU64,
    }

    impl GuardWatch for FakeGuard {
        fn ensure_watch(&self) {
            self.watching.store(true, Ordering::SeqCst);
        }
        fn stop_watch(&self) {
            self.watching.store(false, Ordering::SeqCst);
        }
        fn set_suspended(&self, suspended: bool) {
            self.suspended.store(suspended, Ordering::SeqCst);
        }
        fn passes(&self) -> u64 {
            self.passes.load(Ordering::SeqCst)
        }
    }

    fn coordinator() -> (Coordinator, StatePool, Arc<MemoryHud>, Arc<FakeGuard>) {
        let pool = StatePool::with_defaults();
        let hud = Arc::new(MemoryHud::new());
        let guard = Arc::new(FakeGuard::default());
        let c = Coordinator::new(pool.clone(), hud.clone(), Some(guard.clone()), CoordinatorConfig::default());
        (c, pool, hud, guard)
    }

    fn paused(pool: &StatePool, path: &str) -> (bool, String) {
        (pool.get_bool(&format!("{}.paused", path), false), pool.get_str(&format!("{}.pause_reason", path), ""))
    }

    #[test]
    fn test_unfocus_waits_for_grace() {
        let (c, pool, hud, _) = coordinator();
        pool.write("focus", json!({ "is_focused": false })).unwrap();
        c.inner.tick_at(10.0);
        assert!(c.reasons_snapshot().is_empty());
        c.inner.tick_at(10.5);
        assert_eq!(c.reasons_snapshot(), vec!["cor_1"]);
        assert_eq!(paused(&pool, "pipeline"), (true, "cor_1".into()));
        assert_eq!(paused(&pool, "services.macros_repeat"), (true, "cor_1".into()));
        assert!(!pool.get_bool("services.window_focus.paused", true));
        assert!(!pool.get_bool("features.ui_guard.paused", true));
        assert!(pool.get_bool("runtime.pauses.reasons.cor_1", false));
        assert!(hud.contains("services stopped"));

        pool.write("focus", json!({ "is_focused": true })).unwrap();
        c.inner.tick_at(11.0);
        assert!(c.reasons_snapshot().is_empty());
        assert_eq!(paused(&pool, "pipeline"), (false, String::new()));
        assert!(hud.contains("focus restored"));
        assert!(!pool.get_bool("runtime.pauses.reasons.cor_1", true));
    }

    #[test]
    fn test_release_only_touches_own_paths() {
        let (c, pool, _, _) = coordinator();
        pool.write("features.buff", json!({ "paused": true, "pause_reason": "manual" })).unwrap();
        c.set_reason_active("cor_1", true);
        pool.write("features.macros", json!({ "pause_reason": "other" })).unwrap();
        c.set_reason_active("cor_1", false);
        assert_eq!(paused(&pool, "features.buff"), (true, "manual".into()));
        assert_eq!(paused(&pool, "features.macros"), (true, "other".into()));
        assert_eq!(paused(&pool, "features.respawn"), (false, String::new()));
    }

    #[test]
    fn test_paths_pass_to_remaining_reason() {
        let (c, pool, _, _) = coordinator();
        c.set_reason_active("cor_1", true);
        c.set_reason_active("ui_guard", true);
        c.set_reason_active("cor_1", false);
        assert_eq!(c.reasons_snapshot(), vec!["ui_guard"]);
        assert_eq!(paused(&pool, "features.teleport"), (true, "ui_guard".into()));
        c.set_reason_active("ui_guard", false);
        assert_eq!(paused(&pool, "features.teleport"), (false, String::new()));
    }

    #[test]
    fn test_hidden_hp_during_farm_runs_the_guard() {
        let (c, pool, hud, guard) = coordinator();
        pool.write("player", json!({ "alive": true, "hp_ratio": null })).unwrap();
        pool.write("features.autofarm", json!({ "busy": true })).unwrap();
        c.tick();
        assert_eq!(c.reasons_snapshot(), vec!["cor_2"]);
        assert!(guard.watching.load(Ordering::SeqCst));
        assert_eq!(paused(&pool, "features.autofarm"), (true, "cor_2".into()));

        pool.write("features.ui_guard", json!({ "pause_reason": "pages_blocker" })).unwrap();
        guard.passes.fetch_add(1, Ordering::SeqCst);
        c.tick();
        c.tick();
        assert_eq!(paused(&pool, "features.autofarm"), (true, "cor_2".into()));
        assert_eq!(hud.count(Severity::Err), 1);

        pool.write("features.ui_guard", json!({ "pause_reason": "" })).unwrap();
        guard.passes.fetch_add(1, Ordering::SeqCst);
        c.tick();
        assert_eq!(paused(&pool, "features.autofarm"), (false, String::new()));
        assert!(hud.contains("interface clear"));

        pool.write("player", json!({ "hp_ratio": 0.8 })).unwrap();
        c.tick();
        assert!(c.reasons_snapshot().is_empty());
        assert!(!guard.watching.load(Ordering::SeqCst));
    }

    #[test]
    fn test_guard_busy_while_unfocused_suspends_watcher() {
        let (c, pool, _, guard) = coordinator();
        pool.write("features.ui_guard", json!({ "busy": true })).unwrap();
        pool.write("focus", json!({ "is_focused": false })).unwrap();
        c.inner.tick_at(1.0);
        assert_eq!(c.reasons_snapshot(), vec!["cor_3", "ui_guard"]);
        assert!(guard.suspended.load(Ordering::SeqCst));
        pool.write("focus", json!({ "is_focused": true })).unwrap();
        c.inner.tick_at(1.2);
        assert!(!guard.suspended.load(Ordering::SeqCst));
        assert_eq!(c.reasons_snapshot(), vec!["ui_guard"]);
    }
}
