//! Record and replay of mouse input.
//!
//! While recording, a global mouse hook feeds left clicks, right-button drags
//! (sampled every 30 ms) and wheel turns into a session. Event times are
//! seconds since the session started. Playback keeps a strict timeline: each
//! event waits for its own `t`, late events are not compensated.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{slugify, EngineCtx, StepOutcome};
use crate::error::{Error, Result};
use crate::hud::Severity;
use crate::logger;
use crate::platform::hotkey::{start_hotkey_listener, HotkeyGuard};
use crate::platform::input_hook::{InputEvent, InputHook};
use crate::services::Worker;
use crate::sleep::sleep_ms;
use crate::snapshot::Snapshot;
use crate::types::Point;

pub const FORMAT_VERSION: u32 = 2;
pub const SAMPLE_DT: f64 = 0.03;
const CLICK_AFTER_MOVE_MS: u64 = 150;
const RESERVED: &str = "prefs";
const PLAY_COUNTDOWN_S: u64 = 3;

/// One recorded event. `t` is optional on read so that files written without
/// timestamps load, and are then refused by playback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RecordStep {
    Lclick {
        x: i32,
        y: i32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        t: Option<f64>,
    },
    Rdrag {
        path: Vec<Point>,
        dt: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        t: Option<f64>,
    },
    WheelUp {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        t: Option<f64>,
    },
    WheelDown {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        t: Option<f64>,
    },
}

impl RecordStep {
    pub fn t(&self) -> Option<f64> {
        match self {
            Self::Lclick { t, .. } | Self::Rdrag { t, .. } | Self::WheelUp { t } | Self::WheelDown { t } => *t,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordFile {
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub created_ts: f64,
    #[serde(default)]
    pub steps: Vec<RecordStep>,
    #[serde(default = "default_version")]
    pub version: u32,
}

fn default_version() -> u32 {
    FORMAT_VERSION
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMeta {
    pub name: String,
    pub slug: String,
}

fn round4(v: f64) -> f64 {
    (v * 10_000.0).round() / 10_000.0
}

/// Record files in one directory, one `<slug>.json` each.
#[derive(Debug, Clone)]
pub struct RecordStore {
    dir: PathBuf,
}

impl RecordStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `<home>/.revive/records`, or a relative `.revive/records` without a home.
    pub fn default_dir() -> PathBuf {
        dirs::home_dir().unwrap_or_default().join(".revive").join("records")
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, slug: &str) -> PathBuf {
        self.dir.join(format!("{}.json", slug))
    }

    pub fn exists(&self, slug: &str) -> bool {
        self.path(slug).is_file()
    }

    /// Free slug for `name`: `base`, `base_2`, `base_3`...
    pub fn unique_slug(&self, name: &str) -> String {
        let base = match slugify(name) {
            s if s.is_empty() => "record".to_string(),
            s => s,
        };
        let mut slug = base.clone();
        let mut n = 2;
        while self.exists(&slug) {
            slug = format!("{}_{}", base, n);
            n += 1;
        }
        slug
    }

    /// Every readable record, sorted by slug. The preferences file is skipped.
    pub fn list(&self) -> Vec<RecordMeta> {
        let Ok(entries) = std::fs::read_dir(&self.dir) else {
            return Vec::new();
        };
        let mut out: Vec<RecordMeta> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().map_or(false, |x| x == "json"))
            .filter_map(|p| {
                let stem = p.file_stem()?.to_str()?.to_string();
                if stem == RESERVED {
                    return None;
                }
                let text = std::fs::read_to_string(&p).ok()?;
                let meta: serde_json::Value = serde_json::from_str(&text).ok()?;
                let field = |k: &str| meta.get(k).and_then(|v| v.as_str()).filter(|s| !s.is_empty()).map(str::to_string);
                Some(RecordMeta { name: field("name").unwrap_or_else(|| stem.clone()), slug: field("slug").unwrap_or(stem) })
            })
            .collect();
        out.sort_by(|a, b| a.slug.cmp(&b.slug));
        out
    }

    /// Write an empty record under a fresh slug.
    pub fn create(&self, name: &str) -> Result<RecordMeta> {
        let name = name.trim();
        let slug = self.unique_slug(name);
        if slug == RESERVED {
            return Err(Error::Record(format!("'{}' is a reserved name", name)));
        }
        let file = RecordFile {
            name: if name.is_empty() { slug.clone() } else { name.to_string() },
            slug: slug.clone(),
            created_ts: chrono::Utc::now().timestamp() as f64,
            steps: Vec::new(),
            version: FORMAT_VERSION,
        };
        self.save(&file)?;
        Ok(RecordMeta { name: file.name, slug })
    }

    pub fn load(&self, slug: &str) -> Result<RecordFile> {
        let path = self.path(slug);
        if !path.is_file() {
            return Err(Error::Record(format!("record '{}' not found", slug)));
        }
        let text = std::fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn save(&self, file: &RecordFile) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let text = serde_json::to_string_pretty(file)?;
        std::fs::write(self.path(&file.slug), text)?;
        Ok(())
    }
}

struct Drag {
    t: f64,
    path: Vec<Point>,
    last_sample: Instant,
}

struct Session {
    name: String,
    slug: String,
    t0: Instant,
    steps: Vec<RecordStep>,
    drag: Option<Drag>,
}

impl Session {
    fn elapsed(&self, at: Instant) -> f64 {
        round4(at.saturating_duration_since(self.t0).as_secs_f64())
    }

    fn finish_drag(&mut self) {
        if let Some(drag) = self.drag.take() {
            if !drag.path.is_empty() {
                self.steps.push(RecordStep::Rdrag { path: drag.path, dt: SAMPLE_DT, t: Some(drag.t) });
            }
        }
    }
}

struct Listeners {
    hook: Option<InputHook>,
    hotkey: HotkeyGuard,
    worker: Worker,
}

/// Recording session, playback and the global listeners.
pub struct Recorder {
    ctx: EngineCtx,
    store: RecordStore,
    session: Mutex<Option<Session>>,
    playing: AtomicBool,
    listeners: Mutex<Option<Listeners>>,
}

impl Recorder {
    pub fn new(ctx: EngineCtx, store: RecordStore) -> Self {
        let rec = Self {
            ctx,
            store,
            session: Mutex::new(None),
            playing: AtomicBool::new(false),
            listeners: Mutex::new(None),
        };
        rec.sync_records();
        rec
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    /// Mirror the directory into `features.record.records`; pick the first
    /// record when none is current.
    pub fn sync_records(&self) {
        let recs = self.store.list();
        let pool = &self.ctx.pool;
        pool.write("features.record", json!({ "records": recs })).ok();
        if pool.get_str("features.record.current_record", "").is_empty() {
            if let Some(first) = recs.first() {
                pool.write("features.record", json!({ "current_record": first.slug })).ok();
            }
        }
        logger::info_p("record", &format!("{} record(s) on disk", recs.len()));
    }

    pub fn create_record(&self, name: &str) -> Result<String> {
        let meta = self.store.create(name)?;
        self.sync_records();
        self.set_current(&meta.slug);
        self.ctx.status("record", Severity::Ok, &format!("record created: {}", meta.name));
        Ok(meta.slug)
    }

    pub fn set_current(&self, slug: &str) {
        self.ctx.pool.write("features.record", json!({ "current_record": slug })).ok();
    }

    pub fn is_recording(&self) -> bool {
        self.session.lock().is_some()
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Acquire)
    }

    fn set_state(&self, status: &str, busy: bool) {
        self.ctx.pool.write("features.record", json!({ "status": status, "busy": busy })).ok();
    }

    fn countdown(&self, secs: u64, what: &str) {
        for i in (1..=secs).rev() {
            self.ctx.status("record", Severity::Att, &format!("{} in {}", what, i));
            sleep_ms(1000);
        }
    }

    /// Start a session on the current record, creating one when none is set.
    /// Refused while recording or playing.
    pub fn start_recording(&self, countdown_s: u64) -> bool {
        if self.is_recording() || self.is_playing() {
            return false;
        }
        let mut slug = self.ctx.pool.get_str("features.record.current_record", "");
        if slug.is_empty() {
            match self.create_record("new record") {
                Ok(s) => slug = s,
                Err(e) => {
                    self.ctx.status("record", Severity::Err, &e.to_string());
                    return false;
                }
            }
        }
        let name = self
            .store
            .list()
            .into_iter()
            .find(|r| r.slug == slug)
            .map(|r| r.name)
            .unwrap_or_else(|| slug.clone());

        self.countdown(countdown_s, "recording starts");
        let mut session = self.session.lock();
        if session.is_some() {
            return false;
        }
        *session = Some(Session { name, slug: slug.clone(), t0: Instant::now(), steps: Vec::new(), drag: None });
        drop(session);
        self.set_state("recording", true);
        self.ctx.status("record", Severity::Att, "recording");
        logger::info_p("record", &format!("recording started: {}", slug));
        true
    }

    /// Close any open drag and save the session.
    pub fn stop_recording(&self) -> bool {
        let Some(mut session) = self.session.lock().take() else {
            return false;
        };
        session.finish_drag();
        let file = RecordFile {
            name: session.name,
            slug: session.slug,
            created_ts: chrono::Utc::now().timestamp() as f64,
            steps: session.steps,
            version: FORMAT_VERSION,
        };
        let saved = self.store.save(&file);
        self.set_state("idle", false);
        match saved {
            Ok(()) => {
                self.ctx.status("record", Severity::Succ, &format!("recording saved, {} event(s)", file.steps.len()));
                logger::info_p("record", &format!("saved {} ({} steps)", file.slug, file.steps.len()));
                self.sync_records();
                true
            }
            Err(e) => {
                self.ctx.status("record", Severity::Err, &format!("save failed: {}", e));
                false
            }
        }
    }

    /// Ctrl+R.
    pub fn toggle_recording(&self) {
        if self.is_recording() {
            self.stop_recording();
        } else {
            self.start_recording(0);
        }
    }

    /// Ask the pipeline to play the current record.
    pub fn play_now(&self) {
        self.ctx.pool.write("features.record", json!({ "enabled": true })).ok();
        logger::info_p("record", "playback requested");
    }

    fn client(&self, p: Point) -> Point {
        match self.ctx.window() {
            Some(w) => (p.0 - w.x, p.1 - w.y),
            None => p,
        }
    }

    pub fn on_input(&self, ev: InputEvent) {
        self.handle(ev, Instant::now());
    }

    fn handle(&self, ev: InputEvent, at: Instant) {
        if let InputEvent::WheelDown { ctrl: true } = ev {
            self.play_now();
            return;
        }
        let mut guard = self.session.lock();
        let Some(session) = guard.as_mut() else { return };
        let t = session.elapsed(at);
        match ev {
            InputEvent::LeftClick(p) => {
                let (x, y) = self.client(p);
                session.steps.push(RecordStep::Lclick { x, y, t: Some(t) });
            }
            InputEvent::RightDown(p) => {
                session.finish_drag();
                session.drag = Some(Drag { t, path: vec![self.client(p)], last_sample: at });
            }
            InputEvent::Move(p) => {
                if let Some(drag) = session.drag.as_mut() {
                    if at.saturating_duration_since(drag.last_sample).as_secs_f64() >= SAMPLE_DT {
                        drag.path.push(self.client(p));
                        drag.last_sample = at;
                    }
                }
            }
            InputEvent::RightUp(p) => {
                if let Some(drag) = session.drag.as_mut() {
                    drag.path.push(self.client(p));
                }
                session.finish_drag();
            }
            InputEvent::WheelUp { .. } => session.steps.push(RecordStep::WheelUp { t: Some(t) }),
            InputEvent::WheelDown { .. } => session.steps.push(RecordStep::WheelDown { t: Some(t) }),
        }
    }

    /// Play `slug` (or the current record). `wait_focus` gets 6 s to see the
    /// game focused. Refused while recording or already playing.
    pub fn play(&self, slug: Option<&str>, wait_focus: impl Fn(Duration) -> bool, countdown_s: u64) -> bool {
        if self.is_recording() || self.is_playing() {
            return false;
        }
        let slug = match slug {
            Some(s) => s.to_string(),
            None => self.ctx.pool.get_str("features.record.current_record", ""),
        };
        if slug.is_empty() {
            self.ctx.status("record", Severity::Err, "no record selected");
            return false;
        }
        let file = match self.store.load(&slug) {
            Ok(f) => f,
            Err(e) => {
                self.ctx.status("record", Severity::Err, &e.to_string());
                return false;
            }
        };
        if file.steps.is_empty() {
            self.ctx.status("record", Severity::Err, "record is empty");
            return false;
        }
        if file.steps.iter().any(|s| s.t().is_none()) {
            self.ctx.status("record", Severity::Err, "record has events without timestamps");
            return false;
        }
        if !wait_focus(Duration::from_secs(6)) {
            self.ctx.status("record", Severity::Err, "game window is not focused");
            return false;
        }
        self.countdown(countdown_s, "playback");

        if self.playing.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.set_state("playing", true);
        self.ctx.status("record", Severity::Ok, &format!("playing {}", file.name));
        self.play_steps(file.steps);
        self.playing.store(false, Ordering::Release);
        self.set_state("idle", false);
        self.ctx.status("record", Severity::Succ, "playback done");
        true
    }

    fn play_steps(&self, mut steps: Vec<RecordStep>) {
        steps.sort_by(|a, b| a.t().unwrap_or(0.0).total_cmp(&b.t().unwrap_or(0.0)));
        let win = self.ctx.window();
        let to_screen = |p: Point| win.map_or(p, |w| w.to_screen(p));
        let ctl = &self.ctx.controller;
        let start = Instant::now();
        for step in &steps {
            let due = start + Duration::from_secs_f64(step.t().unwrap_or(0.0).max(0.0));
            let now = Instant::now();
            if due > now {
                std::thread::sleep(due - now);
            }
            match step {
                RecordStep::Lclick { x, y, .. } => {
                    ctl.move_to(to_screen((*x, *y)));
                    sleep_ms(CLICK_AFTER_MOVE_MS);
                    ctl.send("l");
                }
                RecordStep::Rdrag { path, dt, .. } => {
                    let Some((first, rest)) = path.split_first() else { continue };
                    ctl.move_to(to_screen(*first));
                    ctl.send("R-press");
                    for p in rest {
                        std::thread::sleep(Duration::from_secs_f64(dt.max(0.0)));
                        ctl.move_to(to_screen(*p));
                    }
                    ctl.send("R-release");
                }
                RecordStep::WheelUp { .. } => {
                    ctl.send("wheel_up");
                }
                RecordStep::WheelDown { .. } => {
                    ctl.send("wheel_down");
                }
            }
        }
    }

    /// Install the mouse hook and the Ctrl+R hotkey. Both feed one worker
    /// thread that owns the recorder calls.
    pub fn start_listeners(self: &Arc<Self>) {
        let mut slot = self.listeners.lock();
        if slot.is_some() {
            return;
        }
        let (tx, rx) = mpsc::channel();
        let hook = InputHook::start(tx);
        if hook.is_none() {
            logger::warn_p("record", "mouse hook unavailable, recording captures nothing");
        }
        let pressed = Arc::new(AtomicBool::new(false));
        let hotkey = start_hotkey_listener(Arc::clone(&pressed));
        let worker = Worker::new("record-listeners");
        let rec = Arc::clone(self);
        worker.start(Duration::from_millis(10), move |_| {
            while let Ok(ev) = rx.try_recv() {
                rec.on_input(ev);
            }
            if pressed.swap(false, Ordering::AcqRel) {
                rec.toggle_recording();
            }
        });
        *slot = Some(Listeners { hook, hotkey, worker });
    }

    /// Unhook everything. Saves a running session first.
    pub fn shutdown(&self) {
        if self.is_recording() {
            self.stop_recording();
        }
        if let Some(l) = self.listeners.lock().take() {
            if let Some(hook) = &l.hook {
                hook.stop();
            }
            l.hotkey.stop();
            l.worker.stop();
            logger::info_p("record", "listeners stopped");
        }
    }
}

/// Poll `focus.is_focused` until it is not `false`.
pub fn wait_focus(ctx: &EngineCtx, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if ctx.pool.get_opt_bool("focus.is_focused") != Some(false) {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        sleep_ms(50);
    }
}

/// Record step: play the current record once, then clear `enabled`.
pub fn run(ctx: &EngineCtx, snap: &Snapshot, recorder: Option<&Recorder>) -> StepOutcome {
    if !snap.has_window {
        return (false, false);
    }
    if !ctx.pool.get_bool("features.record.enabled", false) {
        return (false, false);
    }
    let Some(recorder) = recorder else {
        ctx.status("record", Severity::Err, "recorder is not running");
        return (false, true);
    };
    if recorder.is_recording() || ctx.pool.get_str("features.record.status", "") == "recording" {
        return (false, false);
    }
    if !wait_focus(ctx, Duration::from_secs(3)) {
        ctx.status("record", Severity::Err, "game window is not focused");
        return (false, false);
    }
    let ok = recorder.play(None, |_| true, PLAY_COUNTDOWN_S);
    ctx.pool.write("features.record", json!({ "enabled": false })).ok();
    (ok, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::testkit::{kit, Kit};

    fn recorder(k: &Kit) -> Recorder {
        Recorder::new(k.ctx.clone(), RecordStore::new(k.dir.path().join("records")))
    }

    fn at(rec: &Recorder, ms: u64) -> Instant {
        let t0 = rec.session.lock().as_ref().map(|s| s.t0).unwrap();
        t0 + Duration::from_millis(ms)
    }

    #[test]
    fn test_unique_slug_and_reserved_name() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::new(dir.path());
        assert_eq!(store.create("Фарм крабов").unwrap().slug, "farm_krabov");
        assert_eq!(store.create("Фарм  крабов!").unwrap().slug, "farm_krabov_2");
        assert_eq!(store.create("").unwrap().slug, "record");
        assert!(store.create("Prefs").is_err());
        std::fs::write(dir.path().join("prefs.json"), "{}").unwrap();
        let slugs: Vec<_> = store.list().into_iter().map(|m| m.slug).collect();
        assert_eq!(slugs, vec!["farm_krabov", "farm_krabov_2", "record"]);
    }

    #[test]
    fn test_capture_converts_to_client_and_saves() {
        let k = kit();
        k.ctx.pool.write("window", json!({ "info": { "x": 100, "y": 50, "width": 800, "height": 600 } })).unwrap();
        let rec = recorder(&k);
        assert!(rec.start_recording(0));
        assert_eq!(k.ctx.pool.get_str("features.record.status", ""), "recording");
        let slug = k.ctx.pool.get_str("features.record.current_record", "");
        assert_eq!(slug, "new_record");

        rec.handle(InputEvent::LeftClick((300, 250)), at(&rec, 500));
        rec.handle(InputEvent::RightDown((110, 60)), at(&rec, 1000));
        rec.handle(InputEvent::Move((111, 61)), at(&rec, 1010));
        rec.handle(InputEvent::Move((120, 70)), at(&rec, 1040));
        rec.handle(InputEvent::RightUp((130, 80)), at(&rec, 1050));
        rec.handle(InputEvent::WheelUp { ctrl: false }, at(&rec, 1200));
        rec.handle(InputEvent::WheelDown { ctrl: true }, at(&rec, 1300));
        assert!(rec.stop_recording());
        assert!(!k.ctx.pool.get_bool("features.record.busy", true));
        // Ctrl+wheel down requests playback instead of being recorded
        assert!(k.ctx.pool.get_bool("features.record.enabled", false));

        let file = rec.store().load(&slug).unwrap();
        assert_eq!(file.version, 2);
        assert_eq!(
            file.steps,
            vec![
                RecordStep::Lclick { x: 200, y: 200, t: Some(0.5) },
                RecordStep::Rdrag { path: vec![(10, 10), (20, 20), (30, 30)], dt: 0.03, t: Some(1.0) },
                RecordStep::WheelUp { t: Some(1.2) },
            ]
        );
    }

    #[test]
    fn test_playback_drives_controller_in_time_order() {
        let k = kit();
        let rec = recorder(&k);
        let file = RecordFile {
            name: "demo".into(),
            slug: "demo".into(),
            created_ts: 0.0,
            steps: vec![
                RecordStep::WheelDown { t: Some(0.05) },
                RecordStep::Lclick { x: 40, y: 30, t: Some(0.0) },
                RecordStep::Rdrag { path: vec![(1, 2), (3, 4)], dt: 0.0, t: Some(0.02) },
            ],
            version: 2,
        };
        rec.store().save(&file).unwrap();
        assert!(rec.play(Some("demo"), |_| true, 0));
        assert_eq!(k.log.lines(), vec!["l", "R-press", "R-release", "wheel_down"]);
        assert_eq!(k.stub.cursor_log(), vec![(40, 30), (1, 2), (3, 4)]);
        assert_eq!(k.ctx.pool.get_str("features.record.status", ""), "idle");
    }

    #[test]
    fn test_playback_refuses_untimed_or_unfocused() {
        let k = kit();
        let rec = recorder(&k);
        let dir = rec.store().dir().to_path_buf();
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("old.json"),
            r#"{"name":"old","slug":"old","steps":[{"type":"lclick","x":1,"y":1}]}"#,
        )
        .unwrap();
        assert!(!rec.play(Some("old"), |_| true, 0));
        assert!(k.hud.contains("without timestamps"));
        assert!(!rec.play(Some("missing"), |_| true, 0));

        let slug = rec.create_record("x").unwrap();
        let mut file = rec.store().load(&slug).unwrap();
        file.steps.push(RecordStep::WheelUp { t: Some(0.0) });
        rec.store().save(&file).unwrap();
        assert!(!rec.play(None, |_| false, 0));
        assert!(k.log.lines().is_empty());
    }

    #[test]
    fn test_step_skips_when_disabled_or_recording() {
        let k = kit();
        let rec = recorder(&k);
        let snap = Snapshot::build(&k.ctx.pool);
        assert_eq!(run(&k.ctx, &snap, Some(&rec)), (false, false));
        k.ctx.pool.write("features.record", json!({ "enabled": true })).unwrap();
        assert!(rec.start_recording(0));
        assert_eq!(run(&k.ctx, &snap, Some(&rec)), (false, false));
        assert!(rec.stop_recording());
        assert_eq!(run(&k.ctx, &snap, None), (false, true));
    }
}
