//! Scripted UI operations: an ordered list of [`Step`]s interpreted
//! against the live window through vision and the input controller.

pub mod extras;
pub mod keymap;
pub mod step;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;

pub use extras::{Extras, PartsResolver};
pub use step::{parse_flow, Layout, LayoutTarget, Op, RetryAction, Step, Tpl};

use crate::logger;
use crate::pool::StatePool;
use crate::sleep::sleep_ms;
use crate::transport::Controller;
use crate::types::{Point, WindowInfo};
use crate::vision::{TemplateScope, Vision, Zone};

const POLL_MS: u64 = 50;
const CLICK_SETTLE_MS: u64 = 80;

/// Called between steps; returns false when the flow must stop.
pub type PauseGate = Arc<dyn Fn() -> bool + Send + Sync>;

/// Everything a flow can touch.
pub struct FlowCtx {
    pub pool: StatePool,
    pub vision: Vision,
    pub controller: Controller,
    /// Template engine directory (`dashboard`, `respawn`, ...).
    pub engine: String,
    pub zones: HashMap<String, Zone>,
    pub templates: HashMap<String, Vec<String>>,
    pub extras: Extras,
    pub gate: Option<PauseGate>,
}

impl FlowCtx {
    pub fn new(pool: StatePool, vision: Vision, controller: Controller, engine: &str) -> Self {
        let mut zones = HashMap::new();
        zones.insert("fullscreen".to_string(), Zone::fullscreen());
        Self {
            pool,
            vision,
            controller,
            engine: engine.to_string(),
            zones,
            templates: HashMap::new(),
            extras: Extras::default(),
            gate: None,
        }
    }

    pub fn zone(mut self, key: &str, zone: Zone) -> Self {
        self.zones.insert(key.to_string(), zone);
        self
    }

    pub fn template(mut self, key: &str, parts: Vec<String>) -> Self {
        self.templates.insert(key.to_string(), parts);
        self
    }

    pub fn with_extras(mut self, extras: Extras) -> Self {
        self.extras = extras;
        self
    }

    pub fn with_gate(mut self, gate: PauseGate) -> Self {
        self.gate = Some(gate);
        self
    }

    fn window(&self) -> Option<WindowInfo> {
        WindowInfo::from_value(&self.pool.get("window.info", Value::Null))
    }

    fn scope(&self) -> TemplateScope {
        TemplateScope::new(&self.engine, &self.pool.server(), &self.pool.language())
    }

    fn parts(&self, tpl: &Tpl) -> Option<Vec<String>> {
        match tpl {
            Tpl::Key(k) => self.templates.get(&self.extras.expand(k)).cloned(),
            Tpl::Parts(p) => (!p.is_empty()).then(|| p.clone()),
        }
    }

    fn find_parts(&self, zone_key: &str, parts: &[String], thr: f64) -> Option<Point> {
        let zone = self.zones.get(zone_key)?;
        let win = self.window()?;
        self.vision.find(&win, zone, &self.scope(), parts, thr)
    }

    fn visible(&self, zone_key: &str, tpl: &Tpl, thr: f64) -> bool {
        self.parts(tpl).map_or(false, |p| self.find_parts(zone_key, &p, thr).is_some())
    }

    /// Poll until the template is found or `timeout_ms` passes (at least one probe).
    fn wait_parts(&self, zone_key: &str, parts: &[String], timeout_ms: u64, thr: f64) -> Option<Point> {
        if !self.zones.contains_key(zone_key) {
            return None;
        }
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        loop {
            if let Some(p) = self.find_parts(zone_key, parts, thr) {
                return Some(p);
            }
            if Instant::now() >= deadline {
                return None;
            }
            sleep_ms(POLL_MS);
        }
    }

    fn wait(&self, zone_key: &str, tpl: &Tpl, timeout_ms: u64, thr: f64) -> bool {
        self.parts(tpl).map_or(false, |p| self.wait_parts(zone_key, &p, timeout_ms, thr).is_some())
    }

    fn click_parts(&self, zone_key: &str, parts: &[String], timeout_ms: u64, thr: f64) -> bool {
        match self.wait_parts(zone_key, parts, timeout_ms, thr) {
            Some(p) => {
                self.controller.click_at(p);
                sleep_ms(CLICK_SETTLE_MS);
                true
            }
            None => false,
        }
    }

    fn click_in(&self, zone_key: &str, tpl: &Tpl, timeout_ms: u64, thr: f64) -> bool {
        self.parts(tpl).map_or(false, |p| self.click_parts(zone_key, &p, timeout_ms, thr))
    }

    /// Zone center in screen coordinates.
    fn zone_center(&self, zone_key: &str) -> Option<Point> {
        let zone = self.zones.get(zone_key)?;
        let win = self.window()?;
        let r = zone.compute(&win);
        Some(win.to_screen((r.cx, r.cy)))
    }

    fn template_exists(&self, parts: &[String]) -> bool {
        let lang = self.pool.language();
        match &self.extras.resolver {
            Some(resolve) => resolve(&lang, parts),
            None => self.vision.template_exists(&self.scope(), parts),
        }
    }
}

/// Generic driver: runs `exec` over `steps` with the per-step retry policy.
///
/// A step's attempt counter resets only when that step succeeds, so `prev`
/// and `restart` cannot loop forever.
pub fn drive(steps: &[Step], gate: Option<&PauseGate>, mut exec: impl FnMut(&Step, usize, usize) -> bool) -> bool {
    let total = steps.len();
    let mut attempts = vec![0u32; total];
    let mut idx = 0;
    while idx < total {
        if let Some(gate) = gate {
            if !gate() {
                return false;
            }
        }
        let step = &steps[idx];
        if exec(step, idx + 1, total) {
            attempts[idx] = 0;
            idx += 1;
            continue;
        }
        attempts[idx] += 1;
        if attempts[idx] > step.retry_count {
            return false;
        }
        if step.retry_delay_ms > 0 {
            sleep_ms(step.retry_delay_ms);
        }
        match step.retry_action {
            RetryAction::Prev if idx > 0 => idx -= 1,
            RetryAction::Restart => idx = 0,
            _ => {}
        }
    }
    true
}

/// Interprets steps against a [`FlowCtx`]. Tracks the keyboard layout
/// chosen through `set_layout` across steps.
pub struct FlowRunner<'a> {
    ctx: &'a FlowCtx,
    kb_layout: Option<LayoutTarget>,
    verbose: bool,
}

impl<'a> FlowRunner<'a> {
    pub fn new(ctx: &'a FlowCtx) -> Self {
        Self { ctx, kb_layout: None, verbose: ctx.pool.debug("flow") }
    }

    pub fn run(&mut self, steps: &[Step]) -> bool {
        let gate = self.ctx.gate.clone();
        drive(steps, gate.as_ref(), |step, idx, total| self.exec(step, idx, total))
    }

    fn typed(&self, text: &str, layout: Layout) -> String {
        let text = self.ctx.extras.expand(text);
        match layout {
            Layout::Ru => keymap::ru_to_us(&text),
            Layout::Auto if keymap::has_non_ascii(&text) => keymap::ru_to_us(&text),
            _ => text,
        }
    }

    fn toggle_layout(&self, delay_ms: u64) {
        self.ctx.controller.send("layout_toggle_altshift");
        if delay_ms > 0 {
            sleep_ms(delay_ms);
        }
    }

    /// Poll every 80 ms while `tpl` is visible, sending `cmd` each `interval_s`.
    fn while_visible(&self, zone: &str, tpl: &Tpl, cmd: &str, timeout_ms: u64, interval_s: f64, thr: f64) -> bool {
        let start = Instant::now();
        let interval = Duration::from_secs_f64(interval_s.max(0.0));
        let mut next_probe = start;
        while start.elapsed() < Duration::from_millis(timeout_ms) {
            if !self.ctx.visible(zone, tpl, thr) {
                return true;
            }
            let now = Instant::now();
            if now >= next_probe {
                self.ctx.controller.send(cmd);
                next_probe = now + interval;
            }
            sleep_ms(80);
        }
        false
    }

    fn click_by_resolver(&self, zone: &str, location: bool, timeout_ms: u64, thr: f64) -> bool {
        let cat = self.ctx.extras.category_id.clone();
        let loc = self.ctx.extras.location_id.clone();
        if !location && cat.eq_ignore_ascii_case("hotspots") {
            return true;
        }
        if cat.is_empty() || (location && loc.is_empty()) {
            return false;
        }
        let file = if location { format!("{}.png", loc) } else { format!("{}.png", cat) };
        let parts = crate::vision::parts(&["<lang>", "teleport", "villages", &cat, &file]);
        if !self.ctx.template_exists(&parts) {
            logger::warn_p("teleport", &format!("template missing: {}/{}", cat, file));
            return false;
        }
        self.ctx.click_parts(zone, &parts, timeout_ms, thr)
    }

    fn exec(&mut self, step: &Step, idx: usize, total: usize) -> bool {
        let thr = step.thr;
        if self.verbose {
            logger::info_p("flow", &format!("[step {}/{}] {}", idx, total, step.op.name()));
        }
        let ctx = self.ctx;
        let ok = match &step.op {
            Op::Sleep { ms } => {
                sleep_ms(*ms);
                true
            }
            Op::Wait { zone, tpl, timeout_ms } => ctx.wait(zone, tpl, *timeout_ms, thr),
            Op::WaitOptional { zone, tpl, timeout_ms } => {
                let tries = step.retry_count + 1;
                let found = (0..tries).any(|i| {
                    let hit = ctx.wait(zone, tpl, *timeout_ms, thr);
                    if !hit && i + 1 < tries && step.retry_delay_ms > 0 {
                        sleep_ms(step.retry_delay_ms);
                    }
                    hit
                });
                if !found && self.verbose {
                    logger::info_p("flow", &format!("wait_optional: not found after {} tries", tries));
                }
                true
            }
            Op::ClickIn { zone, tpl, timeout_ms } => ctx.click_in(zone, tpl, *timeout_ms, thr),
            Op::ClickAny { zones, tpl, timeout_ms } => {
                let deadline = Instant::now() + Duration::from_millis(*timeout_ms);
                loop {
                    if zones.iter().any(|z| ctx.click_in(z, tpl, 0, thr)) {
                        break true;
                    }
                    if Instant::now() >= deadline {
                        break false;
                    }
                    sleep_ms(POLL_MS);
                }
            }
            Op::ClickOptional { zone, tpl, timeout_ms } => {
                let tries = step.retry_count + 1;
                for i in 0..tries {
                    if ctx.click_in(zone, tpl, *timeout_ms, thr) {
                        break;
                    }
                    if i + 1 < tries && step.retry_delay_ms > 0 {
                        sleep_ms(step.retry_delay_ms);
                    }
                }
                true
            }
            Op::ClickZoneCenter { zone, delay_ms } => match ctx.zone_center(zone) {
                Some(p) => {
                    ctx.controller.click_at(p);
                    sleep_ms(*delay_ms);
                    true
                }
                None => false,
            },
            Op::MoveZoneCenter { zone, delay_ms } => match ctx.zone_center(zone) {
                Some(p) => {
                    ctx.controller.move_to(p);
                    sleep_ms(*delay_ms);
                    true
                }
                None => false,
            },
            Op::SendArduino { cmd, count, delay_ms } => {
                let count = (*count).max(1);
                for i in 0..count {
                    ctx.controller.send(cmd);
                    if *delay_ms > 0 && i + 1 < count {
                        sleep_ms(*delay_ms);
                    }
                }
                true
            }
            Op::EnterText { text, layout } => ctx.controller.enter_text(&self.typed(text, *layout)),
            Op::PressEnter => ctx.controller.send("press_enter"),
            Op::PressEsc => ctx.controller.send("esc"),
            Op::SendMessage { text, layout } => ctx.controller.chat(&self.typed(text, *layout)),
            Op::SetLayout { layout, count, delay_ms } => {
                match layout {
                    LayoutTarget::Toggle | LayoutTarget::Switch => {
                        let count = (*count).max(1);
                        for _ in 0..count {
                            self.toggle_layout(*delay_ms);
                        }
                        if count % 2 == 1 {
                            self.kb_layout = match self.kb_layout {
                                Some(LayoutTarget::Ru) => Some(LayoutTarget::En),
                                Some(LayoutTarget::En) => Some(LayoutTarget::Ru),
                                other => other,
                            };
                        }
                    }
                    target => {
                        if self.kb_layout != Some(*target) {
                            self.toggle_layout(*delay_ms);
                            self.kb_layout = Some(*target);
                        }
                    }
                }
                true
            }
            Op::DashboardIsLocked { zone, tpl, timeout_ms, probe_interval_s } => {
                let ok = self.while_visible(zone, tpl, "l", *timeout_ms, *probe_interval_s, thr);
                if !ok {
                    logger::warn_p("flow", "dashboard still locked");
                }
                ok
            }
            Op::WhileVisibleSend { zone, tpl, cmd, timeout_ms, probe_interval_s } => {
                self.while_visible(zone, tpl, cmd, *timeout_ms, *probe_interval_s, thr)
            }
            Op::EnterPincode { zone, visible_tpl, digit_delay_ms, timeout_ms } => {
                let pin = ctx.extras.pin.clone();
                if pin.is_empty() || !ctx.visible(zone, visible_tpl, thr) {
                    true
                } else {
                    pin.chars().all(|d| {
                        let ok = ctx.click_in(zone, &Tpl::Key(format!("num{}", d)), *timeout_ms, thr);
                        if ok && *digit_delay_ms > 0 {
                            sleep_ms(*digit_delay_ms);
                        }
                        ok
                    })
                }
            }
            Op::ClickVillage { zone, timeout_ms } => self.click_by_resolver(zone, false, *timeout_ms, thr),
            Op::ClickLocation { zone, timeout_ms } => self.click_by_resolver(zone, true, *timeout_ms, thr),
        };

        if step.wait_ms > 0 && !matches!(step.op, Op::Sleep { .. }) {
            sleep_ms(step.wait_ms);
        }
        if self.verbose {
            logger::info_p("flow", &format!("[step {}] {}", idx, if ok { "OK" } else { "FAIL" }));
        }
        ok
    }
}

/// Run a flow; true when every step succeeded.
pub fn run_flow(ctx: &FlowCtx, steps: &[Step]) -> bool {
    FlowRunner::new(ctx).run(steps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::stub::StubPlatform;
    use crate::transport::{RecordingLink, SentLog};
    use crate::types::{Capture, WindowInfo};
    use crate::vision::capture::capture_from_gray;
    use crate::vision::{testutil, TemplateStore};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn sleep_step(retries: u32, action: RetryAction) -> Step {
        Step::new(Op::Sleep { ms: 0 }).retry(retries, action, 0)
    }

    #[test]
    fn test_drive_repeat_until_exhausted() {
        let steps = vec![sleep_step(2, RetryAction::Repeat)];
        let mut calls = 0;
        assert!(!drive(&steps, None, |_, _, _| {
            calls += 1;
            false
        }));
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_drive_prev_reruns_previous_step() {
        let steps = vec![sleep_step(0, RetryAction::Repeat), sleep_step(1, RetryAction::Prev)];
        let mut trace = Vec::new();
        let ok = drive(&steps, None, |_, idx, _| {
            trace.push(idx);
            // second step succeeds on its second attempt
            !(idx == 2 && trace.iter().filter(|i| **i == 2).count() == 1)
        });
        assert!(ok);
        assert_eq!(trace, vec![1, 2, 1, 2]);
    }

    #[test]
    fn test_drive_restart_terminates() {
        let steps = vec![sleep_step(0, RetryAction::Repeat), sleep_step(3, RetryAction::Restart)];
        let mut calls = 0;
        assert!(!drive(&steps, None, |_, idx, _| {
            calls += 1;
            idx == 1
        }));
        assert_eq!(calls, 8);
    }

    #[test]
    fn test_gate_stops_flow() {
        let steps = vec![sleep_step(0, RetryAction::Repeat); 3];
        let n = Arc::new(AtomicUsize::new(0));
        let n2 = Arc::clone(&n);
        let gate: PauseGate = Arc::new(move || n2.fetch_add(1, Ordering::SeqCst) < 1);
        let mut calls = 0;
        assert!(!drive(&steps, Some(&gate), |_, _, _| {
            calls += 1;
            true
        }));
        assert_eq!(calls, 1);
    }

    fn setup(frame: Capture) -> (tempfile::TempDir, FlowCtx, SentLog, Arc<StubPlatform>) {
        let dir = tempfile::tempdir().unwrap();
        let win = WindowInfo { x: 10, y: 20, width: 200, height: 100, hwnd: 3 };
        let stub = Arc::new(StubPlatform::with_window(win));
        stub.set_frame(Some(frame));
        let pool = StatePool::with_defaults();
        pool.write("window", json!({ "info": win.to_value() })).unwrap();
        let (link, log) = RecordingLink::new();
        let controller = Controller::new(Box::new(link), stub.clone());
        let vision = Vision::new(stub.clone(), Arc::new(TemplateStore::new(dir.path())));
        let ctx = FlowCtx::new(pool, vision, controller, "dashboard");
        (dir, ctx, log, stub)
    }

    #[test]
    fn test_click_in_clicks_match_center() {
        let tpl = testutil::texture(10, 8, 5);
        let mut frame = capture_from_gray(&image::GrayImage::from_pixel(200, 100, image::Luma([20])));
        frame.blit(&capture_from_gray(&tpl), 50, 30);
        let (dir, ctx, log, stub) = setup(frame);
        testutil::write_template(dir.path(), "dashboard/boh/rus/main/btn.png", &tpl);
        let ctx = ctx.template("btn", crate::vision::parts(&["<lang>", "main", "btn.png"]));

        let steps = vec![
            Step::new(Op::ClickIn { zone: "fullscreen".into(), tpl: "btn".into(), timeout_ms: 100 }),
            Step::new(Op::PressEsc),
        ];
        assert!(run_flow(&ctx, &steps));
        assert_eq!(stub.cursor_log(), vec![(10 + 55, 20 + 34)]);
        assert_eq!(log.lines(), vec!["l", "esc"]);
    }

    #[test]
    fn test_missing_template_fails_wait_but_not_optional() {
        let (_dir, ctx, _log, _stub) = setup(Capture::filled(200, 100, (0, 0, 0)));
        let wait = Step::new(Op::Wait { zone: "fullscreen".into(), tpl: "nope".into(), timeout_ms: 10 });
        let opt = Step::new(Op::WaitOptional { zone: "fullscreen".into(), tpl: "nope".into(), timeout_ms: 10 });
        assert!(!run_flow(&ctx, &[wait]));
        assert!(run_flow(&ctx, &[opt]));
    }

    #[test]
    fn test_text_ops_and_layout() {
        let (_dir, ctx, log, _stub) = setup(Capture::filled(200, 100, (0, 0, 0)));
        let ctx = ctx.with_extras(Extras { login: "hero".into(), ..Default::default() });
        let steps = vec![
            Step::new(Op::EnterText { text: "{account.login}".into(), layout: Layout::Auto }),
            Step::new(Op::SetLayout { layout: LayoutTarget::Ru, count: 1, delay_ms: 0 }),
            Step::new(Op::SetLayout { layout: LayoutTarget::Ru, count: 1, delay_ms: 0 }),
            Step::new(Op::SendMessage { text: "/target Гном".into(), layout: Layout::Auto }),
            Step::new(Op::SendArduino { cmd: "pagedown".into(), count: 3, delay_ms: 0 }),
        ];
        assert!(run_flow(&ctx, &steps));
        assert_eq!(
            log.lines(),
            vec![
                "enter_text hero",
                "layout_toggle_altshift",
                "enter /target Uyjv",
                "pagedown",
                "pagedown",
                "pagedown",
            ]
        );
    }

    #[test]
    fn test_zone_center_uses_screen_coordinates() {
        let (_dir, ctx, _log, stub) = setup(Capture::filled(200, 100, (0, 0, 0)));
        let ctx = ctx.zone("state", Zone::ltrb(0, 0, 170, 63));
        assert!(run_flow(&ctx, &[Step::new(Op::ClickZoneCenter { zone: "state".into(), delay_ms: 0 })]));
        assert_eq!(stub.cursor_log(), vec![(10 + 85, 20 + 31)]);
    }

    #[test]
    fn test_hotspots_skip_village() {
        let (_dir, ctx, log, _stub) = setup(Capture::filled(200, 100, (0, 0, 0)));
        let ctx = ctx.with_extras(Extras { category_id: "hotspots".into(), ..Default::default() });
        assert!(run_flow(&ctx, &[Step::new(Op::ClickVillage { zone: "fullscreen".into(), timeout_ms: 10 })]));
        assert!(log.lines().is_empty());
    }
}
