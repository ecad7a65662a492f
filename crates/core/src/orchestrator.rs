//! Death-triggered pipeline. Every tick reads a [`Snapshot`]; a death with
//! respawn enabled starts the pipeline, which then walks the step order
//! through the server's rule set, at most one dispatched step per tick.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};

use serde_json::json;

use crate::engines::record::Recorder;
use crate::engines::ui_guard::UiGuard;
use crate::engines::{EngineCtx, StepOutcome};
use crate::hud::Severity;
use crate::logger;
use crate::pool::DEFAULT_ORDER;
use crate::rules::{RuleCtx, RuleRegistry, ServerRuleSet};
use crate::services::autofarm::AutofarmService;
use crate::services::macros_repeat::MacrosRepeatService;
use crate::sleep::{mono_now, sleep_ms};
use crate::snapshot::Snapshot;
use crate::types::Command;

const POLL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub tick: Duration,
    /// Hold after a successful step; ticks inside it dispatch nothing.
    pub cooldown: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self { tick: Duration::from_millis(2200), cooldown: Duration::from_millis(500) }
    }
}

/// Long-lived services steps may call into.
#[derive(Clone, Default)]
pub struct Handles {
    pub ui_guard: Option<Arc<UiGuard>>,
    pub macros: Option<Arc<MacrosRepeatService>>,
    pub autofarm: Option<Arc<AutofarmService>>,
    pub record: Option<Arc<Recorder>>,
}

/// Known steps in the configured order, `respawn` moved to the front when
/// listed. Unknown names and repeats are dropped; empty means the default
/// order.
pub fn normalize_order(order: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for step in order {
        let step = step.trim().to_lowercase();
        if DEFAULT_ORDER.contains(&step.as_str()) && !out.contains(&step) {
            out.push(step);
        }
    }
    if out.is_empty() {
        return DEFAULT_ORDER.iter().map(|s| s.to_string()).collect();
    }
    if let Some(pos) = out.iter().position(|s| s == "respawn") {
        let respawn = out.remove(pos);
        out.insert(0, respawn);
    }
    out
}

pub struct Orchestrator {
    ctx: EngineCtx,
    rules: RuleRegistry,
    handles: Handles,
    cfg: OrchestratorConfig,
    /// Set once the "dead, respawn off" error was shown for this death.
    warned_dead: bool,
    warned_server: Option<String>,
    cooldown_until: Option<Instant>,
}

impl Orchestrator {
    pub fn new(ctx: EngineCtx, rules: RuleRegistry, handles: Handles, cfg: OrchestratorConfig) -> Self {
        Self { ctx, rules, handles, cfg, warned_dead: false, warned_server: None, cooldown_until: None }
    }

    fn rule_ctx(&self) -> RuleCtx<'_> {
        RuleCtx {
            eng: &self.ctx,
            ui_guard: self.handles.ui_guard.as_deref(),
            macros: self.handles.macros.as_deref(),
            autofarm: self.handles.autofarm.as_deref(),
            record: self.handles.record.as_deref(),
        }
    }

    fn rules_for(&mut self, server: &str) -> Option<Arc<dyn ServerRuleSet>> {
        let found = self.rules.get(server);
        if found.is_none() && self.warned_server.as_deref() != Some(server) {
            self.ctx.status("pipeline", Severity::Err, &format!("server '{}' is not supported", server));
            self.warned_server = Some(server.to_string());
        }
        found
    }

    fn dispatch(&self, rules: &dyn ServerRuleSet, step: &str, snap: &Snapshot) -> StepOutcome {
        match rules.run_step(&self.rule_ctx(), step, snap) {
            Ok(out) => out,
            Err(e) => {
                logger::error_p("pipeline", &format!("{}: {}", step, e));
                (false, true)
            }
        }
    }

    fn activate(&self) {
        self.ctx.pool.write("pipeline", json!({ "active": true, "idx": 0, "ts": mono_now() })).ok();
        self.ctx.status("pipeline", Severity::Att, "death detected, pipeline started");
        logger::info_p("pipeline", "activated");
    }

    fn finish(&self) {
        self.ctx.pool.write("pipeline", json!({ "active": false, "idx": 0, "ts": mono_now() })).ok();
        self.ctx.status("pipeline", Severity::Succ, "pipeline finished");
        logger::info_p("pipeline", "finished");
    }

    fn advance(&self, idx: usize) {
        self.ctx.pool.write("pipeline", json!({ "idx": idx + 1, "ts": mono_now() })).ok();
    }

    /// Not active: start on death, or run a pending record playback.
    fn idle(&mut self, snap: &Snapshot) -> Vec<(String, StepOutcome)> {
        if !snap.is_dead() {
            self.warned_dead = false;
            if snap.record_enabled && snap.has_window && self.handles.record.is_some() {
                if let Some(rules) = self.rules_for(&snap.server) {
                    let out = self.dispatch(rules.as_ref(), "record", snap);
                    return vec![("record".to_string(), out)];
                }
            }
            return Vec::new();
        }
        if !snap.respawn_enabled {
            if !self.warned_dead {
                self.ctx.status("pipeline", Severity::Err, "dead, but respawn is disabled");
                self.warned_dead = true;
            }
            return Vec::new();
        }
        if snap.has_window {
            self.activate();
        }
        Vec::new()
    }

    /// Skip disabled steps without dispatching them; deactivate past the
    /// end. The current step name, if any is left.
    fn settle(&self, snap: &Snapshot) -> Option<String> {
        let order = normalize_order(&snap.pipeline_order);
        let mut idx = snap.pipeline_idx;
        while let Some(step) = order.get(idx) {
            if snap.feature_enabled(step) {
                if idx != snap.pipeline_idx {
                    self.ctx.pool.write("pipeline", json!({ "idx": idx, "ts": mono_now() })).ok();
                }
                return Some(step.clone());
            }
            idx += 1;
        }
        self.finish();
        None
    }

    /// One orchestrator tick: dispatch the current step, if the pipeline is
    /// active, focused and out of cooldown. Returns what ran.
    pub fn tick(&mut self) -> Vec<(String, StepOutcome)> {
        let pool = self.ctx.pool.clone();
        let snap = Snapshot::build(&pool);
        if !snap.pipeline_active {
            let ran = self.idle(&snap);
            if !pool.get_bool("pipeline.active", false) {
                return ran;
            }
        }
        if self.cooldown_until.is_some_and(|t| Instant::now() < t) {
            return Vec::new();
        }
        let Some(rules) = self.rules_for(&snap.server) else {
            return Vec::new();
        };

        let snap = Snapshot::build(&pool);
        if pool.get_bool("pipeline.paused", false) || snap.is_focused == Some(false) {
            return Vec::new();
        }
        let Some(step) = self.settle(&snap) else {
            return Vec::new();
        };
        let snap = Snapshot::build(&pool);
        let idx = snap.pipeline_idx;

        pool.set_busy(&step, true);
        pool.write("pipeline", json!({ "last_step": step })).ok();
        if pool.debug("pipeline") {
            logger::info_p("pipeline", &format!("step {} ({})", idx, step));
        }
        let out = self.dispatch(rules.as_ref(), &step, &snap);
        pool.set_busy(&step, false);

        let (ok, mut advance) = out;
        if step == "respawn" && snap.respawn_enabled && Snapshot::build(&pool).is_dead() {
            advance = false;
        }
        if advance {
            self.advance(idx);
            if ok && !self.cfg.cooldown.is_zero() {
                self.cooldown_until = Some(Instant::now() + self.cfg.cooldown);
            }
            // trailing disabled steps end the pipeline right away
            self.settle(&Snapshot::build(&pool));
        }
        vec![(step, out)]
    }

    /// Apply one shell command. False on `Quit`.
    pub fn handle(&self, cmd: Command) -> bool {
        let pool = &self.ctx.pool;
        match cmd {
            Command::Quit => {
                logger::info_p("pipeline", "shutting down");
                return false;
            }
            Command::Toggle(name) => {
                let path = format!("features.{}.enabled", name);
                let on = !pool.get_bool(&path, false);
                pool.write(&format!("features.{}", name), json!({ "enabled": on })).ok();
                logger::info(&format!("{}: {}", name, if on { "on" } else { "off" }));
            }
            Command::AutofarmNow => match &self.handles.autofarm {
                Some(af) => af.run_once_now(),
                None => self.ctx.status("autofarm", Severity::Err, "auto-farm service is not running"),
            },
            Command::RecordToggle => match &self.handles.record {
                Some(rec) => rec.toggle_recording(),
                None => self.ctx.status("record", Severity::Err, "recorder is not running"),
            },
            Command::PlayRecord => match &self.handles.record {
                Some(rec) => rec.play_now(),
                None => self.ctx.status("record", Severity::Err, "recorder is not running"),
            },
        }
        true
    }

    /// Drain pending commands. Returns false on Quit.
    fn process_commands(&self, cmd_rx: &mpsc::Receiver<Command>) -> bool {
        while let Ok(cmd) = cmd_rx.try_recv() {
            if !self.handle(cmd) {
                return false;
            }
        }
        true
    }

    /// Main loop. Runs on a background thread until `Quit`, a closed
    /// channel or `stop`.
    pub fn run(mut self, cmd_rx: mpsc::Receiver<Command>, stop: Arc<AtomicBool>) {
        let mut next_tick = Instant::now();
        loop {
            if !self.process_commands(&cmd_rx) || stop.load(Ordering::Acquire) {
                return;
            }
            if Instant::now() >= next_tick {
                self.tick();
                next_tick = Instant::now() + self.cfg.tick;
                continue;
            }
            sleep_ms(POLL.as_millis() as u64);
        }
    }
}
