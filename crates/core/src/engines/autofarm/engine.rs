use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::skills::SkillPlanner;
use super::vision::TargetVision;
use super::zones::{Monster, ZoneRepo};
use super::{AutofarmData, FarmConfig, ENGINE};
use crate::engines::{target_steps, EngineCtx};
use crate::flow::{run_flow, FlowCtx, PauseGate};
use crate::hud::Severity;
use crate::logger;
use crate::sleep::{mono_now, sleep_ms};

/// How the owner of a cycle stops or holds it.
pub trait CycleControl: Send + Sync {
    fn should_abort(&self) -> bool;
    /// Block while paused; return promptly once aborting.
    fn wait_if_paused(&self);
}

/// Survives between cycles of one service run.
#[derive(Debug, Default)]
pub struct FarmState {
    pub cd_map: HashMap<String, f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleEnd {
    NoWindow,
    NotConfigured,
    Aborted,
    /// Too many failed acquisitions in a row; `/unstuck` was sent.
    Stuck,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Acquired {
    TargetNext,
    Template(String),
    Name(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fight {
    Killed,
    Unvisible,
    Timeout,
    Aborted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Probe {
    Killed,
    Failed,
    Aborted,
}

struct Farmer<'a> {
    ctx: &'a EngineCtx,
    data: &'a AutofarmData,
    cfg: &'a FarmConfig,
    monsters: Vec<&'a Monster>,
    control: Arc<dyn CycleControl>,
    flow: FlowCtx,
    lang: String,
    name_blacklist: HashSet<String>,
    template_blacklist: HashSet<String>,
    streak: u32,
}

impl Farmer<'_> {
    fn vision(&self) -> TargetVision<'_> {
        TargetVision::new(self.ctx, self.data)
    }

    fn debug(&self, text: &str) {
        if self.ctx.pool.debug(ENGINE) {
            logger::info_p(ENGINE, text);
        }
    }

    /// None when aborting; otherwise how long a pause held the cycle.
    fn checkpoint(&self) -> Option<Duration> {
        if self.control.should_abort() {
            return None;
        }
        let start = Instant::now();
        self.control.wait_if_paused();
        if self.control.should_abort() {
            None
        } else {
            Some(start.elapsed())
        }
    }

    fn esc_twice(&self) {
        self.ctx.controller.send("esc");
        sleep_ms(100);
        self.ctx.controller.send("esc");
    }

    /// Drop the attack without a sound: two empty chat lines and Esc.
    fn silent_cancel(&self) {
        self.ctx.controller.chat("/");
        self.ctx.controller.chat("/");
        self.ctx.controller.send("esc");
    }

    fn target_next(&self) -> (bool, bool) {
        self.ctx.controller.chat("/targetnext");
        sleep_ms(self.data.targetnext_wait_ms);
        self.vision().probe_retrying()
    }

    /// Click an unguarded monster found by its name plate.
    fn template_probe(&self) -> Option<String> {
        let d = self.data;
        let win = self.ctx.window()?;
        let vision = self.vision();
        for m in &self.monsters {
            if self.template_blacklist.contains(&m.id) || self.name_blacklist.contains(&m.id) {
                continue;
            }
            self.checkpoint()?;
            let Some(plate) = vision.locate_monster(&m.template_slugs(&self.lang)) else { continue };
            let Some(ring) = vision.ring(&plate) else { continue };
            if ring.friend >= d.ring_min_px || ring.enemy >= d.ring_min_px {
                self.debug(&format!("{} is guarded, skipped", m.id));
                continue;
            }
            let body = win.to_screen((plate.cx, (plate.b + d.body_offset_y).min(win.height - 1)));
            self.ctx.controller.move_to(body);
            sleep_ms(d.template_settle_ms);
            if vision.ring(&plate).map_or(true, |r| r.neutral < d.ring_min_px) {
                self.debug(&format!("{} shows no neutral marker", m.id));
                continue;
            }
            self.ctx.hover_click(body, d.hover_ms, 100);
            let above = win.to_screen((plate.cx, (plate.t - d.above_offset_y).max(0)));
            self.ctx.hover_click(above, d.hover_ms, 0);
            self.debug(&format!("{} picked by template", m.id));
            return Some(m.id.clone());
        }
        None
    }

    /// `/target <name>` over the zone's monsters until one dies.
    fn name_probe(&mut self, cd_map: &mut HashMap<String, f64>) -> Probe {
        let monsters = self.monsters.clone();
        if monsters.is_empty() {
            return Probe::Failed;
        }
        if monsters.iter().all(|m| self.name_blacklist.contains(&m.id)) {
            self.name_blacklist.clear();
        }
        let tries = self.data.probe_tries;
        let delay = Duration::from_millis(self.data.probe_delay_ms);
        for m in monsters {
            if self.name_blacklist.contains(&m.id) {
                continue;
            }
            if self.checkpoint().is_none() {
                return Probe::Aborted;
            }
            let name = m.target_name(&self.lang);
            run_flow(&self.flow, &target_steps(&name, !name.is_ascii(), self.data.name_settle_ms));
            let Some((_, alive)) = self.vision().wait_target(tries, delay) else { continue };
            if !alive {
                self.debug(&format!("{} is dead, blacklisted", m.id));
                self.name_blacklist.insert(m.id.clone());
                continue;
            }
            match self.fight(&Acquired::Name(m.id.clone()), cd_map) {
                Fight::Killed => return Probe::Killed,
                Fight::Aborted => return Probe::Aborted,
                Fight::Unvisible => {
                    self.name_blacklist.insert(m.id.clone());
                }
                Fight::Timeout => {}
            }
        }
        Probe::Failed
    }

    fn fight(&self, acquired: &Acquired, cd_map: &mut HashMap<String, f64>) -> Fight {
        let vision = self.vision();
        let mut planner = SkillPlanner::new(&self.cfg.skills, cd_map);
        let mut deadline = Instant::now() + Duration::from_millis(self.data.attack_timeout_ms);
        self.debug(&format!("attack {:?}", acquired));
        loop {
            let alive = vision.target_alive();
            if alive == Some(false) {
                sleep_ms(200);
                return Fight::Killed;
            }
            match self.checkpoint() {
                Some(paused) => deadline += paused,
                None => return Fight::Aborted,
            }
            if Instant::now() >= deadline {
                self.esc_twice();
                self.ctx.status(ENGINE, Severity::Att, "attack timed out");
                return Fight::Timeout;
            }
            if alive.is_none() {
                sleep_ms(80);
                continue;
            }
            let now = mono_now();
            let Some(idx) = planner.pick(now) else {
                if planner.presses() > 0 && planner.all_used() && vision.unvisible_warning() {
                    self.silent_cancel();
                    self.ctx.status(ENGINE, Severity::Att, "target not visible");
                    return Fight::Unvisible;
                }
                let wait = planner.next_ready_in(now).clamp(0.02, 0.15);
                sleep_ms((wait * 1000.0) as u64);
                continue;
            };
            self.ctx.controller.send(&self.cfg.skills[idx].key);
            planner.mark(idx, now);
            if planner.presses() >= 2 && vision.unvisible_warning() {
                self.silent_cancel();
                self.ctx.status(ENGINE, Severity::Att, "target not visible");
                return Fight::Unvisible;
            }
        }
    }

    fn iteration(&mut self, cd_map: &mut HashMap<String, f64>) -> Option<CycleEnd> {
        if self.checkpoint().is_none() {
            return Some(CycleEnd::Aborted);
        }
        let (mut has, mut alive) = self.target_next();
        let mut acquired = Acquired::TargetNext;
        if !(has && alive) {
            if let Some(id) = self.template_probe() {
                sleep_ms(self.data.template_settle_ms);
                (has, alive) = self.vision().probe_retrying();
                acquired = Acquired::Template(id);
            }
        }

        let outcome = if has && alive {
            match self.fight(&acquired, cd_map) {
                Fight::Killed => Probe::Killed,
                Fight::Aborted => Probe::Aborted,
                Fight::Unvisible => {
                    if let Acquired::Template(id) = &acquired {
                        self.template_blacklist.insert(id.clone());
                    }
                    self.name_probe(cd_map)
                }
                Fight::Timeout => {
                    if let Acquired::Template(id) = &acquired {
                        self.template_blacklist.insert(id.clone());
                    }
                    Probe::Failed
                }
            }
        } else {
            self.name_probe(cd_map)
        };

        let limit = self.data.restart_streak;
        match outcome {
            Probe::Aborted => return Some(CycleEnd::Aborted),
            Probe::Killed => {
                self.streak = 0;
                self.name_blacklist.clear();
                self.template_blacklist.clear();
                self.ctx.status(ENGINE, Severity::Succ, "target killed");
            }
            Probe::Failed => {
                self.streak += 1;
                self.ctx.status(ENGINE, Severity::Att, &format!("no target found ({}/{})", self.streak, limit));
            }
        }
        if self.streak >= limit {
            self.ctx.status(ENGINE, Severity::Err, "no targets around, sending /unstuck");
            self.ctx.controller.chat("/unstuck");
            sleep_ms(self.data.unstuck_wait_ms);
            self.ctx.controller.send("esc");
            return Some(CycleEnd::Stuck);
        }
        sleep_ms(self.data.iteration_gap_ms);
        None
    }
}

/// Farm until aborted or stuck. Cooldowns carry over in `state`.
pub fn run_cycle(
    ctx: &EngineCtx,
    data: &AutofarmData,
    cfg: &FarmConfig,
    zones: &ZoneRepo,
    control: Arc<dyn CycleControl>,
    state: &mut FarmState,
) -> CycleEnd {
    if ctx.window().is_none() {
        return CycleEnd::NoWindow;
    }
    if cfg.skills.is_empty() || cfg.zone.is_empty() {
        ctx.status(ENGINE, Severity::Err, "pick a farm zone and attack skills");
        return CycleEnd::NotConfigured;
    }
    let monsters = match zones.zone(&cfg.zone) {
        Some(z) => z.allowed(&cfg.monsters),
        None => {
            ctx.status(ENGINE, Severity::Att, &format!("zone '{}' has no monster list", cfg.zone));
            Vec::new()
        }
    };

    let gate_control = Arc::clone(&control);
    let gate: PauseGate = Arc::new(move || {
        gate_control.wait_if_paused();
        !gate_control.should_abort()
    });
    let mut farmer = Farmer {
        ctx,
        data,
        cfg,
        monsters,
        control,
        flow: ctx.flow(ENGINE).with_gate(gate),
        lang: ctx.pool.language(),
        name_blacklist: HashSet::new(),
        template_blacklist: HashSet::new(),
        streak: 0,
    };
    loop {
        if let Some(end) = farmer.iteration(&mut state.cd_map) {
            return end;
        }
    }
}
