use std::time::{Duration, Instant};

use serde_json::json;

use super::{EngineCtx, StepOutcome};
use crate::hud::Severity;
use crate::logger;
use crate::sleep::{mono_now, sleep_ms};
use crate::snapshot::Snapshot;
use crate::vision::matcher::SCALES;
use crate::vision::Zone;

const ENGINE: &str = "respawn";
const ACTIVE_PHASE: Duration = Duration::from_secs(14);
const CLICK_DEBOUNCE: Duration = Duration::from_millis(600);
const LOAD_WAIT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct RespawnData {
    pub zone: Zone,
    pub reborn_banner: Vec<String>,
    pub accept_button: Vec<String>,
    pub death_banner: Vec<String>,
}

impl RespawnData {
    /// Banner keys in priority order.
    fn candidates(&self) -> Vec<(String, Vec<String>)> {
        vec![
            ("reborn_banner".into(), self.reborn_banner.clone()),
            ("accept_button".into(), self.accept_button.clone()),
            ("death_banner".into(), self.death_banner.clone()),
        ]
    }
}

struct Respawn<'a> {
    ctx: &'a EngineCtx,
    data: &'a RespawnData,
    thr: f64,
    confirm: Duration,
}

impl Respawn<'_> {
    fn scan(&self) -> Option<((i32, i32), String)> {
        let win = self.ctx.window()?;
        let scope = self.ctx.scope(ENGINE);
        match self.ctx.vision.match_multi(&win, &self.data.zone, &scope, &self.data.candidates(), self.thr, &SCALES) {
            Ok(hit) => hit,
            Err(e) => {
                if e.is_missing_asset() {
                    logger::warn_p("respawn", &e.to_string());
                }
                None
            }
        }
    }

    fn alive(&self) -> bool {
        self.ctx.alive() == Some(true)
    }

    fn wait_alive(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.alive() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            sleep_ms(50);
        }
    }

    /// Optional passive wait for a resurrection offer. Counts focused time only.
    /// `Some(true)` when the player came back on their own.
    fn passive_wait(&self, seconds: u64) -> Option<bool> {
        let mut waited = Duration::ZERO;
        let step = Duration::from_millis(200);
        let mut last_report = u64::MAX;
        while waited < Duration::from_secs(seconds) {
            if self.alive() {
                return Some(true);
            }
            if matches!(self.scan(), Some((_, ref k)) if k == "reborn_banner" || k == "accept_button") {
                return None;
            }
            std::thread::sleep(step);
            if self.ctx.pool.get_opt_bool("focus.is_focused") != Some(false) {
                waited += step;
            }
            let sec = waited.as_secs();
            if sec != last_report && sec % 10 == 0 {
                last_report = sec;
                self.ctx.status("respawn", Severity::Ok, &format!("waiting for resurrection {}/{}s", sec, seconds));
            }
        }
        None
    }

    /// Click banners until alive or the phase times out. Returns the
    /// respawn type on success: `revive` (resurrection or spontaneous) or
    /// `self` (back to town).
    fn active(&self) -> Option<&'static str> {
        let deadline = Instant::now() + ACTIVE_PHASE;
        let mut last_click: Option<Instant> = None;
        let mut kind = "revive";
        while Instant::now() < deadline {
            if self.alive() {
                return Some(kind);
            }
            let Some((pt, key)) = self.scan() else {
                if last_click.is_some() && self.wait_alive(LOAD_WAIT) {
                    return Some(kind);
                }
                sleep_ms(50);
                continue;
            };
            if last_click.map_or(false, |t| t.elapsed() < CLICK_DEBOUNCE) {
                sleep_ms(50);
                continue;
            }

            let target = match key.as_str() {
                "death_banner" => {
                    kind = "self";
                    self.ctx.status("respawn", Severity::Ok, "respawning in town");
                    pt
                }
                _ => {
                    kind = "revive";
                    self.ctx.status("respawn", Severity::Ok, "accepting resurrection");
                    let accept = &self.data.accept_button;
                    self.ctx.find(ENGINE, &self.data.zone, accept, self.thr).unwrap_or(pt)
                }
            };
            self.ctx.hover_click(target, 400, 0);
            last_click = Some(Instant::now());

            let confirm_deadline = Instant::now() + self.confirm;
            while Instant::now() < confirm_deadline {
                if self.alive() {
                    return Some(kind);
                }
                if self.scan().is_none() {
                    break;
                }
                sleep_ms(50);
            }
            if self.wait_alive(LOAD_WAIT) {
                return Some(kind);
            }
        }
        None
    }
}

/// Respawn step: `(true, true)` once alive again.
pub fn run(ctx: &EngineCtx, data: &RespawnData, snap: &Snapshot) -> StepOutcome {
    let pool = &ctx.pool;
    if !snap.has_window {
        return (false, false);
    }
    if snap.alive == Some(true) {
        return (true, true);
    }
    if pool.feature_paused("respawn") {
        return (false, false);
    }

    let r = Respawn {
        ctx,
        data,
        thr: pool.get_f64("features.respawn.click_threshold", 0.70),
        confirm: Duration::from_secs_f64(pool.get_f64("features.respawn.confirm_timeout_s", 6.0).max(0.0)),
    };

    let wait_seconds = pool.get_i64("features.respawn.wait_seconds", 0).max(0) as u64;
    let kind = if pool.get_bool("features.respawn.wait_enabled", false) && wait_seconds > 0 {
        match r.passive_wait(wait_seconds) {
            Some(true) => Some("revive"),
            _ => r.active(),
        }
    } else {
        r.active()
    };

    match kind {
        Some(kind) => {
            pool.write("features.respawn", json!({ "last_respawn": { "type": kind, "ts": mono_now() }, "status": "ok" }))
                .ok();
            ctx.status("respawn", Severity::Succ, "back on our feet");
            (true, true)
        }
        None => {
            ctx.status("respawn", Severity::Err, "could not respawn");
            (false, false)
        }
    }
}
