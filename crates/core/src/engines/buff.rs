use std::time::{Duration, Instant};

use super::dashboard::{Dashboard, DashboardData, ENGINE};
use super::ui_guard::UiGuard;
use super::{EngineCtx, StepOutcome};
use crate::hud::Severity;
use crate::logger;
use crate::sleep::sleep_ms;
use crate::snapshot::Snapshot;
use crate::vision::{parts, Zone};

#[derive(Debug, Clone)]
pub struct BuffData {
    pub dashboard: DashboardData,
    pub buffer_button: Vec<String>,
    pub buffer_init: Vec<String>,
    pub button_thr: f64,
    pub buffer_init_ms: u64,
    pub mode_post_ms: u64,
    pub restore_hp: Vec<String>,
    pub restore_thr: f64,
    pub current_buffs: Zone,
    pub verify_thr: f64,
    pub verify_scales: &'static [f64],
    /// Icon group directory and the checker tokens it holds.
    pub icons: &'static [(&'static str, &'static [&'static str])],
    pub max_attempts: i64,
}

impl BuffData {
    fn mode_parts(mode: &str) -> Vec<String> {
        parts(&["<lang>", "buffer", &format!("dashboard_buffer_{}.png", mode)])
    }

    pub fn icon_parts(&self, token: &str) -> Option<Vec<String>> {
        self.icons
            .iter()
            .find(|(_, tokens)| tokens.iter().any(|t| *t == token))
            .map(|(group, _)| parts(&["common", "buffer", "icons", *group, &format!("{}.png", token)]))
    }
}

/// Why an attempt stopped short. `advance` mirrors the step contract.
struct Failed {
    advance: bool,
}

struct Buffer<'a> {
    ctx: &'a EngineCtx,
    data: &'a BuffData,
    dash: Dashboard<'a>,
}

impl Buffer<'_> {
    fn fail(&self, text: &str, advance: bool) -> Failed {
        self.ctx.status("buff", Severity::Err, text);
        self.dash.close();
        Failed { advance }
    }

    /// Wait for the buffer tab; a death in the meantime ends the step.
    fn wait_buffer(&self) -> Result<bool, Failed> {
        let deadline = Instant::now() + Duration::from_millis(self.data.buffer_init_ms);
        loop {
            if self.ctx.alive() == Some(false) {
                return Err(self.fail("player died while buffing", true));
            }
            if self.dash.visible(&self.data.buffer_init, self.data.button_thr) {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            sleep_ms(50);
        }
    }

    fn click_mode(&self) -> bool {
        let mode = self.ctx.pool.get_str("features.buff.mode", "profile").trim().to_lowercase();
        let mode = if mode.is_empty() { "profile".to_string() } else { mode };
        let mut candidates = vec![mode.clone()];
        if mode != "profile" {
            candidates.push("profile".into());
        }
        candidates
            .iter()
            .any(|m| self.dash.click(&BuffData::mode_parts(m), self.data.button_thr))
    }

    fn token_present(&self, token: &str, icon: Vec<String>) -> bool {
        let Some(win) = self.ctx.window() else { return false };
        let candidates = [(token.to_string(), icon)];
        let scope = self.ctx.scope(ENGINE);
        match self.ctx.vision.match_multi(
            &win,
            &self.data.current_buffs,
            &scope,
            &candidates,
            self.data.verify_thr,
            self.data.verify_scales,
        ) {
            Ok(hit) => hit.is_some(),
            Err(e) => {
                logger::warn_p("buff", &e.to_string());
                false
            }
        }
    }

    /// Every checker token must be visible in the current-buffs strip.
    fn verify(&self) -> bool {
        let tokens = self.ctx.pool.get_str_list("features.buff.checker");
        for token in &tokens {
            let Some(icon) = self.data.icon_parts(token) else {
                logger::warn_p("buff", &format!("no icon for checker token '{}'", token));
                return false;
            };
            if !self.token_present(token, icon) {
                if self.ctx.pool.debug("buff") {
                    logger::info_p("buff", &format!("'{}' not visible", token));
                }
                return false;
            }
        }
        true
    }

    fn attempt(&self) -> Result<(), Failed> {
        if !self.dash.open_fresh() {
            return Err(Failed { advance: false });
        }
        if !self.dash.click(&self.data.buffer_button, self.data.button_thr) {
            return Err(self.fail("buffer tab button not found", false));
        }
        if !self.wait_buffer()? {
            if self.dash.is_locked() {
                return Err(self.fail("dashboard locked, waiting", false));
            }
            return Err(self.fail("buffer tab did not open", false));
        }
        self.ctx.status("buff", Severity::Ok, "buffer open");

        if !self.click_mode() {
            return Err(self.fail("buff mode tile not found", false));
        }
        sleep_ms(self.data.mode_post_ms);

        if !self.verify() {
            return Err(self.fail("buff not detected", true));
        }
        self.ctx.status("buff", Severity::Succ, "buff confirmed");

        if self.dash.click(&self.data.restore_hp, self.data.restore_thr) {
            self.ctx.status("buff", Severity::Ok, "restoring HP");
        }
        sleep_ms(200);
        self.dash.close();
        Ok(())
    }
}

/// Buff step through the dashboard buffer tab.
pub fn run(ctx: &EngineCtx, data: &BuffData, snap: &Snapshot, guard: Option<&UiGuard>) -> StepOutcome {
    let pool = &ctx.pool;
    if !snap.has_window || pool.feature_paused("buff") {
        return (false, false);
    }
    if snap.alive == Some(false) {
        ctx.status("buff", Severity::Err, "player is dead, buff skipped");
        return (false, true);
    }
    let method = pool.get_str("features.buff.method", "dashboard").trim().to_lowercase();
    if !method.is_empty() && method != "dashboard" {
        ctx.status("buff", Severity::Att, &format!("buff method '{}' is not supported", method));
        return (true, true);
    }

    let buffer = Buffer { ctx, data, dash: Dashboard::new(ctx, &data.dashboard, "buff") };
    match buffer.attempt() {
        Ok(()) => {
            pool.set_attempts("buff", 0);
            (true, true)
        }
        Err(Failed { advance }) => {
            let n = pool.bump_attempts("buff");
            if n >= data.max_attempts {
                ctx.status("buff", Severity::Att, &format!("{} failed attempts, unstuck", n));
                if let Some(guard) = guard {
                    guard.run_unstuck();
                }
                pool.set_attempts("buff", 0);
            }
            (false, advance)
        }
    }
}
