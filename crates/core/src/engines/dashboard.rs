//! The in-game dashboard (Alt+B window) shared by buff and teleport.

use std::time::{Duration, Instant};

use super::EngineCtx;
use crate::hud::Severity;
use crate::sleep::sleep_ms;
use crate::types::Point;
use crate::vision::Zone;

pub const ENGINE: &str = "dashboard";

#[derive(Debug, Clone)]
pub struct DashboardData {
    pub init: Vec<String>,
    pub init_thr: f64,
    pub locked: Vec<Vec<String>>,
    pub locked_thr: f64,
    pub open_timeout_ms: u64,
    pub close_timeout_ms: u64,
    pub hover_ms: u64,
    pub post_ms: u64,
}

pub struct Dashboard<'a> {
    ctx: &'a EngineCtx,
    data: &'a DashboardData,
    /// HUD scope of the caller (`buff` or `tp`).
    scope: &'a str,
}

impl<'a> Dashboard<'a> {
    pub fn new(ctx: &'a EngineCtx, data: &'a DashboardData, scope: &'a str) -> Self {
        Self { ctx, data, scope }
    }

    pub fn find(&self, parts: &[String], thr: f64) -> Option<Point> {
        self.ctx.find(ENGINE, &Zone::fullscreen(), parts, thr)
    }

    pub fn visible(&self, parts: &[String], thr: f64) -> bool {
        self.find(parts, thr).is_some()
    }

    pub fn is_open(&self) -> bool {
        self.visible(&self.data.init, self.data.init_thr)
    }

    pub fn is_locked(&self) -> bool {
        self.data.locked.iter().any(|p| self.visible(p, self.data.locked_thr))
    }

    /// Toggle with `altB` unless already in the wanted state, then poll.
    fn ensure(&self, want_open: bool, timeout: Duration) -> bool {
        if self.is_open() == want_open {
            return true;
        }
        self.ctx.controller.send("altB");
        let deadline = Instant::now() + timeout.max(Duration::from_millis(200));
        while Instant::now() < deadline {
            if self.is_open() == want_open {
                return true;
            }
            sleep_ms(50);
        }
        false
    }

    pub fn close(&self) -> bool {
        self.ensure(false, Duration::from_millis(self.data.close_timeout_ms))
    }

    /// Close if open, then open again and confirm by `init`.
    pub fn open_fresh(&self) -> bool {
        self.close();
        if self.ensure(true, Duration::from_millis(self.data.open_timeout_ms)) {
            self.ctx.status(self.scope, Severity::Ok, "dashboard open");
            true
        } else {
            self.ctx.status(self.scope, Severity::Err, "dashboard did not open");
            false
        }
    }

    pub fn click_point(&self, p: Point) -> bool {
        self.ctx.hover_click(p, self.data.hover_ms, self.data.post_ms)
    }

    pub fn click(&self, parts: &[String], thr: f64) -> bool {
        match self.find(parts, thr) {
            Some(p) => self.click_point(p),
            None => false,
        }
    }

    /// Poll for `parts` up to `timeout` (at least one probe).
    pub fn wait_for(&self, parts: &[String], thr: f64, timeout: Duration) -> bool {
        self.ctx
            .wait_found(ENGINE, &Zone::fullscreen(), parts, thr, timeout, Duration::from_millis(50))
            .is_some()
    }

    /// Open a section: done when `init` already shows, else click `button`
    /// and wait for `init`.
    pub fn enter(&self, button: &[String], init: &[String], thr: f64, timeout: Duration) -> bool {
        if self.visible(init, thr) {
            return true;
        }
        if !self.click(button, thr) {
            return false;
        }
        self.wait_for(init, thr, timeout)
    }
}
