//! Clears whatever covers the game view: page overlays, the dashboard, the
//! wrong-layout popup. A disconnect popup is reported only.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use super::EngineCtx;
use crate::hud::Severity;
use crate::logger;
use crate::services::Worker;
use crate::sleep::sleep_ms;
use crate::vision::{parts, Zone};

const ENGINE: &str = "ui_guard";

#[derive(Debug, Clone)]
pub struct UiGuardData {
    pub pages: &'static [&'static str],
    pub close_default: &'static str,
    pub close_dashboard: &'static str,
    pub wrong_word_popup: &'static str,
    pub wrong_word_accept: &'static str,
    pub disconnect_popup: &'static str,
    pub threshold: f64,
    pub max_waves: u32,
    pub close_timeout_ms: u64,
    pub unstuck_wait_ms: u64,
}

/// Outcome of one guard pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Report {
    Empty,
    PagesBlocker,
    DashboardBlocker,
    LanguageBlocker,
    DisconnectBlocker,
}

impl Report {
    pub fn as_str(self) -> &'static str {
        match self {
            Report::Empty => "empty",
            Report::PagesBlocker => "pages_blocker",
            Report::DashboardBlocker => "dashboard_blocker",
            Report::LanguageBlocker => "language_blocker",
            Report::DisconnectBlocker => "disconnect_blocker",
        }
    }
}

struct Inner {
    ctx: EngineCtx,
    data: UiGuardData,
    suspended: AtomicBool,
    passes: AtomicU64,
}

pub struct UiGuard {
    inner: Arc<Inner>,
    worker: Worker,
}

fn page_parts(file: &str) -> Vec<String> {
    parts(&["<lang>", "interface", "pages", &format!("{}.png", file)])
}

fn button_parts(file: &str) -> Vec<String> {
    parts(&["<lang>", "interface", "buttons", &format!("{}.png", file)])
}

impl Inner {
    fn report(&self, r: Report) {
        self.ctx.pool.write("features.ui_guard", json!({ "report": r.as_str() })).ok();
        if self.ctx.pool.debug("ui_guard") {
            logger::info_p("ui_guard", r.as_str());
        }
    }

    fn visible(&self, p: &[String]) -> bool {
        self.ctx.visible(ENGINE, &Zone::fullscreen(), p, self.data.threshold)
    }

    fn click(&self, p: &[String]) -> bool {
        match self.ctx.find(ENGINE, &Zone::fullscreen(), p, self.data.threshold) {
            Some(pt) => self.ctx.hover_click(pt, 200, 100),
            None => false,
        }
    }

    fn open_page(&self) -> Option<&'static str> {
        self.data.pages.iter().copied().find(|p| self.visible(&page_parts(p)))
    }

    /// Close page overlays wave by wave. Returns true when none remain.
    fn clear_pages(&self) -> bool {
        for _ in 0..self.data.max_waves {
            let Some(page) = self.open_page() else { return true };
            self.report(Report::PagesBlocker);
            let button = if page == "dashboard_page" { self.data.close_dashboard } else { self.data.close_default };
            if !self.click(&button_parts(button)) {
                logger::warn_p("ui_guard", &format!("no close button for {}", page));
                return false;
            }
            self.ctx.wait_gone(
                ENGINE,
                &Zone::fullscreen(),
                &page_parts(page),
                self.data.threshold,
                Duration::from_millis(self.data.close_timeout_ms),
                Duration::from_millis(50),
            );
        }
        self.open_page().is_none()
    }

    fn pass(&self) -> (Report, bool) {
        let pool = &self.ctx.pool;
        pool.write("features.ui_guard", json!({ "busy": true, "status": "running" })).ok();
        let mut last = Report::Empty;
        let mut clear = true;

        if self.open_page().is_some() {
            last = Report::PagesBlocker;
            clear &= self.clear_pages();
        }

        let dash = button_parts(self.data.close_dashboard);
        if self.visible(&dash) {
            last = Report::DashboardBlocker;
            self.report(last);
            self.click(&dash);
        }

        if self.visible(&page_parts(self.data.wrong_word_popup)) {
            last = Report::LanguageBlocker;
            self.report(last);
            self.ctx.controller.send("layout_toggle_altshift");
            sleep_ms(120);
            if !self.click(&button_parts(self.data.wrong_word_accept)) {
                clear = false;
            }
        }

        if self.visible(&page_parts(self.data.disconnect_popup)) {
            last = Report::DisconnectBlocker;
            self.report(last);
            self.ctx.status("ui_guard", Severity::Err, "connection lost, restart the client");
            clear = false;
        }

        if last == Report::Empty {
            self.report(Report::Empty);
        }
        let reason = if clear { "" } else { last.as_str() };
        pool.write(
            "features.ui_guard",
            json!({ "busy": false, "status": if clear { "ok" } else { "blocked" }, "pause_reason": reason }),
        )
        .ok();
        self.passes.fetch_add(1, Ordering::AcqRel);
        (last, clear)
    }
}

impl UiGuard {
    pub fn new(ctx: EngineCtx, data: UiGuardData) -> Self {
        Self {
            inner: Arc::new(Inner { ctx, data, suspended: AtomicBool::new(false), passes: AtomicU64::new(0) }),
            worker: Worker::new("ui_guard"),
        }
    }

    /// One full pass. `busy` is held for its duration; a blocker that stays
    /// on screen lands in `pause_reason`.
    pub fn run_pass(&self) -> (Report, bool) {
        self.inner.pass()
    }

    /// `/unstuck` in chat, then Esc.
    pub fn run_unstuck(&self) -> bool {
        let ctx = &self.inner.ctx;
        ctx.status("ui_guard", Severity::Att, "stuck, sending /unstuck");
        let ok = ctx.controller.chat("/unstuck");
        sleep_ms(self.inner.data.unstuck_wait_ms);
        ctx.controller.send("esc") && ok
    }

    /// Start the periodic watcher (no-op when already running).
    pub fn ensure_watch(&self) {
        let inner = Arc::clone(&self.inner);
        self.worker.start(Duration::from_secs(1), move |_| {
            if !inner.suspended.load(Ordering::Acquire) {
                inner.pass();
            }
        });
    }

    pub fn stop_watch(&self) {
        self.worker.stop();
    }

    pub fn is_watching(&self) -> bool {
        self.worker.is_running()
    }

    pub fn set_suspended(&self, suspended: bool) {
        self.inner.suspended.store(suspended, Ordering::Release);
    }

    pub fn is_suspended(&self) -> bool {
        self.inner.suspended.load(Ordering::Acquire)
    }

    /// Number of finished passes.
    pub fn passes(&self) -> u64 {
        self.inner.passes.load(Ordering::Acquire)
    }
}
