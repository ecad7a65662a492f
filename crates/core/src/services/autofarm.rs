use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::json;

use super::{Service, Worker};
use crate::engines::autofarm::{run_cycle, AutofarmData, CycleControl, CycleEnd, FarmConfig, FarmState, ZoneRepo, ENGINE};
use crate::engines::EngineCtx;
use crate::hud::Severity;
use crate::logger;
use crate::sleep::{sleep_ms, sleep_until_stopped};

const PAUSE_POLL_MS: u64 = 100;
const IDLE_BACKOFF: Duration = Duration::from_secs(2);

struct Inner {
    ctx: EngineCtx,
    data: AutofarmData,
    kick: AtomicBool,
    cancel: AtomicBool,
    stop: Arc<AtomicBool>,
    state: Mutex<FarmState>,
}

/// Runs farm cycles on its own thread: once per kick in `auto` mode, back
/// to back in `manual` mode.
pub struct AutofarmService {
    inner: Arc<Inner>,
    worker: Worker,
}

impl AutofarmService {
    pub fn new(ctx: EngineCtx, data: AutofarmData) -> Self {
        let worker = Worker::new("autofarm");
        let inner = Arc::new(Inner {
            ctx,
            data,
            kick: AtomicBool::new(false),
            cancel: AtomicBool::new(false),
            stop: worker.stop_token(),
            state: Mutex::new(FarmState::default()),
        });
        Self { inner, worker }
    }

    /// Request one cycle; picked up on the next tick.
    pub fn run_once_now(&self) {
        self.inner.kick.store(true, Ordering::Release);
    }

    /// Abort the running cycle at its next checkpoint.
    pub fn cancel_cycle(&self) {
        self.inner.cancel.store(true, Ordering::Release);
    }

    pub fn wait_if_paused_blocking(&self) {
        self.inner.wait_if_paused();
    }

    pub fn should_abort(&self) -> bool {
        self.inner.should_abort()
    }

    /// One worker pass; the cycle's end when one ran.
    pub fn tick(&self) -> Option<CycleEnd> {
        Inner::tick(&self.inner)
    }
}

impl Inner {
    fn paused(&self) -> bool {
        let pool = &self.ctx.pool;
        pool.feature_paused(ENGINE) || pool.get_bool("services.autofarm.paused", false)
    }

    fn tick(self: &Arc<Self>) -> Option<CycleEnd> {
        let pool = &self.ctx.pool;
        if !pool.get_bool("features.autofarm.enabled", false) {
            self.kick.store(false, Ordering::Release);
            return None;
        }
        if self.paused() || pool.get_opt_bool("player.alive") == Some(false) {
            return None;
        }
        let cfg = FarmConfig::from_pool(pool);
        let manual = cfg.mode == "manual";
        if !manual && !self.kick.swap(false, Ordering::AcqRel) {
            return None;
        }

        self.cancel.store(false, Ordering::Release);
        pool.write(&format!("features.{}", ENGINE), json!({ "busy": true, "status": "running" })).ok();
        let zones = ZoneRepo::load(&self.ctx.data_file(ENGINE, "zones.json"));
        let control: Arc<dyn CycleControl> = self.clone();
        let end = {
            let mut state = self.state.lock();
            run_cycle(&self.ctx, &self.data, &cfg, &zones, control, &mut state)
        };
        pool.write(&format!("features.{}", ENGINE), json!({ "busy": false, "status": "idle" })).ok();
        if pool.debug(ENGINE) {
            logger::info_p(ENGINE, &format!("cycle ended: {:?}", end));
        }
        if manual && matches!(end, CycleEnd::NoWindow | CycleEnd::NotConfigured) {
            sleep_until_stopped(IDLE_BACKOFF, &self.stop);
        }
        Some(end)
    }
}

impl CycleControl for Inner {
    fn should_abort(&self) -> bool {
        let pool = &self.ctx.pool;
        self.stop.load(Ordering::Acquire)
            || self.cancel.load(Ordering::Acquire)
            || !pool.get_bool("features.autofarm.enabled", false)
            || pool.get_opt_bool("player.alive") == Some(false)
    }

    /// `busy` stays true while held here so the coordinator sees a
    /// suspended cycle, not a finished one.
    fn wait_if_paused(&self) {
        let mut held = false;
        while self.paused() && !self.should_abort() {
            if !held {
                self.ctx.status(ENGINE, Severity::Att, "auto-farm paused");
                held = true;
            }
            sleep_ms(PAUSE_POLL_MS);
        }
        if held && !self.should_abort() {
            self.ctx.status(ENGINE, Severity::Ok, "auto-farm resumed");
        }
    }
}

impl Service for AutofarmService {
    fn name(&self) -> &'static str {
        "autofarm"
    }

    fn start(&self, poll: Duration) {
        let inner = Arc::clone(&self.inner);
        self.worker.start(poll, move |_| {
            Inner::tick(&inner);
        });
    }

    fn stop(&self) {
        self.cancel_cycle();
        self.worker.stop();
    }

    fn is_running(&self) -> bool {
        self.worker.is_running()
    }
}
