use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{json, Value};

use super::{Publish, Service, Worker};
use crate::logger;
use crate::pool::{StatePool, ALIVE_EPSILON};
use crate::sleep::mono_now;
use crate::types::WindowInfo;
use crate::vision::colors::{hp_ratio, Rgb};
use crate::vision::{Vision, Zone};

/// Where and how to read the HP bar.
#[derive(Debug, Clone)]
pub struct VitalsConfig {
    pub zone: Zone,
    pub alive: Vec<Rgb>,
    pub dead: Vec<Rgb>,
    pub tolerance: u8,
}

struct Inner {
    pool: StatePool,
    vision: Vision,
    cfg: VitalsConfig,
    publish: Publish,
    last: Mutex<Option<f64>>,
}

/// Measures the HP ratio from the state zone once per period.
pub struct VitalsService {
    inner: Arc<Inner>,
    worker: Worker,
}

impl VitalsService {
    pub fn new(pool: StatePool, vision: Vision, cfg: VitalsConfig, publish: Publish) -> Self {
        Self {
            inner: Arc::new(Inner { pool, vision, cfg, publish, last: Mutex::new(None) }),
            worker: Worker::new("vitals"),
        }
    }

    /// One measurement. Returns the published ratio, if any.
    pub fn tick(&self) -> Option<f64> {
        self.inner.tick()
    }
}

impl Inner {
    fn tick(&self) -> Option<f64> {
        if self.pool.get_bool("services.player_state.paused", false) {
            return None;
        }
        let win = WindowInfo::from_value(&self.pool.get("window.info", Value::Null))?;
        let region = self.cfg.zone.compute(&win);
        let measured = match self.vision.capture(&win, &region) {
            Ok(cap) => hp_ratio(&cap, &self.cfg.alive, &self.cfg.dead, self.cfg.tolerance),
            Err(e) => {
                if self.pool.debug("vitals") {
                    logger::warn_p("vitals", &e.to_string());
                }
                None
            }
        };

        let mut last = self.last.lock();
        if let Some(r) = measured {
            *last = Some(r);
        }
        let ratio = (*last)?;
        if self.pool.debug("vitals") {
            logger::info_p("vitals", &format!("hp_ratio={:.3}{}", ratio, if measured.is_none() { " (carried)" } else { "" }));
        }
        (self.publish)(json!({ "hp_ratio": ratio, "ts": mono_now() }));
        Some(ratio)
    }
}

impl Service for VitalsService {
    fn name(&self) -> &'static str {
        "player_state"
    }

    fn start(&self, poll: Duration) {
        let inner = Arc::clone(&self.inner);
        self.worker.start(poll, move |_| {
            inner.tick();
        });
    }

    fn stop(&self) {
        self.worker.stop();
    }

    fn is_running(&self) -> bool {
        self.worker.is_running()
    }
}

/// Write a vitals measurement into `player`, deriving `alive`.
pub fn project_vitals(pool: &StatePool, update: &Value) {
    let ratio = update.get("hp_ratio").and_then(Value::as_f64);
    let alive = ratio.map(|r| r > ALIVE_EPSILON);
    pool.write("player", json!({ "hp_ratio": ratio, "alive": alive })).ok();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::stub::StubPlatform;
    use crate::types::Capture;
    use crate::vision::TemplateStore;

    const ALIVE: Rgb = (162, 44, 31);
    const DEAD: Rgb = (64, 52, 48);

    fn service(frame: Option<Capture>) -> (VitalsService, StatePool, Arc<StubPlatform>) {
        let win = WindowInfo { x: 0, y: 0, width: 200, height: 100, hwnd: 1 };
        let stub = Arc::new(StubPlatform::with_window(win));
        stub.set_frame(frame);
        let pool = StatePool::with_defaults();
        pool.write("window", json!({ "info": win.to_value() })).unwrap();
        let vision = Vision::new(stub.clone(), Arc::new(TemplateStore::new("/nonexistent")));
        let cfg = VitalsConfig { zone: Zone::ltrb(0, 0, 170, 63), alive: vec![ALIVE], dead: vec![DEAD], tolerance: 3 };
        let p = pool.clone();
        let publish: Publish = Arc::new(move |v| project_vitals(&p, &v));
        (VitalsService::new(pool.clone(), vision, cfg, publish), pool, stub)
    }

    fn bar(alive_w: u32, dead_w: u32) -> Capture {
        let mut frame = Capture::filled(200, 100, (10, 10, 10));
        frame.fill_rect(20, 30, alive_w, 6, ALIVE);
        frame.fill_rect(20 + alive_w, 30, dead_w, 6, DEAD);
        frame
    }

    #[test]
    fn test_publishes_ratio_and_alive() {
        let (svc, pool, _) = service(Some(bar(75, 25)));
        let r = svc.tick().unwrap();
        assert!((r - 0.75).abs() < 0.02, "ratio {}", r);
        assert_eq!(pool.get_opt_bool("player.alive"), Some(true));
    }

    #[test]
    fn test_empty_bar_is_dead() {
        let (svc, pool, _) = service(Some(bar(0, 100)));
        assert_eq!(svc.tick(), Some(0.0));
        assert_eq!(pool.get_opt_bool("player.alive"), Some(false));
    }

    #[test]
    fn test_capture_failure_carries_previous() {
        let (svc, _pool, stub) = service(Some(bar(50, 50)));
        let first = svc.tick().unwrap();
        stub.set_frame(None);
        assert_eq!(svc.tick(), Some(first));
    }

    #[test]
    fn test_paused_or_windowless_does_nothing() {
        let (svc, pool, _) = service(Some(bar(50, 50)));
        pool.write("services.player_state", json!({ "paused": true })).unwrap();
        assert_eq!(svc.tick(), None);
        pool.write("services.player_state", json!({ "paused": false })).unwrap();
        pool.write("window", json!({ "info": null })).unwrap();
        assert_eq!(svc.tick(), None);
        assert_eq!(pool.get_opt_f64("player.hp_ratio"), None);
    }
}
