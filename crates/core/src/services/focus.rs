use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{json, Value};

use super::{Publish, Service, Worker};
use crate::logger;
use crate::platform::Platform;
use crate::pool::StatePool;
use crate::sleep::mono_now;
use crate::types::WindowInfo;

struct Inner {
    pool: StatePool,
    platform: Arc<dyn Platform>,
    publish: Publish,
    /// `None` until the first tick; then the last published value.
    last: Mutex<Option<Option<bool>>>,
}

/// Tracks whether the game window is in the foreground. Publishes on the
/// first tick and on every transition, stamping `ts` with the transition time.
pub struct FocusService {
    inner: Arc<Inner>,
    worker: Worker,
}

impl FocusService {
    pub fn new(pool: StatePool, platform: Arc<dyn Platform>, publish: Publish) -> Self {
        Self {
            inner: Arc::new(Inner { pool, platform, publish, last: Mutex::new(None) }),
            worker: Worker::new("focus"),
        }
    }

    /// Returns true when a transition was published.
    pub fn tick(&self) -> bool {
        self.inner.tick()
    }
}

impl Inner {
    fn tick(&self) -> bool {
        let focused = WindowInfo::from_value(&self.pool.get("window.info", Value::Null))
            .and_then(|w| self.platform.is_foreground(w.hwnd));
        let mut last = self.last.lock();
        if *last == Some(focused) {
            return false;
        }
        *last = Some(focused);
        if self.pool.debug("focus") {
            logger::info_p("focus", &format!("is_focused={:?}", focused));
        }
        (self.publish)(json!({ "is_focused": focused, "ts": mono_now() }));
        true
    }
}

impl Service for FocusService {
    fn name(&self) -> &'static str {
        "window_focus"
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::stub::StubPlatform;

    #[test]
    fn test_publishes_first_tick_and_transitions() {
        let win = WindowInfo { x: 0, y: 0, width: 10, height: 10, hwnd: 4 };
        let stub = Arc::new(StubPlatform::with_window(win));
        let pool = StatePool::with_defaults();
        pool.write("window", json!({ "info": win.to_value() })).unwrap();
        let p = pool.clone();
        let svc = FocusService::new(pool.clone(), stub.clone(), Arc::new(move |v| {
            p.write("focus", v).ok();
        }));

        assert!(svc.tick());
        assert_eq!(pool.get_opt_bool("focus.is_focused"), Some(true));
        assert!(!svc.tick());

        stub.set_focused(Some(false));
        assert!(svc.tick());
        assert_eq!(pool.get_opt_bool("focus.is_focused"), Some(false));
    }

    #[test]
    fn test_no_window_is_unknown() {
        let stub = Arc::new(StubPlatform::new());
        let pool = StatePool::with_defaults();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s2 = Arc::clone(&seen);
        let svc = FocusService::new(pool, stub, Arc::new(move |v| s2.lock().push(v)));
        assert!(svc.tick());
        assert_eq!(seen.lock()[0]["is_focused"], Value::Null);
    }
}
