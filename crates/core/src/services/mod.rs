//! Background services. Each one owns a worker thread with a stop token and
//! publishes what it measures through a callback; the wiring layer owns
//! `services.<name>.running`.

pub mod autofarm;
pub mod focus;
pub mod macros_repeat;
pub mod vitals;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;

use crate::logger;
use crate::sleep::sleep_until_stopped;

/// Receives a service's measurement (`{hp_ratio, ts}`, `{is_focused, ts}`, ...).
pub type Publish = Arc<dyn Fn(Value) + Send + Sync>;

/// Common lifecycle of every service.
pub trait Service: Send + Sync {
    /// Key under `services.`.
    fn name(&self) -> &'static str;
    fn start(&self, poll: Duration);
    fn stop(&self);
    fn is_running(&self) -> bool;
}

/// One named thread running `tick` every `period` until stopped.
pub struct Worker {
    name: &'static str,
    stop: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Worker {
    pub fn new(name: &'static str) -> Self {
        Self { name, stop: Arc::new(AtomicBool::new(false)), handle: Mutex::new(None) }
    }

    /// Spawn the loop. A second start while running is a no-op.
    pub fn start(&self, period: Duration, mut tick: impl FnMut(&AtomicBool) + Send + 'static) -> bool {
        let mut handle = self.handle.lock();
        if handle.as_ref().map_or(false, |h| !h.is_finished()) {
            return false;
        }
        self.stop.store(false, Ordering::Release);
        let stop = Arc::clone(&self.stop);
        let spawned = thread::Builder::new().name(self.name.to_string()).spawn(move || {
            while !stop.load(Ordering::Acquire) {
                tick(&stop);
                if !sleep_until_stopped(period, &stop) {
                    break;
                }
            }
        });
        match spawned {
            Ok(h) => {
                *handle = Some(h);
                true
            }
            Err(e) => {
                logger::error(&format!("failed to start {}: {}", self.name, e));
                false
            }
        }
    }

    /// Signal the stop token and join the thread.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Release);
        let handle = self.handle.lock().take();
        if let Some(h) = handle {
            if h.thread().id() != thread::current().id() {
                h.join().ok();
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.lock().as_ref().map_or(false, |h| !h.is_finished())
    }

    pub fn stop_token(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.stop();
    }
}
