use rand::Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;
use std::thread;
use std::time::{Duration, Instant};

static EPOCH: OnceLock<Instant> = OnceLock::new();

/// Seconds on a process-wide monotonic clock. Used for every `ts` in the pool.
pub fn mono_now() -> f64 {
    EPOCH.get_or_init(Instant::now).elapsed().as_secs_f64()
}

/// Sleep for `secs` seconds with +/-30% random jitter.
pub fn sleep_jitter(secs: f64) {
    let jitter = secs * 0.3;
    let actual = if jitter > 0.0 {
        secs + rand::thread_rng().gen_range(-jitter..jitter)
    } else {
        secs
    };
    thread::sleep(Duration::from_secs_f64(actual.max(0.01)));
}

/// Sleep for exact milliseconds (no jitter).
pub fn sleep_ms(ms: u64) {
    thread::sleep(Duration::from_millis(ms));
}

/// Sleep up to `total`, waking every 50 ms to check `stop`.
/// Returns false when interrupted.
pub fn sleep_until_stopped(total: Duration, stop: &AtomicBool) -> bool {
    let end = Instant::now() + total;
    loop {
        if stop.load(Ordering::Acquire) {
            return false;
        }
        let now = Instant::now();
        if now >= end {
            return true;
        }
        thread::sleep((end - now).min(Duration::from_millis(50)));
    }
}
