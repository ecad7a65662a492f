use std::time::{Duration, Instant};

use super::{EngineCtx, StepOutcome};
use crate::hud::Severity;
use crate::services::macros_repeat::{rows_from_pool, MacrosRepeatService};
use crate::sleep::sleep_ms;
use crate::snapshot::Snapshot;

fn aborted(ctx: &EngineCtx) -> bool {
    !ctx.pool.get_bool("features.macros.enabled", false) || ctx.pool.feature_paused("macros")
}

/// Wait out a cast; false when the feature was switched off or paused meanwhile.
fn cast_wait(ctx: &EngineCtx, secs: u32) -> bool {
    let deadline = Instant::now() + Duration::from_secs(secs as u64);
    while Instant::now() < deadline {
        if aborted(ctx) {
            return false;
        }
        sleep_ms(50);
    }
    true
}

/// Macro step: press every row once, waiting each row's cast time. Restarts
/// the repeat timers on success.
pub fn run(ctx: &EngineCtx, snap: &Snapshot, repeat: Option<&MacrosRepeatService>) -> StepOutcome {
    if ctx.pool.feature_paused("macros") || snap.is_focused == Some(false) {
        return (false, false);
    }
    if snap.alive == Some(false) {
        return (false, true);
    }
    let rows = rows_from_pool(&ctx.pool);
    if rows.is_empty() {
        ctx.status("macros", Severity::Att, "no macro rows");
        return (false, true);
    }

    let total = rows.len();
    let mut all_sent = true;
    for (i, row) in rows.iter().enumerate() {
        if aborted(ctx) {
            ctx.status("macros", Severity::Att, "macros interrupted");
            return (false, false);
        }
        ctx.status("macros", Severity::Ok, &format!("macro {}/{}", i + 1, total));
        all_sent &= ctx.controller.send(&row.key);
        if !cast_wait(ctx, row.cast_s) {
            ctx.status("macros", Severity::Att, "macros interrupted");
            return (false, false);
        }
    }
    if !all_sent {
        ctx.status("macros", Severity::Err, "macro keys not delivered");
        return (false, false);
    }
    if let Some(repeat) = repeat {
        repeat.bump_all();
    }
    ctx.status("macros", Severity::Succ, "macros done");
    (true, true)
}
