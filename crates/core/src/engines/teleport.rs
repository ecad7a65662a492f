use std::time::Duration;

use serde_json::json;

use super::dashboard::{Dashboard, DashboardData};
use super::stabilize::{self, Anchors, StabilizeData};
use super::ui_guard::UiGuard;
use super::{EngineCtx, StepOutcome};
use crate::hud::Severity;
use crate::snapshot::Snapshot;
use crate::vision::parts;

/// A teleport target and the dashboard page it sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TeleportLocation {
    pub id: &'static str,
    pub category: &'static str,
    pub container: Option<&'static str>,
}

#[derive(Debug, Clone)]
pub struct TeleportData {
    pub dashboard: DashboardData,
    pub tab_button: Vec<String>,
    pub tab_init: Vec<String>,
    pub thr: f64,
    pub step_timeout_ms: u64,
    /// How long the dashboard may stay up after the location click.
    pub launch_timeout_ms: u64,
    pub locations: &'static [TeleportLocation],
    pub max_attempts: i64,
}

impl TeleportData {
    pub fn location(&self, id: &str) -> Option<&TeleportLocation> {
        self.locations.iter().find(|l| l.id == id)
    }
}

fn category_parts(cat: &str, file: &str) -> Vec<String> {
    parts(&["<lang>", "teleport", cat, &format!("{}.png", file)])
}

fn container_parts(cat: &str, container: &str, file: &str) -> Vec<String> {
    parts(&["<lang>", "teleport", cat, container, &format!("{}.png", file)])
}

struct Porter<'a> {
    ctx: &'a EngineCtx,
    data: &'a TeleportData,
    dash: Dashboard<'a>,
}

impl Porter<'_> {
    fn timeout(&self) -> Duration {
        Duration::from_millis(self.data.step_timeout_ms)
    }

    fn fail(&self, text: &str) -> bool {
        self.ctx.status("tp", Severity::Err, text);
        self.dash.close();
        false
    }

    fn attempt(&self, loc: &TeleportLocation) -> bool {
        let thr = self.data.thr;
        if !self.dash.open_fresh() {
            return false;
        }
        if !self.dash.enter(&self.data.tab_button, &self.data.tab_init, thr, self.timeout()) {
            return self.fail("teleport tab did not open");
        }
        let cat = loc.category;
        let (button, init) = (category_parts(cat, cat), category_parts(cat, &format!("{}_init", cat)));
        if !self.dash.enter(&button, &init, thr, self.timeout()) {
            return self.fail(&format!("category '{}' did not open", cat));
        }
        let target = match loc.container {
            Some(c) => {
                let (button, init) = (container_parts(cat, c, c), container_parts(cat, c, &format!("{}_init", c)));
                if !self.dash.enter(&button, &init, thr, self.timeout()) {
                    return self.fail(&format!("'{}' did not open", c));
                }
                container_parts(cat, c, loc.id)
            }
            None => category_parts(cat, loc.id),
        };
        if !self.dash.click(&target, thr) {
            return self.fail(&format!("location '{}' not found", loc.id));
        }
        self.ctx.status("tp", Severity::Ok, &format!("teleporting to {}", loc.id));

        let init = &self.data.dashboard.init;
        let gone = self.ctx.wait_gone(
            super::dashboard::ENGINE,
            &crate::vision::Zone::fullscreen(),
            init,
            self.data.dashboard.init_thr,
            Duration::from_millis(self.data.launch_timeout_ms),
            Duration::from_millis(50),
        );
        if !gone {
            return self.fail("teleport did not start");
        }
        true
    }
}

fn exhausted(ctx: &EngineCtx, data: &TeleportData, guard: Option<&UiGuard>) {
    let n = ctx.pool.bump_attempts("teleport");
    if n >= data.max_attempts {
        ctx.status("tp", Severity::Att, &format!("{} failed attempts, unstuck", n));
        if let Some(guard) = guard {
            guard.run_unstuck();
        }
        ctx.pool.set_attempts("teleport", 0);
        ctx.pool.write("features.stabilize", json!({ "pending": false })).ok();
    }
}

/// Teleport step. A successful jump leaves stabilization pending; while it is
/// pending the step only retries stabilization.
pub fn run(
    ctx: &EngineCtx,
    data: &TeleportData,
    stab: &StabilizeData,
    anchors: &Anchors,
    snap: &Snapshot,
    guard: Option<&UiGuard>,
) -> StepOutcome {
    let pool = &ctx.pool;
    if !snap.has_window || pool.feature_paused("teleport") {
        return (false, false);
    }
    if snap.alive == Some(false) {
        ctx.status("tp", Severity::Err, "player is dead, teleport skipped");
        return (false, true);
    }
    let method = pool.get_str("features.teleport.method", "dashboard").trim().to_lowercase();
    if !method.is_empty() && method != "dashboard" {
        ctx.status("tp", Severity::Err, &format!("teleport method '{}' is not supported", method));
        return (false, true);
    }
    let category = pool.get_str("features.teleport.category", "").trim().to_string();
    let location = pool.get_str("features.teleport.location", "").trim().to_string();
    if category.is_empty() || location.is_empty() {
        ctx.status("tp", Severity::Att, "pick a teleport category and location");
        pool.set_attempts("teleport", 0);
        return (true, true);
    }
    let Some(loc) = data.location(&location) else {
        ctx.status("tp", Severity::Err, &format!("unknown location '{}'", location));
        pool.set_attempts("teleport", 0);
        return (true, true);
    };

    if !pool.get_bool("features.stabilize.pending", false) {
        let porter = Porter { ctx, data, dash: Dashboard::new(ctx, &data.dashboard, "tp") };
        if !porter.attempt(loc) {
            exhausted(ctx, data, guard);
            return (false, false);
        }
        ctx.status("tp", Severity::Succ, "teleport started");
        pool.write("features.stabilize", json!({ "pending": true })).ok();
    }

    if !stabilize::run(ctx, stab, anchors, loc.id) {
        exhausted(ctx, data, guard);
        return (false, false);
    }
    pool.write("features.stabilize", json!({ "pending": false })).ok();
    pool.set_attempts("teleport", 0);
    (true, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::testkit::{draw, erase, kit_with_hook, Kit};
    use crate::engines::{dashboard, stabilize, ui_guard};
    use crate::rules::boh::data::TELEPORT_MAX_ATTEMPTS;
    use crate::vision::testutil::texture;

    const LOCATIONS: [TeleportLocation; 2] = [
        TeleportLocation { id: "DragonValley", category: "towns", container: Some("Giran") },
        TeleportLocation { id: "Cruma", category: "hotspots", container: None },
    ];

    fn data() -> TeleportData {
        TeleportData {
            dashboard: dashboard::tests::data(),
            tab_button: parts(&["<lang>", "main", "dashboard_teleport_button.png"]),
            tab_init: parts(&["<lang>", "teleport", "dashboard_teleport_init.png"]),
            thr: 0.85,
            step_timeout_ms: 300,
            launch_timeout_ms: 300,
            locations: &LOCATIONS,
            max_attempts: TELEPORT_MAX_ATTEMPTS,
        }
    }

    const TPL: &str = "dashboard/boh/rus";

    /// Dashboard at (50, 50) toggles on altB. Clicks walk the pages: tab,
    /// category, container; the fourth click launches and closes everything.
    fn game() -> Kit {
        let k = kit_with_hook(|stub, _| {
            let mut clicks = 0;
            Box::new(move |line: &str| match line {
                "altB" => draw(&stub, &texture(24, 16, 61), 50, 50),
                "l" => {
                    clicks += 1;
                    match clicks {
                        1 => draw(&stub, &texture(24, 16, 63), 50, 100),
                        2 => draw(&stub, &texture(24, 16, 65), 100, 100),
                        3 => draw(&stub, &texture(24, 16, 67), 150, 100),
                        4 => erase(&stub, 50, 50),
                        // stabilization clicks pin the target
                        _ => draw(&stub, &texture(24, 16, 69), 390, 30),
                    }
                }
                _ => {}
            })
        });
        k.ship(&format!("{}/main/dashboard_init.png", TPL), 61);
        k.show(&format!("{}/main/dashboard_teleport_button.png", TPL), 62, 100, 50);
        k.ship(&format!("{}/teleport/dashboard_teleport_init.png", TPL), 63);
        k.show(&format!("{}/teleport/towns/towns.png", TPL), 64, 50, 150);
        k.ship(&format!("{}/teleport/towns/towns_init.png", TPL), 65);
        k.show(&format!("{}/teleport/towns/Giran/Giran.png", TPL), 66, 100, 150);
        k.ship(&format!("{}/teleport/towns/Giran/Giran_init.png", TPL), 67);
        k.show(&format!("{}/teleport/towns/Giran/DragonValley.png", TPL), 68, 150, 150);
        k.ship("stabilize/boh/common/interface/target_init.png", 69);
        k.ctx.pool.write("player", json!({ "alive": true, "hp_ratio": 1.0 })).unwrap();
        k
    }

    #[test]
    fn test_walks_pages_and_stabilizes() {
        let k = game();
        k.ctx.pool.write("features.teleport", json!({ "category": "towns", "location": "DragonValley" })).unwrap();
        let snap = Snapshot::build(&k.ctx.pool);
        let out = run(&k.ctx, &data(), &stabilize::tests::data(), &Anchors::default(), &snap, None);
        assert_eq!(out, (true, true));
        let cursor = k.stub.cursor_log();
        assert_eq!(&cursor[..4], &[(112, 58), (62, 158), (112, 158), (162, 158)]);
        assert!(!k.ctx.pool.get_bool("features.stabilize.pending", true));
        assert!(k.hud.contains("stabilize ok"));
    }

    #[test]
    fn test_missing_choice_or_unknown_location_skips() {
        let k = game();
        let snap = Snapshot::build(&k.ctx.pool);
        let stab = stabilize::tests::data();
        assert_eq!(run(&k.ctx, &data(), &stab, &Anchors::default(), &snap, None), (true, true));
        k.ctx.pool.write("features.teleport", json!({ "category": "towns", "location": "Atlantis" })).unwrap();
        assert_eq!(run(&k.ctx, &data(), &stab, &Anchors::default(), &snap, None), (true, true));
        assert!(k.hud.contains("unknown location"));
        assert!(k.log.lines().is_empty());
    }

    #[test]
    fn test_pending_stabilization_skips_the_jump() {
        let k = game();
        k.ctx.pool.write("features.teleport", json!({ "category": "towns", "location": "DragonValley" })).unwrap();
        k.ctx.pool.write("features.stabilize", json!({ "pending": true })).unwrap();
        draw(&k.stub, &texture(24, 16, 69), 390, 30);
        let snap = Snapshot::build(&k.ctx.pool);
        let out = run(&k.ctx, &data(), &stabilize::tests::data(), &Anchors::default(), &snap, None);
        assert_eq!(out, (true, true));
        assert_eq!(k.log.lines(), vec!["esc"]);
    }

    #[test]
    fn test_unstuck_only_on_tenth_failure() {
        assert_eq!(crate::rules::boh::data::teleport().max_attempts, 10);
        let k = game();
        let guard = UiGuard::new(k.ctx.clone(), ui_guard::tests::data());
        // the hotspots page is never shipped, so every jump fails
        k.ctx.pool.write("features.teleport", json!({ "category": "hotspots", "location": "Cruma" })).unwrap();
        k.ctx.pool.set_attempts("teleport", 8);
        let stab = stabilize::tests::data();

        let snap = Snapshot::build(&k.ctx.pool);
        assert_eq!(run(&k.ctx, &data(), &stab, &Anchors::default(), &snap, Some(&guard)), (false, false));
        assert_eq!(k.ctx.pool.attempts("teleport"), 9);
        assert!(!k.log.contains("enter /unstuck"));

        let snap = Snapshot::build(&k.ctx.pool);
        assert_eq!(run(&k.ctx, &data(), &stab, &Anchors::default(), &snap, Some(&guard)), (false, false));
        assert!(k.log.contains("enter /unstuck"));
        assert_eq!(k.ctx.pool.attempts("teleport"), 0);
    }
}
