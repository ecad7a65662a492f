//! Auto-farm combat loop: acquire a target (`/targetnext`, on-screen name
//! templates, `/target <name>`), cycle attack skills until it dies, repeat.

pub mod engine;
pub mod skills;
pub mod vision;
pub mod zones;

use serde_json::{Map, Value};

pub use engine::{run_cycle, CycleControl, CycleEnd, FarmState};
pub use skills::{Skill, SkillPlanner};
pub use zones::{FarmZone, Monster, ZoneRepo};

use super::{EngineCtx, StepOutcome};
use crate::hud::Severity;
use crate::pool::StatePool;
use crate::services::autofarm::AutofarmService;
use crate::snapshot::Snapshot;
use crate::vision::colors::Rgb;
use crate::vision::Zone;

pub const ENGINE: &str = "autofarm";

/// Per-server numbers for the farm loop.
#[derive(Debug, Clone)]
pub struct AutofarmData {
    pub target_zone: Zone,
    pub alive_palette: &'static [Rgb],
    pub dead_palette: &'static [Rgb],
    pub hp_tol: u8,
    pub band_min_w: u32,
    pub band_min_h: u32,
    pub alive_min_px: usize,

    pub unvisible_zone: Zone,
    pub unvisible_thr: f64,

    pub friend_palette: &'static [Rgb],
    pub enemy_palette: &'static [Rgb],
    pub neutral_palette: &'static [Rgb],
    pub ring_pad: u32,
    pub ring_tol: u8,
    pub ring_min_px: usize,
    pub monster_thr: f64,

    pub targetnext_wait_ms: u64,
    pub name_settle_ms: u64,
    pub probe_tries: u32,
    pub probe_delay_ms: u64,
    pub empty_frame_retries: u32,
    pub empty_frame_delay_ms: u64,
    pub hover_ms: u64,
    pub template_settle_ms: u64,
    /// Body sits this far below the name plate.
    pub body_offset_y: i32,
    pub above_offset_y: i32,
    pub attack_timeout_ms: u64,
    pub restart_streak: u32,
    pub unstuck_wait_ms: u64,
    pub iteration_gap_ms: u64,
}

/// Normalized `features.autofarm.config`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FarmConfig {
    pub mode: String,
    pub profession: String,
    pub zone: String,
    pub skills: Vec<Skill>,
    pub monsters: Vec<String>,
}

fn non_empty(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
        _ => true,
    }
}

impl FarmConfig {
    /// `features.autofarm.config` overlaid with non-empty top-level keys of
    /// `features.autofarm` (older prefs stored them flat).
    pub fn from_pool(pool: &StatePool) -> Self {
        let node = pool.get("features.autofarm", Value::Null);
        let mut merged = match node.get("config") {
            Some(Value::Object(m)) => m.clone(),
            _ => Map::new(),
        };
        for key in ["profession", "skills", "zone", "monsters"] {
            if let Some(v) = node.get(key).filter(|v| non_empty(v)) {
                merged.insert(key.to_string(), v.clone());
            }
        }
        let text = |k: &str| merged.get(k).and_then(Value::as_str).unwrap_or("").trim().to_string();
        let skills = match merged.get("skills") {
            Some(Value::Array(items)) => items.iter().filter_map(Skill::from_value).collect(),
            _ => Vec::new(),
        };
        let monsters = match merged.get("monsters") {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            _ => Vec::new(),
        };
        let mode = match node.get("mode").and_then(Value::as_str).map(str::trim) {
            Some("manual") => "manual",
            _ => "auto",
        };
        Self {
            mode: mode.to_string(),
            profession: text("profession"),
            zone: text("zone"),
            skills,
            monsters,
        }
    }
}

/// Pipeline step: kick one cycle in `auto` mode; `manual` runs on its own.
pub fn run(ctx: &EngineCtx, snap: &Snapshot, svc: Option<&AutofarmService>) -> StepOutcome {
    if !snap.has_window || ctx.pool.feature_paused(ENGINE) {
        return (false, false);
    }
    if snap.alive == Some(false) {
        return (false, true);
    }
    if !snap.autofarm_enabled {
        return (true, true);
    }
    let Some(svc) = svc else {
        ctx.status(ENGINE, Severity::Err, "auto-farm service is not running");
        return (false, true);
    };
    if FarmConfig::from_pool(&ctx.pool).mode == "manual" {
        ctx.status(ENGINE, Severity::Ok, "auto-farm runs in manual mode");
        return (true, true);
    }
    svc.run_once_now();
    ctx.status(ENGINE, Severity::Ok, "auto-farm started");
    (true, true)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;

    pub const ALIVE: [Rgb; 5] = [(139, 98, 96), (128, 70, 68), (111, 23, 19), (136, 28, 24), (171, 48, 34)];
    pub const DEAD: [Rgb; 5] = [(70, 61, 62), (61, 49, 50), (48, 28, 27), (57, 32, 31), (67, 38, 36)];
    pub const FRIEND: [Rgb; 2] = [(16, 69, 131), (46, 99, 161)];
    pub const ENEMY: [Rgb; 2] = [(169, 30, 0), (239, 138, 114)];
    pub const NEUTRAL: [Rgb; 2] = [(66, 61, 57), (132, 128, 123)];

    pub fn data() -> AutofarmData {
        AutofarmData {
            target_zone: Zone::centered_x(500, 120, 1),
            alive_palette: &ALIVE,
            dead_palette: &DEAD,
            hp_tol: 2,
            band_min_w: 40,
            band_min_h: 3,
            alive_min_px: 5,
            unvisible_zone: Zone::ltwh(22, 340, 93, 40),
            unvisible_thr: 0.40,
            friend_palette: &FRIEND,
            enemy_palette: &ENEMY,
            neutral_palette: &NEUTRAL,
            ring_pad: 20,
            ring_tol: 3,
            ring_min_px: 20,
            monster_thr: 0.84,
            targetnext_wait_ms: 10,
            name_settle_ms: 10,
            probe_tries: 2,
            probe_delay_ms: 10,
            empty_frame_retries: 2,
            empty_frame_delay_ms: 10,
            hover_ms: 10,
            template_settle_ms: 10,
            body_offset_y: 30,
            above_offset_y: 10,
            attack_timeout_ms: 400,
            restart_streak: 3,
            unstuck_wait_ms: 10,
            iteration_gap_ms: 10,
        }
    }

    #[test]
    fn test_config_merges_flat_keys() {
        let pool = StatePool::with_defaults();
        pool.write(
            "features.autofarm",
            json!({
                "mode": "manual",
                "config": { "zone": "varka", "skills": [{ "key": "4x", "slug": "wind_strike" }] },
                "monsters": ["orc_archer", "  "],
                "zone": "",
            }),
        )
        .unwrap();
        let cfg = FarmConfig::from_pool(&pool);
        assert_eq!(cfg.mode, "manual");
        assert_eq!(cfg.zone, "varka");
        assert_eq!(cfg.monsters, vec!["orc_archer"]);
        assert_eq!(cfg.skills.len(), 1);
        assert_eq!(cfg.skills[0].key, "4");
    }

    #[test]
    fn test_unknown_mode_falls_back_to_auto() {
        let pool = StatePool::with_defaults();
        pool.write("features.autofarm", json!({ "mode": "turbo" })).unwrap();
        assert_eq!(FarmConfig::from_pool(&pool).mode, "auto");
    }
}
