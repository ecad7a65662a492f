//! Post-teleport stabilization: pin the own character as target, then
//! optionally walk to an anchor NPC so the camera settles.

use std::collections::HashMap;
use std::path::Path;
use std::time::{Duration, Instant};

use serde::Deserialize;
use serde_json::Value;

use super::{target_steps, EngineCtx};
use crate::flow::run_flow;
use crate::hud::Severity;
use crate::logger;
use crate::sleep::sleep_ms;
use crate::vision::Zone;

pub const ENGINE: &str = "stabilize";

#[derive(Debug, Clone)]
pub struct StabilizeData {
    pub state_zone: Zone,
    pub target_zone: Zone,
    pub target_init: Vec<String>,
    pub required_thr: f64,
    pub required_timeout_ms: u64,
    pub cadence_ms: u64,
    pub anchor_thr: f64,
    pub anchor_tries: u32,
    pub travel_default_ms: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnchorEntry {
    #[serde(default)]
    pub anchor: HashMap<String, String>,
    #[serde(default)]
    pub rus: Option<String>,
    #[serde(default)]
    pub eng: Option<String>,
    #[serde(default)]
    pub travel_time: Option<u64>,
}

/// `anchors.json`: per location an NPC name per language and a travel time.
/// Accepts `{"location": {...}}` or the location map at the root.
#[derive(Debug, Clone, Default)]
pub struct Anchors {
    locations: HashMap<String, AnchorEntry>,
}

impl Anchors {
    pub fn from_value(v: &Value) -> Self {
        let map = v.get("location").filter(|l| l.is_object()).unwrap_or(v);
        let locations = match serde_json::from_value::<HashMap<String, AnchorEntry>>(map.clone()) {
            Ok(m) => m,
            Err(e) => {
                logger::warn_p("stabilize", &format!("bad anchors: {}", e));
                HashMap::new()
            }
        };
        Self { locations }
    }

    /// Missing file means no anchors.
    pub fn load(path: &Path) -> Self {
        let Ok(text) = std::fs::read_to_string(path) else {
            return Self::default();
        };
        match serde_json::from_str::<Value>(&text) {
            Ok(v) => Self::from_value(&v),
            Err(e) => {
                logger::warn_p("stabilize", &format!("{}: {}", path.display(), e));
                Self::default()
            }
        }
    }

    /// Anchor name for `lang` and the travel time in ms.
    pub fn for_location(&self, location: &str, lang: &str, default_travel_ms: u64) -> Option<(String, u64)> {
        let entry = self.locations.get(location)?;
        let key = if lang.starts_with("ru") { "rus" } else { "eng" };
        let inline = if key == "rus" { entry.rus.as_ref() } else { entry.eng.as_ref() };
        let name = entry.anchor.get(key).or(inline)?.trim().to_string();
        if name.is_empty() {
            return None;
        }
        Some((name, entry.travel_time.unwrap_or(default_travel_ms)))
    }
}

struct Stabilizer<'a> {
    ctx: &'a EngineCtx,
    data: &'a StabilizeData,
}

impl Stabilizer<'_> {
    fn target_pinned(&self, thr: f64) -> bool {
        self.ctx.visible(ENGINE, &self.data.target_zone, &self.data.target_init, thr)
    }

    fn press(&self, cmd: &str, after_ms: u64) {
        self.ctx.controller.send(cmd);
        sleep_ms(after_ms);
    }

    /// Click the own status bar until the target frame shows, then Esc.
    fn required(&self) -> bool {
        let deadline = Instant::now() + Duration::from_millis(self.data.required_timeout_ms.max(1000));
        while Instant::now() < deadline {
            if self.target_pinned(self.data.required_thr) {
                self.press("esc", 200);
                return true;
            }
            let Some(win) = self.ctx.window() else { return false };
            let r = self.data.state_zone.compute(&win);
            self.ctx.controller.click_at(win.to_screen((r.cx, r.cy)));
            sleep_ms(80);
            sleep_ms(self.data.cadence_ms);
        }
        false
    }

    fn optional(&self, name: &str, travel_ms: u64) -> bool {
        let ru = self.ctx.pool.language().starts_with("ru");
        let flow = self.ctx.flow(ENGINE);
        let steps = target_steps(name, ru, 120);
        let pinned = (0..self.data.anchor_tries.max(1)).any(|_| {
            run_flow(&flow, &steps);
            sleep_ms(200);
            self.target_pinned(self.data.anchor_thr)
        });
        if !pinned {
            return false;
        }
        self.press("press_enter", 80);
        self.ctx.controller.enter_text("/attack");
        self.press("press_enter", 80);
        sleep_ms(travel_ms.max(200));
        self.press("esc", 200);
        self.press("esc", 200);
        for _ in 0..3 {
            self.press("pagedown", 120);
        }
        true
    }
}

/// Required phase, then the anchor phase when `features.stabilize.enabled`.
pub fn run(ctx: &EngineCtx, data: &StabilizeData, anchors: &Anchors, location: &str) -> bool {
    let s = Stabilizer { ctx, data };
    if !s.required() {
        ctx.status("tp", Severity::Err, "stabilize: could not pin the target");
        return false;
    }
    if ctx.pool.get_bool("features.stabilize.enabled", false) {
        let lang = ctx.pool.language();
        if let Some((name, travel_ms)) = anchors.for_location(location, &lang, data.travel_default_ms) {
            if !s.optional(&name, travel_ms) {
                ctx.status("tp", Severity::Err, "stabilize: anchor not reached");
                return false;
            }
        }
    }
    ctx.status("tp", Severity::Succ, "stabilize ok");
    true
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::engines::testkit::{draw, kit_with_hook, Kit};
    use crate::vision::{parts, testutil::texture};
    use serde_json::json;

    pub fn data() -> StabilizeData {
        StabilizeData {
            state_zone: Zone::ltwh(0, 0, 170, 63),
            target_zone: Zone::centered_x(500, 120, 1),
            target_init: parts(&["common", "interface", "target_init.png"]),
            required_thr: 0.70,
            required_timeout_ms: 1000,
            cadence_ms: 10,
            anchor_thr: 0.86,
            anchor_tries: 4,
            travel_default_ms: 1500,
        }
    }

    /// Any left click pins a target: the reticle shows at the top center.
    fn game() -> Kit {
        let k = kit_with_hook(|stub, _| {
            Box::new(move |line: &str| {
                if line == "l" {
                    draw(&stub, &texture(24, 16, 51), 390, 30);
                }
            })
        });
        k.ship("stabilize/boh/common/interface/target_init.png", 51);
        k
    }

    #[test]
    fn test_required_phase_clicks_state_center_then_esc() {
        let k = game();
        let anchors = Anchors::default();
        assert!(run(&k.ctx, &data(), &anchors, "DragonValley"));
        assert_eq!(k.stub.cursor_log(), vec![(85, 31)]);
        assert_eq!(k.log.lines(), vec!["l", "esc"]);
        assert!(k.hud.contains("stabilize ok"));
    }

    #[test]
    fn test_anchor_phase_targets_in_russian() {
        let k = game();
        k.ctx.pool.write("features.stabilize", json!({ "enabled": true })).unwrap();
        let anchors = Anchors::from_value(&json!({
            "location": { "DragonValley": { "anchor": { "rus": "Гном" }, "travel_time": 0 } }
        }));
        assert!(run(&k.ctx, &data(), &anchors, "DragonValley"));
        let lines = k.log.lines();
        assert_eq!(
            &lines[..8],
            &[
                "l",
                "esc",
                "press_enter",
                "enter_text /target ",
                "layout_toggle_altshift",
                "enter_text Uyjv",
                "press_enter",
                "layout_toggle_altshift"
            ]
        );
        assert_eq!(lines.iter().filter(|l| *l == "pagedown").count(), 3);
        assert!(lines.contains(&"enter_text /attack".to_string()));
    }

    #[test]
    fn test_anchor_lookup_forms() {
        let flat = Anchors::from_value(&json!({ "Rune": { "rus": "Гном-кузнец", "travel_time": 2200 } }));
        assert_eq!(flat.for_location("Rune", "rus", 1500), Some(("Гном-кузнец".into(), 2200)));
        assert_eq!(flat.for_location("Rune", "eng", 1500), None);
        assert_eq!(flat.for_location("Giran", "rus", 1500), None);
    }
}
