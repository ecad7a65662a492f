use serde_json::Value;

use crate::pool::{StatePool, ALIVE_EPSILON};
use crate::sleep::mono_now;
use crate::types::WindowInfo;

static NULL: Value = Value::Null;

fn at<'a>(tree: &'a Value, path: &str) -> &'a Value {
    path.split('.').fold(tree, |cur, k| cur.get(k).unwrap_or(&NULL))
}

/// Immutable projection of the pool, built once per orchestrator tick.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub window: Option<WindowInfo>,
    pub has_window: bool,
    pub alive: Option<bool>,
    pub hp_ratio: Option<f64>,
    pub is_focused: Option<bool>,
    /// Seconds since the window lost focus; 0 while focused or unknown.
    pub unfocused_for_s: f64,
    pub respawn_enabled: bool,
    pub buff_enabled: bool,
    pub macros_enabled: bool,
    pub teleport_enabled: bool,
    pub record_enabled: bool,
    pub autofarm_enabled: bool,
    pub pipeline_active: bool,
    pub pipeline_idx: usize,
    pub pipeline_order: Vec<String>,
    pub server: String,
    pub language: String,
}

impl Snapshot {
    pub fn build(pool: &StatePool) -> Self {
        let tree = pool.clone_tree();
        let flag = |path: &str| at(&tree, path).as_bool().unwrap_or(false);

        let window = WindowInfo::from_value(at(&tree, "window.info"));
        let is_focused = at(&tree, "focus.is_focused").as_bool();
        let unfocused_for_s = match is_focused {
            Some(false) => (mono_now() - at(&tree, "focus.ts").as_f64().unwrap_or(0.0)).max(0.0),
            _ => 0.0,
        };
        let order = at(&tree, "pipeline.order")
            .as_array()
            .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default();

        Self {
            has_window: window.is_some(),
            window,
            alive: at(&tree, "player.alive").as_bool(),
            hp_ratio: at(&tree, "player.hp_ratio").as_f64(),
            is_focused,
            unfocused_for_s,
            respawn_enabled: flag("features.respawn.enabled"),
            buff_enabled: flag("features.buff.enabled"),
            macros_enabled: flag("features.macros.enabled"),
            teleport_enabled: flag("features.teleport.enabled"),
            record_enabled: flag("features.record.enabled"),
            autofarm_enabled: flag("features.autofarm.enabled"),
            pipeline_active: flag("pipeline.active"),
            pipeline_idx: at(&tree, "pipeline.idx").as_u64().unwrap_or(0) as usize,
            pipeline_order: order,
            server: at(&tree, "config.server").as_str().unwrap_or("boh").to_lowercase(),
            language: at(&tree, "config.language").as_str().unwrap_or("rus").to_lowercase(),
        }
    }

    /// Dead by either the derived flag or the raw ratio.
    pub fn is_dead(&self) -> bool {
        self.alive == Some(false) || self.hp_ratio.map_or(false, |r| r <= ALIVE_EPSILON)
    }

    pub fn feature_enabled(&self, name: &str) -> bool {
        match name {
            "respawn" => self.respawn_enabled,
            "buff" => self.buff_enabled,
            "macros" => self.macros_enabled,
            "teleport" => self.teleport_enabled,
            "record" => self.record_enabled,
            "autofarm" => self.autofarm_enabled,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_snapshot_reads_window_and_vitals() {
        let pool = StatePool::with_defaults();
        pool.write("window", json!({ "info": { "x": 10, "y": 20, "width": 800, "height": 600, "hwnd": 7 } }))
            .unwrap();
        pool.write("player", json!({ "alive": false, "hp_ratio": 0.0 })).unwrap();
        let snap = Snapshot::build(&pool);
        assert!(snap.has_window);
        assert_eq!(snap.window.unwrap().hwnd, 7);
        assert!(snap.is_dead());
        assert_eq!(snap.pipeline_order[0], "respawn");
    }

    #[test]
    fn test_unknown_vitals_are_not_dead() {
        let pool = StatePool::with_defaults();
        let snap = Snapshot::build(&pool);
        assert!(!snap.is_dead());
        assert!(!snap.has_window);
        assert_eq!(snap.unfocused_for_s, 0.0);
    }
}
