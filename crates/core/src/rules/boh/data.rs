//! Tables for the `boh` server: zones, palettes, template names, timings.

use crate::engines::autofarm::AutofarmData;
use crate::engines::buff::BuffData;
use crate::engines::dashboard::DashboardData;
use crate::engines::respawn::RespawnData;
use crate::engines::stabilize::StabilizeData;
use crate::engines::teleport::{TeleportData, TeleportLocation};
use crate::engines::ui_guard::UiGuardData;
use crate::services::vitals::VitalsConfig;
use crate::vision::colors::Rgb;
use crate::vision::matcher::SCALES;
use crate::vision::{parts, Zone, ZoneSpec};

pub const LANGUAGES: [&str; 2] = ["rus", "eng"];

// Player HP bar, top-left status window.
pub const HP_ALIVE: [Rgb; 10] = [
    (130, 87, 80),
    (142, 96, 92),
    (130, 77, 70),
    (127, 62, 56),
    (125, 53, 44),
    (121, 28, 17),
    (137, 32, 21),
    (148, 37, 24),
    (162, 44, 31),
    (162, 52, 40),
];
pub const HP_DEAD: [Rgb; 8] = [
    (64, 52, 48),
    (69, 60, 57),
    (59, 45, 45),
    (52, 36, 34),
    (56, 32, 28),
    (61, 37, 32),
    (67, 41, 36),
    (71, 42, 37),
];

// Target frame HP bar.
pub const MOB_ALIVE: [Rgb; 5] = [(139, 98, 96), (128, 70, 68), (111, 23, 19), (136, 28, 24), (171, 48, 34)];
pub const MOB_DEAD: [Rgb; 5] = [(70, 61, 62), (61, 49, 50), (48, 28, 27), (57, 32, 31), (67, 38, 36)];

// Dots around a name plate.
pub const FRIEND: [Rgb; 6] = [(16, 69, 131), (21, 74, 136), (25, 77, 138), (32, 82, 143), (32, 85, 147), (46, 99, 161)];
pub const ENEMY: [Rgb; 6] = [(169, 30, 0), (183, 58, 23), (196, 69, 32), (204, 89, 58), (221, 100, 73), (239, 138, 114)];
pub const NEUTRAL: [Rgb; 6] =
    [(66, 61, 57), (75, 70, 66), (91, 86, 82), (107, 103, 98), (121, 116, 112), (132, 128, 123)];

pub const BUFF_MODES: [&str; 4] = ["profile", "fighter", "mage", "archer"];
pub const BUFF_ICONS: [(&str, &[&str]); 3] = [
    ("buffs", &["mental_shield"]),
    ("dances", &["dance_of_concentration", "dance_of_siren"]),
    ("songs", &["song_of_earth", "song_of_vitality"]),
];

pub const TELEPORT_CATEGORIES: [&str; 3] = ["towns", "villages", "hotspots"];
pub const LOCATIONS: [TeleportLocation; 3] = [
    TeleportLocation { id: "VarkaSilenosStronghold", category: "towns", container: Some("Goddard") },
    TeleportLocation { id: "PrimevalIsle", category: "towns", container: Some("Rune") },
    TeleportLocation { id: "DragonValley", category: "towns", container: Some("Giran") },
];

pub const UI_PAGES: [&str; 11] = [
    "dashboard_page",
    "inventory_page",
    "skills_page",
    "map_page",
    "map_page2",
    "quest_page",
    "status_page",
    "clan_page",
    "menu_page",
    "actions_page",
    "macros_page",
];

/// Failed buff passes before `/unstuck`.
pub const MAX_ATTEMPTS: i64 = 5;
/// Failed teleports (jump or stabilization) before `/unstuck`.
pub const TELEPORT_MAX_ATTEMPTS: i64 = 10;

pub fn state_zone() -> Zone {
    Zone::ltrb(0, 0, 170, 63)
}

pub fn target_zone() -> Zone {
    Zone::centered_x(500, 120, 1)
}

pub fn vitals() -> VitalsConfig {
    VitalsConfig { zone: state_zone(), alive: HP_ALIVE.to_vec(), dead: HP_DEAD.to_vec(), tolerance: 1 }
}

pub fn respawn() -> RespawnData {
    RespawnData {
        zone: Zone::centered(280, 200),
        reborn_banner: parts(&["<lang>", "reborn_window.png"]),
        accept_button: parts(&["<lang>", "accept_button.png"]),
        death_banner: parts(&["<lang>", "to_village_button.png"]),
    }
}

pub fn dashboard() -> DashboardData {
    DashboardData {
        init: parts(&["<lang>", "main", "dashboard_init.png"]),
        init_thr: 0.87,
        locked: vec![
            parts(&["<lang>", "main", "dashboard_is_locked_1.png"]),
            parts(&["<lang>", "main", "dashboard_is_locked_2.png"]),
        ],
        locked_thr: 0.82,
        open_timeout_ms: 2000,
        close_timeout_ms: 2000,
        hover_ms: 200,
        post_ms: 200,
    }
}

pub fn buff() -> BuffData {
    BuffData {
        dashboard: dashboard(),
        buffer_button: parts(&["<lang>", "main", "dashboard_buffer_button.png"]),
        buffer_init: parts(&["<lang>", "buffer", "dashboard_buffer_init.png"]),
        button_thr: 0.85,
        buffer_init_ms: 2000,
        mode_post_ms: 1000,
        restore_hp: parts(&["<lang>", "buffer", "dashboard_buffer_restoreHp.png"]),
        restore_thr: 0.85,
        current_buffs: Zone::ltwh(160, 0, 360, 130),
        verify_thr: 0.86,
        verify_scales: &SCALES,
        icons: &BUFF_ICONS,
        max_attempts: MAX_ATTEMPTS,
    }
}

pub fn teleport() -> TeleportData {
    TeleportData {
        dashboard: dashboard(),
        tab_button: parts(&["<lang>", "main", "dashboard_teleport_button.png"]),
        tab_init: parts(&["<lang>", "teleport", "dashboard_teleport_init.png"]),
        thr: 0.85,
        step_timeout_ms: 2000,
        launch_timeout_ms: 5000,
        locations: &LOCATIONS,
        max_attempts: TELEPORT_MAX_ATTEMPTS,
    }
}

pub fn stabilize() -> StabilizeData {
    StabilizeData {
        state_zone: state_zone(),
        target_zone: target_zone(),
        target_init: parts(&["common", "interface", "target_init.png"]),
        required_thr: 0.70,
        required_timeout_ms: 8000,
        cadence_ms: 100,
        anchor_thr: 0.86,
        anchor_tries: 4,
        travel_default_ms: 1500,
    }
}

pub fn ui_guard() -> UiGuardData {
    UiGuardData {
        pages: &UI_PAGES,
        close_default: "default_close_button",
        close_dashboard: "dashboard_close_button",
        wrong_word_popup: "wrong_word_popup",
        wrong_word_accept: "wrong_word_accept_button",
        disconnect_popup: "disconnect_popup",
        threshold: 0.70,
        max_waves: 10,
        close_timeout_ms: 1500,
        unstuck_wait_ms: 1000,
    }
}

pub fn autofarm() -> AutofarmData {
    AutofarmData {
        target_zone: target_zone(),
        alive_palette: &MOB_ALIVE,
        dead_palette: &MOB_DEAD,
        hp_tol: 2,
        band_min_w: 40,
        band_min_h: 3,
        alive_min_px: 5,
        // system messages, bottom-left: top = H - 260
        unvisible_zone: Zone::Decl(ZoneSpec {
            left: Some(22),
            width: Some(93),
            height: Some(40),
            bottom_offset: Some(220),
            ..Default::default()
        }),
        unvisible_thr: 0.40,
        friend_palette: &FRIEND,
        enemy_palette: &ENEMY,
        neutral_palette: &NEUTRAL,
        ring_pad: 20,
        ring_tol: 3,
        ring_min_px: 20,
        monster_thr: 0.84,
        targetnext_wait_ms: 1000,
        name_settle_ms: 400,
        probe_tries: 5,
        probe_delay_ms: 100,
        empty_frame_retries: 10,
        empty_frame_delay_ms: 300,
        hover_ms: 150,
        template_settle_ms: 300,
        body_offset_y: 30,
        above_offset_y: 10,
        attack_timeout_ms: 10_000,
        restart_streak: 10,
        unstuck_wait_ms: 1000,
        iteration_gap_ms: 100,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::WindowInfo;

    #[test]
    fn test_unvisible_zone_sits_above_bottom() {
        let win = WindowInfo { x: 0, y: 0, width: 1024, height: 768, hwnd: 1 };
        let r = autofarm().unvisible_zone.compute(&win);
        assert_eq!((r.l, r.t, r.w, r.h), (22, 768 - 260, 93, 40));
    }

    #[test]
    fn test_every_location_has_a_known_category() {
        for loc in LOCATIONS {
            assert!(TELEPORT_CATEGORIES.contains(&loc.category), "{}", loc.id);
        }
        assert!(teleport().location("PrimevalIsle").is_some());
    }

    #[test]
    fn test_icon_lookup_by_token() {
        let b = buff();
        assert_eq!(
            b.icon_parts("dance_of_siren"),
            Some(parts(&["common", "buffer", "icons", "dances", "dance_of_siren.png"]))
        );
        assert_eq!(b.icon_parts("haste"), None);
    }
}
