//! What the farm loop reads off the screen: the target frame's HP bar, the
//! "target not visible" warning and monster name plates with their dot ring.

use std::time::Duration;

use super::{AutofarmData, ENGINE};
use crate::engines::EngineCtx;
use crate::sleep::sleep_ms;
use crate::types::{Capture, Region};
use crate::vision::colors::{biggest_horizontal_band, count_in_ring, mask_for_colors};
use crate::vision::{parts, Zone};

/// Palette pixel counts in the ring around a name plate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RingCounts {
    pub friend: usize,
    pub enemy: usize,
    pub neutral: usize,
}

pub struct TargetVision<'a> {
    ctx: &'a EngineCtx,
    data: &'a AutofarmData,
}

impl<'a> TargetVision<'a> {
    pub fn new(ctx: &'a EngineCtx, data: &'a AutofarmData) -> Self {
        Self { ctx, data }
    }

    fn frame(&self) -> Option<Capture> {
        let win = self.ctx.window()?;
        let region = self.data.target_zone.compute(&win);
        self.ctx.vision.capture(&win, &region).ok().filter(|c| !c.is_empty())
    }

    fn read(&self, cap: &Capture) -> (bool, bool) {
        let d = self.data;
        let alive = mask_for_colors(cap, d.alive_palette, d.hp_tol);
        let dead = mask_for_colors(cap, d.dead_palette, d.hp_tol);
        let has = biggest_horizontal_band(&alive.union(&dead))
            .map_or(false, |(_, _, w, h)| w >= d.band_min_w && h >= d.band_min_h);
        (has, has && alive.count() >= d.alive_min_px)
    }

    /// `(has_target, alive)`; None when the frame could not be captured.
    pub fn probe(&self) -> Option<(bool, bool)> {
        self.frame().map(|cap| self.read(&cap))
    }

    /// Like [`probe`](Self::probe) but retries empty frames; still nothing
    /// counts as no live target.
    pub fn probe_retrying(&self) -> (bool, bool) {
        for i in 0..=self.data.empty_frame_retries {
            if let Some(r) = self.probe() {
                return r;
            }
            if i < self.data.empty_frame_retries {
                sleep_ms(self.data.empty_frame_delay_ms);
            }
        }
        (false, false)
    }

    pub fn target_alive(&self) -> Option<bool> {
        self.probe().map(|(_, alive)| alive)
    }

    /// Poll for a target frame `tries` times.
    pub fn wait_target(&self, tries: u32, delay: Duration) -> Option<(bool, bool)> {
        for i in 0..tries.max(1) {
            if let Some((true, alive)) = self.probe() {
                return Some((true, alive));
            }
            if i + 1 < tries {
                std::thread::sleep(delay);
            }
        }
        None
    }

    pub fn unvisible_warning(&self) -> bool {
        let tpl = parts(&["<lang>", "sys_messages", "target_unvisible.png"]);
        self.ctx.visible(ENGINE, &self.data.unvisible_zone, &tpl, self.data.unvisible_thr)
    }

    /// First on-screen name plate among `slugs`; templates that are not
    /// shipped are skipped.
    pub fn locate_monster(&self, slugs: &[String]) -> Option<Region> {
        let win = self.ctx.window()?;
        let scope = self.ctx.scope(ENGINE);
        let zone = Zone::fullscreen();
        slugs.iter().find_map(|slug| {
            let tpl = parts(&["<lang>", "monsters", "names", &format!("{}.png", slug)]);
            if !self.ctx.vision.template_exists(&scope, &tpl) {
                return None;
            }
            self.ctx.vision.locate(&win, &zone, &scope, &tpl, self.data.monster_thr).ok().flatten()
        })
    }

    /// Count friend, enemy and neutral dots around a name plate.
    pub fn ring(&self, plate: &Region) -> Option<RingCounts> {
        let d = self.data;
        let win = self.ctx.window()?;
        let pad = d.ring_pad as i32;
        let outer = Region::ltrb(plate.l - pad, plate.t - pad, plate.r + pad, plate.b + pad).clamp_to(&win);
        let cap = self.ctx.vision.capture(&win, &outer).ok()?;
        let inner = (
            (plate.l - outer.l).max(0) as u32,
            (plate.t - outer.t).max(0) as u32,
            plate.w.max(0) as u32,
            plate.h.max(0) as u32,
        );
        Some(RingCounts {
            friend: count_in_ring(&cap, inner, d.ring_pad, d.friend_palette, d.ring_tol),
            enemy: count_in_ring(&cap, inner, d.ring_pad, d.enemy_palette, d.ring_tol),
            neutral: count_in_ring(&cap, inner, d.ring_pad, d.neutral_palette, d.ring_tol),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::autofarm::tests::{data, ALIVE, DEAD, ENEMY};
    use crate::engines::testkit::kit;

    #[test]
    fn test_target_bar_states() {
        let k = kit();
        let d = data();
        let v = TargetVision::new(&k.ctx, &d);
        assert_eq!(v.probe(), Some((false, false)));
        // zone is 500 wide centered on 800: x 150..650, y 1..121
        k.stub.edit_frame(|f| f.fill_rect(200, 20, 60, 5, DEAD[0]));
        assert_eq!(v.probe(), Some((true, false)));
        k.stub.edit_frame(|f| f.fill_rect(200, 20, 30, 5, ALIVE[2]));
        assert_eq!(v.probe(), Some((true, true)));
        k.stub.set_frame(None);
        assert_eq!(v.probe(), None);
        assert_eq!(v.probe_retrying(), (false, false));
    }

    #[test]
    fn test_short_bar_is_not_a_target() {
        let k = kit();
        let d = data();
        k.stub.edit_frame(|f| f.fill_rect(200, 20, 20, 5, ALIVE[0]));
        assert_eq!(TargetVision::new(&k.ctx, &d).probe(), Some((false, false)));
    }

    #[test]
    fn test_ring_counts_enemy_dots() {
        let k = kit();
        let d = data();
        let plate = Region::ltwh(300, 300, 24, 16);
        k.stub.edit_frame(|f| f.fill_rect(290, 290, 6, 6, ENEMY[0]));
        let counts = TargetVision::new(&k.ctx, &d).ring(&plate).unwrap();
        assert_eq!(counts, RingCounts { friend: 0, enemy: 36, neutral: 0 });
    }
}
