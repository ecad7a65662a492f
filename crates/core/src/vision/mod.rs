pub mod capture;
pub mod colors;
pub mod matcher;
pub mod resolver;
pub mod zone;

use std::sync::Arc;

pub use resolver::{parts, TemplateStore};
pub use zone::{Zone, ZoneSpec};

use crate::error::Result;
use crate::logger;
use crate::platform::Platform;
use crate::types::{Capture, Point, Region, WindowInfo};
use capture::GrayView;

/// Where a template lives: engine directory plus server and language.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateScope {
    pub engine: String,
    pub server: String,
    pub lang: String,
}

impl TemplateScope {
    pub fn new(engine: &str, server: &str, lang: &str) -> Self {
        Self { engine: engine.into(), server: server.into(), lang: lang.into() }
    }
}

/// Capture plus matching over one platform and template store. Stateless
/// apart from the template cache, so it can be shared across threads.
#[derive(Clone)]
pub struct Vision {
    platform: Arc<dyn Platform>,
    store: Arc<TemplateStore>,
}

impl Vision {
    pub fn new(platform: Arc<dyn Platform>, store: Arc<TemplateStore>) -> Self {
        Self { platform, store }
    }

    pub fn platform(&self) -> &Arc<dyn Platform> {
        &self.platform
    }

    pub fn store(&self) -> &Arc<TemplateStore> {
        &self.store
    }

    pub fn capture(&self, win: &WindowInfo, region: &Region) -> Result<Capture> {
        capture::capture_region(self.platform.as_ref(), win, &region.clamp_to(win))
    }

    pub fn template_exists(&self, scope: &TemplateScope, parts: &[String]) -> bool {
        self.store.exists(&scope.engine, &scope.server, &scope.lang, parts)
    }

    /// Center of the best match (screen coordinates) when its score reaches
    /// `threshold`.
    pub fn match_single(
        &self,
        win: &WindowInfo,
        zone: &Zone,
        scope: &TemplateScope,
        parts: &[String],
        threshold: f64,
    ) -> Result<Option<Point>> {
        Ok(self
            .locate(win, zone, scope, parts, threshold)?
            .map(|r| win.to_screen((r.cx, r.cy))))
    }

    /// Client-area rectangle of the best match when its score reaches `threshold`.
    pub fn locate(
        &self,
        win: &WindowInfo,
        zone: &Zone,
        scope: &TemplateScope,
        parts: &[String],
        threshold: f64,
    ) -> Result<Option<Region>> {
        let tpl = self.store.load(&scope.engine, &scope.server, &scope.lang, parts)?;
        let region = zone.compute(win).clamp_to(win);
        let cap = self.capture(win, &region)?;
        let hit = capture::with_gray(&cap, |hay| matcher::best_match(hay, GrayView::from(tpl.as_ref())));
        Ok(hit
            .filter(|h| h.score as f64 >= threshold)
            .map(|h| Region::ltwh(region.l + h.x as i32, region.t + h.y as i32, h.w as i32, h.h as i32)))
    }

    /// Best `(point, key)` over ordered `(key, parts)` candidates and scales.
    /// Keys whose template is not shipped are skipped; the call fails only
    /// when none resolve.
    pub fn match_multi(
        &self,
        win: &WindowInfo,
        zone: &Zone,
        scope: &TemplateScope,
        candidates: &[(String, Vec<String>)],
        threshold: f64,
        scales: &[f64],
    ) -> Result<Option<(Point, String)>> {
        let mut loaded = Vec::with_capacity(candidates.len());
        let mut last_err = None;
        for (key, parts) in candidates {
            match self.store.load(&scope.engine, &scope.server, &scope.lang, parts) {
                Ok(img) => loaded.push((key.as_str(), img)),
                Err(e) => last_err = Some(e),
            }
        }
        if loaded.is_empty() {
            return match last_err {
                Some(e) => Err(e),
                None => Ok(None),
            };
        }
        let region = zone.compute(win).clamp_to(win);
        let cap = self.capture(win, &region)?;
        let refs: Vec<(&str, &image::GrayImage)> = loaded.iter().map(|(k, img)| (*k, img.as_ref())).collect();
        let best = capture::with_gray(&cap, |hay| matcher::best_match_multi(hay, &refs, scales));
        Ok(best
            .filter(|(h, _)| h.score as f64 >= threshold)
            .map(|(h, key)| (screen_center(win, &region, h.center()), key.to_string())))
    }

    /// `match_single` with errors folded into `None`. Missing assets are
    /// logged; an unavailable frame is silent (the screen may be changing).
    pub fn find(&self, win: &WindowInfo, zone: &Zone, scope: &TemplateScope, parts: &[String], threshold: f64) -> Option<Point> {
        match self.match_single(win, zone, scope, parts, threshold) {
            Ok(p) => p,
            Err(e) => {
                if e.is_missing_asset() {
                    logger::warn_p("vision", &e.to_string());
                }
                None
            }
        }
    }

    pub fn visible(&self, win: &WindowInfo, zone: &Zone, scope: &TemplateScope, parts: &[String], threshold: f64) -> bool {
        self.find(win, zone, scope, parts, threshold).is_some()
    }
}

fn screen_center(win: &WindowInfo, region: &Region, c: Point) -> Point {
    win.to_screen((region.l + c.0, region.t + c.1))
}

#[cfg(test)]
pub(crate) mod testutil {
    use std::fs;
    use std::path::Path;

    use image::GrayImage;

    /// Deterministic textured template.
    pub fn texture(w: u32, h: u32, seed: u32) -> GrayImage {
        let mut state = seed.wrapping_mul(2654435761).max(1);
        GrayImage::from_fn(w, h, |_, _| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            image::Luma([(state % 256) as u8])
        })
    }

    /// Write a template file under `root`, creating directories.
    pub fn write_template(root: &Path, rel: &str, img: &GrayImage) {
        let p = root.join(rel);
        if let Some(parent) = p.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        img.save(p).unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::stub::StubPlatform;
    use crate::vision::capture::capture_from_gray;

    #[test]
    fn test_match_single_returns_screen_center() {
        let dir = tempfile::tempdir().unwrap();
        let tpl = testutil::texture(12, 10, 3);
        testutil::write_template(dir.path(), "respawn/boh/rus/death_banner.png", &tpl);

        let win = WindowInfo { x: 100, y: 200, width: 320, height: 240, hwnd: 5 };
        let stub = Arc::new(StubPlatform::with_window(win));
        let mut frame = capture_from_gray(&image::GrayImage::from_pixel(320, 240, image::Luma([30])));
        frame.blit(&capture_from_gray(&tpl), 150, 90);
        stub.set_frame(Some(frame));

        let vision = Vision::new(stub, Arc::new(TemplateStore::new(dir.path())));
        let scope = TemplateScope::new("respawn", "boh", "rus");
        let ps = parts(&["<lang>", "death_banner.png"]);
        let p = vision.match_single(&win, &Zone::fullscreen(), &scope, &ps, 0.9).unwrap();
        assert_eq!(p, Some((100 + 156, 200 + 95)));
        assert!(vision.visible(&win, &Zone::ltrb(140, 80, 200, 120), &scope, &ps, 0.9));
        assert!(!vision.visible(&win, &Zone::ltrb(0, 0, 60, 60), &scope, &ps, 0.9));
    }

    #[test]
    fn test_match_multi_skips_missing_keys() {
        let dir = tempfile::tempdir().unwrap();
        let tpl = testutil::texture(10, 10, 9);
        testutil::write_template(dir.path(), "respawn/boh/rus/accept_button.png", &tpl);

        let win = WindowInfo { x: 0, y: 0, width: 200, height: 100, hwnd: 5 };
        let stub = Arc::new(StubPlatform::with_window(win));
        let mut frame = capture_from_gray(&image::GrayImage::from_pixel(200, 100, image::Luma([0])));
        frame.blit(&capture_from_gray(&tpl), 40, 40);
        stub.set_frame(Some(frame));

        let vision = Vision::new(stub, Arc::new(TemplateStore::new(dir.path())));
        let scope = TemplateScope::new("respawn", "boh", "rus");
        let cands = vec![
            ("reborn_banner".to_string(), parts(&["<lang>", "reborn_banner.png"])),
            ("accept_button".to_string(), parts(&["<lang>", "accept_button.png"])),
        ];
        let (p, key) = vision
            .match_multi(&win, &Zone::fullscreen(), &scope, &cands, 0.9, &matcher::SCALES)
            .unwrap()
            .unwrap();
        assert_eq!(key, "accept_button");
        assert_eq!(p, (45, 45));
        assert!(vision.match_multi(&win, &Zone::fullscreen(), &scope, &cands[..1], 0.9, &[1.0]).is_err());
    }
}
