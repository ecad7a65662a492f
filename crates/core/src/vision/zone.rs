use serde::{Deserialize, Serialize};

use crate::types::{Region, WindowInfo};

/// Declarative zone, resolved against the client area at use time.
///
/// Width/height come from `width_ratio`/`height_ratio` or the absolute
/// fields. Horizontal placement: `centered`/`centered_x`, then `left_ratio`,
/// then `right_offset`, then `left`. Vertical placement mirrors it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoneSpec {
    pub fullscreen: bool,
    pub centered: bool,
    pub centered_x: bool,
    pub centered_y: bool,
    pub left: Option<i32>,
    pub top: Option<i32>,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub width_ratio: Option<f64>,
    pub height_ratio: Option<f64>,
    pub left_ratio: Option<f64>,
    pub top_ratio: Option<f64>,
    pub right_offset: Option<i32>,
    pub bottom_offset: Option<i32>,
}

/// Either absolute `(l, t, r, b)` client coordinates or a [`ZoneSpec`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Zone {
    Abs([i32; 4]),
    Decl(ZoneSpec),
}

impl Zone {
    pub fn fullscreen() -> Self {
        Zone::Decl(ZoneSpec { fullscreen: true, ..Default::default() })
    }

    pub fn ltrb(l: i32, t: i32, r: i32, b: i32) -> Self {
        Zone::Abs([l, t, r, b])
    }

    pub fn ltwh(l: i32, t: i32, w: i32, h: i32) -> Self {
        Zone::Decl(ZoneSpec { left: Some(l), top: Some(t), width: Some(w), height: Some(h), ..Default::default() })
    }

    pub fn centered(w: i32, h: i32) -> Self {
        Zone::Decl(ZoneSpec { centered: true, width: Some(w), height: Some(h), ..Default::default() })
    }

    /// Horizontally centered band at a fixed top.
    pub fn centered_x(w: i32, h: i32, top: i32) -> Self {
        Zone::Decl(ZoneSpec {
            centered_x: true,
            width: Some(w),
            height: Some(h),
            top: Some(top),
            ..Default::default()
        })
    }

    /// Client-area rectangle for the current window geometry.
    pub fn compute(&self, win: &WindowInfo) -> Region {
        match self {
            Zone::Abs([l, t, r, b]) => Region::ltrb(*l, *t, *r, *b),
            Zone::Decl(spec) => spec.compute(win),
        }
    }
}

impl ZoneSpec {
    fn compute(&self, win: &WindowInfo) -> Region {
        let (ww, wh) = (win.width, win.height);
        if self.fullscreen {
            return Region::ltrb(0, 0, ww, wh);
        }

        let w = match self.width_ratio {
            Some(r) => (ww as f64 * r) as i32,
            None => self.width.unwrap_or(0),
        };
        let h = match self.height_ratio {
            Some(r) => (wh as f64 * r) as i32,
            None => self.height.unwrap_or(0),
        };

        let l = if self.centered || self.centered_x {
            ww / 2 - w / 2
        } else if let Some(r) = self.left_ratio {
            (ww as f64 * r) as i32
        } else if let Some(off) = self.right_offset {
            ww - off - w
        } else {
            self.left.unwrap_or(0)
        };

        let t = if self.centered || self.centered_y {
            wh / 2 - h / 2
        } else if let Some(r) = self.top_ratio {
            (wh as f64 * r) as i32
        } else if let Some(off) = self.bottom_offset {
            wh - off - h
        } else {
            self.top.unwrap_or(0)
        };

        Region::ltwh(l, t, w, h)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn win() -> WindowInfo {
        WindowInfo { x: 100, y: 50, width: 1280, height: 720, hwnd: 1 }
    }

    #[test]
    fn test_declarative_forms() {
        assert_eq!(Zone::fullscreen().compute(&win()), Region::ltrb(0, 0, 1280, 720));
        assert_eq!(Zone::centered(200, 100).compute(&win()), Region::ltrb(540, 310, 740, 410));
        assert_eq!(Zone::centered_x(500, 120, 1).compute(&win()), Region::ltrb(390, 1, 890, 121));
        assert_eq!(Zone::ltwh(160, 0, 360, 130).compute(&win()), Region::ltrb(160, 0, 520, 130));
    }

    #[test]
    fn test_ratio_and_offset_placement() {
        let z = Zone::Decl(ZoneSpec {
            width_ratio: Some(0.5),
            height: Some(40),
            right_offset: Some(10),
            bottom_offset: Some(20),
            ..Default::default()
        });
        assert_eq!(z.compute(&win()), Region::ltrb(630, 660, 1270, 700));
    }

    #[test]
    fn test_zone_from_json() {
        let abs: Zone = serde_json::from_str("[0, 0, 170, 63]").unwrap();
        assert_eq!(abs, Zone::ltrb(0, 0, 170, 63));
        let decl: Zone = serde_json::from_str(r#"{"centered": true, "width": 10, "height": 10}"#).unwrap();
        assert_eq!(decl, Zone::centered(10, 10));
    }
}
