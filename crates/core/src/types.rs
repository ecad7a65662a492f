use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Window identifier (HWND on Windows)
pub type WindowId = u64;

/// Screen point.
pub type Point = (i32, i32);

/// Client-area geometry of the game window, as stored in `window.info`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowInfo {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    #[serde(default)]
    pub hwnd: WindowId,
}

impl WindowInfo {
    /// Parse `window.info`; `None` unless x, y, width and height are all present.
    pub fn from_value(v: &Value) -> Option<Self> {
        if !crate::pool::window_info_complete(v) {
            return None;
        }
        serde_json::from_value(v.clone()).ok()
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Client-relative point to absolute screen coordinates.
    pub fn to_screen(&self, p: Point) -> Point {
        (self.x + p.0, self.y + p.1)
    }
}

/// Rectangle in client coordinates (left/top inclusive, right/bottom exclusive).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Region {
    pub l: i32,
    pub t: i32,
    pub r: i32,
    pub b: i32,
    pub w: i32,
    pub h: i32,
    pub cx: i32,
    pub cy: i32,
}

impl Region {
    pub fn ltrb(l: i32, t: i32, r: i32, b: i32) -> Self {
        let (w, h) = ((r - l).max(0), (b - t).max(0));
        Self { l, t, r, b, w, h, cx: l + w / 2, cy: t + h / 2 }
    }

    pub fn ltwh(l: i32, t: i32, w: i32, h: i32) -> Self {
        Self::ltrb(l, t, l + w, t + h)
    }

    /// Clip to the window's client area.
    pub fn clamp_to(&self, win: &WindowInfo) -> Self {
        Self::ltrb(
            self.l.clamp(0, win.width),
            self.t.clamp(0, win.height),
            self.r.clamp(0, win.width),
            self.b.clamp(0, win.height),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.w <= 0 || self.h <= 0
    }
}

/// Raw screenshot pixel data (BGRA)
#[derive(Debug, Clone)]
pub struct Capture {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub bytes_per_row: u32,
}

impl Capture {
    /// Solid-color capture; handy for tests and the stub platform.
    pub fn filled(width: u32, height: u32, rgb: (u8, u8, u8)) -> Self {
        let mut data = Vec::with_capacity((width * height * 4) as usize);
        for _ in 0..width * height {
            data.extend_from_slice(&[rgb.2, rgb.1, rgb.0, 255]);
        }
        Self { data, width, height, bytes_per_row: width * 4 }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0 || self.data.is_empty()
    }

    /// Pixel as (r, g, b).
    pub fn rgb(&self, x: u32, y: u32) -> (u8, u8, u8) {
        let idx = (y * self.bytes_per_row + x * 4) as usize;
        (self.data[idx + 2], self.data[idx + 1], self.data[idx])
    }

    pub fn set_rgb(&mut self, x: u32, y: u32, rgb: (u8, u8, u8)) {
        let idx = (y * self.bytes_per_row + x * 4) as usize;
        self.data[idx] = rgb.2;
        self.data[idx + 1] = rgb.1;
        self.data[idx + 2] = rgb.0;
    }

    /// Fill a rectangle (clipped) with one color.
    pub fn fill_rect(&mut self, x: u32, y: u32, w: u32, h: u32, rgb: (u8, u8, u8)) {
        for yy in y..(y + h).min(self.height) {
            for xx in x..(x + w).min(self.width) {
                self.set_rgb(xx, yy, rgb);
            }
        }
    }

    /// Copy of a sub-rectangle (clipped to the capture).
    pub fn crop(&self, x: u32, y: u32, w: u32, h: u32) -> Capture {
        let x = x.min(self.width);
        let y = y.min(self.height);
        let w = w.min(self.width - x);
        let h = h.min(self.height - y);
        let mut data = Vec::with_capacity((w * h * 4) as usize);
        for yy in y..y + h {
            let start = (yy * self.bytes_per_row + x * 4) as usize;
            data.extend_from_slice(&self.data[start..start + (w * 4) as usize]);
        }
        Capture { data, width: w, height: h, bytes_per_row: w * 4 }
    }

    /// Paste `other` at (x, y), clipped.
    pub fn blit(&mut self, other: &Capture, x: u32, y: u32) {
        for yy in 0..other.height {
            for xx in 0..other.width {
                if x + xx < self.width && y + yy < self.height {
                    self.set_rgb(x + xx, y + yy, other.rgb(xx, yy));
                }
            }
        }
    }
}

/// Command from TUI to orchestrator
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Toggle `features.<name>.enabled`.
    Toggle(String),
    /// Kick one auto-farm cycle now.
    AutofarmNow,
    /// Start or stop input recording.
    RecordToggle,
    /// Play the current record.
    PlayRecord,
    Quit,
}
