use parking_lot::Mutex;

use crate::types::*;
use crate::logger;
use super::Platform;

/// In-memory platform: one scripted client-area frame, a focus flag and a
/// cursor log. Used for `--stub` runs and by every behavior test.
pub struct StubPlatform {
    state: Mutex<StubState>,
}

struct StubState {
    window: Option<WindowInfo>,
    title: String,
    focused: Option<bool>,
    frame: Option<Capture>,
    cursor: Vec<Point>,
    captures: u64,
    verbose: bool,
}

impl StubPlatform {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(StubState {
                window: Some(WindowInfo { x: 0, y: 0, width: 1280, height: 720, hwnd: 30001 }),
                title: "Lineage II (stub)".into(),
                focused: Some(true),
                frame: None,
                cursor: Vec::new(),
                captures: 0,
                verbose: true,
            }),
        }
    }

    /// Quiet stub with a given window, for tests.
    pub fn with_window(win: WindowInfo) -> Self {
        let stub = Self::new();
        {
            let mut s = stub.state.lock();
            s.window = Some(win);
            s.verbose = false;
        }
        stub
    }

    pub fn set_window(&self, win: Option<WindowInfo>) {
        self.state.lock().window = win;
    }

    pub fn set_focused(&self, focused: Option<bool>) {
        self.state.lock().focused = focused;
    }

    /// Frame in client coordinates (origin = window top-left).
    pub fn set_frame(&self, frame: Option<Capture>) {
        self.state.lock().frame = frame;
    }

    /// Mutate the current frame in place.
    pub fn edit_frame(&self, f: impl FnOnce(&mut Capture)) {
        if let Some(frame) = self.state.lock().frame.as_mut() {
            f(frame);
        }
    }

    pub fn cursor_log(&self) -> Vec<Point> {
        self.state.lock().cursor.clone()
    }

    pub fn capture_count(&self) -> u64 {
        self.state.lock().captures
    }
}

impl Default for StubPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl Platform for StubPlatform {
    fn name(&self) -> &str {
        "stub"
    }

    fn find_window(&self, title: &str) -> Option<(WindowInfo, String)> {
        let s = self.state.lock();
        if s.verbose {
            logger::info_p("stub", &format!("find_window(\"{}\")", title));
        }
        let win = s.window?;
        if s.title.to_lowercase().contains(&title.to_lowercase()) {
            Some((win, s.title.clone()))
        } else {
            None
        }
    }

    fn window_info(&self, hwnd: WindowId) -> Option<WindowInfo> {
        self.state.lock().window.filter(|w| w.hwnd == hwnd)
    }

    fn is_foreground(&self, hwnd: WindowId) -> Option<bool> {
        let s = self.state.lock();
        match s.window {
            Some(w) if w.hwnd == hwnd => s.focused,
            Some(_) => Some(false),
            None => None,
        }
    }

    fn capture(&self, l: i32, t: i32, w: i32, h: i32) -> Option<Capture> {
        let mut s = self.state.lock();
        s.captures += 1;
        let win = s.window?;
        let frame = s.frame.as_ref()?;
        let (cl, ct) = (l - win.x, t - win.y);
        if w <= 0 || h <= 0 || cl < 0 || ct < 0 {
            return None;
        }
        let out = frame.crop(cl as u32, ct as u32, w as u32, h as u32);
        if out.is_empty() { None } else { Some(out) }
    }

    fn move_cursor(&self, x: i32, y: i32) -> bool {
        let mut s = self.state.lock();
        if s.verbose {
            logger::info_p("stub", &format!("move_cursor({}, {})", x, y));
        }
        s.cursor.push((x, y));
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_crops_client_frame() {
        let stub = StubPlatform::with_window(WindowInfo { x: 100, y: 50, width: 64, height: 32, hwnd: 9 });
        let mut frame = Capture::filled(64, 32, (0, 0, 0));
        frame.fill_rect(10, 5, 4, 4, (200, 10, 10));
        stub.set_frame(Some(frame));
        let cap = stub.capture(110, 55, 4, 4).unwrap();
        assert_eq!(cap.width, 4);
        assert_eq!(cap.rgb(0, 0), (200, 10, 10));
        assert!(stub.capture(90, 55, 4, 4).is_none());
    }

    #[test]
    fn test_foreground_matches_hwnd() {
        let stub = StubPlatform::with_window(WindowInfo { x: 0, y: 0, width: 10, height: 10, hwnd: 9 });
        assert_eq!(stub.is_foreground(9), Some(true));
        assert_eq!(stub.is_foreground(8), Some(false));
        stub.set_focused(Some(false));
        assert_eq!(stub.is_foreground(9), Some(false));
    }
}
