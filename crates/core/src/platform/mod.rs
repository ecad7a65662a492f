pub mod stub;
pub mod hotkey;
pub mod input_hook;

#[cfg(target_os = "windows")]
pub mod win32;

use std::sync::Arc;

use crate::types::*;
use crate::logger;

/// OS window, capture and cursor operations. Everything the core needs from
/// the operating system goes through here so tests can run on the stub.
pub trait Platform: Send + Sync {
    fn name(&self) -> &str;

    /// First visible top-level window whose title contains `title`
    /// (case-insensitive), with its client-area geometry.
    fn find_window(&self, title: &str) -> Option<(WindowInfo, String)>;

    /// Fresh client-area geometry of `hwnd`; `None` when the window is gone.
    fn window_info(&self, hwnd: WindowId) -> Option<WindowInfo>;

    /// Whether the foreground window is `hwnd`, comparing root and
    /// root-owner ancestors. `None` when it cannot be determined.
    fn is_foreground(&self, hwnd: WindowId) -> Option<bool>;

    /// Capture a rectangle given in absolute screen coordinates.
    fn capture(&self, l: i32, t: i32, w: i32, h: i32) -> Option<Capture>;

    /// Move the OS cursor to absolute screen coordinates.
    fn move_cursor(&self, x: i32, y: i32) -> bool;
}

/// Create the platform appropriate for the current OS.
pub fn create_platform(force_stub: bool) -> Arc<dyn Platform> {
    logger::register_prefix("stub", logger::COLOR_GRAY);
    if force_stub {
        return Arc::new(stub::StubPlatform::new());
    }
    #[cfg(target_os = "windows")]
    {
        logger::register_prefix("win32", logger::COLOR_GRAY);
        return Arc::new(win32::Win32Platform::new());
    }
    #[cfg(not(target_os = "windows"))]
    {
        logger::warn_p("stub", "screen capture and focus detection need Windows; using the stub platform");
        return Arc::new(stub::StubPlatform::new());
    }
}
