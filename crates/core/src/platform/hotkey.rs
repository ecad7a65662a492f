//! Global Ctrl+R hotkey for record start/stop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Message-loop thread owning the hotkey registration. Zero when the
/// listener never started.
pub struct HotkeyGuard {
    #[cfg_attr(not(target_os = "windows"), allow(dead_code))]
    thread_id: u32,
}

#[cfg(target_os = "windows")]
mod imp {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{mpsc, Arc};

    use windows::Win32::Foundation::{HWND, LPARAM, WPARAM};
    use windows::Win32::System::Threading::GetCurrentThreadId;
    use windows::Win32::UI::Input::KeyboardAndMouse::{
        RegisterHotKey, UnregisterHotKey, MOD_CONTROL, MOD_NOREPEAT, VK_R,
    };
    use windows::Win32::UI::WindowsAndMessaging::{
        GetMessageW, PostThreadMessageW, MSG, WM_HOTKEY, WM_QUIT,
    };

    use crate::logger;

    const RECORD_ID: i32 = 0x5245;

    pub fn start(flag: Arc<AtomicBool>) -> u32 {
        let (tid_tx, tid_rx) = mpsc::channel::<u32>();
        std::thread::spawn(move || unsafe {
            if let Err(e) = RegisterHotKey(HWND::default(), RECORD_ID, MOD_CONTROL | MOD_NOREPEAT, VK_R.0 as u32) {
                logger::error_p("record", &format!("Ctrl+R is taken by another application: {}", e));
                tid_tx.send(0).ok();
                return;
            }
            tid_tx.send(GetCurrentThreadId()).ok();
            logger::info_p("record", "Ctrl+R toggles recording");

            let mut msg = MSG::default();
            while GetMessageW(&mut msg, HWND::default(), 0, 0).as_bool() {
                if msg.message == WM_HOTKEY && msg.wParam.0 == RECORD_ID as usize {
                    flag.store(true, Ordering::Release);
                }
            }
            let _ = UnregisterHotKey(HWND::default(), RECORD_ID);
        });
        tid_rx.recv().unwrap_or(0)
    }

    pub fn stop(thread_id: u32) {
        unsafe {
            let _ = PostThreadMessageW(thread_id, WM_QUIT, WPARAM(0), LPARAM(0));
        }
    }
}

/// Listen for Ctrl+R on a background thread; each press sets `flag`.
/// Elsewhere than Windows this is a no-op guard.
pub fn start_hotkey_listener(flag: Arc<AtomicBool>) -> HotkeyGuard {
    #[cfg(target_os = "windows")]
    let thread_id = imp::start(flag);
    #[cfg(not(target_os = "windows"))]
    let thread_id = {
        flag.store(false, Ordering::Release);
        0
    };
    HotkeyGuard { thread_id }
}

impl HotkeyGuard {
    /// Unregister the hotkey and end its message loop.
    pub fn stop(&self) {
        #[cfg(target_os = "windows")]
        if self.thread_id != 0 {
            imp::stop(self.thread_id);
        }
    }
}
