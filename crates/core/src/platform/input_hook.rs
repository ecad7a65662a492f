//! Global low-level mouse hook feeding the recorder.

use std::sync::mpsc;

use crate::types::Point;

/// Mouse event in absolute screen coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    LeftClick(Point),
    RightDown(Point),
    RightUp(Point),
    Move(Point),
    WheelUp { ctrl: bool },
    WheelDown { ctrl: bool },
}

/// Running hook; `stop()` unhooks and ends the hook thread.
pub struct InputHook {
    #[cfg_attr(not(target_os = "windows"), allow(dead_code))]
    thread_id: u32,
}

#[cfg(target_os = "windows")]
mod imp {
    use std::sync::mpsc;
    use std::sync::OnceLock;

    use parking_lot::Mutex;
    use windows::Win32::Foundation::{HINSTANCE, HWND, LPARAM, LRESULT, WPARAM};
    use windows::Win32::System::LibraryLoader::GetModuleHandleW;
    use windows::Win32::System::Threading::GetCurrentThreadId;
    use windows::Win32::UI::Input::KeyboardAndMouse::{GetAsyncKeyState, VK_CONTROL};
    use windows::Win32::UI::WindowsAndMessaging::{
        CallNextHookEx, GetMessageW, PostThreadMessageW, SetWindowsHookExW, UnhookWindowsHookEx,
        HHOOK, MSG, MSLLHOOKSTRUCT, WH_MOUSE_LL, WM_LBUTTONDOWN, WM_MOUSEMOVE, WM_MOUSEWHEEL,
        WM_QUIT, WM_RBUTTONDOWN, WM_RBUTTONUP,
    };

    use super::{InputEvent, InputHook};
    use crate::logger;

    static SINK: OnceLock<Mutex<Option<mpsc::Sender<InputEvent>>>> = OnceLock::new();

    fn sink() -> &'static Mutex<Option<mpsc::Sender<InputEvent>>> {
        SINK.get_or_init(|| Mutex::new(None))
    }

    unsafe extern "system" fn mouse_proc(code: i32, wparam: WPARAM, lparam: LPARAM) -> LRESULT {
        if code >= 0 {
            let info = &*(lparam.0 as *const MSLLHOOKSTRUCT);
            let pt = (info.pt.x, info.pt.y);
            let ctrl = (GetAsyncKeyState(VK_CONTROL.0 as i32) as u16 & 0x8000) != 0;
            let ev = match wparam.0 as u32 {
                WM_LBUTTONDOWN => Some(InputEvent::LeftClick(pt)),
                WM_RBUTTONDOWN => Some(InputEvent::RightDown(pt)),
                WM_RBUTTONUP => Some(InputEvent::RightUp(pt)),
                WM_MOUSEMOVE => Some(InputEvent::Move(pt)),
                WM_MOUSEWHEEL => {
                    let delta = (info.mouseData >> 16) as u16 as i16;
                    if delta > 0 {
                        Some(InputEvent::WheelUp { ctrl })
                    } else {
                        Some(InputEvent::WheelDown { ctrl })
                    }
                }
                _ => None,
            };
            if let (Some(ev), Some(tx)) = (ev, sink().lock().as_ref()) {
                tx.send(ev).ok();
            }
        }
        CallNextHookEx(HHOOK::default(), code, wparam, lparam)
    }

    pub fn start(tx: mpsc::Sender<InputEvent>) -> Option<InputHook> {
        *sink().lock() = Some(tx);
        let (tid_tx, tid_rx) = mpsc::channel::<u32>();
        std::thread::spawn(move || unsafe {
            let module = match GetModuleHandleW(None) {
                Ok(m) => m,
                Err(e) => {
                    logger::error_p("record", &format!("GetModuleHandleW failed: {}", e));
                    tid_tx.send(0).ok();
                    return;
                }
            };
            let hook = match SetWindowsHookExW(WH_MOUSE_LL, Some(mouse_proc), HINSTANCE(module.0), 0) {
                Ok(h) => h,
                Err(e) => {
                    logger::error_p("record", &format!("mouse hook failed: {}", e));
                    tid_tx.send(0).ok();
                    return;
                }
            };
            tid_tx.send(GetCurrentThreadId()).ok();
            let mut msg = MSG::default();
            while GetMessageW(&mut msg, HWND::default(), 0, 0).as_bool() {}
            let _ = UnhookWindowsHookEx(hook);
            logger::info_p("record", "mouse hook removed");
        });
        match tid_rx.recv() {
            Ok(tid) if tid != 0 => Some(InputHook { thread_id: tid }),
            _ => None,
        }
    }

    pub fn stop(hook: &InputHook) {
        *sink().lock() = None;
        unsafe {
            let _ = PostThreadMessageW(hook.thread_id, WM_QUIT, WPARAM(0), LPARAM(0));
        }
    }
}

impl InputHook {
    /// Install the global mouse hook. `None` where unsupported or on failure.
    #[cfg(target_os = "windows")]
    pub fn start(tx: mpsc::Sender<InputEvent>) -> Option<Self> {
        imp::start(tx)
    }

    #[cfg(not(target_os = "windows"))]
    pub fn start(_tx: mpsc::Sender<InputEvent>) -> Option<Self> {
        None
    }

    pub fn stop(&self) {
        #[cfg(target_os = "windows")]
        imp::stop(self);
    }
}
