use std::ffi::c_void;
use std::mem;

use windows::Win32::Foundation::{BOOL, HWND, LPARAM, POINT, RECT};
use windows::Win32::Graphics::Gdi::{
    BitBlt, ClientToScreen, CreateCompatibleBitmap, CreateCompatibleDC, DeleteDC, DeleteObject,
    GetDC, GetDIBits, ReleaseDC, SelectObject, BITMAPINFO, BITMAPINFOHEADER, BI_RGB,
    DIB_RGB_COLORS, SRCCOPY,
};
use windows::Win32::UI::WindowsAndMessaging::{
    EnumWindows, GetAncestor, GetClientRect, GetForegroundWindow, GetWindowTextW, IsWindow,
    IsWindowVisible, SetCursorPos, SetProcessDPIAware, GA_ROOT, GA_ROOTOWNER,
};

use crate::types::*;
use crate::logger;
use super::Platform;

pub struct Win32Platform;

fn hwnd_of(id: WindowId) -> HWND {
    HWND(id as usize as *mut c_void)
}

fn id_of(hwnd: HWND) -> WindowId {
    hwnd.0 as usize as WindowId
}

impl Win32Platform {
    pub fn new() -> Self {
        // Physical pixels for capture and cursor coordinates.
        unsafe {
            SetProcessDPIAware();
        }
        Self
    }

    fn client_info(hwnd: HWND) -> Option<WindowInfo> {
        unsafe {
            if !IsWindow(hwnd).as_bool() {
                return None;
            }
            let mut rc = RECT::default();
            GetClientRect(hwnd, &mut rc).ok()?;
            let mut origin = POINT { x: 0, y: 0 };
            if !ClientToScreen(hwnd, &mut origin).as_bool() {
                return None;
            }
            Some(WindowInfo {
                x: origin.x,
                y: origin.y,
                width: rc.right - rc.left,
                height: rc.bottom - rc.top,
                hwnd: id_of(hwnd),
            })
        }
    }

    fn title_of(hwnd: HWND) -> String {
        let mut buf = [0u16; 512];
        let n = unsafe { GetWindowTextW(hwnd, &mut buf) };
        String::from_utf16_lossy(&buf[..n.max(0) as usize])
    }
}

struct EnumCtx {
    needle: String,
    found: Option<HWND>,
}

unsafe extern "system" fn enum_proc(hwnd: HWND, lparam: LPARAM) -> BOOL {
    let ctx = &mut *(lparam.0 as *mut EnumCtx);
    if !IsWindowVisible(hwnd).as_bool() {
        return BOOL(1);
    }
    let title = Win32Platform::title_of(hwnd);
    if !title.is_empty() && title.to_lowercase().contains(&ctx.needle) {
        ctx.found = Some(hwnd);
        return BOOL(0);
    }
    BOOL(1)
}

impl Platform for Win32Platform {
    fn name(&self) -> &str {
        "win32"
    }

    fn find_window(&self, title: &str) -> Option<(WindowInfo, String)> {
        let mut ctx = EnumCtx { needle: title.to_lowercase(), found: None };
        unsafe {
            // EnumWindows reports an error when the callback stops early.
            let _ = EnumWindows(Some(enum_proc), LPARAM(&mut ctx as *mut EnumCtx as isize));
        }
        let hwnd = ctx.found?;
        let info = Self::client_info(hwnd)?;
        Some((info, Self::title_of(hwnd)))
    }

    fn window_info(&self, hwnd: WindowId) -> Option<WindowInfo> {
        Self::client_info(hwnd_of(hwnd))
    }

    fn is_foreground(&self, hwnd: WindowId) -> Option<bool> {
        let target = hwnd_of(hwnd);
        unsafe {
            let fg = GetForegroundWindow();
            if fg.0.is_null() {
                return None;
            }
            if fg == target {
                return Some(true);
            }
            if GetAncestor(fg, GA_ROOT) == GetAncestor(target, GA_ROOT) {
                return Some(true);
            }
            Some(GetAncestor(fg, GA_ROOTOWNER) == GetAncestor(target, GA_ROOTOWNER))
        }
    }

    fn capture(&self, l: i32, t: i32, w: i32, h: i32) -> Option<Capture> {
        if w <= 0 || h <= 0 {
            return None;
        }
        unsafe {
            let screen = GetDC(HWND::default());
            if screen.is_invalid() {
                return None;
            }
            let mem_dc = CreateCompatibleDC(screen);
            let bmp = CreateCompatibleBitmap(screen, w, h);
            let old = SelectObject(mem_dc, bmp);

            let mut out = None;
            if BitBlt(mem_dc, 0, 0, w, h, screen, l, t, SRCCOPY).is_ok() {
                let mut bmi = BITMAPINFO {
                    bmiHeader: BITMAPINFOHEADER {
                        biSize: mem::size_of::<BITMAPINFOHEADER>() as u32,
                        biWidth: w,
                        biHeight: -h, // top-down rows
                        biPlanes: 1,
                        biBitCount: 32,
                        biCompression: BI_RGB.0,
                        ..Default::default()
                    },
                    ..Default::default()
                };
                let mut data = vec![0u8; (w * h * 4) as usize];
                let rows = GetDIBits(
                    mem_dc,
                    bmp,
                    0,
                    h as u32,
                    Some(data.as_mut_ptr() as *mut c_void),
                    &mut bmi,
                    DIB_RGB_COLORS,
                );
                if rows == h {
                    out = Some(Capture { data, width: w as u32, height: h as u32, bytes_per_row: (w * 4) as u32 });
                } else {
                    logger::warn_p("win32", &format!("GetDIBits returned {} of {} rows", rows, h));
                }
            }

            SelectObject(mem_dc, old);
            let _ = DeleteObject(bmp);
            let _ = DeleteDC(mem_dc);
            ReleaseDC(HWND::default(), screen);
            out
        }
    }

    fn move_cursor(&self, x: i32, y: i32) -> bool {
        unsafe { SetCursorPos(x, y).is_ok() }
    }
}
