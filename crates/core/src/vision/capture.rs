use std::cell::RefCell;

use image::GrayImage;

use crate::error::{Error, Result};
use crate::platform::Platform;
use crate::types::{Capture, Region, WindowInfo};

/// Borrowed 8-bit greyscale pixels.
#[derive(Debug, Clone, Copy)]
pub struct GrayView<'a> {
    pub width: u32,
    pub height: u32,
    pub data: &'a [u8],
}

impl<'a> GrayView<'a> {
    pub fn at(&self, x: u32, y: u32) -> u8 {
        self.data[(y * self.width + x) as usize]
    }
}

impl<'a> From<&'a GrayImage> for GrayView<'a> {
    fn from(img: &'a GrayImage) -> Self {
        GrayView { width: img.width(), height: img.height(), data: img.as_raw() }
    }
}

thread_local! {
    static GRAY_BUF: RefCell<Vec<u8>> = const { RefCell::new(Vec::new()) };
}

/// Capture a client-area region of the game window.
pub fn capture_region(platform: &dyn Platform, win: &WindowInfo, region: &Region) -> Result<Capture> {
    let unavailable = || Error::FrameUnavailable { l: region.l, t: region.t, r: region.r, b: region.b };
    if region.is_empty() {
        return Err(unavailable());
    }
    let (sx, sy) = win.to_screen((region.l, region.t));
    let cap = platform.capture(sx, sy, region.w, region.h).ok_or_else(unavailable)?;
    if cap.is_empty() {
        return Err(unavailable());
    }
    #[cfg(feature = "debug-capture")]
    debug_dump(&cap, region);
    Ok(cap)
}

/// BT.601 luma, same weights as the usual BGR→GRAY conversion.
fn luma(r: u8, g: u8, b: u8) -> u8 {
    ((r as u32 * 299 + g as u32 * 587 + b as u32 * 114 + 500) / 1000) as u8
}

fn fill_gray(cap: &Capture, out: &mut Vec<u8>) {
    out.clear();
    out.reserve((cap.width * cap.height) as usize);
    for y in 0..cap.height {
        let row = (y * cap.bytes_per_row) as usize;
        for x in 0..cap.width as usize {
            let px = &cap.data[row + x * 4..row + x * 4 + 3];
            out.push(luma(px[2], px[1], px[0]));
        }
    }
}

/// Run `f` over the greyscale version of `cap`, reusing a per-thread buffer.
pub fn with_gray<R>(cap: &Capture, f: impl FnOnce(GrayView<'_>) -> R) -> R {
    GRAY_BUF.with(|cell| {
        let mut buf = cell.borrow_mut();
        fill_gray(cap, &mut buf);
        f(GrayView { width: cap.width, height: cap.height, data: &buf })
    })
}

/// Owned greyscale copy of a capture.
pub fn to_gray_image(cap: &Capture) -> GrayImage {
    let mut buf = Vec::new();
    fill_gray(cap, &mut buf);
    GrayImage::from_raw(cap.width, cap.height, buf).unwrap_or_else(|| GrayImage::new(0, 0))
}

/// Capture in BGRA layout built from a greyscale image (test frames, harness).
pub fn capture_from_gray(img: &GrayImage) -> Capture {
    let mut data = Vec::with_capacity((img.width() * img.height() * 4) as usize);
    for p in img.pixels() {
        let v = p.0[0];
        data.extend_from_slice(&[v, v, v, 255]);
    }
    Capture { data, width: img.width(), height: img.height(), bytes_per_row: img.width() * 4 }
}

#[cfg(feature = "debug-capture")]
fn debug_dump(cap: &Capture, region: &Region) {
    let dir = std::path::Path::new("logs").join("captures");
    if std::fs::create_dir_all(&dir).is_err() {
        return;
    }
    let name = format!("zone_{}_{}_{}_{}.png", region.l, region.t, region.r, region.b);
    to_gray_image(cap).save(dir.join(name)).ok();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::stub::StubPlatform;

    #[test]
    fn test_gray_conversion() {
        let mut cap = Capture::filled(2, 1, (255, 255, 255));
        cap.set_rgb(1, 0, (255, 0, 0));
        let g = to_gray_image(&cap);
        assert_eq!(g.get_pixel(0, 0).0[0], 255);
        assert_eq!(g.get_pixel(1, 0).0[0], 76);
        with_gray(&cap, |v| assert_eq!(v.at(1, 0), 76));
    }

    #[test]
    fn test_missing_frame_is_unavailable() {
        let win = WindowInfo { x: 0, y: 0, width: 100, height: 100, hwnd: 1 };
        let stub = StubPlatform::with_window(win);
        let err = capture_region(&stub, &win, &Region::ltwh(0, 0, 10, 10)).unwrap_err();
        assert!(matches!(err, Error::FrameUnavailable { .. }));
        stub.set_frame(Some(Capture::filled(100, 100, (1, 2, 3))));
        let cap = capture_region(&stub, &win, &Region::ltwh(10, 10, 10, 10)).unwrap();
        assert_eq!((cap.width, cap.height), (10, 10));
    }
}
