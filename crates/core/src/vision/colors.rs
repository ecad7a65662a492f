//! RGB palette masks and the geometry helpers built on them.

use crate::types::Capture;

pub type Rgb = (u8, u8, u8);

/// Binary mask, row-major, `true` where a pixel matched.
#[derive(Debug, Clone, PartialEq)]
pub struct Mask {
    pub width: u32,
    pub height: u32,
    pub bits: Vec<bool>,
}

/// Bounding box of a connected band: (x, y, w, h).
pub type Band = (u32, u32, u32, u32);

impl Mask {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height, bits: vec![false; (width * height) as usize] }
    }

    pub fn get(&self, x: u32, y: u32) -> bool {
        self.bits[(y * self.width + x) as usize]
    }

    pub fn count(&self) -> usize {
        self.bits.iter().filter(|b| **b).count()
    }

    pub fn union(&self, other: &Mask) -> Mask {
        Mask {
            width: self.width,
            height: self.height,
            bits: self.bits.iter().zip(&other.bits).map(|(a, b)| *a || *b).collect(),
        }
    }

    /// Pixels set here and not in `other`.
    pub fn minus(&self, other: &Mask) -> usize {
        self.bits.iter().zip(&other.bits).filter(|(a, b)| **a && !**b).count()
    }
}

fn near(c: u8, target: u8, tol: u8) -> bool {
    (c as i16 - target as i16).unsigned_abs() <= tol as u16
}

fn matches_any(px: Rgb, colors: &[Rgb], tol: u8) -> bool {
    colors
        .iter()
        .any(|&(r, g, b)| near(px.0, r, tol) && near(px.1, g, tol) && near(px.2, b, tol))
}

/// Pixels within `tol` of any palette color on every channel.
pub fn mask_for_colors(cap: &Capture, colors: &[Rgb], tol: u8) -> Mask {
    let mut mask = Mask::new(cap.width, cap.height);
    for y in 0..cap.height {
        for x in 0..cap.width {
            if matches_any(cap.rgb(x, y), colors, tol) {
                mask.bits[(y * cap.width + x) as usize] = true;
            }
        }
    }
    mask
}

/// Count palette pixels in the square ring of width `pad` around `inner`
/// (x, y, w, h), clipped to the capture.
pub fn count_in_ring(cap: &Capture, inner: Band, pad: u32, colors: &[Rgb], tol: u8) -> usize {
    let (x, y, w, h) = inner;
    let l = x.saturating_sub(pad);
    let t = y.saturating_sub(pad);
    let r = (x + w + pad).min(cap.width);
    let b = (y + h + pad).min(cap.height);
    let mut n = 0;
    for yy in t..b {
        for xx in l..r {
            let inside = xx >= x && xx < x + w && yy >= y && yy < y + h;
            if !inside && matches_any(cap.rgb(xx, yy), colors, tol) {
                n += 1;
            }
        }
    }
    n
}

fn dilate(m: &Mask, kw: u32, kh: u32) -> Mask {
    let (ax, ay) = ((kw / 2) as i64, (kh / 2) as i64);
    let mut out = Mask::new(m.width, m.height);
    for y in 0..m.height as i64 {
        for x in 0..m.width as i64 {
            let hit = (-ay..kh as i64 - ay).any(|dy| {
                (-ax..kw as i64 - ax).any(|dx| {
                    let (sx, sy) = (x + dx, y + dy);
                    sx >= 0 && sy >= 0 && sx < m.width as i64 && sy < m.height as i64 && m.get(sx as u32, sy as u32)
                })
            });
            out.bits[(y as u32 * m.width + x as u32) as usize] = hit;
        }
    }
    out
}

fn erode(m: &Mask, kw: u32, kh: u32) -> Mask {
    let (ax, ay) = ((kw / 2) as i64, (kh / 2) as i64);
    let mut out = Mask::new(m.width, m.height);
    for y in 0..m.height as i64 {
        for x in 0..m.width as i64 {
            // Out-of-bounds neighbours count as set (border replicate for closing).
            let all = (-ay..kh as i64 - ay).all(|dy| {
                (-ax..kw as i64 - ax).all(|dx| {
                    let (sx, sy) = (x + dx, y + dy);
                    sx < 0 || sy < 0 || sx >= m.width as i64 || sy >= m.height as i64 || m.get(sx as u32, sy as u32)
                })
            });
            out.bits[(y as u32 * m.width + x as u32) as usize] = all;
        }
    }
    out
}

/// Morphological closing with a `kw × kh` rectangle, `iterations` times.
pub fn close(m: &Mask, kw: u32, kh: u32, iterations: u32) -> Mask {
    let mut cur = m.clone();
    for _ in 0..iterations {
        cur = dilate(&cur, kw, kh);
    }
    for _ in 0..iterations {
        cur = erode(&cur, kw, kh);
    }
    cur
}

/// Bounding boxes of 8-connected components.
pub fn components(m: &Mask) -> Vec<Band> {
    let mut seen = vec![false; m.bits.len()];
    let mut out = Vec::new();
    let mut stack = Vec::new();
    for start in 0..m.bits.len() {
        if !m.bits[start] || seen[start] {
            continue;
        }
        let (mut l, mut t, mut r, mut b) = (u32::MAX, u32::MAX, 0, 0);
        seen[start] = true;
        stack.push(start);
        while let Some(i) = stack.pop() {
            let (x, y) = (i as u32 % m.width, i as u32 / m.width);
            l = l.min(x);
            t = t.min(y);
            r = r.max(x);
            b = b.max(y);
            for dy in -1i64..=1 {
                for dx in -1i64..=1 {
                    let (nx, ny) = (x as i64 + dx, y as i64 + dy);
                    if nx < 0 || ny < 0 || nx >= m.width as i64 || ny >= m.height as i64 {
                        continue;
                    }
                    let j = (ny as u32 * m.width + nx as u32) as usize;
                    if m.bits[j] && !seen[j] {
                        seen[j] = true;
                        stack.push(j);
                    }
                }
            }
        }
        out.push((l, t, r - l + 1, b - t + 1));
    }
    out
}

/// Widest band after closing with a 9×3 kernel twice; ties go to the
/// flatter band.
pub fn biggest_horizontal_band(m: &Mask) -> Option<Band> {
    let merged = close(m, 9, 3, 2);
    components(&merged)
        .into_iter()
        .max_by(|a, b| a.2.cmp(&b.2).then(b.3.cmp(&a.3)))
}

/// Stray dead-colored pixels expected at full HP.
pub const DEAD_BASELINE_PX: usize = 4;

/// HP ratio from alive/dead bar palettes.
///
/// With both palettes: the widths of the biggest alive and dead bands, or
/// area ratios when neither band exists. With one palette: its area share.
/// `None` when nothing decides the ratio; callers keep the previous value.
pub fn hp_ratio(cap: &Capture, alive: &[Rgb], dead: &[Rgb], tol: u8) -> Option<f64> {
    let total = (cap.width * cap.height) as usize;
    if total == 0 {
        return None;
    }
    match (alive.is_empty(), dead.is_empty()) {
        (false, false) => {
            let am = mask_for_colors(cap, alive, tol);
            let dm = mask_for_colors(cap, dead, tol);
            let aw = biggest_horizontal_band(&am).map_or(0, |b| b.2);
            let dw = biggest_horizontal_band(&dm).map_or(0, |b| b.2);
            if aw + dw > 0 {
                return Some(aw as f64 / (aw + dw) as f64);
            }
            let alive_only = am.minus(&dm);
            let dead_only = dm.minus(&am).saturating_sub(DEAD_BASELINE_PX);
            let denom = alive_only + dead_only;
            (denom > 0).then(|| alive_only as f64 / denom as f64)
        }
        (false, true) => Some(mask_for_colors(cap, alive, tol).count() as f64 / total as f64),
        (true, false) => {
            let dead_adj = mask_for_colors(cap, dead, tol).count().saturating_sub(DEAD_BASELINE_PX);
            Some(1.0 - dead_adj as f64 / total as f64)
        }
        (true, true) => None,
    }
}
