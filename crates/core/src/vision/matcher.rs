//! Normalized cross-correlation template matching.
//!
//! Scores are the zero-mean normalized correlation between the template and
//! each same-sized window of the haystack, in `[-1, 1]`. Window statistics
//! come from integral images; large templates are first located on a
//! downsampled pyramid level and then refined at full resolution around the
//! strongest coarse peaks. A refined score short of an exact match falls
//! back to the full-resolution scan, so look-alike areas on the coarse level
//! never hide the real peak.

use image::imageops::{self, FilterType};
use image::GrayImage;

use super::capture::GrayView;

/// Default scales for multi-scale matching, in probe order.
pub const SCALES: [f64; 5] = [1.0, 0.9, 1.1, 0.8, 1.2];

const MAX_PYRAMID_FACTOR: u32 = 4;
const COARSE_PEAKS: usize = 5;
/// Refined scores at or above this are the global peak.
const EXACT_SCORE: f64 = 0.999;
const FLAT_EPS: f64 = 1e-6;

/// Best template position, top-left in haystack coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchHit {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
    pub score: f32,
}

impl MatchHit {
    /// Center of the matched rectangle in haystack coordinates.
    pub fn center(&self) -> (i32, i32) {
        ((self.x + self.w / 2) as i32, (self.y + self.h / 2) as i32)
    }
}

struct Integral {
    stride: usize,
    sum: Vec<f64>,
    sq: Vec<f64>,
}

impl Integral {
    fn new(img: GrayView<'_>) -> Self {
        let (w, h) = (img.width as usize, img.height as usize);
        let stride = w + 1;
        let mut sum = vec![0.0; stride * (h + 1)];
        let mut sq = vec![0.0; stride * (h + 1)];
        for y in 0..h {
            let (mut row_s, mut row_q) = (0.0, 0.0);
            for x in 0..w {
                let v = img.data[y * w + x] as f64;
                row_s += v;
                row_q += v * v;
                sum[(y + 1) * stride + x + 1] = sum[y * stride + x + 1] + row_s;
                sq[(y + 1) * stride + x + 1] = sq[y * stride + x + 1] + row_q;
            }
        }
        Self { stride, sum, sq }
    }

    fn rect(table: &[f64], stride: usize, x: usize, y: usize, w: usize, h: usize) -> f64 {
        table[(y + h) * stride + x + w] - table[y * stride + x + w] - table[(y + h) * stride + x]
            + table[y * stride + x]
    }

    fn stats(&self, x: usize, y: usize, w: usize, h: usize) -> (f64, f64) {
        (
            Self::rect(&self.sum, self.stride, x, y, w, h),
            Self::rect(&self.sq, self.stride, x, y, w, h),
        )
    }
}

/// Zero-mean template with its L2 norm.
struct Prepared {
    w: usize,
    h: usize,
    zm: Vec<f64>,
    norm: f64,
}

impl Prepared {
    fn new(tpl: GrayView<'_>) -> Option<Self> {
        let n = tpl.data.len();
        if n == 0 {
            return None;
        }
        let mean = tpl.data.iter().map(|&v| v as f64).sum::<f64>() / n as f64;
        let zm: Vec<f64> = tpl.data.iter().map(|&v| v as f64 - mean).collect();
        let norm = zm.iter().map(|v| v * v).sum::<f64>().sqrt();
        if norm < FLAT_EPS {
            return None;
        }
        Some(Self { w: tpl.width as usize, h: tpl.height as usize, zm, norm })
    }

    fn score_at(&self, hay: GrayView<'_>, integ: &Integral, x: usize, y: usize) -> f64 {
        let n = (self.w * self.h) as f64;
        let (s, q) = integ.stats(x, y, self.w, self.h);
        let var = q - s * s / n;
        if var <= FLAT_EPS {
            return 0.0;
        }
        let hw = hay.width as usize;
        let mut num = 0.0;
        for j in 0..self.h {
            let row = &hay.data[(y + j) * hw + x..(y + j) * hw + x + self.w];
            let trow = &self.zm[j * self.w..(j + 1) * self.w];
            for (a, b) in row.iter().zip(trow) {
                num += *a as f64 * b;
            }
        }
        (num / (self.norm * var.sqrt())).clamp(-1.0, 1.0)
    }
}

/// Box-average downsample by an integer factor.
fn downsample(img: GrayView<'_>, f: u32) -> GrayImage {
    let (w, h) = (img.width / f, img.height / f);
    let mut out = GrayImage::new(w, h);
    let area = f * f;
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0u32;
            for j in 0..f {
                for i in 0..f {
                    acc += img.at(x * f + i, y * f + j) as u32;
                }
            }
            out.put_pixel(x, y, image::Luma([((acc + area / 2) / area) as u8]));
        }
    }
    out
}

fn pyramid_factor(tw: u32, th: u32) -> u32 {
    MAX_PYRAMID_FACTOR.min(tw / 8).min(th / 8).max(1)
}

/// Exhaustive search over `xs × ys`, returning (x, y, score).
fn search(
    hay: GrayView<'_>,
    integ: &Integral,
    tpl: &Prepared,
    xs: std::ops::RangeInclusive<usize>,
    ys: std::ops::RangeInclusive<usize>,
) -> Option<(usize, usize, f64)> {
    let mut best: Option<(usize, usize, f64)> = None;
    for y in ys {
        for x in xs.clone() {
            let s = tpl.score_at(hay, integ, x, y);
            if best.map_or(true, |b| s > b.2) {
                best = Some((x, y, s));
            }
        }
    }
    best
}

/// Strongest coarse positions, at least two cells apart.
fn coarse_peaks(hay: GrayView<'_>, tpl: &Prepared) -> Vec<(usize, usize)> {
    let integ = Integral::new(hay);
    let (mw, mh) = (hay.width as usize - tpl.w + 1, hay.height as usize - tpl.h + 1);
    let mut scored = Vec::with_capacity(mw * mh);
    for y in 0..mh {
        for x in 0..mw {
            scored.push((tpl.score_at(hay, &integ, x, y), x, y));
        }
    }
    scored.sort_by(|a, b| b.0.total_cmp(&a.0));
    let mut peaks: Vec<(usize, usize)> = Vec::with_capacity(COARSE_PEAKS);
    for (_, x, y) in scored {
        if peaks.iter().all(|&(px, py)| px.abs_diff(x) > 1 || py.abs_diff(y) > 1) {
            peaks.push((x, y));
            if peaks.len() == COARSE_PEAKS {
                break;
            }
        }
    }
    peaks
}

/// Best position of `tpl` inside `hay`. `None` when the template is larger
/// than the haystack, empty, or of uniform color.
pub fn best_match(hay: GrayView<'_>, tpl: GrayView<'_>) -> Option<MatchHit> {
    if tpl.width == 0 || tpl.height == 0 || tpl.width > hay.width || tpl.height > hay.height {
        return None;
    }
    let full = Prepared::new(tpl)?;
    let integ = Integral::new(hay);
    let (max_x, max_y) = ((hay.width - tpl.width) as usize, (hay.height - tpl.height) as usize);
    let hit = |(x, y, s): (usize, usize, f64)| MatchHit {
        x: x as u32,
        y: y as u32,
        w: tpl.width,
        h: tpl.height,
        score: s as f32,
    };

    let f = pyramid_factor(tpl.width, tpl.height);
    let coarse = if f > 1 {
        let small_hay = downsample(hay, f);
        let small_tpl = downsample(tpl, f);
        Prepared::new(GrayView::from(&small_tpl)).map(|p| coarse_peaks(GrayView::from(&small_hay), &p))
    } else {
        None
    };

    let refined = match coarse {
        Some(peaks) if !peaks.is_empty() => {
            let r = (2 * f) as usize;
            let f = f as usize;
            peaks
                .into_iter()
                .filter_map(|(px, py)| {
                    let (cx, cy) = (px * f, py * f);
                    let xs = cx.saturating_sub(r)..=(cx + r).min(max_x);
                    let ys = cy.saturating_sub(r)..=(cy + r).min(max_y);
                    search(hay, &integ, &full, xs, ys)
                })
                .fold(None, |acc: Option<(usize, usize, f64)>, c| match acc {
                    Some(a) if a.2 >= c.2 => Some(a),
                    _ => Some(c),
                })
        }
        _ => None,
    };
    let best = match refined {
        Some(b) if b.2 >= EXACT_SCORE => Some(b),
        _ => search(hay, &integ, &full, 0..=max_x, 0..=max_y),
    };
    best.map(hit)
}

/// Resize `tpl` by `scale` (triangle filter); identity at 1.0.
pub fn scaled(tpl: &GrayImage, scale: f64) -> GrayImage {
    if (scale - 1.0).abs() < f64::EPSILON {
        return tpl.clone();
    }
    let w = ((tpl.width() as f64 * scale).round() as u32).max(1);
    let h = ((tpl.height() as f64 * scale).round() as u32).max(1);
    imageops::resize(tpl, w, h, FilterType::Triangle)
}

/// Best hit over ordered `(key, template)` candidates and `scales`.
///
/// A later candidate replaces the current best only with a strictly greater
/// score, so earlier keys win ties. No threshold is applied here.
pub fn best_match_multi<'k>(
    hay: GrayView<'_>,
    candidates: &[(&'k str, &GrayImage)],
    scales: &[f64],
) -> Option<(MatchHit, &'k str)> {
    let mut best: Option<(MatchHit, &'k str)> = None;
    for (key, tpl) in candidates {
        for &s in scales {
            let t = scaled(tpl, s);
            let Some(hit) = best_match(hay, GrayView::from(&t)) else { continue };
            if best.map_or(true, |(b, _)| hit.score > b.score) {
                best = Some((hit, key));
            }
        }
    }
    best
}
