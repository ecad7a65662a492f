//! Vision trials over synthesized frames: matcher accuracy, HP bar
//! palettes and zone geometry, run without a game client.
//!
//!     cargo run -p revive-test --bin vision-check -- [filter]

use std::sync::Arc;

use image::{GrayImage, Luma};
use libtest_mimic::{Arguments, Failed, Trial};

use revive_core::platform::stub::StubPlatform;
use revive_core::rules::boh::data;
use revive_core::types::{Capture, WindowInfo};
use revive_core::vision::capture::{capture_from_gray, GrayView};
use revive_core::vision::colors::{hp_ratio, Rgb};
use revive_core::vision::matcher::{best_match, best_match_multi, scaled, SCALES};
use revive_core::vision::{parts, TemplateScope, TemplateStore, Vision, Zone};

fn texture(w: u32, h: u32, seed: u32) -> GrayImage {
    let mut state = seed.wrapping_mul(2654435761).max(1);
    GrayImage::from_fn(w, h, |_, _| {
        state ^= state << 13;
        state ^= state >> 17;
        state ^= state << 5;
        Luma([(state % 256) as u8])
    })
}

fn paste(hay: &mut GrayImage, tpl: &GrayImage, x: u32, y: u32) {
    for (tx, ty, p) in tpl.enumerate_pixels() {
        hay.put_pixel(x + tx, y + ty, *p);
    }
}

fn check(cond: bool, msg: impl Into<String>) -> Result<(), Failed> {
    if cond {
        Ok(())
    } else {
        let msg: String = msg.into();
        Err(msg.into())
    }
}

fn match_at(tw: u32, th: u32, x: u32, y: u32) -> Result<(), Failed> {
    let mut hay = texture(640, 360, 7);
    let tpl = texture(tw, th, 99);
    paste(&mut hay, &tpl, x, y);
    let hit = best_match(GrayView::from(&hay), GrayView::from(&tpl)).ok_or("no hit")?;
    check((hit.x, hit.y) == (x, y), format!("hit at ({},{}) expected ({},{})", hit.x, hit.y, x, y))?;
    check(hit.score > 0.99, format!("score {}", hit.score))
}

fn flat_template_never_matches() -> Result<(), Failed> {
    let hay = texture(200, 100, 3);
    let tpl = GrayImage::from_pixel(20, 10, Luma([128]));
    check(best_match(GrayView::from(&hay), GrayView::from(&tpl)).is_none(), "flat template matched")
}

fn oversized_template_never_matches() -> Result<(), Failed> {
    let hay = texture(40, 40, 3);
    let tpl = texture(41, 10, 4);
    check(best_match(GrayView::from(&hay), GrayView::from(&tpl)).is_none(), "oversized template matched")
}

fn multi_scale_picks_the_shown_key() -> Result<(), Failed> {
    let wolf = texture(40, 24, 11);
    let bear = texture(40, 24, 12);
    let mut hay = texture(400, 200, 5);
    paste(&mut hay, &scaled(&bear, 1.1), 150, 80);
    let candidates = [("wolf", &wolf), ("bear", &bear)];
    let (hit, key) = best_match_multi(GrayView::from(&hay), &candidates, &SCALES).ok_or("no hit")?;
    check(key == "bear", format!("picked {}", key))?;
    check(hit.score > 0.9, format!("score {}", hit.score))
}

fn bar(alive: Rgb, dead: Rgb, alive_w: u32, dead_w: u32) -> Capture {
    let mut cap = Capture::filled(170, 63, (8, 8, 8));
    cap.fill_rect(17, 20, alive_w, 5, alive);
    cap.fill_rect(17 + alive_w, 20, dead_w, 5, dead);
    cap
}

fn hp_ratio_reads(alive_w: u32, dead_w: u32) -> Result<(), Failed> {
    let cap = bar(data::HP_ALIVE[0], data::HP_DEAD[0], alive_w, dead_w);
    let ratio = hp_ratio(&cap, &data::HP_ALIVE, &data::HP_DEAD, 1).ok_or("no ratio")?;
    let want = alive_w as f64 / (alive_w + dead_w) as f64;
    check((ratio - want).abs() < 0.02, format!("ratio {:.3} expected {:.3}", ratio, want))
}

fn hp_ratio_undecided_without_bar() -> Result<(), Failed> {
    let cap = Capture::filled(170, 63, (8, 8, 8));
    let r = hp_ratio(&cap, &data::HP_ALIVE, &data::HP_DEAD, 1);
    check(r.is_none(), format!("ratio {:?} on an empty frame", r))
}

fn zones_follow_window_size() -> Result<(), Failed> {
    for (w, h) in [(800, 600), (1280, 720), (1920, 1080)] {
        let win = WindowInfo { x: 100, y: 50, width: w, height: h, hwnd: 1 };
        let r = data::target_zone().compute(&win);
        check(r.w == 500 && r.cx == w / 2, format!("target zone {:?} in {}x{}", r, w, h))?;
        let s = data::state_zone().compute(&win);
        check((s.l, s.t, s.r, s.b) == (0, 0, 170, 63), format!("state zone {:?}", s))?;
    }
    Ok(())
}

fn vision_finds_template_on_stub_frame() -> Result<(), Failed> {
    let dir = std::env::temp_dir().join(format!("revive-vision-check-{}", std::process::id()));
    let tpl = texture(24, 16, 42);
    let file = dir.join("respawn").join("boh").join("common").join("button.png");
    std::fs::create_dir_all(file.parent().ok_or("no parent")?)?;
    tpl.save(&file)?;

    let win = WindowInfo { x: 0, y: 0, width: 800, height: 600, hwnd: 77 };
    let stub = Arc::new(StubPlatform::with_window(win));
    let mut frame = texture(800, 600, 1);
    paste(&mut frame, &tpl, 300, 200);
    stub.set_frame(Some(capture_from_gray(&frame)));

    let vision = Vision::new(stub, Arc::new(TemplateStore::new(&dir)));
    let scope = TemplateScope::new("respawn", "boh", "rus");
    let found = vision.find(&win, &Zone::fullscreen(), &scope, &parts(&["common", "button.png"]), 0.9);
    std::fs::remove_dir_all(&dir).ok();
    check(found == Some((312, 208)), format!("found {:?}", found))
}

fn main() {
    let args = Arguments::from_args();
    let mut trials = Vec::new();
    for (tw, th, x, y) in [(24, 16, 0, 0), (24, 16, 616, 344), (60, 40, 301, 157), (120, 90, 77, 200)] {
        trials.push(Trial::test(format!("matcher::exact_{}x{}_at_{}_{}", tw, th, x, y), move || {
            match_at(tw, th, x, y)
        }));
    }
    trials.push(Trial::test("matcher::flat_template", flat_template_never_matches));
    trials.push(Trial::test("matcher::oversized_template", oversized_template_never_matches));
    trials.push(Trial::test("matcher::multi_scale_key", multi_scale_picks_the_shown_key));
    for (a, d) in [(136, 0), (68, 68), (20, 116), (10, 126)] {
        trials.push(Trial::test(format!("colors::hp_{}_{}", a, d), move || hp_ratio_reads(a, d)));
    }
    trials.push(Trial::test("colors::hp_undecided", hp_ratio_undecided_without_bar));
    trials.push(Trial::test("zone::boh_zones", zones_follow_window_size));
    trials.push(Trial::test("vision::stub_frame", vision_finds_template_on_stub_frame));
    libtest_mimic::run(&args, trials).exit();
}
