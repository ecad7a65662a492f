//! Flow trials: JSON flows executed against the stub platform and a
//! recording serial link.
//!
//!     cargo run -p revive-test --bin flow-check -- [filter]

use std::sync::Arc;

use image::{GrayImage, Luma};
use libtest_mimic::{Arguments, Failed, Trial};
use serde_json::json;

use revive_core::flow::keymap::ru_to_us;
use revive_core::flow::step::parse_flow;
use revive_core::flow::{run_flow, FlowCtx, PauseGate};
use revive_core::platform::stub::StubPlatform;
use revive_core::pool::StatePool;
use revive_core::transport::{Controller, RecordingLink, SentLog};
use revive_core::types::WindowInfo;
use revive_core::vision::capture::capture_from_gray;
use revive_core::vision::{parts, TemplateStore, Vision};

const WIN: WindowInfo = WindowInfo { x: 40, y: 30, width: 320, height: 240, hwnd: 9 };

struct Rig {
    dir: std::path::PathBuf,
    ctx: FlowCtx,
    log: SentLog,
    stub: Arc<StubPlatform>,
}

impl Drop for Rig {
    fn drop(&mut self) {
        std::fs::remove_dir_all(&self.dir).ok();
    }
}

fn texture(w: u32, h: u32, seed: u32) -> GrayImage {
    let mut state = seed.wrapping_mul(2654435761).max(1);
    GrayImage::from_fn(w, h, |_, _| {
        state ^= state << 13;
        state ^= state >> 17;
        state ^= state << 5;
        Luma([(state % 256) as u8])
    })
}

/// Stub window showing `button` (if any) at client (100, 60), with the
/// same image shipped as `dashboard/boh/common/main/button.png`.
fn rig(name: &str, button: Option<&GrayImage>, gate: Option<PauseGate>) -> Result<Rig, Failed> {
    let dir = std::env::temp_dir().join(format!("revive-flow-check-{}-{}", std::process::id(), name));
    let stub = Arc::new(StubPlatform::with_window(WIN));
    let mut frame = capture_from_gray(&GrayImage::from_pixel(WIN.width as u32, WIN.height as u32, Luma([30])));
    if let Some(img) = button {
        let file = dir.join("dashboard").join("boh").join("common").join("main").join("button.png");
        std::fs::create_dir_all(file.parent().ok_or("no parent")?)?;
        img.save(&file)?;
        frame.blit(&capture_from_gray(img), 100, 60);
    }
    stub.set_frame(Some(frame));

    let pool = StatePool::with_defaults();
    pool.write("window", json!({ "info": WIN.to_value() }))?;
    let (link, log) = RecordingLink::new();
    let controller = Controller::new(Box::new(link), stub.clone());
    let vision = Vision::new(stub.clone(), Arc::new(TemplateStore::new(&dir)));
    let mut ctx = FlowCtx::new(pool, vision, controller, "dashboard")
        .template("button", parts(&["common", "main", "button.png"]));
    if let Some(gate) = gate {
        ctx = ctx.with_gate(gate);
    }
    Ok(Rig { dir, ctx, log, stub })
}

fn expect_lines(log: &SentLog, want: &[&str]) -> Result<(), Failed> {
    let got = log.lines();
    if got == want {
        Ok(())
    } else {
        Err(format!("sent {:?}, expected {:?}", got, want).into())
    }
}

fn click_then_escape() -> Result<(), Failed> {
    let button = texture(30, 20, 8);
    let r = rig("click", Some(&button), None)?;
    let flow = parse_flow(
        r#"[
            {"op": "click_in", "zone": "fullscreen", "tpl": "button", "timeout_ms": 300},
            {"op": "press_esc"}
        ]"#,
    )?;
    if !run_flow(&r.ctx, &flow) {
        return Err("flow failed".into());
    }
    let cursor = r.stub.cursor_log();
    if cursor != vec![(40 + 115, 30 + 70)] {
        return Err(format!("cursor {:?}", cursor).into());
    }
    expect_lines(&r.log, &["l", "esc"])
}

fn missing_template_stops_the_flow() -> Result<(), Failed> {
    let r = rig("missing", None, None)?;
    let flow = parse_flow(
        r#"[
            {"op": "wait", "zone": "fullscreen", "tpl": "button", "timeout_ms": 50, "retry_count": 1},
            {"op": "press_esc"}
        ]"#,
    )?;
    if run_flow(&r.ctx, &flow) {
        return Err("flow passed without the template".into());
    }
    expect_lines(&r.log, &[])
}

fn optional_steps_tolerate_absence() -> Result<(), Failed> {
    let r = rig("optional", None, None)?;
    let flow = parse_flow(
        r#"[
            {"op": "wait_optional", "zone": "fullscreen", "tpl": "button", "timeout_ms": 50},
            {"op": "click_optional", "zone": "fullscreen", "tpl": "button", "timeout_ms": 50},
            {"op": "send_arduino", "cmd": "pagedown", "count": 2, "delay_ms": 0}
        ]"#,
    )?;
    if !run_flow(&r.ctx, &flow) {
        return Err("optional steps failed the flow".into());
    }
    expect_lines(&r.log, &["pagedown", "pagedown"])
}

fn closed_gate_sends_nothing() -> Result<(), Failed> {
    let gate: PauseGate = Arc::new(|| false);
    let r = rig("gate", None, Some(gate))?;
    let flow = parse_flow(r#"[{"op": "press_enter"}, {"op": "press_esc"}]"#)?;
    if run_flow(&r.ctx, &flow) {
        return Err("gated flow passed".into());
    }
    expect_lines(&r.log, &[])
}

fn lost_window_fails_geometry_steps() -> Result<(), Failed> {
    let r = rig("lost", None, None)?;
    r.ctx.pool.write("window", json!({ "info": null }))?;
    let flow = parse_flow(r#"[{"op": "click_zone_center", "zone": "fullscreen", "delay_ms": 0}]"#)?;
    if run_flow(&r.ctx, &flow) {
        return Err("clicked without a window".into());
    }
    expect_lines(&r.log, &[])
}

fn russian_text_maps_to_us_keys() -> Result<(), Failed> {
    let got = ru_to_us("Гном");
    if got == "Uyjv" {
        Ok(())
    } else {
        Err(format!("mapped to {:?}", got).into())
    }
}

fn main() {
    let args = Arguments::from_args();
    let trials = vec![
        Trial::test("flow::click_then_escape", click_then_escape),
        Trial::test("flow::missing_template", missing_template_stops_the_flow),
        Trial::test("flow::optional_steps", optional_steps_tolerate_absence),
        Trial::test("flow::closed_gate", closed_gate_sends_nothing),
        Trial::test("flow::lost_window", lost_window_fails_geometry_steps),
        Trial::test("keymap::russian_text", russian_text_maps_to_us_keys),
    ];
    libtest_mimic::run(&args, trials).exit();
}
