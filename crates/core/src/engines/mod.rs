//! Behavior cores. Each engine is a plain function or small state machine
//! over an [`EngineCtx`]; per-server numbers come in as data structs.

pub mod autofarm;
pub mod buff;
pub mod dashboard;
pub mod macros;
pub mod record;
pub mod respawn;
pub mod stabilize;
pub mod teleport;
pub mod ui_guard;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;

use crate::flow::step::{Layout, LayoutTarget, Op, Step};
use crate::flow::FlowCtx;
use crate::hud::{HudSink, Severity};
use crate::pool::StatePool;
use crate::sleep::sleep_ms;
use crate::transport::Controller;
use crate::types::{Point, WindowInfo};
use crate::vision::{TemplateScope, Vision, Zone};

/// Step result: `(ok, advance)`.
pub type StepOutcome = (bool, bool);

/// Shared handles every engine works through.
#[derive(Clone)]
pub struct EngineCtx {
    pub pool: StatePool,
    pub vision: Vision,
    pub controller: Controller,
    pub hud: Arc<dyn HudSink>,
}

impl EngineCtx {
    pub fn new(pool: StatePool, vision: Vision, controller: Controller, hud: Arc<dyn HudSink>) -> Self {
        Self { pool, vision, controller, hud }
    }

    /// Current `window.info`, re-read on every call.
    pub fn window(&self) -> Option<WindowInfo> {
        WindowInfo::from_value(&self.pool.get("window.info", Value::Null))
    }

    pub fn scope(&self, engine: &str) -> TemplateScope {
        TemplateScope::new(engine, &self.pool.server(), &self.pool.language())
    }

    pub fn find(&self, engine: &str, zone: &Zone, parts: &[String], thr: f64) -> Option<Point> {
        let win = self.window()?;
        self.vision.find(&win, zone, &self.scope(engine), parts, thr)
    }

    pub fn visible(&self, engine: &str, zone: &Zone, parts: &[String], thr: f64) -> bool {
        self.find(engine, zone, parts, thr).is_some()
    }

    /// Poll until found; at least one probe.
    pub fn wait_found(
        &self,
        engine: &str,
        zone: &Zone,
        parts: &[String],
        thr: f64,
        timeout: Duration,
        poll: Duration,
    ) -> Option<Point> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(p) = self.find(engine, zone, parts, thr) {
                return Some(p);
            }
            if Instant::now() >= deadline {
                return None;
            }
            std::thread::sleep(poll);
        }
    }

    /// Poll until the template is no longer visible.
    pub fn wait_gone(&self, engine: &str, zone: &Zone, parts: &[String], thr: f64, timeout: Duration, poll: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if !self.visible(engine, zone, parts, thr) {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(poll);
        }
    }

    /// Move, hover, hardware left click, settle.
    pub fn hover_click(&self, p: Point, hover_ms: u64, post_ms: u64) -> bool {
        if !self.controller.move_to(p) {
            return false;
        }
        sleep_ms(hover_ms);
        let ok = self.controller.send("l");
        sleep_ms(post_ms);
        ok
    }

    pub fn flow(&self, engine: &str) -> FlowCtx {
        FlowCtx::new(self.pool.clone(), self.vision.clone(), self.controller.clone(), engine)
    }

    /// Per-server data file next to the engine's templates.
    pub fn data_file(&self, engine: &str, name: &str) -> PathBuf {
        self.vision.store().root().join(engine).join(self.pool.server()).join(name)
    }

    pub fn status(&self, scope: &str, severity: Severity, text: &str) {
        self.hud.status(scope, severity, text);
    }

    pub fn alive(&self) -> Option<bool> {
        self.pool.get_opt_bool("player.alive")
    }
}

/// Chat `/target <name>`. A Cyrillic name is typed on the RU layout with the
/// command prefix on EN.
pub fn target_steps(name: &str, ru: bool, settle_ms: u64) -> Vec<Step> {
    let mut steps = vec![Step::new(Op::PressEnter)];
    if ru {
        steps.extend([
            Step::new(Op::EnterText { text: "/target ".into(), layout: Layout::En }),
            Step::new(Op::SetLayout { layout: LayoutTarget::Ru, count: 1, delay_ms: 120 }),
            Step::new(Op::EnterText { text: name.into(), layout: Layout::Ru }).wait(60),
            Step::new(Op::PressEnter),
            Step::new(Op::SetLayout { layout: LayoutTarget::En, count: 1, delay_ms: 120 }),
        ]);
    } else {
        steps.extend([
            Step::new(Op::EnterText { text: format!("/target {}", name), layout: Layout::En }),
            Step::new(Op::PressEnter),
        ]);
    }
    steps.push(Step::new(Op::Sleep { ms: settle_ms }));
    steps
}

fn translit(c: char) -> Option<&'static str> {
    Some(match c {
        'а' => "a",
        'б' => "b",
        'в' => "v",
        'г' => "g",
        'д' => "d",
        'е' | 'ё' => "e",
        'ж' => "zh",
        'з' => "z",
        'и' => "i",
        'й' => "y",
        'к' => "k",
        'л' => "l",
        'м' => "m",
        'н' => "n",
        'о' => "o",
        'п' => "p",
        'р' => "r",
        'с' => "s",
        'т' => "t",
        'у' => "u",
        'ф' => "f",
        'х' => "h",
        'ц' => "ts",
        'ч' => "ch",
        'ш' => "sh",
        'щ' => "sch",
        'ъ' | 'ь' => "",
        'ы' => "y",
        'э' => "e",
        'ю' => "yu",
        'я' => "ya",
        _ => return None,
    })
}

/// Lower-case, Cyrillic transliterated, every other run of non `[a-z0-9]`
/// collapsed to one `_`, no leading or trailing `_`. May be empty.
pub fn slugify(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars().flat_map(char::to_lowercase) {
        if let Some(t) = translit(c) {
            out.push_str(t);
        } else if c.is_ascii_lowercase() || c.is_ascii_digit() {
            out.push(c);
        } else {
            out.push('_');
        }
    }
    let mut slug = String::with_capacity(out.len());
    for part in out.split('_').filter(|p| !p.is_empty()) {
        if !slug.is_empty() {
            slug.push('_');
        }
        slug.push_str(part);
    }
    slug
}

#[cfg(test)]
mod slug_tests {
    use super::slugify;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Новая запись"), "novaya_zapis");
        assert_eq!(slugify("  Elder Wolf!! 2 "), "elder_wolf_2");
        assert_eq!(slugify("Щука-ёж"), "schuka_ezh");
        assert_eq!(slugify("***"), "");
    }
}
