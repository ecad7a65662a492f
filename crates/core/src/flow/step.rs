use serde::{Deserialize, Serialize};

/// Template reference: a key into the flow's template map, or explicit parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Tpl {
    Key(String),
    Parts(Vec<String>),
}

impl From<&str> for Tpl {
    fn from(s: &str) -> Self {
        Tpl::Key(s.to_string())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
    #[default]
    Auto,
    Ru,
    En,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayoutTarget {
    Toggle,
    Switch,
    Ru,
    En,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetryAction {
    #[default]
    Repeat,
    Prev,
    Restart,
}

fn d_thr() -> f64 { 0.87 }
fn d_one() -> u32 { 1 }
fn d_wait_opt_ms() -> u64 { 2000 }
fn d_click_opt_ms() -> u64 { 800 }
fn d_click_delay() -> u64 { 80 }
fn d_move_delay() -> u64 { 50 }
fn d_send_delay() -> u64 { 100 }
fn d_layout_delay() -> u64 { 120 }
fn d_locked_ms() -> u64 { 12000 }
fn d_locked_probe() -> f64 { 1.0 }
fn d_visible_ms() -> u64 { 10000 }
fn d_visible_probe() -> f64 { 0.5 }
fn d_visible_cmd() -> String { "b".into() }
fn d_pin_zone() -> String { "fullscreen".into() }
fn d_pin_tpl() -> Tpl { Tpl::Key("enter_pincode".into()) }
fn d_pin_digit() -> u64 { 120 }
fn d_pin_ms() -> u64 { 1500 }
fn d_resolver_ms() -> u64 { 2500 }

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Op {
    Sleep { ms: u64 },
    Wait { zone: String, tpl: Tpl, timeout_ms: u64 },
    WaitOptional { zone: String, tpl: Tpl, #[serde(default = "d_wait_opt_ms")] timeout_ms: u64 },
    ClickIn { zone: String, tpl: Tpl, timeout_ms: u64 },
    ClickAny { zones: Vec<String>, tpl: Tpl, timeout_ms: u64 },
    ClickOptional { zone: String, tpl: Tpl, #[serde(default = "d_click_opt_ms")] timeout_ms: u64 },
    ClickZoneCenter { zone: String, #[serde(default = "d_click_delay")] delay_ms: u64 },
    MoveZoneCenter { zone: String, #[serde(default = "d_move_delay")] delay_ms: u64 },
    SendArduino {
        cmd: String,
        #[serde(default = "d_one")]
        count: u32,
        #[serde(default = "d_send_delay")]
        delay_ms: u64,
    },
    EnterText { text: String, #[serde(default)] layout: Layout },
    PressEnter,
    PressEsc,
    SendMessage { text: String, #[serde(default)] layout: Layout },
    SetLayout {
        layout: LayoutTarget,
        #[serde(default = "d_one")]
        count: u32,
        #[serde(default = "d_layout_delay")]
        delay_ms: u64,
    },
    DashboardIsLocked {
        zone: String,
        tpl: Tpl,
        #[serde(default = "d_locked_ms")]
        timeout_ms: u64,
        #[serde(default = "d_locked_probe")]
        probe_interval_s: f64,
    },
    WhileVisibleSend {
        zone: String,
        tpl: Tpl,
        #[serde(default = "d_visible_cmd")]
        cmd: String,
        #[serde(default = "d_visible_ms")]
        timeout_ms: u64,
        #[serde(default = "d_visible_probe")]
        probe_interval_s: f64,
    },
    EnterPincode {
        #[serde(default = "d_pin_zone")]
        zone: String,
        #[serde(default = "d_pin_tpl")]
        visible_tpl: Tpl,
        #[serde(default = "d_pin_digit")]
        digit_delay_ms: u64,
        #[serde(default = "d_pin_ms")]
        timeout_ms: u64,
    },
    ClickVillage { zone: String, #[serde(default = "d_resolver_ms")] timeout_ms: u64 },
    ClickLocation { zone: String, #[serde(default = "d_resolver_ms")] timeout_ms: u64 },
}

impl Op {
    pub fn name(&self) -> &'static str {
        match self {
            Op::Sleep { .. } => "sleep",
            Op::Wait { .. } => "wait",
            Op::WaitOptional { .. } => "wait_optional",
            Op::ClickIn { .. } => "click_in",
            Op::ClickAny { .. } => "click_any",
            Op::ClickOptional { .. } => "click_optional",
            Op::ClickZoneCenter { .. } => "click_zone_center",
            Op::MoveZoneCenter { .. } => "move_zone_center",
            Op::SendArduino { .. } => "send_arduino",
            Op::EnterText { .. } => "enter_text",
            Op::PressEnter => "press_enter",
            Op::PressEsc => "press_esc",
            Op::SendMessage { .. } => "send_message",
            Op::SetLayout { .. } => "set_layout",
            Op::DashboardIsLocked { .. } => "dashboard_is_locked",
            Op::WhileVisibleSend { .. } => "while_visible_send",
            Op::EnterPincode { .. } => "enter_pincode",
            Op::ClickVillage { .. } => "click_village",
            Op::ClickLocation { .. } => "click_location",
        }
    }
}

/// One flow step: an operation plus the universal modifiers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    #[serde(flatten)]
    pub op: Op,
    #[serde(default = "d_thr")]
    pub thr: f64,
    /// Pause after the step (ignored for `sleep`).
    #[serde(default)]
    pub wait_ms: u64,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default)]
    pub retry_action: RetryAction,
    #[serde(default)]
    pub retry_delay_ms: u64,
}

impl Step {
    pub fn new(op: Op) -> Self {
        let thr = match op {
            Op::ClickVillage { .. } | Op::ClickLocation { .. } => 0.88,
            _ => d_thr(),
        };
        Self { op, thr, wait_ms: 0, retry_count: 0, retry_action: RetryAction::Repeat, retry_delay_ms: 0 }
    }

    pub fn thr(mut self, thr: f64) -> Self {
        self.thr = thr;
        self
    }

    pub fn wait(mut self, ms: u64) -> Self {
        self.wait_ms = ms;
        self
    }

    pub fn retry(mut self, count: u32, action: RetryAction, delay_ms: u64) -> Self {
        self.retry_count = count;
        self.retry_action = action;
        self.retry_delay_ms = delay_ms;
        self
    }
}

/// Parse a flow from a JSON array of steps.
pub fn parse_flow(json: &str) -> crate::error::Result<Vec<Step>> {
    Ok(serde_json::from_str(json)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flow_json() {
        let flow = parse_flow(
            r#"[
                {"op": "send_arduino", "cmd": "altB", "wait_ms": 300},
                {"op": "wait", "zone": "fullscreen", "tpl": "dashboard_init", "timeout_ms": 2000,
                 "retry_count": 2, "retry_action": "prev"},
                {"op": "click_in", "zone": "fullscreen", "tpl": ["<lang>", "main", "x.png"], "timeout_ms": 500, "thr": 0.8},
                {"op": "press_esc"},
                {"op": "enter_text", "text": "{account.login}", "layout": "en"}
            ]"#,
        )
        .unwrap();
        assert_eq!(flow.len(), 5);
        assert_eq!(flow[0].op, Op::SendArduino { cmd: "altB".into(), count: 1, delay_ms: 100 });
        assert_eq!(flow[0].wait_ms, 300);
        assert_eq!(flow[1].retry_action, RetryAction::Prev);
        assert_eq!(flow[1].thr, 0.87);
        assert!(matches!(&flow[2].op, Op::ClickIn { tpl: Tpl::Parts(p), .. } if p.len() == 3));
        assert_eq!(flow[2].thr, 0.8);
        assert_eq!(flow[3].op.name(), "press_esc");
    }

    #[test]
    fn test_unknown_op_is_rejected() {
        assert!(parse_flow(r#"[{"op": "teleport_home"}]"#).is_err());
    }
}
