use std::sync::mpsc;

use revive_core::pool::{StatePool, FEATURES};
use revive_core::types::Command;

use crate::confirm::ConfirmDialog;

/// One line of the feature list.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    pub name: String,
    pub enabled: bool,
    pub busy: bool,
    pub paused: bool,
    pub pause_reason: String,
    pub attempts: i64,
}

/// Pipeline features in their configured order, then the remaining ones.
pub fn feature_rows(pool: &StatePool) -> Vec<FeatureRow> {
    let mut names = pool.get_str_list("pipeline.order");
    for f in FEATURES {
        if !names.iter().any(|n| n == f) {
            names.push(f.to_string());
        }
    }
    names
        .into_iter()
        .map(|name| {
            let base = format!("features.{}", name);
            FeatureRow {
                enabled: pool.get_bool(&format!("{}.enabled", base), false),
                busy: pool.get_bool(&format!("{}.busy", base), false),
                paused: pool.get_bool(&format!("{}.paused", base), false),
                pause_reason: pool.get_str(&format!("{}.pause_reason", base), ""),
                attempts: pool.get_i64(&format!("{}.attempts", base), 0),
                name,
            }
        })
        .collect()
}

pub struct App {
    pub pool: StatePool,
    pub selected: usize,
    pub log_visible: bool,
    pub log_messages: Vec<String>,
    pub log_scroll: usize, // scroll offset from bottom (0 = latest)
    pub log_rx: mpsc::Receiver<String>,
    pub cmd_tx: mpsc::Sender<Command>,
    pub confirm: Option<ConfirmDialog>,
    pub should_quit: bool,
}

impl App {
    pub fn new(pool: StatePool, log_rx: mpsc::Receiver<String>, cmd_tx: mpsc::Sender<Command>) -> Self {
        Self {
            pool,
            selected: 0,
            log_visible: true,
            log_messages: Vec::new(),
            log_scroll: 0,
            log_rx,
            cmd_tx,
            confirm: None,
            should_quit: false,
        }
    }

    pub fn drain_logs(&mut self) {
        while let Ok(msg) = self.log_rx.try_recv() {
            self.log_messages.push(msg);
            if self.log_scroll > 0 {
                // keep the viewed lines in place
                self.log_scroll += 1;
            }
        }
    }

    pub fn scroll_log_up(&mut self, n: usize) {
        let max = self.log_messages.len();
        self.log_scroll = self.log_scroll.saturating_add(n).min(max);
    }

    pub fn scroll_log_down(&mut self, n: usize) {
        self.log_scroll = self.log_scroll.saturating_sub(n);
    }

    pub fn move_up(&mut self) {
        if self.selected > 0 {
            self.selected -= 1;
        }
    }

    pub fn move_down(&mut self) {
        let len = feature_rows(&self.pool).len();
        if self.selected + 1 < len {
            self.selected += 1;
        }
    }

    pub fn selected_name(&self) -> Option<String> {
        feature_rows(&self.pool).into_iter().nth(self.selected).map(|r| r.name)
    }

    pub fn toggle_selected(&mut self) {
        if let Some(name) = self.selected_name() {
            self.cmd_tx.send(Command::Toggle(name)).ok();
        }
    }

    pub fn send(&self, cmd: Command) {
        self.cmd_tx.send(cmd).ok();
    }

    pub fn toggle_log(&mut self) {
        self.log_visible = !self.log_visible;
    }

    /// Ask before quitting.
    pub fn request_quit(&mut self) {
        self.confirm = Some(ConfirmDialog::new("Quit and save preferences?"));
    }

    /// Close the dialog; quit when it was answered with Yes.
    pub fn answer_confirm(&mut self) {
        if let Some(dialog) = self.confirm.take() {
            if dialog.selected {
                self.quit();
            }
        }
    }

    pub fn quit(&mut self) {
        self.cmd_tx.send(Command::Quit).ok();
        self.should_quit = true;
    }
}
