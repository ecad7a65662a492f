use std::io;
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEventKind, MouseEventKind};
use ratatui::{Terminal, backend::CrosstermBackend};

use revive_core::types::Command;

use crate::App;
use crate::ui;

/// What a key does outside the confirm dialog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Quit,
    Up,
    Down,
    Toggle,
    AutofarmNow,
    RecordToggle,
    PlayRecord,
    ToggleLog,
    ScrollUp,
    ScrollDown,
}

pub fn action_for(code: KeyCode) -> Option<Action> {
    Some(match code {
        KeyCode::Char('q') | KeyCode::Char('Q') => Action::Quit,
        KeyCode::Up | KeyCode::Char('k') | KeyCode::Char('K') => Action::Up,
        KeyCode::Down | KeyCode::Char('j') | KeyCode::Char('J') => Action::Down,
        KeyCode::Char(' ') | KeyCode::Enter => Action::Toggle,
        KeyCode::Char('f') | KeyCode::Char('F') => Action::AutofarmNow,
        KeyCode::Char('r') | KeyCode::Char('R') => Action::RecordToggle,
        KeyCode::Char('p') | KeyCode::Char('P') => Action::PlayRecord,
        KeyCode::Char('l') | KeyCode::Char('L') => Action::ToggleLog,
        KeyCode::PageUp => Action::ScrollUp,
        KeyCode::PageDown => Action::ScrollDown,
        _ => return None,
    })
}

fn apply(app: &mut App, action: Action) {
    match action {
        Action::Quit => app.request_quit(),
        Action::Up => app.move_up(),
        Action::Down => app.move_down(),
        Action::Toggle => app.toggle_selected(),
        Action::AutofarmNow => app.send(Command::AutofarmNow),
        Action::RecordToggle => app.send(Command::RecordToggle),
        Action::PlayRecord => app.send(Command::PlayRecord),
        Action::ToggleLog => app.toggle_log(),
        Action::ScrollUp => app.scroll_log_up(10),
        Action::ScrollDown => app.scroll_log_down(10),
    }
}

fn confirm_key(app: &mut App, code: KeyCode) {
    let Some(dialog) = app.confirm.as_mut() else { return };
    match code {
        KeyCode::Left | KeyCode::Right | KeyCode::Tab | KeyCode::Char('h') | KeyCode::Char('l') => dialog.toggle(),
        KeyCode::Char('y') | KeyCode::Char('Y') => {
            dialog.selected = true;
            app.answer_confirm();
        }
        KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => app.confirm = None,
        KeyCode::Enter => app.answer_confirm(),
        _ => {}
    }
}

pub fn run(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>, app: &mut App) -> anyhow::Result<()> {
    loop {
        if app.should_quit {
            return Ok(());
        }

        app.drain_logs();
        terminal.draw(|f| ui::draw(f, app))?;

        // 100ms poll keeps the status panel fresh
        if event::poll(Duration::from_millis(100))? {
            match event::read()? {
                Event::Key(key) => {
                    if key.kind != KeyEventKind::Press {
                        continue;
                    }
                    if app.confirm.is_some() {
                        confirm_key(app, key.code);
                    } else if let Some(action) = action_for(key.code) {
                        apply(app, action);
                    }
                }
                Event::Mouse(mouse) => match mouse.kind {
                    MouseEventKind::ScrollUp => app.scroll_log_up(3),
                    MouseEventKind::ScrollDown => app.scroll_log_down(3),
                    _ => {}
                },
                _ => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    use revive_core::pool::StatePool;

    #[test]
    fn test_keymap() {
        assert_eq!(action_for(KeyCode::Char('j')), Some(Action::Down));
        assert_eq!(action_for(KeyCode::Enter), Some(Action::Toggle));
        assert_eq!(action_for(KeyCode::Char('F')), Some(Action::AutofarmNow));
        assert_eq!(action_for(KeyCode::Char('x')), None);
    }

    #[test]
    fn test_dialog_swallows_keys() {
        let (_log_tx, log_rx) = mpsc::channel();
        let (cmd_tx, cmd_rx) = mpsc::channel();
        let mut app = App::new(StatePool::with_defaults(), log_rx, cmd_tx);
        apply(&mut app, Action::Quit);
        assert!(app.confirm.is_some());
        confirm_key(&mut app, KeyCode::Char('j'));
        assert_eq!(app.selected, 0);
        confirm_key(&mut app, KeyCode::Esc);
        assert!(app.confirm.is_none() && !app.should_quit);

        apply(&mut app, Action::Quit);
        confirm_key(&mut app, KeyCode::Char('y'));
        assert!(app.should_quit);
        assert_eq!(cmd_rx.try_recv().unwrap(), Command::Quit);
    }
}
