use std::io;
use std::path::PathBuf;
use std::sync::mpsc;

use anyhow::Result;
use crossterm::{
    execute,
    event::{EnableMouseCapture, DisableMouseCapture},
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{Terminal, backend::CrosstermBackend};

use revive_core::logger;
use revive_core::runtime::{Runtime, RuntimeOptions};
use revive_core::settings::Settings;

fn main() -> Result<()> {
    let force_stub = std::env::args().any(|a| a == "--stub");
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));

    logger::init(&cwd.join("logs"));
    logger::register_core_prefixes();

    let settings = Settings::load(&cwd.join("settings.json"));
    let runtime = Runtime::build(RuntimeOptions::from_settings(settings, cwd, force_stub))?;

    // Channels
    let (log_tx, log_rx) = mpsc::channel::<String>();
    logger::set_tui_sender(log_tx);
    logger::info(&format!("revive {} started, server {}", env!("CARGO_PKG_VERSION"), runtime.pool.server()));

    runtime.start()?;

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = revive_tui::App::new(runtime.pool.clone(), log_rx, runtime.commands());

    // Run TUI event loop on main thread
    let result = revive_tui::event::run(&mut terminal, &mut app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, DisableMouseCapture)?;
    terminal.show_cursor()?;

    logger::clear_tui_sender();
    runtime.shutdown();
    result
}
