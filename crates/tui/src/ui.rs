use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout},
    style::{Color, Style, Modifier},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
};
use serde_json::Value;

use revive_core::pool::{StatePool, SERVICES};
use crate::app::feature_rows;
use crate::App;

fn label(text: &str) -> Span<'static> {
    Span::styled(format!(" {:<9}", text), Style::default().fg(Color::DarkGray))
}

fn tri(v: Option<bool>, yes: &str, no: &str) -> Span<'static> {
    match v {
        Some(true) => Span::styled(yes.to_string(), Style::default().fg(Color::Green)),
        Some(false) => Span::styled(no.to_string(), Style::default().fg(Color::Red)),
        None => Span::styled("unknown", Style::default().fg(Color::DarkGray)),
    }
}

fn status_lines(pool: &StatePool) -> Vec<Line<'static>> {
    let mut lines = Vec::new();

    let window = if pool.get_bool("window.found", false) {
        Span::styled(pool.get_str("window.title", "found"), Style::default().fg(Color::Yellow))
    } else {
        Span::styled("not found", Style::default().fg(Color::Red))
    };
    lines.push(Line::from(vec![label("window"), window]));
    lines.push(Line::from(vec![label("focus"), tri(pool.get_opt_bool("focus.is_focused"), "focused", "background")]));

    let hp = match pool.get_opt_f64("player.hp_ratio") {
        Some(r) => format!("  hp {:.0}%", r * 100.0),
        None => String::new(),
    };
    lines.push(Line::from(vec![
        label("player"),
        tri(pool.get_opt_bool("player.alive"), "alive", "dead"),
        Span::styled(hp, Style::default().fg(Color::DarkGray)),
    ]));

    let pipeline = if pool.get_bool("pipeline.paused", false) {
        Span::styled(
            format!("paused ({})", pool.get_str("pipeline.pause_reason", "")),
            Style::default().fg(Color::Yellow),
        )
    } else if pool.get_bool("pipeline.active", false) {
        Span::styled(
            format!("running: {}", pool.get_str("pipeline.last_step", "")),
            Style::default().fg(Color::Cyan),
        )
    } else {
        Span::styled("idle", Style::default().fg(Color::DarkGray))
    };
    lines.push(Line::from(vec![label("pipeline"), pipeline]));

    let mut services = vec![label("services")];
    for name in SERVICES {
        let color = if pool.get_bool(&format!("services.{}.running", name), false) {
            Color::Green
        } else {
            Color::DarkGray
        };
        services.push(Span::styled(format!("{} ", name), Style::default().fg(color)));
    }
    lines.push(Line::from(services));

    let hud = pool.get("ui_status.hud", Value::Null);
    if let Some(text) = hud.get("text").and_then(Value::as_str).filter(|t| !t.is_empty()) {
        let color = match hud.get("severity").and_then(Value::as_str) {
            Some("err") => Color::Red,
            Some("att") => Color::Yellow,
            Some("succ") => Color::Green,
            _ => Color::White,
        };
        lines.push(Line::from(vec![label("hud"), Span::styled(text.to_string(), Style::default().fg(color))]));
    }
    lines
}

pub fn draw(f: &mut Frame, app: &App) {
    let chunks = if app.log_visible {
        Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
            .split(f.area())
    } else {
        Layout::default()
            .constraints([Constraint::Percentage(100)])
            .split(f.area())
    };

    // -- Left panel: status and features --
    let mut lines = status_lines(&app.pool);
    lines.push(Line::from(""));

    for (i, row) in feature_rows(&app.pool).iter().enumerate() {
        let is_selected = i == app.selected;
        let prefix = if is_selected { "> " } else { "  " };

        let (indicator, color) = match (row.enabled, row.paused) {
            (true, true) => ("●", Color::Yellow),
            (true, false) => ("●", Color::Green),
            _ => ("○", Color::DarkGray),
        };

        let mut spans = vec![
            Span::raw(prefix),
            Span::styled(indicator, Style::default().fg(color)),
            Span::raw(" "),
        ];
        let name_style = if is_selected {
            Style::default().fg(Color::White).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(color)
        };
        spans.push(Span::styled(format!("{:<10}", row.name), name_style));
        if row.busy {
            spans.push(Span::styled(" busy", Style::default().fg(Color::Cyan)));
        }
        if row.paused {
            spans.push(Span::styled(format!(" paused: {}", row.pause_reason), Style::default().fg(Color::Yellow)));
        }
        if row.attempts > 0 {
            spans.push(Span::styled(format!(" try {}", row.attempts), Style::default().fg(Color::DarkGray)));
        }
        lines.push(Line::from(spans));
    }
    lines.push(Line::from(""));

    let key = |k: &'static str| Span::styled(k, Style::default().fg(Color::Yellow));
    lines.push(Line::from(vec![
        key(" j/k"),
        Span::raw(" nav  "),
        key("space"),
        Span::raw(" toggle  "),
        key("f"),
        Span::raw(" farm  "),
        key("r"),
        Span::raw(" rec  "),
        key("p"),
        Span::raw(" play  "),
        key("L"),
        Span::raw(" log  "),
        key("q"),
        Span::raw(" quit"),
    ]));

    let panel = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .title(format!(" revive · {} ", app.pool.server()))
            .border_style(Style::default().fg(Color::Cyan)),
    );
    f.render_widget(panel, chunks[0]);

    // -- Right panel: logs --
    if app.log_visible && chunks.len() > 1 {
        let visible_height = chunks[1].height.saturating_sub(2) as usize;
        let end = app.log_messages.len().saturating_sub(app.log_scroll);
        let start = end.saturating_sub(visible_height);
        let log_lines: Vec<Line> = app.log_messages[start..end]
            .iter()
            .map(|m| parse_log_line(m))
            .collect();

        let title = if app.log_scroll > 0 {
            format!(" Logs (+{}) ", app.log_scroll)
        } else {
            " Logs ".to_string()
        };
        let log_panel = Paragraph::new(log_lines)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(title)
                    .border_style(Style::default().fg(Color::Yellow)),
            )
            .wrap(Wrap { trim: false });
        f.render_widget(log_panel, chunks[1]);
    }

    if let Some(dialog) = &app.confirm {
        dialog.render(f);
    }
}

fn prefix_color(idx: u8) -> Color {
    match idx {
        1 => Color::DarkGray,  // COLOR_GRAY
        2 => Color::LightBlue, // COLOR_BLUE
        3 => Color::Green,     // COLOR_GREEN
        4 => Color::Yellow,    // COLOR_YELLOW
        5 => Color::Red,       // COLOR_RED
        _ => Color::White,
    }
}

/// Color a logger line (`level\x1fprefix\x1fcolor\x1ftime\x1fmessage`).
/// Anything else is shown as-is.
fn parse_log_line(raw: &str) -> Line<'_> {
    let fields: Vec<&str> = raw.splitn(5, '\x1f').collect();
    let [level, prefix, color, ts, message] = fields[..] else {
        return Line::from(raw);
    };
    let color = prefix_color(color.parse().unwrap_or(0));

    let mut spans = vec![Span::styled(ts, Style::default().fg(Color::DarkGray)), Span::raw(" ")];
    let tag = match level {
        "ERROR" => Some(("error ", Color::Red)),
        "WARN" => Some(("warn ", Color::Yellow)),
        _ => None,
    };
    if let Some((label, fg)) = tag {
        spans.push(Span::styled(label, Style::default().fg(fg)));
    }
    if !prefix.is_empty() {
        spans.push(Span::styled(prefix, Style::default().fg(color).add_modifier(Modifier::BOLD)));
        spans.push(Span::raw(" "));
    }
    spans.push(Span::styled(message, Style::default().fg(color)));
    Line::from(spans)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(line: &Line) -> String {
        line.spans.iter().map(|s| s.content.as_ref()).collect()
    }

    #[test]
    fn test_parse_structured_line() {
        let line = parse_log_line("WARN\x1fbuff\x1f3\x1f12:00:01\x1fno profile");
        assert_eq!(text(&line), "12:00:01 warn buff no profile");
        assert_eq!(line.spans[3].style.fg, Some(Color::Green));
    }

    #[test]
    fn test_parse_plain_line() {
        assert_eq!(text(&parse_log_line("hello")), "hello");
    }

    #[test]
    fn test_status_lines_reflect_pool() {
        let pool = StatePool::with_defaults();
        let joined = |p: &StatePool| status_lines(p).iter().map(text).collect::<Vec<_>>().join("\n");
        assert!(joined(&pool).contains("not found"));
        pool.write("player", serde_json::json!({ "alive": false, "hp_ratio": 0.0 })).unwrap();
        pool.set("ui_status.hud", serde_json::json!({ "text": "dead, respawning", "severity": "att" }));
        let s = joined(&pool);
        assert!(s.contains("dead"));
        assert!(s.contains("hp 0%"));
        assert!(s.contains("dead, respawning"));
    }
}
