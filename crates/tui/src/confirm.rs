use ratatui::{
    Frame,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph},
};

/// Yes/No modal drawn over the main view.
pub struct ConfirmDialog {
    pub message: String,
    pub selected: bool, // true = Yes
}

impl ConfirmDialog {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), selected: false }
    }

    pub fn toggle(&mut self) {
        self.selected = !self.selected;
    }

    fn width(&self) -> u16 {
        (self.message.chars().count() as u16 + 6).clamp(30, 70)
    }

    pub fn render(&self, f: &mut Frame) {
        let area = centered_rect(self.width(), 7, f.area());
        f.render_widget(Clear, area);

        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Yellow))
            .title(" Confirm ");
        let inner = block.inner(area);
        f.render_widget(block, area);

        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(1); 4])
            .split(inner);

        let msg = Paragraph::new(Line::from(Span::styled(&self.message, Style::default().fg(Color::White))))
            .alignment(Alignment::Center);
        f.render_widget(msg, rows[1]);

        let button = |text: &'static str, active: bool, bg: Color| {
            if active {
                Span::styled(text, Style::default().fg(Color::Black).bg(bg).add_modifier(Modifier::BOLD))
            } else {
                Span::styled(text, Style::default().fg(Color::DarkGray))
            }
        };
        let buttons = Line::from(vec![
            button("  [Yes]  ", self.selected, Color::Green),
            Span::raw("   "),
            button("  [No]  ", !self.selected, Color::Red),
        ]);
        f.render_widget(Paragraph::new(buttons).alignment(Alignment::Center), rows[3]);
    }
}

/// Centered `Rect` of `width` x `height` inside `area`, clipped to it.
fn centered_rect(width: u16, height: u16, area: Rect) -> Rect {
    let x = area.x + area.width.saturating_sub(width) / 2;
    let y = area.y + area.height.saturating_sub(height) / 2;
    Rect::new(x, y, width.min(area.width), height.min(area.height))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_to_no() {
        let mut d = ConfirmDialog::new("Quit?");
        assert!(!d.selected);
        d.toggle();
        assert!(d.selected);
        assert_eq!(d.width(), 30);
    }

    #[test]
    fn test_centered_rect_clips() {
        let r = centered_rect(40, 7, Rect::new(0, 0, 20, 5));
        assert_eq!(r, Rect::new(0, 0, 20, 5));
        let r = centered_rect(10, 4, Rect::new(0, 0, 30, 10));
        assert_eq!(r, Rect::new(10, 3, 10, 4));
    }
}
