use crossterm::event::KeyCode;
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph},
    Frame,
};

/// Modal yes/no prompt. Defaults to "No".
pub struct ConfirmDialog {
    pub message: String,
    pub yes: bool,
}

impl ConfirmDialog {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), yes: false }
    }

    /// Returns the answer once the user commits to one.
    pub fn handle_key(&mut self, code: KeyCode) -> Option<bool> {
        match code {
            KeyCode::Left | KeyCode::Right | KeyCode::Tab | KeyCode::Char('h') | KeyCode::Char('l') => {
                self.yes = !self.yes;
                None
            }
            KeyCode::Char('y') | KeyCode::Char('Y') => Some(true),
            KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => Some(false),
            KeyCode::Enter => Some(self.yes),
            _ => None,
        }
    }

    pub fn render(&self, f: &mut Frame) {
        let width = (self.message.len() as u16 + 6).max(32);
        let area = centered_rect(width, 7, f.area());
        f.render_widget(Clear, area);

        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Yellow))
            .title(" Confirm ");
        let inner = block.inner(area);
        f.render_widget(block, area);

        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1),
                Constraint::Length(1),
                Constraint::Length(1),
                Constraint::Length(1),
            ])
            .split(inner);

        let msg = Paragraph::new(Line::from(Span::styled(&self.message, Style::default().fg(Color::White))))
            .alignment(Alignment::Center);
        f.render_widget(msg, rows[1]);

        let (yes_style, no_style) = if self.yes {
            (
                Style::default().fg(Color::Black).bg(Color::Green).add_modifier(Modifier::BOLD),
                Style::default().fg(Color::DarkGray),
            )
        } else {
            (
                Style::default().fg(Color::DarkGray),
                Style::default().fg(Color::Black).bg(Color::Red).add_modifier(Modifier::BOLD),
            )
        };
        let buttons = Line::from(vec![
            Span::styled("  [Yes]  ", yes_style),
            Span::raw("   "),
            Span::styled("  [No]  ", no_style),
        ]);
        f.render_widget(Paragraph::new(buttons).alignment(Alignment::Center), rows[3]);
    }
}

fn centered_rect(width: u16, height: u16, area: Rect) -> Rect {
    let x = area.x + area.width.saturating_sub(width) / 2;
    let y = area.y + area.height.saturating_sub(height) / 2;
    Rect::new(x, y, width.min(area.width), height.min(area.height))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enter_follows_selection() {
        let mut dialog = ConfirmDialog::new("quit?");
        assert_eq!(dialog.handle_key(KeyCode::Enter), Some(false));
        assert_eq!(dialog.handle_key(KeyCode::Left), None);
        assert_eq!(dialog.handle_key(KeyCode::Enter), Some(true));
    }

    #[test]
    fn test_shortcuts() {
        let mut dialog = ConfirmDialog::new("quit?");
        assert_eq!(dialog.handle_key(KeyCode::Char('y')), Some(true));
        assert_eq!(dialog.handle_key(KeyCode::Esc), Some(false));
        assert_eq!(dialog.handle_key(KeyCode::Char('x')), None);
    }
}
