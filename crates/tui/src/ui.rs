use chrono::Local;
use ratatui::{
    layout::{Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame,
};

use grinder_core::types::SessionState;

use crate::App;

pub fn draw(f: &mut Frame, app: &App) {
    let chunks = if app.log_visible {
        Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(45), Constraint::Percentage(55)])
            .split(f.area())
    } else {
        Layout::default()
            .constraints([Constraint::Percentage(100)])
            .split(f.area())
    };

    let (banner_label, banner_bg) = match app.session_state() {
        SessionState::Running => ("GRINDING (S or Cmd+Shift+K to stop)", Color::Green),
        SessionState::Stopping => ("STOPPING...", Color::Yellow),
        SessionState::Stopped => ("STOPPED (Press S to start)", Color::Red),
    };

    let lines = session_lines(app, banner_bg);

    let left = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Min(0)])
        .split(chunks[0]);

    let width = left[0].width as usize;
    let pad_total = width.saturating_sub(banner_label.len());
    let pad_left = pad_total / 2;
    let centered = format!(
        "{}{}{}",
        " ".repeat(pad_left),
        banner_label,
        " ".repeat(pad_total - pad_left)
    );
    let banner = Paragraph::new(Line::from(Span::styled(
        centered,
        Style::default().fg(Color::Black).bg(banner_bg).add_modifier(Modifier::BOLD),
    )));
    f.render_widget(banner, left[0]);

    let panel = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::LEFT | Borders::RIGHT | Borders::BOTTOM)
            .border_style(Style::default().fg(Color::Cyan)),
    );
    f.render_widget(panel, left[1]);

    if app.log_visible && chunks.len() > 1 {
        let visible_height = chunks[1].height.saturating_sub(2) as usize;
        let total = app.log_messages.len();
        let scroll = app.log_scroll.min(total.saturating_sub(visible_height));
        let start = total.saturating_sub(visible_height + scroll);
        let end = total.saturating_sub(scroll);
        let log_lines: Vec<Line> = app.log_messages[start..end].iter().map(|m| parse_log_line(m)).collect();

        let title = if scroll > 0 { format!(" Logs (+{}) ", scroll) } else { " Logs ".to_string() };
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

fn field<'a>(label: &'a str, value: String, color: Color) -> Line<'a> {
    Line::from(vec![
        Span::styled(format!(" {:<10}", label), Style::default().fg(Color::DarkGray)),
        Span::styled(value, Style::default().fg(color)),
    ])
}

fn session_lines(app: &App, accent: Color) -> Vec<Line<'static>> {
    let status = app.status.lock().unwrap().clone();
    let mut lines = vec![
        Line::from(vec![
            Span::styled(" s", Style::default().fg(Color::Yellow)),
            Span::raw(" start/stop, "),
            Span::styled("l", Style::default().fg(Color::Yellow)),
            Span::raw(" logs, "),
            Span::styled("q", Style::default().fg(Color::Yellow)),
            Span::raw(" quit"),
        ]),
        Line::from(""),
        Line::from(vec![
            Span::styled(" ", Style::default()),
            Span::styled(
                status.profile.clone(),
                Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
            ),
            Span::styled(format!("  {}", status.zone), Style::default().fg(Color::DarkGray)),
        ]),
        Line::from(""),
    ];

    if status.state == SessionState::Running {
        let elapsed = status
            .started
            .map(|t| (Local::now() - t).num_seconds().max(0))
            .unwrap_or(0);
        lines.push(field("elapsed", format!("{}m {}s", elapsed / 60, elapsed % 60), Color::White));
        lines.push(field("combat", status.combat.clone(), accent));
        lines.push(field("kills", status.kills.to_string(), Color::Cyan));
        lines.push(field("loot", status.loot_collected.to_string(), Color::Cyan));
        lines.push(field("deaths", status.deaths.to_string(), Color::Red));
    }

    if let Some(report) = &status.last_report {
        lines.push(Line::from(""));
        for row in report.to_string().lines() {
            lines.push(Line::from(Span::styled(format!(" {}", row), Style::default().fg(Color::Gray))));
        }
    }
    lines
}

/// Parse a structured log line (level\x1fprefix\x1fcolor\x1ftimestamp\x1fmessage)
/// into a colored Line.
fn parse_log_line(raw: &str) -> Line<'_> {
    let parts: Vec<&str> = raw.splitn(5, '\x1f').collect();
    if parts.len() < 5 {
        return Line::from(raw);
    }

    let (level, prefix, timestamp, message) = (parts[0], parts[1], parts[3], parts[4]);
    let color = match parts[2].parse::<u8>().unwrap_or(0) {
        1 => Color::DarkGray,
        2 => Color::LightBlue,
        3 => Color::LightGreen,
        _ => Color::White,
    };

    let mut spans = vec![
        Span::styled(timestamp, Style::default().fg(Color::DarkGray)),
        Span::raw(" "),
    ];
    match level {
        "ERROR" => spans.push(Span::styled("error ", Style::default().fg(Color::Red))),
        "WARN" => spans.push(Span::styled("warn ", Style::default().fg(Color::Yellow))),
        _ => {}
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

    #[test]
    fn test_parse_structured_line() {
        let line = parse_log_line("WARN\x1fcombat\x1f3\x1f12:00:01\x1ftimed out");
        let text: String = line.spans.iter().map(|s| s.content.as_ref()).collect();
        assert_eq!(text, "12:00:01 warn combat timed out");
    }

    #[test]
    fn test_parse_unstructured_line() {
        let line = parse_log_line("plain");
        assert_eq!(line.spans.len(), 1);
    }
}
