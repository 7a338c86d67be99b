use std::io;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEventKind, MouseEventKind};
use ratatui::{backend::CrosstermBackend, Terminal};

use grinder_core::platform::hotkey;
use grinder_core::types::SessionState;

use crate::ui;
use crate::App;

/// TUI loop on the main thread. `hotkey` is raised by the global stop chord.
pub fn run(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
    hotkey: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    loop {
        if app.should_quit {
            return Ok(());
        }

        if hotkey::take_press(&hotkey) && app.session_state() == SessionState::Running {
            app.stop_session();
            hotkey::activate_terminal();
        }

        app.drain_logs();
        terminal.draw(|f| ui::draw(f, app))?;

        // 100ms poll keeps the hotkey and log panel responsive
        if !event::poll(Duration::from_millis(100))? {
            continue;
        }
        match event::read()? {
            Event::Key(key) if key.kind == KeyEventKind::Press => {
                if let Some(dialog) = app.confirm.as_mut() {
                    if let Some(answer) = dialog.handle_key(key.code) {
                        app.resolve_confirm(answer);
                    }
                    continue;
                }
                match key.code {
                    KeyCode::Char('q') | KeyCode::Char('Q') => app.request_quit(),
                    KeyCode::Char('s') | KeyCode::Char('S') => app.start_stop(),
                    KeyCode::Char('l') | KeyCode::Char('L') => app.toggle_log(),
                    KeyCode::Up | KeyCode::Char('k') => app.scroll_log_up(1),
                    KeyCode::Down | KeyCode::Char('j') => app.scroll_log_down(1),
                    KeyCode::PageUp => app.scroll_log_up(10),
                    KeyCode::PageDown => app.scroll_log_down(10),
                    _ => {}
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
