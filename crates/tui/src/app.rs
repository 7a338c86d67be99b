use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};

use grinder_core::orchestrator::SessionStatus;
use grinder_core::types::{Command, SessionState};

use crate::confirm::ConfirmDialog;

/// Keep at most this many log lines in memory.
const LOG_CAPACITY: usize = 2000;

pub struct App {
    pub status: Arc<Mutex<SessionStatus>>,
    /// Shared with the orchestrator's `Context`; clearing it interrupts
    /// long maneuvers immediately.
    pub run_flag: Arc<AtomicBool>,
    pub log_visible: bool,
    pub log_messages: Vec<String>,
    pub log_scroll: usize, // offset from bottom (0 = latest)
    pub log_rx: mpsc::Receiver<String>,
    pub cmd_tx: mpsc::Sender<Command>,
    pub confirm: Option<ConfirmDialog>,
    pub should_quit: bool,
}

impl App {
    pub fn new(
        status: Arc<Mutex<SessionStatus>>,
        run_flag: Arc<AtomicBool>,
        log_rx: mpsc::Receiver<String>,
        cmd_tx: mpsc::Sender<Command>,
    ) -> Self {
        Self {
            status,
            run_flag,
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
        }
        if self.log_messages.len() > LOG_CAPACITY {
            let excess = self.log_messages.len() - LOG_CAPACITY;
            self.log_messages.drain(..excess);
        }
    }

    pub fn scroll_log_up(&mut self, n: usize) {
        self.log_scroll = self.log_scroll.saturating_add(n);
    }

    pub fn scroll_log_down(&mut self, n: usize) {
        self.log_scroll = self.log_scroll.saturating_sub(n);
    }

    pub fn toggle_log(&mut self) {
        self.log_visible = !self.log_visible;
    }

    /// Session state as the banner shows it. A running session whose run
    /// flag is already down is on its way out.
    pub fn session_state(&self) -> SessionState {
        let state = self.status.lock().unwrap().state;
        match state {
            SessionState::Running if !self.run_flag.load(Ordering::Acquire) => SessionState::Stopping,
            other => other,
        }
    }

    pub fn start_stop(&mut self) {
        match self.session_state() {
            SessionState::Running => self.stop_session(),
            SessionState::Stopped => {
                self.cmd_tx.send(Command::StartSession).ok();
            }
            SessionState::Stopping => {}
        }
    }

    pub fn stop_session(&mut self) {
        if self.session_state() != SessionState::Running {
            return;
        }
        self.run_flag.store(false, Ordering::Release);
        self.cmd_tx.send(Command::StopSession).ok();
    }

    /// Ask first when a session is still running.
    pub fn request_quit(&mut self) {
        if self.session_state() == SessionState::Stopped {
            self.quit();
        } else {
            self.confirm = Some(ConfirmDialog::new("Stop the session and quit?"));
        }
    }

    /// Apply the dialog's answer.
    pub fn resolve_confirm(&mut self, yes: bool) {
        self.confirm = None;
        if yes {
            self.quit();
        }
    }

    pub fn quit(&mut self) {
        self.run_flag.store(false, Ordering::Release);
        self.cmd_tx.send(Command::Quit).ok();
        self.should_quit = true;
    }
}
