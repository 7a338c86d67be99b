use std::collections::HashMap;
use std::fmt::Write as _;
use std::fs::{self, OpenOptions};
use std::path::Path;
use std::sync::{mpsc, Mutex, OnceLock};

use anyhow::{Context as _, Result};
use chrono::Local;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

static TUI_TX: OnceLock<Mutex<Option<mpsc::Sender<String>>>> = OnceLock::new();
static PREFIXES: OnceLock<Mutex<HashMap<String, u8>>> = OnceLock::new();

// Color indices for TUI rendering (mapped in ui.rs)
pub const COLOR_GRAY: u8 = 1;
pub const COLOR_BLUE: u8 = 2;
pub const COLOR_GREEN: u8 = 3;

/// Install the global subscriber: truncated `app.log` plus the TUI channel.
/// Keep the returned guard alive for the life of the process.
pub fn init(log_dir: &Path) -> Result<WorkerGuard> {
    fs::create_dir_all(log_dir)
        .with_context(|| format!("creating log dir {}", log_dir.display()))?;
    let log_path = log_dir.join("app.log");
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&log_path)
        .with_context(|| format!("opening {}", log_path.display()))?;
    let (writer, guard) = tracing_appender::non_blocking(file);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(false);

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(TuiLayer)
        .try_init()
        .context("installing tracing subscriber")?;

    Ok(guard)
}

/// Wire the TUI log channel.
pub fn set_tui_sender(tx: mpsc::Sender<String>) {
    *TUI_TX.get_or_init(|| Mutex::new(None)).lock().unwrap() = Some(tx);
}

/// Register a color for a prefix. The prefix of an event is the last
/// segment of its target, e.g. `combat` for `grinder_core::combat`.
pub fn register_prefix(prefix: &str, color: u8) {
    PREFIXES
        .get_or_init(|| Mutex::new(HashMap::new()))
        .lock()
        .unwrap()
        .insert(prefix.to_string(), color);
}

fn prefix_color(prefix: &str) -> u8 {
    PREFIXES
        .get()
        .and_then(|p| p.lock().ok())
        .and_then(|p| p.get(prefix).copied())
        .unwrap_or(0)
}

fn target_prefix(target: &str) -> &str {
    target.rsplit("::").next().unwrap_or(target)
}

/// Format for TUI channel uses \x1f as field separator:
/// level\x1fprefix\x1fcolor\x1ftimestamp\x1fmessage
pub fn tui_line(level: &Level, target: &str, msg: &str) -> String {
    let ts = Local::now().format("%H:%M:%S");
    let prefix = target_prefix(target);
    let level = match *level {
        Level::ERROR => "ERROR",
        Level::WARN => "WARN",
        Level::INFO => "INFO",
        Level::DEBUG => "DEBUG",
        Level::TRACE => "TRACE",
    };
    format!("{}\x1f{}\x1f{}\x1f{}\x1f{}", level, prefix, prefix_color(prefix), ts, msg)
}

/// Forwards events to the TUI log panel.
struct TuiLayer;

impl<S: Subscriber> Layer<S> for TuiLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let Some(slot) = TUI_TX.get() else { return };
        let Ok(guard) = slot.lock() else { return };
        let Some(tx) = guard.as_ref() else { return };

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        let meta = event.metadata();
        tx.send(tui_line(meta.level(), meta.target(), &visitor.0)).ok();
    }
}

#[derive(Default)]
struct MessageVisitor(String);

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.0, "{:?}", value);
        } else {
            let _ = write!(self.0, " {}={:?}", field.name(), value);
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.0.push_str(value);
        } else {
            let _ = write!(self.0, " {}={}", field.name(), value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tui_line_fields() {
        register_prefix("combat", COLOR_GREEN);
        let line = tui_line(&Level::WARN, "grinder_core::combat", "retreating");
        let parts: Vec<&str> = line.split('\x1f').collect();
        assert_eq!(parts.len(), 5);
        assert_eq!(parts[0], "WARN");
        assert_eq!(parts[1], "combat");
        assert_eq!(parts[2], COLOR_GREEN.to_string());
        assert_eq!(parts[4], "retreating");
    }
}
