pub mod stub;
pub mod hotkey;

#[cfg(target_os = "macos")]
pub mod darwin;

use std::time::Duration;

use crate::logger;
use crate::types::*;

/// Synthetic input primitives. Every call blocks for its nominal duration,
/// so actions execute strictly in issue order.
pub trait InputBackend: Send {
    fn move_cursor(&mut self, x: f64, y: f64, duration: Duration);
    fn click(&mut self, button: MouseButton);
    fn key_down(&mut self, key: &str);
    fn key_up(&mut self, key: &str);
    fn key_press(&mut self, key: &str);
    /// Bring the game window to the foreground.
    fn activate(&mut self) {}
}

/// Produces frames; knows nothing about what is in them.
pub trait CaptureSource: Send {
    fn grab(&mut self) -> Option<Frame>;
}

/// Platform-level operations (window enumeration, backend factory).
pub trait Platform: Send {
    fn get_instances(&self, pattern: &str) -> Vec<(WindowId, String)>;
    fn create_input(&self, pattern: &str) -> Box<dyn InputBackend>;
    fn create_capture(&self, pattern: &str) -> Box<dyn CaptureSource>;
}

/// Create the platform appropriate for the current OS.
pub fn create_platform(force_stub: bool) -> Box<dyn Platform> {
    if force_stub {
        logger::register_prefix("stub", logger::COLOR_GRAY);
        return Box::new(stub::StubPlatform);
    }
    #[cfg(target_os = "macos")]
    {
        logger::register_prefix("darwin", logger::COLOR_GRAY);
        return Box::new(darwin::DarwinPlatform::new());
    }
    #[cfg(not(target_os = "macos"))]
    {
        logger::register_prefix("stub", logger::COLOR_GRAY);
        return Box::new(stub::StubPlatform);
    }
}
