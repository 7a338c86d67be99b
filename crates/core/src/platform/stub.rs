use std::time::Duration;

use tracing::info;

use crate::types::*;
use super::{CaptureSource, InputBackend, Platform};

const STUB_WIDTH: u32 = 320;
const STUB_HEIGHT: u32 = 180;

pub struct StubPlatform;

impl Platform for StubPlatform {
    fn get_instances(&self, pattern: &str) -> Vec<(WindowId, String)> {
        info!("get_instances(\"{}\")", pattern);
        let pat = pattern.to_lowercase();
        if pat.contains("warcraft") || pat.contains("wow") {
            vec![(10001, "World of Warcraft".into())]
        } else {
            vec![(30001, format!("Window<{}>", pattern))]
        }
    }

    fn create_input(&self, pattern: &str) -> Box<dyn InputBackend> {
        info!("create_input(\"{}\")", pattern);
        Box::new(StubInput)
    }

    fn create_capture(&self, pattern: &str) -> Box<dyn CaptureSource> {
        info!("create_capture(\"{}\")", pattern);
        Box::new(StubCapture { tick: 0 })
    }
}

/// Logs every action instead of performing it.
struct StubInput;

impl InputBackend for StubInput {
    fn move_cursor(&mut self, x: f64, y: f64, duration: Duration) {
        info!("move_cursor({:.0}, {:.0}, {:.2}s)", x, y, duration.as_secs_f64());
    }

    fn click(&mut self, button: MouseButton) {
        info!("click({:?})", button);
    }

    fn key_down(&mut self, key: &str) {
        info!("key_down(\"{}\")", key);
    }

    fn key_up(&mut self, key: &str) {
        info!("key_up(\"{}\")", key);
    }

    fn key_press(&mut self, key: &str) {
        info!("key_press(\"{}\")", key);
    }

    fn activate(&mut self) {
        info!("activate()");
    }
}

/// Emits a slowly shifting gradient so the pipeline has something to chew on.
struct StubCapture {
    tick: u32,
}

impl CaptureSource for StubCapture {
    fn grab(&mut self) -> Option<Frame> {
        self.tick = self.tick.wrapping_add(1);
        let shift = self.tick % 256;
        let mut data = Vec::with_capacity((STUB_WIDTH * STUB_HEIGHT * 4) as usize);
        for y in 0..STUB_HEIGHT {
            for x in 0..STUB_WIDTH {
                let v = ((x + y + shift) % 256) as u8;
                data.extend_from_slice(&[v, v / 2, 255 - v, 255]);
            }
        }
        Some(Frame::new(data, STUB_WIDTH, STUB_HEIGHT, PixelFormat::Bgra))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stub_capture_produces_bgra_frames() {
        let platform = StubPlatform;
        let mut capture = platform.create_capture("World of Warcraft");
        let frame = capture.grab().expect("stub always produces a frame");
        assert_eq!(frame.format, PixelFormat::Bgra);
        assert_eq!(frame.data.len(), (frame.bytes_per_row * frame.height) as usize);
    }
}
