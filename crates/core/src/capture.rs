use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::platform::CaptureSource;
use crate::types::Frame;

const FPS_REPORT_DELAY: Duration = Duration::from_secs(3);

/// Single-slot handoff for the latest frame. One writer (the capture
/// producer), one reader (the decision loop); a reader only ever sees a
/// whole frame, possibly a stale one.
#[derive(Clone, Default)]
pub struct FrameSlot {
    inner: Arc<Mutex<Option<Arc<Frame>>>>,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, frame: Frame) {
        *self.inner.lock().unwrap() = Some(Arc::new(frame));
    }

    pub fn latest(&self) -> Option<Arc<Frame>> {
        self.inner.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        *self.inner.lock().unwrap() = None;
    }
}

/// Run the capture loop on a background thread until `quit` is set.
pub fn spawn_producer(
    mut source: Box<dyn CaptureSource>,
    slot: FrameSlot,
    quit: Arc<AtomicBool>,
    interval: Duration,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("capture".into())
        .spawn(move || {
            info!("capture producer started");
            let mut frames = 0u32;
            let mut report_at = Instant::now();
            while !quit.load(Ordering::Acquire) {
                if let Some(frame) = source.grab() {
                    slot.publish(frame);
                    frames += 1;
                }
                let elapsed = report_at.elapsed();
                if elapsed >= FPS_REPORT_DELAY {
                    debug!("FPS: {:.1}", frames as f64 / elapsed.as_secs_f64());
                    frames = 0;
                    report_at = Instant::now();
                }
                thread::sleep(interval);
            }
            info!("capture producer stopped");
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PixelFormat;

    struct Counting(u8);

    impl CaptureSource for Counting {
        fn grab(&mut self) -> Option<Frame> {
            self.0 = self.0.wrapping_add(1);
            Some(Frame::new(vec![self.0], 1, 1, PixelFormat::Luma))
        }
    }

    #[test]
    fn test_slot_replaces_frame() {
        let slot = FrameSlot::new();
        assert!(slot.latest().is_none());
        slot.publish(Frame::new(vec![1], 1, 1, PixelFormat::Luma));
        slot.publish(Frame::new(vec![2], 1, 1, PixelFormat::Luma));
        assert_eq!(slot.latest().unwrap().data, vec![2]);
        slot.clear();
        assert!(slot.latest().is_none());
    }

    #[test]
    fn test_producer_publishes_until_quit() {
        let slot = FrameSlot::new();
        let quit = Arc::new(AtomicBool::new(false));
        let handle = spawn_producer(
            Box::new(Counting(0)),
            slot.clone(),
            Arc::clone(&quit),
            Duration::from_millis(1),
        )
        .unwrap();
        let deadline = Instant::now() + Duration::from_secs(2);
        while slot.latest().is_none() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        quit.store(true, Ordering::Release);
        handle.join().unwrap();
        assert!(slot.latest().is_some());
    }
}
