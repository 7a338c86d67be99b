//! Everything a controller needs to act on the game: input, time, randomness,
//! the latest frame and the run flag. One `Context` per decision loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use rand::rngs::StdRng;
use rand::Rng;

use crate::capture::FrameSlot;
use crate::clock::{self, Clock};
use crate::platform::InputBackend;
use crate::types::{Frame, MouseButton, Point};

pub const KEY_FORWARD: &str = "w";
pub const KEY_BACK: &str = "s";
pub const KEY_TURN_LEFT: &str = "a";
pub const KEY_TURN_RIGHT: &str = "d";
pub const KEY_STRAFE_LEFT: &str = "q";
pub const KEY_STRAFE_RIGHT: &str = "e";
pub const KEY_JUMP: &str = "space";

/// Directional and strafe keys that may be held during a maneuver.
pub const MOVEMENT_KEYS: [&str; 6] = [
    KEY_FORWARD,
    KEY_TURN_LEFT,
    KEY_BACK,
    KEY_TURN_RIGHT,
    KEY_STRAFE_LEFT,
    KEY_STRAFE_RIGHT,
];

pub struct Context {
    input: Box<dyn InputBackend>,
    clock: Arc<dyn Clock>,
    rng: StdRng,
    running: Arc<AtomicBool>,
    frames: FrameSlot,
}

/// Releases its key when dropped, so an unwinding maneuver never leaves
/// the character running.
struct HeldKey<'a> {
    input: &'a mut dyn InputBackend,
    key: &'a str,
}

impl<'a> HeldKey<'a> {
    fn new(input: &'a mut dyn InputBackend, key: &'a str) -> Self {
        input.key_down(key);
        Self { input, key }
    }
}

impl Drop for HeldKey<'_> {
    fn drop(&mut self) {
        self.input.key_up(self.key);
    }
}

impl Context {
    pub fn new(
        input: Box<dyn InputBackend>,
        clock: Arc<dyn Clock>,
        frames: FrameSlot,
        running: Arc<AtomicBool>,
        rng: StdRng,
    ) -> Self {
        Self { input, clock, rng, running, frames }
    }

    pub fn frame(&self) -> Option<Arc<Frame>> {
        self.frames.latest()
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    pub fn now(&self) -> Instant {
        self.clock.now()
    }

    pub fn run_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::Release);
    }

    pub fn pause(&self, secs: f64) {
        self.clock.sleep(clock::secs(secs));
    }

    /// Pause with +/-30% jitter.
    pub fn pause_jitter(&mut self, secs: f64) {
        let d = clock::jitter(secs, &mut self.rng);
        self.clock.sleep(d);
    }

    pub fn uniform(&mut self, lo: f64, hi: f64) -> f64 {
        if hi <= lo {
            return lo;
        }
        self.rng.gen_range(lo..hi)
    }

    pub fn chance(&mut self, p: f64) -> bool {
        self.rng.gen_bool(p.clamp(0.0, 1.0))
    }

    /// Uniform integer offset in `[-amount, amount]`.
    pub fn offset(&mut self, amount: i32) -> f64 {
        if amount <= 0 {
            return 0.0;
        }
        self.rng.gen_range(-amount..=amount) as f64
    }

    /// Hold `key` for `secs`, releasing it even if the sleep unwinds.
    pub fn hold(&mut self, key: &str, secs: f64) {
        let held = HeldKey::new(self.input.as_mut(), key);
        self.clock.sleep(clock::secs(secs));
        drop(held);
    }

    /// Hold `key` while `f` runs.
    pub fn hold_with(&mut self, key: &str, f: impl FnOnce(&mut Self)) {
        self.input.key_down(key);
        f(self);
        self.input.key_up(key);
    }

    pub fn press(&mut self, key: &str) {
        self.input.key_press(key);
    }

    pub fn move_cursor(&mut self, to: Point, secs: f64) {
        self.input.move_cursor(to.x, to.y, clock::secs(secs));
    }

    pub fn click(&mut self, button: MouseButton) {
        self.input.click(button);
    }

    pub fn click_at(&mut self, to: Point, button: MouseButton, move_secs: f64) {
        self.move_cursor(to, move_secs);
        self.click(button);
    }

    /// Key-up every movement key. Safe to call any number of times.
    pub fn release_movement_keys(&mut self) {
        for key in MOVEMENT_KEYS {
            self.input.key_up(key);
        }
    }

    pub fn activate(&mut self) {
        self.input.activate();
    }
}
