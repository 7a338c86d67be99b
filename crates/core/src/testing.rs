//! Test doubles for the input backend, detector, position estimator and
//! similarity scorer, plus a deterministic `Context` builder.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use image::GrayImage;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::capture::FrameSlot;
use crate::clock::ManualClock;
use crate::context::Context;
use crate::detector::Detector;
use crate::matcher::{MatchError, Scored, Similarity};
use crate::platform::InputBackend;
use crate::position::{Fix, PositionEstimator};
use crate::template::Template;
use crate::types::{Frame, MouseButton, PixelFormat, Point};

#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    MoveCursor(Point),
    Click(MouseButton),
    KeyDown(String),
    KeyUp(String),
    KeyPress(String),
    Activate,
}

#[derive(Default)]
struct Recorded {
    events: Vec<InputEvent>,
    held: BTreeSet<String>,
}

/// Shared view of everything a `RecordingInput` saw.
#[derive(Clone, Default)]
pub struct Recorder {
    inner: Arc<Mutex<Recorded>>,
}

impl Recorder {
    pub fn events(&self) -> Vec<InputEvent> {
        self.inner.lock().unwrap().events.clone()
    }

    /// Keys currently down.
    pub fn held(&self) -> BTreeSet<String> {
        self.inner.lock().unwrap().held.clone()
    }

    pub fn key_downs(&self, key: &str) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, InputEvent::KeyDown(k) if k == key))
            .count()
    }

    pub fn key_presses(&self, key: &str) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, InputEvent::KeyPress(k) if k == key))
            .count()
    }

    pub fn key_ups(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, InputEvent::KeyUp(_)))
            .count()
    }

    pub fn clicks(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, InputEvent::Click(_)))
            .count()
    }

    pub fn clear(&self) {
        self.inner.lock().unwrap().events.clear();
    }
}

pub struct RecordingInput {
    recorder: Recorder,
}

impl RecordingInput {
    pub fn new(recorder: Recorder) -> Self {
        Self { recorder }
    }

    fn push(&mut self, event: InputEvent) {
        let mut rec = self.recorder.inner.lock().unwrap();
        match &event {
            InputEvent::KeyDown(k) => {
                rec.held.insert(k.clone());
            }
            InputEvent::KeyUp(k) => {
                rec.held.remove(k);
            }
            _ => {}
        }
        rec.events.push(event);
    }
}

impl InputBackend for RecordingInput {
    fn move_cursor(&mut self, x: f64, y: f64, _duration: Duration) {
        self.push(InputEvent::MoveCursor(Point::new(x, y)));
    }

    fn click(&mut self, button: MouseButton) {
        self.push(InputEvent::Click(button));
    }

    fn key_down(&mut self, key: &str) {
        self.push(InputEvent::KeyDown(key.to_string()));
    }

    fn key_up(&mut self, key: &str) {
        self.push(InputEvent::KeyUp(key.to_string()));
    }

    fn key_press(&mut self, key: &str) {
        self.push(InputEvent::KeyPress(key.to_string()));
    }

    fn activate(&mut self) {
        self.push(InputEvent::Activate);
    }
}

/// Handles a test keeps after moving the `Context` into a controller.
pub struct Harness {
    pub recorder: Recorder,
    pub clock: Arc<ManualClock>,
    pub frames: FrameSlot,
    pub running: Arc<AtomicBool>,
}

/// A `Context` on a manual clock with a seeded rng and a recording backend.
pub fn context(seed: u64) -> (Context, Harness) {
    let recorder = Recorder::default();
    let clock = Arc::new(ManualClock::new());
    let frames = FrameSlot::new();
    let running = Arc::new(AtomicBool::new(true));
    let ctx = Context::new(
        Box::new(RecordingInput::new(recorder.clone())),
        clock.clone(),
        frames.clone(),
        Arc::clone(&running),
        StdRng::seed_from_u64(seed),
    );
    (ctx, Harness { recorder, clock, frames, running })
}

pub fn blank_frame(width: u32, height: u32) -> Frame {
    Frame::new(vec![0; (width * height) as usize], width, height, PixelFormat::Luma)
}

/// Grayscale image with a deterministic, high-variance pattern.
pub fn pattern(width: u32, height: u32, seed: u32) -> GrayImage {
    GrayImage::from_fn(width, height, |x, y| {
        let v = (x.wrapping_mul(73) ^ y.wrapping_mul(151) ^ seed.wrapping_mul(29)) % 251;
        image::Luma([v as u8])
    })
}

/// Uniform-looking noise from a small LCG; nothing in it correlates with
/// `pattern` templates.
pub fn noise(width: u32, height: u32, seed: u32) -> GrayImage {
    let mut state = seed.wrapping_mul(2_654_435_761).wrapping_add(1);
    GrayImage::from_fn(width, height, |_, _| {
        state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
        image::Luma([(state >> 16) as u8])
    })
}

/// Replays scripted signal values. Unscripted calls return the safe default.
#[derive(Default)]
pub struct ScriptedDetector {
    dead_on_call: Option<u32>,
    dead_calls: u32,
    health_low: VecDeque<bool>,
    melee: VecDeque<bool>,
    needs_rest: VecDeque<bool>,
    player_dead: VecDeque<bool>,
}

impl ScriptedDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// `target_dead` answers true from its `n`th call (1-based) onwards.
    pub fn target_dead_on(mut self, n: u32) -> Self {
        self.dead_on_call = Some(n);
        self
    }

    pub fn health_low(mut self, script: impl IntoIterator<Item = bool>) -> Self {
        self.health_low = script.into_iter().collect();
        self
    }

    pub fn melee(mut self, script: impl IntoIterator<Item = bool>) -> Self {
        self.melee = script.into_iter().collect();
        self
    }

    pub fn needs_rest(mut self, script: impl IntoIterator<Item = bool>) -> Self {
        self.needs_rest = script.into_iter().collect();
        self
    }

    pub fn player_dead(mut self, script: impl IntoIterator<Item = bool>) -> Self {
        self.player_dead = script.into_iter().collect();
        self
    }

    pub fn target_dead_calls(&self) -> u32 {
        self.dead_calls
    }
}

impl Detector for ScriptedDetector {
    fn target_dead(&mut self, _frame: Option<&Frame>) -> bool {
        self.dead_calls += 1;
        self.dead_on_call.is_some_and(|n| self.dead_calls >= n)
    }

    fn health_low(&mut self, _frame: Option<&Frame>) -> bool {
        self.health_low.pop_front().unwrap_or(false)
    }

    fn in_melee_range(&mut self, _frame: Option<&Frame>) -> bool {
        self.melee.pop_front().unwrap_or(false)
    }

    fn needs_rest(&mut self, _frame: Option<&Frame>) -> bool {
        self.needs_rest.pop_front().unwrap_or(false)
    }

    fn player_dead(&mut self, _frame: Option<&Frame>) -> bool {
        self.player_dead.pop_front().unwrap_or(false)
    }
}

/// Replays positions in order, then keeps repeating the last one.
pub struct ScriptedEstimator {
    fixes: VecDeque<Option<Fix>>,
    last: Option<Fix>,
    calls: usize,
}

impl ScriptedEstimator {
    pub fn new(fixes: impl IntoIterator<Item = Option<Fix>>) -> Self {
        Self { fixes: fixes.into_iter().collect(), last: None, calls: 0 }
    }

    pub fn points(points: impl IntoIterator<Item = (f64, f64)>) -> Self {
        Self::new(points.into_iter().map(|(x, y)| Some(Fix::at(Point::new(x, y)))))
    }

    pub fn calls(&self) -> usize {
        self.calls
    }
}

impl PositionEstimator for ScriptedEstimator {
    fn estimate(&mut self, _frame: Option<&Frame>) -> Option<Fix> {
        self.calls += 1;
        if let Some(next) = self.fixes.pop_front() {
            self.last = next;
        }
        self.last
    }
}

/// Similarity that returns canned scores per template name.
#[derive(Default)]
pub struct FixedScores {
    scores: HashMap<String, Scored>,
    faults: BTreeSet<String>,
}

impl FixedScores {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn score(mut self, name: &str, score: f32, at: (u32, u32)) -> Self {
        self.scores.insert(name.to_string(), Scored { x: at.0, y: at.1, score });
        self
    }

    pub fn fault(mut self, name: &str) -> Self {
        self.faults.insert(name.to_string());
        self
    }
}

impl Similarity for FixedScores {
    fn best_location(&self, _haystack: &GrayImage, template: &Template) -> Result<Scored, MatchError> {
        if self.faults.contains(&template.name) {
            return Err(MatchError::Malformed(template.name.clone()));
        }
        Ok(self
            .scores
            .get(&template.name)
            .copied()
            .unwrap_or(Scored { x: 0, y: 0, score: 0.0 }))
    }
}
