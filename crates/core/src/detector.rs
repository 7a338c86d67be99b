//! Game-state signals read from the frame.
//!
//! Every signal answers `false` when it cannot be read: the combat loop then
//! keeps ranged-attacking instead of retreating or declaring a kill.

use std::collections::HashMap;

use image::GrayImage;
use tracing::debug;

use crate::matcher::TemplateMatcher;
use crate::template::Template;
use crate::types::{Frame, RelRect};

pub trait Detector: Send {
    fn target_dead(&mut self, _frame: Option<&Frame>) -> bool {
        false
    }

    fn health_low(&mut self, _frame: Option<&Frame>) -> bool {
        false
    }

    fn in_melee_range(&mut self, _frame: Option<&Frame>) -> bool {
        false
    }

    /// Out-of-combat check: health too low to pull the next enemy.
    fn needs_rest(&mut self, _frame: Option<&Frame>) -> bool {
        false
    }

    fn player_dead(&mut self, _frame: Option<&Frame>) -> bool {
        false
    }
}

/// Knows nothing; every signal takes its safe default.
pub struct NullDetector;

impl Detector for NullDetector {}

/// Inclusive RGB box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorRange {
    pub min: [u8; 3],
    pub max: [u8; 3],
}

impl ColorRange {
    pub fn contains(&self, rgb: [u8; 3]) -> bool {
        (0..3).all(|i| rgb[i] >= self.min[i] && rgb[i] <= self.max[i])
    }
}

/// A horizontal resource bar: `fill` pixels are remaining health, `empty`
/// pixels the drained part.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BarRegion {
    pub rect: RelRect,
    pub fill: ColorRange,
    pub empty: ColorRange,
}

/// Fraction of bar pixels that are filled, or `None` when fewer than half
/// of the sampled pixels look like a bar at all (bar hidden or covered).
pub fn bar_fraction(frame: &Frame, bar: &BarRegion) -> Option<f64> {
    let (l, t, w, h) = frame.rel_bounds(&bar.rect);
    let (mut fill, mut empty, mut total) = (0u32, 0u32, 0u32);
    for y in t..t + h {
        for x in l..l + w {
            let rgb = frame.rgb(x, y);
            total += 1;
            if bar.fill.contains(rgb) {
                fill += 1;
            } else if bar.empty.contains(rgb) {
                empty += 1;
            }
        }
    }
    if total == 0 || (fill + empty) * 2 < total {
        return None;
    }
    Some(fill as f64 / (fill + empty) as f64)
}

/// Reads the player and target health bars and an optional melee-range
/// indicator (an action-bar slot that lights up when in reach).
pub struct PixelColorDetector {
    pub player_bar: BarRegion,
    pub target_bar: Option<BarRegion>,
    pub melee_indicator: Option<(RelRect, ColorRange)>,
    /// In combat, retreat below this health fraction.
    pub health_low: f64,
    /// Out of combat, rest below this health fraction.
    pub rest_below: f64,
}

impl PixelColorDetector {
    fn player_health(&self, frame: Option<&Frame>) -> Option<f64> {
        frame.and_then(|f| bar_fraction(f, &self.player_bar))
    }
}

impl Detector for PixelColorDetector {
    fn target_dead(&mut self, frame: Option<&Frame>) -> bool {
        let (Some(frame), Some(bar)) = (frame, self.target_bar.as_ref()) else {
            return false;
        };
        let fraction = bar_fraction(frame, bar);
        debug!("target health {:?}", fraction);
        fraction.is_some_and(|f| f <= 0.0)
    }

    fn health_low(&mut self, frame: Option<&Frame>) -> bool {
        self.player_health(frame).is_some_and(|f| f < self.health_low)
    }

    fn in_melee_range(&mut self, frame: Option<&Frame>) -> bool {
        let (Some(frame), Some((rect, lit))) = (frame, self.melee_indicator.as_ref()) else {
            return false;
        };
        let (l, t, w, h) = frame.rel_bounds(rect);
        let total = w * h;
        if total == 0 {
            return false;
        }
        let lit_px = (t..t + h)
            .flat_map(|y| (l..l + w).map(move |x| (x, y)))
            .filter(|&(x, y)| lit.contains(frame.rgb(x, y)))
            .count() as u32;
        lit_px * 2 >= total
    }

    fn needs_rest(&mut self, frame: Option<&Frame>) -> bool {
        self.player_health(frame).is_some_and(|f| f > 0.0 && f < self.rest_below)
    }

    fn player_dead(&mut self, frame: Option<&Frame>) -> bool {
        self.player_health(frame).is_some_and(|f| f <= 0.0)
    }
}

/// Identifies a frame without hashing its pixels.
type FrameKey = (std::time::Instant, usize);

fn frame_key(frame: &Frame) -> FrameKey {
    (frame.captured_at, frame.data.as_ptr() as usize)
}

/// Status icons matched by name: `target_dead`, `health_low`,
/// `melee_range`, `needs_rest`, `player_dead`. A missing template means
/// the signal is never raised. An icon with a region is only looked for
/// inside it.
pub struct TemplateDetector {
    matcher: TemplateMatcher,
    templates: Vec<Template>,
    regions: HashMap<String, RelRect>,
    floor: f32,
    cache: Option<(FrameKey, GrayImage)>,
}

impl TemplateDetector {
    pub fn new(matcher: TemplateMatcher, templates: Vec<Template>, floor: f32) -> Self {
        Self { matcher, templates, regions: HashMap::new(), floor, cache: None }
    }

    pub fn with_regions(mut self, regions: HashMap<String, RelRect>) -> Self {
        self.regions = regions;
        self
    }

    fn signal(&mut self, name: &str, frame: Option<&Frame>) -> bool {
        let Some(frame) = frame else { return false };
        let Some(idx) = self.templates.iter().position(|t| t.name == name) else {
            return false;
        };
        let key = frame_key(frame);
        if self.cache.as_ref().map_or(true, |(k, _)| *k != key) {
            self.cache = Some((key, frame.to_luma_image()));
        }
        let Some((_, luma)) = self.cache.as_ref() else { return false };
        self.matcher
            .find_best_luma_in(luma, &self.templates[idx..=idx], self.floor, self.regions.get(name))
            .is_some()
    }
}

impl Detector for TemplateDetector {
    fn target_dead(&mut self, frame: Option<&Frame>) -> bool {
        self.signal("target_dead", frame)
    }

    fn health_low(&mut self, frame: Option<&Frame>) -> bool {
        self.signal("health_low", frame)
    }

    fn in_melee_range(&mut self, frame: Option<&Frame>) -> bool {
        self.signal("melee_range", frame)
    }

    fn needs_rest(&mut self, frame: Option<&Frame>) -> bool {
        self.signal("needs_rest", frame)
    }

    fn player_dead(&mut self, frame: Option<&Frame>) -> bool {
        self.signal("player_dead", frame)
    }
}
