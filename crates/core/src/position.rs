use std::collections::VecDeque;
use std::f64::consts::FRAC_PI_2;

use regex::Regex;
use tracing::debug;

use crate::hint;
use crate::types::{Frame, Point};

/// An estimated character position, with facing when the source knows it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fix {
    pub pos: Point,
    /// Screen-axis angle in radians (0 = +x, y down).
    pub facing: Option<f64>,
}

impl Fix {
    pub fn at(pos: Point) -> Self {
        Self { pos, facing: None }
    }
}

pub trait PositionEstimator: Send {
    /// `None` when the position cannot be resolved this cycle.
    fn estimate(&mut self, frame: Option<&Frame>) -> Option<Fix>;
}

/// Reads `x,y[,facing]` from the addon hint strip. Facing arrives in the
/// game's convention (radians counter-clockwise from north) and is
/// converted to screen axes.
pub struct HintEstimator {
    pattern: Regex,
}

impl HintEstimator {
    pub fn new() -> Self {
        let pattern = Regex::new(r"^\s*(-?\d+(?:\.\d+)?),(-?\d+(?:\.\d+)?)(?:,(-?\d+(?:\.\d+)?))?\s*$")
            .expect("hint pattern is valid");
        Self { pattern }
    }

    pub fn parse(&self, payload: &str) -> Option<Fix> {
        let caps = self.pattern.captures(payload)?;
        let x: f64 = caps.get(1)?.as_str().parse().ok()?;
        let y: f64 = caps.get(2)?.as_str().parse().ok()?;
        let facing = caps
            .get(3)
            .and_then(|m| m.as_str().parse::<f64>().ok())
            .map(|game| -FRAC_PI_2 - game);
        Some(Fix { pos: Point::new(x, y), facing })
    }
}

impl Default for HintEstimator {
    fn default() -> Self {
        Self::new()
    }
}

impl PositionEstimator for HintEstimator {
    fn estimate(&mut self, frame: Option<&Frame>) -> Option<Fix> {
        let payload = hint::decode_hint(frame?)?;
        let fix = self.parse(&payload);
        if fix.is_none() {
            debug!("unparseable hint {:?}", payload);
        }
        fix
    }
}

/// Bounded FIFO of recent positions for stuck detection.
#[derive(Debug, Clone)]
pub struct PositionHistory {
    samples: VecDeque<Point>,
    capacity: usize,
}

impl PositionHistory {
    pub fn new(capacity: usize) -> Self {
        Self { samples: VecDeque::with_capacity(capacity), capacity: capacity.max(1) }
    }

    pub fn push(&mut self, p: Point) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(p);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &Point> {
        self.samples.iter()
    }

    /// (max-min on x, max-min on y) over the newest `window` samples, or
    /// `None` if fewer are recorded.
    pub fn spread(&self, window: usize) -> Option<(f64, f64)> {
        if window == 0 || self.samples.len() < window {
            return None;
        }
        let recent = self.samples.iter().skip(self.samples.len() - window);
        let (mut min_x, mut max_x) = (f64::INFINITY, f64::NEG_INFINITY);
        let (mut min_y, mut max_y) = (f64::INFINITY, f64::NEG_INFINITY);
        for p in recent {
            min_x = min_x.min(p.x);
            max_x = max_x.max(p.x);
            min_y = min_y.min(p.y);
            max_y = max_y.max(p.y);
        }
        Some((max_x - min_x, max_y - min_y))
    }

    /// Direction of travel between the two newest samples, if they differ.
    pub fn heading(&self) -> Option<f64> {
        let n = self.samples.len();
        if n < 2 {
            return None;
        }
        let (a, b) = (self.samples[n - 2], self.samples[n - 1]);
        if a.distance(&b) < 1.0 {
            return None;
        }
        Some(a.bearing_to(&b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hint::tests::hint_frame;

    #[test]
    fn test_history_evicts_oldest() {
        let mut h = PositionHistory::new(3);
        for i in 0..5 {
            h.push(Point::new(i as f64, 0.0));
        }
        assert_eq!(h.len(), 3);
        let xs: Vec<f64> = h.iter().map(|p| p.x).collect();
        assert_eq!(xs, vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_spread_needs_full_window() {
        let mut h = PositionHistory::new(10);
        for i in 0..4 {
            h.push(Point::new(i as f64, 1.0));
        }
        assert_eq!(h.spread(5), None);
        h.push(Point::new(50.0, 3.0));
        assert_eq!(h.spread(5), Some((50.0, 2.0)));
    }

    #[test]
    fn test_heading_from_last_two_samples() {
        let mut h = PositionHistory::new(10);
        h.push(Point::new(0.0, 0.0));
        assert_eq!(h.heading(), None);
        h.push(Point::new(0.0, 10.0));
        assert!((h.heading().unwrap() - FRAC_PI_2).abs() < 1e-9);
    }

    #[test]
    fn test_hint_estimator_reads_position_and_facing() {
        let mut est = HintEstimator::new();
        let fix = est.estimate(Some(&hint_frame("41.5,62,0", 3))).unwrap();
        assert_eq!(fix.pos, Point::new(41.5, 62.0));
        assert!((fix.facing.unwrap() + FRAC_PI_2).abs() < 1e-9);

        let fix = est.estimate(Some(&hint_frame("10,20", 2))).unwrap();
        assert_eq!(fix.facing, None);
    }

    #[test]
    fn test_hint_estimator_unknown_position() {
        let mut est = HintEstimator::new();
        assert_eq!(est.estimate(None), None);
        assert_eq!(est.estimate(Some(&hint_frame("hello", 3))), None);
    }
}
