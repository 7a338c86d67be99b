//! Template matching: score every template against a frame, keep the best
//! one that clears the confidence floor.

use image::imageops::{crop_imm, thumbnail};
use image::GrayImage;
use imageproc::template_matching::{match_template, MatchTemplateMethod};
use thiserror::Error;
use tracing::{debug, warn};

use crate::template::Template;
use crate::types::{DetectionResult, Frame, Point, RelRect};

pub const ENEMY_FLOOR: f32 = 0.65;
pub const LOOT_FLOOR: f32 = 0.60;

/// Shrink factor of the coarse search pass.
pub const DEFAULT_STRIDE: u32 = 4;

const EPS: f64 = 1e-9;
/// Templates are never shrunk below this many pixels on a side.
const MIN_COARSE_SIDE: u32 = 10;
/// Coarse hits re-scored at full resolution.
const REFINE_CANDIDATES: usize = 4;
/// Windows flatter than this (per-pixel variance) score 0.
const MIN_WINDOW_VAR: f64 = 1.0;

#[derive(Debug, Error, PartialEq)]
pub enum MatchError {
    #[error("template {0} is empty")]
    EmptyTemplate(String),
    #[error("template {name} ({tw}x{th}) is larger than the frame ({fw}x{fh})")]
    TooLarge { name: String, tw: u32, th: u32, fw: u32, fh: u32 },
    #[error("template {0} has no contrast")]
    Flat(String),
    #[error("template {0} is malformed")]
    Malformed(String),
}

/// Best location of one template in a frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scored {
    pub x: u32,
    pub y: u32,
    pub score: f32,
}

impl Scored {
    /// Higher score wins; equal scores go to the earlier raster position.
    fn beats(&self, other: &Scored) -> bool {
        self.score > other.score || (self.score == other.score && (self.y, self.x) < (other.y, other.x))
    }
}

/// Scoring strategy: where does `template` fit best in `haystack`, and how well.
pub trait Similarity: Send {
    fn best_location(&self, haystack: &GrayImage, template: &Template) -> Result<Scored, MatchError>;
}

/// Zero-mean normalized cross-correlation (OpenCV's TM_CCOEFF_NORMED).
///
/// `imageproc` supplies the raw correlation; window sums from integral
/// images turn it into the normalized score. With `stride > 1` frame and
/// template are first shrunk by that factor and the best coarse hits are
/// re-scored at full resolution around their position.
pub struct NormalizedCrossCorrelation {
    pub stride: u32,
}

impl Default for NormalizedCrossCorrelation {
    fn default() -> Self {
        Self { stride: DEFAULT_STRIDE }
    }
}

/// Summed-area table with a zero row and column in front.
struct Integral {
    width: usize,
    sum: Vec<f64>,
    sq: Vec<f64>,
}

impl Integral {
    fn new(img: &GrayImage) -> Self {
        let (w, h) = (img.width() as usize, img.height() as usize);
        let width = w + 1;
        let mut sum = vec![0.0; width * (h + 1)];
        let mut sq = vec![0.0; width * (h + 1)];
        let raw = img.as_raw();
        for y in 0..h {
            let mut row_sum = 0.0;
            let mut row_sq = 0.0;
            for x in 0..w {
                let v = raw[y * w + x] as f64;
                row_sum += v;
                row_sq += v * v;
                sum[(y + 1) * width + x + 1] = sum[y * width + x + 1] + row_sum;
                sq[(y + 1) * width + x + 1] = sq[y * width + x + 1] + row_sq;
            }
        }
        Self { width, sum, sq }
    }

    /// Sum and sum of squares over a w x h window at (x, y).
    fn window(&self, x: u32, y: u32, w: u32, h: u32) -> (f64, f64) {
        let (x, y, w, h) = (x as usize, y as usize, w as usize, h as usize);
        let at = |table: &[f64]| {
            table[(y + h) * self.width + x + w] - table[y * self.width + x + w]
                - table[(y + h) * self.width + x]
                + table[y * self.width + x]
        };
        (at(&self.sum), at(&self.sq))
    }
}

struct Stats {
    n: f64,
    mean: f64,
    /// Sum of squared deviations from the mean.
    var: f64,
}

impl Stats {
    fn of(img: &GrayImage) -> Self {
        let raw = img.as_raw();
        let n = raw.len() as f64;
        let mean = raw.iter().map(|&v| v as f64).sum::<f64>() / n;
        let var = raw.iter().map(|&v| (v as f64 - mean).powi(2)).sum();
        Self { n, mean, var }
    }
}

/// Score of `template` at every offset in `haystack`, in raster order.
fn score_map(haystack: &GrayImage, template: &GrayImage, t: &Stats) -> Vec<Scored> {
    let (tw, th) = template.dimensions();
    let cc = match_template(haystack, template, MatchTemplateMethod::CrossCorrelation);
    let integral = Integral::new(haystack);
    cc.enumerate_pixels()
        .map(|(x, y, px)| {
            let (s, sq) = integral.window(x, y, tw, th);
            let f_var = sq - s * s / t.n;
            let score = if f_var < t.n * MIN_WINDOW_VAR {
                0.0
            } else {
                ((px[0] as f64 - t.mean * s) / (t.var * f_var).sqrt()).clamp(-1.0, 1.0)
            };
            Scored { x, y, score: score as f32 }
        })
        .collect()
}

fn best_of(scores: impl IntoIterator<Item = Scored>) -> Scored {
    scores
        .into_iter()
        .fold(Scored { x: 0, y: 0, score: f32::MIN }, |best, s| if s.beats(&best) { s } else { best })
}

impl NormalizedCrossCorrelation {
    /// Shrink factor for a template, keeping its coarse copy usable.
    fn factor(&self, tw: u32, th: u32) -> u32 {
        self.stride.min(tw.min(th) / MIN_COARSE_SIDE).max(1)
    }

    fn coarse_to_fine(&self, haystack: &GrayImage, template: &GrayImage, t: &Stats, factor: u32) -> Option<Scored> {
        let (fw, fh) = haystack.dimensions();
        let (tw, th) = template.dimensions();
        let small_t = thumbnail(template, tw / factor, th / factor);
        let small_stats = Stats::of(&small_t);
        if small_stats.var < EPS {
            return None;
        }
        let small_f = thumbnail(haystack, (fw / factor).max(1), (fh / factor).max(1));
        if small_t.width() > small_f.width() || small_t.height() > small_f.height() {
            return None;
        }

        let mut coarse = score_map(&small_f, &small_t, &small_stats);
        coarse.sort_by(|a, b| b.score.total_cmp(&a.score));
        let mut picked: Vec<Scored> = Vec::with_capacity(REFINE_CANDIDATES);
        for c in coarse {
            if picked.len() == REFINE_CANDIDATES {
                break;
            }
            if picked.iter().all(|p| p.x.abs_diff(c.x) > 1 || p.y.abs_diff(c.y) > 1) {
                picked.push(c);
            }
        }

        let sx = fw as f64 / small_f.width() as f64;
        let sy = fh as f64 / small_f.height() as f64;
        let (max_x, max_y) = (fw - tw, fh - th);
        let reach = factor + 1;
        let mut best: Option<Scored> = None;
        for c in picked {
            let cx = ((c.x as f64 * sx).round() as u32).min(max_x);
            let cy = ((c.y as f64 * sy).round() as u32).min(max_y);
            let (x0, y0) = (cx.saturating_sub(reach), cy.saturating_sub(reach));
            let (x1, y1) = ((cx + reach).min(max_x), (cy + reach).min(max_y));
            let window = crop_imm(haystack, x0, y0, x1 - x0 + tw, y1 - y0 + th).to_image();
            let local = best_of(score_map(&window, template, t));
            let hit = Scored { x: x0 + local.x, y: y0 + local.y, score: local.score };
            if best.as_ref().map_or(true, |b| hit.beats(b)) {
                best = Some(hit);
            }
        }
        best
    }
}

impl Similarity for NormalizedCrossCorrelation {
    fn best_location(&self, haystack: &GrayImage, template: &Template) -> Result<Scored, MatchError> {
        let (tw, th) = template.image.dimensions();
        let (fw, fh) = haystack.dimensions();
        if tw == 0 || th == 0 {
            return Err(MatchError::EmptyTemplate(template.name.clone()));
        }
        if tw > fw || th > fh {
            return Err(MatchError::TooLarge { name: template.name.clone(), tw, th, fw, fh });
        }
        if template.image.as_raw().len() != (tw * th) as usize {
            return Err(MatchError::Malformed(template.name.clone()));
        }
        let stats = Stats::of(&template.image);
        if stats.var < EPS {
            return Err(MatchError::Flat(template.name.clone()));
        }

        let factor = self.factor(tw, th);
        if factor > 1 {
            if let Some(hit) = self.coarse_to_fine(haystack, &template.image, &stats, factor) {
                return Ok(hit);
            }
        }
        Ok(best_of(score_map(haystack, &template.image, &stats)))
    }
}

pub struct TemplateMatcher {
    similarity: Box<dyn Similarity>,
}

impl Default for TemplateMatcher {
    fn default() -> Self {
        Self::new(Box::new(NormalizedCrossCorrelation::default()))
    }
}

impl TemplateMatcher {
    pub fn new(similarity: Box<dyn Similarity>) -> Self {
        Self { similarity }
    }

    /// NCC with the given coarse-pass stride; 1 scores every offset at full resolution.
    pub fn with_stride(stride: u32) -> Self {
        Self::new(Box::new(NormalizedCrossCorrelation { stride }))
    }

    /// Best template at or above `floor`, or `None`.
    pub fn find_best(&self, frame: &Frame, templates: &[Template], floor: f32) -> Option<DetectionResult> {
        self.find_best_in(frame, templates, floor, None)
    }

    /// Same as `find_best`, searching only `region` of the frame when given.
    /// Locations are still frame pixels.
    pub fn find_best_in(
        &self,
        frame: &Frame,
        templates: &[Template],
        floor: f32,
        region: Option<&RelRect>,
    ) -> Option<DetectionResult> {
        if templates.is_empty() {
            return None;
        }
        self.find_best_luma_in(&frame.to_luma_image(), templates, floor, region)
    }

    /// Same as `find_best` on an already converted frame.
    pub fn find_best_luma(&self, luma: &GrayImage, templates: &[Template], floor: f32) -> Option<DetectionResult> {
        self.find_best_luma_in(luma, templates, floor, None)
    }

    pub fn find_best_luma_in(
        &self,
        luma: &GrayImage,
        templates: &[Template],
        floor: f32,
        region: Option<&RelRect>,
    ) -> Option<DetectionResult> {
        let Some(region) = region else {
            return self.score_templates(luma, templates, floor, (0, 0));
        };
        let (l, t, w, h) = region.bounds(luma.width(), luma.height());
        if w == 0 || h == 0 {
            return None;
        }
        let view = crop_imm(luma, l, t, w, h).to_image();
        self.score_templates(&view, templates, floor, (l, t))
    }

    fn score_templates(
        &self,
        luma: &GrayImage,
        templates: &[Template],
        floor: f32,
        origin: (u32, u32),
    ) -> Option<DetectionResult> {
        let candidates = templates.iter().filter_map(|template| {
            match self.similarity.best_location(luma, template) {
                Ok(scored) => {
                    let (x, y) = (scored.x + origin.0, scored.y + origin.1);
                    debug!("{}: {:.3} at ({}, {})", template.name, scored.score, x, y);
                    Some(DetectionResult {
                        entity_name: template.name.clone(),
                        location: Point::new(x as f64, y as f64),
                        size: template.image.dimensions(),
                        confidence: scored.score,
                    })
                }
                Err(e) => {
                    warn!("error matching template {}: {}", template.name, e);
                    None
                }
            }
        });
        select_best(candidates, floor)
    }
}

/// Highest confidence at or above `floor`; ties go to the earliest candidate.
pub fn select_best(candidates: impl IntoIterator<Item = DetectionResult>, floor: f32) -> Option<DetectionResult> {
    let mut best: Option<DetectionResult> = None;
    for candidate in candidates {
        if candidate.confidence < floor {
            continue;
        }
        if best.as_ref().map_or(true, |b| candidate.confidence > b.confidence) {
            best = Some(candidate);
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::Category;
    use crate::testing::{blank_frame, noise, pattern, FixedScores};

    /// Smooth shading, like a sprite rather than noise.
    fn blob(width: u32, height: u32) -> GrayImage {
        GrayImage::from_fn(width, height, |x, y| {
            let v = 128.0 + 100.0 * (x as f64 / 6.0).sin() * (y as f64 / 8.0).cos();
            image::Luma([v as u8])
        })
    }

    fn paste(haystack: &mut GrayImage, needle: &GrayImage, at: (u32, u32)) {
        for (x, y, px) in needle.enumerate_pixels() {
            haystack.put_pixel(at.0 + x, at.1 + y, *px);
        }
    }

    fn enemy(name: &str) -> Template {
        Template::new(name, Category::Enemy, pattern(4, 4, 3))
    }

    fn matcher(scores: FixedScores) -> TemplateMatcher {
        TemplateMatcher::new(Box::new(scores))
    }

    #[test]
    fn test_below_floor_never_matches() {
        let frame = blank_frame(32, 32);
        for s in [0.0, 0.3, 0.64, 0.6499] {
            let m = matcher(FixedScores::new().score("wolf", s, (1, 1)));
            assert_eq!(m.find_best(&frame, &[enemy("wolf")], ENEMY_FLOOR), None, "score {}", s);
        }
    }

    #[test]
    fn test_highest_score_wins() {
        let frame = blank_frame(32, 32);
        let m = matcher(
            FixedScores::new()
                .score("rabbit", 0.70, (1, 1))
                .score("wolf", 0.92, (10, 4))
                .score("kobold", 0.80, (2, 2)),
        );
        let hit = m
            .find_best(&frame, &[enemy("rabbit"), enemy("wolf"), enemy("kobold")], ENEMY_FLOOR)
            .unwrap();
        assert_eq!(hit.entity_name, "wolf");
        assert_eq!(hit.location, Point::new(10.0, 4.0));
        assert_eq!(hit.confidence, 0.92);
    }

    #[test]
    fn test_tie_goes_to_first_declared() {
        let frame = blank_frame(32, 32);
        let m = matcher(FixedScores::new().score("a", 0.8, (1, 1)).score("b", 0.8, (2, 2)));
        let hit = m.find_best(&frame, &[enemy("b"), enemy("a")], ENEMY_FLOOR).unwrap();
        assert_eq!(hit.entity_name, "b");
    }

    #[test]
    fn test_score_equal_to_floor_matches() {
        let frame = blank_frame(32, 32);
        let m = matcher(FixedScores::new().score("loot", LOOT_FLOOR, (3, 3)));
        let tpl = Template::new("loot", Category::Loot, pattern(4, 4, 1));
        assert!(m.find_best(&frame, &[tpl], LOOT_FLOOR).is_some());
    }

    #[test]
    fn test_fault_skips_only_that_template() {
        let frame = blank_frame(32, 32);
        let m = matcher(FixedScores::new().fault("broken").score("wolf", 0.9, (5, 5)));
        let hit = m.find_best(&frame, &[enemy("broken"), enemy("wolf")], ENEMY_FLOOR).unwrap();
        assert_eq!(hit.entity_name, "wolf");
    }

    #[test]
    fn test_ncc_finds_embedded_patch() {
        let mut haystack = pattern(40, 30, 9);
        let needle = pattern(6, 5, 4);
        for y in 0..5 {
            for x in 0..6 {
                haystack.put_pixel(17 + x, 11 + y, *needle.get_pixel(x, y));
            }
        }
        let tpl = Template::new("needle", Category::Enemy, needle);
        let scored = NormalizedCrossCorrelation::default().best_location(&haystack, &tpl).unwrap();
        assert_eq!((scored.x, scored.y), (17, 11));
        assert!(scored.score > 0.999, "{}", scored.score);
    }

    #[test]
    fn test_coarse_pass_lands_on_exact_offset() {
        let sprite = blob(48, 40);
        let mut haystack = noise(240, 180, 5);
        paste(&mut haystack, &sprite, (133, 71));
        let tpl = Template::new("blob", Category::Enemy, sprite);

        let ncc = NormalizedCrossCorrelation { stride: 4 };
        assert_eq!(ncc.factor(48, 40), 4);
        let scored = ncc.best_location(&haystack, &tpl).unwrap();
        assert_eq!((scored.x, scored.y), (133, 71));
        assert!(scored.score > 0.999, "{}", scored.score);

        let exact = NormalizedCrossCorrelation { stride: 1 }.best_location(&haystack, &tpl).unwrap();
        assert_eq!((exact.x, exact.y), (scored.x, scored.y));
    }

    #[test]
    fn test_small_templates_are_not_shrunk() {
        let ncc = NormalizedCrossCorrelation { stride: 4 };
        assert_eq!(ncc.factor(16, 16), 1);
        assert_eq!(ncc.factor(25, 40), 2);
        assert_eq!(NormalizedCrossCorrelation { stride: 0 }.factor(64, 64), 1);
    }

    #[test]
    fn test_region_limits_search_and_keeps_frame_coordinates() {
        let needle = pattern(6, 5, 4);
        let mut haystack = noise(40, 30, 2);
        paste(&mut haystack, &needle, (27, 20));
        let frame = Frame::from_luma(&haystack);
        let tpl = [Template::new("needle", Category::Enemy, needle)];
        let m = TemplateMatcher::with_stride(1);

        let bottom_right = RelRect { l: 0.5, t: 0.5, w: 0.5, h: 0.5 };
        let hit = m.find_best_in(&frame, &tpl, 0.9, Some(&bottom_right)).unwrap();
        assert_eq!(hit.location, Point::new(27.0, 20.0));

        let top_left = RelRect { l: 0.0, t: 0.0, w: 0.5, h: 0.5 };
        assert_eq!(m.find_best_in(&frame, &tpl, 0.9, Some(&top_left)), None);

        let empty = RelRect { l: 0.9, t: 0.9, w: 0.0, h: 0.0 };
        assert_eq!(m.find_best_in(&frame, &tpl, 0.0, Some(&empty)), None);
    }

    #[test]
    fn test_ncc_rejects_bad_templates() {
        let haystack = pattern(10, 10, 1);
        let ncc = NormalizedCrossCorrelation::default();
        let big = Template::new("big", Category::Enemy, pattern(11, 4, 1));
        assert!(matches!(ncc.best_location(&haystack, &big), Err(MatchError::TooLarge { .. })));
        let flat = Template::new("flat", Category::Enemy, GrayImage::from_pixel(3, 3, image::Luma([7])));
        assert_eq!(ncc.best_location(&haystack, &flat), Err(MatchError::Flat("flat".into())));
        let empty = Template::new("empty", Category::Enemy, GrayImage::new(0, 0));
        assert_eq!(ncc.best_location(&haystack, &empty), Err(MatchError::EmptyTemplate("empty".into())));
    }
}
