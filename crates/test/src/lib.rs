//! Fixtures shared by the scenario runner and the diagnostic binaries.

use std::path::Path;

use anyhow::{Context as _, Result};
use grinder_core::template::{Category, Template};
pub use grinder_core::testing::noise;
use grinder_core::testing::pattern;
use grinder_core::types::{DetectionResult, Frame, PixelFormat, Point};
use image::GrayImage;

/// Paste `template` into `scene` with its top-left corner at (x, y).
pub fn paste(scene: &mut GrayImage, template: &GrayImage, x: u32, y: u32) {
    for (tx, ty, px) in template.enumerate_pixels() {
        if x + tx < scene.width() && y + ty < scene.height() {
            scene.put_pixel(x + tx, y + ty, *px);
        }
    }
}

/// A noisy scene with an enemy sprite at `at`, plus the sprite's template.
pub fn scene_with_enemy(name: &str, at: (u32, u32)) -> (Frame, Template) {
    let sprite = pattern(16, 16, 7);
    let mut scene = noise(160, 120, 3);
    paste(&mut scene, &sprite, at.0, at.1);
    (Frame::from_luma(&scene), Template::new(name, Category::Enemy, sprite))
}

/// Smoothly shaded sprite; `seed` changes its shading.
pub fn sprite(width: u32, height: u32, seed: u32) -> GrayImage {
    let (fx, fy) = (4.0 + seed as f64, 5.0 + 2.0 * seed as f64);
    GrayImage::from_fn(width, height, |x, y| {
        let v = 128.0 + 60.0 * (x as f64 / fx + seed as f64).sin() + 60.0 * (y as f64 / fy).cos();
        image::Luma([v.clamp(0.0, 255.0) as u8])
    })
}

pub fn target(name: &str, x: f64, y: f64) -> DetectionResult {
    DetectionResult {
        entity_name: name.to_string(),
        location: Point::new(x, y),
        size: (16, 16),
        confidence: 0.9,
    }
}

/// Load a screenshot from disk as a frame.
pub fn load_frame(path: &Path) -> Result<Frame> {
    let img = image::open(path)
        .with_context(|| format!("opening {}", path.display()))?
        .to_rgba8();
    let (w, h) = img.dimensions();
    Ok(Frame::new(img.into_raw(), w, h, PixelFormat::Rgba))
}
