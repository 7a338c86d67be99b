use std::time::Instant;

use image::GrayImage;

/// Window identifier (CGWindowID on macOS)
pub type WindowId = u64;

/// A position in screen pixels or map units, depending on who produced it.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point) -> f64 {
        (other.x - self.x).hypot(other.y - self.y)
    }

    /// Bearing from `self` towards `other`, in radians (screen axes, y down).
    pub fn bearing_to(&self, other: &Point) -> f64 {
        (other.y - self.y).atan2(other.x - self.x)
    }

    pub fn offset(&self, dx: f64, dy: f64) -> Point {
        Point::new(self.x + dx, self.y + dy)
    }
}

/// Sub-region expressed as ratios of the frame size, so profiles survive
/// resolution changes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RelRect {
    pub l: f64,
    pub t: f64,
    pub w: f64,
    pub h: f64,
}

impl RelRect {
    /// (left, top, width, height) in pixels of a `width` x `height` image,
    /// clamped to it.
    pub fn bounds(&self, width: u32, height: u32) -> (u32, u32, u32, u32) {
        let clamp = |v: f64, max: u32| (v.max(0.0) as u32).min(max);
        let l = clamp(self.l * width as f64, width);
        let t = clamp(self.t * height as f64, height);
        let w = clamp(self.w * width as f64, width - l);
        let h = clamp(self.h * height as f64, height - t);
        (l, t, w, h)
    }
}

/// Byte layout of a frame's pixel buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Bgra,
    Rgba,
    Rgb,
    Luma,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> u32 {
        match self {
            PixelFormat::Bgra | PixelFormat::Rgba => 4,
            PixelFormat::Rgb => 3,
            PixelFormat::Luma => 1,
        }
    }
}

/// One captured screen image. Immutable once published.
#[derive(Debug, Clone)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub bytes_per_row: u32,
    pub format: PixelFormat,
    /// Frame pixels per screen point (2.0 on a retina capture).
    pub scale: f64,
    pub captured_at: Instant,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            bytes_per_row: width * format.bytes_per_pixel(),
            data,
            width,
            height,
            format,
            scale: 1.0,
            captured_at: Instant::now(),
        }
    }

    pub fn from_luma(img: &GrayImage) -> Self {
        Self::new(img.as_raw().clone(), img.width(), img.height(), PixelFormat::Luma)
    }

    /// RGB triple at (x, y). Out-of-range coordinates read as black.
    pub fn rgb(&self, x: u32, y: u32) -> [u8; 3] {
        if x >= self.width || y >= self.height {
            return [0, 0, 0];
        }
        let idx = (y * self.bytes_per_row + x * self.format.bytes_per_pixel()) as usize;
        let Some(px) = self.data.get(idx..idx + self.format.bytes_per_pixel() as usize) else {
            return [0, 0, 0];
        };
        match self.format {
            PixelFormat::Bgra => [px[2], px[1], px[0]],
            PixelFormat::Rgba | PixelFormat::Rgb => [px[0], px[1], px[2]],
            PixelFormat::Luma => [px[0], px[0], px[0]],
        }
    }

    /// BT.601 luma, the same weighting the matcher uses for templates.
    pub fn luma(&self, x: u32, y: u32) -> u8 {
        if self.format == PixelFormat::Luma {
            return self.rgb(x, y)[0];
        }
        let [r, g, b] = self.rgb(x, y);
        (0.299 * r as f64 + 0.587 * g as f64 + 0.114 * b as f64).round() as u8
    }

    pub fn to_luma_image(&self) -> GrayImage {
        GrayImage::from_fn(self.width, self.height, |x, y| image::Luma([self.luma(x, y)]))
    }

    /// Map a frame pixel position to screen coordinates.
    pub fn to_screen(&self, p: Point) -> Point {
        if self.scale <= 0.0 {
            return p;
        }
        Point::new(p.x / self.scale, p.y / self.scale)
    }

    /// Pixel bounds of a relative rect, clamped to the frame.
    pub fn rel_bounds(&self, r: &RelRect) -> (u32, u32, u32, u32) {
        r.bounds(self.width, self.height)
    }
}

/// A template that matched a frame.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionResult {
    pub entity_name: String,
    /// Top-left corner of the best match, in frame pixels.
    pub location: Point,
    pub size: (u32, u32),
    pub confidence: f32,
}

impl DetectionResult {
    pub fn center(&self) -> Point {
        self.location
            .offset(self.size.0 as f64 / 2.0, self.size.1 as f64 / 2.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    Left,
    Right,
}

/// Command from TUI to orchestrator
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    StartSession,
    StopSession,
    Engage(Point),
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    Running,
    Stopping,
    #[default]
    Stopped,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bgra_pixel_order() {
        let frame = Frame::new(vec![10, 20, 30, 255], 1, 1, PixelFormat::Bgra);
        assert_eq!(frame.rgb(0, 0), [30, 20, 10]);
        assert_eq!(frame.rgb(5, 5), [0, 0, 0]);
    }

    #[test]
    fn test_rel_bounds_clamped() {
        let frame = Frame::new(vec![0; 100 * 50], 100, 50, PixelFormat::Luma);
        let (l, t, w, h) = frame.rel_bounds(&RelRect { l: 0.9, t: 0.5, w: 0.5, h: 0.2 });
        assert_eq!((l, t, w, h), (90, 25, 10, 10));
    }

    #[test]
    fn test_to_screen_divides_by_retina_scale() {
        let mut frame = Frame::new(vec![0; 4], 2, 2, PixelFormat::Luma);
        assert_eq!(frame.to_screen(Point::new(300.0, 120.0)), Point::new(300.0, 120.0));
        frame.scale = 2.0;
        assert_eq!(frame.to_screen(Point::new(300.0, 121.0)), Point::new(150.0, 60.5));
        frame.scale = 0.0;
        assert_eq!(frame.to_screen(Point::new(7.0, 9.0)), Point::new(7.0, 9.0));
    }
}
