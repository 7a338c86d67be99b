use std::process::Command as ProcessCommand;
use std::thread;
use std::time::{Duration, Instant};

use core_foundation::array::CFArray;
use core_foundation::base::TCFType;
use core_foundation::dictionary::CFDictionary;
use core_foundation::number::CFNumber;
use core_foundation::string::CFString;
use core_graphics::event::*;
use core_graphics::event_source::*;
use core_graphics::geometry::*;
use core_graphics::window::*;
use regex::Regex;
use tracing::{debug, error, info, warn};

use super::{CaptureSource, InputBackend, Platform};
use crate::types::*;

/// Virtual key codes (ANSI layout) for the keys the bot presses.
fn key_code(key: &str) -> Option<CGKeyCode> {
    let code = match key {
        "a" => 0,
        "s" => 1,
        "d" => 2,
        "q" => 12,
        "w" => 13,
        "e" => 14,
        "r" => 15,
        "f" => 3,
        "x" => 7,
        "1" => 18,
        "2" => 19,
        "3" => 20,
        "4" => 21,
        "5" => 23,
        "6" => 22,
        "7" => 26,
        "8" => 28,
        "9" => 25,
        "0" => 29,
        "space" => 49,
        "tab" => 48,
        "enter" | "return" => 36,
        "escape" | "esc" => 53,
        "up" => 126,
        "down" => 125,
        "left" => 123,
        "right" => 124,
        _ => return None,
    };
    Some(code)
}

#[derive(Debug, Clone)]
struct WindowInfo {
    id: CGWindowID,
    title: String,
    pid: Option<i32>,
    bounds: CGRect,
}

fn list_windows() -> Vec<WindowInfo> {
    let mut out = Vec::new();
    unsafe {
        let option = kCGWindowListOptionOnScreenOnly | kCGWindowListExcludeDesktopElements;
        let window_list_ref = CGWindowListCopyWindowInfo(option, kCGNullWindowID);
        if window_list_ref.is_null() {
            warn!("failed to get window list");
            return out;
        }

        let list: CFArray = CFArray::wrap_under_create_rule(window_list_ref as _);
        for dict_ptr in &list.get_all_values() {
            let dict: CFDictionary<CFString, *const std::ffi::c_void> =
                CFDictionary::wrap_under_get_rule(*dict_ptr as _);

            if get_cf_number(&dict, "kCGWindowLayer") != Some(0) {
                continue;
            }
            let Some(id) = get_cf_number(&dict, "kCGWindowNumber") else { continue };
            let name = get_cf_string(&dict, "kCGWindowName").unwrap_or_default();
            let owner = get_cf_string(&dict, "kCGWindowOwnerName").unwrap_or_default();
            let bounds = get_cf_dict(&dict, "kCGWindowBounds").map(|b| {
                CGRect::new(
                    &CGPoint::new(
                        get_cf_number(&b, "X").unwrap_or(0) as f64,
                        get_cf_number(&b, "Y").unwrap_or(0) as f64,
                    ),
                    &CGSize::new(
                        get_cf_number(&b, "Width").unwrap_or(0) as f64,
                        get_cf_number(&b, "Height").unwrap_or(0) as f64,
                    ),
                )
            });

            out.push(WindowInfo {
                id: id as CGWindowID,
                title: if !name.is_empty() { name } else { owner },
                pid: get_cf_number(&dict, "kCGWindowOwnerPID").map(|v| v as i32),
                bounds: bounds.unwrap_or_else(|| CGRect::new(&CGPoint::new(0.0, 0.0), &CGSize::new(0.0, 0.0))),
            });
        }
    }
    out
}

fn find_window(pattern: &str) -> Option<WindowInfo> {
    let re = match Regex::new(&format!("(?i){}", pattern)) {
        Ok(r) => r,
        Err(e) => {
            error!("invalid pattern '{}': {}", pattern, e);
            return None;
        }
    };
    list_windows().into_iter().find(|w| !w.title.is_empty() && re.is_match(&w.title))
}

pub struct DarwinPlatform;

impl DarwinPlatform {
    pub fn new() -> Self {
        DarwinPlatform
    }
}

impl Platform for DarwinPlatform {
    fn get_instances(&self, pattern: &str) -> Vec<(WindowId, String)> {
        let Ok(re) = Regex::new(&format!("(?i){}", pattern)) else {
            error!("invalid pattern '{}'", pattern);
            return Vec::new();
        };
        list_windows()
            .into_iter()
            .filter(|w| !w.title.is_empty() && re.is_match(&w.title))
            .map(|w| {
                info!("found window: \"{}\" (id: {})", w.title, w.id);
                (w.id as WindowId, w.title)
            })
            .collect()
    }

    fn create_input(&self, pattern: &str) -> Box<dyn InputBackend> {
        Box::new(DarwinInput { pattern: pattern.to_string(), window: find_window(pattern), cursor: None })
    }

    fn create_capture(&self, pattern: &str) -> Box<dyn CaptureSource> {
        Box::new(DarwinCapture { pattern: pattern.to_string(), window: find_window(pattern), last_lookup: Instant::now() })
    }
}

/// Posts HID events. Cursor coordinates are window-relative points.
struct DarwinInput {
    pattern: String,
    window: Option<WindowInfo>,
    cursor: Option<CGPoint>,
}

impl DarwinInput {
    fn window(&mut self) -> Option<&WindowInfo> {
        if self.window.is_none() {
            self.window = find_window(&self.pattern);
        }
        self.window.as_ref()
    }

    fn source() -> Option<CGEventSource> {
        CGEventSource::new(CGEventSourceStateID::HIDSystemState).ok()
    }

    fn post_mouse(&self, kind: CGEventType, at: CGPoint, button: CGMouseButton) {
        let Some(source) = Self::source() else { return };
        if let Ok(event) = CGEvent::new_mouse_event(source, kind, at, button) {
            event.post(CGEventTapLocation::HID);
        }
    }

    fn post_key(&self, key: &str, down: bool) {
        let Some(code) = key_code(key) else {
            warn!("unknown key: {}", key);
            return;
        };
        let Some(source) = Self::source() else { return };
        if let Ok(event) = CGEvent::new_keyboard_event(source, code, down) {
            event.post(CGEventTapLocation::HID);
        }
    }
}

impl InputBackend for DarwinInput {
    fn move_cursor(&mut self, x: f64, y: f64, duration: Duration) {
        let Some(origin) = self.window().map(|w| w.bounds.origin) else {
            debug!("no window for cursor move");
            return;
        };
        let to = CGPoint::new(origin.x + x, origin.y + y);
        let from = self.cursor.unwrap_or(to);
        let steps = (duration.as_millis() / 10).max(1) as u32;
        for i in 1..=steps {
            let t = i as f64 / steps as f64;
            let p = CGPoint::new(from.x + (to.x - from.x) * t, from.y + (to.y - from.y) * t);
            self.post_mouse(CGEventType::MouseMoved, p, CGMouseButton::Left);
            thread::sleep(duration / steps);
        }
        self.cursor = Some(to);
    }

    fn click(&mut self, button: MouseButton) {
        let Some(at) = self.cursor else {
            debug!("click before any cursor move, ignored");
            return;
        };
        let (down, up, cg_button) = match button {
            MouseButton::Left => (CGEventType::LeftMouseDown, CGEventType::LeftMouseUp, CGMouseButton::Left),
            MouseButton::Right => (CGEventType::RightMouseDown, CGEventType::RightMouseUp, CGMouseButton::Right),
        };
        self.post_mouse(down, at, cg_button);
        thread::sleep(Duration::from_millis(15));
        self.post_mouse(up, at, cg_button);
        thread::sleep(Duration::from_millis(15));
    }

    fn key_down(&mut self, key: &str) {
        self.post_key(key, true);
    }

    fn key_up(&mut self, key: &str) {
        self.post_key(key, false);
    }

    fn key_press(&mut self, key: &str) {
        self.post_key(key, true);
        thread::sleep(Duration::from_millis(30));
        self.post_key(key, false);
    }

    fn activate(&mut self) {
        let Some(pid) = self.window().and_then(|w| w.pid) else { return };
        let script = format!(
            "tell application \"System Events\" to set frontmost of first process whose unix id is {} to true",
            pid
        );
        ProcessCommand::new("osascript")
            .arg("-e")
            .arg(&script)
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status()
            .ok();
    }
}

/// Captures the game window's own image, so overlapping windows do not
/// leak into frames.
struct DarwinCapture {
    pattern: String,
    window: Option<WindowInfo>,
    last_lookup: Instant,
}

impl CaptureSource for DarwinCapture {
    fn grab(&mut self) -> Option<Frame> {
        // Re-resolve the window now and then; it may move or be recreated
        if self.window.is_none() || self.last_lookup.elapsed() > Duration::from_secs(5) {
            self.window = find_window(&self.pattern);
            self.last_lookup = Instant::now();
        }
        let window = self.window.as_ref()?;

        let null_rect = CGRect::new(&CGPoint::new(0.0, 0.0), &CGSize::new(0.0, 0.0));
        let image = create_image(
            null_rect,
            kCGWindowListOptionIncludingWindow,
            window.id,
            kCGWindowImageBoundsIgnoreFraming,
        );
        let Some(image) = image else {
            self.window = None;
            return None;
        };

        let bytes_per_row = image.bytes_per_row() as u32;
        let width = image.width() as u32;
        let height = image.height() as u32;
        let data = image.data().bytes().to_vec();

        let mut frame = Frame::new(data, width, height, PixelFormat::Bgra);
        frame.bytes_per_row = bytes_per_row;
        if window.bounds.size.width > 0.0 {
            frame.scale = width as f64 / window.bounds.size.width;
        }
        Some(frame)
    }
}

// --- CF Dictionary helpers ---

unsafe fn get_cf_string(
    dict: &CFDictionary<CFString, *const std::ffi::c_void>,
    key: &str,
) -> Option<String> {
    let cf_key = CFString::new(key);
    let value = dict.find(&cf_key)?;
    let cf_str: CFString = CFString::wrap_under_get_rule(*value as _);
    Some(cf_str.to_string())
}

unsafe fn get_cf_number(
    dict: &CFDictionary<CFString, *const std::ffi::c_void>,
    key: &str,
) -> Option<i64> {
    let cf_key = CFString::new(key);
    let value = dict.find(&cf_key)?;
    let cf_num: CFNumber = CFNumber::wrap_under_get_rule(*value as _);
    cf_num.to_i64()
}

unsafe fn get_cf_dict(
    dict: &CFDictionary<CFString, *const std::ffi::c_void>,
    key: &str,
) -> Option<CFDictionary<CFString, *const std::ffi::c_void>> {
    let cf_key = CFString::new(key);
    let value = dict.find(&cf_key)?;
    Some(CFDictionary::wrap_under_get_rule(*value as _))
}
