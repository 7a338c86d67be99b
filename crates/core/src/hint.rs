//! Position hints painted by an in-game addon as a strip of coloured
//! pixels: `[0x00][0x7F] payload [0x7F][0x00]`, each symbol a run of pixels
//! about half a marker wide.

use crate::types::Frame;

const MARK_LOW: u8 = 0x00;
const MARK_HIGH: u8 = 0x7F;
const SCAN_ROWS: u32 = 60;
const SCAN_COLS: u32 = 200;

/// 7-bit symbol carried by one pixel: G[6:4] << 4 | R[6:5] << 2 | B[6:5].
fn symbol(frame: &Frame, x: u32, y: u32) -> u8 {
    let [r, g, b] = frame.rgb(x, y);
    (((g >> 4) & 0x07) << 4) | (((r >> 5) & 0x03) << 2) | ((b >> 5) & 0x03)
}

/// Run-length encode the symbols along row `y`.
fn runs(frame: &Frame, y: u32) -> Vec<(u8, u32)> {
    let mut out: Vec<(u8, u32)> = Vec::new();
    for x in 0..frame.width.min(SCAN_COLS) {
        let v = symbol(frame, x, y);
        match out.last_mut() {
            Some((last, n)) if *last == v => *n += 1,
            _ => out.push((v, 1)),
        }
    }
    out
}

fn decode_runs(runs: &[(u8, u32)]) -> Option<String> {
    let open = runs.windows(2).position(|w| w[0].0 == MARK_LOW && w[1].0 == MARK_HIGH)?;
    let marker = runs[open].1 + runs[open + 1].1;
    let body = &runs[open + 2..];
    let close = body.iter().position(|r| r.0 == MARK_HIGH)?;
    if close == 0 || !body[close + 1..].iter().any(|r| r.0 == MARK_LOW) {
        return None;
    }

    let mut text = String::new();
    for &(v, n) in &body[..close] {
        let ch = v as char;
        if !(ch.is_ascii_graphic() || ch == ' ') {
            continue;
        }
        let repeats = ((n as f64 * 2.0) / marker as f64).round().max(1.0) as usize;
        text.extend(std::iter::repeat(ch).take(repeats));
    }
    (!text.is_empty()).then_some(text)
}

/// Decode the hint strip from the top-left corner of `frame`, trying every
/// third row.
pub fn decode_hint(frame: &Frame) -> Option<String> {
    (0..frame.height.min(SCAN_ROWS))
        .step_by(3)
        .find_map(|y| decode_runs(&runs(frame, y)))
}
