//! Decode the position hint strip from screenshots.
//!
//! Usage: decode-hint <png>...

use std::path::PathBuf;

use grinder_core::hint::decode_hint;
use grinder_core::position::{HintEstimator, PositionEstimator};
use grinder_test::load_frame;

fn main() -> anyhow::Result<()> {
    let paths: Vec<PathBuf> = std::env::args().skip(1).map(PathBuf::from).collect();
    if paths.is_empty() {
        anyhow::bail!("usage: decode-hint <png>...");
    }

    let mut estimator = HintEstimator::default();
    for path in &paths {
        let frame = load_frame(path)?;
        let raw = decode_hint(&frame);
        let fix = estimator.estimate(Some(&frame));
        match (raw, fix) {
            (Some(raw), Some(fix)) => {
                let facing = fix.facing.map_or("-".to_string(), |f| format!("{:.2}", f));
                println!("{}: \"{}\" -> ({:.1}, {:.1}) facing {}", path.display(), raw, fix.pos.x, fix.pos.y, facing);
            }
            (Some(raw), None) => println!("{}: \"{}\" (unparseable)", path.display(), raw),
            (None, _) => println!("{}: no hint", path.display()),
        }
    }
    Ok(())
}
