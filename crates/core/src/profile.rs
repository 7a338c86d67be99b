//! Grinding profiles: Lua scripts under `profiles/<name>/main.lua` that
//! return a table describing the zone, targets, routes, abilities and how
//! game state is read from the screen.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context as _, Result};
use mlua::prelude::*;
use thiserror::Error;
use tracing::{info, warn};

use crate::detector::{BarRegion, ColorRange, Detector, NullDetector, PixelColorDetector, TemplateDetector};
use crate::logger;
use crate::matcher::{TemplateMatcher, DEFAULT_STRIDE, ENEMY_FLOOR, LOOT_FLOOR};
use crate::template::TemplateLibrary;
use crate::types::{Point, RelRect};

#[derive(Debug, Error, PartialEq)]
pub enum ProfileError {
    #[error("no ranged ability configured")]
    NoRangedAbility,
    #[error("more than one {0} ability configured")]
    DuplicateAbility(&'static str),
    #[error("ability {name}: unknown range {range:?}")]
    UnknownRange { name: String, range: String },
    #[error("unknown detector kind {0:?}")]
    UnknownDetector(String),
    #[error("{name} must be within 0..=1, got {value}")]
    Threshold { name: &'static str, value: f64 },
    #[error("search stride must be at least 1")]
    ZeroStride,
    #[error("{0}: expected an {{x, y}} pair")]
    BadPoint(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbilityRange {
    Ranged,
    Melee,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AbilityDescriptor {
    pub name: String,
    pub key: String,
    pub cooldown_secs: f64,
    pub range: AbilityRange,
}

impl AbilityDescriptor {
    pub fn new(name: &str, key: &str, cooldown_secs: f64, range: AbilityRange) -> Self {
        Self { name: name.to_string(), key: key.to_string(), cooldown_secs, range }
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs_f64(self.cooldown_secs.max(0.0))
    }
}

/// One baseline ranged ability, plus an optional melee finisher.
#[derive(Debug, Clone, PartialEq)]
pub struct Loadout {
    pub ranged: AbilityDescriptor,
    pub melee: Option<AbilityDescriptor>,
}

impl Default for Loadout {
    fn default() -> Self {
        Self {
            ranged: AbilityDescriptor::new("auto_shot", "1", 0.0, AbilityRange::Ranged),
            melee: Some(AbilityDescriptor::new("raptor_strike", "2", 6.0, AbilityRange::Melee)),
        }
    }
}

impl Loadout {
    pub fn from_abilities(abilities: Vec<AbilityDescriptor>) -> Result<Self, ProfileError> {
        let mut ranged = None;
        let mut melee = None;
        for ability in abilities {
            let slot = match ability.range {
                AbilityRange::Ranged => (&mut ranged, "ranged"),
                AbilityRange::Melee => (&mut melee, "melee"),
            };
            if slot.0.is_some() {
                return Err(ProfileError::DuplicateAbility(slot.1));
            }
            *slot.0 = Some(ability);
        }
        Ok(Self { ranged: ranged.ok_or(ProfileError::NoRangedAbility)?, melee })
    }
}

/// Match floors, health fractions and how hard the enemy search works.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub enemy_floor: f32,
    pub loot_floor: f32,
    pub status_floor: f32,
    /// Retreat below this player health fraction while fighting.
    pub health_low: f64,
    /// Rest below this player health fraction between fights.
    pub rest_below: f64,
    /// Coarse-pass shrink factor of the matcher.
    pub stride: u32,
    /// Part of the frame scanned for enemies; `None` scans all of it.
    pub search_region: Option<RelRect>,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            enemy_floor: ENEMY_FLOOR,
            loot_floor: LOOT_FLOOR,
            status_floor: 0.8,
            health_low: 0.6,
            rest_below: 0.5,
            stride: DEFAULT_STRIDE,
            search_region: None,
        }
    }
}

impl Thresholds {
    fn validate(&self) -> Result<(), ProfileError> {
        let checks = [
            ("enemy_floor", self.enemy_floor as f64),
            ("loot_floor", self.loot_floor as f64),
            ("status_floor", self.status_floor as f64),
            ("health_low", self.health_low),
            ("rest_below", self.rest_below),
        ];
        for (name, value) in checks {
            if !(0.0..=1.0).contains(&value) {
                return Err(ProfileError::Threshold { name, value });
            }
        }
        if self.stride == 0 {
            return Err(ProfileError::ZeroStride);
        }
        Ok(())
    }
}

/// How game-state signals are read.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum DetectorSpec {
    #[default]
    Null,
    /// Status icons, each optionally confined to a screen region.
    Template { regions: HashMap<String, RelRect> },
    Pixel {
        player_bar: BarRegion,
        target_bar: Option<BarRegion>,
        melee_indicator: Option<(RelRect, ColorRange)>,
    },
}

#[derive(Debug, Clone)]
pub struct Profile {
    pub name: String,
    pub path: PathBuf,
    pub zone: String,
    pub description: String,
    pub window_pattern: String,
    /// Enemy template names, in priority order. Empty means all.
    pub targets: Vec<String>,
    pub routes: HashMap<String, Vec<Point>>,
    pub vendor_route: Vec<Point>,
    /// Walk to the vendor after this many kills; 0 never does.
    pub vendor_after_kills: u32,
    pub loadout: Loadout,
    pub thresholds: Thresholds,
    pub detector: DetectorSpec,
}

impl Profile {
    /// A profile with defaults and no routes, targets or detector.
    pub fn new(name: &str, zone: &str) -> Self {
        Self {
            name: name.to_string(),
            path: PathBuf::new(),
            zone: zone.to_string(),
            description: String::new(),
            window_pattern: "World of Warcraft".to_string(),
            targets: Vec::new(),
            routes: HashMap::new(),
            vendor_route: Vec::new(),
            vendor_after_kills: 0,
            loadout: Loadout::default(),
            thresholds: Thresholds::default(),
            detector: DetectorSpec::Null,
        }
    }

    /// Evaluate `main.lua` and validate the returned table. The profile is
    /// named after its directory.
    pub fn load(path: &Path) -> Result<Self> {
        let name = path
            .parent()
            .and_then(|d| d.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "default".to_string());

        let lua = Lua::new();
        register_globals(&lua, &name).map_err(lua_err)?;

        // Set package.path so require() finds modules next to the profile
        if let Some(dir) = path.parent() {
            let dir_str = dir.to_string_lossy();
            let pkg: LuaTable = lua.globals().get("package").map_err(lua_err)?;
            pkg.set("path", format!("{}/?.lua;{}/?/init.lua", dir_str, dir_str)).map_err(lua_err)?;
        }

        let code = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let table: LuaTable = lua
            .load(&code)
            .set_name(path.to_string_lossy())
            .eval()
            .map_err(lua_err)?;

        let profile = Self::from_table(name, path.to_path_buf(), &table)
            .with_context(|| format!("loading profile {}", path.display()))?;
        info!(
            "profile {}: zone {}, {} route(s), {} target(s)",
            profile.name,
            profile.zone,
            profile.routes.len(),
            profile.targets.len()
        );
        Ok(profile)
    }

    /// Load `<dir>/<name>/main.lua`.
    pub fn load_named(dir: &Path, name: &str) -> Result<Self> {
        Self::load(&dir.join(name).join("main.lua"))
    }

    fn from_table(name: String, path: PathBuf, table: &LuaTable) -> Result<Self> {
        let zone: String = table.get("zone").map_err(lua_err)?;
        let description: Option<String> = table.get("description").map_err(lua_err)?;
        let window_pattern: Option<String> = table.get("window_pattern").map_err(lua_err)?;

        let targets: Vec<String> = match table.get::<Option<LuaTable>>("targets").map_err(lua_err)? {
            Some(t) => t.sequence_values::<String>().collect::<LuaResult<_>>().map_err(lua_err)?,
            None => Vec::new(),
        };

        let mut routes = HashMap::new();
        if let Some(t) = table.get::<Option<LuaTable>>("routes").map_err(lua_err)? {
            for pair in t.pairs::<String, LuaTable>() {
                let (zone_name, points) = pair.map_err(lua_err)?;
                let route = parse_route(&points, &zone_name)?;
                routes.insert(zone_name, route);
            }
        }

        let vendor_route = match table.get::<Option<LuaTable>>("vendor_route").map_err(lua_err)? {
            Some(t) => parse_route(&t, "vendor_route")?,
            None => Vec::new(),
        };
        let vendor_after_kills: Option<u32> = table.get("vendor_after_kills").map_err(lua_err)?;

        let loadout = match table.get::<Option<LuaTable>>("abilities").map_err(lua_err)? {
            Some(t) => Loadout::from_abilities(parse_abilities(&t)?)?,
            None => Loadout::default(),
        };

        let thresholds = match table.get::<Option<LuaTable>>("detection").map_err(lua_err)? {
            Some(t) => parse_thresholds(&t)?,
            None => Thresholds::default(),
        };
        thresholds.validate()?;

        let detector = match table.get::<Option<LuaTable>>("detector").map_err(lua_err)? {
            Some(t) => parse_detector(&t)?,
            None => DetectorSpec::Null,
        };

        Ok(Self {
            name,
            path,
            zone,
            description: description.unwrap_or_default(),
            window_pattern: window_pattern.unwrap_or_else(|| "World of Warcraft".to_string()),
            targets,
            routes,
            vendor_route,
            vendor_after_kills: vendor_after_kills.unwrap_or(0),
            loadout,
            thresholds,
            detector,
        })
    }

    /// Waypoints for `zone`, if any are configured.
    pub fn route(&self, zone: &str) -> Option<&[Point]> {
        self.routes.get(zone).map(Vec::as_slice).filter(|r| !r.is_empty())
    }

    pub fn build_detector(&self, templates: &TemplateLibrary) -> Box<dyn Detector> {
        match &self.detector {
            DetectorSpec::Null => Box::new(NullDetector),
            DetectorSpec::Template { regions } => {
                if templates.status.is_empty() {
                    warn!("template detector selected but no status templates loaded");
                }
                Box::new(
                    TemplateDetector::new(
                        TemplateMatcher::with_stride(self.thresholds.stride),
                        templates.status.clone(),
                        self.thresholds.status_floor,
                    )
                    .with_regions(regions.clone()),
                )
            }
            DetectorSpec::Pixel { player_bar, target_bar, melee_indicator } => Box::new(PixelColorDetector {
                player_bar: *player_bar,
                target_bar: *target_bar,
                melee_indicator: *melee_indicator,
                health_low: self.thresholds.health_low,
                rest_below: self.thresholds.rest_below,
            }),
        }
    }
}

/// Helper to convert mlua::Error -> anyhow::Error
fn lua_err(e: mlua::Error) -> anyhow::Error {
    anyhow!("{}", e)
}

fn parse_point(value: LuaValue, what: &str) -> Result<Point> {
    let LuaValue::Table(t) = value else {
        return Err(ProfileError::BadPoint(what.to_string()).into());
    };
    let x: Option<f64> = t.get(1).map_err(lua_err)?;
    let y: Option<f64> = t.get(2).map_err(lua_err)?;
    let (x, y) = match (x, y) {
        (Some(x), Some(y)) => (x, y),
        _ => (
            t.get::<Option<f64>>("x").map_err(lua_err)?.ok_or_else(|| ProfileError::BadPoint(what.to_string()))?,
            t.get::<Option<f64>>("y").map_err(lua_err)?.ok_or_else(|| ProfileError::BadPoint(what.to_string()))?,
        ),
    };
    Ok(Point::new(x, y))
}

fn parse_route(t: &LuaTable, route: &str) -> Result<Vec<Point>> {
    t.sequence_values::<LuaValue>()
        .enumerate()
        .map(|(i, v)| parse_point(v.map_err(lua_err)?, &format!("{} waypoint {}", route, i + 1)))
        .collect()
}

fn parse_abilities(t: &LuaTable) -> Result<Vec<AbilityDescriptor>> {
    let mut out = Vec::new();
    for entry in t.sequence_values::<LuaTable>() {
        let entry = entry.map_err(lua_err)?;
        let name: String = entry.get("name").map_err(lua_err)?;
        let key: String = entry.get("key").map_err(lua_err)?;
        let cooldown: Option<f64> = entry.get("cooldown").map_err(lua_err)?;
        let range: Option<String> = entry.get("range").map_err(lua_err)?;
        let range = match range.as_deref().unwrap_or("ranged") {
            "ranged" => AbilityRange::Ranged,
            "melee" => AbilityRange::Melee,
            other => return Err(ProfileError::UnknownRange { name, range: other.to_string() }.into()),
        };
        out.push(AbilityDescriptor { name, key, cooldown_secs: cooldown.unwrap_or(0.0), range });
    }
    Ok(out)
}

fn parse_thresholds(t: &LuaTable) -> Result<Thresholds> {
    let d = Thresholds::default();
    Ok(Thresholds {
        enemy_floor: t.get::<Option<f32>>("enemy_floor").map_err(lua_err)?.unwrap_or(d.enemy_floor),
        loot_floor: t.get::<Option<f32>>("loot_floor").map_err(lua_err)?.unwrap_or(d.loot_floor),
        status_floor: t.get::<Option<f32>>("status_floor").map_err(lua_err)?.unwrap_or(d.status_floor),
        health_low: t.get::<Option<f64>>("health_low").map_err(lua_err)?.unwrap_or(d.health_low),
        rest_below: t.get::<Option<f64>>("rest_below").map_err(lua_err)?.unwrap_or(d.rest_below),
        stride: t.get::<Option<u32>>("stride").map_err(lua_err)?.unwrap_or(d.stride),
        search_region: match t.get::<Option<LuaTable>>("search_region").map_err(lua_err)? {
            Some(r) => Some(parse_rect(&r).context("search_region")?),
            None => None,
        },
    })
}

fn parse_rect(t: &LuaTable) -> Result<RelRect> {
    let v: Vec<f64> = t.sequence_values::<f64>().collect::<LuaResult<_>>().map_err(lua_err)?;
    match v.as_slice() {
        [l, t, w, h] => Ok(RelRect { l: *l, t: *t, w: *w, h: *h }),
        _ => Err(anyhow!("rect needs 4 numbers {{l, t, w, h}}, got {}", v.len())),
    }
}

fn parse_rgb(t: &LuaTable) -> Result<[u8; 3]> {
    let v: Vec<u8> = t.sequence_values::<u8>().collect::<LuaResult<_>>().map_err(lua_err)?;
    match v.as_slice() {
        [r, g, b] => Ok([*r, *g, *b]),
        _ => Err(anyhow!("color needs 3 channels, got {}", v.len())),
    }
}

fn parse_color_range(t: &LuaTable) -> Result<ColorRange> {
    Ok(ColorRange {
        min: parse_rgb(&t.get::<LuaTable>("min").map_err(lua_err)?)?,
        max: parse_rgb(&t.get::<LuaTable>("max").map_err(lua_err)?)?,
    })
}

fn parse_bar(t: &LuaTable) -> Result<BarRegion> {
    Ok(BarRegion {
        rect: parse_rect(&t.get::<LuaTable>("rect").map_err(lua_err)?)?,
        fill: parse_color_range(&t.get::<LuaTable>("fill").map_err(lua_err)?)?,
        empty: parse_color_range(&t.get::<LuaTable>("empty").map_err(lua_err)?)?,
    })
}

fn parse_detector(t: &LuaTable) -> Result<DetectorSpec> {
    let kind: String = t.get("kind").map_err(lua_err)?;
    match kind.as_str() {
        "null" => Ok(DetectorSpec::Null),
        "template" => {
            let mut regions = HashMap::new();
            if let Some(table) = t.get::<Option<LuaTable>>("regions").map_err(lua_err)? {
                for pair in table.pairs::<String, LuaTable>() {
                    let (name, rect) = pair.map_err(lua_err)?;
                    let rect = parse_rect(&rect).with_context(|| format!("regions.{}", name))?;
                    regions.insert(name, rect);
                }
            }
            Ok(DetectorSpec::Template { regions })
        }
        "pixel" => {
            let player_bar = parse_bar(&t.get::<LuaTable>("player_bar").map_err(lua_err)?)
                .context("player_bar")?;
            let target_bar = match t.get::<Option<LuaTable>>("target_bar").map_err(lua_err)? {
                Some(b) => Some(parse_bar(&b).context("target_bar")?),
                None => None,
            };
            let melee_indicator = match t.get::<Option<LuaTable>>("melee_indicator").map_err(lua_err)? {
                Some(m) => Some((
                    parse_rect(&m.get::<LuaTable>("rect").map_err(lua_err)?)?,
                    parse_color_range(&m.get::<LuaTable>("lit").map_err(lua_err)?)?,
                )),
                None => None,
            };
            Ok(DetectorSpec::Pixel { player_bar, target_bar, melee_indicator })
        }
        other => Err(ProfileError::UnknownDetector(other.to_string()).into()),
    }
}

/// Register the F.* global table into a Lua state.
fn register_globals(lua: &Lua, tag: &str) -> mlua::Result<()> {
    let f_table = lua.create_table()?;

    // F.log(msg), tagged with the profile folder name (blue)
    logger::register_prefix("profile", logger::COLOR_BLUE);
    let tag = tag.to_string();
    let log_fn = lua.create_function(move |_, msg: String| {
        info!(target: "profile", "[{}] {}", tag, msg);
        Ok(())
    })?;
    f_table.set("log", log_fn)?;

    lua.globals().set("F", f_table)?;
    Ok(())
}

/// Recursively find all `main.lua` files under `dir`, one per profile.
pub fn find_profiles(dir: &Path) -> Vec<PathBuf> {
    let mut results = Vec::new();
    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(_) => return results,
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            let name = path.file_name().unwrap_or_default().to_string_lossy();
            if !name.starts_with('.') {
                let main_lua = path.join("main.lua");
                if main_lua.is_file() {
                    results.push(main_lua);
                } else {
                    results.extend(find_profiles(&path));
                }
            }
        }
    }
    results.sort();
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_profile(root: &Path, name: &str, body: &str) -> PathBuf {
        let dir = root.join(name);
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("main.lua");
        fs::write(&path, body).unwrap();
        path
    }

    const FULL: &str = r#"
        F.log("loading")
        return {
          zone = "Elwynn Forest",
          description = "wolves near Goldshire",
          targets = { "Young_Wolf", "Kobold Worker" },
          routes = {
            ["Elwynn Forest"] = { {800, 400}, {850, 450}, {x = 900, y = 500} },
            ["Dun Morogh"] = {},
          },
          vendor_route = { {100, 100} },
          vendor_after_kills = 20,
          abilities = {
            { name = "auto_shot", key = "1", cooldown = 0, range = "ranged" },
            { name = "raptor_strike", key = "2", cooldown = 6, range = "melee" },
          },
          detection = { health_low = 0.4 },
          detector = {
            kind = "pixel",
            player_bar = {
              rect = { 0.05, 0.05, 0.15, 0.01 },
              fill = { min = {0, 150, 0}, max = {80, 255, 80} },
              empty = { min = {0, 0, 0}, max = {60, 60, 60} },
            },
          },
        }
    "#;

    #[test]
    fn test_load_full_profile() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_profile(dir.path(), "elwynn", FULL);
        let p = Profile::load(&path).unwrap();
        assert_eq!(p.name, "elwynn");
        assert_eq!(p.zone, "Elwynn Forest");
        assert_eq!(p.window_pattern, "World of Warcraft");
        assert_eq!(p.targets, vec!["Young_Wolf", "Kobold Worker"]);
        assert_eq!(
            p.route("Elwynn Forest").unwrap(),
            &[Point::new(800.0, 400.0), Point::new(850.0, 450.0), Point::new(900.0, 500.0)]
        );
        assert_eq!(p.route("Dun Morogh"), None);
        assert_eq!(p.route("Feralas"), None);
        assert_eq!(p.vendor_route, vec![Point::new(100.0, 100.0)]);
        assert_eq!(p.vendor_after_kills, 20);
        assert_eq!(p.loadout, Loadout::default());
        assert_eq!(p.thresholds.health_low, 0.4);
        assert_eq!(p.thresholds.enemy_floor, ENEMY_FLOOR);
        assert_eq!(p.thresholds.stride, DEFAULT_STRIDE);
        assert_eq!(p.thresholds.search_region, None);
        assert!(matches!(p.detector, DetectorSpec::Pixel { target_bar: None, .. }));
    }

    #[test]
    fn test_minimal_profile_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_profile(dir.path(), "bare", r#"return { zone = "Feralas" }"#);
        let p = Profile::load(&path).unwrap();
        assert!(p.routes.is_empty());
        assert_eq!(p.loadout.ranged.key, "1");
        assert_eq!(p.detector, DetectorSpec::Null);
    }

    #[test]
    fn test_loadout_requires_ranged() {
        let melee_only = vec![AbilityDescriptor::new("raptor_strike", "2", 6.0, AbilityRange::Melee)];
        assert_eq!(Loadout::from_abilities(melee_only), Err(ProfileError::NoRangedAbility));
        let two = vec![
            AbilityDescriptor::new("a", "1", 0.0, AbilityRange::Ranged),
            AbilityDescriptor::new("b", "3", 0.0, AbilityRange::Ranged),
        ];
        assert_eq!(Loadout::from_abilities(two), Err(ProfileError::DuplicateAbility("ranged")));
    }

    #[test]
    fn test_invalid_profiles_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let bad_threshold =
            write_profile(dir.path(), "a", r#"return { zone = "x", detection = { loot_floor = 1.5 } }"#);
        let err = Profile::load(&bad_threshold).unwrap_err();
        assert!(format!("{:#}", err).contains("loot_floor"));

        let bad_kind = write_profile(dir.path(), "b", r#"return { zone = "x", detector = { kind = "magic" } }"#);
        assert!(Profile::load(&bad_kind).is_err());

        let bad_point = write_profile(dir.path(), "c", r#"return { zone = "x", routes = { x = { {1} } } }"#);
        assert!(Profile::load(&bad_point).is_err());

        let syntax = write_profile(dir.path(), "d", "return {");
        assert!(Profile::load(&syntax).is_err());

        let zero_stride = write_profile(dir.path(), "e", r#"return { zone = "x", detection = { stride = 0 } }"#);
        let err = Profile::load(&zero_stride).unwrap_err();
        assert!(format!("{:#}", err).contains("stride"));

        let bad_region = write_profile(
            dir.path(),
            "f",
            r#"return { zone = "x", detector = { kind = "template", regions = { target_dead = { 0.1 } } } }"#,
        );
        assert!(Profile::load(&bad_region).is_err());
    }

    #[test]
    fn test_find_profiles_recurses() {
        let dir = tempfile::tempdir().unwrap();
        write_profile(dir.path(), "b", "return {}");
        write_profile(&dir.path().join("group"), "a", "return {}");
        fs::create_dir_all(dir.path().join(".hidden")).unwrap();
        fs::write(dir.path().join(".hidden").join("main.lua"), "return {}").unwrap();
        let found = find_profiles(dir.path());
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|p| p.ends_with("main.lua")));
    }

    #[test]
    fn test_shipped_profiles_load() {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../profiles");
        let elwynn = Profile::load_named(&dir, "elwynn-forest").unwrap();
        assert_eq!(elwynn.route("Elwynn Forest").map(<[Point]>::len), Some(5));
        assert_eq!(elwynn.route("Feralas").map(<[Point]>::len), Some(5));
        assert_eq!(elwynn.targets[0], "Young_Wolf");
        assert_eq!(elwynn.vendor_after_kills, 25);
        assert!(matches!(elwynn.detector, DetectorSpec::Pixel { target_bar: Some(_), melee_indicator: Some(_), .. }));

        let dun_morogh = Profile::load_named(&dir, "dun-morogh").unwrap();
        assert_eq!(dun_morogh.thresholds.stride, 4);
        assert_eq!(dun_morogh.thresholds.search_region, Some(RelRect { l: 0.0, t: 0.1, w: 1.0, h: 0.65 }));
        let DetectorSpec::Template { regions } = &dun_morogh.detector else {
            panic!("dun-morogh should use the template detector");
        };
        assert_eq!(regions.len(), 5);
        assert_eq!(regions["target_dead"], RelRect { l: 0.15, t: 0.0, w: 0.2, h: 0.12 });
        assert_eq!(find_profiles(&dir).len(), 2);
    }
}
