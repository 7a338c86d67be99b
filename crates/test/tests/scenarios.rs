//! End-to-end scenarios over the public `grinder-core` API, run on a
//! manual clock with scripted perception.

use std::collections::HashMap;
use std::path::Path;
use std::time::{Duration, Instant};

use libtest_mimic::{Arguments, Failed, Trial};

use grinder_core::clock::Clock;
use grinder_core::combat::{CombatConfig, CombatController, CombatState, Outcome};
use grinder_core::cooldown::AbilityCooldownTracker;
use grinder_core::matcher::{TemplateMatcher, ENEMY_FLOOR};
use grinder_core::navigation::{NavConfig, NavigationController};
use grinder_core::orchestrator::{GrindingOrchestrator, Step};
use grinder_core::position::HintEstimator;
use grinder_core::profile::{Loadout, Profile};
use grinder_core::template::{Category, Template, TemplateLibrary};
use grinder_core::testing::{self, blank_frame, pattern, FixedScores, ScriptedDetector, ScriptedEstimator};
use grinder_core::types::{Frame, Point};
use grinder_test::{noise, paste, scene_with_enemy, sprite, target};

fn ensure(cond: bool, msg: impl Into<String>) -> Result<(), Failed> {
    if cond {
        Ok(())
    } else {
        Err(msg.into().into())
    }
}

fn single_template_above_floor() -> Result<(), Failed> {
    let (frame, _) = scene_with_enemy("Young_Wolf", (10, 10));
    let templates = vec![Template::new("Young_Wolf", Category::Enemy, pattern(16, 16, 7))];
    let matcher = TemplateMatcher::new(Box::new(FixedScores::new().score("Young_Wolf", 0.9, (40, 30))));

    let hit = matcher.find_best(&frame, &templates, ENEMY_FLOOR).ok_or("no detection")?;
    ensure(hit.entity_name == "Young_Wolf", format!("wrong entity {}", hit.entity_name))?;
    ensure(hit.location.x == 40.0 && hit.location.y == 30.0, format!("wrong location {:?}", hit.location))?;
    ensure((hit.confidence - 0.9).abs() < 1e-6, format!("wrong confidence {}", hit.confidence))
}

fn below_floor_is_a_miss() -> Result<(), Failed> {
    let frame = blank_frame(32, 32);
    let templates = vec![Template::new("Rabbit", Category::Enemy, pattern(8, 8, 1))];
    let matcher = TemplateMatcher::new(Box::new(FixedScores::new().score("Rabbit", 0.64, (1, 1))));
    ensure(matcher.find_best(&frame, &templates, ENEMY_FLOOR).is_none(), "0.64 matched at floor 0.65")
}

fn ncc_finds_sprite_in_scene() -> Result<(), Failed> {
    let (frame, template) = scene_with_enemy("Kobold", (101, 47));
    let hit = TemplateMatcher::default()
        .find_best(&frame, &[template], ENEMY_FLOOR)
        .ok_or("sprite not found")?;
    ensure(hit.location.x == 101.0 && hit.location.y == 47.0, format!("found at {:?}", hit.location))?;
    ensure(hit.confidence > 0.99, format!("confidence {}", hit.confidence))
}

fn ncc_tie_goes_to_first_declared() -> Result<(), Failed> {
    let (frame, template) = scene_with_enemy("first", (20, 20));
    let second = Template::new("second", Category::Enemy, template.image.clone());
    let hit = TemplateMatcher::default()
        .find_best(&frame, &[template, second], ENEMY_FLOOR)
        .ok_or("sprite not found")?;
    ensure(hit.entity_name == "first", format!("picked {}", hit.entity_name))
}

fn ncc_scans_720p_frame_quickly() -> Result<(), Failed> {
    let templates: Vec<Template> = (1..=4)
        .map(|seed| Template::new(&format!("mob{}", seed), Category::Enemy, sprite(40, 40, seed)))
        .collect();
    let mut scene = noise(1280, 720, 17);
    paste(&mut scene, &templates[2].image, 913, 388);
    let frame = Frame::from_luma(&scene);

    let started = Instant::now();
    let hit = TemplateMatcher::default()
        .find_best(&frame, &templates, ENEMY_FLOOR)
        .ok_or("sprite not found")?;
    let elapsed = started.elapsed();
    ensure(hit.entity_name == "mob3", format!("picked {}", hit.entity_name))?;
    ensure(hit.location == Point::new(913.0, 388.0), format!("found at {:?}", hit.location))?;
    ensure(hit.confidence > 0.99, format!("confidence {}", hit.confidence))?;
    ensure(elapsed < Duration::from_secs(3), format!("scan took {:?}", elapsed))
}

fn target_dies_on_third_tick() -> Result<(), Failed> {
    let (mut ctx, h) = testing::context(7);
    h.frames.publish(blank_frame(64, 64));
    let mut combat = CombatController::new(Loadout::default(), CombatConfig::default(), h.clock.clone());
    let mut detector = ScriptedDetector::new().target_dead_on(3);

    ensure(combat.start_combat(&mut ctx, &target("Young_Wolf", 20.0, 20.0)), "start refused")?;
    let start = h.clock.now();
    let mut ticks = 0;
    let state = loop {
        ticks += 1;
        let state = combat.tick(&mut ctx, &mut detector);
        if !combat.is_active() || ticks > 10 {
            break state;
        }
    };
    ensure(state == CombatState::Resolved(Outcome::Kill), format!("ended in {:?}", state))?;
    ensure(ticks == 3, format!("resolved on tick {}", ticks))?;
    ensure(detector.target_dead_calls() == 3, format!("{} target checks", detector.target_dead_calls()))?;
    ensure(h.clock.now() - start < Duration::from_secs(30), "took longer than the timeout")?;
    ensure(h.recorder.held().is_empty(), format!("keys still held: {:?}", h.recorder.held()))
}

fn kill_counts_exactly_once() -> Result<(), Failed> {
    let (ctx, h) = testing::context(11);
    h.frames.publish(blank_frame(64, 64));
    let mut lib = TemplateLibrary::default();
    lib.push(Template::new("Young_Wolf", Category::Enemy, pattern(8, 8, 1)));
    let scores = FixedScores::new().score("Young_Wolf", 0.9, (20, 10));
    let mut grinder = GrindingOrchestrator::new(
        ctx,
        &Profile::new("scenario", "Elwynn Forest"),
        lib,
        Box::new(ScriptedDetector::new().target_dead_on(3)),
        Box::new(ScriptedEstimator::new(Vec::new())),
    )
    .with_matcher(TemplateMatcher::new(Box::new(scores)));

    grinder.start_session();
    let mut steps = Vec::new();
    while steps.len() < 10 {
        let step = grinder.step();
        let done = step == Step::Fought(CombatState::Resolved(Outcome::Kill));
        steps.push(step);
        if done {
            break;
        }
    }
    let kills = grinder.stats().map(|s| s.kills).unwrap_or(0);
    ensure(kills == 1, format!("kills = {} after {:?}", kills, steps))?;

    let report = grinder.stop_session().ok_or("no report")?;
    ensure(report.kills == 1, format!("report kills = {}", report.kills))?;
    ensure(grinder.stop_session().is_none(), "second stop produced a report")
}

fn timeout_releases_keys() -> Result<(), Failed> {
    let (mut ctx, h) = testing::context(3);
    let mut combat = CombatController::new(Loadout::default(), CombatConfig::default(), h.clock.clone());
    let mut detector = ScriptedDetector::new();
    combat.start_combat(&mut ctx, &target("Defias Thug", 50.0, 50.0));
    h.clock.advance(Duration::from_secs(31));
    let state = combat.tick(&mut ctx, &mut detector);
    ensure(state == CombatState::Resolved(Outcome::Timeout), format!("ended in {:?}", state))?;
    ensure(h.recorder.held().is_empty(), "keys still held after timeout")?;
    combat.reset(&mut ctx);
    ensure(combat.state() == CombatState::Idle, "reset did not idle")
}

fn cooldown_window() -> Result<(), Failed> {
    let (_ctx, h) = testing::context(1);
    let mut cooldowns = AbilityCooldownTracker::new(h.clock.clone());
    let cd = Duration::from_secs(6);
    ensure(cooldowns.can_use("raptor_strike", cd), "unused ability blocked")?;
    cooldowns.record_use("raptor_strike");
    ensure(!cooldowns.can_use("raptor_strike", cd), "usable right after use")?;
    h.clock.advance(cd);
    ensure(cooldowns.can_use("raptor_strike", cd), "still blocked after cooldown")
}

fn exploration_without_route_moves_forward() -> Result<(), Failed> {
    let (mut ctx, h) = testing::context(5);
    let mut nav = NavigationController::new(NavConfig::default(), HashMap::new(), Vec::new());
    let mut estimator = ScriptedEstimator::new(Vec::new());
    let run = nav.navigate_to_grinding_area(&mut ctx, &mut estimator, "Feralas");
    ensure(run.is_none(), "walked a route that does not exist")?;
    ensure(h.recorder.key_downs("w") >= 1, "no forward pulse")?;
    ensure(h.recorder.held().is_empty(), "keys still held")
}

fn route_is_walked_in_order() -> Result<(), Failed> {
    let route = vec![
        Point::new(800.0, 400.0),
        Point::new(850.0, 450.0),
    ];
    let mut routes = HashMap::new();
    routes.insert("Elwynn Forest".to_string(), route);
    let (mut ctx, _h) = testing::context(9);
    let mut nav = NavigationController::new(NavConfig::default(), routes, Vec::new());
    let mut estimator = ScriptedEstimator::points([(700.0, 400.0), (795.0, 402.0), (795.0, 402.0), (848.0, 449.0)]);
    let run = nav
        .navigate_to_grinding_area(&mut ctx, &mut estimator, "Elwynn Forest")
        .ok_or("route not walked")?;
    ensure(run.completed, "route not completed")?;
    ensure(run.arrivals == vec![0, 1], format!("arrivals {:?}", run.arrivals))?;
    ensure(nav.waypoint_index() == 2, format!("index {}", nav.waypoint_index()))
}

fn blind_route_falls_back_to_exploring() -> Result<(), Failed> {
    let profiles = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../profiles");
    let profile = Profile::load_named(&profiles, "elwynn-forest")?;
    let (mut ctx, h) = testing::context(13);
    // No hint strip on screen, so every estimate is unknown
    h.frames.publish(blank_frame(320, 200));
    let mut nav = NavigationController::new(NavConfig::default(), profile.routes.clone(), Vec::new());
    let mut estimator = HintEstimator::default();

    let start = h.clock.now();
    let run = nav
        .navigate_to_grinding_area(&mut ctx, &mut estimator, &profile.zone)
        .ok_or("zone has no route")?;
    ensure(run.abandoned, "route not abandoned")?;
    ensure(run.pulses < NavConfig::default().blind_limit, format!("{} blind pulses", run.pulses))?;
    ensure(h.clock.now() - start < Duration::from_secs(40), "wandered blind too long")?;
    ensure(h.recorder.held().is_empty(), "keys still held")
}

fn main() {
    let args = Arguments::from_args();
    let tests = vec![
        Trial::test("detect::single_template_above_floor", single_template_above_floor),
        Trial::test("detect::below_floor_is_a_miss", below_floor_is_a_miss),
        Trial::test("detect::ncc_finds_sprite_in_scene", ncc_finds_sprite_in_scene),
        Trial::test("detect::ncc_tie_goes_to_first_declared", ncc_tie_goes_to_first_declared),
        Trial::test("detect::ncc_scans_720p_frame_quickly", ncc_scans_720p_frame_quickly),
        Trial::test("combat::target_dies_on_third_tick", target_dies_on_third_tick),
        Trial::test("combat::timeout_releases_keys", timeout_releases_keys),
        Trial::test("combat::cooldown_window", cooldown_window),
        Trial::test("session::kill_counts_exactly_once", kill_counts_exactly_once),
        Trial::test("nav::exploration_without_route_moves_forward", exploration_without_route_moves_forward),
        Trial::test("nav::route_is_walked_in_order", route_is_walked_in_order),
        Trial::test("nav::blind_route_falls_back_to_exploring", blind_route_falls_back_to_exploring),
    ];
    libtest_mimic::run(&args, tests).exit();
}
