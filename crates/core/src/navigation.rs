//! Goal-directed movement without ground-truth position: waypoint
//! following on estimated fixes, random exploration, stuck recovery.

use std::collections::HashMap;
use std::f64::consts::{PI, TAU};

use tracing::{debug, info, warn};

use crate::context::{Context, KEY_BACK, KEY_FORWARD, KEY_JUMP, KEY_TURN_LEFT, KEY_TURN_RIGHT};
use crate::position::{Fix, PositionEstimator, PositionHistory};
use crate::types::Point;

#[derive(Debug, Clone)]
pub struct NavConfig {
    pub arrival_radius: f64,
    pub pulse_secs: f64,
    pub cycle_pause_secs: f64,
    /// Forward pulses spent on one waypoint before it is skipped.
    pub pulse_budget: u32,
    /// Consecutive unknown positions after which a route is given up for
    /// random exploration.
    pub blind_limit: u32,
    pub history_capacity: usize,
    pub stuck_window: usize,
    pub stuck_spread: f64,
    /// Radians turned per second of holding a turn key.
    pub turn_rate: f64,
    pub max_turn_secs: f64,
    /// Heading errors below this are not worth a turn.
    pub turn_deadband: f64,
    pub random_cycles: u32,
    pub random_forward_secs: (f64, f64),
    pub random_turn_secs: f64,
    pub obstacle_chance: f64,
    pub obstacle_back_secs: f64,
    pub search_forward_secs: (f64, f64),
    pub search_turn_chance: f64,
    pub search_turn_secs: (f64, f64),
    pub recovery_back_secs: f64,
    pub recovery_turn_secs: (f64, f64),
}

impl Default for NavConfig {
    fn default() -> Self {
        Self {
            arrival_radius: 20.0,
            pulse_secs: 1.0,
            cycle_pause_secs: 0.5,
            pulse_budget: 40,
            blind_limit: 5,
            history_capacity: 10,
            stuck_window: 5,
            stuck_spread: 10.0,
            turn_rate: PI,
            max_turn_secs: 1.0,
            turn_deadband: 0.1,
            random_cycles: 5,
            random_forward_secs: (1.0, 3.0),
            random_turn_secs: 0.5,
            obstacle_chance: 0.2,
            obstacle_back_secs: 0.5,
            search_forward_secs: (0.8, 1.5),
            search_turn_chance: 0.4,
            search_turn_secs: (0.1, 0.5),
            recovery_back_secs: 1.5,
            recovery_turn_secs: (0.5, 1.5),
        }
    }
}

/// What one pass over a route did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WaypointRun {
    /// Indices reached, in the order they were reached.
    pub arrivals: Vec<usize>,
    /// Indices abandoned after exhausting the pulse budget.
    pub skipped: Vec<usize>,
    pub pulses: u32,
    pub recoveries: u32,
    /// False when the run flag was cleared mid-route or the route was abandoned.
    pub completed: bool,
    /// Position was lost for `blind_limit` cycles in a row.
    pub abandoned: bool,
}

pub struct NavigationController {
    config: NavConfig,
    routes: HashMap<String, Vec<Point>>,
    vendor_route: Vec<Point>,
    history: PositionHistory,
    waypoint_index: usize,
}

impl NavigationController {
    pub fn new(config: NavConfig, routes: HashMap<String, Vec<Point>>, vendor_route: Vec<Point>) -> Self {
        let history = PositionHistory::new(config.history_capacity);
        Self { config, routes, vendor_route, history, waypoint_index: 0 }
    }

    pub fn history(&self) -> &PositionHistory {
        &self.history
    }

    pub fn record_position(&mut self, p: Point) {
        self.history.push(p);
    }

    /// Index of the waypoint currently being walked to.
    pub fn waypoint_index(&self) -> usize {
        self.waypoint_index
    }

    /// Walk the zone's route, or explore when it has none. Returns the
    /// route run, if a route was walked.
    pub fn navigate_to_grinding_area(
        &mut self,
        ctx: &mut Context,
        estimator: &mut dyn PositionEstimator,
        zone: &str,
    ) -> Option<WaypointRun> {
        info!("navigating to grinding area in {}", zone);
        match self.routes.get(zone).filter(|r| !r.is_empty()).cloned() {
            Some(route) => Some(self.follow_waypoints(ctx, estimator, &route)),
            None => {
                info!("no waypoints for {}, exploring", zone);
                self.random_navigation(ctx);
                None
            }
        }
    }

    /// Head back to the vendor along its route, or explore without one.
    pub fn return_to_vendor(&mut self, ctx: &mut Context, estimator: &mut dyn PositionEstimator) -> Option<WaypointRun> {
        info!("returning to vendor");
        if self.vendor_route.is_empty() {
            self.random_navigation(ctx);
            return None;
        }
        let route = self.vendor_route.clone();
        Some(self.follow_waypoints(ctx, estimator, &route))
    }

    /// Visit `route` strictly in order. The waypoint index only moves
    /// forward: on arrival, or when the pulse budget runs out. Without a
    /// position fix for `blind_limit` cycles the route is abandoned and the
    /// character explores instead.
    pub fn follow_waypoints(
        &mut self,
        ctx: &mut Context,
        estimator: &mut dyn PositionEstimator,
        route: &[Point],
    ) -> WaypointRun {
        let mut run = WaypointRun::default();
        self.waypoint_index = 0;
        let mut spent = 0u32;
        let mut blind = 0u32;

        while self.waypoint_index < route.len() {
            if !ctx.is_running() {
                info!("navigation interrupted at waypoint {}", self.waypoint_index + 1);
                return run;
            }
            let target = route[self.waypoint_index];

            let fix = estimator.estimate(ctx.frame().as_deref());
            match fix {
                Some(fix) if fix.pos.distance(&target) < self.config.arrival_radius => {
                    debug!("reached waypoint {}/{}", self.waypoint_index + 1, route.len());
                    run.arrivals.push(self.waypoint_index);
                    self.waypoint_index += 1;
                    spent = 0;
                    blind = 0;
                    continue;
                }
                Some(fix) => {
                    blind = 0;
                    self.turn_towards(ctx, &fix, target);
                }
                None => {
                    blind += 1;
                    if blind >= self.config.blind_limit {
                        warn!("position unknown for {} cycles, abandoning route", blind);
                        run.abandoned = true;
                        self.random_navigation(ctx);
                        return run;
                    }
                    debug!("position unknown, pulsing forward");
                }
            }

            ctx.hold(KEY_FORWARD, self.config.pulse_secs);
            run.pulses += 1;
            spent += 1;

            if let Some(after) = estimator.estimate(ctx.frame().as_deref()) {
                self.history.push(after.pos);
            }
            if self.is_stuck() {
                self.recover(ctx);
                run.recoveries += 1;
            }

            if spent >= self.config.pulse_budget {
                warn!("waypoint {} not reached after {} pulses, skipping", self.waypoint_index + 1, spent);
                run.skipped.push(self.waypoint_index);
                self.waypoint_index += 1;
                spent = 0;
            }
            ctx.pause_jitter(self.config.cycle_pause_secs);
        }

        run.completed = true;
        run
    }

    /// The newest samples barely moved on either axis.
    pub fn is_stuck(&self) -> bool {
        self.history
            .spread(self.config.stuck_window)
            .is_some_and(|(dx, dy)| dx < self.config.stuck_spread && dy < self.config.stuck_spread)
    }

    /// Jump, back up, turn a random way, jump again, forget the history.
    pub fn recover(&mut self, ctx: &mut Context) {
        info!("stuck, trying to free the character");
        ctx.press(KEY_JUMP);
        ctx.hold(KEY_BACK, self.config.recovery_back_secs);
        let key = if ctx.chance(0.5) { KEY_TURN_LEFT } else { KEY_TURN_RIGHT };
        let (lo, hi) = self.config.recovery_turn_secs;
        let secs = ctx.uniform(lo, hi);
        ctx.hold(key, secs);
        ctx.press(KEY_JUMP);
        self.history.clear();
    }

    /// A few random forward runs with turns, backing off now and then.
    pub fn random_navigation(&mut self, ctx: &mut Context) {
        for _ in 0..self.config.random_cycles {
            if !ctx.is_running() {
                return;
            }
            let (lo, hi) = self.config.random_forward_secs;
            let secs = ctx.uniform(lo, hi);
            ctx.hold(KEY_FORWARD, secs);

            let r = self.config.random_turn_secs;
            let turn = ctx.uniform(-r, r);
            let key = if turn < 0.0 { KEY_TURN_LEFT } else { KEY_TURN_RIGHT };
            ctx.hold(key, turn.abs());

            if ctx.chance(self.config.obstacle_chance) {
                debug!("backing off an obstacle");
                ctx.hold(KEY_BACK, self.config.obstacle_back_secs);
            }
        }
    }

    /// Short wander used between scans that found nothing.
    pub fn search_step(&mut self, ctx: &mut Context) {
        let (lo, hi) = self.config.search_forward_secs;
        let secs = ctx.uniform(lo, hi);
        ctx.hold(KEY_FORWARD, secs);
        if ctx.chance(self.config.search_turn_chance) {
            let key = if ctx.chance(0.5) { KEY_TURN_LEFT } else { KEY_TURN_RIGHT };
            let (lo, hi) = self.config.search_turn_secs;
            let secs = ctx.uniform(lo, hi);
            ctx.hold(key, secs);
        }
    }

    fn turn_towards(&mut self, ctx: &mut Context, fix: &Fix, target: Point) {
        let Some(heading) = fix.facing.or_else(|| self.history.heading()) else {
            return;
        };
        let delta = normalize_angle(fix.pos.bearing_to(&target) - heading);
        if delta.abs() < self.config.turn_deadband {
            return;
        }
        // Screen y grows downwards, so a positive delta is a right turn.
        let key = if delta > 0.0 { KEY_TURN_RIGHT } else { KEY_TURN_LEFT };
        let secs = (delta.abs() / self.config.turn_rate).min(self.config.max_turn_secs);
        ctx.hold(key, secs);
    }
}

/// Wrap into (-PI, PI].
fn normalize_angle(a: f64) -> f64 {
    let a = a.rem_euclid(TAU);
    if a > PI {
        a - TAU
    } else {
        a
    }
}
