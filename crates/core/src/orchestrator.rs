//! The grinding loop: detect, approach, fight, loot, rescan. Owns the
//! controllers and is the only thing that coordinates them.

use std::fmt;
use std::sync::atomic::AtomicBool;
use std::sync::{mpsc, Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use tracing::{info, warn};

use crate::combat::{CombatConfig, CombatController, CombatState, Outcome};
use crate::context::Context;
use crate::detector::Detector;
use crate::matcher::TemplateMatcher;
use crate::navigation::{NavConfig, NavigationController};
use crate::position::PositionEstimator;
use crate::profile::{Profile, Thresholds};
use crate::template::TemplateLibrary;
use crate::types::{Command, DetectionResult, Frame, MouseButton, Point, SessionState};

/// Loot-all on the open loot window.
pub const KEY_LOOT: &str = "space";

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub cadence_secs: f64,
    pub no_frame_wait_secs: f64,
    pub miss_pause_secs: f64,
    pub rest_secs: f64,
    pub death_wait_secs: f64,
    pub start_delay_secs: f64,
    pub aim_secs: f64,
    pub approach_settle_secs: f64,
    pub approach_select_secs: f64,
    pub loot_wait_secs: f64,
    pub loot_open_secs: f64,
    /// Max offset (x, y) from the corpse when no loot icon is visible.
    pub loot_jitter: (i32, i32),
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            cadence_secs: 0.5,
            no_frame_wait_secs: 1.0,
            miss_pause_secs: 1.0,
            rest_secs: 5.0,
            death_wait_secs: 5.0,
            start_delay_secs: 5.0,
            aim_secs: 0.3,
            approach_settle_secs: 0.1,
            approach_select_secs: 0.5,
            loot_wait_secs: 1.0,
            loot_open_secs: 0.5,
            loot_jitter: (10, 5),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SessionStats {
    pub kills: u32,
    pub deaths: u32,
    pub loot_collected: u32,
    pub started_at: Instant,
}

impl SessionStats {
    fn new(started_at: Instant) -> Self {
        Self { kills: 0, deaths: 0, loot_collected: 0, started_at }
    }

    fn report(&self, now: Instant) -> SessionReport {
        SessionReport {
            duration: now.saturating_duration_since(self.started_at),
            kills: self.kills,
            deaths: self.deaths,
            loot_collected: self.loot_collected,
        }
    }
}

/// End-of-session summary.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionReport {
    pub duration: Duration,
    pub kills: u32,
    pub deaths: u32,
    pub loot_collected: u32,
}

impl SessionReport {
    /// Zero for a session that lasted no time at all.
    pub fn kills_per_minute(&self) -> f64 {
        let minutes = self.duration.as_secs_f64() / 60.0;
        if minutes <= 0.0 {
            return 0.0;
        }
        self.kills as f64 / minutes
    }
}

impl fmt::Display for SessionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self.duration.as_secs();
        writeln!(f, "===== Grinding Session Stats =====")?;
        writeln!(f, "Session duration: {}m {}s", secs / 60, secs % 60)?;
        writeln!(f, "Total kills: {}", self.kills)?;
        writeln!(f, "Total loot collected: {}", self.loot_collected)?;
        writeln!(f, "Deaths: {}", self.deaths)?;
        writeln!(f, "Kills per minute: {:.2}", self.kills_per_minute())?;
        write!(f, "==================================")
    }
}

/// What one call to `step` did.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Stopped,
    NoFrame,
    Dead,
    Rested,
    Fought(CombatState),
    Engaged(String),
    Searched,
}

pub struct GrindingOrchestrator {
    ctx: Context,
    config: OrchestratorConfig,
    profile: String,
    zone: String,
    matcher: TemplateMatcher,
    templates: TemplateLibrary,
    thresholds: Thresholds,
    detector: Box<dyn Detector>,
    estimator: Box<dyn PositionEstimator>,
    combat: CombatController,
    nav: NavigationController,
    stats: Option<SessionStats>,
    started: Option<DateTime<Local>>,
    last_report: Option<SessionReport>,
    last_target: Option<DetectionResult>,
    dead: bool,
    needs_travel: bool,
    vendor_after_kills: u32,
}

impl GrindingOrchestrator {
    /// Enemy templates are restricted to, and ordered by, the profile's
    /// target list.
    pub fn new(
        ctx: Context,
        profile: &Profile,
        mut templates: TemplateLibrary,
        detector: Box<dyn Detector>,
        estimator: Box<dyn PositionEstimator>,
    ) -> Self {
        templates.restrict_enemies(&profile.targets);
        let combat = CombatController::new(profile.loadout.clone(), CombatConfig::default(), ctx.clock());
        let nav = NavigationController::new(NavConfig::default(), profile.routes.clone(), profile.vendor_route.clone());
        Self {
            ctx,
            config: OrchestratorConfig::default(),
            profile: profile.name.clone(),
            zone: profile.zone.clone(),
            matcher: TemplateMatcher::with_stride(profile.thresholds.stride),
            templates,
            thresholds: profile.thresholds,
            detector,
            estimator,
            combat,
            nav,
            stats: None,
            started: None,
            last_report: None,
            last_target: None,
            dead: false,
            needs_travel: false,
            vendor_after_kills: profile.vendor_after_kills,
        }
    }

    pub fn with_matcher(mut self, matcher: TemplateMatcher) -> Self {
        self.matcher = matcher;
        self
    }

    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn run_flag(&self) -> Arc<AtomicBool> {
        self.ctx.run_flag()
    }

    pub fn is_session_active(&self) -> bool {
        self.stats.is_some()
    }

    pub fn stats(&self) -> Option<&SessionStats> {
        self.stats.as_ref()
    }

    pub fn last_report(&self) -> Option<&SessionReport> {
        self.last_report.as_ref()
    }

    pub fn combat(&self) -> &CombatController {
        &self.combat
    }

    pub fn context(&mut self) -> &mut Context {
        &mut self.ctx
    }

    /// Begin counting and arm the run flag. The first step travels to the
    /// grinding area. Returns false if a session is already running.
    pub fn start_session(&mut self) -> bool {
        if self.stats.is_some() {
            warn!("session already running");
            return false;
        }
        info!("starting grinding session in {}", self.zone);
        self.ctx.set_running(true);
        self.ctx.activate();
        self.ctx.pause(self.config.start_delay_secs);
        self.stats = Some(SessionStats::new(self.ctx.now()));
        self.started = Some(Local::now());
        self.dead = false;
        self.needs_travel = true;
        true
    }

    /// End the session: clear the run flag, drop any fight, release keys.
    /// Only the first call after a start produces a report.
    pub fn stop_session(&mut self) -> Option<SessionReport> {
        let stats = self.stats.take()?;
        self.ctx.set_running(false);
        self.combat.reset(&mut self.ctx);
        self.ctx.release_movement_keys();
        let report = stats.report(self.ctx.now());
        for line in report.to_string().lines() {
            info!("{}", line);
        }
        self.last_report = Some(report.clone());
        Some(report)
    }

    /// Step until the run flag is cleared, then close the session.
    pub fn run_session(&mut self) -> Option<SessionReport> {
        if self.stats.is_none() && !self.start_session() {
            return None;
        }
        while self.ctx.is_running() {
            self.step();
        }
        self.stop_session()
    }

    /// Fight whatever is at `at` (screen coordinates), as if it had just
    /// been detected there.
    pub fn engage(&mut self, at: Point) -> bool {
        let target = DetectionResult {
            entity_name: "manual target".to_string(),
            location: at,
            size: (0, 0),
            confidence: 1.0,
        };
        let started = self.combat.start_combat(&mut self.ctx, &target);
        if started {
            self.last_target = Some(target);
        }
        started
    }

    /// Latest frame, or `None` after waiting a moment for one.
    fn wait_for_frame(&self) -> Option<Arc<Frame>> {
        let frame = self.ctx.frame();
        if frame.is_none() {
            info!("no frame available, waiting");
            self.ctx.pause(self.config.no_frame_wait_secs);
        }
        frame
    }

    /// One decision-loop iteration.
    pub fn step(&mut self) -> Step {
        if !self.ctx.is_running() {
            return Step::Stopped;
        }

        let Some(mut frame) = self.wait_for_frame() else {
            return Step::NoFrame;
        };

        // Travel only once the screen can be seen
        if self.needs_travel {
            self.needs_travel = false;
            self.nav.navigate_to_grinding_area(&mut self.ctx, self.estimator.as_mut(), &self.zone);
            match self.wait_for_frame() {
                Some(fresh) => frame = fresh,
                None => return Step::NoFrame,
            }
        }

        if self.detector.player_dead(Some(&*frame)) {
            if !self.dead {
                self.dead = true;
                if let Some(stats) = self.stats.as_mut() {
                    stats.deaths += 1;
                }
                warn!("character died");
                self.combat.reset(&mut self.ctx);
            }
            self.ctx.pause(self.config.death_wait_secs);
            return Step::Dead;
        }
        self.dead = false;

        if !self.combat.is_active() && self.detector.needs_rest(Some(&*frame)) {
            info!("resting");
            self.ctx.pause(self.config.rest_secs);
            return Step::Rested;
        }

        let step = if self.combat.is_active() {
            let state = self.combat.tick(&mut self.ctx, self.detector.as_mut());
            match state {
                CombatState::Resolved(Outcome::Kill) => {
                    let kills = self.stats.as_mut().map_or(0, |s| {
                        s.kills += 1;
                        s.kills
                    });
                    info!("combat ended, total kills: {}", kills);
                    self.loot();
                    if self.vendor_after_kills > 0 && kills % self.vendor_after_kills == 0 {
                        self.return_to_vendor();
                    }
                }
                CombatState::Resolved(Outcome::Timeout) => info!("fight abandoned, rescanning"),
                _ => {}
            }
            Step::Fought(state)
        } else {
            match self.find_target(&frame) {
                Some(target) => {
                    self.approach(&target);
                    self.combat.start_combat(&mut self.ctx, &target);
                    let name = target.entity_name.clone();
                    self.last_target = Some(target);
                    Step::Engaged(name)
                }
                None => {
                    self.nav.search_step(&mut self.ctx);
                    self.ctx.pause(self.config.miss_pause_secs);
                    return Step::Searched;
                }
            }
        };

        self.ctx.pause_jitter(self.config.cadence_secs);
        step
    }

    /// Travel to the vendor route, or wander when the profile has none.
    /// The next step heads back to the grinding area.
    pub fn return_to_vendor(&mut self) {
        self.nav.return_to_vendor(&mut self.ctx, self.estimator.as_mut());
        self.needs_travel = true;
    }

    /// Best enemy on screen, in screen coordinates.
    fn find_target(&self, frame: &Frame) -> Option<DetectionResult> {
        if self.templates.enemies.is_empty() {
            return None;
        }
        let hit = self.matcher.find_best_in(
            frame,
            &self.templates.enemies,
            self.thresholds.enemy_floor,
            self.thresholds.search_region.as_ref(),
        )?;
        info!("target found: {} at ({}, {}) confidence {:.2}", hit.entity_name, hit.location.x, hit.location.y, hit.confidence);
        Some(to_screen(frame, hit))
    }

    fn approach(&mut self, target: &DetectionResult) {
        self.ctx.move_cursor(target.center(), self.config.aim_secs);
        self.ctx.pause(self.config.approach_settle_secs);
        self.ctx.click(MouseButton::Right);
        self.ctx.pause(self.config.approach_select_secs);
    }

    /// Loot the icon if one is visible, else try where the corpse fell.
    /// Only a visible icon counts as collected.
    fn loot(&mut self) -> bool {
        self.ctx.pause(self.config.loot_wait_secs);

        let icon = self.ctx.frame().and_then(|frame| {
            self.matcher
                .find_best(&frame, &self.templates.loot, self.thresholds.loot_floor)
                .map(|hit| to_screen(&frame, hit))
        });
        if let Some(icon) = icon {
            self.ctx.click_at(icon.center(), MouseButton::Right, self.config.aim_secs);
            self.ctx.pause(self.config.loot_open_secs);
            self.ctx.press(KEY_LOOT);
            if let Some(stats) = self.stats.as_mut() {
                stats.loot_collected += 1;
                info!("loot collected, total: {}", stats.loot_collected);
            }
            return true;
        }

        if let Some(target) = self.last_target.clone() {
            let (jx, jy) = self.config.loot_jitter;
            let dx = self.ctx.offset(jx);
            let dy = self.ctx.offset(jy);
            self.ctx.click_at(target.location.offset(dx, dy), MouseButton::Right, self.config.aim_secs);
            self.ctx.pause(self.config.loot_open_secs);
            self.ctx.press(KEY_LOOT);
        }
        false
    }

    pub fn status(&self) -> SessionStatus {
        let stats = self.stats.as_ref();
        SessionStatus {
            state: if stats.is_some() { SessionState::Running } else { SessionState::Stopped },
            profile: self.profile.clone(),
            zone: self.zone.clone(),
            combat: self.combat.state().label().to_string(),
            kills: stats.map_or(0, |s| s.kills),
            deaths: stats.map_or(0, |s| s.deaths),
            loot_collected: stats.map_or(0, |s| s.loot_collected),
            started: stats.and(self.started),
            last_report: self.last_report.clone(),
        }
    }
}

fn to_screen(frame: &Frame, hit: DetectionResult) -> DetectionResult {
    let location = frame.to_screen(hit.location);
    let far = frame.to_screen(hit.location.offset(hit.size.0 as f64, hit.size.1 as f64));
    DetectionResult {
        size: ((far.x - location.x).round() as u32, (far.y - location.y).round() as u32),
        location,
        ..hit
    }
}

/// What the TUI shows.
#[derive(Debug, Clone, Default)]
pub struct SessionStatus {
    pub state: SessionState,
    pub profile: String,
    pub zone: String,
    pub combat: String,
    pub kills: u32,
    pub deaths: u32,
    pub loot_collected: u32,
    pub started: Option<DateTime<Local>>,
    pub last_report: Option<SessionReport>,
}

fn handle(cmd: Command, orchestrator: &mut GrindingOrchestrator) -> bool {
    match cmd {
        Command::Quit => {
            info!("shutting down");
            orchestrator.stop_session();
            return false;
        }
        Command::StartSession => {
            orchestrator.start_session();
        }
        Command::StopSession => {
            orchestrator.stop_session();
        }
        Command::Engage(at) => {
            if orchestrator.is_session_active() {
                orchestrator.engage(at);
            } else {
                warn!("no session running, ignoring engage");
            }
        }
    }
    true
}

/// Drain pending commands. Returns false on Quit or when the sender is gone.
fn process_commands(cmd_rx: &mpsc::Receiver<Command>, orchestrator: &mut GrindingOrchestrator) -> bool {
    loop {
        match cmd_rx.try_recv() {
            Ok(cmd) => {
                if !handle(cmd, orchestrator) {
                    return false;
                }
            }
            Err(mpsc::TryRecvError::Empty) => return true,
            Err(mpsc::TryRecvError::Disconnected) => {
                orchestrator.stop_session();
                return false;
            }
        }
    }
}

/// Main decision loop. Runs on a background thread until `Command::Quit`
/// or the command channel closes.
pub fn orchestrate(
    status: Arc<Mutex<SessionStatus>>,
    mut orchestrator: GrindingOrchestrator,
    cmd_rx: mpsc::Receiver<Command>,
) {
    loop {
        if !process_commands(&cmd_rx, &mut orchestrator) {
            *status.lock().unwrap() = orchestrator.status();
            return;
        }

        if orchestrator.is_session_active() {
            if orchestrator.context().is_running() {
                orchestrator.step();
            } else {
                // Run flag cleared from outside (hotkey or TUI)
                orchestrator.stop_session();
            }
            *status.lock().unwrap() = orchestrator.status();
            continue;
        }

        *status.lock().unwrap() = orchestrator.status();
        match cmd_rx.recv_timeout(Duration::from_millis(100)) {
            Ok(cmd) => {
                if !handle(cmd, &mut orchestrator) {
                    *status.lock().unwrap() = orchestrator.status();
                    return;
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => return,
        }
    }
}
