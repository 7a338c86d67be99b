//! Combat state machine.
//!
//! `Idle -> Engaging -> Fighting <-> Retreating -> Resolved(Kill | Timeout)`.
//! The controller's state is the only record of whether the character is in
//! combat; the orchestrator asks `is_active()` instead of tracking it.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::context::{Context, KEY_BACK, KEY_JUMP, KEY_STRAFE_LEFT, KEY_STRAFE_RIGHT};
use crate::cooldown::AbilityCooldownTracker;
use crate::detector::Detector;
use crate::profile::{AbilityDescriptor, Loadout};
use crate::types::{DetectionResult, MouseButton};

#[derive(Debug, Clone)]
pub struct CombatConfig {
    /// Hard bound on one fight, measured from engagement.
    pub timeout: Duration,
    /// Cursor jitter in pixels when selecting the target.
    pub target_jitter: i32,
    pub aim_secs: f64,
    pub select_pause_secs: f64,
    /// Minimum gap between re-issues of the ranged ability, independent of
    /// its cooldown.
    pub ranged_reissue: Duration,
    pub back_chance: f64,
    pub back_secs: (f64, f64),
    pub strafe_chance: f64,
    pub strafe_secs: (f64, f64),
    pub retreat_back_secs: f64,
    pub retreat_jump_secs: f64,
}

impl Default for CombatConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            target_jitter: 5,
            aim_secs: 0.3,
            select_pause_secs: 0.5,
            ranged_reissue: Duration::from_millis(500),
            back_chance: 0.3,
            back_secs: (0.2, 0.5),
            strafe_chance: 0.3,
            strafe_secs: (0.2, 0.4),
            retreat_back_secs: 0.5,
            retreat_jump_secs: 0.8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Kill,
    Timeout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CombatState {
    #[default]
    Idle,
    Engaging,
    Fighting,
    Retreating,
    Resolved(Outcome),
}

impl CombatState {
    pub fn label(&self) -> &'static str {
        match self {
            CombatState::Idle => "idle",
            CombatState::Engaging => "engaging",
            CombatState::Fighting => "fighting",
            CombatState::Retreating => "retreating",
            CombatState::Resolved(Outcome::Kill) => "kill",
            CombatState::Resolved(Outcome::Timeout) => "timeout",
        }
    }
}

/// One fight against one target.
#[derive(Debug, Clone)]
pub struct CombatSession {
    pub target: DetectionResult,
    pub started_at: Instant,
    pub ability_history: Vec<(String, Instant)>,
}

pub struct CombatController {
    config: CombatConfig,
    loadout: Loadout,
    cooldowns: AbilityCooldownTracker,
    state: CombatState,
    session: Option<CombatSession>,
}

impl CombatController {
    pub fn new(loadout: Loadout, config: CombatConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            loadout,
            cooldowns: AbilityCooldownTracker::new(clock),
            state: CombatState::Idle,
            session: None,
        }
    }

    pub fn state(&self) -> CombatState {
        self.state
    }

    pub fn session(&self) -> Option<&CombatSession> {
        self.session.as_ref()
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, CombatState::Engaging | CombatState::Fighting | CombatState::Retreating)
    }

    /// Select `target` and open the fight. Returns false, doing nothing,
    /// while another fight is still active.
    pub fn start_combat(&mut self, ctx: &mut Context, target: &DetectionResult) -> bool {
        if self.is_active() {
            warn!("already fighting, ignoring {}", target.entity_name);
            return false;
        }
        info!("engaging {} ({:.2})", target.entity_name, target.confidence);
        self.session = Some(CombatSession {
            target: target.clone(),
            started_at: ctx.now(),
            ability_history: Vec::new(),
        });
        self.state = CombatState::Engaging;

        let jitter = self.config.target_jitter;
        let center = target.center();
        let aim = center.offset(ctx.offset(jitter), ctx.offset(jitter));
        ctx.click_at(aim, MouseButton::Right, self.config.aim_secs);
        ctx.pause(self.config.select_pause_secs);

        self.maintain_distance(ctx);
        let ranged = self.loadout.ranged.clone();
        self.cast(ctx, &ranged);
        self.state = CombatState::Fighting;
        true
    }

    /// Advance the fight by one decision. Does nothing outside a fight.
    pub fn tick(&mut self, ctx: &mut Context, detector: &mut dyn Detector) -> CombatState {
        let Some(started_at) = self.session.as_ref().map(|s| s.started_at) else {
            return self.state;
        };
        if !self.is_active() {
            return self.state;
        }

        let elapsed = ctx.now().saturating_duration_since(started_at);
        if elapsed >= self.config.timeout {
            warn!("combat timeout after {:.1}s, forcing exit", elapsed.as_secs_f64());
            self.resolve(ctx, Outcome::Timeout);
            return self.state;
        }

        if self.state == CombatState::Retreating {
            self.state = CombatState::Fighting;
        }

        let frame = ctx.frame();
        let frame = frame.as_deref();

        if detector.target_dead(frame) {
            info!("target down after {:.1}s", elapsed.as_secs_f64());
            self.resolve(ctx, Outcome::Kill);
            return self.state;
        }

        if detector.health_low(frame) {
            info!("health low, retreating");
            self.state = CombatState::Retreating;
            self.retreat(ctx);
            return self.state;
        }

        let melee = match self.loadout.melee.clone() {
            Some(m) if detector.in_melee_range(frame) && self.cooldowns.can_use(&m.name, m.cooldown()) => Some(m),
            _ => None,
        };
        match melee {
            Some(m) => self.cast(ctx, &m),
            None => {
                let ranged = self.loadout.ranged.clone();
                let guard = ranged.cooldown().max(self.config.ranged_reissue);
                if self.cooldowns.can_use(&ranged.name, guard) {
                    self.cast(ctx, &ranged);
                }
            }
        }

        self.maintain_distance(ctx);
        self.state
    }

    /// Drop any fight and release movement keys. Safe to call repeatedly.
    pub fn reset(&mut self, ctx: &mut Context) {
        if self.session.take().is_some() {
            info!("combat reset");
        }
        ctx.release_movement_keys();
        self.state = CombatState::Idle;
    }

    fn resolve(&mut self, ctx: &mut Context, outcome: Outcome) {
        ctx.release_movement_keys();
        self.session = None;
        self.state = CombatState::Resolved(outcome);
    }

    fn cast(&mut self, ctx: &mut Context, ability: &AbilityDescriptor) {
        debug!("using {}", ability.name);
        ctx.press(&ability.key);
        self.cooldowns.record_use(&ability.name);
        if let Some(session) = self.session.as_mut() {
            session.ability_history.push((ability.name.clone(), ctx.now()));
        }
    }

    /// Occasionally step back, and sometimes strafe after stepping back.
    fn maintain_distance(&mut self, ctx: &mut Context) {
        if !ctx.chance(self.config.back_chance) {
            return;
        }
        let (lo, hi) = self.config.back_secs;
        let secs = ctx.uniform(lo, hi);
        ctx.hold(KEY_BACK, secs);

        if ctx.chance(self.config.strafe_chance) {
            let key = if ctx.chance(0.5) { KEY_STRAFE_LEFT } else { KEY_STRAFE_RIGHT };
            let (lo, hi) = self.config.strafe_secs;
            let secs = ctx.uniform(lo, hi);
            ctx.hold(key, secs);
        }
    }

    /// Back off with a jump in the middle.
    fn retreat(&mut self, ctx: &mut Context) {
        ctx.hold_with(KEY_BACK, |ctx| {
            ctx.pause(self.config.retreat_back_secs);
            ctx.press(KEY_JUMP);
            ctx.pause(self.config.retreat_jump_secs);
        });
    }
}
