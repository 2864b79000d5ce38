//! Per-player movement state machine and ice physics.
//!
//! [`Skater::tick`] is the controller's entire public contract: it advances one
//! skater by one tick, given the current intent and camera yaw, and returns the
//! handful of side-effect requests (puck release, stick-check, body-check) that the
//! tick loop forwards to the [`crate::puck::PossessionArbiter`], which has the
//! cross-skater context this controller deliberately does not hold.

use nalgebra::{Rotation3, Vector3};

use crate::config::GameplayConfig;
use crate::engine::{EngineAdapter, EntityHandle, Intent};
use crate::model::{PlayerId, SkaterPosition, Team, TickMs};

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum TurnSide {
    Left,
    Right,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum StickVisual {
    Idle,
    ControlledLeft,
    ControlledRight,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Animation {
    Idle,
    Walk,
    WalkBackwards,
    WalkStrafeLeft,
    WalkStrafeRight,
    Run,
    RunBackwards,
    RunStrafeLeft,
    RunStrafeRight,
    Sleep,
}

/// The mutually exclusive special-move states (I2), plus the default `Normal` state
/// and the `Stunned` status a body-check victim enters. Every special carries its own
/// `start_ts`; durations and cooldowns are always compared against tick `now`, never
/// modelled as tasks or callbacks.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum MovementState {
    Normal,
    HockeyStop { start_ts: TickMs, side: TurnSide },
    GoalieSlide { start_ts: TickMs, side: TurnSide },
    Spin { start_ts: TickMs, initial_dir: Vector3<f32> },
    Dash { start_ts: TickMs, dir: Vector3<f32> },
    BodyCheckLunge { start_ts: TickMs, dir: Vector3<f32>, hit: bool },
    Stunned { until_ts: TickMs },
}

impl MovementState {
    pub fn is_special(&self) -> bool {
        !matches!(self, MovementState::Normal)
    }

    pub fn label(&self) -> &'static str {
        match self {
            MovementState::Normal => "normal",
            MovementState::HockeyStop { .. } => "hockey_stop",
            MovementState::GoalieSlide { .. } => "goalie_slide",
            MovementState::Spin { .. } => "spin",
            MovementState::Dash { .. } => "dash",
            MovementState::BodyCheckLunge { .. } => "body_check_lunge",
            MovementState::Stunned { .. } => "stunned",
        }
    }
}

#[derive(Debug, Default, Clone)]
struct Cooldowns {
    hockey_stop_until: TickMs,
    goalie_slide_until: TickMs,
    spin_until: TickMs,
    body_check_until: TickMs,
    stick_check_until: TickMs,
}

/// Requests a skater's tick hands back to the caller for cross-skater resolution.
#[derive(Debug, Copy, Clone)]
pub enum SkaterEvent {
    PuckReleaseRequested { kind: ReleaseIntentKind, power: f32 },
    StickCheckAttempt,
    BodyCheckAttempt,
    /// The skater's engine entity is not spawned; the tick terminated early.
    CleanupRequested,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ReleaseIntentKind {
    Pass,
    Shot,
}

pub struct Skater {
    pub id: PlayerId,
    pub team: Team,
    pub position: SkaterPosition,
    pub entity: EntityHandle,

    pub velocity: Vector3<f32>,
    pub facing_yaw: f32,

    pub activity_ts: TickMs,
    pub preserve_yaw_until_ts: TickMs,

    pub movement: MovementState,
    last_move_dir: Vector3<f32>,
    speed_factor: f32,
    spin_boost_until_ts: TickMs,
    cooldowns: Cooldowns,

    pub holding_puck: bool,
    pub stick_visual: StickVisual,
    pub last_release_ts: Option<TickMs>,
    /// Set when a stick-check dislodges this skater; blocks this skater (and only
    /// this skater) from re-acquiring the puck until it elapses, independent of the
    /// voluntary-release cooldown tracked by `last_release_ts`.
    pub dislodged_until_ts: TickMs,
}

impl Skater {
    pub fn new(id: PlayerId, team: Team, position: SkaterPosition, entity: EntityHandle) -> Self {
        Skater {
            id,
            team,
            position,
            entity,
            velocity: Vector3::zeros(),
            facing_yaw: 0.0,
            activity_ts: 0,
            preserve_yaw_until_ts: 0,
            movement: MovementState::Normal,
            last_move_dir: Vector3::zeros(),
            speed_factor: 0.0,
            spin_boost_until_ts: 0,
            cooldowns: Cooldowns::default(),
            holding_puck: false,
            stick_visual: StickVisual::Idle,
            last_release_ts: None,
            dislodged_until_ts: 0,
        }
    }

    pub fn is_goalie(&self) -> bool {
        self.position.is_goalie()
    }

    /// Apply the given intent for one tick. `locked` mirrors I5 (movement lock during
    /// whistle phases): velocity is forced to zero and no intent affects position.
    pub fn tick(
        &mut self,
        engine: &mut impl EngineAdapter,
        intent: &Intent,
        now: TickMs,
        config: &GameplayConfig,
        locked: bool,
    ) -> Vec<SkaterEvent> {
        let mut events = Vec::new();

        if !engine.entity_is_spawned(self.entity) {
            events.push(SkaterEvent::CleanupRequested);
            return events;
        }

        if intent.forward()
            || intent.back()
            || intent.left()
            || intent.right()
            || intent.sprint()
            || intent.primary()
            || intent.secondary()
        {
            self.activity_ts = now;
        }

        // STUNNED > movement-lock > active special > new-special trigger > NORMAL.
        if let MovementState::Stunned { until_ts } = self.movement {
            if now >= until_ts {
                self.movement = MovementState::Normal;
            } else {
                engine.set_velocity(self.entity, Vector3::new(0.0, self.velocity.y, 0.0));
                self.velocity.x = 0.0;
                self.velocity.z = 0.0;
                return events;
            }
        }

        if locked {
            self.velocity.x = 0.0;
            self.velocity.z = 0.0;
            engine.set_velocity(self.entity, Vector3::new(0.0, self.velocity.y, 0.0));
            self.movement = MovementState::Normal;
            return events;
        }

        self.step_movement_state(engine, intent, now, config, &mut events);
        self.update_animation_inputs(intent);
        self.update_stick_visual(intent);

        engine.set_velocity(self.entity, self.velocity);
        if now >= self.preserve_yaw_until_ts {
            engine.set_rotation(self.entity, Rotation3::from_axis_angle(&Vector3::y_axis(), self.facing_yaw));
        }

        events
    }

    fn step_movement_state(
        &mut self,
        engine: &mut impl EngineAdapter,
        intent: &Intent,
        now: TickMs,
        config: &GameplayConfig,
        events: &mut Vec<SkaterEvent>,
    ) {
        match self.movement {
            MovementState::Normal => {
                self.apply_ice_physics(intent, now, config);
                if !self.is_goalie()
                    && intent.sprint()
                    && self.speed() > config.hockey_stop.min_speed
                    && now >= self.cooldowns.hockey_stop_until
                    && self.opposes_velocity(intent)
                {
                    let side = if intent.left() { TurnSide::Left } else { TurnSide::Right };
                    self.movement = MovementState::HockeyStop { start_ts: now, side };
                    self.cooldowns.hockey_stop_until = now as u64 + config.hockey_stop.cooldown_ms as u64;
                } else if self.is_goalie()
                    && intent.sprint()
                    && self.speed() > config.goalie_slide.min_speed
                    && now >= self.cooldowns.goalie_slide_until
                {
                    let side = if intent.left() { TurnSide::Left } else { TurnSide::Right };
                    self.movement = MovementState::GoalieSlide { start_ts: now, side };
                    self.cooldowns.goalie_slide_until = now as u64 + config.goalie_slide.cooldown_ms as u64;
                } else if self.holding_puck
                    && intent.rotate()
                    && intent.sprint()
                    && self.speed() >= config.spin.min_speed
                    && now >= self.cooldowns.spin_until
                {
                    self.movement = MovementState::Spin {
                        start_ts: now,
                        initial_dir: if self.velocity.norm_squared() > 1e-6 {
                            self.velocity.normalize()
                        } else {
                            Vector3::new(0.0, 0.0, -1.0)
                        },
                    };
                    self.cooldowns.spin_until = now as u64 + config.spin.cooldown_ms as u64;
                } else if self.position.is_defenceman()
                    && !self.holding_puck
                    && intent.secondary()
                    && now >= self.cooldowns.body_check_until
                {
                    let dir = intent.movement_direction();
                    let dir = if dir.norm_squared() > 1e-6 {
                        dir
                    } else {
                        Rotation3::from_axis_angle(&Vector3::y_axis(), self.facing_yaw) * Vector3::new(0.0, 0.0, -1.0)
                    };
                    self.movement = MovementState::BodyCheckLunge { start_ts: now, dir, hit: false };
                    self.cooldowns.body_check_until = now as u64 + config.body_check.cooldown_ms as u64;
                    events.push(SkaterEvent::BodyCheckAttempt);
                } else if !self.position.is_defenceman()
                    && !self.holding_puck
                    && intent.secondary()
                    && now >= self.cooldowns.stick_check_until
                {
                    self.cooldowns.stick_check_until = now as u64 + config.stick_check.cooldown_ms as u64;
                    events.push(SkaterEvent::StickCheckAttempt);
                }

                if self.holding_puck && intent.primary() {
                    let kind = if intent.sprint() {
                        ReleaseIntentKind::Shot
                    } else {
                        ReleaseIntentKind::Pass
                    };
                    events.push(SkaterEvent::PuckReleaseRequested { kind, power: 1.0 });
                }
            }
            MovementState::HockeyStop { start_ts, side } => {
                let elapsed = now.saturating_sub(start_ts);
                if elapsed >= config.hockey_stop.duration_ms as u64 {
                    self.movement = MovementState::Normal;
                } else {
                    let progress = elapsed as f32 / config.hockey_stop.duration_ms as f32;
                    self.velocity *= config.hockey_stop.deceleration;
                    let eased = 1.0 - (1.0 - progress).powi(2);
                    let max_angle = config.hockey_stop.max_angle_deg.to_radians();
                    let signed = match side {
                        TurnSide::Left => -max_angle,
                        TurnSide::Right => max_angle,
                    };
                    self.facing_yaw += signed * eased * 0.05;
                    if progress > 0.8 {
                        let lateral = match side {
                            TurnSide::Left => -1.0,
                            TurnSide::Right => 1.0,
                        };
                        self.velocity.x += lateral * 0.01;
                    }
                    if intent.forward() || intent.back() || intent.left() || intent.right() {
                        self.movement = MovementState::Dash { start_ts: now, dir: intent.movement_direction() };
                    }
                }
            }
            MovementState::GoalieSlide { start_ts, side } => {
                let elapsed = now.saturating_sub(start_ts);
                if elapsed >= config.goalie_slide.duration_ms as u64 {
                    self.movement = MovementState::Normal;
                } else {
                    let remaining = 1.0 - (elapsed as f32 / config.goalie_slide.duration_ms as f32);
                    self.velocity *= config.goalie_slide.deceleration;
                    let forward = Rotation3::from_axis_angle(&Vector3::y_axis(), self.facing_yaw) * Vector3::new(0.0, 0.0, -1.0);
                    self.velocity += forward * config.goalie_slide.dash_force * remaining * 0.001;
                    let max_angle = config.goalie_slide.max_angle_deg.to_radians();
                    let signed = match side {
                        TurnSide::Left => -max_angle,
                        TurnSide::Right => max_angle,
                    };
                    self.facing_yaw += signed * 0.05;
                }
            }
            MovementState::Spin { start_ts, initial_dir } => {
                let elapsed = now.saturating_sub(start_ts);
                if elapsed >= config.spin.duration_ms as u64 {
                    self.movement = MovementState::Normal;
                    self.velocity = initial_dir * config.spin.min_speed * config.spin.boost_multiplier;
                    self.spin_boost_until_ts = now + config.spin.boost_duration_ms as u64;
                } else {
                    let progress = elapsed as f32 / config.spin.duration_ms as f32;
                    self.facing_yaw += progress * 2.0 * std::f32::consts::PI * 0.02;
                    self.velocity = initial_dir * self.velocity.norm().max(config.spin.min_speed) * config.spin.momentum_preservation;
                }
            }
            MovementState::Dash { start_ts, dir } => {
                let elapsed = now.saturating_sub(start_ts);
                if elapsed >= config.dash.duration_ms as u64 {
                    self.movement = MovementState::Normal;
                } else {
                    let p = elapsed as f32 / config.dash.duration_ms as f32;
                    let scale = (config.dash.initial_boost * (1.0 - p) + 1.0) * (1.0 - p * p);
                    self.velocity = dir * config.dash.force * scale;
                }
            }
            MovementState::BodyCheckLunge { start_ts, dir, hit } => {
                let elapsed = now.saturating_sub(start_ts);
                if hit || elapsed >= config.body_check.duration_ms as u64 {
                    self.movement = MovementState::Normal;
                } else {
                    self.velocity = dir * config.body_check.dash_force;
                }
            }
            MovementState::Stunned { .. } => unreachable!("handled before step_movement_state"),
        }

        let _ = engine;
    }

    fn apply_ice_physics(&mut self, intent: &Intent, now: TickMs, config: &GameplayConfig) {
        let dir = intent.movement_direction();
        if dir.norm_squared() > 1e-9 {
            let boosted = if self.spin_boosted(now) { config.spin.boost_multiplier } else { 1.0 };
            if intent.sprint() {
                self.speed_factor = (self.speed_factor
                    + config.ice.sprint_acceleration_rate * (1.0 - self.speed_factor).powf(config.ice.acceleration_curve_power))
                .min(1.0);
            } else {
                self.speed_factor = (self.speed_factor - config.ice.sprint_deceleration_rate)
                    .max(config.ice.min_speed_factor);
            }
            let max_speed = config.ice.max_speed_multiplier * self.speed_factor * boosted * 10.0;
            let target = dir * max_speed;

            let dot = if self.last_move_dir.norm_squared() > 1e-9 {
                self.last_move_dir.dot(&dir).clamp(-1.0, 1.0)
            } else {
                1.0
            };
            let dot01 = (dot + 1.0) / 2.0;
            let penalty = (1.0 - (1.0 - dot01) * config.ice.direction_change_penalty).max(0.3);

            let accel = config.ice.acceleration * penalty;
            let y = self.velocity.y;
            self.velocity += (target - self.velocity) * accel;
            self.velocity.y = y;
            self.last_move_dir = dir;
        } else {
            self.speed_factor = (self.speed_factor - config.ice.sprint_deceleration_rate)
                .max(config.ice.min_speed_factor);
            let y = self.velocity.y;
            self.velocity *= config.ice.deceleration;
            self.velocity.y = y;
        }
    }

    fn spin_boosted(&self, now: TickMs) -> bool {
        now < self.spin_boost_until_ts
    }

    fn opposes_velocity(&self, intent: &Intent) -> bool {
        if self.velocity.norm_squared() < 1e-6 {
            return true;
        }
        let dir = intent.movement_direction();
        if dir.norm_squared() < 1e-9 {
            return true;
        }
        self.velocity.normalize().dot(&dir) < 0.7
    }

    pub fn speed(&self) -> f32 {
        Vector3::new(self.velocity.x, 0.0, self.velocity.z).norm()
    }

    fn update_animation_inputs(&mut self, _intent: &Intent) {
        // Animation is a pure function of state at query time; see `Skater::animation`.
    }

    fn update_stick_visual(&mut self, intent: &Intent) {
        self.stick_visual = if !self.holding_puck {
            StickVisual::Idle
        } else if intent.left() {
            StickVisual::ControlledLeft
        } else if intent.right() {
            StickVisual::ControlledRight
        } else {
            StickVisual::Idle
        };
    }

    /// Pure function of (grounded, state, velocity sign by axis, holding-puck).
    pub fn animation(&self, grounded: bool) -> Animation {
        if matches!(self.movement, MovementState::Stunned { .. }) {
            return Animation::Sleep;
        }
        if !grounded {
            return Animation::Idle;
        }
        let forward = Rotation3::from_axis_angle(&Vector3::y_axis(), self.facing_yaw) * Vector3::new(0.0, 0.0, -1.0);
        let lateral = Rotation3::from_axis_angle(&Vector3::y_axis(), self.facing_yaw) * Vector3::new(1.0, 0.0, 0.0);
        let fwd_component = self.velocity.dot(&forward);
        let lat_component = self.velocity.dot(&lateral);
        let running = self.speed_factor > 0.6;

        if self.speed() < 0.05 {
            return Animation::Idle;
        }
        if fwd_component.abs() >= lat_component.abs() {
            if fwd_component >= 0.0 {
                if running { Animation::Run } else { Animation::Walk }
            } else if running {
                Animation::RunBackwards
            } else {
                Animation::WalkBackwards
            }
        } else if lat_component >= 0.0 {
            if running { Animation::RunStrafeRight } else { Animation::WalkStrafeRight }
        } else if running {
            Animation::RunStrafeLeft
        } else {
            Animation::WalkStrafeLeft
        }
    }

    pub fn mark_body_check_hit(&mut self) {
        if let MovementState::BodyCheckLunge { start_ts, dir, .. } = self.movement {
            self.movement = MovementState::BodyCheckLunge { start_ts, dir, hit: true };
        }
    }

    pub fn stun(&mut self, now: TickMs, duration_ms: u32) {
        self.movement = MovementState::Stunned { until_ts: now + duration_ms as u64 };
    }

    /// A missed stick-check steal is punished less than a full cooldown: the
    /// arbiter calls this once it has determined the attempt fell short.
    pub fn halve_stick_check_cooldown(&mut self, now: TickMs, full_cooldown_ms: u32) {
        self.cooldowns.stick_check_until = now + (full_cooldown_ms / 2) as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct FakeEngine {
        spawned: HashMap<EntityHandle, bool>,
    }

    impl FakeEngine {
        fn new() -> Self {
            let mut spawned = HashMap::new();
            spawned.insert(EntityHandle(1), true);
            FakeEngine { spawned }
        }
    }

    impl EngineAdapter for FakeEngine {
        fn set_velocity(&mut self, _entity: EntityHandle, _v: Vector3<f32>) {}
        fn set_rotation(&mut self, _entity: EntityHandle, _rot: Rotation3<f32>) {}
        fn set_position(&mut self, _entity: EntityHandle, _pos: nalgebra::Point3<f32>) {}
        fn apply_impulse(&mut self, _entity: EntityHandle, _impulse: Vector3<f32>) {}
        fn apply_torque_impulse(&mut self, _entity: EntityHandle, _torque: Vector3<f32>) {}
        fn entity_is_spawned(&self, entity: EntityHandle) -> bool {
            *self.spawned.get(&entity).unwrap_or(&false)
        }
        fn get_linear_velocity(&self, _entity: EntityHandle) -> Vector3<f32> {
            Vector3::zeros()
        }
        fn get_position(&self, _entity: EntityHandle) -> nalgebra::Point3<f32> {
            nalgebra::Point3::origin()
        }
        fn ground_contacts(&self, _entity: EntityHandle) -> u32 {
            1
        }
        fn wall_contacts(&self, _entity: EntityHandle) -> u32 {
            0
        }
    }

    fn skater() -> Skater {
        Skater::new(PlayerId(0), Team::Red, SkaterPosition::Center, EntityHandle(1))
    }

    #[test]
    fn unspawned_entity_emits_cleanup_and_stops_early() {
        let mut skater = Skater::new(PlayerId(0), Team::Red, SkaterPosition::Center, EntityHandle(99));
        let mut engine = FakeEngine::new();
        let config = GameplayConfig::default();
        let events = skater.tick(&mut engine, &Intent::new(0.0), 0, &config, false);
        assert!(matches!(events[0], SkaterEvent::CleanupRequested));
    }

    #[test]
    fn movement_lock_zeroes_velocity_and_clears_special() {
        let mut skater = skater();
        skater.velocity = Vector3::new(1.0, 0.0, 1.0);
        skater.movement = MovementState::Dash { start_ts: 0, dir: Vector3::new(0.0, 0.0, -1.0) };
        let mut engine = FakeEngine::new();
        let config = GameplayConfig::default();
        skater.tick(&mut engine, &Intent::new(0.0), 10, &config, true);
        assert_eq!(skater.velocity.x, 0.0);
        assert_eq!(skater.velocity.z, 0.0);
        assert_eq!(skater.movement, MovementState::Normal);
    }

    #[test]
    fn stunned_skater_ignores_input_until_expiry() {
        let mut skater = skater();
        skater.movement = MovementState::Stunned { until_ts: 100 };
        let mut engine = FakeEngine::new();
        let config = GameplayConfig::default();
        let mut intent = Intent::new(0.0);
        intent.set_forward(true);
        skater.tick(&mut engine, &intent, 50, &config, false);
        assert!(matches!(skater.movement, MovementState::Stunned { .. }));
        skater.tick(&mut engine, &intent, 150, &config, false);
        assert_eq!(skater.movement, MovementState::Normal);
    }

    #[test]
    fn only_goalie_can_slide_only_non_goalie_can_hockey_stop() {
        let mut goalie = Skater::new(PlayerId(1), Team::Red, SkaterPosition::Goalie, EntityHandle(1));
        let mut skater = skater();
        goalie.velocity = Vector3::new(0.0, 0.0, -10.0);
        skater.velocity = Vector3::new(0.0, 0.0, -10.0);
        let mut engine = FakeEngine::new();
        let config = GameplayConfig::default();
        let mut intent = Intent::new(0.0);
        intent.set_sprint(true);
        intent.set_back(true);

        goalie.tick(&mut engine, &intent, 0, &config, false);
        assert!(matches!(goalie.movement, MovementState::GoalieSlide { .. }));

        skater.tick(&mut engine, &intent, 0, &config, false);
        assert!(!matches!(skater.movement, MovementState::GoalieSlide { .. }));
    }

    #[test]
    fn special_move_exclusivity_holds_through_a_full_lifecycle() {
        let mut skater = skater();
        skater.velocity = Vector3::new(0.0, 0.0, -10.0);
        let mut engine = FakeEngine::new();
        let config = GameplayConfig::default();
        let mut intent = Intent::new(0.0);
        intent.set_sprint(true);
        intent.set_back(true);
        skater.tick(&mut engine, &intent, 0, &config, false);
        assert!(matches!(skater.movement, MovementState::HockeyStop { .. }));
        let only_one = match skater.movement {
            MovementState::Normal => 0,
            MovementState::HockeyStop { .. } => 1,
            MovementState::GoalieSlide { .. } => 1,
            MovementState::Spin { .. } => 1,
            MovementState::Dash { .. } => 1,
            MovementState::BodyCheckLunge { .. } => 1,
            MovementState::Stunned { .. } => 1,
        };
        assert_eq!(only_one, 1);
    }

    #[test]
    fn body_check_only_from_defencemen_without_the_puck() {
        let mut def = Skater::new(PlayerId(2), Team::Red, SkaterPosition::Def1, EntityHandle(1));
        let mut center = skater();
        let mut engine = FakeEngine::new();
        let config = GameplayConfig::default();
        let mut intent = Intent::new(0.0);
        intent.set_secondary(true);

        let events = def.tick(&mut engine, &intent, 0, &config, false);
        assert!(matches!(def.movement, MovementState::BodyCheckLunge { .. }));
        assert!(events.iter().any(|e| matches!(e, SkaterEvent::BodyCheckAttempt)));

        let events = center.tick(&mut engine, &intent, 0, &config, false);
        assert!(!matches!(center.movement, MovementState::BodyCheckLunge { .. }));
        assert!(events.iter().any(|e| matches!(e, SkaterEvent::StickCheckAttempt)));
    }
}
