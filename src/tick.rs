//! The fixed-rate scheduler that drives everything else: intents in, a tick of
//! simulation, events out. Owns no networking or rendering; those live entirely
//! behind [`EngineAdapter`].

use std::collections::HashMap;
use std::time::Duration;

use tracing::{debug, debug_span, warn};

use crate::config::GameplayConfig;
use crate::engine::{EngineAdapter, Intent};
use crate::error::SimError;
use crate::events::{AudioTrigger, EventBatch, UiEvent};
use crate::match_flow::Match;
use crate::model::{PlayerId, TickMs};
use crate::puck::{Puck, ReleaseKind};
use crate::rink::Rink;
use crate::skater::{ReleaseIntentKind, Skater, SkaterEvent};

/// Tick period for the skater/puck simulation loop. Goal and boundary sampling piggy
/// back on the same tick; there is no separate 20 Hz pass since 50 Hz comfortably
/// covers it.
pub const TICK_INTERVAL: Duration = Duration::from_millis(20);

/// Top-level simulation state: rink, roster, puck, match flow and gameplay config.
/// One per running match.
pub struct SimCore {
    pub rink: Rink,
    pub config: GameplayConfig,
    pub skaters: Vec<Skater>,
    pub puck: Puck,
    pub game: Match,
    now: TickMs,
}

impl SimCore {
    pub fn new(rink: Rink, config: GameplayConfig, skaters: Vec<Skater>, puck: Puck, game: Match) -> Self {
        SimCore { rink, config, skaters, puck, game, now: 0 }
    }

    pub fn now(&self) -> TickMs {
        self.now
    }

    /// Advance the whole simulation by one tick. `intents` maps player id to their
    /// latest input; a skater with no entry this tick is treated as all-neutral.
    pub fn tick(
        &mut self,
        dt_ms: u64,
        intents: &HashMap<PlayerId, Intent>,
        engine: &mut impl EngineAdapter,
        events: &mut EventBatch,
    ) {
        events.clear();
        self.now += dt_ms;
        let now = self.now;

        let _span = debug_span!("tick", now).entered();

        {
            let _span = debug_span!("match_flow").entered();
            self.game.tick(
                now,
                dt_ms,
                &self.rink,
                &mut self.puck,
                &mut self.skaters,
                engine,
                events,
            );
        }

        let locked = self.game.is_locked();

        if let Some(pending) = self.puck.take_pending_impulse() {
            engine.apply_impulse(pending.entity, pending.linear);
            engine.apply_torque_impulse(pending.entity, pending.torque);
        }

        {
            let _span = debug_span!("skaters").entered();
            let neutral = Intent::new(0.0);
            for idx in 0..self.skaters.len() {
                let player_id = self.skaters[idx].id;
                let intent = intents.get(&player_id).copied().unwrap_or(neutral);
                let skater_events = self.skaters[idx].tick(engine, &intent, now, &self.config, locked);
                for skater_event in skater_events {
                    self.handle_skater_event(player_id, skater_event, now, intents, engine, events);
                }
                if !self.skaters[idx].velocity.iter().all(|c| c.is_finite()) {
                    let err = SimError::PhysicsAnomaly(format!("non-finite velocity for player {player_id}"));
                    warn!("{err}");
                    self.skaters[idx].velocity = nalgebra::Vector3::zeros();
                }
            }
        }

        {
            let _span = debug_span!("possession").entered();
            self.advance_possession(now, intents, engine, events);
        }

        debug!(scoreboard_red = self.game.red_score, scoreboard_blue = self.game.blue_score, "tick complete");
    }

    fn handle_skater_event(
        &mut self,
        player_id: PlayerId,
        event: SkaterEvent,
        now: TickMs,
        intents: &HashMap<PlayerId, Intent>,
        engine: &mut impl EngineAdapter,
        events: &mut EventBatch,
    ) {
        match event {
            SkaterEvent::CleanupRequested => {
                let err = SimError::EntityNotSpawned(player_id);
                warn!(%err, "recovered within tick");
            }
            SkaterEvent::PuckReleaseRequested { kind, power } => {
                let Some(skater) = self.skaters.iter_mut().find(|s| s.id == player_id) else { return };
                let yaw = intents.get(&player_id).map(|i| i.camera_yaw).unwrap_or(skater.facing_yaw);
                let release_kind = match kind {
                    ReleaseIntentKind::Pass => ReleaseKind::Pass,
                    ReleaseIntentKind::Shot => ReleaseKind::Shot,
                };
                self.puck.release(skater, release_kind, now, yaw, power, &self.config);
                events.push_ui(UiEvent::PuckControl(false));
                events.push_audio(match release_kind {
                    ReleaseKind::Shot => AudioTrigger::WristShot,
                    _ => AudioTrigger::PassPuck,
                });
            }
            SkaterEvent::StickCheckAttempt => {
                let defender_pos = self
                    .skaters
                    .iter()
                    .find(|s| s.id == player_id)
                    .map(|s| engine.get_position(s.entity));
                let Some(defender_pos) = defender_pos else { return };
                let defender_yaw = self.skaters.iter().find(|s| s.id == player_id).map(|s| s.facing_yaw).unwrap_or(0.0);
                let defender_team = self.skaters.iter().find(|s| s.id == player_id).map(|s| s.team);
                let Some(defender_team) = defender_team else { return };

                if let Some(holder_id) = self.puck.controller_id {
                    if let Some(idx) = self.skaters.iter().position(|s| s.id == holder_id) {
                        let (before, after) = self.skaters.split_at_mut(idx);
                        let (holder, _) = after.split_first_mut().expect("index in bounds");
                        let _ = before;
                        let outcome = self.puck.try_steal(player_id, defender_team, defender_pos, defender_yaw, holder, now, &self.config);
                        match outcome {
                            crate::puck::StealOutcome::Stole(_) => events.push_audio(AudioTrigger::StickCheck),
                            crate::puck::StealOutcome::Missed => {
                                events.push_audio(AudioTrigger::StickCheckMiss);
                                if let Some(defender) = self.skaters.iter_mut().find(|s| s.id == player_id) {
                                    defender.halve_stick_check_cooldown(now, self.config.stick_check.cooldown_ms);
                                }
                            }
                        }
                    }
                } else {
                    events.push_audio(AudioTrigger::SwingStick);
                }
            }
            SkaterEvent::BodyCheckAttempt => {
                let Some(attacker_idx) = self.skaters.iter().position(|s| s.id == player_id) else { return };
                let attacker_pos = engine.get_position(self.skaters[attacker_idx].entity);
                let target_positions: Vec<_> = self
                    .skaters
                    .iter()
                    .enumerate()
                    .filter(|(idx, _)| *idx != attacker_idx)
                    .map(|(idx, s)| (idx, engine.get_position(s.entity)))
                    .collect();

                let (before, after) = self.skaters.split_at_mut(attacker_idx);
                let (attacker, after) = after.split_first_mut().expect("index in bounds");
                let pos_by_idx: HashMap<usize, nalgebra::Point3<f32>> = target_positions.into_iter().collect();
                let mut targets: Vec<(&mut Skater, nalgebra::Point3<f32>)> = Vec::new();
                for (idx, skater) in before.iter_mut().enumerate() {
                    let pos = pos_by_idx[&idx];
                    targets.push((skater, pos));
                }
                for (offset, skater) in after.iter_mut().enumerate() {
                    let idx = attacker_idx + 1 + offset;
                    let pos = pos_by_idx[&idx];
                    targets.push((skater, pos));
                }

                let hit = crate::puck::resolve_body_check(attacker, attacker_pos, &mut targets, &mut self.puck, now, &self.config);
                match hit {
                    Some(hit) => {
                        events.push_audio(AudioTrigger::BodyCheck);
                        if hit.recorded_hit_stat {
                            events.push_stat(crate::events::StatKind::Hit, player_id, now);
                        }
                        if hit.dislodged_puck {
                            events.push_ui(UiEvent::PuckControl(false));
                        }
                    }
                    None => events.push_audio(AudioTrigger::Whoosh),
                }
            }
        }
    }

    fn advance_possession(
        &mut self,
        now: TickMs,
        intents: &HashMap<PlayerId, Intent>,
        engine: &mut impl EngineAdapter,
        events: &mut EventBatch,
    ) {
        self.puck.position = engine.get_position(self.puck.entity);
        self.puck.velocity = engine.get_linear_velocity(self.puck.entity);

        for skater in &mut self.skaters {
            self.puck.resolve_pending_steal(skater, now);
        }

        let locked = self.game.is_locked();

        if let Some(controller_id) = self.puck.controller_id {
            if let Some(skater) = self.skaters.iter_mut().find(|s| s.id == controller_id) {
                if self.puck.auto_pass_if_expired(skater, now, &self.config) {
                    events.push_ui(UiEvent::PuckControl(false));
                    events.push_audio(AudioTrigger::PassPuck);
                } else if self.puck.goalie_hold_warning_due(skater, now, &self.config) {
                    let remaining = self.puck.goalie_hold_remaining_ms(now, &self.config).unwrap_or(0);
                    events.push_ui(UiEvent::GoaliePassCountdown(remaining as u32));
                }
            }
        }

        if locked {
            return;
        }

        for idx in 0..self.skaters.len() {
            let (player_id, speed, holding_puck, in_control_already) = {
                let skater = &self.skaters[idx];
                (skater.id, skater.speed(), skater.holding_puck, self.puck.controller_id == Some(skater.id))
            };
            if holding_puck || in_control_already {
                continue;
            }
            let intent = intents.get(&player_id);
            let wants_pickup = speed > 0.0 || intent.map(|i| i.space()).unwrap_or(false);
            if !wants_pickup {
                continue;
            }

            let skater_pos = engine.get_position(self.skaters[idx].entity);
            let distance = (skater_pos - self.puck.position).norm();
            if distance > 1.5 {
                continue;
            }

            let incoming_velocity = self.puck.velocity;
            let (outcome, save) = self.puck.try_pickup(&mut self.skaters[idx], now, locked, incoming_velocity, &self.config);
            if let crate::puck::PickupOutcome::Acquired = outcome {
                events.push_ui(UiEvent::PuckControl(true));
                events.push_audio(AudioTrigger::PuckAttach);
                if save.is_some() {
                    events.push_stat(crate::events::StatKind::Save, player_id, now);
                }
            }
        }

        for skater in &mut self.skaters {
            if self.puck.controller_id != Some(skater.id) {
                continue;
            }
            let yaw = intents.get(&skater.id).map(|i| i.camera_yaw).unwrap_or(skater.facing_yaw);
            let lateral = intents
                .get(&skater.id)
                .map(|i| if i.left() { -1.0 } else if i.right() { 1.0 } else { 0.0 })
                .unwrap_or(0.0);
            let skater_pos = engine.get_position(skater.entity);
            self.puck.attach_follow(skater, skater_pos, yaw, lateral, &self.config);
            engine.set_position(self.puck.entity, self.puck.position);
            engine.set_velocity(self.puck.entity, self.puck.velocity);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Point3, Rotation3, Vector3};

    use crate::engine::EntityHandle;
    use crate::events::StatKind;
    use crate::model::{SkaterPosition, Team};
    use crate::skater::MovementState;

    struct FakeEngine {
        positions: HashMap<EntityHandle, Point3<f32>>,
    }

    impl FakeEngine {
        fn new() -> Self {
            FakeEngine { positions: HashMap::new() }
        }

        fn at(mut self, entity: EntityHandle, pos: Point3<f32>) -> Self {
            self.positions.insert(entity, pos);
            self
        }
    }

    impl EngineAdapter for FakeEngine {
        fn set_velocity(&mut self, _entity: EntityHandle, _v: Vector3<f32>) {}
        fn set_rotation(&mut self, _entity: EntityHandle, _rot: Rotation3<f32>) {}
        fn set_position(&mut self, entity: EntityHandle, pos: Point3<f32>) {
            self.positions.insert(entity, pos);
        }
        fn apply_impulse(&mut self, _entity: EntityHandle, _impulse: Vector3<f32>) {}
        fn apply_torque_impulse(&mut self, _entity: EntityHandle, _torque: Vector3<f32>) {}
        fn entity_is_spawned(&self, _entity: EntityHandle) -> bool {
            true
        }
        fn get_linear_velocity(&self, _entity: EntityHandle) -> Vector3<f32> {
            Vector3::zeros()
        }
        fn get_position(&self, entity: EntityHandle) -> Point3<f32> {
            self.positions.get(&entity).copied().unwrap_or(Point3::origin())
        }
        fn ground_contacts(&self, _entity: EntityHandle) -> u32 {
            1
        }
        fn wall_contacts(&self, _entity: EntityHandle) -> u32 {
            0
        }
    }

    fn core(skaters: Vec<Skater>, puck: Puck) -> SimCore {
        SimCore::new(Rink::default(), GameplayConfig::default(), skaters, puck, Match::new(3, 1_200_000))
    }

    #[test]
    fn loose_puck_is_picked_up_by_a_nearby_skater_requesting_it() {
        let rink = Rink::default();
        let skater_pos = rink.center_ice;
        let puck_pos = Point3::new(skater_pos.x + 1.0, skater_pos.y, skater_pos.z);

        let skater = Skater::new(PlayerId(0), Team::Red, SkaterPosition::Center, EntityHandle(0));
        let puck = Puck::new(EntityHandle(1000), puck_pos, 0.5);
        let mut sim = core(vec![skater], puck);

        let mut engine = FakeEngine::new().at(EntityHandle(0), skater_pos).at(EntityHandle(1000), puck_pos);
        let mut events = EventBatch::default();
        let mut intents = HashMap::new();
        let mut intent = Intent::new(0.0);
        intent.set_space(true);
        intents.insert(PlayerId(0), intent);

        sim.tick(20, &intents, &mut engine, &mut events);

        assert_eq!(sim.puck.controller_id, Some(PlayerId(0)));
        assert!(events.ui.iter().any(|e| matches!(e, UiEvent::PuckControl(true))));
        assert!(events.audio.iter().any(|e| matches!(e, AudioTrigger::PuckAttach)));
    }

    /// Victim is ticked before the attacker in skater order, so the knockback this
    /// tick's body-check applies is not immediately zeroed by the victim's own
    /// stunned-branch velocity clamp until the following tick.
    #[test]
    fn body_check_on_non_controller_stuns_and_knocks_back_without_a_hit_stat() {
        let attacker_pos = Point3::new(10.0, 0.0, 10.0);
        let victim_pos = Point3::new(10.0, 0.0, 9.0);

        let victim = Skater::new(PlayerId(0), Team::Blue, SkaterPosition::Center, EntityHandle(0));
        let attacker = Skater::new(PlayerId(1), Team::Red, SkaterPosition::Def1, EntityHandle(1));
        let puck = Puck::new(EntityHandle(1000), Point3::new(0.0, 0.0, 0.0), 0.5);
        let mut sim = core(vec![victim, attacker], puck);

        let mut engine = FakeEngine::new()
            .at(EntityHandle(0), victim_pos)
            .at(EntityHandle(1), attacker_pos)
            .at(EntityHandle(1000), Point3::new(0.0, 0.0, 0.0));
        let mut events = EventBatch::default();
        let mut intents = HashMap::new();
        let mut intent = Intent::new(0.0);
        intent.set_secondary(true);
        intents.insert(PlayerId(1), intent);

        sim.tick(20, &intents, &mut engine, &mut events);

        let victim = sim.skaters.iter().find(|s| s.id == PlayerId(0)).unwrap();
        assert!(matches!(victim.movement, MovementState::Stunned { until_ts } if until_ts == 20 + 2000));
        assert!(victim.velocity.norm() > 0.0);
        assert!(events.audio.iter().any(|e| matches!(e, AudioTrigger::BodyCheck)));
        assert!(!events.stats.iter().any(|s| s.kind == StatKind::Hit));
        assert_eq!(sim.puck.controller_id, None);
    }
}
