//! The shootout variant: five rounds, two shots per round, shooter and goalie swap
//! teams between shots. Only entered once the match mode is locked to shootout with
//! exactly two players; [`crate::match_flow::Match`] does not drive this directly.

use nalgebra::{Point3, Rotation3, Vector3};
use tracing::info;

use crate::engine::EngineAdapter;
use crate::events::{AudioTrigger, CountdownSubtitle, EventBatch, StatKind, UiEvent};
use crate::model::{Team, TickMs};
use crate::puck::Puck;
use crate::rink::Rink;
use crate::skater::{MovementState, Skater};

const ROUNDS: u8 = 5;
const COUNTDOWN_MS: u64 = 3000;
const GO_OVERLAP_MS: u64 = 2000;
const SHOT_TIMEOUT_MS: u64 = 10_000;
const SHOT_END_MS: u64 = 1500;

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum ShootoutPhase {
    Ready,
    Countdown { remaining_ms: u64 },
    ShotLive { remaining_ms: u64 },
    ShotEnd { remaining_ms: u64, scored: bool },
    GameOver,
}

impl ShootoutPhase {
    pub fn is_locked(&self) -> bool {
        matches!(self, ShootoutPhase::Countdown { .. } | ShootoutPhase::ShotEnd { .. } | ShootoutPhase::GameOver)
    }
}

pub struct Shootout {
    pub phase: ShootoutPhase,
    pub round: u8,
    pub shot_in_round: u8,
    pub first_team: Team,
    pub red_goals: u32,
    pub blue_goals: u32,
}

impl Shootout {
    pub fn new(first_team: Team) -> Self {
        Shootout {
            phase: ShootoutPhase::Ready,
            round: 1,
            shot_in_round: 0,
            first_team,
            red_goals: 0,
            blue_goals: 0,
        }
    }

    pub fn is_locked(&self) -> bool {
        self.phase.is_locked()
    }

    pub fn shooting_team(&self) -> Team {
        if self.shot_in_round == 0 {
            self.first_team
        } else {
            self.first_team.get_other_team()
        }
    }

    pub fn winner(&self) -> Option<Team> {
        match self.phase {
            ShootoutPhase::GameOver => {
                if self.red_goals > self.blue_goals {
                    Some(Team::Red)
                } else if self.blue_goals > self.red_goals {
                    Some(Team::Blue)
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    pub fn start_next_shot(
        &mut self,
        rink: &Rink,
        puck: &mut Puck,
        shooter: &mut Skater,
        goalie: &mut Skater,
        engine: &mut impl EngineAdapter,
        events: &mut EventBatch,
    ) {
        self.phase = ShootoutPhase::Countdown { remaining_ms: COUNTDOWN_MS };

        let shooting_team = self.shooting_team();
        let defending_team = shooting_team.get_other_team();

        let shooter_rot = if shooting_team == Team::Red { 0.0 } else { std::f32::consts::PI };
        let forward = Rotation3::from_axis_angle(&Vector3::y_axis(), shooter_rot) * Vector3::new(0.0, 0.0, 3.0);
        let shooter_pos = rink.center_ice + forward;

        let goalie_spawn = rink.spawn_for(defending_team, goalie.position);

        puck.respawn(rink.center_ice);
        engine.set_position(puck.entity, rink.center_ice);
        engine.set_velocity(puck.entity, Vector3::zeros());

        reset_skater(shooter, shooter_pos, shooter_rot, engine);
        reset_skater(goalie, goalie_spawn.position, goalie_spawn.facing_yaw, engine);

        events.push_ui(UiEvent::CountdownUpdate { seconds_left: 3, subtitle: CountdownSubtitle::Shootout });
        events.push_audio(AudioTrigger::CountdownSound);
        info!(round = self.round, shot = self.shot_in_round, team = ?shooting_team, "shootout shot starting");
    }

    pub fn tick(
        &mut self,
        now: TickMs,
        dt_ms: u64,
        rink: &Rink,
        puck: &Puck,
        shooter: &mut Skater,
        goalie: &mut Skater,
        events: &mut EventBatch,
    ) {
        match self.phase {
            ShootoutPhase::Countdown { remaining_ms } => {
                let remaining = remaining_ms.saturating_sub(dt_ms);
                if remaining == 0 {
                    self.phase = ShootoutPhase::ShotLive { remaining_ms: SHOT_TIMEOUT_MS };
                    events.push_ui(UiEvent::CountdownGo);
                    events.push_ui(UiEvent::ShootoutShotStart);
                } else {
                    if remaining <= GO_OVERLAP_MS && remaining + dt_ms > GO_OVERLAP_MS {
                        events.push_ui(UiEvent::CountdownGo);
                    }
                    self.phase = ShootoutPhase::Countdown { remaining_ms: remaining };
                }
            }
            ShootoutPhase::ShotLive { remaining_ms } => {
                let scoring_team = self.shooting_team();
                if rink.goal_for(scoring_team).contains(&puck.position) {
                    self.record_goal(scoring_team, now, events);
                    return;
                }
                let remaining = remaining_ms.saturating_sub(dt_ms);
                if remaining == 0 {
                    self.phase = ShootoutPhase::ShotEnd { remaining_ms: SHOT_END_MS, scored: false };
                    events.push_ui(UiEvent::ShootoutShotEnd);
                } else {
                    self.phase = ShootoutPhase::ShotLive { remaining_ms: remaining };
                }
            }
            ShootoutPhase::ShotEnd { remaining_ms, .. } => {
                let remaining = remaining_ms.saturating_sub(dt_ms);
                if remaining == 0 {
                    self.advance();
                } else {
                    self.phase = ShootoutPhase::ShotEnd { remaining_ms: remaining, scored: matches!(self.phase, ShootoutPhase::ShotEnd { scored: true, .. }) };
                }
            }
            ShootoutPhase::Ready | ShootoutPhase::GameOver => {
                let _ = (shooter, goalie);
            }
        }
    }

    fn record_goal(&mut self, team: Team, now: TickMs, events: &mut EventBatch) {
        match team {
            Team::Red => self.red_goals += 1,
            Team::Blue => self.blue_goals += 1,
        }
        self.phase = ShootoutPhase::ShotEnd { remaining_ms: SHOT_END_MS, scored: true };
        events.push_ui(UiEvent::ShootoutShotEnd);
        events.push_ui(UiEvent::GoalScored { team, own_goal: false, scorer: None, assist: None });
        events.push_audio(AudioTrigger::GoalHorn);
        events.push_stat(StatKind::Goal, crate::model::PlayerId(0), now);
        info!(team = ?team, "shootout goal");
    }

    fn advance(&mut self) {
        if self.shot_in_round == 0 {
            self.shot_in_round = 1;
            self.phase = ShootoutPhase::Ready;
        } else if self.round < ROUNDS {
            self.round += 1;
            self.shot_in_round = 0;
            self.phase = ShootoutPhase::Ready;
        } else {
            self.phase = ShootoutPhase::GameOver;
        }
    }
}

fn reset_skater(skater: &mut Skater, position: Point3<f32>, yaw: f32, engine: &mut impl EngineAdapter) {
    skater.velocity = Vector3::zeros();
    skater.movement = MovementState::Normal;
    skater.holding_puck = false;
    skater.facing_yaw = yaw;
    skater.preserve_yaw_until_ts = u64::MAX;
    engine.set_position(skater.entity, position);
    engine.set_velocity(skater.entity, Vector3::zeros());
    engine.set_rotation(skater.entity, Rotation3::from_axis_angle(&Vector3::y_axis(), yaw));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EntityHandle;
    use crate::model::{PlayerId, SkaterPosition};
    use std::collections::HashMap;

    struct FakeEngine {
        spawned: HashMap<EntityHandle, bool>,
    }

    impl EngineAdapter for FakeEngine {
        fn set_velocity(&mut self, _entity: EntityHandle, _v: Vector3<f32>) {}
        fn set_rotation(&mut self, _entity: EntityHandle, _rot: Rotation3<f32>) {}
        fn set_position(&mut self, _entity: EntityHandle, _pos: Point3<f32>) {}
        fn apply_impulse(&mut self, _entity: EntityHandle, _impulse: Vector3<f32>) {}
        fn apply_torque_impulse(&mut self, _entity: EntityHandle, _torque: Vector3<f32>) {}
        fn entity_is_spawned(&self, entity: EntityHandle) -> bool {
            *self.spawned.get(&entity).unwrap_or(&true)
        }
        fn get_linear_velocity(&self, _entity: EntityHandle) -> Vector3<f32> {
            Vector3::zeros()
        }
        fn get_position(&self, _entity: EntityHandle) -> Point3<f32> {
            Point3::origin()
        }
        fn ground_contacts(&self, _entity: EntityHandle) -> u32 {
            1
        }
        fn wall_contacts(&self, _entity: EntityHandle) -> u32 {
            0
        }
    }

    #[test]
    fn shooting_team_alternates_within_a_round() {
        let shootout = Shootout::new(Team::Red);
        assert_eq!(shootout.shooting_team(), Team::Red);
        let mut shootout2 = Shootout::new(Team::Red);
        shootout2.shot_in_round = 1;
        assert_eq!(shootout2.shooting_team(), Team::Blue);
    }

    #[test]
    fn countdown_leads_to_shot_live() {
        let mut shootout = Shootout::new(Team::Red);
        let rink = Rink::default();
        let puck = Puck::new(EntityHandle(1000), rink.center_ice, 0.5);
        let mut shooter = Skater::new(PlayerId(0), Team::Red, SkaterPosition::Center, EntityHandle(0));
        let mut goalie = Skater::new(PlayerId(1), Team::Blue, SkaterPosition::Goalie, EntityHandle(1));
        let mut events = EventBatch::default();

        shootout.phase = ShootoutPhase::Countdown { remaining_ms: COUNTDOWN_MS };
        shootout.tick(0, COUNTDOWN_MS, &rink, &puck, &mut shooter, &mut goalie, &mut events);
        assert!(matches!(shootout.phase, ShootoutPhase::ShotLive { .. }));
    }

    #[test]
    fn goal_during_shot_live_is_recorded_and_ends_the_shot() {
        let mut shootout = Shootout::new(Team::Red);
        let rink = Rink::default();
        let mut puck = Puck::new(EntityHandle(1000), rink.center_ice, 0.5);
        puck.position = rink.blue_goal.center;
        let mut shooter = Skater::new(PlayerId(0), Team::Red, SkaterPosition::Center, EntityHandle(0));
        let mut goalie = Skater::new(PlayerId(1), Team::Blue, SkaterPosition::Goalie, EntityHandle(1));
        let mut events = EventBatch::default();

        shootout.phase = ShootoutPhase::ShotLive { remaining_ms: SHOT_TIMEOUT_MS };
        shootout.tick(0, 16, &rink, &puck, &mut shooter, &mut goalie, &mut events);
        assert_eq!(shootout.red_goals, 1);
        assert!(matches!(shootout.phase, ShootoutPhase::ShotEnd { scored: true, .. }));
    }

    #[test]
    fn five_rounds_of_two_shots_each_then_game_over() {
        let mut shootout = Shootout::new(Team::Red);
        for _ in 0..9 {
            shootout.phase = ShootoutPhase::ShotEnd { remaining_ms: 0, scored: false };
            shootout.advance();
        }
        assert_ne!(shootout.phase, ShootoutPhase::GameOver);
        shootout.phase = ShootoutPhase::ShotEnd { remaining_ms: 0, scored: false };
        shootout.advance();
        assert_eq!(shootout.phase, ShootoutPhase::GameOver);
    }

    #[test]
    fn winner_is_whichever_team_scored_more() {
        let mut shootout = Shootout::new(Team::Red);
        shootout.red_goals = 3;
        shootout.blue_goals = 1;
        shootout.phase = ShootoutPhase::GameOver;
        assert_eq!(shootout.winner(), Some(Team::Red));
    }
}
