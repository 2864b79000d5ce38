//! The match state machine: lobby through period play, goal celebrations, faceoffs
//! and period transitions. Regulation only; the shootout variant lives in
//! [`crate::shootout`] and is driven once `mode` is switched.
//!
//! Every whistle (match start, goal, period end) freezes skaters, teleports them to
//! their role spawns, resets the puck to a faceoff dot, and pauses the period clock,
//! matching the teacher's `do_faceoff`/`call_goal` sequencing.

use nalgebra::{Point3, Rotation3, Vector3};
use tracing::{info, warn};

use crate::engine::EngineAdapter;
use crate::error::SimError;
use crate::events::{AudioTrigger, CountdownSubtitle, EventBatch, StatKind, UiEvent};
use crate::model::{RinkSide, Team, TickMs};
use crate::puck::{GoalAttribution, Puck};
use crate::rink::{Rink, Zone};
use crate::skater::{MovementState, Skater};

const MATCH_START_MS: u64 = 4000;
const GOAL_CELEBRATION_MS: u64 = 6000;
const GOAL_COUNTDOWN_MS: u64 = 3000;
const PERIOD_END_MS: u64 = 3000;
const OWN_GOAL_WINDOW_MS: u64 = 5000;
const FACEOFF_YAW_PRESERVE_MS: u64 = 3000;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum MatchMode {
    Regulation,
    Shootout,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum MatchState {
    Lobby,
    TeamSelection,
    WaitingForPlayers,
    MatchStart { remaining_ms: u64 },
    InPeriod,
    GoalScored { remaining_ms: u64, scoring_team: Team },
    /// A whistle-equivalent reset triggered by the boundary watchdog: no score, no
    /// attribution, same freeze/teleport/countdown shape as a goal.
    BoundaryReset { remaining_ms: u64 },
    PeriodEnd { remaining_ms: u64 },
    GameOver,
}

impl MatchState {
    /// I5: true whenever skaters must be frozen and possession pickups disabled.
    pub fn is_locked(&self) -> bool {
        matches!(
            self,
            MatchState::MatchStart { .. }
                | MatchState::GoalScored { .. }
                | MatchState::BoundaryReset { .. }
                | MatchState::PeriodEnd { .. }
        )
    }

    fn name(&self) -> &'static str {
        match self {
            MatchState::Lobby => "Lobby",
            MatchState::TeamSelection => "TeamSelection",
            MatchState::WaitingForPlayers => "WaitingForPlayers",
            MatchState::MatchStart { .. } => "MatchStart",
            MatchState::InPeriod => "InPeriod",
            MatchState::GoalScored { .. } => "GoalScored",
            MatchState::BoundaryReset { .. } => "BoundaryReset",
            MatchState::PeriodEnd { .. } => "PeriodEnd",
            MatchState::GameOver => "GameOver",
        }
    }
}

#[derive(Debug, Copy, Clone)]
pub struct GoalResult {
    pub scoring_team: Team,
    pub own_goal: bool,
    pub attribution: GoalAttribution,
}

pub struct Match {
    pub state: MatchState,
    pub mode: MatchMode,
    pub period: u8,
    pub periods_total: u8,
    pub red_score: u32,
    pub blue_score: u32,
    pub period_length_ms: u64,
    pub period_time_remaining_ms: u64,
    boundary_still_ms: u64,
}

impl Match {
    pub fn new(periods_total: u8, period_length_ms: u64) -> Self {
        Match {
            state: MatchState::Lobby,
            mode: MatchMode::Regulation,
            period: 1,
            periods_total,
            red_score: 0,
            blue_score: 0,
            period_length_ms,
            period_time_remaining_ms: period_length_ms,
            boundary_still_ms: 0,
        }
    }

    pub fn is_locked(&self) -> bool {
        self.state.is_locked()
    }

    pub fn open_team_selection(&mut self) {
        self.state = MatchState::TeamSelection;
    }

    pub fn open_lobby_for_players(&mut self) {
        self.state = MatchState::WaitingForPlayers;
    }

    /// WAITING_FOR_PLAYERS → COUNTDOWN_TO_START → MATCH_START, collapsed into a
    /// single locked state per I5's wording.
    pub fn begin_match_start(
        &mut self,
        rink: &Rink,
        puck: &mut Puck,
        skaters: &mut [Skater],
        engine: &mut impl EngineAdapter,
        events: &mut EventBatch,
    ) {
        if !matches!(self.state, MatchState::WaitingForPlayers | MatchState::PeriodEnd { .. }) {
            let err = SimError::InvalidTransition { from: self.state.name(), event: "begin_match_start" };
            warn!("{err}");
            return;
        }
        self.state = MatchState::MatchStart { remaining_ms: MATCH_START_MS };
        whistle_reset(rink, puck, skaters, engine, None, false);
        events.push_ui(UiEvent::CountdownUpdate { seconds_left: 3, subtitle: CountdownSubtitle::MatchStart });
        events.push_audio(AudioTrigger::CountdownSound);
        info!(period = self.period, "match start countdown begins");
    }

    /// Advance the state machine by `dt_ms`. Goal/boundary sampling against live
    /// puck and skater state happens here; callers still need to invoke
    /// [`Skater::tick`] per skater with `locked = match.is_locked()`.
    pub fn tick(
        &mut self,
        now: TickMs,
        dt_ms: u64,
        rink: &Rink,
        puck: &mut Puck,
        skaters: &mut [Skater],
        engine: &mut impl EngineAdapter,
        events: &mut EventBatch,
    ) {
        match self.state {
            MatchState::MatchStart { remaining_ms } => {
                let remaining = remaining_ms.saturating_sub(dt_ms);
                if remaining == 0 {
                    events.push_ui(UiEvent::CountdownGo);
                    self.state = MatchState::InPeriod;
                    let preserve_until = now + FACEOFF_YAW_PRESERVE_MS;
                    for skater in skaters.iter_mut() {
                        skater.preserve_yaw_until_ts = preserve_until;
                    }
                    info!(period = self.period, "period live");
                } else {
                    self.state = MatchState::MatchStart { remaining_ms: remaining };
                }
            }
            MatchState::InPeriod => {
                self.period_time_remaining_ms = self.period_time_remaining_ms.saturating_sub(dt_ms);
                if let Some(result) = self.sample_and_register_goal(puck, rink, now) {
                    self.apply_goal(result, rink, puck, skaters, engine, events, now);
                } else {
                    self.check_boundary_watchdog(dt_ms, rink, puck, skaters, engine, events, now);
                }
                if !matches!(self.state, MatchState::GoalScored { .. } | MatchState::BoundaryReset { .. }) && self.period_time_remaining_ms == 0 {
                    self.state = MatchState::PeriodEnd { remaining_ms: PERIOD_END_MS };
                    whistle_reset(rink, puck, skaters, engine, None, true);
                    events.push_ui(UiEvent::PeriodEnd);
                    events.push_audio(AudioTrigger::RefereeWhistle);
                    info!(period = self.period, "period ends");
                }
            }
            MatchState::GoalScored { remaining_ms, scoring_team } => {
                let remaining = remaining_ms.saturating_sub(dt_ms);
                if remaining == 0 {
                    self.state = MatchState::InPeriod;
                    let preserve_until = now + FACEOFF_YAW_PRESERVE_MS;
                    for skater in skaters.iter_mut() {
                        skater.preserve_yaw_until_ts = preserve_until;
                    }
                    events.push_ui(UiEvent::CountdownGo);
                    events.push_audio(AudioTrigger::RefereeWhistle);
                } else {
                    self.state = MatchState::GoalScored { remaining_ms: remaining, scoring_team };
                    if remaining <= GOAL_COUNTDOWN_MS && remaining + dt_ms > GOAL_COUNTDOWN_MS {
                        whistle_reset(rink, puck, skaters, engine, Some(Zone::Neutral), true);
                        events.push_ui(UiEvent::CountdownUpdate { seconds_left: 3, subtitle: CountdownSubtitle::Faceoff });
                        events.push_audio(AudioTrigger::CountdownSound);
                    }
                }
            }
            MatchState::BoundaryReset { remaining_ms } => {
                let remaining = remaining_ms.saturating_sub(dt_ms);
                if remaining == 0 {
                    self.state = MatchState::InPeriod;
                    let preserve_until = now + FACEOFF_YAW_PRESERVE_MS;
                    for skater in skaters.iter_mut() {
                        skater.preserve_yaw_until_ts = preserve_until;
                    }
                    events.push_ui(UiEvent::CountdownGo);
                } else {
                    self.state = MatchState::BoundaryReset { remaining_ms: remaining };
                }
            }
            MatchState::PeriodEnd { remaining_ms } => {
                let remaining = remaining_ms.saturating_sub(dt_ms);
                if remaining == 0 {
                    self.advance_period(rink, puck, skaters, engine, events);
                } else {
                    self.state = MatchState::PeriodEnd { remaining_ms: remaining };
                }
            }
            MatchState::Lobby
            | MatchState::TeamSelection
            | MatchState::WaitingForPlayers
            | MatchState::GameOver => {}
        }
    }

    fn advance_period(
        &mut self,
        rink: &Rink,
        puck: &mut Puck,
        skaters: &mut [Skater],
        engine: &mut impl EngineAdapter,
        events: &mut EventBatch,
    ) {
        if self.period >= self.periods_total && self.red_score != self.blue_score {
            self.state = MatchState::GameOver;
            events.push_ui(UiEvent::MatchOver);
            info!(red = self.red_score, blue = self.blue_score, "game over");
            return;
        }
        self.period += 1;
        self.period_time_remaining_ms = self.period_length_ms;
        self.begin_match_start(rink, puck, skaters, engine, events);
    }

    fn sample_and_register_goal(&self, puck: &Puck, rink: &Rink, now: TickMs) -> Option<GoalResult> {
        let scoring_team = [&rink.red_goal, &rink.blue_goal]
            .into_iter()
            .find(|goal| goal.contains(&puck.position))
            .map(|goal| goal.team.get_other_team())?;

        let scored_upon = scoring_team.get_other_team();
        let own_goal = puck.last_touched_team() == Some(scored_upon)
            && !puck.has_recent_touch_from(scoring_team, now, OWN_GOAL_WINDOW_MS);

        let attribution = if own_goal {
            GoalAttribution::default()
        } else {
            puck.attribute_goal(scoring_team)
        };

        Some(GoalResult { scoring_team, own_goal, attribution })
    }

    fn apply_goal(
        &mut self,
        result: GoalResult,
        rink: &Rink,
        puck: &mut Puck,
        skaters: &mut [Skater],
        engine: &mut impl EngineAdapter,
        events: &mut EventBatch,
        now: TickMs,
    ) {
        match result.scoring_team {
            Team::Red => self.red_score += 1,
            Team::Blue => self.blue_score += 1,
        }
        self.state = MatchState::GoalScored {
            remaining_ms: GOAL_CELEBRATION_MS + GOAL_COUNTDOWN_MS,
            scoring_team: result.scoring_team,
        };
        whistle_reset(rink, puck, skaters, engine, None, false);

        events.push_ui(UiEvent::GoalScored {
            team: result.scoring_team,
            own_goal: result.own_goal,
            scorer: result.attribution.scorer,
            assist: result.attribution.primary_assist,
        });
        events.push_audio(AudioTrigger::GoalHorn);
        if let Some(scorer) = result.attribution.scorer {
            events.push_stat(StatKind::Goal, scorer, now);
        }
        if let Some(assist) = result.attribution.primary_assist {
            events.push_stat(StatKind::Assist, assist, now);
        }
        if let Some(assist) = result.attribution.secondary_assist {
            events.push_stat(StatKind::Assist, assist, now);
        }

        info!(
            team = ?result.scoring_team,
            own_goal = result.own_goal,
            scorer = ?result.attribution.scorer,
            red = self.red_score,
            blue = self.blue_score,
            "goal scored"
        );
    }

    fn check_boundary_watchdog(
        &mut self,
        dt_ms: u64,
        rink: &Rink,
        puck: &mut Puck,
        skaters: &mut [Skater],
        engine: &mut impl EngineAdapter,
        events: &mut EventBatch,
        now: TickMs,
    ) {
        let motionless_below_ice = puck.position.y < 0.0 && puck.velocity.norm() < 0.1;
        let out_of_bounds = rink.is_out_of_bounds(&puck.position);

        if out_of_bounds || motionless_below_ice {
            self.boundary_still_ms += dt_ms;
        } else {
            self.boundary_still_ms = 0;
        }

        if out_of_bounds || self.boundary_still_ms > 2000 {
            self.boundary_still_ms = 0;
            self.state = MatchState::BoundaryReset { remaining_ms: GOAL_COUNTDOWN_MS };
            whistle_reset(rink, puck, skaters, engine, None, true);
            events.push_ui(UiEvent::CountdownUpdate { seconds_left: 3, subtitle: CountdownSubtitle::Faceoff });
            events.push_audio(AudioTrigger::RefereeWhistle);
            info!(now, "boundary watchdog reset");
        }
    }
}

fn whistle_reset(
    rink: &Rink,
    puck: &mut Puck,
    skaters: &mut [Skater],
    engine: &mut impl EngineAdapter,
    faceoff_at_dot: Option<Zone>,
    look_at_puck: bool,
) {
    let dot = faceoff_at_dot
        .map(|zone| rink.nearest_faceoff_dot(zone, RinkSide::Left))
        .unwrap_or(&rink.faceoff_dots[0]);
    puck.respawn(dot.position);
    engine.set_velocity(puck.entity, Vector3::zeros());
    engine.set_position(puck.entity, dot.position);

    for skater in skaters.iter_mut() {
        skater.velocity = Vector3::zeros();
        skater.movement = MovementState::Normal;
        skater.holding_puck = false;

        let spawn = rink.spawn_for(skater.team, skater.position);
        let yaw = if look_at_puck {
            yaw_towards(spawn.position, dot.position)
        } else {
            spawn.facing_yaw
        };
        skater.facing_yaw = yaw;
        skater.preserve_yaw_until_ts = u64::MAX;

        if engine.entity_is_spawned(skater.entity) {
            engine.set_position(skater.entity, spawn.position);
            engine.set_velocity(skater.entity, Vector3::zeros());
            engine.set_rotation(skater.entity, Rotation3::from_axis_angle(&Vector3::y_axis(), yaw));
        }
    }
}

fn yaw_towards(from: Point3<f32>, to: Point3<f32>) -> f32 {
    let dx = to.x - from.x;
    let dz = to.z - from.z;
    (-dx).atan2(-dz)
}
