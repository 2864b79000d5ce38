//! The single source of truth for puck possession.
//!
//! A [`Puck`] carries both the puck's physical state and the "Possession Claim" the
//! specification derives from it: at most one controller globally, a pickup gate
//! (I3), a 5-second goalie hold (I6), and the touch history goal attribution reads
//! from (I7, I8). Every mutation here is meant to happen inside a single tick's
//! critical section; nothing here is shared across threads.

use arraydeque::{ArrayDeque, Wrapping};
use nalgebra::{Point3, Rotation3, Vector3};

use crate::config::GameplayConfig;
use crate::engine::EntityHandle;
use crate::model::{PlayerId, Team, TickMs};
use crate::skater::Skater;

const TOUCH_HISTORY_TTL_MS: u64 = 60_000;
const RELEASE_COOLDOWN_MS: u64 = 1000;
const DISLODGE_COOLDOWN_MS: u64 = 1500;

#[derive(Debug, Copy, Clone)]
struct TouchEntry {
    player_id: PlayerId,
    team: Team,
    ts: TickMs,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum DenyReason {
    Cooldown,
    AlreadyOwned,
    LockedPhase,
    RoleRestrictedNone,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum PickupOutcome {
    Acquired,
    Denied(DenyReason),
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ReleaseKind {
    Pass,
    Shot,
    AutoPass,
    Dislodge,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum StealOutcome {
    Stole(PlayerId),
    Missed,
}

#[derive(Debug, Copy, Clone, Default)]
pub struct GoalAttribution {
    pub scorer: Option<PlayerId>,
    pub primary_assist: Option<PlayerId>,
    pub secondary_assist: Option<PlayerId>,
}

#[derive(Debug, Copy, Clone)]
pub struct PendingImpulse {
    pub entity: EntityHandle,
    pub linear: Vector3<f32>,
    pub torque: Vector3<f32>,
}

#[derive(Debug, Copy, Clone)]
pub struct BodyCheckHit {
    pub target: PlayerId,
    pub recorded_hit_stat: bool,
    pub dislodged_puck: bool,
}

pub struct Puck {
    pub entity: EntityHandle,
    pub position: Point3<f32>,
    pub velocity: Vector3<f32>,
    pub mass: f32,

    pub controller_id: Option<PlayerId>,
    pub last_touched_by: Option<PlayerId>,
    pub is_controlled: bool,

    acquired_ts: TickMs,
    goalie_holding_ts: Option<TickMs>,
    /// Short window during which no skater (not even the releaser) may re-attach,
    /// used to break the dislodge/steal aliasing cycle described in the design notes.
    arming_lockout_until_ts: TickMs,
    /// A steal in progress: the defender is granted possession once `now` reaches
    /// the arming timestamp, rather than immediately.
    pending_steal: Option<(PlayerId, Team, TickMs)>,
    touch_history: ArrayDeque<TouchEntry, 5, Wrapping>,

    pending_impulse: Option<PendingImpulse>,
}

impl Puck {
    pub fn new(entity: EntityHandle, position: Point3<f32>, mass: f32) -> Self {
        Puck {
            entity,
            position,
            velocity: Vector3::zeros(),
            mass,
            controller_id: None,
            last_touched_by: None,
            is_controlled: false,
            acquired_ts: 0,
            goalie_holding_ts: None,
            arming_lockout_until_ts: 0,
            pending_steal: None,
            touch_history: ArrayDeque::new(),
            pending_impulse: None,
        }
    }

    pub fn respawn(&mut self, position: Point3<f32>) {
        self.position = position;
        self.velocity = Vector3::zeros();
        self.controller_id = None;
        self.last_touched_by = None;
        self.is_controlled = false;
        self.goalie_holding_ts = None;
        self.pending_steal = None;
        self.touch_history.clear();
        self.pending_impulse = None;
    }

    /// Apply the impulse queued by last tick's release, if any. Must run before any
    /// other puck/skater interaction in the current tick (see the design notes on
    /// release-then-impulse deferral).
    pub fn take_pending_impulse(&mut self) -> Option<PendingImpulse> {
        self.pending_impulse.take()
    }

    pub fn try_pickup(
        &mut self,
        skater: &mut Skater,
        now: TickMs,
        locked: bool,
        incoming_velocity: Vector3<f32>,
        config: &GameplayConfig,
    ) -> (PickupOutcome, Option<PlayerId>) {
        if locked {
            return (PickupOutcome::Denied(DenyReason::LockedPhase), None);
        }
        if self.controller_id == Some(skater.id) {
            return (PickupOutcome::Denied(DenyReason::AlreadyOwned), None);
        }
        if now < self.arming_lockout_until_ts {
            return (PickupOutcome::Denied(DenyReason::Cooldown), None);
        }
        if let Some(last) = skater.last_release_ts {
            if now.saturating_sub(last) < RELEASE_COOLDOWN_MS {
                return (PickupOutcome::Denied(DenyReason::Cooldown), None);
            }
        }
        if now < skater.dislodged_until_ts {
            return (PickupOutcome::Denied(DenyReason::Cooldown), None);
        }

        let previous_shooter = self.last_touched_by;
        let save = if skater.is_goalie() {
            previous_shooter.filter(|_| {
                incoming_velocity.norm() >= config.goalie.save_velocity_threshold
            })
        } else {
            None
        };

        self.controller_id = Some(skater.id);
        self.is_controlled = true;
        self.acquired_ts = now;
        self.goalie_holding_ts = if skater.is_goalie() { Some(now) } else { None };
        skater.holding_puck = true;
        self.add_touch(skater.id, skater.team, now);

        (PickupOutcome::Acquired, save)
    }

    fn add_touch(&mut self, player_id: PlayerId, team: Team, now: TickMs) {
        self.prune_touch_history(now);
        self.last_touched_by = Some(player_id);
        if let Some(front) = self.touch_history.front_mut() {
            if front.player_id == player_id {
                front.ts = now;
                return;
            }
        }
        let _ = self.touch_history.push_front(TouchEntry { player_id, team, ts: now });
    }

    fn prune_touch_history(&mut self, now: TickMs) {
        while let Some(back) = self.touch_history.back() {
            if now.saturating_sub(back.ts) > TOUCH_HISTORY_TTL_MS {
                self.touch_history.pop_back();
            } else {
                break;
            }
        }
    }

    /// Record a touch without changing possession: used for stick-check misses and
    /// deflections where the puck briefly contacts a skater it does not attach to.
    pub fn record_touch(&mut self, player_id: PlayerId, team: Team, now: TickMs) {
        self.add_touch(player_id, team, now);
    }

    pub fn touch_history_players(&self) -> impl Iterator<Item = PlayerId> + '_ {
        self.touch_history.iter().map(|e| e.player_id)
    }

    pub fn last_touched_team(&self) -> Option<Team> {
        self.touch_history.front().map(|e| e.team)
    }

    pub fn has_recent_touch_from(&self, team: Team, now: TickMs, window_ms: u64) -> bool {
        self.touch_history
            .iter()
            .any(|e| e.team == team && now.saturating_sub(e.ts) <= window_ms)
    }

    pub fn attribute_goal(&self, scoring_team: Team) -> GoalAttribution {
        let mut out = GoalAttribution::default();
        for entry in self.touch_history.iter() {
            if entry.team != scoring_team {
                continue;
            }
            if out.scorer.is_none() {
                out.scorer = Some(entry.player_id);
                continue;
            }
            if out.scorer == Some(entry.player_id) {
                continue;
            }
            if out.primary_assist.is_none() {
                out.primary_assist = Some(entry.player_id);
                continue;
            }
            if out.primary_assist == Some(entry.player_id) {
                continue;
            }
            out.secondary_assist = Some(entry.player_id);
            break;
        }
        out
    }

    pub fn release(&mut self, skater: &mut Skater, kind: ReleaseKind, now: TickMs, camera_yaw: f32, power01: f32, config: &GameplayConfig) {
        if self.controller_id != Some(skater.id) {
            return;
        }
        self.controller_id = None;
        self.is_controlled = false;
        self.goalie_holding_ts = None;
        skater.holding_puck = false;

        match kind {
            ReleaseKind::Pass | ReleaseKind::Shot | ReleaseKind::AutoPass => {
                skater.last_release_ts = Some(now);
                let (linear, torque) = impulse_for(kind, power01, camera_yaw, self.mass, config);
                self.pending_impulse = Some(PendingImpulse { entity: self.entity, linear, torque });
            }
            ReleaseKind::Dislodge => {
                skater.dislodged_until_ts = now + DISLODGE_COOLDOWN_MS;
                self.arming_lockout_until_ts = now + config.stick_check.arming_delay_ms as u64;
            }
        }
    }

    pub fn auto_pass_if_expired(&mut self, skater: &mut Skater, now: TickMs, config: &GameplayConfig) -> bool {
        if self.controller_id != Some(skater.id) || !skater.is_goalie() {
            return false;
        }
        let Some(held_since) = self.goalie_holding_ts else { return false };
        if now.saturating_sub(held_since) >= config.goalie.puck_control_limit_ms as u64 {
            self.release(skater, ReleaseKind::AutoPass, now, skater.facing_yaw, config.goalie.auto_pass_power, config);
            true
        } else {
            false
        }
    }

    pub fn goalie_hold_warning_due(&self, skater: &Skater, now: TickMs, config: &GameplayConfig) -> bool {
        if self.controller_id != Some(skater.id) || !skater.is_goalie() {
            return false;
        }
        match self.goalie_holding_ts {
            Some(held_since) => {
                let elapsed = now.saturating_sub(held_since);
                elapsed >= config.goalie.warning_time_ms as u64
                    && elapsed < config.goalie.puck_control_limit_ms as u64
            }
            None => false,
        }
    }

    pub fn goalie_hold_remaining_ms(&self, now: TickMs, config: &GameplayConfig) -> Option<u64> {
        let held_since = self.goalie_holding_ts?;
        let elapsed = now.saturating_sub(held_since);
        Some((config.goalie.puck_control_limit_ms as u64).saturating_sub(elapsed))
    }

    pub fn attach_follow(&mut self, skater: &Skater, skater_pos: Point3<f32>, yaw: f32, lateral: f32, config: &GameplayConfig) {
        if self.controller_id != Some(skater.id) {
            return;
        }
        let forward = Rotation3::from_axis_angle(&nalgebra::Vector3::y_axis(), yaw) * Vector3::new(0.0, 0.0, -1.0);
        let right = Rotation3::from_axis_angle(&nalgebra::Vector3::y_axis(), yaw) * Vector3::new(1.0, 0.0, 0.0);
        let target = skater_pos + forward * config.puck_forces.puck_offset + right * (lateral * config.puck_forces.lateral_offset);
        let y = self.position.y;
        self.position += (target - self.position) * 0.5;
        self.position.y = y;
        self.velocity = skater.velocity;
    }

    pub fn try_steal(
        &mut self,
        defender_id: PlayerId,
        defender_team: Team,
        defender_pos: Point3<f32>,
        defender_yaw: f32,
        holder: &mut Skater,
        now: TickMs,
        config: &GameplayConfig,
    ) -> StealOutcome {
        let forward = Rotation3::from_axis_angle(&nalgebra::Vector3::y_axis(), defender_yaw) * Vector3::new(0.0, 0.0, -1.0);
        let stick_tip = defender_pos + forward * config.stick_check.stick_offset;
        let distance = (stick_tip - self.position).norm();

        if distance <= config.stick_check.contact_radius && !holder.is_goalie() {
            self.release(holder, ReleaseKind::Dislodge, now, defender_yaw, 0.0, config);
            self.pending_steal = Some((defender_id, defender_team, now + config.stick_check.arming_delay_ms as u64));
            StealOutcome::Stole(defender_id)
        } else {
            StealOutcome::Missed
        }
    }

    /// Grant a pending steal once its arming delay has elapsed. Called once per tick
    /// from the tick loop, after `try_steal` may have been invoked this same tick.
    pub fn resolve_pending_steal(&mut self, defender: &mut Skater, now: TickMs) {
        if let Some((player_id, team, arm_at)) = self.pending_steal {
            if defender.id == player_id && now >= arm_at {
                self.controller_id = Some(player_id);
                self.is_controlled = true;
                self.acquired_ts = now;
                self.goalie_holding_ts = if defender.is_goalie() { Some(now) } else { None };
                defender.holding_puck = true;
                self.add_touch(player_id, team, now);
                self.pending_steal = None;
            }
        }
    }

    pub fn is_held(&self) -> bool {
        self.controller_id.is_some()
    }
}

/// Impulse for a pass or shot, per the constants surface. `power01` is clamped to
/// [0, 1]; the horizontal/vertical components are monotonic non-decreasing in
/// `power01` for both kinds (P7). The pass/auto-pass yaw torque is randomized
/// within a small range rather than power-driven.
pub fn impulse_for(
    kind: ReleaseKind,
    power01: f32,
    camera_yaw: f32,
    mass: f32,
    config: &GameplayConfig,
) -> (Vector3<f32>, Vector3<f32>) {
    let power = power01.clamp(0.0, 1.0);
    let direction = Rotation3::from_axis_angle(&nalgebra::Vector3::y_axis(), camera_yaw) * Vector3::new(0.0, 0.0, -1.0);
    let forces = &config.puck_forces;

    match kind {
        ReleaseKind::Pass | ReleaseKind::AutoPass => {
            let horizontal_mag = (forces.min_pass + power * (forces.max_pass - forces.min_pass)) * forces.passing_power * mass;
            let horizontal = direction * horizontal_mag;
            let vertical = power * forces.saucer_lift * forces.passing_power * mass;
            let torque_y = (rand::random::<f32>() * 2.0 - 1.0) * 0.05 * forces.passing_power;
            (
                Vector3::new(horizontal.x, vertical, horizontal.z),
                Vector3::new(0.0, torque_y, 0.0),
            )
        }
        ReleaseKind::Shot => {
            let horizontal_mag = forces.min_shot + power * (forces.max_shot - forces.min_shot);
            let horizontal = direction * horizontal_mag * mass;
            let vertical = power.powi(2) * forces.shot_lift * forces.shot_force * mass;
            let torque_y = power * forces.shot_force * 0.2;
            (
                Vector3::new(horizontal.x, vertical, horizontal.z),
                Vector3::new(0.0, torque_y, 0.0),
            )
        }
        ReleaseKind::Dislodge => (Vector3::zeros(), Vector3::zeros()),
    }
}

/// Resolve a body-check lunge against the nearest eligible opponent in range and cone.
/// Returns `None` if no eligible opponent was found this tick.
pub fn resolve_body_check(
    attacker: &mut Skater,
    attacker_pos: Point3<f32>,
    targets: &mut [(&mut Skater, Point3<f32>)],
    puck: &mut Puck,
    now: TickMs,
    config: &GameplayConfig,
) -> Option<BodyCheckHit> {
    let (start_ts, dir, hit) = match attacker.movement {
        crate::skater::MovementState::BodyCheckLunge { start_ts, dir, hit } => (start_ts, dir, hit),
        _ => return None,
    };
    if hit {
        return None;
    }
    let _ = start_ts;

    let cos_angle = config.body_check.angle_deg.to_radians().cos();
    for (target, target_pos) in targets.iter_mut() {
        if target.team == attacker.team || target.is_goalie() {
            continue;
        }
        let to_target = *target_pos - attacker_pos;
        let distance = to_target.norm();
        if distance > config.body_check.range || distance < 1e-4 {
            continue;
        }
        let facing = to_target.normalize().dot(&dir);
        if facing < cos_angle {
            continue;
        }

        let was_controller = puck.controller_id == Some(target.id);
        attacker.mark_body_check_hit();
        target.stun(now, 2000);
        target.velocity = dir * attacker.speed().max(1.0);
        let mut dislodged = false;
        if was_controller {
            puck.release(target, ReleaseKind::Dislodge, now, target.facing_yaw, 0.0, config);
            dislodged = true;
        }
        return Some(BodyCheckHit {
            target: target.id,
            recorded_hit_stat: was_controller,
            dislodged_puck: dislodged,
        });
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EntityHandle;
    use crate::model::SkaterPosition;

    fn skater(id: usize, team: Team, position: SkaterPosition) -> Skater {
        Skater::new(PlayerId(id), team, position, EntityHandle(id as u64))
    }

    fn puck() -> Puck {
        Puck::new(EntityHandle(1000), Point3::origin(), 0.5)
    }

    #[test]
    fn sole_possession_after_pickup() {
        let mut puck = puck();
        let mut a = skater(0, Team::Red, SkaterPosition::Center);
        let config = GameplayConfig::default();
        let (outcome, _) = puck.try_pickup(&mut a, 0, false, Vector3::zeros(), &config);
        assert_eq!(outcome, PickupOutcome::Acquired);
        assert_eq!(puck.controller_id, Some(a.id));
        assert!(a.holding_puck);
    }

    #[test]
    fn cooldown_denies_immediate_repickup_after_release() {
        let mut puck = puck();
        let mut a = skater(0, Team::Red, SkaterPosition::Center);
        let config = GameplayConfig::default();
        puck.try_pickup(&mut a, 0, false, Vector3::zeros(), &config);
        puck.release(&mut a, ReleaseKind::Pass, 0, 0.0, 1.0, &config);
        let (outcome, _) = puck.try_pickup(&mut a, 500, false, Vector3::zeros(), &config);
        assert_eq!(outcome, PickupOutcome::Denied(DenyReason::Cooldown));
    }

    #[test]
    fn cooldown_clears_after_1000ms() {
        let mut puck = puck();
        let mut a = skater(0, Team::Red, SkaterPosition::Center);
        let config = GameplayConfig::default();
        puck.try_pickup(&mut a, 0, false, Vector3::zeros(), &config);
        puck.release(&mut a, ReleaseKind::Pass, 0, 0.0, 1.0, &config);
        let (outcome, _) = puck.try_pickup(&mut a, 1000, false, Vector3::zeros(), &config);
        assert_eq!(outcome, PickupOutcome::Acquired);
    }

    #[test]
    fn wrist_shot_impulse_matches_the_documented_example() {
        let config = GameplayConfig::default();
        let (linear, torque) = impulse_for(ReleaseKind::Shot, 1.0, 0.0, 0.5, &config);
        assert!((linear.x - 0.0).abs() < 1e-4);
        assert!((linear.y - 0.2).abs() < 1e-3);
        assert!((linear.z - (-17.5)).abs() < 1e-3);
        assert!((torque.y - 0.2).abs() < 1e-3);
    }

    #[test]
    fn impulse_monotonic_in_power() {
        let config = GameplayConfig::default();
        let (low, _) = impulse_for(ReleaseKind::Shot, 0.2, 0.0, 0.5, &config);
        let (high, _) = impulse_for(ReleaseKind::Shot, 0.8, 0.0, 0.5, &config);
        assert!(high.norm() >= low.norm());
        let (low, _) = impulse_for(ReleaseKind::Pass, 0.2, 0.0, 0.5, &config);
        let (high, _) = impulse_for(ReleaseKind::Pass, 0.8, 0.0, 0.5, &config);
        assert!(high.norm() >= low.norm());
    }

    #[test]
    fn pass_torque_stays_within_the_documented_range() {
        let config = GameplayConfig::default();
        for _ in 0..100 {
            let (_, torque) = impulse_for(ReleaseKind::Pass, 0.5, 0.0, 0.5, &config);
            assert!(torque.y.abs() <= 0.05 * config.puck_forces.passing_power + 1e-6);
        }
    }

    #[test]
    fn touch_history_prunes_after_ttl_and_merges_consecutive_duplicates() {
        let mut puck = puck();
        puck.add_touch(PlayerId(1), Team::Red, 0);
        puck.add_touch(PlayerId(1), Team::Red, 100);
        assert_eq!(puck.touch_history.len(), 1);
        puck.add_touch(PlayerId(2), Team::Red, 200);
        assert_eq!(puck.touch_history.len(), 2);
        puck.add_touch(PlayerId(1), Team::Red, 61_000);
        assert!(!puck.touch_history_players().any(|p| p == PlayerId(2)));
    }

    #[test]
    fn goal_attribution_names_scorer_and_two_assists() {
        let mut puck = puck();
        puck.add_touch(PlayerId(1), Team::Red, 0);
        puck.add_touch(PlayerId(2), Team::Red, 1200);
        puck.add_touch(PlayerId(3), Team::Red, 2500);
        let attribution = puck.attribute_goal(Team::Red);
        assert_eq!(attribution.scorer, Some(PlayerId(3)));
        assert_eq!(attribution.primary_assist, Some(PlayerId(2)));
        assert_eq!(attribution.secondary_assist, Some(PlayerId(1)));
    }

    #[test]
    fn release_then_immediate_pickup_by_releaser_is_denied() {
        let mut puck = puck();
        let mut a = skater(0, Team::Red, SkaterPosition::Center);
        let config = GameplayConfig::default();
        puck.try_pickup(&mut a, 0, false, Vector3::zeros(), &config);
        puck.release(&mut a, ReleaseKind::Shot, 0, 0.0, 1.0, &config);
        let (outcome, _) = puck.try_pickup(&mut a, 999, false, Vector3::zeros(), &config);
        assert_eq!(outcome, PickupOutcome::Denied(DenyReason::Cooldown));
    }

    #[test]
    fn goalie_auto_pass_fires_at_five_seconds() {
        let mut puck = puck();
        let mut goalie = skater(0, Team::Red, SkaterPosition::Goalie);
        let config = GameplayConfig::default();
        puck.try_pickup(&mut goalie, 0, false, Vector3::zeros(), &config);
        assert!(!puck.auto_pass_if_expired(&mut goalie, 4999, &config));
        assert!(puck.auto_pass_if_expired(&mut goalie, 5000, &config));
        assert!(!goalie.holding_puck);
    }

    #[test]
    fn stick_check_misses_until_within_contact_radius_then_steals_after_arming_delay() {
        let mut puck = puck();
        let config = GameplayConfig::default();
        let mut holder = skater(0, Team::Red, SkaterPosition::Center);
        let defender_id = PlayerId(1);
        let defender_pos = Point3::new(0.0, 0.0, 0.0);
        let defender_yaw = 0.0;

        puck.position = Point3::new(0.0, 0.0, -2.3);
        puck.try_pickup(&mut holder, 0, false, Vector3::zeros(), &config);

        let outcome = puck.try_steal(defender_id, Team::Blue, defender_pos, defender_yaw, &mut holder, 0, &config);
        assert_eq!(outcome, StealOutcome::Missed);
        assert!(holder.holding_puck);

        puck.position = Point3::new(0.0, 0.0, -2.0);
        let outcome = puck.try_steal(defender_id, Team::Blue, defender_pos, defender_yaw, &mut holder, 100, &config);
        assert_eq!(outcome, StealOutcome::Missed);
        assert!(holder.holding_puck);

        puck.position = Point3::new(0.0, 0.0, -1.8);
        let outcome = puck.try_steal(defender_id, Team::Blue, defender_pos, defender_yaw, &mut holder, 200, &config);
        assert_eq!(outcome, StealOutcome::Stole(defender_id));
        assert!(!holder.holding_puck);
        assert_eq!(puck.controller_id, None);
        assert_eq!(holder.dislodged_until_ts, 200 + 1500);

        let mut defender = skater(1, Team::Blue, SkaterPosition::Wing1);
        puck.resolve_pending_steal(&mut defender, 250);
        assert_eq!(puck.controller_id, None);
        puck.resolve_pending_steal(&mut defender, 300);
        assert_eq!(puck.controller_id, Some(defender_id));
        assert!(defender.holding_puck);

        let (outcome, _) = puck.try_pickup(&mut holder, 300, false, Vector3::zeros(), &config);
        assert_eq!(outcome, PickupOutcome::Denied(DenyReason::Cooldown));
    }
}
