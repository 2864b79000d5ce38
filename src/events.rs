//! Outbound messages the core hands to downstream adapters.
//!
//! These are delivered, never polled: dispatch is synchronous within a tick and
//! handlers must not feed intents back into the same tick, so a slow or failing
//! downstream consumer can never stall the simulation itself.

use crate::model::{PlayerId, Team};

#[derive(Debug, Copy, Clone)]
#[non_exhaustive]
pub enum UiEvent {
    GameWaiting,
    CountdownUpdate { seconds_left: u32, subtitle: CountdownSubtitle },
    CountdownGo,
    GoalScored {
        team: Team,
        own_goal: bool,
        scorer: Option<PlayerId>,
        assist: Option<PlayerId>,
    },
    PeriodEnd,
    MatchOver,
    ShootoutScoreboard,
    ShootoutShotStart,
    ShootoutShotEnd,
    BodyCheckAvailable(bool),
    HockeyStopCooldown(u32),
    GoalieSlideCooldown(u32),
    SpinCooldown(u32),
    GoaliePassCountdown(u32),
    PuckControl(bool),
    StatsUpdate,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum CountdownSubtitle {
    MatchStart,
    Faceoff,
    Shootout,
}

/// Notification text is kept as its own variant (rather than folded into `UiEvent`)
/// since it is the one event that is ever user-authored; everything else is a fixed
/// enum of known states.
#[derive(Debug, Clone)]
pub struct Notification(pub String);

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[non_exhaustive]
pub enum AudioTrigger {
    IceStop,
    GoalieSlide,
    PuckAttach,
    PassPuck,
    WristShot,
    StickCheck,
    StickCheckMiss,
    SwingStick,
    BodyCheck,
    PuckLeft,
    PuckRight,
    Whoosh,
    GoalHorn,
    RefereeWhistle,
    CountdownSound,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum StatKind {
    Goal,
    Assist,
    Shot,
    Save,
    Hit,
    Win,
    Loss,
    GamePlayed,
}

#[derive(Debug, Copy, Clone)]
pub struct StatEvent {
    pub kind: StatKind,
    pub player_id: PlayerId,
    pub ts: u64,
}

/// One tick's worth of outbound traffic, handed to the host after the tick completes.
#[derive(Debug, Clone, Default)]
pub struct EventBatch {
    pub ui: Vec<UiEvent>,
    pub notifications: Vec<Notification>,
    pub audio: Vec<AudioTrigger>,
    pub stats: Vec<StatEvent>,
}

impl EventBatch {
    pub fn clear(&mut self) {
        self.ui.clear();
        self.notifications.clear();
        self.audio.clear();
        self.stats.clear();
    }

    pub fn push_ui(&mut self, event: UiEvent) {
        self.ui.push(event);
    }

    pub fn push_audio(&mut self, trigger: AudioTrigger) {
        self.audio.push(trigger);
    }

    pub fn push_stat(&mut self, kind: StatKind, player_id: PlayerId, ts: u64) {
        self.stats.push(StatEvent { kind, player_id, ts });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_batch_clear_empties_every_queue() {
        let mut batch = EventBatch::default();
        batch.push_ui(UiEvent::GameWaiting);
        batch.push_audio(AudioTrigger::GoalHorn);
        batch.push_stat(StatKind::Goal, PlayerId(0), 0);
        batch.notifications.push(Notification("hi".into()));
        batch.clear();
        assert!(batch.ui.is_empty());
        assert!(batch.audio.is_empty());
        assert!(batch.stats.is_empty());
        assert!(batch.notifications.is_empty());
    }
}
