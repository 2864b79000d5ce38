//! Error taxonomy for the simulation core.
//!
//! All but one variant are recovered locally within the tick that produced them and
//! are only ever surfaced through `tracing::warn!`. `RinkDataInvalid` is the single
//! fatal condition: it can only occur at startup, while loading the rink data file,
//! and is handed to the host as an [`anyhow::Error`].

use std::fmt;

#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum SimError {
    /// Intent or command referenced a skater whose engine entity is not currently spawned.
    EntityNotSpawned(crate::model::PlayerId),
    /// A state-machine transition was requested that is not valid from the current state.
    InvalidTransition { from: &'static str, event: &'static str },
    /// A physical quantity left its valid range (NaN velocity, position outside the world).
    PhysicsAnomaly(String),
    /// The rink data file failed validation. The only fatal variant.
    RinkDataInvalid(String),
}

impl fmt::Display for SimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimError::EntityNotSpawned(id) => write!(f, "entity for player {id} is not spawned"),
            SimError::InvalidTransition { from, event } => {
                write!(f, "cannot handle '{event}' while in state '{from}'")
            }
            SimError::PhysicsAnomaly(msg) => write!(f, "physics anomaly: {msg}"),
            SimError::RinkDataInvalid(msg) => write!(f, "rink data file invalid: {msg}"),
        }
    }
}

impl std::error::Error for SimError {}

impl SimError {
    /// True for the variants that are always recoverable within the tick that raised them.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, SimError::RinkDataInvalid(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PlayerId;

    #[test]
    fn only_rink_data_invalid_is_fatal() {
        assert!(SimError::EntityNotSpawned(PlayerId(0)).is_recoverable());
        assert!(SimError::InvalidTransition {
            from: "Lobby",
            event: "goal_scored"
        }
        .is_recoverable());
        assert!(SimError::PhysicsAnomaly("nan velocity".into()).is_recoverable());
        assert!(!SimError::RinkDataInvalid("bad json".into()).is_recoverable());
    }
}
