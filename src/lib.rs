pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod match_flow;
pub mod model;
pub mod puck;
pub mod rink;
pub mod shootout;
pub mod skater;
pub mod tick;

pub use config::GameplayConfig;
pub use engine::{EngineAdapter, EntityHandle, Intent};
pub use error::SimError;
pub use events::{AudioTrigger, EventBatch, Notification, StatEvent, StatKind, UiEvent};
pub use match_flow::{Match, MatchMode, MatchState};
pub use model::{PlayerId, RinkSide, SkaterPosition, Team, TickMs};
pub use puck::{GoalAttribution, Puck, ReleaseKind};
pub use rink::{Rink, Zone};
pub use shootout::{Shootout, ShootoutPhase};
pub use skater::{MovementState, Skater, SkaterEvent};
pub use tick::{SimCore, TICK_INTERVAL};
