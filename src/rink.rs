//! Static rink geometry and zone classification.
//!
//! Everything here is pure data plus stateless queries: a [`Rink`] is built once at
//! world init (either from compiled-in defaults or from an on-disk data file) and
//! never mutated during a tick.

use std::fs;
use std::path::Path;

use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};

use crate::error::SimError;
use crate::model::{RinkSide, SkaterPosition, Team};

/// Zone a world point falls in, classified against the two blue lines.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd)]
pub enum Zone {
    RedDefensive,
    Neutral,
    BlueDefensive,
}

/// A blue line: a Z-axis band with a half-width, following the same representation
/// HQM uses for its rink lines.
#[derive(Debug, Clone)]
pub struct RinkLine {
    pub z: f32,
    pub width: f32,
}

impl RinkLine {
    fn side_of(&self, pos: &Point3<f32>) -> std::cmp::Ordering {
        let dot = pos.z - self.z;
        if dot > self.width / 2.0 {
            std::cmp::Ordering::Greater
        } else if dot < -self.width / 2.0 {
            std::cmp::Ordering::Less
        } else {
            std::cmp::Ordering::Equal
        }
    }
}

#[derive(Debug, Clone)]
pub struct FaceoffDot {
    pub id: u8,
    pub position: Point3<f32>,
    pub zone: Zone,
    pub side: RinkSide,
}

/// An axis-aligned trigger volume behind a goal line, tested for puck containment.
#[derive(Debug, Clone)]
pub struct GoalTrigger {
    pub team: Team,
    pub center: Point3<f32>,
    pub half_extents: Vector3<f32>,
}

impl GoalTrigger {
    pub fn contains(&self, p: &Point3<f32>) -> bool {
        (p.x - self.center.x).abs() <= self.half_extents.x
            && (p.y - self.center.y).abs() <= self.half_extents.y
            && (p.z - self.center.z).abs() <= self.half_extents.z
    }
}

/// One team's spawn location for one on-ice role.
#[derive(Debug, Clone)]
pub struct SpawnPoint {
    pub position: Point3<f32>,
    pub facing_yaw: f32,
}

pub const PLAYER_SPAWN_Y: f32 = 1.75;
pub const PUCK_CENTER_Y: f32 = 1.1;

/// Generous bounding box margin outside of which the puck is considered out of bounds.
const OUT_OF_BOUNDS_MARGIN: f32 = 5.0;

#[derive(Debug, Clone)]
pub struct Rink {
    pub width: f32,
    pub length: f32,
    pub red_zone_blue_line: RinkLine,
    pub blue_zone_blue_line: RinkLine,
    pub faceoff_dots: Vec<FaceoffDot>,
    pub red_goal: GoalTrigger,
    pub blue_goal: GoalTrigger,
    pub red_spawns: Vec<(SkaterPosition, SpawnPoint)>,
    pub blue_spawns: Vec<(SkaterPosition, SpawnPoint)>,
    pub center_ice: Point3<f32>,
}

impl Default for Rink {
    fn default() -> Self {
        Self::regulation(30.0, 61.0)
    }
}

impl Rink {
    /// Build a rink with IIHF-proportioned dimensions, matching the default geometry
    /// used by every other implementation of this simulation.
    pub fn regulation(width: f32, length: f32) -> Self {
        let line_width = 0.3; // IIHF rule 17iii, 17iv
        let goal_line_distance = 4.0; // IIHF rule 17iv
        let blue_line_distance_neutral_zone_edge = 22.86; // IIHF rule 17v, 17vi
        let blue_line_distance_mid = blue_line_distance_neutral_zone_edge - line_width / 2.0;

        let center_x = width / 2.0;
        let center_z = length / 2.0;
        let red_zone_blueline_z = length - blue_line_distance_mid;
        let blue_zone_blueline_z = blue_line_distance_mid;

        let red_zone_blue_line = RinkLine {
            z: red_zone_blueline_z,
            width: line_width,
        };
        let blue_zone_blue_line = RinkLine {
            z: blue_zone_blueline_z,
            width: line_width,
        };

        let blue_goal = GoalTrigger {
            team: Team::Blue,
            center: Point3::new(center_x, 0.75, goal_line_distance - 0.75),
            half_extents: Vector3::new(1.25, 0.75, 0.9),
        };
        let red_goal = GoalTrigger {
            team: Team::Red,
            center: Point3::new(center_x, 0.75, length - goal_line_distance + 0.75),
            half_extents: Vector3::new(1.25, 0.75, 0.9),
        };

        let dot_offset = 7.0;
        let side_offset = 7.0;
        let faceoff_dots = vec![
            FaceoffDot {
                id: 0,
                position: Point3::new(center_x, 0.0, center_z),
                zone: Zone::Neutral,
                side: RinkSide::Left,
            },
            FaceoffDot {
                id: 1,
                position: Point3::new(center_x - side_offset, 0.0, red_zone_blueline_z - dot_offset),
                zone: Zone::Neutral,
                side: RinkSide::Left,
            },
            FaceoffDot {
                id: 2,
                position: Point3::new(center_x + side_offset, 0.0, red_zone_blueline_z - dot_offset),
                zone: Zone::Neutral,
                side: RinkSide::Right,
            },
            FaceoffDot {
                id: 3,
                position: Point3::new(center_x - side_offset, 0.0, blue_zone_blueline_z + dot_offset),
                zone: Zone::Neutral,
                side: RinkSide::Left,
            },
            FaceoffDot {
                id: 4,
                position: Point3::new(center_x + side_offset, 0.0, blue_zone_blueline_z + dot_offset),
                zone: Zone::Neutral,
                side: RinkSide::Right,
            },
            FaceoffDot {
                id: 5,
                position: Point3::new(center_x - side_offset, 0.0, length - goal_line_distance - dot_offset),
                zone: Zone::RedDefensive,
                side: RinkSide::Left,
            },
            FaceoffDot {
                id: 6,
                position: Point3::new(center_x + side_offset, 0.0, length - goal_line_distance - dot_offset),
                zone: Zone::RedDefensive,
                side: RinkSide::Right,
            },
            FaceoffDot {
                id: 7,
                position: Point3::new(center_x - side_offset, 0.0, goal_line_distance + dot_offset),
                zone: Zone::BlueDefensive,
                side: RinkSide::Left,
            },
        ];

        let red_spawns = role_spawns(Team::Red, center_x, length);
        let blue_spawns = role_spawns(Team::Blue, center_x, length);

        Rink {
            width,
            length,
            red_zone_blue_line,
            blue_zone_blue_line,
            faceoff_dots,
            red_goal,
            blue_goal,
            red_spawns,
            blue_spawns,
            center_ice: Point3::new(center_x, PUCK_CENTER_Y, center_z),
        }
    }

    pub fn classify_zone(&self, pos: &Point3<f32>) -> Zone {
        use std::cmp::Ordering::*;
        match (
            self.red_zone_blue_line.side_of(pos),
            self.blue_zone_blue_line.side_of(pos),
        ) {
            (Greater, _) => Zone::RedDefensive,
            (_, Less) => Zone::BlueDefensive,
            _ => Zone::Neutral,
        }
    }

    pub fn nearest_faceoff_dot(&self, zone: Zone, side: RinkSide) -> &FaceoffDot {
        self.faceoff_dots
            .iter()
            .filter(|d| d.zone == zone)
            .min_by(|a, b| {
                let key = |d: &&FaceoffDot| if d.side == side { 0 } else { 1 };
                key(a).cmp(&key(b))
            })
            .unwrap_or(&self.faceoff_dots[0])
    }

    pub fn goal_for(&self, team: Team) -> &GoalTrigger {
        // A team scores on the *other* team's goal.
        match team {
            Team::Red => &self.blue_goal,
            Team::Blue => &self.red_goal,
        }
    }

    pub fn is_out_of_bounds(&self, pos: &Point3<f32>) -> bool {
        pos.x < -OUT_OF_BOUNDS_MARGIN
            || pos.x > self.width + OUT_OF_BOUNDS_MARGIN
            || pos.z < -OUT_OF_BOUNDS_MARGIN
            || pos.z > self.length + OUT_OF_BOUNDS_MARGIN
            || pos.y < -OUT_OF_BOUNDS_MARGIN
    }

    pub fn spawns_for(&self, team: Team) -> &[(SkaterPosition, SpawnPoint)] {
        match team {
            Team::Red => &self.red_spawns,
            Team::Blue => &self.blue_spawns,
        }
    }

    pub fn spawn_for(&self, team: Team, position: SkaterPosition) -> &SpawnPoint {
        let spawns = self.spawns_for(team);
        &spawns
            .iter()
            .find(|(p, _)| *p == position)
            .unwrap_or(&spawns[0])
            .1
    }

    /// Load a rink from an on-disk JSON data file, validating it per the shape
    /// required by the rest of the core. This is the crate's one fatal startup path:
    /// a malformed rink file aborts before any tick runs.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Rink, SimError> {
        let text = fs::read_to_string(path.as_ref())
            .map_err(|e| SimError::RinkDataInvalid(format!("cannot read rink file: {e}")))?;
        let data: RinkData = serde_json::from_str(&text)
            .map_err(|e| SimError::RinkDataInvalid(format!("malformed rink json: {e}")))?;
        data.into_rink()
    }
}

fn role_spawns(team: Team, center_x: f32, length: f32) -> Vec<(SkaterPosition, SpawnPoint)> {
    // forward(yaw) faces -Z at yaw=0 and +Z at yaw=pi (see engine.rs); red faces +Z,
    // blue faces -Z, so the yaw is derived from attacking_sign rather than hardcoded.
    let facing_yaw = if team.attacking_sign() > 0.0 { std::f32::consts::PI } else { 0.0 };
    let own_blueline_offset = match team {
        Team::Red => length - 26.0,
        Team::Blue => 26.0,
    };
    let sign = match team {
        Team::Red => -1.0,
        Team::Blue => 1.0,
    };
    let goalie_z = match team {
        Team::Red => length - 3.0,
        Team::Blue => 3.0,
    };
    vec![
        (
            SkaterPosition::Goalie,
            SpawnPoint {
                position: Point3::new(center_x, PLAYER_SPAWN_Y, goalie_z),
                facing_yaw,
            },
        ),
        (
            SkaterPosition::Def1,
            SpawnPoint {
                position: Point3::new(center_x - 5.0, PLAYER_SPAWN_Y, own_blueline_offset + sign * 4.0),
                facing_yaw,
            },
        ),
        (
            SkaterPosition::Def2,
            SpawnPoint {
                position: Point3::new(center_x + 5.0, PLAYER_SPAWN_Y, own_blueline_offset + sign * 4.0),
                facing_yaw,
            },
        ),
        (
            SkaterPosition::Wing1,
            SpawnPoint {
                position: Point3::new(center_x - 8.0, PLAYER_SPAWN_Y, own_blueline_offset + sign * 10.0),
                facing_yaw,
            },
        ),
        (
            SkaterPosition::Wing2,
            SpawnPoint {
                position: Point3::new(center_x + 8.0, PLAYER_SPAWN_Y, own_blueline_offset + sign * 10.0),
                facing_yaw,
            },
        ),
        (
            SkaterPosition::Center,
            SpawnPoint {
                position: Point3::new(center_x, PLAYER_SPAWN_Y, own_blueline_offset + sign * 10.0),
                facing_yaw,
            },
        ),
    ]
}

/// On-disk representation of the rink data file described in the constants surface.
#[derive(Debug, Serialize, Deserialize)]
pub struct RinkData {
    pub width: f32,
    pub length: f32,
    pub blue_line_z: [f32; 2],
    pub faceoff_dots: Vec<RinkDataDot>,
    pub goals: [RinkDataGoal; 2],
    pub red_spawns: Vec<RinkDataSpawn>,
    pub blue_spawns: Vec<RinkDataSpawn>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RinkDataDot {
    pub id: u8,
    pub position: [f32; 3],
    pub zone: String,
    pub side: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RinkDataGoal {
    pub team: String,
    pub center: [f32; 3],
    pub half_extents: [f32; 3],
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RinkDataSpawn {
    pub role: String,
    pub position: [f32; 3],
    pub facing_yaw: f32,
}

impl RinkData {
    fn into_rink(self) -> Result<Rink, SimError> {
        if self.width <= 0.0 || self.length <= 0.0 {
            return Err(SimError::RinkDataInvalid(
                "rink bounds must be positive".into(),
            ));
        }
        if self.faceoff_dots.len() != 8 {
            return Err(SimError::RinkDataInvalid(format!(
                "expected 8 faceoff dots, found {}",
                self.faceoff_dots.len()
            )));
        }
        if self.red_spawns.len() < 6 || self.blue_spawns.len() < 6 {
            return Err(SimError::RinkDataInvalid(
                "expected at least 6 spawn points per team".into(),
            ));
        }

        let line_width = 0.3;
        let red_zone_blue_line = RinkLine {
            z: self.blue_line_z[0],
            width: line_width,
        };
        let blue_zone_blue_line = RinkLine {
            z: self.blue_line_z[1],
            width: line_width,
        };

        let faceoff_dots = self
            .faceoff_dots
            .iter()
            .map(|d| {
                let zone = parse_zone(&d.zone)?;
                let side = parse_side(&d.side)?;
                Ok(FaceoffDot {
                    id: d.id,
                    position: Point3::new(d.position[0], d.position[1], d.position[2]),
                    zone,
                    side,
                })
            })
            .collect::<Result<Vec<_>, SimError>>()?;

        let mut red_goal = None;
        let mut blue_goal = None;
        for g in &self.goals {
            let team = parse_team(&g.team)?;
            let trigger = GoalTrigger {
                team,
                center: Point3::new(g.center[0], g.center[1], g.center[2]),
                half_extents: Vector3::new(g.half_extents[0], g.half_extents[1], g.half_extents[2]),
            };
            match team {
                Team::Red => red_goal = Some(trigger),
                Team::Blue => blue_goal = Some(trigger),
            }
        }
        let red_goal = red_goal
            .ok_or_else(|| SimError::RinkDataInvalid("missing red goal".into()))?;
        let blue_goal = blue_goal
            .ok_or_else(|| SimError::RinkDataInvalid("missing blue goal".into()))?;

        let red_spawns = parse_spawns(&self.red_spawns)?;
        let blue_spawns = parse_spawns(&self.blue_spawns)?;

        Ok(Rink {
            width: self.width,
            length: self.length,
            red_zone_blue_line,
            blue_zone_blue_line,
            faceoff_dots,
            red_goal,
            blue_goal,
            red_spawns,
            blue_spawns,
            center_ice: Point3::new(self.width / 2.0, PUCK_CENTER_Y, self.length / 2.0),
        })
    }
}

fn parse_zone(s: &str) -> Result<Zone, SimError> {
    match s {
        "red_defensive" => Ok(Zone::RedDefensive),
        "neutral" => Ok(Zone::Neutral),
        "blue_defensive" => Ok(Zone::BlueDefensive),
        other => Err(SimError::RinkDataInvalid(format!("unknown zone {other}"))),
    }
}

fn parse_side(s: &str) -> Result<RinkSide, SimError> {
    match s {
        "left" => Ok(RinkSide::Left),
        "right" => Ok(RinkSide::Right),
        other => Err(SimError::RinkDataInvalid(format!("unknown side {other}"))),
    }
}

fn parse_team(s: &str) -> Result<Team, SimError> {
    match s {
        "red" => Ok(Team::Red),
        "blue" => Ok(Team::Blue),
        other => Err(SimError::RinkDataInvalid(format!("unknown team {other}"))),
    }
}

fn parse_position(s: &str) -> Result<SkaterPosition, SimError> {
    match s {
        "goalie" => Ok(SkaterPosition::Goalie),
        "def1" => Ok(SkaterPosition::Def1),
        "def2" => Ok(SkaterPosition::Def2),
        "wing1" => Ok(SkaterPosition::Wing1),
        "wing2" => Ok(SkaterPosition::Wing2),
        "center" => Ok(SkaterPosition::Center),
        other => Err(SimError::RinkDataInvalid(format!("unknown role {other}"))),
    }
}

fn parse_spawns(spawns: &[RinkDataSpawn]) -> Result<Vec<(SkaterPosition, SpawnPoint)>, SimError> {
    spawns
        .iter()
        .map(|s| {
            let role = parse_position(&s.role)?;
            Ok((
                role,
                SpawnPoint {
                    position: Point3::new(s.position[0], s.position[1], s.position[2]),
                    facing_yaw: s.facing_yaw,
                },
            ))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_center_ice_as_neutral() {
        let rink = Rink::default();
        assert_eq!(rink.classify_zone(&rink.center_ice), Zone::Neutral);
    }

    #[test]
    fn classifies_deep_in_each_zone() {
        let rink = Rink::default();
        let deep_red = Point3::new(rink.width / 2.0, 0.0, rink.length - 1.0);
        let deep_blue = Point3::new(rink.width / 2.0, 0.0, 1.0);
        assert_eq!(rink.classify_zone(&deep_red), Zone::RedDefensive);
        assert_eq!(rink.classify_zone(&deep_blue), Zone::BlueDefensive);
    }

    #[test]
    fn out_of_bounds_margin() {
        let rink = Rink::default();
        assert!(!rink.is_out_of_bounds(&rink.center_ice));
        assert!(rink.is_out_of_bounds(&Point3::new(-100.0, 0.0, 0.0)));
        assert!(rink.is_out_of_bounds(&Point3::new(rink.width / 2.0, -10.0, rink.length / 2.0)));
    }

    #[test]
    fn goal_for_scores_on_opposing_net() {
        let rink = Rink::default();
        assert_eq!(rink.goal_for(Team::Red).team, Team::Blue);
        assert_eq!(rink.goal_for(Team::Blue).team, Team::Red);
    }

    #[test]
    fn nearest_faceoff_dot_prefers_matching_side() {
        let rink = Rink::default();
        let dot = rink.nearest_faceoff_dot(Zone::RedDefensive, RinkSide::Left);
        assert_eq!(dot.zone, Zone::RedDefensive);
        assert_eq!(dot.side, RinkSide::Left);
    }

    #[test]
    fn every_role_has_a_spawn_for_both_teams() {
        let rink = Rink::default();
        for role in [
            SkaterPosition::Goalie,
            SkaterPosition::Def1,
            SkaterPosition::Def2,
            SkaterPosition::Wing1,
            SkaterPosition::Wing2,
            SkaterPosition::Center,
        ] {
            let _ = rink.spawn_for(Team::Red, role);
            let _ = rink.spawn_for(Team::Blue, role);
        }
    }

    #[test]
    fn rejects_rink_data_with_wrong_dot_count() {
        let json = r#"{
            "width": 30.0, "length": 61.0,
            "blue_line_z": [38.0, 23.0],
            "faceoff_dots": [],
            "goals": [
                {"team": "red", "center": [15.0, 0.75, 57.0], "half_extents": [1.25, 0.75, 0.9]},
                {"team": "blue", "center": [15.0, 0.75, 4.0], "half_extents": [1.25, 0.75, 0.9]}
            ],
            "red_spawns": [],
            "blue_spawns": []
        }"#;
        let data: RinkData = serde_json::from_str(json).unwrap();
        assert!(matches!(
            data.into_rink(),
            Err(SimError::RinkDataInvalid(_))
        ));
    }
}
