//! The gameplay constants surface.
//!
//! Values below are the current production values; the source material this crate
//! was built from carried an older, abandoned generation of several of these
//! constants (e.g. a dash force of 30 instead of 12). Only the current values are
//! represented here — see `DESIGN.md` for the resolved open question.
//!
//! Every group can be overridden from an `.ini` file via [`GameplayConfig::load_from_ini`];
//! a section or key absent from the file keeps its compiled-in [`Default`].

use std::path::Path;

use ini::Ini;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct IceConfig {
    pub acceleration: f32,
    pub deceleration: f32,
    pub max_speed_multiplier: f32,
    pub direction_change_penalty: f32,
    pub sprint_acceleration_rate: f32,
    pub sprint_deceleration_rate: f32,
    pub min_speed_factor: f32,
    pub acceleration_curve_power: f32,
}

impl Default for IceConfig {
    fn default() -> Self {
        Self {
            acceleration: 0.1,
            deceleration: 0.98,
            max_speed_multiplier: 1.0,
            direction_change_penalty: 0.6,
            sprint_acceleration_rate: 0.02,
            sprint_deceleration_rate: 0.05,
            min_speed_factor: 0.6,
            acceleration_curve_power: 2.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HockeyStopConfig {
    pub duration_ms: u32,
    pub deceleration: f32,
    pub min_speed: f32,
    pub cooldown_ms: u32,
    pub max_angle_deg: f32,
}

impl Default for HockeyStopConfig {
    fn default() -> Self {
        Self {
            duration_ms: 400,
            deceleration: 0.85,
            min_speed: 4.0,
            cooldown_ms: 600,
            max_angle_deg: 70.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GoalieSlideConfig {
    pub duration_ms: u32,
    pub deceleration: f32,
    pub min_speed: f32,
    pub cooldown_ms: u32,
    pub max_angle_deg: f32,
    pub dash_force: f32,
}

impl Default for GoalieSlideConfig {
    fn default() -> Self {
        Self {
            duration_ms: 350,
            deceleration: 0.9,
            min_speed: 3.0,
            cooldown_ms: 500,
            max_angle_deg: 60.0,
            dash_force: 8.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SpinConfig {
    pub duration_ms: u32,
    pub cooldown_ms: u32,
    pub min_speed: f32,
    pub momentum_preservation: f32,
    pub boost_multiplier: f32,
    pub boost_duration_ms: u32,
}

impl Default for SpinConfig {
    fn default() -> Self {
        Self {
            duration_ms: 500,
            cooldown_ms: 1500,
            min_speed: 7.0,
            momentum_preservation: 0.7,
            boost_multiplier: 1.3,
            boost_duration_ms: 400,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DashConfig {
    pub duration_ms: u32,
    pub force: f32,
    pub cooldown_ms: u32,
    pub initial_boost: f32,
}

impl Default for DashConfig {
    fn default() -> Self {
        Self {
            duration_ms: 250,
            force: 12.0,
            cooldown_ms: 2000,
            initial_boost: 1.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BodyCheckConfig {
    pub cooldown_ms: u32,
    pub dash_force: f32,
    pub duration_ms: u32,
    pub ui_range: f32,
    pub angle_deg: f32,
    pub range: f32,
    pub input_debounce_ms: u32,
}

impl Default for BodyCheckConfig {
    fn default() -> Self {
        Self {
            cooldown_ms: 3000,
            dash_force: 14.0,
            duration_ms: 300,
            ui_range: 3.0,
            angle_deg: 45.0,
            range: 2.0,
            input_debounce_ms: 250,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StickCheckConfig {
    pub cooldown_ms: u32,
    pub range: f32,
    pub angle_deg: f32,
    pub input_debounce_ms: u32,
    pub stick_offset: f32,
    pub arming_delay_ms: u32,
    /// Distance from stick tip to puck below which a steal attempt actually connects.
    pub contact_radius: f32,
}

impl Default for StickCheckConfig {
    fn default() -> Self {
        Self {
            cooldown_ms: 500,
            range: 2.2,
            angle_deg: 60.0,
            input_debounce_ms: 250,
            stick_offset: 1.0,
            arming_delay_ms: 100,
            contact_radius: 0.8,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PuckForceConfig {
    pub min_pass: f32,
    pub max_pass: f32,
    pub min_shot: f32,
    pub max_shot: f32,
    pub shot_lift: f32,
    pub saucer_lift: f32,
    pub passing_power: f32,
    pub shot_force: f32,
    pub puck_offset: f32,
    pub lateral_offset: f32,
}

impl Default for PuckForceConfig {
    fn default() -> Self {
        Self {
            min_pass: 10.0,
            max_pass: 25.0,
            min_shot: 15.0,
            max_shot: 35.0,
            shot_lift: 0.4,
            saucer_lift: 0.1,
            passing_power: 1.0,
            shot_force: 1.0,
            puck_offset: 0.8,
            lateral_offset: 0.4,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GoalieConfig {
    pub puck_control_limit_ms: u32,
    pub warning_time_ms: u32,
    pub countdown_threshold_ms: u32,
    pub auto_pass_power: f32,
    /// Minimum puck speed toward the net, within the last touch before a goalie pickup,
    /// for the pickup to be counted as a save. Left as configuration per the open
    /// question on save-detection thresholds.
    pub save_velocity_threshold: f32,
}

impl Default for GoalieConfig {
    fn default() -> Self {
        Self {
            puck_control_limit_ms: 5000,
            warning_time_ms: 4000,
            countdown_threshold_ms: 1000,
            auto_pass_power: 0.15,
            save_velocity_threshold: 12.0,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct GameplayConfig {
    pub ice: IceConfig,
    pub hockey_stop: HockeyStopConfig,
    pub goalie_slide: GoalieSlideConfig,
    pub spin: SpinConfig,
    pub dash: DashConfig,
    pub body_check: BodyCheckConfig,
    pub stick_check: StickCheckConfig,
    pub puck_forces: PuckForceConfig,
    pub goalie: GoalieConfig,
}

impl GameplayConfig {
    /// Load overrides from an `.ini` file. Any section or key the file is missing
    /// keeps its compiled-in default; a malformed numeric value is logged and the
    /// default for that single field is kept rather than aborting the load.
    pub fn load_from_ini(path: impl AsRef<Path>) -> Self {
        let mut config = GameplayConfig::default();
        let path = path.as_ref();
        let ini = match Ini::load_from_file(path) {
            Ok(ini) => ini,
            Err(e) => {
                warn!("could not load gameplay config from {path:?}, using defaults: {e}");
                return config;
            }
        };

        macro_rules! section {
            ($section:expr, $target:expr, { $($key:ident => $field:ident),+ $(,)? }) => {
                if let Some(section) = ini.section(Some($section)) {
                    $(
                        if let Some(raw) = section.get(stringify!($key)) {
                            match raw.parse() {
                                Ok(v) => $target.$field = v,
                                Err(_) => warn!(
                                    "ignoring malformed {}.{} = {:?}",
                                    $section, stringify!($key), raw
                                ),
                            }
                        }
                    )+
                }
            };
        }

        section!("ice", config.ice, {
            acceleration => acceleration,
            deceleration => deceleration,
            max_speed_multiplier => max_speed_multiplier,
            direction_change_penalty => direction_change_penalty,
            sprint_acceleration_rate => sprint_acceleration_rate,
            sprint_deceleration_rate => sprint_deceleration_rate,
            min_speed_factor => min_speed_factor,
            acceleration_curve_power => acceleration_curve_power,
        });
        section!("hockey_stop", config.hockey_stop, {
            duration_ms => duration_ms,
            deceleration => deceleration,
            min_speed => min_speed,
            cooldown_ms => cooldown_ms,
            max_angle_deg => max_angle_deg,
        });
        section!("goalie_slide", config.goalie_slide, {
            duration_ms => duration_ms,
            deceleration => deceleration,
            min_speed => min_speed,
            cooldown_ms => cooldown_ms,
            max_angle_deg => max_angle_deg,
            dash_force => dash_force,
        });
        section!("spin", config.spin, {
            duration_ms => duration_ms,
            cooldown_ms => cooldown_ms,
            min_speed => min_speed,
            momentum_preservation => momentum_preservation,
            boost_multiplier => boost_multiplier,
            boost_duration_ms => boost_duration_ms,
        });
        section!("dash", config.dash, {
            duration_ms => duration_ms,
            force => force,
            cooldown_ms => cooldown_ms,
            initial_boost => initial_boost,
        });
        section!("body_check", config.body_check, {
            cooldown_ms => cooldown_ms,
            dash_force => dash_force,
            duration_ms => duration_ms,
            ui_range => ui_range,
            angle_deg => angle_deg,
            range => range,
            input_debounce_ms => input_debounce_ms,
        });
        section!("stick_check", config.stick_check, {
            cooldown_ms => cooldown_ms,
            range => range,
            angle_deg => angle_deg,
            input_debounce_ms => input_debounce_ms,
            stick_offset => stick_offset,
            arming_delay_ms => arming_delay_ms,
            contact_radius => contact_radius,
        });
        section!("puck_forces", config.puck_forces, {
            min_pass => min_pass,
            max_pass => max_pass,
            min_shot => min_shot,
            max_shot => max_shot,
            shot_lift => shot_lift,
            saucer_lift => saucer_lift,
            passing_power => passing_power,
            shot_force => shot_force,
            puck_offset => puck_offset,
            lateral_offset => lateral_offset,
        });
        section!("goalie", config.goalie, {
            puck_control_limit_ms => puck_control_limit_ms,
            warning_time_ms => warning_time_ms,
            countdown_threshold_ms => countdown_threshold_ms,
            auto_pass_power => auto_pass_power,
            save_velocity_threshold => save_velocity_threshold,
        });

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dash_defaults_match_current_production_values() {
        let config = GameplayConfig::default();
        assert_eq!(config.dash.duration_ms, 250);
        assert_eq!(config.dash.force, 12.0);
        assert_eq!(config.dash.cooldown_ms, 2000);
    }

    #[test]
    fn missing_ini_file_keeps_defaults() {
        let config = GameplayConfig::load_from_ini("/nonexistent/path/does-not-exist.ini");
        assert_eq!(config.dash.force, DashConfig::default().force);
    }

    #[test]
    fn ini_override_replaces_single_field() {
        let dir = std::env::temp_dir();
        let path = dir.join("hqm_sim_core_test_config.ini");
        std::fs::write(&path, "[dash]\nforce = 99.0\n").unwrap();
        let config = GameplayConfig::load_from_ini(&path);
        assert_eq!(config.dash.force, 99.0);
        assert_eq!(config.dash.duration_ms, DashConfig::default().duration_ms);
        let _ = std::fs::remove_file(&path);
    }
}
