//! Canonical vessel state records.
//!
//! All sub-records share one timestamp per update tick: a [`VesselState`]
//! handed out by the coordinator is an atomic snapshot — no consumer ever
//! observes a half-updated tick.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Position {
    pub lat: f64,
    pub lon: f64,
    /// Course over ground, degrees true (derived from position deltas).
    pub cog_deg: f64,
    /// Speed over ground, knots (derived from position deltas).
    pub sog_kn: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Motion {
    /// Heading, degrees true.
    pub heading_deg: f64,
    /// Speed through water, knots.
    pub stw_kn: f64,
    /// Rate of turn, degrees per second (positive = turning to starboard).
    pub rot_deg_s: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Wind {
    /// True wind direction the wind blows *from*, degrees true.
    pub true_dir_deg: f64,
    pub true_speed_kn: f64,
    /// Apparent wind angle relative to the bow, [0°, 360°) clockwise.
    pub apparent_angle_deg: f64,
    pub apparent_speed_kn: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Environment {
    /// Direction the current sets *toward*, degrees true.
    pub current_set_deg: f64,
    pub current_drift_kn: f64,
    pub wave_height_m: f64,
    pub pressure_hpa: f64,
    pub water_temp_c: f64,
    pub air_temp_c: f64,
    /// Charted depth below transducer, metres.
    pub depth_m: f64,
}

impl Default for Environment {
    fn default() -> Self {
        Self {
            current_set_deg: 0.0,
            current_drift_kn: 0.0,
            wave_height_m: 0.3,
            pressure_hpa: 1013.2,
            water_temp_c: 16.0,
            air_temp_c: 19.0,
            depth_m: 22.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AutopilotMode {
    /// Hold the commanded target heading.
    #[default]
    Heading,
    /// Steer the polar-optimal upwind VMG angle.
    VmgUpwind,
    /// Steer the polar-optimal downwind VMG angle.
    VmgDownwind,
    /// No steering input; heading drifts with the last rate of turn decay.
    Standby,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Control {
    pub target_heading_deg: f64,
    /// Power fraction applied to the polar target speed, [0, 1].
    pub throttle: f64,
    pub autopilot: AutopilotMode,
}

impl Default for Control {
    fn default() -> Self {
        Self {
            target_heading_deg: 0.0,
            throttle: 1.0,
            autopilot: AutopilotMode::Heading,
        }
    }
}

/// One vessel's complete state at a single simulation timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct VesselState {
    /// Simulation-elapsed seconds at the tick that produced this snapshot.
    pub timestamp_s: f64,
    pub position: Position,
    pub motion: Motion,
    pub wind: Wind,
    pub environment: Environment,
    pub control: Control,
}

/// Normalize a compass angle into [0°, 360°).
pub fn normalize_deg(deg: f64) -> f64 {
    deg.rem_euclid(360.0)
}

/// Smallest signed difference `a − b` between two compass angles, in (−180°, 180°].
pub fn heading_delta_deg(a: f64, b: f64) -> f64 {
    let d = (a - b).rem_euclid(360.0);
    if d > 180.0 {
        d - 360.0
    } else {
        d
    }
}
