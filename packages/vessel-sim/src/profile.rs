//! Vessel profiles — immutable performance descriptors.
//!
//! A profile bundles the hull data, the inertia coefficients consumed by the
//! dynamics engine, and the vessel's polar table. Profiles are loaded once at
//! scenario load and shared read-only for the whole run.

use serde::{Deserialize, Serialize};

use crate::polar::{j35_polar, PolarTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplacementClass {
    Light,
    Moderate,
    Heavy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VesselProfile {
    pub name: String,
    pub hull_length_m: f64,
    pub beam_m: f64,
    pub displacement: DisplacementClass,
    /// First-order lag time constant toward polar target speed (seconds).
    /// Larger values mean more momentum — slower accelerations.
    pub accel_time_constant_s: f64,
    /// Hard ceiling on rate of turn (degrees per second).
    pub max_rate_of_turn_deg_s: f64,
    /// Time constant for the rate of turn itself to ramp (seconds); prevents
    /// discontinuous heading jumps when the target heading steps.
    pub turn_ramp_s: f64,
    pub polar: PolarTable,
}

impl VesselProfile {
    /// Look up a built-in profile by name (case-insensitive).
    pub fn builtin(name: &str) -> Option<VesselProfile> {
        match name.to_ascii_uppercase().as_str() {
            "J35" | "J/35" => Some(VesselProfile {
                name: "J35".to_string(),
                hull_length_m: 10.67,
                beam_m: 3.66,
                displacement: DisplacementClass::Moderate,
                accel_time_constant_s: 6.0,
                max_rate_of_turn_deg_s: 8.0,
                turn_ramp_s: 2.0,
                polar: j35_polar(),
            }),
            "CATALINA36" => Some(VesselProfile {
                name: "CATALINA36".to_string(),
                hull_length_m: 11.0,
                beam_m: 3.56,
                displacement: DisplacementClass::Heavy,
                accel_time_constant_s: 9.0,
                max_rate_of_turn_deg_s: 6.0,
                turn_ramp_s: 3.0,
                polar: j35_polar().scaled(0.88),
            }),
            _ => None,
        }
    }

    /// Load a profile from its TOML document.
    pub fn from_toml_str(doc: &str) -> Result<VesselProfile, toml::de::Error> {
        toml::from_str(doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_j35() {
        let p = VesselProfile::builtin("j35").expect("J35 is built in");
        assert_eq!(p.name, "J35");
        assert!(p.accel_time_constant_s > 0.0);
        assert!(p.max_rate_of_turn_deg_s > 0.0);
        assert!(p.polar.boat_speed(90.0, 12.0) > 5.0);
    }

    #[test]
    fn test_unknown_profile() {
        assert!(VesselProfile::builtin("open60").is_none());
    }

    #[test]
    fn test_toml_roundtrip() {
        let p = VesselProfile::builtin("J35").unwrap();
        let doc = toml::to_string(&p).unwrap();
        let back = VesselProfile::from_toml_str(&doc).unwrap();
        assert_eq!(back.name, "J35");
        assert_eq!(back.polar.boat_speed(90.0, 12.0), p.polar.boat_speed(90.0, 12.0));
    }
}
