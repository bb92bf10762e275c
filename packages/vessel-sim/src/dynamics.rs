//! Vessel dynamics engine — one pure integration step.
//!
//! Given the previous state, the vessel profile, and elapsed seconds, produce
//! the next state: polar target speed with first-order momentum lag, ramped
//! and bounded rate of turn, flat-earth position integration of the water
//! track plus the environment current vector, and apparent wind recomputed
//! from the true wind minus the boat velocity vector.
//!
//! Everything here is pure math over immutable snapshots; the coordinator
//! owns ordering and commits.

use thiserror::Error;

use crate::profile::VesselProfile;
use crate::state::{heading_delta_deg, normalize_deg, AutopilotMode, VesselState};

pub const KN_TO_MPS: f64 = 0.514444;
/// Metres per degree of latitude (small-angle flat-earth approximation,
/// acceptable for per-tick displacements).
pub const M_PER_DEG_LAT: f64 = 111_320.0;

/// Proportional steering gain: desired rate of turn in °/s per degree of
/// heading error, before the profile's hard ROT ceiling applies.
const STEER_GAIN: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("non-finite {field} produced by dynamics step")]
pub struct NumericAnomaly {
    pub field: &'static str,
}

/// Advance one vessel by `dt` seconds. `dt == 0` returns the previous state
/// unchanged (idempotent no-op). A non-finite result anywhere rejects the
/// whole step so the caller can hold last-known-good state.
pub fn step(
    prev: &VesselState,
    profile: &VesselProfile,
    dt: f64,
) -> Result<VesselState, NumericAnomaly> {
    if dt == 0.0 {
        return Ok(*prev);
    }
    let mut next = *prev;

    // 1. Polar target speed at the current true wind angle, scaled by throttle.
    let twa = heading_delta_deg(prev.wind.true_dir_deg, prev.motion.heading_deg).abs();
    let target_stw = profile.polar.boat_speed(twa, prev.wind.true_speed_kn)
        * prev.control.throttle.clamp(0.0, 1.0);

    // 2. First-order lag toward the target — no instantaneous speed changes.
    let alpha = (dt / profile.accel_time_constant_s).min(1.0);
    next.motion.stw_kn = prev.motion.stw_kn + (target_stw - prev.motion.stw_kn) * alpha;

    // 3. Turning. The autopilot mode picks the steering target; the desired
    //    rate of turn is proportional to heading error, capped by the profile,
    //    and the rate itself ramps rather than stepping.
    let desired_rot = match prev.control.autopilot {
        AutopilotMode::Standby => 0.0,
        mode => {
            let target_heading = steering_target(mode, prev, profile);
            let err = heading_delta_deg(target_heading, prev.motion.heading_deg);
            (err * STEER_GAIN).clamp(
                -profile.max_rate_of_turn_deg_s,
                profile.max_rate_of_turn_deg_s,
            )
        }
    };
    let rot_alpha = (dt / profile.turn_ramp_s).min(1.0);
    next.motion.rot_deg_s = prev.motion.rot_deg_s + (desired_rot - prev.motion.rot_deg_s) * rot_alpha;
    next.motion.heading_deg = normalize_deg(prev.motion.heading_deg + next.motion.rot_deg_s * dt);

    // 4. Position: water-track vector plus the current vector, integrated on
    //    a locally flat earth.
    let hdg = next.motion.heading_deg.to_radians();
    let stw_mps = next.motion.stw_kn * KN_TO_MPS;
    let set = prev.environment.current_set_deg.to_radians();
    let drift_mps = prev.environment.current_drift_kn * KN_TO_MPS;
    let ve = stw_mps * hdg.sin() + drift_mps * set.sin();
    let vn = stw_mps * hdg.cos() + drift_mps * set.cos();

    next.position.lat = prev.position.lat + vn * dt / M_PER_DEG_LAT;
    let m_per_deg_lon = M_PER_DEG_LAT * prev.position.lat.to_radians().cos().max(1e-6);
    next.position.lon = prev.position.lon + ve * dt / m_per_deg_lon;

    // 5. Apparent wind: true wind vector minus boat velocity vector, reported
    //    as speed plus angle off the bow.
    let (awa, aws) = apparent_wind(
        prev.wind.true_dir_deg,
        prev.wind.true_speed_kn,
        next.motion.heading_deg,
        next.motion.stw_kn,
    );
    next.wind.apparent_angle_deg = awa;
    next.wind.apparent_speed_kn = aws;

    check_finite(&next)?;
    Ok(next)
}

/// Steering target heading for the active autopilot mode.
fn steering_target(mode: AutopilotMode, state: &VesselState, profile: &VesselProfile) -> f64 {
    match mode {
        AutopilotMode::Heading | AutopilotMode::Standby => state.control.target_heading_deg,
        AutopilotMode::VmgUpwind | AutopilotMode::VmgDownwind => {
            let upwind = mode == AutopilotMode::VmgUpwind;
            let (angle, _) = profile.polar.vmg_optimal_angle(state.wind.true_speed_kn, upwind);
            // Two mirror-image candidates; stay on the closer tack.
            let stbd = normalize_deg(state.wind.true_dir_deg + angle);
            let port = normalize_deg(state.wind.true_dir_deg - angle);
            let h = state.motion.heading_deg;
            if heading_delta_deg(stbd, h).abs() <= heading_delta_deg(port, h).abs() {
                stbd
            } else {
                port
            }
        }
    }
}

/// Apparent wind (angle off the bow in [0°, 360°), speed in knots) from the
/// true wind and the boat's velocity through the water.
pub fn apparent_wind(
    true_dir_deg: f64,
    true_speed_kn: f64,
    heading_deg: f64,
    stw_kn: f64,
) -> (f64, f64) {
    let from = true_dir_deg.to_radians();
    // Wind velocity vector points opposite the "from" direction.
    let we = -true_speed_kn * from.sin();
    let wn = -true_speed_kn * from.cos();
    let hdg = heading_deg.to_radians();
    let be = stw_kn * hdg.sin();
    let bn = stw_kn * hdg.cos();

    let ae = we - be;
    let an = wn - bn;
    let aws = (ae * ae + an * an).sqrt();
    if aws < 1e-9 {
        return (0.0, 0.0);
    }
    let apparent_from = normalize_deg((-ae).atan2(-an).to_degrees());
    (normalize_deg(apparent_from - heading_deg), aws)
}

fn check_finite(state: &VesselState) -> Result<(), NumericAnomaly> {
    let checks: [(&'static str, f64); 8] = [
        ("latitude", state.position.lat),
        ("longitude", state.position.lon),
        ("heading", state.motion.heading_deg),
        ("speed through water", state.motion.stw_kn),
        ("rate of turn", state.motion.rot_deg_s),
        ("true wind speed", state.wind.true_speed_kn),
        ("apparent wind angle", state.wind.apparent_angle_deg),
        ("apparent wind speed", state.wind.apparent_speed_kn),
    ];
    for (field, value) in checks {
        if !value.is_finite() {
            return Err(NumericAnomaly { field });
        }
    }
    Ok(())
}
