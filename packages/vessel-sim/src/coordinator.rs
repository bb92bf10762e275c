//! Coordinated vessel state — the single source of truth for one vessel.
//!
//! Exactly one owner (the server tick loop) holds this mutably; everything
//! else consumes immutable [`VesselState`] snapshots. Per tick the
//! cross-parameter dependencies resolve in a fixed order so identical inputs
//! reproduce identical output:
//!
//!   environment → true wind → dynamics step → position integration →
//!   derived SOG/COG from the position delta
//!
//! A bounded snapshot history backs a temporal-coherence score (fraction of
//! tick intervals inside the jitter tolerance) used for diagnostics only.

use std::collections::VecDeque;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

use crate::dynamics::{self, NumericAnomaly, KN_TO_MPS, M_PER_DEG_LAT};
use crate::profile::VesselProfile;
use crate::scenario::Command;
use crate::state::{normalize_deg, VesselState};

const HISTORY_LEN: usize = 32;
/// Relaxation time for the wind oscillation (seconds).
const WIND_OSC_TAU: f64 = 45.0;

/// Gaussian jitter applied to the true wind so emitted data breathes like a
/// live masthead unit. `off()` gives bit-reproducible runs for tests.
#[derive(Debug, Clone, Copy)]
pub struct NoiseModel {
    pub wind_dir_sigma_deg: f64,
    pub wind_speed_sigma_kn: f64,
}

impl Default for NoiseModel {
    fn default() -> Self {
        Self {
            wind_dir_sigma_deg: 2.0,
            wind_speed_sigma_kn: 0.6,
        }
    }
}

impl NoiseModel {
    pub fn off() -> Self {
        Self {
            wind_dir_sigma_deg: 0.0,
            wind_speed_sigma_kn: 0.0,
        }
    }
}

/// Where and in what conditions a run begins.
#[derive(Debug, Clone, Copy)]
pub struct InitialConditions {
    pub lat: f64,
    pub lon: f64,
    pub heading_deg: f64,
    pub true_wind_dir_deg: f64,
    pub true_wind_speed_kn: f64,
    pub current_set_deg: f64,
    pub current_drift_kn: f64,
}

impl Default for InitialConditions {
    fn default() -> Self {
        Self {
            lat: 48.1173,
            lon: -122.7604,
            heading_deg: 0.0,
            true_wind_dir_deg: 225.0,
            true_wind_speed_kn: 12.0,
            current_set_deg: 0.0,
            current_drift_kn: 0.0,
        }
    }
}

pub struct CoordinatedVessel {
    profile: Arc<VesselProfile>,
    state: VesselState,
    elapsed_s: f64,
    tick_count: u64,
    history: VecDeque<VesselState>,
    dt_history: VecDeque<f64>,
    /// Nominal tick period used by the coherence score.
    expected_dt_s: f64,
    jitter_tolerance: f64,
    noise: NoiseModel,
    rng: StdRng,
    // Commanded bases the oscillation jitters around
    wind_base_dir_deg: f64,
    wind_base_speed_kn: f64,
    wind_osc_dir: f64,
    wind_osc_speed: f64,
    wave_base_m: f64,
}

impl CoordinatedVessel {
    pub fn new(
        profile: Arc<VesselProfile>,
        start: InitialConditions,
        expected_dt_s: f64,
        noise: NoiseModel,
        seed: u64,
    ) -> Self {
        let mut state = VesselState::default();
        state.position.lat = start.lat;
        state.position.lon = start.lon;
        state.motion.heading_deg = normalize_deg(start.heading_deg);
        state.control.target_heading_deg = state.motion.heading_deg;
        state.wind.true_dir_deg = normalize_deg(start.true_wind_dir_deg);
        state.wind.true_speed_kn = start.true_wind_speed_kn.max(0.0);
        state.environment.current_set_deg = normalize_deg(start.current_set_deg);
        state.environment.current_drift_kn = start.current_drift_kn.max(0.0);
        let wave_base_m = state.environment.wave_height_m;

        Self {
            profile,
            state,
            elapsed_s: 0.0,
            tick_count: 0,
            history: VecDeque::with_capacity(HISTORY_LEN),
            dt_history: VecDeque::with_capacity(HISTORY_LEN),
            expected_dt_s,
            jitter_tolerance: 0.25,
            noise,
            rng: StdRng::seed_from_u64(seed),
            wind_base_dir_deg: normalize_deg(start.true_wind_dir_deg),
            wind_base_speed_kn: start.true_wind_speed_kn.max(0.0),
            wind_osc_dir: 0.0,
            wind_osc_speed: 0.0,
            wave_base_m,
        }
    }

    pub fn profile(&self) -> &VesselProfile {
        &self.profile
    }

    /// Immutable copy of the current tick's state. All sub-records carry the
    /// same timestamp — atomic snapshot semantics.
    pub fn snapshot(&self) -> VesselState {
        self.state
    }

    pub fn elapsed_s(&self) -> f64 {
        self.elapsed_s
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn history(&self) -> impl Iterator<Item = &VesselState> {
        self.history.iter()
    }

    /// Fraction of recent tick intervals inside the configured jitter
    /// tolerance. Diagnostics only, never correctness.
    pub fn coherence_score(&self) -> f64 {
        if self.dt_history.is_empty() {
            return 1.0;
        }
        let tol = self.expected_dt_s * self.jitter_tolerance;
        let ok = self
            .dt_history
            .iter()
            .filter(|&&dt| (dt - self.expected_dt_s).abs() <= tol)
            .count();
        ok as f64 / self.dt_history.len() as f64
    }

    /// Advance the vessel by `dt` seconds. On a numeric anomaly nothing is
    /// committed: the last-known-good state is held and the error returned so
    /// the caller can abandon this vessel without touching others.
    pub fn apply_tick(&mut self, dt: f64) -> Result<VesselState, NumericAnomaly> {
        if dt <= 0.0 {
            return Ok(self.state);
        }

        let prev = self.state;
        let mut working = prev;

        // 1. Environment
        self.evolve_environment(&mut working, dt);

        // 2. True wind (base + bounded oscillation)
        self.evolve_wind(&mut working, dt);

        // 3–4. Dynamics step (speed, turning, position, apparent wind)
        let mut next = dynamics::step(&working, &self.profile, dt)?;

        // 5. Derived SOG/COG from the position delta
        let dn = (next.position.lat - prev.position.lat) * M_PER_DEG_LAT;
        let de = (next.position.lon - prev.position.lon)
            * M_PER_DEG_LAT
            * prev.position.lat.to_radians().cos();
        let sog_kn = (dn * dn + de * de).sqrt() / dt / KN_TO_MPS;
        next.position.sog_kn = sog_kn;
        next.position.cog_deg = if sog_kn > 0.05 {
            normalize_deg(de.atan2(dn).to_degrees())
        } else {
            prev.position.cog_deg
        };

        self.elapsed_s += dt;
        next.timestamp_s = self.elapsed_s;

        if self.history.len() == HISTORY_LEN {
            self.history.pop_front();
        }
        self.history.push_back(next);
        if self.dt_history.len() == HISTORY_LEN {
            self.dt_history.pop_front();
        }
        self.dt_history.push_back(dt);

        self.tick_count += 1;
        self.state = next;
        Ok(next)
    }

    /// Single entry point for all scenario control commands.
    pub fn apply_command(&mut self, cmd: &Command) {
        let control = &mut self.state.control;
        match *cmd {
            Command::SetTargetHeading(deg) => {
                control.target_heading_deg = normalize_deg(deg);
            }
            Command::AdjustHeading(delta) => {
                control.target_heading_deg = normalize_deg(control.target_heading_deg + delta);
            }
            Command::SetThrottle(t) => {
                control.throttle = t.clamp(0.0, 1.0);
            }
            Command::SetAutopilot(mode) => {
                control.autopilot = mode;
            }
            Command::SetTrueWind { dir_deg, speed_kn } => {
                self.wind_base_dir_deg = normalize_deg(dir_deg);
                self.wind_base_speed_kn = speed_kn.max(0.0);
            }
            Command::SetCurrent { set_deg, drift_kn } => {
                self.state.environment.current_set_deg = normalize_deg(set_deg);
                self.state.environment.current_drift_kn = drift_kn.max(0.0);
            }
        }
    }

    fn evolve_environment(&mut self, working: &mut VesselState, _dt: f64) {
        let t = self.elapsed_s;
        let env = &mut working.environment;
        // Low-frequency swell over the base sea state
        env.wave_height_m = (self.wave_base_m + 0.15 * (t / 11.0).sin()).max(0.0);
        // Slow barometric breathing, centimetre-scale seabed undulation
        env.pressure_hpa = 1013.2 + 1.5 * (t / 3600.0).sin();
        env.depth_m = (22.0 + 4.0 * (t / 90.0).sin()).max(1.0);
    }

    fn evolve_wind(&mut self, working: &mut VesselState, dt: f64) {
        let decay = (-dt / WIND_OSC_TAU).exp();
        if self.noise.wind_dir_sigma_deg > 0.0 {
            let dist = Normal::new(0.0, self.noise.wind_dir_sigma_deg * dt.sqrt())
                .unwrap_or(Normal::new(0.0, 1e-9).unwrap());
            self.wind_osc_dir = (self.wind_osc_dir * decay + dist.sample(&mut self.rng))
                .clamp(-3.0 * self.noise.wind_dir_sigma_deg, 3.0 * self.noise.wind_dir_sigma_deg);
        }
        if self.noise.wind_speed_sigma_kn > 0.0 {
            let dist = Normal::new(0.0, self.noise.wind_speed_sigma_kn * dt.sqrt())
                .unwrap_or(Normal::new(0.0, 1e-9).unwrap());
            self.wind_osc_speed = (self.wind_osc_speed * decay + dist.sample(&mut self.rng))
                .clamp(-3.0 * self.noise.wind_speed_sigma_kn, 3.0 * self.noise.wind_speed_sigma_kn);
        }
        working.wind.true_dir_deg = normalize_deg(self.wind_base_dir_deg + self.wind_osc_dir);
        working.wind.true_speed_kn = (self.wind_base_speed_kn + self.wind_osc_speed).max(0.0);
    }
}
