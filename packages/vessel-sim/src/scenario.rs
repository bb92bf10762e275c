//! Declarative scenarios and their tick-driven state machine.
//!
//! A scenario is a TOML document: a vessel profile reference, optional total
//! duration, environment base values, and an ordered list of phases. Each
//! phase carries a duration, control target values applied on entry, and a
//! list of timed events `{offset_s, command, value}` that fire exactly once.
//!
//! The engine moves `Loaded → Running(phase) → Completed | Aborted`. Phase
//! advance carries the elapsed-time remainder into the next phase so phases
//! stay contiguous regardless of tick size. Validation happens entirely at
//! load: a malformed scenario never transitions to `Running`.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::coordinator::InitialConditions;
use crate::profile::VesselProfile;
use crate::state::AutopilotMode;

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Error)]
pub enum InvalidScenario {
    #[error("scenario references unknown vessel profile {0:?}")]
    UnknownProfile(String),
    #[error("scenario has no phases")]
    NoPhases,
    #[error("phase {index} has non-positive duration {duration_s}s")]
    NonPositiveDuration { index: usize, duration_s: f64 },
    #[error("event at {offset_s}s falls outside phase {index} (duration {duration_s}s)")]
    EventOutsidePhase {
        index: usize,
        offset_s: f64,
        duration_s: f64,
    },
    #[error("unknown command {command:?} in phase {index}")]
    UnknownCommand { index: usize, command: String },
    #[error("bad value {value:?} for command {command:?}: {reason}")]
    BadCommandValue {
        command: String,
        value: String,
        reason: String,
    },
    #[error("declared duration {declared_s}s does not match phase total {total_s}s")]
    DurationMismatch { declared_s: f64, total_s: f64 },
    #[error("scenario document failed to parse: {0}")]
    Parse(String),
}

// ── Commands ──────────────────────────────────────────────────────────────────

/// Every control input a scenario can issue, dispatched through the
/// coordinator's single `apply_command` entry point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Command {
    SetTargetHeading(f64),
    AdjustHeading(f64),
    SetThrottle(f64),
    SetAutopilot(AutopilotMode),
    SetTrueWind { dir_deg: f64, speed_kn: f64 },
    SetCurrent { set_deg: f64, drift_kn: f64 },
}

impl Command {
    /// Parse the document form: a command name plus a string value.
    /// `set_wind`/`set_current` take `"direction@speed"`.
    fn parse(name: &str, value: &str) -> Result<Command, String> {
        let num = |v: &str| -> Result<f64, String> {
            v.trim()
                .parse::<f64>()
                .map_err(|_| format!("{v:?} is not a number"))
        };
        let pair = |v: &str| -> Result<(f64, f64), String> {
            let (a, b) = v
                .split_once('@')
                .ok_or_else(|| format!("{v:?} is not \"direction@speed\""))?;
            Ok((num(a)?, num(b)?))
        };
        match name {
            "set_heading" => Ok(Command::SetTargetHeading(num(value)?)),
            "adjust_heading" => Ok(Command::AdjustHeading(num(value)?)),
            "set_throttle" => Ok(Command::SetThrottle(num(value)?)),
            "set_autopilot" => match value {
                "heading" => Ok(Command::SetAutopilot(AutopilotMode::Heading)),
                "vmg_upwind" => Ok(Command::SetAutopilot(AutopilotMode::VmgUpwind)),
                "vmg_downwind" => Ok(Command::SetAutopilot(AutopilotMode::VmgDownwind)),
                "standby" => Ok(Command::SetAutopilot(AutopilotMode::Standby)),
                other => Err(format!("{other:?} is not an autopilot mode")),
            },
            "set_wind" => {
                let (dir_deg, speed_kn) = pair(value)?;
                Ok(Command::SetTrueWind { dir_deg, speed_kn })
            }
            "set_current" => {
                let (set_deg, drift_kn) = pair(value)?;
                Ok(Command::SetCurrent { set_deg, drift_kn })
            }
            _ => Err("unknown command".to_string()),
        }
    }
}

// ── Document model ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventSpec {
    pub offset_s: f64,
    pub command: String,
    #[serde(default)]
    pub value: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ControlTargets {
    pub target_heading_deg: Option<f64>,
    pub throttle: Option<f64>,
    pub autopilot: Option<AutopilotMode>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Phase {
    pub duration_s: f64,
    #[serde(default)]
    pub target: ControlTargets,
    #[serde(default)]
    pub events: Vec<EventSpec>,
}

/// Environment base values and start position for a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentSpec {
    pub lat: f64,
    pub lon: f64,
    pub heading_deg: f64,
    pub wind_dir_deg: f64,
    pub wind_speed_kn: f64,
    pub current_set_deg: f64,
    pub current_drift_kn: f64,
}

impl Default for EnvironmentSpec {
    fn default() -> Self {
        let d = InitialConditions::default();
        Self {
            lat: d.lat,
            lon: d.lon,
            heading_deg: d.heading_deg,
            wind_dir_deg: d.true_wind_dir_deg,
            wind_speed_kn: d.true_wind_speed_kn,
            current_set_deg: d.current_set_deg,
            current_drift_kn: d.current_drift_kn,
        }
    }
}

impl From<&EnvironmentSpec> for InitialConditions {
    fn from(e: &EnvironmentSpec) -> Self {
        InitialConditions {
            lat: e.lat,
            lon: e.lon,
            heading_deg: e.heading_deg,
            true_wind_dir_deg: e.wind_dir_deg,
            true_wind_speed_kn: e.wind_speed_kn,
            current_set_deg: e.current_set_deg,
            current_drift_kn: e.current_drift_kn,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default = "default_name")]
    pub name: String,
    pub vessel_profile: String,
    /// Optional declared total; must match the phase sum when present.
    pub duration_s: Option<f64>,
    #[serde(default)]
    pub environment: EnvironmentSpec,
    pub phases: Vec<Phase>,
}

fn default_name() -> String {
    "unnamed".to_string()
}

impl Scenario {
    pub fn from_toml_str(doc: &str) -> Result<Scenario, InvalidScenario> {
        toml::from_str(doc).map_err(|e| InvalidScenario::Parse(e.to_string()))
    }

    pub fn total_duration_s(&self) -> f64 {
        self.phases.iter().map(|p| p.duration_s).sum()
    }
}

// ── Compiled form ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct CompiledPhase {
    duration_s: f64,
    entry_commands: Vec<Command>,
    /// (offset_s, command), sorted by offset.
    events: Vec<(f64, Command)>,
}

// ── Engine ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EngineState {
    Loaded,
    Running { phase: usize },
    Completed,
    Aborted,
}

/// Result of one engine tick, in the style of a sequencer poll.
#[derive(Debug, Clone, PartialEq)]
pub enum ScenarioTick {
    /// Not running (still Loaded, or already Completed/Aborted).
    Idle,
    /// Still running; these commands became due this tick (possibly none).
    Commands(Vec<Command>),
    /// The final phase ended inside this tick; any last due commands included.
    Completed(Vec<Command>),
}

#[derive(Debug)]
pub struct ScenarioEngine {
    name: String,
    profile: VesselProfile,
    initial: InitialConditions,
    phases: Vec<CompiledPhase>,
    state: EngineState,
    elapsed_total_s: f64,
    elapsed_in_phase_s: f64,
    next_event_idx: usize,
}

impl ScenarioEngine {
    /// Validate and compile a scenario. Any failure here means the engine is
    /// never constructed — `Loaded` is only reachable for valid scenarios.
    pub fn load(scenario: &Scenario) -> Result<ScenarioEngine, InvalidScenario> {
        let profile = VesselProfile::builtin(&scenario.vessel_profile)
            .ok_or_else(|| InvalidScenario::UnknownProfile(scenario.vessel_profile.clone()))?;

        if scenario.phases.is_empty() {
            return Err(InvalidScenario::NoPhases);
        }

        let mut phases = Vec::with_capacity(scenario.phases.len());
        for (index, phase) in scenario.phases.iter().enumerate() {
            if phase.duration_s <= 0.0 {
                return Err(InvalidScenario::NonPositiveDuration {
                    index,
                    duration_s: phase.duration_s,
                });
            }

            let mut entry_commands = Vec::new();
            if let Some(h) = phase.target.target_heading_deg {
                entry_commands.push(Command::SetTargetHeading(h));
            }
            if let Some(t) = phase.target.throttle {
                entry_commands.push(Command::SetThrottle(t));
            }
            if let Some(m) = phase.target.autopilot {
                entry_commands.push(Command::SetAutopilot(m));
            }

            let mut events = Vec::with_capacity(phase.events.len());
            for ev in &phase.events {
                if !(0.0..=phase.duration_s).contains(&ev.offset_s) {
                    return Err(InvalidScenario::EventOutsidePhase {
                        index,
                        offset_s: ev.offset_s,
                        duration_s: phase.duration_s,
                    });
                }
                let cmd = Command::parse(&ev.command, &ev.value).map_err(|reason| {
                    if reason == "unknown command" {
                        InvalidScenario::UnknownCommand {
                            index,
                            command: ev.command.clone(),
                        }
                    } else {
                        InvalidScenario::BadCommandValue {
                            command: ev.command.clone(),
                            value: ev.value.clone(),
                            reason,
                        }
                    }
                })?;
                events.push((ev.offset_s, cmd));
            }
            events.sort_by(|a, b| a.0.total_cmp(&b.0));

            phases.push(CompiledPhase {
                duration_s: phase.duration_s,
                entry_commands,
                events,
            });
        }

        // Checked only once every phase is individually valid, so a broken
        // phase list is reported as its own defect, not as a total mismatch.
        if let Some(declared) = scenario.duration_s {
            let total = scenario.total_duration_s();
            if (declared - total).abs() > 1e-6 {
                return Err(InvalidScenario::DurationMismatch {
                    declared_s: declared,
                    total_s: total,
                });
            }
        }

        info!(
            "Scenario {:?} loaded: profile {}, {} phases, {:.0}s total",
            scenario.name,
            profile.name,
            phases.len(),
            scenario.total_duration_s()
        );

        Ok(ScenarioEngine {
            name: scenario.name.clone(),
            profile,
            initial: (&scenario.environment).into(),
            phases,
            state: EngineState::Loaded,
            elapsed_total_s: 0.0,
            elapsed_in_phase_s: 0.0,
            next_event_idx: 0,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn profile(&self) -> &VesselProfile {
        &self.profile
    }

    pub fn initial_conditions(&self) -> InitialConditions {
        self.initial
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn elapsed_s(&self) -> f64 {
        self.elapsed_total_s
    }

    pub fn phase_index(&self) -> Option<usize> {
        match self.state {
            EngineState::Running { phase } => Some(phase),
            _ => None,
        }
    }

    pub fn total_duration_s(&self) -> f64 {
        self.phases.iter().map(|p| p.duration_s).sum()
    }

    /// Begin the run. Only valid from `Loaded`; returns the first phase's
    /// entry commands.
    pub fn start(&mut self) -> Vec<Command> {
        if self.state != EngineState::Loaded {
            return Vec::new();
        }
        self.state = EngineState::Running { phase: 0 };
        self.elapsed_in_phase_s = 0.0;
        self.next_event_idx = 0;
        info!("Scenario {:?} running (phase 1/{})", self.name, self.phases.len());
        self.phases[0].entry_commands.clone()
    }

    /// Abandon the run (e.g. after a numeric anomaly in this vessel's tick).
    pub fn abort(&mut self) {
        if matches!(self.state, EngineState::Running { .. } | EngineState::Loaded) {
            info!("Scenario {:?} aborted at {:.1}s", self.name, self.elapsed_total_s);
            self.state = EngineState::Aborted;
        }
    }

    /// Advance scenario time by `dt` seconds. Events fire exactly once, on
    /// the first tick where elapsed-in-phase time reaches their offset; phase
    /// transitions carry the tick remainder so a large `dt` can cross several
    /// phases.
    pub fn tick(&mut self, dt: f64) -> ScenarioTick {
        let EngineState::Running { phase } = self.state else {
            return ScenarioTick::Idle;
        };
        let mut phase = phase;
        let mut commands = Vec::new();
        let mut remaining = dt.max(0.0);

        loop {
            let ph = &self.phases[phase];
            let target = (self.elapsed_in_phase_s + remaining).min(ph.duration_s);
            let advanced = target - self.elapsed_in_phase_s;
            remaining -= advanced;
            self.elapsed_in_phase_s = target;
            self.elapsed_total_s += advanced;

            // Pointer-based firing: each event fires at most once, in offset
            // order, never re-evaluated after firing.
            while self.next_event_idx < ph.events.len()
                && ph.events[self.next_event_idx].0 <= target
            {
                commands.push(ph.events[self.next_event_idx].1);
                self.next_event_idx += 1;
            }

            if self.elapsed_in_phase_s < ph.duration_s {
                return ScenarioTick::Commands(commands);
            }

            // Phase complete — advance or finish.
            if phase + 1 >= self.phases.len() {
                self.state = EngineState::Completed;
                info!("Scenario {:?} completed at {:.1}s", self.name, self.elapsed_total_s);
                return ScenarioTick::Completed(commands);
            }
            phase += 1;
            self.state = EngineState::Running { phase };
            self.elapsed_in_phase_s = 0.0;
            self.next_event_idx = 0;
            commands.extend(self.phases[phase].entry_commands.iter().copied());
            if remaining <= 0.0 {
                return ScenarioTick::Commands(commands);
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::{CoordinatedVessel, NoiseModel};
    use std::sync::Arc;

    fn two_phase_scenario() -> Scenario {
        // 60s holding 270°, then 30s with a +10° nudge ten seconds in.
        Scenario {
            name: "example".to_string(),
            vessel_profile: "J35".to_string(),
            duration_s: Some(90.0),
            environment: EnvironmentSpec::default(),
            phases: vec![
                Phase {
                    duration_s: 60.0,
                    target: ControlTargets {
                        target_heading_deg: Some(270.0),
                        ..Default::default()
                    },
                    events: vec![],
                },
                Phase {
                    duration_s: 30.0,
                    target: ControlTargets::default(),
                    events: vec![EventSpec {
                        offset_s: 10.0,
                        command: "adjust_heading".to_string(),
                        value: "+10".to_string(),
                    }],
                },
            ],
        }
    }

    #[test]
    fn test_example_scenario_at_70s() {
        let mut engine = ScenarioEngine::load(&two_phase_scenario()).unwrap();
        let mut vessel = CoordinatedVessel::new(
            Arc::new(engine.profile().clone()),
            engine.initial_conditions(),
            0.1,
            NoiseModel::off(),
            1,
        );
        for cmd in engine.start() {
            vessel.apply_command(&cmd);
        }

        let mut fired = 0;
        for _ in 0..700 {
            if let ScenarioTick::Commands(cmds) = engine.tick(0.1) {
                for cmd in cmds {
                    if matches!(cmd, Command::AdjustHeading(_)) {
                        fired += 1;
                    }
                    vessel.apply_command(&cmd);
                }
            }
            vessel.apply_tick(0.1).unwrap();
        }

        assert_eq!(engine.phase_index(), Some(1));
        assert_eq!(fired, 1, "adjust_heading must fire exactly once");
        let target = vessel.snapshot().control.target_heading_deg;
        assert!((target - 280.0).abs() < 1e-6, "target heading {target}");
    }

    #[test]
    fn test_completes_at_total_duration() {
        let mut engine = ScenarioEngine::load(&two_phase_scenario()).unwrap();
        engine.start();
        let mut ticks = 0;
        loop {
            ticks += 1;
            match engine.tick(0.1) {
                ScenarioTick::Completed(_) => break,
                ScenarioTick::Idle => panic!("engine went idle while running"),
                _ => {}
            }
            assert!(ticks < 1000, "never completed");
        }
        // 90s of phases at 0.1s ticks: completion within one tick of ΣD
        assert!((engine.elapsed_s() - 90.0).abs() < 0.1 + 1e-9);
        assert_eq!(engine.state(), EngineState::Completed);
        // Once completed, further ticks are inert
        assert_eq!(engine.tick(0.1), ScenarioTick::Idle);
        assert!((engine.elapsed_s() - 90.0).abs() < 0.1 + 1e-9);
    }

    #[test]
    fn test_large_tick_crosses_phases_with_remainder() {
        let mut engine = ScenarioEngine::load(&two_phase_scenario()).unwrap();
        engine.start();
        // One giant 70s tick lands 10s into phase 2 and fires its event
        let out = engine.tick(70.0);
        let ScenarioTick::Commands(cmds) = out else {
            panic!("expected Commands, got {out:?}");
        };
        assert!(cmds.contains(&Command::AdjustHeading(10.0)));
        assert_eq!(engine.phase_index(), Some(1));
        assert!((engine.elapsed_s() - 70.0).abs() < 1e-9);
    }

    #[test]
    fn test_event_does_not_refire_on_jittered_ticks() {
        let mut engine = ScenarioEngine::load(&two_phase_scenario()).unwrap();
        engine.start();
        engine.tick(65.0);
        let mut fired = 0;
        // Uneven ticks around the 10s offset in phase 2
        for dt in [4.0, 1.5, 0.1, 2.0, 3.0] {
            if let ScenarioTick::Commands(cmds) = engine.tick(dt) {
                fired += cmds
                    .iter()
                    .filter(|c| matches!(c, Command::AdjustHeading(_)))
                    .count();
            }
        }
        assert_eq!(fired, 1);
    }

    #[test]
    fn test_unknown_profile_rejected() {
        let mut s = two_phase_scenario();
        s.vessel_profile = "IMOCA60".to_string();
        assert_eq!(
            ScenarioEngine::load(&s).unwrap_err(),
            InvalidScenario::UnknownProfile("IMOCA60".to_string())
        );
    }

    #[test]
    fn test_structural_validation() {
        let mut s = two_phase_scenario();
        s.phases.clear();
        assert_eq!(ScenarioEngine::load(&s).unwrap_err(), InvalidScenario::NoPhases);

        // A zero-duration phase also throws the declared total off; the
        // phase-level defect must be the one reported.
        let mut s = two_phase_scenario();
        s.phases[0].duration_s = 0.0;
        assert!(matches!(
            ScenarioEngine::load(&s).unwrap_err(),
            InvalidScenario::NonPositiveDuration { index: 0, .. }
        ));

        let mut s = two_phase_scenario();
        s.phases[1].events[0].offset_s = 45.0;
        assert!(matches!(
            ScenarioEngine::load(&s).unwrap_err(),
            InvalidScenario::EventOutsidePhase { index: 1, .. }
        ));

        let mut s = two_phase_scenario();
        s.duration_s = Some(120.0);
        assert!(matches!(
            ScenarioEngine::load(&s).unwrap_err(),
            InvalidScenario::DurationMismatch { .. }
        ));

        let mut s = two_phase_scenario();
        s.phases[1].events[0].command = "ram_committee_boat".to_string();
        assert!(matches!(
            ScenarioEngine::load(&s).unwrap_err(),
            InvalidScenario::UnknownCommand { index: 1, .. }
        ));

        let mut s = two_phase_scenario();
        s.phases[1].events[0].value = "plenty".to_string();
        assert!(matches!(
            ScenarioEngine::load(&s).unwrap_err(),
            InvalidScenario::BadCommandValue { .. }
        ));
    }

    #[test]
    fn test_start_only_from_loaded() {
        let mut engine = ScenarioEngine::load(&two_phase_scenario()).unwrap();
        assert_eq!(engine.tick(1.0), ScenarioTick::Idle);
        let entry = engine.start();
        assert_eq!(entry, vec![Command::SetTargetHeading(270.0)]);
        assert!(engine.start().is_empty(), "second start is a no-op");
        engine.abort();
        assert_eq!(engine.state(), EngineState::Aborted);
        assert_eq!(engine.tick(1.0), ScenarioTick::Idle);
    }

    #[test]
    fn test_toml_document_format() {
        let doc = r#"
            name = "harbor_loop"
            vessel_profile = "J35"

            [environment]
            wind_dir_deg = 200.0
            wind_speed_kn = 15.0

            [[phases]]
            duration_s = 45.0
            target = { target_heading_deg = 90.0, throttle = 0.8 }

            [[phases.events]]
            offset_s = 20.0
            command = "set_wind"
            value = "210@18"

            [[phases]]
            duration_s = 15.0
            target = { autopilot = "vmg_upwind" }
        "#;
        let scenario = Scenario::from_toml_str(doc).unwrap();
        assert_eq!(scenario.name, "harbor_loop");
        assert_eq!(scenario.phases.len(), 2);
        assert_eq!(scenario.environment.wind_speed_kn, 15.0);

        let mut engine = ScenarioEngine::load(&scenario).unwrap();
        let entry = engine.start();
        assert!(entry.contains(&Command::SetTargetHeading(90.0)));
        assert!(entry.contains(&Command::SetThrottle(0.8)));

        let ScenarioTick::Commands(cmds) = engine.tick(25.0) else {
            panic!("expected commands");
        };
        assert!(cmds.contains(&Command::SetTrueWind {
            dir_deg: 210.0,
            speed_kn: 18.0
        }));
    }

    #[test]
    fn test_bad_toml_rejected() {
        assert!(matches!(
            Scenario::from_toml_str("phases = 12"),
            Err(InvalidScenario::Parse(_))
        ));
    }
}
