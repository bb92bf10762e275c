//! Vessel physics and scenario engine for the marine telemetry simulator.
//!
//! Pure simulation logic with no I/O and no async: polar performance lookup,
//! momentum/turning dynamics, the coordinated single-writer vessel state, and
//! the declarative scenario state machine. The server binary owns the tick
//! loop and the wire side.

pub mod coordinator;
pub mod dynamics;
pub mod polar;
pub mod profile;
pub mod scenario;
pub mod state;

pub use coordinator::CoordinatedVessel;
pub use dynamics::NumericAnomaly;
pub use polar::PolarTable;
pub use profile::VesselProfile;
pub use scenario::{Command, InvalidScenario, Scenario, ScenarioEngine, ScenarioTick};
pub use state::VesselState;
