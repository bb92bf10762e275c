//! config.rs — TOML configuration for the simulator server.
//!
//! Loaded from `config.toml` next to the binary, falling back to the embedded
//! default so `marine-sim` runs out of the box.

use serde::Deserialize;
use tracing::warn;

#[derive(Debug, Clone, Deserialize)]
pub struct FullConfig {
    pub network: NetworkConfig,
    pub simulation: SimulationConfig,
    pub sentences: SentenceRates,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    pub bind_addr: String,
    /// TCP stream port. NMEA convention puts TCP and UDP on the same number.
    pub tcp_port: u16,
    pub udp_port: u16,
    pub ws_port: u16,
    /// Fan-out ring capacity per subscriber; a client this many sentences
    /// behind is a slow consumer and gets disconnected.
    pub fanout_capacity: usize,
    /// Datagram peers that receive sentences without a handshake.
    #[serde(default)]
    pub static_udp_peers: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SimulationConfig {
    /// Physics tick rate (Hz), independent of per-sentence emission rates.
    pub tick_rate_hz: f64,
    /// Simulation speed multiplier (1.0 = real-time).
    pub speed: f64,
    /// NMEA talker ID stamped on every sentence.
    pub talker: String,
    /// RNG seed for the environmental noise model.
    pub seed: u64,
    /// Load and start the configured scenario at boot.
    pub autostart: bool,
    /// Scenario document path.
    pub scenario: String,
}

/// Emission frequency per sentence kind, Hz. Zero disables a kind.
#[derive(Debug, Clone, Deserialize)]
pub struct SentenceRates {
    pub hdt_hz: f64,
    pub rot_hz: f64,
    pub vhw_hz: f64,
    pub mwv_relative_hz: f64,
    pub mwv_true_hz: f64,
    pub mwd_hz: f64,
    pub rmc_hz: f64,
    pub gga_hz: f64,
    pub vtg_hz: f64,
    pub dpt_hz: f64,
    pub mtw_hz: f64,
    pub xdr_hz: f64,
}

impl FullConfig {
    /// Read the given path, falling back to the embedded default config.
    pub fn load_or_default(path: &str) -> anyhow::Result<FullConfig> {
        let doc = match std::fs::read_to_string(path) {
            Ok(doc) => doc,
            Err(e) => {
                warn!("Could not read {path}: {e} — using built-in defaults");
                include_str!("../config.toml").to_string()
            }
        };
        Ok(toml::from_str(&doc)?)
    }
}
