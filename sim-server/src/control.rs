//! control.rs — runtime control surface for the simulator loop.
//!
//! Transports never touch the vessel or scenario engine directly; they send a
//! [`ControlRequest`] over a channel and the loop services it between ticks,
//! replying on a oneshot. That keeps the tick path single-threaded.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};

use crate::broadcast::HubStats;

#[derive(Debug)]
pub enum ControlRequest {
    /// Parse and load a scenario document. Running state is replaced.
    Load {
        toml: String,
        reply: oneshot::Sender<Result<String, String>>,
    },
    /// Start the loaded scenario, or resume after a stop.
    Start {
        reply: oneshot::Sender<Result<(), String>>,
    },
    /// Pause emission and physics. The scenario keeps its position.
    Stop {
        reply: oneshot::Sender<Result<(), String>>,
    },
    Status {
        reply: oneshot::Sender<SimStatus>,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct TransportStatus {
    pub clients: usize,
    pub healthy: bool,
}

/// Snapshot of the whole simulator, serialized to clients as JSON.
#[derive(Debug, Clone, Serialize)]
pub struct SimStatus {
    pub scenario: Option<String>,
    /// LOADED | RUNNING | PAUSED | COMPLETED | ABORTED | IDLE
    pub state: String,
    pub phase: Option<usize>,
    pub elapsed_s: f64,
    pub tcp: TransportStatus,
    pub udp: TransportStatus,
    pub ws: TransportStatus,
    pub sentences_per_second: f64,
    /// Fraction of recent ticks whose spacing matched the tick period.
    pub coherence: f64,
    pub vessel_aborted: bool,
}

/// Cloneable sender half handed to every transport.
#[derive(Clone)]
pub struct ControlHandle {
    tx: mpsc::Sender<ControlRequest>,
}

impl ControlHandle {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ControlRequest>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    pub async fn load(&self, toml: String) -> Result<String, String> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(ControlRequest::Load { toml, reply })
            .await
            .map_err(|_| "simulator loop gone".to_string())?;
        rx.await.map_err(|_| "simulator loop gone".to_string())?
    }

    pub async fn start(&self) -> Result<(), String> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(ControlRequest::Start { reply })
            .await
            .map_err(|_| "simulator loop gone".to_string())?;
        rx.await.map_err(|_| "simulator loop gone".to_string())?
    }

    pub async fn stop(&self) -> Result<(), String> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(ControlRequest::Stop { reply })
            .await
            .map_err(|_| "simulator loop gone".to_string())?;
        rx.await.map_err(|_| "simulator loop gone".to_string())?
    }

    pub async fn status(&self) -> Option<SimStatus> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(ControlRequest::Status { reply }).await.ok()?;
        rx.await.ok()
    }
}

/// Minimal request servicer for replay mode: there is no scenario engine, but
/// `status()` must still answer with transport health, and scenario commands
/// get a proper refusal instead of a hung oneshot.
pub async fn serve_replay_status(stats: Arc<HubStats>, mut rx: mpsc::Receiver<ControlRequest>) {
    while let Some(req) = rx.recv().await {
        match req {
            ControlRequest::Load { reply, .. } => {
                let _ = reply.send(Err("replay mode: scenario control unavailable".to_string()));
            }
            ControlRequest::Start { reply } | ControlRequest::Stop { reply } => {
                let _ = reply.send(Err("replay mode: scenario control unavailable".to_string()));
            }
            ControlRequest::Status { reply } => {
                let _ = reply.send(SimStatus {
                    scenario: None,
                    state: "REPLAY".to_string(),
                    phase: None,
                    elapsed_s: 0.0,
                    tcp: TransportStatus {
                        clients: stats.tcp_clients.load(Ordering::Relaxed),
                        healthy: stats.tcp_healthy.load(Ordering::Relaxed),
                    },
                    udp: TransportStatus {
                        clients: stats.udp_peers.load(Ordering::Relaxed),
                        healthy: stats.udp_healthy.load(Ordering::Relaxed),
                    },
                    ws: TransportStatus {
                        clients: stats.ws_clients.load(Ordering::Relaxed),
                        healthy: stats.ws_healthy.load(Ordering::Relaxed),
                    },
                    sentences_per_second: 0.0,
                    coherence: 0.0,
                    vessel_aborted: false,
                });
            }
        }
    }
}
