//! # marine-sim
//!
//! Physics-driven marine telemetry simulator. One tokio task runs the vessel
//! physics and sentence scheduler at a fixed tick rate; TCP, UDP, and
//! WebSocket transports fan the resulting NMEA 0183 stream out to any number
//! of chartplotters, dashboards, and test harnesses.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use clap::Parser;
use tokio::sync::{mpsc, watch};
use tokio::time::interval;
use tracing::{error, info, warn};

use vessel_sim::coordinator::{CoordinatedVessel, NoiseModel};
use vessel_sim::scenario::{EngineState, Scenario, ScenarioEngine, ScenarioTick};

use sim_server::broadcast::{self, BroadcastHub};
use sim_server::config::FullConfig;
use sim_server::control::{self, ControlHandle, ControlRequest, SimStatus, TransportStatus};
use sim_server::replay;
use sim_server::scheduler::SentenceScheduler;

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "marine-sim", about = "NMEA 0183 marine telemetry simulator")]
struct Args {
    /// Config file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,
    /// Scenario document, overriding the config's choice
    #[arg(long)]
    scenario: Option<String>,
    /// Replay a recorded NMEA log instead of simulating
    #[arg(long)]
    replay: Option<String>,
    /// Replay emission rate, sentences per second
    #[arg(long, default_value = "10.0")]
    replay_rate: f64,
    /// Simulation speed multiplier (1.0 = real-time)
    #[arg(long)]
    speed: Option<f64>,
    /// Boot idle instead of starting the configured scenario
    #[arg(long)]
    no_autostart: bool,
}

// ── Main ──────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "marine_sim=info".into()),
        )
        .init();

    let args = Args::parse();
    let mut cfg = FullConfig::load_or_default(&args.config)?;
    if let Some(scenario) = &args.scenario {
        cfg.simulation.scenario = scenario.clone();
    }
    if let Some(speed) = args.speed {
        cfg.simulation.speed = speed;
    }
    if args.no_autostart {
        cfg.simulation.autostart = false;
    }

    let hub = BroadcastHub::new(cfg.network.fanout_capacity);
    let (control, control_rx) = ControlHandle::channel(16);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let tcp_addr = format!("{}:{}", cfg.network.bind_addr, cfg.network.tcp_port);
    let udp_addr = format!("{}:{}", cfg.network.bind_addr, cfg.network.udp_port);
    let ws_addr = format!("{}:{}", cfg.network.bind_addr, cfg.network.ws_port);

    tokio::spawn(broadcast::tcp::serve(
        hub.clone(),
        tcp_addr,
        shutdown_rx.clone(),
    ));
    tokio::spawn(broadcast::udp::serve(
        hub.clone(),
        udp_addr,
        cfg.network.static_udp_peers.clone(),
        shutdown_rx.clone(),
    ));
    tokio::spawn(broadcast::ws::serve(
        hub.clone(),
        control.clone(),
        ws_addr,
        shutdown_rx.clone(),
    ));

    if let Some(log_path) = args.replay {
        info!("⛵ marine-sim in replay mode");
        // No scenario engine in replay mode; status requests still get served.
        tokio::spawn(control::serve_replay_status(hub.stats(), control_rx));
        let replay_hub = hub.clone();
        let replay_shutdown = shutdown_rx.clone();
        let rate = args.replay_rate;
        tokio::spawn(async move {
            if let Err(e) = replay::run(replay_hub, &log_path, rate, replay_shutdown).await {
                error!("Replay failed: {e:#}");
            }
        });
    } else {
        info!(
            "⛵ marine-sim starting — {} Hz tick, talker {}, speed ×{}",
            cfg.simulation.tick_rate_hz, cfg.simulation.talker, cfg.simulation.speed
        );
        let loop_hub = hub.clone();
        let loop_cfg = cfg.clone();
        tokio::spawn(async move {
            sim_loop(loop_hub, loop_cfg, control_rx).await;
        });
    }

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    let _ = shutdown_tx.send(true);
    // Give relay tasks a moment to flush their last writes.
    tokio::time::sleep(Duration::from_millis(100)).await;
    Ok(())
}

// ── Simulation loop ───────────────────────────────────────────────────────────

struct SimLoop {
    engine: Option<ScenarioEngine>,
    vessel: Option<CoordinatedVessel>,
    paused: bool,
    cfg: FullConfig,
}

impl SimLoop {
    fn load_scenario(&mut self, doc: &str) -> Result<String, String> {
        let scenario = Scenario::from_toml_str(doc).map_err(|e| e.to_string())?;
        let engine = ScenarioEngine::load(&scenario).map_err(|e| e.to_string())?;
        let expected_dt =
            (1.0 / self.cfg.simulation.tick_rate_hz) * self.cfg.simulation.speed;
        let vessel = CoordinatedVessel::new(
            Arc::new(engine.profile().clone()),
            engine.initial_conditions(),
            expected_dt,
            NoiseModel::default(),
            self.cfg.simulation.seed,
        );
        let name = engine.name().to_string();
        info!("Loaded scenario {name:?} ({:.0}s)", engine.total_duration_s());
        self.engine = Some(engine);
        self.vessel = Some(vessel);
        self.paused = false;
        Ok(name)
    }

    fn start(&mut self) -> Result<(), String> {
        let Some(engine) = self.engine.as_mut() else {
            return Err("no scenario loaded".to_string());
        };
        match engine.state() {
            EngineState::Loaded => {
                let commands = engine.start();
                if let Some(vessel) = self.vessel.as_mut() {
                    for cmd in &commands {
                        vessel.apply_command(cmd);
                    }
                }
                self.paused = false;
                Ok(())
            }
            EngineState::Running { .. } if self.paused => {
                self.paused = false;
                info!("▶ Resumed");
                Ok(())
            }
            EngineState::Running { .. } => Err("already running".to_string()),
            EngineState::Completed => Err("scenario completed; load again".to_string()),
            EngineState::Aborted => Err("scenario aborted; load again".to_string()),
        }
    }

    fn stop(&mut self) -> Result<(), String> {
        match self.engine.as_ref().map(|e| e.state()) {
            Some(EngineState::Running { .. }) if !self.paused => {
                self.paused = true;
                info!("⏸ Paused");
                Ok(())
            }
            Some(EngineState::Running { .. }) => Err("already paused".to_string()),
            _ => Err("not running".to_string()),
        }
    }

    fn state_label(&self) -> String {
        match self.engine.as_ref().map(|e| e.state()) {
            None => "IDLE",
            Some(EngineState::Loaded) => "LOADED",
            Some(EngineState::Running { .. }) if self.paused => "PAUSED",
            Some(EngineState::Running { .. }) => "RUNNING",
            Some(EngineState::Completed) => "COMPLETED",
            Some(EngineState::Aborted) => "ABORTED",
        }
        .to_string()
    }
}

async fn sim_loop(hub: BroadcastHub, cfg: FullConfig, mut control_rx: mpsc::Receiver<ControlRequest>) {
    let tick_period = Duration::from_secs_f64(1.0 / cfg.simulation.tick_rate_hz);
    let mut ticker = interval(tick_period);
    let mut sched = SentenceScheduler::new(&cfg.sentences, &cfg.simulation.talker, Instant::now());
    let stats = hub.stats();

    let mut sim = SimLoop {
        engine: None,
        vessel: None,
        paused: false,
        cfg: cfg.clone(),
    };

    if cfg.simulation.autostart {
        match std::fs::read_to_string(&cfg.simulation.scenario) {
            Ok(doc) => match sim.load_scenario(&doc).and_then(|_| sim.start()) {
                Ok(()) => {}
                Err(e) => warn!("Autostart failed: {e}"),
            },
            Err(e) => warn!("Autostart: could not read {}: {e}", cfg.simulation.scenario),
        }
    }

    // Rolling sentences-per-second window for the status report.
    let mut sps = 0.0;
    let mut window_start = Instant::now();
    let mut window_base = stats.sentences_sent.load(Ordering::Relaxed);
    let mut vessel_aborted = false;
    let mut tick_count: u64 = 0;

    info!("⚓ Sim loop running at {} Hz ({} active sentence kinds)",
        cfg.simulation.tick_rate_hz, sched.active_kinds());

    loop {
        ticker.tick().await;
        tick_count += 1;

        // Service control requests between ticks.
        while let Ok(req) = control_rx.try_recv() {
            match req {
                ControlRequest::Load { toml, reply } => {
                    vessel_aborted = false;
                    let _ = reply.send(sim.load_scenario(&toml));
                }
                ControlRequest::Start { reply } => {
                    let _ = reply.send(sim.start());
                }
                ControlRequest::Stop { reply } => {
                    let _ = reply.send(sim.stop());
                }
                ControlRequest::Status { reply } => {
                    let engine = sim.engine.as_ref();
                    let _ = reply.send(SimStatus {
                        scenario: engine.map(|e| e.name().to_string()),
                        state: sim.state_label(),
                        phase: engine.and_then(|e| e.phase_index()),
                        elapsed_s: engine.map(|e| e.elapsed_s()).unwrap_or(0.0),
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
                        sentences_per_second: sps,
                        coherence: sim
                            .vessel
                            .as_ref()
                            .map(|v| v.coherence_score())
                            .unwrap_or(0.0),
                        vessel_aborted,
                    });
                }
            }
        }

        let running = matches!(
            sim.engine.as_ref().map(|e| e.state()),
            Some(EngineState::Running { .. }) | Some(EngineState::Completed)
        ) && !sim.paused;

        if running && !vessel_aborted {
            let dt = tick_period.as_secs_f64() * cfg.simulation.speed;

            // Scenario first, so commands due this tick shape this tick.
            if let (Some(engine), Some(vessel)) = (sim.engine.as_mut(), sim.vessel.as_mut()) {
                let commands = match engine.tick(dt) {
                    ScenarioTick::Commands(cmds) => cmds,
                    ScenarioTick::Completed(cmds) => {
                        info!("🏁 Scenario {:?} completed", engine.name());
                        cmds
                    }
                    ScenarioTick::Idle => Vec::new(),
                };
                for cmd in &commands {
                    vessel.apply_command(cmd);
                }

                if let Err(anomaly) = vessel.apply_tick(dt) {
                    warn!("{anomaly}: aborting run, holding last good state");
                    engine.abort();
                    vessel_aborted = true;
                }
            }
        }

        // Sentences flow whenever there is a vessel, even paused or aborted;
        // instruments on a real boat do not stop talking at the dock.
        if let Some(vessel) = sim.vessel.as_ref() {
            let snap = vessel.snapshot();
            let utc = Utc::now();
            for line in sched.poll(Instant::now(), &snap, &utc) {
                hub.publish(&line);
            }
        }

        let window = window_start.elapsed();
        if window >= Duration::from_secs(2) {
            let sent = stats.sentences_sent.load(Ordering::Relaxed);
            sps = (sent - window_base) as f64 / window.as_secs_f64();
            window_start = Instant::now();
            window_base = sent;
        }

        // Progress line roughly every 10 seconds of wall time.
        if tick_count % (cfg.simulation.tick_rate_hz as u64 * 10).max(1) == 0 {
            if let (Some(engine), Some(vessel)) = (sim.engine.as_ref(), sim.vessel.as_ref()) {
                let snap = vessel.snapshot();
                info!(
                    "⏱ {} {:.0}s/{:.0}s | hdg {:.0}° stw {:.1}kn | {:.1} sps to {} clients",
                    sim.state_label(),
                    engine.elapsed_s(),
                    engine.total_duration_s(),
                    snap.motion.heading_deg,
                    snap.motion.stw_kn,
                    sps,
                    stats.total_clients(),
                );
            }
        }
    }
}
