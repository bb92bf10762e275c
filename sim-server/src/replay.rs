//! replay.rs — stream a recorded NMEA log instead of the physics engine.
//!
//! Every line is validated through the codec before it goes out; malformed
//! lines are logged and dropped so a corrupt capture cannot poison clients.

use std::time::Duration;

use anyhow::Context;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::broadcast::BroadcastHub;

pub async fn run(
    hub: BroadcastHub,
    path: &str,
    rate_hz: f64,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let log = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading replay log {path}"))?;

    let period = Duration::from_secs_f64(1.0 / rate_hz.max(0.1));
    let mut ticker = tokio::time::interval(period);
    let mut sent = 0usize;
    let mut dropped = 0usize;

    info!("⏪ Replaying {path} at {rate_hz} Hz");

    for line in log.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match nmea_codec::decode(line) {
            Ok(sentence) => {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = shutdown.changed() => break,
                }
                // Re-encode so the stream is canonical even if the capture
                // carried odd whitespace.
                hub.publish(&sentence.encode());
                sent += 1;
            }
            Err(e) => {
                warn!("Replay: dropping malformed line ({e}): {line}");
                dropped += 1;
            }
        }
    }

    info!("Replay finished: {sent} sentences sent, {dropped} dropped");
    Ok(())
}
