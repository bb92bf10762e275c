//! tcp.rs — raw NMEA stream over TCP, one line per sentence.
//!
//! Every accepted client gets its own relay task draining a broadcast
//! subscription. A client whose subscription lags past the ring capacity is a
//! slow consumer and gets disconnected so it cannot stall the simulator.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{
    broadcast::{self, error::RecvError},
    watch,
};
use tracing::{info, warn};

use super::BroadcastHub;

/// Bind and serve. A bind failure marks the transport unhealthy and returns;
/// the rest of the server keeps running.
pub async fn serve(hub: BroadcastHub, addr: String, mut shutdown: watch::Receiver<bool>) {
    let stats = hub.stats();
    let listener = match TcpListener::bind(&addr).await {
        Ok(l) => {
            info!("🔌 TCP listener on {addr}");
            stats.tcp_healthy.store(true, Ordering::Relaxed);
            l
        }
        Err(e) => {
            warn!("TCP: could not bind {addr}: {e} — transport disabled");
            return;
        }
    };

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        info!("TCP client connected: {peer}");
                        // Subscribe here so no sentence published after the
                        // accept is missed by the new client.
                        let rx = hub.subscribe();
                        stats.tcp_clients.fetch_add(1, Ordering::Relaxed);
                        let stats = stats.clone();
                        let shutdown = shutdown.clone();
                        tokio::spawn(async move {
                            relay(stream, rx, shutdown).await;
                            stats.tcp_clients.fetch_sub(1, Ordering::Relaxed);
                            info!("TCP client gone: {peer}");
                        });
                    }
                    Err(e) => warn!("TCP accept error: {e}"),
                }
            }
            _ = shutdown.changed() => {
                info!("TCP listener shutting down");
                return;
            }
        }
    }
}

async fn relay(
    mut stream: TcpStream,
    mut rx: broadcast::Receiver<Arc<str>>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            line = rx.recv() => match line {
                Ok(line) => {
                    if stream.write_all(line.as_bytes()).await.is_err() {
                        return;
                    }
                }
                Err(RecvError::Lagged(n)) => {
                    warn!("TCP: slow consumer dropped {n} sentences behind — disconnecting");
                    return;
                }
                Err(RecvError::Closed) => return,
            },
            _ = shutdown.changed() => return,
        }
    }
}
