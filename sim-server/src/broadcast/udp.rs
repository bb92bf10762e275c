//! udp.rs — datagram fan-out, one sentence per datagram.
//!
//! UDP has no connections, so peers register by sending the socket any
//! datagram; sending `bye` unregisters. Peers from the config's static list
//! receive sentences without a handshake. A send error drops that peer.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::sync::{broadcast::error::RecvError, watch, Mutex};
use tracing::{debug, info, warn};

use super::BroadcastHub;

pub async fn serve(
    hub: BroadcastHub,
    addr: String,
    static_peers: Vec<String>,
    mut shutdown: watch::Receiver<bool>,
) {
    let stats = hub.stats();
    let socket = match UdpSocket::bind(&addr).await {
        Ok(s) => {
            info!("📡 UDP socket on {addr}");
            stats.udp_healthy.store(true, Ordering::Relaxed);
            Arc::new(s)
        }
        Err(e) => {
            warn!("UDP: could not bind {addr}: {e} — transport disabled");
            return;
        }
    };

    let mut initial = HashSet::new();
    for peer in &static_peers {
        match peer.parse::<SocketAddr>() {
            Ok(sa) => {
                initial.insert(sa);
            }
            Err(e) => warn!("UDP: ignoring bad static peer {peer}: {e}"),
        }
    }
    stats.udp_peers.store(initial.len(), Ordering::Relaxed);
    let peers = Arc::new(Mutex::new(initial));

    // Registration task: any inbound datagram subscribes its sender.
    {
        let socket = Arc::clone(&socket);
        let peers = Arc::clone(&peers);
        let stats = Arc::clone(&stats);
        let mut shutdown = shutdown.clone();
        tokio::spawn(async move {
            let mut buf = [0u8; 256];
            loop {
                tokio::select! {
                    received = socket.recv_from(&mut buf) => match received {
                        Ok((len, src)) => {
                            let mut set = peers.lock().await;
                            if buf[..len].trim_ascii() == b"bye" {
                                if set.remove(&src) {
                                    info!("UDP peer unregistered: {src}");
                                }
                            } else if set.insert(src) {
                                info!("UDP peer registered: {src}");
                            }
                            stats.udp_peers.store(set.len(), Ordering::Relaxed);
                        }
                        Err(e) => warn!("UDP recv error: {e}"),
                    },
                    _ = shutdown.changed() => return,
                }
            }
        });
    }

    let mut rx = hub.subscribe();
    loop {
        tokio::select! {
            line = rx.recv() => match line {
                Ok(line) => {
                    // Snapshot the peer set so registration is never blocked
                    // behind a batch of sends.
                    let targets: Vec<SocketAddr> = peers.lock().await.iter().copied().collect();
                    let mut dead = Vec::new();
                    for peer in targets {
                        if let Err(e) = socket.send_to(line.as_bytes(), peer).await {
                            debug!("UDP send to {peer} failed: {e}");
                            dead.push(peer);
                        }
                    }
                    if !dead.is_empty() {
                        let mut set = peers.lock().await;
                        for peer in dead {
                            if set.remove(&peer) {
                                info!("UDP peer dropped after send failure: {peer}");
                            }
                        }
                        stats.udp_peers.store(set.len(), Ordering::Relaxed);
                    }
                }
                // Datagrams are lossy by contract; skip the gap and continue.
                Err(RecvError::Lagged(n)) => debug!("UDP fan-out skipped {n} sentences"),
                Err(RecvError::Closed) => return,
            },
            _ = shutdown.changed() => {
                info!("UDP socket shutting down");
                return;
            }
        }
    }
}
