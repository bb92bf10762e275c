//! # broadcast
//!
//! Sentence fan-out to every connected consumer. One simulator loop publishes
//! into a single broadcast channel; the TCP, UDP, and WebSocket transports
//! each subscribe and relay. A transport that fails to bind degrades that
//! transport only — the loop and the other transports keep running.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;

pub mod tcp;
pub mod udp;
pub mod ws;

/// Per-transport counters plus listener health, shared with the status report.
#[derive(Debug, Default)]
pub struct HubStats {
    pub tcp_clients: AtomicUsize,
    pub udp_peers: AtomicUsize,
    pub ws_clients: AtomicUsize,
    pub tcp_healthy: AtomicBool,
    pub udp_healthy: AtomicBool,
    pub ws_healthy: AtomicBool,
    pub sentences_sent: AtomicU64,
}

impl HubStats {
    pub fn total_clients(&self) -> usize {
        self.tcp_clients.load(Ordering::Relaxed)
            + self.udp_peers.load(Ordering::Relaxed)
            + self.ws_clients.load(Ordering::Relaxed)
    }
}

/// Shared publishing end. Cloning is cheap; every transport holds one.
#[derive(Clone)]
pub struct BroadcastHub {
    tx: broadcast::Sender<Arc<str>>,
    stats: Arc<HubStats>,
}

impl BroadcastHub {
    pub fn new(fanout_capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(fanout_capacity);
        Self {
            tx,
            stats: Arc::new(HubStats::default()),
        }
    }

    /// Publish one sentence to every subscriber. The terminator is appended
    /// here so each transport writes a complete line in a single call.
    pub fn publish(&self, sentence: &str) {
        let line: Arc<str> = format!("{sentence}\r\n").into();
        // Send only fails with zero subscribers; the sentence still counts
        // as emitted by the simulator.
        let _ = self.tx.send(line);
        self.stats.sentences_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<str>> {
        self.tx.subscribe()
    }

    pub fn stats(&self) -> Arc<HubStats> {
        Arc::clone(&self.stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_reaches_every_subscriber_in_order() {
        let hub = BroadcastHub::new(16);
        let mut a = hub.subscribe();
        let mut b = hub.subscribe();

        hub.publish("$IIHDT,270.0,T*27");
        hub.publish("$IIMTW,16.0,C*14");

        for rx in [&mut a, &mut b] {
            assert_eq!(&*rx.recv().await.unwrap(), "$IIHDT,270.0,T*27\r\n");
            assert_eq!(&*rx.recv().await.unwrap(), "$IIMTW,16.0,C*14\r\n");
        }
        assert_eq!(hub.stats().sentences_sent.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn test_lagged_subscriber_sees_lagged_error() {
        let hub = BroadcastHub::new(2);
        let mut rx = hub.subscribe();
        for i in 0..5 {
            hub.publish(&format!("$IIROT,{i}.0,A*00"));
        }
        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Lagged(_))
        ));
    }
}
