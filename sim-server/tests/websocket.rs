//! WebSocket transport tests: frame relay, the JSON control surface, slow
//! consumers, and mixed-transport fan-out under load.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

use sim_server::broadcast::{tcp, ws, BroadcastHub, HubStats};
use sim_server::control::{self, ControlHandle};

type WsClient = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

async fn wait_for(mut ready: impl FnMut() -> bool) {
    timeout(Duration::from_secs(5), async {
        while !ready() {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached within 5s");
}

/// Serve the WS transport on a fresh port with a replay-style control
/// responder behind it. The returned shutdown sender must stay alive for the
/// duration of the test.
fn spawn_ws(capacity: usize) -> (BroadcastHub, Arc<HubStats>, u16, watch::Sender<bool>) {
    let hub = BroadcastHub::new(capacity);
    let stats = hub.stats();
    let port = free_port();
    let (control, control_rx) = ControlHandle::channel(16);
    tokio::spawn(control::serve_replay_status(hub.stats(), control_rx));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(ws::serve(
        hub.clone(),
        control,
        format!("127.0.0.1:{port}"),
        shutdown_rx,
    ));
    (hub, stats, port, shutdown_tx)
}

async fn connect_ws(port: u16) -> WsClient {
    let (socket, _) = timeout(
        Duration::from_secs(5),
        connect_async(format!("ws://127.0.0.1:{port}/ws")),
    )
    .await
    .unwrap()
    .unwrap();
    socket
}

async fn next_text(socket: &mut WsClient) -> String {
    loop {
        let msg = timeout(Duration::from_secs(5), socket.next())
            .await
            .unwrap()
            .expect("socket closed early")
            .unwrap();
        if let Message::Text(text) = msg {
            return text;
        }
    }
}

#[tokio::test]
async fn test_ws_relays_sentences_without_line_terminators() {
    let (hub, stats, port, _shutdown) = spawn_ws(64);
    wait_for(|| stats.ws_healthy.load(Ordering::Relaxed)).await;

    let mut a = connect_ws(port).await;
    let mut b = connect_ws(port).await;
    wait_for(|| stats.ws_clients.load(Ordering::Relaxed) == 2).await;

    let lines = ["$IIHDT,270.0,T*27", "$IIMTW,16.0,C*14"];
    for line in lines {
        hub.publish(line);
        sleep(Duration::from_millis(5)).await;
    }

    for socket in [&mut a, &mut b] {
        for expected in lines {
            // Frames carry the bare sentence, no CRLF.
            assert_eq!(next_text(socket).await, expected);
        }
    }
}

#[tokio::test]
async fn test_ws_status_command_round_trips() {
    let (_hub, stats, port, _shutdown) = spawn_ws(64);
    wait_for(|| stats.ws_healthy.load(Ordering::Relaxed)).await;

    let mut socket = connect_ws(port).await;
    wait_for(|| stats.ws_clients.load(Ordering::Relaxed) == 1).await;

    socket
        .send(Message::Text(r#"{"cmd":"status"}"#.to_string()))
        .await
        .unwrap();
    let reply: serde_json::Value = serde_json::from_str(&next_text(&mut socket).await).unwrap();
    assert_eq!(reply["ok"], true);
    assert_eq!(reply["status"]["state"], "REPLAY");
    assert_eq!(reply["status"]["ws"]["clients"], 1);

    socket
        .send(Message::Text(r#"{"cmd":"start"}"#.to_string()))
        .await
        .unwrap();
    let reply: serde_json::Value = serde_json::from_str(&next_text(&mut socket).await).unwrap();
    assert_eq!(reply["ok"], false);
}

#[tokio::test]
async fn test_ws_slow_consumer_is_disconnected() {
    let (hub, stats, port, _shutdown) = spawn_ws(16);
    wait_for(|| stats.ws_healthy.load(Ordering::Relaxed)).await;

    let mut socket = connect_ws(port).await;
    wait_for(|| stats.ws_clients.load(Ordering::Relaxed) == 1).await;

    // Burst far past the ring capacity without yielding, so the relay task
    // wakes up already lagged.
    for i in 0..1000 {
        hub.publish(&format!("$IIROT,{i}.0,A*00"));
    }

    wait_for(|| stats.ws_clients.load(Ordering::Relaxed) == 0).await;

    // Drain whatever is in flight; the stream must end.
    let closed = timeout(Duration::from_secs(5), async {
        while let Some(msg) = socket.next().await {
            if msg.is_err() || matches!(msg, Ok(Message::Close(_))) {
                break;
            }
        }
    })
    .await;
    assert!(closed.is_ok());
}

#[tokio::test]
async fn test_mixed_transport_fanout_under_load() {
    const CLIENTS_PER_TRANSPORT: usize = 5;
    const SENTENCES: usize = 200;

    let (hub, stats, ws_port, _ws_shutdown) = spawn_ws(1024);
    let tcp_port = free_port();
    let (_tcp_shutdown, shutdown_rx) = watch::channel(false);
    tokio::spawn(tcp::serve(
        hub.clone(),
        format!("127.0.0.1:{tcp_port}"),
        shutdown_rx,
    ));
    wait_for(|| {
        stats.ws_healthy.load(Ordering::Relaxed) && stats.tcp_healthy.load(Ordering::Relaxed)
    })
    .await;

    let mut ws_clients = Vec::new();
    let mut tcp_clients = Vec::new();
    for _ in 0..CLIENTS_PER_TRANSPORT {
        ws_clients.push(connect_ws(ws_port).await);
        tcp_clients.push(TcpStream::connect(("127.0.0.1", tcp_port)).await.unwrap());
    }
    wait_for(|| {
        stats.ws_clients.load(Ordering::Relaxed) == CLIENTS_PER_TRANSPORT
            && stats.tcp_clients.load(Ordering::Relaxed) == CLIENTS_PER_TRANSPORT
    })
    .await;

    let lines: Vec<String> = (0..SENTENCES)
        .map(|i| format!("$IIHDT,{}.0,T*00", i % 360))
        .collect();
    for (i, line) in lines.iter().enumerate() {
        hub.publish(line);
        // Yield periodically so the relays can drain within ring capacity.
        if i % 20 == 0 {
            sleep(Duration::from_millis(1)).await;
        }
    }
    sleep(Duration::from_millis(50)).await;

    // Every client sees every sentence, in publish order, on both transports.
    for stream in tcp_clients {
        let mut reader = BufReader::new(stream);
        for expected in &lines {
            let mut got = String::new();
            timeout(Duration::from_secs(5), reader.read_line(&mut got))
                .await
                .unwrap()
                .unwrap();
            assert_eq!(got, format!("{expected}\r\n"));
        }
    }
    for mut socket in ws_clients {
        for expected in &lines {
            assert_eq!(&next_text(&mut socket).await, expected);
        }
    }

    // Nobody was dropped as a slow consumer.
    assert_eq!(stats.ws_clients.load(Ordering::Relaxed), CLIENTS_PER_TRANSPORT);
    assert_eq!(stats.tcp_clients.load(Ordering::Relaxed), CLIENTS_PER_TRANSPORT);
    assert_eq!(
        stats.sentences_sent.load(Ordering::Relaxed),
        SENTENCES as u64
    );
}
