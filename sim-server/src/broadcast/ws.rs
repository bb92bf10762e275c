//! ws.rs — WebSocket transport: sentence relay plus the JSON control surface.
//!
//! Each socket gets every NMEA line as a text frame. Incoming text frames are
//! control commands, `{ "cmd": "...", ... }`, answered inline so browser
//! dashboards can drive the simulator over the same connection. `/status` and
//! `/health` are plain HTTP for curl and load-balancer checks.

use std::sync::atomic::Ordering;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use serde_json::json;
use tokio::sync::{broadcast::error::RecvError, watch};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use super::BroadcastHub;
use crate::control::ControlHandle;

#[derive(Clone)]
struct WsState {
    hub: BroadcastHub,
    control: ControlHandle,
}

pub async fn serve(
    hub: BroadcastHub,
    control: ControlHandle,
    addr: String,
    mut shutdown: watch::Receiver<bool>,
) {
    let stats = hub.stats();
    let state = WsState { hub, control };

    let app = Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(|| async { "marine-sim ok" }))
        .route("/status", get(status_handler))
        .with_state(state)
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any));

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => {
            info!("🖥  WebSocket at ws://{addr}/ws");
            stats.ws_healthy.store(true, Ordering::Relaxed);
            l
        }
        Err(e) => {
            warn!("WS: could not bind {addr}: {e} — transport disabled");
            return;
        }
    };

    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        let _ = shutdown.changed().await;
    });
    if let Err(e) = server.await {
        warn!("WS server error: {e}");
    }
}

async fn status_handler(State(state): State<WsState>) -> Response {
    match state.control.status().await {
        Some(status) => axum::Json(status).into_response(),
        None => axum::Json(json!({ "error": "simulator loop gone" })).into_response(),
    }
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<WsState>) -> Response {
    ws.on_upgrade(move |socket| handle_ws(socket, state))
}

async fn handle_ws(mut socket: WebSocket, state: WsState) {
    let stats = state.hub.stats();
    // Subscribe before announcing the client, so anything published once the
    // count moves is guaranteed to reach this socket.
    let mut rx = state.hub.subscribe();
    stats.ws_clients.fetch_add(1, Ordering::Relaxed);

    loop {
        tokio::select! {
            line = rx.recv() => match line {
                Ok(line) => {
                    // Frames carry the bare sentence; CRLF is a stream artifact.
                    let text = line.trim_end().to_string();
                    if socket.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(n)) => {
                    warn!("WS: slow consumer dropped {n} sentences behind — disconnecting");
                    break;
                }
                Err(RecvError::Closed) => break,
            },
            msg = socket.recv() => match msg {
                Some(Ok(Message::Text(cmd))) => {
                    let reply = handle_command(&state.control, &cmd).await;
                    if socket.send(Message::Text(reply.to_string())).await.is_err() {
                        break;
                    }
                }
                Some(Ok(_)) => {}
                _ => break,
            },
        }
    }

    stats.ws_clients.fetch_sub(1, Ordering::Relaxed);
}

/// Commands are JSON: `{ "cmd": "load", "scenario": "<toml>" }`,
/// `{ "cmd": "start" }`, `{ "cmd": "stop" }`, `{ "cmd": "status" }`.
async fn handle_command(control: &ControlHandle, raw: &str) -> serde_json::Value {
    let v: serde_json::Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(e) => return json!({ "ok": false, "error": format!("bad json: {e}") }),
    };
    match v["cmd"].as_str().unwrap_or("") {
        "load" => {
            let Some(doc) = v["scenario"].as_str() else {
                return json!({ "ok": false, "error": "load needs a scenario field" });
            };
            match control.load(doc.to_string()).await {
                Ok(name) => json!({ "ok": true, "loaded": name }),
                Err(e) => json!({ "ok": false, "error": e }),
            }
        }
        "start" => match control.start().await {
            Ok(()) => json!({ "ok": true }),
            Err(e) => json!({ "ok": false, "error": e }),
        },
        "stop" => match control.stop().await {
            Ok(()) => json!({ "ok": true }),
            Err(e) => json!({ "ok": false, "error": e }),
        },
        "status" => match control.status().await {
            Some(status) => json!({ "ok": true, "status": status }),
            None => json!({ "ok": false, "error": "simulator loop gone" }),
        },
        other => json!({ "ok": false, "error": format!("unknown cmd: {other}") }),
    }
}
