//! Backend for trying rules by hand.
//!
//! ```text
//! cargo run --example echo_backend -- 8081
//! rule-proxy --http-port 8080 'localhost/api=PROXY:127.0.0.1:8081'
//! curl -H 'Host: localhost' http://127.0.0.1:8080/api/hello
//! ```
//!
//! Plain requests are answered with the path and the forwarding headers the
//! proxy added; `/ws` echoes WebSocket messages.

use std::net::SocketAddr;

use axum::{
    extract::ws::{WebSocket, WebSocketUpgrade},
    http::{HeaderMap, Uri},
    response::IntoResponse,
    routing::{any, get},
    Router,
};

async fn echo(uri: Uri, headers: HeaderMap) -> String {
    let mut out = format!("path: {}\n", uri);
    for (name, value) in headers.iter() {
        if name.as_str().starts_with("x-forwarded-") {
            out.push_str(&format!("{}: {}\n", name, value.to_str().unwrap_or("?")));
        }
    }
    out
}

async fn ws(upgrade: WebSocketUpgrade) -> impl IntoResponse {
    upgrade.on_upgrade(|mut socket: WebSocket| async move {
        while let Some(Ok(message)) = socket.recv().await {
            if socket.send(message).await.is_err() {
                break;
            }
        }
    })
}

#[tokio::main]
async fn main() {
    let port = std::env::args()
        .nth(1)
        .and_then(|p| p.parse().ok())
        .unwrap_or(8081);

    let app = Router::new().route("/ws", get(ws)).fallback(any(echo));

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    println!("Echo backend listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
