//! WebSocket upgrade handling.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::{client::IntoClientRequest, http::HeaderValue, Message};

mod common;

use common::{start_echo_backend, start_proxy, Gate};

fn ws_request(port: u16, host: &str, path: &str) -> tokio_tungstenite::tungstenite::handshake::client::Request {
    let mut request = format!("ws://127.0.0.1:{}{}", port, path)
        .into_client_request()
        .unwrap();
    request
        .headers_mut()
        .insert("host", HeaderValue::from_str(host).unwrap());
    request
}

#[tokio::test]
async fn test_websocket_tunnel_echoes_messages() {
    let backend = start_echo_backend("ws", Gate::default()).await;
    let proxy = start_proxy([("chat.test/live", format!("PROXY:ws://{}", backend))]).await;

    // `/live/ws` reaches the backend as `/ws`.
    let (mut socket, response) = tokio_tungstenite::connect_async(ws_request(proxy.port(), "chat.test", "/live/ws"))
        .await
        .expect("WebSocket handshake through proxy failed");
    assert_eq!(response.status(), 101);

    for text in ["hello", "second message"] {
        socket.send(Message::text(text)).await.unwrap();
        let reply = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("no reply")
            .unwrap()
            .unwrap();
        assert_eq!(reply.to_text().unwrap(), text);
    }

    socket.close(None).await.unwrap();
    drop(socket);
    proxy.stop().await;
}

#[tokio::test]
async fn test_websocket_refused_for_redirect_and_miss() {
    let proxy = start_proxy([("go.test", "REDIRECT:elsewhere.example")]).await;

    let redirect = tokio_tungstenite::connect_async(ws_request(proxy.port(), "go.test", "/")).await;
    assert!(redirect.is_err());

    let miss = tokio_tungstenite::connect_async(ws_request(proxy.port(), "nobody.test", "/")).await;
    assert!(miss.is_err());

    proxy.stop().await;
}
