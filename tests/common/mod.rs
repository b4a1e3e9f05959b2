//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::ws::{WebSocket, WebSocketUpgrade},
    http::{HeaderMap, Uri},
    response::IntoResponse,
    routing::{any, get},
    Json, Router,
};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::Notify;

use rule_proxy::config::ProxyConfig;
use rule_proxy::lifecycle::{self, Running, Shutdown};
use rule_proxy::routing::{RawRuleSet, Router as RuleRouter};

/// Gate used to hold a backend response until the test releases it.
#[derive(Clone, Default)]
pub struct Gate {
    pub arrived: Arc<Notify>,
    pub release: Arc<Notify>,
}

async fn bind() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

/// Start a backend that answers with its name, the path it saw and the
/// request headers as JSON. `/hold` waits on `gate`; `/ws` echoes WebSocket
/// messages.
pub async fn start_echo_backend(name: &'static str, gate: Gate) -> SocketAddr {
    let (listener, addr) = bind().await;

    let echo = move |uri: Uri, headers: HeaderMap| {
        let gate = gate.clone();
        async move {
            if uri.path() == "/hold" {
                gate.arrived.notify_one();
                gate.release.notified().await;
            }
            let headers: serde_json::Map<String, Value> = headers
                .iter()
                .map(|(k, v)| (k.to_string(), json!(v.to_str().unwrap_or_default())))
                .collect();
            Json(json!({ "backend": name, "uri": uri.to_string(), "headers": headers }))
        }
    };

    let app = Router::new().route("/ws", get(ws_echo)).fallback(any(echo));
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn ws_echo(upgrade: WebSocketUpgrade) -> impl IntoResponse {
    upgrade.on_upgrade(|mut socket: WebSocket| async move {
        while let Some(Ok(message)) = socket.recv().await {
            if socket.send(message).await.is_err() {
                break;
            }
        }
    })
}

/// A proxy running on an ephemeral loopback port.
pub struct TestProxy {
    pub addr: SocketAddr,
    pub https_addr: Option<SocketAddr>,
    pub shutdown: Shutdown,
    pub running: Running,
}

impl TestProxy {
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Client that resolves every given host name to the proxy.
    pub fn client(&self, hosts: &[&str]) -> reqwest::Client {
        let mut builder = reqwest::Client::builder()
            .no_proxy()
            .redirect(reqwest::redirect::Policy::none());
        for host in hosts {
            builder = builder.resolve(host, self.addr);
        }
        builder.build().unwrap()
    }

    pub fn url(&self, host: &str, path: &str) -> String {
        format!("http://{}:{}{}", host, self.port(), path)
    }

    /// Client for the HTTPS listener; accepts the self-signed certificate.
    pub fn https_client(&self, hosts: &[&str]) -> reqwest::Client {
        let addr = self.https_addr.expect("HTTPS listener not enabled");
        let mut builder = reqwest::Client::builder()
            .no_proxy()
            .danger_accept_invalid_certs(true)
            .redirect(reqwest::redirect::Policy::none());
        for host in hosts {
            builder = builder.resolve(host, addr);
        }
        builder.build().unwrap()
    }

    pub fn https_url(&self, host: &str, path: &str) -> String {
        let addr = self.https_addr.expect("HTTPS listener not enabled");
        format!("https://{}:{}{}", host, addr.port(), path)
    }

    pub async fn stop(self) {
        self.shutdown.trigger();
        self.running.wait().await.unwrap();
    }
}

/// Start a proxy serving `rules` over plain HTTP.
pub async fn start_proxy<O, T>(rules: impl IntoIterator<Item = (O, T)>) -> TestProxy
where
    O: Into<String>,
    T: Into<String>,
{
    start_proxy_with(rules, |_| {}).await
}

/// Start a proxy serving `rules`, with `configure` applied to the test
/// defaults first.
pub async fn start_proxy_with<O, T>(
    rules: impl IntoIterator<Item = (O, T)>,
    configure: impl FnOnce(&mut ProxyConfig),
) -> TestProxy
where
    O: Into<String>,
    T: Into<String>,
{
    let rules: RawRuleSet = rules.into_iter().collect();

    let mut config = ProxyConfig::default();
    config.listener.bind_address = "127.0.0.1".to_string();
    config.listener.http_port = 0;
    config.proxy.reaction_timeout_ms = 1_000;
    configure(&mut config);

    let router = RuleRouter::from_raw(&rules, config.routing.cache_capacity).unwrap();
    let shutdown = Shutdown::new();
    let running = lifecycle::start(&config, router, &shutdown).await.unwrap();

    TestProxy {
        addr: running.http_addr,
        https_addr: running.https_addr,
        shutdown,
        running,
    }
}
