//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum app: one fallback handler receives every request
//! - Wire up middleware (tracing, request ID, panic boundary)
//! - Serve plain HTTP and, when configured, HTTPS from the same routing table
//! - Map match misses to 404 and dispatch failures to 500
//! - Build the outbound client from the proxy settings

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
    Extension, Router,
};
use axum_server::tls_rustls::RustlsConfig;
use tokio::net::TcpListener;
use tower_http::{
    catch_panic::CatchPanicLayer,
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::config::ProxySettings;
use crate::http::dispatch::{dispatch, not_found, refuse_upgrade};
use crate::http::request::{request_host, request_id, request_span, MakeRequestUuid};
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::routing::Router as RuleRouter;
use crate::security::headers::{is_websocket_upgrade, ForwardContext};

/// Time given to open HTTPS connections to finish after shutdown.
const HTTPS_DRAIN: Duration = Duration::from_secs(10);

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub router: Arc<RuleRouter>,
    pub client: reqwest::Client,
}

/// Facts about the listener a request arrived on.
#[derive(Debug, Clone, Copy)]
pub struct ListenerInfo {
    pub local_addr: SocketAddr,
    pub secure: bool,
}

/// Outbound client for PROXY targets.
pub fn build_client(settings: &ProxySettings) -> Result<reqwest::Client, reqwest::Error> {
    let redirect = if settings.follow_redirects {
        reqwest::redirect::Policy::default()
    } else {
        reqwest::redirect::Policy::none()
    };

    reqwest::Client::builder()
        .connect_timeout(settings.reaction_timeout())
        .read_timeout(settings.connection_timeout())
        .danger_accept_invalid_certs(!settings.verify_certificates)
        .redirect(redirect)
        .build()
}

/// HTTP server for the proxy.
pub struct HttpServer {
    state: AppState,
}

impl HttpServer {
    /// Create a server for a routing table.
    pub fn new(router: RuleRouter, settings: &ProxySettings) -> Result<Self, reqwest::Error> {
        Ok(Self {
            state: AppState {
                router: Arc::new(router),
                client: build_client(settings)?,
            },
        })
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Build the Axum app for one listener.
    pub fn app(&self, info: ListenerInfo) -> Router {
        Router::new()
            .fallback(handle_request)
            .with_state(self.state.clone())
            .layer(Extension(info))
            .layer(CatchPanicLayer::new())
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http().make_span_with(request_span::<Body>))
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// Serve until `shutdown` fires.
    ///
    /// `https` pairs the HTTPS listener with its (reloadable) TLS config.
    /// Shutdown is subscribed before this returns, so a trigger is never lost
    /// even if the future has not been polled yet.
    pub fn run(
        self,
        http: TcpListener,
        https: Option<(TcpListener, RustlsConfig)>,
        shutdown: &Shutdown,
    ) -> impl Future<Output = Result<(), std::io::Error>> + Send + 'static {
        let http_stop = shutdown.wait();
        let https_stop = shutdown.wait();

        async move {
            let http_info = ListenerInfo {
                local_addr: http.local_addr()?,
                secure: false,
            };
            tracing::info!(address = %http_info.local_addr, "HTTP server starting");

            let http_app = self.app(http_info).into_make_service_with_connect_info::<SocketAddr>();
            let http_server = async move { axum::serve(http, http_app).with_graceful_shutdown(http_stop).await };

            let https_server = match https {
                Some((listener, tls)) => {
                    let info = ListenerInfo {
                        local_addr: listener.local_addr()?,
                        secure: true,
                    };
                    tracing::info!(address = %info.local_addr, "HTTPS server starting");

                    let app = self.app(info).into_make_service_with_connect_info::<SocketAddr>();
                    let handle = axum_server::Handle::new();
                    let stop_handle = handle.clone();
                    tokio::spawn(async move {
                        https_stop.await;
                        stop_handle.graceful_shutdown(Some(HTTPS_DRAIN));
                    });

                    let server = axum_server::from_tcp_rustls(listener.into_std()?, tls).handle(handle);
                    Some(async move { server.serve(app).await })
                }
                None => None,
            };

            let https_server = async move {
                match https_server {
                    Some(server) => server.await,
                    None => Ok(()),
                }
            };

            tokio::try_join!(http_server, https_server)?;

            tracing::info!("HTTP server stopped");
            Ok(())
        }
    }
}

/// Single entry point for every request on every listener.
async fn handle_request(
    State(state): State<AppState>,
    Extension(listener): Extension<ListenerInfo>,
    ConnectInfo(remote_addr): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response {
    let start = Instant::now();
    let host = request_host(&request).unwrap_or_default();
    let path = request.uri().path().to_string();
    let websocket = is_websocket_upgrade(request.headers());
    let request_id = request_id(&request).to_string();

    let (data, resolver) = state.router.match_request(&host, &path);
    let Some(resolver) = resolver else {
        tracing::debug!(request_id = %request_id, host = %host, path = %path, "No rule matched");
        metrics::record_route_miss();
        metrics::record_request("NONE", StatusCode::NOT_FOUND.as_u16(), start);
        return if websocket {
            refuse_upgrade(StatusCode::NOT_FOUND)
        } else {
            not_found()
        };
    };

    let ctx = ForwardContext {
        remote_addr,
        local_addr: listener.local_addr,
        secure: listener.secure,
        host: &host,
    };

    let rule_type = resolver.target_type().as_str();
    let response = match dispatch(&state, &resolver, &data, request, &ctx, websocket).await {
        Ok(response) => response,
        Err(e) => {
            tracing::error!(
                request_id = %request_id,
                host = %host,
                path = %path,
                rule = %resolver.rule().raw(),
                error = %e,
                "Dispatch failed"
            );
            metrics::record_dispatch_error(e.kind());
            e.into_response()
        }
    };

    metrics::record_request(rule_type, response.status().as_u16(), start);
    response
}
