//! Executes a matched resolver.
//!
//! # Responsibilities
//! - PROXY: forward HTTP requests and tunnel WebSocket upgrades to the
//!   selected backend
//! - STATIC: hand the request to the static file adapter
//! - REDIRECT: answer 301 with the computed location
//!
//! # Design Decisions
//! - Bodies are streamed in both directions, never buffered
//! - The least-connections guard travels with the response body (HTTP) or
//!   the tunnel task (WebSocket) and is released when either ends
//! - Upgrades are refused for STATIC and REDIRECT rules

use axum::body::{Body, HttpBody};
use axum::http::{
    header::{CONNECTION, HOST},
    HeaderValue, Request, StatusCode, Version,
};
use axum::response::{IntoResponse, Response};
use futures_util::StreamExt;
use hyper::upgrade::OnUpgrade;
use hyper_util::rt::TokioIo;

use crate::error::DispatchError;
use crate::http::server::AppState;
use crate::http::static_files::serve_static;
use crate::load_balancer::TargetGuard;
use crate::observability::metrics;
use crate::routing::{Action, ProxyDispatch, RequestData, Resolver};
use crate::security::headers::{inject_forwarded_headers, strip_hop_by_hop, ForwardContext};

/// The core's own 404 response.
pub fn not_found() -> Response {
    (StatusCode::NOT_FOUND, "Not Found").into_response()
}

/// Answer to an upgrade request nothing will accept.
pub fn refuse_upgrade(status: StatusCode) -> Response {
    let mut response = status.into_response();
    response.headers_mut().insert(CONNECTION, HeaderValue::from_static("close"));
    response
}

/// Serve a request with the resolver that matched it.
pub async fn dispatch(
    state: &AppState,
    resolver: &Resolver,
    data: &RequestData,
    request: Request<Body>,
    ctx: &ForwardContext<'_>,
    websocket: bool,
) -> Result<Response, DispatchError> {
    match resolver.resolve(data)? {
        Action::Proxy(target) => {
            if websocket {
                tunnel(state, target, request, ctx).await
            } else {
                forward(state, target, request, ctx).await
            }
        }
        Action::Static { .. } | Action::Redirect { .. } if websocket => {
            tracing::debug!(rule = %resolver.rule().raw(), "Upgrade refused");
            Ok(refuse_upgrade(StatusCode::BAD_REQUEST))
        }
        Action::Static { root, path } => serve_static(&root, &path, request).await,
        Action::Redirect { location } => {
            let location = HeaderValue::from_str(&location).map_err(|e| DispatchError::InvalidUrl {
                url: location.clone(),
                reason: e.to_string(),
            })?;
            Ok(Response::builder()
                .status(StatusCode::MOVED_PERMANENTLY)
                .header(axum::http::header::LOCATION, location)
                .body(Body::empty())?)
        }
    }
}

/// A balanced backend connection. Publishes the target's live count when
/// opened and again when released.
struct UpstreamConnection {
    guard: Option<TargetGuard>,
    target: String,
}

impl UpstreamConnection {
    fn open(target: &mut ProxyDispatch) -> Option<Self> {
        let guard = target.guard.take()?;
        let authority = target.authority();
        metrics::record_upstream_connections(&authority, guard.active());
        Some(Self {
            guard: Some(guard),
            target: authority,
        })
    }
}

impl Drop for UpstreamConnection {
    fn drop(&mut self) {
        if let Some(guard) = self.guard.take() {
            metrics::record_upstream_connections(&self.target, guard.release());
        }
    }
}

fn outbound_url(target: &ProxyDispatch, request: &Request<Body>) -> Result<url::Url, DispatchError> {
    let url = target.url(request.uri().query());
    url::Url::parse(&url).map_err(|e| DispatchError::InvalidUrl {
        url,
        reason: e.to_string(),
    })
}

/// Forward a plain HTTP request and stream the answer back.
async fn forward(
    state: &AppState,
    mut target: ProxyDispatch,
    request: Request<Body>,
    ctx: &ForwardContext<'_>,
) -> Result<Response, DispatchError> {
    let url = outbound_url(&target, &request)?;
    let (mut parts, body) = request.into_parts();

    // HTTP/2 bodies need neither Content-Length nor Transfer-Encoding.
    let has_body = !body.is_end_stream();
    strip_hop_by_hop(&mut parts.headers, false, target.allow_proxy_request_header);
    inject_forwarded_headers(&mut parts.headers, ctx);
    parts.headers.remove(HOST);

    tracing::debug!(target = %url, "Forwarding request");

    let connection = UpstreamConnection::open(&mut target);
    let mut outbound = state.client.request(parts.method, url).headers(parts.headers);
    if has_body {
        outbound = outbound.body(reqwest::Body::wrap_stream(body.into_data_stream()));
    }
    let upstream = outbound.send().await.map_err(|source| DispatchError::Upstream {
        target: target.authority(),
        source,
    })?;

    Ok(relay(upstream, connection))
}

/// Turn a backend response into ours, holding `connection` until the body ends.
fn relay(upstream: reqwest::Response, connection: Option<UpstreamConnection>) -> Response {
    let status = upstream.status();
    let mut headers = upstream.headers().clone();
    strip_hop_by_hop(&mut headers, false, true);

    let stream = upstream.bytes_stream().map(move |chunk| {
        let _held = connection.as_ref();
        chunk
    });

    let mut response = Response::new(Body::from_stream(stream));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

/// Forward a WebSocket upgrade and join both upgraded connections.
async fn tunnel(
    state: &AppState,
    mut target: ProxyDispatch,
    mut request: Request<Body>,
    ctx: &ForwardContext<'_>,
) -> Result<Response, DispatchError> {
    let url = outbound_url(&target, &request)?;
    let client_upgrade = request
        .extensions_mut()
        .remove::<OnUpgrade>()
        .ok_or_else(|| DispatchError::Upgrade("connection cannot be upgraded".to_string()))?;
    let (mut parts, _) = request.into_parts();

    strip_hop_by_hop(&mut parts.headers, true, target.allow_proxy_request_header);
    inject_forwarded_headers(&mut parts.headers, ctx);
    parts.headers.remove(HOST);

    tracing::debug!(target = %url, "Forwarding upgrade");

    let connection = UpstreamConnection::open(&mut target);

    let upstream = state
        .client
        .request(parts.method, url)
        .version(Version::HTTP_11)
        .headers(parts.headers)
        .send()
        .await
        .map_err(|source| DispatchError::Upstream {
            target: target.authority(),
            source,
        })?;

    if upstream.status() != StatusCode::SWITCHING_PROTOCOLS {
        tracing::debug!(status = %upstream.status(), "Backend declined upgrade");
        return Ok(relay(upstream, connection));
    }

    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::SWITCHING_PROTOCOLS;
    *response.headers_mut() = upstream.headers().clone();

    let authority = target.authority();
    tokio::spawn(async move {
        let _held = connection;
        let (client, backend) = tokio::join!(client_upgrade, upstream.upgrade());
        match (client, backend) {
            (Ok(client), Ok(mut backend)) => {
                let mut client = TokioIo::new(client);
                match tokio::io::copy_bidirectional(&mut client, &mut backend).await {
                    Ok((sent, received)) => {
                        tracing::debug!(target = %authority, sent, received, "Tunnel closed")
                    }
                    Err(e) => tracing::debug!(target = %authority, error = %e, "Tunnel ended with error"),
                }
            }
            (Err(e), _) => tracing::warn!(target = %authority, error = %e, "Client upgrade failed"),
            (_, Err(e)) => tracing::warn!(target = %authority, error = %e, "Backend upgrade failed"),
        }
    });

    Ok(response)
}
