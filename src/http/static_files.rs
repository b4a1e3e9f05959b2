//! Static file serving for STATIC rules.
//!
//! Files are served by `tower_http::services::ServeDir`. This module adds
//! what the rule semantics need on top of it: the index file priority list,
//! redirects that point at the client-visible path, and our own 404.

use std::path::Path;

use axum::body::Body;
use axum::http::{header::LOCATION, HeaderMap, Method, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use tower::ServiceExt;
use tower_http::services::ServeDir;

use crate::error::DispatchError;
use crate::http::dispatch::not_found;
use crate::routing::INDEX_FILES;

/// Serve `path` below `root` for `request`.
///
/// `path` is the request path with the rule prefix already removed.
pub async fn serve_static(root: &Path, path: &str, request: Request<Body>) -> Result<Response, DispatchError> {
    let (parts, _) = request.into_parts();
    let query = parts.uri.query();

    // `index.html` is the first entry of the priority list and ServeDir
    // appends it on its own.
    let response = serve_one(root, &parts.method, &parts.headers, path, query).await?;

    if response.status().is_redirection() {
        // ServeDir only redirects directories requested without a slash. Its
        // Location is built from the stripped path, so rebuild it from the
        // path the client used.
        let location = match query {
            Some(q) => format!("{}/?{}", parts.uri.path(), q),
            None => format!("{}/", parts.uri.path()),
        };
        return Ok((StatusCode::MOVED_PERMANENTLY, [(LOCATION, location)]).into_response());
    }

    if response.status() == StatusCode::NOT_FOUND && path.ends_with('/') {
        for index in INDEX_FILES.iter().skip(1) {
            let candidate = format!("{}{}", path, index);
            let response = serve_one(root, &parts.method, &parts.headers, &candidate, query).await?;
            if response.status() != StatusCode::NOT_FOUND {
                return Ok(response);
            }
        }
    }

    if response.status() == StatusCode::NOT_FOUND {
        tracing::debug!(root = %root.display(), path = %path, "Static file not found");
        return Ok(not_found());
    }
    Ok(response)
}

async fn serve_one(
    root: &Path,
    method: &Method,
    headers: &HeaderMap,
    path: &str,
    query: Option<&str>,
) -> Result<Response, DispatchError> {
    let uri = match query {
        Some(q) => format!("{}?{}", path, q),
        None => path.to_string(),
    };
    let mut request = Request::builder().method(method.clone()).uri(uri).body(Body::empty())?;
    *request.headers_mut() = headers.clone();

    let service = ServeDir::new(root).append_index_html_on_directories(true);
    match service.oneshot(request).await {
        Ok(response) => Ok(response.map(Body::new)),
        Err(never) => match never {},
    }
}
