//! Site request handler.
//!
//! Every GET goes through [`serve_site`], which renders on the blocking pool
//! and encodes the [`Reply`]. Pages carry an `ETag`; files are streamed by
//! [`ServeDir`] with a `Cache-Control` picked from their MIME type.

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, Uri, header};
use axum::response::{AppendHeaders, IntoResponse, Response};
use landing_site::RequestInfo;
use md5::{Digest, Md5};
use percent_encoding::{AsciiSet, CONTROLS, percent_decode_str, utf8_percent_encode};
use tower::ServiceExt;
use tower_http::services::ServeDir;
use tracing::error;

use crate::routing::{Reply, respond};
use crate::state::AppState;

/// Cache lifetime for images: one year.
const IMAGE_CACHE_CONTROL: &str = "public, max-age=31536000";
/// Cache lifetime for stylesheets: two hours.
const CSS_CACHE_CONTROL: &str = "public, max-age=7200";

/// Characters escaped when re-encoding a file path into a URI.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Handle GET for any path.
pub(crate) async fn serve_site(State(state): State<Arc<AppState>>, request: Request) -> Response {
    let path = percent_decode_str(request.uri().path())
        .decode_utf8_lossy()
        .into_owned();
    let info = request_info(request.headers());
    let serving = Arc::clone(&state.serving);

    let reply = tokio::task::spawn_blocking(move || respond(&serving, &path, &info))
        .await
        .unwrap_or_else(|e| {
            error!(error = %e, "Render task failed");
            Reply::Error
        });
    match reply {
        Reply::File { root, relative } => serve_file(root, &relative, request).await,
        reply => encode(reply, request.headers()),
    }
}

/// Stream `relative` from `root`, keeping the client's conditional headers.
async fn serve_file(root: PathBuf, relative: &str, mut request: Request) -> Response {
    let encoded = utf8_percent_encode(relative, PATH_SEGMENT);
    match Uri::try_from(format!("/{encoded}")) {
        Ok(uri) => *request.uri_mut() = uri,
        Err(e) => {
            error!(relative, error = %e, "Cannot build file URI");
            return encode(Reply::Error, request.headers());
        }
    }

    let Ok(response) = ServeDir::new(root).oneshot(request).await;
    let mut response = response.into_response();
    let cache = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(cache_control);
    if let Some(value) = cache {
        response
            .headers_mut()
            .insert(header::CACHE_CONTROL, HeaderValue::from_static(value));
    }
    response
}

/// Host and scheme the client used, honouring `X-Forwarded-Proto`.
pub(crate) fn request_info(headers: &HeaderMap) -> RequestInfo {
    let text = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned)
    };
    let scheme = text("x-forwarded-proto").unwrap_or_else(|| "http".to_owned());
    RequestInfo::new(text(header::HOST.as_str()), scheme)
}

/// `ETag` for a body: quoted MD5 prefix (16 hex chars).
pub(crate) fn compute_etag(body: &[u8]) -> String {
    let hash = Md5::digest(body);
    format!("\"{}\"", &hex::encode(hash)[..16])
}

/// `Cache-Control` for a static file's MIME type.
pub(crate) fn cache_control(content_type: &str) -> Option<&'static str> {
    if content_type.starts_with("image/") {
        Some(IMAGE_CACHE_CONTROL)
    } else if content_type.starts_with("text/css") {
        Some(CSS_CACHE_CONTROL)
    } else {
        None
    }
}

fn not_modified(headers: &HeaderMap, etag: &str) -> bool {
    headers
        .get(header::IF_NONE_MATCH)
        .is_some_and(|value| value.as_bytes() == etag.as_bytes())
}

fn encode(reply: Reply, request_headers: &HeaderMap) -> Response {
    match reply {
        Reply::Page {
            body,
            content_type,
            status,
        } => {
            let status = StatusCode::from_u16(status).unwrap_or(StatusCode::OK);
            let etag = compute_etag(body.as_bytes());
            if status == StatusCode::OK && not_modified(request_headers, &etag) {
                return StatusCode::NOT_MODIFIED.into_response();
            }
            (
                status,
                AppendHeaders([
                    (header::CONTENT_TYPE, content_type.to_owned()),
                    (header::ETAG, etag),
                ]),
                body,
            )
                .into_response()
        }
        // Files never reach here; `serve_site` streams them.
        Reply::File { .. } | Reply::Error => {
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
        }
        Reply::Redirect {
            location,
            permanent,
        } => {
            let status = if permanent {
                StatusCode::MOVED_PERMANENTLY
            } else {
                StatusCode::FOUND
            };
            (status, [(header::LOCATION, location)]).into_response()
        }
    }
}
