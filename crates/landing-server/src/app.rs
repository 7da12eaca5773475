//! Router construction.

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tower::ServiceBuilder;

use crate::handlers;
use crate::middleware::security;
use crate::state::AppState;

/// Create the application router: a catch-all GET over the site.
pub(crate) fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(handlers::serve_site))
        .route("/{*path}", get(handlers::serve_site))
        .layer(ServiceBuilder::new().layer(security::content_type_options_layer()))
        .with_state(state)
}
