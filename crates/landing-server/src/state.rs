//! Application state.

use std::sync::Arc;

use landing_site::LandingServing;

/// State shared by all request handlers.
pub(crate) struct AppState {
    pub(crate) serving: Arc<LandingServing>,
}
