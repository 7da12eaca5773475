//! Page-shown notifications and per-render session state.
//!
//! Before a page renders, every [`PageShownListener`] sees a [`PageShown`]
//! event and may mark the viewer as logged in or as a sponsor, and add
//! bindings to the render scope. Login and payment integrations plug in
//! here; the default [`AnonymousSession`] only binds an empty session.

use std::sync::Arc;

use landing_template::{Map, Value};

use crate::entry::Entry;
use crate::request::RequestInfo;

/// A page about to be rendered.
#[derive(Debug)]
pub struct PageShown<'a> {
    pub request: &'a RequestInfo,
    pub entry: Option<&'a Arc<Entry>>,
    pub permalink: &'a str,
    /// Set by login listeners.
    pub logged: bool,
    /// Drives sponsor gating of the rendered output.
    pub is_sponsor: bool,
    /// Bindings layered over everything else in the render scope.
    pub extra: Map,
}

impl<'a> PageShown<'a> {
    #[must_use]
    pub fn new(request: &'a RequestInfo, entry: Option<&'a Arc<Entry>>, permalink: &'a str) -> Self {
        Self {
            request,
            entry,
            permalink,
            logged: false,
            is_sponsor: false,
            extra: Map::new(),
        }
    }
}

/// Receiver of [`PageShown`] events.
///
/// Listeners run in registration order on the rendering thread.
pub trait PageShownListener: Send + Sync {
    fn page_shown(&self, page: &mut PageShown<'_>);
}

/// Binds an anonymous `session` so templates can always read it.
#[derive(Clone, Copy, Debug, Default)]
pub struct AnonymousSession;

impl AnonymousSession {
    /// The session map for a viewer who is not logged in.
    #[must_use]
    pub fn session() -> Map {
        Map::from([
            ("logged".to_owned(), Value::Bool(false)),
            ("isSponsor".to_owned(), Value::Bool(false)),
            ("login".to_owned(), Value::from("")),
            ("price".to_owned(), Value::Int(0)),
            ("platform".to_owned(), Value::from("")),
        ])
    }
}

impl PageShownListener for AnonymousSession {
    fn page_shown(&self, page: &mut PageShown<'_>) {
        page.extra
            .entry("session".to_owned())
            .or_insert_with(|| Value::from(Self::session()));
    }
}
