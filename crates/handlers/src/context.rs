use std::sync::{PoisonError, RwLock};

use marketwire_core::EntityId;

/// The page the user is looking at: a path plus the active tab, if any.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Route {
    pub path: String,
    pub tab: Option<String>,
}

impl Route {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            tab: None,
        }
    }

    pub fn with_tab(mut self, tab: impl Into<String>) -> Self {
        self.tab = Some(tab.into());
        self
    }

    /// Non-empty path segments, ignoring any query string.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        let path = self.path.split(['?', '#']).next().unwrap_or_default();
        path.split('/').filter(|segment| !segment.is_empty())
    }

    /// True when the path is exactly `prefix` or lies beneath it.
    pub fn is_under(&self, prefix: &str) -> bool {
        let wanted: Vec<&str> = prefix.split('/').filter(|s| !s.is_empty()).collect();
        let mut actual = self.segments();
        wanted
            .iter()
            .all(|expected| actual.next().is_some_and(|segment| segment == *expected))
    }

    /// True when the path is exactly `prefix`.
    pub fn is_exactly(&self, prefix: &str) -> bool {
        self.is_under(prefix)
            && self.segments().count() == prefix.split('/').filter(|s| !s.is_empty()).count()
    }

    /// The segment right after `prefix`, e.g. `42` for `/products/42` and
    /// prefix `/products`.
    pub fn param_after(&self, prefix: &str) -> Option<&str> {
        if !self.is_under(prefix) {
            return None;
        }
        let depth = prefix.split('/').filter(|s| !s.is_empty()).count();
        self.segments().nth(depth)
    }

    /// True when the segment after `prefix` names `id`.
    pub fn shows_entity(&self, prefix: &str, id: &EntityId) -> bool {
        self.param_after(prefix)
            .is_some_and(|segment| id.matches_segment(segment))
    }

    pub fn tab_is(&self, tab: &str) -> bool {
        self.tab.as_deref().is_some_and(|active| active.eq_ignore_ascii_case(tab))
    }
}

/// Read access to the current route, consulted by feature handlers before
/// doing any work.
pub trait PageContext: Send + Sync {
    fn route(&self) -> Route;
}

/// A [`PageContext`] updated by whoever owns navigation.
#[derive(Debug, Default)]
pub struct SharedPageContext {
    route: RwLock<Route>,
}

impl SharedPageContext {
    pub fn new(route: Route) -> Self {
        Self {
            route: RwLock::new(route),
        }
    }

    pub fn navigate(&self, route: Route) {
        *self.route.write().unwrap_or_else(PoisonError::into_inner) = route;
    }

    pub fn set_tab(&self, tab: Option<String>) {
        self.route
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .tab = tab;
    }
}

impl PageContext for SharedPageContext {
    fn route(&self) -> Route {
        self.route
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
