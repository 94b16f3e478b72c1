//! Host-side collaborators: rendering, navigation and route resolution.

use std::collections::{BTreeMap, HashMap};

use shared::domain::ModuleRef;
use tracing::{debug, info};

use crate::{error::RuntimeError, registry::ComponentRegistry};

/// Repaints the UI from a snapshot of the registry. No registry lock is held,
/// so reads and mounts through the runtime are fine; dispatching another
/// action from inside `render` deadlocks on the dispatch lock.
pub trait Renderer: Send + Sync {
    fn render(&self, registry: &ComponentRegistry);
}

pub trait Navigator: Send + Sync {
    /// Full navigation; the page is loaded from scratch.
    fn navigate(&self, path: &str);
    /// Swaps in a page whose html was already prefetched.
    fn load_page(&self, path: &str, html: &str);
}

pub trait RouteResolver: Send + Sync {
    fn resolve(&self, page: &ModuleRef) -> Result<String, RuntimeError>;
}

#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: HashMap<ModuleRef, String>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_settings(routes: &BTreeMap<String, String>) -> Self {
        Self {
            routes: routes
                .iter()
                .map(|(module, path)| (ModuleRef::new(module.clone()), path.clone()))
                .collect(),
        }
    }

    pub fn with_route(mut self, page: impl Into<ModuleRef>, path: impl Into<String>) -> Self {
        self.routes.insert(page.into(), path.into());
        self
    }
}

impl RouteResolver for RouteTable {
    fn resolve(&self, page: &ModuleRef) -> Result<String, RuntimeError> {
        self.routes
            .get(page)
            .cloned()
            .ok_or_else(|| RuntimeError::RouteNotFound(page.clone()))
    }
}

pub struct LogRenderer;

impl Renderer for LogRenderer {
    fn render(&self, registry: &ComponentRegistry) {
        debug!(components = registry.len(), "render");
    }
}

pub struct LogNavigator;

impl Navigator for LogNavigator {
    fn navigate(&self, path: &str) {
        info!(path, "navigate");
    }

    fn load_page(&self, path: &str, html: &str) {
        info!(path, bytes = html.len(), "load prefetched page");
    }
}
