//! Speculative page fetches keyed by DOM node and page path.

use std::{
    collections::HashMap,
    sync::OnceLock,
    time::{Duration, Instant},
};

use shared::{domain::ModuleRef, protocol::PageResponse};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{error::RuntimeError, error::TransportError, lock, Action, Runtime};

/// The slice of a DOM node the runtime cares about.
#[derive(Debug, Default)]
pub struct DomNode {
    pub id: String,
    hologram_id: OnceLock<String>,
}

impl DomNode {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            hologram_id: OnceLock::new(),
        }
    }

    pub fn with_hologram_id(id: impl Into<String>, hologram_id: impl Into<String>) -> Self {
        let node = Self::new(id);
        let _ = node.hologram_id.set(hologram_id.into());
        node
    }

    pub fn hologram_id(&self) -> Option<&str> {
        self.hologram_id.get().map(String::as_str)
    }

    /// Tags the node with a random v4 UUID on first use.
    pub fn ensure_hologram_id(&self) -> &str {
        self.hologram_id
            .get_or_init(|| Uuid::new_v4().to_string())
            .as_str()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PrefetchEntry {
    pub page_path: String,
    pub html: Option<String>,
    pub is_navigate_confirmed: bool,
    pub timestamp: Instant,
    /// Distinguishes a replacement from the entry a fetch was started for.
    pub generation: u64,
}

impl PrefetchEntry {
    pub fn is_stale(&self, now: Instant, timeout: Duration) -> bool {
        now.saturating_duration_since(self.timestamp) > timeout
    }
}

/// What a navigation should do given the cache contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationOutcome {
    /// Prefetched html is ready and was handed to the navigator.
    Loaded { path: String },
    /// The prefetch is still in flight; its completion finishes navigation.
    AwaitingPrefetch { map_key: String },
    /// Nothing usable was cached; a full navigation was issued.
    Navigated { path: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrefetchOutcome {
    Started { map_key: String },
    AlreadyPrefetched { map_key: String },
}

impl PrefetchOutcome {
    pub fn map_key(&self) -> &str {
        match self {
            PrefetchOutcome::Started { map_key } | PrefetchOutcome::AlreadyPrefetched { map_key } => {
                map_key
            }
        }
    }
}

#[derive(Debug)]
pub struct PrefetchCache {
    entries: HashMap<String, PrefetchEntry>,
    timeout: Duration,
    next_generation: u64,
}

impl PrefetchCache {
    pub fn new(timeout: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            timeout,
            next_generation: 0,
        }
    }

    pub fn map_key(node_id: &str, page_path: &str) -> String {
        format!("{node_id}:{page_path}")
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn get(&self, map_key: &str) -> Option<&PrefetchEntry> {
        self.entries.get(map_key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Inserts an entry as-is, replacing whatever was stored under the key.
    pub fn insert(&mut self, map_key: impl Into<String>, entry: PrefetchEntry) {
        self.entries.insert(map_key.into(), entry);
    }

    pub fn remove(&mut self, map_key: &str) -> Option<PrefetchEntry> {
        self.entries.remove(map_key)
    }

    fn fresh(&self, map_key: &str, now: Instant) -> Option<&PrefetchEntry> {
        self.entries
            .get(map_key)
            .filter(|entry| !entry.is_stale(now, self.timeout))
    }

    /// Starts a prefetch unless a fresh one exists. Returns the generation the
    /// fetch continuation must present when it completes.
    pub fn begin(&mut self, map_key: &str, page_path: &str, now: Instant) -> Option<u64> {
        if self.fresh(map_key, now).is_some() {
            return None;
        }

        self.next_generation += 1;
        let generation = self.next_generation;
        self.entries.insert(
            map_key.to_string(),
            PrefetchEntry {
                page_path: page_path.to_string(),
                html: None,
                is_navigate_confirmed: false,
                timestamp: now,
                generation,
            },
        );
        Some(generation)
    }

    pub fn is_current(&self, map_key: &str, generation: u64) -> bool {
        self.entries
            .get(map_key)
            .is_some_and(|entry| entry.generation == generation)
    }

    /// Stores fetched html. Returns `(path, html)` when a navigation was
    /// already waiting for it; the entry is consumed in that case.
    pub fn record_success(&mut self, map_key: &str, html: String) -> Option<(String, String)> {
        let confirmed = self.entries.get(map_key)?.is_navigate_confirmed;
        if confirmed {
            let entry = self.entries.remove(map_key)?;
            return Some((entry.page_path, html));
        }
        if let Some(entry) = self.entries.get_mut(map_key) {
            entry.html = Some(html);
        }
        None
    }

    /// Returns the path to fall back to when a navigation was waiting on the
    /// failed fetch. Otherwise the entry is kept until it goes stale.
    pub fn record_error(&mut self, map_key: &str) -> Option<String> {
        let confirmed = self.entries.get(map_key)?.is_navigate_confirmed;
        if !confirmed {
            return None;
        }
        self.entries.remove(map_key).map(|entry| entry.page_path)
    }

    fn confirm_navigation(&mut self, map_key: &str, page_path: &str, now: Instant) -> NavigationOutcome {
        let has_html = self.fresh(map_key, now).map(|entry| entry.html.is_some());

        match has_html {
            None => {
                self.entries.remove(map_key);
                NavigationOutcome::Navigated {
                    path: page_path.to_string(),
                }
            }
            Some(true) => NavigationOutcome::Loaded {
                path: page_path.to_string(),
            },
            Some(false) => {
                if let Some(entry) = self.entries.get_mut(map_key) {
                    entry.is_navigate_confirmed = true;
                }
                NavigationOutcome::AwaitingPrefetch {
                    map_key: map_key.to_string(),
                }
            }
        }
    }
}

fn page_module_param(action: &Action) -> Result<ModuleRef, RuntimeError> {
    action
        .params
        .get("to")
        .and_then(|to| to.as_str())
        .map(ModuleRef::from)
        .ok_or_else(|| RuntimeError::MissingParam {
            action: action.name.clone(),
            param: "to",
        })
}

impl Runtime {
    pub fn execute_prefetch_page_action(
        &self,
        action: &Action,
        node: &DomNode,
    ) -> Result<PrefetchOutcome, RuntimeError> {
        let node_id = node.ensure_hologram_id();
        let to = page_module_param(action)?;
        let page_path = self.inner.routes.resolve(&to)?;
        let map_key = PrefetchCache::map_key(node_id, &page_path);

        let generation = lock(&self.inner.prefetch).begin(&map_key, &page_path, Instant::now());
        let Some(generation) = generation else {
            debug!(map_key = %map_key, "prefetch already in progress");
            return Ok(PrefetchOutcome::AlreadyPrefetched { map_key });
        };

        debug!(map_key = %map_key, page = %to, "prefetching page");
        let runtime = self.clone();
        let key = map_key.clone();
        self.spawn(async move {
            let result = runtime.inner.transport.fetch_page(&to).await;
            runtime.finish_prefetch(&key, Some(generation), result);
        });

        Ok(PrefetchOutcome::Started { map_key })
    }

    /// Navigates to the action's `to` page, reusing a prefetch started from
    /// the same node when one is fresh.
    pub fn navigate_to_prefetched_page(
        &self,
        action: &Action,
        node: &DomNode,
    ) -> Result<NavigationOutcome, RuntimeError> {
        let to = page_module_param(action)?;
        let page_path = self.inner.routes.resolve(&to)?;

        let outcome = match node.hologram_id() {
            Some(node_id) => {
                let map_key = PrefetchCache::map_key(node_id, &page_path);
                let mut cache = lock(&self.inner.prefetch);
                let outcome = cache.confirm_navigation(&map_key, &page_path, Instant::now());
                let ready_html = match &outcome {
                    NavigationOutcome::Loaded { .. } => {
                        cache.remove(&map_key).and_then(|entry| entry.html)
                    }
                    _ => None,
                };
                drop(cache);

                if let (NavigationOutcome::Loaded { path }, Some(html)) = (&outcome, ready_html) {
                    self.inner.navigator.load_page(path, &html);
                }
                outcome
            }
            None => NavigationOutcome::Navigated { path: page_path },
        };

        if let NavigationOutcome::Navigated { path } = &outcome {
            self.inner.navigator.navigate(path);
        }
        Ok(outcome)
    }

    pub fn on_prefetch_page_success(&self, map_key: &str, response: PageResponse) {
        self.finish_prefetch(map_key, None, Ok(response));
    }

    pub fn on_prefetch_page_error(&self, map_key: &str, error: &TransportError) {
        self.finish_prefetch(map_key, None, Err(error.clone()));
    }

    /// Records a fetch result. With a `generation`, the result is dropped
    /// unless the entry still belongs to that fetch; the check and the write
    /// happen under one lock.
    fn finish_prefetch(
        &self,
        map_key: &str,
        generation: Option<u64>,
        result: Result<PageResponse, TransportError>,
    ) {
        let follow_up = {
            let mut cache = lock(&self.inner.prefetch);
            if let Some(generation) = generation {
                if !cache.is_current(map_key, generation) {
                    debug!(map_key, generation, "discarding superseded prefetch result");
                    return;
                }
            }
            match result {
                Ok(page) => cache
                    .record_success(map_key, page.html)
                    .map(|(path, html)| PageFollowUp::Load { path, html }),
                Err(err) => {
                    warn!(map_key, error = %err, "page prefetch failed");
                    cache.record_error(map_key).map(PageFollowUp::Navigate)
                }
            }
        };

        match follow_up {
            Some(PageFollowUp::Load { path, html }) => self.inner.navigator.load_page(&path, &html),
            Some(PageFollowUp::Navigate(path)) => self.inner.navigator.navigate(&path),
            None => {}
        }
    }
}

/// Navigator call owed once the prefetch lock is released.
enum PageFollowUp {
    Load { path: String, html: String },
    Navigate(String),
}

#[cfg(test)]
#[path = "tests/prefetch_tests.rs"]
mod tests;
