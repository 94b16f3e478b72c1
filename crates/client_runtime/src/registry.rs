//! Component registry: the authoritative cid -> entry mapping.

use std::collections::HashMap;

use serde::Serialize;
use shared::domain::{ComponentId, ModuleRef, Params, Term};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComponentEntry {
    pub module: ModuleRef,
    pub state: Term,
    pub emitted_context: Params,
    /// Enclosing component, set at mount. Its emitted context (and its
    /// ancestors') is visible to this component's actions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<ComponentId>,
}

impl ComponentEntry {
    pub fn new(module: ModuleRef, state: Term) -> Self {
        Self {
            module,
            state,
            emitted_context: Params::new(),
            parent: None,
        }
    }

    pub fn with_parent(mut self, parent: ComponentId) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn with_emitted_context(mut self, emitted_context: Params) -> Self {
        self.emitted_context = emitted_context;
        self
    }
}

/// Partial update for [`ComponentRegistry::merge`]. `None` fields are left
/// untouched.
#[derive(Debug, Clone, Default)]
pub struct EntryPatch {
    pub module: Option<ModuleRef>,
    pub state: Option<Term>,
    pub emitted_context: Option<Params>,
}

#[derive(Debug, Clone, Default)]
pub struct ComponentRegistry {
    entries: HashMap<ComponentId, ComponentEntry>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole registry, used when a page is mounted.
    pub fn hydrate(&mut self, entries: impl IntoIterator<Item = (ComponentId, ComponentEntry)>) {
        self.entries = entries.into_iter().collect();
    }

    pub fn get(&self, cid: &ComponentId) -> Option<&ComponentEntry> {
        self.entries.get(cid)
    }

    pub fn set(&mut self, cid: ComponentId, entry: ComponentEntry) {
        self.entries.insert(cid, entry);
    }

    /// Applies `patch` to an existing entry. Returns false if `cid` is not
    /// mounted.
    pub fn merge(&mut self, cid: &ComponentId, patch: EntryPatch) -> bool {
        let Some(entry) = self.entries.get_mut(cid) else {
            return false;
        };

        if let Some(module) = patch.module {
            entry.module = module;
        }
        if let Some(state) = patch.state {
            entry.state = state;
        }
        if let Some(emitted_context) = patch.emitted_context {
            entry.emitted_context = emitted_context;
        }
        true
    }

    pub fn remove(&mut self, cid: &ComponentId) -> Option<ComponentEntry> {
        self.entries.remove(cid)
    }

    pub fn get_state(&self, cid: &ComponentId) -> Option<&Term> {
        self.entries.get(cid).map(|entry| &entry.state)
    }

    pub fn get_emitted_context(&self, cid: &ComponentId) -> Option<&Params> {
        self.entries.get(cid).map(|entry| &entry.emitted_context)
    }

    /// Context emitted by the ancestors of `cid`. A nearer ancestor shadows a
    /// farther one on key collisions. The component's own emission is not
    /// included.
    pub fn visible_context(&self, cid: &ComponentId) -> Params {
        let mut chain = Vec::new();
        let mut cursor = self.entries.get(cid).and_then(|entry| entry.parent.as_ref());

        while let Some(parent_id) = cursor {
            // A malformed parent link must not loop forever.
            if chain.iter().any(|(id, _)| *id == parent_id) {
                break;
            }
            let Some(parent) = self.entries.get(parent_id) else {
                break;
            };
            chain.push((parent_id, &parent.emitted_context));
            cursor = parent.parent.as_ref();
        }

        let mut context = Params::new();
        for (_, emitted) in chain.into_iter().rev() {
            context.extend(emitted.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        context
    }

    pub fn component_ids(&self) -> impl Iterator<Item = &ComponentId> {
        self.entries.keys()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
#[path = "tests/registry_tests.rs"]
mod tests;
