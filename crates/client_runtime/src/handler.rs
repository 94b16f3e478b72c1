//! Component action handlers and the per-module lookup table.

use std::{collections::HashMap, sync::Arc};

use anyhow::Result;
use shared::{
    domain::{ModuleRef, Params, Term},
    protocol::OperationSpec,
};

/// What a handler asks the runtime to do after its state transition.
#[derive(Debug, Clone, PartialEq)]
pub enum NextOperation {
    Action(OperationSpec),
    Command(OperationSpec),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActionResult {
    pub new_state: Term,
    pub emitted_context: Params,
    pub next: Option<NextOperation>,
}

impl ActionResult {
    pub fn new(new_state: Term) -> Self {
        Self {
            new_state,
            emitted_context: Params::new(),
            next: None,
        }
    }

    pub fn with_emitted_context(mut self, emitted_context: Params) -> Self {
        self.emitted_context = emitted_context;
        self
    }

    pub fn with_next_action(mut self, action: OperationSpec) -> Self {
        self.next = Some(NextOperation::Action(action));
        self
    }

    pub fn with_next_command(mut self, command: OperationSpec) -> Self {
        self.next = Some(NextOperation::Command(command));
        self
    }
}

/// Component logic for one module. Implementations must be pure with respect
/// to the runtime: they only describe the transition.
pub trait ActionHandler: Send + Sync {
    fn invoke(&self, name: &str, state: &Term, params: &Params) -> Result<ActionResult>;
}

impl<F> ActionHandler for F
where
    F: Fn(&str, &Term, &Params) -> Result<ActionResult> + Send + Sync,
{
    fn invoke(&self, name: &str, state: &Term, params: &Params) -> Result<ActionResult> {
        self(name, state, params)
    }
}

#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<ModuleRef, Arc<dyn ActionHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, module: ModuleRef, handler: Arc<dyn ActionHandler>) {
        self.handlers.insert(module, handler);
    }

    pub fn with(mut self, module: impl Into<ModuleRef>, handler: impl ActionHandler + 'static) -> Self {
        self.register(module.into(), Arc::new(handler));
        self
    }

    pub fn get(&self, module: &ModuleRef) -> Option<Arc<dyn ActionHandler>> {
        self.handlers.get(module).cloned()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
