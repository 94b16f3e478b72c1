use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{ComponentId, ModuleRef, Params};

/// An action or command as written by component code: the target is optional
/// and falls back to whichever component produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationSpec {
    pub name: String,
    #[serde(default)]
    pub params: Params,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<ComponentId>,
}

impl OperationSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Params::new(),
            target: None,
        }
    }

    pub fn with_params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    pub fn with_target(mut self, target: ComponentId) -> Self {
        self.target = Some(target);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum Operation {
    Action(OperationSpec),
    Command(OperationSpec),
}

impl Operation {
    pub fn spec(&self) -> &OperationSpec {
        match self {
            Operation::Action(spec) | Operation::Command(spec) => spec,
        }
    }

    pub fn spec_mut(&mut self) -> &mut OperationSpec {
        match self {
            Operation::Action(spec) | Operation::Command(spec) => spec,
        }
    }
}

/// Body of a command request. `id` stays the same across retries so the
/// server can deduplicate resends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandPayload {
    pub id: Uuid,
    pub module: ModuleRef,
    pub name: String,
    pub params: Params,
    pub target: ComponentId,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_action: Option<OperationSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageResponse {
    pub html: String,
}
