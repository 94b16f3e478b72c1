//! Translates raw UI events into actions, commands and page navigation.

use std::sync::Arc;

use shared::{
    domain::{ComponentId, EventPosition},
    protocol::{Operation, OperationSpec},
};
use tracing::debug;
use uuid::Uuid;

use crate::{
    error::RuntimeError,
    prefetch::{DomNode, NavigationOutcome, PrefetchOutcome},
    Action, Runtime,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Modifiers {
    pub ctrl: bool,
    pub meta: bool,
    pub shift: bool,
    pub alt: bool,
}

impl Modifiers {
    pub fn any(&self) -> bool {
        self.ctrl || self.meta || self.shift || self.alt
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MouseButton {
    #[default]
    Primary,
    Auxiliary,
    Secondary,
    Other(u8),
}

#[derive(Debug, Clone)]
pub struct UiEvent {
    pub position: EventPosition,
    pub modifiers: Modifiers,
    /// `None` for events that carry no button (keyboard, focus, ...).
    pub button: Option<MouseButton>,
    pub target: Arc<DomNode>,
}

impl UiEvent {
    pub fn new(position: EventPosition, target: Arc<DomNode>) -> Self {
        Self {
            position,
            modifiers: Modifiers::default(),
            button: None,
            target,
        }
    }

    /// Modifier keys and non-primary buttons signal "open elsewhere"; the
    /// browser should handle those on its own.
    pub fn is_ignored(&self) -> bool {
        self.modifiers.any() || matches!(self.button, Some(button) if button != MouseButton::Primary)
    }
}

/// The declarative operation attached to a DOM event attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum OperationSpecNode {
    /// Bare action name, e.g. `$click="increment"`.
    Text(String),
    /// Embedded action or command value.
    Expression(Operation),
}

impl OperationSpecNode {
    fn evaluate(&self) -> Operation {
        match self {
            OperationSpecNode::Text(name) => Operation::Action(OperationSpec::new(name.clone())),
            OperationSpecNode::Expression(operation) => operation.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventRoute {
    Action,
    Command { id: Uuid },
    Prefetch(PrefetchOutcome),
    Navigate(NavigationOutcome),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    Ignored,
    Handled(EventRoute),
}

impl EventOutcome {
    pub fn default_prevented(&self) -> bool {
        !matches!(self, EventOutcome::Ignored)
    }
}

impl Runtime {
    pub fn handle_event(
        &self,
        event: &UiEvent,
        event_type: &str,
        spec: &OperationSpecNode,
        default_target: &ComponentId,
    ) -> Result<EventOutcome, RuntimeError> {
        if event.is_ignored() {
            debug!(event_type, "ignoring event with modifier or secondary button");
            return Ok(EventOutcome::Ignored);
        }

        let mut operation = spec.evaluate();
        operation
            .spec_mut()
            .params
            .insert("event".to_string(), event.position.to_term());

        let route = match operation {
            Operation::Command(spec) => {
                let target = spec.target.clone().unwrap_or_else(|| default_target.clone());
                let id = self.execute_command(spec, target)?;
                EventRoute::Command { id }
            }
            Operation::Action(spec) => {
                let action = Action::from_spec(spec, default_target);
                let settings = self.settings();

                if action.name == settings.prefetch_page_action_name {
                    EventRoute::Prefetch(self.execute_prefetch_page_action(&action, &event.target)?)
                } else if action.name == settings.navigate_action_name {
                    if settings.is_prefetch_event(event_type) {
                        EventRoute::Prefetch(
                            self.execute_prefetch_page_action(&action, &event.target)?,
                        )
                    } else {
                        EventRoute::Navigate(
                            self.navigate_to_prefetched_page(&action, &event.target)?,
                        )
                    }
                } else {
                    self.execute_action(action)?;
                    EventRoute::Action
                }
            }
        };

        Ok(EventOutcome::Handled(route))
    }
}

#[cfg(test)]
#[path = "tests/events_tests.rs"]
mod tests;
