//! Ordered bookkeeping for remote-bound commands.
//!
//! The queue only tracks status; [`crate::Runtime::process_commands`] hands
//! the items it releases to the transport and reports the outcome back.

use serde::Serialize;
use shared::{
    domain::{CommandStatus, ComponentId, ModuleRef, Params},
    protocol::CommandPayload,
};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Command {
    pub id: Uuid,
    pub module: ModuleRef,
    pub name: String,
    pub params: Params,
    pub target: ComponentId,
    pub status: CommandStatus,
    pub fail_count: u32,
}

impl Command {
    pub fn new(module: ModuleRef, name: impl Into<String>, params: Params, target: ComponentId) -> Self {
        Self {
            id: Uuid::new_v4(),
            module,
            name: name.into(),
            params,
            target,
            status: CommandStatus::Pending,
            fail_count: 0,
        }
    }

    pub fn payload(&self) -> CommandPayload {
        CommandPayload {
            id: self.id,
            module: self.module.clone(),
            name: self.name.clone(),
            params: self.params.clone(),
            target: self.target.clone(),
        }
    }
}

/// Result of reporting a failed send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Back to pending, eligible for the next `process()`.
    Requeued { fail_count: u32 },
    /// Attempt ceiling reached; parked until `retry_failed()`.
    Exhausted { fail_count: u32 },
    /// The id is no longer queued.
    Unknown,
}

#[derive(Debug, Default)]
pub struct CommandQueue {
    items: Vec<Command>,
    max_attempts: Option<u32>,
}

impl CommandQueue {
    pub fn new(max_attempts: Option<u32>) -> Self {
        Self {
            items: Vec::new(),
            max_attempts,
        }
    }

    pub fn push(&mut self, command: Command) {
        self.items.push(command);
    }

    pub fn size(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get_next_pending(&self) -> Option<&Command> {
        self.items
            .iter()
            .find(|item| item.status == CommandStatus::Pending)
    }

    pub fn get(&self, id: Uuid) -> Option<&Command> {
        self.items.iter().find(|item| item.id == id)
    }

    pub fn items(&self) -> &[Command] {
        &self.items
    }

    /// Marks every pending item in flight, in insertion order, and returns
    /// the payloads to send. Items already in flight are left alone.
    pub fn take_pending(&mut self) -> Vec<CommandPayload> {
        self.items
            .iter_mut()
            .filter(|item| item.status == CommandStatus::Pending)
            .map(|item| {
                item.status = CommandStatus::InFlight;
                item.payload()
            })
            .collect()
    }

    /// Removes a command after a successful send.
    pub fn complete(&mut self, id: Uuid) -> Option<Command> {
        let index = self.items.iter().position(|item| item.id == id)?;
        Some(self.items.remove(index))
    }

    pub fn fail(&mut self, id: Uuid) -> FailureOutcome {
        let Some(item) = self.items.iter_mut().find(|item| item.id == id) else {
            return FailureOutcome::Unknown;
        };

        item.fail_count += 1;
        let fail_count = item.fail_count;
        match self.max_attempts {
            Some(max) if fail_count >= max => {
                item.status = CommandStatus::Failed;
                FailureOutcome::Exhausted { fail_count }
            }
            _ => {
                item.status = CommandStatus::Pending;
                FailureOutcome::Requeued { fail_count }
            }
        }
    }

    /// Returns parked items to pending. Their fail counts are kept.
    pub fn retry_failed(&mut self) -> usize {
        let mut revived = 0;
        for item in self
            .items
            .iter_mut()
            .filter(|item| item.status == CommandStatus::Failed)
        {
            item.status = CommandStatus::Pending;
            revived += 1;
        }
        revived
    }
}

#[cfg(test)]
#[path = "tests/command_queue_tests.rs"]
mod tests;
