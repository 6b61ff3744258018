//! Worker lifecycle states and the transitions allowed between them.

use serde::Serialize;

use crate::error::WorkerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    /// Constructed, not yet installed.
    Parsed,
    Installing,
    /// Precache committed; waiting to take over.
    Installed,
    Activating,
    /// Controls clients and intercepts fetches.
    Activated,
    /// Failed or replaced. Only a fresh install leaves this state.
    Redundant,
}

impl WorkerState {
    pub fn can_transition_to(self, next: WorkerState) -> bool {
        use WorkerState::*;

        matches!(
            (self, next),
            (Parsed, Installing)
                | (Redundant, Installing)
                | (Installing, Installed)
                | (Installing, Redundant)
                | (Installed, Activating)
                | (Activating, Activated)
                | (Activating, Redundant)
                | (Activated, Redundant)
        )
    }

    pub fn intercepts_fetches(self) -> bool {
        self == WorkerState::Activated
    }
}

/// Lifecycle bookkeeping held by the worker behind its state mutex.
#[derive(Debug, Clone)]
pub struct Lifecycle {
    state: WorkerState,
    skip_waiting: bool,
    clients_claimed: bool,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self {
            state: WorkerState::Parsed,
            skip_waiting: false,
            clients_claimed: false,
        }
    }
}

impl Lifecycle {
    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn transition(&mut self, next: WorkerState) -> Result<WorkerState, WorkerError> {
        let previous = self.state;
        if !previous.can_transition_to(next) {
            return Err(WorkerError::InvalidStateTransition {
                from: previous,
                to: next,
            });
        }
        self.state = next;
        if next != WorkerState::Activated {
            self.clients_claimed = false;
        }
        Ok(previous)
    }

    /// Requests activation without waiting for older clients to close.
    pub fn skip_waiting(&mut self) {
        self.skip_waiting = true;
    }

    /// Installed and allowed to take over without waiting.
    pub fn is_ready_to_activate(&self) -> bool {
        self.state == WorkerState::Installed && self.skip_waiting
    }

    pub fn claim_clients(&mut self) -> Result<(), WorkerError> {
        if self.state != WorkerState::Activated {
            return Err(WorkerError::InvalidStateTransition {
                from: self.state,
                to: WorkerState::Activated,
            });
        }
        self.clients_claimed = true;
        Ok(())
    }

    pub fn clients_claimed(&self) -> bool {
        self.clients_claimed
    }
}
