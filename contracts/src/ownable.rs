//! # Management
//!
//! Both the treasury and the vault pointer answer to a single controller.
//! Handing control to a new address is two-step: the current controller
//! pushes a successor, and the successor pulls. A typo'd address therefore
//! never ends up in charge, because it cannot sign the pull.

use reserve_protocol::Address;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from management handover.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ManagementError {
    /// The caller is not the current controller.
    #[error("{caller} is not the controller")]
    NotController { caller: Address },

    /// The caller is not the pushed successor.
    #[error("{caller} is not the pending controller")]
    NotPendingController { caller: Address },

    /// A pull was attempted with no push outstanding.
    #[error("no management handover pending")]
    NoHandoverPending,
}

/// Current controller plus an optional pushed successor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Management {
    controller: Address,
    pending: Option<Address>,
}

impl Management {
    pub fn new(controller: Address) -> Self {
        Self {
            controller,
            pending: None,
        }
    }

    pub fn controller(&self) -> Address {
        self.controller
    }

    pub fn pending(&self) -> Option<Address> {
        self.pending
    }

    /// `true` if `caller` currently controls. A renounced (zero) controller
    /// matches nobody.
    pub fn is_controller(&self, caller: &Address) -> bool {
        !self.controller.is_zero() && self.controller == *caller
    }

    pub fn ensure_controller(&self, caller: &Address) -> Result<(), ManagementError> {
        if self.is_controller(caller) {
            Ok(())
        } else {
            Err(ManagementError::NotController { caller: *caller })
        }
    }

    /// Records `successor` as the pending controller. Replaces any earlier
    /// push.
    pub fn push(&mut self, caller: &Address, successor: Address) -> Result<(), ManagementError> {
        self.ensure_controller(caller)?;
        self.pending = Some(successor);
        Ok(())
    }

    /// Completes a handover. Only the pushed successor may call.
    pub fn pull(&mut self, caller: &Address) -> Result<Address, ManagementError> {
        match self.pending {
            None => Err(ManagementError::NoHandoverPending),
            Some(next) if next != *caller => {
                Err(ManagementError::NotPendingController { caller: *caller })
            }
            Some(next) => {
                let previous = std::mem::replace(&mut self.controller, next);
                self.pending = None;
                Ok(previous)
            }
        }
    }

    /// Gives up control permanently.
    pub fn renounce(&mut self, caller: &Address) -> Result<(), ManagementError> {
        self.ensure_controller(caller)?;
        self.controller = Address::ZERO;
        self.pending = None;
        Ok(())
    }
}
