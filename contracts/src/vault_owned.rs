//! # Vault Pointer
//!
//! A single guarded address (the "vault") that the controller may only
//! repoint after an explicit unlock has matured. Every repoint consumes the
//! unlock, so the next change needs a fresh `open_timelock` and a fresh wait.
//!
//! ## Lifecycle
//!
//! ```text
//! NoTimelock ──open──► Pending ──time──► Matured ──set_vault──► NoTimelock
//!                         │                  │
//!                         └─────cancel───────┴──────────────► NoTimelock
//! ```

use reserve_protocol::config::VAULT_TIMELOCK_DELAY;
use reserve_protocol::{Address, Clock, Timestamp};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::ownable::{Management, ManagementError};
use crate::timelock::{Guarded, TimelockError};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from vault pointer operations.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum VaultError {
    /// The caller is not the controller.
    #[error("{caller} is not authorized to manage the vault")]
    Unauthorized { caller: Address },

    /// An unlock is already open.
    #[error("vault timelock already open (matures at {matures_at})")]
    AlreadyPending { matures_at: Timestamp },

    /// `cancel_timelock` with no unlock open.
    #[error("no vault timelock open")]
    NothingPending,

    /// `set_vault` without an open, matured unlock.
    #[error("vault is timelocked (matures at {matures_at:?}, now {now})")]
    Timelocked {
        matures_at: Option<Timestamp>,
        now: Timestamp,
    },

    /// Controller handover failed.
    #[error(transparent)]
    Management(#[from] ManagementError),
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Durable part of a [`VaultOwned`]: everything except the clock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultState {
    pub management: Management,
    pub pointer: Guarded<Address>,
}

impl VaultState {
    pub fn new(controller: Address, vault: Address, delay_secs: u64) -> Self {
        Self {
            management: Management::new(controller),
            pointer: Guarded::new(vault, delay_secs),
        }
    }
}

/// Read-only snapshot of the pointer, for status endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultView {
    pub vault: Address,
    pub controller: Address,
    /// Maturity timestamp, or 0 when no unlock is open.
    pub timelock: Timestamp,
    pub remaining: Option<u64>,
}

// ---------------------------------------------------------------------------
// VaultOwned
// ---------------------------------------------------------------------------

/// The timelocked vault pointer.
pub struct VaultOwned<C: Clock> {
    state: VaultState,
    clock: C,
}

impl<C: Clock> VaultOwned<C> {
    /// A pointer with the default two-day delay. The vault starts at the
    /// zero address.
    pub fn new(controller: Address, clock: C) -> Self {
        Self::with_delay(controller, VAULT_TIMELOCK_DELAY.as_secs(), clock)
    }

    pub fn with_delay(controller: Address, delay_secs: u64, clock: C) -> Self {
        Self::from_state(VaultState::new(controller, Address::ZERO, delay_secs), clock)
    }

    pub fn from_state(state: VaultState, clock: C) -> Self {
        Self { state, clock }
    }

    pub fn state(&self) -> &VaultState {
        &self.state
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Replaces the durable state wholesale. Used by hosts to roll back an
    /// operation whose persistence failed.
    pub fn restore(&mut self, state: VaultState) {
        self.state = state;
    }

    fn ensure_controller(&self, caller: &Address, op: &str) -> Result<(), VaultError> {
        if self.state.management.is_controller(caller) {
            return Ok(());
        }
        warn!(caller = %caller, op, "rejected vault call from non-controller");
        Err(VaultError::Unauthorized { caller: *caller })
    }

    /// Starts the unlock. Returns the maturity timestamp.
    pub fn open_timelock(&mut self, caller: &Address) -> Result<Timestamp, VaultError> {
        self.ensure_controller(caller, "open_timelock")?;
        let now = self.clock.now();
        let matures_at = self.state.pointer.open(now).map_err(|e| match e {
            TimelockError::AlreadyPending { matures_at } => VaultError::AlreadyPending { matures_at },
            _ => VaultError::NothingPending,
        })?;
        info!(matures_at, "vault timelock opened");
        Ok(matures_at)
    }

    /// Drops the unlock, matured or not.
    pub fn cancel_timelock(&mut self, caller: &Address) -> Result<(), VaultError> {
        self.ensure_controller(caller, "cancel_timelock")?;
        self.state
            .pointer
            .cancel()
            .map_err(|_| VaultError::NothingPending)?;
        info!("vault timelock cancelled");
        Ok(())
    }

    /// Repoints the vault. Requires an open, matured unlock and consumes it.
    pub fn set_vault(&mut self, caller: &Address, vault: Address) -> Result<Address, VaultError> {
        self.ensure_controller(caller, "set_vault")?;
        let now = self.clock.now();
        let matures_at = self.state.pointer.timelock().matures_at();
        let previous = self
            .state
            .pointer
            .commit(now, vault)
            .map_err(|_| VaultError::Timelocked { matures_at, now })?;
        info!(previous = %previous, vault = %vault, "vault repointed");
        Ok(previous)
    }

    pub fn vault(&self) -> Address {
        *self.state.pointer.get()
    }

    /// Maturity timestamp of the open unlock, 0 when none is open.
    pub fn timelock(&self) -> Timestamp {
        self.state.pointer.timelock().matures_at().unwrap_or(0)
    }

    /// Seconds until the open unlock matures.
    pub fn remaining(&self) -> Option<u64> {
        self.state.pointer.timelock().remaining(self.clock.now())
    }

    pub fn controller(&self) -> Address {
        self.state.management.controller()
    }

    pub fn view(&self) -> VaultView {
        VaultView {
            vault: self.vault(),
            controller: self.controller(),
            timelock: self.timelock(),
            remaining: self.remaining(),
        }
    }

    pub fn push_management(&mut self, caller: &Address, successor: Address) -> Result<(), VaultError> {
        self.state.management.push(caller, successor)?;
        info!(successor = %successor, "vault management pushed");
        Ok(())
    }

    pub fn pull_management(&mut self, caller: &Address) -> Result<(), VaultError> {
        let previous = self.state.management.pull(caller)?;
        info!(previous = %previous, controller = %caller, "vault management pulled");
        Ok(())
    }

    pub fn renounce_management(&mut self, caller: &Address) -> Result<(), VaultError> {
        self.state.management.renounce(caller)?;
        info!("vault management renounced");
        Ok(())
    }
}
