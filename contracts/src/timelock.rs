//! # Timelocked Commit
//!
//! One state machine guards every privileged change in the treasury: the
//! vault pointer and each `(category, address)` permission key alike.
//!
//! ```text
//!   ┌──────────┐  open / restart   ┌──────────┐   time passes   ┌──────────┐
//!   │   Idle   │ ────────────────► │ Pending  │ ──────────────► │ Matured  │
//!   └──────────┘                   └────┬─────┘                 └────┬─────┘
//!        ▲                              │ cancel                     │ consume / cancel
//!        └──────────────────────────────┴────────────────────────────┘
//! ```
//!
//! Maturity is evaluated literally: an entry requested at `t` with delay `d`
//! is matured at any `now >= t + d`. A zero delay therefore matures in the
//! same second it was requested, and nothing else does. There is no timer;
//! callers re-check the precondition on every call.

use reserve_protocol::Timestamp;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors produced by timelock transitions.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TimelockError {
    /// `open` was called while a request is already outstanding.
    #[error("timelock already pending (matures at {matures_at})")]
    AlreadyPending { matures_at: Timestamp },

    /// `cancel` or `consume` was called with nothing outstanding.
    #[error("no timelock pending")]
    NothingPending,

    /// The request exists but has not matured yet.
    #[error("timelock not matured: matures at {matures_at}, now {now}")]
    NotMatured { matures_at: Timestamp, now: Timestamp },
}

/// Observable phase of a [`TimelockEntry`] at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimelockStatus {
    /// No request outstanding.
    Idle,
    /// Requested, waiting for `matures_at`.
    Pending { matures_at: Timestamp },
    /// Requested and committable.
    Matured,
}

// ---------------------------------------------------------------------------
// TimelockEntry
// ---------------------------------------------------------------------------

/// `{ requested_at, delay }`: the whole of a timelock's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelockEntry {
    requested_at: Option<Timestamp>,
    delay: u64,
}

impl TimelockEntry {
    /// An idle entry with the given delay in seconds.
    pub const fn new(delay: u64) -> Self {
        Self {
            requested_at: None,
            delay,
        }
    }

    /// An entry requested at `now`.
    pub const fn requested(now: Timestamp, delay: u64) -> Self {
        Self {
            requested_at: Some(now),
            delay,
        }
    }

    pub fn delay(&self) -> u64 {
        self.delay
    }

    pub fn requested_at(&self) -> Option<Timestamp> {
        self.requested_at
    }

    /// `true` while a request is outstanding (pending or matured).
    pub fn is_open(&self) -> bool {
        self.requested_at.is_some()
    }

    /// Earliest committable instant, if a request is outstanding.
    pub fn matures_at(&self) -> Option<Timestamp> {
        self.requested_at.map(|t| t.saturating_add(self.delay))
    }

    pub fn status(&self, now: Timestamp) -> TimelockStatus {
        match self.matures_at() {
            None => TimelockStatus::Idle,
            Some(at) if now >= at => TimelockStatus::Matured,
            Some(at) => TimelockStatus::Pending { matures_at: at },
        }
    }

    pub fn is_matured(&self, now: Timestamp) -> bool {
        matches!(self.status(now), TimelockStatus::Matured)
    }

    /// Seconds left until maturity; `Some(0)` once matured, `None` if idle.
    pub fn remaining(&self, now: Timestamp) -> Option<u64> {
        self.matures_at().map(|at| at.saturating_sub(now))
    }

    /// Starts a request. Fails if one is already outstanding.
    pub fn open(&mut self, now: Timestamp) -> Result<Timestamp, TimelockError> {
        if let Some(matures_at) = self.matures_at() {
            return Err(TimelockError::AlreadyPending { matures_at });
        }
        self.requested_at = Some(now);
        Ok(now.saturating_add(self.delay))
    }

    /// Starts a request, replacing any outstanding one and restarting its
    /// clock.
    pub fn restart(&mut self, now: Timestamp, delay: u64) -> Timestamp {
        self.requested_at = Some(now);
        self.delay = delay;
        now.saturating_add(delay)
    }

    /// Drops the outstanding request, matured or not.
    pub fn cancel(&mut self) -> Result<(), TimelockError> {
        if self.requested_at.take().is_none() {
            return Err(TimelockError::NothingPending);
        }
        Ok(())
    }

    /// Checks that a request is outstanding and matured. Does not mutate.
    pub fn ensure_matured(&self, now: Timestamp) -> Result<(), TimelockError> {
        match self.status(now) {
            TimelockStatus::Idle => Err(TimelockError::NothingPending),
            TimelockStatus::Pending { matures_at } => {
                Err(TimelockError::NotMatured { matures_at, now })
            }
            TimelockStatus::Matured => Ok(()),
        }
    }

    /// Checks maturity and returns the entry to idle.
    pub fn consume(&mut self, now: Timestamp) -> Result<(), TimelockError> {
        self.ensure_matured(now)?;
        self.requested_at = None;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Guarded
// ---------------------------------------------------------------------------

/// A value that may only be replaced through a matured [`TimelockEntry`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guarded<T> {
    value: T,
    timelock: TimelockEntry,
}

impl<T> Guarded<T> {
    pub fn new(value: T, delay: u64) -> Self {
        Self {
            value,
            timelock: TimelockEntry::new(delay),
        }
    }

    pub fn get(&self) -> &T {
        &self.value
    }

    pub fn timelock(&self) -> &TimelockEntry {
        &self.timelock
    }

    pub fn open(&mut self, now: Timestamp) -> Result<Timestamp, TimelockError> {
        self.timelock.open(now)
    }

    pub fn cancel(&mut self) -> Result<(), TimelockError> {
        self.timelock.cancel()
    }

    /// Replaces the value if the unlock has matured, consuming it. A fresh
    /// `open` is required before the next replacement.
    pub fn commit(&mut self, now: Timestamp, value: T) -> Result<T, TimelockError> {
        self.timelock.consume(now)?;
        Ok(std::mem::replace(&mut self.value, value))
    }
}
