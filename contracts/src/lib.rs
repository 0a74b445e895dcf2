//! # Reserve Contracts
//!
//! The state machines of the reserve treasury:
//!
//! - **Timelock**: the one queue/mature/commit abstraction every privileged
//!   change goes through.
//! - **Vault pointer**: a single address that only moves after a matured
//!   unlock.
//! - **Permission registry**: `(category, address)` flags with one pending
//!   change per key and category policy as data.
//! - **Treasury**: reserve deposits, backed-token minting, per-token debt,
//!   excess-reserve management.
//! - **Persistence**: the sled record layout for all of the above.
//!
//! ## Design Principles
//!
//! 1. All monetary arithmetic is checked. Amounts are `u128` and nothing
//!    wraps.
//! 2. Validate everything, then mutate. A rejected call leaves no trace.
//! 3. Time is an input. Maturity is re-evaluated against the host clock on
//!    every call; nothing waits.
//! 4. Every state type is serde-serializable so hosts can persist and
//!    expose it.

pub mod ownable;
pub mod permissions;
pub mod persistence;
pub mod timelock;
pub mod treasury;
pub mod vault_owned;

pub use ownable::{Management, ManagementError};
pub use permissions::{PermissionCategory, PermissionKey, PermissionRegistry};
pub use persistence::{LedgerStore, StoreError, StoredLedger};
pub use timelock::{Guarded, TimelockEntry, TimelockError, TimelockStatus};
pub use treasury::{
    ReserveTokenInfo, Role, TokenKind, Treasury, TreasuryConfig, TreasuryError, TreasuryState,
    TreasurySummary,
};
pub use vault_owned::{VaultError, VaultOwned, VaultState, VaultView};
