//! # Protocol Configuration & Constants
//!
//! Every default the treasury ships with lives here. Delays are the most
//! consequential of them: they are the window in which holders can notice a
//! queued permission change and leave before it lands. Shortening them on a
//! live deployment is a governance event, not a config tweak.

use std::time::Duration;

// ---------------------------------------------------------------------------
// Version
// ---------------------------------------------------------------------------

/// Version string reported by hosts in status endpoints.
pub const PROTOCOL_VERSION: &str = "0.1.0";

/// Schema version of the persisted ledger layout. Bump when a record's
/// bincode shape changes.
pub const STORAGE_SCHEMA_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// Timelocks
// ---------------------------------------------------------------------------

/// Delay before a vault pointer change unlocked via `open_timelock` may be
/// committed. Two days.
pub const VAULT_TIMELOCK_DELAY: Duration = Duration::from_secs(172_800);

/// Delay for categories that grant a role to an address (depositors,
/// spenders, managers, debtors). Two days.
pub const ADDRESS_CATEGORY_DELAY: Duration = Duration::from_secs(172_800);

/// Delay for categories that change token-list membership (reserve tokens,
/// liquidity tokens, the staked token). A bad token listing can drain the
/// treasury, so these wait twice as long. Four days.
pub const TOKEN_CATEGORY_DELAY: Duration = Duration::from_secs(345_600);

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// Decimal precision of the backed (minted) token. Deposited reserves are
/// normalized to this base before they count toward backing.
pub const MINT_DECIMALS: u8 = 9;

/// Largest decimal exponent the normalizer will apply. `10^38` is the
/// largest power of ten that fits in a `u128`.
pub const MAX_DECIMAL_SHIFT: u32 = 38;

// ---------------------------------------------------------------------------
// Host defaults
// ---------------------------------------------------------------------------

/// Default HTTP API port.
pub const DEFAULT_API_PORT: u16 = 9840;

/// Default metrics (Prometheus) port.
pub const DEFAULT_METRICS_PORT: u16 = 9841;

/// Default data directory, relative to the working directory.
pub const DEFAULT_DATA_DIR: &str = ".reserve";

/// Network labels a node may be initialized for.
pub const NETWORKS: [&str; 3] = ["devnet", "testnet", "mainnet"];

/// Returns `10^exp`, or `None` if it does not fit in a `u128`.
pub fn pow10(exp: u32) -> Option<u128> {
    if exp > MAX_DECIMAL_SHIFT {
        return None;
    }
    10u128.checked_pow(exp)
}
