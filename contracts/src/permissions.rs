//! # Permission Registry
//!
//! A tagged-variant table keyed by `(category, address)`. Changes go through
//! queue → wait → toggle, one [`TimelockEntry`] per key. Category behavior
//! (which delay class, what gets bound on toggle) is a lookup in
//! [`PermissionCategory::policy`], not branching scattered across callers.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use reserve_protocol::{Address, Timestamp};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::timelock::{TimelockEntry, TimelockError};

// ---------------------------------------------------------------------------
// Categories
// ---------------------------------------------------------------------------

/// A privilege class gating one treasury operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PermissionCategory {
    ReserveDepositor,
    ReserveSpender,
    ReserveToken,
    ReserveManager,
    LiquidityDepositor,
    LiquidityToken,
    LiquidityManager,
    Debtor,
    RewardManager,
    StakedToken,
}

/// Which delay a category uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CategoryClass {
    /// Grants a role to an account.
    Address,
    /// Changes token-list membership. Longer delay.
    Token,
}

/// Side effect a toggle has beyond flipping the flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Binding {
    None,
    /// `payment_address` becomes the reward distribution target.
    Distribution,
    /// `payment_address` becomes the liquidity valuation calculator.
    Calculator,
    /// The toggled address becomes the staked token (debt ceiling source).
    StakedToken,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CategoryPolicy {
    pub class: CategoryClass,
    pub binding: Binding,
}

impl PermissionCategory {
    pub const ALL: [PermissionCategory; 10] = [
        Self::ReserveDepositor,
        Self::ReserveSpender,
        Self::ReserveToken,
        Self::ReserveManager,
        Self::LiquidityDepositor,
        Self::LiquidityToken,
        Self::LiquidityManager,
        Self::Debtor,
        Self::RewardManager,
        Self::StakedToken,
    ];

    pub const fn policy(self) -> CategoryPolicy {
        use Binding as B;
        use CategoryClass as C;
        let (class, binding) = match self {
            Self::ReserveDepositor => (C::Address, B::None),
            Self::ReserveSpender => (C::Address, B::None),
            Self::ReserveToken => (C::Token, B::None),
            Self::ReserveManager => (C::Address, B::None),
            Self::LiquidityDepositor => (C::Address, B::None),
            Self::LiquidityToken => (C::Token, B::Calculator),
            Self::LiquidityManager => (C::Address, B::None),
            Self::Debtor => (C::Address, B::None),
            Self::RewardManager => (C::Address, B::Distribution),
            Self::StakedToken => (C::Token, B::StakedToken),
        };
        CategoryPolicy { class, binding }
    }

    /// Stable one-byte tag used in storage keys.
    pub const fn as_byte(self) -> u8 {
        match self {
            Self::ReserveDepositor => 0,
            Self::ReserveSpender => 1,
            Self::ReserveToken => 2,
            Self::ReserveManager => 3,
            Self::LiquidityDepositor => 4,
            Self::LiquidityToken => 5,
            Self::LiquidityManager => 6,
            Self::Debtor => 7,
            Self::RewardManager => 8,
            Self::StakedToken => 9,
        }
    }

    pub fn from_byte(b: u8) -> Option<Self> {
        Self::ALL.get(b as usize).copied()
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ReserveDepositor => "reserve-depositor",
            Self::ReserveSpender => "reserve-spender",
            Self::ReserveToken => "reserve-token",
            Self::ReserveManager => "reserve-manager",
            Self::LiquidityDepositor => "liquidity-depositor",
            Self::LiquidityToken => "liquidity-token",
            Self::LiquidityManager => "liquidity-manager",
            Self::Debtor => "debtor",
            Self::RewardManager => "reward-manager",
            Self::StakedToken => "staked-token",
        }
    }
}

impl fmt::Display for PermissionCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown permission category: {0}")]
pub struct UnknownCategory(pub String);

impl FromStr for PermissionCategory {
    type Err = UnknownCategory;

    /// Accepts `reserve-depositor`, `reserve_depositor` and
    /// `RESERVE_DEPOSITOR`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == normalized)
            .ok_or_else(|| UnknownCategory(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PermissionKey {
    pub category: PermissionCategory,
    pub address: Address,
}

impl PermissionKey {
    pub fn new(category: PermissionCategory, address: Address) -> Self {
        Self { category, address }
    }

    /// `category byte ++ address bytes`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(21);
        out.push(self.category.as_byte());
        out.extend_from_slice(self.address.as_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let (&tag, rest) = bytes.split_first()?;
        let category = PermissionCategory::from_byte(tag)?;
        let address = Address::from_bytes(rest.try_into().ok()?);
        Some(Self { category, address })
    }
}

/// Active flags, pending changes and per-key bindings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionRegistry {
    pub(crate) active: BTreeMap<PermissionKey, bool>,
    pub(crate) pending: BTreeMap<PermissionKey, TimelockEntry>,
    pub(crate) bindings: BTreeMap<PermissionKey, Address>,
}

impl PermissionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates or replaces the pending change for `key`, restarting its
    /// clock. Returns the maturity timestamp.
    pub fn queue(&mut self, key: PermissionKey, now: Timestamp, delay: u64) -> Timestamp {
        self.pending
            .entry(key)
            .or_insert_with(|| TimelockEntry::new(delay))
            .restart(now, delay)
    }

    /// Checks that `key` has a matured pending change. Does not mutate.
    pub fn check_matured(&self, key: &PermissionKey, now: Timestamp) -> Result<(), TimelockError> {
        self.pending
            .get(key)
            .ok_or(TimelockError::NothingPending)?
            .ensure_matured(now)
    }

    /// Removes the pending change for `key`.
    pub fn consume(&mut self, key: &PermissionKey) -> Option<TimelockEntry> {
        self.pending.remove(key)
    }

    pub fn set(&mut self, key: PermissionKey, active: bool) {
        self.active.insert(key, active);
    }

    pub fn is_active(&self, key: &PermissionKey) -> bool {
        self.active.get(key).copied().unwrap_or(false)
    }

    pub fn pending(&self, key: &PermissionKey) -> Option<&TimelockEntry> {
        self.pending.get(key)
    }

    pub fn binding(&self, key: &PermissionKey) -> Option<Address> {
        self.bindings.get(key).copied()
    }

    pub fn bind(&mut self, key: PermissionKey, target: Address) {
        self.bindings.insert(key, target);
    }

    pub fn unbind(&mut self, key: &PermissionKey) {
        self.bindings.remove(key);
    }

    /// Every address currently active under `category`.
    pub fn holders(&self, category: PermissionCategory) -> impl Iterator<Item = Address> + '_ {
        self.active
            .iter()
            .filter(move |(k, on)| k.category == category && **on)
            .map(|(k, _)| k.address)
    }

    pub fn pending_changes(&self) -> impl Iterator<Item = (&PermissionKey, &TimelockEntry)> {
        self.pending.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(category: PermissionCategory, label: &str) -> PermissionKey {
        PermissionKey::new(category, Address::from_label(label))
    }

    #[test]
    fn token_categories_use_token_class() {
        for c in PermissionCategory::ALL {
            let expected = matches!(
                c,
                PermissionCategory::ReserveToken
                    | PermissionCategory::LiquidityToken
                    | PermissionCategory::StakedToken
            );
            assert_eq!(c.policy().class == CategoryClass::Token, expected, "{c}");
        }
    }

    #[test]
    fn category_bytes_are_dense_and_stable() {
        for (i, c) in PermissionCategory::ALL.into_iter().enumerate() {
            assert_eq!(c.as_byte() as usize, i);
            assert_eq!(PermissionCategory::from_byte(c.as_byte()), Some(c));
        }
        assert_eq!(PermissionCategory::from_byte(10), None);
    }

    #[test]
    fn category_parses_common_spellings() {
        assert_eq!(
            "reserve-depositor".parse::<PermissionCategory>(),
            Ok(PermissionCategory::ReserveDepositor)
        );
        assert_eq!(
            "REWARD_MANAGER".parse::<PermissionCategory>(),
            Ok(PermissionCategory::RewardManager)
        );
        assert!("treasurer".parse::<PermissionCategory>().is_err());
    }

    #[test]
    fn category_serializes_screaming_snake() {
        let json = serde_json::to_string(&PermissionCategory::LiquidityToken).unwrap();
        assert_eq!(json, "\"LIQUIDITY_TOKEN\"");
    }

    #[test]
    fn key_bytes_roundtrip() {
        let k = key(PermissionCategory::Debtor, "alice");
        let bytes = k.to_bytes();
        assert_eq!(bytes.len(), 21);
        assert_eq!(PermissionKey::from_bytes(&bytes), Some(k));
        assert_eq!(PermissionKey::from_bytes(&bytes[..5]), None);
    }

    #[test]
    fn requeue_restarts_timer() {
        let mut reg = PermissionRegistry::new();
        let k = key(PermissionCategory::Debtor, "alice");
        reg.queue(k, 100, 50);
        reg.queue(k, 120, 50);
        assert!(matches!(
            reg.check_matured(&k, 150),
            Err(TimelockError::NotMatured { matures_at: 170, .. })
        ));
        assert!(reg.check_matured(&k, 170).is_ok());
    }

    #[test]
    fn unqueued_key_is_not_matured() {
        let reg = PermissionRegistry::new();
        let k = key(PermissionCategory::Debtor, "alice");
        assert_eq!(reg.check_matured(&k, u64::MAX), Err(TimelockError::NothingPending));
    }

    #[test]
    fn holders_lists_active_only() {
        let mut reg = PermissionRegistry::new();
        reg.set(key(PermissionCategory::Debtor, "alice"), true);
        reg.set(key(PermissionCategory::Debtor, "bob"), false);
        reg.set(key(PermissionCategory::ReserveManager, "carol"), true);
        let debtors: Vec<_> = reg.holders(PermissionCategory::Debtor).collect();
        assert_eq!(debtors, vec![Address::from_label("alice")]);
    }
}
