//! # Ledger Persistence
//!
//! Maps [`TreasuryState`], [`VaultState`] and the asset book onto the
//! prefixed record layout of [`TreasuryDb`]. Each save rewrites the whole
//! ledger in one atomic batch; records that no longer exist in memory (a
//! consumed pending change, say) are dropped in the same batch.
//!
//! Keys are `prefix ++ category byte ++ address` for per-key permission
//! records, `prefix ++ address` for tokens and `prefix ++ debtor ++ token`
//! for debt.

use reserve_protocol::storage::{DbError, TreasuryDb, WriteBatch};
use reserve_protocol::types::ADDRESS_LENGTH;
use reserve_protocol::{Address, Amount, MemoryAssets};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

use crate::ownable::Management;
use crate::permissions::{PermissionKey, PermissionRegistry};
use crate::timelock::TimelockEntry;
use crate::treasury::{DebtKey, ReserveTokenInfo, TreasuryConfig, TreasuryState};
use crate::vault_owned::VaultState;

const PERM: &[u8] = b"perm/";
const PEND: &[u8] = b"pend/";
const TOKN: &[u8] = b"tokn/";
const DEBT: &[u8] = b"debt/";
const BIND: &[u8] = b"bind/";

const META_TREASURY: &[u8] = b"meta/treasury";
const META_VAULT: &[u8] = b"meta/vault";
const META_ASSETS: &[u8] = b"meta/assets";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Db(#[from] DbError),

    #[error("malformed {prefix} key: {key}")]
    CorruptKey { prefix: String, key: String },

    #[error("ledger store is missing {0}")]
    Missing(&'static str),
}

/// The scalar part of a [`TreasuryState`]; maps and sets live under their
/// own prefixes.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TreasuryHeader {
    address: Address,
    config: TreasuryConfig,
    management: Management,
    total_reserves: Amount,
    total_debt: Amount,
    staked_token: Option<Address>,
}

/// Everything a host needs to resume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredLedger {
    pub treasury: TreasuryState,
    pub vault: VaultState,
    pub assets: MemoryAssets,
}

/// sled-backed store for the whole ledger.
#[derive(Debug, Clone)]
pub struct LedgerStore {
    db: TreasuryDb,
}

fn with_prefix(prefix: &[u8], rest: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(prefix.len() + rest.len());
    key.extend_from_slice(prefix);
    key.extend_from_slice(rest);
    key
}

fn corrupt(prefix: &[u8], key: &[u8]) -> StoreError {
    StoreError::CorruptKey {
        prefix: String::from_utf8_lossy(prefix).into_owned(),
        key: hex::encode(key),
    }
}

fn permission_key(prefix: &[u8], raw: &[u8]) -> Result<PermissionKey, StoreError> {
    PermissionKey::from_bytes(raw).ok_or_else(|| corrupt(prefix, raw))
}

fn address_key(prefix: &[u8], raw: &[u8]) -> Result<Address, StoreError> {
    let bytes: [u8; ADDRESS_LENGTH] = raw.try_into().map_err(|_| corrupt(prefix, raw))?;
    Ok(Address::from_bytes(bytes))
}

impl LedgerStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        Ok(Self {
            db: TreasuryDb::open(path)?,
        })
    }

    pub fn open_temporary() -> Result<Self, StoreError> {
        Ok(Self {
            db: TreasuryDb::open_temporary()?,
        })
    }

    /// `true` if nothing has been saved yet.
    pub fn is_fresh(&self) -> bool {
        self.db.is_fresh()
    }

    pub fn record_count(&self) -> usize {
        self.db.record_count()
    }

    /// Hex BLAKE3 fingerprint of everything on disk.
    pub fn digest_hex(&self) -> Result<String, StoreError> {
        Ok(hex::encode(self.db.digest()?))
    }

    /// Writes the full ledger atomically.
    pub fn save(
        &self,
        treasury: &TreasuryState,
        vault: &VaultState,
        assets: &MemoryAssets,
    ) -> Result<(), StoreError> {
        let mut batch = WriteBatch::new();
        let registry = &treasury.registry;

        for (key, active) in &registry.active {
            batch.put(with_prefix(PERM, &key.to_bytes()), active)?;
        }
        for (key, entry) in &registry.pending {
            batch.put(with_prefix(PEND, &key.to_bytes()), entry)?;
        }
        for (key, target) in &registry.bindings {
            batch.put(with_prefix(BIND, &key.to_bytes()), target)?;
        }
        for (address, info) in &treasury.tokens {
            batch.put(with_prefix(TOKN, address.as_bytes()), info)?;
        }
        for (key, amount) in &treasury.debts {
            let mut raw = key.debtor.as_bytes().to_vec();
            raw.extend_from_slice(key.token.as_bytes());
            batch.put(with_prefix(DEBT, &raw), amount)?;
        }

        let header = TreasuryHeader {
            address: treasury.address,
            config: treasury.config.clone(),
            management: treasury.management,
            total_reserves: treasury.total_reserves,
            total_debt: treasury.total_debt,
            staked_token: treasury.staked_token,
        };
        batch.put(META_TREASURY, &header)?;
        batch.put(META_VAULT, vault)?;
        batch.put(META_ASSETS, assets)?;

        let records = batch.len();
        self.db.replace_all(&[PERM, PEND, BIND, TOKN, DEBT], batch)?;
        debug!(records, "ledger saved");
        Ok(())
    }

    /// Reads the full ledger back, or `None` if nothing was ever saved.
    pub fn load(&self) -> Result<Option<StoredLedger>, StoreError> {
        let header: TreasuryHeader = match self.db.get(META_TREASURY)? {
            Some(h) => h,
            None => return Ok(None),
        };
        let vault: VaultState = self.db.get(META_VAULT)?.ok_or(StoreError::Missing("vault state"))?;
        let assets: MemoryAssets = self
            .db
            .get(META_ASSETS)?
            .ok_or(StoreError::Missing("asset book"))?;

        let mut registry = PermissionRegistry::new();
        for (raw, active) in self.db.scan_prefix::<bool>(PERM)? {
            registry.active.insert(permission_key(PERM, &raw)?, active);
        }
        for (raw, entry) in self.db.scan_prefix::<TimelockEntry>(PEND)? {
            registry.pending.insert(permission_key(PEND, &raw)?, entry);
        }
        for (raw, target) in self.db.scan_prefix::<Address>(BIND)? {
            registry.bindings.insert(permission_key(BIND, &raw)?, target);
        }

        let mut treasury = TreasuryState::new(header.address, Address::ZERO, header.config);
        treasury.management = header.management;
        treasury.registry = registry;
        treasury.total_reserves = header.total_reserves;
        treasury.total_debt = header.total_debt;
        treasury.staked_token = header.staked_token;

        for (raw, info) in self.db.scan_prefix::<ReserveTokenInfo>(TOKN)? {
            treasury.tokens.insert(address_key(TOKN, &raw)?, info);
        }
        for (raw, amount) in self.db.scan_prefix::<Amount>(DEBT)? {
            if raw.len() != 2 * ADDRESS_LENGTH {
                return Err(corrupt(DEBT, &raw));
            }
            let (debtor, token) = raw.split_at(ADDRESS_LENGTH);
            let key = DebtKey {
                debtor: address_key(DEBT, debtor)?,
                token: address_key(DEBT, token)?,
            };
            treasury.debts.insert(key, amount);
        }

        info!(
            tokens = treasury.tokens.len(),
            debts = treasury.debts.len(),
            pending = treasury.registry.pending.len(),
            "ledger loaded"
        );
        Ok(Some(StoredLedger {
            treasury,
            vault,
            assets,
        }))
    }

    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permissions::PermissionCategory;

    fn sample() -> StoredLedger {
        let owner = Address::from_label("owner");
        let dai = Address::from_label("dai");
        let alice = Address::from_label("alice");
        let mut treasury = TreasuryState::new(
            Address::from_label("treasury"),
            owner,
            TreasuryConfig::new(Address::from_label("backed")),
        );
        treasury
            .registry
            .set(PermissionKey::new(PermissionCategory::Debtor, alice), true);
        treasury
            .registry
            .queue(PermissionKey::new(PermissionCategory::ReserveManager, alice), 10, 20);
        treasury.registry.bind(
            PermissionKey::new(PermissionCategory::RewardManager, alice),
            Address::from_label("distributor"),
        );
        treasury.tokens.insert(
            dai,
            ReserveTokenInfo {
                address: dai,
                decimals: 18,
                kind: crate::treasury::TokenKind::Reserve,
                calculator: None,
                is_active: true,
            },
        );
        treasury.debts.insert(DebtKey { debtor: alice, token: dai }, 500);
        treasury.total_reserves = 1_000;
        treasury.total_debt = 500;

        let mut assets = MemoryAssets::new();
        assets.register_token(dai, 18).unwrap();

        StoredLedger {
            treasury,
            vault: VaultState::new(owner, Address::from_label("vault"), 172_800),
            assets,
        }
    }

    #[test]
    fn empty_store_loads_nothing() {
        let store = LedgerStore::open_temporary().unwrap();
        assert!(store.is_fresh());
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn save_then_load_restores_everything() {
        let store = LedgerStore::open_temporary().unwrap();
        let ledger = sample();
        store.save(&ledger.treasury, &ledger.vault, &ledger.assets).unwrap();
        assert!(!store.is_fresh());
        assert_eq!(store.load().unwrap(), Some(ledger));
    }

    #[test]
    fn consumed_records_are_dropped() {
        let store = LedgerStore::open_temporary().unwrap();
        let mut ledger = sample();
        store.save(&ledger.treasury, &ledger.vault, &ledger.assets).unwrap();
        let before = store.record_count();

        let key = PermissionKey::new(PermissionCategory::ReserveManager, Address::from_label("alice"));
        ledger.treasury.registry.consume(&key);
        store.save(&ledger.treasury, &ledger.vault, &ledger.assets).unwrap();

        assert_eq!(store.record_count(), before - 1);
        let loaded = store.load().unwrap().unwrap();
        assert!(loaded.treasury.registry.pending(&key).is_none());
    }

    #[test]
    fn digest_tracks_content() {
        let a = LedgerStore::open_temporary().unwrap();
        let b = LedgerStore::open_temporary().unwrap();
        let ledger = sample();
        a.save(&ledger.treasury, &ledger.vault, &ledger.assets).unwrap();
        b.save(&ledger.treasury, &ledger.vault, &ledger.assets).unwrap();
        assert_eq!(a.digest_hex().unwrap(), b.digest_hex().unwrap());

        let mut changed = ledger.clone();
        changed.treasury.total_debt = 0;
        b.save(&changed.treasury, &changed.vault, &changed.assets).unwrap();
        assert_ne!(a.digest_hex().unwrap(), b.digest_hex().unwrap());
    }

    #[test]
    fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = sample();
        {
            let store = LedgerStore::open(dir.path()).unwrap();
            store.save(&ledger.treasury, &ledger.vault, &ledger.assets).unwrap();
        }
        let store = LedgerStore::open(dir.path()).unwrap();
        assert_eq!(store.load().unwrap(), Some(ledger));
    }
}
