//! # Ledger Host
//!
//! Owns the live treasury and vault pointer behind one lock, persists after
//! every committed operation, and rolls back in memory when a save fails.
//! Operations are applied one at a time, so the ledger never observes two
//! interleaved mutations.

use parking_lot::Mutex;
use reserve_contracts::{
    LedgerStore, ManagementError, StoreError, Treasury, TreasuryError, VaultError, VaultOwned,
    VaultState,
};
use reserve_protocol::{Address, AssetError, Clock, MemoryAssets};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::config::NodeConfig;
use crate::metrics::SharedMetrics;

/// The clock shared by the treasury and the vault pointer.
pub type SharedClock = Arc<dyn Clock>;

#[derive(Debug, Error)]
pub enum HostError {
    #[error(transparent)]
    Treasury(#[from] TreasuryError),

    #[error(transparent)]
    Vault(#[from] VaultError),

    #[error(transparent)]
    Asset(#[from] AssetError),

    #[error("failed to persist ledger: {0}")]
    Store(#[from] StoreError),
}

impl HostError {
    /// The caller lacks a role or is not the controller.
    pub fn is_unauthorized(&self) -> bool {
        matches!(
            self,
            HostError::Treasury(TreasuryError::Unauthorized { .. })
                | HostError::Treasury(TreasuryError::Management(
                    ManagementError::NotController { .. }
                        | ManagementError::NotPendingController { .. }
                ))
                | HostError::Vault(VaultError::Unauthorized { .. })
                | HostError::Vault(VaultError::Management(
                    ManagementError::NotController { .. }
                        | ManagementError::NotPendingController { .. }
                ))
        )
    }

    /// The request is well-formed but the timelock state forbids it now.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            HostError::Treasury(TreasuryError::NotMatured { .. })
                | HostError::Treasury(TreasuryError::Management(
                    ManagementError::NoHandoverPending
                ))
                | HostError::Vault(
                    VaultError::AlreadyPending { .. }
                        | VaultError::NothingPending
                        | VaultError::Timelocked { .. }
                        | VaultError::Management(ManagementError::NoHandoverPending)
                )
        )
    }

    /// Short machine-readable tag for API clients.
    pub fn kind(&self) -> &'static str {
        match self {
            HostError::Store(_) => "storage",
            _ if self.is_unauthorized() => "unauthorized",
            _ if self.is_conflict() => "timelocked",
            HostError::Asset(_) | HostError::Treasury(TreasuryError::Asset(_)) => "asset",
            _ => "rejected",
        }
    }
}

/// The live ledger.
pub struct Ledger {
    pub treasury: Treasury<MemoryAssets, SharedClock>,
    pub vault: VaultOwned<SharedClock>,
}

pub struct Host {
    ledger: Mutex<Ledger>,
    store: LedgerStore,
    metrics: SharedMetrics,
}

impl Host {
    /// Resumes the ledger saved in `store`, or seeds a fresh one from
    /// `config` when the store is empty.
    pub fn open(
        store: LedgerStore,
        config: &NodeConfig,
        clock: SharedClock,
        metrics: SharedMetrics,
    ) -> Result<Self, HostError> {
        let ledger = match store.load()? {
            Some(stored) => {
                info!(
                    treasury = %stored.treasury.address,
                    tokens = stored.treasury.tokens.len(),
                    "resuming saved ledger"
                );
                Ledger {
                    treasury: Treasury::from_state(stored.treasury, stored.assets, clock.clone())
                        .with_oracle(config.oracle()),
                    vault: VaultOwned::from_state(stored.vault, clock),
                }
            }
            None => {
                let mut assets = MemoryAssets::new();
                assets.register_token(config.backed_token, config.mint_decimals)?;
                let treasury = Treasury::new(
                    config.treasury_address,
                    config.controller,
                    config.treasury_config(),
                    assets,
                    clock.clone(),
                )
                .with_oracle(config.oracle());
                let vault = VaultOwned::from_state(
                    VaultState::new(config.controller, Address::ZERO, config.vault_delay_secs),
                    clock,
                );
                store.save(treasury.state(), vault.state(), treasury.assets())?;
                info!(
                    treasury = %config.treasury_address,
                    controller = %config.controller,
                    "seeded fresh ledger"
                );
                Ledger { treasury, vault }
            }
        };

        metrics.observe(&ledger.treasury.summary());
        Ok(Self {
            ledger: Mutex::new(ledger),
            store,
            metrics,
        })
    }

    /// Runs a read-only closure against the ledger.
    pub fn read<R>(&self, f: impl FnOnce(&Ledger) -> R) -> R {
        f(&self.ledger.lock())
    }

    /// Runs a mutating operation and persists the result. A rejected
    /// operation leaves the ledger untouched; a failed save restores the
    /// pre-operation state.
    pub fn apply<R, E>(&self, op: &'static str, f: impl FnOnce(&mut Ledger) -> Result<R, E>) -> Result<R, HostError>
    where
        E: Into<HostError>,
    {
        let started = Instant::now();
        let mut ledger = self.ledger.lock();

        let treasury_before = ledger.treasury.state().clone();
        let assets_before = ledger.treasury.assets().clone();
        let vault_before = ledger.vault.state().clone();

        let outcome = f(&mut ledger).map_err(Into::into);
        let result = match outcome {
            Ok(value) => {
                let saved = self.store.save(
                    ledger.treasury.state(),
                    ledger.vault.state(),
                    ledger.treasury.assets(),
                );
                match saved {
                    Ok(()) => Ok(value),
                    Err(e) => {
                        error!(op, error = %e, "save failed, rolling back");
                        ledger.treasury.restore(treasury_before, assets_before);
                        ledger.vault.restore(vault_before);
                        Err(HostError::Store(e))
                    }
                }
            }
            Err(e) => Err(e),
        };

        match &result {
            Ok(_) => {
                self.metrics.operations_total.with_label_values(&[op]).inc();
                self.metrics.observe(&ledger.treasury.summary());
            }
            Err(e) => {
                warn!(op, error = %e, "operation rejected");
                self.metrics.rejections_total.with_label_values(&[op]).inc();
            }
        }
        self.metrics
            .operation_latency_seconds
            .observe(started.elapsed().as_secs_f64());
        result
    }

    pub fn store(&self) -> &LedgerStore {
        &self.store
    }

    /// Flushes the store. Called on shutdown.
    pub fn flush(&self) -> Result<(), HostError> {
        self.store.flush()?;
        Ok(())
    }
}
