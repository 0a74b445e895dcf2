//! # Node Configuration
//!
//! `config.json` in the data directory. Written once by `init`; read by
//! `run` to seed a fresh ledger and to build the valuation oracle. After
//! the first start the treasury's own policy lives in the ledger store, so
//! editing delays here does not loosen an existing deployment.

use anyhow::{Context, Result};
use reserve_contracts::{PermissionCategory, TreasuryConfig};
use reserve_protocol::config::{
    ADDRESS_CATEGORY_DELAY, MINT_DECIMALS, TOKEN_CATEGORY_DELAY, VAULT_TIMELOCK_DELAY,
};
use reserve_protocol::{Address, Amount, FixedRateOracle};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// File name inside the data directory.
pub const CONFIG_FILE: &str = "config.json";

/// A fixed-rate liquidity valuation served by `calculator`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateConfig {
    pub calculator: Address,
    pub numerator: Amount,
    pub denominator: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    pub network: String,
    pub controller: Address,
    pub treasury_address: Address,
    pub backed_token: Address,
    pub mint_decimals: u8,
    pub vault_delay_secs: u64,
    pub address_delay_secs: u64,
    pub token_delay_secs: u64,
    #[serde(default)]
    pub delay_overrides: BTreeMap<PermissionCategory, u64>,
    #[serde(default)]
    pub liquidity_rates: Vec<RateConfig>,
}

impl NodeConfig {
    /// Protocol defaults for `network`, controlled by `controller`.
    pub fn new(network: &str, controller: Address) -> Self {
        Self {
            network: network.to_string(),
            controller,
            treasury_address: Address::from_label(&format!("{network}/treasury")),
            backed_token: Address::from_label(&format!("{network}/backed-token")),
            mint_decimals: MINT_DECIMALS,
            vault_delay_secs: VAULT_TIMELOCK_DELAY.as_secs(),
            address_delay_secs: ADDRESS_CATEGORY_DELAY.as_secs(),
            token_delay_secs: TOKEN_CATEGORY_DELAY.as_secs(),
            delay_overrides: BTreeMap::new(),
            liquidity_rates: Vec::new(),
        }
    }

    pub fn treasury_config(&self) -> TreasuryConfig {
        TreasuryConfig {
            mint_decimals: self.mint_decimals,
            backed_token: self.backed_token,
            address_delay_secs: self.address_delay_secs,
            token_delay_secs: self.token_delay_secs,
            delay_overrides: self.delay_overrides.clone(),
        }
    }

    pub fn oracle(&self) -> FixedRateOracle {
        self.liquidity_rates
            .iter()
            .fold(FixedRateOracle::new(), |oracle, r| {
                oracle.with_rate(r.calculator, r.numerator, r.denominator)
            })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read(path)
            .with_context(|| format!("failed to read config at {}", path.display()))?;
        serde_json::from_slice(&raw)
            .with_context(|| format!("invalid config at {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let raw = serde_json::to_vec_pretty(self).context("failed to encode config")?;
        std::fs::write(path, raw)
            .with_context(|| format!("failed to write config to {}", path.display()))
    }
}
