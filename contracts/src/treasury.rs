//! # Treasury Ledger
//!
//! Custodies reserve tokens, mints the backed token against them, and lends
//! reserves out as per-token debt. Every privileged operation is gated by a
//! permission from the [`PermissionRegistry`], and every permission change
//! goes through queue → timelock → toggle.
//!
//! ## Accounting
//!
//! All aggregate counters are in backed-token units:
//!
//! - `total_reserves` grows on deposit by the deposit's value and shrinks on
//!   manage and withdraw. Lending does not shrink it; outstanding debt is a
//!   receivable and still counts as backing.
//! - `total_debt` is the sum over debt entries of each entry's value. Debt
//!   entries themselves are kept in token units, so a debtor always repays
//!   in the token they borrowed.
//! - Excess reserves are `total_reserves - max(backed_supply, total_debt)`.
//!
//! ## Atomicity
//!
//! Every operation validates first and mutates last. Balance and allowance
//! checks run against the asset ledger before any transfer, so the asset
//! calls that follow cannot fail and no rollback path exists.

use std::collections::BTreeMap;
use std::fmt;

use reserve_protocol::config::{
    pow10, ADDRESS_CATEGORY_DELAY, MINT_DECIMALS, TOKEN_CATEGORY_DELAY,
};
use reserve_protocol::{
    Address, Amount, AssetError, AssetLedger, Clock, NoOracle, OracleError, Timestamp, ValueOracle,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::ownable::{Management, ManagementError};
use crate::permissions::{
    Binding, CategoryClass, PermissionCategory, PermissionKey, PermissionRegistry,
};
use crate::timelock::{TimelockEntry, TimelockError};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// What the caller was missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Controller,
    Permission(PermissionCategory),
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Controller => f.write_str("controller"),
            Role::Permission(c) => write!(f, "{c}"),
        }
    }
}

/// Errors from treasury operations. Every variant is a terminal rejection
/// that left the ledger untouched.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TreasuryError {
    /// The caller lacks the role the operation requires.
    #[error("{caller} lacks the {role} role")]
    Unauthorized { caller: Address, role: Role },

    /// No matured pending change exists for the key.
    #[error("{category} change for {address} not matured (matures at {matures_at:?}, now {now})")]
    NotMatured {
        category: PermissionCategory,
        address: Address,
        /// `None` when nothing was queued at all.
        matures_at: Option<Timestamp>,
        now: Timestamp,
    },

    /// The token is not an active reserve or liquidity token.
    #[error("{0} is not an accepted reserve token")]
    UnknownReserveToken(Address),

    /// Claimed profit exceeds the deposit's value.
    #[error("profit {profit} exceeds deposit value {value}")]
    InvalidProfit { profit: Amount, value: Amount },

    /// Borrowing would exceed unencumbered reserves.
    #[error("insufficient reserves: requested {requested}, available {available}")]
    InsufficientReserves { requested: Amount, available: Amount },

    /// Repaying more than is owed in this token.
    #[error("{debtor} owes {outstanding} of {token}, cannot repay {requested}")]
    ExceedsDebt {
        debtor: Address,
        token: Address,
        outstanding: Amount,
        requested: Amount,
    },

    /// Withdrawal would drive backing below 100%.
    #[error("exceeds excess reserves: requested {requested}, available {available}")]
    ExceedsExcessReserves { requested: Amount, available: Amount },

    /// Debtor's outstanding value would exceed their staked balance.
    #[error("{debtor} debt ceiling exceeded: ceiling {ceiling}, would owe {requested}")]
    DebtCeilingExceeded {
        debtor: Address,
        ceiling: Amount,
        requested: Amount,
    },

    /// A binding category was toggled on without a payment address.
    #[error("{category} requires a non-zero payment address")]
    MissingBinding { category: PermissionCategory },

    /// The token was once listed as the other kind. A token keeps its
    /// first kind for life, active or not.
    #[error("{token} is already listed as a different token kind")]
    TokenKindConflict { token: Address },

    /// The borrowed amount is below one unit of the mint's precision.
    #[error("borrowing {amount} of {token} adds no debt value")]
    DustAmount { token: Address, amount: Amount },

    #[error("asset error: {0}")]
    Asset(#[from] AssetError),

    #[error("oracle error: {0}")]
    Oracle(#[from] OracleError),

    #[error("management error: {0}")]
    Management(#[from] ManagementError),

    /// A counter would leave `u128`.
    #[error("arithmetic overflow")]
    Overflow,
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Policy knobs persisted with the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreasuryConfig {
    /// Decimal base of the backed token; deposits are normalized to it.
    pub mint_decimals: u8,
    /// The token minted against reserves.
    pub backed_token: Address,
    /// Delay for categories granting roles to accounts.
    pub address_delay_secs: u64,
    /// Delay for categories changing token-list membership.
    pub token_delay_secs: u64,
    /// Per-category delays that win over the class delay.
    #[serde(default)]
    pub delay_overrides: BTreeMap<PermissionCategory, u64>,
}

impl TreasuryConfig {
    pub fn new(backed_token: Address) -> Self {
        Self {
            backed_token,
            ..Self::default()
        }
    }

    pub fn delay_for(&self, category: PermissionCategory) -> u64 {
        if let Some(&d) = self.delay_overrides.get(&category) {
            return d;
        }
        match category.policy().class {
            CategoryClass::Address => self.address_delay_secs,
            CategoryClass::Token => self.token_delay_secs,
        }
    }

    pub fn with_delay(mut self, category: PermissionCategory, secs: u64) -> Self {
        self.delay_overrides.insert(category, secs);
        self
    }
}

impl Default for TreasuryConfig {
    fn default() -> Self {
        Self {
            mint_decimals: MINT_DECIMALS,
            backed_token: Address::ZERO,
            address_delay_secs: ADDRESS_CATEGORY_DELAY.as_secs(),
            token_delay_secs: TOKEN_CATEGORY_DELAY.as_secs(),
            delay_overrides: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenKind {
    /// Valued by decimal normalization.
    Reserve,
    /// Valued by an external calculator.
    Liquidity,
}

/// A token that is, or once was, accepted as backing. Never deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveTokenInfo {
    pub address: Address,
    pub decimals: u8,
    pub kind: TokenKind,
    pub calculator: Option<Address>,
    pub is_active: bool,
}

impl ReserveTokenInfo {
    fn category(&self) -> PermissionCategory {
        match self.kind {
            TokenKind::Reserve => PermissionCategory::ReserveToken,
            TokenKind::Liquidity => PermissionCategory::LiquidityToken,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DebtKey {
    pub debtor: Address,
    pub token: Address,
}

/// Everything the treasury persists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreasuryState {
    /// The treasury's own holder address in the asset ledger.
    pub address: Address,
    pub config: TreasuryConfig,
    pub management: Management,
    pub registry: PermissionRegistry,
    pub tokens: BTreeMap<Address, ReserveTokenInfo>,
    pub debts: BTreeMap<DebtKey, Amount>,
    pub total_reserves: Amount,
    pub total_debt: Amount,
    pub staked_token: Option<Address>,
}

impl TreasuryState {
    pub fn new(address: Address, controller: Address, config: TreasuryConfig) -> Self {
        Self {
            address,
            config,
            management: Management::new(controller),
            registry: PermissionRegistry::new(),
            tokens: BTreeMap::new(),
            debts: BTreeMap::new(),
            total_reserves: 0,
            total_debt: 0,
            staked_token: None,
        }
    }
}

/// Aggregate snapshot for status endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreasurySummary {
    pub address: Address,
    pub controller: Address,
    pub backed_token: Address,
    pub backed_supply: Amount,
    pub total_reserves: Amount,
    pub total_debt: Amount,
    pub excess_reserves: Amount,
    pub staked_token: Option<Address>,
    pub active_tokens: usize,
    pub pending_changes: usize,
}

/// Scales `amount` from `decimals` to `mint_decimals`. Scaling down
/// truncates.
pub fn normalize(amount: Amount, decimals: u8, mint_decimals: u8) -> Result<Amount, TreasuryError> {
    if mint_decimals >= decimals {
        let factor = pow10(u32::from(mint_decimals - decimals)).ok_or(TreasuryError::Overflow)?;
        amount.checked_mul(factor).ok_or(TreasuryError::Overflow)
    } else {
        match pow10(u32::from(decimals - mint_decimals)) {
            Some(factor) => Ok(amount / factor),
            // 10^39 and up exceeds any u128 amount.
            None => Ok(0),
        }
    }
}

// ---------------------------------------------------------------------------
// Treasury
// ---------------------------------------------------------------------------

/// The permissioned reserve and debt ledger.
pub struct Treasury<A: AssetLedger, C: Clock> {
    state: TreasuryState,
    assets: A,
    clock: C,
    oracle: Box<dyn ValueOracle>,
}

impl<A: AssetLedger, C: Clock> Treasury<A, C> {
    /// A fresh treasury with no oracle. Liquidity tokens cannot be valued
    /// until one is supplied with [`with_oracle`](Self::with_oracle).
    pub fn new(address: Address, controller: Address, config: TreasuryConfig, assets: A, clock: C) -> Self {
        Self::from_state(TreasuryState::new(address, controller, config), assets, clock)
    }

    pub fn from_state(state: TreasuryState, assets: A, clock: C) -> Self {
        Self {
            state,
            assets,
            clock,
            oracle: Box::new(NoOracle),
        }
    }

    pub fn with_oracle(mut self, oracle: impl ValueOracle + 'static) -> Self {
        self.oracle = Box::new(oracle);
        self
    }

    pub fn state(&self) -> &TreasuryState {
        &self.state
    }

    pub fn assets(&self) -> &A {
        &self.assets
    }

    /// Direct asset access for hosts (faucets, approvals). Treasury
    /// invariants only cover the treasury's own holdings.
    pub fn assets_mut(&mut self) -> &mut A {
        &mut self.assets
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Replaces state and assets wholesale. Used by hosts to roll back an
    /// operation whose persistence failed.
    pub fn restore(&mut self, state: TreasuryState, assets: A) {
        self.state = state;
        self.assets = assets;
    }

    // -----------------------------------------------------------------------
    // Checks
    // -----------------------------------------------------------------------

    fn ensure_controller(&self, caller: &Address, op: &str) -> Result<(), TreasuryError> {
        if self.state.management.is_controller(caller) {
            return Ok(());
        }
        warn!(caller = %caller, op, "rejected treasury call from non-controller");
        Err(TreasuryError::Unauthorized {
            caller: *caller,
            role: Role::Controller,
        })
    }

    fn ensure_permitted(&self, category: PermissionCategory, caller: &Address) -> Result<(), TreasuryError> {
        if self.is_permitted(category, caller) {
            return Ok(());
        }
        warn!(caller = %caller, category = %category, "rejected call without permission");
        Err(TreasuryError::Unauthorized {
            caller: *caller,
            role: Role::Permission(category),
        })
    }

    fn ensure_balance(&self, token: &Address, holder: &Address, amount: Amount) -> Result<(), TreasuryError> {
        let balance = self.assets.balance_of(token, holder);
        if balance < amount {
            return Err(AssetError::InsufficientBalance {
                token: *token,
                holder: *holder,
                balance,
                amount,
            }
            .into());
        }
        Ok(())
    }

    /// Checks that the treasury may pull `amount` of `token` from `owner`.
    fn ensure_pullable(&self, token: &Address, owner: &Address, amount: Amount) -> Result<(), TreasuryError> {
        let spender = self.state.address;
        let allowance = self.assets.allowance(token, owner, &spender);
        if allowance < amount {
            return Err(AssetError::InsufficientAllowance {
                token: *token,
                owner: *owner,
                spender,
                allowance,
                amount,
            }
            .into());
        }
        self.ensure_balance(token, owner, amount)
    }

    fn ensure_mintable(&self, amount: Amount) -> Result<(), TreasuryError> {
        let token = self.state.config.backed_token;
        self.assets.decimals(&token)?;
        self.assets
            .total_supply(&token)
            .checked_add(amount)
            .map(|_| ())
            .ok_or(TreasuryError::Asset(AssetError::Overflow(token)))
    }

    fn active_token(&self, token: &Address) -> Result<&ReserveTokenInfo, TreasuryError> {
        self.state
            .tokens
            .get(token)
            .filter(|info| info.is_active)
            .ok_or(TreasuryError::UnknownReserveToken(*token))
    }

    fn token_value(&self, info: &ReserveTokenInfo, amount: Amount) -> Result<Amount, TreasuryError> {
        match info.kind {
            TokenKind::Reserve => normalize(amount, info.decimals, self.state.config.mint_decimals),
            TokenKind::Liquidity => {
                let calculator = info.calculator.ok_or(TreasuryError::MissingBinding {
                    category: PermissionCategory::LiquidityToken,
                })?;
                Ok(self.oracle.valuation(&calculator, &info.address, amount)?)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Permission changes
    // -----------------------------------------------------------------------

    /// Queues a permission change for `(category, address)`, replacing any
    /// earlier request for the same key. Returns the maturity timestamp.
    pub fn queue(
        &mut self,
        caller: &Address,
        category: PermissionCategory,
        address: Address,
    ) -> Result<Timestamp, TreasuryError> {
        self.ensure_controller(caller, "queue")?;
        let now = self.clock.now();
        let delay = self.state.config.delay_for(category);
        let matures_at = self
            .state
            .registry
            .queue(PermissionKey::new(category, address), now, delay);
        info!(category = %category, address = %address, matures_at, "permission change queued");
        Ok(matures_at)
    }

    /// Flips the permission for a matured key and applies the category's
    /// binding. `payment` is ignored by categories without one. Returns the
    /// new state of the permission.
    pub fn toggle(
        &mut self,
        caller: &Address,
        category: PermissionCategory,
        address: Address,
        payment: Address,
    ) -> Result<bool, TreasuryError> {
        self.ensure_controller(caller, "toggle")?;
        let now = self.clock.now();
        let key = PermissionKey::new(category, address);
        self.state
            .registry
            .check_matured(&key, now)
            .map_err(|e| TreasuryError::NotMatured {
                category,
                address,
                matures_at: match e {
                    TimelockError::NotMatured { matures_at, .. } => Some(matures_at),
                    _ => None,
                },
                now,
            })?;

        let activate = !self.state.registry.is_active(&key);
        let policy = category.policy();

        // Validate and stage the token-list side effect before touching
        // anything.
        let kind = match category {
            PermissionCategory::ReserveToken => Some(TokenKind::Reserve),
            PermissionCategory::LiquidityToken => Some(TokenKind::Liquidity),
            _ => None,
        };
        let staged_info = match kind {
            Some(kind) if activate => {
                if let Some(existing) = self.state.tokens.get(&address) {
                    if existing.kind != kind {
                        return Err(TreasuryError::TokenKindConflict { token: address });
                    }
                }
                let calculator = match policy.binding {
                    Binding::Calculator if payment.is_zero() => {
                        return Err(TreasuryError::MissingBinding { category });
                    }
                    Binding::Calculator => Some(payment),
                    _ => None,
                };
                Some(ReserveTokenInfo {
                    address,
                    decimals: self.assets.decimals(&address)?,
                    kind,
                    calculator,
                    is_active: true,
                })
            }
            Some(_) => self
                .state
                .tokens
                .get(&address)
                .filter(|info| info.category() == category)
                .map(|info| ReserveTokenInfo {
                    is_active: false,
                    ..*info
                }),
            None => None,
        };
        if policy.binding == Binding::StakedToken && activate {
            // Must be a real token; its balance becomes the debt ceiling.
            self.assets.decimals(&address)?;
        }

        // Commit.
        let registry = &mut self.state.registry;
        registry.consume(&key);
        registry.set(key, activate);
        if let Some(info) = staged_info {
            self.state.tokens.insert(address, info);
        }
        match policy.binding {
            Binding::Distribution if activate && !payment.is_zero() => registry.bind(key, payment),
            Binding::Distribution | Binding::Calculator if !activate => registry.unbind(&key),
            Binding::Calculator => registry.bind(key, payment),
            Binding::StakedToken if activate => self.state.staked_token = Some(address),
            Binding::StakedToken => {
                if self.state.staked_token == Some(address) {
                    self.state.staked_token = None;
                }
            }
            _ => {}
        }

        info!(
            category = %category,
            address = %address,
            active = activate,
            "permission toggled"
        );
        Ok(activate)
    }

    // -----------------------------------------------------------------------
    // Reserve operations
    // -----------------------------------------------------------------------

    /// Deposits `amount` of `token`, minting `value - profit` of the backed
    /// token to the caller. Returns the amount minted.
    pub fn deposit(
        &mut self,
        caller: &Address,
        amount: Amount,
        token: &Address,
        profit: Amount,
    ) -> Result<Amount, TreasuryError> {
        let info = *self.active_token(token)?;
        let role = match info.kind {
            TokenKind::Reserve => PermissionCategory::ReserveDepositor,
            TokenKind::Liquidity => PermissionCategory::LiquidityDepositor,
        };
        self.ensure_permitted(role, caller)?;

        let value = self.token_value(&info, amount)?;
        if profit > value {
            return Err(TreasuryError::InvalidProfit { profit, value });
        }
        let minted = value - profit;
        let total_reserves = self
            .state
            .total_reserves
            .checked_add(value)
            .ok_or(TreasuryError::Overflow)?;
        self.ensure_pullable(token, caller, amount)?;
        self.ensure_mintable(minted)?;

        let treasury = self.state.address;
        let backed = self.state.config.backed_token;
        self.assets.transfer_from(token, &treasury, caller, &treasury, amount)?;
        self.assets.mint(&backed, caller, minted)?;
        self.state.total_reserves = total_reserves;

        info!(
            caller = %caller,
            token = %token,
            amount,
            value,
            minted,
            total_reserves,
            "reserves deposited"
        );
        Ok(minted)
    }

    /// Burns the caller's backed token and returns `amount` of reserve
    /// token. Returns the value burned.
    pub fn withdraw(&mut self, caller: &Address, amount: Amount, token: &Address) -> Result<Amount, TreasuryError> {
        let info = *self.active_token(token)?;
        if info.kind != TokenKind::Reserve {
            return Err(TreasuryError::UnknownReserveToken(*token));
        }
        self.ensure_permitted(PermissionCategory::ReserveSpender, caller)?;

        let value = self.token_value(&info, amount)?;
        let total_reserves = self.state.total_reserves.checked_sub(value).ok_or(
            TreasuryError::InsufficientReserves {
                requested: value,
                available: self.state.total_reserves,
            },
        )?;
        let backed = self.state.config.backed_token;
        let treasury = self.state.address;
        self.ensure_balance(&backed, caller, value)?;
        self.ensure_balance(token, &treasury, amount)?;

        self.assets.burn(&backed, caller, value)?;
        self.assets.transfer(token, &treasury, caller, amount)?;
        self.state.total_reserves = total_reserves;

        info!(caller = %caller, token = %token, amount, value, total_reserves, "reserves withdrawn");
        Ok(value)
    }

    /// Lends `amount` of a reserve token to the caller. Returns the value
    /// added to total debt.
    pub fn incur_debt(&mut self, caller: &Address, amount: Amount, token: &Address) -> Result<Amount, TreasuryError> {
        self.ensure_permitted(PermissionCategory::Debtor, caller)?;
        let info = *self.active_token(token)?;
        if info.kind != TokenKind::Reserve {
            return Err(TreasuryError::UnknownReserveToken(*token));
        }

        let key = DebtKey {
            debtor: *caller,
            token: *token,
        };
        let outstanding = self.debt_of(caller, token);
        let new_outstanding = outstanding.checked_add(amount).ok_or(TreasuryError::Overflow)?;
        // Valuing the whole entry keeps total_debt equal to the sum of entry
        // values under truncating normalization.
        let added = self.token_value(&info, new_outstanding)? - self.token_value(&info, outstanding)?;
        if amount > 0 && added == 0 {
            return Err(TreasuryError::DustAmount { token: *token, amount });
        }

        let available = self.state.total_reserves.saturating_sub(self.state.total_debt);
        if added > available {
            return Err(TreasuryError::InsufficientReserves {
                requested: added,
                available,
            });
        }
        if let Some(staked) = self.state.staked_token {
            let ceiling = self.assets.balance_of(&staked, caller);
            let requested = self
                .debtor_value(caller)?
                .checked_add(added)
                .ok_or(TreasuryError::Overflow)?;
            if requested > ceiling {
                return Err(TreasuryError::DebtCeilingExceeded {
                    debtor: *caller,
                    ceiling,
                    requested,
                });
            }
        }
        let total_debt = self
            .state
            .total_debt
            .checked_add(added)
            .ok_or(TreasuryError::Overflow)?;
        let treasury = self.state.address;
        self.ensure_balance(token, &treasury, amount)?;

        self.assets.transfer(token, &treasury, caller, amount)?;
        self.state.debts.insert(key, new_outstanding);
        self.state.total_debt = total_debt;

        info!(
            debtor = %caller,
            token = %token,
            amount,
            value = added,
            total_debt,
            "debt incurred"
        );
        Ok(added)
    }

    /// Repays debt in the token it was borrowed in. Works even after the
    /// token has been deactivated. Returns the value removed from total
    /// debt.
    pub fn repay_debt_with_reserve(
        &mut self,
        caller: &Address,
        amount: Amount,
        token: &Address,
    ) -> Result<Amount, TreasuryError> {
        let outstanding = self.debt_of(caller, token);
        if amount > outstanding {
            return Err(TreasuryError::ExceedsDebt {
                debtor: *caller,
                token: *token,
                outstanding,
                requested: amount,
            });
        }
        let info = *self
            .state
            .tokens
            .get(token)
            .ok_or(TreasuryError::UnknownReserveToken(*token))?;
        let remaining = outstanding - amount;
        let removed = self.token_value(&info, outstanding)? - self.token_value(&info, remaining)?;
        let total_debt = self
            .state
            .total_debt
            .checked_sub(removed)
            .ok_or(TreasuryError::Overflow)?;
        self.ensure_pullable(token, caller, amount)?;

        let treasury = self.state.address;
        self.assets.transfer_from(token, &treasury, caller, &treasury, amount)?;
        self.state.debts.insert(
            DebtKey {
                debtor: *caller,
                token: *token,
            },
            remaining,
        );
        self.state.total_debt = total_debt;

        info!(
            debtor = %caller,
            token = %token,
            amount,
            value = removed,
            total_debt,
            "debt repaid"
        );
        Ok(removed)
    }

    /// Takes `amount` of `token` out of the treasury. Active tokens may only
    /// leave up to excess reserves; anything else the treasury happens to
    /// hold carries no value and leaves freely. Returns the value removed.
    pub fn manage(&mut self, caller: &Address, token: &Address, amount: Amount) -> Result<Amount, TreasuryError> {
        let info = self.active_token(token).ok().copied();
        let role = match info.map(|i| i.kind) {
            Some(TokenKind::Liquidity) => PermissionCategory::LiquidityManager,
            _ => PermissionCategory::ReserveManager,
        };
        self.ensure_permitted(role, caller)?;

        let value = match &info {
            Some(info) => self.token_value(info, amount)?,
            None => 0,
        };
        let available = self.excess_reserves();
        if value > available {
            return Err(TreasuryError::ExceedsExcessReserves {
                requested: value,
                available,
            });
        }
        let total_reserves = self.state.total_reserves - value;
        let treasury = self.state.address;
        self.ensure_balance(token, &treasury, amount)?;

        self.assets.transfer(token, &treasury, caller, amount)?;
        self.state.total_reserves = total_reserves;

        info!(caller = %caller, token = %token, amount, value, total_reserves, "reserves managed");
        Ok(value)
    }

    /// Mints up to excess reserves of the backed token to the caller's
    /// bound distribution address, or to the caller if none is bound.
    /// Returns the recipient.
    pub fn mint_rewards(&mut self, caller: &Address, amount: Amount) -> Result<Address, TreasuryError> {
        self.ensure_permitted(PermissionCategory::RewardManager, caller)?;
        let available = self.excess_reserves();
        if amount > available {
            return Err(TreasuryError::ExceedsExcessReserves {
                requested: amount,
                available,
            });
        }
        self.ensure_mintable(amount)?;
        let recipient = self
            .state
            .registry
            .binding(&PermissionKey::new(PermissionCategory::RewardManager, *caller))
            .filter(|a| !a.is_zero())
            .unwrap_or(*caller);

        let backed = self.state.config.backed_token;
        self.assets.mint(&backed, &recipient, amount)?;

        info!(caller = %caller, recipient = %recipient, amount, "rewards minted");
        Ok(recipient)
    }

    /// Recomputes `total_reserves` from the treasury's actual holdings of
    /// active tokens plus outstanding debt. Callable by anyone.
    pub fn audit_reserves(&mut self) -> Result<Amount, TreasuryError> {
        let treasury = self.state.address;
        let mut total: Amount = 0;
        for info in self.state.tokens.values().filter(|i| i.is_active) {
            let held = self.assets.balance_of(&info.address, &treasury);
            let value = self.token_value(info, held)?;
            total = total.checked_add(value).ok_or(TreasuryError::Overflow)?;
        }
        let total = total
            .checked_add(self.state.total_debt)
            .ok_or(TreasuryError::Overflow)?;

        let previous = std::mem::replace(&mut self.state.total_reserves, total);
        info!(previous, total_reserves = total, "reserves audited");
        Ok(total)
    }

    // -----------------------------------------------------------------------
    // Management
    // -----------------------------------------------------------------------

    pub fn push_management(&mut self, caller: &Address, successor: Address) -> Result<(), TreasuryError> {
        self.state.management.push(caller, successor)?;
        info!(successor = %successor, "treasury management pushed");
        Ok(())
    }

    pub fn pull_management(&mut self, caller: &Address) -> Result<(), TreasuryError> {
        let previous = self.state.management.pull(caller)?;
        info!(previous = %previous, controller = %caller, "treasury management pulled");
        Ok(())
    }

    pub fn renounce_management(&mut self, caller: &Address) -> Result<(), TreasuryError> {
        self.state.management.renounce(caller)?;
        info!("treasury management renounced");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Value of `amount` of a listed token in backed-token units. Listed
    /// but deactivated tokens still value.
    pub fn value_of(&self, token: &Address, amount: Amount) -> Result<Amount, TreasuryError> {
        let info = self
            .state
            .tokens
            .get(token)
            .ok_or(TreasuryError::UnknownReserveToken(*token))?;
        self.token_value(info, amount)
    }

    pub fn backed_supply(&self) -> Amount {
        self.assets.total_supply(&self.state.config.backed_token)
    }

    pub fn excess_reserves(&self) -> Amount {
        let encumbered = self.backed_supply().max(self.state.total_debt);
        self.state.total_reserves.saturating_sub(encumbered)
    }

    pub fn total_reserves(&self) -> Amount {
        self.state.total_reserves
    }

    pub fn total_debt(&self) -> Amount {
        self.state.total_debt
    }

    pub fn debt_of(&self, debtor: &Address, token: &Address) -> Amount {
        self.state
            .debts
            .get(&DebtKey {
                debtor: *debtor,
                token: *token,
            })
            .copied()
            .unwrap_or(0)
    }

    /// Total value a debtor owes across all tokens.
    pub fn debtor_value(&self, debtor: &Address) -> Result<Amount, TreasuryError> {
        let mut total: Amount = 0;
        for (key, &amount) in self.state.debts.iter().filter(|(k, _)| k.debtor == *debtor) {
            let value = self.value_of(&key.token, amount)?;
            total = total.checked_add(value).ok_or(TreasuryError::Overflow)?;
        }
        debug!(debtor = %debtor, total, "debtor value computed");
        Ok(total)
    }

    pub fn is_permitted(&self, category: PermissionCategory, address: &Address) -> bool {
        self.state
            .registry
            .is_active(&PermissionKey::new(category, *address))
    }

    pub fn pending(&self, category: PermissionCategory, address: &Address) -> Option<TimelockEntry> {
        self.state
            .registry
            .pending(&PermissionKey::new(category, *address))
            .copied()
    }

    pub fn binding(&self, category: PermissionCategory, address: &Address) -> Option<Address> {
        self.state
            .registry
            .binding(&PermissionKey::new(category, *address))
    }

    /// Addresses currently holding `category`.
    pub fn holders(&self, category: PermissionCategory) -> Vec<Address> {
        self.state.registry.holders(category).collect()
    }

    pub fn reserve_token(&self, token: &Address) -> Option<&ReserveTokenInfo> {
        self.state.tokens.get(token)
    }

    pub fn controller(&self) -> Address {
        self.state.management.controller()
    }

    pub fn summary(&self) -> TreasurySummary {
        TreasurySummary {
            address: self.state.address,
            controller: self.controller(),
            backed_token: self.state.config.backed_token,
            backed_supply: self.backed_supply(),
            total_reserves: self.state.total_reserves,
            total_debt: self.state.total_debt,
            excess_reserves: self.excess_reserves(),
            staked_token: self.state.staked_token,
            active_tokens: self.state.tokens.values().filter(|i| i.is_active).count(),
            pending_changes: self.state.registry.pending_changes().count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reserve_protocol::{FixedRateOracle, ManualClock, MemoryAssets};

    const ADDR_DELAY: u64 = 172_800;
    const TOKEN_DELAY: u64 = 345_600;

    struct Fixture {
        treasury: Treasury<MemoryAssets, ManualClock>,
        clock: ManualClock,
        owner: Address,
        dai: Address,
        backed: Address,
    }

    fn fixture() -> Fixture {
        let owner = Address::from_label("owner");
        let dai = Address::from_label("dai");
        let backed = Address::from_label("backed");
        let mut assets = MemoryAssets::new();
        assets.register_token(dai, 18).unwrap();
        assets.register_token(backed, 9).unwrap();
        let clock = ManualClock::new(1_700_000_000);
        let treasury = Treasury::new(
            Address::from_label("treasury"),
            owner,
            TreasuryConfig::new(backed),
            assets,
            clock.clone(),
        );
        Fixture {
            treasury,
            clock,
            owner,
            dai,
            backed,
        }
    }

    impl Fixture {
        fn grant(&mut self, category: PermissionCategory, address: Address, payment: Address) {
            let delay = self.treasury.state().config.delay_for(category);
            self.treasury.queue(&self.owner, category, address).unwrap();
            self.clock.advance(delay);
            assert!(self.treasury.toggle(&self.owner, category, address, payment).unwrap());
        }

        fn fund(&mut self, holder: Address, token: Address, amount: Amount) {
            let treasury = self.treasury.state().address;
            let assets = self.treasury.assets_mut();
            assets.mint(&token, &holder, amount).unwrap();
            assets.approve(&token, &holder, &treasury, amount).unwrap();
        }
    }

    #[test]
    fn normalize_scales_both_directions() {
        assert_eq!(normalize(5, 6, 9).unwrap(), 5_000);
        assert_eq!(normalize(5_000_000_000_000_000_000, 18, 9).unwrap(), 5_000_000_000);
        assert_eq!(normalize(999, 12, 9).unwrap(), 0);
        assert_eq!(normalize(7, 9, 9).unwrap(), 7);
        assert_eq!(normalize(u128::MAX, 0, 9), Err(TreasuryError::Overflow));
    }

    #[test]
    fn delays_follow_category_class() {
        let config = TreasuryConfig::default();
        assert_eq!(config.delay_for(PermissionCategory::Debtor), ADDR_DELAY);
        assert_eq!(config.delay_for(PermissionCategory::ReserveToken), TOKEN_DELAY);
        let config = config.with_delay(PermissionCategory::Debtor, 0);
        assert_eq!(config.delay_for(PermissionCategory::Debtor), 0);
    }

    #[test]
    fn queue_is_controller_only() {
        let mut f = fixture();
        let eve = Address::from_label("eve");
        assert_eq!(
            f.treasury.queue(&eve, PermissionCategory::Debtor, eve),
            Err(TreasuryError::Unauthorized {
                caller: eve,
                role: Role::Controller
            })
        );
    }

    #[test]
    fn toggle_without_queue_is_not_matured() {
        let mut f = fixture();
        let alice = Address::from_label("alice");
        let err = f
            .treasury
            .toggle(&f.owner, PermissionCategory::Debtor, alice, Address::ZERO)
            .unwrap_err();
        assert!(matches!(err, TreasuryError::NotMatured { matures_at: None, .. }));
    }

    #[test]
    fn toggle_before_delay_fails_and_keeps_pending() {
        let mut f = fixture();
        let alice = Address::from_label("alice");
        let at = f.treasury.queue(&f.owner, PermissionCategory::Debtor, alice).unwrap();
        f.clock.advance(ADDR_DELAY - 1);
        let err = f
            .treasury
            .toggle(&f.owner, PermissionCategory::Debtor, alice, Address::ZERO)
            .unwrap_err();
        assert!(matches!(err, TreasuryError::NotMatured { matures_at: Some(m), .. } if m == at));
        assert!(f.treasury.pending(PermissionCategory::Debtor, &alice).is_some());
    }

    #[test]
    fn toggle_twice_turns_off() {
        let mut f = fixture();
        let alice = Address::from_label("alice");
        f.grant(PermissionCategory::Debtor, alice, Address::ZERO);
        assert!(f.treasury.is_permitted(PermissionCategory::Debtor, &alice));
        assert!(f.treasury.pending(PermissionCategory::Debtor, &alice).is_none());

        f.treasury.queue(&f.owner, PermissionCategory::Debtor, alice).unwrap();
        f.clock.advance(ADDR_DELAY);
        assert!(!f
            .treasury
            .toggle(&f.owner, PermissionCategory::Debtor, alice, Address::ZERO)
            .unwrap());
        assert!(!f.treasury.is_permitted(PermissionCategory::Debtor, &alice));
    }

    #[test]
    fn zero_delay_category_toggles_immediately() {
        let owner = Address::from_label("owner");
        let alice = Address::from_label("alice");
        let config = TreasuryConfig::new(Address::from_label("backed"))
            .with_delay(PermissionCategory::Debtor, 0);
        let mut treasury = Treasury::new(
            Address::from_label("treasury"),
            owner,
            config,
            MemoryAssets::new(),
            ManualClock::new(10),
        );
        treasury.queue(&owner, PermissionCategory::Debtor, alice).unwrap();
        assert!(treasury
            .toggle(&owner, PermissionCategory::Debtor, alice, Address::ZERO)
            .unwrap());
    }

    #[test]
    fn reserve_token_toggle_records_decimals() {
        let mut f = fixture();
        let dai = f.dai;
        f.grant(PermissionCategory::ReserveToken, dai, Address::ZERO);
        let info = f.treasury.reserve_token(&dai).unwrap();
        assert_eq!(info.decimals, 18);
        assert_eq!(info.kind, TokenKind::Reserve);
        assert!(info.is_active);
    }

    #[test]
    fn reserve_token_toggle_off_deactivates_without_deleting() {
        let mut f = fixture();
        let dai = f.dai;
        f.grant(PermissionCategory::ReserveToken, dai, Address::ZERO);
        f.treasury.queue(&f.owner, PermissionCategory::ReserveToken, dai).unwrap();
        f.clock.advance(TOKEN_DELAY);
        f.treasury
            .toggle(&f.owner, PermissionCategory::ReserveToken, dai, Address::ZERO)
            .unwrap();
        let info = f.treasury.reserve_token(&dai).unwrap();
        assert!(!info.is_active);
    }

    #[test]
    fn unregistered_token_cannot_be_listed() {
        let mut f = fixture();
        let ghost = Address::from_label("ghost");
        f.treasury.queue(&f.owner, PermissionCategory::ReserveToken, ghost).unwrap();
        f.clock.advance(TOKEN_DELAY);
        let err = f
            .treasury
            .toggle(&f.owner, PermissionCategory::ReserveToken, ghost, Address::ZERO)
            .unwrap_err();
        assert_eq!(err, TreasuryError::Asset(AssetError::UnknownToken(ghost)));
        assert!(f.treasury.pending(PermissionCategory::ReserveToken, &ghost).is_some());
    }

    #[test]
    fn liquidity_token_requires_calculator() {
        let mut f = fixture();
        let dai = f.dai;
        f.treasury.queue(&f.owner, PermissionCategory::LiquidityToken, dai).unwrap();
        f.clock.advance(TOKEN_DELAY);
        assert_eq!(
            f.treasury
                .toggle(&f.owner, PermissionCategory::LiquidityToken, dai, Address::ZERO),
            Err(TreasuryError::MissingBinding {
                category: PermissionCategory::LiquidityToken
            })
        );
    }

    #[test]
    fn token_cannot_be_both_kinds() {
        let mut f = fixture();
        let dai = f.dai;
        f.grant(PermissionCategory::ReserveToken, dai, Address::ZERO);
        f.treasury.queue(&f.owner, PermissionCategory::LiquidityToken, dai).unwrap();
        f.clock.advance(TOKEN_DELAY);
        assert_eq!(
            f.treasury
                .toggle(&f.owner, PermissionCategory::LiquidityToken, dai, Address::from_label("calc")),
            Err(TreasuryError::TokenKindConflict { token: dai })
        );
    }

    #[test]
    fn delisted_token_cannot_return_as_other_kind() {
        let mut f = fixture();
        let dai = f.dai;
        f.grant(PermissionCategory::ReserveToken, dai, Address::ZERO);
        f.treasury.queue(&f.owner, PermissionCategory::ReserveToken, dai).unwrap();
        f.clock.advance(TOKEN_DELAY);
        assert!(!f
            .treasury
            .toggle(&f.owner, PermissionCategory::ReserveToken, dai, Address::ZERO)
            .unwrap());

        f.treasury.queue(&f.owner, PermissionCategory::LiquidityToken, dai).unwrap();
        f.clock.advance(TOKEN_DELAY);
        assert_eq!(
            f.treasury
                .toggle(&f.owner, PermissionCategory::LiquidityToken, dai, Address::from_label("calc")),
            Err(TreasuryError::TokenKindConflict { token: dai })
        );
        let info = f.treasury.reserve_token(&dai).unwrap();
        assert_eq!(info.kind, TokenKind::Reserve);
        assert!(!f.treasury.is_permitted(PermissionCategory::LiquidityToken, &dai));
        // Still queued, so relisting under the original kind stays possible.
        assert!(f.treasury.pending(PermissionCategory::LiquidityToken, &dai).is_some());
        f.grant(PermissionCategory::ReserveToken, dai, Address::ZERO);
        assert!(f.treasury.reserve_token(&dai).unwrap().is_active);
    }

    #[test]
    fn reward_manager_toggle_off_clears_distributor() {
        let mut f = fixture();
        let rewards = Address::from_label("rewards");
        let distributor = Address::from_label("distributor");
        f.grant(PermissionCategory::RewardManager, rewards, distributor);
        assert_eq!(
            f.treasury.binding(PermissionCategory::RewardManager, &rewards),
            Some(distributor)
        );

        f.treasury.queue(&f.owner, PermissionCategory::RewardManager, rewards).unwrap();
        f.clock.advance(ADDR_DELAY);
        assert!(!f
            .treasury
            .toggle(&f.owner, PermissionCategory::RewardManager, rewards, Address::ZERO)
            .unwrap());
        assert_eq!(f.treasury.binding(PermissionCategory::RewardManager, &rewards), None);
        assert!(matches!(
            f.treasury.mint_rewards(&rewards, 1),
            Err(TreasuryError::Unauthorized { .. })
        ));
    }

    #[test]
    fn staked_token_toggle_off_lifts_ceiling() {
        let mut f = fixture();
        let dai = f.dai;
        let alice = Address::from_label("alice");
        let staked = Address::from_label("staked");
        f.treasury.assets_mut().register_token(staked, 9).unwrap();
        f.grant(PermissionCategory::ReserveToken, dai, Address::ZERO);
        f.grant(PermissionCategory::ReserveDepositor, alice, Address::ZERO);
        f.grant(PermissionCategory::Debtor, alice, Address::ZERO);
        f.grant(PermissionCategory::StakedToken, staked, Address::ZERO);
        assert_eq!(f.treasury.state().staked_token, Some(staked));
        f.fund(alice, dai, 10u128.pow(18));
        f.treasury.deposit(&alice, 10u128.pow(18), &dai, 0).unwrap();
        assert!(matches!(
            f.treasury.incur_debt(&alice, 10u128.pow(9), &dai),
            Err(TreasuryError::DebtCeilingExceeded { ceiling: 0, .. })
        ));

        f.treasury.queue(&f.owner, PermissionCategory::StakedToken, staked).unwrap();
        f.clock.advance(TOKEN_DELAY);
        assert!(!f
            .treasury
            .toggle(&f.owner, PermissionCategory::StakedToken, staked, Address::ZERO)
            .unwrap());
        assert_eq!(f.treasury.state().staked_token, None);
        assert_eq!(f.treasury.incur_debt(&alice, 10u128.pow(9), &dai).unwrap(), 1);
    }

    #[test]
    fn deposit_normalizes_and_mints() {
        let mut f = fixture();
        let (dai, backed) = (f.dai, f.backed);
        let alice = Address::from_label("alice");
        f.grant(PermissionCategory::ReserveToken, dai, Address::ZERO);
        f.grant(PermissionCategory::ReserveDepositor, alice, Address::ZERO);
        f.fund(alice, dai, 10u128.pow(21));

        let minted = f.treasury.deposit(&alice, 10u128.pow(21), &dai, 0).unwrap();
        assert_eq!(minted, 10u128.pow(12));
        assert_eq!(f.treasury.total_reserves(), 10u128.pow(12));
        assert_eq!(f.treasury.assets().balance_of(&backed, &alice), 10u128.pow(12));
        assert_eq!(f.treasury.assets().balance_of(&dai, &alice), 0);
        assert_eq!(f.treasury.excess_reserves(), 0);
    }

    #[test]
    fn deposit_profit_stays_as_excess() {
        let mut f = fixture();
        let dai = f.dai;
        let alice = Address::from_label("alice");
        f.grant(PermissionCategory::ReserveToken, dai, Address::ZERO);
        f.grant(PermissionCategory::ReserveDepositor, alice, Address::ZERO);
        f.fund(alice, dai, 10u128.pow(18));

        let minted = f.treasury.deposit(&alice, 10u128.pow(18), &dai, 10u128.pow(8)).unwrap();
        assert_eq!(minted, 9 * 10u128.pow(8));
        assert_eq!(f.treasury.excess_reserves(), 10u128.pow(8));
    }

    #[test]
    fn deposit_rejects_excess_profit() {
        let mut f = fixture();
        let dai = f.dai;
        let alice = Address::from_label("alice");
        f.grant(PermissionCategory::ReserveToken, dai, Address::ZERO);
        f.grant(PermissionCategory::ReserveDepositor, alice, Address::ZERO);
        f.fund(alice, dai, 10u128.pow(18));
        assert_eq!(
            f.treasury.deposit(&alice, 10u128.pow(18), &dai, 10u128.pow(9) + 1),
            Err(TreasuryError::InvalidProfit {
                profit: 10u128.pow(9) + 1,
                value: 10u128.pow(9)
            })
        );
    }

    #[test]
    fn deposit_unlisted_token_rejected_before_role() {
        let mut f = fixture();
        let alice = Address::from_label("alice");
        let dai = f.dai;
        assert_eq!(
            f.treasury.deposit(&alice, 1, &dai, 0),
            Err(TreasuryError::UnknownReserveToken(dai))
        );
    }

    #[test]
    fn deposit_without_allowance_leaves_state() {
        let mut f = fixture();
        let dai = f.dai;
        let alice = Address::from_label("alice");
        f.grant(PermissionCategory::ReserveToken, dai, Address::ZERO);
        f.grant(PermissionCategory::ReserveDepositor, alice, Address::ZERO);
        f.treasury.assets_mut().mint(&dai, &alice, 100).unwrap();

        let before = f.treasury.state().clone();
        let err = f.treasury.deposit(&alice, 100, &dai, 0).unwrap_err();
        assert!(matches!(err, TreasuryError::Asset(AssetError::InsufficientAllowance { .. })));
        assert_eq!(f.treasury.state(), &before);
    }

    #[test]
    fn liquidity_deposit_uses_oracle() {
        let owner = Address::from_label("owner");
        let lp = Address::from_label("lp");
        let calc = Address::from_label("calc");
        let backed = Address::from_label("backed");
        let bob = Address::from_label("bob");
        let mut assets = MemoryAssets::new();
        assets.register_token(lp, 18).unwrap();
        assets.register_token(backed, 9).unwrap();
        let clock = ManualClock::new(0);
        let mut treasury = Treasury::new(
            Address::from_label("treasury"),
            owner,
            TreasuryConfig::new(backed),
            assets,
            clock.clone(),
        )
        .with_oracle(FixedRateOracle::new().with_rate(calc, 3, 1));

        treasury.queue(&owner, PermissionCategory::LiquidityToken, lp).unwrap();
        treasury.queue(&owner, PermissionCategory::LiquidityDepositor, bob).unwrap();
        clock.advance(TOKEN_DELAY);
        treasury.toggle(&owner, PermissionCategory::LiquidityToken, lp, calc).unwrap();
        treasury
            .toggle(&owner, PermissionCategory::LiquidityDepositor, bob, Address::ZERO)
            .unwrap();

        let treasury_addr = treasury.state().address;
        treasury.assets_mut().mint(&lp, &bob, 10).unwrap();
        treasury.assets_mut().approve(&lp, &bob, &treasury_addr, 10).unwrap();
        assert_eq!(treasury.deposit(&bob, 10, &lp, 0).unwrap(), 30);

        // Liquidity tokens are drawn down under their own manager role.
        let err = treasury.manage(&bob, &lp, 1).unwrap_err();
        assert!(matches!(
            err,
            TreasuryError::Unauthorized {
                role: Role::Permission(PermissionCategory::LiquidityManager),
                ..
            }
        ));
    }

    #[test]
    fn manage_limited_to_excess() {
        let mut f = fixture();
        let dai = f.dai;
        let alice = Address::from_label("alice");
        let mgr = Address::from_label("manager");
        f.grant(PermissionCategory::ReserveToken, dai, Address::ZERO);
        f.grant(PermissionCategory::ReserveDepositor, alice, Address::ZERO);
        f.grant(PermissionCategory::ReserveManager, mgr, Address::ZERO);
        f.fund(alice, dai, 10u128.pow(18));
        f.treasury.deposit(&alice, 10u128.pow(18), &dai, 10u128.pow(8)).unwrap();

        let err = f.treasury.manage(&mgr, &dai, 10u128.pow(17) + 10u128.pow(9)).unwrap_err();
        assert!(matches!(err, TreasuryError::ExceedsExcessReserves { .. }));

        assert_eq!(f.treasury.manage(&mgr, &dai, 10u128.pow(17)).unwrap(), 10u128.pow(8));
        assert_eq!(f.treasury.excess_reserves(), 0);
        assert_eq!(f.treasury.assets().balance_of(&dai, &mgr), 10u128.pow(17));
    }

    #[test]
    fn manage_unlisted_token_carries_no_value() {
        let mut f = fixture();
        let mgr = Address::from_label("manager");
        let stray = Address::from_label("stray");
        f.treasury.assets_mut().register_token(stray, 6).unwrap();
        let treasury = f.treasury.state().address;
        f.treasury.assets_mut().mint(&stray, &treasury, 500).unwrap();
        f.grant(PermissionCategory::ReserveManager, mgr, Address::ZERO);

        assert_eq!(f.treasury.manage(&mgr, &stray, 500).unwrap(), 0);
        assert_eq!(f.treasury.total_reserves(), 0);
    }

    #[test]
    fn withdraw_burns_backed_token() {
        let mut f = fixture();
        let (dai, backed) = (f.dai, f.backed);
        let alice = Address::from_label("alice");
        f.grant(PermissionCategory::ReserveToken, dai, Address::ZERO);
        f.grant(PermissionCategory::ReserveDepositor, alice, Address::ZERO);
        f.grant(PermissionCategory::ReserveSpender, alice, Address::ZERO);
        f.fund(alice, dai, 10u128.pow(18));
        f.treasury.deposit(&alice, 10u128.pow(18), &dai, 0).unwrap();

        assert_eq!(f.treasury.withdraw(&alice, 4 * 10u128.pow(17), &dai).unwrap(), 4 * 10u128.pow(8));
        assert_eq!(f.treasury.total_reserves(), 6 * 10u128.pow(8));
        assert_eq!(f.treasury.assets().balance_of(&backed, &alice), 6 * 10u128.pow(8));
        assert_eq!(f.treasury.assets().balance_of(&dai, &alice), 4 * 10u128.pow(17));
    }

    #[test]
    fn mint_rewards_goes_to_bound_distributor() {
        let mut f = fixture();
        let (dai, backed) = (f.dai, f.backed);
        let alice = Address::from_label("alice");
        let rewards = Address::from_label("rewards");
        let distributor = Address::from_label("distributor");
        f.grant(PermissionCategory::ReserveToken, dai, Address::ZERO);
        f.grant(PermissionCategory::ReserveDepositor, alice, Address::ZERO);
        f.grant(PermissionCategory::RewardManager, rewards, distributor);
        f.fund(alice, dai, 10u128.pow(18));
        f.treasury.deposit(&alice, 10u128.pow(18), &dai, 500).unwrap();

        assert!(matches!(
            f.treasury.mint_rewards(&rewards, 501),
            Err(TreasuryError::ExceedsExcessReserves { requested: 501, available: 500 })
        ));
        assert_eq!(f.treasury.mint_rewards(&rewards, 200).unwrap(), distributor);
        assert_eq!(f.treasury.assets().balance_of(&backed, &distributor), 200);
        assert_eq!(f.treasury.excess_reserves(), 300);
    }

    #[test]
    fn debt_ceiling_follows_staked_balance() {
        let mut f = fixture();
        let dai = f.dai;
        let alice = Address::from_label("alice");
        let staked = Address::from_label("staked");
        f.treasury.assets_mut().register_token(staked, 9).unwrap();
        f.grant(PermissionCategory::ReserveToken, dai, Address::ZERO);
        f.grant(PermissionCategory::ReserveDepositor, alice, Address::ZERO);
        f.grant(PermissionCategory::Debtor, alice, Address::ZERO);
        f.grant(PermissionCategory::StakedToken, staked, Address::ZERO);
        f.fund(alice, dai, 10u128.pow(18));
        f.treasury.deposit(&alice, 10u128.pow(18), &dai, 0).unwrap();
        f.treasury.assets_mut().mint(&staked, &alice, 100).unwrap();

        assert!(matches!(
            f.treasury.incur_debt(&alice, 101 * 10u128.pow(9), &dai),
            Err(TreasuryError::DebtCeilingExceeded { ceiling: 100, requested: 101, .. })
        ));
        assert_eq!(f.treasury.incur_debt(&alice, 100 * 10u128.pow(9), &dai).unwrap(), 100);
    }

    #[test]
    fn sub_unit_borrow_is_rejected() {
        let mut f = fixture();
        let dai = f.dai;
        let alice = Address::from_label("alice");
        f.grant(PermissionCategory::ReserveToken, dai, Address::ZERO);
        f.grant(PermissionCategory::Debtor, alice, Address::ZERO);
        let treasury = f.treasury.state().address;
        f.treasury.assets_mut().mint(&dai, &treasury, 10u128.pow(18)).unwrap();

        // One wei of an 18-decimal token is below the mint's precision.
        assert_eq!(
            f.treasury.incur_debt(&alice, 1, &dai),
            Err(TreasuryError::DustAmount { token: dai, amount: 1 })
        );
        assert_eq!(f.treasury.debt_of(&alice, &dai), 0);
        assert_eq!(f.treasury.assets().balance_of(&dai, &alice), 0);
        assert_eq!(f.treasury.total_debt(), 0);
    }

    #[test]
    fn audit_recomputes_from_holdings() {
        let mut f = fixture();
        let dai = f.dai;
        let alice = Address::from_label("alice");
        f.grant(PermissionCategory::ReserveToken, dai, Address::ZERO);
        f.grant(PermissionCategory::ReserveDepositor, alice, Address::ZERO);
        f.grant(PermissionCategory::Debtor, alice, Address::ZERO);
        f.fund(alice, dai, 10u128.pow(18));
        f.treasury.deposit(&alice, 10u128.pow(18), &dai, 0).unwrap();
        f.treasury.incur_debt(&alice, 10u128.pow(17), &dai).unwrap();

        // A direct transfer in is picked up by the audit.
        let treasury = f.treasury.state().address;
        f.treasury.assets_mut().mint(&dai, &treasury, 10u128.pow(18)).unwrap();
        assert_eq!(f.treasury.audit_reserves().unwrap(), 2 * 10u128.pow(9));
        assert_eq!(f.treasury.total_debt(), 10u128.pow(8));
    }

    #[test]
    fn summary_reports_counters() {
        let mut f = fixture();
        let dai = f.dai;
        f.grant(PermissionCategory::ReserveToken, dai, Address::ZERO);
        f.treasury
            .queue(&f.owner, PermissionCategory::Debtor, Address::from_label("alice"))
            .unwrap();
        let summary = f.treasury.summary();
        assert_eq!(summary.active_tokens, 1);
        assert_eq!(summary.pending_changes, 1);
        assert_eq!(summary.controller, f.owner);
        assert_eq!(summary.backed_token, f.backed);
    }
}
