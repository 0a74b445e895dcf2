//! # Fungible Asset Interface
//!
//! The treasury never looks inside a token. Everything it needs (decimals,
//! balances, allowances, supply, and the ability to move, mint and burn)
//! goes through the [`AssetLedger`] trait, keyed by token [`Address`].
//!
//! [`MemoryAssets`] is the bundled implementation: a serializable book of
//! ERC-20-style tokens. The node persists it next to the ledger so a devnet
//! host is fully self-contained; tests use it directly.
//!
//! ## Supply tracking
//!
//! Total supply and per-holder balances are updated together. Every
//! arithmetic step is checked; an overflow is an error, never a wrap.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::types::{Address, Amount};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors returned by asset operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AssetError {
    /// The token address is not registered in this book.
    #[error("unknown token: {0}")]
    UnknownToken(Address),

    /// A token with this address already exists.
    #[error("token already registered: {0}")]
    DuplicateToken(Address),

    /// The holder does not own enough of the token.
    #[error("insufficient balance of {token} for {holder}: has {balance}, needs {amount}")]
    InsufficientBalance {
        token: Address,
        holder: Address,
        balance: Amount,
        amount: Amount,
    },

    /// The spender has not been approved for enough of the owner's tokens.
    #[error("insufficient allowance of {token}: {spender} may spend {allowance} of {owner}, needs {amount}")]
    InsufficientAllowance {
        token: Address,
        owner: Address,
        spender: Address,
        allowance: Amount,
        amount: Amount,
    },

    /// Supply or balance would overflow `u128`.
    #[error("supply overflow on {0}")]
    Overflow(Address),
}

// ---------------------------------------------------------------------------
// AssetLedger
// ---------------------------------------------------------------------------

/// Balance/allowance semantics of a family of fungible tokens.
///
/// Read methods are infallible for unknown tokens (they report zero) except
/// [`decimals`](Self::decimals), which the treasury needs to be exact.
pub trait AssetLedger {
    /// Decimal precision of `token`.
    fn decimals(&self, token: &Address) -> Result<u8, AssetError>;

    /// Balance of `holder` in `token`.
    fn balance_of(&self, token: &Address, holder: &Address) -> Amount;

    /// How much of `owner`'s `token` the `spender` may move.
    fn allowance(&self, token: &Address, owner: &Address, spender: &Address) -> Amount;

    /// Total circulating supply of `token`.
    fn total_supply(&self, token: &Address) -> Amount;

    /// Moves `amount` from `from` to `to`.
    fn transfer(
        &mut self,
        token: &Address,
        from: &Address,
        to: &Address,
        amount: Amount,
    ) -> Result<(), AssetError>;

    /// Moves `amount` from `from` to `to` on behalf of `spender`, consuming
    /// allowance.
    fn transfer_from(
        &mut self,
        token: &Address,
        spender: &Address,
        from: &Address,
        to: &Address,
        amount: Amount,
    ) -> Result<(), AssetError>;

    /// Creates `amount` new units for `to`.
    fn mint(&mut self, token: &Address, to: &Address, amount: Amount) -> Result<(), AssetError>;

    /// Destroys `amount` units held by `from`.
    fn burn(&mut self, token: &Address, from: &Address, amount: Amount) -> Result<(), AssetError>;
}

// ---------------------------------------------------------------------------
// MemoryAssets
// ---------------------------------------------------------------------------

/// Supply, balances and allowances of a single token.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBook {
    /// Decimal precision.
    pub decimals: u8,
    /// Sum of all balances.
    pub total_supply: Amount,
    /// Holder -> balance.
    pub balances: BTreeMap<Address, Amount>,
    /// Owner -> (spender -> remaining allowance).
    pub allowances: BTreeMap<Address, BTreeMap<Address, Amount>>,
}

/// In-memory, serializable [`AssetLedger`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryAssets {
    tokens: BTreeMap<Address, TokenBook>,
}

impl MemoryAssets {
    /// Creates an empty book.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a token with zero supply.
    ///
    /// # Errors
    ///
    /// Returns [`AssetError::DuplicateToken`] if `token` already exists.
    pub fn register_token(&mut self, token: Address, decimals: u8) -> Result<(), AssetError> {
        if self.tokens.contains_key(&token) {
            return Err(AssetError::DuplicateToken(token));
        }
        self.tokens.insert(
            token,
            TokenBook {
                decimals,
                ..TokenBook::default()
            },
        );
        Ok(())
    }

    /// Sets the allowance `spender` has over `owner`'s `token`.
    pub fn approve(
        &mut self,
        token: &Address,
        owner: &Address,
        spender: &Address,
        amount: Amount,
    ) -> Result<(), AssetError> {
        let book = self.book_mut(token)?;
        book.allowances
            .entry(*owner)
            .or_default()
            .insert(*spender, amount);
        Ok(())
    }

    /// Returns `true` if `token` is registered.
    pub fn contains(&self, token: &Address) -> bool {
        self.tokens.contains_key(token)
    }

    /// Number of registered tokens.
    pub fn token_count(&self) -> usize {
        self.tokens.len()
    }

    fn book(&self, token: &Address) -> Result<&TokenBook, AssetError> {
        self.tokens
            .get(token)
            .ok_or(AssetError::UnknownToken(*token))
    }

    fn book_mut(&mut self, token: &Address) -> Result<&mut TokenBook, AssetError> {
        self.tokens
            .get_mut(token)
            .ok_or(AssetError::UnknownToken(*token))
    }
}

impl TokenBook {
    fn balance(&self, holder: &Address) -> Amount {
        self.balances.get(holder).copied().unwrap_or(0)
    }

    fn allowance(&self, owner: &Address, spender: &Address) -> Amount {
        self.allowances
            .get(owner)
            .and_then(|m| m.get(spender))
            .copied()
            .unwrap_or(0)
    }

    fn move_balance(
        &mut self,
        token: &Address,
        from: &Address,
        to: &Address,
        amount: Amount,
    ) -> Result<(), AssetError> {
        let from_balance = self.balance(from);
        if from_balance < amount {
            return Err(AssetError::InsufficientBalance {
                token: *token,
                holder: *from,
                balance: from_balance,
                amount,
            });
        }
        if from == to {
            return Ok(());
        }
        let to_balance = self
            .balance(to)
            .checked_add(amount)
            .ok_or(AssetError::Overflow(*token))?;

        self.balances.insert(*from, from_balance - amount);
        self.balances.insert(*to, to_balance);
        Ok(())
    }
}

impl AssetLedger for MemoryAssets {
    fn decimals(&self, token: &Address) -> Result<u8, AssetError> {
        Ok(self.book(token)?.decimals)
    }

    fn balance_of(&self, token: &Address, holder: &Address) -> Amount {
        self.tokens
            .get(token)
            .map(|b| b.balance(holder))
            .unwrap_or(0)
    }

    fn allowance(&self, token: &Address, owner: &Address, spender: &Address) -> Amount {
        self.tokens
            .get(token)
            .map(|b| b.allowance(owner, spender))
            .unwrap_or(0)
    }

    fn total_supply(&self, token: &Address) -> Amount {
        self.tokens.get(token).map(|b| b.total_supply).unwrap_or(0)
    }

    fn transfer(
        &mut self,
        token: &Address,
        from: &Address,
        to: &Address,
        amount: Amount,
    ) -> Result<(), AssetError> {
        self.book_mut(token)?.move_balance(token, from, to, amount)
    }

    fn transfer_from(
        &mut self,
        token: &Address,
        spender: &Address,
        from: &Address,
        to: &Address,
        amount: Amount,
    ) -> Result<(), AssetError> {
        let book = self.book_mut(token)?;
        let allowance = book.allowance(from, spender);
        if allowance < amount {
            return Err(AssetError::InsufficientAllowance {
                token: *token,
                owner: *from,
                spender: *spender,
                allowance,
                amount,
            });
        }

        book.move_balance(token, from, to, amount)?;
        book.allowances
            .entry(*from)
            .or_default()
            .insert(*spender, allowance - amount);
        Ok(())
    }

    fn mint(&mut self, token: &Address, to: &Address, amount: Amount) -> Result<(), AssetError> {
        let book = self.book_mut(token)?;
        let new_supply = book
            .total_supply
            .checked_add(amount)
            .ok_or(AssetError::Overflow(*token))?;
        let new_balance = book
            .balance(to)
            .checked_add(amount)
            .ok_or(AssetError::Overflow(*token))?;

        book.total_supply = new_supply;
        book.balances.insert(*to, new_balance);
        Ok(())
    }

    fn burn(&mut self, token: &Address, from: &Address, amount: Amount) -> Result<(), AssetError> {
        let book = self.book_mut(token)?;
        let balance = book.balance(from);
        if balance < amount {
            return Err(AssetError::InsufficientBalance {
                token: *token,
                holder: *from,
                balance,
                amount,
            });
        }

        book.balances.insert(*from, balance - amount);
        book.total_supply = book.total_supply.saturating_sub(amount);
        Ok(())
    }
}
