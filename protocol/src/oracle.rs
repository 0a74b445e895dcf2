//! # Valuation Oracles
//!
//! Reserve tokens are valued by pure decimal scaling. Liquidity tokens (LP
//! shares and the like) cannot be, so the treasury asks a [`ValueOracle`]
//! instead. Each liquidity token is bound, at toggle time, to a calculator
//! address; the oracle maps `(calculator, token, amount)` to a value in
//! backed-token units.
//!
//! The oracle is an external collaborator. It must be a pure function of its
//! inputs: the treasury may call it several times within one operation and
//! relies on getting the same answer.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::types::{Address, Amount};

/// Errors returned by a valuation oracle.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OracleError {
    /// No calculator is registered at this address.
    #[error("no valuation calculator at {0}")]
    UnknownCalculator(Address),

    /// The valuation does not fit in an [`Amount`].
    #[error("valuation overflow for {token} (amount {amount})")]
    Overflow { token: Address, amount: Amount },
}

/// Values liquidity tokens in backed-token units.
pub trait ValueOracle: Send + Sync {
    fn valuation(
        &self,
        calculator: &Address,
        token: &Address,
        amount: Amount,
    ) -> Result<Amount, OracleError>;
}

/// An oracle that knows no calculators. Any liquidity-token valuation fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOracle;

impl ValueOracle for NoOracle {
    fn valuation(
        &self,
        calculator: &Address,
        _token: &Address,
        _amount: Amount,
    ) -> Result<Amount, OracleError> {
        Err(OracleError::UnknownCalculator(*calculator))
    }
}

/// A fixed exchange rate: `value = amount * numerator / denominator`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rate {
    pub numerator: Amount,
    pub denominator: Amount,
}

/// Calculator address -> fixed rate. Good enough for devnets and tests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixedRateOracle {
    rates: BTreeMap<Address, Rate>,
}

impl FixedRateOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) the rate served by `calculator`.
    /// A zero denominator is stored as one.
    pub fn set_rate(&mut self, calculator: Address, numerator: Amount, denominator: Amount) {
        self.rates.insert(
            calculator,
            Rate {
                numerator,
                denominator: denominator.max(1),
            },
        );
    }

    /// Builder-style variant of [`set_rate`](Self::set_rate).
    pub fn with_rate(mut self, calculator: Address, numerator: Amount, denominator: Amount) -> Self {
        self.set_rate(calculator, numerator, denominator);
        self
    }
}

impl ValueOracle for FixedRateOracle {
    fn valuation(
        &self,
        calculator: &Address,
        token: &Address,
        amount: Amount,
    ) -> Result<Amount, OracleError> {
        let rate = self
            .rates
            .get(calculator)
            .ok_or(OracleError::UnknownCalculator(*calculator))?;
        amount
            .checked_mul(rate.numerator)
            .map(|v| v / rate.denominator)
            .ok_or(OracleError::Overflow {
                token: *token,
                amount,
            })
    }
}
