//! # Reserve Protocol: Core Library
//!
//! Shared primitives for the reserve treasury. Nothing in this crate knows
//! about permissions or debt; it provides the ground the state machines in
//! `reserve-contracts` stand on.
//!
//! ## Architecture
//!
//! - **types**: `Address`, `Timestamp`, `Amount`.
//! - **clock**: where "now" comes from. The treasury never advances time.
//! - **assets**: the fungible-asset interface and an in-memory token book.
//! - **oracle**: valuation of liquidity tokens, supplied externally.
//! - **storage**: sled-backed durable state with atomic batches.
//! - **config**: delays, decimals and host defaults.
//! - **hash**: BLAKE3 helpers.

pub mod assets;
pub mod clock;
pub mod config;
pub mod hash;
pub mod oracle;
pub mod storage;
pub mod types;

pub use assets::{AssetError, AssetLedger, MemoryAssets};
pub use clock::{Clock, ManualClock, SystemClock};
pub use oracle::{FixedRateOracle, NoOracle, OracleError, ValueOracle};
pub use types::{Address, Amount, Timestamp};
