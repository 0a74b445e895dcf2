//! # Storage Module
//!
//! Durable state for the treasury. The ledger, the vault pointer and the
//! asset book are all written through [`TreasuryDb`] so a host can stop at
//! any moment and resume with every timelock, permission and debt intact.
//!
//! ## Design Decisions
//!
//! 1. **sled, one tree.** A single namespaced tree lets one atomic batch
//!    carry an entire operation's writes.
//!
//! 2. **Bincode on disk.** Compact and deterministic. JSON is for the API.

pub mod db;

pub use db::{DbError, DbResult, TreasuryDb, WriteBatch};
