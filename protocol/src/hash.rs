//! # Hashing Utilities
//!
//! BLAKE3 is the only hash in the treasury. It derives fixture addresses
//! from labels and fingerprints the persisted ledger so two hosts (or one
//! host before and after a restart) can cheaply confirm they hold the same
//! state.

/// Compute the BLAKE3 hash of the input data.
pub fn blake3_hash(data: &[u8]) -> [u8; 32] {
    *blake3::hash(data).as_bytes()
}

/// Compute the BLAKE3 hash of the input data and return it hex-encoded.
pub fn blake3_hex(data: &[u8]) -> String {
    hex::encode(blake3_hash(data))
}
