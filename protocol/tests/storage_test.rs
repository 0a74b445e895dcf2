//! Integration tests for the protocol primitives the treasury builds on:
//! the on-disk store, the in-memory asset book and the valuation oracles.
//!
//! Each test owns its own temporary directory or database.

use reserve_protocol::config::STORAGE_SCHEMA_VERSION;
use reserve_protocol::storage::{DbError, TreasuryDb, WriteBatch};
use reserve_protocol::{
    Address, AssetError, AssetLedger, FixedRateOracle, MemoryAssets, NoOracle, OracleError,
    ValueOracle,
};

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

#[test]
fn store_written_by_another_schema_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    {
        let db = sled::open(dir.path()).unwrap();
        let tree = db.open_tree("ledger").unwrap();
        tree.insert(
            b"meta/schema_version",
            bincode::serialize(&(STORAGE_SCHEMA_VERSION + 1)).unwrap(),
        )
        .unwrap();
        db.flush().unwrap();
    }

    match TreasuryDb::open(dir.path()) {
        Err(DbError::SchemaMismatch { found, expected }) => {
            assert_eq!(found, STORAGE_SCHEMA_VERSION + 1);
            assert_eq!(expected, STORAGE_SCHEMA_VERSION);
        }
        other => panic!("expected schema mismatch, got {other:?}"),
    }
}

#[test]
fn identical_ledgers_share_a_digest_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let write = |db: &TreasuryDb| {
        let mut batch = WriteBatch::new();
        batch.put(b"perm/a".to_vec(), &true).unwrap();
        batch.put(b"debt/a".to_vec(), &7u128).unwrap();
        db.commit(batch).unwrap();
    };

    let memory = TreasuryDb::open_temporary().unwrap();
    write(&memory);

    let digest = {
        let disk = TreasuryDb::open(dir.path()).unwrap();
        write(&disk);
        disk.digest().unwrap()
    };
    assert_eq!(digest, memory.digest().unwrap());

    let reopened = TreasuryDb::open(dir.path()).unwrap();
    assert_eq!(reopened.digest().unwrap(), digest);
    assert_eq!(reopened.get::<u128>(b"debt/a").unwrap(), Some(7));
}

#[test]
fn replace_all_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    {
        let db = TreasuryDb::open(dir.path()).unwrap();
        let mut first = WriteBatch::new();
        first.put(b"pend/a".to_vec(), &1u64).unwrap();
        first.put(b"pend/b".to_vec(), &2u64).unwrap();
        db.commit(first).unwrap();

        let mut second = WriteBatch::new();
        second.put(b"pend/b".to_vec(), &2u64).unwrap();
        db.replace_all(&[&b"pend/"[..]], second).unwrap();
    }

    let db = TreasuryDb::open(dir.path()).unwrap();
    let pending: Vec<(Vec<u8>, u64)> = db.scan_prefix(b"pend/").unwrap();
    assert_eq!(pending, vec![(b"b".to_vec(), 2)]);
}

// ---------------------------------------------------------------------------
// Assets and valuation
// ---------------------------------------------------------------------------

#[test]
fn approve_then_transfer_from_draws_down_allowance() {
    let token = Address::from_label("dai");
    let owner = Address::from_label("owner");
    let spender = Address::from_label("treasury");

    let mut assets = MemoryAssets::new();
    assets.register_token(token, 18).unwrap();
    assets.mint(&token, &owner, 100).unwrap();
    assets.approve(&token, &owner, &spender, 60).unwrap();

    assets
        .transfer_from(&token, &spender, &owner, &spender, 40)
        .unwrap();
    assert_eq!(assets.balance_of(&token, &owner), 60);
    assert_eq!(assets.balance_of(&token, &spender), 40);
    assert_eq!(assets.allowance(&token, &owner, &spender), 20);

    let err = assets
        .transfer_from(&token, &spender, &owner, &spender, 21)
        .unwrap_err();
    assert!(matches!(err, AssetError::InsufficientAllowance { allowance: 20, .. }));
    // The failed call moved nothing.
    assert_eq!(assets.balance_of(&token, &owner), 60);
}

#[test]
fn oracles_value_by_calculator() {
    let calc = Address::from_label("calc");
    let lp = Address::from_label("lp");

    let oracle = FixedRateOracle::new().with_rate(calc, 3, 2);
    assert_eq!(oracle.valuation(&calc, &lp, 10), Ok(15));
    assert_eq!(
        oracle.valuation(&lp, &lp, 10),
        Err(OracleError::UnknownCalculator(lp))
    );
    assert_eq!(
        NoOracle.valuation(&calc, &lp, 10),
        Err(OracleError::UnknownCalculator(calc))
    );
}
