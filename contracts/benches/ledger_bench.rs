// Treasury ledger benchmarks.
//
// Covers the hot paths a host serializes behind its lock: deposit, the
// borrow/repay pair, the reserve audit over many listed tokens, and a full
// ledger save to sled.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use reserve_contracts::{LedgerStore, PermissionCategory, Treasury, TreasuryConfig, VaultState};
use reserve_protocol::{Address, AssetLedger, ManualClock, MemoryAssets};

/// Builds a treasury with `tokens` listed reserve tokens, a depositor and a
/// debtor. Delays are zero so setup does not need to move the clock.
fn setup(tokens: usize) -> (Treasury<MemoryAssets, ManualClock>, Vec<Address>, Address) {
    let owner = Address::from_label("owner");
    let user = Address::from_label("user");
    let backed = Address::from_label("backed");

    let mut config = TreasuryConfig::new(backed);
    config.address_delay_secs = 0;
    config.token_delay_secs = 0;

    let mut assets = MemoryAssets::new();
    assets.register_token(backed, 9).unwrap();
    let list: Vec<Address> = (0..tokens)
        .map(|i| Address::from_label(&format!("token-{i}")))
        .collect();
    for token in &list {
        assets.register_token(*token, 18).unwrap();
    }

    let treasury_addr = Address::from_label("treasury");
    let mut treasury = Treasury::new(treasury_addr, owner, config, assets, ManualClock::new(0));
    for token in &list {
        treasury.queue(&owner, PermissionCategory::ReserveToken, *token).unwrap();
        treasury
            .toggle(&owner, PermissionCategory::ReserveToken, *token, Address::ZERO)
            .unwrap();
        let assets = treasury.assets_mut();
        assets.mint(token, &user, u64::MAX as u128).unwrap();
        assets.approve(token, &user, &treasury_addr, u64::MAX as u128).unwrap();
    }
    for category in [PermissionCategory::ReserveDepositor, PermissionCategory::Debtor] {
        treasury.queue(&owner, category, user).unwrap();
        treasury.toggle(&owner, category, user, Address::ZERO).unwrap();
    }
    (treasury, list, user)
}

fn bench_deposit(c: &mut Criterion) {
    let (mut treasury, tokens, user) = setup(1);
    let token = tokens[0];

    c.bench_function("treasury/deposit", |b| {
        b.iter(|| treasury.deposit(&user, 1_000_000_000, &token, 0).unwrap());
    });
}

fn bench_borrow_repay(c: &mut Criterion) {
    let (mut treasury, tokens, user) = setup(1);
    let token = tokens[0];
    treasury.deposit(&user, 10u128.pow(18), &token, 0).unwrap();

    c.bench_function("treasury/incur_and_repay", |b| {
        b.iter(|| {
            treasury.incur_debt(&user, 10u128.pow(12), &token).unwrap();
            treasury
                .repay_debt_with_reserve(&user, 10u128.pow(12), &token)
                .unwrap();
        });
    });
}

fn bench_audit(c: &mut Criterion) {
    let mut group = c.benchmark_group("treasury/audit");
    for n in [1usize, 16, 128] {
        let (mut treasury, tokens, user) = setup(n);
        for token in &tokens {
            treasury.deposit(&user, 10u128.pow(18), token, 0).unwrap();
        }
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| treasury.audit_reserves().unwrap());
        });
    }
    group.finish();
}

fn bench_save(c: &mut Criterion) {
    let (treasury, _, _) = setup(64);
    let vault = VaultState::new(treasury.controller(), Address::ZERO, 172_800);
    let store = LedgerStore::open_temporary().unwrap();

    c.bench_function("store/save_64_tokens", |b| {
        b.iter(|| {
            store
                .save(treasury.state(), &vault, treasury.assets())
                .unwrap()
        });
    });
}

criterion_group!(benches, bench_deposit, bench_borrow_repay, bench_audit, bench_save);
criterion_main!(benches);
