//! Integration tests for the PostgreSQL ledger store
//!
//! Each test starts its own PostgreSQL container, so they need Docker and
//! are ignored by default:
//!
//! ```bash
//! cargo test -p infra_db -- --ignored
//! ```

use std::collections::HashSet;
use std::sync::Arc;

use tokio::task::JoinSet;

use core_kernel::{AdapterHealth, ErrorKind, HealthCheckable, MemoryAuditSink, Money};
use domain_escrow::{BatchStatus, BatchType, RemittanceStatus, TransferOutcome};
use domain_reconciliation::{MatchStatus, ReconciliationType};
use domain_ledger::{codes, AccountType, EntrySource, GlAccount, NewAccount};
use domain_settlement::StaticDirectory;
use infra_db::{run_migrations, PgLedgerStore};
use settlement_engine::{Engine, EngineConfig, LedgerStore};
use test_utils::{
    assert_entry_balanced, create_isolated_test_database, MoneyFixtures, PaymentBuilder, StatementBuilder,
    TemporalFixtures, TestDatabase,
};

async fn migrated() -> (TestDatabase, PgLedgerStore) {
    let db = create_isolated_test_database().await.expect("container starts");
    run_migrations(db.pool()).await.expect("migrations apply");
    let store = PgLedgerStore::new(db.pool().clone());
    (db, store)
}

async fn seeded_engine(store: PgLedgerStore) -> Engine {
    let engine = Engine::new(
        &EngineConfig::default(),
        Arc::new(store),
        Arc::new(MemoryAuditSink::new()),
        Arc::new(StaticDirectory::standard()),
    )
    .expect("default configuration is valid");
    engine.accounts.seed_standard_chart("bootstrap").await.expect("seeding succeeds");
    engine
}

async fn balance(engine: &Engine, code: &str) -> i64 {
    engine.accounts.lookup(code).await.unwrap().balance().cents()
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_migrations_are_idempotent_and_store_is_healthy() {
    let (db, store) = migrated().await;
    run_migrations(db.pool()).await.expect("second run is a no-op");

    let health = store.health_check().await;
    assert_eq!(health.status, AdapterHealth::Healthy);
    assert_eq!(health.adapter_id, "postgres-ledger-store");
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_rollback_on_drop_and_unique_codes() {
    let (_db, store) = migrated().await;
    let account = |code: &str| {
        GlAccount::open(NewAccount::new(code, "Escrow Bank", AccountType::Asset), None, TemporalFixtures::business_morning())
            .unwrap()
    };

    {
        let mut uow = store.begin().await.unwrap();
        uow.insert_account(&account("1100")).await.unwrap();
    }
    let mut uow = store.begin().await.unwrap();
    assert!(uow.account_by_code("1100").await.unwrap().is_none());

    uow.insert_account(&account("1100")).await.unwrap();
    uow.commit().await.unwrap();

    let mut uow = store.begin().await.unwrap();
    let stored = uow.account_by_code("1100").await.unwrap().unwrap();
    assert_eq!(stored.balance(), Money::ZERO);
    assert_eq!(stored.account_type, AccountType::Asset);

    let err = uow.insert_account(&account("1100")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_sequences_are_per_key_and_survive_commit() {
    let (_db, store) = migrated().await;

    let mut uow = store.begin().await.unwrap();
    assert_eq!(uow.next_sequence("JE-202403").await.unwrap(), 1);
    assert_eq!(uow.next_sequence("JE-202403").await.unwrap(), 2);
    assert_eq!(uow.next_sequence("JE-202404").await.unwrap(), 1);
    uow.commit().await.unwrap();

    let mut uow = store.begin().await.unwrap();
    assert_eq!(uow.next_sequence("JE-202403").await.unwrap(), 3);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_payment_round_trips_through_postgres() {
    let (_db, store) = migrated().await;
    let engine = seeded_engine(store.clone()).await;

    let payment = PaymentBuilder::deposit().build();
    let recorded = engine.payments.record_payment(&payment).await.unwrap();
    assert!(!recorded.replayed);
    assert_entry_balanced(&recorded.entry);

    assert_eq!(balance(&engine, codes::ESCROW_BANK).await, MoneyFixtures::deposit_total().cents());
    assert_eq!(balance(&engine, codes::PREMIUM_PAYABLE).await, MoneyFixtures::deposit_premium().cents());
    assert_eq!(balance(&engine, codes::SERVICE_FEE_PAYABLE).await, MoneyFixtures::deposit_fee().cents());

    // Read back through a fresh unit of work
    let mut uow = store.begin().await.unwrap();
    let entry = uow
        .entry_by_source(&EntrySource::Payment(payment.transaction_id))
        .await
        .unwrap()
        .unwrap();
    // Timestamps come back at microsecond precision, so compare the substance
    assert_eq!(entry.id, recorded.entry.id);
    assert_eq!(entry.entry_number, recorded.entry.entry_number);
    assert_eq!(entry.entry_type, recorded.entry.entry_type);
    assert_eq!(entry.status, recorded.entry.status);
    assert_eq!(entry.lines.len(), recorded.entry.lines.len());
    assert_entry_balanced(&entry);
    let escrow = uow.escrow_by_transaction(payment.transaction_id).await.unwrap().unwrap();
    assert_eq!(escrow.id, recorded.escrow.id);
    assert_eq!(escrow.premium_amount, MoneyFixtures::deposit_premium());
    assert_eq!(escrow.journal_entry_id, Some(recorded.entry.id));
    drop(uow);

    let replay = engine.payments.record_payment(&payment).await.unwrap();
    assert!(replay.replayed);
    assert_eq!(replay.entry.id, recorded.entry.id);
    assert_eq!(balance(&engine, codes::ESCROW_BANK).await, MoneyFixtures::deposit_total().cents());
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_remittance_lifecycle_persists() {
    let (_db, store) = migrated().await;
    let engine = seeded_engine(store).await;

    let payment = PaymentBuilder::deposit().build();
    engine.payments.record_payment(&payment).await.unwrap();

    let evening = TemporalFixtures::local_instant(TemporalFixtures::business_date(), 20, 0);
    let sweep = engine
        .remittance
        .open_batch(BatchType::Day1Immediate, TemporalFixtures::business_date(), evening, "ops")
        .await
        .unwrap();
    assert_eq!(sweep.swept, 1);

    let remittance = &engine.remittance;
    remittance.approve(sweep.batch.id, "finance-lead").await.unwrap();
    remittance.begin_processing(sweep.batch.id, "ops").await.unwrap();
    let (batch, entry) = remittance
        .record_transfer_outcome(
            sweep.batch.id,
            TransferOutcome::Confirmed {
                bank_reference: "FT24075K9QX".to_string(),
            },
            "ops",
        )
        .await
        .unwrap();

    assert_eq!(batch.status, BatchStatus::Completed);
    assert!(entry.is_some());
    assert_eq!(remittance.get(sweep.batch.id).await.unwrap().status, BatchStatus::Completed);
    assert_eq!(balance(&engine, codes::PREMIUM_PAYABLE).await, 0);
    assert_eq!(balance(&engine, codes::ESCROW_BANK).await, MoneyFixtures::deposit_fee().cents());

    let replay = engine.payments.record_payment(&payment).await.unwrap();
    assert_eq!(replay.escrow.status, RemittanceStatus::Remitted);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore = "requires Docker"]
async fn test_concurrent_intake_serializes_on_row_locks() {
    let (_db, store) = migrated().await;
    let engine = seeded_engine(store).await;
    let repeated = PaymentBuilder::deposit().build();

    let mut tasks = JoinSet::new();
    for _ in 0..8 {
        let payments = engine.payments.clone();
        let event = repeated.clone();
        tasks.spawn(async move { payments.record_payment(&event).await });

        let payments = engine.payments.clone();
        let event = PaymentBuilder::deposit().build();
        tasks.spawn(async move { payments.record_payment(&event).await });
    }

    let mut recorded = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        recorded.push(joined.unwrap().unwrap());
    }

    let entry_ids: HashSet<_> = recorded.iter().map(|r| r.entry.id).collect();
    let numbers: HashSet<_> = recorded.iter().map(|r| r.entry.entry_number.clone()).collect();
    assert_eq!(entry_ids.len(), 9);
    assert_eq!(numbers.len(), 9);
    assert_eq!(recorded.iter().filter(|r| !r.replayed).count(), 9);
    assert_eq!(
        balance(&engine, codes::ESCROW_BANK).await,
        9 * MoneyFixtures::deposit_total().cents()
    );
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_entry_backs_one_item_across_reconciliations() {
    let (_db, store) = migrated().await;
    let engine = seeded_engine(store).await;

    let payment = PaymentBuilder::deposit().build();
    let recorded = engine.payments.record_payment(&payment).await.unwrap();
    let statement = StatementBuilder::on(TemporalFixtures::business_date())
        .receipts([&payment])
        .build();

    let recon = &engine.reconciliation;
    let first = recon
        .ingest(ReconciliationType::DailyMpesa, TemporalFixtures::business_date(), "M-Pesa", &statement, "ops")
        .await
        .unwrap();
    let second = recon
        .ingest(ReconciliationType::DailyMpesa, TemporalFixtures::business_date(), "M-Pesa", &statement, "ops")
        .await
        .unwrap();

    assert_eq!(recon.run_auto_match(first.id, "ops").await.unwrap().matched, 1);
    assert_eq!(recon.run_auto_match(second.id, "ops").await.unwrap().matched, 0);

    let (_, items) = recon.get(second.id).await.unwrap();
    assert_eq!(items[0].match_status, MatchStatus::Unmatched);
    let err = recon
        .manual_match(second.id, items[0].id, recorded.entry.id, "ops", None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
}
