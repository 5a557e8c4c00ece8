//! Integration tests for payment intake, refunds and the manual journal
//!
//! These run the services end to end over the in-memory store.

mod common;

use common::Harness;
use core_kernel::{AuditAction, AuditOutcome, ErrorKind, Money, RiderId, TransactionId};
use domain_escrow::{EscrowType, RemittanceStatus};
use domain_ledger::{codes, EntrySource, EntryStatus, EntryType, NewJournalEntry};
use test_utils::{assert_entry_balanced, assert_trial_balance_balanced, PaymentBuilder, TemporalFixtures};

mod chart {
    use super::*;

    /// Seeding twice opens nothing the second time
    #[tokio::test]
    async fn test_seed_is_idempotent() {
        let h = Harness::seeded().await;
        let report = h.engine.accounts.seed_standard_chart("bootstrap").await.unwrap();

        assert!(report.created.is_empty());
        assert!(report.existing.contains(&codes::ESCROW_BANK.to_string()));
    }

    #[tokio::test]
    async fn test_payables_children() {
        let h = Harness::seeded().await;
        let children = h.engine.accounts.children(codes::PAYABLES).await.unwrap();
        let codes_found: Vec<&str> = children.iter().map(|a| a.code.as_str()).collect();

        assert!(codes_found.contains(&codes::PREMIUM_PAYABLE));
        assert!(codes_found.contains(&codes::SERVICE_FEE_PAYABLE));
        assert!(!codes_found.contains(&codes::ESCROW_BANK));
    }

    /// A deactivated account refuses postings until reactivated
    #[tokio::test]
    async fn test_inactive_account_blocks_payment() {
        let h = Harness::seeded().await;
        h.engine.accounts.deactivate(codes::SERVICE_FEE_PAYABLE, "controller").await.unwrap();

        let err = h
            .engine
            .payments
            .record_payment(&PaymentBuilder::deposit().build())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        // Nothing was written
        assert_eq!(h.balance(codes::ESCROW_BANK).await, 0);

        h.engine.accounts.reactivate(codes::SERVICE_FEE_PAYABLE, "controller").await.unwrap();
        h.engine
            .payments
            .record_payment(&PaymentBuilder::deposit().build())
            .await
            .unwrap();
        assert_eq!(h.balance(codes::ESCROW_BANK).await, 104_800);
    }
}

mod payment_intake {
    use super::*;

    /// The KES 1,048 deposit splits into KES 1,018 premium and KES 30 fee
    #[tokio::test]
    async fn test_deposit_posts_receipt_and_escrow() {
        let h = Harness::seeded().await;
        let payment = PaymentBuilder::deposit().build();

        let recorded = h.engine.payments.record_payment(&payment).await.unwrap();

        assert!(!recorded.replayed);
        assert_eq!(recorded.entry.status, EntryStatus::Posted);
        assert_eq!(recorded.entry.source, Some(EntrySource::Payment(payment.transaction_id)));
        assert_eq!(recorded.entry.external_reference.as_deref(), Some(payment.receipt_reference.as_str()));
        assert_entry_balanced(&recorded.entry);

        assert_eq!(recorded.escrow.payment_day, 1);
        assert_eq!(recorded.escrow.escrow_type, EscrowType::Day1Immediate);
        assert_eq!(recorded.escrow.status, RemittanceStatus::Pending);
        assert_eq!(recorded.escrow.premium_amount, Money::from_cents(101_800));
        assert_eq!(recorded.escrow.service_fee_amount, Money::from_cents(3_000));
        assert_eq!(recorded.escrow.journal_entry_id, Some(recorded.entry.id));

        assert_eq!(h.balance(codes::ESCROW_BANK).await, 104_800);
        assert_eq!(h.balance(codes::PREMIUM_PAYABLE).await, 101_800);
        assert_eq!(h.balance(codes::SERVICE_FEE_PAYABLE).await, 3_000);

        let trial = h.engine.reporting.trial_balance().await.unwrap();
        assert_trial_balance_balanced(&trial);
    }

    /// A second delivery of the same transaction changes nothing
    #[tokio::test]
    async fn test_replay_returns_first_result() {
        let h = Harness::seeded().await;
        let payment = PaymentBuilder::deposit().build();

        let first = h.engine.payments.record_payment(&payment).await.unwrap();
        let second = h.engine.payments.record_payment(&payment).await.unwrap();

        assert!(second.replayed);
        assert_eq!(second.entry.id, first.entry.id);
        assert_eq!(second.escrow.id, first.escrow.id);
        assert_eq!(h.balance(codes::ESCROW_BANK).await, 104_800);
        assert_eq!(h.audit.events_for(AuditAction::EscrowRecorded).len(), 1);
    }

    /// Daily payments take the rider's next payment day
    #[tokio::test]
    async fn test_daily_payment_days_follow_deposit() {
        let h = Harness::seeded().await;
        let rider = RiderId::new();
        let morning = TemporalFixtures::business_morning();

        h.engine
            .payments
            .record_payment(&PaymentBuilder::deposit().for_rider(rider).completed_at(morning).build())
            .await
            .unwrap();
        let day2 = h
            .engine
            .payments
            .record_payment(&PaymentBuilder::daily().for_rider(rider).completed_at(morning).build())
            .await
            .unwrap();
        let day3 = h
            .engine
            .payments
            .record_payment(&PaymentBuilder::daily().for_rider(rider).completed_at(morning).build())
            .await
            .unwrap();

        assert_eq!(day2.escrow.payment_day, 2);
        assert_eq!(day3.escrow.payment_day, 3);
        assert_eq!(day2.escrow.escrow_type, EscrowType::Accumulated);
        // KES 87 less the KES 3 fee
        assert_eq!(day2.escrow.premium_amount, Money::from_cents(8_400));
    }

    #[tokio::test]
    async fn test_deposit_must_be_day_one() {
        let h = Harness::seeded().await;
        let payment = PaymentBuilder::deposit().on_payment_day(3).build();

        let err = h.engine.payments.record_payment(&payment).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_payment_must_cover_fee() {
        let h = Harness::seeded().await;
        let payment = PaymentBuilder::deposit().with_amount(2_500).build();

        let err = h.engine.payments.record_payment(&payment).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(h.engine.reporting.entries(TemporalFixtures::business_month()).await.unwrap().is_empty());
    }
}

mod refunds {
    use super::*;

    /// Refunding a PENDING record undoes the receipt on every account
    #[tokio::test]
    async fn test_refund_pending_payment() {
        let h = Harness::seeded().await;
        let payment = PaymentBuilder::deposit().build();
        h.engine.payments.record_payment(&payment).await.unwrap();

        let outcome = h
            .engine
            .payments
            .refund(payment.transaction_id, TransactionId::new(), "RFD-0001", "support")
            .await
            .unwrap();

        assert_eq!(outcome.escrow.status, RemittanceStatus::Refunded);
        assert_eq!(outcome.released_from, None);
        assert_eq!(outcome.entry.entry_type, EntryType::Refund);
        assert_entry_balanced(&outcome.entry);

        assert_eq!(h.balance(codes::ESCROW_BANK).await, 0);
        assert_eq!(h.balance(codes::PREMIUM_PAYABLE).await, 0);
        assert_eq!(h.balance(codes::SERVICE_FEE_PAYABLE).await, 0);
    }

    #[tokio::test]
    async fn test_refund_twice_is_rejected() {
        let h = Harness::seeded().await;
        let payment = PaymentBuilder::deposit().build();
        h.engine.payments.record_payment(&payment).await.unwrap();
        h.engine
            .payments
            .refund(payment.transaction_id, TransactionId::new(), "RFD-0001", "support")
            .await
            .unwrap();

        let err = h
            .engine
            .payments
            .refund(payment.transaction_id, TransactionId::new(), "RFD-0002", "support")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidStateTransition);
        assert_eq!(h.balance(codes::ESCROW_BANK).await, 0);
    }

    #[tokio::test]
    async fn test_refund_unknown_transaction() {
        let h = Harness::seeded().await;
        let err = h
            .engine
            .payments
            .refund(TransactionId::new(), TransactionId::new(), "RFD-0001", "support")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}

mod manual_journal {
    use super::*;

    fn bank_charge(cents: i64) -> NewJournalEntry {
        NewJournalEntry::new(
            EntryType::Adjustment,
            TemporalFixtures::business_morning(),
            "Paybill charges for March",
            "accountant",
        )
        .debit(codes::BANK_CHARGES, Money::from_cents(cents))
        .credit(codes::OPERATING_BANK, Money::from_cents(cents))
    }

    /// Draft → pending approval → approved → posted, then reversed
    #[tokio::test]
    async fn test_entry_lifecycle_and_reversal() {
        let h = Harness::seeded().await;
        let journal = &h.engine.journal;

        let draft = journal.create(bank_charge(5_000)).await.unwrap();
        assert_eq!(draft.status, EntryStatus::Draft);
        // Drafts never move balances
        assert_eq!(h.balance(codes::BANK_CHARGES).await, 0);

        journal.submit(draft.id, "accountant").await.unwrap();
        journal.approve(draft.id, "controller").await.unwrap();
        let (posted, changes) = journal.post(draft.id, "controller").await.unwrap();

        assert_eq!(posted.status, EntryStatus::Posted);
        assert_eq!(changes.len(), 2);
        assert_eq!(h.balance(codes::BANK_CHARGES).await, 5_000);
        assert_eq!(h.balance(codes::OPERATING_BANK).await, -5_000);

        let outcome = journal.reverse(draft.id, "posted to the wrong period", "controller").await.unwrap();
        assert_eq!(outcome.original.status, EntryStatus::Reversed);
        assert_eq!(outcome.original.reversing_entry_id, Some(outcome.reversal.id));
        assert_eq!(outcome.reversal.original_entry_id, Some(draft.id));
        assert_eq!(outcome.reversal.status, EntryStatus::Posted);
        assert_entry_balanced(&outcome.reversal);

        assert_eq!(h.balance(codes::BANK_CHARGES).await, 0);
        assert_eq!(h.balance(codes::OPERATING_BANK).await, 0);
    }

    #[tokio::test]
    async fn test_reversed_entry_cannot_be_reversed_again() {
        let h = Harness::seeded().await;
        let journal = &h.engine.journal;
        let entry = journal.create(bank_charge(1_000)).await.unwrap();
        journal.submit(entry.id, "accountant").await.unwrap();
        journal.approve(entry.id, "controller").await.unwrap();
        journal.post(entry.id, "controller").await.unwrap();
        journal.reverse(entry.id, "duplicate", "controller").await.unwrap();

        let err = journal.reverse(entry.id, "duplicate", "controller").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidStateTransition);

        let rejected = h.audit.events_for(AuditAction::EntryReversed);
        assert!(rejected
            .iter()
            .any(|e| matches!(e.outcome, AuditOutcome::Rejected { .. })));
    }

    #[tokio::test]
    async fn test_posting_a_draft_is_rejected() {
        let h = Harness::seeded().await;
        let entry = h.engine.journal.create(bank_charge(1_000)).await.unwrap();

        let err = h.engine.journal.post(entry.id, "controller").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidStateTransition);
        assert_eq!(h.balance(codes::BANK_CHARGES).await, 0);
    }

    #[tokio::test]
    async fn test_unbalanced_entry_is_rejected() {
        let h = Harness::seeded().await;
        let request = NewJournalEntry::new(
            EntryType::Adjustment,
            TemporalFixtures::business_morning(),
            "Lopsided",
            "accountant",
        )
        .debit(codes::BANK_CHARGES, Money::from_cents(1_000))
        .credit(codes::OPERATING_BANK, Money::from_cents(900));

        let err = h.engine.journal.create(request).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_unknown_account_is_not_found() {
        let h = Harness::seeded().await;
        let request = NewJournalEntry::new(
            EntryType::Adjustment,
            TemporalFixtures::business_morning(),
            "Unknown account",
            "accountant",
        )
        .debit("9999", Money::from_cents(1_000))
        .credit(codes::OPERATING_BANK, Money::from_cents(1_000));

        let err = h.engine.journal.create(request).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}

mod concurrency {
    use super::*;
    use std::collections::HashSet;
    use tokio::task::JoinSet;

    /// Replays of one event race distinct deposits over the same accounts
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_intake_posts_each_payment_once() {
        let h = Harness::seeded().await;
        let repeated = PaymentBuilder::deposit().build();

        let mut tasks = JoinSet::new();
        for _ in 0..16 {
            let payments = h.engine.payments.clone();
            let event = repeated.clone();
            tasks.spawn(async move { payments.record_payment(&event).await });

            let payments = h.engine.payments.clone();
            let event = PaymentBuilder::deposit().build();
            tasks.spawn(async move { payments.record_payment(&event).await });
        }

        let mut recorded = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            recorded.push(joined.unwrap().unwrap());
        }
        assert_eq!(recorded.len(), 32);

        let repeated_entries: HashSet<_> = recorded
            .iter()
            .filter(|r| r.escrow.transaction_id == repeated.transaction_id)
            .map(|r| r.entry.id)
            .collect();
        assert_eq!(repeated_entries.len(), 1);
        assert_eq!(recorded.iter().filter(|r| !r.replayed).count(), 17);

        let entries = h.engine.reporting.entries(TemporalFixtures::business_month()).await.unwrap();
        assert_eq!(entries.len(), 17);
        let numbers: HashSet<&str> = entries.iter().map(|e| e.entry_number.as_str()).collect();
        assert_eq!(numbers.len(), 17);

        assert_eq!(h.balance(codes::ESCROW_BANK).await, 17 * 104_800);
        assert_eq!(h.balance(codes::PREMIUM_PAYABLE).await, 17 * 101_800);
        assert_eq!(h.audit.events_for(AuditAction::EscrowRecorded).len(), 17);
        assert_trial_balance_balanced(&h.engine.reporting.trial_balance().await.unwrap());
    }

    fn charge(cents: i64) -> NewJournalEntry {
        NewJournalEntry::new(
            EntryType::Adjustment,
            TemporalFixtures::business_morning(),
            "Paybill charge",
            "accountant",
        )
        .debit(codes::BANK_CHARGES, Money::from_cents(cents))
        .credit(codes::OPERATING_BANK, Money::from_cents(cents))
    }

    /// Entries created and posted side by side get distinct numbers and
    /// every posting lands on the shared accounts
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_postings_on_shared_accounts() {
        let h = Harness::seeded().await;

        let mut tasks = JoinSet::new();
        for n in 1..=12 {
            let journal = h.engine.journal.clone();
            tasks.spawn(async move {
                let entry = journal.create(charge(n * 100)).await?;
                journal.submit(entry.id, "accountant").await?;
                journal.approve(entry.id, "controller").await?;
                journal.post(entry.id, "controller").await.map(|(posted, _)| posted)
            });
        }

        let mut numbers = HashSet::new();
        while let Some(joined) = tasks.join_next().await {
            let posted = joined.unwrap().unwrap();
            assert_eq!(posted.status, EntryStatus::Posted);
            assert!(numbers.insert(posted.entry_number));
        }
        assert_eq!(numbers.len(), 12);

        // 100 + 200 + ... + 1200
        assert_eq!(h.balance(codes::BANK_CHARGES).await, 7_800);
        assert_eq!(h.balance(codes::OPERATING_BANK).await, -7_800);
    }
}

mod report_shape {
    use super::*;

    /// Every reported amount carries minor and major units
    #[tokio::test]
    async fn test_amounts_serialize_in_both_units() {
        let h = Harness::seeded().await;
        h.engine
            .payments
            .record_payment(&PaymentBuilder::deposit().build())
            .await
            .unwrap();

        let trial = h.engine.reporting.trial_balance().await.unwrap();
        let json = serde_json::to_value(&trial).unwrap();

        assert_eq!(json["total_debits"]["minor"], 104_800);
        assert_eq!(json["total_debits"]["major"], "1048.00");
        assert_eq!(json["is_balanced"], true);
    }
}
