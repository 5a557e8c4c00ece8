//! Storage port
//!
//! Services talk to persistence only through a `UnitOfWork`: every read,
//! lock and write of one operation happens inside it, and nothing is
//! visible to anyone else until `commit`. Dropping a unit of work without
//! committing rolls it back.
//!
//! `lock_*` reads take a row lock held until the unit of work ends
//! (`SELECT … FOR UPDATE` in Postgres). `lock_accounts` locks in account-id
//! order so two postings over the same accounts cannot deadlock.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use core_kernel::{
    DomainPort, EscrowRecordId, HealthCheckable, JournalEntryId, PortError, ReconciliationId, RemittanceBatchId,
    RiderId, SettlementId, TransactionId,
};
use domain_escrow::{BatchType, EscrowRecord, EscrowType, RemittanceBatch};
use domain_ledger::{EntrySource, GlAccount, JournalEntry};
use domain_reconciliation::{ReconciliationItem, ReconciliationRecord};
use domain_settlement::PartnerSettlement;

pub mod memory;

pub use memory::InMemoryStore;

/// Entry point of a storage adapter
#[async_trait]
pub trait LedgerStore: DomainPort + HealthCheckable {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, PortError>;
}

/// One atomic unit of reads and writes
#[async_trait]
pub trait UnitOfWork: Send {
    // ------------------------------------------------------------------
    // Chart of accounts
    // ------------------------------------------------------------------

    /// Conflict if the code is taken
    async fn insert_account(&mut self, account: &GlAccount) -> Result<(), PortError>;

    /// Includes soft-deleted accounts; callers decide how to treat them
    async fn account_by_code(&mut self, code: &str) -> Result<Option<GlAccount>, PortError>;

    /// Locks the accounts with these codes, ordered by id; unknown codes are omitted
    async fn lock_accounts(&mut self, codes: &[String]) -> Result<Vec<GlAccount>, PortError>;

    async fn update_account(&mut self, account: &GlAccount) -> Result<(), PortError>;

    /// Every account, soft-deleted ones included, ordered by code
    async fn accounts(&mut self) -> Result<Vec<GlAccount>, PortError>;

    /// Next value of a named counter, starting at 1
    async fn next_sequence(&mut self, key: &str) -> Result<u64, PortError>;

    // ------------------------------------------------------------------
    // Journal
    // ------------------------------------------------------------------

    /// Writes the entry with its lines; Conflict on a duplicate number or source
    async fn insert_entry(&mut self, entry: &JournalEntry) -> Result<(), PortError>;

    async fn entry(&mut self, id: JournalEntryId) -> Result<Option<JournalEntry>, PortError>;

    async fn lock_entry(&mut self, id: JournalEntryId) -> Result<Option<JournalEntry>, PortError>;

    async fn entry_by_source(&mut self, source: &EntrySource) -> Result<Option<JournalEntry>, PortError>;

    /// Writes status and audit fields; lines are never rewritten
    async fn update_entry(&mut self, entry: &JournalEntry) -> Result<(), PortError>;

    /// Entries dated in `[start, end)`, ordered by date then number
    async fn entries_between(
        &mut self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<JournalEntry>, PortError>;

    // ------------------------------------------------------------------
    // Escrow
    // ------------------------------------------------------------------

    /// Conflict if the source transaction already has a record
    async fn insert_escrow(&mut self, record: &EscrowRecord) -> Result<(), PortError>;

    async fn escrow_by_transaction(&mut self, transaction_id: TransactionId) -> Result<Option<EscrowRecord>, PortError>;

    async fn lock_escrow(&mut self, id: EscrowRecordId) -> Result<Option<EscrowRecord>, PortError>;

    async fn update_escrow(&mut self, record: &EscrowRecord) -> Result<(), PortError>;

    /// Highest payment-day ordinal recorded for the rider
    async fn max_payment_day(&mut self, rider_id: RiderId) -> Result<Option<u32>, PortError>;

    /// Locks PENDING records of a type that belong to no batch, oldest first
    async fn lock_unbatched_escrow(&mut self, escrow_type: EscrowType) -> Result<Vec<EscrowRecord>, PortError>;

    /// Records currently or previously scheduled into the batch
    async fn batch_members(&mut self, batch_id: RemittanceBatchId) -> Result<Vec<EscrowRecord>, PortError>;

    /// Records created in `[start, end)`
    async fn escrow_created_between(
        &mut self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<EscrowRecord>, PortError>;

    // ------------------------------------------------------------------
    // Remittance batches
    // ------------------------------------------------------------------

    /// Conflict if the number is taken or the type already has a batch that day
    async fn insert_batch(&mut self, batch: &RemittanceBatch) -> Result<(), PortError>;

    async fn lock_batch(&mut self, id: RemittanceBatchId) -> Result<Option<RemittanceBatch>, PortError>;

    /// The batch of a type for a business day, whatever its status, locked
    async fn lock_batch_for_day(
        &mut self,
        batch_type: BatchType,
        batch_date: NaiveDate,
    ) -> Result<Option<RemittanceBatch>, PortError>;

    async fn update_batch(&mut self, batch: &RemittanceBatch) -> Result<(), PortError>;

    async fn delete_batch(&mut self, id: RemittanceBatchId) -> Result<(), PortError>;

    // ------------------------------------------------------------------
    // Reconciliation
    // ------------------------------------------------------------------

    async fn insert_reconciliation(
        &mut self,
        record: &ReconciliationRecord,
        items: &[ReconciliationItem],
    ) -> Result<(), PortError>;

    async fn lock_reconciliation(&mut self, id: ReconciliationId) -> Result<Option<ReconciliationRecord>, PortError>;

    /// Items ordered by line number
    async fn reconciliation_items(&mut self, id: ReconciliationId) -> Result<Vec<ReconciliationItem>, PortError>;

    async fn update_reconciliation(&mut self, record: &ReconciliationRecord) -> Result<(), PortError>;

    /// Conflict if the item's entry is already linked to another item
    async fn update_item(&mut self, item: &ReconciliationItem) -> Result<(), PortError>;

    /// Items of any reconciliation currently linked to one of these entries
    async fn items_linked_to(&mut self, entry_ids: &[JournalEntryId]) -> Result<Vec<ReconciliationItem>, PortError>;

    // ------------------------------------------------------------------
    // Settlement
    // ------------------------------------------------------------------

    /// Writes the header with its lines
    async fn insert_settlement(&mut self, settlement: &PartnerSettlement) -> Result<(), PortError>;

    async fn lock_settlement(&mut self, id: SettlementId) -> Result<Option<PartnerSettlement>, PortError>;

    /// Writes status and audit fields of the header
    async fn update_settlement(&mut self, settlement: &PartnerSettlement) -> Result<(), PortError>;

    async fn commit(self: Box<Self>) -> Result<(), PortError>;
}
