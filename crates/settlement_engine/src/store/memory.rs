//! In-process store
//!
//! Units of work are fully serialized: `begin` takes the store lock and
//! works on a private copy of the state, and `commit` swaps that copy in.
//! Uniqueness rules mirror the Postgres indexes so services behave the
//! same on both adapters.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use core_kernel::{
    AccountId, AdapterHealth, DomainPort, EscrowRecordId, HealthCheckResult, HealthCheckable, JournalEntryId,
    PortError, ReconciliationId, ReconciliationItemId, RemittanceBatchId, RiderId, SettlementId, TransactionId,
};
use domain_escrow::{BatchType, EscrowRecord, EscrowType, RemittanceBatch, RemittanceStatus};
use domain_ledger::{EntrySource, GlAccount, JournalEntry};
use domain_reconciliation::{ReconciliationItem, ReconciliationRecord};
use domain_settlement::PartnerSettlement;

use super::{LedgerStore, UnitOfWork};

#[derive(Debug, Clone, Default)]
struct State {
    accounts: BTreeMap<AccountId, GlAccount>,
    sequences: HashMap<String, u64>,
    entries: HashMap<JournalEntryId, JournalEntry>,
    escrow: HashMap<EscrowRecordId, EscrowRecord>,
    batches: HashMap<RemittanceBatchId, RemittanceBatch>,
    reconciliations: HashMap<ReconciliationId, ReconciliationRecord>,
    items: HashMap<ReconciliationItemId, ReconciliationItem>,
    settlements: HashMap<SettlementId, PartnerSettlement>,
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<State>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DomainPort for InMemoryStore {}

#[async_trait]
impl HealthCheckable for InMemoryStore {
    async fn health_check(&self) -> HealthCheckResult {
        HealthCheckResult {
            adapter_id: "in-memory-ledger-store".to_string(),
            status: AdapterHealth::Healthy,
            latency_ms: 0,
            message: None,
            checked_at: Utc::now(),
        }
    }
}

#[async_trait]
impl LedgerStore for InMemoryStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, PortError> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryUnitOfWork { guard, working }))
    }
}

struct MemoryUnitOfWork {
    guard: OwnedMutexGuard<State>,
    working: State,
}

fn missing(entity: &str, id: impl std::fmt::Display) -> PortError {
    PortError::not_found(entity, id)
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn insert_account(&mut self, account: &GlAccount) -> Result<(), PortError> {
        if self.working.accounts.values().any(|a| a.code == account.code) {
            return Err(PortError::conflict(format!("account code {} already exists", account.code)));
        }
        if let Some(parent) = account.parent_id {
            if !self.working.accounts.contains_key(&parent) {
                return Err(PortError::validation(format!("parent account {} does not exist", parent)));
            }
        }
        self.working.accounts.insert(account.id, account.clone());
        Ok(())
    }

    async fn account_by_code(&mut self, code: &str) -> Result<Option<GlAccount>, PortError> {
        Ok(self.working.accounts.values().find(|a| a.code == code).cloned())
    }

    async fn lock_accounts(&mut self, codes: &[String]) -> Result<Vec<GlAccount>, PortError> {
        // BTreeMap iteration is already in id order
        Ok(self
            .working
            .accounts
            .values()
            .filter(|a| codes.contains(&a.code))
            .cloned()
            .collect())
    }

    async fn update_account(&mut self, account: &GlAccount) -> Result<(), PortError> {
        match self.working.accounts.get_mut(&account.id) {
            Some(slot) => {
                *slot = account.clone();
                Ok(())
            }
            None => Err(missing("GlAccount", account.id)),
        }
    }

    async fn accounts(&mut self) -> Result<Vec<GlAccount>, PortError> {
        let mut all: Vec<GlAccount> = self.working.accounts.values().cloned().collect();
        all.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(all)
    }

    async fn next_sequence(&mut self, key: &str) -> Result<u64, PortError> {
        let counter = self.working.sequences.entry(key.to_string()).or_insert(0);
        *counter += 1;
        Ok(*counter)
    }

    async fn insert_entry(&mut self, entry: &JournalEntry) -> Result<(), PortError> {
        if self.working.entries.values().any(|e| e.entry_number == entry.entry_number) {
            return Err(PortError::conflict(format!("entry number {} already exists", entry.entry_number)));
        }
        if let Some(source) = &entry.source {
            if self.working.entries.values().any(|e| e.source.as_ref() == Some(source)) {
                return Err(PortError::conflict(format!(
                    "an entry for {} {} already exists",
                    source.code(),
                    source.id()
                )));
            }
        }
        self.working.entries.insert(entry.id, entry.clone());
        Ok(())
    }

    async fn entry(&mut self, id: JournalEntryId) -> Result<Option<JournalEntry>, PortError> {
        Ok(self.working.entries.get(&id).cloned())
    }

    async fn lock_entry(&mut self, id: JournalEntryId) -> Result<Option<JournalEntry>, PortError> {
        Ok(self.working.entries.get(&id).cloned())
    }

    async fn entry_by_source(&mut self, source: &EntrySource) -> Result<Option<JournalEntry>, PortError> {
        Ok(self
            .working
            .entries
            .values()
            .find(|e| e.source.as_ref() == Some(source))
            .cloned())
    }

    async fn update_entry(&mut self, entry: &JournalEntry) -> Result<(), PortError> {
        let slot = self
            .working
            .entries
            .get_mut(&entry.id)
            .ok_or_else(|| missing("JournalEntry", entry.id))?;
        // Lines are write-once
        let lines = std::mem::take(&mut slot.lines);
        *slot = JournalEntry {
            lines,
            ..entry.clone()
        };
        Ok(())
    }

    async fn entries_between(
        &mut self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<JournalEntry>, PortError> {
        let mut found: Vec<JournalEntry> = self
            .working
            .entries
            .values()
            .filter(|e| e.entry_date >= start && e.entry_date < end)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.entry_date.cmp(&b.entry_date).then(a.entry_number.cmp(&b.entry_number)));
        Ok(found)
    }

    async fn insert_escrow(&mut self, record: &EscrowRecord) -> Result<(), PortError> {
        if self.working.escrow.values().any(|r| r.transaction_id == record.transaction_id) {
            return Err(PortError::conflict(format!(
                "escrow record for transaction {} already exists",
                record.transaction_id
            )));
        }
        self.working.escrow.insert(record.id, record.clone());
        Ok(())
    }

    async fn escrow_by_transaction(&mut self, transaction_id: TransactionId) -> Result<Option<EscrowRecord>, PortError> {
        Ok(self
            .working
            .escrow
            .values()
            .find(|r| r.transaction_id == transaction_id)
            .cloned())
    }

    async fn lock_escrow(&mut self, id: EscrowRecordId) -> Result<Option<EscrowRecord>, PortError> {
        Ok(self.working.escrow.get(&id).cloned())
    }

    async fn update_escrow(&mut self, record: &EscrowRecord) -> Result<(), PortError> {
        if let Some(batch_id) = record.batch_id {
            if !self.working.batches.contains_key(&batch_id) {
                return Err(PortError::validation(format!("batch {} does not exist", batch_id)));
            }
        }
        match self.working.escrow.get_mut(&record.id) {
            Some(slot) => {
                *slot = record.clone();
                Ok(())
            }
            None => Err(missing("EscrowRecord", record.id)),
        }
    }

    async fn max_payment_day(&mut self, rider_id: RiderId) -> Result<Option<u32>, PortError> {
        Ok(self
            .working
            .escrow
            .values()
            .filter(|r| r.rider_id == rider_id)
            .map(|r| r.payment_day)
            .max())
    }

    async fn lock_unbatched_escrow(&mut self, escrow_type: EscrowType) -> Result<Vec<EscrowRecord>, PortError> {
        let mut found: Vec<EscrowRecord> = self
            .working
            .escrow
            .values()
            .filter(|r| r.escrow_type == escrow_type && r.status == RemittanceStatus::Pending && r.batch_id.is_none())
            .cloned()
            .collect();
        found.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(found)
    }

    async fn batch_members(&mut self, batch_id: RemittanceBatchId) -> Result<Vec<EscrowRecord>, PortError> {
        let mut found: Vec<EscrowRecord> = self
            .working
            .escrow
            .values()
            .filter(|r| r.batch_id == Some(batch_id))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(found)
    }

    async fn escrow_created_between(
        &mut self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<EscrowRecord>, PortError> {
        let mut found: Vec<EscrowRecord> = self
            .working
            .escrow
            .values()
            .filter(|r| r.created_at >= start && r.created_at < end)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(found)
    }

    async fn insert_batch(&mut self, batch: &RemittanceBatch) -> Result<(), PortError> {
        if self.working.batches.values().any(|b| b.batch_number == batch.batch_number) {
            return Err(PortError::conflict(format!("batch number {} already exists", batch.batch_number)));
        }
        if self
            .working
            .batches
            .values()
            .any(|b| b.batch_type == batch.batch_type && b.batch_date == batch.batch_date)
        {
            return Err(PortError::conflict(format!(
                "a {} batch for {} already exists",
                batch.batch_type.code(),
                batch.batch_date
            )));
        }
        self.working.batches.insert(batch.id, batch.clone());
        Ok(())
    }

    async fn lock_batch(&mut self, id: RemittanceBatchId) -> Result<Option<RemittanceBatch>, PortError> {
        Ok(self.working.batches.get(&id).cloned())
    }

    async fn lock_batch_for_day(
        &mut self,
        batch_type: BatchType,
        batch_date: NaiveDate,
    ) -> Result<Option<RemittanceBatch>, PortError> {
        Ok(self
            .working
            .batches
            .values()
            .find(|b| b.batch_type == batch_type && b.batch_date == batch_date)
            .cloned())
    }

    async fn update_batch(&mut self, batch: &RemittanceBatch) -> Result<(), PortError> {
        match self.working.batches.get_mut(&batch.id) {
            Some(slot) => {
                *slot = batch.clone();
                Ok(())
            }
            None => Err(missing("RemittanceBatch", batch.id)),
        }
    }

    async fn delete_batch(&mut self, id: RemittanceBatchId) -> Result<(), PortError> {
        if self.working.escrow.values().any(|r| r.batch_id == Some(id)) {
            return Err(PortError::validation(format!("batch {} still has members", id)));
        }
        self.working
            .batches
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| missing("RemittanceBatch", id))
    }

    async fn insert_reconciliation(
        &mut self,
        record: &ReconciliationRecord,
        items: &[ReconciliationItem],
    ) -> Result<(), PortError> {
        if self.working.reconciliations.contains_key(&record.id) {
            return Err(PortError::conflict(format!("reconciliation {} already exists", record.id)));
        }
        self.working.reconciliations.insert(record.id, record.clone());
        for item in items {
            self.working.items.insert(item.id, item.clone());
        }
        Ok(())
    }

    async fn lock_reconciliation(&mut self, id: ReconciliationId) -> Result<Option<ReconciliationRecord>, PortError> {
        Ok(self.working.reconciliations.get(&id).cloned())
    }

    async fn reconciliation_items(&mut self, id: ReconciliationId) -> Result<Vec<ReconciliationItem>, PortError> {
        let mut found: Vec<ReconciliationItem> = self
            .working
            .items
            .values()
            .filter(|i| i.reconciliation_id == id)
            .cloned()
            .collect();
        found.sort_by_key(|i| i.line_number);
        Ok(found)
    }

    async fn update_reconciliation(&mut self, record: &ReconciliationRecord) -> Result<(), PortError> {
        match self.working.reconciliations.get_mut(&record.id) {
            Some(slot) => {
                *slot = record.clone();
                Ok(())
            }
            None => Err(missing("Reconciliation", record.id)),
        }
    }

    async fn update_item(&mut self, item: &ReconciliationItem) -> Result<(), PortError> {
        if let Some(entry_id) = item.journal_entry_id {
            if !self.working.entries.contains_key(&entry_id) {
                return Err(PortError::validation(format!("journal entry {} does not exist", entry_id)));
            }
            if self
                .working
                .items
                .values()
                .any(|other| other.id != item.id && other.journal_entry_id == Some(entry_id))
            {
                return Err(PortError::conflict(format!("journal entry {} is already linked", entry_id)));
            }
        }
        match self.working.items.get_mut(&item.id) {
            Some(slot) => {
                *slot = item.clone();
                Ok(())
            }
            None => Err(missing("ReconciliationItem", item.id)),
        }
    }

    async fn items_linked_to(&mut self, entry_ids: &[JournalEntryId]) -> Result<Vec<ReconciliationItem>, PortError> {
        Ok(self
            .working
            .items
            .values()
            .filter(|i| i.journal_entry_id.is_some_and(|e| entry_ids.contains(&e)))
            .cloned()
            .collect())
    }

    async fn insert_settlement(&mut self, settlement: &PartnerSettlement) -> Result<(), PortError> {
        if self
            .working
            .settlements
            .values()
            .any(|s| s.settlement_number == settlement.settlement_number)
        {
            return Err(PortError::conflict(format!(
                "settlement number {} already exists",
                settlement.settlement_number
            )));
        }
        self.working.settlements.insert(settlement.id, settlement.clone());
        Ok(())
    }

    async fn lock_settlement(&mut self, id: SettlementId) -> Result<Option<PartnerSettlement>, PortError> {
        Ok(self.working.settlements.get(&id).cloned())
    }

    async fn update_settlement(&mut self, settlement: &PartnerSettlement) -> Result<(), PortError> {
        let slot = self
            .working
            .settlements
            .get_mut(&settlement.id)
            .ok_or_else(|| missing("PartnerSettlement", settlement.id))?;
        let lines = std::mem::take(&mut slot.lines);
        *slot = PartnerSettlement {
            lines,
            ..settlement.clone()
        };
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), PortError> {
        let MemoryUnitOfWork { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }
}
