//! PostgreSQL ledger store
//!
//! Implements the engine's storage port on top of SQLx. A unit of work is
//! one database transaction; `lock_*` reads use `SELECT … FOR UPDATE` and
//! the row locks are held until commit or rollback.
//!
//! # Example
//!
//! ```rust,ignore
//! use infra_db::{create_pool, run_migrations, DatabaseConfig, PgLedgerStore};
//!
//! let pool = create_pool(DatabaseConfig::from_settings(&config.database)).await?;
//! run_migrations(&pool).await?;
//! let store = Arc::new(PgLedgerStore::new(pool));
//! let engine = Engine::new(&config, store, audit, directory)?;
//! ```

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::{PgPool, PgRow, Postgres};
use sqlx::{Row, Transaction};
use std::collections::HashMap;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Instant;
use tracing::{debug, instrument};
use uuid::Uuid;

use core_kernel::{
    AccountId, AdapterHealth, DomainPort, EscrowRecordId, HealthCheckResult, HealthCheckable, JournalEntryId,
    JournalLineId, Money, OrganizationId, PartnerType, PaymentKind, Period, PortError, ReconciliationId,
    ReconciliationItemId, RemittanceBatchId, RiderId, SettlementId, SettlementLineId, TransactionId,
};
use domain_escrow::{BatchType, EscrowRecord, EscrowType, RemittanceBatch};
use domain_ledger::{EntrySource, EntryType, GlAccount, JournalEntry, JournalLine, StoredAccount};
use domain_reconciliation::{ReconciliationItem, ReconciliationRecord};
use domain_settlement::{PartnerSettlement, SettlementLine};
use settlement_engine::store::{LedgerStore, UnitOfWork};

use crate::error::DatabaseError;

const ACCOUNT_COLUMNS: &str =
    "id, code, name, account_type, balance_cents, parent_id, status, is_system_account, deleted_at, created_at, updated_at";

const ENTRY_COLUMNS: &str = "id, entry_number, entry_date, entry_type, payment_kind, partner, status, description, \
     total_debit_cents, total_credit_cents, source_type, source_id, rider_id, external_reference, created_by, \
     created_at, approved_by, approved_at, posted_at, reversed_by, reversed_at, reversal_reason, \
     reversing_entry_id, original_entry_id, updated_at";

const ESCROW_COLUMNS: &str = "id, rider_id, transaction_id, payment_day, premium_cents, service_fee_cents, escrow_type, \
     status, batch_id, remitted_at, remittance_reference, refunded_at, refund_reference, journal_entry_id, \
     created_at, updated_at";

const BATCH_COLUMNS: &str = "id, batch_number, batch_type, batch_date, total_premium_cents, total_records, status, \
     created_by, created_at, approved_by, approved_at, processed_by, processing_started_at, completed_at, \
     bank_reference, failed_at, failure_reason, attempts, journal_entry_id, updated_at";

const RECONCILIATION_COLUMNS: &str = "id, reconciliation_type, reconciliation_date, source_name, source_balance_cents, \
     ledger_balance_cents, variance_cents, status, total_items, matched_items, unmatched_items, auto_matched_items, \
     manual_matched_items, resolved_no_match_items, created_by, created_at, ledger_as_of, resolved_by, resolved_at, \
     notes, updated_at";

const ITEM_COLUMNS: &str = "id, reconciliation_id, line_number, external_reference, amount_cents, transaction_date, \
     match_status, journal_entry_id, resolved_by, notes, resolved_at";

const SETTLEMENT_COLUMNS: &str = "id, settlement_number, partner, organization_id, organization_name, period_start, \
     period_end, service_fee_total_cents, commission_total_cents, total_amount_cents, line_count, status, as_of, \
     created_by, created_at, approved_by, approved_at, paid_at, payment_reference, cancellation_reason, updated_at";

/// PostgreSQL implementation of the ledger storage port
#[derive(Debug, Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl DomainPort for PgLedgerStore {}

#[async_trait]
impl HealthCheckable for PgLedgerStore {
    async fn health_check(&self) -> HealthCheckResult {
        let start = Instant::now();
        let result = sqlx::query_scalar::<_, i32>("SELECT 1").fetch_one(&self.pool).await;
        let latency_ms = start.elapsed().as_millis() as u64;

        let (status, message) = match result {
            Ok(_) => (AdapterHealth::Healthy, None),
            Err(e) => (AdapterHealth::Unhealthy, Some(e.to_string())),
        };

        HealthCheckResult {
            adapter_id: "postgres-ledger-store".to_string(),
            status,
            latency_ms,
            message,
            checked_at: Utc::now(),
        }
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    #[instrument(skip(self))]
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, PortError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DatabaseError::TransactionFailed(e.to_string()))?;
        debug!("Unit of work started");
        Ok(Box::new(PgUnitOfWork { tx }))
    }
}

/// One database transaction; dropping it without `commit` rolls back
pub struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

fn db_to_port_error(e: sqlx::Error) -> PortError {
    DatabaseError::from(e).into()
}

fn parse_code<T>(column: &str, raw: &str) -> Result<T, DatabaseError>
where
    T: FromStr,
    T::Err: Display,
{
    raw.parse::<T>().map_err(|e| DatabaseError::decode(column, e))
}

fn to_u32(column: &str, value: i64) -> Result<u32, DatabaseError> {
    u32::try_from(value).map_err(|e| DatabaseError::decode(column, e))
}

fn money(row: &PgRow, column: &str) -> Result<Money, DatabaseError> {
    Ok(Money::from_cents(row.try_get::<i64, _>(column)?))
}

fn code_column<T>(row: &PgRow, column: &str) -> Result<T, DatabaseError>
where
    T: FromStr,
    T::Err: Display,
{
    let raw: String = row.try_get(column)?;
    parse_code(column, &raw)
}

fn ensure_updated(rows_affected: u64, entity: &str, id: impl Display) -> Result<(), PortError> {
    if rows_affected == 0 {
        return Err(PortError::not_found(entity, id));
    }
    Ok(())
}

// ----------------------------------------------------------------------
// Row mapping
// ----------------------------------------------------------------------

fn row_to_account(row: &PgRow) -> Result<GlAccount, DatabaseError> {
    Ok(GlAccount::restore(StoredAccount {
        id: AccountId::from(row.try_get::<Uuid, _>("id")?),
        code: row.try_get("code")?,
        name: row.try_get("name")?,
        account_type: code_column(row, "account_type")?,
        balance: money(row, "balance_cents")?,
        parent_id: row.try_get::<Option<Uuid>, _>("parent_id")?.map(AccountId::from),
        status: code_column(row, "status")?,
        is_system_account: row.try_get("is_system_account")?,
        deleted_at: row.try_get("deleted_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    }))
}

/// Entry types are stored as a category plus the payload column it needs
fn entry_type_columns(entry_type: &EntryType) -> (&'static str, Option<&'static str>, Option<&'static str>) {
    let category = entry_type.category().code();
    match entry_type {
        EntryType::PaymentReceipt { kind } => (category, Some(kind.code()), None),
        EntryType::FeeDistribution { partner } | EntryType::Commission { partner } => {
            (category, None, Some(partner.code()))
        }
        EntryType::Remittance | EntryType::Refund | EntryType::Adjustment => (category, None, None),
    }
}

fn entry_type_from_row(row: &PgRow) -> Result<EntryType, DatabaseError> {
    let category: String = row.try_get("entry_type")?;
    let kind: Option<String> = row.try_get("payment_kind")?;
    let partner: Option<String> = row.try_get("partner")?;

    let required_partner = || -> Result<PartnerType, DatabaseError> {
        let raw = partner
            .as_deref()
            .ok_or_else(|| DatabaseError::decode("partner", format!("required for {}", category)))?;
        parse_code("partner", raw)
    };

    match category.as_str() {
        "PAYMENT_RECEIPT" => {
            let raw = kind
                .as_deref()
                .ok_or_else(|| DatabaseError::decode("payment_kind", "required for PAYMENT_RECEIPT"))?;
            Ok(EntryType::PaymentReceipt {
                kind: parse_code::<PaymentKind>("payment_kind", raw)?,
            })
        }
        "REMITTANCE" => Ok(EntryType::Remittance),
        "FEE_DISTRIBUTION" => Ok(EntryType::FeeDistribution { partner: required_partner()? }),
        "REFUND" => Ok(EntryType::Refund),
        "COMMISSION" => Ok(EntryType::Commission { partner: required_partner()? }),
        "ADJUSTMENT" => Ok(EntryType::Adjustment),
        other => Err(DatabaseError::decode("entry_type", format!("unknown entry type '{}'", other))),
    }
}

fn row_to_entry(row: &PgRow, lines: Vec<JournalLine>) -> Result<JournalEntry, DatabaseError> {
    let source_type: Option<String> = row.try_get("source_type")?;
    let source_id: Option<Uuid> = row.try_get("source_id")?;
    let source = match (source_type, source_id) {
        (Some(code), Some(id)) => {
            Some(EntrySource::from_parts(&code, id).map_err(|e| DatabaseError::decode("source_type", e))?)
        }
        _ => None,
    };

    Ok(JournalEntry {
        id: JournalEntryId::from(row.try_get::<Uuid, _>("id")?),
        entry_number: row.try_get("entry_number")?,
        entry_date: row.try_get("entry_date")?,
        entry_type: entry_type_from_row(row)?,
        status: code_column(row, "status")?,
        description: row.try_get("description")?,
        total_debit: money(row, "total_debit_cents")?,
        total_credit: money(row, "total_credit_cents")?,
        source,
        rider_id: row.try_get::<Option<Uuid>, _>("rider_id")?.map(RiderId::from),
        external_reference: row.try_get("external_reference")?,
        created_by: row.try_get("created_by")?,
        created_at: row.try_get("created_at")?,
        approved_by: row.try_get("approved_by")?,
        approved_at: row.try_get("approved_at")?,
        posted_at: row.try_get("posted_at")?,
        reversed_by: row.try_get("reversed_by")?,
        reversed_at: row.try_get("reversed_at")?,
        reversal_reason: row.try_get("reversal_reason")?,
        reversing_entry_id: row.try_get::<Option<Uuid>, _>("reversing_entry_id")?.map(JournalEntryId::from),
        original_entry_id: row.try_get::<Option<Uuid>, _>("original_entry_id")?.map(JournalEntryId::from),
        updated_at: row.try_get("updated_at")?,
        lines,
    })
}

fn row_to_line(row: &PgRow) -> Result<JournalLine, DatabaseError> {
    Ok(JournalLine {
        id: JournalLineId::from(row.try_get::<Uuid, _>("id")?),
        entry_id: JournalEntryId::from(row.try_get::<Uuid, _>("entry_id")?),
        line_number: to_u32("line_number", row.try_get("line_number")?)?,
        account_id: AccountId::from(row.try_get::<Uuid, _>("account_id")?),
        account_code: row.try_get("account_code")?,
        debit: money(row, "debit_cents")?,
        credit: money(row, "credit_cents")?,
    })
}

fn row_to_escrow(row: &PgRow) -> Result<EscrowRecord, DatabaseError> {
    Ok(EscrowRecord {
        id: EscrowRecordId::from(row.try_get::<Uuid, _>("id")?),
        rider_id: RiderId::from(row.try_get::<Uuid, _>("rider_id")?),
        transaction_id: TransactionId::from(row.try_get::<Uuid, _>("transaction_id")?),
        payment_day: to_u32("payment_day", row.try_get("payment_day")?)?,
        premium_amount: money(row, "premium_cents")?,
        service_fee_amount: money(row, "service_fee_cents")?,
        escrow_type: code_column(row, "escrow_type")?,
        status: code_column(row, "status")?,
        batch_id: row.try_get::<Option<Uuid>, _>("batch_id")?.map(RemittanceBatchId::from),
        remitted_at: row.try_get("remitted_at")?,
        remittance_reference: row.try_get("remittance_reference")?,
        refunded_at: row.try_get("refunded_at")?,
        refund_reference: row.try_get("refund_reference")?,
        journal_entry_id: row.try_get::<Option<Uuid>, _>("journal_entry_id")?.map(JournalEntryId::from),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_batch(row: &PgRow) -> Result<RemittanceBatch, DatabaseError> {
    Ok(RemittanceBatch {
        id: RemittanceBatchId::from(row.try_get::<Uuid, _>("id")?),
        batch_number: row.try_get("batch_number")?,
        batch_type: code_column(row, "batch_type")?,
        batch_date: row.try_get("batch_date")?,
        total_premium_amount: money(row, "total_premium_cents")?,
        total_records: to_u32("total_records", row.try_get("total_records")?)?,
        status: code_column(row, "status")?,
        created_by: row.try_get("created_by")?,
        created_at: row.try_get("created_at")?,
        approved_by: row.try_get("approved_by")?,
        approved_at: row.try_get("approved_at")?,
        processed_by: row.try_get("processed_by")?,
        processing_started_at: row.try_get("processing_started_at")?,
        completed_at: row.try_get("completed_at")?,
        bank_reference: row.try_get("bank_reference")?,
        failed_at: row.try_get("failed_at")?,
        failure_reason: row.try_get("failure_reason")?,
        attempts: to_u32("attempts", row.try_get("attempts")?)?,
        journal_entry_id: row.try_get::<Option<Uuid>, _>("journal_entry_id")?.map(JournalEntryId::from),
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_reconciliation(row: &PgRow) -> Result<ReconciliationRecord, DatabaseError> {
    Ok(ReconciliationRecord {
        id: ReconciliationId::from(row.try_get::<Uuid, _>("id")?),
        reconciliation_type: code_column(row, "reconciliation_type")?,
        reconciliation_date: row.try_get("reconciliation_date")?,
        source_name: row.try_get("source_name")?,
        source_balance: money(row, "source_balance_cents")?,
        ledger_balance: money(row, "ledger_balance_cents")?,
        variance: money(row, "variance_cents")?,
        status: code_column(row, "status")?,
        total_items: to_u32("total_items", row.try_get("total_items")?)?,
        matched_items: to_u32("matched_items", row.try_get("matched_items")?)?,
        unmatched_items: to_u32("unmatched_items", row.try_get("unmatched_items")?)?,
        auto_matched_items: to_u32("auto_matched_items", row.try_get("auto_matched_items")?)?,
        manual_matched_items: to_u32("manual_matched_items", row.try_get("manual_matched_items")?)?,
        resolved_no_match_items: to_u32("resolved_no_match_items", row.try_get("resolved_no_match_items")?)?,
        created_by: row.try_get("created_by")?,
        created_at: row.try_get("created_at")?,
        ledger_as_of: row.try_get("ledger_as_of")?,
        resolved_by: row.try_get("resolved_by")?,
        resolved_at: row.try_get("resolved_at")?,
        notes: row.try_get("notes")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_item(row: &PgRow) -> Result<ReconciliationItem, DatabaseError> {
    Ok(ReconciliationItem {
        id: ReconciliationItemId::from(row.try_get::<Uuid, _>("id")?),
        reconciliation_id: ReconciliationId::from(row.try_get::<Uuid, _>("reconciliation_id")?),
        line_number: to_u32("line_number", row.try_get("line_number")?)?,
        external_reference: row.try_get("external_reference")?,
        amount: money(row, "amount_cents")?,
        transaction_date: row.try_get("transaction_date")?,
        match_status: code_column(row, "match_status")?,
        journal_entry_id: row.try_get::<Option<Uuid>, _>("journal_entry_id")?.map(JournalEntryId::from),
        resolved_by: row.try_get("resolved_by")?,
        notes: row.try_get("notes")?,
        resolved_at: row.try_get("resolved_at")?,
    })
}

fn row_to_settlement(row: &PgRow, lines: Vec<SettlementLine>) -> Result<PartnerSettlement, DatabaseError> {
    Ok(PartnerSettlement {
        id: SettlementId::from(row.try_get::<Uuid, _>("id")?),
        settlement_number: row.try_get("settlement_number")?,
        partner: code_column(row, "partner")?,
        organization_id: OrganizationId::from(row.try_get::<Uuid, _>("organization_id")?),
        organization_name: row.try_get("organization_name")?,
        period: Period {
            start: row.try_get("period_start")?,
            end: row.try_get("period_end")?,
        },
        service_fee_total: money(row, "service_fee_total_cents")?,
        commission_total: money(row, "commission_total_cents")?,
        total_amount: money(row, "total_amount_cents")?,
        line_count: to_u32("line_count", row.try_get("line_count")?)?,
        status: code_column(row, "status")?,
        as_of: row.try_get("as_of")?,
        created_by: row.try_get("created_by")?,
        created_at: row.try_get("created_at")?,
        approved_by: row.try_get("approved_by")?,
        approved_at: row.try_get("approved_at")?,
        paid_at: row.try_get("paid_at")?,
        payment_reference: row.try_get("payment_reference")?,
        cancellation_reason: row.try_get("cancellation_reason")?,
        updated_at: row.try_get("updated_at")?,
        lines,
    })
}

fn row_to_settlement_line(row: &PgRow) -> Result<SettlementLine, DatabaseError> {
    Ok(SettlementLine {
        id: SettlementLineId::from(row.try_get::<Uuid, _>("id")?),
        settlement_id: SettlementId::from(row.try_get::<Uuid, _>("settlement_id")?),
        line_number: to_u32("line_number", row.try_get("line_number")?)?,
        kind: code_column(row, "kind")?,
        amount: money(row, "amount_cents")?,
        rider_id: row.try_get::<Option<Uuid>, _>("rider_id")?.map(RiderId::from),
        transaction_id: row.try_get::<Option<Uuid>, _>("transaction_id")?.map(TransactionId::from),
        escrow_record_id: row.try_get::<Option<Uuid>, _>("escrow_record_id")?.map(EscrowRecordId::from),
        journal_entry_id: row.try_get::<Option<Uuid>, _>("journal_entry_id")?.map(JournalEntryId::from),
        description: row.try_get("description")?,
    })
}

fn map_rows<T>(rows: &[PgRow], f: impl Fn(&PgRow) -> Result<T, DatabaseError>) -> Result<Vec<T>, PortError> {
    rows.iter().map(|row| f(row).map_err(PortError::from)).collect()
}

impl PgUnitOfWork {
    /// Lines of the given entries, grouped by entry and ordered by line number
    async fn lines_for(&mut self, entry_ids: &[Uuid]) -> Result<HashMap<Uuid, Vec<JournalLine>>, PortError> {
        let rows = sqlx::query(
            "SELECT id, entry_id, line_number, account_id, account_code, debit_cents, credit_cents \
             FROM journal_lines WHERE entry_id = ANY($1) ORDER BY entry_id, line_number",
        )
        .bind(entry_ids)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db_to_port_error)?;

        let mut grouped: HashMap<Uuid, Vec<JournalLine>> = HashMap::new();
        for line in map_rows(&rows, row_to_line)? {
            grouped.entry(*line.entry_id.as_uuid()).or_default().push(line);
        }
        Ok(grouped)
    }

    async fn entries_from_rows(&mut self, rows: Vec<PgRow>) -> Result<Vec<JournalEntry>, PortError> {
        let ids = rows
            .iter()
            .map(|row| row.try_get::<Uuid, _>("id"))
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_to_port_error)?;
        let mut lines = self.lines_for(&ids).await?;

        rows.iter()
            .zip(ids)
            .map(|(row, id)| row_to_entry(row, lines.remove(&id).unwrap_or_default()).map_err(PortError::from))
            .collect()
    }

    async fn one_entry(&mut self, sql: &str, id: JournalEntryId) -> Result<Option<JournalEntry>, PortError> {
        let row = sqlx::query(sql)
            .bind(Uuid::from(id))
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_to_port_error)?;
        match row {
            Some(row) => Ok(self.entries_from_rows(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn escrow_where(&mut self, sql: String, id: Uuid) -> Result<Option<EscrowRecord>, PortError> {
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_to_port_error)?;
        Ok(row.as_ref().map(row_to_escrow).transpose()?)
    }
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn insert_account(&mut self, account: &GlAccount) -> Result<(), PortError> {
        sqlx::query(&format!(
            "INSERT INTO gl_accounts ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
            ACCOUNT_COLUMNS
        ))
        .bind(Uuid::from(account.id))
        .bind(&account.code)
        .bind(&account.name)
        .bind(account.account_type.code())
        .bind(account.balance().cents())
        .bind(account.parent_id.map(Uuid::from))
        .bind(account.status.code())
        .bind(account.is_system_account)
        .bind(account.deleted_at)
        .bind(account.created_at)
        .bind(account.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(db_to_port_error)?;
        debug!(code = %account.code, "Account inserted");
        Ok(())
    }

    async fn account_by_code(&mut self, code: &str) -> Result<Option<GlAccount>, PortError> {
        let row = sqlx::query(&format!("SELECT {} FROM gl_accounts WHERE code = $1", ACCOUNT_COLUMNS))
            .bind(code)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_to_port_error)?;
        Ok(row.as_ref().map(row_to_account).transpose()?)
    }

    async fn lock_accounts(&mut self, codes: &[String]) -> Result<Vec<GlAccount>, PortError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM gl_accounts WHERE code = ANY($1) ORDER BY id FOR UPDATE",
            ACCOUNT_COLUMNS
        ))
        .bind(codes)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db_to_port_error)?;
        map_rows(&rows, row_to_account)
    }

    async fn update_account(&mut self, account: &GlAccount) -> Result<(), PortError> {
        let result = sqlx::query(
            "UPDATE gl_accounts SET name = $2, balance_cents = $3, status = $4, deleted_at = $5, updated_at = $6 \
             WHERE id = $1",
        )
        .bind(Uuid::from(account.id))
        .bind(&account.name)
        .bind(account.balance().cents())
        .bind(account.status.code())
        .bind(account.deleted_at)
        .bind(account.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(db_to_port_error)?;
        ensure_updated(result.rows_affected(), "GlAccount", account.id)
    }

    async fn accounts(&mut self) -> Result<Vec<GlAccount>, PortError> {
        let rows = sqlx::query(&format!("SELECT {} FROM gl_accounts ORDER BY code", ACCOUNT_COLUMNS))
            .fetch_all(&mut *self.tx)
            .await
            .map_err(db_to_port_error)?;
        map_rows(&rows, row_to_account)
    }

    async fn next_sequence(&mut self, key: &str) -> Result<u64, PortError> {
        let value: i64 = sqlx::query_scalar(
            "INSERT INTO sequences (key, value) VALUES ($1, 1) \
             ON CONFLICT (key) DO UPDATE SET value = sequences.value + 1 \
             RETURNING value",
        )
        .bind(key)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(db_to_port_error)?;
        u64::try_from(value).map_err(|e| DatabaseError::decode("value", e).into())
    }

    #[instrument(skip(self, entry), fields(entry_number = %entry.entry_number))]
    async fn insert_entry(&mut self, entry: &JournalEntry) -> Result<(), PortError> {
        let (entry_type, payment_kind, partner) = entry_type_columns(&entry.entry_type);
        sqlx::query(&format!(
            "INSERT INTO journal_entries ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, \
             $14, $15, $16, $17, $18, $19, $20, $21, $22, $23, $24, $25)",
            ENTRY_COLUMNS
        ))
        .bind(Uuid::from(entry.id))
        .bind(&entry.entry_number)
        .bind(entry.entry_date)
        .bind(entry_type)
        .bind(payment_kind)
        .bind(partner)
        .bind(entry.status.code())
        .bind(&entry.description)
        .bind(entry.total_debit.cents())
        .bind(entry.total_credit.cents())
        .bind(entry.source.as_ref().map(|s| s.code()))
        .bind(entry.source.as_ref().map(|s| s.id()))
        .bind(entry.rider_id.map(Uuid::from))
        .bind(&entry.external_reference)
        .bind(&entry.created_by)
        .bind(entry.created_at)
        .bind(&entry.approved_by)
        .bind(entry.approved_at)
        .bind(entry.posted_at)
        .bind(&entry.reversed_by)
        .bind(entry.reversed_at)
        .bind(&entry.reversal_reason)
        .bind(entry.reversing_entry_id.map(Uuid::from))
        .bind(entry.original_entry_id.map(Uuid::from))
        .bind(entry.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(db_to_port_error)?;

        for line in &entry.lines {
            sqlx::query(
                "INSERT INTO journal_lines \
                 (id, entry_id, line_number, account_id, account_code, debit_cents, credit_cents) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(Uuid::from(line.id))
            .bind(Uuid::from(line.entry_id))
            .bind(i64::from(line.line_number))
            .bind(Uuid::from(line.account_id))
            .bind(&line.account_code)
            .bind(line.debit.cents())
            .bind(line.credit.cents())
            .execute(&mut *self.tx)
            .await
            .map_err(db_to_port_error)?;
        }
        debug!(lines = entry.lines.len(), "Journal entry inserted");
        Ok(())
    }

    async fn entry(&mut self, id: JournalEntryId) -> Result<Option<JournalEntry>, PortError> {
        let sql = format!("SELECT {} FROM journal_entries WHERE id = $1", ENTRY_COLUMNS);
        self.one_entry(&sql, id).await
    }

    async fn lock_entry(&mut self, id: JournalEntryId) -> Result<Option<JournalEntry>, PortError> {
        let sql = format!("SELECT {} FROM journal_entries WHERE id = $1 FOR UPDATE", ENTRY_COLUMNS);
        self.one_entry(&sql, id).await
    }

    async fn entry_by_source(&mut self, source: &EntrySource) -> Result<Option<JournalEntry>, PortError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM journal_entries WHERE source_type = $1 AND source_id = $2",
            ENTRY_COLUMNS
        ))
        .bind(source.code())
        .bind(source.id())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db_to_port_error)?;
        match row {
            Some(row) => Ok(self.entries_from_rows(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn update_entry(&mut self, entry: &JournalEntry) -> Result<(), PortError> {
        let result = sqlx::query(
            "UPDATE journal_entries SET status = $2, approved_by = $3, approved_at = $4, posted_at = $5, \
             reversed_by = $6, reversed_at = $7, reversal_reason = $8, reversing_entry_id = $9, updated_at = $10 \
             WHERE id = $1",
        )
        .bind(Uuid::from(entry.id))
        .bind(entry.status.code())
        .bind(&entry.approved_by)
        .bind(entry.approved_at)
        .bind(entry.posted_at)
        .bind(&entry.reversed_by)
        .bind(entry.reversed_at)
        .bind(&entry.reversal_reason)
        .bind(entry.reversing_entry_id.map(Uuid::from))
        .bind(entry.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(db_to_port_error)?;
        ensure_updated(result.rows_affected(), "JournalEntry", entry.id)
    }

    async fn entries_between(
        &mut self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<JournalEntry>, PortError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM journal_entries WHERE entry_date >= $1 AND entry_date < $2 \
             ORDER BY entry_date, entry_number",
            ENTRY_COLUMNS
        ))
        .bind(start)
        .bind(end)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db_to_port_error)?;
        self.entries_from_rows(rows).await
    }

    async fn insert_escrow(&mut self, record: &EscrowRecord) -> Result<(), PortError> {
        sqlx::query(&format!(
            "INSERT INTO escrow_records ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, \
             $15, $16)",
            ESCROW_COLUMNS
        ))
        .bind(Uuid::from(record.id))
        .bind(Uuid::from(record.rider_id))
        .bind(Uuid::from(record.transaction_id))
        .bind(i64::from(record.payment_day))
        .bind(record.premium_amount.cents())
        .bind(record.service_fee_amount.cents())
        .bind(record.escrow_type.code())
        .bind(record.status.code())
        .bind(record.batch_id.map(Uuid::from))
        .bind(record.remitted_at)
        .bind(&record.remittance_reference)
        .bind(record.refunded_at)
        .bind(&record.refund_reference)
        .bind(record.journal_entry_id.map(Uuid::from))
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(db_to_port_error)?;
        Ok(())
    }

    async fn escrow_by_transaction(&mut self, transaction_id: TransactionId) -> Result<Option<EscrowRecord>, PortError> {
        let sql = format!("SELECT {} FROM escrow_records WHERE transaction_id = $1", ESCROW_COLUMNS);
        self.escrow_where(sql, Uuid::from(transaction_id)).await
    }

    async fn lock_escrow(&mut self, id: EscrowRecordId) -> Result<Option<EscrowRecord>, PortError> {
        let sql = format!("SELECT {} FROM escrow_records WHERE id = $1 FOR UPDATE", ESCROW_COLUMNS);
        self.escrow_where(sql, Uuid::from(id)).await
    }

    async fn update_escrow(&mut self, record: &EscrowRecord) -> Result<(), PortError> {
        let result = sqlx::query(
            "UPDATE escrow_records SET status = $2, batch_id = $3, remitted_at = $4, remittance_reference = $5, \
             refunded_at = $6, refund_reference = $7, journal_entry_id = $8, updated_at = $9 WHERE id = $1",
        )
        .bind(Uuid::from(record.id))
        .bind(record.status.code())
        .bind(record.batch_id.map(Uuid::from))
        .bind(record.remitted_at)
        .bind(&record.remittance_reference)
        .bind(record.refunded_at)
        .bind(&record.refund_reference)
        .bind(record.journal_entry_id.map(Uuid::from))
        .bind(record.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(db_to_port_error)?;
        ensure_updated(result.rows_affected(), "EscrowRecord", record.id)
    }

    async fn max_payment_day(&mut self, rider_id: RiderId) -> Result<Option<u32>, PortError> {
        let max: Option<i64> = sqlx::query_scalar("SELECT MAX(payment_day) FROM escrow_records WHERE rider_id = $1")
            .bind(Uuid::from(rider_id))
            .fetch_one(&mut *self.tx)
            .await
            .map_err(db_to_port_error)?;
        Ok(max.map(|day| to_u32("payment_day", day)).transpose()?)
    }

    async fn lock_unbatched_escrow(&mut self, escrow_type: EscrowType) -> Result<Vec<EscrowRecord>, PortError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM escrow_records \
             WHERE escrow_type = $1 AND status = 'PENDING' AND batch_id IS NULL \
             ORDER BY created_at, id FOR UPDATE",
            ESCROW_COLUMNS
        ))
        .bind(escrow_type.code())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db_to_port_error)?;
        map_rows(&rows, row_to_escrow)
    }

    async fn batch_members(&mut self, batch_id: RemittanceBatchId) -> Result<Vec<EscrowRecord>, PortError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM escrow_records WHERE batch_id = $1 ORDER BY created_at, id",
            ESCROW_COLUMNS
        ))
        .bind(Uuid::from(batch_id))
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db_to_port_error)?;
        map_rows(&rows, row_to_escrow)
    }

    async fn escrow_created_between(
        &mut self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<EscrowRecord>, PortError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM escrow_records WHERE created_at >= $1 AND created_at < $2 ORDER BY created_at, id",
            ESCROW_COLUMNS
        ))
        .bind(start)
        .bind(end)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db_to_port_error)?;
        map_rows(&rows, row_to_escrow)
    }

    async fn insert_batch(&mut self, batch: &RemittanceBatch) -> Result<(), PortError> {
        sqlx::query(&format!(
            "INSERT INTO remittance_batches ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, \
             $14, $15, $16, $17, $18, $19, $20)",
            BATCH_COLUMNS
        ))
        .bind(Uuid::from(batch.id))
        .bind(&batch.batch_number)
        .bind(batch.batch_type.code())
        .bind(batch.batch_date)
        .bind(batch.total_premium_amount.cents())
        .bind(i64::from(batch.total_records))
        .bind(batch.status.code())
        .bind(&batch.created_by)
        .bind(batch.created_at)
        .bind(&batch.approved_by)
        .bind(batch.approved_at)
        .bind(&batch.processed_by)
        .bind(batch.processing_started_at)
        .bind(batch.completed_at)
        .bind(&batch.bank_reference)
        .bind(batch.failed_at)
        .bind(&batch.failure_reason)
        .bind(i64::from(batch.attempts))
        .bind(batch.journal_entry_id.map(Uuid::from))
        .bind(batch.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(db_to_port_error)?;
        Ok(())
    }

    async fn lock_batch(&mut self, id: RemittanceBatchId) -> Result<Option<RemittanceBatch>, PortError> {
        let row = sqlx::query(&format!("SELECT {} FROM remittance_batches WHERE id = $1 FOR UPDATE", BATCH_COLUMNS))
            .bind(Uuid::from(id))
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_to_port_error)?;
        Ok(row.as_ref().map(row_to_batch).transpose()?)
    }

    async fn lock_batch_for_day(
        &mut self,
        batch_type: BatchType,
        batch_date: NaiveDate,
    ) -> Result<Option<RemittanceBatch>, PortError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM remittance_batches \
             WHERE batch_type = $1 AND batch_date = $2 FOR UPDATE",
            BATCH_COLUMNS
        ))
        .bind(batch_type.code())
        .bind(batch_date)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db_to_port_error)?;
        Ok(row.as_ref().map(row_to_batch).transpose()?)
    }

    async fn update_batch(&mut self, batch: &RemittanceBatch) -> Result<(), PortError> {
        let result = sqlx::query(
            "UPDATE remittance_batches SET total_premium_cents = $2, total_records = $3, status = $4, \
             approved_by = $5, approved_at = $6, processed_by = $7, processing_started_at = $8, completed_at = $9, \
             bank_reference = $10, failed_at = $11, failure_reason = $12, attempts = $13, journal_entry_id = $14, \
             updated_at = $15 WHERE id = $1",
        )
        .bind(Uuid::from(batch.id))
        .bind(batch.total_premium_amount.cents())
        .bind(i64::from(batch.total_records))
        .bind(batch.status.code())
        .bind(&batch.approved_by)
        .bind(batch.approved_at)
        .bind(&batch.processed_by)
        .bind(batch.processing_started_at)
        .bind(batch.completed_at)
        .bind(&batch.bank_reference)
        .bind(batch.failed_at)
        .bind(&batch.failure_reason)
        .bind(i64::from(batch.attempts))
        .bind(batch.journal_entry_id.map(Uuid::from))
        .bind(batch.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(db_to_port_error)?;
        ensure_updated(result.rows_affected(), "RemittanceBatch", batch.id)
    }

    async fn delete_batch(&mut self, id: RemittanceBatchId) -> Result<(), PortError> {
        let has_members: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM escrow_records WHERE batch_id = $1)")
            .bind(Uuid::from(id))
            .fetch_one(&mut *self.tx)
            .await
            .map_err(db_to_port_error)?;
        if has_members {
            return Err(PortError::validation(format!("batch {} still has members", id)));
        }

        let result = sqlx::query("DELETE FROM remittance_batches WHERE id = $1")
            .bind(Uuid::from(id))
            .execute(&mut *self.tx)
            .await
            .map_err(db_to_port_error)?;
        ensure_updated(result.rows_affected(), "RemittanceBatch", id)
    }

    async fn insert_reconciliation(
        &mut self,
        record: &ReconciliationRecord,
        items: &[ReconciliationItem],
    ) -> Result<(), PortError> {
        sqlx::query(&format!(
            "INSERT INTO reconciliation_records ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, \
             $13, $14, $15, $16, $17, $18, $19, $20, $21)",
            RECONCILIATION_COLUMNS
        ))
        .bind(Uuid::from(record.id))
        .bind(record.reconciliation_type.code())
        .bind(record.reconciliation_date)
        .bind(&record.source_name)
        .bind(record.source_balance.cents())
        .bind(record.ledger_balance.cents())
        .bind(record.variance.cents())
        .bind(record.status.code())
        .bind(i64::from(record.total_items))
        .bind(i64::from(record.matched_items))
        .bind(i64::from(record.unmatched_items))
        .bind(i64::from(record.auto_matched_items))
        .bind(i64::from(record.manual_matched_items))
        .bind(i64::from(record.resolved_no_match_items))
        .bind(&record.created_by)
        .bind(record.created_at)
        .bind(record.ledger_as_of)
        .bind(&record.resolved_by)
        .bind(record.resolved_at)
        .bind(&record.notes)
        .bind(record.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(db_to_port_error)?;

        for item in items {
            sqlx::query(&format!(
                "INSERT INTO reconciliation_items ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
                ITEM_COLUMNS
            ))
            .bind(Uuid::from(item.id))
            .bind(Uuid::from(item.reconciliation_id))
            .bind(i64::from(item.line_number))
            .bind(&item.external_reference)
            .bind(item.amount.cents())
            .bind(item.transaction_date)
            .bind(item.match_status.code())
            .bind(item.journal_entry_id.map(Uuid::from))
            .bind(&item.resolved_by)
            .bind(&item.notes)
            .bind(item.resolved_at)
            .execute(&mut *self.tx)
            .await
            .map_err(db_to_port_error)?;
        }
        debug!(items = items.len(), "Reconciliation inserted");
        Ok(())
    }

    async fn lock_reconciliation(&mut self, id: ReconciliationId) -> Result<Option<ReconciliationRecord>, PortError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM reconciliation_records WHERE id = $1 FOR UPDATE",
            RECONCILIATION_COLUMNS
        ))
        .bind(Uuid::from(id))
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db_to_port_error)?;
        Ok(row.as_ref().map(row_to_reconciliation).transpose()?)
    }

    async fn reconciliation_items(&mut self, id: ReconciliationId) -> Result<Vec<ReconciliationItem>, PortError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM reconciliation_items WHERE reconciliation_id = $1 ORDER BY line_number",
            ITEM_COLUMNS
        ))
        .bind(Uuid::from(id))
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db_to_port_error)?;
        map_rows(&rows, row_to_item)
    }

    async fn update_reconciliation(&mut self, record: &ReconciliationRecord) -> Result<(), PortError> {
        let result = sqlx::query(
            "UPDATE reconciliation_records SET source_balance_cents = $2, ledger_balance_cents = $3, \
             variance_cents = $4, status = $5, total_items = $6, matched_items = $7, unmatched_items = $8, \
             auto_matched_items = $9, manual_matched_items = $10, resolved_no_match_items = $11, \
             ledger_as_of = $12, resolved_by = $13, resolved_at = $14, notes = $15, updated_at = $16 \
             WHERE id = $1",
        )
        .bind(Uuid::from(record.id))
        .bind(record.source_balance.cents())
        .bind(record.ledger_balance.cents())
        .bind(record.variance.cents())
        .bind(record.status.code())
        .bind(i64::from(record.total_items))
        .bind(i64::from(record.matched_items))
        .bind(i64::from(record.unmatched_items))
        .bind(i64::from(record.auto_matched_items))
        .bind(i64::from(record.manual_matched_items))
        .bind(i64::from(record.resolved_no_match_items))
        .bind(record.ledger_as_of)
        .bind(&record.resolved_by)
        .bind(record.resolved_at)
        .bind(&record.notes)
        .bind(record.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(db_to_port_error)?;
        ensure_updated(result.rows_affected(), "Reconciliation", record.id)
    }

    async fn update_item(&mut self, item: &ReconciliationItem) -> Result<(), PortError> {
        let result = sqlx::query(
            "UPDATE reconciliation_items SET match_status = $2, journal_entry_id = $3, resolved_by = $4, \
             notes = $5, resolved_at = $6 WHERE id = $1",
        )
        .bind(Uuid::from(item.id))
        .bind(item.match_status.code())
        .bind(item.journal_entry_id.map(Uuid::from))
        .bind(&item.resolved_by)
        .bind(&item.notes)
        .bind(item.resolved_at)
        .execute(&mut *self.tx)
        .await
        .map_err(db_to_port_error)?;
        ensure_updated(result.rows_affected(), "ReconciliationItem", item.id)
    }

    async fn items_linked_to(&mut self, entry_ids: &[JournalEntryId]) -> Result<Vec<ReconciliationItem>, PortError> {
        let ids: Vec<Uuid> = entry_ids.iter().copied().map(Uuid::from).collect();
        let rows = sqlx::query(&format!(
            "SELECT {} FROM reconciliation_items WHERE journal_entry_id = ANY($1) ORDER BY reconciliation_id, line_number",
            ITEM_COLUMNS
        ))
        .bind(&ids)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db_to_port_error)?;
        map_rows(&rows, row_to_item)
    }

    #[instrument(skip(self, settlement), fields(settlement_number = %settlement.settlement_number))]
    async fn insert_settlement(&mut self, settlement: &PartnerSettlement) -> Result<(), PortError> {
        sqlx::query(&format!(
            "INSERT INTO partner_settlements ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, \
             $14, $15, $16, $17, $18, $19, $20, $21)",
            SETTLEMENT_COLUMNS
        ))
        .bind(Uuid::from(settlement.id))
        .bind(&settlement.settlement_number)
        .bind(settlement.partner.code())
        .bind(Uuid::from(settlement.organization_id))
        .bind(&settlement.organization_name)
        .bind(settlement.period.start)
        .bind(settlement.period.end)
        .bind(settlement.service_fee_total.cents())
        .bind(settlement.commission_total.cents())
        .bind(settlement.total_amount.cents())
        .bind(i64::from(settlement.line_count))
        .bind(settlement.status.code())
        .bind(settlement.as_of)
        .bind(&settlement.created_by)
        .bind(settlement.created_at)
        .bind(&settlement.approved_by)
        .bind(settlement.approved_at)
        .bind(settlement.paid_at)
        .bind(&settlement.payment_reference)
        .bind(&settlement.cancellation_reason)
        .bind(settlement.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(db_to_port_error)?;

        for line in &settlement.lines {
            sqlx::query(
                "INSERT INTO settlement_lines (id, settlement_id, line_number, kind, amount_cents, rider_id, \
                 transaction_id, escrow_record_id, journal_entry_id, description) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
            )
            .bind(Uuid::from(line.id))
            .bind(Uuid::from(line.settlement_id))
            .bind(i64::from(line.line_number))
            .bind(line.kind.code())
            .bind(line.amount.cents())
            .bind(line.rider_id.map(Uuid::from))
            .bind(line.transaction_id.map(Uuid::from))
            .bind(line.escrow_record_id.map(Uuid::from))
            .bind(line.journal_entry_id.map(Uuid::from))
            .bind(&line.description)
            .execute(&mut *self.tx)
            .await
            .map_err(db_to_port_error)?;
        }
        debug!(lines = settlement.lines.len(), "Settlement inserted");
        Ok(())
    }

    async fn lock_settlement(&mut self, id: SettlementId) -> Result<Option<PartnerSettlement>, PortError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM partner_settlements WHERE id = $1 FOR UPDATE",
            SETTLEMENT_COLUMNS
        ))
        .bind(Uuid::from(id))
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db_to_port_error)?;
        let Some(row) = row else {
            return Ok(None);
        };

        let line_rows = sqlx::query(
            "SELECT id, settlement_id, line_number, kind, amount_cents, rider_id, transaction_id, \
             escrow_record_id, journal_entry_id, description \
             FROM settlement_lines WHERE settlement_id = $1 ORDER BY line_number",
        )
        .bind(Uuid::from(id))
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db_to_port_error)?;
        let lines = map_rows(&line_rows, row_to_settlement_line)?;
        Ok(Some(row_to_settlement(&row, lines)?))
    }

    async fn update_settlement(&mut self, settlement: &PartnerSettlement) -> Result<(), PortError> {
        let result = sqlx::query(
            "UPDATE partner_settlements SET status = $2, approved_by = $3, approved_at = $4, paid_at = $5, \
             payment_reference = $6, cancellation_reason = $7, updated_at = $8 WHERE id = $1",
        )
        .bind(Uuid::from(settlement.id))
        .bind(settlement.status.code())
        .bind(&settlement.approved_by)
        .bind(settlement.approved_at)
        .bind(settlement.paid_at)
        .bind(&settlement.payment_reference)
        .bind(&settlement.cancellation_reason)
        .bind(settlement.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(db_to_port_error)?;
        ensure_updated(result.rows_affected(), "PartnerSettlement", settlement.id)
    }

    async fn commit(self: Box<Self>) -> Result<(), PortError> {
        self.tx
            .commit()
            .await
            .map_err(|e| PortError::from(DatabaseError::from(e)))?;
        debug!("Unit of work committed");
        Ok(())
    }
}
