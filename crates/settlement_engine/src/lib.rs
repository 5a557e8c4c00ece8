//! Settlement Engine - Application Services for the Collection Ledger
//!
//! Wires the domain crates to a storage adapter and exposes one service per
//! component:
//!
//! - `accounts` - chart of accounts registry
//! - `journal` - manual journal entries through the approval path
//! - `payments` - payment intake (receipt + escrow) and refunds
//! - `remittance` - batches of escrowed premium sent to the underwriter
//! - `reconciliation` - statements matched against the ledger
//! - `settlement` - partner settlements and commission accrual
//! - `reporting` - trial balance, statements and summaries
//!
//! # Example
//!
//! ```rust,ignore
//! let config = EngineConfig::load()?;
//! telemetry::init(&config.telemetry);
//! let engine = Engine::new(
//!     &config,
//!     Arc::new(InMemoryStore::new()),
//!     Arc::new(TracingAuditSink),
//!     Arc::new(StaticDirectory::standard()),
//! )?;
//! engine.accounts.seed_standard_chart("bootstrap").await?;
//! let recorded = engine.payments.record_payment(&payment).await?;
//! ```

pub mod config;
pub mod error;
pub mod services;
pub mod store;
pub mod telemetry;

use std::sync::Arc;

use core_kernel::AuditSink;
use domain_settlement::{OrganizationDirectory, SettlementCalculator};

pub use config::{ConfigError, EngineConfig};
pub use error::EngineError;
pub use services::payments::FeeSchedule;
pub use services::{
    AccountService, AutoMatchSummary, BatchSweep, EngineContext, JournalService, PaymentRecorded, PaymentService,
    ReconciliationService, ReconciliationSummary, RefundOutcome, RemittanceService, ReportingService,
    ReversalOutcome, SeedReport, SettlementService, SettlementSummary, SYSTEM_ACTOR,
};
pub use store::{InMemoryStore, LedgerStore, UnitOfWork};

/// Every service over one store, audit sink and calendar
#[derive(Clone)]
pub struct Engine {
    pub accounts: AccountService,
    pub journal: JournalService,
    pub payments: PaymentService,
    pub remittance: RemittanceService,
    pub reconciliation: ReconciliationService,
    pub settlement: SettlementService,
    pub reporting: ReportingService,
}

impl Engine {
    /// Builds the services from validated configuration
    ///
    /// # Errors
    ///
    /// Returns `Fatal` if the configuration is inconsistent (unknown
    /// timezone, fee shares not summing to the whole fee).
    pub fn new(
        config: &EngineConfig,
        store: Arc<dyn LedgerStore>,
        audit: Arc<dyn AuditSink>,
        directory: Arc<dyn OrganizationDirectory>,
    ) -> Result<Self, EngineError> {
        config.validate_all()?;
        let ctx = EngineContext::new(store, audit, config.timezone()?);
        let calculator = SettlementCalculator::new(config.fee_shares()?)?;
        let fees = FeeSchedule {
            deposit: config.deposit_fee(),
            daily: config.daily_fee(),
        };

        Ok(Self {
            accounts: AccountService::new(ctx.clone()),
            journal: JournalService::new(ctx.clone()),
            payments: PaymentService::new(ctx.clone(), fees),
            remittance: RemittanceService::new(ctx.clone()),
            reconciliation: ReconciliationService::new(ctx.clone(), config.match_tolerance()),
            settlement: SettlementService::new(ctx.clone(), calculator, directory),
            reporting: ReportingService::new(ctx),
        })
    }
}
