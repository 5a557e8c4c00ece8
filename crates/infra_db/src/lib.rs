//! Infrastructure Database Layer
//!
//! PostgreSQL adapter for the collection ledger's storage port, built on
//! SQLx.
//!
//! # Architecture
//!
//! Services in `settlement_engine` only see `LedgerStore` and
//! `UnitOfWork`. [`PgLedgerStore`] maps each unit of work onto one
//! database transaction, so an operation either lands completely (entry,
//! lines, balances, escrow and batch rows together) or not at all.
//!
//! # Schema
//!
//! Migrations live in `migrations/` and are embedded in the binary.
//! Amounts are stored as integer cents, enumerations as their upper-case
//! codes. Uniqueness rules the services rely on are enforced by indexes:
//!
//! - one journal entry per business source (payment, refund, batch, settlement)
//! - one escrow record per payment transaction
//! - one PENDING remittance batch per type and business day
//!
//! # Example
//!
//! ```rust,ignore
//! use infra_db::{create_pool, run_migrations, DatabaseConfig, PgLedgerStore};
//!
//! let pool = create_pool(DatabaseConfig::new("postgres://localhost/ledger")).await?;
//! run_migrations(&pool).await?;
//! let store = PgLedgerStore::new(pool);
//! ```

pub mod error;
pub mod pool;
pub mod store;

pub use error::DatabaseError;
pub use pool::{create_pool, run_migrations, DatabaseConfig, DatabasePool, MIGRATOR};
pub use store::{PgLedgerStore, PgUnitOfWork};
