//! Test Utilities Crate
//!
//! Provides shared test infrastructure, fixtures, and helpers for the
//! collection ledger test suite.
//!
//! # Modules
//!
//! - `fixtures`: Business calendar, chart of accounts and reference payments
//! - `builders`: Builder patterns for payments and statements
//! - `database`: PostgreSQL container management
//! - `assertions`: Assertion helpers for ledger types
//! - `generators`: Property-based test data generators

pub mod fixtures;
pub mod builders;
pub mod database;
pub mod assertions;
pub mod generators;

pub use fixtures::*;
pub use builders::*;
pub use database::*;
pub use assertions::*;
pub use generators::*;
