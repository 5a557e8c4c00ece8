//! Settlement Domain - What each partner is owed
//!
//! A settlement aggregates, for one partner and one period:
//! - the partner's basis-point share of every service fee whose receipt is posted
//! - commission entries posted for the partner
//!
//! into a PROPOSED header with one traceable line per contributing record.
//! Payout itself is authorized downstream; the entity only carries the
//! APPROVED / PAID / CANCELLED transitions that approver drives.

pub mod calculator;
pub mod error;
pub mod organization;
pub mod settlement;
pub mod shares;

pub use calculator::SettlementCalculator;
pub use error::SettlementError;
pub use organization::{Organization, OrganizationDirectory, StaticDirectory};
pub use settlement::{
    format_settlement_number, settlement_sequence_key, LineDraft, PartnerSettlement, SettlementLine,
    SettlementLineKind, SettlementStatus,
};
pub use shares::{FeeShareSchedule, FULL_SHARE_BPS};
