//! Escrow Domain - Premium Held for the Underwriter
//!
//! Every premium-bearing payment leaves an `EscrowRecord` that is later swept
//! into a `RemittanceBatch`:
//!
//! ```text
//! EscrowRecord:    PENDING → SCHEDULED → REMITTED
//!                  PENDING/SCHEDULED → REFUNDED
//! RemittanceBatch: PENDING → APPROVED → PROCESSING → COMPLETED
//!                  APPROVED/PROCESSING → FAILED → PROCESSING (retry)
//! ```

pub mod batch;
pub mod error;
pub mod record;

pub use batch::{
    batch_sequence_key, format_batch_number, is_sweepable, BatchStatus, BatchType, RemittanceBatch,
    SweepCutoff, TransferOutcome,
};
pub use error::EscrowError;
pub use record::{EscrowRecord, EscrowType, PaymentSplit, RemittanceStatus, ScheduleOutcome};
