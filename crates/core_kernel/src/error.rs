//! Core error types used across the system

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::money::MoneyError;
use crate::temporal::TemporalError;

/// Classification shared by every domain error
///
/// Domain crates keep their own error enums; each one maps onto exactly one
/// of these kinds so callers can decide how to react without matching on
/// crate-specific variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed input, rejected before any mutation
    Validation,
    /// Operation not permitted from the current state
    InvalidStateTransition,
    /// Duplicate or competing write; do not retry blindly
    Conflict,
    /// Referenced entity does not exist
    NotFound,
    /// Underlying store failed; the unit of work was rolled back
    Persistence,
    /// Arithmetic overflow or misconfiguration
    Fatal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Validation => "validation",
            ErrorKind::InvalidStateTransition => "invalid_state_transition",
            ErrorKind::Conflict => "conflict",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Persistence => "persistence",
            ErrorKind::Fatal => "fatal",
        };
        f.write_str(s)
    }
}

/// Core error type for the kernel
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Money error: {0}")]
    Money(#[from] MoneyError),

    #[error("Temporal error: {0}")]
    Temporal(#[from] TemporalError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl CoreError {
    pub fn validation(message: impl Into<String>) -> Self {
        CoreError::Validation(message.into())
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        CoreError::Configuration(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::Money(MoneyError::Overflow) => ErrorKind::Fatal,
            CoreError::Money(MoneyError::InvalidAmount(_)) => ErrorKind::Validation,
            CoreError::Temporal(_) | CoreError::Validation(_) => ErrorKind::Validation,
            CoreError::Configuration(_) => ErrorKind::Fatal,
        }
    }
}

impl MoneyError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MoneyError::Overflow => ErrorKind::Fatal,
            MoneyError::InvalidAmount(_) => ErrorKind::Validation,
        }
    }
}
