//! Domain error model.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::asset::Asset;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Caller-facing error taxonomy.
///
/// Every crate-specific error collapses into one of these kinds so that an outer
/// surface (HTTP, CLI, inbox) can treat failures uniformly.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed amount/asset/argument, rejected before any mutation.
    Validation,
    /// Unknown account, transaction or notification.
    NotFound,
    InsufficientFunds,
    /// Concurrent update could not be serialized.
    Conflict,
    /// Price feed failure; conversion aborted.
    RateUnavailable,
    /// Banned account attempted to initiate an operation.
    Suspended,
    /// Storage or wiring failure.
    Internal,
}

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures raised by the
/// stores (validation, missing records, balance and status invariants).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. malformed input).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A requested record was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// A debit would take a balance below zero.
    #[error("insufficient {asset} balance (available: {available}, requested: {requested})")]
    InsufficientFunds {
        asset: Asset,
        available: Decimal,
        requested: Decimal,
    },

    /// A conflict occurred (duplicate key, stale state).
    #[error("conflict: {0}")]
    Conflict(String),

    /// The account is banned and may not initiate operations.
    #[error("account suspended: {reason}")]
    Suspended { reason: String },

    /// The backing store failed (e.g. poisoned lock).
    #[error("storage failure: {0}")]
    Storage(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    pub fn lock_poisoned() -> Self {
        Self::Storage("lock poisoned".to_string())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            DomainError::Validation(_) => ErrorKind::Validation,
            DomainError::NotFound(_) => ErrorKind::NotFound,
            DomainError::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            DomainError::Conflict(_) => ErrorKind::Conflict,
            DomainError::Suspended { .. } => ErrorKind::Suspended,
            DomainError::Storage(_) => ErrorKind::Internal,
        }
    }
}
