use rust_decimal::Decimal;
use thiserror::Error;

use safevault_core::{AccountId, Asset, DomainError, ErrorKind};
use safevault_pricing::RateError;

pub type TransferResult<T> = Result<T, TransferError>;

/// Failures surfaced synchronously by the transfer protocol.
///
/// Any of these means no balance changed and no ledger entry was written.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransferError {
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("cannot transfer to the same account")]
    SelfTransfer,

    #[error("source and target asset are both {0}")]
    SameAsset(Asset),

    #[error("receiver {0} not found")]
    ReceiverNotFound(AccountId),

    #[error("receiver {0} is banned")]
    ReceiverBanned(AccountId),

    #[error("account {0} not found")]
    AccountNotFound(AccountId),

    #[error("account suspended: {reason}")]
    SenderSuspended { reason: String },

    #[error("insufficient {asset} balance (available: {available}, requested: {requested})")]
    InsufficientFunds {
        asset: Asset,
        available: Decimal,
        requested: Decimal,
    },

    #[error(transparent)]
    RateUnavailable(#[from] RateError),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("storage failure: {0}")]
    Storage(String),
}

impl TransferError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TransferError::InvalidAmount(_)
            | TransferError::SelfTransfer
            | TransferError::SameAsset(_) => ErrorKind::Validation,
            TransferError::ReceiverNotFound(_) | TransferError::AccountNotFound(_) => {
                ErrorKind::NotFound
            }
            TransferError::ReceiverBanned(_) | TransferError::SenderSuspended { .. } => {
                ErrorKind::Suspended
            }
            TransferError::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            TransferError::RateUnavailable(_) => ErrorKind::RateUnavailable,
            TransferError::Conflict(_) => ErrorKind::Conflict,
            TransferError::Storage(_) => ErrorKind::Internal,
        }
    }

    pub(crate) fn is_retryable(&self) -> bool {
        matches!(self, TransferError::Conflict(_))
    }
}

impl From<DomainError> for TransferError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation(msg) => TransferError::InvalidAmount(msg),
            DomainError::InsufficientFunds {
                asset,
                available,
                requested,
            } => TransferError::InsufficientFunds {
                asset,
                available,
                requested,
            },
            DomainError::Suspended { reason } => TransferError::SenderSuspended { reason },
            DomainError::Conflict(msg) => TransferError::Conflict(msg),
            // Missing accounts are detected explicitly by the service; anything
            // else reaching here is a store inconsistency.
            DomainError::NotFound(msg) => TransferError::Storage(format!("not found: {msg}")),
            DomainError::Storage(msg) => TransferError::Storage(msg),
        }
    }
}
