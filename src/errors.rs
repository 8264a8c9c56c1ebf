//! Unified error type for the ledger core.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid amount: {reason}")]
    InvalidAmount { reason: String },

    #[error("Invalid split: {reason}")]
    InvalidSplit { reason: String },

    #[error("Invalid frequency: {frequency:?}")]
    InvalidFrequency { frequency: String },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A conditional update lost a race against another writer.
    #[error("Concurrent update of {entity} {id} was rejected")]
    ConcurrencyConflict { entity: &'static str, id: String },

    #[error("Invalid settlement: {reason}")]
    InvalidSettlement { reason: String },

    #[error("Expense {expense_id} has settled shares and can no longer be changed")]
    ExpenseLocked { expense_id: i64 },
}

impl Error {
    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub(crate) fn invalid_split(reason: impl Into<String>) -> Self {
        Self::InvalidSplit {
            reason: reason.into(),
        }
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }
}

// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;
