use thiserror::Error;
use uuid::Uuid;

use crate::model::LeadStatus;

#[derive(Error, Debug)]
pub enum LeadflowError {
    #[error("Lead not found: {0}")]
    LeadNotFound(Uuid),

    #[error("Closer not found: {0}")]
    CloserNotFound(String),

    #[error("Team not found: {0}")]
    TeamNotFound(String),

    #[error("Write conflict on {document}: expected version {expected}, found {actual}")]
    Conflict {
        document: String,
        expected: u64,
        actual: u64,
    },

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition { from: LeadStatus, to: LeadStatus },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl LeadflowError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, LeadflowError::Conflict { .. })
    }
}

pub type Result<T> = std::result::Result<T, LeadflowError>;
