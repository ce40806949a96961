use crate::models::MachineId;
use chrono::{DateTime, Utc};
use core::fmt;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Errors surfaced by the registry, the telemetry store, the event log and the
/// analytics built on top of them.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreError {
    /// The referenced machine is not (or no longer) registered
    NotFound(MachineId),
    /// A record or machine spec failed validation
    Validation(String),
    /// Query bounds are inverted, or a comparison window is malformed
    InvalidRange { from: DateTime<Utc>, to: DateTime<Utc> },
}

impl StoreError {
    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        StoreError::Validation(msg.into())
    }
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::NotFound(id) => write!(f, "machine {} not found", id.0),
            StoreError::Validation(msg) => write!(f, "validation failed: {}", msg),
            StoreError::InvalidRange { from, to } => {
                write!(f, "invalid range: {} is after {}", from.to_rfc3339(), to.to_rfc3339())
            }
        }
    }
}

impl Error for StoreError {}

pub type StoreResult<T> = Result<T, StoreError>;
