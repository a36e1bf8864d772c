use crate::domain::completion::TransitionError;
use crate::domain::models::ScheduledItem;
use crate::domain::recurrence::RecurrenceError;
use crate::domain::view::Rejected;
use crate::infrastructure::error::InfraError;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOperation {
    Create,
    Update,
    ToggleCompletion,
    Delete,
}

impl SyncOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::ToggleCompletion => "toggle_completion",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for SyncOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A rejected remote mutation. `item` is the item as the caller submitted it,
/// so the caller can retry the same operation.
#[derive(Debug, Error)]
#[error("{operation} failed: {cause}")]
pub struct SyncFailure {
    pub operation: SyncOperation,
    pub item: ScheduledItem,
    #[source]
    pub cause: InfraError,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("invalid recurrence rule: {0}")]
    InvalidRecurrenceRule(String),
    #[error("item not found: {0}")]
    ItemNotFound(String),
    #[error(transparent)]
    NotPersisted(#[from] TransitionError),
    #[error("sync failed: {0}")]
    SyncFailed(Box<SyncFailure>),
    #[error(transparent)]
    Rejected(#[from] Rejected),
    #[error(transparent)]
    Remote(#[from] InfraError),
    #[error("configuration error: {0}")]
    Config(#[source] InfraError),
    #[error("store error: {0}")]
    Store(String),
}

impl EngineError {
    pub fn sync_failed(operation: SyncOperation, item: ScheduledItem, cause: InfraError) -> Self {
        Self::SyncFailed(Box::new(SyncFailure {
            operation,
            item,
            cause,
        }))
    }

    pub fn sync_failure(&self) -> Option<&SyncFailure> {
        match self {
            Self::SyncFailed(failure) => Some(failure),
            _ => None,
        }
    }

    /// True when the transport rejected the bearer credential, whether during
    /// a mutation or a plain read.
    pub fn is_unauthenticated(&self) -> bool {
        match self {
            Self::Remote(error) => error.is_unauthenticated(),
            Self::SyncFailed(failure) => failure.cause.is_unauthenticated(),
            _ => false,
        }
    }
}

impl From<RecurrenceError> for EngineError {
    fn from(error: RecurrenceError) -> Self {
        match error {
            RecurrenceError::InvalidRule(message) => Self::InvalidRecurrenceRule(message),
        }
    }
}
