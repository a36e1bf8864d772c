use crate::domain::models::ScheduledItem;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CompletionState {
    Pending,
    Completed,
    /// Terminal. Deleted items are removed from the store, never retained.
    Deleted,
}

impl CompletionState {
    pub fn of(item: &ScheduledItem) -> Self {
        if item.completed {
            Self::Completed
        } else {
            Self::Pending
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Deleted => "deleted",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    Complete,
    Reopen,
    Remove,
}

impl Transition {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Complete => "complete",
            Self::Reopen => "reopen",
            Self::Remove => "remove",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("cannot {0} an item that has not been persisted yet")]
    NotPersisted(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionPlan {
    pub transition: Transition,
    pub from: CompletionState,
    pub to: CompletionState,
}

impl TransitionPlan {
    pub fn is_noop(&self) -> bool {
        self.from == self.to
    }

    /// The `completed` flag the item carries after a non-terminal transition.
    pub fn completed_flag(&self) -> Option<bool> {
        match self.to {
            CompletionState::Pending => Some(false),
            CompletionState::Completed => Some(true),
            CompletionState::Deleted => None,
        }
    }
}

/// Decides the effect of `transition` on `item` without mutating it.
///
/// Toggles require a persisted id; removal is unconditional.
pub fn plan_transition(
    item: &ScheduledItem,
    transition: Transition,
) -> Result<TransitionPlan, TransitionError> {
    let from = CompletionState::of(item);
    let to = match transition {
        Transition::Complete => CompletionState::Completed,
        Transition::Reopen => CompletionState::Pending,
        Transition::Remove => CompletionState::Deleted,
    };
    if transition != Transition::Remove && item.is_draft() {
        return Err(TransitionError::NotPersisted(transition.as_str()));
    }
    Ok(TransitionPlan {
        transition,
        from,
        to,
    })
}

/// Applies a toggle plan to `item`. Removal plans leave the item untouched;
/// the store drops it.
pub fn apply_plan(item: &mut ScheduledItem, plan: &TransitionPlan) {
    if let Some(completed) = plan.completed_flag() {
        item.completed = completed;
    }
}
