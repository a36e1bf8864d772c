use crate::domain::models::{Occurrence, RecurrenceRule, ScheduledItem, TimeSpan};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CalendarView {
    #[default]
    Month,
    Week,
    Day,
    Agenda,
}

impl CalendarView {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Month => "month",
            Self::Week => "week",
            Self::Day => "day",
            Self::Agenda => "agenda",
        }
    }

    pub fn allows_slot_creation(self) -> bool {
        !matches!(self, Self::Month)
    }
}

impl FromStr for CalendarView {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "month" => Ok(Self::Month),
            "week" => Ok(Self::Week),
            "day" => Ok(Self::Day),
            "agenda" => Ok(Self::Agenda),
            other => Err(format!("unknown calendar view `{other}`")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RejectReason {
    #[error("wrong view")]
    WrongView,
    #[error("invalid range")]
    InvalidRange,
    #[error("parent item missing")]
    ParentMissing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("rejected: {reason}")]
pub struct Rejected {
    pub reason: RejectReason,
}

/// Editor fields that apply to newly drafted events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftDefaults {
    pub color_tag: Option<String>,
    pub recurrence_rule: Option<RecurrenceRule>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenEditor {
    New { prefilled_range: TimeSpan },
    Existing { item: ScheduledItem },
}

impl OpenEditor {
    /// Builds the draft event a `New` editor starts from. `Existing` editors
    /// return a copy of the parent item.
    pub fn draft(&self, owner_id: &str, title: &str, defaults: &DraftDefaults) -> ScheduledItem {
        match self {
            Self::New { prefilled_range } => {
                let mut item = ScheduledItem::new_event(owner_id, title, *prefilled_range);
                item.color_tag = defaults.color_tag.clone();
                item.recurrence_rule = defaults.recurrence_rule;
                item
            }
            Self::Existing { item } => item.clone(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct InteractionController {
    view: CalendarView,
}

impl InteractionController {
    pub fn new(view: CalendarView) -> Self {
        Self { view }
    }

    pub fn view(&self) -> CalendarView {
        self.view
    }

    pub fn set_view(&mut self, view: CalendarView) {
        self.view = view;
    }

    /// Slot selection. Month view is too coarse to create from, so the user
    /// has to zoom in first.
    pub fn request_create_at(&self, range: TimeSpan) -> Result<OpenEditor, Rejected> {
        if !self.view.allows_slot_creation() {
            return Err(Rejected {
                reason: RejectReason::WrongView,
            });
        }
        if range.validate().is_err() {
            return Err(Rejected {
                reason: RejectReason::InvalidRange,
            });
        }
        Ok(OpenEditor::New {
            prefilled_range: range,
        })
    }

    /// Toolbar "new event" action; available in every view.
    pub fn request_create_now(&self, now: DateTime<Utc>) -> OpenEditor {
        OpenEditor::New {
            prefilled_range: TimeSpan { start: now, end: now },
        }
    }

    /// Clicking an occurrence edits its parent, which is the only persisted
    /// record.
    pub fn open_occurrence(
        &self,
        occurrence: &Occurrence,
        parent: Option<&ScheduledItem>,
    ) -> Result<OpenEditor, Rejected> {
        let parent = parent
            .filter(|item| {
                occurrence.parent_id.is_some()
                    && item.persisted_id() == occurrence.parent_id.as_deref()
            })
            .ok_or(Rejected {
                reason: RejectReason::ParentMissing,
            })?;
        Ok(OpenEditor::Existing {
            item: parent.clone(),
        })
    }
}
