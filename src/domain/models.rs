use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_DAILY_HORIZON: i32 = 7;
pub const DEFAULT_WEEKLY_HORIZON: i32 = 4;
pub const DEFAULT_MONTHLY_HORIZON: i32 = 3;
/// Largest horizon a rule may carry before expansion refuses it.
pub const DEFAULT_MAX_HORIZON: i32 = 1000;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Event,
    Todo,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MoodTag {
    Happy,
    Neutral,
    Sad,
}

impl MoodTag {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Happy => "happy",
            Self::Neutral => "neutral",
            Self::Sad => "sad",
        }
    }
}

impl FromStr for MoodTag {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "happy" => Ok(Self::Happy),
            "neutral" => Ok(Self::Neutral),
            "sad" => Ok(Self::Sad),
            other => Err(format!("unknown mood tag `{other}`")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
}

impl Frequency {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Frequency {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "daily" => Ok(Self::Daily),
            "weekly" => Ok(Self::Weekly),
            "monthly" => Ok(Self::Monthly),
            other => Err(format!("unknown recurrence frequency `{other}`")),
        }
    }
}

/// Number of occurrences generated per frequency when a rule is created
/// without an explicit horizon.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RecurrenceDefaults {
    pub daily: i32,
    pub weekly: i32,
    pub monthly: i32,
    #[serde(default = "default_max_horizon")]
    pub max_horizon: i32,
}

fn default_max_horizon() -> i32 {
    DEFAULT_MAX_HORIZON
}

impl Default for RecurrenceDefaults {
    fn default() -> Self {
        Self {
            daily: DEFAULT_DAILY_HORIZON,
            weekly: DEFAULT_WEEKLY_HORIZON,
            monthly: DEFAULT_MONTHLY_HORIZON,
            max_horizon: DEFAULT_MAX_HORIZON,
        }
    }
}

impl RecurrenceDefaults {
    pub fn horizon_for(&self, frequency: Frequency) -> i32 {
        match frequency {
            Frequency::Daily => self.daily,
            Frequency::Weekly => self.weekly,
            Frequency::Monthly => self.monthly,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_horizon <= 0 {
            return Err("recurrence.maxHorizon must be > 0".to_string());
        }
        for frequency in [Frequency::Daily, Frequency::Weekly, Frequency::Monthly] {
            let horizon = self.horizon_for(frequency);
            if horizon <= 0 {
                return Err(format!("recurrence.{frequency} horizon must be > 0"));
            }
            if horizon > self.max_horizon {
                return Err(format!(
                    "recurrence.{frequency} horizon {horizon} exceeds maxHorizon {}",
                    self.max_horizon
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecurrenceRule {
    pub frequency: Frequency,
    pub horizon: i32,
}

impl RecurrenceRule {
    pub fn new(frequency: Frequency, horizon: i32) -> Self {
        Self { frequency, horizon }
    }

    pub fn with_default_horizon(frequency: Frequency, defaults: &RecurrenceDefaults) -> Self {
        Self::new(frequency, defaults.horizon_for(frequency))
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.horizon <= 0 {
            return Err(format!(
                "recurrence.horizon must be > 0 (got {})",
                self.horizon
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeSpan {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeSpan {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, String> {
        let span = Self { start, end };
        span.validate()?;
        Ok(span)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.end < self.start {
            return Err("span.end must be >= span.start".to_string());
        }
        Ok(())
    }

    pub fn overlaps(&self, other: &TimeSpan) -> bool {
        if self.start == self.end {
            return self.start >= other.start && self.start <= other.end;
        }
        self.start < other.end && other.start < self.end
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScheduledItem {
    pub id: Option<String>,
    pub owner_id: String,
    pub kind: ItemKind,
    pub title: String,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed: bool,
    pub color_tag: Option<String>,
    pub mood_tag: Option<MoodTag>,
    pub location: Option<String>,
    pub action_plan: Option<String>,
    pub reflection: Option<String>,
    pub recurrence_rule: Option<RecurrenceRule>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl ScheduledItem {
    pub fn new_event(owner_id: impl Into<String>, title: impl Into<String>, span: TimeSpan) -> Self {
        Self {
            id: None,
            owner_id: owner_id.into(),
            kind: ItemKind::Event,
            title: title.into(),
            start_time: Some(span.start),
            end_time: Some(span.end),
            completed: false,
            color_tag: None,
            mood_tag: None,
            location: None,
            action_plan: None,
            reflection: None,
            recurrence_rule: None,
            updated_at: None,
        }
    }

    pub fn new_todo(owner_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: None,
            owner_id: owner_id.into(),
            kind: ItemKind::Todo,
            title: title.into(),
            start_time: None,
            end_time: None,
            completed: false,
            color_tag: None,
            mood_tag: None,
            location: None,
            action_plan: None,
            reflection: None,
            recurrence_rule: None,
            updated_at: None,
        }
    }

    pub fn with_recurrence(mut self, rule: RecurrenceRule) -> Self {
        self.recurrence_rule = Some(rule);
        self
    }

    pub fn is_draft(&self) -> bool {
        self.persisted_id().is_none()
    }

    pub fn persisted_id(&self) -> Option<&str> {
        self.id.as_deref().map(str::trim).filter(|id| !id.is_empty())
    }

    pub fn span(&self) -> Option<TimeSpan> {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => Some(TimeSpan { start, end }),
            _ => None,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.owner_id, "item.owner_id")?;
        validate_non_empty(&self.title, "item.title")?;
        if let Some(id) = self.id.as_deref() {
            validate_non_empty(id, "item.id")?;
        }

        match self.kind {
            ItemKind::Event => {
                let (Some(start), Some(end)) = (self.start_time, self.end_time) else {
                    return Err("event.start_time and event.end_time are required".to_string());
                };
                if end < start {
                    return Err("event.end_time must be >= event.start_time".to_string());
                }
            }
            ItemKind::Todo => {
                if self.start_time.is_some() || self.end_time.is_some() {
                    return Err("todo must not carry start_time or end_time".to_string());
                }
                if self.recurrence_rule.is_some() {
                    return Err("todo must not carry a recurrence rule".to_string());
                }
            }
        }

        if let Some(rule) = &self.recurrence_rule {
            rule.validate()?;
        }
        Ok(())
    }

    /// Equality that ignores server-maintained metadata.
    pub fn same_content(&self, other: &ScheduledItem) -> bool {
        let mut left = self.clone();
        let mut right = other.clone();
        left.updated_at = None;
        right.updated_at = None;
        left == right
    }
}

/// One concrete instance of a (possibly recurring) event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Occurrence {
    pub parent_id: Option<String>,
    pub sequence_index: u32,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl Occurrence {
    pub fn span(&self) -> TimeSpan {
        TimeSpan {
            start: self.start_time,
            end: self.end_time,
        }
    }
}

pub(crate) fn validate_non_empty(value: &str, field_name: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{field_name} must not be empty"));
    }
    Ok(())
}
