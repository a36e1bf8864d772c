use crate::domain::models::{Frequency, ItemKind, MoodTag, RecurrenceRule, ScheduledItem};
use crate::infrastructure::error::InfraError;
use chrono::{DateTime, Utc};

const KIND_EVENT: &str = "event";
const KIND_TODO: &str = "todo";

/// Identifiers arrive as strings or as numeric database keys.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum WireId {
    Text(String),
    Number(i64),
}

impl WireId {
    fn into_string(self) -> String {
        match self {
            Self::Text(value) => value.trim().to_string(),
            Self::Number(value) => value.to_string(),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct RemoteRecurrenceRule {
    pub frequency: String,
    pub horizon: i32,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RemoteItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<WireId>,
    pub owner_id: WireId,
    pub kind: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
    #[serde(default)]
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color_tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mood_tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_plan: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reflection: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recurrence_rule: Option<RemoteRecurrenceRule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

pub fn encode_item(item: &ScheduledItem) -> RemoteItem {
    RemoteItem {
        id: item
            .persisted_id()
            .map(|id| WireId::Text(id.to_string())),
        owner_id: WireId::Text(item.owner_id.clone()),
        kind: kind_to_string(item.kind).to_string(),
        title: item.title.trim().to_string(),
        start_time: item.start_time.map(|value| value.to_rfc3339()),
        end_time: item.end_time.map(|value| value.to_rfc3339()),
        completed: item.completed,
        color_tag: non_empty(item.color_tag.as_deref()),
        mood_tag: item.mood_tag.map(|mood| mood.as_str().to_string()),
        location: non_empty(item.location.as_deref()),
        action_plan: non_empty(item.action_plan.as_deref()),
        reflection: non_empty(item.reflection.as_deref()),
        recurrence_rule: item.recurrence_rule.map(|rule| RemoteRecurrenceRule {
            frequency: rule.frequency.as_str().to_string(),
            horizon: rule.horizon,
        }),
        updated_at: item.updated_at.map(|value| value.to_rfc3339()),
    }
}

pub fn decode_item(remote: RemoteItem) -> Result<ScheduledItem, InfraError> {
    let kind = parse_kind(&remote.kind)?;
    let start_time = remote
        .start_time
        .as_deref()
        .map(|value| parse_rfc3339_utc(value, "startTime"))
        .transpose()?;
    let end_time = remote
        .end_time
        .as_deref()
        .map(|value| parse_rfc3339_utc(value, "endTime"))
        .transpose()?;
    let updated_at = remote
        .updated_at
        .as_deref()
        .map(|value| parse_rfc3339_utc(value, "updatedAt"))
        .transpose()?;
    let mood_tag = remote
        .mood_tag
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(|value| value.parse::<MoodTag>().map_err(InfraError::InvalidPayload))
        .transpose()?;
    let recurrence_rule = remote
        .recurrence_rule
        .map(|rule| {
            rule.frequency
                .parse::<Frequency>()
                .map(|frequency| RecurrenceRule::new(frequency, rule.horizon))
                .map_err(InfraError::InvalidPayload)
        })
        .transpose()?;

    let owner_id = remote.owner_id.into_string();
    if owner_id.is_empty() {
        return Err(InfraError::InvalidPayload("item ownerId must not be empty".to_string()));
    }

    Ok(ScheduledItem {
        id: remote
            .id
            .map(WireId::into_string)
            .filter(|value| !value.is_empty()),
        owner_id,
        kind,
        title: remote.title,
        start_time,
        end_time,
        completed: remote.completed,
        color_tag: non_empty(remote.color_tag.as_deref()),
        mood_tag,
        location: non_empty(remote.location.as_deref()),
        action_plan: non_empty(remote.action_plan.as_deref()),
        reflection: non_empty(remote.reflection.as_deref()),
        recurrence_rule,
        updated_at,
    })
}

fn parse_rfc3339_utc(value: &str, field_name: &str) -> Result<DateTime<Utc>, InfraError> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|value| value.with_timezone(&Utc))
        .map_err(|error| {
            InfraError::InvalidPayload(format!("invalid item {field_name} '{value}': {error}"))
        })
}

fn parse_kind(value: &str) -> Result<ItemKind, InfraError> {
    match value.trim().to_ascii_lowercase().as_str() {
        KIND_EVENT => Ok(ItemKind::Event),
        KIND_TODO => Ok(ItemKind::Todo),
        other => Err(InfraError::InvalidPayload(format!("invalid item kind: {other}"))),
    }
}

fn kind_to_string(kind: ItemKind) -> &'static str {
    match kind {
        ItemKind::Event => KIND_EVENT,
        ItemKind::Todo => KIND_TODO,
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::TimeSpan;

    fn fixed_time(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn sample_event() -> ScheduledItem {
        let span = TimeSpan::new(
            fixed_time("2024-01-01T09:00:00Z"),
            fixed_time("2024-01-01T10:00:00Z"),
        )
        .expect("valid span");
        let mut item = ScheduledItem::new_event("42", "Study", span)
            .with_recurrence(RecurrenceRule::new(Frequency::Weekly, 4));
        item.id = Some("evt-1".to_string());
        item.mood_tag = Some(MoodTag::Neutral);
        item.color_tag = Some("#F5B041".to_string());
        item
    }

    #[test]
    fn encode_and_decode_preserve_event_fields() {
        let item = sample_event();
        let decoded = decode_item(encode_item(&item)).expect("decode should succeed");
        assert_eq!(decoded, item);
    }

    #[test]
    fn encode_uses_camel_case_wire_names() {
        let encoded = serde_json::to_value(encode_item(&sample_event())).expect("serialize");
        assert_eq!(encoded["ownerId"], "42");
        assert_eq!(encoded["startTime"], "2024-01-01T09:00:00+00:00");
        assert_eq!(encoded["recurrenceRule"]["frequency"], "weekly");
        assert_eq!(encoded["moodTag"], "neutral");
        assert!(encoded.get("location").is_none());
    }

    #[test]
    fn drafts_are_encoded_without_id() {
        let mut item = sample_event();
        item.id = None;
        let encoded = serde_json::to_value(encode_item(&item)).expect("serialize");
        assert!(encoded.get("id").is_none());
    }

    #[test]
    fn decode_accepts_numeric_ids() {
        let remote: RemoteItem = serde_json::from_value(serde_json::json!({
            "id": 1700000000000i64,
            "ownerId": 7,
            "kind": "todo",
            "title": "Buy milk",
            "completed": true
        }))
        .expect("valid payload");
        let decoded = decode_item(remote).expect("decode should succeed");
        assert_eq!(decoded.id.as_deref(), Some("1700000000000"));
        assert_eq!(decoded.owner_id, "7");
        assert_eq!(decoded.kind, ItemKind::Todo);
        assert!(decoded.completed);
    }

    #[test]
    fn decode_rejects_unknown_frequency() {
        let mut remote = encode_item(&sample_event());
        remote.recurrence_rule = Some(RemoteRecurrenceRule {
            frequency: "yearly".to_string(),
            horizon: 2,
        });
        assert!(matches!(decode_item(remote), Err(InfraError::InvalidPayload(_))));
    }

    #[test]
    fn decode_returns_error_when_datetime_is_invalid() {
        let mut remote = encode_item(&sample_event());
        remote.start_time = Some("invalid-timestamp".to_string());
        assert!(decode_item(remote).is_err());
    }
}
