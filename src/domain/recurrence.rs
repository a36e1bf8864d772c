//! Recurrence expansion for scheduled events.
//!
//! Occurrences are computed from the base span and the sequence index only, so
//! expanding twice (or asking for a single index) always yields the same
//! timestamps. Calendar arithmetic happens on the wall clock of the configured
//! time zone:
//!
//! - monthly shifts clamp to the last day of shorter months (Jan 31 -> Feb 29 -> Mar 31);
//! - ambiguous local times (DST fall-back) resolve to the earlier instant;
//! - local times inside a DST gap keep the offset in effect before the gap;
//! - every occurrence keeps the elapsed duration of the base span.

use crate::domain::models::{
    Frequency, ItemKind, Occurrence, RecurrenceRule, ScheduledItem, TimeSpan, DEFAULT_MAX_HORIZON,
};
use chrono::{DateTime, Days, Duration, LocalResult, Months, NaiveDateTime, Offset, TimeZone, Utc};
use chrono_tz::Tz;
use thiserror::Error;

const MAX_GAP_LOOKBACK_HOURS: i64 = 48;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecurrenceError {
    #[error("invalid recurrence rule: {0}")]
    InvalidRule(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecurrenceExpander {
    time_zone: Tz,
    max_horizon: u32,
}

impl Default for RecurrenceExpander {
    fn default() -> Self {
        Self::new(Tz::UTC)
    }
}

impl RecurrenceExpander {
    pub fn new(time_zone: Tz) -> Self {
        Self {
            time_zone,
            max_horizon: DEFAULT_MAX_HORIZON.unsigned_abs(),
        }
    }

    /// Rules with a larger horizon are rejected instead of expanded.
    pub fn with_max_horizon(mut self, max_horizon: u32) -> Self {
        self.max_horizon = max_horizon;
        self
    }

    pub fn time_zone(&self) -> Tz {
        self.time_zone
    }

    pub fn max_horizon(&self) -> u32 {
        self.max_horizon
    }

    /// Checks the horizon of `item`'s rule against this expander's limit.
    pub fn validate_rule(&self, item: &ScheduledItem) -> Result<(), RecurrenceError> {
        self.occurrence_count(item.recurrence_rule.as_ref())
            .map(|_| ())
    }

    /// Expands `item` into its full, finite list of occurrences.
    ///
    /// Items without a rule yield their own span as the single occurrence;
    /// todos have no span and yield nothing.
    pub fn expand(&self, item: &ScheduledItem) -> Result<Vec<Occurrence>, RecurrenceError> {
        let Some(base) = base_span(item)? else {
            return Ok(Vec::new());
        };
        let count = self.occurrence_count(item.recurrence_rule.as_ref())?;
        let frequency = item.recurrence_rule.map(|rule| rule.frequency);

        (0..count)
            .map(|index| self.build_occurrence(item, base, frequency, index))
            .collect()
    }

    /// Recomputes a single occurrence. Returns `None` past the horizon.
    pub fn occurrence_at(
        &self,
        item: &ScheduledItem,
        sequence_index: u32,
    ) -> Result<Option<Occurrence>, RecurrenceError> {
        let Some(base) = base_span(item)? else {
            return Ok(None);
        };
        let count = self.occurrence_count(item.recurrence_rule.as_ref())?;
        if sequence_index >= count {
            return Ok(None);
        }
        let frequency = item.recurrence_rule.map(|rule| rule.frequency);
        self.build_occurrence(item, base, frequency, sequence_index)
            .map(Some)
    }

    /// Occurrences of `item` overlapping `window`. Only indices near the
    /// window are computed; occurrence starts never decrease with the index.
    pub fn expand_between(
        &self,
        item: &ScheduledItem,
        window: &TimeSpan,
    ) -> Result<Vec<Occurrence>, RecurrenceError> {
        let Some(base) = base_span(item)? else {
            return Ok(Vec::new());
        };
        let count = self.occurrence_count(item.recurrence_rule.as_ref())?;
        let frequency = item.recurrence_rule.map(|rule| rule.frequency);

        // First index whose occurrence ends at or after the window start.
        let (mut low, mut high) = (0u32, count);
        while low < high {
            let middle = low + (high - low) / 2;
            if self.build_occurrence(item, base, frequency, middle)?.end_time < window.start {
                low = middle + 1;
            } else {
                high = middle;
            }
        }

        let mut occurrences = Vec::new();
        for index in low..count {
            let occurrence = self.build_occurrence(item, base, frequency, index)?;
            if occurrence.start_time > window.end {
                break;
            }
            if occurrence.span().overlaps(window) {
                occurrences.push(occurrence);
            }
        }
        Ok(occurrences)
    }

    fn occurrence_count(&self, rule: Option<&RecurrenceRule>) -> Result<u32, RecurrenceError> {
        let Some(rule) = rule else {
            return Ok(1);
        };
        rule.validate().map_err(RecurrenceError::InvalidRule)?;
        let count = u32::try_from(rule.horizon).map_err(|_| {
            RecurrenceError::InvalidRule(format!("horizon {} is out of range", rule.horizon))
        })?;
        if count > self.max_horizon {
            return Err(RecurrenceError::InvalidRule(format!(
                "horizon {count} exceeds the maximum of {}",
                self.max_horizon
            )));
        }
        Ok(count)
    }

    fn build_occurrence(
        &self,
        item: &ScheduledItem,
        base: TimeSpan,
        frequency: Option<Frequency>,
        sequence_index: u32,
    ) -> Result<Occurrence, RecurrenceError> {
        let span = match frequency {
            Some(frequency) if sequence_index > 0 => self.shift(base, frequency, sequence_index)?,
            _ => base,
        };
        Ok(Occurrence {
            parent_id: item.persisted_id().map(ToOwned::to_owned),
            sequence_index,
            start_time: span.start,
            end_time: span.end,
        })
    }

    fn shift(
        &self,
        base: TimeSpan,
        frequency: Frequency,
        steps: u32,
    ) -> Result<TimeSpan, RecurrenceError> {
        let local = base.start.with_timezone(&self.time_zone).naive_local();
        let shifted = match frequency {
            Frequency::Daily => local.checked_add_days(Days::new(u64::from(steps))),
            Frequency::Weekly => local.checked_add_days(Days::new(7 * u64::from(steps))),
            Frequency::Monthly => local.checked_add_months(Months::new(steps)),
        }
        .ok_or_else(|| {
            RecurrenceError::InvalidRule(format!(
                "occurrence {steps} of {frequency} rule is out of the supported date range"
            ))
        })?;

        let start = self.resolve_local(shifted)?;
        Ok(TimeSpan {
            start,
            end: start + (base.end - base.start),
        })
    }

    fn resolve_local(&self, local: NaiveDateTime) -> Result<DateTime<Utc>, RecurrenceError> {
        match self.time_zone.from_local_datetime(&local) {
            LocalResult::Single(value) => Ok(value.with_timezone(&Utc)),
            LocalResult::Ambiguous(earliest, _) => Ok(earliest.with_timezone(&Utc)),
            LocalResult::None => {
                let offset = (1..=MAX_GAP_LOOKBACK_HOURS)
                    .find_map(|hours| {
                        self.time_zone
                            .from_local_datetime(&(local - Duration::hours(hours)))
                            .earliest()
                    })
                    .map(|before| before.offset().fix())
                    .ok_or_else(|| {
                        RecurrenceError::InvalidRule(format!(
                            "local time {local} cannot be resolved in {}",
                            self.time_zone
                        ))
                    })?;
                let utc = local - Duration::seconds(i64::from(offset.local_minus_utc()));
                Ok(Utc.from_utc_datetime(&utc))
            }
        }
    }
}

fn base_span(item: &ScheduledItem) -> Result<Option<TimeSpan>, RecurrenceError> {
    match item.kind {
        ItemKind::Todo => {
            if item.recurrence_rule.is_some() {
                return Err(RecurrenceError::InvalidRule(
                    "recurrence rules are only legal on events".to_string(),
                ));
            }
            Ok(None)
        }
        ItemKind::Event => {
            let span = item.span().ok_or_else(|| {
                RecurrenceError::InvalidRule("event has no start/end span".to_string())
            })?;
            span.validate().map_err(RecurrenceError::InvalidRule)?;
            Ok(Some(span))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::RecurrenceRule;
    use proptest::prelude::*;

    fn fixed_time(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn event(start: &str, end: &str) -> ScheduledItem {
        let span = TimeSpan::new(fixed_time(start), fixed_time(end)).expect("valid span");
        let mut item = ScheduledItem::new_event("user-1", "Study", span);
        item.id = Some("evt-1".to_string());
        item
    }

    fn starts(occurrences: &[Occurrence]) -> Vec<DateTime<Utc>> {
        occurrences.iter().map(|occurrence| occurrence.start_time).collect()
    }

    #[test]
    fn no_rule_yields_the_item_span() {
        let item = event("2024-01-01T10:00:00Z", "2024-01-01T11:00:00Z");
        let occurrences = RecurrenceExpander::default().expand(&item).expect("expand");

        assert_eq!(
            occurrences,
            vec![Occurrence {
                parent_id: Some("evt-1".to_string()),
                sequence_index: 0,
                start_time: fixed_time("2024-01-01T10:00:00Z"),
                end_time: fixed_time("2024-01-01T11:00:00Z"),
            }]
        );
    }

    #[test]
    fn weekly_rule_expands_four_weeks() {
        let item = event("2024-01-01T09:00:00Z", "2024-01-01T10:00:00Z")
            .with_recurrence(RecurrenceRule::new(Frequency::Weekly, 4));
        let occurrences = RecurrenceExpander::default().expand(&item).expect("expand");

        assert_eq!(
            starts(&occurrences),
            vec![
                fixed_time("2024-01-01T09:00:00Z"),
                fixed_time("2024-01-08T09:00:00Z"),
                fixed_time("2024-01-15T09:00:00Z"),
                fixed_time("2024-01-22T09:00:00Z"),
            ]
        );
        for occurrence in &occurrences {
            assert_eq!(occurrence.end_time - occurrence.start_time, Duration::hours(1));
        }
    }

    #[test]
    fn monthly_rule_clamps_to_month_end() {
        let item = event("2024-01-31T10:00:00Z", "2024-01-31T11:00:00Z")
            .with_recurrence(RecurrenceRule::new(Frequency::Monthly, 3));
        let occurrences = RecurrenceExpander::default().expand(&item).expect("expand");

        assert_eq!(
            starts(&occurrences),
            vec![
                fixed_time("2024-01-31T10:00:00Z"),
                fixed_time("2024-02-29T10:00:00Z"),
                fixed_time("2024-03-31T10:00:00Z"),
            ]
        );
    }

    #[test]
    fn daily_rule_crosses_leap_day() {
        let item = event("2024-02-28T08:00:00Z", "2024-02-28T08:30:00Z")
            .with_recurrence(RecurrenceRule::new(Frequency::Daily, 3));
        let occurrences = RecurrenceExpander::default().expand(&item).expect("expand");

        assert_eq!(
            starts(&occurrences),
            vec![
                fixed_time("2024-02-28T08:00:00Z"),
                fixed_time("2024-02-29T08:00:00Z"),
                fixed_time("2024-03-01T08:00:00Z"),
            ]
        );
    }

    #[test]
    fn daily_rule_keeps_wall_clock_across_dst_start() {
        let expander = RecurrenceExpander::new(chrono_tz::America::New_York);
        // 09:00 EST on the day before the spring-forward transition.
        let item = event("2024-03-09T14:00:00Z", "2024-03-09T15:00:00Z")
            .with_recurrence(RecurrenceRule::new(Frequency::Daily, 2));
        let occurrences = expander.expand(&item).expect("expand");

        assert_eq!(
            starts(&occurrences),
            vec![
                fixed_time("2024-03-09T14:00:00Z"),
                fixed_time("2024-03-10T13:00:00Z"),
            ]
        );
        assert_eq!(occurrences[1].end_time, fixed_time("2024-03-10T14:00:00Z"));
    }

    #[test]
    fn local_time_inside_dst_gap_moves_past_the_gap() {
        let expander = RecurrenceExpander::new(chrono_tz::America::New_York);
        // 02:30 EST; 02:30 does not exist on 2024-03-10.
        let item = event("2024-03-09T07:30:00Z", "2024-03-09T08:00:00Z")
            .with_recurrence(RecurrenceRule::new(Frequency::Daily, 3));
        let occurrences = expander.expand(&item).expect("expand");

        assert_eq!(
            starts(&occurrences),
            vec![
                fixed_time("2024-03-09T07:30:00Z"),
                fixed_time("2024-03-10T07:30:00Z"),
                fixed_time("2024-03-11T06:30:00Z"),
            ]
        );
    }

    #[test]
    fn ambiguous_local_time_resolves_to_earlier_instant() {
        let expander = RecurrenceExpander::new(chrono_tz::America::New_York);
        // 01:30 EDT; 01:30 happens twice on 2024-11-03.
        let item = event("2024-11-02T05:30:00Z", "2024-11-02T06:00:00Z")
            .with_recurrence(RecurrenceRule::new(Frequency::Daily, 2));
        let occurrences = expander.expand(&item).expect("expand");

        assert_eq!(occurrences[1].start_time, fixed_time("2024-11-03T05:30:00Z"));
    }

    #[test]
    fn todo_expands_to_nothing() {
        let todo = ScheduledItem::new_todo("user-1", "Buy milk");
        assert!(RecurrenceExpander::default().expand(&todo).expect("expand").is_empty());
    }

    #[test]
    fn malformed_rules_fail_without_partial_output() {
        let expander = RecurrenceExpander::default();
        let zero = event("2024-01-01T09:00:00Z", "2024-01-01T10:00:00Z")
            .with_recurrence(RecurrenceRule::new(Frequency::Daily, 0));
        let negative = event("2024-01-01T09:00:00Z", "2024-01-01T10:00:00Z")
            .with_recurrence(RecurrenceRule::new(Frequency::Weekly, -3));
        let todo = ScheduledItem::new_todo("user-1", "Buy milk")
            .with_recurrence(RecurrenceRule::new(Frequency::Daily, 7));

        assert!(matches!(expander.expand(&zero), Err(RecurrenceError::InvalidRule(_))));
        assert!(matches!(expander.expand(&negative), Err(RecurrenceError::InvalidRule(_))));
        assert!(matches!(expander.expand(&todo), Err(RecurrenceError::InvalidRule(_))));
    }

    #[test]
    fn expand_between_filters_to_window() {
        let item = event("2024-01-01T09:00:00Z", "2024-01-01T10:00:00Z")
            .with_recurrence(RecurrenceRule::new(Frequency::Daily, 7));
        let window = TimeSpan::new(
            fixed_time("2024-01-03T00:00:00Z"),
            fixed_time("2024-01-05T00:00:00Z"),
        )
        .expect("valid window");
        let occurrences = RecurrenceExpander::default()
            .expand_between(&item, &window)
            .expect("expand");

        let indices: Vec<u32> = occurrences.iter().map(|o| o.sequence_index).collect();
        assert_eq!(indices, vec![2, 3]);
    }

    #[test]
    fn occurrence_at_past_horizon_is_none() {
        let item = event("2024-01-01T09:00:00Z", "2024-01-01T10:00:00Z")
            .with_recurrence(RecurrenceRule::new(Frequency::Monthly, 3));
        assert!(RecurrenceExpander::default()
            .occurrence_at(&item, 3)
            .expect("lookup")
            .is_none());
    }

    #[test]
    fn horizon_above_maximum_is_rejected_before_expansion() {
        let expander = RecurrenceExpander::default();
        let huge = event("2024-01-01T09:00:00Z", "2024-01-01T10:00:00Z")
            .with_recurrence(RecurrenceRule::new(Frequency::Daily, i32::MAX));
        let window = TimeSpan::new(
            fixed_time("2024-01-01T00:00:00Z"),
            fixed_time("2024-01-02T00:00:00Z"),
        )
        .expect("valid window");

        assert!(matches!(expander.validate_rule(&huge), Err(RecurrenceError::InvalidRule(_))));
        assert!(matches!(expander.expand(&huge), Err(RecurrenceError::InvalidRule(_))));
        assert!(matches!(
            expander.expand_between(&huge, &window),
            Err(RecurrenceError::InvalidRule(_))
        ));
    }

    #[test]
    fn expand_between_jumps_to_late_window() {
        let expander = RecurrenceExpander::default().with_max_horizon(10_000);
        let item = event("2024-01-01T09:00:00Z", "2024-01-01T10:00:00Z")
            .with_recurrence(RecurrenceRule::new(Frequency::Daily, 5000));
        let window = TimeSpan::new(
            fixed_time("2026-09-27T00:00:00Z"),
            fixed_time("2026-09-27T23:59:00Z"),
        )
        .expect("valid window");

        let occurrences = expander.expand_between(&item, &window).expect("expand");

        assert_eq!(occurrences.len(), 1);
        assert_eq!(occurrences[0].sequence_index, 1000);
        assert_eq!(occurrences[0].start_time, fixed_time("2026-09-27T09:00:00Z"));
    }

    proptest! {
        #[test]
        fn expand_between_matches_filtered_expansion(
            horizon in 1i32..40,
            window_offset_days in 0i64..60,
            window_hours in 0i64..200,
        ) {
            let item = event("2024-01-31T22:00:00Z", "2024-02-01T01:00:00Z")
                .with_recurrence(RecurrenceRule::new(Frequency::Weekly, horizon));
            let start = fixed_time("2024-01-20T00:00:00Z") + Duration::days(window_offset_days);
            let window = TimeSpan::new(start, start + Duration::hours(window_hours)).expect("valid window");
            let expander = RecurrenceExpander::new(chrono_tz::Europe::Berlin);

            let expected: Vec<Occurrence> = expander
                .expand(&item)
                .expect("expand")
                .into_iter()
                .filter(|occurrence| occurrence.span().overlaps(&window))
                .collect();
            prop_assert_eq!(expander.expand_between(&item, &window).expect("window"), expected);
        }
    }

    proptest! {
        #[test]
        fn daily_rule_produces_horizon_occurrences_one_day_apart(
            horizon in 1i32..60,
            base_offset_minutes in 0i64..(60 * 24 * 365 * 10),
            duration_minutes in 0i64..600,
        ) {
            let start = fixed_time("2015-01-01T00:00:00Z") + Duration::minutes(base_offset_minutes);
            let span = TimeSpan::new(start, start + Duration::minutes(duration_minutes)).expect("valid span");
            let item = ScheduledItem::new_event("user-1", "Run", span)
                .with_recurrence(RecurrenceRule::new(Frequency::Daily, horizon));
            let expander = RecurrenceExpander::default();
            let occurrences = expander.expand(&item).expect("expand");

            prop_assert_eq!(occurrences.len(), horizon as usize);
            for pair in occurrences.windows(2) {
                prop_assert_eq!(pair[1].start_time - pair[0].start_time, Duration::days(1));
            }
            for (index, occurrence) in occurrences.iter().enumerate() {
                prop_assert_eq!(occurrence.sequence_index as usize, index);
                let recomputed = expander
                    .occurrence_at(&item, index as u32)
                    .expect("recompute")
                    .expect("within horizon");
                prop_assert_eq!(&recomputed, occurrence);
            }
        }

        #[test]
        fn expansion_is_restartable(
            frequency_index in 0usize..3,
            horizon in 1i32..24,
        ) {
            let frequency = [Frequency::Daily, Frequency::Weekly, Frequency::Monthly][frequency_index];
            let item = event("2024-01-31T22:15:00Z", "2024-02-01T00:45:00Z")
                .with_recurrence(RecurrenceRule::new(frequency, horizon));
            let expander = RecurrenceExpander::new(chrono_tz::Europe::Berlin);

            let first = expander.expand(&item).expect("first expansion");
            let second = expander.expand(&item).expect("second expansion");
            prop_assert_eq!(first, second);
        }
    }
}
