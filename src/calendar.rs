//! Point-in-time lookups against the static event, holiday and release calendars.

use chrono::{Duration as ChronoDuration, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Trailing window after a content release during which it counts as "recent".
pub const CONTENT_RELEASE_WINDOW_DAYS: i64 = 14;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CalendarCollection {
    WvwEvents,
    OtherEvents,
    Holidays,
    ContentReleases,
}

impl CalendarCollection {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::WvwEvents => "wvw_events",
            Self::OtherEvents => "other_events",
            Self::Holidays => "holidays",
            Self::ContentReleases => "content_releases",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarInterval {
    pub label: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl CalendarInterval {
    /// Inclusive on both ends. A reversed interval contains nothing.
    pub fn contains(&self, instant: NaiveDateTime) -> bool {
        self.start <= instant && instant <= self.end
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentRelease {
    pub label: String,
    pub anchor: NaiveDateTime,
}

impl ContentRelease {
    pub fn applies_at(&self, instant: NaiveDateTime) -> bool {
        let since = instant - self.anchor;
        since >= ChronoDuration::zero() && since <= ChronoDuration::days(CONTENT_RELEASE_WINDOW_DAYS)
    }
}

/// Labels attached to one skirmish. `None` means no context applied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarContext {
    pub wvw_event: Option<String>,
    pub other_event: Option<String>,
    pub holiday: Option<String>,
    pub content_release: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarIndex {
    wvw_events: Vec<CalendarInterval>,
    other_events: Vec<CalendarInterval>,
    holidays: Vec<CalendarInterval>,
    content_releases: Vec<ContentRelease>,
}

impl CalendarIndex {
    pub fn new(
        wvw_events: Vec<CalendarInterval>,
        other_events: Vec<CalendarInterval>,
        holidays: Vec<CalendarInterval>,
        content_releases: Vec<ContentRelease>,
    ) -> Self {
        Self {
            wvw_events,
            other_events,
            holidays,
            content_releases,
        }
    }

    /// Returns the label of the first entry, in source order, that applies at `instant`.
    pub fn lookup(&self, instant: NaiveDateTime, collection: CalendarCollection) -> Option<&str> {
        match collection {
            CalendarCollection::WvwEvents => first_interval(&self.wvw_events, instant),
            CalendarCollection::OtherEvents => first_interval(&self.other_events, instant),
            CalendarCollection::Holidays => first_interval(&self.holidays, instant),
            CalendarCollection::ContentReleases => self
                .content_releases
                .iter()
                .find(|release| release.applies_at(instant))
                .map(|release| release.label.as_str()),
        }
    }

    pub fn context_at(&self, instant: NaiveDateTime) -> CalendarContext {
        let owned = |collection| self.lookup(instant, collection).map(str::to_string);
        CalendarContext {
            wvw_event: owned(CalendarCollection::WvwEvents),
            other_event: owned(CalendarCollection::OtherEvents),
            holiday: owned(CalendarCollection::Holidays),
            content_release: owned(CalendarCollection::ContentReleases),
        }
    }

    pub fn len(&self, collection: CalendarCollection) -> usize {
        match collection {
            CalendarCollection::WvwEvents => self.wvw_events.len(),
            CalendarCollection::OtherEvents => self.other_events.len(),
            CalendarCollection::Holidays => self.holidays.len(),
            CalendarCollection::ContentReleases => self.content_releases.len(),
        }
    }
}

fn first_interval(intervals: &[CalendarInterval], instant: NaiveDateTime) -> Option<&str> {
    intervals
        .iter()
        .find(|interval| interval.contains(instant))
        .map(|interval| interval.label.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(year: i32, month: u32, day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(year, month, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn interval(label: &str, start: NaiveDateTime, end: NaiveDateTime) -> CalendarInterval {
        CalendarInterval {
            label: label.to_string(),
            start,
            end,
        }
    }

    fn sample_index() -> CalendarIndex {
        CalendarIndex::new(
            vec![
                interval("Bonus A", at(2021, 3, 1, 0), at(2021, 3, 8, 0)),
                interval("Bonus B", at(2021, 3, 5, 0), at(2021, 3, 12, 0)),
                interval(
                    "World vs. World Weeklong Bonus",
                    at(2021, 5, 14, 0),
                    at(2021, 4, 21, 0),
                ),
            ],
            Vec::new(),
            vec![interval("Festival", at(2021, 10, 19, 0), at(2021, 11, 2, 0))],
            vec![ContentRelease {
                label: "Expansion".to_string(),
                anchor: at(2022, 2, 28, 0),
            }],
        )
    }

    #[test]
    fn overlapping_intervals_resolve_to_first_in_source_order() {
        let index = sample_index();
        assert_eq!(
            index.lookup(at(2021, 3, 6, 12), CalendarCollection::WvwEvents),
            Some("Bonus A")
        );
        assert_eq!(
            index.lookup(at(2021, 3, 10, 12), CalendarCollection::WvwEvents),
            Some("Bonus B")
        );
    }

    #[test]
    fn interval_bounds_are_inclusive() {
        let index = sample_index();
        assert_eq!(
            index.lookup(at(2021, 10, 19, 0), CalendarCollection::Holidays),
            Some("Festival")
        );
        assert_eq!(
            index.lookup(at(2021, 11, 2, 0), CalendarCollection::Holidays),
            Some("Festival")
        );
        assert_eq!(
            index.lookup(at(2021, 11, 2, 1), CalendarCollection::Holidays),
            None
        );
    }

    #[test]
    fn reversed_interval_matches_nothing() {
        let index = sample_index();
        for instant in [at(2021, 4, 21, 0), at(2021, 5, 1, 0), at(2021, 5, 14, 0)] {
            assert_eq!(index.lookup(instant, CalendarCollection::WvwEvents), None);
        }
    }

    #[test]
    fn content_release_window_spans_fourteen_days_after_anchor() {
        let index = sample_index();
        assert_eq!(
            index.lookup(at(2022, 2, 27, 23), CalendarCollection::ContentReleases),
            None
        );
        assert_eq!(
            index.lookup(at(2022, 2, 28, 0), CalendarCollection::ContentReleases),
            Some("Expansion")
        );
        assert_eq!(
            index.lookup(at(2022, 3, 14, 0), CalendarCollection::ContentReleases),
            Some("Expansion")
        );
        assert_eq!(
            index.lookup(at(2022, 3, 14, 1), CalendarCollection::ContentReleases),
            None
        );
    }

    #[test]
    fn lookups_are_repeatable() {
        let index = sample_index();
        let instant = at(2021, 3, 6, 12);
        let first = index.context_at(instant);
        for _ in 0..3 {
            assert_eq!(index.context_at(instant), first);
        }
        assert_eq!(first.wvw_event.as_deref(), Some("Bonus A"));
        assert_eq!(first.other_event, None);
    }
}
