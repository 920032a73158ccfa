//! Static lookup tables loaded once at startup.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveDateTime};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::calendar::{CalendarCollection, CalendarIndex, CalendarInterval, ContentRelease};

pub const MAPS_FILE_NAME: &str = "maps.json";
pub const EVENTS_FILE_NAME: &str = "events.json";

const TABLE_DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Error)]
pub enum TableLoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("table {table} has non-integer key '{key}'")]
    InvalidKey { table: &'static str, key: String },
    #[error("{collection} entry '{label}' has invalid date '{value}'")]
    InvalidDate {
        collection: &'static str,
        label: String,
        value: String,
    },
}

/// Region, borderland, weekday and calendar tables used by the transform.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticTables {
    pub region_names: HashMap<String, String>,
    pub borderland_names: HashMap<i64, String>,
    /// Keyed by days from Monday (0 = Monday).
    pub weekday_names: HashMap<u32, String>,
    pub calendar: CalendarIndex,
}

#[derive(Debug, Deserialize)]
struct MapsFile {
    region_map: BTreeMap<String, String>,
    borderland_map: BTreeMap<String, String>,
    weekday_map: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct EventsFile {
    wvw_events: Vec<(String, String, String)>,
    other_events: Vec<(String, String, String)>,
    holidays: Vec<(String, String, String)>,
    content_releases: Vec<(String, String)>,
}

impl StaticTables {
    pub fn new(
        region_names: HashMap<String, String>,
        borderland_names: HashMap<i64, String>,
        weekday_names: HashMap<u32, String>,
        calendar: CalendarIndex,
    ) -> Self {
        Self {
            region_names,
            borderland_names,
            weekday_names,
            calendar,
        }
    }

    /// Reads `maps.json` and `events.json` from `dir`.
    pub fn load_dir(dir: &Path) -> Result<Self, TableLoadError> {
        debug!(
            component = "tables",
            event = "tables.load.start",
            dir = %dir.display()
        );

        let maps_path = dir.join(MAPS_FILE_NAME);
        let maps: MapsFile = read_json(&maps_path)?;
        let events_path = dir.join(EVENTS_FILE_NAME);
        let events: EventsFile = read_json(&events_path)?;

        let region_names: HashMap<String, String> = maps.region_map.into_iter().collect();
        let borderland_names: HashMap<i64, String> =
            int_keyed("borderland_map", maps.borderland_map)?;
        let weekday_names: HashMap<u32, String> = int_keyed("weekday_map", maps.weekday_map)?;

        let calendar = CalendarIndex::new(
            intervals(CalendarCollection::WvwEvents, events.wvw_events)?,
            intervals(CalendarCollection::OtherEvents, events.other_events)?,
            intervals(CalendarCollection::Holidays, events.holidays)?,
            releases(events.content_releases)?,
        );

        let tables = Self::new(region_names, borderland_names, weekday_names, calendar);
        info!(
            component = "tables",
            event = "tables.load.finish",
            dir = %dir.display(),
            regions = tables.region_names.len(),
            borderlands = tables.borderland_names.len(),
            wvw_events = tables.calendar.len(CalendarCollection::WvwEvents),
            other_events = tables.calendar.len(CalendarCollection::OtherEvents),
            holidays = tables.calendar.len(CalendarCollection::Holidays),
            content_releases = tables.calendar.len(CalendarCollection::ContentReleases)
        );
        Ok(tables)
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, TableLoadError> {
    let raw = fs::read_to_string(path).map_err(|source| TableLoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| TableLoadError::Json {
        path: path.to_path_buf(),
        source,
    })
}

fn int_keyed<K: std::str::FromStr + std::hash::Hash + Eq>(
    table: &'static str,
    raw: BTreeMap<String, String>,
) -> Result<HashMap<K, String>, TableLoadError> {
    raw.into_iter()
        .map(|(key, value)| {
            key.trim()
                .parse::<K>()
                .map(|parsed| (parsed, value))
                .map_err(|_| TableLoadError::InvalidKey { table, key })
        })
        .collect()
}

fn intervals(
    collection: CalendarCollection,
    raw: Vec<(String, String, String)>,
) -> Result<Vec<CalendarInterval>, TableLoadError> {
    raw.into_iter()
        .map(|(label, start, end)| {
            let start = parse_table_date(collection, &label, &start)?;
            let end = parse_table_date(collection, &label, &end)?;
            Ok(CalendarInterval { label, start, end })
        })
        .collect()
}

fn releases(raw: Vec<(String, String)>) -> Result<Vec<ContentRelease>, TableLoadError> {
    raw.into_iter()
        .map(|(label, anchor)| {
            let anchor = parse_table_date(CalendarCollection::ContentReleases, &label, &anchor)?;
            Ok(ContentRelease { label, anchor })
        })
        .collect()
}

fn parse_table_date(
    collection: CalendarCollection,
    label: &str,
    value: &str,
) -> Result<NaiveDateTime, TableLoadError> {
    NaiveDate::parse_from_str(value.trim(), TABLE_DATE_FORMAT)
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .ok_or_else(|| TableLoadError::InvalidDate {
            collection: collection.as_str(),
            label: label.to_string(),
            value: value.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const MAPS: &str = r#"{
        "region_map": {"1": "North America", "2": "Europe"},
        "borderland_map": {"38": "Eternal Battlegrounds", "1099": "Red Desert Borderlands"},
        "weekday_map": {"0": "Monday", "6": "Sunday"}
    }"#;

    const EVENTS: &str = r#"{
        "wvw_events": [
            ["World vs. World Weeklong Bonus", "2021-05-14", "2021-04-21"],
            ["Call of the Mists", "2021-06-01", "2021-06-08"]
        ],
        "other_events": [],
        "holidays": [["Halloween", "2021-10-19", "2021-11-02"]],
        "content_releases": [["End of Dragons", "2022-02-28"]]
    }"#;

    fn write_tables(maps: &str, events: &str) -> tempfile::TempDir {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(MAPS_FILE_NAME), maps).unwrap();
        fs::write(dir.path().join(EVENTS_FILE_NAME), events).unwrap();
        dir
    }

    #[test]
    fn loads_tables_and_keeps_reversed_intervals_verbatim() {
        let dir = write_tables(MAPS, EVENTS);
        let tables = StaticTables::load_dir(dir.path()).unwrap();

        assert_eq!(tables.region_names["2"], "Europe");
        assert_eq!(tables.borderland_names[&38], "Eternal Battlegrounds");
        assert_eq!(tables.weekday_names[&6], "Sunday");
        assert_eq!(tables.calendar.len(CalendarCollection::WvwEvents), 2);

        let inside_reversed = NaiveDate::from_ymd_opt(2021, 5, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        assert_eq!(
            tables
                .calendar
                .lookup(inside_reversed, CalendarCollection::WvwEvents),
            None
        );
    }

    #[test]
    fn non_integer_borderland_key_is_rejected() {
        let maps = MAPS.replace("\"1099\"", "\"red\"");
        let dir = write_tables(&maps, EVENTS);
        let err = StaticTables::load_dir(dir.path()).unwrap_err();
        assert!(matches!(
            err,
            TableLoadError::InvalidKey {
                table: "borderland_map",
                ..
            }
        ));
    }

    #[test]
    fn bad_event_date_is_rejected() {
        let events = EVENTS.replace("2022-02-28", "Feb 28");
        let dir = write_tables(MAPS, &events);
        let err = StaticTables::load_dir(dir.path()).unwrap_err();
        assert!(matches!(err, TableLoadError::InvalidDate { .. }));
    }

    #[test]
    fn missing_file_reports_path() {
        let dir = tempdir().unwrap();
        let err = StaticTables::load_dir(dir.path()).unwrap_err();
        match err {
            TableLoadError::Io { path, .. } => assert!(path.ends_with(MAPS_FILE_NAME)),
            other => panic!("unexpected error: {other}"),
        }
    }
}
