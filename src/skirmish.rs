//! Per-skirmish rows: splits a match's time series into 2-hour buckets and
//! attaches region, map, weekday and calendar context to each one.

use chrono::{Datelike, NaiveDateTime, Timelike};
use serde::{Serialize, Serializer};
use thiserror::Error;
use tracing::debug;

use crate::calendar::CalendarContext;
use crate::raw_match::RawMatch;
use crate::tables::StaticTables;

pub const SKIRMISH_SECONDS: i64 = 2 * 60 * 60;
pub const SKIRMISHES_PER_DAY: i64 = 12;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SkirmishError {
    #[error("match {match_id}: arenanet id '{value}' is not of the form <region>-<tier>")]
    MalformedArenanetId { match_id: String, value: String },
    #[error("match {match_id}: region code '{region}' has no entry in the region table")]
    UnknownRegion { match_id: String, region: String },
    #[error("match {match_id}: map id {map_id} has no entry in the borderland table")]
    UnknownMap { match_id: String, map_id: i64 },
    #[error("match {match_id}: weekday {weekday} has no entry in the weekday table")]
    UnknownWeekday { match_id: String, weekday: u32 },
    #[error("match {match_id}: series color '{color}' has no world entry")]
    MissingWorld { match_id: String, color: String },
}

/// One team's result on one map during one skirmish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkirmishRow {
    #[serde(rename = "Match ID")]
    pub match_id: String,
    #[serde(rename = "Match Region")]
    pub region: String,
    #[serde(rename = "Tier")]
    pub tier: String,
    #[serde(rename = "Match Start Date")]
    pub match_start: String,
    #[serde(rename = "Skirmish Start Date")]
    pub skirmish_start: String,
    #[serde(rename = "Team Name")]
    pub team_name: String,
    #[serde(rename = "Team Color")]
    pub team_color: String,
    #[serde(rename = "Map ID")]
    pub map_name: String,
    #[serde(rename = "Skirmish ID (Relative)")]
    pub relative_skirmish_id: i64,
    #[serde(rename = "Skirmish ID (Absolute)")]
    pub absolute_skirmish_id: i64,
    #[serde(rename = "Skirmish Day of Week")]
    pub day_of_week: String,
    #[serde(rename = "Skirmish Day (Relative)")]
    pub relative_day: i64,
    #[serde(rename = "Skirmish Month")]
    pub month: u32,
    #[serde(rename = "Skirmish Year")]
    pub year: i32,
    #[serde(rename = "Skirmish Kills")]
    pub kills: i64,
    #[serde(rename = "Skirmish Deaths")]
    pub deaths: i64,
    #[serde(rename = "Skirmish Score")]
    pub score: i64,
    #[serde(rename = "WvW Event Running", serialize_with = "label_or_no")]
    pub wvw_event: Option<String>,
    #[serde(rename = "PvE Event Running", serialize_with = "label_or_no")]
    pub other_event: Option<String>,
    #[serde(rename = "Holiday Running", serialize_with = "label_or_no")]
    pub holiday: Option<String>,
    #[serde(rename = "Recent Content Release", serialize_with = "label_or_no")]
    pub content_release: Option<String>,
    #[serde(rename = "Possible API Downtime", serialize_with = "yes_no")]
    pub possible_api_downtime: bool,
    #[serde(rename = "Team Link")]
    pub team_link: Option<String>,
}

impl SkirmishRow {
    pub fn calendar_context(&self) -> CalendarContext {
        CalendarContext {
            wvw_event: self.wvw_event.clone(),
            other_event: self.other_event.clone(),
            holiday: self.holiday.clone(),
            content_release: self.content_release.clone(),
        }
    }
}

/// Bucket position of a skirmish relative to the match start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SkirmishIds {
    /// 1..=12 within the recurring day cycle anchored to the match start hour.
    pub relative: i64,
    /// 1-based 2-hour index from match start.
    pub absolute: i64,
    pub relative_day: i64,
}

pub fn skirmish_ids(match_start: NaiveDateTime, skirmish_start: NaiveDateTime) -> SkirmishIds {
    let shift_hour = (i64::from(skirmish_start.hour()) - i64::from(match_start.hour())).rem_euclid(24);
    let relative = shift_hour / 2 + 1;

    let elapsed = skirmish_start - match_start;
    // Floors toward negative infinity at microsecond precision.
    let absolute_zero_based = match elapsed.num_microseconds() {
        Some(micros) => micros.div_euclid(SKIRMISH_SECONDS * 1_000_000),
        None => elapsed.num_seconds().div_euclid(SKIRMISH_SECONDS),
    };

    SkirmishIds {
        relative,
        absolute: absolute_zero_based + 1,
        relative_day: absolute_zero_based.div_euclid(SKIRMISHES_PER_DAY) + 1,
    }
}

/// True when a skirmish recorded neither kills nor deaths, which usually means
/// the upstream collector missed it.
pub fn is_possible_api_downtime(kills: i64, deaths: i64) -> bool {
    kills == 0 && deaths == 0
}

/// Expands one match into skirmish rows, in series order then timeslot order.
///
/// Any table miss fails the whole match; no partial rows are returned.
pub fn build_skirmish_rows(
    record: &RawMatch,
    tables: &StaticTables,
) -> Result<Vec<SkirmishRow>, SkirmishError> {
    let (region_code, tier) = split_arenanet_id(record)?;
    let region = tables
        .region_names
        .get(region_code)
        .ok_or_else(|| SkirmishError::UnknownRegion {
            match_id: record.match_id.clone(),
            region: region_code.to_string(),
        })?;
    let match_start = record.match_start.value();

    let mut rows = Vec::with_capacity(record.timeslot_count());
    for (_, series) in record.series.iter() {
        let world = record
            .worlds
            .get(&series.color)
            .ok_or_else(|| SkirmishError::MissingWorld {
                match_id: record.match_id.clone(),
                color: series.color.clone(),
            })?;
        let map_name = tables
            .borderland_names
            .get(&series.map_id)
            .ok_or_else(|| SkirmishError::UnknownMap {
                match_id: record.match_id.clone(),
                map_id: series.map_id,
            })?;
        let team_link = world.first_link().map(|link| link.name.clone());

        for timeslot in &series.series_items {
            let start = timeslot.timeslot_start.value();
            let ids = skirmish_ids(match_start, start);
            let weekday = start.weekday().num_days_from_monday();
            let day_of_week =
                tables
                    .weekday_names
                    .get(&weekday)
                    .ok_or_else(|| SkirmishError::UnknownWeekday {
                        match_id: record.match_id.clone(),
                        weekday,
                    })?;
            let context = tables.calendar.context_at(start);

            rows.push(SkirmishRow {
                match_id: record.match_id.clone(),
                region: region.clone(),
                tier: tier.to_string(),
                match_start: record.match_start.as_str().to_string(),
                skirmish_start: timeslot.timeslot_start.as_str().to_string(),
                team_name: world.name.clone(),
                team_color: series.color.clone(),
                map_name: map_name.clone(),
                relative_skirmish_id: ids.relative,
                absolute_skirmish_id: ids.absolute,
                day_of_week: day_of_week.clone(),
                relative_day: ids.relative_day,
                month: start.month(),
                year: start.year(),
                kills: timeslot.kills,
                deaths: timeslot.deaths,
                score: timeslot.score_gain,
                wvw_event: context.wvw_event,
                other_event: context.other_event,
                holiday: context.holiday,
                content_release: context.content_release,
                possible_api_downtime: is_possible_api_downtime(timeslot.kills, timeslot.deaths),
                team_link: team_link.clone(),
            });
        }
    }

    debug!(
        component = "skirmish",
        event = "skirmish.match.built",
        match_id = %record.match_id,
        series = record.series.len(),
        rows = rows.len()
    );

    Ok(rows)
}

fn split_arenanet_id(record: &RawMatch) -> Result<(&str, &str), SkirmishError> {
    let mut parts = record.match_arenanet_id.split('-');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(region), Some(tier), None) => Ok((region, tier)),
        _ => Err(SkirmishError::MalformedArenanetId {
            match_id: record.match_id.clone(),
            value: record.match_arenanet_id.clone(),
        }),
    }
}

pub(crate) fn label_or_no<S: Serializer>(
    label: &Option<String>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(label.as_deref().unwrap_or("No"))
}

pub(crate) fn yes_no<S: Serializer>(flag: &bool, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(if *flag { "Yes" } else { "No" })
}
