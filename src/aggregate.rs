//! Collapses duplicate skirmish fragments into one row per
//! (match, team, map, absolute skirmish, region).

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use serde::Serialize;
use tracing::debug;

use crate::skirmish::{label_or_no, yes_no, SkirmishRow};

/// Grouping key, in output sort order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SkirmishKey {
    pub match_id: String,
    pub team_name: String,
    pub map_name: String,
    pub absolute_skirmish_id: i64,
    pub region: String,
}

impl SkirmishKey {
    pub fn of(row: &SkirmishRow) -> Self {
        Self {
            match_id: row.match_id.clone(),
            team_name: row.team_name.clone(),
            map_name: row.map_name.clone(),
            absolute_skirmish_id: row.absolute_skirmish_id,
            region: row.region.clone(),
        }
    }
}

/// Output row: key columns, summed measures, then first-seen context columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AggregatedSkirmish {
    #[serde(rename = "Match ID")]
    pub match_id: String,
    #[serde(rename = "Team Name")]
    pub team_name: String,
    #[serde(rename = "Map ID")]
    pub map_name: String,
    #[serde(rename = "Skirmish ID (Absolute)")]
    pub absolute_skirmish_id: i64,
    #[serde(rename = "Match Region")]
    pub region: String,
    #[serde(rename = "Skirmish Kills")]
    pub kills: i64,
    #[serde(rename = "Skirmish Deaths")]
    pub deaths: i64,
    #[serde(rename = "Skirmish Score")]
    pub score: i64,
    #[serde(rename = "Tier")]
    pub tier: String,
    #[serde(rename = "Match Start Date")]
    pub match_start: String,
    #[serde(rename = "Skirmish Start Date")]
    pub skirmish_start: String,
    #[serde(rename = "Team Color")]
    pub team_color: String,
    #[serde(rename = "Skirmish ID (Relative)")]
    pub relative_skirmish_id: i64,
    #[serde(rename = "Skirmish Day of Week")]
    pub day_of_week: String,
    #[serde(rename = "Skirmish Day (Relative)")]
    pub relative_day: i64,
    #[serde(rename = "Skirmish Month")]
    pub month: u32,
    #[serde(rename = "Skirmish Year")]
    pub year: i32,
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

impl AggregatedSkirmish {
    pub fn key(&self) -> SkirmishKey {
        SkirmishKey {
            match_id: self.match_id.clone(),
            team_name: self.team_name.clone(),
            map_name: self.map_name.clone(),
            absolute_skirmish_id: self.absolute_skirmish_id,
            region: self.region.clone(),
        }
    }

    fn seed(row: &SkirmishRow) -> Self {
        Self {
            match_id: row.match_id.clone(),
            team_name: row.team_name.clone(),
            map_name: row.map_name.clone(),
            absolute_skirmish_id: row.absolute_skirmish_id,
            region: row.region.clone(),
            kills: row.kills,
            deaths: row.deaths,
            score: row.score,
            tier: row.tier.clone(),
            match_start: row.match_start.clone(),
            skirmish_start: row.skirmish_start.clone(),
            team_color: row.team_color.clone(),
            relative_skirmish_id: row.relative_skirmish_id,
            day_of_week: row.day_of_week.clone(),
            relative_day: row.relative_day,
            month: row.month,
            year: row.year,
            wvw_event: row.wvw_event.clone(),
            other_event: row.other_event.clone(),
            holiday: row.holiday.clone(),
            content_release: row.content_release.clone(),
            possible_api_downtime: row.possible_api_downtime,
            team_link: row.team_link.clone(),
        }
    }

    fn absorb(&mut self, row: &SkirmishRow) {
        self.kills += row.kills;
        self.deaths += row.deaths;
        self.score += row.score;
        // Team Link is the only nullable column; it takes the first present value.
        if self.team_link.is_none() {
            self.team_link = row.team_link.clone();
        }
    }
}

/// Sums kills, deaths and score per key; every other column keeps the value
/// from the first row seen for that key. Output is sorted by key.
pub fn aggregate_skirmishes(rows: &[SkirmishRow]) -> Vec<AggregatedSkirmish> {
    let mut groups: BTreeMap<SkirmishKey, AggregatedSkirmish> = BTreeMap::new();

    for row in rows {
        match groups.entry(SkirmishKey::of(row)) {
            Entry::Vacant(slot) => {
                slot.insert(AggregatedSkirmish::seed(row));
            }
            Entry::Occupied(mut slot) => slot.get_mut().absorb(row),
        }
    }

    debug!(
        component = "aggregate",
        event = "aggregate.finish",
        input_rows = rows.len(),
        output_rows = groups.len()
    );

    groups.into_values().collect()
}
