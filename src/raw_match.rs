//! Typed view of one match payload from the kills API ("flattened/unaltered").

use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::de::{self, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use serde_aux::field_attributes::{
    deserialize_number_from_string, deserialize_string_from_number,
};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RawMatch {
    #[serde(deserialize_with = "deserialize_string_from_number")]
    pub match_id: String,
    /// `"<region>-<tier>"`, e.g. `"1-3"`.
    pub match_arenanet_id: String,
    pub match_start: SourceTimestamp,
    /// Keyed by team color.
    pub worlds: HashMap<String, World>,
    pub series: OrderedMap<MatchSeries>,
}

impl RawMatch {
    pub fn timeslot_count(&self) -> usize {
        self.series
            .values()
            .map(|series| series.series_items.len())
            .sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct World {
    pub name: String,
    #[serde(default)]
    pub additional_worlds: OrderedMap<LinkedWorld>,
}

impl World {
    /// First linked world in the payload's own order.
    pub fn first_link(&self) -> Option<&LinkedWorld> {
        self.additional_worlds.values().next()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LinkedWorld {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MatchSeries {
    pub color: String,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub map_id: i64,
    pub series_items: Vec<Timeslot>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Timeslot {
    pub timeslot_start: SourceTimestamp,
    pub kills: i64,
    pub deaths: i64,
    pub score_gain: i64,
}

/// A timestamp as written by the API, kept alongside its parsed wall-clock value.
///
/// Offsets, when present, are dropped rather than converted: the wall-clock
/// reading is what the bucketing works from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceTimestamp {
    raw: String,
    value: NaiveDateTime,
}

impl SourceTimestamp {
    pub fn parse(raw: &str) -> Option<Self> {
        parse_wall_clock(raw.trim()).map(|value| Self {
            raw: raw.to_string(),
            value,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn value(&self) -> NaiveDateTime {
        self.value
    }
}

impl fmt::Display for SourceTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl Serialize for SourceTimestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for SourceTimestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw)
            .ok_or_else(|| de::Error::custom(format!("invalid ISO-8601 timestamp '{raw}'")))
    }
}

fn parse_wall_clock(raw: &str) -> Option<NaiveDateTime> {
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(value) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(value);
        }
    }
    if let Ok(value) = DateTime::parse_from_rfc3339(raw) {
        return Some(value.naive_local());
    }
    if let Ok(value) = DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f%:z") {
        return Some(value.naive_local());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}

/// A JSON object decoded with its key order intact.
///
/// `null`, a missing field and an empty array all decode to an empty map; a
/// non-empty array is accepted with positional keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderedMap<V> {
    entries: Vec<(String, V)>,
}

impl<V> Default for OrderedMap<V> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<V> OrderedMap<V> {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.entries.iter().map(|(key, value)| (key.as_str(), value))
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.entries.iter().map(|(_, value)| value)
    }
}

struct OrderedMapVisitor<V>(PhantomData<V>);

impl<'de, V: Deserialize<'de>> Visitor<'de> for OrderedMapVisitor<V> {
    type Value = OrderedMap<V>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a JSON object, array or null")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
        while let Some((key, value)) = access.next_entry::<String, V>()? {
            entries.push((key, value));
        }
        Ok(OrderedMap { entries })
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
        while let Some(value) = access.next_element::<V>()? {
            entries.push((entries.len().to_string(), value));
        }
        Ok(OrderedMap { entries })
    }

    fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(OrderedMap::default())
    }

    fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(OrderedMap::default())
    }
}

impl<'de, V: Deserialize<'de>> Deserialize<'de> for OrderedMap<V> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(OrderedMapVisitor(PhantomData))
    }
}
