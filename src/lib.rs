//! WvW skirmish dataset builder.
//!
//! Current implemented scope:
//! - historical match download from the kills API
//! - per-skirmish bucketing with calendar context
//! - duplicate-fragment aggregation into CSV chunks

mod aggregate;
mod calendar;
mod dataset;
mod observability;
mod raw_match;
mod skirmish;
mod tables;
mod werdes_api;

pub use aggregate::{aggregate_skirmishes, AggregatedSkirmish, SkirmishKey};
pub use calendar::{
    CalendarCollection, CalendarContext, CalendarIndex, CalendarInterval, ContentRelease,
    CONTENT_RELEASE_WINDOW_DAYS,
};
pub use dataset::{
    build_csv_chunks, combine_csv_fragments, combine_match_json, write_csv_chunk, DatasetConfig,
    DatasetError, DatasetReport, RecordErrorPolicy, CHUNK_FILE_PREFIX, MERGED_CSV_FILE_NAME,
    MERGED_JSON_FILE_NAME,
};
pub use observability::{
    init_logging, log_app_start, log_paths_selected, LogFormat, LoggingConfig, LoggingInitError,
    LOG_FORMAT_ENV, LOG_LEVEL_ENV, LOG_TARGET_ENV,
};
pub use raw_match::{LinkedWorld, MatchSeries, OrderedMap, RawMatch, SourceTimestamp, Timeslot, World};
pub use skirmish::{
    build_skirmish_rows, is_possible_api_downtime, skirmish_ids, SkirmishError, SkirmishIds,
    SkirmishRow, SKIRMISHES_PER_DAY, SKIRMISH_SECONDS,
};
pub use tables::{StaticTables, TableLoadError, EVENTS_FILE_NAME, MAPS_FILE_NAME};
pub use werdes_api::{
    fetch_match_ids, match_file_name, match_list_url, match_url, sync_match_files, MatchFile,
    MatchFileSource, SyncReport, WerdesApiConfig, WerdesApiError, WERDES_API_BASE_URL,
};
