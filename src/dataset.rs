//! On-disk dataset assembly: merged JSON, aggregated CSV chunks and the final
//! concatenated CSV.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::aggregate::{aggregate_skirmishes, AggregatedSkirmish};
use crate::raw_match::RawMatch;
use crate::skirmish::{build_skirmish_rows, SkirmishError, SkirmishRow};
use crate::tables::StaticTables;

pub const CHUNK_FILE_PREFIX: &str = "aggregated_match_chunk_";
pub const MERGED_JSON_FILE_NAME: &str = "all_combined_matches.json";
pub const MERGED_CSV_FILE_NAME: &str = "all_combined_matches.csv";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordErrorPolicy {
    Strict,
    ReportAndSkip,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetConfig {
    pub data_root: PathBuf,
    /// Matches per aggregated CSV chunk.
    pub chunk_size: usize,
    pub record_error_policy: RecordErrorPolicy,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            data_root: PathBuf::from("."),
            chunk_size: 200,
            record_error_policy: RecordErrorPolicy::Strict,
        }
    }
}

impl DatasetConfig {
    pub fn json_dir(&self) -> PathBuf {
        self.data_root.join("wvw_per_match_json_files")
    }

    pub fn csv_dir(&self) -> PathBuf {
        self.data_root.join("wvw_per_match_csv_files")
    }

    pub fn merged_dir(&self) -> PathBuf {
        self.data_root.join("merged")
    }

    pub fn merged_json_path(&self) -> PathBuf {
        self.merged_dir().join(MERGED_JSON_FILE_NAME)
    }

    pub fn merged_csv_path(&self) -> PathBuf {
        self.merged_dir().join(MERGED_CSV_FILE_NAME)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetReport {
    pub files_seen: u64,
    pub matches_transformed: u64,
    /// Unreadable or non-JSON files.
    pub files_skipped: u64,
    /// Decoded files rejected by schema or table lookups.
    pub matches_rejected: u64,
    pub skirmish_rows: u64,
    pub aggregated_rows: u64,
    pub chunks: Vec<PathBuf>,
    pub first_error: Option<String>,
}

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("invalid dataset config: {0}")]
    InvalidConfig(String),
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("JSON error at {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("match file {path} violates the match schema: {source}")]
    Schema {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("match file {path} could not be transformed: {source}")]
    Transform {
        path: PathBuf,
        #[source]
        source: SkirmishError,
    },
    #[error("CSV fragment {path} has header {found:?}, expected {expected:?}")]
    HeaderMismatch {
        path: PathBuf,
        expected: Vec<String>,
        found: Vec<String>,
    },
    #[error("no CSV fragments found in {0}")]
    NoFragments(PathBuf),
}

/// Merges every per-match JSON file into one JSON array. Skipped when the
/// output already exists. Returns the number of merged matches, if any.
pub fn combine_match_json(input_dir: &Path, output_file: &Path) -> Result<Option<usize>, DatasetError> {
    if output_file.exists() {
        info!(
            component = "dataset",
            event = "dataset.merge_json.skipped",
            path = %output_file.display(),
            reason = "exists"
        );
        return Ok(None);
    }

    let files = list_files(input_dir, "json")?;
    let mut merged = Vec::with_capacity(files.len());
    for (n, path) in files.iter().enumerate() {
        info!(
            component = "dataset",
            event = "dataset.merge_json.file",
            position = n + 1,
            total = files.len(),
            path = %path.display()
        );
        match read_json_value(path) {
            Ok(value) => merged.push(value),
            Err(err) => warn!(
                component = "dataset",
                event = "dataset.merge_json.file_skipped",
                path = %path.display(),
                error = %err
            ),
        }
    }

    create_parent(output_file)?;
    let file = fs::File::create(output_file).map_err(|source| DatasetError::Io {
        path: output_file.to_path_buf(),
        source,
    })?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, &merged).map_err(|source| DatasetError::Json {
        path: output_file.to_path_buf(),
        source,
    })?;
    writer.flush().map_err(|source| DatasetError::Io {
        path: output_file.to_path_buf(),
        source,
    })?;

    info!(
        component = "dataset",
        event = "dataset.merge_json.finish",
        path = %output_file.display(),
        matches = merged.len()
    );
    Ok(Some(merged.len()))
}

/// Transforms every match file under `input_dir` and writes one aggregated CSV
/// per `chunk_size` matches, plus a final chunk for the remainder.
pub fn build_csv_chunks(
    input_dir: &Path,
    output_dir: &Path,
    tables: &StaticTables,
    cfg: &DatasetConfig,
) -> Result<DatasetReport, DatasetError> {
    if cfg.chunk_size == 0 {
        return Err(DatasetError::InvalidConfig(
            "chunk_size must be > 0".to_string(),
        ));
    }
    fs::create_dir_all(output_dir).map_err(|source| DatasetError::Io {
        path: output_dir.to_path_buf(),
        source,
    })?;

    let files = list_files(input_dir, "json")?;
    info!(
        component = "dataset",
        event = "dataset.build_csv.start",
        input_dir = %input_dir.display(),
        output_dir = %output_dir.display(),
        files = files.len(),
        chunk_size = cfg.chunk_size,
        policy = ?cfg.record_error_policy
    );

    let mut report = DatasetReport::default();
    let mut batch: Vec<SkirmishRow> = Vec::new();

    for (i, path) in files.iter().enumerate() {
        report.files_seen += 1;
        match transform_match_file(path, tables) {
            Ok(Some(rows)) => {
                debug!(
                    component = "dataset",
                    event = "dataset.build_csv.match",
                    position = i,
                    path = %path.display(),
                    rows = rows.len()
                );
                report.matches_transformed += 1;
                report.skirmish_rows += rows.len() as u64;
                batch.extend(rows);
            }
            Ok(None) => report.files_skipped += 1,
            Err(err) => handle_record_error(err, cfg, &mut report)?,
        }

        let processed = i + 1;
        if processed % cfg.chunk_size == 0 {
            let chunk_path = output_dir.join(format!("{CHUNK_FILE_PREFIX}{processed}.csv"));
            flush_chunk(&chunk_path, &mut batch, &mut report)?;
        }
    }

    if !batch.is_empty() {
        let chunk_path = output_dir.join(format!("{CHUNK_FILE_PREFIX}final.csv"));
        flush_chunk(&chunk_path, &mut batch, &mut report)?;
    }

    info!(
        component = "dataset",
        event = "dataset.build_csv.finish",
        files_seen = report.files_seen,
        matches_transformed = report.matches_transformed,
        files_skipped = report.files_skipped,
        matches_rejected = report.matches_rejected,
        skirmish_rows = report.skirmish_rows,
        aggregated_rows = report.aggregated_rows,
        chunks = report.chunks.len()
    );

    Ok(report)
}

/// Concatenates every CSV fragment in `input_dir` under a single header.
/// Returns the number of data rows written.
pub fn combine_csv_fragments(input_dir: &Path, output_file: &Path) -> Result<u64, DatasetError> {
    let fragments: Vec<PathBuf> = list_files(input_dir, "csv")?
        .into_iter()
        .filter(|path| path != output_file)
        .collect();

    let mut header: Option<csv::StringRecord> = None;
    let mut records = Vec::new();
    for path in &fragments {
        let mut reader = csv::Reader::from_path(path)?;
        let found = reader.headers()?.clone();
        if found.is_empty() {
            debug!(
                component = "dataset",
                event = "dataset.combine_csv.empty_fragment",
                path = %path.display()
            );
            continue;
        }
        match &header {
            Some(expected) if !expected.iter().eq(found.iter()) => {
                return Err(DatasetError::HeaderMismatch {
                    path: path.clone(),
                    expected: expected.iter().map(str::to_string).collect(),
                    found: found.iter().map(str::to_string).collect(),
                });
            }
            Some(_) => {}
            None => header = Some(found),
        }
        for record in reader.records() {
            records.push(record?);
        }
    }

    let header = header.ok_or_else(|| DatasetError::NoFragments(input_dir.to_path_buf()))?;
    create_parent(output_file)?;
    let mut writer = csv::Writer::from_path(output_file)?;
    writer.write_record(&header)?;
    for record in &records {
        writer.write_record(record)?;
    }
    writer.flush().map_err(|source| DatasetError::Io {
        path: output_file.to_path_buf(),
        source,
    })?;

    info!(
        component = "dataset",
        event = "dataset.combine_csv.finish",
        fragments = fragments.len(),
        rows = records.len(),
        path = %output_file.display()
    );
    Ok(records.len() as u64)
}

pub fn write_csv_chunk(path: &Path, rows: &[AggregatedSkirmish]) -> Result<(), DatasetError> {
    create_parent(path)?;
    let mut writer = csv::Writer::from_path(path)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush().map_err(|source| DatasetError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

/// `Ok(None)` when the file is unreadable or not JSON; those are skipped.
fn transform_match_file(
    path: &Path,
    tables: &StaticTables,
) -> Result<Option<Vec<SkirmishRow>>, DatasetError> {
    let value = match read_json_value(path) {
        Ok(value) => value,
        Err(err) => {
            warn!(
                component = "dataset",
                event = "dataset.build_csv.file_skipped",
                path = %path.display(),
                error = %err
            );
            return Ok(None);
        }
    };

    let record: RawMatch =
        serde_json::from_value(value).map_err(|source| DatasetError::Schema {
            path: path.to_path_buf(),
            source,
        })?;
    build_skirmish_rows(&record, tables)
        .map(Some)
        .map_err(|source| DatasetError::Transform {
            path: path.to_path_buf(),
            source,
        })
}

fn handle_record_error(
    err: DatasetError,
    cfg: &DatasetConfig,
    report: &mut DatasetReport,
) -> Result<(), DatasetError> {
    match cfg.record_error_policy {
        RecordErrorPolicy::Strict => Err(err),
        RecordErrorPolicy::ReportAndSkip => {
            warn!(
                component = "dataset",
                event = "dataset.build_csv.match_rejected",
                error = %err
            );
            report.matches_rejected += 1;
            if report.first_error.is_none() {
                report.first_error = Some(err.to_string());
            }
            Ok(())
        }
    }
}

fn flush_chunk(
    path: &Path,
    batch: &mut Vec<SkirmishRow>,
    report: &mut DatasetReport,
) -> Result<(), DatasetError> {
    if batch.is_empty() {
        debug!(
            component = "dataset",
            event = "dataset.build_csv.chunk_empty",
            path = %path.display()
        );
        return Ok(());
    }

    let aggregated = aggregate_skirmishes(batch);
    write_csv_chunk(path, &aggregated)?;
    info!(
        component = "dataset",
        event = "dataset.build_csv.chunk_written",
        path = %path.display(),
        skirmish_rows = batch.len(),
        aggregated_rows = aggregated.len()
    );
    report.aggregated_rows += aggregated.len() as u64;
    report.chunks.push(path.to_path_buf());
    batch.clear();
    Ok(())
}

fn read_json_value(path: &Path) -> Result<serde_json::Value, DatasetError> {
    let bytes = fs::read(path).map_err(|source| DatasetError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_slice(&bytes).map_err(|source| DatasetError::Json {
        path: path.to_path_buf(),
        source,
    })
}

fn list_files(dir: &Path, extension: &str) -> Result<Vec<PathBuf>, DatasetError> {
    let entries = fs::read_dir(dir).map_err(|source| DatasetError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry
            .map_err(|source| DatasetError::Io {
                path: dir.to_path_buf(),
                source,
            })?
            .path();
        let matches = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case(extension))
            .unwrap_or(false);
        if matches && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn create_parent(path: &Path) -> Result<(), DatasetError> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| DatasetError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn merge_json_skips_undecodable_files_and_existing_output() {
        let temp = tempdir().unwrap();
        let input = temp.path().join("in");
        fs::create_dir_all(&input).unwrap();
        fs::write(input.join("a.json"), br#"{"match_id": "a"}"#).unwrap();
        fs::write(input.join("b.json"), b"{broken").unwrap();
        fs::write(input.join("c.json"), br#"{"match_id": "c"}"#).unwrap();
        fs::write(input.join("notes.txt"), b"ignored").unwrap();

        let output = temp.path().join("merged").join(MERGED_JSON_FILE_NAME);
        assert_eq!(combine_match_json(&input, &output).unwrap(), Some(2));

        let merged: Vec<serde_json::Value> =
            serde_json::from_slice(&fs::read(&output).unwrap()).unwrap();
        assert_eq!(merged[0]["match_id"], "a");
        assert_eq!(merged[1]["match_id"], "c");

        assert_eq!(combine_match_json(&input, &output).unwrap(), None);
    }

    #[test]
    fn csv_fragments_share_one_header() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("a.csv"), "x,y\n1,2\n").unwrap();
        fs::write(temp.path().join("b.csv"), "x,y\n3,4\n5,6\n").unwrap();
        fs::write(temp.path().join("empty.csv"), "").unwrap();

        let output = temp.path().join("out").join("all.csv");
        let rows = combine_csv_fragments(temp.path(), &output).unwrap();
        assert_eq!(rows, 3);
        assert_eq!(fs::read_to_string(&output).unwrap(), "x,y\n1,2\n3,4\n5,6\n");
    }

    #[test]
    fn csv_fragments_with_different_columns_are_rejected() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("a.csv"), "x,y\n1,2\n").unwrap();
        fs::write(temp.path().join("b.csv"), "y,x\n3,4\n").unwrap();

        let err = combine_csv_fragments(temp.path(), &temp.path().join("out.csv")).unwrap_err();
        assert!(matches!(err, DatasetError::HeaderMismatch { .. }));
    }

    #[test]
    fn no_fragments_is_an_error() {
        let temp = tempdir().unwrap();
        let err = combine_csv_fragments(temp.path(), &temp.path().join("out.csv")).unwrap_err();
        assert!(matches!(err, DatasetError::NoFragments(_)));
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        let temp = tempdir().unwrap();
        let cfg = DatasetConfig {
            chunk_size: 0,
            ..DatasetConfig::default()
        };
        let err = build_csv_chunks(temp.path(), temp.path(), &StaticTables::default(), &cfg)
            .unwrap_err();
        assert!(matches!(err, DatasetError::InvalidConfig(_)));
    }
}
