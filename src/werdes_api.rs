//! Historical match download from the public kills API (api.kills.werdes.net).

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, warn};

pub const WERDES_API_BASE_URL: &str = "https://api.kills.werdes.net/api";
pub const MATCH_FILE_PREFIX: &str = "match_skirmish_data_";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WerdesApiConfig {
    pub base_url: String,
    pub output_dir: PathBuf,
    pub http_timeout_ms: u64,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    /// Pause after each match request.
    pub request_delay_ms: u64,
}

impl Default for WerdesApiConfig {
    fn default() -> Self {
        Self {
            base_url: WERDES_API_BASE_URL.to_string(),
            output_dir: PathBuf::from("wvw_per_match_json_files"),
            http_timeout_ms: 5_000,
            max_retries: 3,
            retry_backoff_ms: 200,
            request_delay_ms: 750,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchFileSource {
    Cached,
    Downloaded,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchFile {
    pub match_id: String,
    pub path: PathBuf,
    pub source: MatchFileSource,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub listed: u64,
    pub cached: u64,
    pub downloaded: u64,
    pub failed: Vec<String>,
}

#[derive(Debug, Error)]
pub enum WerdesApiError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("HTTP client build error: {0}")]
    HttpClientBuild(String),
    #[error("HTTP request failed for {url}: {message}")]
    HttpRequest { url: String, message: String },
    #[error("HTTP status {status} from {url}")]
    HttpStatus { url: String, status: u16 },
    #[error("invalid JSON from {url}: {source}")]
    InvalidJson {
        url: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("unexpected match list shape from {url}")]
    UnexpectedMatchList { url: String },
    #[error("invalid output path: {0}")]
    InvalidPath(PathBuf),
}

impl WerdesApiError {
    /// Transport failures, throttling and server errors; a 4xx answer is final.
    fn is_transient(&self) -> bool {
        match self {
            Self::HttpRequest { .. } => true,
            Self::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

pub fn match_list_url(cfg: &WerdesApiConfig) -> String {
    format!("{}/matchlist/all", cfg.base_url.trim_end_matches('/'))
}

pub fn match_url(cfg: &WerdesApiConfig, match_id: &str) -> String {
    format!(
        "{}/match/{match_id}/flattened/unaltered",
        cfg.base_url.trim_end_matches('/')
    )
}

pub fn match_file_name(match_id: &str) -> String {
    format!("{MATCH_FILE_PREFIX}{match_id}.json")
}

/// Match ids advertised by the API. Failure here is fatal: the list is known to exist.
pub fn fetch_match_ids(cfg: &WerdesApiConfig) -> Result<Vec<String>, WerdesApiError> {
    let fetcher = BlockingApiClient::new(cfg.http_timeout_ms)?;
    fetch_match_ids_with_fetcher(cfg, &fetcher)
}

/// Downloads every listed match not already present under `cfg.output_dir`.
pub fn sync_match_files(cfg: &WerdesApiConfig) -> Result<(Vec<MatchFile>, SyncReport), WerdesApiError> {
    let fetcher = BlockingApiClient::new(cfg.http_timeout_ms)?;
    sync_match_files_with_fetcher(cfg, &fetcher)
}

fn fetch_match_ids_with_fetcher(
    cfg: &WerdesApiConfig,
    fetcher: &dyn HttpFetcher,
) -> Result<Vec<String>, WerdesApiError> {
    let url = match_list_url(cfg);
    let body = with_retries(cfg, &url, || fetcher.get_bytes(&url)).map_err(|err| {
        error!(
            component = "werdes_api",
            event = "werdes.match_list.error",
            url = %url,
            error = %err
        );
        err
    })?;
    let ids = parse_match_list(&url, &body)?;
    info!(
        component = "werdes_api",
        event = "werdes.match_list.fetched",
        match_count = ids.len()
    );
    Ok(ids)
}

fn sync_match_files_with_fetcher(
    cfg: &WerdesApiConfig,
    fetcher: &dyn HttpFetcher,
) -> Result<(Vec<MatchFile>, SyncReport), WerdesApiError> {
    fs::create_dir_all(&cfg.output_dir)?;
    let match_ids = fetch_match_ids_with_fetcher(cfg, fetcher)?;
    info!(
        component = "werdes_api",
        event = "werdes.sync.start",
        output_dir = %cfg.output_dir.display(),
        match_count = match_ids.len()
    );

    let mut files = Vec::with_capacity(match_ids.len());
    let mut report = SyncReport {
        listed: match_ids.len() as u64,
        ..SyncReport::default()
    };

    for match_id in match_ids {
        let path = cfg.output_dir.join(match_file_name(&match_id));
        if path.exists() {
            info!(
                component = "werdes_api",
                event = "werdes.sync.file.cached",
                match_id = %match_id,
                path = %path.display()
            );
            report.cached += 1;
            files.push(MatchFile {
                match_id,
                path,
                source: MatchFileSource::Cached,
            });
            continue;
        }

        let url = match_url(cfg, &match_id);
        debug!(
            component = "werdes_api",
            event = "werdes.sync.file.request",
            match_id = %match_id,
            url = %url
        );
        let fetched = with_retries(cfg, &url, || fetcher.get_bytes(&url)).and_then(|body| {
            validate_json(&url, &body)?;
            Ok(body)
        });
        if cfg.request_delay_ms > 0 {
            std::thread::sleep(Duration::from_millis(cfg.request_delay_ms));
        }

        let body = match fetched {
            Ok(body) => body,
            Err(err) => {
                warn!(
                    component = "werdes_api",
                    event = "werdes.sync.file.failed",
                    match_id = %match_id,
                    error = %err
                );
                report.failed.push(match_id);
                continue;
            }
        };

        persist_match_file(&path, &body)?;
        info!(
            component = "werdes_api",
            event = "werdes.sync.file.downloaded",
            match_id = %match_id,
            path = %path.display(),
            bytes = body.len()
        );
        report.downloaded += 1;
        files.push(MatchFile {
            match_id,
            path,
            source: MatchFileSource::Downloaded,
        });
    }

    info!(
        component = "werdes_api",
        event = "werdes.sync.finish",
        listed = report.listed,
        cached = report.cached,
        downloaded = report.downloaded,
        failed = report.failed.len()
    );

    Ok((files, report))
}

/// The list is keyed like `"<prefix>_<id>"`; the id is the text after the last `_`.
fn parse_match_list(url: &str, body: &[u8]) -> Result<Vec<String>, WerdesApiError> {
    let value: serde_json::Value =
        serde_json::from_slice(body).map_err(|source| WerdesApiError::InvalidJson {
            url: url.to_string(),
            source,
        })?;

    let keys: Vec<&str> = match &value {
        serde_json::Value::Object(map) => map.keys().map(String::as_str).collect(),
        serde_json::Value::Array(items) => items
            .iter()
            .map(|item| item.as_str())
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| WerdesApiError::UnexpectedMatchList {
                url: url.to_string(),
            })?,
        _ => {
            return Err(WerdesApiError::UnexpectedMatchList {
                url: url.to_string(),
            })
        }
    };

    Ok(keys
        .into_iter()
        .map(|key| key.rsplit('_').next().unwrap_or(key).to_string())
        .collect())
}

fn validate_json(url: &str, body: &[u8]) -> Result<(), WerdesApiError> {
    serde_json::from_slice::<serde::de::IgnoredAny>(body)
        .map(|_| ())
        .map_err(|source| WerdesApiError::InvalidJson {
            url: url.to_string(),
            source,
        })
}

/// Writes through a sibling `.partial` file; `path` only ever holds a complete body.
fn persist_match_file(path: &Path, body: &[u8]) -> Result<(), WerdesApiError> {
    let partial = match path.file_name() {
        Some(name) => {
            let mut name = name.to_os_string();
            name.push(".partial");
            path.with_file_name(name)
        }
        None => return Err(WerdesApiError::InvalidPath(path.to_path_buf())),
    };

    let mut file = fs::File::create(&partial)?;
    file.write_all(body)?;
    file.sync_all()?;
    drop(file);

    fs::rename(&partial, path)?;
    Ok(())
}

trait HttpFetcher {
    fn get_bytes(&self, url: &str) -> Result<Vec<u8>, WerdesApiError>;
}

struct BlockingApiClient {
    client: reqwest::blocking::Client,
}

impl BlockingApiClient {
    fn new(timeout_ms: u64) -> Result<Self, WerdesApiError> {
        reqwest::blocking::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .user_agent(concat!("wvw_skirmish/", env!("CARGO_PKG_VERSION")))
            .build()
            .map(|client| Self { client })
            .map_err(|err| WerdesApiError::HttpClientBuild(err.to_string()))
    }
}

impl HttpFetcher for BlockingApiClient {
    fn get_bytes(&self, url: &str) -> Result<Vec<u8>, WerdesApiError> {
        let transport = |err: reqwest::Error| WerdesApiError::HttpRequest {
            url: url.to_string(),
            message: err.to_string(),
        };

        let response = self.client.get(url).send().map_err(transport)?;
        let status = response.status();
        if !status.is_success() {
            return Err(WerdesApiError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response.bytes().map_err(transport)?.to_vec())
    }
}

/// Runs `request` up to `max_retries + 1` times, doubling the pause after each
/// transient failure. Non-transient errors return immediately.
fn with_retries<T>(
    cfg: &WerdesApiConfig,
    url: &str,
    mut request: impl FnMut() -> Result<T, WerdesApiError>,
) -> Result<T, WerdesApiError> {
    let mut pause_ms = cfg.retry_backoff_ms;
    for attempt in 1..=cfg.max_retries {
        match request() {
            Err(err) if err.is_transient() => {
                debug!(
                    component = "werdes_api",
                    event = "werdes.request.retry",
                    url,
                    attempt,
                    pause_ms,
                    error = %err
                );
                std::thread::sleep(Duration::from_millis(pause_ms));
                pause_ms = pause_ms.saturating_mul(2);
            }
            done => return done,
        }
    }
    request()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[derive(Default)]
    struct MockFetcher {
        responses: HashMap<String, Vec<u8>>,
        statuses: HashMap<String, u16>,
        requested: RefCell<Vec<String>>,
    }

    impl MockFetcher {
        fn with(mut self, url: &str, body: &[u8]) -> Self {
            self.responses.insert(url.to_string(), body.to_vec());
            self
        }

        fn with_status(mut self, url: &str, status: u16) -> Self {
            self.statuses.insert(url.to_string(), status);
            self
        }

        fn request_count(&self, url: &str) -> usize {
            self.requested
                .borrow()
                .iter()
                .filter(|requested| requested.as_str() == url)
                .count()
        }
    }

    impl HttpFetcher for MockFetcher {
        fn get_bytes(&self, url: &str) -> Result<Vec<u8>, WerdesApiError> {
            self.requested.borrow_mut().push(url.to_string());
            if let Some(status) = self.statuses.get(url) {
                return Err(WerdesApiError::HttpStatus {
                    url: url.to_string(),
                    status: *status,
                });
            }
            self.responses
                .get(url)
                .cloned()
                .ok_or_else(|| WerdesApiError::HttpRequest {
                    url: url.to_string(),
                    message: "missing mock response".to_string(),
                })
        }
    }

    fn test_cfg(dir: &Path) -> WerdesApiConfig {
        WerdesApiConfig {
            base_url: "https://kills.test/api".to_string(),
            output_dir: dir.to_path_buf(),
            max_retries: 1,
            retry_backoff_ms: 0,
            request_delay_ms: 0,
            ..WerdesApiConfig::default()
        }
    }

    #[test]
    fn match_list_ids_are_the_last_underscore_segment() {
        let ids = parse_match_list("u", br#"{"match_1-1_1001": 1, "match_2-3_1002": 2}"#).unwrap();
        assert_eq!(ids, vec!["1001".to_string(), "1002".to_string()]);

        let ids = parse_match_list("u", br#"["a_7", "8"]"#).unwrap();
        assert_eq!(ids, vec!["7".to_string(), "8".to_string()]);

        assert!(matches!(
            parse_match_list("u", b"42").unwrap_err(),
            WerdesApiError::UnexpectedMatchList { .. }
        ));
    }

    #[test]
    fn match_list_failure_is_fatal() {
        let temp = tempdir().unwrap();
        let cfg = test_cfg(temp.path());
        let fetcher = MockFetcher::default();

        let err = sync_match_files_with_fetcher(&cfg, &fetcher).unwrap_err();
        assert!(matches!(err, WerdesApiError::HttpRequest { .. }));
        assert_eq!(fetcher.request_count(&match_list_url(&cfg)), 2);
    }

    #[test]
    fn cached_files_are_skipped_and_failures_do_not_abort() {
        let temp = tempdir().unwrap();
        let cfg = test_cfg(temp.path());
        fs::write(temp.path().join(match_file_name("1")), b"{}").unwrap();

        let fetcher = MockFetcher::default()
            .with(&match_list_url(&cfg), br#"["m_1", "m_2", "m_3"]"#)
            .with(&match_url(&cfg, "2"), br#"{"match_id": "2"}"#)
            .with(&match_url(&cfg, "3"), b"not json");

        let (files, report) = sync_match_files_with_fetcher(&cfg, &fetcher).unwrap();

        assert_eq!(files.len(), 2);
        assert_eq!(files[0].source, MatchFileSource::Cached);
        assert_eq!(files[1].source, MatchFileSource::Downloaded);
        assert_eq!(report.listed, 3);
        assert_eq!(report.cached, 1);
        assert_eq!(report.downloaded, 1);
        assert_eq!(report.failed, vec!["3".to_string()]);
        assert_eq!(fetcher.request_count(&match_url(&cfg, "1")), 0);
        assert!(!temp.path().join(match_file_name("3")).exists());
        assert_eq!(
            fs::read(temp.path().join(match_file_name("2"))).unwrap(),
            br#"{"match_id": "2"}"#
        );
    }

    #[test]
    fn missing_match_is_requested_once_and_server_errors_are_retried() {
        let temp = tempdir().unwrap();
        let cfg = WerdesApiConfig {
            max_retries: 2,
            ..test_cfg(temp.path())
        };
        let fetcher = MockFetcher::default()
            .with(&match_list_url(&cfg), br#"["m_404", "m_503"]"#)
            .with_status(&match_url(&cfg, "404"), 404)
            .with_status(&match_url(&cfg, "503"), 503);

        let (files, report) = sync_match_files_with_fetcher(&cfg, &fetcher).unwrap();

        assert!(files.is_empty());
        assert_eq!(report.failed, vec!["404".to_string(), "503".to_string()]);
        assert_eq!(fetcher.request_count(&match_url(&cfg, "404")), 1);
        assert_eq!(fetcher.request_count(&match_url(&cfg, "503")), 3);
    }

    #[test]
    fn persisted_match_file_leaves_no_partial_sibling() {
        let temp = tempdir().unwrap();
        let path = temp.path().join(match_file_name("9"));
        persist_match_file(&path, br#"{"match_id": 9}"#).unwrap();

        assert_eq!(fs::read(&path).unwrap(), br#"{"match_id": 9}"#);
        let leftovers: Vec<_> = fs::read_dir(temp.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .filter(|name| name.to_string_lossy().ends_with(".partial"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
