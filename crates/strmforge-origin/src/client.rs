//! Rate-limited, retrying client for the AList `fs/list` surface.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::StatusCode;
use reqwest::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use strmforge_config::OriginSettings;
use strmforge_core::{OriginClient, RemoteEntry};
use strmforge_telemetry::Metrics;

use crate::error::{OriginError, Result};

const LIST_ROUTE: &str = "/api/fs/list";

// Path segments keep the characters that are legal inside a URL path.
const SEGMENT_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

#[derive(Debug, Serialize)]
struct FsListRequest<'a> {
    path: &'a str,
    password: &'a str,
    page: u32,
    per_page: u32,
    refresh: bool,
}

#[derive(Debug, Deserialize)]
struct FsListResponse {
    code: i64,
    #[serde(default)]
    message: String,
    #[serde(default)]
    data: Option<FsListData>,
}

#[derive(Debug, Default, Deserialize)]
struct FsListData {
    #[serde(default)]
    content: Option<Vec<FsEntry>>,
}

#[derive(Debug, Deserialize)]
struct FsEntry {
    name: String,
    #[serde(default)]
    size: u64,
    #[serde(default)]
    is_dir: bool,
    #[serde(default)]
    modified: Option<String>,
    #[serde(default)]
    sign: Option<String>,
    #[serde(default, rename = "type")]
    entry_type: Option<i64>,
}

/// Client instance against one AList-compatible origin.
#[derive(Clone)]
pub struct AlistClient {
    http: reqwest::Client,
    settings: OriginSettings,
    metrics: Option<Metrics>,
    last_request: Arc<Mutex<Option<Instant>>>,
}

impl AlistClient {
    /// Build a client from the stored origin settings.
    ///
    /// # Errors
    ///
    /// Returns an error when the HTTP client cannot be constructed or the
    /// configured host is empty.
    pub fn new(settings: OriginSettings) -> Result<Self> {
        if settings.host.trim().is_empty() {
            return Err(OriginError::Config("origin host is empty".to_string()));
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|err| OriginError::Config(format!("failed to build HTTP client: {err}")))?;
        Ok(Self {
            http,
            settings,
            metrics: None,
            last_request: Arc::new(Mutex::new(None)),
        })
    }

    /// Attach a metrics registry recording per-call outcomes.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// List every entry under one remote path, walking pages until a short
    /// page is returned.
    ///
    /// # Errors
    ///
    /// Returns an error when a page cannot be fetched within the retry
    /// budget or the service rejects the request.
    pub async fn list_all(&self, path: &str) -> Result<Vec<RemoteEntry>> {
        let per_page = self.settings.per_page.max(1);
        let mut entries = Vec::new();
        let mut page = 1_u32;
        loop {
            let batch = self.list_page(path, page, per_page).await?;
            let batch_len = batch.len();
            entries.extend(batch);
            if batch_len < per_page as usize {
                break;
            }
            page += 1;
        }
        debug!(path, entries = entries.len(), "listed remote directory");
        Ok(entries)
    }

    async fn list_page(&self, path: &str, page: u32, per_page: u32) -> Result<Vec<RemoteEntry>> {
        let url = format!("{}{LIST_ROUTE}", self.settings.host.trim_end_matches('/'));
        let request = FsListRequest {
            path,
            password: &self.settings.password,
            page,
            per_page,
            refresh: false,
        };

        let response: FsListResponse = self
            .execute_with_retry(|| {
                self.http
                    .post(&url)
                    .header(AUTHORIZATION, self.settings.token.as_str())
                    .json(&request)
            })
            .await?;

        if response.code != 200 {
            return Err(OriginError::Api {
                code: response.code,
                message: response.message,
            });
        }

        let content = response
            .data
            .unwrap_or_default()
            .content
            .unwrap_or_default();
        Ok(content.into_iter().map(into_remote_entry).collect())
    }

    /// Render the playback URL written into pointer files, honouring the
    /// `domain` override and the encoding policy.
    #[must_use]
    pub fn render_playback_url(
        &self,
        source_path: &str,
        name: &str,
        sign: Option<&str>,
        url_encode: bool,
    ) -> String {
        let host = self
            .settings
            .domain
            .as_deref()
            .filter(|domain| !domain.trim().is_empty())
            .unwrap_or(&self.settings.host);
        render_direct_url(host, source_path, name, sign, url_encode)
    }

    /// Download one file's bytes through the service host.
    ///
    /// # Errors
    ///
    /// Returns an error when the download fails within the retry budget.
    pub async fn download(
        &self,
        source_path: &str,
        name: &str,
        sign: Option<&str>,
    ) -> Result<Vec<u8>> {
        let url = render_direct_url(&self.settings.host, source_path, name, sign, true);
        let bytes = self
            .execute_raw_with_retry(|| {
                self.http
                    .get(&url)
                    .header(AUTHORIZATION, self.settings.token.as_str())
            })
            .await?;
        Ok(bytes)
    }

    async fn execute_with_retry<T, F>(&self, build: F) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
        F: Fn() -> reqwest::RequestBuilder,
    {
        let body = self
            .retry_loop(|| async {
                let response = build().send().await.map_err(transport_failure)?;
                let status = response.status();
                if !status.is_success() {
                    return Err(status_failure(status));
                }
                response.bytes().await.map_err(transport_failure)
            })
            .await?;
        serde_json::from_slice(&body).map_err(|err| OriginError::Decode(err.to_string()))
    }

    async fn execute_raw_with_retry<F>(&self, build: F) -> Result<Vec<u8>>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let body = self
            .retry_loop(|| async {
                let response = build().send().await.map_err(transport_failure)?;
                let status = response.status();
                if !status.is_success() {
                    return Err(status_failure(status));
                }
                response.bytes().await.map_err(transport_failure)
            })
            .await?;
        Ok(body.to_vec())
    }

    async fn retry_loop<T, F, Fut>(&self, call: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = std::result::Result<T, AttemptFailure>>,
    {
        let budget = self.settings.req_retry_count;
        let mut attempt = 0_u32;
        loop {
            self.pace().await;
            attempt += 1;
            match call().await {
                Ok(value) => {
                    self.record_outcome("success");
                    return Ok(value);
                }
                Err(failure) => {
                    self.record_outcome("failure");
                    if attempt > budget {
                        return Err(OriginError::Upstream {
                            attempts: attempt,
                            status: failure.status,
                            detail: failure.detail,
                        });
                    }
                    warn!(
                        attempt,
                        budget,
                        status = ?failure.status,
                        detail = %failure.detail,
                        "origin call failed; retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(self.settings.req_retry_interval_ms))
                        .await;
                }
            }
        }
    }

    // Enforces the global minimum gap between the starts of consecutive
    // calls from this client instance.
    async fn pace(&self) {
        let interval = Duration::from_millis(self.settings.req_interval_ms);
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < interval {
                tokio::time::sleep(interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    fn record_outcome(&self, outcome: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.inc_origin_request(outcome);
        }
    }
}

struct AttemptFailure {
    status: Option<u16>,
    detail: String,
}

fn transport_failure(err: reqwest::Error) -> AttemptFailure {
    AttemptFailure {
        status: err.status().map(|status| status.as_u16()),
        detail: err.to_string(),
    }
}

fn status_failure(status: StatusCode) -> AttemptFailure {
    AttemptFailure {
        status: Some(status.as_u16()),
        detail: format!("origin answered status {status}"),
    }
}

fn into_remote_entry(entry: FsEntry) -> RemoteEntry {
    let modified = entry
        .modified
        .as_deref()
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|stamp| stamp.with_timezone(&Utc));
    let _ = entry.entry_type;
    RemoteEntry {
        name: entry.name,
        size: entry.size,
        modified,
        is_dir: entry.is_dir,
        sign: entry.sign.filter(|sign| !sign.is_empty()),
    }
}

fn render_direct_url(
    host: &str,
    source_path: &str,
    name: &str,
    sign: Option<&str>,
    url_encode: bool,
) -> String {
    let host = host.trim_end_matches('/');
    let full_path = join_remote_path(source_path, name);
    let path = if url_encode {
        encode_path(&full_path)
    } else {
        full_path
    };
    match sign.filter(|sign| !sign.is_empty()) {
        Some(sign) => format!("{host}/d{path}?sign={sign}"),
        None => format!("{host}/d{path}"),
    }
}

fn join_remote_path(source_path: &str, name: &str) -> String {
    let base = source_path.trim_end_matches('/');
    if base.is_empty() {
        format!("/{name}")
    } else {
        format!("{base}/{name}")
    }
}

fn encode_path(path: &str) -> String {
    path.split('/')
        .map(|segment| utf8_percent_encode(segment, SEGMENT_ENCODE_SET).to_string())
        .collect::<Vec<_>>()
        .join("/")
}

#[async_trait]
impl OriginClient for AlistClient {
    async fn list(&self, path: &str) -> anyhow::Result<Vec<RemoteEntry>> {
        Ok(self.list_all(path).await?)
    }

    fn playback_url(
        &self,
        source_path: &str,
        name: &str,
        sign: Option<&str>,
        url_encode: bool,
    ) -> String {
        self.render_playback_url(source_path, name, sign, url_encode)
    }

    async fn fetch(
        &self,
        source_path: &str,
        name: &str,
        sign: Option<&str>,
    ) -> anyhow::Result<Vec<u8>> {
        Ok(self.download(source_path, name, sign).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(host: &str) -> OriginSettings {
        OriginSettings {
            host: host.to_string(),
            token: "token-1".to_string(),
            domain: None,
            password: String::new(),
            per_page: 2,
            req_interval_ms: 0,
            req_retry_count: 1,
            req_retry_interval_ms: 5,
            timeout_secs: 5,
        }
    }

    #[test]
    fn direct_urls_encode_segments_but_not_separators() {
        let url = render_direct_url(
            "http://origin:5244/",
            "/movies/Sci Fi",
            "Blade Runner (1982).mp4",
            Some("sig"),
            true,
        );
        assert_eq!(
            url,
            "http://origin:5244/d/movies/Sci%20Fi/Blade%20Runner%20%281982%29.mp4?sign=sig"
        );

        let raw = render_direct_url(
            "http://origin:5244",
            "/movies/Sci Fi",
            "a b.mp4",
            None,
            false,
        );
        assert_eq!(raw, "http://origin:5244/d/movies/Sci Fi/a b.mp4");
    }

    #[test]
    fn playback_url_prefers_the_domain_override() {
        let mut config = settings("http://internal:5244");
        config.domain = Some("https://media.example.com".to_string());
        let client = AlistClient::new(config).expect("client builds");
        let url = client.render_playback_url("/movies", "a.mp4", None, true);
        assert_eq!(url, "https://media.example.com/d/movies/a.mp4");
    }

    #[test]
    fn empty_host_is_rejected() {
        assert!(AlistClient::new(settings("  ")).is_err());
    }

    #[tokio::test]
    async fn listing_walks_pages_until_a_short_page() {
        let server = httpmock::MockServer::start_async().await;
        let page_one = server
            .mock_async(|when, then| {
                when.method(httpmock::Method::POST)
                    .path("/api/fs/list")
                    .json_body_includes(r#"{"page": 1}"#);
                then.status(200).json_body(serde_json::json!({
                    "code": 200,
                    "message": "success",
                    "data": {"content": [
                        {"name": "a.mp4", "size": 100, "is_dir": false, "sign": "s1"},
                        {"name": "sub", "size": 0, "is_dir": true}
                    ], "total": 3}
                }));
            })
            .await;
        let page_two = server
            .mock_async(|when, then| {
                when.method(httpmock::Method::POST)
                    .path("/api/fs/list")
                    .json_body_includes(r#"{"page": 2}"#);
                then.status(200).json_body(serde_json::json!({
                    "code": 200,
                    "message": "success",
                    "data": {"content": [
                        {"name": "b.mkv", "size": 200, "is_dir": false,
                         "modified": "2024-05-01T10:00:00Z"}
                    ], "total": 3}
                }));
            })
            .await;

        let client = AlistClient::new(settings(&server.base_url())).expect("client builds");
        let entries = client.list_all("/movies").await.expect("listing succeeds");

        page_one.assert_async().await;
        page_two.assert_async().await;
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].name, "a.mp4");
        assert_eq!(entries[0].sign.as_deref(), Some("s1"));
        assert!(entries[1].is_dir);
        assert!(entries[2].modified.is_some());
    }

    #[tokio::test]
    async fn application_level_failure_is_not_retried() {
        let server = httpmock::MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(httpmock::Method::POST).path("/api/fs/list");
                then.status(200).json_body(serde_json::json!({
                    "code": 401,
                    "message": "token expired"
                }));
            })
            .await;

        let client = AlistClient::new(settings(&server.base_url())).expect("client builds");
        let error = client.list_all("/movies").await.expect_err("api failure");
        assert!(matches!(error, OriginError::Api { code: 401, .. }));
        assert_eq!(mock.calls_async().await, 1);
    }

    #[tokio::test]
    async fn http_failures_exhaust_the_retry_budget() {
        let server = httpmock::MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(httpmock::Method::POST).path("/api/fs/list");
                then.status(503);
            })
            .await;

        let mut config = settings(&server.base_url());
        config.req_retry_count = 2;
        let client = AlistClient::new(config).expect("client builds");
        let error = client.list_all("/movies").await.expect_err("upstream");
        match error {
            OriginError::Upstream {
                attempts,
                status,
                ..
            } => {
                assert_eq!(attempts, 3, "one call plus two retries");
                assert_eq!(status, Some(503));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(mock.calls_async().await, 3);
    }

    #[tokio::test]
    async fn consecutive_calls_respect_the_request_interval() {
        let server = httpmock::MockServer::start_async().await;
        let _mock = server
            .mock_async(|when, then| {
                when.method(httpmock::Method::POST).path("/api/fs/list");
                then.status(200).json_body(serde_json::json!({
                    "code": 200, "message": "success", "data": {"content": []}
                }));
            })
            .await;

        let mut config = settings(&server.base_url());
        config.req_interval_ms = 80;
        let client = AlistClient::new(config).expect("client builds");

        let started = std::time::Instant::now();
        client.list_all("/a").await.expect("first call");
        client.list_all("/b").await.expect("second call");
        assert!(
            started.elapsed() >= Duration::from_millis(80),
            "the second call must wait out the pacing interval"
        );
    }

    #[tokio::test]
    async fn download_returns_the_raw_bytes() {
        let server = httpmock::MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(httpmock::Method::GET)
                    .path("/d/movies/a.nfo")
                    .query_param("sign", "s1");
                then.status(200).body("<movie/>");
            })
            .await;

        let client = AlistClient::new(settings(&server.base_url())).expect("client builds");
        let bytes = client
            .download("/movies", "a.nfo", Some("s1"))
            .await
            .expect("download succeeds");
        mock.assert_async().await;
        assert_eq!(bytes, b"<movie/>".to_vec());
    }
}
