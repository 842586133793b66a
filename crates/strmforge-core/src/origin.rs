//! Origin-facing seam implemented by the AList adapter.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One entry returned by a remote directory listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemoteEntry {
    /// File or directory name within the listed path.
    pub name: String,
    /// Size in bytes; zero for directories.
    pub size: u64,
    /// Remote modification timestamp, when reported.
    pub modified: Option<DateTime<Utc>>,
    /// Whether the entry is a directory.
    pub is_dir: bool,
    /// Opaque signature appended to direct URLs, when issued.
    pub sign: Option<String>,
}

/// Kind of change reported by the file-change webhook.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FileEventKind {
    /// A file appeared at the source path.
    Create,
    /// A file's content changed in place.
    Modify,
    /// A file moved to a new name within the same directory.
    Rename,
    /// A file disappeared from the source path.
    Delete,
}

/// Single-entry change notification consumed by the generator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileChangeEvent {
    /// What happened to the entry.
    pub kind: FileEventKind,
    /// Remote directory containing the entry; always starts with `/`.
    pub source_path: String,
    /// Entry name before the change.
    pub name: String,
    /// New entry name; only set for renames.
    #[serde(default)]
    pub new_name: Option<String>,
    /// Remote size in bytes, when known.
    #[serde(default)]
    pub size: u64,
    /// Signature for direct-URL rendering, when issued.
    #[serde(default)]
    pub sign: Option<String>,
}

/// Client against the remote file service whose namespace is mirrored.
///
/// Implementations own pacing, retries, and authentication; callers treat a
/// listing failure as fatal for the current run while per-entry fetch
/// failures stay local to the entry.
#[async_trait]
pub trait OriginClient: Send + Sync {
    /// List every entry of one remote directory, walking pagination
    /// internally.
    async fn list(&self, path: &str) -> anyhow::Result<Vec<RemoteEntry>>;

    /// Render the playback URL for one file, honouring host overrides and
    /// percent-encoding path segments when `url_encode` is set.
    fn playback_url(&self, source_path: &str, name: &str, sign: Option<&str>, url_encode: bool)
    -> String;

    /// Download one file's bytes for companion mirroring.
    async fn fetch(&self, source_path: &str, name: &str, sign: Option<&str>)
    -> anyhow::Result<Vec<u8>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct StubOrigin;

    #[async_trait]
    impl OriginClient for StubOrigin {
        async fn list(&self, path: &str) -> anyhow::Result<Vec<RemoteEntry>> {
            Ok(vec![RemoteEntry {
                name: format!("{}-entry.mp4", path.trim_start_matches('/')),
                size: 1024,
                modified: None,
                is_dir: false,
                sign: None,
            }])
        }

        fn playback_url(
            &self,
            source_path: &str,
            name: &str,
            sign: Option<&str>,
            _url_encode: bool,
        ) -> String {
            let base = format!("http://origin/d{source_path}/{name}");
            sign.map_or_else(|| base.clone(), |sign| format!("{base}?sign={sign}"))
        }

        async fn fetch(
            &self,
            _source_path: &str,
            name: &str,
            _sign: Option<&str>,
        ) -> anyhow::Result<Vec<u8>> {
            Ok(name.as_bytes().to_vec())
        }
    }

    #[tokio::test]
    async fn stub_origin_round_trips_listing_and_fetch() {
        let origin = StubOrigin;
        let entries = origin.list("/movies").await.expect("list succeeds");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "movies-entry.mp4");

        let url = origin.playback_url("/movies", "a.mp4", Some("sig"), true);
        assert_eq!(url, "http://origin/d/movies/a.mp4?sign=sig");

        let bytes = origin.fetch("/movies", "a.nfo", None).await.expect("fetch");
        assert_eq!(bytes, b"a.nfo".to_vec());
    }

    #[test]
    fn file_change_event_deserialises_with_defaults() {
        let event: FileChangeEvent = serde_json::from_str(
            r#"{"kind":"create","source_path":"/movies","name":"a.mp4"}"#,
        )
        .expect("deserialise");
        assert_eq!(event.kind, FileEventKind::Create);
        assert_eq!(event.size, 0);
        assert!(event.new_name.is_none());
    }
}
