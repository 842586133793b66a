//! A scriptable in-memory origin for generator and engine tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::bail;
use async_trait::async_trait;

use strmforge_core::{OriginClient, RemoteEntry};

/// Programmable origin whose listings and downloads come from in-memory
/// maps; counts every listing call for pacing and retry assertions.
#[derive(Default)]
pub struct ScriptedOrigin {
    host: String,
    directories: Mutex<HashMap<String, Vec<RemoteEntry>>>,
    payloads: Mutex<HashMap<(String, String), Vec<u8>>>,
    failing_paths: Mutex<Vec<String>>,
    list_calls: AtomicUsize,
}

impl ScriptedOrigin {
    /// Create an origin rendering URLs under `host`.
    #[must_use]
    pub fn new(host: &str) -> Self {
        Self {
            host: host.trim_end_matches('/').to_string(),
            ..Self::default()
        }
    }

    /// Script one directory listing.
    ///
    /// # Panics
    ///
    /// Panics when the internal mutex is poisoned.
    #[must_use]
    pub fn with_dir(self, path: &str, entries: Vec<RemoteEntry>) -> Self {
        self.directories
            .lock()
            .expect("directories mutex")
            .insert(path.to_string(), entries);
        self
    }

    /// Script the bytes served for one file download.
    ///
    /// # Panics
    ///
    /// Panics when the internal mutex is poisoned.
    #[must_use]
    pub fn with_payload(self, path: &str, name: &str, bytes: &[u8]) -> Self {
        self.payloads
            .lock()
            .expect("payloads mutex")
            .insert((path.to_string(), name.to_string()), bytes.to_vec());
        self
    }

    /// Make listings of one path fail.
    ///
    /// # Panics
    ///
    /// Panics when the internal mutex is poisoned.
    #[must_use]
    pub fn failing(self, path: &str) -> Self {
        self.failing_paths
            .lock()
            .expect("failing mutex")
            .push(path.to_string());
        self
    }

    /// Number of listing calls served so far.
    #[must_use]
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// Build a plain file entry.
    #[must_use]
    pub fn file(name: &str, size: u64, sign: Option<&str>) -> RemoteEntry {
        RemoteEntry {
            name: name.to_string(),
            size,
            modified: None,
            is_dir: false,
            sign: sign.map(str::to_string),
        }
    }

    /// Build a directory entry.
    #[must_use]
    pub fn dir(name: &str) -> RemoteEntry {
        RemoteEntry {
            name: name.to_string(),
            size: 0,
            modified: None,
            is_dir: true,
            sign: None,
        }
    }
}

#[async_trait]
impl OriginClient for ScriptedOrigin {
    async fn list(&self, path: &str) -> anyhow::Result<Vec<RemoteEntry>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self
            .failing_paths
            .lock()
            .expect("failing mutex")
            .iter()
            .any(|failing| failing == path)
        {
            bail!("scripted origin failure for {path}");
        }
        Ok(self
            .directories
            .lock()
            .expect("directories mutex")
            .get(path)
            .cloned()
            .unwrap_or_default())
    }

    fn playback_url(
        &self,
        source_path: &str,
        name: &str,
        sign: Option<&str>,
        _url_encode: bool,
    ) -> String {
        let base = format!(
            "{}/d{}/{name}",
            self.host,
            source_path.trim_end_matches('/')
        );
        sign.map_or_else(|| base.clone(), |sign| format!("{base}?sign={sign}"))
    }

    async fn fetch(
        &self,
        source_path: &str,
        name: &str,
        _sign: Option<&str>,
    ) -> anyhow::Result<Vec<u8>> {
        let payloads = self.payloads.lock().expect("payloads mutex");
        match payloads.get(&(source_path.to_string(), name.to_string())) {
            Some(bytes) => Ok(bytes.clone()),
            None => bail!("scripted origin has no payload for {source_path}/{name}"),
        }
    }
}
