//! The per-run generation service.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use strmforge_config::StrmSettings;
use strmforge_core::{
    Classification, FileCategory, FileChangeEvent, FileEventKind, NewFileHistory, OriginClient,
    ProcessingStatus, RemoteEntry, Task, classify,
};
use strmforge_data::HistoryStore;
use strmforge_events::{RunCounters, RunStatus, RunSummary};
use strmforge_telemetry::Metrics;

use crate::fsutil::{content_hash, write_atomic};

const STRM_SUFFIX: &str = "strm";

type BoxedWalk<'a> = Pin<Box<dyn Future<Output = Result<(), RunAbort>> + Send + 'a>>;

/// Why a walk stopped before visiting every entry.
enum RunAbort {
    Cancelled,
    Origin(String),
}

struct RunState {
    counters: RunCounters,
    // (remote directory, stem) -> pointer row id, for companion linking.
    main_ids: HashMap<(String, String), i64>,
}

impl RunState {
    fn new() -> Self {
        Self {
            counters: RunCounters::default(),
            main_ids: HashMap::new(),
        }
    }
}

/// Service generating pointer files and companions for one task at a time.
#[derive(Clone)]
pub struct StrmGenerator {
    origin: Arc<dyn OriginClient>,
    history: HistoryStore,
    strm: StrmSettings,
    metrics: Option<Metrics>,
}

impl StrmGenerator {
    /// Construct a generator over the origin seam and the history store.
    #[must_use]
    pub fn new(origin: Arc<dyn OriginClient>, history: HistoryStore, strm: StrmSettings) -> Self {
        Self {
            origin,
            history,
            strm,
            metrics: None,
        }
    }

    /// Attach a metrics registry recording per-entry outcomes.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Execute one full run of one task and fold the outcome into a
    /// summary. Per-entry failures are recorded and skipped; a listing
    /// failure or a cancellation ends the walk with the matching terminal
    /// status.
    pub async fn run(
        &self,
        task: &Task,
        task_log_id: i64,
        cancel: &CancellationToken,
    ) -> RunSummary {
        let started = Instant::now();
        let mut state = RunState::new();

        let outcome = self
            .process_directory(
                task,
                task_log_id,
                &mut state,
                cancel,
                task.source_path.clone(),
                PathBuf::from(&task.target_path),
            )
            .await;

        let (status, error_message) = match outcome {
            Ok(()) => (RunStatus::Completed, None),
            Err(RunAbort::Cancelled) => (
                RunStatus::Cancelled,
                Some("run cancelled before completing the walk".to_string()),
            ),
            Err(RunAbort::Origin(detail)) => (RunStatus::Failed, Some(detail)),
        };

        let summary = self.build_summary(task, task_log_id, started, status, error_message, state);
        info!(
            task_id = task.id,
            task_log_id,
            status = summary.status.as_str(),
            total = summary.counters.total_file,
            generated = summary.counters.generated_file,
            skipped = summary.counters.skip_file,
            failed = summary.counters.failed_count,
            "run finished"
        );
        summary
    }

    /// Apply one webhook-delivered change without walking the tree.
    pub async fn apply_file_event(
        &self,
        task: &Task,
        task_log_id: i64,
        event: &FileChangeEvent,
    ) -> RunSummary {
        let started = Instant::now();
        let mut state = RunState::new();

        match event.kind {
            FileEventKind::Create | FileEventKind::Modify => {
                self.apply_single_entry(task, task_log_id, &mut state, event, &event.name)
                    .await;
            }
            FileEventKind::Rename => {
                self.remove_entry(task, &mut state, &event.source_path, &event.name)
                    .await;
                if let Some(new_name) = event.new_name.clone() {
                    self.apply_single_entry(task, task_log_id, &mut state, event, &new_name)
                        .await;
                }
            }
            FileEventKind::Delete => {
                self.remove_entry(task, &mut state, &event.source_path, &event.name)
                    .await;
            }
        }

        self.build_summary(task, task_log_id, started, RunStatus::Completed, None, state)
    }

    fn build_summary(
        &self,
        task: &Task,
        task_log_id: i64,
        started: Instant,
        status: RunStatus,
        error_message: Option<String>,
        state: RunState,
    ) -> RunSummary {
        RunSummary {
            task_id: task.id,
            task_log_id,
            task_name: task.name.clone(),
            source_path: task.source_path.clone(),
            target_path: task.target_path.clone(),
            status,
            duration_seconds: i64::try_from(started.elapsed().as_secs()).unwrap_or(i64::MAX),
            counters: state.counters,
            error_message,
        }
    }

    fn process_directory<'a>(
        &'a self,
        task: &'a Task,
        task_log_id: i64,
        state: &'a mut RunState,
        cancel: &'a CancellationToken,
        remote_dir: String,
        local_dir: PathBuf,
    ) -> BoxedWalk<'a> {
        Box::pin(async move {
            if cancel.is_cancelled() {
                return Err(RunAbort::Cancelled);
            }

            let entries = self
                .origin
                .list(&remote_dir)
                .await
                .map_err(|err| RunAbort::Origin(format!("{err:#}")))?;

            let main_suffixes = task.suffix_list();
            let subtitle_suffixes = task.subtitle_suffixes();
            let metadata_suffixes = task.metadata_suffixes();

            let mut companions: Vec<(RemoteEntry, FileCategory)> = Vec::new();
            for entry in entries {
                if cancel.is_cancelled() {
                    return Err(RunAbort::Cancelled);
                }

                if entry.is_dir {
                    let child_remote = join_remote(&remote_dir, &entry.name);
                    let child_local = local_dir.join(&entry.name);
                    self.process_directory(
                        task,
                        task_log_id,
                        &mut *state,
                        cancel,
                        child_remote,
                        child_local,
                    )
                    .await?;
                    continue;
                }

                match classify(
                    &entry.name,
                    &main_suffixes,
                    subtitle_suffixes.as_deref(),
                    metadata_suffixes.as_deref(),
                ) {
                    Classification::Main => {
                        self.handle_main(task, task_log_id, state, &remote_dir, &local_dir, &entry)
                            .await;
                    }
                    Classification::Subtitle => {
                        companions.push((entry, FileCategory::Subtitle));
                    }
                    Classification::Metadata => {
                        companions.push((entry, FileCategory::Metadata));
                    }
                    Classification::Ignore => {
                        state.counters.other_skipped += 1;
                    }
                }
            }

            // Companions run after the directory's pointers so the rows they
            // link against already exist.
            for (entry, category) in companions {
                if cancel.is_cancelled() {
                    return Err(RunAbort::Cancelled);
                }
                self.handle_companion(
                    task,
                    task_log_id,
                    state,
                    &remote_dir,
                    &local_dir,
                    &entry,
                    category,
                )
                .await;
            }

            Ok(())
        })
    }

    async fn handle_main(
        &self,
        task: &Task,
        task_log_id: i64,
        state: &mut RunState,
        remote_dir: &str,
        local_dir: &Path,
        entry: &RemoteEntry,
    ) {
        state.counters.total_file += 1;

        if self.strm.min_file_size_mb > 0
            && entry.size < self.strm.min_file_size_mb * 1024 * 1024
        {
            state.counters.skip_file += 1;
            self.record_file_metric("main", "skipped");
            debug!(
                name = %entry.name,
                size = entry.size,
                floor_mb = self.strm.min_file_size_mb,
                "main file under the size floor; skipped"
            );
            return;
        }

        let target_name = strm_target_name(&entry.name, self.strm.replace_suffix);
        let target = local_dir.join(&target_name);
        let url = self.origin.playback_url(
            remote_dir,
            &entry.name,
            entry.sign.as_deref(),
            self.strm.url_encode,
        );
        let content = format!("{url}\n");
        let hash = content_hash(content.as_bytes());
        let stem = media_stem(&entry.name).to_string();
        let target_display = target.to_string_lossy().into_owned();

        let existed = target.exists();
        if existed && !task.overwrite {
            match self.history.lookup_by_hash(task.id, &hash).await {
                Ok(Some(row)) if row.target_file_path == target_display => {
                    state.counters.skip_file += 1;
                    self.record_file_metric("main", "skipped");
                    state.main_ids.insert((remote_dir.to_string(), stem), row.id);
                    return;
                }
                Ok(_) => {}
                Err(err) => {
                    warn!(error = %err, target = %target_display, "hash lookup failed; regenerating");
                }
            }
        }

        if let Err(err) = write_atomic(&target, content.as_bytes()) {
            state.counters.failed_count += 1;
            self.record_file_metric("main", "failed");
            warn!(error = %err, target = %target_display, "failed to write pointer file");
            self.record_history(new_history(
                task,
                task_log_id,
                entry,
                remote_dir,
                Some(url),
                target_display,
                FileCategory::Main,
                None,
                None,
                ProcessingStatus::Failed,
            ))
            .await;
            return;
        }

        if existed {
            state.counters.overwrite_file += 1;
        }
        state.counters.generated_file += 1;
        self.record_file_metric("main", "generated");

        let row_id = self
            .record_history(new_history(
                task,
                task_log_id,
                entry,
                remote_dir,
                Some(url),
                target_display,
                FileCategory::Main,
                None,
                Some(hash),
                ProcessingStatus::Success,
            ))
            .await;
        if let Some(row_id) = row_id {
            state.main_ids.insert((remote_dir.to_string(), stem), row_id);
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn handle_companion(
        &self,
        task: &Task,
        task_log_id: i64,
        state: &mut RunState,
        remote_dir: &str,
        local_dir: &Path,
        entry: &RemoteEntry,
        category: FileCategory,
    ) {
        let label = category.as_str();
        match category {
            FileCategory::Metadata => state.counters.metadata_count += 1,
            FileCategory::Subtitle => state.counters.subtitle_count += 1,
            FileCategory::Main => {}
        }

        let target = local_dir.join(&entry.name);
        let target_display = target.to_string_lossy().into_owned();

        if target.exists() && !task.overwrite {
            match category {
                FileCategory::Metadata => state.counters.metadata_skipped += 1,
                FileCategory::Subtitle => state.counters.subtitle_skipped += 1,
                FileCategory::Main => {}
            }
            self.record_file_metric(label, "skipped");
            return;
        }

        let main_file_id = self
            .resolve_main_id(task, state, remote_dir, &entry.name, category)
            .await;

        let bytes = match self
            .origin
            .fetch(remote_dir, &entry.name, entry.sign.as_deref())
            .await
        {
            Ok(bytes) => bytes,
            Err(err) => {
                state.counters.failed_count += 1;
                self.record_file_metric(label, "failed");
                warn!(error = %format!("{err:#}"), name = %entry.name, "companion fetch failed");
                self.record_history(new_history(
                    task,
                    task_log_id,
                    entry,
                    remote_dir,
                    None,
                    target_display,
                    category,
                    main_file_id,
                    None,
                    ProcessingStatus::Failed,
                ))
                .await;
                return;
            }
        };

        if let Err(err) = write_atomic(&target, &bytes) {
            state.counters.failed_count += 1;
            self.record_file_metric(label, "failed");
            warn!(error = %err, target = %target_display, "failed to write companion");
            self.record_history(new_history(
                task,
                task_log_id,
                entry,
                remote_dir,
                None,
                target_display,
                category,
                main_file_id,
                None,
                ProcessingStatus::Failed,
            ))
            .await;
            return;
        }

        match category {
            FileCategory::Metadata => state.counters.metadata_downloaded += 1,
            FileCategory::Subtitle => state.counters.subtitle_downloaded += 1,
            FileCategory::Main => {}
        }
        self.record_file_metric(label, "downloaded");

        let hash = content_hash(&bytes);
        self.record_history(new_history(
            task,
            task_log_id,
            entry,
            remote_dir,
            None,
            target_display,
            category,
            main_file_id,
            Some(hash),
            ProcessingStatus::Success,
        ))
        .await;
    }

    async fn resolve_main_id(
        &self,
        task: &Task,
        state: &RunState,
        remote_dir: &str,
        companion_name: &str,
        category: FileCategory,
    ) -> Option<i64> {
        let tokens = match category {
            FileCategory::Subtitle => task.subtitle_suffixes(),
            FileCategory::Metadata => task.metadata_suffixes(),
            FileCategory::Main => None,
        }?;
        let stem = companion_stem(companion_name, &tokens)?;

        if let Some(id) = state
            .main_ids
            .get(&(remote_dir.to_string(), stem.clone()))
        {
            return Some(*id);
        }

        // Webhook-delivered companions arrive without a walk, so the pointer
        // row has to come from the store.
        match self.history.list_mains_in_dir(task.id, remote_dir).await {
            Ok(rows) => rows
                .into_iter()
                .find(|row| media_stem(&row.file_name) == stem)
                .map(|row| row.id),
            Err(err) => {
                warn!(error = %err, "main-row lookup failed; companion left unlinked");
                None
            }
        }
    }

    async fn apply_single_entry(
        &self,
        task: &Task,
        task_log_id: i64,
        state: &mut RunState,
        event: &FileChangeEvent,
        name: &str,
    ) {
        let entry = RemoteEntry {
            name: name.to_string(),
            size: event.size,
            modified: None,
            is_dir: false,
            sign: event.sign.clone(),
        };
        let local_dir = event_local_dir(task, &event.source_path);

        match classify(
            name,
            &task.suffix_list(),
            task.subtitle_suffixes().as_deref(),
            task.metadata_suffixes().as_deref(),
        ) {
            Classification::Main => {
                self.handle_main(
                    task,
                    task_log_id,
                    state,
                    &event.source_path,
                    &local_dir,
                    &entry,
                )
                .await;
            }
            Classification::Subtitle => {
                self.handle_companion(
                    task,
                    task_log_id,
                    state,
                    &event.source_path,
                    &local_dir,
                    &entry,
                    FileCategory::Subtitle,
                )
                .await;
            }
            Classification::Metadata => {
                self.handle_companion(
                    task,
                    task_log_id,
                    state,
                    &event.source_path,
                    &local_dir,
                    &entry,
                    FileCategory::Metadata,
                )
                .await;
            }
            Classification::Ignore => {
                state.counters.other_skipped += 1;
            }
        }
    }

    async fn remove_entry(&self, task: &Task, state: &mut RunState, remote_dir: &str, name: &str) {
        let local_dir = event_local_dir(task, remote_dir);
        let target_name = match classify(
            name,
            &task.suffix_list(),
            task.subtitle_suffixes().as_deref(),
            task.metadata_suffixes().as_deref(),
        ) {
            Classification::Main => strm_target_name(name, self.strm.replace_suffix),
            Classification::Ignore => {
                state.counters.other_skipped += 1;
                return;
            }
            _ => name.to_string(),
        };
        let target = local_dir.join(&target_name);
        let target_display = target.to_string_lossy().into_owned();

        let row = match self.history.find_by_target(task.id, &target_display).await {
            Ok(row) => row,
            Err(err) => {
                warn!(error = %err, target = %target_display, "history lookup failed during removal");
                None
            }
        };

        if let Some(row) = row {
            if row.is_main_file {
                match self.history.companions_of(row.id).await {
                    Ok(companions) => {
                        for companion in companions {
                            remove_artifact(Path::new(&companion.target_file_path));
                        }
                    }
                    Err(err) => {
                        warn!(error = %err, "companion listing failed during removal");
                    }
                }
            }
            if let Err(err) = self.history.delete_with_companions(row.id).await {
                warn!(error = %err, target = %target_display, "history delete failed");
            }
        }

        remove_artifact(&target);
        debug!(target = %target_display, "removed artifact for deleted source file");
    }

    async fn record_history(&self, row: NewFileHistory) -> Option<i64> {
        // A missed row costs a later re-check; it never rolls back the
        // filesystem write.
        match self.history.record(&row).await {
            Ok(id) => Some(id),
            Err(err) => {
                warn!(
                    error = %err,
                    target = %row.target_file_path,
                    "failed to record history row"
                );
                None
            }
        }
    }

    fn record_file_metric(&self, category: &str, outcome: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.inc_file(category, outcome);
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn new_history(
    task: &Task,
    task_log_id: i64,
    entry: &RemoteEntry,
    remote_dir: &str,
    source_url: Option<String>,
    target_file_path: String,
    category: FileCategory,
    main_file_id: Option<i64>,
    hash: Option<String>,
    processing_status: ProcessingStatus,
) -> NewFileHistory {
    let file_suffix = match category {
        FileCategory::Main => STRM_SUFFIX.to_string(),
        _ => extension_of(&entry.name),
    };
    NewFileHistory {
        task_id: task.id,
        task_log_id: Some(task_log_id),
        file_name: entry.name.clone(),
        source_path: remote_dir.to_string(),
        source_url,
        target_file_path,
        file_size: i64::try_from(entry.size).unwrap_or(i64::MAX),
        file_type: None,
        file_suffix,
        file_category: category,
        main_file_id,
        hash,
        processing_status,
    }
}

fn remove_artifact(target: &Path) {
    if target.exists()
        && let Err(err) = std::fs::remove_file(target)
    {
        warn!(error = %err, target = %target.display(), "failed to remove artifact");
    }
}

fn event_local_dir(task: &Task, remote_dir: &str) -> PathBuf {
    let relative = remote_dir
        .strip_prefix(task.source_path.trim_end_matches('/'))
        .unwrap_or("")
        .trim_start_matches('/');
    if relative.is_empty() {
        PathBuf::from(&task.target_path)
    } else {
        Path::new(&task.target_path).join(relative)
    }
}

fn join_remote(base: &str, name: &str) -> String {
    let trimmed = base.trim_end_matches('/');
    if trimmed.is_empty() {
        format!("/{name}")
    } else {
        format!("{trimmed}/{name}")
    }
}

fn strm_target_name(name: &str, replace_suffix: bool) -> String {
    if replace_suffix {
        format!("{}.{STRM_SUFFIX}", media_stem(name))
    } else {
        format!("{name}.{STRM_SUFFIX}")
    }
}

fn media_stem(name: &str) -> &str {
    name.rsplit_once('.').map_or(name, |(stem, _)| stem)
}

fn extension_of(name: &str) -> String {
    name.rsplit_once('.')
        .map_or_else(String::new, |(_, ext)| ext.to_ascii_lowercase())
}

fn companion_stem(name: &str, tokens: &[String]) -> Option<String> {
    let lowered = name.to_ascii_lowercase();
    for token in tokens {
        if !token.is_empty() && lowered.ends_with(token.as_str()) && name.len() > token.len() {
            return Some(name[..name.len() - token.len()].to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strm_names_replace_or_append_the_media_suffix() {
        assert_eq!(strm_target_name("a.mp4", true), "a.strm");
        assert_eq!(strm_target_name("a.mp4", false), "a.mp4.strm");
        assert_eq!(strm_target_name("archive.tar.mp4", true), "archive.tar.strm");
    }

    #[test]
    fn companion_stems_strip_the_matched_token() {
        let tokens = vec![".nfo".to_string(), ".zh.srt".to_string()];
        assert_eq!(companion_stem("a.nfo", &tokens), Some("a".to_string()));
        assert_eq!(companion_stem("A.zh.srt", &tokens), Some("A".to_string()));
        assert_eq!(companion_stem("a.txt", &tokens), None);
        assert_eq!(companion_stem(".nfo", &tokens), None);
    }

    #[test]
    fn event_paths_map_under_the_task_target() {
        let task = Task {
            id: 1,
            name: "movies".to_string(),
            media_type: strmforge_core::MediaType::Movie,
            source_path: "/movies".to_string(),
            target_path: "/library/movies".to_string(),
            file_suffix: "mp4".to_string(),
            overwrite: false,
            enabled: true,
            cron: None,
            running: false,
            last_run_at: None,
            download_metadata: false,
            metadata_extensions: None,
            download_subtitle: false,
            subtitle_extensions: None,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        };
        assert_eq!(
            event_local_dir(&task, "/movies"),
            PathBuf::from("/library/movies")
        );
        assert_eq!(
            event_local_dir(&task, "/movies/sub"),
            PathBuf::from("/library/movies/sub")
        );
    }

    #[test]
    fn remote_joins_never_double_slash() {
        assert_eq!(join_remote("/movies", "sub"), "/movies/sub");
        assert_eq!(join_remote("/movies/", "sub"), "/movies/sub");
        assert_eq!(join_remote("/", "movies"), "/movies");
    }
}
