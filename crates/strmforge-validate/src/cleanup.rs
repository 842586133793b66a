//! Administrator cleanup of invalid pointer artifacts.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use strmforge_data::HistoryStore;

use crate::error::ValidationError;

/// Outcome of one cleanup pass.
#[derive(Debug, Clone, Copy, Default, serde::Serialize, PartialEq, Eq)]
pub struct CleanupReport {
    /// Files removed from disk.
    pub removed_files: u64,
    /// History rows removed (companions included).
    pub removed_rows: u64,
    /// Empty parent directories pruned.
    pub pruned_dirs: u64,
}

/// Delete on-disk artifacts whose rows are marked invalid, drop the rows,
/// and prune parent directories left empty.
///
/// # Errors
///
/// Returns an error when the history store fails; per-file filesystem
/// failures are logged and skipped.
pub(crate) async fn run(history: &HistoryStore) -> Result<CleanupReport, ValidationError> {
    let rows = history.invalid_rows().await?;
    let mut report = CleanupReport::default();
    let mut parents: BTreeSet<PathBuf> = BTreeSet::new();

    for row in rows {
        let target = PathBuf::from(&row.target_file_path);
        if target.exists() {
            match std::fs::remove_file(&target) {
                Ok(()) => {
                    report.removed_files += 1;
                    if let Some(parent) = target.parent() {
                        parents.insert(parent.to_path_buf());
                    }
                }
                Err(err) => {
                    warn!(error = %err, target = %target.display(), "cleanup could not remove file");
                    continue;
                }
            }
        }

        let companions = history.companions_of(row.id).await?;
        for companion in &companions {
            let companion_path = Path::new(&companion.target_file_path);
            if companion_path.exists() {
                match std::fs::remove_file(companion_path) {
                    Ok(()) => report.removed_files += 1,
                    Err(err) => {
                        warn!(
                            error = %err,
                            target = %companion_path.display(),
                            "cleanup could not remove companion"
                        );
                    }
                }
            }
        }

        history.delete_with_companions(row.id).await?;
        report.removed_rows += 1 + u64::try_from(companions.len()).unwrap_or_default();
    }

    for parent in parents {
        report.pruned_dirs += prune_upwards(&parent);
    }

    info!(
        removed_files = report.removed_files,
        removed_rows = report.removed_rows,
        pruned_dirs = report.pruned_dirs,
        "cleanup finished"
    );
    Ok(report)
}

// Walk upwards removing directories as long as they are empty.
fn prune_upwards(start: &Path) -> u64 {
    let mut pruned = 0;
    let mut current = Some(start.to_path_buf());
    while let Some(dir) = current {
        let is_empty = match std::fs::read_dir(&dir) {
            Ok(mut entries) => entries.next().is_none(),
            Err(_) => false,
        };
        if !is_empty {
            break;
        }
        if std::fs::remove_dir(&dir).is_err() {
            break;
        }
        pruned += 1;
        current = dir.parent().map(Path::to_path_buf);
    }
    pruned
}
