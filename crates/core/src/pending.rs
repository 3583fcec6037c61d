//! Persistence of the pending-conflict sidecar.
//!
//! The sidecar holds the full [`ConflictReport`] as pretty JSON. Its presence
//! means a merge is in progress. Writes go to a temp file in the same
//! directory and are renamed into place.

use std::io::Write;

use tracing::{debug, info, warn};

use crate::conflict::ConflictReport;
use crate::errors::{ConflictError, SyncError};
use crate::store::Store;

/// Load the pending report. A missing or unreadable sidecar yields `None`.
pub(crate) fn load(store: &Store) -> Option<ConflictReport> {
    let path = store.pending_path();
    let text = match std::fs::read_to_string(&path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "cannot read pending conflicts; ignoring");
            return None;
        }
    };
    match serde_json::from_str::<ConflictReport>(&text) {
        Ok(report) => {
            debug!(conflict_id = %report.conflict_id, "loaded pending conflicts");
            Some(report)
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "pending conflicts file is corrupt; ignoring");
            None
        }
    }
}

/// Atomically write `report` as the sidecar.
pub(crate) fn save(store: &Store, report: &ConflictReport) -> Result<(), SyncError> {
    let path = store.pending_path();
    let dir = store.store_dir();
    std::fs::create_dir_all(&dir).map_err(|source| SyncError::StoreIo {
        path: dir.display().to_string(),
        source,
    })?;
    store.ensure_gitignore()?;

    let json = serde_json::to_string_pretty(report).map_err(ConflictError::from)?;
    let mut tmp = tempfile::NamedTempFile::new_in(&dir)
        .map_err(|e| SyncError::PendingWrite(e.to_string()))?;
    tmp.write_all(json.as_bytes())
        .and_then(|_| tmp.write_all(b"\n"))
        .map_err(|e| SyncError::PendingWrite(e.to_string()))?;
    tmp.persist(&path)
        .map_err(|e| SyncError::PendingWrite(e.to_string()))?;

    info!(
        conflict_id = %report.conflict_id,
        unresolved = report.unresolved_count(),
        "saved pending conflicts"
    );
    Ok(())
}

/// Remove the sidecar; a missing file is not an error.
pub(crate) fn delete(store: &Store) -> Result<(), SyncError> {
    let path = store.pending_path();
    match std::fs::remove_file(&path) {
        Ok(()) => {
            debug!(path = %path.display(), "removed pending conflicts");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(SyncError::StoreIo {
            path: path.display().to_string(),
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::conflict::ConflictEntry;

    fn store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path(), StoreConfig::default());
        (dir, store)
    }

    #[test]
    fn test_save_load_delete() {
        let (_dir, store) = store();
        assert!(load(&store).is_none());

        let mut report = ConflictReport::new();
        report.push(ConflictEntry::new("a.md", "", "o", "t"));
        save(&store, &report).unwrap();

        let loaded = load(&store).unwrap();
        assert_eq!(loaded, report);
        let gitignore = std::fs::read_to_string(store.store_dir().join(".gitignore")).unwrap();
        assert!(gitignore.contains("/.pending-conflicts.json"));

        delete(&store).unwrap();
        assert!(load(&store).is_none());
        delete(&store).unwrap();
    }

    #[test]
    fn test_corrupt_sidecar_is_ignored() {
        let (_dir, store) = store();
        std::fs::create_dir_all(store.store_dir()).unwrap();
        std::fs::write(store.pending_path(), "{not json").unwrap();
        assert!(load(&store).is_none());
    }
}
