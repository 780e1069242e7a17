//! File-backed reminder store.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{ReminderRecord, StoreError};

/// On-disk document. One JSON file carries both the pending record set
/// and the single last-unseen payload slot.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreDocument {
    #[serde(default)]
    reminders: Vec<ReminderRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_unseen: Option<String>,
}

/// Durable key-value persistence for pending reminders, keyed by id.
///
/// Every mutation is a synchronous full read-modify-write of the record
/// set, serialized by an internal lock. This is acceptable at the
/// expected cardinality of tens of reminders. Mutations return errors
/// so callers can log them, but a failed mutation never stops the
/// in-memory delivery path.
pub struct ReminderStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl ReminderStore {
    /// Open a store backed by the given file. The file is created on
    /// first write; a missing file reads as an empty record set.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Upsert a record. Any existing record with the same id is
    /// replaced, never duplicated.
    pub fn put(
        &self,
        id: i64,
        fire_at: DateTime<Utc>,
        payload: Option<String>,
    ) -> Result<(), StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut doc = self.load()?;
        doc.reminders.retain(|r| r.id != id);
        doc.reminders.push(ReminderRecord::new(id, fire_at, payload));
        self.write(&doc)?;
        debug!(id, %fire_at, "saved reminder record");
        Ok(())
    }

    /// Remove the record with the given id. Removing an absent id is a
    /// no-op.
    pub fn remove(&self, id: i64) -> Result<(), StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut doc = self.load()?;
        let before = doc.reminders.len();
        doc.reminders.retain(|r| r.id != id);
        if doc.reminders.len() != before {
            self.write(&doc)?;
            debug!(id, "removed reminder record");
        }
        Ok(())
    }

    /// List all pending records. Order is unspecified.
    ///
    /// A read failure (for example during a locked boot, before storage
    /// is unlocked) degrades to an empty list rather than an error.
    pub fn list(&self) -> Vec<ReminderRecord> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        match self.load() {
            Ok(doc) => doc.reminders,
            Err(e) => {
                warn!(error = %e, "failed listing reminder records, treating as empty");
                Vec::new()
            }
        }
    }

    /// Overwrite the last-unseen payload slot.
    pub fn save_unseen(&self, payload: &str) -> Result<(), StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut doc = self.load()?;
        doc.last_unseen = Some(payload.to_string());
        self.write(&doc)?;
        debug!("saved last-unseen payload");
        Ok(())
    }

    /// Read and clear the last-unseen payload slot. Returns `None` when
    /// nothing is pending or the store cannot be read.
    pub fn pop_unseen(&self) -> Option<String> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut doc = match self.load() {
            Ok(doc) => doc,
            Err(e) => {
                warn!(error = %e, "failed reading last-unseen slot");
                return None;
            }
        };
        let saved = doc.last_unseen.take();
        if saved.is_some() {
            if let Err(e) = self.write(&doc) {
                warn!(error = %e, "failed clearing last-unseen slot");
            }
        }
        saved
    }

    fn load(&self) -> Result<StoreDocument, StoreError> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(StoreDocument::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Write the document via a temp file and rename, so a crash
    /// mid-write leaves the previous contents intact.
    fn write(&self, doc: &StoreDocument) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(doc)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> ReminderStore {
        ReminderStore::open(dir.path().join("reminders.json"))
    }

    #[test]
    fn missing_file_lists_empty() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        assert!(store.list().is_empty());
    }

    #[test]
    fn put_then_list_round_trips() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let at = Utc::now() + Duration::hours(1);

        store.put(5, at, Some("payload".into())).unwrap();

        let records = store.list();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, 5);
        assert_eq!(records[0].fire_at, at);
        assert_eq!(records[0].payload.as_deref(), Some("payload"));
    }

    #[test]
    fn put_same_id_replaces_not_duplicates() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let t1 = Utc::now() + Duration::hours(1);
        let t2 = Utc::now() + Duration::hours(2);

        store.put(5, t1, Some("first".into())).unwrap();
        store.put(5, t2, Some("second".into())).unwrap();

        let records = store.list();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].fire_at, t2);
        assert_eq!(records[0].payload.as_deref(), Some("second"));
    }

    #[test]
    fn remove_absent_id_is_noop() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.put(1, Utc::now(), None).unwrap();

        store.remove(99).unwrap();

        assert_eq!(store.list().len(), 1);
    }

    #[test]
    fn remove_deletes_only_matching_id() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.put(1, Utc::now(), None).unwrap();
        store.put(2, Utc::now(), None).unwrap();

        store.remove(1).unwrap();

        let records = store.list();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, 2);
    }

    #[test]
    fn records_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("reminders.json");
        let at = Utc::now() + Duration::minutes(30);

        ReminderStore::open(&path).put(9, at, Some("p".into())).unwrap();

        let reopened = ReminderStore::open(&path);
        let records = reopened.list();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, 9);
    }

    #[test]
    fn corrupt_file_lists_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("reminders.json");
        fs::write(&path, b"not json at all").unwrap();

        let store = ReminderStore::open(&path);
        assert!(store.list().is_empty());
        assert!(store.pop_unseen().is_none());
    }

    #[test]
    fn pop_unseen_returns_exactly_once() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        assert!(store.pop_unseen().is_none());

        store.save_unseen("{\"task_id\":\"t1\"}").unwrap();
        assert_eq!(store.pop_unseen().as_deref(), Some("{\"task_id\":\"t1\"}"));
        assert!(store.pop_unseen().is_none());
    }

    #[test]
    fn save_unseen_overwrites_previous_value() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        store.save_unseen("old").unwrap();
        store.save_unseen("new").unwrap();

        assert_eq!(store.pop_unseen().as_deref(), Some("new"));
        assert!(store.pop_unseen().is_none());
    }

    #[test]
    fn unseen_slot_does_not_disturb_records() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.put(4, Utc::now(), None).unwrap();

        store.save_unseen("payload").unwrap();
        store.pop_unseen();

        assert_eq!(store.list().len(), 1);
    }

    proptest! {
        // Upserting any sequence of ids leaves at most one record per id.
        #[test]
        fn upserts_never_duplicate_ids(ids in proptest::collection::vec(0i64..8, 1..40)) {
            let dir = TempDir::new().unwrap();
            let store = store_in(&dir);
            let at = Utc::now();

            for id in &ids {
                store.put(*id, at, None).unwrap();
            }

            let records = store.list();
            let mut seen: Vec<i64> = records.iter().map(|r| r.id).collect();
            seen.sort_unstable();
            let before = seen.len();
            seen.dedup();
            prop_assert_eq!(seen.len(), before, "duplicate ids in store");
        }

        // put then remove always leaves the store without that id.
        #[test]
        fn put_remove_clears_id(id in 0i64..1000) {
            let dir = TempDir::new().unwrap();
            let store = store_in(&dir);
            store.put(id, Utc::now(), Some("x".into())).unwrap();
            store.remove(id).unwrap();
            prop_assert!(store.list().iter().all(|r| r.id != id));
        }
    }
}
