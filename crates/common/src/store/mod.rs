//! File-backed record store
//!
//! Directory layout:
//! ```text
//! {data_dir}/
//! ├── documents.json      # one JSON array per collection
//! ├── users.json
//! ├── sessions.json
//! └── confirmations.json
//! ```
//!
//! A [`Collection`] holds its records in memory and rewrites the whole file
//! on every mutation. Lookups are linear scans. The rewrite goes through a
//! sibling temp file and a rename, so a crash leaves either the previous or
//! the new list on disk; nothing else is guaranteed.

pub mod documents;

pub use documents::{DeleteMode, DocumentStore, ReconcileReport};

use chrono::{DateTime, Duration, Utc};
use serde::{de::DeserializeOwned, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::errors::{AppError, Result};
use crate::metrics;
use crate::models::Timestamps;

/// Carries the id an upsert is addressed to
pub trait Patch {
    fn id(&self) -> &str;
}

/// A record type that can live in a [`Collection`]
pub trait Record: Clone + Serialize + DeserializeOwned + Send + Sync {
    /// Partial update applied on upsert
    type Patch: Patch;

    /// Name used in logs and not-found errors
    const KIND: &'static str;

    fn id(&self) -> &str;

    fn stamps(&self) -> &Timestamps;

    fn stamps_mut(&mut self) -> &mut Timestamps;

    /// Build a new record from an upsert that matched nothing
    fn from_patch(patch: Self::Patch, stamps: Timestamps) -> Result<Self>;

    /// Merge an upsert into the stored record
    fn apply(&mut self, patch: Self::Patch) -> Result<()>;
}

/// One persisted list of records
#[derive(Debug)]
pub struct Collection<T: Record> {
    name: String,
    path: PathBuf,
    entries: Vec<T>,
}

impl<T: Record> Collection<T> {
    /// Open `<root>/<name>.json`, creating the directory and an empty list
    /// if needed, and load it.
    pub fn open(root: &Path, name: &str) -> Result<Self> {
        fs::create_dir_all(root)?;

        let path = root.join(format!("{}.json", name));
        if !path.exists() {
            fs::write(&path, "[]")?;
            info!(collection = name, path = %path.display(), "Created empty collection");
        }

        let mut collection = Self {
            name: name.to_string(),
            path,
            entries: Vec::new(),
        };
        collection.load()?;
        Ok(collection)
    }

    /// Replace in-memory state with the file contents
    pub fn load(&mut self) -> Result<()> {
        let raw = fs::read(&self.path)?;
        self.entries = serde_json::from_slice(&raw)?;
        debug!(collection = %self.name, count = self.entries.len(), "Collection loaded");
        Ok(())
    }

    /// Rewrite the whole file
    pub fn save(&self) -> Result<()> {
        let json = serde_json::to_vec(&self.entries)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, &json)?;
        fs::rename(&tmp, &self.path)?;

        metrics::record_store_write(&self.name);
        debug!(collection = %self.name, count = self.entries.len(), bytes = json.len(), "Collection saved");
        Ok(())
    }

    /// Final save; consumes the collection
    pub fn close(self) -> Result<()> {
        self.save()?;
        info!(collection = %self.name, "Collection closed");
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn all(&self) -> &[T] {
        &self.entries
    }

    /// Mutable access for batch passes; callers persist with [`save`](Self::save)
    pub fn all_mut(&mut self) -> &mut [T] {
        &mut self.entries
    }

    pub fn get(&self, id: &str) -> Option<&T> {
        self.entries.iter().find(|e| e.id() == id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut T> {
        self.entries.iter_mut().find(|e| e.id() == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// First record matching `predicate`
    pub fn find<P>(&self, predicate: P) -> Option<&T>
    where
        P: Fn(&T) -> bool,
    {
        self.entries.iter().find(|e| predicate(e))
    }

    /// Same-id record: merge and bump `modified`. Otherwise: create with
    /// `created == modified == now` and append. Persists either way.
    pub fn upsert(&mut self, patch: T::Patch) -> Result<T> {
        if patch.id().is_empty() {
            return Err(AppError::MissingField {
                field: "id".to_string(),
            });
        }

        let now = Utc::now();
        let record = match self.entries.iter().position(|e| e.id() == patch.id()) {
            Some(idx) => {
                let existing = &mut self.entries[idx];
                let modified = next_modified(existing.stamps().modified, now);
                existing.apply(patch)?;
                existing.stamps_mut().modified = modified;
                debug!(collection = %self.name, id = existing.id(), "Record updated");
                existing.clone()
            }
            None => {
                let record = T::from_patch(patch, Timestamps::at(now))?;
                debug!(collection = %self.name, id = record.id(), "Record inserted");
                self.entries.push(record.clone());
                record
            }
        };

        self.save()?;
        Ok(record)
    }

    /// Remove a record by id and persist
    pub fn remove(&mut self, id: &str) -> Result<T> {
        let idx = self
            .entries
            .iter()
            .position(|e| e.id() == id)
            .ok_or_else(|| AppError::NotFound {
                resource_type: T::KIND.to_string(),
                id: id.to_string(),
            })?;

        let record = self.entries.remove(idx);
        self.save()?;
        debug!(collection = %self.name, id, "Record removed");
        Ok(record)
    }

    /// Drop every record matching `predicate`; persists only if something went
    pub fn retain<P>(&mut self, predicate: P) -> Result<usize>
    where
        P: Fn(&T) -> bool,
    {
        let before = self.entries.len();
        self.entries.retain(|e| predicate(e));
        let removed = before - self.entries.len();
        if removed > 0 {
            self.save()?;
        }
        Ok(removed)
    }
}

/// `now`, unless the clock has not moved past `previous`
fn next_modified(previous: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
    if now > previous {
        now
    } else {
        previous + Duration::microseconds(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Document, DocumentPatch};
    use tempfile::TempDir;

    fn open(dir: &TempDir) -> Collection<Document> {
        Collection::open(dir.path(), "documents").unwrap()
    }

    #[test]
    fn test_open_creates_empty_file() {
        let dir = TempDir::new().unwrap();
        let collection = open(&dir);
        assert!(collection.is_empty());
        assert_eq!(fs::read_to_string(dir.path().join("documents.json")).unwrap(), "[]");
    }

    #[test]
    fn test_open_creates_missing_root() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("a").join("b");
        let collection: Collection<Document> = Collection::open(&nested, "documents").unwrap();
        assert!(collection.path().exists());
    }

    #[test]
    fn test_upsert_insert_sets_both_stamps() {
        let dir = TempDir::new().unwrap();
        let mut collection = open(&dir);

        let doc = collection.upsert(DocumentPatch::new("aaaaa")).unwrap();
        assert_eq!(doc.stamps.created, doc.stamps.modified);
        assert_eq!(collection.len(), 1);
    }

    #[test]
    fn test_upsert_merges_and_modified_strictly_increases() {
        let dir = TempDir::new().unwrap();
        let mut collection = open(&dir);

        let mut first = DocumentPatch::new("aaaaa");
        first.title = Some("Hidden Figures".into());
        first.author = Some("Shetterly".into());
        let inserted = collection.upsert(first).unwrap();

        let mut previous = inserted.stamps.modified;
        for year in ["2016", "2017", "2018"] {
            let mut patch = DocumentPatch::new("aaaaa");
            patch.year = Some(year.into());
            let updated = collection.upsert(patch).unwrap();

            assert!(updated.stamps.modified > previous);
            assert_eq!(updated.stamps.created, inserted.stamps.created);
            assert_eq!(updated.title.as_deref(), Some("Hidden Figures"));
            assert_eq!(updated.author.as_deref(), Some("Shetterly"));
            assert_eq!(updated.year.as_deref(), Some(year));
            previous = updated.stamps.modified;
        }

        assert_eq!(collection.len(), 1);
    }

    #[test]
    fn test_upsert_persists_full_list() {
        let dir = TempDir::new().unwrap();
        let mut collection = open(&dir);
        collection.upsert(DocumentPatch::new("aaaaa")).unwrap();
        collection.upsert(DocumentPatch::new("bbbbb")).unwrap();

        let reopened = open(&dir);
        assert_eq!(reopened.len(), 2);
        assert!(reopened.contains("aaaaa"));
        assert!(reopened.contains("bbbbb"));
        assert!(!dir.path().join("documents.json.tmp").exists());
    }

    #[test]
    fn test_upsert_rejects_empty_id() {
        let dir = TempDir::new().unwrap();
        let mut collection = open(&dir);
        let err = collection.upsert(DocumentPatch::new("")).unwrap_err();
        assert!(matches!(err, AppError::MissingField { .. }));
    }

    #[test]
    fn test_remove() {
        let dir = TempDir::new().unwrap();
        let mut collection = open(&dir);
        collection.upsert(DocumentPatch::new("aaaaa")).unwrap();

        collection.remove("aaaaa").unwrap();
        assert!(collection.get("aaaaa").is_none());
        assert!(collection.remove("aaaaa").unwrap_err().is_not_found());
        assert!(open(&dir).is_empty());
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("documents.json"), "[{").unwrap();
        let result: Result<Collection<Document>> = Collection::open(dir.path(), "documents");
        assert!(matches!(result, Err(AppError::Serialization(_))));
    }

    #[test]
    fn test_next_modified_never_goes_backwards() {
        let now = Utc::now();
        assert_eq!(next_modified(now - Duration::seconds(1), now), now);
        assert_eq!(next_modified(now, now), now + Duration::microseconds(1));
    }
}
