//! Document catalog on top of [`Collection`]
//!
//! Adds what a plain collection does not know about: the artifact directory
//! holding `<id>.pdf` and `<id>.jpg`, content-hash lookup, catalog search,
//! missing-file and duplicate flags, and id generation.

use regex::{Regex, RegexBuilder};
use serde::Serialize;
use std::collections::HashSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

use super::Collection;
use crate::dedup;
use crate::errors::{AppError, Result};
use crate::ids;
use crate::metrics;
use crate::models::{Document, DocumentPatch};

/// How [`DocumentStore::delete`] treats the record and its file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteMode {
    /// Remove the artifact, its thumbnail and the record
    Hard,
    /// Keep everything, mark the record as pending deletion
    Soft { requested_by: String },
}

impl DeleteMode {
    pub fn label(&self) -> &'static str {
        match self {
            DeleteMode::Hard => "hard",
            DeleteMode::Soft { .. } => "soft",
        }
    }
}

/// Outcome of the startup consistency pass
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileReport {
    pub total: usize,
    pub missing: Vec<String>,
    pub duplicates: Vec<String>,
}

#[derive(Debug)]
pub struct DocumentStore {
    records: Collection<Document>,
    artifact_dir: PathBuf,
}

impl DocumentStore {
    /// Open `<data_dir>/documents.json` and make sure the artifact
    /// directory exists.
    pub fn open(data_dir: &Path, artifact_dir: &Path) -> Result<Self> {
        fs::create_dir_all(artifact_dir)?;
        let records = Collection::open(data_dir, "documents")?;

        info!(
            documents = records.len(),
            artifact_dir = %artifact_dir.display(),
            "Document store opened"
        );

        Ok(Self {
            records,
            artifact_dir: artifact_dir.to_path_buf(),
        })
    }

    pub fn close(self) -> Result<()> {
        self.records.close()
    }

    pub fn save(&self) -> Result<()> {
        self.records.save()
    }

    /// Discard in-memory state and re-read `documents.json`
    pub fn load(&mut self) -> Result<()> {
        self.records.load()
    }

    pub fn artifact_dir(&self) -> &Path {
        &self.artifact_dir
    }

    /// Where the PDF for `id` lives
    pub fn artifact_path(&self, id: &str) -> PathBuf {
        self.artifact_dir.join(Document::filename_for(id))
    }

    /// Where the thumbnail for `id` lives
    pub fn thumbnail_path(&self, id: &str) -> PathBuf {
        self.artifact_dir.join(Document::thumbnail_for(id))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn all(&self) -> &[Document] {
        self.records.all()
    }

    pub fn get(&self, id: &str) -> Option<&Document> {
        self.records.get(id)
    }

    /// Like [`get`](Self::get) but a miss is an error
    pub fn require(&self, id: &str) -> Result<&Document> {
        self.records
            .get(id)
            .ok_or_else(|| AppError::document_not_found(id))
    }

    /// First document with this content hash. With duplicates present,
    /// which one is returned is unspecified.
    pub fn get_by_hash(&self, hash: &str) -> Option<&Document> {
        self.records
            .find(|d| d.content_hash.as_deref() == Some(hash))
    }

    /// Case-insensitive pattern search over author, title, id, year and
    /// content hash, ordered by `author + title`.
    ///
    /// The query is a regular expression; one that does not compile is
    /// matched as a literal. `None` or an empty query matches everything.
    /// Soft-deleted documents are left out unless `include_deleted`.
    pub fn search(&self, query: Option<&str>, include_deleted: bool) -> Result<Vec<Document>> {
        let start = Instant::now();
        let matcher = match query.map(str::trim).filter(|q| !q.is_empty()) {
            Some(q) => Some(compile_query(q)?),
            None => None,
        };

        let mut results: Vec<Document> = self
            .records
            .all()
            .iter()
            .filter(|d| include_deleted || !d.is_soft_deleted())
            .filter(|d| match &matcher {
                Some(re) => d.searchable_fields().any(|f| re.is_match(f)),
                None => true,
            })
            .cloned()
            .collect();

        results.sort_by_cached_key(|d| {
            let key = d.sort_key();
            (key.to_lowercase(), key, d.id.clone())
        });

        metrics::record_search(start.elapsed().as_secs_f64(), results.len());
        debug!(
            query = query.unwrap_or_default(),
            include_deleted,
            results = results.len(),
            "Catalog searched"
        );

        Ok(results)
    }

    /// Insert or merge. `filename` always follows the id.
    pub fn upsert(&mut self, patch: DocumentPatch) -> Result<Document> {
        let doc = self.records.upsert(patch)?;
        info!(id = %doc.id, title = doc.title.as_deref().unwrap_or_default(), "Document saved");
        Ok(doc)
    }

    /// Store uploaded bytes as the artifact for `id`
    pub fn write_artifact(&self, id: &str, bytes: &[u8]) -> Result<PathBuf> {
        let path = self.artifact_path(id);
        let tmp = path.with_extension("pdf.part");
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &path)?;
        debug!(id, bytes = bytes.len(), path = %path.display(), "Artifact written");
        Ok(path)
    }

    /// Remove the artifact for `id` if present. Used to undo a
    /// [`write_artifact`](Self::write_artifact) whose record was not saved.
    pub fn discard_artifact(&self, id: &str) -> Result<()> {
        match fs::remove_file(self.artifact_path(id)) {
            Ok(()) => {
                warn!(id, "Artifact discarded");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete a document in the requested mode.
    ///
    /// Hard: an artifact that is already gone is logged and tolerated; any
    /// other file-system error is returned before the record is touched.
    pub fn delete(&mut self, id: &str, mode: DeleteMode) -> Result<Document> {
        self.require(id)?;

        let doc = match &mode {
            DeleteMode::Hard => {
                let artifact = self.artifact_path(id);
                match fs::remove_file(&artifact) {
                    Ok(()) => {}
                    Err(e) if e.kind() == ErrorKind::NotFound => {
                        warn!(id, path = %artifact.display(), "Artifact already absent");
                    }
                    Err(e) => return Err(e.into()),
                }

                let thumbnail = self.thumbnail_path(id);
                if let Err(e) = fs::remove_file(&thumbnail) {
                    if e.kind() != ErrorKind::NotFound {
                        warn!(id, error = %e, "Failed to remove thumbnail");
                    }
                }

                self.records.remove(id)?
            }
            DeleteMode::Soft { requested_by } => {
                let doc = self
                    .records
                    .get_mut(id)
                    .ok_or_else(|| AppError::document_not_found(id))?;
                doc.flags.delete = Some(requested_by.clone());
                let doc = doc.clone();
                self.records.save()?;
                doc
            }
        };

        metrics::record_delete(mode.label());
        info!(id, mode = mode.label(), "Document deleted");
        Ok(doc)
    }

    /// Clear a pending soft delete
    pub fn restore(&mut self, id: &str) -> Result<Document> {
        let doc = self
            .records
            .get_mut(id)
            .ok_or_else(|| AppError::document_not_found(id))?;
        doc.flags.delete = None;
        let doc = doc.clone();
        self.records.save()?;
        info!(id, "Document restored");
        Ok(doc)
    }

    /// Set or clear `flags.missing` from the artifact's presence. Returns
    /// whether the file is absent. Persists only when the flag changed.
    pub fn check_missing(&mut self, id: &str) -> Result<bool> {
        let (absent, changed) = self.refresh_missing(id)?;
        if changed {
            self.records.save()?;
        }
        Ok(absent)
    }

    fn refresh_missing(&mut self, id: &str) -> Result<(bool, bool)> {
        let absent = !self.artifact_path(id).exists();
        let doc = self
            .records
            .get_mut(id)
            .ok_or_else(|| AppError::document_not_found(id))?;

        let changed = doc.flags.missing != absent;
        doc.flags.missing = absent;
        if changed {
            if absent {
                warn!(id, "Artifact missing");
            } else {
                info!(id, "Artifact present again");
            }
        }
        Ok((absent, changed))
    }

    /// Short random id not held by any live document
    pub fn new_id(&self) -> Result<String> {
        ids::generate_id(|candidate| self.records.contains(candidate))
    }

    /// Recompute duplicate flags over every document and persist the full
    /// set, changed or not. Returns the flagged ids.
    pub fn check_duplicates(&mut self) -> Result<Vec<String>> {
        let flagged = dedup::detect_duplicates(self.records.all_mut());
        self.records.save()?;

        metrics::set_duplicates(flagged.len());
        if !flagged.is_empty() {
            info!(count = flagged.len(), ids = ?flagged, "Duplicate documents flagged");
        }
        Ok(flagged)
    }

    /// Startup pass: missing-file check for every record, then one
    /// duplicate pass (which persists).
    pub fn reconcile(&mut self) -> Result<ReconcileReport> {
        let ids: Vec<String> = self.records.all().iter().map(|d| d.id.clone()).collect();

        let mut missing = Vec::new();
        for id in &ids {
            let (absent, _) = self.refresh_missing(id)?;
            if absent {
                missing.push(id.clone());
            }
        }
        metrics::set_missing(missing.len());

        let duplicates = self.check_duplicates()?;

        let report = ReconcileReport {
            total: ids.len(),
            missing,
            duplicates,
        };
        info!(
            total = report.total,
            missing = report.missing.len(),
            duplicates = report.duplicates.len(),
            "Document store reconciled"
        );
        Ok(report)
    }

    /// Artifact files with no matching record. Report only.
    pub fn orphans(&self) -> Result<Vec<String>> {
        let known: HashSet<&str> = self.records.all().iter().map(|d| d.filename.as_str()).collect();

        let mut orphans = Vec::new();
        for entry in fs::read_dir(&self.artifact_dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.ends_with(".pdf") && !known.contains(name.as_str()) {
                orphans.push(name);
            }
        }
        orphans.sort();
        Ok(orphans)
    }
}

fn compile_query(query: &str) -> Result<Regex> {
    RegexBuilder::new(query)
        .case_insensitive(true)
        .build()
        .or_else(|_| {
            RegexBuilder::new(&regex::escape(query))
                .case_insensitive(true)
                .build()
        })
        .map_err(|e| AppError::InvalidFormat {
            message: format!("Unusable search query: {}", e),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;
    use tokio::sync::RwLock;
    use tokio_test::assert_ok;

    fn open(dir: &TempDir) -> DocumentStore {
        DocumentStore::open(&dir.path().join("db"), &dir.path().join("pdf")).unwrap()
    }

    fn patch(id: &str, author: &str, title: &str) -> DocumentPatch {
        let mut patch = DocumentPatch::new(id);
        patch.author = Some(author.into());
        patch.title = Some(title.into());
        patch
    }

    fn with_hash(mut patch: DocumentPatch, hash: &str) -> DocumentPatch {
        patch.content_hash = Some(hash.into());
        patch
    }

    #[test]
    fn test_state_survives_close_and_reload() {
        let dir = TempDir::new().unwrap();
        let mut store = open(&dir);
        store.upsert(patch("aaaaa", "A", "One")).unwrap();
        store.close().unwrap();

        let mut store = open(&dir);
        assert_eq!(store.len(), 1);
        store.upsert(patch("bbbbb", "B", "Two")).unwrap();

        let mut other = open(&dir);
        other.upsert(patch("ccccc", "C", "Three")).unwrap();
        store.load().unwrap();
        assert!(store.get("ccccc").is_some());
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_get_and_get_by_hash() {
        let dir = TempDir::new().unwrap();
        let mut store = open(&dir);
        store.upsert(with_hash(patch("aaaaa", "A", "One"), "h1")).unwrap();
        store.upsert(with_hash(patch("bbbbb", "B", "Two"), "h2")).unwrap();

        assert_eq!(store.get("bbbbb").unwrap().title.as_deref(), Some("Two"));
        assert!(store.get("zzzzz").is_none());
        assert_eq!(store.get_by_hash("h1").unwrap().id, "aaaaa");
        assert!(store.get_by_hash("h3").is_none());
        assert!(store.require("zzzzz").unwrap_err().is_not_found());
    }

    #[test]
    fn test_search_is_case_insensitive_substring() {
        let dir = TempDir::new().unwrap();
        let mut store = open(&dir);
        store.upsert(patch("aaaaa", "Shetterly", "Hidden Figures")).unwrap();
        store.upsert(patch("bbbbb", "Sobel", "Longitude")).unwrap();

        for query in ["hidden", "FIGUR", "shett"] {
            let results = store.search(Some(query), false).unwrap();
            assert_eq!(results.len(), 1, "query {query}");
            assert_eq!(results[0].id, "aaaaa");
        }
    }

    #[test]
    fn test_search_folds_non_ascii_case() {
        let dir = TempDir::new().unwrap();
        let mut store = open(&dir);
        store.upsert(patch("aaaaa", "Cankar", "Čas in Življenje")).unwrap();

        for query in ["čas", "ČAS", "ŽIVLJ", "življenje"] {
            assert_eq!(store.search(Some(query), false).unwrap().len(), 1, "query {query}");
        }
    }

    #[test]
    fn test_search_matches_id_year_and_hash() {
        let dir = TempDir::new().unwrap();
        let mut store = open(&dir);
        let mut p = with_hash(patch("c0ffe", "X", "Y"), "deadbeef");
        p.year = Some("1999".into());
        store.upsert(p).unwrap();

        assert_eq!(store.search(Some("C0FFE"), false).unwrap().len(), 1);
        assert_eq!(store.search(Some("1999"), false).unwrap().len(), 1);
        assert_eq!(store.search(Some("DEADBEEF"), false).unwrap().len(), 1);
        assert!(store.search(Some("2000"), false).unwrap().is_empty());
    }

    #[test]
    fn test_search_orders_by_author_then_title() {
        let dir = TempDir::new().unwrap();
        let mut store = open(&dir);
        store.upsert(patch("aaaaa", "Zweig", "Schachnovelle")).unwrap();
        store.upsert(patch("bbbbb", "austen", "Persuasion")).unwrap();
        store.upsert(patch("ccccc", "Austen", "Emma")).unwrap();

        let ids: Vec<String> = store.search(None, false).unwrap().into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec!["ccccc", "bbbbb", "aaaaa"]);
    }

    #[test]
    fn test_search_regex_and_literal_fallback() {
        let dir = TempDir::new().unwrap();
        let mut store = open(&dir);
        store.upsert(patch("aaaaa", "Knuth", "TAOCP (vol. 1)")).unwrap();
        store.upsert(patch("bbbbb", "Kernighan", "C")).unwrap();

        assert_eq!(store.search(Some("^k(nu|er)"), false).unwrap().len(), 2);
        // Unbalanced paren is not a valid pattern; matched literally instead.
        assert_eq!(store.search(Some("(vol"), false).unwrap().len(), 1);
        assert_eq!(store.search(Some(""), false).unwrap().len(), 2);
    }

    #[test]
    fn test_search_hides_soft_deleted_unless_requested() {
        let dir = TempDir::new().unwrap();
        let mut store = open(&dir);
        store.upsert(patch("aaaaa", "A", "Kept")).unwrap();
        store.upsert(patch("bbbbb", "B", "Flagged")).unwrap();
        store
            .delete("bbbbb", DeleteMode::Soft { requested_by: "reader@example.org".into() })
            .unwrap();

        assert_eq!(store.search(None, false).unwrap().len(), 1);
        assert_eq!(store.search(None, true).unwrap().len(), 2);
    }

    #[test]
    fn test_discard_artifact() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        let path = store.write_artifact("aaaaa", b"%PDF-1.4").unwrap();
        assert!(path.exists());

        assert_ok!(store.discard_artifact("aaaaa"));
        assert!(!path.exists());
        assert_ok!(store.discard_artifact("aaaaa"));
    }

    #[test]
    fn test_hard_delete_removes_record_and_files() {
        let dir = TempDir::new().unwrap();
        let mut store = open(&dir);
        store.upsert(patch("aaaaa", "A", "Gone")).unwrap();
        let artifact = store.write_artifact("aaaaa", b"%PDF-1.4").unwrap();
        fs::write(store.thumbnail_path("aaaaa"), b"jpg").unwrap();

        store.delete("aaaaa", DeleteMode::Hard).unwrap();

        assert!(store.get("aaaaa").is_none());
        assert!(!artifact.exists());
        assert!(!store.thumbnail_path("aaaaa").exists());
        assert!(open(&dir).get("aaaaa").is_none());
    }

    #[test]
    fn test_hard_delete_tolerates_absent_artifact() {
        let dir = TempDir::new().unwrap();
        let mut store = open(&dir);
        store.upsert(patch("aaaaa", "A", "No file")).unwrap();

        assert_ok!(store.delete("aaaaa", DeleteMode::Hard));
        assert!(store.get("aaaaa").is_none());
    }

    #[test]
    fn test_delete_unknown_id() {
        let dir = TempDir::new().unwrap();
        let mut store = open(&dir);
        let err = store.delete("zzzzz", DeleteMode::Hard).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_soft_delete_keeps_file_and_restore_clears_flag() {
        let dir = TempDir::new().unwrap();
        let mut store = open(&dir);
        store.upsert(patch("aaaaa", "A", "Pending")).unwrap();
        let artifact = store.write_artifact("aaaaa", b"%PDF-1.4").unwrap();

        let doc = store
            .delete("aaaaa", DeleteMode::Soft { requested_by: "u@example.org".into() })
            .unwrap();
        assert_eq!(doc.flags.delete.as_deref(), Some("u@example.org"));
        assert!(artifact.exists());

        let restored = store.restore("aaaaa").unwrap();
        assert!(restored.flags.delete.is_none());
    }

    #[test]
    fn test_check_missing_follows_file_presence() {
        let dir = TempDir::new().unwrap();
        let mut store = open(&dir);
        store.upsert(patch("aaaaa", "A", "Flip")).unwrap();

        assert!(store.check_missing("aaaaa").unwrap());
        assert!(store.get("aaaaa").unwrap().flags.missing);

        store.write_artifact("aaaaa", b"%PDF-1.4").unwrap();
        assert!(!store.check_missing("aaaaa").unwrap());
        assert!(!store.get("aaaaa").unwrap().flags.missing);

        fs::remove_file(store.artifact_path("aaaaa")).unwrap();
        assert!(store.check_missing("aaaaa").unwrap());
        assert!(open(&dir).get("aaaaa").unwrap().flags.missing);
    }

    #[test]
    fn test_check_missing_unknown_id() {
        let dir = TempDir::new().unwrap();
        let mut store = open(&dir);
        assert!(store.check_missing("zzzzz").unwrap_err().is_not_found());
    }

    #[test]
    fn test_check_duplicates_flags_shared_hashes() {
        let dir = TempDir::new().unwrap();
        let mut store = open(&dir);
        store.upsert(with_hash(patch("aaaaa", "A", "1"), "a")).unwrap();
        store.upsert(with_hash(patch("bbbbb", "B", "2"), "a")).unwrap();
        store.upsert(with_hash(patch("ccccc", "C", "3"), "b")).unwrap();

        let flagged = store.check_duplicates().unwrap();
        assert_eq!(flagged, vec!["aaaaa", "bbbbb"]);

        store.delete("bbbbb", DeleteMode::Hard).unwrap();
        assert!(store.check_duplicates().unwrap().is_empty());
        assert!(!open(&dir).get("aaaaa").unwrap().flags.duplicate);
    }

    #[test]
    fn test_new_id_avoids_live_ids() {
        let dir = TempDir::new().unwrap();
        let mut store = open(&dir);

        let mut seen = HashSet::new();
        for _ in 0..50 {
            let id = store.new_id().unwrap();
            assert_eq!(id.len(), 5);
            assert!(store.get(&id).is_none());
            store.upsert(DocumentPatch::new(id.clone())).unwrap();
            assert!(seen.insert(id));
        }
        assert_eq!(store.len(), 50);
    }

    #[test]
    fn test_deleted_id_may_be_reissued() {
        let dir = TempDir::new().unwrap();
        let mut store = open(&dir);
        store.upsert(DocumentPatch::new("aaaaa")).unwrap();
        store.delete("aaaaa", DeleteMode::Hard).unwrap();

        // Nothing remembers retired ids; the old one is free again.
        assert!(store.get("aaaaa").is_none());
        let reused = store.upsert(DocumentPatch::new("aaaaa")).unwrap();
        assert_eq!(reused.stamps.created, reused.stamps.modified);
    }

    #[test]
    fn test_reconcile_reports_missing_and_duplicates() {
        let dir = TempDir::new().unwrap();
        let mut store = open(&dir);
        store.upsert(with_hash(patch("aaaaa", "A", "1"), "x")).unwrap();
        store.upsert(with_hash(patch("bbbbb", "B", "2"), "x")).unwrap();
        store.write_artifact("aaaaa", b"%PDF-1.4").unwrap();

        let report = store.reconcile().unwrap();
        assert_eq!(report.total, 2);
        assert_eq!(report.missing, vec!["bbbbb"]);
        assert_eq!(report.duplicates, vec!["aaaaa", "bbbbb"]);

        let reopened = open(&dir);
        assert!(reopened.get("bbbbb").unwrap().flags.missing);
        assert!(!reopened.get("aaaaa").unwrap().flags.missing);
    }

    #[test]
    fn test_orphans() {
        let dir = TempDir::new().unwrap();
        let mut store = open(&dir);
        store.upsert(DocumentPatch::new("aaaaa")).unwrap();
        store.write_artifact("aaaaa", b"%PDF-1.4").unwrap();
        fs::write(store.artifact_dir().join("stray.pdf"), b"x").unwrap();
        fs::write(store.thumbnail_path("aaaaa"), b"jpg").unwrap();

        assert_eq!(store.orphans().unwrap(), vec!["stray.pdf"]);
    }

    #[tokio::test]
    async fn test_concurrent_upserts_to_distinct_ids_all_persist() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(RwLock::new(open(&dir)));

        let mut handles = Vec::new();
        for i in 0..20 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let mut guard = store.write().await;
                guard.upsert(patch(&format!("id{:03}", i), "A", "T")).unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let reopened = open(&dir);
        assert_eq!(reopened.len(), 20);
        for i in 0..20 {
            assert!(reopened.get(&format!("id{:03}", i)).is_some());
        }
    }
}
