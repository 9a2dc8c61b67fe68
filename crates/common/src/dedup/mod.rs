//! Duplicate detection over content hashes
//!
//! The flag is recomputed from scratch on every pass and never maintained
//! incrementally, so it can lag behind a mutation until the next pass.

use std::collections::HashMap;

use crate::models::Document;

/// Set `flags.duplicate` on every document that shares a non-empty content
/// hash with at least one other document, clear it on all the rest.
///
/// Returns the flagged ids in input order.
pub fn detect_duplicates(documents: &mut [Document]) -> Vec<String> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for hash in documents.iter().filter_map(content_hash) {
        *counts.entry(hash.to_string()).or_default() += 1;
    }

    let mut flagged = Vec::new();
    for doc in documents.iter_mut() {
        let shared = content_hash(doc)
            .and_then(|h| counts.get(h))
            .is_some_and(|&n| n > 1);

        doc.flags.duplicate = shared;
        if shared {
            flagged.push(doc.id.clone());
        }
    }
    flagged
}

fn content_hash(doc: &Document) -> Option<&str> {
    doc.content_hash.as_deref().filter(|h| !h.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DocumentPatch, Timestamps};
    use crate::store::Record;
    use chrono::Utc;

    fn docs(hashes: &[Option<&str>]) -> Vec<Document> {
        hashes
            .iter()
            .enumerate()
            .map(|(i, hash)| {
                let mut patch = DocumentPatch::new(format!("d{}", i));
                patch.content_hash = hash.map(str::to_string);
                Document::from_patch(patch, Timestamps::at(Utc::now())).unwrap()
            })
            .collect()
    }

    #[test]
    fn test_first_two_of_a_a_b_flagged() {
        let mut documents = docs(&[Some("a"), Some("a"), Some("b")]);
        let flagged = detect_duplicates(&mut documents);

        assert_eq!(flagged, vec!["d0", "d1"]);
        assert!(documents[0].flags.duplicate);
        assert!(documents[1].flags.duplicate);
        assert!(!documents[2].flags.duplicate);
    }

    #[test]
    fn test_distinct_hashes_flag_nothing() {
        let mut documents = docs(&[Some("a"), Some("b"), Some("c")]);
        assert!(detect_duplicates(&mut documents).is_empty());
        assert!(documents.iter().all(|d| !d.flags.duplicate));
    }

    #[test]
    fn test_stale_flags_are_cleared() {
        let mut documents = docs(&[Some("a"), Some("b")]);
        documents[0].flags.duplicate = true;
        detect_duplicates(&mut documents);
        assert!(!documents[0].flags.duplicate);
    }

    #[test]
    fn test_missing_or_empty_hashes_never_match() {
        let mut documents = docs(&[None, None, Some(""), Some("")]);
        assert!(detect_duplicates(&mut documents).is_empty());
    }

    #[test]
    fn test_empty_input() {
        assert!(detect_duplicates(&mut []).is_empty());
    }
}
