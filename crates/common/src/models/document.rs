//! Catalog document entity

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use super::Timestamps;
use crate::errors::Result;
use crate::store::{Patch, Record};

/// Independent boolean conditions attached to a document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flags {
    /// Backing artifact file is absent
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub missing: bool,

    /// Another live document shares the content hash
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub duplicate: bool,

    /// Pending soft delete, holding the requesting user's identity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,

    /// Hex SHA-256 of the uploaded bytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,

    /// Always `<id>.pdf`
    pub filename: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_filename: Option<String>,

    /// Upload size in bytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pages: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub flags: Flags,

    #[serde(flatten)]
    pub stamps: Timestamps,
}

impl Document {
    /// Artifact file name for an id
    pub fn filename_for(id: &str) -> String {
        format!("{}.pdf", id)
    }

    /// Thumbnail file name for an id
    pub fn thumbnail_for(id: &str) -> String {
        format!("{}.jpg", id)
    }

    pub fn is_soft_deleted(&self) -> bool {
        self.flags.delete.is_some()
    }

    /// Fields a search query is matched against
    pub fn searchable_fields(&self) -> impl Iterator<Item = &str> {
        [
            self.author.as_deref(),
            self.title.as_deref(),
            Some(self.id.as_str()),
            self.year.as_deref(),
            self.content_hash.as_deref(),
        ]
        .into_iter()
        .flatten()
    }

    /// `author + title`, the catalog ordering key
    pub fn sort_key(&self) -> String {
        format!(
            "{}{}",
            self.author.as_deref().unwrap_or_default(),
            self.title.as_deref().unwrap_or_default()
        )
    }
}

/// Partial document update; `None` leaves the stored field untouched
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct DocumentPatch {
    #[validate(length(min = 1, max = 64), custom(function = "validate_id"))]
    pub id: String,

    #[serde(default)]
    pub content_hash: Option<String>,

    #[serde(default)]
    #[validate(length(max = 512))]
    pub original_filename: Option<String>,

    #[serde(default)]
    pub size: Option<u64>,

    #[serde(default)]
    pub pages: Option<u32>,

    #[serde(default)]
    #[validate(length(max = 1000))]
    pub author: Option<String>,

    #[serde(default)]
    #[validate(length(max = 1000))]
    pub title: Option<String>,

    #[serde(default)]
    #[validate(length(max = 64))]
    pub year: Option<String>,

    #[serde(default)]
    #[validate(length(max = 1000))]
    pub publisher: Option<String>,

    #[serde(default)]
    #[validate(length(max = 20000))]
    pub description: Option<String>,

    #[serde(default)]
    pub flags: Option<Flags>,
}

/// Ids name files in the artifact directory, so only ASCII letters, digits,
/// `-` and `_` are accepted.
pub fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

fn validate_id(id: &str) -> std::result::Result<(), ValidationError> {
    if is_valid_id(id) {
        Ok(())
    } else {
        Err(ValidationError::new("id_charset")
            .with_message("id may only contain letters, digits, '-' and '_'".into()))
    }
}

impl DocumentPatch {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }
}

impl Patch for DocumentPatch {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Record for Document {
    type Patch = DocumentPatch;

    const KIND: &'static str = "document";

    fn id(&self) -> &str {
        &self.id
    }

    fn stamps(&self) -> &Timestamps {
        &self.stamps
    }

    fn stamps_mut(&mut self) -> &mut Timestamps {
        &mut self.stamps
    }

    fn from_patch(patch: DocumentPatch, stamps: Timestamps) -> Result<Self> {
        patch.validate()?;

        Ok(Self {
            filename: Document::filename_for(&patch.id),
            id: patch.id,
            content_hash: patch.content_hash,
            original_filename: patch.original_filename,
            size: patch.size,
            pages: patch.pages,
            author: patch.author,
            title: patch.title,
            year: patch.year,
            publisher: patch.publisher,
            description: patch.description,
            flags: patch.flags.unwrap_or_default(),
            stamps,
        })
    }

    fn apply(&mut self, patch: DocumentPatch) -> Result<()> {
        patch.validate()?;

        // Shallow replacement: provided fields win, the id never changes.
        if patch.content_hash.is_some() {
            self.content_hash = patch.content_hash;
        }
        if patch.original_filename.is_some() {
            self.original_filename = patch.original_filename;
        }
        if patch.size.is_some() {
            self.size = patch.size;
        }
        if patch.pages.is_some() {
            self.pages = patch.pages;
        }
        if patch.author.is_some() {
            self.author = patch.author;
        }
        if patch.title.is_some() {
            self.title = patch.title;
        }
        if patch.year.is_some() {
            self.year = patch.year;
        }
        if patch.publisher.is_some() {
            self.publisher = patch.publisher;
        }
        if patch.description.is_some() {
            self.description = patch.description;
        }
        if let Some(flags) = patch.flags {
            self.flags = flags;
        }
        self.filename = Document::filename_for(&self.id);
        Ok(())
    }
}
