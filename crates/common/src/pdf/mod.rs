//! Uploaded PDF inspection

use lopdf::Document as PdfDocument;
use tracing::warn;

use crate::errors::{AppError, Result};

const PDF_MAGIC: &[u8] = b"%PDF-";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PdfInfo {
    /// `None` when the file could not be parsed
    pub pages: Option<u32>,
}

/// Check the header and count pages when the structure parses
pub fn inspect(bytes: &[u8]) -> Result<PdfInfo> {
    if !bytes.starts_with(PDF_MAGIC) {
        return Err(AppError::Validation {
            message: "uploaded file is not a PDF".to_string(),
            field: Some("doc".to_string()),
        });
    }

    let pages = match PdfDocument::load_mem(bytes) {
        Ok(doc) => u32::try_from(doc.get_pages().len()).ok(),
        Err(e) => {
            warn!(error = %e, "PDF parsed with errors, page count unknown");
            None
        }
    };

    Ok(PdfInfo { pages })
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::{dictionary, Object, Stream};

    fn two_page_pdf() -> Vec<u8> {
        let mut doc = PdfDocument::with_version("1.5");
        let pages_id = doc.new_object_id();
        let content_id = doc.add_object(Stream::new(dictionary! {}, Vec::new()));

        let kids: Vec<Object> = (0..2)
            .map(|_| {
                doc.add_object(dictionary! {
                    "Type" => "Page",
                    "Parent" => pages_id,
                    "Contents" => content_id,
                    "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
                })
                .into()
            })
            .collect();

        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => 2,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        bytes
    }

    #[test]
    fn test_counts_pages() {
        let info = inspect(&two_page_pdf()).unwrap();
        assert_eq!(info.pages, Some(2));
    }

    #[test]
    fn test_rejects_non_pdf() {
        let err = inspect(b"GIF89a....").unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));
    }

    #[test]
    fn test_unparseable_pdf_has_unknown_pages() {
        let info = inspect(b"%PDF-1.4\ngarbage").unwrap();
        assert_eq!(info.pages, None);
    }
}
