use std::path::Path;

use lopdf::Document;

use advocate_core::{BackendError, PdfBackend, PdfDocument};

/// lopdf-based implementation of [`PdfBackend`].
///
/// The document is parsed once on open; page text is decoded from the
/// page's content streams on demand, so sampling a few pages of a large
/// brief never touches the rest. lopdf is pure Rust, so the backend needs
/// no system PDF library.
#[derive(Debug, Clone, Default)]
pub struct LopdfBackend;

impl LopdfBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PdfBackend for LopdfBackend {
    fn open(&self, path: &Path) -> Result<Box<dyn PdfDocument>, BackendError> {
        let document = Document::load(path).map_err(|e| BackendError::OpenError(e.to_string()))?;
        if document.is_encrypted() {
            return Err(BackendError::OpenError("document is encrypted".into()));
        }
        let page_count = document.get_pages().len();
        Ok(Box::new(LopdfDocument {
            document,
            page_count,
        }))
    }
}

struct LopdfDocument {
    document: Document,
    page_count: usize,
}

impl PdfDocument for LopdfDocument {
    fn page_count(&self) -> usize {
        self.page_count
    }

    fn page_text(&self, page_index: usize) -> Result<String, BackendError> {
        if page_index >= self.page_count {
            return Err(BackendError::ExtractionError(format!(
                "page index {} out of range ({} pages)",
                page_index, self.page_count
            )));
        }
        // lopdf numbers pages from 1.
        let page_number = (page_index + 1) as u32;
        self.document
            .extract_text(&[page_number])
            .map_err(|e| BackendError::ExtractionError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::content::{Content, Operation};
    use lopdf::{Object, Stream, dictionary};

    /// Build a minimal PDF with one text line per page.
    fn write_pdf(path: &Path, page_lines: &[&str]) {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let mut kids: Vec<Object> = Vec::new();
        for line in page_lines {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 12.into()]),
                    Operation::new("Td", vec![72.into(), 720.into()]),
                    Operation::new("Tj", vec![Object::string_literal(*line)]),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id =
                doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(page_id.into());
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc.save(path).unwrap();
    }

    #[test]
    fn missing_file_is_an_open_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = LopdfBackend::new()
            .open(&dir.path().join("nope.pdf"))
            .err()
            .unwrap();
        assert!(matches!(err, BackendError::OpenError(_)));
    }

    #[test]
    fn reads_page_text_by_index() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("two-pages.pdf");
        write_pdf(
            &path,
            &[
                "The plaintiff argues the statute is invalid.",
                "The defendant urges affirmance of the judgment.",
            ],
        );

        let doc = LopdfBackend::new().open(&path).unwrap();
        assert_eq!(doc.page_count(), 2);
        assert!(doc.page_text(0).unwrap().contains("plaintiff argues"));
        assert!(doc.page_text(1).unwrap().contains("urges affirmance"));
    }

    #[test]
    fn out_of_range_page_is_an_extraction_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("one-page.pdf");
        write_pdf(&path, &["A single page."]);

        let doc = LopdfBackend::new().open(&path).unwrap();
        let err = doc.page_text(5).unwrap_err();
        assert!(matches!(err, BackendError::ExtractionError(_)));
    }
}
