use crate::error::IngestError;
use lopdf::Document;
use std::path::Path;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageText {
    pub number: u32,
    pub text: String,
}

pub trait PdfExtractor {
    fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, IngestError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfExtractor;

impl PdfExtractor for LopdfExtractor {
    /// Pages with an extractable text layer, in page order.
    ///
    /// A page whose content stream cannot be decoded is skipped; only a
    /// document that fails to load is an error.
    fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, IngestError> {
        let document =
            Document::load(path).map_err(|error| IngestError::PdfParse(error.to_string()))?;

        let page_ids = document.get_pages();
        if page_ids.is_empty() {
            return Err(IngestError::PdfParse(format!(
                "pdf has no pages: {}",
                path.display()
            )));
        }

        let mut pages = Vec::new();
        for (page_no, _page_id) in page_ids {
            match document.extract_text(&[page_no]) {
                Ok(text) if !text.trim().is_empty() => pages.push(PageText {
                    number: page_no,
                    text,
                }),
                Ok(_) => {}
                Err(error) => warn!(
                    path = %path.display(),
                    page = page_no,
                    reason = %error,
                    "skipping unreadable pdf page"
                ),
            }
        }

        Ok(pages)
    }
}

pub fn extract_page_texts(path: &Path) -> Result<Vec<PageText>, IngestError> {
    LopdfExtractor.extract_pages(path)
}

#[cfg(test)]
mod tests {
    use super::extract_page_texts;
    use crate::IngestError;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn broken_pdf_is_a_parse_error() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("broken.pdf");
        fs::write(&path, b"%PDF-1.4\n%broken")?;

        let result = extract_page_texts(&path);
        assert!(matches!(result, Err(IngestError::PdfParse(_))));
        Ok(())
    }
}
