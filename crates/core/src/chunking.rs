use crate::error::IngestError;
use crate::models::{PendingChunk, SourceUnit};
use regex::Regex;
use sha2::{Digest, Sha256};

const BLANK_LINE: &str = r"\n[ \t\r\x0B\x0C\x{A0}]*\n";

/// Splits raw text into paragraphs on blank-line boundaries.
#[derive(Debug, Clone)]
pub struct Chunker {
    blank_line: Regex,
}

impl Chunker {
    pub fn new() -> Result<Self, IngestError> {
        Ok(Self {
            blank_line: Regex::new(BLANK_LINE)?,
        })
    }

    /// Trimmed, non-empty paragraphs of `text`, in order.
    pub fn split_paragraphs(&self, text: &str) -> Vec<String> {
        self.blank_line
            .split(text)
            .map(str::trim)
            .filter(|paragraph| !paragraph.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Chunks for one unit. CSV rows pass through verbatim unless blank.
    pub fn chunk_unit(&self, unit: &SourceUnit) -> Vec<String> {
        if unit.kind.is_chunked() {
            self.split_paragraphs(&unit.text)
        } else if unit.text.trim().is_empty() {
            Vec::new()
        } else {
            vec![unit.text.clone()]
        }
    }

    pub fn chunks<I>(self, units: I) -> ChunkedUnits<I>
    where
        I: Iterator<Item = SourceUnit>,
    {
        ChunkedUnits {
            chunker: self,
            units,
            buffered: Vec::new().into_iter(),
            current_file: None,
            ordinal: 0,
        }
    }
}

/// Lazy adapter from source units to chunks with stable ids.
pub struct ChunkedUnits<I> {
    chunker: Chunker,
    units: I,
    buffered: std::vec::IntoIter<PendingChunk>,
    current_file: Option<String>,
    ordinal: u64,
}

impl<I> Iterator for ChunkedUnits<I>
where
    I: Iterator<Item = SourceUnit>,
{
    type Item = PendingChunk;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(chunk) = self.buffered.next() {
                return Some(chunk);
            }

            let unit = self.units.next()?;
            if self.current_file.as_deref() != Some(unit.source_file.as_str()) {
                self.current_file = Some(unit.source_file.clone());
                self.ordinal = 0;
            }

            let mut pending = Vec::new();
            for text in self.chunker.chunk_unit(&unit) {
                let chunk_id = make_chunk_id(&unit.source_file, self.ordinal, &text);
                self.ordinal = self.ordinal.saturating_add(1);
                pending.push(PendingChunk {
                    chunk_id,
                    text,
                    source_file: unit.source_file.clone(),
                });
            }
            self.buffered = pending.into_iter();
        }
    }
}

pub fn make_chunk_id(source_file: &str, ordinal: u64, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source_file.as_bytes());
    hasher.update(ordinal.to_le_bytes());
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UnitKind;

    fn unit(text: &str, source_file: &str, kind: UnitKind) -> SourceUnit {
        SourceUnit {
            text: text.to_string(),
            source_file: source_file.to_string(),
            kind,
        }
    }

    #[test]
    fn paragraphs_split_on_blank_lines() {
        let chunker = Chunker::new().unwrap();
        let paragraphs = chunker.split_paragraphs("Hello world.\n\nGoodbye world.");
        assert_eq!(paragraphs, vec!["Hello world.", "Goodbye world."]);
    }

    #[test]
    fn blank_lines_with_whitespace_and_crlf_still_split() {
        let chunker = Chunker::new().unwrap();
        let paragraphs = chunker.split_paragraphs("one\r\n \t\r\ntwo\n\n\n\nthree\nstill three");
        assert_eq!(paragraphs, vec!["one", "two", "three\nstill three"]);
    }

    #[test]
    fn whitespace_only_paragraphs_are_dropped() {
        let chunker = Chunker::new().unwrap();
        assert!(chunker.split_paragraphs("  \n\n\t\n\n   ").is_empty());
        assert!(chunker.split_paragraphs("").is_empty());
    }

    #[test]
    fn table_rows_are_kept_verbatim() {
        let chunker = Chunker::new().unwrap();
        let row = unit("  first\n\nsecond ", "b.csv", UnitKind::TableRow { row: 1 });
        assert_eq!(chunker.chunk_unit(&row), vec!["  first\n\nsecond ".to_string()]);

        let blank = unit("   ", "b.csv", UnitKind::TableRow { row: 2 });
        assert!(chunker.chunk_unit(&blank).is_empty());
    }

    #[test]
    fn chunk_ids_are_stable_and_restart_per_file() {
        let units = vec![
            unit("A\n\nB", "a.txt", UnitKind::PlainText),
            unit("A", "c.txt", UnitKind::PlainText),
        ];

        let first: Vec<_> = Chunker::new().unwrap().chunks(units.clone().into_iter()).collect();
        let second: Vec<_> = Chunker::new().unwrap().chunks(units.into_iter()).collect();

        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
        assert_eq!(first[0].chunk_id, make_chunk_id("a.txt", 0, "A"));
        assert_eq!(first[1].chunk_id, make_chunk_id("a.txt", 1, "B"));
        assert_eq!(first[2].chunk_id, make_chunk_id("c.txt", 0, "A"));
        assert_ne!(first[0].chunk_id, first[2].chunk_id);
    }

    #[test]
    fn pdf_pages_of_one_file_share_the_ordinal_sequence() {
        let units = vec![
            unit("p1", "doc.pdf", UnitKind::PdfPage { page: 1 }),
            unit("p2a\n\np2b", "doc.pdf", UnitKind::PdfPage { page: 2 }),
        ];
        let chunks: Vec<_> = Chunker::new().unwrap().chunks(units.into_iter()).collect();
        let texts: Vec<_> = chunks.iter().map(|chunk| chunk.text.as_str()).collect();
        assert_eq!(texts, vec!["p1", "p2a", "p2b"]);
        assert_eq!(chunks[2].chunk_id, make_chunk_id("doc.pdf", 2, "p2b"));
    }
}
