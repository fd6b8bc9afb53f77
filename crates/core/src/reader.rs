use crate::extractor::{LopdfExtractor, PdfExtractor};
use crate::models::{SearchSettings, SkippedFile, SourceUnit, UnitKind};
use crate::IngestError;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Csv,
    Text,
    Pdf,
}

impl FileFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?;
        if extension.eq_ignore_ascii_case("csv") {
            Some(FileFormat::Csv)
        } else if extension.eq_ignore_ascii_case("txt") {
            Some(FileFormat::Text)
        } else if extension.eq_ignore_ascii_case("pdf") {
            Some(FileFormat::Pdf)
        } else {
            None
        }
    }
}

/// Supported files under `folder`, sorted. A missing folder has no files.
pub fn discover_files(folder: &Path, recursive: bool) -> Vec<PathBuf> {
    if !folder.is_dir() {
        return Vec::new();
    }

    let max_depth = if recursive { usize::MAX } else { 1 };
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .follow_links(true)
        .max_depth(max_depth)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if entry.file_type().is_file() && FileFormat::from_path(entry.path()).is_some() {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

/// Lazily reads the supported files of a folder, one file at a time.
///
/// Files that cannot be read are logged and recorded in
/// [`DocumentReader::skipped_files`]; iteration moves on to the next file.
pub struct DocumentReader<P = LopdfExtractor> {
    root: PathBuf,
    files: std::vec::IntoIter<PathBuf>,
    pending: Units,
    text_column: String,
    pdf: P,
    skipped: Vec<SkippedFile>,
}

impl DocumentReader<LopdfExtractor> {
    pub fn open(folder: &Path, settings: &SearchSettings) -> Self {
        Self::with_extractor(folder, settings, LopdfExtractor)
    }
}

impl<P: PdfExtractor> DocumentReader<P> {
    pub fn with_extractor(folder: &Path, settings: &SearchSettings, pdf: P) -> Self {
        let files = discover_files(folder, settings.recursive);
        debug!(folder = %folder.display(), file_count = files.len(), "discovered source files");

        Self {
            root: folder.to_path_buf(),
            files: files.into_iter(),
            pending: Units::Buffered(Vec::new().into_iter()),
            text_column: settings.text_column.clone(),
            pdf,
            skipped: Vec::new(),
        }
    }

    pub fn skipped_files(&self) -> &[SkippedFile] {
        &self.skipped
    }

    pub fn into_skipped_files(self) -> Vec<SkippedFile> {
        self.skipped
    }

    fn source_name(&self, path: &Path) -> Result<String, IngestError> {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        if relative.file_name().is_none() {
            return Err(IngestError::MissingFileName(path.display().to_string()));
        }
        Ok(relative.to_string_lossy().to_string())
    }

    fn read_file(&self, path: &Path) -> Result<Units, IngestError> {
        let source_file = self.source_name(path)?;
        let units = match FileFormat::from_path(path) {
            Some(FileFormat::Csv) => {
                return Ok(Units::Rows(CsvRows::open(
                    path,
                    source_file,
                    &self.text_column,
                )?))
            }
            Some(FileFormat::Text) => read_text_file(path, &source_file)?,
            Some(FileFormat::Pdf) => self
                .pdf
                .extract_pages(path)?
                .into_iter()
                .map(|page| SourceUnit {
                    text: page.text,
                    source_file: source_file.clone(),
                    kind: UnitKind::PdfPage { page: page.number },
                })
                .collect(),
            None => Vec::new(),
        };
        Ok(Units::Buffered(units.into_iter()))
    }
}

impl<P: PdfExtractor> Iterator for DocumentReader<P> {
    type Item = SourceUnit;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(unit) = self.pending.next() {
                return Some(unit);
            }

            let path = self.files.next()?;
            match self.read_file(&path) {
                Ok(units) => {
                    debug!(path = %path.display(), "opened source file");
                    self.pending = units;
                }
                Err(error) => {
                    warn!(path = %path.display(), reason = %error, "skipping unreadable file");
                    self.skipped.push(SkippedFile {
                        path,
                        reason: error.to_string(),
                    });
                }
            }
        }
    }
}

fn read_text_file(path: &Path, source_file: &str) -> Result<Vec<SourceUnit>, IngestError> {
    let bytes = fs::read(path)?;
    let text = String::from_utf8(bytes)
        .map_err(|error| IngestError::InvalidUtf8(format!("{}: {error}", path.display())))?;
    let text = text.trim_start_matches('\u{feff}').to_string();

    Ok(vec![SourceUnit {
        text,
        source_file: source_file.to_string(),
        kind: UnitKind::PlainText,
    }])
}

/// Units of the file currently being read. CSV rows are pulled from the
/// file one record at a time.
enum Units {
    Buffered(std::vec::IntoIter<SourceUnit>),
    Rows(CsvRows),
}

impl Iterator for Units {
    type Item = SourceUnit;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            Units::Buffered(units) => units.next(),
            Units::Rows(rows) => rows.next(),
        }
    }
}

struct CsvRows {
    path: PathBuf,
    source_file: String,
    column: usize,
    records: csv::StringRecordsIntoIter<fs::File>,
    row: u64,
}

impl CsvRows {
    fn open(path: &Path, source_file: String, text_column: &str) -> Result<Self, IngestError> {
        let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
        let column = reader
            .headers()?
            .iter()
            .position(|header| header.trim_start_matches('\u{feff}').trim() == text_column)
            .ok_or_else(|| IngestError::MissingColumn {
                column: text_column.to_string(),
                path: path.display().to_string(),
            })?;

        Ok(Self {
            path: path.to_path_buf(),
            source_file,
            column,
            records: reader.into_records(),
            row: 0,
        })
    }
}

impl Iterator for CsvRows {
    type Item = SourceUnit;

    /// Skips malformed rows and rows whose text cell is missing or blank.
    fn next(&mut self) -> Option<Self::Item> {
        for record in self.records.by_ref() {
            self.row += 1;
            let record = match record {
                Ok(record) => record,
                Err(error) => {
                    warn!(
                        path = %self.path.display(),
                        row = self.row,
                        reason = %error,
                        "skipping malformed csv row"
                    );
                    continue;
                }
            };

            match record.get(self.column) {
                Some(value) if !value.trim().is_empty() => {
                    return Some(SourceUnit {
                        text: value.to_string(),
                        source_file: self.source_file.clone(),
                        kind: UnitKind::TableRow { row: self.row },
                    })
                }
                _ => {}
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunking::Chunker;
    use crate::extractor::PageText;
    use std::fs;
    use tempfile::tempdir;

    struct FixedPages(Vec<PageText>);

    impl PdfExtractor for FixedPages {
        fn extract_pages(&self, _path: &Path) -> Result<Vec<PageText>, IngestError> {
            Ok(self.0.clone())
        }
    }

    fn chunk_texts(reader: DocumentReader<impl PdfExtractor>) -> Vec<(String, String)> {
        Chunker::new()
            .unwrap()
            .chunks(reader)
            .map(|chunk| (chunk.text, chunk.source_file))
            .collect()
    }

    #[test]
    fn missing_folder_yields_nothing() {
        let settings = SearchSettings::default();
        let mut reader = DocumentReader::open(Path::new("/definitely/not/here"), &settings);
        assert!(reader.next().is_none());
        assert!(reader.skipped_files().is_empty());
    }

    #[test]
    fn text_file_is_split_into_paragraphs() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        fs::write(dir.path().join("a.txt"), "Hello world.\n\nGoodbye world.")?;

        let reader = DocumentReader::open(dir.path(), &SearchSettings::default());
        assert_eq!(
            chunk_texts(reader),
            vec![
                ("Hello world.".to_string(), "a.txt".to_string()),
                ("Goodbye world.".to_string(), "a.txt".to_string()),
            ]
        );
        Ok(())
    }

    #[test]
    fn csv_rows_without_text_are_skipped() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        fs::write(
            dir.path().join("b.csv"),
            "id,texto\n1,\n2,Paris is the capital of France.\n3,\"   \"\n4\n",
        )?;

        let reader = DocumentReader::open(dir.path(), &SearchSettings::default());
        assert_eq!(
            chunk_texts(reader),
            vec![(
                "Paris is the capital of France.".to_string(),
                "b.csv".to_string()
            )]
        );
        Ok(())
    }

    #[test]
    fn csv_text_column_is_configurable() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        fs::write(dir.path().join("notes.csv"), "body\nfirst\nsecond\n")?;

        let settings = SearchSettings {
            text_column: "body".to_string(),
            ..SearchSettings::default()
        };
        let units: Vec<_> = DocumentReader::open(dir.path(), &settings).collect();
        assert_eq!(units.len(), 2);
        assert_eq!(units[1].kind, UnitKind::TableRow { row: 2 });
        Ok(())
    }

    #[test]
    fn csv_without_text_column_is_skipped() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        fs::write(dir.path().join("wrong.csv"), "title\nsomething\n")?;
        fs::write(dir.path().join("z.txt"), "kept")?;

        let mut reader = DocumentReader::open(dir.path(), &SearchSettings::default());
        let units: Vec<_> = reader.by_ref().collect();
        assert_eq!(units.len(), 1);
        assert_eq!(reader.skipped_files().len(), 1);
        assert!(reader.skipped_files()[0].reason.contains("texto"));
        Ok(())
    }

    #[test]
    fn csv_rows_are_read_on_demand() -> Result<(), Box<dyn std::error::Error>> {
        use std::io::Write;

        let dir = tempdir()?;
        let path = dir.path().join("big.csv");
        let mut body = String::from("texto\n");
        for row in 0..20_000 {
            body.push_str(&format!("row number {row}\n"));
        }
        fs::write(&path, body)?;

        let mut reader = DocumentReader::open(dir.path(), &SearchSettings::default());
        assert_eq!(reader.next().map(|unit| unit.text), Some("row number 0".to_string()));

        // Rows appended after reading started are still picked up.
        fs::OpenOptions::new()
            .append(true)
            .open(&path)?
            .write_all(b"appended late\n")?;

        let rest: Vec<_> = reader.map(|unit| unit.text).collect();
        assert_eq!(rest.len(), 20_000);
        assert_eq!(rest.last().map(String::as_str), Some("appended late"));
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_files_are_read() -> Result<(), Box<dyn std::error::Error>> {
        let outside = tempdir()?;
        let target = outside.path().join("real.txt");
        fs::write(&target, "linked paragraph")?;

        let dir = tempdir()?;
        std::os::unix::fs::symlink(&target, dir.path().join("link.txt"))?;

        let units: Vec<_> = DocumentReader::open(dir.path(), &SearchSettings::default()).collect();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].text, "linked paragraph");
        assert_eq!(units[0].source_file, "link.txt");
        Ok(())
    }

    #[test]
    fn unsupported_extensions_are_ignored() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        fs::write(dir.path().join("image.png"), b"\x89PNG")?;
        fs::write(dir.path().join("notes.md"), "# heading")?;
        fs::write(dir.path().join("UPPER.TXT"), "shouting")?;

        let mut reader = DocumentReader::open(dir.path(), &SearchSettings::default());
        let units: Vec<_> = reader.by_ref().collect();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].source_file, "UPPER.TXT");
        assert!(reader.skipped_files().is_empty());
        Ok(())
    }

    #[test]
    fn malformed_pdf_does_not_stop_the_scan() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        fs::write(dir.path().join("a_broken.pdf"), b"%PDF-1.4\n%broken")?;
        fs::write(dir.path().join("b.txt"), "still here")?;

        let mut reader = DocumentReader::open(dir.path(), &SearchSettings::default());
        let units: Vec<_> = reader.by_ref().collect();

        assert_eq!(units.len(), 1);
        assert_eq!(units[0].text, "still here");
        let skipped = reader.into_skipped_files();
        assert_eq!(skipped.len(), 1);
        assert_eq!(
            skipped[0].path.file_name().and_then(|name| name.to_str()),
            Some("a_broken.pdf")
        );
        Ok(())
    }

    #[test]
    fn invalid_utf8_text_is_skipped() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        fs::write(dir.path().join("latin1.txt"), b"caf\xe9")?;

        let mut reader = DocumentReader::open(dir.path(), &SearchSettings::default());
        assert!(reader.next().is_none());
        assert_eq!(reader.skipped_files().len(), 1);
        Ok(())
    }

    #[test]
    fn pdf_pages_become_separate_units() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        fs::write(dir.path().join("manual.pdf"), b"%PDF-1.4")?;

        let pages = FixedPages(vec![
            PageText {
                number: 1,
                text: "Intro.\n\nScope.".to_string(),
            },
            PageText {
                number: 2,
                text: "  \n\n ".to_string(),
            },
            PageText {
                number: 3,
                text: "Appendix.".to_string(),
            },
        ]);
        let reader = DocumentReader::with_extractor(dir.path(), &SearchSettings::default(), pages);
        let texts: Vec<_> = chunk_texts(reader).into_iter().map(|(text, _)| text).collect();
        assert_eq!(texts, vec!["Intro.", "Scope.", "Appendix."]);
        Ok(())
    }

    #[test]
    fn nested_folders_need_recursive_scan() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let nested = dir.path().join("nested");
        fs::create_dir(&nested)?;
        fs::write(dir.path().join("top.txt"), "top")?;
        fs::write(nested.join("deep.txt"), "deep")?;

        assert_eq!(discover_files(dir.path(), false).len(), 1);
        assert_eq!(discover_files(dir.path(), true).len(), 2);

        let settings = SearchSettings {
            recursive: true,
            ..SearchSettings::default()
        };
        let names: Vec<_> = DocumentReader::open(dir.path(), &settings)
            .map(|unit| unit.source_file)
            .collect();
        assert!(names.contains(&Path::new("nested").join("deep.txt").to_string_lossy().to_string()));
        Ok(())
    }
}
