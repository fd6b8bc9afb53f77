use serde::Serialize;
use std::path::PathBuf;

pub const TEXT_FIELD: &str = "text";
pub const EMBEDDING_FIELD: &str = "embedding";
pub const SOURCE_FILE_FIELD: &str = "source_file";

/// Where a raw unit of text came from inside its file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitKind {
    /// One CSV row; never split further.
    TableRow { row: u64 },
    /// A whole plain-text file.
    PlainText,
    /// One extracted PDF page.
    PdfPage { page: u32 },
}

impl UnitKind {
    pub fn is_chunked(&self) -> bool {
        !matches!(self, UnitKind::TableRow { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceUnit {
    pub text: String,
    pub source_file: String,
    pub kind: UnitKind,
}

/// A paragraph waiting for its embedding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingChunk {
    pub chunk_id: String,
    pub text: String,
    pub source_file: String,
}

/// Serializes to the `_source` document stored in the index; the chunk id
/// travels separately as the document `_id`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DocumentChunk {
    #[serde(skip_serializing)]
    pub chunk_id: String,
    pub text: String,
    pub source_file: String,
    pub embedding: Vec<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexSchema {
    pub dimensions: usize,
}

impl IndexSchema {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    pub text: String,
    pub source_file: String,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct KnnRequest {
    pub query_vector: Vec<f32>,
    pub k: usize,
    pub num_candidates: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkItemError {
    pub chunk_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkResponse {
    pub succeeded: usize,
    pub errors: Vec<BulkItemError>,
}

/// Counts reported once per re-indexing run.
///
/// A `failure_count` of `-1` means the bulk operation could not run at all,
/// which is different from a run that wrote nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestionOutcome {
    pub success_count: u64,
    pub failure_count: i64,
}

impl IngestionOutcome {
    pub const NOT_RUN_SENTINEL: i64 = -1;

    pub fn not_run() -> Self {
        Self {
            success_count: 0,
            failure_count: Self::NOT_RUN_SENTINEL,
        }
    }

    pub fn did_run(&self) -> bool {
        self.failure_count != Self::NOT_RUN_SENTINEL
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct SearchSettings {
    pub index_name: String,
    pub text_column: String,
    pub num_candidates: usize,
    pub batch_size: usize,
    pub recursive: bool,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            index_name: "semantic_search".to_string(),
            text_column: "texto".to_string(),
            num_candidates: 10,
            batch_size: 500,
            recursive: false,
        }
    }
}
