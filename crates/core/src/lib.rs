pub mod chunking;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod index;
pub mod ingest;
pub mod models;
pub mod orchestrator;
pub mod query;
pub mod reader;
pub mod stores;
pub mod traits;

pub use chunking::{make_chunk_id, ChunkedUnits, Chunker};
#[cfg(feature = "minilm")]
pub use embeddings::MiniLmEmbedder;
pub use embeddings::{CharacterNgramEmbedder, Embedder, DEFAULT_EMBEDDING_DIMENSIONS};
pub use error::{EmbedError, IngestError, SearchError};
pub use extractor::{extract_page_texts, LopdfExtractor, PageText, PdfExtractor};
pub use index::IndexManager;
pub use ingest::{BulkIndexer, ChunkStream};
pub use models::{
    BulkItemError, BulkResponse, DocumentChunk, IndexSchema, IngestionOutcome, KnnRequest,
    PendingChunk, QueryResult, SearchSettings, SkippedFile, SourceUnit, UnitKind,
};
pub use orchestrator::{IndexStatus, ReindexReport, SemanticSearch};
pub use query::{QueryEngine, QueryOutcome};
pub use reader::{discover_files, DocumentReader, FileFormat};
pub use stores::{ElasticsearchConfig, ElasticsearchStore, MemoryStore};
pub use traits::VectorBackend;
