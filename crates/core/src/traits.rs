use crate::models::{BulkResponse, DocumentChunk, IndexSchema, KnnRequest, QueryResult};
use crate::SearchError;
use async_trait::async_trait;

/// Capabilities the pipeline needs from a vector-capable search index.
#[async_trait]
pub trait VectorBackend: Send + Sync {
    /// Lightweight liveness probe.
    async fn ping(&self) -> Result<(), SearchError>;

    async fn index_exists(&self, index: &str) -> Result<bool, SearchError>;

    async fn create_index(&self, index: &str, schema: &IndexSchema) -> Result<(), SearchError>;

    /// Removes the index; an absent index is not an error.
    async fn delete_index(&self, index: &str) -> Result<(), SearchError>;

    /// Schema of an existing index, `None` when the index is absent.
    async fn index_schema(&self, index: &str) -> Result<Option<IndexSchema>, SearchError>;

    /// Writes entries keyed by `chunk_id`, reporting per-entry failures in the
    /// response. `Err` means the request as a whole could not be carried out.
    async fn bulk_write(
        &self,
        index: &str,
        entries: &[DocumentChunk],
    ) -> Result<BulkResponse, SearchError>;

    /// Makes previous writes visible to search.
    async fn refresh(&self, index: &str) -> Result<(), SearchError>;

    /// Nearest neighbours of the request vector, best first.
    async fn knn_search(
        &self,
        index: &str,
        request: &KnnRequest,
    ) -> Result<Vec<QueryResult>, SearchError>;
}
