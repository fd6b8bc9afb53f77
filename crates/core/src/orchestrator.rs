use crate::chunking::Chunker;
use crate::embeddings::Embedder;
use crate::index::IndexManager;
use crate::ingest::{BulkIndexer, ChunkStream};
use crate::models::{IndexSchema, IngestionOutcome, SearchSettings, SkippedFile};
use crate::query::{QueryEngine, QueryOutcome};
use crate::reader::DocumentReader;
use crate::traits::VectorBackend;
use crate::SearchError;
use std::path::Path;
use tracing::info;

#[derive(Debug)]
pub struct ReindexReport {
    pub outcome: IngestionOutcome,
    pub skipped_files: Vec<SkippedFile>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexStatus {
    Missing,
    Ready,
}

/// Owns the backend client and the embedding model for the whole process and
/// exposes the two user actions: re-index a folder and search.
pub struct SemanticSearch<B, E> {
    backend: B,
    embedder: E,
    settings: SearchSettings,
}

impl<B, E> SemanticSearch<B, E>
where
    B: VectorBackend,
    E: Embedder,
{
    /// Probes the backend once; an unreachable backend is reported here and
    /// nothing else is attempted.
    pub async fn connect(
        backend: B,
        embedder: E,
        settings: SearchSettings,
    ) -> Result<Self, SearchError> {
        backend.ping().await?;
        info!(
            index = %settings.index_name,
            dimensions = embedder.dimensions(),
            "search backend reachable"
        );

        Ok(Self {
            backend,
            embedder,
            settings,
        })
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Index and query vectors both derive their dimension from the embedder.
    pub fn schema(&self) -> IndexSchema {
        IndexSchema::new(self.embedder.dimensions())
    }

    pub fn index_manager(&self) -> IndexManager<'_, B> {
        IndexManager::new(&self.backend, &self.settings.index_name, self.schema())
    }

    pub fn query_engine(&self) -> QueryEngine<'_, B, E> {
        QueryEngine::new(
            &self.backend,
            &self.embedder,
            &self.settings.index_name,
            self.settings.num_candidates,
        )
    }

    /// Drops the index, recreates it and indexes every supported file in
    /// `folder`.
    pub async fn reindex(&self, folder: &Path) -> Result<ReindexReport, SearchError> {
        self.index_manager().reset().await?;

        let mut reader = DocumentReader::open(folder, &self.settings);
        let chunks = Chunker::new()?.chunks(reader.by_ref());
        let stream = ChunkStream::new(chunks, &self.embedder);

        let outcome = BulkIndexer::new(
            &self.backend,
            &self.settings.index_name,
            self.embedder.dimensions(),
            self.settings.batch_size,
        )
        .index_all(stream)
        .await;

        Ok(ReindexReport {
            outcome,
            skipped_files: reader.into_skipped_files(),
        })
    }

    pub async fn search(&self, query_text: &str, top_k: usize) -> QueryOutcome {
        self.query_engine().search(query_text, top_k).await
    }

    pub async fn status(&self) -> Result<IndexStatus, SearchError> {
        if self.index_manager().validate().await? {
            Ok(IndexStatus::Ready)
        } else {
            Ok(IndexStatus::Missing)
        }
    }
}
