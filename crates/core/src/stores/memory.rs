use crate::models::{
    BulkItemError, BulkResponse, DocumentChunk, IndexSchema, KnnRequest, QueryResult,
};
use crate::traits::VectorBackend;
use crate::SearchError;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug)]
struct MemoryIndex {
    schema: IndexSchema,
    documents: BTreeMap<String, DocumentChunk>,
}

/// In-process backend with exact cosine kNN.
///
/// Scores follow Elasticsearch's cosine similarity, `(1 + cos) / 2`, so
/// results are comparable with the real store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    indices: Mutex<HashMap<String, MemoryIndex>>,
    unreachable: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose every call fails with a connectivity error.
    pub fn unreachable() -> Self {
        Self {
            indices: Mutex::default(),
            unreachable: true,
        }
    }

    pub fn document_count(&self, index: &str) -> usize {
        self.lock()
            .get(index)
            .map(|stored| stored.documents.len())
            .unwrap_or(0)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, MemoryIndex>> {
        self.indices
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_reachable(&self) -> Result<(), SearchError> {
        if self.unreachable {
            return Err(SearchError::Connectivity {
                endpoint: "memory".to_string(),
                details: "store is marked unreachable".to_string(),
            });
        }
        Ok(())
    }
}

fn similarity(left: &[f32], right: &[f32]) -> f64 {
    let dot: f64 = left
        .iter()
        .zip(right)
        .map(|(a, b)| f64::from(*a) * f64::from(*b))
        .sum();
    let left_norm = left.iter().map(|a| f64::from(*a).powi(2)).sum::<f64>().sqrt();
    let right_norm = right.iter().map(|b| f64::from(*b).powi(2)).sum::<f64>().sqrt();

    let cosine = if left_norm > 0.0 && right_norm > 0.0 {
        dot / (left_norm * right_norm)
    } else {
        0.0
    };
    (1.0 + cosine) / 2.0
}

#[async_trait]
impl VectorBackend for MemoryStore {
    async fn ping(&self) -> Result<(), SearchError> {
        self.check_reachable()
    }

    async fn index_exists(&self, index: &str) -> Result<bool, SearchError> {
        self.check_reachable()?;
        Ok(self.lock().contains_key(index))
    }

    async fn create_index(&self, index: &str, schema: &IndexSchema) -> Result<(), SearchError> {
        self.check_reachable()?;
        self.lock()
            .entry(index.to_string())
            .or_insert_with(|| MemoryIndex {
                schema: *schema,
                documents: BTreeMap::new(),
            });
        Ok(())
    }

    async fn delete_index(&self, index: &str) -> Result<(), SearchError> {
        self.check_reachable()?;
        self.lock().remove(index);
        Ok(())
    }

    async fn index_schema(&self, index: &str) -> Result<Option<IndexSchema>, SearchError> {
        self.check_reachable()?;
        Ok(self.lock().get(index).map(|stored| stored.schema))
    }

    async fn bulk_write(
        &self,
        index: &str,
        entries: &[DocumentChunk],
    ) -> Result<BulkResponse, SearchError> {
        self.check_reachable()?;
        let mut indices = self.lock();
        let stored = indices
            .get_mut(index)
            .ok_or_else(|| SearchError::IndexNotFound(index.to_string()))?;

        let mut response = BulkResponse::default();
        for entry in entries {
            if entry.embedding.len() != stored.schema.dimensions {
                response.errors.push(BulkItemError {
                    chunk_id: entry.chunk_id.clone(),
                    reason: format!(
                        "vector has {} dimensions, index expects {}",
                        entry.embedding.len(),
                        stored.schema.dimensions
                    ),
                });
                continue;
            }
            stored
                .documents
                .insert(entry.chunk_id.clone(), entry.clone());
            response.succeeded += 1;
        }
        Ok(response)
    }

    async fn refresh(&self, index: &str) -> Result<(), SearchError> {
        self.check_reachable()?;
        if self.lock().contains_key(index) {
            Ok(())
        } else {
            Err(SearchError::IndexNotFound(index.to_string()))
        }
    }

    async fn knn_search(
        &self,
        index: &str,
        request: &KnnRequest,
    ) -> Result<Vec<QueryResult>, SearchError> {
        self.check_reachable()?;
        let indices = self.lock();
        let stored = indices
            .get(index)
            .ok_or_else(|| SearchError::IndexNotFound(index.to_string()))?;

        if request.query_vector.len() != stored.schema.dimensions {
            return Err(SearchError::Request(format!(
                "query vector has {} dimensions, index expects {}",
                request.query_vector.len(),
                stored.schema.dimensions
            )));
        }

        let mut scored: Vec<QueryResult> = stored
            .documents
            .values()
            .map(|document| QueryResult {
                text: document.text.clone(),
                source_file: document.source_file.clone(),
                score: similarity(&request.query_vector, &document.embedding),
            })
            .collect();

        scored.sort_by(|left, right| right.score.total_cmp(&left.score));
        scored.truncate(request.k);
        Ok(scored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(id: &str, embedding: Vec<f32>) -> DocumentChunk {
        DocumentChunk {
            chunk_id: id.to_string(),
            text: format!("text {id}"),
            source_file: "a.txt".to_string(),
            embedding,
        }
    }

    #[tokio::test]
    async fn rewriting_a_chunk_id_keeps_one_document() {
        let store = MemoryStore::new();
        store.create_index("docs", &IndexSchema::new(2)).await.unwrap();

        store.bulk_write("docs", &[chunk("a", vec![1.0, 0.0])]).await.unwrap();
        store.bulk_write("docs", &[chunk("a", vec![1.0, 0.0])]).await.unwrap();

        assert_eq!(store.document_count("docs"), 1);
    }

    #[tokio::test]
    async fn wrong_dimension_fails_only_that_entry() {
        let store = MemoryStore::new();
        store.create_index("docs", &IndexSchema::new(2)).await.unwrap();

        let response = store
            .bulk_write(
                "docs",
                &[chunk("a", vec![1.0, 0.0]), chunk("b", vec![1.0, 0.0, 0.0])],
            )
            .await
            .unwrap();

        assert_eq!(response.succeeded, 1);
        assert_eq!(response.errors.len(), 1);
        assert_eq!(response.errors[0].chunk_id, "b");
        assert_eq!(store.document_count("docs"), 1);
    }

    #[tokio::test]
    async fn knn_ranks_by_cosine_similarity() {
        let store = MemoryStore::new();
        store.create_index("docs", &IndexSchema::new(2)).await.unwrap();
        store
            .bulk_write(
                "docs",
                &[
                    chunk("east", vec![1.0, 0.0]),
                    chunk("north", vec![0.0, 1.0]),
                    chunk("west", vec![-1.0, 0.0]),
                ],
            )
            .await
            .unwrap();

        let hits = store
            .knn_search(
                "docs",
                &KnnRequest {
                    query_vector: vec![0.9, 0.1],
                    k: 2,
                    num_candidates: 10,
                },
            )
            .await
            .unwrap();

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].text, "text east");
        assert_eq!(hits[1].text, "text north");
        assert!(hits[0].score > hits[1].score);
        assert!(hits[0].score <= 1.0);
    }

    #[tokio::test]
    async fn missing_index_and_unreachable_store_are_distinct() {
        let store = MemoryStore::new();
        let request = KnnRequest {
            query_vector: vec![1.0],
            k: 1,
            num_candidates: 10,
        };
        assert!(matches!(
            store.knn_search("absent", &request).await,
            Err(SearchError::IndexNotFound(_))
        ));

        let offline = MemoryStore::unreachable();
        assert!(matches!(
            offline.ping().await,
            Err(SearchError::Connectivity { .. })
        ));
    }
}
