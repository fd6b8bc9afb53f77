use crate::embeddings::Embedder;
use crate::models::{KnnRequest, QueryResult};
use crate::traits::VectorBackend;
use crate::SearchError;
use tracing::{debug, warn};

/// Results of one query. On failure `results` is empty and `error` says why.
#[derive(Debug, Default)]
pub struct QueryOutcome {
    pub results: Vec<QueryResult>,
    pub error: Option<SearchError>,
}

impl QueryOutcome {
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

pub struct QueryEngine<'a, B: ?Sized, E: ?Sized> {
    backend: &'a B,
    embedder: &'a E,
    index_name: &'a str,
    num_candidates: usize,
}

impl<'a, B, E> QueryEngine<'a, B, E>
where
    B: VectorBackend + ?Sized,
    E: Embedder + ?Sized,
{
    pub fn new(backend: &'a B, embedder: &'a E, index_name: &'a str, num_candidates: usize) -> Self {
        Self {
            backend,
            embedder,
            index_name,
            num_candidates,
        }
    }

    /// Top `top_k` matches for `query_text`. Never fails: a missing index reads
    /// as no results and any other error is returned alongside empty results.
    pub async fn search(&self, query_text: &str, top_k: usize) -> QueryOutcome {
        match self.try_search(query_text, top_k).await {
            Ok(results) => QueryOutcome {
                results,
                error: None,
            },
            Err(SearchError::IndexNotFound(index)) => {
                debug!(index = %index, "query against missing index");
                QueryOutcome::default()
            }
            Err(error) => {
                warn!(index = self.index_name, reason = %error, "search failed");
                QueryOutcome {
                    results: Vec::new(),
                    error: Some(error),
                }
            }
        }
    }

    pub async fn try_search(
        &self,
        query_text: &str,
        top_k: usize,
    ) -> Result<Vec<QueryResult>, SearchError> {
        if query_text.trim().is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let query_vector = self.embedder.embed(query_text)?;
        let request = KnnRequest {
            query_vector,
            k: top_k,
            num_candidates: self.num_candidates.max(top_k),
        };

        let mut results = self.backend.knn_search(self.index_name, &request).await?;
        results.sort_by(|left, right| right.score.total_cmp(&left.score));
        results.truncate(top_k);
        Ok(results)
    }
}
