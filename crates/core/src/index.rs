use crate::models::IndexSchema;
use crate::traits::VectorBackend;
use crate::SearchError;
use tracing::{debug, info};

/// Owns the lifecycle of one index: create with the fixed schema, validate,
/// drop.
pub struct IndexManager<'a, B: ?Sized> {
    backend: &'a B,
    index_name: &'a str,
    schema: IndexSchema,
}

impl<'a, B> IndexManager<'a, B>
where
    B: VectorBackend + ?Sized,
{
    pub fn new(backend: &'a B, index_name: &'a str, schema: IndexSchema) -> Self {
        Self {
            backend,
            index_name,
            schema,
        }
    }

    /// Creates the index when absent. An existing index must carry the same
    /// schema, otherwise this fails with [`SearchError::Schema`].
    pub async fn ensure_index(&self) -> Result<(), SearchError> {
        if !self.backend.index_exists(self.index_name).await? {
            self.backend
                .create_index(self.index_name, &self.schema)
                .await?;
            info!(
                index = self.index_name,
                dimensions = self.schema.dimensions,
                "created index"
            );
            return Ok(());
        }

        self.validate().await?;
        debug!(index = self.index_name, "index already present");
        Ok(())
    }

    /// Checks the stored schema; `Ok(false)` when the index does not exist.
    pub async fn validate(&self) -> Result<bool, SearchError> {
        match self.backend.index_schema(self.index_name).await? {
            None => Ok(false),
            Some(stored) if stored == self.schema => Ok(true),
            Some(stored) => Err(SearchError::Schema {
                index: self.index_name.to_string(),
                details: format!(
                    "embedding dimension is {}, expected {}",
                    stored.dimensions, self.schema.dimensions
                ),
            }),
        }
    }

    pub async fn delete_index(&self) -> Result<(), SearchError> {
        self.backend.delete_index(self.index_name).await?;
        info!(index = self.index_name, "deleted index");
        Ok(())
    }

    /// Drops and recreates the index so no stale documents survive.
    pub async fn reset(&self) -> Result<(), SearchError> {
        self.delete_index().await?;
        self.ensure_index().await
    }
}
