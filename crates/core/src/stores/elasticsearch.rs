use crate::models::{
    BulkItemError, BulkResponse, DocumentChunk, IndexSchema, KnnRequest, QueryResult,
    EMBEDDING_FIELD, SOURCE_FILE_FIELD, TEXT_FIELD,
};
use crate::traits::VectorBackend;
use crate::SearchError;
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;
use url::Url;

const BACKEND: &str = "elasticsearch";

/// The `_source` fields a kNN hit is projected to.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct StoredDocument {
    text: String,
    source_file: String,
}

#[derive(Debug, Clone)]
pub struct ElasticsearchConfig {
    pub endpoint: String,
    pub timeout: Duration,
    pub accept_invalid_certs: bool,
}

impl Default for ElasticsearchConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:9200".to_string(),
            timeout: Duration::from_secs(30),
            accept_invalid_certs: false,
        }
    }
}

pub struct ElasticsearchStore {
    client: Client,
    endpoint: String,
}

impl ElasticsearchStore {
    pub fn new(config: &ElasticsearchConfig) -> Result<Self, SearchError> {
        Url::parse(&config.endpoint)?;

        let client = Client::builder()
            .timeout(config.timeout)
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()
            .map_err(SearchError::Http)?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.endpoint, path)
    }

    fn transport(&self, error: reqwest::Error) -> SearchError {
        SearchError::from_transport(&self.endpoint, error)
    }

    async fn backend_error(&self, response: Response) -> SearchError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        SearchError::BackendResponse {
            backend: BACKEND.to_string(),
            details: if body.is_empty() {
                status.to_string()
            } else {
                format!("{status}: {body}")
            },
        }
    }
}

#[async_trait]
impl VectorBackend for ElasticsearchStore {
    async fn ping(&self) -> Result<(), SearchError> {
        let response = self
            .client
            .head(format!("{}/", self.endpoint))
            .send()
            .await
            .map_err(|error| SearchError::Connectivity {
                endpoint: self.endpoint.clone(),
                details: error.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(SearchError::Connectivity {
                endpoint: self.endpoint.clone(),
                details: format!("liveness check returned {}", response.status()),
            });
        }
        Ok(())
    }

    async fn index_exists(&self, index: &str) -> Result<bool, SearchError> {
        let response = self
            .client
            .head(self.url(index))
            .send()
            .await
            .map_err(|error| self.transport(error))?;

        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(self.backend_error(response).await),
        }
    }

    async fn create_index(&self, index: &str, schema: &IndexSchema) -> Result<(), SearchError> {
        let response = self
            .client
            .put(self.url(index))
            .json(&json!({ "mappings": schema_mapping(schema) }))
            .send()
            .await
            .map_err(|error| self.transport(error))?;

        if response.status().is_success() {
            return Ok(());
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::BAD_REQUEST && body.contains("resource_already_exists_exception") {
            debug!(index, "index created concurrently");
            return Ok(());
        }

        Err(SearchError::Request(format!(
            "index setup for `{index}` failed with {status}: {body}"
        )))
    }

    async fn delete_index(&self, index: &str) -> Result<(), SearchError> {
        let response = self
            .client
            .delete(format!("{}?ignore_unavailable=true", self.url(index)))
            .send()
            .await
            .map_err(|error| self.transport(error))?;

        if response.status().is_success() || response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        Err(self.backend_error(response).await)
    }

    async fn index_schema(&self, index: &str) -> Result<Option<IndexSchema>, SearchError> {
        let response = self
            .client
            .get(self.url(&format!("{index}/_mapping")))
            .send()
            .await
            .map_err(|error| self.transport(error))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(self.backend_error(response).await);
        }

        let body: Value = response.json().await.map_err(|error| self.transport(error))?;
        parse_schema(index, &body).map(Some)
    }

    async fn bulk_write(
        &self,
        index: &str,
        entries: &[DocumentChunk],
    ) -> Result<BulkResponse, SearchError> {
        if entries.is_empty() {
            return Ok(BulkResponse::default());
        }

        let response = self
            .client
            .post(self.url(&format!("{index}/_bulk")))
            .header("Content-Type", "application/x-ndjson")
            .body(bulk_payload(entries)?)
            .send()
            .await
            .map_err(|error| self.transport(error))?;

        if !response.status().is_success() {
            return Err(self.backend_error(response).await);
        }

        let body: Value = response.json().await.map_err(|error| self.transport(error))?;
        parse_bulk_response(&body)
    }

    async fn refresh(&self, index: &str) -> Result<(), SearchError> {
        let response = self
            .client
            .post(self.url(&format!("{index}/_refresh")))
            .send()
            .await
            .map_err(|error| self.transport(error))?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Err(SearchError::IndexNotFound(index.to_string())),
            _ => Err(self.backend_error(response).await),
        }
    }

    async fn knn_search(
        &self,
        index: &str,
        request: &KnnRequest,
    ) -> Result<Vec<QueryResult>, SearchError> {
        let response = self
            .client
            .post(self.url(&format!("{index}/_search")))
            .json(&knn_body(request))
            .send()
            .await
            .map_err(|error| self.transport(error))?;

        match response.status() {
            status if status.is_success() => {}
            StatusCode::NOT_FOUND => return Err(SearchError::IndexNotFound(index.to_string())),
            _ => return Err(self.backend_error(response).await),
        }

        let body: Value = response.json().await.map_err(|error| self.transport(error))?;
        Ok(parse_hits(&body))
    }
}

pub fn schema_mapping(schema: &IndexSchema) -> Value {
    json!({
        "properties": {
            TEXT_FIELD: {"type": "text"},
            EMBEDDING_FIELD: {
                "type": "dense_vector",
                "dims": schema.dimensions,
                "index": true,
                "similarity": "cosine"
            },
            SOURCE_FILE_FIELD: {"type": "keyword"}
        }
    })
}

/// Reads the schema back from a `GET /{index}/_mapping` response.
pub fn parse_schema(index: &str, body: &Value) -> Result<IndexSchema, SearchError> {
    let schema_error = |details: String| SearchError::Schema {
        index: index.to_string(),
        details,
    };

    let properties = body
        .get(index)
        .or_else(|| body.as_object().and_then(|indices| indices.values().next()))
        .and_then(|mapping| mapping.pointer("/mappings/properties"))
        .ok_or_else(|| schema_error("mapping has no properties".to_string()))?;

    let field_type = |field: &str| {
        properties
            .pointer(&format!("/{field}/type"))
            .and_then(Value::as_str)
            .unwrap_or("missing")
            .to_string()
    };

    for (field, expected) in [
        (TEXT_FIELD, "text"),
        (EMBEDDING_FIELD, "dense_vector"),
        (SOURCE_FILE_FIELD, "keyword"),
    ] {
        let actual = field_type(field);
        if actual != expected {
            return Err(schema_error(format!(
                "field `{field}` is `{actual}`, expected `{expected}`"
            )));
        }
    }

    let dimensions = properties
        .pointer(&format!("/{EMBEDDING_FIELD}/dims"))
        .and_then(Value::as_u64)
        .ok_or_else(|| schema_error(format!("field `{EMBEDDING_FIELD}` declares no dims")))?;

    Ok(IndexSchema::new(dimensions as usize))
}

pub fn bulk_payload(entries: &[DocumentChunk]) -> Result<String, SearchError> {
    let mut lines = Vec::with_capacity(entries.len() * 2);
    for entry in entries {
        lines.push(serde_json::to_string(&json!({
            "index": { "_id": entry.chunk_id }
        }))?);
        lines.push(serde_json::to_string(entry)?);
    }
    Ok(lines.join("\n") + "\n")
}

pub fn parse_bulk_response(body: &Value) -> Result<BulkResponse, SearchError> {
    let items = body
        .get("items")
        .and_then(Value::as_array)
        .ok_or_else(|| SearchError::BackendResponse {
            backend: BACKEND.to_string(),
            details: "bulk response has no items".to_string(),
        })?;

    let mut response = BulkResponse::default();
    for item in items {
        let action = item
            .as_object()
            .and_then(|actions| actions.values().next())
            .cloned()
            .unwrap_or(Value::Null);
        let status = action.get("status").and_then(Value::as_u64).unwrap_or(0);

        if (200..300).contains(&status) {
            response.succeeded += 1;
            continue;
        }

        let reason = action
            .pointer("/error/reason")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("status {status}"));
        response.errors.push(BulkItemError {
            chunk_id: action
                .get("_id")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            reason,
        });
    }

    Ok(response)
}

pub fn knn_body(request: &KnnRequest) -> Value {
    json!({
        "knn": {
            "field": EMBEDDING_FIELD,
            "query_vector": request.query_vector,
            "k": request.k,
            "num_candidates": request.num_candidates
        },
        "size": request.k,
        "_source": [TEXT_FIELD, SOURCE_FILE_FIELD]
    })
}

pub fn parse_hits(body: &Value) -> Vec<QueryResult> {
    body.pointer("/hits/hits")
        .and_then(Value::as_array)
        .map(|hits| {
            hits.iter()
                .map(|hit| {
                    let source = hit
                        .get("_source")
                        .and_then(|source| StoredDocument::deserialize(source).ok())
                        .unwrap_or_default();
                    QueryResult {
                        text: source.text,
                        source_file: source.source_file,
                        score: hit.get("_score").and_then(Value::as_f64).unwrap_or(0.0),
                    }
                })
                .collect()
        })
        .unwrap_or_default()
}
