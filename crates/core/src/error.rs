use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("csv file has no `{column}` column: {path}")]
    MissingColumn { column: String, path: String },

    #[error("file is not valid utf-8: {0}")]
    InvalidUtf8(String),

    #[error("regex error: {0}")]
    RegexError(#[from] regex::Error),

    #[error("path has no file name: {0}")]
    MissingFileName(String),

    #[error(transparent)]
    Embedding(#[from] EmbedError),
}

#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("embedding model error: {0}")]
    Model(String),

    #[error("cannot load embedding model: {0}")]
    Load(String),

    #[error("embedding has {actual} dimensions, expected {expected}")]
    Dimensions { expected: usize, actual: usize },
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("search backend unreachable at {endpoint}: {details}")]
    Connectivity { endpoint: String, details: String },

    #[error("request to search backend timed out: {0}")]
    Timeout(String),

    #[error("index `{index}` has an incompatible schema: {details}")]
    Schema { index: String, details: String },

    #[error("index `{0}` does not exist")]
    IndexNotFound(String),

    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("http error: {0}")]
    Http(reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("search request failed: {0}")]
    Request(String),

    #[error(transparent)]
    Embedding(#[from] EmbedError),

    #[error("ingestion setup failed: {0}")]
    Ingest(#[from] IngestError),
}

impl SearchError {
    /// Maps a transport failure to `Timeout`, `Connectivity` or `Http`.
    pub fn from_transport(endpoint: &str, error: reqwest::Error) -> Self {
        if error.is_timeout() {
            SearchError::Timeout(error.to_string())
        } else if error.is_connect() {
            SearchError::Connectivity {
                endpoint: endpoint.to_string(),
                details: error.to_string(),
            }
        } else {
            SearchError::Http(error)
        }
    }
}
