use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use semantic_search_core::{
    CharacterNgramEmbedder, ElasticsearchConfig, ElasticsearchStore, Embedder, IndexStatus,
    MemoryStore, QueryOutcome, ReindexReport, SearchSettings, SemanticSearch, VectorBackend,
};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "semantic-search", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Which index backend to use.
    #[arg(long, value_enum, default_value = "elasticsearch")]
    backend: BackendKind,

    /// Elasticsearch base URL
    #[arg(long, env = "SEMANTIC_SEARCH_URL", default_value = "http://localhost:9200")]
    elasticsearch_url: String,

    /// Index name
    #[arg(long, env = "SEMANTIC_SEARCH_INDEX", default_value = "semantic_search")]
    index: String,

    /// Timeout for every request to the backend, in seconds.
    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,

    /// Skip TLS certificate verification.
    #[arg(long, default_value_t = false)]
    insecure: bool,

    /// CSV column that holds the text to index.
    #[arg(long, env = "SEMANTIC_SEARCH_TEXT_COLUMN", default_value = "texto")]
    text_column: String,

    /// kNN candidate pool size.
    #[arg(long, default_value_t = 10)]
    num_candidates: usize,

    /// Documents per bulk request.
    #[arg(long, default_value_t = 500)]
    batch_size: usize,

    /// Also read files in sub-folders.
    #[arg(long, default_value_t = false)]
    recursive: bool,

    /// Directory with config.json, tokenizer.json and model.safetensors.
    #[cfg(feature = "minilm")]
    #[arg(long, env = "SEMANTIC_SEARCH_MODEL_DIR")]
    model_dir: Option<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum)]
enum BackendKind {
    Elasticsearch,
    Memory,
}

#[derive(Subcommand)]
enum Command {
    /// Drop the index, recreate it and index every file in the folder.
    Reindex {
        #[arg(long, default_value = "data")]
        folder: PathBuf,
    },
    /// Run one semantic query.
    Search {
        #[arg(long)]
        query: String,
        #[arg(long, default_value_t = 3)]
        top_k: usize,
    },
    /// Report whether the index exists and matches the expected schema.
    Status,
    /// Interactive loop: type a query, `:reindex` or `:quit`.
    Shell {
        #[arg(long, default_value = "data")]
        folder: PathBuf,
        #[arg(long, default_value_t = 3)]
        top_k: usize,
    },
}

impl Cli {
    fn settings(&self) -> SearchSettings {
        SearchSettings {
            index_name: self.index.clone(),
            text_column: self.text_column.clone(),
            num_candidates: self.num_candidates,
            batch_size: self.batch_size,
            recursive: self.recursive,
        }
    }

    fn elasticsearch_config(&self) -> ElasticsearchConfig {
        ElasticsearchConfig {
            endpoint: self.elasticsearch_url.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
            accept_invalid_certs: self.insecure,
        }
    }

    #[cfg(feature = "minilm")]
    fn embedder(&self) -> anyhow::Result<Box<dyn Embedder>> {
        match &self.model_dir {
            Some(model_dir) => {
                let embedder = semantic_search_core::MiniLmEmbedder::load(model_dir)?;
                info!(
                    embedder = "minilm",
                    model_dir = %model_dir.display(),
                    dimensions = embedder.dimensions(),
                    "embedder selected"
                );
                Ok(Box::new(embedder))
            }
            None => Ok(fallback_embedder()),
        }
    }

    #[cfg(not(feature = "minilm"))]
    fn embedder(&self) -> anyhow::Result<Box<dyn Embedder>> {
        Ok(fallback_embedder())
    }
}

fn fallback_embedder() -> Box<dyn Embedder> {
    let embedder = CharacterNgramEmbedder::default();
    let dimensions = embedder.dimensions();
    warn!(
        dimensions,
        "no embedding model configured, using character n-gram embedder"
    );
    info!(embedder = "character-ngram", dimensions, "embedder selected");
    Box::new(embedder)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        "semantic-search boot"
    );

    let embedder = cli.embedder()?;
    match cli.backend {
        BackendKind::Elasticsearch => {
            let store = ElasticsearchStore::new(&cli.elasticsearch_config())?;
            run(&cli, store, embedder).await
        }
        BackendKind::Memory => run(&cli, MemoryStore::new(), embedder).await,
    }
}

async fn run<B: VectorBackend>(
    cli: &Cli,
    backend: B,
    embedder: Box<dyn Embedder>,
) -> anyhow::Result<()> {
    let search = match SemanticSearch::connect(backend, embedder, cli.settings()).await {
        Ok(search) => search,
        Err(error) => {
            error!(reason = %error, "search backend unavailable");
            anyhow::bail!("cannot start: {error}. Is the search backend running?");
        }
    };

    match &cli.command {
        Command::Reindex { folder } => {
            let report = reindex(&search, folder).await?;
            if !report.outcome.did_run() {
                anyhow::bail!("indexing did not run");
            }
        }
        Command::Search { query, top_k } => {
            print_results(&search.search(query, *top_k).await);
        }
        Command::Status => match search.status().await {
            Ok(IndexStatus::Ready) => println!("index `{}` is ready", cli.index),
            Ok(IndexStatus::Missing) => println!("index `{}` does not exist", cli.index),
            Err(error) => anyhow::bail!(error),
        },
        Command::Shell { folder, top_k } => shell(&search, folder, *top_k).await?,
    }

    Ok(())
}

async fn reindex<B: VectorBackend, E: Embedder>(
    search: &SemanticSearch<B, E>,
    folder: &Path,
) -> anyhow::Result<ReindexReport> {
    info!(folder = %folder.display(), "re-indexing");
    let report = search.reindex(folder).await?;

    for skipped in &report.skipped_files {
        warn!(path = %skipped.path.display(), reason = %skipped.reason, "skipped file");
    }

    if report.outcome.did_run() {
        println!(
            "indexing finished: {} documents indexed at {}",
            report.outcome.success_count,
            Utc::now().to_rfc3339()
        );
        if report.outcome.failure_count > 0 {
            println!("{} documents failed", report.outcome.failure_count);
        }
    } else {
        println!("indexing did not run; see the log for the cause");
    }
    if !report.skipped_files.is_empty() {
        println!("{} files skipped", report.skipped_files.len());
    }

    Ok(report)
}

fn print_results(outcome: &QueryOutcome) {
    if let Some(error) = &outcome.error {
        println!("search error: {error}");
    }

    if outcome.results.is_empty() {
        println!("no results found");
        return;
    }

    for (rank, result) in outcome.results.iter().enumerate() {
        println!("[{}] score={:.4} source={}", rank + 1, result.score, result.source_file);
        println!("  {}", result.text);
    }
}

async fn shell<B: VectorBackend, E: Embedder>(
    search: &SemanticSearch<B, E>,
    folder: &Path,
    top_k: usize,
) -> anyhow::Result<()> {
    println!("type a query, `:reindex` to rebuild the index or `:quit` to exit");
    let stdin = io::stdin();

    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }

        match line.trim() {
            "" => continue,
            ":quit" | ":q" => break,
            ":reindex" => {
                if let Err(error) = reindex(search, folder).await {
                    println!("re-indexing failed: {error}");
                }
            }
            query => print_results(&search.search(query, top_k).await),
        }
    }

    Ok(())
}
