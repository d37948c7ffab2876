//! Command-line driver for the Intelligence Vault.
//!
//! Stores tenant collections as JSON snapshots under `--data-dir` and embeds
//! text with the local [`HashEmbeddingProvider`], so it runs fully offline.
//! Every command prints its result as pretty JSON on stdout; logs go to stderr.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::{Value, json};
use vault_rag::hash::DEFAULT_HASH_DIMENSIONS;
use vault_rag::{
    ChunkingStrategy, Document, FileVectorIndex, HashEmbeddingProvider, Metadata, MetadataFilter,
    RetrievalEngine, TenantId, VaultConfig, VaultError,
};

#[derive(Parser, Debug)]
#[command(name = "vault")]
#[command(about = "Intelligence Vault - multi-tenant semantic memory", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Directory holding the collection snapshots
    #[arg(long, global = true, env = "VAULT_DATA_DIR", default_value = "./vault-data")]
    pub data_dir: PathBuf,

    /// YAML config file; VAULT_* environment variables override it
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,

    /// Embedding dimension of the hash embedder
    #[arg(long, global = true)]
    pub dimensions: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Chunk, embed and store a document for a tenant
    Ingest {
        #[arg(long)]
        tenant: TenantId,

        /// Read the document from a file
        #[arg(long, conflicts_with = "text", required_unless_present = "text")]
        file: Option<PathBuf>,

        /// Use the given text as the document
        #[arg(long)]
        text: Option<String>,

        /// Force a strategy instead of classifying the content
        #[arg(long)]
        strategy: Option<ChunkingStrategy>,

        /// Document metadata as key=value (repeatable)
        #[arg(long = "meta", value_parser = parse_key_value)]
        meta: Vec<(String, String)>,
    },

    /// Find the chunks of a tenant most similar to a query
    Retrieve {
        #[arg(long)]
        tenant: TenantId,

        #[arg(short, long)]
        query: String,

        /// Number of results (defaults to the configured top-k)
        #[arg(short)]
        k: Option<usize>,

        /// Only return chunks whose metadata has key=value (repeatable)
        #[arg(long = "filter", value_parser = parse_key_value)]
        filter: Vec<(String, String)>,
    },

    /// Show chunk count, size and strategies for a tenant
    Stats {
        #[arg(long)]
        tenant: TenantId,
    },

    /// Irreversibly delete a tenant's collection
    Delete {
        #[arg(long)]
        tenant: TenantId,
    },

    /// List tenants that have a collection
    Tenants,
}

/// Parse `key=value`.
pub fn parse_key_value(raw: &str) -> std::result::Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(format!("expected key=value, got '{raw}'")),
    }
}

/// Load the config file (if any), then apply `VAULT_*` environment overrides.
pub fn load_config(path: Option<&Path>) -> Result<VaultConfig> {
    load_config_with(path, |key| std::env::var(key).ok())
}

fn load_config_with(path: Option<&Path>, lookup: impl Fn(&str) -> Option<String>) -> Result<VaultConfig> {
    let base = match path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config file {}", path.display()))?;
            serde_yaml::from_str::<VaultConfig>(&raw)
                .with_context(|| format!("invalid config file {}", path.display()))?
        }
        None => VaultConfig::default(),
    };
    Ok(base.with_overrides(lookup)?)
}

/// Open the data directory and assemble an engine over it.
pub fn build_engine(cli: &Cli, config: VaultConfig) -> Result<RetrievalEngine> {
    let dimensions = cli.dimensions.or(config.embedding_dimension).unwrap_or(DEFAULT_HASH_DIMENSIONS);
    let index = FileVectorIndex::open(&cli.data_dir)
        .with_context(|| format!("failed to open data directory {}", cli.data_dir.display()))?;

    Ok(RetrievalEngine::builder()
        .config(config)
        .embedding_provider(Arc::new(HashEmbeddingProvider::new(dimensions)))
        .vector_index(Arc::new(index))
        .build()?)
}

/// Execute the parsed command and return its JSON result.
pub async fn run(cli: &Cli) -> Result<Value> {
    let config = load_config(cli.config.as_deref())?;
    let engine = build_engine(cli, config)?;
    execute(&engine, &cli.command).await
}

pub async fn execute(engine: &RetrievalEngine, command: &Commands) -> Result<Value> {
    match command {
        Commands::Ingest { tenant, file, text, strategy, meta } => {
            let document = match (file, text) {
                (Some(path), _) => {
                    let bytes = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
                    Document::from_bytes(&bytes)?.with_source_uri(path.display().to_string())
                }
                (None, Some(text)) => Document::new(text.clone()),
                (None, None) => bail!("either --file or --text is required"),
            };
            let metadata: Metadata = meta.iter().cloned().collect();
            let document = document.with_metadata(metadata);

            let summary = match strategy {
                Some(strategy) => engine.ingest_with_strategy(tenant, &document, *strategy).await?,
                None => engine.ingest(tenant, &document).await?,
            };
            Ok(serde_json::to_value(summary)?)
        }
        Commands::Retrieve { tenant, query, k, filter } => {
            let k = k.unwrap_or(engine.config().default_top_k);
            let filter = MetadataFilter::from(filter.iter().cloned().collect::<Metadata>());
            let hits = engine.retrieve(tenant, query, k, Some(&filter)).await?;
            Ok(serde_json::to_value(hits)?)
        }
        Commands::Stats { tenant } => {
            let stats = engine.stats(tenant).await?;
            Ok(json!({ "tenant": tenant, "stats": stats }))
        }
        Commands::Delete { tenant } => {
            engine.delete_tenant(tenant).await?;
            Ok(json!({ "tenant": tenant, "deleted": true }))
        }
        Commands::Tenants => Ok(serde_json::to_value(engine.tenants().await?)?),
    }
}
