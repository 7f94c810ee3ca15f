//! CLI entry point for topicvec.
//!
//! Every command prints a JSON document on stdout. Logs and error details go
//! to stderr, and the process exit code follows `io::ExitCode`.

use anyhow::{Context, anyhow};
use clap::{
    Args, Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use serde::Serialize;
use serde_json::{Value, json};
use std::io::Read;
use std::path::{Path, PathBuf};
use topicvec::clustering::ClusterRequest;
use topicvec::io::ExitCode;
use topicvec::{
    ClusterParams, EmbeddingService, Item, ItemType, MetadataFilter,
    PersistentVectorStore, ServiceError, Settings, StoreReport, logging,
};

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// Embedding storage, search and clustering for topic items
#[derive(Parser)]
#[command(
    name = "topicvec",
    version = env!("CARGO_PKG_VERSION"),
    about = "Embed, search and cluster problem/solution items by topic",
    next_line_help = true,
    styles = clap_cargo_style()
)]
struct Cli {
    /// Path to custom settings.toml file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the vector store directory
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Metadata partition shared by `search` and `cluster`.
#[derive(Args)]
struct FilterArgs {
    /// Topic to restrict results to
    #[arg(long)]
    topic: String,

    /// Item type: problem or solution
    #[arg(long = "type", value_name = "TYPE")]
    item_type: String,

    /// Question to restrict results to
    #[arg(long)]
    question: Option<String>,
}

impl FilterArgs {
    fn to_filter(&self) -> Result<MetadataFilter, ServiceError> {
        let item_type: ItemType = self.item_type.parse()?;
        let filter = MetadataFilter::new(self.topic.clone(), item_type);
        Ok(match &self.question {
            Some(question) => filter.with_question(question.clone()),
            None => filter,
        })
    }
}

/// Available CLI commands
#[derive(Subcommand)]
enum Commands {
    /// Initialize project
    #[command(about = "Set up .topicvec directory with default configuration")]
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Show current configuration settings
    #[command(about = "Display active settings from .topicvec/settings.toml")]
    Config,

    #[command(
        about = "Embed items and store them",
        after_help = "Input is a JSON array of items:\n  [{\"id\": \"p1\", \"text\": \"...\", \"topicId\": \"t1\", \"itemType\": \"problem\"}]"
    )]
    Embed {
        /// JSON file with items, or '-' for stdin
        #[arg(short, long, default_value = "-")]
        input: String,
    },

    #[command(about = "Embed one text without storing it")]
    EmbedOnce {
        #[arg(short, long)]
        text: String,
    },

    #[command(about = "Find the stored items nearest to a vector or text")]
    Search {
        #[command(flatten)]
        filter: FilterArgs,

        /// JSON file holding the query vector as an array of numbers
        #[arg(long, conflicts_with = "text", required_unless_present = "text")]
        vector_file: Option<PathBuf>,

        /// Text to embed and use as the query
        #[arg(long)]
        text: Option<String>,

        /// Number of results
        #[arg(short, default_value_t = 10)]
        k: usize,
    },

    #[command(
        about = "Cluster stored items of one topic and type",
        after_help = "Examples:\n  topicvec cluster --topic t1 --type problem --n-clusters 3\n  topicvec cluster --topic t1 --type solution --method hierarchical --linkage average"
    )]
    Cluster {
        #[command(flatten)]
        filter: FilterArgs,

        /// kmeans or hierarchical
        #[arg(short, long, default_value = "kmeans")]
        method: String,

        /// Number of clusters for kmeans
        #[arg(short, long)]
        n_clusters: Option<String>,

        /// ward, complete, average or single
        #[arg(long)]
        linkage: Option<String>,

        /// Seed for reproducible kmeans runs
        #[arg(long)]
        seed: Option<u64>,
    },

    #[command(about = "Show item count and embedding setup of the store")]
    Stats,

    #[command(about = "Rewrite the store log keeping only live vectors")]
    Compact,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorOutput<'a> {
    status: String,
    message: String,
    suggestions: Vec<&'a str>,
}

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(code) => code.into(),
        Err(e) => report_error(&e).into(),
    }
}

fn report_error(e: &anyhow::Error) -> ExitCode {
    match e.downcast_ref::<ServiceError>() {
        Some(err) => {
            let output = ErrorOutput {
                status: err.status_code(),
                message: err.to_string(),
                suggestions: err.recovery_suggestions(),
            };
            match serde_json::to_string_pretty(&output) {
                Ok(text) => eprintln!("{text}"),
                Err(_) => eprintln!("Error: {err}"),
            }
            ExitCode::from_error(err)
        }
        None => {
            eprintln!("Error: {e:#}");
            ExitCode::GeneralError
        }
    }
}

fn load_settings(cli: &Cli) -> anyhow::Result<Settings> {
    let mut settings = match &cli.config {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    }
    .map_err(|e| ServiceError::Config {
        reason: e.to_string(),
    })?;

    if let Some(store) = &cli.store {
        settings.store_path = store.clone();
    }
    if cli.debug {
        settings.debug = true;
    }
    Ok(settings)
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn read_input(input: &str) -> anyhow::Result<String> {
    if input == "-" {
        let mut buffer = String::new();
        std::io::stdin()
            .read_to_string(&mut buffer)
            .context("failed to read items from stdin")?;
        Ok(buffer)
    } else {
        std::fs::read_to_string(input).with_context(|| format!("failed to read {input}"))
    }
}

fn read_vector(path: &Path) -> anyhow::Result<Vec<f32>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("{} must hold a JSON array of numbers", path.display()))
}

/// Numbers stay numbers so float truncation applies; anything else is a string.
fn cluster_count_value(raw: &str) -> Value {
    serde_json::from_str::<Value>(raw)
        .ok()
        .filter(Value::is_number)
        .unwrap_or_else(|| Value::String(raw.to_string()))
}

fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    // init must work before any settings file exists
    let settings = match &cli.command {
        Commands::Init { force } => {
            let path = Settings::init_config_file(*force).map_err(|e| anyhow!(e.to_string()))?;
            print_json(&json!({ "created": path }))?;
            return Ok(ExitCode::Success);
        }
        _ => load_settings(&cli)?,
    };
    logging::init(&settings.logging.level, settings.debug)?;

    match cli.command {
        Commands::Init { .. } => {}

        Commands::Config => {
            println!("{}", toml::to_string_pretty(&settings)?);
        }

        Commands::Embed { input } => {
            let items: Vec<Item> = serde_json::from_str(&read_input(&input)?)
                .context("input must be a JSON array of items")?;
            let service = EmbeddingService::from_settings(&settings)?;

            match service.try_generate_and_store(&items) {
                Ok(stored_count) => print_json(&StoreReport {
                    stored_count,
                    errors: Vec::new(),
                })?,
                Err(e) => {
                    print_json(&StoreReport {
                        stored_count: 0,
                        errors: vec![e.to_string()],
                    })?;
                    return Err(e.into());
                }
            }
        }

        Commands::EmbedOnce { text } => {
            let service = EmbeddingService::from_settings(&settings)?;
            let embedding = service.embed_once(&text)?;
            print_json(&json!({
                "dimension": embedding.len(),
                "embedding": embedding,
            }))?;
        }

        Commands::Search {
            filter,
            vector_file,
            text,
            k,
        } => {
            let filter = filter.to_filter()?;
            let service = EmbeddingService::from_settings(&settings)?;
            let query = match (vector_file, text) {
                (Some(path), _) => read_vector(&path)?,
                (None, Some(text)) => service.embed_once(&text)?,
                (None, None) => return Err(anyhow!("either --vector-file or --text is required")),
            };
            let results = service.search(&query, &filter, k)?;
            print_json(&results)?;
        }

        Commands::Cluster {
            filter,
            method,
            n_clusters,
            linkage,
            seed,
        } => {
            let filter = filter.to_filter()?;
            let mut params = ClusterParams::default();
            if let Some(raw) = n_clusters {
                params = params.with_n_clusters(cluster_count_value(&raw));
            }
            if let Some(linkage) = linkage {
                params = params.with_linkage(linkage);
            }
            if let Some(seed) = seed {
                params = params.with_seed(seed);
            }
            // Bad method or linkage fails before the store is opened
            ClusterRequest::resolve(&method, &params, &settings.clustering)
                .map_err(ServiceError::from)?;

            let service = EmbeddingService::from_settings(&settings)?;
            let outcome = service.cluster(&filter, &method, &params)?;
            print_json(&outcome)?;
        }

        Commands::Stats => {
            let service = EmbeddingService::from_settings(&settings)?;
            let stats = service.stats();
            print_json(&json!({
                "storePath": settings.store_path,
                "count": stats.count,
                "dimension": stats.dimension,
                "provider": stats.provider,
                "model": stats.model,
            }))?;
        }

        Commands::Compact => {
            let store = PersistentVectorStore::open(&settings.store_path, &settings.embedding.model)
                .map_err(ServiceError::from)?;
            let report = store.compact().map_err(ServiceError::from)?;
            print_json(&report)?;
        }
    }

    Ok(ExitCode::Success)
}
