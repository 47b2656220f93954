use clap::{Args, Parser, Subcommand};
use memory_coordinator::storage::BlobStore;
use memory_coordinator::{
    config::Config,
    memory::{GetContextOptions, MemoryParams},
    shared_state::MemorySystem,
    telemetry,
};
use serde_json::{json, Map, Value};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "memory-coordinator")]
#[command(version, about = "Conversation memory: context log, rolling summaries and semantic recall")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Database path (overrides MEMORY_DB_PATH)
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    /// Blob directory (overrides BLOB_ROOT)
    #[arg(long, global = true)]
    blob_root: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a memory space
    Create {
        #[arg(long)]
        app: String,
        /// Params as JSON, e.g. '{"summary_every_n": 3}'
        #[arg(long)]
        params: Option<String>,
    },

    /// Push a turn into a memory space
    Push {
        #[command(flatten)]
        space: SpaceArgs,
        /// Locator of content already in the blob store
        #[arg(long, required_unless_present = "file", conflicts_with = "file")]
        content_ref: Option<String>,
        /// Upload this file to the blob store first and push its locator
        #[arg(long)]
        file: Option<PathBuf>,
        #[arg(long)]
        description: Option<String>,
        /// Extra tags for the semantic index, as a JSON object
        #[arg(long)]
        metadata: Option<String>,
    },

    /// Logically delete a turn and drop it from semantic recall
    Delete {
        #[command(flatten)]
        space: SpaceArgs,
        #[arg(long)]
        content_ref: String,
    },

    /// Drop all semantic recall records of a memory space
    Clear {
        #[command(flatten)]
        space: SpaceArgs,
    },

    /// Show context locators and recall hits for a query
    Context {
        #[command(flatten)]
        space: SpaceArgs,
        #[command(flatten)]
        query: QueryArgs,
    },

    /// Answer a query from the memory space's context
    Answer {
        #[command(flatten)]
        space: SpaceArgs,
        #[command(flatten)]
        query: QueryArgs,
    },

    /// Database statistics
    Stats,
}

#[derive(Args)]
struct SpaceArgs {
    #[arg(long)]
    memory_id: String,
    #[arg(long)]
    app: String,
}

#[derive(Args)]
struct QueryArgs {
    #[arg(long)]
    query: String,
    #[arg(long, default_value_t = 1)]
    summary_k: usize,
    #[arg(long, default_value_t = 6)]
    recent_k: usize,
    #[arg(long, default_value_t = 5)]
    aux_top_k: usize,
    #[arg(long)]
    aux_threshold: Option<f32>,
}

impl From<&QueryArgs> for GetContextOptions {
    fn from(args: &QueryArgs) -> Self {
        Self {
            summary_k: args.summary_k,
            recent_k: args.recent_k,
            aux_top_k: Some(args.aux_top_k),
            aux_threshold: args.aux_threshold,
        }
    }
}

fn parse_metadata(raw: Option<&str>) -> anyhow::Result<Option<Map<String, Value>>> {
    raw.map(|s| {
        serde_json::from_str::<Map<String, Value>>(s)
            .map_err(|e| anyhow::anyhow!("--metadata must be a JSON object: {}", e))
    })
    .transpose()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init_tracing();
    let cli = Cli::parse();

    let mut config = Config::from_env()?;
    if let Some(db_path) = cli.db_path {
        config.db_path = db_path;
    }
    if let Some(blob_root) = cli.blob_root {
        config.blob_root = blob_root;
    }
    config.print_config();
    let system = MemorySystem::from_config(config)?;
    let coordinator = &system.coordinator;

    let output = match cli.command {
        Commands::Create { app, params } => {
            let params = params.as_deref().map(MemoryParams::from_json).transpose()?;
            let memory_id = coordinator.create_memory(&app, params)?;
            json!({ "memory_id": memory_id })
        }
        Commands::Push { space, content_ref, file, description, metadata } => {
            let metadata = parse_metadata(metadata.as_deref())?;
            let content_ref = match (content_ref, file) {
                (Some(content_ref), _) => content_ref,
                (None, Some(file)) => {
                    let text = tokio::fs::read_to_string(&file).await?;
                    let ext = file.extension().and_then(|e| e.to_str()).unwrap_or("json");
                    let key = system.blobs.make_key(&space.app, &space.memory_id, Some(ext));
                    system.blobs.put_text(&key, &text).await?
                }
                (None, None) => anyhow::bail!("either --content-ref or --file is required"),
            };
            let outcome = coordinator
                .safe_push(&space.memory_id, &space.app, &content_ref, description.as_deref(), metadata.as_ref())
                .await?;
            serde_json::to_value(outcome)?
        }
        Commands::Delete { space, content_ref } => {
            let removed = coordinator.delete_message(&space.memory_id, &space.app, &content_ref).await?;
            json!({ "deleted": content_ref, "aux_removed": removed })
        }
        Commands::Clear { space } => {
            let removed = coordinator.clear_memory(&space.memory_id, &space.app).await?;
            json!({ "aux_removed": removed })
        }
        Commands::Context { space, query } => {
            let refs = coordinator
                .get_context(&space.memory_id, &space.app, &query.query, &(&query).into())
                .await?;
            serde_json::to_value(refs)?
        }
        Commands::Answer { space, query } => {
            let answer = system
                .orchestrator
                .answer(&space.memory_id, &space.app, &query.query, &(&query).into())
                .await?;
            serde_json::to_value(answer)?
        }
        Commands::Stats => serde_json::to_value(system.database.get_stats()?)?,
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
