//! CLI entry point for the Mneme web memory (for dev and testing).

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use mneme_core::{
    answer_query, app_data_dir, decide, load_config, status, AddOutcome, Config, HttpFetcher, Ingestor,
    MemoryDir, MemoryEngine, MemoryRecord, OllamaClient, RecordKind, SearchFilters, SearchQuery,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mneme")]
#[command(about = "Mneme: semantic memory for the pages you read")]
struct Cli {
    /// Memory directory (overrides config).
    #[arg(long, global = true, value_name = "PATH")]
    memory_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Show backend status (for dev).
    Status,
    /// Show where Mneme stores its config and memory (app data directory).
    DataDir,
    /// Fetch pages and add them to memory.
    Ingest {
        #[arg(value_name = "URL", required = true)]
        urls: Vec<String>,
        #[arg(long)]
        session: Option<String>,
    },
    /// Add text directly, without fetching.
    Add {
        url: String,
        #[arg(long, default_value = "")]
        title: String,
        /// Read content from this file instead of `--text`.
        #[arg(long, conflicts_with = "text")]
        file: Option<PathBuf>,
        #[arg(long)]
        text: Option<String>,
        #[arg(long, default_value = "fact")]
        kind: RecordKind,
        #[arg(long)]
        session: Option<String>,
        #[arg(long = "tag")]
        tags: Vec<String>,
    },
    /// Semantic search over memory; prints JSON.
    Search {
        query: String,
        #[arg(long)]
        top_k: Option<usize>,
        #[arg(long)]
        kind: Option<RecordKind>,
        #[arg(long = "tag")]
        tags: Vec<String>,
        #[arg(long)]
        session: Option<String>,
    },
    /// Page and embedding counts, index size.
    Stats,
    /// Ask the planner for its next step, grounded in memory.
    Plan { query: String },
    /// Search, then have the planner re-rank the hits and answer; prints JSON.
    Ask {
        query: String,
        #[arg(long)]
        top_k: Option<usize>,
        /// Plan to show the planner alongside the results.
        #[arg(long)]
        plan: Option<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

type CliResult = Result<(), Box<dyn std::error::Error>>;

async fn run(cli: Cli) -> CliResult {
    let config = load_config();
    let command = cli.command.unwrap_or(Commands::Status);
    match command {
        Commands::Status => {
            println!("Mneme backend");
            println!("  core: {}", status());
            Ok(())
        }
        Commands::DataDir => {
            match app_data_dir() {
                Some(p) => println!("{}", p.display()),
                None => eprintln!("Could not determine app data directory."),
            }
            Ok(())
        }
        Commands::Ingest { urls, session } => {
            let (engine, _) = open_engine(&config, cli.memory_dir)?;
            let fetcher = HttpFetcher::new(config.fetch_timeout())?;
            let ingestor = Ingestor::new(Arc::new(fetcher), Arc::new(engine));
            for (url, res) in ingestor.ingest_batch(&urls, session.as_deref()).await {
                match res {
                    Ok(outcome) => println!("{url}  {}", describe(&outcome)),
                    Err(e) => println!("{url}  failed: {e}"),
                }
            }
            Ok(())
        }
        Commands::Add { url, title, file, text, kind, session, tags } => {
            let content = match (file, text) {
                (Some(path), _) => std::fs::read_to_string(path)?,
                (None, Some(text)) => text,
                (None, None) => return Err("either --file or --text is required".into()),
            };
            let (engine, _) = open_engine(&config, cli.memory_dir)?;
            let mut record = MemoryRecord::new(url, title, content).with_kind(kind);
            record.session_id = session;
            record.tags.extend(tags);
            let outcome = engine.add(record).await?;
            println!("{}", describe(&outcome));
            Ok(())
        }
        Commands::Search { query, top_k, kind, tags, session } => {
            let (engine, _) = open_engine(&config, cli.memory_dir)?;
            let filters = SearchFilters { kind, tags, session_id: session };
            let query = SearchQuery::new(query)
                .top_k(top_k.unwrap_or(config.top_k))
                .filters(filters);
            let res = engine.search(&query).await;
            println!("{}", serde_json::to_string_pretty(&res)?);
            Ok(())
        }
        Commands::Stats => {
            let (engine, _) = open_engine(&config, cli.memory_dir)?;
            println!("{}", serde_json::to_string_pretty(&engine.stats().await)?);
            Ok(())
        }
        Commands::Plan { query } => {
            let (engine, client) = open_engine(&config, cli.memory_dir)?;
            let decision = decide(&client, &engine, &query, config.top_k).await?;
            println!("{decision:?}");
            Ok(())
        }
        Commands::Ask { query, top_k, plan } => {
            let (engine, client) = open_engine(&config, cli.memory_dir)?;
            let query = SearchQuery::new(query).top_k(top_k.unwrap_or(config.top_k));
            let res = answer_query(&client, &engine, &query, plan.as_deref()).await;
            println!("{}", serde_json::to_string_pretty(&res)?);
            Ok(())
        }
    }
}

fn open_engine(
    config: &Config,
    memory_dir: Option<PathBuf>,
) -> Result<(MemoryEngine, OllamaClient), Box<dyn std::error::Error>> {
    let root = memory_dir
        .or_else(|| config.resolved_memory_dir())
        .ok_or("could not determine memory directory")?;
    let client = OllamaClient::from_url(&config.ollama_url)?
        .with_embed_model(config.embed_model.clone())
        .with_plan_model(config.plan_model.clone());
    tracing::debug!(dir = %root.display(), model = client.embed_model(), "opening memory");
    let engine = MemoryEngine::open(
        MemoryDir::new(root),
        Arc::new(client.clone()),
        config.engine_options()?,
    )?;
    Ok((engine, client))
}

fn describe(outcome: &AddOutcome) -> String {
    match outcome {
        AddOutcome::Indexed { chunks } => format!("indexed ({chunks} chunks)"),
        AddOutcome::Unchanged => "unchanged".into(),
        AddOutcome::Skipped => "skipped (empty)".into(),
        AddOutcome::Unindexable(reason) => format!("skipped: {reason}"),
    }
}
