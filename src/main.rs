use anyhow::{Context, Result};
use clap::Parser;
use querymesh::ai::provider_from_config;
use querymesh::{ConnectionRecord, EngineConfig, Orchestrator};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "querymesh")]
#[command(about = "Ask questions across heterogeneous data sources, read-only")]
struct Args {
    /// The question in natural language
    question: String,

    /// Path to a JSON file holding the connection list
    #[arg(short, long, default_value = "connections.json")]
    connections: PathBuf,

    /// Conversation id to continue; a fresh one is generated otherwise
    #[arg(long)]
    conversation: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let config = EngineConfig::from_env();

    let raw = std::fs::read_to_string(&args.connections)
        .with_context(|| format!("reading {}", args.connections.display()))?;
    let connections: Vec<ConnectionRecord> =
        serde_json::from_str(&raw).context("parsing connection list")?;

    let conversation_id = args
        .conversation
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    info!(conversation = %conversation_id, sources = connections.len(), "processing question");

    let provider = provider_from_config(&config);
    let orchestrator = Orchestrator::new(config, provider);
    let outcome = orchestrator
        .process_message(&conversation_id, &args.question, &connections)
        .await;

    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}
