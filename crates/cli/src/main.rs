//! PaperScope CLI
//!
//! Thin presentation binding over the client core: lists and searches the
//! paper/entity projection, uploads and deletes papers, and dumps the graph
//! payload. All behavior lives in `paperscope-client`; this binary only
//! parses arguments and formats output.

use anyhow::Context;
use clap::{Parser, Subcommand};
use paperscope_client::{search, EntityQuery, HttpBackend, IndexEntry, Store};
use paperscope_common::{
    AppConfig, ENTITY_TYPE_LOC, ENTITY_TYPE_ORG, ENTITY_TYPE_PERSON, ENTITY_TYPE_WORK_OF_ART,
};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "paperscope", version, about = "Browse papers and the entities extracted from them")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List papers, optionally filtered by name
    Papers {
        /// Free-text filter on paper names
        query: Option<String>,
    },
    /// Show a single paper
    Paper { id: i64 },
    /// List or search entities
    Entities {
        /// Free-text filter on entity names
        query: Option<String>,
        /// Exact entity type tag (e.g. PERSON, ORG, WORK_OF_ART)
        #[arg(long = "type")]
        entity_type: Option<String>,
    },
    /// Upload a PDF and wait for the rebuilt index
    Upload { file: PathBuf },
    /// Delete a paper and wait for the rebuilt index
    Delete { id: i64 },
    /// Dump the relationship graph payload as JSON
    Graph,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("failed to load configuration")?;

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.observability.log_level.clone())),
        )
        .with_target(true)
        .init();

    info!(base_url = %config.api.base_url, "paperscope v{}", paperscope_common::VERSION);

    let backend = HttpBackend::new(config.api.base_url.clone(), config.request_timeout())?;
    let store = Store::new(backend, config);

    let cli = Cli::parse();
    match cli.command {
        Command::Papers { query } => {
            let papers = store.fetch_papers().await?;
            let matched = search::filter_papers(&papers, query.as_deref().unwrap_or(""));
            println!("{:<8} NAME", "ID");
            for paper in &matched {
                println!("{:<8} {}", paper.paper_id, paper.paper_name);
            }
            println!("{} papers", matched.len());
        }
        Command::Paper { id } => {
            let paper = store.fetch_paper(id).await?;
            println!("{:<8} {}", paper.paper_id, paper.paper_name);
            for occ in paper.entities.iter().flatten() {
                println!(
                    "  {:<12} {:<30} x{}",
                    occ.entity_type, occ.entity_name, occ.count
                );
            }
        }
        Command::Entities { query, entity_type } => {
            let entity_type = entity_type.map(|t| normalize_type_tag(&t));
            let results = store
                .search_entities(&EntityQuery::new(query.unwrap_or_default(), entity_type))
                .await?;
            print_entities(&results.entries);
            println!("{} entities ({:?} search)", results.total, results.mode);
            for warning in store.warnings() {
                eprintln!("warning: {}", warning);
            }
        }
        Command::Upload { file } => {
            let filename = file
                .file_name()
                .and_then(|n| n.to_str())
                .context("file path has no usable name")?
                .to_string();
            let bytes = tokio::fs::read(&file)
                .await
                .with_context(|| format!("failed to read {}", file.display()))?;
            let paper = store.upload_paper(&filename, bytes).await?;
            println!("uploaded paper {} ({})", paper.paper_id, paper.paper_name);
            print_entities(&store.entities());
        }
        Command::Delete { id } => {
            let ack = store.delete_paper(id).await?;
            println!("{}", ack.message);
            println!("{} papers remain", store.papers().len());
        }
        Command::Graph => {
            let graph = store.graph().await?;
            println!("{}", serde_json::to_string_pretty(&graph)?);
        }
    }

    Ok(())
}

/// Uppercase a type tag to match the backend's convention. The tag set is
/// open-ended, so unrecognized tags pass through with a warning instead of
/// being rejected.
fn normalize_type_tag(tag: &str) -> String {
    let tag = tag.to_uppercase();
    let known = [
        ENTITY_TYPE_PERSON,
        ENTITY_TYPE_ORG,
        ENTITY_TYPE_WORK_OF_ART,
        ENTITY_TYPE_LOC,
    ];
    if !known.contains(&tag.as_str()) {
        tracing::warn!(entity_type = %tag, "unrecognized entity type tag, forwarding as-is");
    }
    tag
}

fn print_entities(entries: &[IndexEntry]) {
    println!("{:<8} {:<12} {:<30} {:>7} {:>7}", "ID", "TYPE", "NAME", "PAPERS", "TOTAL");
    for entry in entries {
        println!(
            "{:<8} {:<12} {:<30} {:>7} {:>7}",
            entry.entity_id,
            entry.entity_type,
            entry.entity_name,
            entry.paper_count(),
            entry.total_count()
        );
    }
}
