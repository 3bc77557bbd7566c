//! Structure-tree extractor CLI
//!
//! Recovers a hierarchical section outline (with page ranges) from a PDF
//! using LLM-driven TOC discovery, indexing, and validation.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Instant;
use toc_tree_extractor::{
    config::Config,
    llm::LlmClient,
    pdf::load_pdf,
    persistence::{load_tree, save_tree, tree_exists, tree_size},
    pipeline::{IndexerOptions, TreeIndexer},
};
use tracing_subscriber::EnvFilter;

/// Structure-tree extractor - recover a section outline from a PDF via LLM
#[derive(Parser)]
#[command(name = "toc-tree")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract the structure tree of a PDF document
    Index {
        /// Path to the PDF file
        document: PathBuf,

        /// Output path for the structure tree file
        #[arg(short, long, default_value = "data/structure_tree.json")]
        output: PathBuf,

        /// Leading pages scanned for a table of contents
        #[arg(long)]
        toc_check_pages: Option<usize>,

        /// Page-span threshold for subdividing a node
        #[arg(long)]
        max_pages_per_node: Option<usize>,

        /// Token threshold for subdividing a node (also the window budget)
        #[arg(long)]
        max_tokens_per_node: Option<usize>,

        /// Write pre-order node ids into the tree
        #[arg(long)]
        node_id: bool,

        /// Generate a per-node summary via the LLM
        #[arg(long)]
        node_summary: bool,

        /// Generate a one-sentence document description
        #[arg(long)]
        doc_description: bool,

        /// Attach raw page text to every node
        #[arg(long)]
        node_text: bool,
    },

    /// Display the structure of a saved tree
    Show {
        /// Path to the structure tree file
        #[arg(default_value = "data/structure_tree.json")]
        index: PathBuf,

        /// Output as JSON instead of formatted tree
        #[arg(long)]
        json: bool,
    },

    /// Show information about a saved tree
    Info {
        /// Path to the structure tree file
        #[arg(default_value = "data/structure_tree.json")]
        index: PathBuf,
    },

    /// Test LLM connection
    Test,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Index {
            document,
            output,
            toc_check_pages,
            max_pages_per_node,
            max_tokens_per_node,
            node_id,
            node_summary,
            doc_description,
            node_text,
        } => {
            cmd_index(
                document,
                output,
                toc_check_pages,
                max_pages_per_node,
                max_tokens_per_node,
                node_id,
                node_summary,
                doc_description,
                node_text,
            )
            .await
        }
        Commands::Show { index, json } => cmd_show(index, json),
        Commands::Info { index } => cmd_info(index),
        Commands::Test => cmd_test().await,
    }
}

#[allow(clippy::too_many_arguments)]
async fn cmd_index(
    document_path: PathBuf,
    output: PathBuf,
    toc_check_pages: Option<usize>,
    max_pages_per_node: Option<usize>,
    max_tokens_per_node: Option<usize>,
    node_id: bool,
    node_summary: bool,
    doc_description: bool,
    node_text: bool,
) -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    let mut options = IndexerOptions::from(&config.pipeline);
    if let Some(pages) = toc_check_pages {
        options.toc_check_pages = pages;
    }
    if let Some(pages) = max_pages_per_node {
        options.max_pages_per_node = pages;
    }
    if let Some(tokens) = max_tokens_per_node {
        options.max_tokens_per_node = tokens;
    }
    options.add_node_id |= node_id;
    options.add_node_summary |= node_summary;
    options.add_doc_description |= doc_description;
    options.add_node_text |= node_text;

    println!("Extracting structure: {}", document_path.display());
    println!("Using model: {}", config.llm.model);

    let start = Instant::now();

    let document = load_pdf(&document_path).context("Failed to load PDF")?;

    println!(
        "  Document: {} ({} pages, ~{} tokens)",
        document.name,
        document.page_count(),
        document.total_tokens()
    );

    let client = LlmClient::new(config.llm);
    let indexer = TreeIndexer::with_options(client, options);

    println!("\nRecovering structure tree via LLM...");
    let tree = indexer
        .index(&document)
        .await
        .context("Failed to extract structure tree")?;

    let build_duration = start.elapsed();

    println!("\nStructure Tree Built:");
    println!("  Sections:    {}", tree.node_count());
    println!("  Max depth:   {}", tree.max_depth());
    println!("  Build time:  {:.2?}", build_duration);

    save_tree(&tree, &output).context("Failed to save structure tree")?;

    let size = tree_size(&output)?;
    println!("\nTree saved to: {}", output.display());
    println!("  File size: {:.1} KB", size as f64 / 1024.0);

    Ok(())
}

fn cmd_show(index_path: PathBuf, json: bool) -> Result<()> {
    if !tree_exists(&index_path) {
        anyhow::bail!(
            "Tree not found at '{}'. Run 'index' command first.",
            index_path.display()
        );
    }

    let tree = load_tree(&index_path).context("Failed to load structure tree")?;

    if json {
        let json_str = tree.to_json().context("Failed to serialize tree")?;
        println!("{}", json_str);
    } else {
        println!("{}", tree.format());
    }

    Ok(())
}

fn cmd_info(index_path: PathBuf) -> Result<()> {
    if !tree_exists(&index_path) {
        anyhow::bail!(
            "Tree not found at '{}'. Run 'index' command first.",
            index_path.display()
        );
    }

    let tree = load_tree(&index_path).context("Failed to load structure tree")?;
    let size = tree_size(&index_path)?;

    println!("Structure Tree Information");
    println!("{}", "─".repeat(40));
    println!("  Document:     {}", tree.name);
    println!("  Total pages:  {}", tree.total_pages);
    println!("  Sections:     {}", tree.node_count());
    println!("  Max depth:    {}", tree.max_depth());
    println!("  File size:    {:.1} KB", size as f64 / 1024.0);
    println!("  Tree path:    {}", index_path.display());

    if let Some(desc) = &tree.description {
        println!("  Description:  {}", desc);
    }

    Ok(())
}

async fn cmd_test() -> Result<()> {
    println!("Testing LLM connection...\n");

    let config = Config::load().context("Failed to load configuration")?;

    println!("Configuration:");
    println!("  API Base:  {}", config.llm.api_base);
    println!("  Model:     {}", config.llm.model);
    println!(
        "  API Key:   {}...",
        &config.llm.api_key[..config.llm.api_key.len().min(8)]
    );
    println!();

    if let Err(e) = config.validate() {
        println!("Configuration error: {}", e);
        return Ok(());
    }

    let client = LlmClient::new(config.llm);

    println!("Sending test request...");
    match client.test_connection().await {
        Ok(()) => {
            println!("Connection successful!");
        }
        Err(e) => {
            println!("Connection failed: {}", e);
        }
    }

    Ok(())
}
