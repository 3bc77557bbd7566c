//! Structure-tree extraction for PDF documents.
//!
//! Recovers a hierarchical outline of a document's sections, each annotated
//! with the physical page range it spans, by combining deterministic PDF
//! text extraction with LLM calls that classify, transform, and validate
//! table-of-contents fragments, under a self-correcting control loop.
//!
//! # Overview
//!
//! The pipeline chooses among three strategies, richest first:
//! 1. A printed TOC carrying page numbers: transform it, infer the constant
//!    offset between printed and physical numbering, and fuse.
//! 2. A printed TOC without page numbers: transform it, then walk page
//!    windows letting the model mark where each section starts.
//! 3. No TOC: generate the structure directly from tagged page windows.
//!
//! Every title → page mapping is then verified against the page text.
//! Mappings that mostly check out are repaired item by item with bounded
//! retries; ones that don't are discarded and the next simpler strategy is
//! tried. Sections spanning too many pages are recursively subdivided.
//!
//! # Quick Start
//!
//! ```no_run
//! use toc_tree_extractor::{
//!     config::Config,
//!     llm::LlmClient,
//!     pdf::load_pdf,
//!     persistence::save_tree,
//!     pipeline::TreeIndexer,
//! };
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     config.validate()?;
//!
//!     let client = LlmClient::new(config.llm.clone());
//!     let document = load_pdf(Path::new("document.pdf"))?;
//!
//!     let indexer = TreeIndexer::new(client);
//!     let tree = indexer.index(&document).await?;
//!
//!     save_tree(&tree, Path::new("structure_tree.json"))?;
//!     println!("{}", tree.format());
//!
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - **Document**: 1-indexed pages with `o200k_base` token counts
//! - **LlmClient**: OpenAI-compatible API client with internal retries
//! - **toc**: detection, structuring, index resolution, and validation of
//!   the flat intermediate representation
//! - **TreeIndexer**: the strategy state machine and recursive subdivider
//! - **DocumentTree**: the hierarchical result

pub mod config;
pub mod document;
pub mod error;
pub mod llm;
pub mod pdf;
pub mod persistence;
pub mod pipeline;
pub mod summary;
pub mod toc;
pub mod tree;

// Re-export commonly used types
pub use config::Config;
pub use document::{Document, Page};
pub use error::{ExtractError, Result};
pub use llm::LlmClient;
pub use persistence::{load_tree, save_tree};
pub use pipeline::{IndexerOptions, TreeIndexer};
pub use tree::{DocumentTree, TreeNode};
