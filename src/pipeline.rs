//! The extraction pipeline: strategy selection, validation-driven fallback,
//! and recursive subdivision of oversized sections.
//!
//! A run picks the richest strategy the document supports (printed TOC with
//! page numbers, printed TOC without, or none), maps every section to a
//! physical page, and verifies the mapping against the page text. A mapping
//! that mostly checks out is repaired item by item; one that doesn't is
//! thrown away and the next simpler strategy tried. The finished tree is
//! then re-examined: any node spanning too many pages *and* too many tokens
//! gets the no-TOC strategy re-run over just its pages, concurrently across
//! siblings.

use crate::config::PipelineConfig;
use crate::document::{tagged_range_of, tagged_windows, Document, Page};
use crate::error::{ExtractError, Result};
use crate::llm::LlmClient;
use crate::summary;
use crate::toc::detect::{check_toc, TocDetection};
use crate::toc::index::{
    add_page_number_to_toc, apply_page_offset, calculate_page_offset, extract_matching_page_pairs,
    resolve_missing_indices, toc_index_extractor,
};
use crate::toc::structure::{generate_toc_continue, generate_toc_init, transform_toc};
use crate::toc::validate::{
    check_title_start_concurrent, fix_incorrect_toc_with_retries, verify_toc,
};
use crate::toc::{ExtractMode, TocItem};
use crate::tree::{
    add_preface_if_needed, attach_node_text, build_tree, strip_node_text, write_node_ids,
    DocumentTree, TreeNode,
};
use futures::future::join_all;
use std::future::Future;
use std::pin::Pin;
use tracing::{info, warn};

/// Accuracy below which a strategy's output is thrown away entirely.
const FALLBACK_THRESHOLD: f64 = 0.6;

/// Options for tree extraction.
#[derive(Debug, Clone)]
pub struct IndexerOptions {
    /// Leading pages scanned for a TOC; also the offset-inference window width.
    pub toc_check_pages: usize,
    /// Page-span threshold for subdividing a node.
    pub max_pages_per_node: usize,
    /// Token threshold for subdividing a node; also the window token budget.
    pub max_tokens_per_node: usize,
    /// Write pre-order node ids.
    pub add_node_id: bool,
    /// Generate per-node summaries.
    pub add_node_summary: bool,
    /// Generate a one-sentence document description.
    pub add_doc_description: bool,
    /// Attach raw page text to every node.
    pub add_node_text: bool,
}

impl Default for IndexerOptions {
    fn default() -> Self {
        Self::from(&PipelineConfig::default())
    }
}

impl From<&PipelineConfig> for IndexerOptions {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            toc_check_pages: config.toc_check_pages,
            max_pages_per_node: config.max_pages_per_node,
            max_tokens_per_node: config.max_tokens_per_node,
            add_node_id: config.add_node_id,
            add_node_summary: config.add_node_summary,
            add_doc_description: config.add_doc_description,
            add_node_text: config.add_node_text,
        }
    }
}

/// What validation tells the controller to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ControlDecision {
    /// Every checked mapping was right: freeze the list.
    Accept,
    /// Mostly right: repair the wrong items in place.
    Repair,
    /// Too wrong to salvage: degrade to the next strategy.
    Fallback,
}

fn control_decision(accuracy: f64, incorrect_count: usize) -> ControlDecision {
    if accuracy == 1.0 && incorrect_count == 0 {
        ControlDecision::Accept
    } else if accuracy > FALLBACK_THRESHOLD && incorrect_count > 0 {
        ControlDecision::Repair
    } else {
        ControlDecision::Fallback
    }
}

/// Pick the richest strategy the detection result supports.
fn initial_mode(detection: &TocDetection) -> ExtractMode {
    if detection.has_numbered_toc() {
        ExtractMode::TocWithPageNumbers
    } else if detection.has_toc() {
        ExtractMode::TocNoPageNumbers
    } else {
        ExtractMode::NoToc
    }
}

/// Structure-tree extractor driven by an LLM.
pub struct TreeIndexer {
    client: LlmClient,
    options: IndexerOptions,
}

impl TreeIndexer {
    /// Create a new extractor with default options.
    pub fn new(client: LlmClient) -> Self {
        Self {
            client,
            options: IndexerOptions::default(),
        }
    }

    /// Create with custom options.
    pub fn with_options(client: LlmClient, options: IndexerOptions) -> Self {
        Self { client, options }
    }

    /// Recover the structure tree for a document.
    pub async fn index(&self, document: &Document) -> Result<DocumentTree> {
        info!(
            name = %document.name,
            pages = document.page_count(),
            tokens = document.total_tokens(),
            "starting structure extraction"
        );

        let detection = check_toc(&self.client, &document.pages, self.options.toc_check_pages)
            .await?;
        let mode = initial_mode(&detection);
        info!(?mode, "strategy selected");

        let mut items = self
            .run_with_fallback(&document.pages, 1, mode, Some(&detection))
            .await?;

        add_preface_if_needed(&mut items);
        check_title_start_concurrent(&self.client, &mut items, &document.pages).await;
        items.retain(|item| item.physical_index.is_some());

        let mut nodes = build_tree(&items, document.page_count());

        join_all(
            nodes
                .iter_mut()
                .map(|node| self.subdivide_node(node, document)),
        )
        .await;

        let mut tree = DocumentTree::new(&document.name, nodes, document.page_count());
        self.run_post_passes(&mut tree, document).await?;

        Ok(tree)
    }

    async fn run_post_passes(&self, tree: &mut DocumentTree, document: &Document) -> Result<()> {
        if self.options.add_node_id {
            write_node_ids(&mut tree.nodes);
        }
        if self.options.add_node_text {
            attach_node_text(&mut tree.nodes, document);
        }
        if self.options.add_node_summary {
            if !self.options.add_node_text {
                attach_node_text(&mut tree.nodes, document);
            }
            summary::generate_summaries(&self.client, &mut tree.nodes).await;
            if !self.options.add_node_text {
                strip_node_text(&mut tree.nodes);
            }
        }
        if self.options.add_doc_description {
            tree.description =
                Some(summary::generate_doc_description(&self.client, &tree.nodes).await?);
        }
        Ok(())
    }

    /// Run one strategy, validate its output, and degrade through the
    /// remaining strategies until one passes or everything is exhausted.
    async fn run_with_fallback(
        &self,
        pages: &[Page],
        start_index: usize,
        mode: ExtractMode,
        detection: Option<&TocDetection>,
    ) -> Result<Vec<TocItem>> {
        let mut current = Some(mode);

        while let Some(mode) = current {
            info!(?mode, start_index, "running extraction strategy");

            let mut items = match self.extract_items(mode, pages, start_index, detection).await {
                Ok(items) => items,
                Err(e) => {
                    warn!(?mode, error = %e, "strategy failed before validation");
                    current = mode.fallback();
                    continue;
                }
            };

            items.retain(|item| item.physical_index.is_some());
            truncate_out_of_range(&mut items, pages.len(), start_index);

            let (accuracy, incorrect_results) =
                verify_toc(&self.client, pages, &items, start_index).await?;

            match control_decision(accuracy, incorrect_results.len()) {
                ControlDecision::Accept => return Ok(items),
                ControlDecision::Repair => {
                    let unfixed = fix_incorrect_toc_with_retries(
                        &self.client,
                        &mut items,
                        pages,
                        incorrect_results,
                        start_index,
                    )
                    .await?;
                    if !unfixed.is_empty() {
                        warn!(remaining = unfixed.len(), "items left with unverified mappings");
                    }
                    return Ok(items);
                }
                ControlDecision::Fallback => {
                    warn!(?mode, accuracy, "strategy rejected by validation");
                    current = mode.fallback();
                }
            }
        }

        Err(ExtractError::ExtractionFailed(format!(
            "all strategies exhausted for pages {}..={}",
            start_index,
            start_index + pages.len().saturating_sub(1)
        )))
    }

    /// Produce the flat item list for one strategy. Parse failures are
    /// retried once before the strategy is declared failed.
    async fn extract_items(
        &self,
        mode: ExtractMode,
        pages: &[Page],
        start_index: usize,
        detection: Option<&TocDetection>,
    ) -> Result<Vec<TocItem>> {
        match self.extract_items_once(mode, pages, start_index, detection).await {
            Err(ExtractError::LlmParse(e)) => {
                warn!(?mode, error = %e, "parse failure, retrying strategy once");
                self.extract_items_once(mode, pages, start_index, detection)
                    .await
            }
            other => other,
        }
    }

    async fn extract_items_once(
        &self,
        mode: ExtractMode,
        pages: &[Page],
        start_index: usize,
        detection: Option<&TocDetection>,
    ) -> Result<Vec<TocItem>> {
        match mode {
            ExtractMode::TocWithPageNumbers => {
                let detection = detection_with_content(detection, mode)?;
                self.extract_with_page_numbers(pages, start_index, detection)
                    .await
            }
            ExtractMode::TocNoPageNumbers => {
                let detection = detection_with_content(detection, mode)?;
                self.extract_without_page_numbers(pages, start_index, detection)
                    .await
            }
            ExtractMode::NoToc => self.extract_without_toc(pages, start_index).await,
        }
    }

    /// Printed TOC with page numbers: transform, infer the printed→physical
    /// offset from a window just past the TOC, fuse, then resolve entries
    /// the TOC left unnumbered.
    async fn extract_with_page_numbers(
        &self,
        pages: &[Page],
        start_index: usize,
        detection: &TocDetection,
    ) -> Result<Vec<TocItem>> {
        let toc_content = detection.toc_content.as_deref().unwrap_or_default();
        let mut items = transform_toc(&self.client, toc_content).await?;

        let mut unnumbered = items.clone();
        for item in &mut unnumbered {
            item.page = None;
        }

        let window_start = detection.toc_page_list.last().copied().unwrap_or(0) + 1;
        let window_end = window_start + self.options.toc_check_pages.saturating_sub(1);
        let window = tagged_range_of(pages, start_index, window_start, window_end);

        let annotated = toc_index_extractor(&self.client, &unnumbered, &window).await?;
        let pairs = extract_matching_page_pairs(&items, &annotated, window_start);
        info!(pairs = pairs.len(), "printed/physical page pairs observed");

        let offset = calculate_page_offset(&pairs).ok_or_else(|| {
            ExtractError::ExtractionFailed(
                "no printed/physical page pairs to infer an offset from".to_string(),
            )
        })?;
        info!(offset, "page offset inferred");

        apply_page_offset(&mut items, offset);
        resolve_missing_indices(&self.client, &mut items, pages, start_index).await?;

        Ok(items)
    }

    /// Printed TOC without page numbers: transform, then walk token-bounded
    /// windows in order, letting the model mark where each section starts.
    /// Windows run sequentially: each one sees the list as amended by its
    /// predecessors.
    async fn extract_without_page_numbers(
        &self,
        pages: &[Page],
        start_index: usize,
        detection: &TocDetection,
    ) -> Result<Vec<TocItem>> {
        let toc_content = detection.toc_content.as_deref().unwrap_or_default();
        let mut items = transform_toc(&self.client, toc_content).await?;
        for item in &mut items {
            item.page = None;
        }

        let windows = tagged_windows(pages, start_index, self.options.max_tokens_per_node);
        info!(windows = windows.len(), "walking page windows");
        for window in &windows {
            items = add_page_number_to_toc(&self.client, window, &items).await?;
        }

        Ok(items)
    }

    /// No TOC: generate the structure window by window, carrying the list so
    /// far forward so numbering continues.
    async fn extract_without_toc(&self, pages: &[Page], start_index: usize) -> Result<Vec<TocItem>> {
        let windows = tagged_windows(pages, start_index, self.options.max_tokens_per_node);
        info!(windows = windows.len(), "generating structure from page windows");

        let mut windows_iter = windows.iter();
        let Some(first) = windows_iter.next() else {
            return Ok(Vec::new());
        };

        let mut items = generate_toc_init(&self.client, first).await?;
        for window in windows_iter {
            let additional = generate_toc_continue(&self.client, &items, window).await?;
            items.extend(additional);
        }

        Ok(items)
    }

    /// Re-run extraction inside any node that spans more pages than the
    /// threshold *and* holds at least the token threshold, then recurse into
    /// its children concurrently.
    fn subdivide_node<'a>(
        &'a self,
        node: &'a mut TreeNode,
        document: &'a Document,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            let start = node.start_index.max(1);
            let end = node.end_index.min(document.page_count());

            if end >= start {
                let node_pages = &document.pages[start - 1..end];
                let token_count: usize = node_pages.iter().map(|p| p.token_count).sum();

                if should_subdivide(&self.options, start, end, token_count) {
                    info!(
                        title = %node.title,
                        start, end, token_count,
                        "subdividing oversized node"
                    );
                    if let Err(e) = self.expand_node(node, node_pages, start, document).await {
                        warn!(title = %node.title, error = %e, "subdivision failed, keeping node as a leaf");
                    }
                }
            }

            join_all(
                node.nodes
                    .iter_mut()
                    .map(|child| self.subdivide_node(child, document)),
            )
            .await;
        })
    }

    /// Expand one oversized node in place. When the regenerated list's first
    /// section is the node itself, that row is consumed: the node keeps its
    /// identity and the remainder become its children.
    async fn expand_node(
        &self,
        node: &mut TreeNode,
        node_pages: &[Page],
        start_index: usize,
        document: &Document,
    ) -> Result<()> {
        let original_end = node.end_index;

        let mut items = self
            .run_with_fallback(node_pages, start_index, ExtractMode::NoToc, None)
            .await?;
        check_title_start_concurrent(&self.client, &mut items, &document.pages).await;
        items.retain(|item| item.physical_index.is_some());

        if items.is_empty() {
            return Ok(());
        }

        consume_matching_first_item(node, &mut items);
        node.nodes = build_tree(&items, original_end);

        // keep the parent spanning everything its children cover
        if let Some(max_child_end) = node.nodes.iter().map(|n| n.end_index).max() {
            node.end_index = node.end_index.max(max_child_end);
        }

        Ok(())
    }
}

/// A node is subdivided only when its page span exceeds the page threshold
/// AND the pages hold at least the token threshold.
fn should_subdivide(options: &IndexerOptions, start: usize, end: usize, token_count: usize) -> bool {
    end - start > options.max_pages_per_node && token_count >= options.max_tokens_per_node
}

/// When a regenerated list's first section is the node itself, drop that row
/// and let the node adopt its span: the node ends where the next section
/// begins (one page earlier if that section opens its page).
fn consume_matching_first_item(node: &mut TreeNode, items: &mut Vec<TocItem>) {
    let matches = items
        .first()
        .is_some_and(|first| first.title.trim() == node.title.trim());
    if !matches {
        return;
    }

    items.remove(0);
    if let Some(first_child_start) = items.first().and_then(|i| i.physical_index) {
        node.end_index = if items[0].starts_at_page_top() {
            first_child_start.saturating_sub(1).max(node.start_index)
        } else {
            first_child_start
        };
    }
}

/// Null any physical index pointing past the end of the page run. A TOC can
/// reference pages a broken or partial file no longer contains.
fn truncate_out_of_range(items: &mut [TocItem], page_count: usize, start_index: usize) {
    let max_allowed = page_count + start_index - 1;
    let mut removed = 0;
    for item in items.iter_mut() {
        if let Some(physical) = item.physical_index {
            if physical > max_allowed {
                warn!(title = %item.title, physical, max_allowed, "dropping out-of-range index");
                item.physical_index = None;
                removed += 1;
            }
        }
    }
    if removed > 0 {
        info!(removed, page_count, max_allowed, "out-of-range indices dropped");
    }
}

fn detection_with_content<'a>(
    detection: Option<&'a TocDetection>,
    mode: ExtractMode,
) -> Result<&'a TocDetection> {
    detection
        .filter(|d| d.has_toc())
        .ok_or_else(|| ExtractError::ExtractionFailed(format!("{:?} requires TOC text", mode)))
}

/// Convenience function to extract a structure tree from a PDF path.
pub async fn index_pdf(path: &std::path::Path, client: LlmClient) -> Result<DocumentTree> {
    let document = crate::pdf::load_pdf(path)?;
    let indexer = TreeIndexer::new(client);
    indexer.index(&document).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::toc::Answer;

    fn detection(content: Option<&str>, numbered: bool) -> TocDetection {
        TocDetection {
            toc_content: content.map(String::from),
            toc_page_list: if content.is_some() { vec![1] } else { vec![] },
            page_index_given: if numbered { Answer::Yes } else { Answer::No },
        }
    }

    #[test]
    fn test_initial_mode_selection() {
        assert_eq!(
            initial_mode(&detection(Some("Contents"), true)),
            ExtractMode::TocWithPageNumbers
        );
        assert_eq!(
            initial_mode(&detection(Some("Contents"), false)),
            ExtractMode::TocNoPageNumbers
        );
        assert_eq!(initial_mode(&detection(None, false)), ExtractMode::NoToc);
    }

    #[test]
    fn test_control_decision_thresholds() {
        assert_eq!(control_decision(1.0, 0), ControlDecision::Accept);
        assert_eq!(control_decision(0.9, 2), ControlDecision::Repair);
        assert_eq!(control_decision(0.61, 1), ControlDecision::Repair);
        // low accuracy falls through no matter how few items failed
        assert_eq!(control_decision(0.3, 2), ControlDecision::Fallback);
        assert_eq!(control_decision(0.2, 5), ControlDecision::Fallback);
        assert_eq!(control_decision(0.0, 0), ControlDecision::Fallback);
        // boundary: 0.6 exactly is not enough to repair
        assert_eq!(control_decision(0.6, 1), ControlDecision::Fallback);
    }

    #[test]
    fn test_fallback_chain_reaches_fatal() {
        // A → B → C → exhausted, mirroring repeated validation failures
        let mut mode = Some(ExtractMode::TocWithPageNumbers);
        let mut visited = Vec::new();
        while let Some(m) = mode {
            visited.push(m);
            mode = m.fallback();
        }
        assert_eq!(
            visited,
            vec![
                ExtractMode::TocWithPageNumbers,
                ExtractMode::TocNoPageNumbers,
                ExtractMode::NoToc
            ]
        );
    }

    #[test]
    fn test_truncate_out_of_range() {
        let mut items = vec![
            {
                let mut i = TocItem::new(Some("1".into()), "Ok");
                i.physical_index = Some(10);
                i
            },
            {
                let mut i = TocItem::new(Some("2".into()), "Beyond");
                i.physical_index = Some(31);
                i
            },
        ];
        truncate_out_of_range(&mut items, 30, 1);
        assert_eq!(items[0].physical_index, Some(10));
        assert_eq!(items[1].physical_index, None);

        // offset runs shift the allowed ceiling
        let mut items = vec![{
            let mut i = TocItem::new(None, "Tail");
            i.physical_index = Some(60);
            i
        }];
        truncate_out_of_range(&mut items, 10, 51);
        assert_eq!(items[0].physical_index, Some(60));
    }

    #[test]
    fn test_should_subdivide_requires_both_thresholds() {
        let options = IndexerOptions::default();

        // 50 pages and 40k tokens clear both thresholds
        assert!(should_subdivide(&options, 1, 50, 40_000));
        // long but sparse: token threshold not met
        assert!(!should_subdivide(&options, 1, 50, 5_000));
        // dense but short: page threshold not met
        assert!(!should_subdivide(&options, 1, 8, 40_000));
    }

    #[test]
    fn test_consume_matching_first_item_adopts_span() {
        let mut node = TreeNode::new("Methods", 51, 100);
        let make = |title: &str, physical: usize| {
            let mut i = TocItem::new(Some("1".into()), title);
            i.physical_index = Some(physical);
            i
        };
        let mut items = vec![make("Methods", 51), make("Sampling", 60), make("Analysis", 75)];
        items[1].appear_start = Some(Answer::Yes);

        consume_matching_first_item(&mut node, &mut items);

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].title, "Sampling");
        // the next section opens its page, so the node ends one page earlier
        assert_eq!(node.end_index, 59);
    }

    #[test]
    fn test_consume_skips_unrelated_first_item() {
        let mut node = TreeNode::new("Methods", 51, 100);
        let mut first = TocItem::new(Some("1".into()), "Background");
        first.physical_index = Some(51);
        let mut items = vec![first];

        consume_matching_first_item(&mut node, &mut items);

        assert_eq!(items.len(), 1);
        assert_eq!(node.end_index, 100);
    }

    #[test]
    fn test_indexer_options_from_config() {
        let config = PipelineConfig::default();
        let options = IndexerOptions::from(&config);
        assert_eq!(options.toc_check_pages, 20);
        assert_eq!(options.max_pages_per_node, 10);
        assert_eq!(options.max_tokens_per_node, 20000);
        assert!(!options.add_node_summary);
    }

    #[test]
    fn test_detection_with_content_requires_toc() {
        assert!(detection_with_content(None, ExtractMode::TocNoPageNumbers).is_err());
        let empty = detection(None, false);
        assert!(detection_with_content(Some(&empty), ExtractMode::TocNoPageNumbers).is_err());
        let ok = detection(Some("Contents"), false);
        assert!(detection_with_content(Some(&ok), ExtractMode::TocNoPageNumbers).is_ok());
    }
}
