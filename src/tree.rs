//! Hierarchical structure tree and its construction from flat TOC items.
//!
//! The tree is assembled from dotted structure paths ("1.2.3" hangs under
//! "1.2"). Page ranges are assigned on the flat list first: a section ends
//! where the next one starts, sharing the page unless the next title opens
//! its page. Parents are then widened to cover their children.

use crate::document::Document;
use crate::toc::TocItem;
use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A node in the document structure tree.
#[derive(Debug, Clone, Serialize, Deserialize, Encode, Decode)]
pub struct TreeNode {
    /// Section title.
    pub title: String,

    /// Hierarchical structure index (e.g., "1", "1.1", "1.2.3").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub structure: Option<String>,

    /// Starting page index (1-indexed).
    pub start_index: usize,

    /// Ending page index (1-indexed, inclusive).
    pub end_index: usize,

    /// Child nodes (subsections).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nodes: Vec<TreeNode>,

    /// Raw page text of the section.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    /// Optional summary of the section.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,

    /// Optional node ID for reference.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
}

impl TreeNode {
    /// Create a new tree node.
    pub fn new(title: impl Into<String>, start_index: usize, end_index: usize) -> Self {
        Self {
            title: title.into(),
            structure: None,
            start_index,
            end_index,
            nodes: Vec::new(),
            text: None,
            summary: None,
            node_id: None,
        }
    }

    /// Set the structure index.
    pub fn with_structure(mut self, structure: impl Into<String>) -> Self {
        self.structure = Some(structure.into());
        self
    }

    /// Add a child node.
    pub fn add_child(&mut self, child: TreeNode) {
        self.nodes.push(child);
    }

    /// Check if this node has children.
    pub fn has_children(&self) -> bool {
        !self.nodes.is_empty()
    }

    /// Get the page span (number of pages covered).
    pub fn page_span(&self) -> usize {
        if self.end_index >= self.start_index {
            self.end_index - self.start_index + 1
        } else {
            0
        }
    }

    /// Recursively count all nodes in this subtree (including self).
    pub fn node_count(&self) -> usize {
        1 + self.nodes.iter().map(|n| n.node_count()).sum::<usize>()
    }

    /// Find a node by title (case-insensitive).
    pub fn find_by_title(&self, title: &str) -> Option<&TreeNode> {
        let title_lower = title.to_lowercase();
        if self.title.to_lowercase() == title_lower {
            return Some(self);
        }
        for child in &self.nodes {
            if let Some(found) = child.find_by_title(title) {
                return Some(found);
            }
        }
        None
    }

    /// Format the tree as a string for display.
    pub fn format_tree(&self, indent: usize) -> String {
        let prefix = "  ".repeat(indent);
        let structure_str = self
            .structure
            .as_ref()
            .map(|s| format!("{} ", s))
            .unwrap_or_default();

        let mut result = format!(
            "{}{}{} [pages {}-{}]\n",
            prefix, structure_str, self.title, self.start_index, self.end_index
        );

        for child in &self.nodes {
            result.push_str(&child.format_tree(indent + 1));
        }

        result
    }
}

/// A complete document structure tree.
#[derive(Debug, Clone, Serialize, Deserialize, Encode, Decode)]
pub struct DocumentTree {
    /// Document name.
    #[serde(rename = "doc_name")]
    pub name: String,

    /// Optional document description.
    #[serde(rename = "doc_description", skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Total page count.
    pub total_pages: usize,

    /// Root-level nodes.
    #[serde(rename = "structure")]
    pub nodes: Vec<TreeNode>,
}

impl DocumentTree {
    /// Create a new document tree.
    pub fn new(name: impl Into<String>, nodes: Vec<TreeNode>, total_pages: usize) -> Self {
        Self {
            name: name.into(),
            description: None,
            total_pages,
            nodes,
        }
    }

    /// Get total node count.
    pub fn node_count(&self) -> usize {
        self.nodes.iter().map(|n| n.node_count()).sum()
    }

    /// Get maximum depth of the tree.
    pub fn max_depth(&self) -> usize {
        fn depth(node: &TreeNode) -> usize {
            if node.nodes.is_empty() {
                1
            } else {
                1 + node.nodes.iter().map(depth).max().unwrap_or(0)
            }
        }

        self.nodes.iter().map(depth).max().unwrap_or(0)
    }

    /// Find a node by title.
    pub fn find_by_title(&self, title: &str) -> Option<&TreeNode> {
        for node in &self.nodes {
            if let Some(found) = node.find_by_title(title) {
                return Some(found);
            }
        }
        None
    }

    /// Format the entire tree for display.
    pub fn format(&self) -> String {
        let mut result = format!(
            "Document: {} ({} pages, {} sections)\n",
            self.name,
            self.total_pages,
            self.node_count()
        );
        result.push_str(&"─".repeat(50));
        result.push('\n');

        for node in &self.nodes {
            result.push_str(&node.format_tree(0));
        }

        result
    }

    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Parse from JSON string.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Insert a synthetic "Preface" item covering the front matter when the
/// first mapped section starts past page 1.
pub fn add_preface_if_needed(items: &mut Vec<TocItem>) {
    let Some(first) = items.first() else { return };
    if matches!(first.physical_index, Some(physical) if physical > 1) {
        let mut preface = TocItem::new(Some("0".to_string()), "Preface");
        preface.physical_index = Some(1);
        items.insert(0, preface);
    }
}

/// Parent path of a dotted structure index ("1.2.3" → "1.2").
fn parent_structure(structure: &str) -> Option<&str> {
    structure.rsplit_once('.').map(|(parent, _)| parent)
}

/// Assign page ranges to the flat list. Item `i` ends where item `i+1`
/// starts, minus one page when the next title opens its page; the last item
/// runs to `end_physical_index`. Items without a physical index must be
/// filtered out beforehand.
fn assign_page_ranges(items: &[TocItem], end_physical_index: usize) -> Vec<TreeNode> {
    let mut flat = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let Some(start_index) = item.physical_index else {
            continue;
        };
        let end_index = match items.get(i + 1).and_then(|next| next.physical_index) {
            Some(next_start) => {
                if items[i + 1].starts_at_page_top() {
                    next_start.saturating_sub(1).max(start_index)
                } else {
                    next_start
                }
            }
            None => end_physical_index,
        };
        let mut node = TreeNode::new(&item.title, start_index, end_index.max(start_index));
        node.structure = item.structure.clone();
        flat.push(node);
    }
    flat
}

/// Hang each node under the node whose structure path is its dotted prefix.
/// Items whose parent has not been seen become roots, as does anything
/// without a structure path.
fn list_to_tree(flat: Vec<TreeNode>) -> Vec<TreeNode> {
    let mut slots: Vec<Option<TreeNode>> = Vec::with_capacity(flat.len());
    let mut children_of: Vec<Vec<usize>> = vec![Vec::new(); flat.len()];
    let mut roots: Vec<usize> = Vec::new();
    let mut by_structure: HashMap<String, usize> = HashMap::new();

    for (idx, node) in flat.into_iter().enumerate() {
        let parent_idx = node
            .structure
            .as_deref()
            .and_then(parent_structure)
            .and_then(|parent| by_structure.get(parent).copied());

        if let Some(structure) = node.structure.clone() {
            by_structure.insert(structure, idx);
        }
        slots.push(Some(node));

        match parent_idx {
            Some(parent) => children_of[parent].push(idx),
            None => roots.push(idx),
        }
    }

    fn assemble(
        idx: usize,
        slots: &mut [Option<TreeNode>],
        children_of: &[Vec<usize>],
    ) -> Option<TreeNode> {
        let mut node = slots[idx].take()?;
        node.nodes = children_of[idx]
            .iter()
            .filter_map(|&child| assemble(child, slots, children_of))
            .collect();
        Some(node)
    }

    roots
        .iter()
        .filter_map(|&idx| assemble(idx, &mut slots, &children_of))
        .collect()
}

/// Widen every parent's end index to cover the union of its children's
/// spans.
fn cover_children_spans(node: &mut TreeNode) {
    for child in &mut node.nodes {
        cover_children_spans(child);
    }

    if let Some(max_end) = node.nodes.iter().map(|n| n.end_index).max() {
        if max_end > node.end_index {
            node.end_index = max_end;
        }
    }
}

/// Build the structure tree from validated flat items: assign page ranges,
/// hang children under their dotted-path parents, and widen parents over
/// their children.
pub fn build_tree(items: &[TocItem], end_physical_index: usize) -> Vec<TreeNode> {
    let flat = assign_page_ranges(items, end_physical_index);
    let mut tree = list_to_tree(flat);
    for node in &mut tree {
        cover_children_spans(node);
    }
    tree
}

/// Write pre-order, zero-padded node ids ("0000", "0001", …).
pub fn write_node_ids(nodes: &mut [TreeNode]) {
    fn visit(nodes: &mut [TreeNode], next_id: &mut usize) {
        for node in nodes {
            node.node_id = Some(format!("{:04}", *next_id));
            *next_id += 1;
            visit(&mut node.nodes, next_id);
        }
    }

    let mut next_id = 0;
    visit(nodes, &mut next_id);
}

/// Attach each node's raw page text.
pub fn attach_node_text(nodes: &mut [TreeNode], document: &Document) {
    for node in nodes {
        node.text = Some(document.text_range(node.start_index, node.end_index));
        attach_node_text(&mut node.nodes, document);
    }
}

/// Remove attached page text from every node.
pub fn strip_node_text(nodes: &mut [TreeNode]) {
    for node in nodes {
        node.text = None;
        strip_node_text(&mut node.nodes);
    }
}

/// Pre-order flatten of the tree (shared references).
pub fn flatten(nodes: &[TreeNode]) -> Vec<&TreeNode> {
    let mut out = Vec::new();
    fn visit<'a>(nodes: &'a [TreeNode], out: &mut Vec<&'a TreeNode>) {
        for node in nodes {
            out.push(node);
            visit(&node.nodes, out);
        }
    }
    visit(nodes, &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::toc::Answer;

    fn item(structure: &str, title: &str, physical: usize) -> TocItem {
        let mut item = TocItem::new(Some(structure.to_string()), title);
        item.physical_index = Some(physical);
        item
    }

    #[test]
    fn test_tree_node_creation() {
        let node = TreeNode::new("Chapter 1", 1, 10).with_structure("1");

        assert_eq!(node.title, "Chapter 1");
        assert_eq!(node.start_index, 1);
        assert_eq!(node.end_index, 10);
        assert_eq!(node.structure, Some("1".to_string()));
        assert_eq!(node.page_span(), 10);
    }

    #[test]
    fn test_preface_inserted_for_late_first_section() {
        let mut items = vec![item("1", "Intro", 3), item("2", "Body", 7)];
        for i in &mut items {
            i.appear_start = Some(Answer::Yes);
        }
        add_preface_if_needed(&mut items);

        assert_eq!(items.len(), 3);
        assert_eq!(items[0].title, "Preface");
        assert_eq!(items[0].structure.as_deref(), Some("0"));
        assert_eq!(items[0].physical_index, Some(1));

        let tree = build_tree(&items, 20);
        assert_eq!(tree.len(), 3);
        assert_eq!((tree[0].start_index, tree[0].end_index), (1, 2));
        assert_eq!((tree[1].start_index, tree[1].end_index), (3, 6));
        assert_eq!((tree[2].start_index, tree[2].end_index), (7, 20));
    }

    #[test]
    fn test_preface_not_inserted_when_first_section_on_page_one() {
        let mut items = vec![item("1", "Intro", 1)];
        add_preface_if_needed(&mut items);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "Intro");
    }

    #[test]
    fn test_page_top_title_ends_previous_section_early() {
        let mut items = vec![item("1", "First", 10), item("2", "Second", 15)];
        items[1].appear_start = Some(Answer::Yes);

        let tree = build_tree(&items, 30);
        assert_eq!(tree[0].end_index, 14);
        assert_eq!(tree[1].start_index, 15);
    }

    #[test]
    fn test_shared_page_when_title_mid_page() {
        let mut items = vec![item("1", "First", 10), item("2", "Second", 15)];
        items[1].appear_start = Some(Answer::No);

        let tree = build_tree(&items, 30);
        assert_eq!(tree[0].end_index, 15);
        assert_eq!(tree[1].start_index, 15);
    }

    #[test]
    fn test_missing_page_top_verdict_keeps_shared_page() {
        let items = vec![item("1", "First", 10), item("2", "Second", 15)];
        let tree = build_tree(&items, 30);
        assert_eq!(tree[0].end_index, 15);
    }

    #[test]
    fn test_dotted_paths_nest_and_parents_cover_children() {
        let items = vec![
            item("1", "Chapter 1", 1),
            item("1.1", "Section 1.1", 2),
            item("1.2", "Section 1.2", 6),
            item("2", "Chapter 2", 11),
        ];
        let tree = build_tree(&items, 20);

        assert_eq!(tree.len(), 2);
        assert_eq!(tree[0].nodes.len(), 2);
        assert_eq!(tree[0].nodes[0].title, "Section 1.1");

        // parent widened over its children
        assert_eq!(tree[0].start_index, 1);
        assert_eq!(tree[0].end_index, 11);
        assert_eq!(tree[0].nodes[1].end_index, 11);

        // sibling spans touch or abut
        for window in tree.windows(2) {
            let gap = window[1].start_index as i64 - window[0].end_index as i64;
            assert!(gap == 0 || gap == 1, "sibling gap was {}", gap);
        }
    }

    #[test]
    fn test_orphan_subsection_becomes_root() {
        let items = vec![item("2.1", "Orphan", 4), item("3", "Chapter 3", 9)];
        let tree = build_tree(&items, 12);
        assert_eq!(tree.len(), 2);
        assert_eq!(tree[0].title, "Orphan");
    }

    #[test]
    fn test_flat_numbering_yields_flat_tree() {
        let items = vec![
            item("1", "A", 1),
            item("2", "B", 5),
            item("3", "C", 9),
        ];
        let tree = build_tree(&items, 12);
        assert_eq!(tree.len(), 3);
        assert!(tree.iter().all(|n| n.nodes.is_empty()));
    }

    #[test]
    fn test_tree_bounds_invariant() {
        let items = vec![
            item("1", "A", 1),
            item("1.1", "A.1", 2),
            item("2", "B", 8),
        ];
        let total_pages = 15;
        let tree = build_tree(&items, total_pages);

        for node in flatten(&tree) {
            assert!(node.start_index >= 1);
            assert!(node.start_index <= node.end_index);
            assert!(node.end_index <= total_pages);
        }
    }

    #[test]
    fn test_roundtrip_preserves_titles_and_starts() {
        let items = vec![
            item("1", "Chapter 1", 1),
            item("1.1", "Section 1.1", 3),
            item("1.2", "Section 1.2", 5),
            item("2", "Chapter 2", 9),
        ];
        let tree = build_tree(&items, 20);
        let flat = flatten(&tree);

        let titles: Vec<&str> = flat.iter().map(|n| n.title.as_str()).collect();
        assert_eq!(titles, vec!["Chapter 1", "Section 1.1", "Section 1.2", "Chapter 2"]);

        let starts: Vec<usize> = flat.iter().map(|n| n.start_index).collect();
        assert_eq!(starts, vec![1, 3, 5, 9]);
    }

    #[test]
    fn test_write_node_ids_preorder() {
        let items = vec![
            item("1", "A", 1),
            item("1.1", "A.1", 2),
            item("2", "B", 8),
        ];
        let mut tree = build_tree(&items, 10);
        write_node_ids(&mut tree);

        assert_eq!(tree[0].node_id.as_deref(), Some("0000"));
        assert_eq!(tree[0].nodes[0].node_id.as_deref(), Some("0001"));
        assert_eq!(tree[1].node_id.as_deref(), Some("0002"));
    }

    #[test]
    fn test_attach_and_strip_node_text() {
        use crate::document::Page;

        let document = Document::new(
            "Test",
            vec![Page::new("alpha"), Page::new("beta"), Page::new("gamma")],
        );
        let items = vec![item("1", "A", 1), item("2", "B", 2)];
        let mut tree = build_tree(&items, 3);

        attach_node_text(&mut tree, &document);
        assert_eq!(tree[0].text.as_deref(), Some("alphabeta"));
        assert_eq!(tree[1].text.as_deref(), Some("betagamma"));

        strip_node_text(&mut tree);
        assert!(tree.iter().all(|n| n.text.is_none()));
    }

    #[test]
    fn test_document_tree_serialization_shape() {
        let tree = DocumentTree::new("Test Doc", vec![TreeNode::new("Chapter 1", 1, 10)], 10);
        let json = tree.to_json().unwrap();

        assert!(json.contains("\"doc_name\""));
        assert!(json.contains("\"structure\""));
        assert!(!json.contains("\"doc_description\""));

        let parsed = DocumentTree::from_json(&json).unwrap();
        assert_eq!(parsed.name, tree.name);
        assert_eq!(parsed.total_pages, tree.total_pages);
    }
}
