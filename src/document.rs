//! Document representation: ordered pages with token counts.
//!
//! A document is an immutable, 1-indexed sequence of pages. Each page carries
//! its text and the token count of that text under the `o200k_base` encoding.
//! This module also owns the page-window grouper that packs pages into
//! token-bounded, overlapping text windows for a single LLM prompt.

use crate::error::{ExtractError, Result};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tiktoken_rs::CoreBPE;

static ENCODER: Lazy<CoreBPE> = Lazy::new(|| {
    tiktoken_rs::o200k_base().expect("o200k_base encoding tables are compiled in")
});

/// Count tokens in `text` under the `o200k_base` encoding.
pub fn count_tokens(text: &str) -> usize {
    ENCODER.encode_ordinary(text).len()
}

/// Wrap one page's text in physical-index tags so the model can cite the
/// page identity back to the caller.
pub fn tagged_page(physical_index: usize, text: &str) -> String {
    format!(
        "<physical_index_{}>\n{}\n<physical_index_{}>\n\n",
        physical_index, text, physical_index
    )
}

/// A single page in a document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    /// Text content of the page.
    pub content: String,
    /// Token count of the content under `o200k_base`.
    pub token_count: usize,
}

impl Page {
    /// Create a new page, counting its tokens.
    pub fn new(content: impl Into<String>) -> Self {
        let content = content.into();
        let token_count = count_tokens(&content);
        Self {
            content,
            token_count,
        }
    }

    /// Create a page with a precomputed token count.
    pub fn with_token_count(content: impl Into<String>, token_count: usize) -> Self {
        Self {
            content: content.into(),
            token_count,
        }
    }
}

/// A document consisting of one or more pages. Position in `pages` plus one
/// is the page's physical index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Document name/title.
    pub name: String,
    /// Original file path (if loaded from file).
    pub path: Option<PathBuf>,
    /// Pages in the document.
    pub pages: Vec<Page>,
}

impl Document {
    /// Create a new document with given name and pages.
    pub fn new(name: impl Into<String>, pages: Vec<Page>) -> Self {
        Self {
            name: name.into(),
            path: None,
            pages,
        }
    }

    /// Load a text file, splitting into pages on a delimiter.
    pub fn from_text_file(path: &Path, delimiter: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ExtractError::io(path, e))?;

        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("untitled")
            .to_string();

        let pages: Vec<Page> = content
            .split(delimiter)
            .filter(|s| !s.trim().is_empty())
            .map(Page::new)
            .collect();

        if pages.is_empty() {
            return Err(ExtractError::DocumentNotFound(path.to_path_buf()));
        }

        Ok(Self {
            name,
            path: Some(path.to_path_buf()),
            pages,
        })
    }

    /// Get total number of pages.
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Get total token count across all pages.
    pub fn total_tokens(&self) -> usize {
        self.pages.iter().map(|p| p.token_count).sum()
    }

    /// Get a specific page by physical index (1-indexed).
    pub fn get_page(&self, physical_index: usize) -> Option<&Page> {
        if physical_index == 0 || physical_index > self.pages.len() {
            None
        } else {
            Some(&self.pages[physical_index - 1])
        }
    }

    /// Raw text of pages `start..=end` (1-indexed, inclusive), untagged.
    pub fn text_range(&self, start: usize, end: usize) -> String {
        let mut text = String::new();
        for page in pages_slice(&self.pages, start, end) {
            text.push_str(&page.content);
        }
        text
    }

    /// Tagged text of pages `start..=end` (1-indexed, inclusive).
    pub fn tagged_range(&self, start: usize, end: usize) -> String {
        let mut text = String::new();
        for (offset, page) in pages_slice(&self.pages, start, end).iter().enumerate() {
            text.push_str(&tagged_page(start + offset, &page.content));
        }
        text
    }
}

fn pages_slice(pages: &[Page], start: usize, end: usize) -> &[Page] {
    let lo = start.max(1) - 1;
    let hi = end.min(pages.len());
    if lo >= hi { &[] } else { &pages[lo..hi] }
}

/// Tagged text for the physical-index range `lo..=hi` within a page run that
/// starts at `start_index`. Out-of-run indices are skipped.
pub fn tagged_range_of(pages: &[Page], start_index: usize, lo: usize, hi: usize) -> String {
    let one_past_end = start_index + pages.len();
    let mut text = String::new();
    for physical_index in lo.max(start_index)..hi.saturating_add(1).min(one_past_end) {
        let page = &pages[physical_index - start_index];
        text.push_str(&tagged_page(physical_index, &page.content));
    }
    text
}

/// Tag every page in `pages`, numbering from `start_index`, and count the
/// tokens of each tagged string.
pub fn tagged_pages(pages: &[Page], start_index: usize) -> (Vec<String>, Vec<usize>) {
    let mut contents = Vec::with_capacity(pages.len());
    let mut lengths = Vec::with_capacity(pages.len());
    for (offset, page) in pages.iter().enumerate() {
        let tagged = tagged_page(start_index + offset, &page.content);
        lengths.push(count_tokens(&tagged));
        contents.push(tagged);
    }
    (contents, lengths)
}

/// Pack pages into contiguous windows whose joined text fits a token budget,
/// repeating `overlap_pages` pages between consecutive windows.
///
/// When everything fits in one window, that window is returned alone.
/// Otherwise the target size per window is the midpoint between an even
/// split and the hard budget, which keeps windows balanced without
/// producing a tiny trailing remainder.
pub fn group_pages(
    page_contents: &[String],
    token_lengths: &[usize],
    max_tokens: usize,
    overlap_pages: usize,
) -> Vec<String> {
    if page_contents.is_empty() {
        return Vec::new();
    }

    let num_tokens: usize = token_lengths.iter().sum();

    if num_tokens <= max_tokens {
        return vec![page_contents.concat()];
    }

    let expected_parts = num_tokens.div_ceil(max_tokens);
    let average_tokens_per_part = (num_tokens.div_ceil(expected_parts) + max_tokens).div_ceil(2);

    let mut subsets: Vec<String> = Vec::new();
    let mut current_subset: Vec<&str> = Vec::new();
    let mut current_token_count = 0usize;

    for (i, (content, &tokens)) in page_contents.iter().zip(token_lengths).enumerate() {
        if current_token_count + tokens > average_tokens_per_part && !current_subset.is_empty() {
            subsets.push(current_subset.concat());
            // Restart from the overlap so section starts near a boundary are
            // visible in both windows.
            let overlap_start = i.saturating_sub(overlap_pages);
            current_subset = page_contents[overlap_start..i]
                .iter()
                .map(String::as_str)
                .collect();
            current_token_count = token_lengths[overlap_start..i].iter().sum();
        }

        current_subset.push(content);
        current_token_count += tokens;
    }

    if !current_subset.is_empty() {
        subsets.push(current_subset.concat());
    }

    subsets
}

/// Convenience: tag `pages` from `start_index` and group into windows.
pub fn tagged_windows(pages: &[Page], start_index: usize, max_tokens: usize) -> Vec<String> {
    let (contents, lengths) = tagged_pages(pages, start_index);
    group_pages(&contents, &lengths, max_tokens, 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synthetic_pages(n: usize, words_per_page: usize) -> Vec<Page> {
        (0..n)
            .map(|i| {
                let word = format!("page{} ", i + 1);
                Page::new(word.repeat(words_per_page))
            })
            .collect()
    }

    #[test]
    fn test_count_tokens_nonzero() {
        assert!(count_tokens("Hello world, this is a test.") > 0);
        assert_eq!(count_tokens(""), 0);
    }

    #[test]
    fn test_tagged_page_format() {
        let tagged = tagged_page(5, "Test content");
        assert!(tagged.starts_with("<physical_index_5>\n"));
        assert!(tagged.ends_with("<physical_index_5>\n\n"));
        assert!(tagged.contains("Test content"));
    }

    #[test]
    fn test_document_page_access() {
        let doc = Document::new("Test", vec![Page::new("a"), Page::new("b")]);

        assert!(doc.get_page(0).is_none());
        assert_eq!(doc.get_page(1).unwrap().content, "a");
        assert_eq!(doc.get_page(2).unwrap().content, "b");
        assert!(doc.get_page(3).is_none());
    }

    #[test]
    fn test_text_range_clamps_bounds() {
        let doc = Document::new("Test", vec![Page::new("a"), Page::new("b"), Page::new("c")]);
        assert_eq!(doc.text_range(2, 3), "bc");
        assert_eq!(doc.text_range(1, 99), "abc");
        assert_eq!(doc.text_range(5, 9), "");
    }

    #[test]
    fn test_tagged_range_numbers_pages() {
        let doc = Document::new("Test", vec![Page::new("a"), Page::new("b"), Page::new("c")]);
        let tagged = doc.tagged_range(2, 3);
        assert!(tagged.contains("<physical_index_2>"));
        assert!(tagged.contains("<physical_index_3>"));
        assert!(!tagged.contains("<physical_index_1>"));
    }

    #[test]
    fn test_group_pages_single_window() {
        let pages = synthetic_pages(3, 10);
        let (contents, lengths) = tagged_pages(&pages, 1);
        let groups = group_pages(&contents, &lengths, 20000, 1);
        assert_eq!(groups.len(), 1);
        assert!(groups[0].contains("<physical_index_1>"));
        assert!(groups[0].contains("<physical_index_3>"));
    }

    #[test]
    fn test_group_pages_splits_and_overlaps() {
        let pages = synthetic_pages(20, 200);
        let (contents, lengths) = tagged_pages(&pages, 1);
        let max_tokens = lengths.iter().sum::<usize>() / 3;
        let groups = group_pages(&contents, &lengths, max_tokens, 1);
        assert!(groups.len() > 1);

        // every page appears in at least one window
        for i in 1..=20 {
            let tag = format!("<physical_index_{}>", i);
            assert!(
                groups.iter().any(|g| g.contains(&tag)),
                "page {} missing from all windows",
                i
            );
        }

        // window budget respected up to the overlap allowance
        for group in &groups {
            assert!(count_tokens(group) <= max_tokens * 3 / 2);
        }
    }

    #[test]
    fn test_tagged_pages_offset_numbering() {
        let pages = synthetic_pages(3, 5);
        let (contents, _) = tagged_pages(&pages, 7);
        assert!(contents[0].contains("<physical_index_7>"));
        assert!(contents[2].contains("<physical_index_9>"));
    }
}
