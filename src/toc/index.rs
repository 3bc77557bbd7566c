//! Index resolution: map section titles to physical page indices.
//!
//! Three strategies feed this module. With printed page numbers, a constant
//! offset between printed and physical numbering is inferred from titles the
//! model can see in a window just past the TOC, then applied wholesale.
//! Without printed numbers, the model walks token-bounded windows and marks
//! where each section starts. Single items are repaired by handing the model
//! a bounded page range and asking where the section begins.

use crate::document::{tagged_range_of, Page};
use crate::error::{ExtractError, Result};
use crate::llm::{json, LlmClient, Prompts};
use crate::toc::{parse_physical_index_tag, raw_entries_to_items, RawTocEntry, TocItem};
use serde::Deserialize;
use tracing::{debug, warn};

/// Ask the model to annotate TOC entries with the `<physical_index_N>` of
/// any section it can see inside `window_text`. Entries outside the window
/// keep a null index.
pub async fn toc_index_extractor(
    client: &LlmClient,
    items: &[TocItem],
    window_text: &str,
) -> Result<Vec<TocItem>> {
    let items_json = serde_json::to_string_pretty(items)
        .map_err(|e| ExtractError::Serialization(e.to_string()))?;
    let prompt = format!(
        "{}\nTable of contents:\n{}\nDocument pages:\n{}",
        Prompts::toc_index_extractor(),
        items_json,
        window_text
    );
    let response = client
        .complete(Some(Prompts::system_document_analyzer()), &prompt)
        .await?;

    let entries: Vec<RawTocEntry> = json::parse_json(&response)?;
    Ok(raw_entries_to_items(entries))
}

/// Pair up printed page numbers with observed physical indices by matching
/// titles between the transformed TOC and the window annotation. Pairs whose
/// physical index falls before the observation window are discarded; those
/// are TOC pages citing themselves.
pub fn extract_matching_page_pairs(
    toc_with_page: &[TocItem],
    toc_with_physical: &[TocItem],
    window_start: usize,
) -> Vec<(i64, usize)> {
    let mut pairs = Vec::new();
    for phy_item in toc_with_physical {
        let Some(physical_index) = phy_item.physical_index else {
            continue;
        };
        if physical_index < window_start {
            continue;
        }
        for page_item in toc_with_page {
            if page_item.title == phy_item.title {
                if let Some(page) = page_item.page {
                    pairs.push((page, physical_index));
                }
            }
        }
    }
    pairs
}

/// The most frequent `physical - printed` difference across the observed
/// pairs; ties broken by first appearance.
pub fn calculate_page_offset(pairs: &[(i64, usize)]) -> Option<i64> {
    let mut counts: Vec<(i64, usize)> = Vec::new();
    for &(page, physical_index) in pairs {
        let difference = physical_index as i64 - page;
        match counts.iter_mut().find(|(d, _)| *d == difference) {
            Some((_, count)) => *count += 1,
            None => counts.push((difference, 1)),
        }
    }

    let mut best: Option<(i64, usize)> = None;
    for &(difference, count) in &counts {
        if best.is_none_or(|(_, best_count)| count > best_count) {
            best = Some((difference, count));
        }
    }
    best.map(|(difference, _)| difference)
}

/// Apply the inferred offset: every item with a printed page number gets
/// `physical_index = page + offset` and loses the printed number. Offsets
/// that would land before page 1 leave the index unset for later repair.
pub fn apply_page_offset(items: &mut [TocItem], offset: i64) {
    for item in items.iter_mut() {
        if let Some(page) = item.page.take() {
            let physical = page + offset;
            if physical >= 1 {
                item.physical_index = Some(physical as usize);
            } else {
                warn!(title = %item.title, page, offset, "offset maps page before document start");
                item.physical_index = None;
            }
        }
    }
}

/// Ask the model, for each entry in `items`, whether its section starts in
/// `window_text`, filling `physical_index` where it does. Earlier windows'
/// decisions ride along in the serialized list and are not revised.
pub async fn add_page_number_to_toc(
    client: &LlmClient,
    window_text: &str,
    items: &[TocItem],
) -> Result<Vec<TocItem>> {
    let items_json = serde_json::to_string_pretty(items)
        .map_err(|e| ExtractError::Serialization(e.to_string()))?;
    let prompt = format!(
        "{}\n\nCurrent Partial Document:\n{}\n\nGiven Structure\n{}\n",
        Prompts::add_page_number_to_toc(),
        window_text,
        items_json
    );
    let response = client
        .complete(Some(Prompts::system_document_analyzer()), &prompt)
        .await?;

    let entries: Vec<RawTocEntry> = json::parse_json(&response)?;
    Ok(raw_entries_to_items(entries))
}

#[derive(Deserialize)]
struct LocatedIndex {
    physical_index: Option<serde_json::Value>,
}

/// Ask the model which page in `window_text` a section starts on.
pub async fn locate_section_start(
    client: &LlmClient,
    title: &str,
    window_text: &str,
) -> Result<Option<usize>> {
    let prompt = format!(
        "{}\nSection Title:\n{}\nDocument pages:\n{}",
        Prompts::single_toc_item_index_fixer(),
        title,
        window_text
    );
    let response = client
        .complete(Some(Prompts::system_document_analyzer()), &prompt)
        .await?;

    let located: LocatedIndex = json::parse_json(&response)?;
    Ok(located.physical_index.and_then(|v| match v {
        serde_json::Value::String(s) => parse_physical_index_tag(&s),
        serde_json::Value::Number(n) => n.as_u64().map(|n| n as usize),
        _ => None,
    }))
}

/// Resolve items whose printed page number was absent from the TOC.
///
/// Neighbor indices are snapshotted up front so fixes committed during the
/// walk cannot shift later lookups. For each unresolved item, the pages
/// between its nearest resolved neighbors form the search window handed to
/// [`locate_section_start`].
pub async fn resolve_missing_indices(
    client: &LlmClient,
    items: &mut [TocItem],
    pages: &[Page],
    start_index: usize,
) -> Result<()> {
    let end_index = start_index + pages.len().saturating_sub(1);
    let snapshot: Vec<Option<usize>> = items.iter().map(|i| i.physical_index).collect();

    for i in 0..items.len() {
        if snapshot[i].is_some() {
            continue;
        }

        let prev = snapshot[..i]
            .iter()
            .rev()
            .find_map(|p| *p)
            .unwrap_or(start_index.saturating_sub(1));
        let next = snapshot[i + 1..]
            .iter()
            .find_map(|p| *p)
            .unwrap_or(end_index);

        let window = tagged_range_of(pages, start_index, prev, next);
        if window.is_empty() {
            continue;
        }

        match locate_section_start(client, &items[i].title, &window).await {
            Ok(Some(physical_index)) => {
                debug!(title = %items[i].title, physical_index, "resolved missing page number");
                items[i].physical_index = Some(physical_index);
                items[i].page = None;
            }
            Ok(None) => {
                warn!(title = %items[i].title, "model could not place section");
            }
            Err(e) => {
                warn!(title = %items[i].title, error = %e, "page-number resolution failed");
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(title: &str, page: Option<i64>, physical: Option<usize>) -> TocItem {
        TocItem {
            structure: None,
            title: title.to_string(),
            page,
            physical_index: physical,
            appear_start: None,
        }
    }

    #[test]
    fn test_matching_pairs_by_title() {
        let with_page = vec![
            item("Intro", Some(1), None),
            item("Body", Some(3), None),
            item("End", Some(9), None),
        ];
        let with_physical = vec![
            item("Intro", None, Some(5)),
            item("Body", None, Some(7)),
            item("Missing", None, Some(8)),
            item("End", None, Some(2)), // before the window: discarded
        ];

        let pairs = extract_matching_page_pairs(&with_page, &with_physical, 4);
        assert_eq!(pairs, vec![(1, 5), (3, 7)]);
    }

    #[test]
    fn test_offset_is_most_frequent_difference() {
        // (printed, physical): three agree on +4, one noisy outlier
        let pairs = vec![(1, 5), (2, 6), (3, 7), (4, 99)];
        assert_eq!(calculate_page_offset(&pairs), Some(4));
    }

    #[test]
    fn test_offset_tie_breaks_first_seen() {
        let pairs = vec![(1, 3), (2, 5), (4, 6), (5, 8)];
        // differences: 2, 3, 2, 3 — tie broken by first appearance
        assert_eq!(calculate_page_offset(&pairs), Some(2));
    }

    #[test]
    fn test_offset_empty_pairs() {
        assert_eq!(calculate_page_offset(&[]), None);
    }

    #[test]
    fn test_apply_page_offset_consumes_printed_pages() {
        let mut items = vec![
            item("Intro", Some(1), None),
            item("Body", Some(5), None),
            item("Unnumbered", None, None),
        ];
        apply_page_offset(&mut items, 4);

        assert_eq!(items[0].physical_index, Some(5));
        assert_eq!(items[1].physical_index, Some(9));
        assert!(items.iter().all(|i| i.page.is_none()));
        assert_eq!(items[2].physical_index, None);
    }

    #[test]
    fn test_apply_page_offset_rejects_preposterous_offset() {
        let mut items = vec![item("Front", Some(2), None)];
        apply_page_offset(&mut items, -10);
        assert_eq!(items[0].physical_index, None);
        assert_eq!(items[0].page, None);
    }
}
