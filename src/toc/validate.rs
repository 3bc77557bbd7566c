//! Validation and repair of title → page mappings.
//!
//! Every claimed mapping is checked against the actual page text through the
//! model. Accuracy over the checked items drives the caller's control
//! policy: accept, repair the few wrong ones, or abandon the strategy. The
//! repair loop re-locates each wrong item inside the pages bracketed by its
//! nearest trusted neighbors, and only commits a fix the model re-confirms.

use crate::document::{tagged_range_of, Page};
use crate::error::Result;
use crate::llm::{json, LlmClient, Prompts};
use crate::toc::index::locate_section_start;
use crate::toc::{Answer, CheckResult, TocItem};
use futures::future::join_all;
use serde::Deserialize;
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Repair rounds before remaining items are left as-is.
pub const MAX_FIX_ATTEMPTS: usize = 3;

#[derive(Deserialize)]
struct AppearanceVerdict {
    answer: Option<String>,
}

#[derive(Deserialize)]
struct StartVerdict {
    start_begin: Option<String>,
}

/// Ask whether `title` appears or starts on the page at `physical_index`.
/// A missing index short-circuits to "no" without a model call.
pub async fn check_title_appearance(
    client: &LlmClient,
    list_index: usize,
    title: &str,
    physical_index: Option<usize>,
    pages: &[Page],
    start_index: usize,
) -> Result<CheckResult> {
    let no = |physical_index| CheckResult {
        list_index,
        title: title.to_string(),
        physical_index,
        answer: Answer::No,
    };

    let Some(physical) = physical_index else {
        return Ok(no(None));
    };
    let Some(page) = physical
        .checked_sub(start_index)
        .and_then(|offset| pages.get(offset))
    else {
        return Ok(no(Some(physical)));
    };

    let prompt = Prompts::check_title_appearance()
        .replace("{title}", title)
        .replace("{page_text}", &page.content);
    let response = client
        .complete(Some(Prompts::system_document_analyzer()), &prompt)
        .await?;

    let answer = match json::parse_json::<AppearanceVerdict>(&response) {
        Ok(verdict) => Answer::from_model(verdict.answer.as_deref().unwrap_or("no")),
        Err(_) => Answer::No,
    };

    Ok(CheckResult {
        list_index,
        title: title.to_string(),
        physical_index: Some(physical),
        answer,
    })
}

/// Verify every indexed item concurrently and compute the share that checks
/// out. When even the furthest mapped page sits in the first half of the
/// range, the mapping clearly failed to span the document and accuracy is
/// reported as zero without any model calls.
pub async fn verify_toc(
    client: &LlmClient,
    pages: &[Page],
    items: &[TocItem],
    start_index: usize,
) -> Result<(f64, Vec<CheckResult>)> {
    let max_physical = items.iter().filter_map(|i| i.physical_index).max();
    let Some(max_physical) = max_physical else {
        return Ok((0.0, Vec::new()));
    };
    let covered = max_physical.saturating_sub(start_index.saturating_sub(1));
    if covered * 2 < pages.len() {
        info!(
            max_physical,
            page_count = pages.len(),
            "mapped indices span less than half the range"
        );
        return Ok((0.0, Vec::new()));
    }

    let tasks = items.iter().enumerate().filter_map(|(list_index, item)| {
        item.physical_index.map(|physical| {
            check_title_appearance(
                client,
                list_index,
                &item.title,
                Some(physical),
                pages,
                start_index,
            )
        })
    });
    let results = join_all(tasks).await;

    let mut correct_count = 0usize;
    let mut checked_count = 0usize;
    let mut incorrect_results = Vec::new();
    for result in results {
        match result {
            Ok(check) => {
                checked_count += 1;
                if check.answer.is_yes() {
                    correct_count += 1;
                } else {
                    incorrect_results.push(check);
                }
            }
            Err(e) => {
                warn!(error = %e, "appearance check failed, skipping item");
            }
        }
    }

    let accuracy = if checked_count > 0 {
        correct_count as f64 / checked_count as f64
    } else {
        0.0
    };
    info!(accuracy, incorrect = incorrect_results.len(), "verification pass complete");
    Ok((accuracy, incorrect_results))
}

/// Ask whether `title` is the first content on the page.
async fn check_title_in_page_start(
    client: &LlmClient,
    title: &str,
    page_text: &str,
) -> Result<Answer> {
    let prompt = Prompts::check_title_appearance_in_start()
        .replace("{title}", title)
        .replace("{page_text}", page_text);
    let response = client
        .complete(Some(Prompts::system_document_analyzer()), &prompt)
        .await?;

    match json::parse_json::<StartVerdict>(&response) {
        Ok(verdict) => Ok(Answer::from_model(verdict.start_begin.as_deref().unwrap_or("no"))),
        Err(_) => Ok(Answer::No),
    }
}

/// Stamp every item with whether its title opens its page. `pages` is the
/// whole document here: physical indices address it directly. Items without
/// an index, out-of-range indices, and failed checks are all stamped "no",
/// which keeps the previous section's end page untouched.
pub async fn check_title_start_concurrent(
    client: &LlmClient,
    items: &mut [TocItem],
    pages: &[Page],
) {
    let tasks = items.iter().map(|item| async move {
        let Some(page) = item
            .physical_index
            .and_then(|physical| physical.checked_sub(1))
            .and_then(|offset| pages.get(offset))
        else {
            return Answer::No;
        };
        match check_title_in_page_start(client, &item.title, &page.content).await {
            Ok(answer) => answer,
            Err(e) => {
                warn!(title = %item.title, error = %e, "page-start check failed");
                Answer::No
            }
        }
    });
    let answers = join_all(tasks).await;

    for (item, answer) in items.iter_mut().zip(answers) {
        item.appear_start = Some(answer);
    }
}

/// The physical page range bracketing `list_index` between its nearest
/// trusted neighbors. Items in the incorrect set and items without an index
/// are not trusted; the document edges bound the range at either end.
fn repair_range(
    physical_snapshot: &[Option<usize>],
    incorrect_indices: &HashSet<usize>,
    list_index: usize,
    start_index: usize,
    end_index: usize,
) -> (usize, usize) {
    let prev = physical_snapshot[..list_index]
        .iter()
        .enumerate()
        .rev()
        .find_map(|(j, p)| {
            if incorrect_indices.contains(&j) {
                None
            } else {
                *p
            }
        })
        .unwrap_or(start_index.saturating_sub(1));

    let next = physical_snapshot[list_index + 1..]
        .iter()
        .enumerate()
        .find_map(|(offset, p)| {
            let j = list_index + 1 + offset;
            if incorrect_indices.contains(&j) {
                None
            } else {
                *p
            }
        })
        .unwrap_or(end_index);

    (prev, next)
}

/// One repair round: re-locate each incorrect item inside its bracketing
/// range, re-check the proposed index, and commit only confirmed fixes.
/// Returns the items still wrong afterwards.
async fn fix_incorrect_toc(
    client: &LlmClient,
    items: &mut [TocItem],
    pages: &[Page],
    incorrect_results: &[CheckResult],
    start_index: usize,
) -> Result<Vec<CheckResult>> {
    let incorrect_indices: HashSet<usize> =
        incorrect_results.iter().map(|r| r.list_index).collect();
    let end_index = start_index + pages.len().saturating_sub(1);
    let physical_snapshot: Vec<Option<usize>> = items.iter().map(|i| i.physical_index).collect();

    let tasks = incorrect_results.iter().map(|incorrect_item| {
        let list_index = incorrect_item.list_index;
        let title = incorrect_item.title.clone();
        let (prev, next) = repair_range(
            &physical_snapshot,
            &incorrect_indices,
            list_index,
            start_index,
            end_index,
        );
        let window = tagged_range_of(pages, start_index, prev, next);
        async move {
            let located = locate_section_start(client, &title, &window).await?;
            let check = check_title_appearance(
                client,
                list_index,
                &title,
                located,
                pages,
                start_index,
            )
            .await?;
            debug!(title = %title, prev, next, located = ?located, confirmed = check.answer.is_yes(), "repair attempt");
            Ok::<CheckResult, crate::error::ExtractError>(check)
        }
    });
    let results = join_all(tasks).await;

    let mut still_invalid = Vec::new();
    for result in results {
        match result {
            Ok(check) if check.answer.is_yes() => {
                if let Some(item) = items.get_mut(check.list_index) {
                    item.physical_index = check.physical_index;
                }
            }
            Ok(check) => still_invalid.push(check),
            Err(e) => {
                warn!(error = %e, "repair task failed, leaving item as-is");
            }
        }
    }

    Ok(still_invalid)
}

/// Run repair rounds until everything checks out or the attempt bound is
/// hit; items that never validate keep their original index.
pub async fn fix_incorrect_toc_with_retries(
    client: &LlmClient,
    items: &mut [TocItem],
    pages: &[Page],
    mut incorrect_results: Vec<CheckResult>,
    start_index: usize,
) -> Result<Vec<CheckResult>> {
    let mut fix_attempt = 0;

    while !incorrect_results.is_empty() {
        info!(remaining = incorrect_results.len(), attempt = fix_attempt + 1, "repairing incorrect mappings");
        incorrect_results =
            fix_incorrect_toc(client, items, pages, &incorrect_results, start_index).await?;

        fix_attempt += 1;
        if fix_attempt >= MAX_FIX_ATTEMPTS {
            info!("maximum repair attempts reached");
            break;
        }
    }

    Ok(incorrect_results)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repair_range_between_trusted_neighbors() {
        // indices:          0        1      2        3        4
        let snapshot = vec![Some(3), None, Some(10), Some(15), Some(20)];
        let incorrect: HashSet<usize> = [2].into_iter().collect();

        // item 2: prev trusted is item 0 (item 1 has no index), next is item 3
        assert_eq!(repair_range(&snapshot, &incorrect, 2, 1, 30), (3, 15));
    }

    #[test]
    fn test_repair_range_skips_other_incorrect_items() {
        let snapshot = vec![Some(3), Some(6), Some(10), Some(15)];
        let incorrect: HashSet<usize> = [1, 2].into_iter().collect();

        // item 1 cannot trust item 2; it brackets between items 0 and 3
        assert_eq!(repair_range(&snapshot, &incorrect, 1, 1, 30), (3, 15));
        assert_eq!(repair_range(&snapshot, &incorrect, 2, 1, 30), (3, 15));
    }

    #[test]
    fn test_repair_range_document_edges() {
        let snapshot = vec![Some(5), Some(9)];
        let incorrect: HashSet<usize> = [0, 1].into_iter().collect();

        // nothing trusted on either side: the document edges bound the range
        assert_eq!(repair_range(&snapshot, &incorrect, 0, 1, 40), (0, 40));
        assert_eq!(repair_range(&snapshot, &incorrect, 1, 1, 40), (0, 40));
    }

    #[test]
    fn test_repair_range_offset_run() {
        let snapshot = vec![Some(52), Some(60)];
        let incorrect: HashSet<usize> = [1].into_iter().collect();

        // subdivision runs start past page 1; the left default follows suit
        assert_eq!(repair_range(&snapshot, &incorrect, 1, 51, 90), (52, 90));
        let all_bad: HashSet<usize> = [0, 1].into_iter().collect();
        assert_eq!(repair_range(&snapshot, &all_bad, 0, 51, 90), (50, 90));
    }
}
