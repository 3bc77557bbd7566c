//! TOC detection: locate the pages that hold a table of contents and decide
//! whether its entries carry printed page numbers.
//!
//! Phase 1 walks the leading pages, asking the model page by page. Phase 2
//! concatenates the hits, collapses dot leaders, and asks whether printed
//! numbers are present. When they are not, the scan continues deeper into
//! the document in case a second, numbered TOC region exists (common when a
//! brief overview TOC precedes a detailed one).

use crate::document::Page;
use crate::error::Result;
use crate::llm::{json, LlmClient, Prompts};
use crate::toc::Answer;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, info, warn};

static DOT_LEADERS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\.{5,}").expect("static pattern"));
static SPACED_DOT_LEADERS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:\. ){5,}\.?").expect("static pattern"));

/// Outcome of TOC detection over the leading pages.
#[derive(Debug, Clone)]
pub struct TocDetection {
    /// Cleaned TOC text, if any TOC pages were found.
    pub toc_content: Option<String>,
    /// Physical indices (1-based) of the detected TOC pages.
    pub toc_page_list: Vec<usize>,
    /// Whether the TOC carries printed page numbers.
    pub page_index_given: Answer,
}

impl TocDetection {
    fn none() -> Self {
        Self {
            toc_content: None,
            toc_page_list: Vec::new(),
            page_index_given: Answer::No,
        }
    }

    /// True when a usable TOC with printed page numbers was found.
    pub fn has_numbered_toc(&self) -> bool {
        self.toc_content.as_deref().is_some_and(|c| !c.trim().is_empty())
            && self.page_index_given.is_yes()
    }

    /// True when a TOC was found at all.
    pub fn has_toc(&self) -> bool {
        self.toc_content.as_deref().is_some_and(|c| !c.trim().is_empty())
    }
}

#[derive(Deserialize)]
struct TocDetected {
    toc_detected: String,
}

#[derive(Deserialize)]
struct PageIndexGiven {
    page_index_given_in_toc: String,
}

/// Ask the model whether one page's text is a TOC page.
async fn is_toc_page(client: &LlmClient, content: &str) -> Result<Answer> {
    let prompt = Prompts::toc_detector().replace("{content}", content);
    let response = client
        .complete(Some(Prompts::system_document_analyzer()), &prompt)
        .await?;

    match json::parse_json::<TocDetected>(&response) {
        Ok(verdict) => Ok(Answer::from_model(&verdict.toc_detected)),
        Err(e) => {
            warn!(error = %e, "unparseable TOC detection verdict, counting as no");
            Ok(Answer::No)
        }
    }
}

/// Phase 1: scan pages from `start` (0-based) and collect consecutive TOC
/// pages. Returns 1-based physical indices.
///
/// The scan stops at the first "no" after a "yes" (the TOC ended), or once
/// `toc_check_pages` pages have been examined without an open TOC run.
pub async fn find_toc_pages(
    client: &LlmClient,
    pages: &[Page],
    start: usize,
    toc_check_pages: usize,
) -> Result<Vec<usize>> {
    let mut toc_page_list = Vec::new();
    let mut last_page_was_toc = false;
    let mut i = start;

    while i < pages.len() {
        if i >= toc_check_pages && !last_page_was_toc {
            break;
        }
        match is_toc_page(client, &pages[i].content).await? {
            Answer::Yes => {
                debug!(page = i + 1, "TOC page detected");
                toc_page_list.push(i + 1);
                last_page_was_toc = true;
            }
            Answer::No if last_page_was_toc => {
                debug!(page = i, "last TOC page found");
                break;
            }
            Answer::No => {}
        }
        i += 1;
    }

    if toc_page_list.is_empty() {
        info!("no TOC pages found in scan starting at page {}", start + 1);
    }

    Ok(toc_page_list)
}

/// Collapse runs of dot leaders ("Chapter 1 ....... 17") into ": " so the
/// model is not fed thousands of filler dots.
pub fn collapse_dot_leaders(text: &str) -> String {
    let text = DOT_LEADERS.replace_all(text, ": ");
    SPACED_DOT_LEADERS.replace_all(&text, ": ").into_owned()
}

/// Phase 2: concatenate detected TOC pages, clean them, and ask whether
/// printed page numbers are present.
async fn classify_toc_pages(
    client: &LlmClient,
    pages: &[Page],
    toc_page_list: &[usize],
) -> Result<(String, Answer)> {
    let mut toc_content = String::new();
    for &physical_index in toc_page_list {
        if let Some(page) = pages.get(physical_index - 1) {
            toc_content.push_str(&page.content);
        }
    }
    let toc_content = collapse_dot_leaders(&toc_content);

    let prompt = Prompts::detect_page_index().replace("{toc_content}", &toc_content);
    let response = client
        .complete(Some(Prompts::system_document_analyzer()), &prompt)
        .await?;

    let has_numbers = match json::parse_json::<PageIndexGiven>(&response) {
        Ok(verdict) => Answer::from_model(&verdict.page_index_given_in_toc),
        Err(e) => {
            warn!(error = %e, "unparseable page-number verdict, counting as no");
            Answer::No
        }
    };

    Ok((toc_content, has_numbers))
}

/// Full TOC detection over a document's leading pages.
///
/// When the first TOC region carries no printed numbers, the scan continues
/// further into the document (still bounded by `toc_check_pages`) looking
/// for a numbered region, which is preferred if found.
pub async fn check_toc(
    client: &LlmClient,
    pages: &[Page],
    toc_check_pages: usize,
) -> Result<TocDetection> {
    let toc_page_list = find_toc_pages(client, pages, 0, toc_check_pages).await?;
    if toc_page_list.is_empty() {
        return Ok(TocDetection::none());
    }

    let (toc_content, page_index_given) = classify_toc_pages(client, pages, &toc_page_list).await?;
    if page_index_given.is_yes() {
        info!(pages = ?toc_page_list, "numbered TOC found");
        return Ok(TocDetection {
            toc_content: Some(toc_content),
            toc_page_list,
            page_index_given,
        });
    }

    // Look past the unnumbered region for a TOC that does carry numbers.
    let mut current_start = *toc_page_list.last().unwrap_or(&0); // 0-based: last 1-based index
    while current_start < pages.len() && current_start < toc_check_pages {
        let additional = find_toc_pages(client, pages, current_start, toc_check_pages).await?;
        if additional.is_empty() {
            break;
        }
        let (additional_content, additional_numbers) =
            classify_toc_pages(client, pages, &additional).await?;
        if additional_numbers.is_yes() {
            info!(pages = ?additional, "numbered TOC found past unnumbered region");
            return Ok(TocDetection {
                toc_content: Some(additional_content),
                toc_page_list: additional,
                page_index_given: Answer::Yes,
            });
        }
        current_start = *additional.last().unwrap_or(&current_start);
    }

    info!(pages = ?toc_page_list, "TOC found without printed page numbers");
    Ok(TocDetection {
        toc_content: Some(toc_content),
        toc_page_list,
        page_index_given: Answer::No,
    })
}
