//! TOC structuring: turn raw TOC text or page windows into flat item lists.
//!
//! `transform_toc` handles explicit TOC text (modes with a printed TOC) and
//! keeps prompting the model to continue whenever its output is cut off.
//! `generate_toc_init` / `generate_toc_continue` synthesize a structure
//! directly from tagged page windows when the document has no TOC; there is
//! no continuation strategy for them, so a truncated answer is fatal and the
//! window budget must be sized to prevent it.

use crate::error::{ExtractError, Result};
use crate::llm::{json, FinishReason, LlmClient, Prompts};
use crate::toc::{raw_entries_to_items, RawTocEntry, TocItem};
use serde::Deserialize;
use tracing::{debug, warn};

/// Hard bound on continue-the-JSON turns before giving up.
const MAX_CONTINUE_ATTEMPTS: usize = 5;

#[derive(Deserialize)]
struct TocWrapper {
    table_of_contents: Vec<RawTocEntry>,
}

#[derive(Deserialize)]
struct Completed {
    completed: String,
}

/// Decode a transformation response, accepting either the documented
/// `{"table_of_contents": [...]}` wrapper or a bare array.
fn parse_transformed(text: &str) -> Result<Vec<TocItem>> {
    if let Ok(wrapper) = serde_json::from_str::<TocWrapper>(text) {
        return Ok(raw_entries_to_items(wrapper.table_of_contents));
    }
    let entries: Vec<RawTocEntry> = serde_json::from_str(text).map_err(|e| {
        let preview: String = text.chars().take(200).collect();
        ExtractError::LlmParse(format!("{} in transformed TOC: {}", e, preview))
    })?;
    Ok(raw_entries_to_items(entries))
}

/// Ask the model whether the transformed TOC covers the raw TOC text.
async fn transformation_is_complete(
    client: &LlmClient,
    toc_content: &str,
    transformed: &str,
) -> Result<bool> {
    let prompt = format!(
        "{}\n Raw Table of contents:\n{}\n Cleaned Table of contents:\n{}",
        Prompts::toc_transformation_completeness(),
        toc_content,
        transformed
    );
    let response = client
        .complete(Some(Prompts::system_document_analyzer()), &prompt)
        .await?;

    match json::parse_json::<Completed>(&response) {
        Ok(verdict) => Ok(verdict.completed.trim().eq_ignore_ascii_case("yes")),
        Err(e) => {
            warn!(error = %e, "unparseable completeness verdict, assuming incomplete");
            Ok(false)
        }
    }
}

/// Transform raw TOC text into a flat list of items carrying printed page
/// numbers where the TOC shows them.
///
/// When the model's output is cut off (or the completeness check says the
/// transformation missed entries), the emitted JSON is truncated at its last
/// closing brace and the model is asked to continue from there, for at most
/// [`MAX_CONTINUE_ATTEMPTS`] turns.
pub async fn transform_toc(client: &LlmClient, toc_content: &str) -> Result<Vec<TocItem>> {
    let prompt = format!(
        "{}\n Given table of contents\n:{}",
        Prompts::toc_transformer(),
        toc_content
    );
    let (response, finish_reason) = client
        .complete_with_finish(Some(Prompts::system_document_analyzer()), &prompt)
        .await?;

    let mut complete = transformation_is_complete(client, toc_content, &response).await?;
    if complete && finish_reason == FinishReason::Finished {
        return parse_transformed(&json::extract_json(&response));
    }

    let mut assembled = json::strip_code_fence(&response);
    let mut finish = finish_reason;
    let mut attempts = 0;

    while !(complete && finish == FinishReason::Finished) {
        if attempts >= MAX_CONTINUE_ATTEMPTS {
            return Err(ExtractError::Truncated(format!(
                "TOC transformation incomplete after {} continuation turns",
                MAX_CONTINUE_ATTEMPTS
            )));
        }
        attempts += 1;

        // Drop any dangling partial row so the continuation splices cleanly.
        if let Some(position) = assembled.rfind('}') {
            assembled.truncate(position + 1);
        }

        let continue_prompt = Prompts::toc_transformer_continue()
            .replace("{toc_content}", toc_content)
            .replace("{partial}", &assembled);
        let (new_part, new_finish) = client
            .complete_with_finish(Some(Prompts::system_document_analyzer()), &continue_prompt)
            .await?;

        debug!(attempt = attempts, "continuing truncated TOC transformation");
        assembled.push_str(&json::strip_code_fence(&new_part));
        finish = new_finish;
        complete = transformation_is_complete(client, toc_content, &assembled).await?;
    }

    parse_transformed(&assembled)
}

fn parse_generated(response: &str) -> Result<Vec<TocItem>> {
    let entries: Vec<RawTocEntry> = json::parse_json(response)?;
    Ok(raw_entries_to_items(entries))
}

/// Generate the initial structure for the first page window of a document
/// with no TOC. The model reports each section's `<physical_index_N>`.
pub async fn generate_toc_init(client: &LlmClient, window_text: &str) -> Result<Vec<TocItem>> {
    let prompt = format!(
        "{}\nGiven text\n:{}",
        Prompts::generate_toc_init(),
        window_text
    );
    let (response, finish_reason) = client
        .complete_with_finish(Some(Prompts::system_document_analyzer()), &prompt)
        .await?;

    if finish_reason != FinishReason::Finished {
        return Err(ExtractError::Truncated(
            "structure generation output was cut off; reduce the window token budget".to_string(),
        ));
    }

    parse_generated(&response)
}

/// Continue structure generation over a subsequent page window, carrying the
/// list built so far so numbering stays monotone.
pub async fn generate_toc_continue(
    client: &LlmClient,
    previous: &[TocItem],
    window_text: &str,
) -> Result<Vec<TocItem>> {
    let previous_json = serde_json::to_string_pretty(previous)
        .map_err(|e| ExtractError::Serialization(e.to_string()))?;
    let prompt = format!(
        "{}\nGiven text\n:{}\nPrevious tree structure\n:{}",
        Prompts::generate_toc_continue(),
        window_text,
        previous_json
    );
    let (response, finish_reason) = client
        .complete_with_finish(Some(Prompts::system_document_analyzer()), &prompt)
        .await?;

    if finish_reason != FinishReason::Finished {
        return Err(ExtractError::Truncated(
            "structure continuation output was cut off; reduce the window token budget".to_string(),
        ));
    }

    parse_generated(&response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_transformed_wrapper() {
        let items = parse_transformed(
            r#"{"table_of_contents": [
                {"structure": "1", "title": "Intro", "page": 1},
                {"structure": "2", "title": "Body", "page": "not a number"}
            ]}"#,
        )
        .unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].page, Some(1));
        assert_eq!(items[1].page, None); // non-numeric pages stay unset
    }

    #[test]
    fn test_parse_transformed_bare_array() {
        let items = parse_transformed(
            r#"[{"structure": "1", "title": "Intro", "page": 4}]"#,
        )
        .unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "Intro");
    }

    #[test]
    fn test_parse_transformed_rejects_garbage() {
        assert!(parse_transformed("not json").is_err());
    }

    #[test]
    fn test_parse_generated_physical_tags() {
        let items = parse_generated(
            r#"```json
[
    {"structure": "1", "title": "Overview", "physical_index": "<physical_index_2>"},
    {"structure": "1.1", "title": "Goals", "physical_index": "<physical_index_4>"}
]
```"#,
        )
        .unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].physical_index, Some(2));
        assert_eq!(items[1].physical_index, Some(4));
        assert!(items.iter().all(|i| i.page.is_none()));
    }
}
