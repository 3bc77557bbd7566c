//! Table-of-contents discovery, structuring, indexing, and validation.
//!
//! The flat intermediate representation lives here: [`TocItem`] rows flow
//! through the submodules (detect → structure → index → validate) before the
//! tree builder freezes them into nodes.

pub mod detect;
pub mod index;
pub mod structure;
pub mod validate;

use serde::{Deserialize, Serialize};

/// A yes/no verdict from the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Answer {
    Yes,
    No,
}

impl Answer {
    /// Parse a model-provided string, treating anything but "yes" as no.
    pub fn from_model(s: &str) -> Self {
        if s.trim().eq_ignore_ascii_case("yes") {
            Answer::Yes
        } else {
            Answer::No
        }
    }

    pub fn is_yes(self) -> bool {
        self == Answer::Yes
    }
}

/// One row of the flat intermediate representation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TocItem {
    /// Dotted hierarchy path ("1", "1.2", "1.2.3").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub structure: Option<String>,

    /// Section title as printed.
    pub title: String,

    /// Printed page number from the TOC. Only populated between
    /// transformation and offset fusion; removed once fused.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<i64>,

    /// Physical page index (1-based position in the PDF).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub physical_index: Option<usize>,

    /// Whether the title is the first content on its page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub appear_start: Option<Answer>,
}

impl TocItem {
    pub fn new(structure: Option<String>, title: impl Into<String>) -> Self {
        Self {
            structure,
            title: title.into(),
            page: None,
            physical_index: None,
            appear_start: None,
        }
    }

    /// True when the section title sits at the very top of its page.
    /// A missing verdict counts as no, so the preceding section keeps the
    /// shared page.
    pub fn starts_at_page_top(&self) -> bool {
        self.appear_start == Some(Answer::Yes)
    }
}

/// The model's verdict on whether a title appears on a claimed page.
#[derive(Debug, Clone)]
pub struct CheckResult {
    /// Position of the checked item in the flat list.
    pub list_index: usize,
    pub title: String,
    pub physical_index: Option<usize>,
    pub answer: Answer,
}

/// Which extraction strategy a pipeline pass is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractMode {
    /// Explicit TOC whose entries carry printed page numbers.
    TocWithPageNumbers,
    /// Explicit TOC without printed page numbers.
    TocNoPageNumbers,
    /// No TOC at all; structure is generated from the page text.
    NoToc,
}

impl ExtractMode {
    /// The next simpler strategy to degrade to, if any.
    pub fn fallback(self) -> Option<ExtractMode> {
        match self {
            ExtractMode::TocWithPageNumbers => Some(ExtractMode::TocNoPageNumbers),
            ExtractMode::TocNoPageNumbers => Some(ExtractMode::NoToc),
            ExtractMode::NoToc => None,
        }
    }
}

/// Parse the integer out of a `<physical_index_N>` tag. Tolerates a bare
/// number and surrounding whitespace.
pub fn parse_physical_index_tag(s: &str) -> Option<usize> {
    let s = s.trim();
    if let Some(rest) = s.strip_prefix("<physical_index_") {
        return rest.trim_end_matches('>').trim().parse().ok();
    }
    s.parse().ok()
}

/// One entry as the model actually returns it: field types vary between
/// numbers, tagged strings, the literal "None", and null.
#[derive(Debug, Clone, Deserialize)]
pub struct RawTocEntry {
    #[serde(default)]
    pub structure: Option<serde_json::Value>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub page: Option<serde_json::Value>,
    #[serde(default)]
    pub physical_index: Option<serde_json::Value>,
}

impl RawTocEntry {
    /// Normalize into a [`TocItem`]. Entries without a title are dropped by
    /// the caller.
    pub fn into_toc_item(self) -> Option<TocItem> {
        let title = self.title?;
        let structure = match self.structure {
            Some(serde_json::Value::String(s)) if !s.is_empty() && s != "None" && s != "null" => {
                Some(s)
            }
            Some(serde_json::Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };
        let page = match self.page {
            Some(serde_json::Value::Number(n)) => n.as_i64(),
            Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
            _ => None,
        };
        let physical_index = match self.physical_index {
            Some(serde_json::Value::Number(n)) => n.as_u64().map(|n| n as usize),
            Some(serde_json::Value::String(s)) => parse_physical_index_tag(&s),
            _ => None,
        };

        Some(TocItem {
            structure,
            title,
            page,
            physical_index,
            appear_start: None,
        })
    }
}

/// Normalize a model-returned entry list into [`TocItem`]s, dropping
/// title-less rows.
pub fn raw_entries_to_items(entries: Vec<RawTocEntry>) -> Vec<TocItem> {
    entries
        .into_iter()
        .filter_map(RawTocEntry::into_toc_item)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_answer_from_model() {
        assert_eq!(Answer::from_model("yes"), Answer::Yes);
        assert_eq!(Answer::from_model(" YES "), Answer::Yes);
        assert_eq!(Answer::from_model("no"), Answer::No);
        assert_eq!(Answer::from_model("maybe"), Answer::No);
    }

    #[test]
    fn test_parse_physical_index_tag() {
        assert_eq!(parse_physical_index_tag("<physical_index_10>"), Some(10));
        assert_eq!(parse_physical_index_tag(" <physical_index_3> "), Some(3));
        assert_eq!(parse_physical_index_tag("42"), Some(42));
        assert_eq!(parse_physical_index_tag("<physical_index_x>"), None);
        assert_eq!(parse_physical_index_tag("chapter one"), None);
    }

    #[test]
    fn test_mode_fallback_chain() {
        assert_eq!(
            ExtractMode::TocWithPageNumbers.fallback(),
            Some(ExtractMode::TocNoPageNumbers)
        );
        assert_eq!(
            ExtractMode::TocNoPageNumbers.fallback(),
            Some(ExtractMode::NoToc)
        );
        assert_eq!(ExtractMode::NoToc.fallback(), None);
    }

    #[test]
    fn test_raw_entry_normalization() {
        let raw: Vec<RawTocEntry> = serde_json::from_str(
            r#"[
                {"structure": "1", "title": "Intro", "page": 3},
                {"structure": "1.1", "title": "Scope", "physical_index": "<physical_index_7>"},
                {"structure": 2, "title": "Body", "page": "12"},
                {"structure": "None", "title": "Annex", "page": null},
                {"structure": "3", "page": 9}
            ]"#,
        )
        .unwrap();

        let items = raw_entries_to_items(raw);
        assert_eq!(items.len(), 4); // title-less row dropped

        assert_eq!(items[0].structure.as_deref(), Some("1"));
        assert_eq!(items[0].page, Some(3));
        assert_eq!(items[1].physical_index, Some(7));
        assert_eq!(items[2].structure.as_deref(), Some("2"));
        assert_eq!(items[2].page, Some(12));
        assert_eq!(items[3].structure, None);
        assert_eq!(items[3].page, None);
    }

    #[test]
    fn test_starts_at_page_top_defaults_to_no() {
        let mut item = TocItem::new(Some("1".into()), "Intro");
        assert!(!item.starts_at_page_top());
        item.appear_start = Some(Answer::Yes);
        assert!(item.starts_at_page_top());
    }
}
